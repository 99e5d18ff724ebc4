//! Client-side filtering over the loaded task list.
//!
//! Stateless and recomputed by the caller on every render; nothing here is
//! persisted or synchronized.

use crate::model::Task;

/// Completion-status bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl StatusFilter {
    fn keeps(&self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => !task.completed,
            StatusFilter::Completed => task.completed,
        }
    }
}

/// Filter by status bucket and a case-insensitive substring match against
/// title or description. An empty or whitespace query matches everything.
pub fn filter_tasks<'a>(tasks: &'a [Task], status: StatusFilter, query: &str) -> Vec<&'a Task> {
    let needle = query.trim().to_lowercase();
    tasks
        .iter()
        .filter(|task| status.keeps(task))
        .filter(|task| {
            needle.is_empty()
                || task.title.to_lowercase().contains(&needle)
                || task.description.to_lowercase().contains(&needle)
        })
        .collect()
}
