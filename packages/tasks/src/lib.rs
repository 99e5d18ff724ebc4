//! Client-side state synchronization for a hosted to-do backend: an
//! optimistic task store view, the session lifecycle around it, and the
//! trait seams the network layer plugs into.

pub mod app;
pub mod auth;
pub mod error;
pub mod filter;
pub mod model;
pub mod store;
pub mod sync;

mod memory;
pub use memory::{Fault, MemoryBackend};

pub use app::{Backend, Phase, SessionController};
pub use auth::{AuthGateway, Session};
pub use error::{AuthError, StoreError, TaskError};
pub use filter::{filter_tasks, StatusFilter};
pub use model::{Priority, Task, TaskDraft, TaskPatch};
pub use store::{ChangeFeed, FeedGuard, TableEvent, TaskStore};
pub use sync::{TaskCounts, TaskSynchronizer};
