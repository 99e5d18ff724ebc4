//! # API crate — HTTP client for the hosted to-do backend
//!
//! Implements the `tasks` crate's service seams against a hosted backend
//! that exposes row-level REST endpoints and an identity API under one
//! project URL. The backend owns persistence, authentication, and row
//! visibility; this crate only forwards JSON calls and holds the session
//! it is handed.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Endpoint settings (`TODO_BACKEND_URL`, `TODO_BACKEND_ANON_KEY`), request timeout, feed poll interval |
//! | `backend` | The shared [`HttpBackend`] handle: HTTP client, config, current session |
//! | `auth` | [`tasks::AuthGateway`] over the identity endpoints (signup, password grant, magic link, logout) |
//! | `rest` | [`tasks::TaskStore`] over the `tasks` table endpoints |
//! | `feed` | The change feed, sampled over REST |
//!
//! ## Usage
//!
//! ```no_run
//! # async fn run() -> Result<(), String> {
//! use std::sync::Arc;
//!
//! let backend = api::HttpBackend::from_env()?;
//! let controller = Arc::new(tasks::SessionController::new(backend));
//! controller.start().await;
//! # Ok(())
//! # }
//! ```

pub mod config;

mod auth;
mod backend;
mod feed;
mod rest;

pub use backend::HttpBackend;
pub use config::BackendConfig;
