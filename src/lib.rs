//! Messaging core for CareLink: care teams (parents, caregivers,
//! therapists) share child-scoped conversations with atomic unread
//! bookkeeping, real-time feeds, and threaded display grouping.

pub mod config;
pub mod error;
pub mod grouping;
pub mod logging;
pub mod models;
pub mod realtime;
pub mod services;
pub mod state;
pub mod store;

pub use error::{AppError, AppResult};
pub use state::AppState;
