//! SQLite backend for the Money Box document store and object storage.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Realtime listeners are served
//! in-process: every write re-reads the affected collection and pushes a full
//! snapshot to each matching subscriber.

mod encode;
mod listeners;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
