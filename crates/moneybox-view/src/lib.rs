//! View-models for Money Box.
//!
//! Each view subscribes to one or more collections, decodes documents at
//! ingestion, and folds the resulting events into immutable state owned by a
//! single coordinator task. Consumers read the latest state or watch it
//! change through a [`tokio::sync::watch`] channel.
//!
//! Write-side workflows (loan submission with attachments, decisions,
//! presence heartbeats, chat) live here too, expressed against the
//! [`moneybox_core::store`] traits.

pub mod chat;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod loans;
pub mod presence;
pub mod reducer;
pub mod uploads;

pub use chat::{ChatRoom, ChatView};
pub use dashboard::Dashboard;
pub use error::{Error, Result};
pub use loans::{LoanDesk, LoanFeed, SubmissionReport};
pub use presence::{Member, PresenceHeartbeat};
pub use reducer::{DashboardConfig, DashboardState, Source};

#[cfg(test)]
mod testing;
