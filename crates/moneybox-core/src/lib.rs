//! Core types and trait definitions for the Money Box community ledger.
//!
//! This crate is deliberately free of HTTP, database, and runtime
//! dependencies. It holds the domain model, the document-store and
//! object-storage contracts, and the pure derivations (series windowing,
//! activity feed, presence) that view-models build on.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod activity;
pub mod amount;
pub mod chat;
pub mod collection;
pub mod deposit;
pub mod document;
pub mod error;
pub mod loan;
pub mod presence;
pub mod series;
pub mod store;
pub mod timestamp;

pub use error::{Error, Result, ValidationError};
