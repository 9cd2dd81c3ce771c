//! Route handlers, one module per resource.

pub mod dashboard;
pub mod deposits;
pub mod loans;
pub mod messages;
pub mod objects;
pub mod presence;
