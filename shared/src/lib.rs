//! Shared types and models for the pharmacy inventory ledger
//!
//! This crate holds the pure ledger core: batch stock, FIFO allocation,
//! assignment lines, consignment periods, sale transactions and payments.
//! It performs no I/O; the backend loads rows, calls into these types and
//! persists the result inside a single unit of work.

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
