//! HTTP handlers for the pharmacy ledger API

pub mod assignment;
pub mod health;
pub mod payment;
pub mod sale;
pub mod stock;

pub use assignment::*;
pub use health::*;
pub use payment::*;
pub use sale::*;
pub use stock::*;
