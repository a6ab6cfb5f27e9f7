//! Domain models for the inventory ledger

mod assignment;
mod catalog;
mod payment;
mod period;
mod sale;
mod stock;

pub use assignment::*;
pub use catalog::*;
pub use payment::*;
pub use period::*;
pub use sale::*;
pub use stock::*;
