#![forbid(unsafe_code)]

pub mod booking;
pub mod common;
pub mod query;

pub use common::{ContractViolation, SchemaVersion, UnixTimeNs, Validate};
