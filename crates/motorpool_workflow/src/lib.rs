#![forbid(unsafe_code)]

pub mod error;
pub mod lifecycle;
pub mod query;

pub use error::WorkflowError;
pub use lifecycle::BookingLifecycleRuntime;
pub use query::BookingQueryRuntime;
