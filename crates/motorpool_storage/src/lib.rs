#![forbid(unsafe_code)]

pub mod booking_store;
pub mod repo;

pub use booking_store::{BookingStore, StatusCount, StorageError};
pub use repo::BookingRequestRepo;
