#![forbid(unsafe_code)]

use motorpool_kernel_contracts::booking::{
    BookingRequestId, BookingRequestRecord, BookingSubmitInput, StatusTransitionInput,
};

use crate::booking_store::{BookingStore, StatusCount, StorageError};

/// Typed repository interface for the booking request tables.
///
/// The lifecycle and query runtimes only see this capability, never a concrete store.
pub trait BookingRequestRepo {
    fn create_request_row(
        &mut self,
        input: BookingSubmitInput,
    ) -> Result<BookingRequestRecord, StorageError>;
    fn request_row(&self, id: BookingRequestId) -> Option<&BookingRequestRecord>;
    fn request_rows(&self) -> &[BookingRequestRecord];
    fn append_status_row(
        &mut self,
        input: StatusTransitionInput,
    ) -> Result<BookingRequestRecord, StorageError>;
    fn status_count_rows(&self) -> Vec<StatusCount>;
}

impl BookingRequestRepo for BookingStore {
    fn create_request_row(
        &mut self,
        input: BookingSubmitInput,
    ) -> Result<BookingRequestRecord, StorageError> {
        self.insert_booking_request(input)
    }

    fn request_row(&self, id: BookingRequestId) -> Option<&BookingRequestRecord> {
        self.booking_request(id)
    }

    fn request_rows(&self) -> &[BookingRequestRecord] {
        self.booking_requests()
    }

    fn append_status_row(
        &mut self,
        input: StatusTransitionInput,
    ) -> Result<BookingRequestRecord, StorageError> {
        self.append_status_event(input)
    }

    fn status_count_rows(&self) -> Vec<StatusCount> {
        self.status_counts()
    }
}
