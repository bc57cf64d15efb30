#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use motorpool_kernel_contracts::booking::{
    BookingRequestId, BookingRequestRecord, BookingSubmitInput, HistoryAction, HistoryEntry,
    RequestStatus, StatusTransitionInput,
};
use motorpool_kernel_contracts::{ContractViolation, Validate};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("booking request {id} not found")]
    NotFound { id: BookingRequestId },
    #[error("booking request {id}: transition {from} -> {to} is not permitted")]
    InvalidTransition {
        id: BookingRequestId,
        from: RequestStatus,
        to: RequestStatus,
    },
    #[error("{table} is append-only")]
    AppendOnlyViolation { table: &'static str },
    #[error("booking request id space exhausted")]
    IdSpaceExhausted,
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCount {
    pub status: RequestStatus,
    pub count: usize,
}

/// In-memory booking request tables.
///
/// `booking_requests` keeps insertion order (ids are allocated in increasing order, so
/// insertion order and id order coincide). Rows are never removed.
#[derive(Debug, Clone)]
pub struct BookingStore {
    booking_requests: Vec<BookingRequestRecord>,
    // Lookup: request id -> position in `booking_requests`.
    booking_request_index: BTreeMap<BookingRequestId, usize>,
    next_booking_request_id: u64,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl BookingStore {
    pub fn new_in_memory() -> Self {
        Self {
            booking_requests: Vec::new(),
            booking_request_index: BTreeMap::new(),
            next_booking_request_id: 1,
        }
    }

    pub fn insert_booking_request(
        &mut self,
        input: BookingSubmitInput,
    ) -> Result<BookingRequestRecord, StorageError> {
        input.validate()?;

        let id = BookingRequestId(self.next_booking_request_id);
        let next = self
            .next_booking_request_id
            .checked_add(1)
            .ok_or(StorageError::IdSpaceExhausted)?;

        let record = BookingRequestRecord::from_submit_input_v1(id, input)?;
        self.next_booking_request_id = next;
        self.booking_request_index
            .insert(id, self.booking_requests.len());
        self.booking_requests.push(record.clone());
        Ok(record)
    }

    pub fn booking_request(&self, id: BookingRequestId) -> Option<&BookingRequestRecord> {
        self.booking_request_index
            .get(&id)
            .and_then(|pos| self.booking_requests.get(*pos))
    }

    pub fn booking_requests(&self) -> &[BookingRequestRecord] {
        &self.booking_requests
    }

    /// Applies one status change and appends its history entry.
    ///
    /// The transition table is checked here as well as in the lifecycle runtime: a row
    /// whose history disagrees with its status can never be written.
    pub fn append_status_event(
        &mut self,
        input: StatusTransitionInput,
    ) -> Result<BookingRequestRecord, StorageError> {
        input.validate()?;

        let pos = *self
            .booking_request_index
            .get(&input.request_id)
            .ok_or(StorageError::NotFound {
                id: input.request_id,
            })?;
        let row = &mut self.booking_requests[pos];
        if !row.status.can_transition_to(input.target) {
            return Err(StorageError::InvalidTransition {
                id: input.request_id,
                from: row.status,
                to: input.target,
            });
        }

        row.history.push(HistoryEntry {
            action: HistoryAction::StatusChanged(input.target),
            actor: input.actor,
            at: input.acted_at,
        });
        row.status = input.target;
        Ok(row.clone())
    }

    pub fn attempt_delete_booking_request(
        &mut self,
        _id: BookingRequestId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "booking_requests",
        })
    }

    pub fn attempt_overwrite_booking_history(
        &mut self,
        _id: BookingRequestId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "booking_request_history",
        })
    }

    pub fn status_counts(&self) -> Vec<StatusCount> {
        RequestStatus::ALL
            .into_iter()
            .map(|status| StatusCount {
                status,
                count: self
                    .booking_requests
                    .iter()
                    .filter(|row| row.status == status)
                    .count(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.booking_requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.booking_requests.is_empty()
    }
}
