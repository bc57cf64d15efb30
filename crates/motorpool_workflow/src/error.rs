#![forbid(unsafe_code)]

use motorpool_kernel_contracts::booking::{BookingRequestId, RequestStatus};
use motorpool_kernel_contracts::ContractViolation;
use motorpool_storage::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("booking request {id} not found")]
    NotFound { id: BookingRequestId },
    #[error("invalid status transition for request {id}: {from} -> {to}")]
    InvalidTransition {
        id: BookingRequestId,
        from: RequestStatus,
        to: RequestStatus,
    },
    #[error("validation failed: {0}")]
    Validation(#[from] ContractViolation),
    #[error("storage failure: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for WorkflowError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { id } => WorkflowError::NotFound { id },
            StorageError::InvalidTransition { id, from, to } => {
                WorkflowError::InvalidTransition { id, from, to }
            }
            StorageError::ContractViolation(v) => WorkflowError::Validation(v),
            other => WorkflowError::Storage(other),
        }
    }
}
