#![forbid(unsafe_code)]

use motorpool_kernel_contracts::booking::{
    ActorId, BookingDetails, BookingRequestId, BookingRequestRecord, BookingSubmitInput,
    EmployeeId, RequestStatus, StatusTransitionInput,
};
use motorpool_kernel_contracts::UnixTimeNs;
use motorpool_storage::BookingRequestRepo;
use tracing::{info, warn};

use crate::error::WorkflowError;

/// Submission and review transitions for booking requests.
///
/// Callers must hold exclusive access to the repo for the whole call; the read of the
/// current status and the write of the next one happen inside it.
#[derive(Debug, Default, Clone)]
pub struct BookingLifecycleRuntime;

impl BookingLifecycleRuntime {
    pub fn submit<R>(
        &self,
        repo: &mut R,
        employee_id: &str,
        details: serde_json::Value,
        now: UnixTimeNs,
    ) -> Result<BookingRequestRecord, WorkflowError>
    where
        R: BookingRequestRepo + ?Sized,
    {
        let input = self.prepare_submit(employee_id, details, now)?;
        self.commit_submit(repo, input)
    }

    /// Validates a submission without touching the store.
    pub fn prepare_submit(
        &self,
        employee_id: &str,
        details: serde_json::Value,
        now: UnixTimeNs,
    ) -> Result<BookingSubmitInput, WorkflowError> {
        Ok(BookingSubmitInput::v1(
            EmployeeId::new(employee_id)?,
            BookingDetails::new(details)?,
            now,
        )?)
    }

    pub fn commit_submit<R>(
        &self,
        repo: &mut R,
        input: BookingSubmitInput,
    ) -> Result<BookingRequestRecord, WorkflowError>
    where
        R: BookingRequestRepo + ?Sized,
    {
        let record = repo.create_request_row(input)?;
        info!(
            request_id = %record.id,
            employee_id = record.employee_id.as_str(),
            "booking request submitted"
        );
        Ok(record)
    }

    pub fn transition<R>(
        &self,
        repo: &mut R,
        request_id: BookingRequestId,
        target: RequestStatus,
        acted_by: &str,
        now: UnixTimeNs,
    ) -> Result<BookingRequestRecord, WorkflowError>
    where
        R: BookingRequestRepo + ?Sized,
    {
        let input = self.prepare_transition(&*repo, request_id, target, acted_by, now)?;
        self.commit_transition(repo, input)
    }

    /// Checks a transition against the current row and the transition table.
    ///
    /// An `Ok` result stays valid only while the caller keeps exclusive access to `repo`.
    pub fn prepare_transition<R>(
        &self,
        repo: &R,
        request_id: BookingRequestId,
        target: RequestStatus,
        acted_by: &str,
        now: UnixTimeNs,
    ) -> Result<StatusTransitionInput, WorkflowError>
    where
        R: BookingRequestRepo + ?Sized,
    {
        let actor = ActorId::new(acted_by)?;
        let current = repo
            .request_row(request_id)
            .map(|row| row.status)
            .ok_or(WorkflowError::NotFound { id: request_id })?;
        if !current.can_transition_to(target) {
            warn!(
                request_id = %request_id,
                from = %current,
                to = %target,
                actor = actor.as_str(),
                "booking request transition refused"
            );
            return Err(WorkflowError::InvalidTransition {
                id: request_id,
                from: current,
                to: target,
            });
        }
        Ok(StatusTransitionInput::v1(request_id, target, actor, now)?)
    }

    pub fn commit_transition<R>(
        &self,
        repo: &mut R,
        input: StatusTransitionInput,
    ) -> Result<BookingRequestRecord, WorkflowError>
    where
        R: BookingRequestRepo + ?Sized,
    {
        let request_id = input.request_id;
        let actor = input.actor.clone();
        let record = repo.append_status_row(input)?;
        info!(
            request_id = %request_id,
            to = %record.status,
            actor = actor.as_str(),
            terminal = record.status.is_terminal(),
            "booking request transitioned"
        );
        Ok(record)
    }
}
