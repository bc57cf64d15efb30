#![forbid(unsafe_code)]

use motorpool_kernel_contracts::booking::{BookingRequestId, BookingRequestRecord};
use motorpool_kernel_contracts::query::{DerivedView, RequestListQuery, StatusFilter, ViewerRole};
use motorpool_storage::BookingRequestRepo;

use crate::error::WorkflowError;

/// Key inside the booking details naming the CO the employee routed the request to.
pub const DETAILS_CO_CPS_ID_KEY: &str = "coCpsId";

/// Read-only projections over the booking request rows. Results keep insertion order.
#[derive(Debug, Default, Clone)]
pub struct BookingQueryRuntime;

impl BookingQueryRuntime {
    pub fn get<R>(
        &self,
        repo: &R,
        id: BookingRequestId,
    ) -> Result<BookingRequestRecord, WorkflowError>
    where
        R: BookingRequestRepo + ?Sized,
    {
        repo.request_row(id)
            .cloned()
            .ok_or(WorkflowError::NotFound { id })
    }

    pub fn list<R>(&self, repo: &R, query: &RequestListQuery) -> Vec<BookingRequestRecord>
    where
        R: BookingRequestRepo + ?Sized,
    {
        match (query.role, query.employee_id.as_ref()) {
            (Some(role @ (ViewerRole::Co | ViewerRole::Admin)), _) => {
                let status = match (&query.status, role.default_queue()) {
                    (StatusFilter::Any, Some(queue)) => StatusFilter::Exactly(queue),
                    (explicit, _) => explicit.clone(),
                };
                let co_cps_id = match role {
                    ViewerRole::Co => query.co_cps_id.as_deref(),
                    _ => None,
                };
                select(repo, |row| {
                    status.matches(row.status)
                        && co_cps_id.map_or(true, |wanted| {
                            row.details.str_field(DETAILS_CO_CPS_ID_KEY) == Some(wanted)
                        })
                })
            }
            (Some(ViewerRole::Employee), Some(employee_id)) => {
                select(repo, |row| row.employee_id.as_str() == employee_id.as_str())
            }
            _ => select(repo, |row| query.status.matches(row.status)),
        }
    }

    pub fn derived<R>(&self, repo: &R, view: DerivedView) -> Vec<BookingRequestRecord>
    where
        R: BookingRequestRepo + ?Sized,
    {
        select(repo, |row| view.contains(row.status))
    }
}

fn select<R, F>(repo: &R, keep: F) -> Vec<BookingRequestRecord>
where
    R: BookingRequestRepo + ?Sized,
    F: Fn(&BookingRequestRecord) -> bool,
{
    repo.request_rows()
        .iter()
        .filter(|row| keep(row))
        .cloned()
        .collect()
}
