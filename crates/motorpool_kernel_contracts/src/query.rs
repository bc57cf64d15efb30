#![forbid(unsafe_code)]

use std::str::FromStr;

use crate::booking::RequestStatus;
use crate::ContractViolation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewerRole {
    Co,
    Admin,
    Employee,
}

impl ViewerRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewerRole::Co => "co",
            ViewerRole::Admin => "admin",
            ViewerRole::Employee => "employee",
        }
    }

    /// Queue a reviewer sees when no status override is given.
    pub fn default_queue(self) -> Option<RequestStatus> {
        match self {
            ViewerRole::Co => Some(RequestStatus::PendingCo),
            ViewerRole::Admin => Some(RequestStatus::ForwardedToL1),
            ViewerRole::Employee => None,
        }
    }
}

impl FromStr for ViewerRole {
    type Err = ContractViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "co" => Ok(ViewerRole::Co),
            "admin" => Ok(ViewerRole::Admin),
            "employee" => Ok(ViewerRole::Employee),
            _ => Err(ContractViolation::InvalidValue {
                field: "viewer_role",
                reason: "unknown role",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFilter {
    Any,
    Exactly(RequestStatus),
    /// A status string outside the lifecycle; matches no record.
    Unrecognized(String),
}

impl StatusFilter {
    pub fn from_param(raw: Option<&str>) -> Self {
        match non_blank(raw) {
            None => StatusFilter::Any,
            Some(v) => match v.parse::<RequestStatus>() {
                Ok(status) => StatusFilter::Exactly(status),
                Err(_) => StatusFilter::Unrecognized(v.to_string()),
            },
        }
    }

    pub fn matches(&self, status: RequestStatus) -> bool {
        match self {
            StatusFilter::Any => true,
            StatusFilter::Exactly(wanted) => *wanted == status,
            StatusFilter::Unrecognized(_) => false,
        }
    }
}

/// Parsed form of the `role`, `employeeId`, `status` and `coCpsId` list parameters.
///
/// Blank parameters count as absent and an unknown role counts as no role.
/// `employee_id` is kept as received, so an id no employee can hold matches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestListQuery {
    pub role: Option<ViewerRole>,
    pub employee_id: Option<String>,
    pub status: StatusFilter,
    pub co_cps_id: Option<String>,
}

impl RequestListQuery {
    pub fn everything() -> Self {
        Self {
            role: None,
            employee_id: None,
            status: StatusFilter::Any,
            co_cps_id: None,
        }
    }

    pub fn for_role(role: ViewerRole) -> Self {
        Self {
            role: Some(role),
            ..Self::everything()
        }
    }

    pub fn from_params(
        role: Option<&str>,
        employee_id: Option<&str>,
        status: Option<&str>,
        co_cps_id: Option<&str>,
    ) -> Self {
        Self {
            role: non_blank(role).and_then(|v| v.parse().ok()),
            employee_id: non_blank(employee_id).map(ToString::to_string),
            status: StatusFilter::from_param(status),
            co_cps_id: non_blank(co_cps_id).map(ToString::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedView {
    Accepted,
    Rejected,
    Completed,
}

impl DerivedView {
    pub const ALL: [DerivedView; 3] = [
        DerivedView::Accepted,
        DerivedView::Rejected,
        DerivedView::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DerivedView::Accepted => "accepted",
            DerivedView::Rejected => "rejected",
            DerivedView::Completed => "completed",
        }
    }

    /// Member statuses. `Accepted` also holds `forwarded_to_l1`, a CO forward counts
    /// as an acceptance on the history screens.
    pub fn statuses(self) -> &'static [RequestStatus] {
        match self {
            DerivedView::Accepted => &[RequestStatus::AcceptedByL1, RequestStatus::ForwardedToL1],
            DerivedView::Rejected => &[RequestStatus::RejectedByCo, RequestStatus::RejectedByL1],
            DerivedView::Completed => &[
                RequestStatus::AcceptedByL1,
                RequestStatus::RejectedByCo,
                RequestStatus::RejectedByL1,
            ],
        }
    }

    pub fn contains(self, status: RequestStatus) -> bool {
        self.statuses().contains(&status)
    }
}

impl FromStr for DerivedView {
    type Err = ContractViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DerivedView::ALL
            .into_iter()
            .find(|view| view.as_str() == s)
            .ok_or(ContractViolation::InvalidValue {
                field: "derived_view",
                reason: "unknown view",
            })
    }
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_params_are_absent() {
        let q = RequestListQuery::from_params(Some(""), Some("  "), Some(""), None);
        assert_eq!(q, RequestListQuery::everything());
    }

    #[test]
    fn employee_id_is_kept_verbatim_even_when_oversized() {
        let long = "X".repeat(129);
        let q = RequestListQuery::from_params(Some("employee"), Some(&long), None, None);
        assert_eq!(q.role, Some(ViewerRole::Employee));
        assert_eq!(q.employee_id, Some(long));
    }

    #[test]
    fn unknown_role_is_treated_as_no_role() {
        let q = RequestListQuery::from_params(Some("auditor"), None, None, None);
        assert_eq!(q.role, None);
    }

    #[test]
    fn unknown_status_is_kept_as_unmatchable() {
        let filter = StatusFilter::from_param(Some("approved"));
        assert_eq!(filter, StatusFilter::Unrecognized("approved".to_string()));
        for status in RequestStatus::ALL {
            assert!(!filter.matches(status));
        }
    }

    #[test]
    fn reviewer_default_queues() {
        assert_eq!(ViewerRole::Co.default_queue(), Some(RequestStatus::PendingCo));
        assert_eq!(
            ViewerRole::Admin.default_queue(),
            Some(RequestStatus::ForwardedToL1)
        );
        assert_eq!(ViewerRole::Employee.default_queue(), None);
    }

    #[test]
    fn completed_is_exactly_the_terminal_set() {
        let terminal: Vec<_> = RequestStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        for status in RequestStatus::ALL {
            assert_eq!(
                DerivedView::Completed.contains(status),
                terminal.contains(&status)
            );
        }
    }

    #[test]
    fn accepted_view_includes_forwarded_requests() {
        assert!(DerivedView::Accepted.contains(RequestStatus::ForwardedToL1));
        assert!(DerivedView::Accepted.contains(RequestStatus::AcceptedByL1));
        assert!(!DerivedView::Accepted.contains(RequestStatus::PendingCo));
    }
}
