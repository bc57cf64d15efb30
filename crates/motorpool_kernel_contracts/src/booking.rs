#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use crate::common::validate_id;
use crate::{ContractViolation, SchemaVersion, UnixTimeNs, Validate};

pub const BOOKING_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const EMPLOYEE_ID_MAX_LEN: usize = 128;
pub const ACTOR_ID_MAX_LEN: usize = 128;
pub const BOOKING_DETAILS_MAX_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BookingRequestId(pub u64);

impl fmt::Display for BookingRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Validate for BookingRequestId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "booking_request_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmployeeId(String);

impl EmployeeId {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(v.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for EmployeeId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id("employee_id", &self.0, EMPLOYEE_ID_MAX_LEN)
    }
}

/// Whoever performed a history action: the submitting employee, a CO, or an admin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(v.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ActorId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id("actor_id", &self.0, ACTOR_ID_MAX_LEN)
    }
}

impl From<&EmployeeId> for ActorId {
    fn from(v: &EmployeeId) -> Self {
        Self(v.0.clone())
    }
}

/// Trip payload supplied by the submitter. Never interpreted by the lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingDetails(serde_json::Value);

impl BookingDetails {
    pub fn new(v: serde_json::Value) -> Result<Self, ContractViolation> {
        let v = Self(v);
        v.validate()?;
        Ok(v)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// String-valued top-level field, if present.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(serde_json::Value::as_str)
    }
}

impl Validate for BookingDetails {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.0.is_object() {
            return Err(ContractViolation::InvalidValue {
                field: "booking_details",
                reason: "must be a JSON object",
            });
        }
        let encoded_len = self.0.to_string().len();
        if encoded_len > BOOKING_DETAILS_MAX_BYTES {
            return Err(ContractViolation::TooLarge {
                field: "booking_details",
                max: BOOKING_DETAILS_MAX_BYTES,
                got: encoded_len,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingCo,
    ForwardedToL1,
    AcceptedByL1,
    RejectedByCo,
    RejectedByL1,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::PendingCo,
        RequestStatus::ForwardedToL1,
        RequestStatus::AcceptedByL1,
        RequestStatus::RejectedByCo,
        RequestStatus::RejectedByL1,
    ];

    pub const INITIAL: RequestStatus = RequestStatus::PendingCo;

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::PendingCo => "pending_co",
            RequestStatus::ForwardedToL1 => "forwarded_to_l1",
            RequestStatus::AcceptedByL1 => "accepted_by_l1",
            RequestStatus::RejectedByCo => "rejected_by_co",
            RequestStatus::RejectedByL1 => "rejected_by_l1",
        }
    }

    /// The transition table. Every lifecycle edge in the system is listed here and nowhere else.
    pub fn allowed_next(self) -> &'static [RequestStatus] {
        match self {
            RequestStatus::PendingCo => {
                &[RequestStatus::RejectedByCo, RequestStatus::ForwardedToL1]
            }
            RequestStatus::ForwardedToL1 => {
                &[RequestStatus::AcceptedByL1, RequestStatus::RejectedByL1]
            }
            RequestStatus::AcceptedByL1
            | RequestStatus::RejectedByCo
            | RequestStatus::RejectedByL1 => &[],
        }
    }

    pub fn can_transition_to(self, target: RequestStatus) -> bool {
        self.allowed_next().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = ContractViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or(ContractViolation::InvalidValue {
                field: "request_status",
                reason: "unknown status",
            })
    }
}

pub const HISTORY_ACTION_SUBMITTED: &str = "submitted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryAction {
    Submitted,
    StatusChanged(RequestStatus),
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryAction::Submitted => HISTORY_ACTION_SUBMITTED,
            HistoryAction::StatusChanged(status) => status.as_str(),
        }
    }

    /// Status a record holds right after this action was recorded.
    pub fn resulting_status(self) -> RequestStatus {
        match self {
            HistoryAction::Submitted => RequestStatus::INITIAL,
            HistoryAction::StatusChanged(status) => status,
        }
    }
}

impl FromStr for HistoryAction {
    type Err = ContractViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == HISTORY_ACTION_SUBMITTED {
            return Ok(HistoryAction::Submitted);
        }
        s.parse::<RequestStatus>()
            .map(HistoryAction::StatusChanged)
            .map_err(|_| ContractViolation::InvalidValue {
                field: "history_action",
                reason: "unknown action",
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub action: HistoryAction,
    pub actor: ActorId,
    pub at: UnixTimeNs,
}

impl Validate for HistoryEntry {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.actor.validate()?;
        if self.at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "history_entry.at",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingSubmitInput {
    pub schema_version: SchemaVersion,
    pub employee_id: EmployeeId,
    pub details: BookingDetails,
    pub submitted_at: UnixTimeNs,
}

impl BookingSubmitInput {
    pub fn v1(
        employee_id: EmployeeId,
        details: BookingDetails,
        submitted_at: UnixTimeNs,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            schema_version: BOOKING_CONTRACT_VERSION,
            employee_id,
            details,
            submitted_at,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for BookingSubmitInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != BOOKING_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "booking_submit_input.schema_version",
                reason: "must match BOOKING_CONTRACT_VERSION",
            });
        }
        self.employee_id.validate()?;
        self.details.validate()?;
        if self.submitted_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "booking_submit_input.submitted_at",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransitionInput {
    pub schema_version: SchemaVersion,
    pub request_id: BookingRequestId,
    pub target: RequestStatus,
    pub actor: ActorId,
    pub acted_at: UnixTimeNs,
}

impl StatusTransitionInput {
    pub fn v1(
        request_id: BookingRequestId,
        target: RequestStatus,
        actor: ActorId,
        acted_at: UnixTimeNs,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            schema_version: BOOKING_CONTRACT_VERSION,
            request_id,
            target,
            actor,
            acted_at,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for StatusTransitionInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != BOOKING_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "status_transition_input.schema_version",
                reason: "must match BOOKING_CONTRACT_VERSION",
            });
        }
        self.request_id.validate()?;
        self.actor.validate()?;
        if self.acted_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "status_transition_input.acted_at",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

/// A stored booking request together with its full review trail.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequestRecord {
    pub schema_version: SchemaVersion,
    pub id: BookingRequestId,
    pub employee_id: EmployeeId,
    pub details: BookingDetails,
    pub status: RequestStatus,
    pub history: Vec<HistoryEntry>,
}

impl BookingRequestRecord {
    pub fn from_submit_input_v1(
        id: BookingRequestId,
        input: BookingSubmitInput,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        let submitted = HistoryEntry {
            action: HistoryAction::Submitted,
            actor: ActorId::from(&input.employee_id),
            at: input.submitted_at,
        };
        let record = Self {
            schema_version: BOOKING_CONTRACT_VERSION,
            id,
            employee_id: input.employee_id,
            details: input.details,
            status: RequestStatus::INITIAL,
            history: vec![submitted],
        };
        record.validate()?;
        Ok(record)
    }

    pub fn last_entry(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }
}

impl Validate for BookingRequestRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != BOOKING_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "booking_request_record.schema_version",
                reason: "must match BOOKING_CONTRACT_VERSION",
            });
        }
        self.id.validate()?;
        self.employee_id.validate()?;
        self.details.validate()?;

        let Some((first, rest)) = self.history.split_first() else {
            return Err(ContractViolation::InvalidValue {
                field: "booking_request_record.history",
                reason: "must contain the submission entry",
            });
        };
        if first.action != HistoryAction::Submitted {
            return Err(ContractViolation::InvalidValue {
                field: "booking_request_record.history",
                reason: "first entry must be the submission",
            });
        }
        first.validate()?;

        let mut walked = first.action.resulting_status();
        for entry in rest {
            entry.validate()?;
            let HistoryAction::StatusChanged(next) = entry.action else {
                return Err(ContractViolation::InvalidValue {
                    field: "booking_request_record.history",
                    reason: "submission may only appear first",
                });
            };
            if !walked.can_transition_to(next) {
                return Err(ContractViolation::InvalidValue {
                    field: "booking_request_record.history",
                    reason: "entry is not a permitted transition",
                });
            }
            walked = next;
        }
        if walked != self.status {
            return Err(ContractViolation::InvalidValue {
                field: "booking_request_record.status",
                reason: "must match the most recent history entry",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submit_input() -> BookingSubmitInput {
        BookingSubmitInput::v1(
            EmployeeId::new("E1").unwrap(),
            BookingDetails::new(serde_json::json!({ "vehicleName": "Bolero" })).unwrap(),
            UnixTimeNs(10),
        )
        .unwrap()
    }

    #[test]
    fn transition_table_matches_lifecycle() {
        use RequestStatus::*;
        assert!(PendingCo.can_transition_to(RejectedByCo));
        assert!(PendingCo.can_transition_to(ForwardedToL1));
        assert!(ForwardedToL1.can_transition_to(AcceptedByL1));
        assert!(ForwardedToL1.can_transition_to(RejectedByL1));

        let permitted = RequestStatus::ALL
            .iter()
            .flat_map(|from| RequestStatus::ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .count();
        assert_eq!(permitted, 4);
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        let terminal: Vec<_> = RequestStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                RequestStatus::AcceptedByL1,
                RequestStatus::RejectedByCo,
                RequestStatus::RejectedByL1
            ]
        );
    }

    #[test]
    fn status_strings_parse_back() {
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("approved".parse::<RequestStatus>().is_err());
        assert!("PENDING_CO".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn status_serde_uses_snake_case_wire_names() {
        let v = serde_json::to_value(RequestStatus::ForwardedToL1).unwrap();
        assert_eq!(v, serde_json::json!("forwarded_to_l1"));
    }

    #[test]
    fn history_action_submitted_implies_initial_status() {
        assert_eq!(
            HistoryAction::Submitted.resulting_status(),
            RequestStatus::PendingCo
        );
        assert_eq!(
            "rejected_by_co".parse::<HistoryAction>().unwrap(),
            HistoryAction::StatusChanged(RequestStatus::RejectedByCo)
        );
        assert_eq!(
            "submitted".parse::<HistoryAction>().unwrap(),
            HistoryAction::Submitted
        );
    }

    #[test]
    fn details_must_be_an_object() {
        assert!(BookingDetails::new(serde_json::json!("a string")).is_err());
        assert!(BookingDetails::new(serde_json::Value::Null).is_err());
        assert!(BookingDetails::new(serde_json::json!({})).is_ok());
    }

    #[test]
    fn details_size_is_bounded() {
        let big = "x".repeat(BOOKING_DETAILS_MAX_BYTES);
        let out = BookingDetails::new(serde_json::json!({ "purpose": big }));
        assert!(matches!(out, Err(ContractViolation::TooLarge { .. })));
    }

    #[test]
    fn record_from_submit_starts_pending_with_one_entry() {
        let record =
            BookingRequestRecord::from_submit_input_v1(BookingRequestId(1), submit_input())
                .unwrap();
        assert_eq!(record.status, RequestStatus::PendingCo);
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.history[0].actor.as_str(), "E1");
        assert_eq!(record.history[0].action.as_str(), "submitted");
    }

    #[test]
    fn record_validation_rejects_status_history_mismatch() {
        let mut record =
            BookingRequestRecord::from_submit_input_v1(BookingRequestId(1), submit_input())
                .unwrap();
        record.status = RequestStatus::AcceptedByL1;
        assert!(record.validate().is_err());
    }

    #[test]
    fn record_validation_rejects_skipped_review_step() {
        let mut record =
            BookingRequestRecord::from_submit_input_v1(BookingRequestId(1), submit_input())
                .unwrap();
        record.history.push(HistoryEntry {
            action: HistoryAction::StatusChanged(RequestStatus::AcceptedByL1),
            actor: ActorId::new("ADMIN1").unwrap(),
            at: UnixTimeNs(11),
        });
        record.status = RequestStatus::AcceptedByL1;
        assert!(record.validate().is_err());
    }

    #[test]
    fn record_id_zero_is_rejected() {
        assert!(
            BookingRequestRecord::from_submit_input_v1(BookingRequestId(0), submit_input())
                .is_err()
        );
    }
}
