#![forbid(unsafe_code)]

use motorpool_kernel_contracts::booking::{
    ActorId, BookingDetails, BookingRequestId, BookingSubmitInput, EmployeeId, HistoryAction,
    RequestStatus, StatusTransitionInput,
};
use motorpool_kernel_contracts::{UnixTimeNs, Validate};
use motorpool_storage::{BookingRequestRepo, BookingStore, StorageError};

fn submit(employee: &str, t: u64) -> BookingSubmitInput {
    BookingSubmitInput::v1(
        EmployeeId::new(employee).unwrap(),
        BookingDetails::new(serde_json::json!({
            "vehicleName": "Scorpio",
            "destination": "Field station",
            "passengers": 3,
            "coCpsId": "CO-77",
        }))
        .unwrap(),
        UnixTimeNs(t),
    )
    .unwrap()
}

fn ev(id: u64, target: RequestStatus, actor: &str, t: u64) -> StatusTransitionInput {
    StatusTransitionInput::v1(
        BookingRequestId(id),
        target,
        ActorId::new(actor).unwrap(),
        UnixTimeNs(t),
    )
    .unwrap()
}

#[test]
fn at_booking_db_01_rows_keep_insertion_order() {
    let mut s = BookingStore::new_in_memory();
    for (i, employee) in ["E3", "E1", "E2"].iter().enumerate() {
        s.create_request_row(submit(employee, 10 + i as u64)).unwrap();
    }
    let employees: Vec<_> = s
        .request_rows()
        .iter()
        .map(|r| r.employee_id.as_str().to_string())
        .collect();
    assert_eq!(employees, vec!["E3", "E1", "E2"]);
    let ids: Vec<_> = s.request_rows().iter().map(|r| r.id.0).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn at_booking_db_02_details_pass_through_verbatim() {
    let mut s = BookingStore::new_in_memory();
    let input = submit("E1", 10);
    let expected = input.details.clone();
    let row = s.create_request_row(input).unwrap();
    assert_eq!(row.details, expected);
    assert_eq!(row.details.str_field("coCpsId"), Some("CO-77"));
}

#[test]
fn at_booking_db_03_full_review_trail_is_append_only() {
    let mut s = BookingStore::new_in_memory();
    s.create_request_row(submit("E1", 10)).unwrap();
    s.append_status_row(ev(1, RequestStatus::ForwardedToL1, "CO1", 11))
        .unwrap();
    let row = s
        .append_status_row(ev(1, RequestStatus::AcceptedByL1, "ADMIN1", 12))
        .unwrap();

    let actions: Vec<_> = row.history.iter().map(|h| h.action).collect();
    assert_eq!(
        actions,
        vec![
            HistoryAction::Submitted,
            HistoryAction::StatusChanged(RequestStatus::ForwardedToL1),
            HistoryAction::StatusChanged(RequestStatus::AcceptedByL1),
        ]
    );
    let actors: Vec<_> = row.history.iter().map(|h| h.actor.as_str()).collect();
    assert_eq!(actors, vec!["E1", "CO1", "ADMIN1"]);
    assert!(row.validate().is_ok());

    assert_eq!(
        s.attempt_delete_booking_request(BookingRequestId(1)),
        Err(StorageError::AppendOnlyViolation {
            table: "booking_requests"
        })
    );
    assert_eq!(
        s.attempt_overwrite_booking_history(BookingRequestId(1)),
        Err(StorageError::AppendOnlyViolation {
            table: "booking_request_history"
        })
    );
}

#[test]
fn at_booking_db_04_terminal_rows_refuse_every_write() {
    let mut s = BookingStore::new_in_memory();
    s.create_request_row(submit("E1", 10)).unwrap();
    s.append_status_row(ev(1, RequestStatus::RejectedByCo, "CO1", 11))
        .unwrap();

    for target in RequestStatus::ALL {
        let out = s.append_status_row(ev(1, target, "ADMIN1", 12));
        assert!(matches!(out, Err(StorageError::InvalidTransition { .. })));
    }
    let row = s.request_row(BookingRequestId(1)).unwrap();
    assert_eq!(row.status, RequestStatus::RejectedByCo);
    assert_eq!(row.history.len(), 2);
}

#[test]
fn at_booking_db_05_missing_row_lookup_is_none() {
    let s = BookingStore::new_in_memory();
    assert!(s.request_row(BookingRequestId(1)).is_none());
    assert!(s.request_rows().is_empty());
}
