#![forbid(unsafe_code)]

use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use motorpool_kernel_contracts::booking::{BookingRequestId, HistoryAction, RequestStatus};
use motorpool_kernel_contracts::query::{DerivedView, RequestListQuery, ViewerRole};
use motorpool_kernel_contracts::{UnixTimeNs, Validate};
use motorpool_storage::{BookingRequestRepo, BookingStore};
use motorpool_workflow::{BookingLifecycleRuntime, BookingQueryRuntime, WorkflowError};

fn trip() -> serde_json::Value {
    serde_json::json!({
        "vehicleName": "Bolero",
        "departureDate": "2026-05-10",
        "departureTime": "09:00",
        "returnDate": "2026-05-11",
        "returnTime": "18:00",
        "destination": "Substation 12",
        "purpose": "Site survey",
        "passengers": 4,
        "coCpsId": "CO1",
    })
}

fn assert_history_matches_status(store: &BookingStore) {
    for row in store.request_rows() {
        let last = row.last_entry().expect("history is never empty");
        assert_eq!(last.action.resulting_status(), row.status);
        assert!(row.validate().is_ok());
    }
}

/// Walks a fresh request from `pending_co` into `status` via the shortest legal path.
fn request_in(
    rt: &BookingLifecycleRuntime,
    store: &mut BookingStore,
    status: RequestStatus,
) -> BookingRequestId {
    let id = rt
        .submit(store, "E1", trip(), UnixTimeNs(1))
        .unwrap()
        .id;
    let path: &[RequestStatus] = match status {
        RequestStatus::PendingCo => &[],
        RequestStatus::ForwardedToL1 => &[RequestStatus::ForwardedToL1],
        RequestStatus::RejectedByCo => &[RequestStatus::RejectedByCo],
        RequestStatus::AcceptedByL1 => &[RequestStatus::ForwardedToL1, RequestStatus::AcceptedByL1],
        RequestStatus::RejectedByL1 => &[RequestStatus::ForwardedToL1, RequestStatus::RejectedByL1],
    };
    for (i, step) in path.iter().enumerate() {
        rt.transition(store, id, *step, "REVIEWER", UnixTimeNs(2 + i as u64))
            .unwrap();
    }
    id
}

#[test]
fn at_lifecycle_01_review_scenario_end_to_end() {
    let rt = BookingLifecycleRuntime;
    let query = BookingQueryRuntime;
    let mut store = BookingStore::new_in_memory();

    let created = rt.submit(&mut store, "E1", trip(), UnixTimeNs(100)).unwrap();
    assert_eq!(created.id, BookingRequestId(1));
    assert_eq!(created.status, RequestStatus::PendingCo);
    assert_eq!(created.history.len(), 1);

    let co_queue = query.list(&store, &RequestListQuery::for_role(ViewerRole::Co));
    assert_eq!(co_queue.len(), 1);
    assert_eq!(co_queue[0].id, created.id);

    let forwarded = rt
        .transition(
            &mut store,
            created.id,
            RequestStatus::ForwardedToL1,
            "CO1",
            UnixTimeNs(101),
        )
        .unwrap();
    assert_eq!(forwarded.status, RequestStatus::ForwardedToL1);
    assert_eq!(forwarded.history.len(), 2);
    assert!(query
        .list(&store, &RequestListQuery::for_role(ViewerRole::Co))
        .is_empty());
    assert_eq!(query.derived(&store, DerivedView::Accepted).len(), 1);

    let accepted = rt
        .transition(
            &mut store,
            created.id,
            RequestStatus::AcceptedByL1,
            "ADMIN1",
            UnixTimeNs(102),
        )
        .unwrap();
    assert_eq!(accepted.status, RequestStatus::AcceptedByL1);
    assert!(accepted.status.is_terminal());

    let out = rt.transition(
        &mut store,
        created.id,
        RequestStatus::RejectedByL1,
        "ADMIN1",
        UnixTimeNs(103),
    );
    assert!(matches!(out, Err(WorkflowError::InvalidTransition { .. })));
    assert_eq!(store.request_row(created.id), Some(&accepted));
    assert_history_matches_status(&store);
}

#[test]
fn at_lifecycle_02_every_pair_outside_the_table_is_refused() {
    let rt = BookingLifecycleRuntime;
    for from in RequestStatus::ALL {
        for to in RequestStatus::ALL {
            if from.can_transition_to(to) {
                continue;
            }
            let mut store = BookingStore::new_in_memory();
            let id = request_in(&rt, &mut store, from);
            let before = store.request_row(id).cloned().unwrap();

            let out = rt.transition(&mut store, id, to, "REVIEWER", UnixTimeNs(50));
            assert_eq!(
                out,
                Err(WorkflowError::InvalidTransition { id, from, to }),
                "{from} -> {to} must be refused"
            );
            let after = store.request_row(id).unwrap();
            assert_eq!(after.status, before.status);
            assert_eq!(after.history.len(), before.history.len());
        }
    }
}

#[test]
fn at_lifecycle_03_every_pair_in_the_table_appends_one_entry() {
    let rt = BookingLifecycleRuntime;
    for from in RequestStatus::ALL {
        for &to in from.allowed_next() {
            let mut store = BookingStore::new_in_memory();
            let id = request_in(&rt, &mut store, from);
            let before_len = store.request_row(id).unwrap().history.len();

            let row = rt
                .transition(&mut store, id, to, "REVIEWER", UnixTimeNs(50))
                .unwrap();
            assert_eq!(row.status, to);
            assert_eq!(row.history.len(), before_len + 1);
            let last = row.last_entry().unwrap();
            assert_eq!(last.action, HistoryAction::StatusChanged(to));
            assert_eq!(last.actor.as_str(), "REVIEWER");
            assert_eq!(last.at, UnixTimeNs(50));
        }
    }
}

#[test]
fn at_lifecycle_04_repeating_a_forward_fails() {
    let rt = BookingLifecycleRuntime;
    let mut store = BookingStore::new_in_memory();
    let id = request_in(&rt, &mut store, RequestStatus::PendingCo);

    rt.transition(
        &mut store,
        id,
        RequestStatus::ForwardedToL1,
        "CO1",
        UnixTimeNs(5),
    )
    .unwrap();
    let replay = rt.transition(
        &mut store,
        id,
        RequestStatus::ForwardedToL1,
        "CO1",
        UnixTimeNs(6),
    );
    assert_eq!(
        replay,
        Err(WorkflowError::InvalidTransition {
            id,
            from: RequestStatus::ForwardedToL1,
            to: RequestStatus::ForwardedToL1,
        })
    );
    assert_eq!(store.request_row(id).unwrap().history.len(), 2);
}

#[test]
fn at_lifecycle_05_racing_reviewers_only_one_wins() {
    let rt = BookingLifecycleRuntime;
    let mut store = BookingStore::new_in_memory();
    let id = request_in(&rt, &mut store, RequestStatus::PendingCo);
    let store = Arc::new(Mutex::new(store));

    const RACERS: usize = 8;
    let barrier = Arc::new(Barrier::new(RACERS));
    let handles: Vec<_> = (0..RACERS)
        .map(|i| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let target = if i % 2 == 0 {
                    RequestStatus::ForwardedToL1
                } else {
                    RequestStatus::RejectedByCo
                };
                barrier.wait();
                let mut guard = store.lock().unwrap();
                BookingLifecycleRuntime.transition(
                    &mut *guard,
                    id,
                    target,
                    &format!("CO{i}"),
                    UnixTimeNs(10 + i as u64),
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, WorkflowError::InvalidTransition { .. })));

    let store = store.lock().unwrap();
    assert_eq!(store.request_row(id).unwrap().history.len(), 2);
    assert_history_matches_status(&store);
}

#[test]
fn at_lifecycle_06_concurrent_submissions_never_share_an_id() {
    let store = Arc::new(Mutex::new(BookingStore::new_in_memory()));
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                let mut guard = store.lock().unwrap();
                let row = BookingLifecycleRuntime
                    .submit(&mut *guard, &format!("E{i}"), trip(), UnixTimeNs(1))
                    .unwrap();
                row.id
            })
        })
        .collect();
    let mut ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap().0).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=16).collect::<Vec<u64>>());
}
