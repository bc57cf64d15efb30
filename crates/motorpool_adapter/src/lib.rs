#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use motorpool_kernel_contracts::booking::{
    BookingRequestId, BookingRequestRecord, HistoryEntry, RequestStatus,
};
use motorpool_kernel_contracts::query::{DerivedView, RequestListQuery};
use motorpool_kernel_contracts::UnixTimeNs;
use motorpool_storage::{BookingRequestRepo, BookingStore};
use motorpool_workflow::{BookingLifecycleRuntime, BookingQueryRuntime, WorkflowError};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info};

pub mod config;
pub mod http;
pub mod journal;

use config::AdapterConfig;
use journal::{BookingJournal, JournalCommand, JournalError};

pub const PERSISTENCE_MEMORY: &str = "memory";
pub const PERSISTENCE_JOURNAL: &str = "journal";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBookingAdapterRequest {
    #[serde(default)]
    pub employee_id: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateAdapterRequest {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub acted_by: String,
}

/// Raw `GET /requests` parameters. Interpretation lives in `RequestListQuery::from_params`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequestsParams {
    pub role: Option<String>,
    pub employee_id: Option<String>,
    pub status: Option<String>,
    pub co_cps_id: Option<String>,
}

impl ListRequestsParams {
    /// Builds the parameters from decoded query pairs. A repeated key keeps its last
    /// value and unknown keys are ignored.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "role" => &mut params.role,
                "employeeId" => &mut params.employee_id,
                "status" => &mut params.status,
                "coCpsId" => &mut params.co_cps_id,
                _ => continue,
            };
            *slot = Some(value.into());
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HistoryEntryView {
    pub action: String,
    pub by: String,
    pub at: String,
}

impl From<&HistoryEntry> for HistoryEntryView {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            action: entry.action.as_str().to_string(),
            by: entry.actor.as_str().to_string(),
            at: format_rfc3339(entry.at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequestView {
    pub id: u64,
    pub employee_id: String,
    pub details: serde_json::Value,
    pub status: String,
    pub history: Vec<HistoryEntryView>,
}

impl From<&BookingRequestRecord> for BookingRequestView {
    fn from(record: &BookingRequestRecord) -> Self {
        Self {
            id: record.id.0,
            employee_id: record.employee_id.as_str().to_string(),
            details: record.details.as_value().clone(),
            status: record.status.as_str().to_string(),
            history: record.history.iter().map(HistoryEntryView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub request_total: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub persistence: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("booking request '{0}' not found")]
    UnknownRequest(String),
    #[error("adapter store lock poisoned")]
    LockPoisoned,
    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl AdapterError {
    /// Stable machine-readable code carried in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            AdapterError::Workflow(WorkflowError::NotFound { .. })
            | AdapterError::UnknownRequest(_) => "NOT_FOUND",
            AdapterError::Workflow(WorkflowError::InvalidTransition { .. }) => {
                "INVALID_TRANSITION"
            }
            AdapterError::Workflow(WorkflowError::Validation(_))
            | AdapterError::InvalidRequest(_) => "VALIDATION_FAILED",
            AdapterError::Workflow(WorkflowError::Storage(_))
            | AdapterError::LockPoisoned
            | AdapterError::Journal(_) => "INTERNAL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterRuntime {
    store: Arc<Mutex<BookingStore>>,
    lifecycle: BookingLifecycleRuntime,
    query: BookingQueryRuntime,
    journal: Option<BookingJournal>,
}

impl Default for AdapterRuntime {
    fn default() -> Self {
        Self {
            store: Arc::new(Mutex::new(BookingStore::new_in_memory())),
            lifecycle: BookingLifecycleRuntime,
            query: BookingQueryRuntime,
            journal: None,
        }
    }
}

impl AdapterRuntime {
    pub fn from_config(config: &AdapterConfig) -> Result<Self, AdapterError> {
        match &config.store_path {
            Some(path) => Self::new_with_persistence(path.clone()),
            None => Ok(Self::default()),
        }
    }

    /// Opens the journal at `journal_path` and replays it into a fresh store.
    ///
    /// Replay goes through the same lifecycle checks as live traffic; the first line
    /// that fails them aborts with its line number.
    pub fn new_with_persistence(journal_path: PathBuf) -> Result<Self, AdapterError> {
        let journal = BookingJournal::open(journal_path)?;
        let runtime = Self {
            journal: Some(journal.clone()),
            ..Self::default()
        };
        let commands = journal.read_commands()?;
        let replayed = commands.len();
        {
            let mut store = runtime.lock_store()?;
            for (line_no, command) in commands {
                runtime
                    .apply_command(&mut *store, command)
                    .map_err(|err| JournalError {
                        path: journal.path().display().to_string(),
                        line: Some(line_no),
                        reason: err.to_string(),
                    })?;
            }
        }
        info!(
            path = %journal.path().display(),
            replayed,
            "booking journal replayed"
        );
        Ok(runtime)
    }

    pub fn persistence_mode(&self) -> &'static str {
        if self.journal.is_some() {
            PERSISTENCE_JOURNAL
        } else {
            PERSISTENCE_MEMORY
        }
    }

    pub fn submit_booking(
        &self,
        request: SubmitBookingAdapterRequest,
        now_ns: Option<u64>,
    ) -> Result<BookingRequestView, AdapterError> {
        let now = resolve_now(now_ns);
        let mut store = self.lock_store()?;
        let input = self
            .lifecycle
            .prepare_submit(&request.employee_id, request.details, now)?;
        self.journal_append(JournalCommand::from(&input))?;
        let record = self.lifecycle.commit_submit(&mut *store, input)?;
        Ok(BookingRequestView::from(&record))
    }

    /// Applies a review decision. `raw_id` is the path segment as received; anything
    /// that is not a known numeric id is reported as not found.
    pub fn update_status(
        &self,
        raw_id: &str,
        request: StatusUpdateAdapterRequest,
        now_ns: Option<u64>,
    ) -> Result<BookingRequestView, AdapterError> {
        let request_id = parse_request_id(raw_id)?;
        let target = request
            .status
            .trim()
            .parse::<RequestStatus>()
            .map_err(WorkflowError::from)?;
        let now = resolve_now(now_ns);
        let mut store = self.lock_store()?;
        let input = self.lifecycle.prepare_transition(
            &*store,
            request_id,
            target,
            &request.acted_by,
            now,
        )?;
        self.journal_append(JournalCommand::from(&input))?;
        let record = self.lifecycle.commit_transition(&mut *store, input)?;
        Ok(BookingRequestView::from(&record))
    }

    pub fn get_request(&self, raw_id: &str) -> Result<BookingRequestView, AdapterError> {
        let request_id = parse_request_id(raw_id)?;
        let store = self.lock_store()?;
        let record = self.query.get(&*store, request_id)?;
        Ok(BookingRequestView::from(&record))
    }

    pub fn list_requests(
        &self,
        params: &ListRequestsParams,
    ) -> Result<Vec<BookingRequestView>, AdapterError> {
        let query = RequestListQuery::from_params(
            params.role.as_deref(),
            params.employee_id.as_deref(),
            params.status.as_deref(),
            params.co_cps_id.as_deref(),
        );
        let store = self.lock_store()?;
        Ok(views(&self.query.list(&*store, &query)))
    }

    pub fn derived_view(&self, view: DerivedView) -> Result<Vec<BookingRequestView>, AdapterError> {
        let store = self.lock_store()?;
        Ok(views(&self.query.derived(&*store, view)))
    }

    pub fn health_report(&self) -> Result<AdapterHealthResponse, AdapterError> {
        let store = self.lock_store()?;
        let status_counts = store
            .status_count_rows()
            .into_iter()
            .map(|row| (row.status.as_str().to_string(), row.count))
            .collect();
        Ok(AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: "HEALTHY".to_string(),
            request_total: store.request_rows().len(),
            status_counts,
            persistence: self.persistence_mode().to_string(),
        })
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, BookingStore>, AdapterError> {
        self.store.lock().map_err(|_| AdapterError::LockPoisoned)
    }

    fn journal_append(&self, command: JournalCommand) -> Result<(), AdapterError> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        journal.append(command).map_err(|err| {
            error!(error = %err, "booking journal append failed");
            AdapterError::Journal(err)
        })
    }

    fn apply_command(
        &self,
        store: &mut BookingStore,
        command: JournalCommand,
    ) -> Result<BookingRequestRecord, WorkflowError> {
        match command {
            JournalCommand::Submit {
                employee_id,
                details,
                at_ns,
            } => {
                let input = self
                    .lifecycle
                    .prepare_submit(&employee_id, details, UnixTimeNs(at_ns))?;
                self.lifecycle.commit_submit(store, input)
            }
            JournalCommand::Transition {
                request_id,
                status,
                acted_by,
                at_ns,
            } => {
                let input = self.lifecycle.prepare_transition(
                    &*store,
                    BookingRequestId(request_id),
                    status,
                    &acted_by,
                    UnixTimeNs(at_ns),
                )?;
                self.lifecycle.commit_transition(store, input)
            }
        }
    }
}

fn parse_request_id(raw_id: &str) -> Result<BookingRequestId, AdapterError> {
    raw_id
        .trim()
        .parse::<u64>()
        .map(BookingRequestId)
        .map_err(|_| AdapterError::UnknownRequest(raw_id.to_string()))
}

fn resolve_now(now_ns: Option<u64>) -> UnixTimeNs {
    match now_ns {
        Some(ns) => UnixTimeNs(ns.max(1)),
        None => UnixTimeNs::now(),
    }
}

fn views(records: &[BookingRequestRecord]) -> Vec<BookingRequestView> {
    records.iter().map(BookingRequestView::from).collect()
}

/// RFC 3339 UTC rendering of `at`; falls back to the raw nanosecond count when the
/// instant is outside what `time` can represent.
pub fn format_rfc3339(at: UnixTimeNs) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(at.0))
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| at.0.to_string())
}
