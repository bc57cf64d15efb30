#![forbid(unsafe_code)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use motorpool_kernel_contracts::booking::{
    BookingSubmitInput, RequestStatus, StatusTransitionInput,
};
use sha2::{Digest, Sha256};

pub const JOURNAL_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "booking journal '{path}'{}: {reason}",
    .line.map(|n| format!(" line {n}")).unwrap_or_default()
)]
pub struct JournalError {
    pub path: String,
    pub line: Option<usize>,
    pub reason: String,
}

/// One accepted command, with the timestamp it was applied at.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalCommand {
    Submit {
        employee_id: String,
        details: serde_json::Value,
        at_ns: u64,
    },
    Transition {
        request_id: u64,
        status: RequestStatus,
        acted_by: String,
        at_ns: u64,
    },
}

impl From<&BookingSubmitInput> for JournalCommand {
    fn from(input: &BookingSubmitInput) -> Self {
        JournalCommand::Submit {
            employee_id: input.employee_id.as_str().to_string(),
            details: input.details.as_value().clone(),
            at_ns: input.submitted_at.0,
        }
    }
}

impl From<&StatusTransitionInput> for JournalCommand {
    fn from(input: &StatusTransitionInput) -> Self {
        JournalCommand::Transition {
            request_id: input.request_id.0,
            status: input.target,
            acted_by: input.actor.as_str().to_string(),
            at_ns: input.acted_at.0,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct JournalEntry {
    schema_version: u8,
    command: JournalCommand,
    sha256: String,
}

impl JournalEntry {
    fn v1(command: JournalCommand) -> Result<Self, serde_json::Error> {
        let sha256 = command_digest(&command)?;
        Ok(Self {
            schema_version: JOURNAL_SCHEMA_VERSION,
            command,
            sha256,
        })
    }
}

fn command_digest(command: &JournalCommand) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(command)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

/// Append-only JSONL command log. Each line is fsynced before `append` returns.
#[derive(Debug, Clone)]
pub struct BookingJournal {
    path: PathBuf,
}

impl BookingJournal {
    /// Opens the journal, creating the file and its parent directory when missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let journal = Self { path: path.into() };
        if let Some(parent) = journal.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    journal.error(None, format!("failed to create directory: {err}"))
                })?;
            }
        }
        if !journal.path.exists() {
            File::create(&journal.path)
                .map_err(|err| journal.error(None, format!("failed to create: {err}")))?;
        }
        Ok(journal)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every command in order. Returned pairs carry 1-based line numbers.
    pub fn read_commands(&self) -> Result<Vec<(usize, JournalCommand)>, JournalError> {
        let file = File::open(&self.path)
            .map_err(|err| self.error(None, format!("failed to open: {err}")))?;
        let mut out = Vec::new();
        for (idx, line_result) in BufReader::new(file).lines().enumerate() {
            let line_no = idx + 1;
            let line = line_result
                .map_err(|err| self.error(Some(line_no), format!("read failed: {err}")))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: JournalEntry = serde_json::from_str(&line)
                .map_err(|err| self.error(Some(line_no), format!("parse failed: {err}")))?;
            if entry.schema_version != JOURNAL_SCHEMA_VERSION {
                return Err(self.error(
                    Some(line_no),
                    format!("unsupported schema_version={}", entry.schema_version),
                ));
            }
            let expected = command_digest(&entry.command)
                .map_err(|err| self.error(Some(line_no), format!("encode failed: {err}")))?;
            if expected != entry.sha256 {
                return Err(self.error(Some(line_no), "sha256 mismatch".to_string()));
            }
            out.push((line_no, entry.command));
        }
        Ok(out)
    }

    /// Appends one line. On failure the file is cut back to its previous length, so a
    /// refused command never survives into the next replay.
    pub fn append(&self, command: JournalCommand) -> Result<(), JournalError> {
        let entry = JournalEntry::v1(command)
            .map_err(|err| self.error(None, format!("encode failed: {err}")))?;
        let mut line = serde_json::to_vec(&entry)
            .map_err(|err| self.error(None, format!("encode failed: {err}")))?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|err| self.error(None, format!("failed to open for append: {err}")))?;
        append_line(&mut file, &line).map_err(|reason| self.error(None, reason))
    }

    fn error(&self, line: Option<usize>, reason: String) -> JournalError {
        JournalError {
            path: self.path.display().to_string(),
            line,
            reason,
        }
    }
}

/// The file operations `append_line` relies on.
trait JournalSink: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl JournalSink for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_data()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Writes `line` and fsyncs it, or leaves the sink at its old length.
fn append_line<S: JournalSink>(sink: &mut S, line: &[u8]) -> Result<(), String> {
    let before = sink
        .current_len()
        .map_err(|err| format!("failed to stat: {err}"))?;
    let written = sink.write_all(line).and_then(|_| sink.sync());
    match written {
        Ok(()) => Ok(()),
        Err(err) => match sink.truncate_to(before) {
            Ok(()) => Err(format!("write failed: {err}")),
            Err(rollback) => Err(format!(
                "write failed: {err}; truncating back to {before} bytes failed: {rollback}"
            )),
        },
    }
}
