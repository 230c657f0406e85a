//! Per-file session registry for the scan pass.
//!
//! One registry instance belongs to exactly one report-file worker; nothing
//! here is shared across workers. The registry tracks sessions in discovery
//! order and keeps at most one session "open for appending" at a time: a new
//! session metadata line closes and flushes the previous session's staging
//! area before opening a fresh one.
//!
//! Failure policy: staging failures and malformed session headers are fatal
//! to the owning session only. The registry records the casualty and keeps
//! scanning, so one broken session never takes down the rest of the file.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::classifier::SessionMeta;
use crate::session::staging::{StagingFile, StagingWriter};
use crate::session::{Session, SessionFailure};
use crate::ReportError;

/// A session discovered by the scan pass, paired with its closed staging
/// area.
#[derive(Debug)]
pub struct DiscoveredSession {
    pub session: Session,
    pub staging: StagingFile,
}

struct OpenSession {
    session: Session,
    staging: StagingWriter,
}

/// Tracks the sessions of a single report file during the scan pass.
pub struct SessionRegistry {
    staging_dir: PathBuf,
    report_date: String,
    sessions: Vec<DiscoveredSession>,
    failures: Vec<SessionFailure>,
    open: Option<OpenSession>,
    orphaned_lines: usize,
}

impl SessionRegistry {
    /// Create a registry for one report file.
    ///
    /// `report_date` is the calendar date token carried by the report file
    /// name; every session discovered here inherits it.
    pub fn new(staging_dir: impl Into<PathBuf>, report_date: impl Into<String>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            report_date: report_date.into(),
            sessions: Vec::new(),
            failures: Vec::new(),
            open: None,
            orphaned_lines: 0,
        }
    }

    /// Open a new session from its metadata line.
    ///
    /// Closes the previously open session first; only one session accepts
    /// appends at a time within a file pass.
    pub fn on_session_meta(&mut self, meta: SessionMeta) {
        self.close_open();

        let session = Session::from_meta(meta, &self.report_date);
        info!("discovered session '{}' ({})", session.id, session.name);

        match StagingWriter::create(&self.staging_dir, &session.id) {
            Ok(staging) => {
                self.open = Some(OpenSession { session, staging });
            }
            Err(error) => {
                warn!("cannot open staging for session '{}': {}", session.id, error);
                self.failures.push(SessionFailure { session_id: session.id, error });
            }
        }
    }

    /// Record a session metadata line whose core block failed to parse.
    ///
    /// The previous session (if any) is complete and is closed normally;
    /// the unparseable one is reported by its envelope token and skipped.
    pub fn on_malformed_session_meta(&mut self, session_hint: &str, error: ReportError) {
        self.close_open();
        warn!("unparseable session header '{session_hint}': {error}");
        self.failures.push(SessionFailure { session_id: session_hint.to_string(), error });
    }

    /// Append a raw data line to the currently open session.
    ///
    /// Data arriving before any session header is dropped with a warning;
    /// report logs occasionally carry leftover frame lines from an earlier
    /// run.
    pub fn on_data_line(&mut self, line: &str) {
        let appended = match self.open.as_mut() {
            Some(open) => open.staging.append_line(line),
            None => {
                self.orphaned_lines += 1;
                warn!("session data with no open session, dropping line");
                return;
            }
        };

        if let Err(error) = appended {
            if let Some(open) = self.open.take() {
                warn!("staging append failed for session '{}': {}", open.session.id, error);
                self.failures.push(SessionFailure { session_id: open.session.id, error });
                // open.staging drops here and removes the partial file.
            }
        }
    }

    /// Close the trailing open session and yield everything discovered, in
    /// discovery order.
    pub fn finish(mut self) -> (Vec<DiscoveredSession>, Vec<SessionFailure>) {
        self.close_open();
        if self.orphaned_lines > 0 {
            warn!("dropped {} orphaned data lines", self.orphaned_lines);
        }
        (self.sessions, self.failures)
    }

    fn close_open(&mut self) {
        let Some(OpenSession { mut session, staging }) = self.open.take() else {
            return;
        };

        match staging.close() {
            Ok(staged) => {
                session.buffered_lines = staged.lines();
                self.sessions.push(DiscoveredSession { session, staging: staged });
            }
            Err(error) => {
                warn!("failed to close staging for session '{}': {}", session.id, error);
                self.failures.push(SessionFailure { session_id: session.id, error });
            }
        }
    }
}
