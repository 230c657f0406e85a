//! Conversion orchestration: discovery, scan fan-out, selection, assembly
//! fan-out.
//!
//! The conversion runs as two independent fan-out/fan-in stages, not a
//! pipeline. The scan stage runs one worker per report file; each worker
//! owns its own classifier, session registry and org chart builder, so no
//! state is shared across files. After the selection step has had its say,
//! the assembly stage runs one worker per retained session. Results of both
//! stages are joined in input order, never in completion order.
//!
//! Workers execute on the blocking pool — their bodies are sequential file
//! I/O — and poll the shared [`CancellationToken`] at line granularity. On
//! cancellation every staging file is removed on the way out; an
//! interrupted conversion leaves nothing behind.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::{LineClass, LineClassifier};
use crate::orbat::{Orbat, OrbatBuilder};
use crate::session::{DiscoveredSession, SessionFailure, SessionRegistry};
use crate::timeline::{Timeline, TimelineAssembler};
use crate::{ReportError, Result};

/// Report file name suffix, matched case-insensitively.
const REPORT_SUFFIX: &str = ".rpt";

/// Calendar date token format inside report file names.
const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";

/// The report files selected for one conversion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSet {
    /// Calendar date token shared by the selected files.
    pub date: String,
    /// Files carrying that date, sorted by name for deterministic dispatch.
    pub files: Vec<PathBuf>,
}

/// Select the report files of the most recent calendar date in `dir`.
///
/// Sessions may span several files when a server restarts mid-day, so every
/// file carrying the latest date is selected, not just the newest one.
pub fn discover_reports(dir: &Path) -> Result<ReportSet> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| ReportError::discovery_failed(dir, e.to_string()))?;

    let mut dated: Vec<(NaiveDate, String, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ReportError::discovery_failed(dir, e.to_string()))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let lowered = name.to_lowercase();
        if !lowered.ends_with(REPORT_SUFFIX) {
            continue;
        }
        match file_date(&lowered) {
            Some((date, token)) => dated.push((date, token, path)),
            None => warn!("skipping report file without a date token: {name}"),
        }
    }

    let Some(latest) = dated.iter().map(|(date, _, _)| *date).max() else {
        return Err(ReportError::discovery_failed(dir, "no report files found"));
    };

    dated.sort_by(|a, b| a.2.cmp(&b.2));
    let mut date = String::new();
    let mut files = Vec::new();
    for (file_date, token, path) in dated {
        if file_date == latest {
            date = token;
            files.push(path);
        }
    }

    info!("selected {} report file(s) dated {date}", files.len());
    Ok(ReportSet { date, files })
}

/// Extract the calendar date token from a report file name.
///
/// Names look like `server_2024-03-14_21-08-33.rpt`, sometimes with a
/// build-arch token between the host part and the date.
fn file_date(name: &str) -> Option<(NaiveDate, String)> {
    let stem = name.strip_suffix(REPORT_SUFFIX).unwrap_or(name);
    stem.split('_').find_map(|part| {
        NaiveDate::parse_from_str(part, REPORT_DATE_FORMAT)
            .ok()
            .map(|date| (date, part.to_string()))
    })
}

/// Merged result of the scan stage, handed to the selection step.
///
/// Sessions appear in file order, then discovery order within a file. The
/// selection step sees the ordered list and each session's mutable
/// inclusion flag, nothing else.
#[derive(Debug)]
pub struct ScanOutcome {
    pub date: String,
    pub sessions: Vec<DiscoveredSession>,
    pub orbats: Vec<Orbat>,
    pub failures: Vec<SessionFailure>,
}

impl ScanOutcome {
    /// Drop a session from the assembly stage. Returns false for unknown
    /// identifiers.
    pub fn exclude_session(&mut self, id: &str) -> bool {
        match self.sessions.iter_mut().find(|d| d.session.id == id) {
            Some(found) => {
                found.session.included = false;
                true
            }
            None => false,
        }
    }
}

/// Final result of a conversion run.
#[derive(Debug)]
pub struct ConversionOutcome {
    pub date: String,
    pub timelines: Vec<Timeline>,
    pub orbats: Vec<Orbat>,
    pub failures: Vec<SessionFailure>,
}

/// Everything one report file's scan worker produced.
struct FileScan {
    sessions: Vec<DiscoveredSession>,
    orbats: Vec<Orbat>,
    failures: Vec<SessionFailure>,
}

/// Coordinates the scan and assembly stages of a conversion run.
pub struct Orchestrator {
    staging_dir: PathBuf,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator staging its buffers under `staging_dir`.
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self { staging_dir: staging_dir.into(), cancel: CancellationToken::new() }
    }

    /// Replace the cancellation token, e.g. with one wired to a signal
    /// handler.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token observed by every worker this orchestrator spawns.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Scan stage: discover the latest report files and buffer their
    /// sessions, one worker per file.
    ///
    /// A file that cannot be read is reported and skipped; its sessions are
    /// lost but sibling files complete normally.
    pub async fn scan(&self, report_dir: &Path) -> Result<ScanOutcome> {
        let reports = discover_reports(report_dir)?;
        let date = reports.date.clone();

        let handles: Vec<_> = reports
            .files
            .iter()
            .cloned()
            .map(|path| {
                let staging_dir = self.staging_dir.clone();
                let date = date.clone();
                let cancel = self.cancel.clone();
                tokio::task::spawn_blocking(move || {
                    scan_report_file(&path, &staging_dir, &date, &cancel)
                })
            })
            .collect();

        let mut outcome =
            ScanOutcome { date, sessions: Vec::new(), orbats: Vec::new(), failures: Vec::new() };

        for (path, joined) in reports.files.iter().zip(join_all(handles).await) {
            match joined {
                Ok(Ok(scan)) => {
                    outcome.sessions.extend(scan.sessions);
                    outcome.orbats.extend(scan.orbats);
                    outcome.failures.extend(scan.failures);
                }
                Ok(Err(ReportError::Cancelled)) => return Err(ReportError::Cancelled),
                Ok(Err(error)) => warn!("skipping report file {}: {}", path.display(), error),
                Err(join_error) => {
                    warn!("scan worker for {} died: {}", path.display(), join_error)
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Err(ReportError::Cancelled);
        }
        info!(
            "scan complete: {} session(s), {} org chart(s)",
            outcome.sessions.len(),
            outcome.orbats.len()
        );
        Ok(outcome)
    }

    /// Assembly stage: build a timeline per retained session, one worker
    /// per session, and join results in input order.
    ///
    /// Excluded sessions are never assembled; their staging files are
    /// discarded here. A session that fails assembly is reported by
    /// identifier and omitted while its siblings complete.
    pub async fn assemble(&self, scan: ScanOutcome) -> Result<ConversionOutcome> {
        let ScanOutcome { date, sessions, orbats, mut failures } = scan;

        let (retained, excluded): (Vec<_>, Vec<_>) =
            sessions.into_iter().partition(|d| d.session.included);
        for discovered in excluded {
            debug!("session '{}' excluded, discarding staging", discovered.session.id);
            discovered.staging.discard();
        }

        let handles: Vec<_> = retained
            .into_iter()
            .map(|discovered| {
                let cancel = self.cancel.clone();
                tokio::task::spawn_blocking(move || {
                    let DiscoveredSession { session, staging } = discovered;
                    let classifier = LineClassifier::new();
                    let result =
                        TimelineAssembler::new(&classifier).assemble(&session, staging, &cancel);
                    (session.id, result)
                })
            })
            .collect();

        let mut timelines = Vec::new();
        for joined in join_all(handles).await {
            match joined {
                Ok((_, Ok(timeline))) => timelines.push(timeline),
                Ok((_, Err(ReportError::Cancelled))) => return Err(ReportError::Cancelled),
                Ok((session_id, Err(error))) => {
                    warn!("session '{session_id}' failed during assembly: {error}");
                    failures.push(SessionFailure { session_id, error });
                }
                Err(join_error) => warn!("assembly worker died: {join_error}"),
            }
        }

        if self.cancel.is_cancelled() {
            return Err(ReportError::Cancelled);
        }
        info!("assembly complete: {} timeline(s)", timelines.len());
        Ok(ConversionOutcome { date, timelines, orbats, failures })
    }

    /// Full pipeline: scan, selection callback, assembly.
    pub async fn run<F>(&self, report_dir: &Path, select: F) -> Result<ConversionOutcome>
    where
        F: FnOnce(&mut ScanOutcome),
    {
        let mut scan = self.scan(report_dir).await?;
        select(&mut scan);
        self.assemble(scan).await
    }
}

/// Scan one report file: classify lines, buffer session data, collect org
/// charts. Runs on the blocking pool.
fn scan_report_file(
    path: &Path,
    staging_dir: &Path,
    date: &str,
    cancel: &CancellationToken,
) -> Result<FileScan> {
    info!("scanning report file {}", path.display());
    let file = File::open(path).map_err(|e| ReportError::report_io(path, e))?;
    let reader = BufReader::new(file);

    let classifier = LineClassifier::new();
    let mut registry = SessionRegistry::new(staging_dir, date);
    let mut orbats = OrbatBuilder::new();

    for line in reader.lines() {
        if cancel.is_cancelled() {
            return Err(ReportError::Cancelled);
        }
        let line = line.map_err(|e| ReportError::report_io(path, e))?;

        if classifier.is_session_tagged(&line) {
            if classifier.is_session_meta(&line) {
                match classifier.parse_session_meta(&line) {
                    Ok(meta) => registry.on_session_meta(meta),
                    Err(error) => {
                        let hint = classifier.session_hint(&line).unwrap_or("unknown");
                        registry.on_malformed_session_meta(hint, error);
                    }
                }
            } else {
                // Pass-through: the staging buffer stores the raw line
                // uninterpreted; structure is given in the assembly pass.
                registry.on_data_line(&line);
            }
            continue;
        }

        match classifier.classify(&line) {
            Ok(LineClass::OrbatMeta { mission }) => orbats.on_meta(mission),
            Ok(LineClass::OrbatData { payload }) => orbats.on_data(&payload),
            Ok(_) => {}
            Err(error) => warn!("unclassifiable line in {}: {}", path.display(), error),
        }
    }

    let (sessions, failures) = registry.finish();
    Ok(FileScan { sessions, orbats: orbats.finish(), failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;

    fn write_report(dir: &Path, name: &str, lines: &[&str]) -> Result<PathBuf> {
        let path = dir.join(name);
        fs::write(&path, lines.join("\n"))?;
        Ok(path)
    }

    #[test]
    fn file_date_reads_plain_and_arch_tagged_names() {
        let (date, token) = file_date("server_2024-03-14_21-08-33.rpt").unwrap();
        assert_eq!(token, "2024-03-14");
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());

        let (_, token) = file_date("server_x64_2024-03-15_09-00-00.rpt").unwrap();
        assert_eq!(token, "2024-03-15");

        assert!(file_date("server.rpt").is_none());
        assert!(file_date("notes_today.rpt").is_none());
    }

    #[test]
    fn discovery_selects_every_file_of_the_latest_date() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_report(dir.path(), "server_2024-03-13_20-00-00.rpt", &[])?;
        let b = write_report(dir.path(), "server_2024-03-14_18-00-00.rpt", &[])?;
        let c = write_report(dir.path(), "server_2024-03-14_21-30-00.rpt", &[])?;
        write_report(dir.path(), "readme.txt", &[])?;

        let reports = discover_reports(dir.path())?;
        assert_eq!(reports.date, "2024-03-14");
        assert_eq!(reports.files, vec![b, c]);
        Ok(())
    }

    #[test]
    fn discovery_fails_without_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let error = discover_reports(dir.path()).unwrap_err();
        assert!(matches!(error, ReportError::Discovery { .. }));

        let missing = dir.path().join("nope");
        let error = discover_reports(&missing).unwrap_err();
        assert!(matches!(error, ReportError::Discovery { .. }));
    }

    #[tokio::test]
    async fn scan_and_assemble_across_files_preserves_order() -> Result<()> {
        let logs = tempfile::tempdir()?;
        let staging = tempfile::tempdir()?;

        write_report(
            logs.path(),
            "server_2024-03-14_18-00-00.rpt",
            &[
                r#"<AAR-early><meta><core>{ ""island"": ""isleA"", ""name"": ""Early"", ""guid"": ""early"", ""summary"": """" }</core></meta></AAR-early>"#,
                "<AAR-early><0><unit>[0,1,2]</unit></0></AAR-early>",
            ],
        )?;
        write_report(
            logs.path(),
            "server_2024-03-14_21-30-00.rpt",
            &[
                r#"12:33:43.934 "[tS_ORBAT] Meta: Late Op""#,
                r#"12:33:43.934 "[tS_ORBAT] [""BLUFOR"",""Razor"",""SL"",""SERGEANT"",""Nick""]""#,
                r#"<AAR-late><meta><core>{ ""island"": ""isleB"", ""name"": ""Late"", ""guid"": ""late"", ""summary"": """" }</core></meta></AAR-late>"#,
                "<AAR-late><1><veh>[5,5,5]</veh></1></AAR-late>",
            ],
        )?;

        let orchestrator = Orchestrator::new(staging.path());
        let outcome = orchestrator.run(logs.path(), |_| {}).await?;

        assert_eq!(outcome.date, "2024-03-14");
        let names: Vec<&str> =
            outcome.timelines.iter().map(|t| t.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["Early", "Late"]);
        assert_eq!(outcome.orbats.len(), 1);
        assert_eq!(outcome.orbats[0].mission, "Late Op");
        assert!(outcome.failures.is_empty());

        // Frame gap fill happened for the second session (index 1 only).
        assert_eq!(outcome.timelines[1].frames.len(), 2);
        assert!(outcome.timelines[1].frames[0].is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn excluded_sessions_are_not_assembled_and_leave_no_staging() -> Result<()> {
        let logs = tempfile::tempdir()?;
        let staging = tempfile::tempdir()?;

        write_report(
            logs.path(),
            "server_2024-03-14_18-00-00.rpt",
            &[
                r#"<AAR-m1><meta><core>{ ""island"": ""isleA"", ""name"": ""Keep"", ""guid"": ""m1"", ""summary"": """" }</core></meta></AAR-m1>"#,
                "<AAR-m1><0><unit>[0]</unit></0></AAR-m1>",
                r#"<AAR-m2><meta><core>{ ""island"": ""isleA"", ""name"": ""Drop"", ""guid"": ""m2"", ""summary"": """" }</core></meta></AAR-m2>"#,
                "<AAR-m2><0><unit>[1]</unit></0></AAR-m2>",
            ],
        )?;

        let orchestrator = Orchestrator::new(staging.path());
        let outcome = orchestrator
            .run(logs.path(), |scan| {
                assert!(scan.exclude_session("m2"));
                assert!(!scan.exclude_session("missing"));
            })
            .await?;

        let names: Vec<&str> =
            outcome.timelines.iter().map(|t| t.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["Keep"]);

        // No staging files survive, neither assembled nor excluded ones.
        assert_eq!(fs::read_dir(staging.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_session_is_reported_and_siblings_survive() -> Result<()> {
        let logs = tempfile::tempdir()?;
        let staging = tempfile::tempdir()?;

        write_report(
            logs.path(),
            "server_2024-03-14_18-00-00.rpt",
            &[
                r#"<AAR-good><meta><core>{ ""island"": ""isleA"", ""name"": ""Good"", ""guid"": ""good"", ""summary"": """" }</core></meta></AAR-good>"#,
                "<AAR-good><0><unit>[0]</unit></0></AAR-good>",
                r#"<AAR-bad><meta><core>{ ""island"": ""isleA"", ""name"": ""Bad"", ""guid"": ""bad"", ""summary"": """" }</core></meta></AAR-bad>"#,
                "<AAR-bad><0><unit>[0,</unit></0></AAR-bad>",
            ],
        )?;

        let orchestrator = Orchestrator::new(staging.path());
        let outcome = orchestrator.run(logs.path(), |_| {}).await?;

        let names: Vec<&str> =
            outcome.timelines.iter().map(|t| t.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["Good"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].session_id, "bad");
        assert_eq!(fs::read_dir(staging.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_aborts_and_removes_staging() -> Result<()> {
        let logs = tempfile::tempdir()?;
        let staging = tempfile::tempdir()?;

        write_report(
            logs.path(),
            "server_2024-03-14_18-00-00.rpt",
            &[
                r#"<AAR-m1><meta><core>{ ""island"": ""isleA"", ""name"": ""Op"", ""guid"": ""m1"", ""summary"": """" }</core></meta></AAR-m1>"#,
                "<AAR-m1><0><unit>[0]</unit></0></AAR-m1>",
            ],
        )?;

        let orchestrator = Orchestrator::new(staging.path());
        orchestrator.cancellation_token().cancel();

        let error = orchestrator.scan(logs.path()).await.unwrap_err();
        assert!(matches!(error, ReportError::Cancelled));
        assert_eq!(fs::read_dir(staging.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn orphaned_frame_lines_do_not_fail_the_scan() -> Result<()> {
        let logs = tempfile::tempdir()?;
        let staging = tempfile::tempdir()?;

        write_report(
            logs.path(),
            "server_2024-03-14_18-00-00.rpt",
            &[
                "<AAR-stale><5><unit>[9]</unit></5></AAR-stale>",
                r#"<AAR-m1><meta><core>{ ""island"": ""isleA"", ""name"": ""Op"", ""guid"": ""m1"", ""summary"": """" }</core></meta></AAR-m1>"#,
                "<AAR-m1><0><unit>[0]</unit></0></AAR-m1>",
            ],
        )?;

        let orchestrator = Orchestrator::new(staging.path());
        let outcome = orchestrator.run(logs.path(), |_| {}).await?;

        assert_eq!(outcome.timelines.len(), 1);
        assert_eq!(outcome.timelines[0].frames.len(), 1);
        Ok(())
    }
}
