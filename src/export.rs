//! Destination packaging for assembled artifacts.
//!
//! Writes what the external viewer consumes: one replay file per assembled
//! timeline under `<replay_dir>/aars/`, the org charts and their leadership
//! rosters under the ORBAT directory, and an updated viewer list file with
//! the freshly converted replays prepended. File names are derived from
//! session metadata with file-system-hostile characters replaced.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::info;

use crate::config::Config;
use crate::orbat::{Orbat, OrbatLeaders};
use crate::orchestrator::ConversionOutcome;
use crate::timeline::Timeline;
use crate::{ReportError, Result};

/// Prefix the viewer expects in front of a replay file's JSON body.
pub const REPLAY_DATA_PREFIX: &str = "aarFileData = ";

/// Subdirectory of the replay destination holding the replay files.
const REPLAY_SUBDIR: &str = "aars";

/// The viewer's replay list file.
const LIST_CONFIG_FILENAME: &str = "aarListConfig.ini";

/// Header line opening the replay list.
const LIST_CONFIG_HEADER: &str = "aarConfig = [";

/// Characters replaced by `_` in derived file names.
const SANITIZE_PATTERN: &str = r#"[\s:*?<>|\\/"]"#;

/// One entry of the viewer's replay list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayListEntry {
    pub date: String,
    pub title: String,
    pub terrain: String,
    pub link: String,
}

/// Leadership roster of one chart, exported standalone.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LeadersExport<'a> {
    mission: &'a str,
    leaders: &'a OrbatLeaders,
}

/// Paths written by a full export.
#[derive(Debug)]
pub struct ExportSummary {
    pub replays: Vec<PathBuf>,
    pub orbat: PathBuf,
    pub leaders: PathBuf,
    pub list: PathBuf,
}

/// Writes conversion results to their destination directories.
pub struct Exporter {
    replay_dir: PathBuf,
    orbat_dir: PathBuf,
    sanitizer: Regex,
}

impl Exporter {
    pub fn new(config: &Config) -> Self {
        Self {
            replay_dir: config.replay_dir.clone(),
            orbat_dir: config.orbat_dir.clone(),
            // Fixed character class; a rejected pattern is a defect here.
            sanitizer: Regex::new(SANITIZE_PATTERN).expect("sanitize pattern must compile"),
        }
    }

    /// Export every artifact of a conversion run and update the viewer
    /// list, newest replay first.
    pub fn export_all(&self, outcome: &ConversionOutcome) -> Result<ExportSummary> {
        let (orbat, leaders) = self.export_orbats(&outcome.date, &outcome.orbats)?;

        let mut replays = Vec::with_capacity(outcome.timelines.len());
        let mut entries = Vec::with_capacity(outcome.timelines.len());
        for timeline in &outcome.timelines {
            let (path, entry) = self.export_timeline(timeline)?;
            replays.push(path);
            entries.push(entry);
        }

        entries.reverse();
        let list = self.update_replay_list(&entries)?;

        Ok(ExportSummary { replays, orbat, leaders, list })
    }

    /// Write one replay file and return its viewer list entry.
    pub fn export_timeline(&self, timeline: &Timeline) -> Result<(PathBuf, ReplayListEntry)> {
        let meta = &timeline.metadata;
        let file_name = format!(
            "AAR.{}.{}.{}.json",
            meta.date,
            meta.terrain,
            self.sanitizer.replace_all(&meta.name, "_")
        );

        let dir = self.replay_dir.join(REPLAY_SUBDIR);
        fs::create_dir_all(&dir).map_err(|e| ReportError::export_failed(&dir, e))?;

        let path = dir.join(&file_name);
        let body = format!("{REPLAY_DATA_PREFIX}{}", timeline.to_json()?);
        fs::write(&path, body).map_err(|e| ReportError::export_failed(&path, e))?;
        info!("exported replay {}", path.display());

        let entry = ReplayListEntry {
            date: meta.date.clone(),
            title: meta.name.clone(),
            terrain: meta.terrain.clone(),
            link: format!("{REPLAY_SUBDIR}/{file_name}"),
        };
        Ok((path, entry))
    }

    /// Write the org charts and their leadership rosters.
    pub fn export_orbats(&self, date: &str, orbats: &[Orbat]) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(&self.orbat_dir)
            .map_err(|e| ReportError::export_failed(&self.orbat_dir, e))?;

        let chart_path = self.orbat_dir.join(format!("ORBAT.{date}.json"));
        let body = to_json_pretty(&orbats, &chart_path)?;
        fs::write(&chart_path, body).map_err(|e| ReportError::export_failed(&chart_path, e))?;
        info!("exported org charts to {}", chart_path.display());

        let rosters: Vec<LeadersExport<'_>> = orbats
            .iter()
            .map(|orbat| LeadersExport { mission: &orbat.mission, leaders: &orbat.leaders })
            .collect();
        let leaders_path = self.orbat_dir.join(format!("ORBAT.leaders.{date}.json"));
        let body = to_json_pretty(&rosters, &leaders_path)?;
        fs::write(&leaders_path, body)
            .map_err(|e| ReportError::export_failed(&leaders_path, e))?;
        info!("exported leadership rosters to {}", leaders_path.display());

        Ok((chart_path, leaders_path))
    }

    /// Prepend entries to the viewer's replay list, preserving whatever the
    /// list already held.
    ///
    /// The rewrite goes through a sibling temp file and a rename, so a
    /// half-written list never replaces the live one.
    pub fn update_replay_list(&self, entries: &[ReplayListEntry]) -> Result<PathBuf> {
        let path = self.replay_dir.join(LIST_CONFIG_FILENAME);
        let existing = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("replay list missing, starting a fresh one");
                String::new()
            }
            Err(e) => return Err(ReportError::export_failed(&path, e)),
        };

        let mut content = String::from(LIST_CONFIG_HEADER);
        content.push('\n');
        for entry in entries {
            let json = to_json_pretty(entry, &path)?;
            let json = String::from_utf8(json)
                .map_err(|e| ReportError::export_failed(&path, std::io::Error::other(e)))?;
            content.push_str("    ");
            content.push_str(&json.replace('\n', "\n    "));
            content.push_str(",\n");
        }

        // Everything below the old header line survives the rewrite.
        let mut old_lines = existing.lines();
        old_lines.next();
        for line in old_lines {
            content.push_str(line);
            content.push('\n');
        }

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &content).map_err(|e| ReportError::export_failed(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| ReportError::export_failed(&path, e))?;
        info!("updated replay list {}", path.display());
        Ok(path)
    }
}

/// Serialize with the list file's four-space indentation.
fn to_json_pretty<T: Serialize>(value: &T, path: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| ReportError::export_failed(path, std::io::Error::other(e)))?;
    Ok(buf)
}
