//! Session model and per-file scan state.
//!
//! A [`Session`] is pure data describing one recorded mission instance; the
//! file handle buffering its raw lines lives separately in
//! [`staging::StagingWriter`] so resource cleanup never depends on where the
//! value travels. [`registry::SessionRegistry`] pairs the two during the
//! scan pass.

pub mod registry;
pub mod staging;

pub use registry::{DiscoveredSession, SessionRegistry};
pub use staging::{StagingFile, StagingWriter, FLUSH_EVERY};

use crate::classifier::SessionMeta;
use crate::ReportError;

/// One recorded mission instance discovered in a report log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Unique identifier from the log.
    pub id: String,
    /// Mission display name.
    pub name: String,
    /// Terrain/map identifier.
    pub terrain: String,
    /// Free-text summary.
    pub summary: String,
    /// Wall-clock label of the discovery line.
    pub label: String,
    /// Calendar date token of the owning report file.
    pub date: String,
    /// Whether the session takes part in assembly. Defaults to included;
    /// the selection step may flip it before assembly starts.
    pub included: bool,
    /// Raw lines buffered during the scan pass, usable as a capacity hint.
    pub buffered_lines: usize,
}

impl Session {
    /// Build a session from its classified metadata line.
    pub fn from_meta(meta: SessionMeta, date: &str) -> Self {
        Self {
            id: meta.id,
            name: meta.name,
            terrain: meta.terrain,
            summary: meta.summary,
            label: meta.label,
            date: date.to_string(),
            included: true,
            buffered_lines: 0,
        }
    }

    /// One-line description for selection listings.
    pub fn describe(&self) -> String {
        format!("{} \u{25b8} {} \u{25b8} {} ({})", self.label, self.name, self.terrain, self.summary)
    }
}

/// A session that failed during scanning or assembly, reported by
/// identifier and omitted from the output set.
#[derive(Debug)]
pub struct SessionFailure {
    pub session_id: String,
    pub error: ReportError,
}
