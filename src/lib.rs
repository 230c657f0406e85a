//! Offline converter for multiplayer session report logs.
//!
//! `debrief` ingests the line-oriented report files a dedicated server
//! writes during a play session and reconstructs two artifacts for the
//! external replay viewer:
//!
//! - a replay **timeline** per recorded session: indexed animation frames of
//!   unit/vehicle positions and combat events, with object and player
//!   metadata
//! - an organizational chart (**ORBAT**) per mission, grouping participants
//!   by faction, unit and role, with a derived leadership roster
//!
//! # Architecture
//!
//! Conversion runs as two fan-out stages. The scan stage reads every report
//! file of the latest calendar date concurrently; each worker classifies
//! lines and buffers its sessions' frame data to durable staging files, so
//! memory stays flat regardless of log size. After an optional selection
//! step, the assembly stage replays each retained session's staging file
//! concurrently into a structured timeline. Staging files are removed on
//! success, on failure and on interrupt alike.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use debrief::{Config, Debrief};
//!
//! #[tokio::main]
//! async fn main() -> debrief::Result<()> {
//!     let config = Config::load(Path::new("config.json"))?;
//!     let outcome = Debrief::convert(&config).await?;
//!     for timeline in &outcome.timelines {
//!         println!("{}: {} frames", timeline.metadata.name, timeline.frames.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod config;
mod error;
pub mod export;
pub mod orbat;
pub mod orchestrator;
pub mod session;
pub mod timeline;

// Core exports
pub use classifier::{FrameKind, LineClass, LineClassifier, ObjectKind, SessionMeta};
pub use config::Config;
pub use error::{ReportError, Result};
pub use export::{Exporter, ExportSummary, ReplayListEntry};
pub use orbat::{Orbat, OrbatBuilder};
pub use orchestrator::{ConversionOutcome, Orchestrator, ReportSet, ScanOutcome};
pub use session::{DiscoveredSession, Session, SessionFailure, SessionRegistry};
pub use timeline::{Frame, PlayerEntry, RawRecord, Timeline, TimelineAssembler};

/// Unified entry point for report conversions.
///
/// This facade wires the orchestrator together for the common cases; use
/// [`Orchestrator`] directly when you need to drive the scan and assembly
/// stages separately or supply your own cancellation token.
///
/// # Examples
///
/// ```rust,no_run
/// use std::path::Path;
///
/// use debrief::{Config, Debrief};
///
/// # #[tokio::main]
/// # async fn main() -> debrief::Result<()> {
/// let config = Config::load(Path::new("config.json"))?;
/// let outcome = Debrief::convert_with(&config, |scan| {
///     scan.exclude_session("warmup_mission");
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub struct Debrief;

impl Debrief {
    /// Convert every session found in the latest report files.
    pub async fn convert(config: &Config) -> Result<ConversionOutcome> {
        Self::convert_with(config, |_| {}).await
    }

    /// Convert with a selection step between discovery and assembly.
    ///
    /// The callback sees the ordered session list and may flip each
    /// session's inclusion flag; excluded sessions are never assembled.
    pub async fn convert_with<F>(config: &Config, select: F) -> Result<ConversionOutcome>
    where
        F: FnOnce(&mut ScanOutcome),
    {
        Orchestrator::new(config.resolve_staging_dir()).run(&config.report_dir, select).await
    }
}
