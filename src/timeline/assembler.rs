//! Second-pass assembly of a session's buffered lines into a timeline.
//!
//! The scan pass stored every session-tagged data line uninterpreted; this
//! pass replays the staging file sequentially and gives each line its
//! structure. Object metadata accumulates into the unit/vehicle rosters
//! (playable units additionally join the deduplicated player roster), frame
//! data lands in its indexed frame, and missing indices are synthesized as
//! empty frames so the sequence never has gaps.
//!
//! On success the staging file is discarded — the raw lines are not retained
//! after assembly. Any parse error is fatal for the owning session only and
//! never stalls sibling sessions assembling concurrently.

use std::collections::HashSet;
use std::io::BufRead;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use crate::classifier::{LineClass, LineClassifier, ObjectKind};
use crate::session::{Session, StagingFile};
use crate::timeline::{Frame, ObjectRoster, PlayerEntry, RawRecord, Timeline, TimelineMetadata};
use crate::{ReportError, Result};

/// Unit identity tuple: id, display name, faction, playable flag.
#[derive(Debug, Deserialize)]
struct UnitMeta(#[allow(dead_code)] i64, String, String, i64);

/// Replays one session's staging file into a [`Timeline`].
pub struct TimelineAssembler<'a> {
    classifier: &'a LineClassifier,
}

impl<'a> TimelineAssembler<'a> {
    pub fn new(classifier: &'a LineClassifier) -> Self {
        Self { classifier }
    }

    /// Assemble the timeline for a session from its staged lines.
    ///
    /// The staging file is removed on every exit path: discarded explicitly
    /// after a successful pass, dropped (and thereby removed) on failure or
    /// cancellation.
    pub fn assemble(
        &self,
        session: &Session,
        staging: StagingFile,
        cancel: &CancellationToken,
    ) -> Result<Timeline> {
        let reader = staging.open_reader()?;

        let mut players: Vec<PlayerEntry> = Vec::new();
        let mut seen_names: HashSet<String> = HashSet::new();
        let mut objects = ObjectRoster::default();
        let mut frames: Vec<Frame> = Vec::with_capacity(staging.lines() / 2 + 1);

        for line in reader.lines() {
            if cancel.is_cancelled() {
                return Err(ReportError::Cancelled);
            }
            let line = line.map_err(|e| ReportError::buffer_failure(&session.id, e))?;

            match self.classifier.classify(&line)? {
                LineClass::ObjectMeta { kind: ObjectKind::Unit, payload } => {
                    let UnitMeta(_, name, faction, playable) = serde_json::from_str(&payload)
                        .map_err(|e| {
                            ReportError::malformed_payload("unit metadata", e.to_string())
                        })?;

                    // First occurrence of a player name wins, whatever
                    // faction later lines claim for it.
                    if playable == 1 && seen_names.insert(name.clone()) {
                        players.push(PlayerEntry(name, faction));
                    }
                    objects.units.push(RawRecord::new(payload, "unit metadata")?);
                }
                LineClass::ObjectMeta { kind: ObjectKind::Vehicle, payload } => {
                    objects.vehicles.push(RawRecord::new(payload, "vehicle metadata")?);
                }
                LineClass::Frame { index, kind, payload, .. } => {
                    let record = RawRecord::new(payload, "frame data")?;
                    if frames.len() <= index {
                        // Gap fill: indices never seen become empty frames.
                        frames.resize_with(index + 1, Frame::default);
                    }
                    frames[index].push(kind, record);
                }
                other => {
                    trace!("skipping staged line outside the frame grammar: {other:?}");
                }
            }
        }

        let duration = frames.len() as i64 - 1;
        let timeline = Timeline {
            metadata: TimelineMetadata {
                terrain: session.terrain.clone(),
                name: session.name.clone(),
                duration,
                date: session.date.clone(),
                summary: session.summary.clone(),
                players,
                objects,
            },
            frames,
        };

        info!(
            "assembled timeline '{}': {} frames, {} players",
            session.id,
            timeline.frames.len(),
            timeline.player_count()
        );
        staging.discard();
        Ok(timeline)
    }
}
