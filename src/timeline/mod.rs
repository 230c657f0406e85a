//! Replay timeline output model.
//!
//! The timeline is what the external viewer consumes: session metadata, the
//! object/player rosters and one entry per animation frame. Leaf payloads
//! stay exactly as they appeared in the log — [`RawRecord`] validates that a
//! payload is structurally well-formed JSON once, then embeds the original
//! text verbatim at serialization time. Nothing is re-encoded, so the
//! produced file reproduces the source payload bytes inside the surrounding
//! array/object syntax.

pub mod assembler;

pub use assembler::TimelineAssembler;

use serde::ser::{Serialize, SerializeTuple, Serializer};
use serde_json::value::RawValue;

use crate::classifier::FrameKind;
use crate::{ReportError, Result};

/// An opaque, pre-formatted payload embedded verbatim into the output.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(transparent)]
pub struct RawRecord(Box<RawValue>);

impl RawRecord {
    /// Validate and wrap a payload.
    ///
    /// The envelope around the payload already matched, so text that fails
    /// the structural check here is a malformed payload, fatal to the
    /// owning session.
    pub fn new(payload: impl Into<String>, context: &str) -> Result<Self> {
        RawValue::from_string(payload.into())
            .map(Self)
            .map_err(|e| ReportError::malformed_payload(context, e.to_string()))
    }

    /// The embedded payload text.
    pub fn get(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for RawRecord {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

/// A deduplicated player roster entry, serialized as `[name, faction]`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PlayerEntry(pub String, pub String);

impl PlayerEntry {
    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn faction(&self) -> &str {
        &self.1
    }
}

/// One discrete replay tick.
///
/// Serializes as the 3-tuple `[units, vehicles, attacks]`; arrival order is
/// preserved inside each list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub units: Vec<RawRecord>,
    pub vehicles: Vec<RawRecord>,
    pub attacks: Vec<RawRecord>,
}

impl Frame {
    /// Whether the frame carries no records at all.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.vehicles.is_empty() && self.attacks.is_empty()
    }

    /// Append a record to the list matching its kind.
    pub fn push(&mut self, kind: FrameKind, record: RawRecord) {
        match kind {
            FrameKind::Unit => self.units.push(record),
            FrameKind::Vehicle => self.vehicles.push(record),
            FrameKind::Attack => self.attacks.push(record),
        }
    }
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.units)?;
        tuple.serialize_element(&self.vehicles)?;
        tuple.serialize_element(&self.attacks)?;
        tuple.end()
    }
}

/// Static unit/vehicle identities collected during assembly.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ObjectRoster {
    pub units: Vec<RawRecord>,
    #[serde(rename = "vehs")]
    pub vehicles: Vec<RawRecord>,
}

/// Session-level metadata of an assembled timeline.
///
/// Field names follow the viewer's file format.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TimelineMetadata {
    #[serde(rename = "island")]
    pub terrain: String,
    pub name: String,
    #[serde(rename = "time")]
    pub duration: i64,
    pub date: String,
    #[serde(rename = "desc")]
    pub summary: String,
    pub players: Vec<PlayerEntry>,
    pub objects: ObjectRoster,
}

/// A fully assembled replay: metadata plus the ordered frame sequence.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Timeline {
    pub metadata: TimelineMetadata,
    #[serde(rename = "timeline")]
    pub frames: Vec<Frame>,
}

impl Timeline {
    /// Replay duration in ticks: one less than the frame count.
    pub fn duration(&self) -> i64 {
        self.metadata.duration
    }

    /// Distinct player names seen in this session.
    pub fn player_count(&self) -> usize {
        self.metadata.players.len()
    }

    /// Serialize to the viewer's JSON representation.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            ReportError::malformed_payload(
                format!("timeline '{}'", self.metadata.name),
                e.to_string(),
            )
        })
    }
}
