//! Line classification over the report log grammar.
//!
//! Report logs interleave output from several producers. Each line of
//! interest wraps its payload in a fixed nested-tag envelope:
//!
//! - session metadata: `<AAR-id><meta><core>{ .. }</core></meta></AAR-id>`
//! - object metadata:  `<AAR-id><meta><unit>{ ""unitMeta"": [..] }</unit></meta></AAR-id>`
//! - frame data:       `<AAR-id><42><unit>[..]</unit></42></AAR-id>`
//! - org chart:        `"[tS_ORBAT] Meta: .."` and `"[tS_ORBAT] [..]"`
//!
//! Embedded JSON doubles its internal quotes (`""`); they are collapsed back
//! to single quotes exactly once before any structural parsing. The
//! categories are mutually exclusive by structure, so match order only
//! matters for performance: the envelope test rejects unrelated log lines
//! cheaply before any payload work happens.
//!
//! Classification is pure. A [`LineClassifier`] owns its compiled patterns
//! and holds no other state, so each worker constructs its own instance and
//! nothing is shared across concurrent scans.

use serde::Deserialize;

use regex::Regex;

use crate::{ReportError, Result};

/// Matches any session-tagged line and captures the envelope token.
const SESSION_TAG_PATTERN: &str = "<AAR-([^>]*)>";

/// Cheap marker distinguishing session metadata from other session lines.
const SESSION_META_MARKER: &str = "<meta><core>";

/// Full session metadata line: optional wall-clock label, then the envelope
/// wrapping a `<meta><core>` block.
const SESSION_META_PATTERN: &str = r#"(?:(.*) ")?<AAR-[^>]*><meta><core>(.*)</core>"#;

/// Object metadata line: a `<meta>` block wrapping a typed `unit`/`veh` leaf.
const OBJECT_META_PATTERN: &str =
    r#"<meta><(unit|veh)>\{ ""(?:unit|veh)Meta"": (.*) \}</(?:unit|veh)>"#;

/// Frame data line: a decimal frame index wrapping a typed leaf.
const FRAME_DATA_PATTERN: &str = r#"<AAR-([^>]*)><([0-9]+)><(unit|veh|av)>(.*)</(?:unit|veh|av)>"#;

/// Org chart metadata line (mission name).
const ORBAT_META_PATTERN: &str = r#""\[tS_ORBAT\] Meta: (.*)""#;

/// Org chart data line (one unit tuple).
const ORBAT_DATA_PATTERN: &str = r#""\[tS_ORBAT\] (\[.*\])""#;

/// Collapse the log's doubled internal quotes to single quotes.
///
/// Applied exactly once per payload, before any structural parsing.
pub fn collapse_quotes(payload: &str) -> String {
    payload.replace("\"\"", "\"")
}

/// Object metadata kind inside a `<meta>` wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Unit,
    Vehicle,
}

impl ObjectKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "unit" => Some(ObjectKind::Unit),
            "veh" => Some(ObjectKind::Vehicle),
            _ => None,
        }
    }
}

/// Frame record kind inside a frame-index wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Unit,
    Vehicle,
    Attack,
}

impl FrameKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "unit" => Some(FrameKind::Unit),
            "veh" => Some(FrameKind::Vehicle),
            "av" => Some(FrameKind::Attack),
            _ => None,
        }
    }
}

/// Session metadata extracted from a `<meta><core>` line.
///
/// Field aliases tolerate the capitalization drift seen in real logs
/// (`"Name"` next to `"island"` in the same core block).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionMeta {
    /// Unique session identifier.
    #[serde(alias = "guid", alias = "Guid")]
    pub id: String,

    /// Mission display name.
    #[serde(default, alias = "name", alias = "Name")]
    pub name: String,

    /// Terrain/map identifier.
    #[serde(default, alias = "island", alias = "Island")]
    pub terrain: String,

    /// Free-text mission summary.
    #[serde(default, alias = "summary", alias = "Summary")]
    pub summary: String,

    /// Wall-clock label preceding the envelope, when present.
    #[serde(skip)]
    pub label: String,
}

/// Result of classifying one raw log line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineClass {
    /// Opens a new session.
    SessionMeta(SessionMeta),

    /// Static identity of a unit or vehicle, owned by the current session.
    ObjectMeta { kind: ObjectKind, payload: String },

    /// One record for a frame index of the session named by the envelope.
    Frame { session_hint: String, index: usize, kind: FrameKind, payload: String },

    /// Opens a new org chart.
    OrbatMeta { mission: String },

    /// One org chart unit tuple.
    OrbatData { payload: String },

    /// Not part of any recognized grammar.
    Irrelevant,
}

/// Stateless classifier over the report line grammar.
///
/// Compiled patterns are owned per instance; workers never share one.
#[derive(Debug)]
pub struct LineClassifier {
    session_tag: Regex,
    session_meta: Regex,
    object_meta: Regex,
    frame_data: Regex,
    orbat_meta: Regex,
    orbat_data: Regex,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LineClassifier {
    /// Compile the line grammar.
    pub fn new() -> Self {
        Self {
            session_tag: compile(SESSION_TAG_PATTERN),
            session_meta: compile(SESSION_META_PATTERN),
            object_meta: compile(OBJECT_META_PATTERN),
            frame_data: compile(FRAME_DATA_PATTERN),
            orbat_meta: compile(ORBAT_META_PATTERN),
            orbat_data: compile(ORBAT_DATA_PATTERN),
        }
    }

    /// Whether the line carries a session envelope at all.
    pub fn is_session_tagged(&self, line: &str) -> bool {
        self.session_tag.is_match(line)
    }

    /// Whether a session-tagged line is a session metadata line.
    pub fn is_session_meta(&self, line: &str) -> bool {
        line.contains(SESSION_META_MARKER)
    }

    /// The session token named by the line's envelope, when present.
    pub fn session_hint<'l>(&self, line: &'l str) -> Option<&'l str> {
        self.session_tag.captures(line).and_then(|caps| caps.get(1)).map(|m| m.as_str())
    }

    /// Classify one raw log line.
    ///
    /// Returns [`LineClass::Irrelevant`] for lines outside the grammar.
    /// A line whose envelope matched but whose payload is not well-formed
    /// fails with [`ReportError::MalformedPayload`].
    pub fn classify(&self, line: &str) -> Result<LineClass> {
        if self.is_session_tagged(line) {
            if self.is_session_meta(line) {
                return Ok(LineClass::SessionMeta(self.parse_session_meta(line)?));
            }

            if let Some(caps) = self.object_meta.captures(line) {
                let kind = ObjectKind::from_tag(&caps[1]).ok_or_else(|| {
                    ReportError::malformed_payload("object metadata", "unrecognized object tag")
                })?;
                let payload = collapse_quotes(caps[2].trim());
                return Ok(LineClass::ObjectMeta { kind, payload });
            }

            if let Some(caps) = self.frame_data.captures(line) {
                let session_hint = caps[1].to_string();
                let index: usize = caps[2].parse().map_err(|_| {
                    ReportError::malformed_payload("frame data", "frame index out of range")
                })?;
                let kind = FrameKind::from_tag(&caps[3]).ok_or_else(|| {
                    ReportError::malformed_payload("frame data", "unrecognized frame tag")
                })?;
                let payload = collapse_quotes(caps[4].trim());
                return Ok(LineClass::Frame { session_hint, index, kind, payload });
            }

            // Session-tagged noise with no recognizable inner structure.
            return Ok(LineClass::Irrelevant);
        }

        if let Some(caps) = self.orbat_meta.captures(line) {
            return Ok(LineClass::OrbatMeta { mission: caps[1].trim().to_string() });
        }

        if let Some(caps) = self.orbat_data.captures(line) {
            return Ok(LineClass::OrbatData { payload: collapse_quotes(&caps[1]) });
        }

        Ok(LineClass::Irrelevant)
    }

    /// Extract session metadata from a `<meta><core>` line.
    pub fn parse_session_meta(&self, line: &str) -> Result<SessionMeta> {
        let caps = self.session_meta.captures(line).ok_or_else(|| {
            ReportError::malformed_payload("session metadata", "core block did not match")
        })?;

        let label = caps.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
        let core = collapse_quotes(caps[2].trim());

        let mut meta: SessionMeta = serde_json::from_str(&core)
            .map_err(|e| ReportError::malformed_payload("session metadata core", e.to_string()))?;
        meta.label = label;
        Ok(meta)
    }
}

fn compile(pattern: &str) -> Regex {
    // The grammar is fixed at compile time; a rejected pattern is a defect in
    // this module, not a runtime condition.
    Regex::new(pattern).expect("line grammar pattern must compile")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> LineClassifier {
        LineClassifier::new()
    }

    #[test]
    fn classifies_session_metadata_without_label() {
        let line = r#"<AAR-m1><meta><core>{ ""island"": ""isleA"", ""Name"": ""Op1"", ""guid"": ""m1"", ""summary"": ""test"" }</core></meta></AAR-m1>"#;
        let class = classifier().classify(line).unwrap();

        let LineClass::SessionMeta(meta) = class else {
            panic!("expected session metadata, got {class:?}");
        };
        assert_eq!(meta.id, "m1");
        assert_eq!(meta.name, "Op1");
        assert_eq!(meta.terrain, "isleA");
        assert_eq!(meta.summary, "test");
        assert_eq!(meta.label, "");
    }

    #[test]
    fn classifies_session_metadata_with_wall_clock_label() {
        let line = r#"2024/03/14, 21:10:45 "<AAR-co16_west><meta><core>{ ""island"": ""Altis"", ""name"": ""CO16 Western"", ""guid"": ""co16_west"", ""summary"": ""late push"" }</core></meta></AAR-co16_west>""#;
        let class = classifier().classify(line).unwrap();

        let LineClass::SessionMeta(meta) = class else {
            panic!("expected session metadata, got {class:?}");
        };
        assert_eq!(meta.id, "co16_west");
        assert_eq!(meta.label, "2024/03/14, 21:10:45");
    }

    #[test]
    fn classifies_unit_object_metadata() {
        let line = r#"<AAR-m1><meta><unit>{ ""unitMeta"": [0,""Alice"",""blufor"",1] }</unit></meta></AAR-m1>"#;
        let class = classifier().classify(line).unwrap();

        assert_eq!(
            class,
            LineClass::ObjectMeta {
                kind: ObjectKind::Unit,
                payload: r#"[0,"Alice","blufor",1]"#.to_string(),
            }
        );
    }

    #[test]
    fn classifies_vehicle_object_metadata() {
        let line = r#"<AAR-m1><meta><veh>{ ""vehMeta"": [5,""Quad Bike"",""east""] }</veh></meta></AAR-m1>"#;
        let class = classifier().classify(line).unwrap();

        assert_eq!(
            class,
            LineClass::ObjectMeta {
                kind: ObjectKind::Vehicle,
                payload: r#"[5,"Quad Bike","east"]"#.to_string(),
            }
        );
    }

    #[test]
    fn classifies_frame_data_for_each_kind() {
        let cases = [
            ("unit", FrameKind::Unit),
            ("veh", FrameKind::Vehicle),
            ("av", FrameKind::Attack),
        ];
        for (tag, kind) in cases {
            let line = format!("<AAR-m1><421><{tag}>[10,0,0,0,1,513]</{tag}></421></AAR-m1>");
            let class = classifier().classify(&line).unwrap();
            assert_eq!(
                class,
                LineClass::Frame {
                    session_hint: "m1".to_string(),
                    index: 421,
                    kind,
                    payload: "[10,0,0,0,1,513]".to_string(),
                }
            );
        }
    }

    #[test]
    fn classifies_org_chart_lines() {
        let meta = r#"12:33:43.934 "[tS_ORBAT] Meta: CO16 Western""#;
        assert_eq!(
            classifier().classify(meta).unwrap(),
            LineClass::OrbatMeta { mission: "CO16 Western".to_string() }
        );

        let data = r#"12:33:43.934 "[tS_ORBAT] [""BLUFOR"",""Razor 1'1"",""FTL"",""CORPORAL"",""Nick""]""#;
        assert_eq!(
            classifier().classify(data).unwrap(),
            LineClass::OrbatData {
                payload: r#"["BLUFOR","Razor 1'1","FTL","CORPORAL","Nick"]"#.to_string()
            }
        );
    }

    #[test]
    fn rejects_unrelated_log_lines() {
        let classifier = classifier();
        for line in [
            "21:10:44 Mission read from bank.",
            "Error in expression <_veh setDamage 1>",
            "",
        ] {
            assert_eq!(classifier.classify(line).unwrap(), LineClass::Irrelevant);
            assert!(!classifier.is_session_tagged(line));
        }
    }

    #[test]
    fn malformed_session_core_is_fatal() {
        let line = r#"<AAR-m1><meta><core>{ ""island"": broken }</core></meta></AAR-m1>"#;
        let error = classifier().classify(line).unwrap_err();
        assert!(matches!(error, ReportError::MalformedPayload { .. }));
    }

    #[test]
    fn session_core_without_identifier_is_fatal() {
        let line = r#"<AAR-m1><meta><core>{ ""island"": ""isleA"" }</core></meta></AAR-m1>"#;
        let error = classifier().classify(line).unwrap_err();
        assert!(matches!(error, ReportError::MalformedPayload { .. }));
    }

    #[test]
    fn session_hint_reads_envelope_token() {
        let classifier = classifier();
        let line = "<AAR-m1><0><unit>[0,1,2]</unit></0></AAR-m1>";
        assert_eq!(classifier.session_hint(line), Some("m1"));
        assert_eq!(classifier.session_hint("plain text"), None);
    }

    #[test]
    fn collapse_quotes_collapses_exactly_once() {
        assert_eq!(collapse_quotes(r#"[0,""Alice""]"#), r#"[0,"Alice"]"#);
        // Four consecutive quotes encode two literal quotes.
        assert_eq!(collapse_quotes(r#"["""" ]"#), r#"["" ]"#);
        assert_eq!(collapse_quotes("[0,1]"), "[0,1]");
    }

    #[test]
    fn categories_are_mutually_exclusive() {
        // A frame line must not be taken for object metadata and vice versa.
        let classifier = classifier();
        let frame = "<AAR-m1><3><veh>[5,300,400,45,1,10,-1]</veh></3></AAR-m1>";
        assert!(matches!(classifier.classify(frame).unwrap(), LineClass::Frame { .. }));

        let object = r#"<AAR-m1><meta><veh>{ ""vehMeta"": [5,""Truck"",""east""] }</veh></meta></AAR-m1>"#;
        assert!(matches!(classifier.classify(object).unwrap(), LineClass::ObjectMeta { .. }));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn frame_lines_round_trip_for_arbitrary_sessions(
                id in "[a-zA-Z][a-zA-Z0-9_]{0,24}",
                index in 0usize..1_000_000usize,
                values in prop::collection::vec(-10_000i64..10_000i64, 1..8)
            ) {
                let payload = serde_json::to_string(&values).unwrap();
                let line = format!("<AAR-{id}><{index}><unit>{payload}</unit></{index}></AAR-{id}>");

                let class = LineClassifier::new().classify(&line).unwrap();
                prop_assert_eq!(class, LineClass::Frame {
                    session_hint: id,
                    index,
                    kind: FrameKind::Unit,
                    payload,
                });
            }

            #[test]
            fn doubled_quotes_collapse_preserves_everything_else(
                text in "[a-zA-Z0-9 ,:\\[\\]{}]*"
            ) {
                // Text without quotes is untouched.
                prop_assert_eq!(collapse_quotes(&text), text.clone());

                // Doubling then collapsing is the identity on quoted text.
                let quoted = format!("\"\"{text}\"\"");
                prop_assert_eq!(collapse_quotes(&quoted), format!("\"{text}\""));
            }
        }
    }
}
