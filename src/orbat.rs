//! Organizational chart (ORBAT) builder.
//!
//! Org chart lines are a separate, simpler class of log lines, handled
//! independently of session state: a `Meta` line opens a new chart named by
//! mission, and each data line contributes one unit tuple
//! `[faction, group, role, rank, name]`. Units are grouped faction → group
//! in first-seen order, and a leadership roster is derived from ranks as the
//! chart grows.
//!
//! The builder is additive and lenient: a tuple that fails to parse is
//! skipped with a warning, and data arriving before any chart metadata is
//! dropped. Nothing here can fail a session or the run.

use serde::Serialize;
use tracing::{info, warn};

const RANK_PRIVATE: &str = "PRIVATE";
const RANK_CORPORAL: &str = "CORPORAL";
const RANK_SERGEANT: &str = "SERGEANT";

/// One mission's organizational chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Orbat {
    pub mission: String,
    pub leaders: OrbatLeaders,
    pub sides: Vec<OrbatSide>,
}

/// Leadership roster derived from unit ranks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrbatLeaders {
    #[serde(rename = "HQ")]
    pub hq: Vec<OrbatLeader>,
    pub squad_leaders: Vec<OrbatLeader>,
    pub team_leaders: Vec<OrbatLeader>,
}

/// One faction of a chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrbatSide {
    pub name: String,
    pub groups: Vec<OrbatGroup>,
}

/// One group within a faction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrbatGroup {
    pub name: String,
    pub units: Vec<OrbatUnit>,
}

/// One unit slot of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrbatUnit {
    pub role: String,
    pub rank: String,
    pub name: String,
}

/// One leadership roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrbatLeader {
    pub group: String,
    pub role: String,
    pub name: String,
}

/// Accumulates org charts from classified org chart lines.
#[derive(Debug, Default)]
pub struct OrbatBuilder {
    orbats: Vec<Orbat>,
    orphaned_lines: usize,
}

impl OrbatBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new chart for a mission.
    pub fn on_meta(&mut self, mission: impl Into<String>) {
        let mission = mission.into();
        info!("discovered org chart for mission '{mission}'");
        self.orbats.push(Orbat {
            mission,
            leaders: OrbatLeaders::default(),
            sides: Vec::new(),
        });
    }

    /// Add one unit tuple to the most recently opened chart.
    pub fn on_data(&mut self, payload: &str) {
        if self.orbats.is_empty() {
            self.orphaned_lines += 1;
            warn!("org chart data with no chart metadata yet, dropping line");
            return;
        }

        let (faction, group, role, rank, name) =
            match serde_json::from_str::<(String, String, String, String, String)>(payload) {
                Ok(tuple) => tuple,
                Err(e) => {
                    warn!("skipping unparseable org chart tuple: {e}");
                    return;
                }
            };

        let Some(orbat) = self.orbats.last_mut() else {
            return;
        };
        orbat.add_unit(&faction, &group, OrbatUnit { role, rank, name });
    }

    /// Yield every chart in discovery order.
    pub fn finish(self) -> Vec<Orbat> {
        if self.orphaned_lines > 0 {
            warn!("dropped {} orphaned org chart lines", self.orphaned_lines);
        }
        self.orbats
    }
}

impl Orbat {
    fn add_unit(&mut self, faction: &str, group_name: &str, unit: OrbatUnit) {
        let side_idx = match self.sides.iter().position(|s| s.name == faction) {
            Some(idx) => idx,
            None => {
                self.sides.push(OrbatSide { name: faction.to_string(), groups: Vec::new() });
                self.sides.len() - 1
            }
        };
        let side = &mut self.sides[side_idx];

        let group_idx = match side.groups.iter().position(|g| g.name == group_name) {
            Some(idx) => idx,
            None => {
                side.groups.push(OrbatGroup { name: group_name.to_string(), units: Vec::new() });
                side.groups.len() - 1
            }
        };
        let group = &mut side.groups[group_idx];

        let leader = OrbatLeader {
            group: group.name.clone(),
            role: unit.role.clone(),
            name: unit.name.clone(),
        };

        // Rank tiers; anything above sergeant (or unrecognized) counts as HQ.
        match unit.rank.as_str() {
            RANK_PRIVATE => {}
            RANK_CORPORAL => self.leaders.team_leaders.push(leader),
            RANK_SERGEANT => self.leaders.squad_leaders.push(leader),
            _ => self.leaders.hq.push(leader),
        }
        group.units.push(unit);
    }
}
