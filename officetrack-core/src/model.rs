//! Presence data model
//!
//! Observations and reports are transient values: produced on each trigger,
//! handed downstream, never retained. The allow-list is fixed for a run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Hardware id used when the interface MAC cannot be read
pub const UNKNOWN_HARDWARE_ID: &str = "unknown";

/// Username reported when no display name has been set
pub const UNKNOWN_DISPLAY_NAME: &str = "Unknown";

/// Three-valued presence classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    #[default]
    NotConnected,
    Inside,
    Outside,
}

impl PresenceState {
    /// Integer code stored in the remote `value` field
    pub fn code(self) -> u8 {
        match self {
            PresenceState::NotConnected => 0,
            PresenceState::Inside => 1,
            PresenceState::Outside => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PresenceState::NotConnected),
            1 => Some(PresenceState::Inside),
            2 => Some(PresenceState::Outside),
            _ => None,
        }
    }

    /// Human-readable line for status indicators
    pub fn description(self) -> &'static str {
        match self {
            PresenceState::NotConnected => "Not connected to wifi",
            PresenceState::Inside => "You are in the office",
            PresenceState::Outside => "Outside the office",
        }
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PresenceState::NotConnected => "not_connected",
            PresenceState::Inside => "inside",
            PresenceState::Outside => "outside",
        };
        f.write_str(label)
    }
}

/// Point-in-time read of the designated wireless interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkObservation {
    /// SSID of the associated network, `None` when not associated or unreadable
    pub network_id: Option<String>,
    /// Stable identifier of the interface (MAC), or the fallback sentinel
    pub hardware_id: String,
    /// Networks advertised nearby; only filled when a proximity rule is configured
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nearby: Vec<String>,
}

impl NetworkObservation {
    pub fn connected(network_id: impl Into<String>, hardware_id: impl Into<String>) -> Self {
        Self {
            network_id: Some(network_id.into()),
            hardware_id: hardware_id.into(),
            nearby: Vec::new(),
        }
    }

    pub fn disconnected(hardware_id: impl Into<String>) -> Self {
        Self {
            network_id: None,
            hardware_id: hardware_id.into(),
            nearby: Vec::new(),
        }
    }

    pub fn with_nearby<I, S>(mut self, nearby: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nearby = nearby.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_connected(&self) -> bool {
        self.network_id.is_some()
    }
}

/// Network identifiers considered to be "the office"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    exact: BTreeSet<String>,
    proximity: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(exact: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exact: exact.into_iter().map(Into::into).collect(),
            proximity: BTreeSet::new(),
        }
    }

    /// Adds the preferred office network; it matches exactly like the others
    pub fn with_preferred(mut self, network_id: impl Into<String>) -> Self {
        self.exact.insert(network_id.into());
        self
    }

    /// Networks whose mere visibility counts as inside (speculative rule)
    pub fn with_proximity<I, S>(mut self, nearby: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.proximity = nearby.into_iter().map(Into::into).collect();
        self
    }

    pub fn contains_exact(&self, network_id: &str) -> bool {
        self.exact.contains(network_id)
    }

    pub fn contains_proximity(&self, network_id: &str) -> bool {
        self.proximity.contains(network_id)
    }

    pub fn has_proximity(&self) -> bool {
        !self.proximity.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.proximity.is_empty()
    }

    pub fn exact_matches(&self) -> impl Iterator<Item = &str> {
        self.exact.iter().map(String::as_str)
    }
}

/// Observation ready to hand to a `StatusReporter`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceReport {
    pub value: u8,
    pub timestamp: i64,
    pub device_id: String,
    pub display_name: String,
}

impl PresenceReport {
    pub fn new(state: PresenceState, device_id: impl Into<String>, display_name: &str, timestamp: i64) -> Self {
        Self {
            value: state.code(),
            timestamp,
            device_id: device_id.into(),
            display_name: normalize_display_name(display_name),
        }
    }

    pub fn state(&self) -> Option<PresenceState> {
        PresenceState::from_code(self.value)
    }
}

/// Empty (or blank) names are reported as `Unknown`
pub fn normalize_display_name(name: &str) -> String {
    if name.trim().is_empty() {
        UNKNOWN_DISPLAY_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// How status documents land in the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// One document per device id, overwritten on every report
    #[default]
    Upsert,
    /// One new document per report, keyed by a generated id
    Append,
}

/// Backend-agnostic remote record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub value: u8,
    pub timestamp: i64,
    pub username: String,
}

impl StatusDocument {
    /// Builds the document and its store key for the given write mode
    pub fn prepare(report: &PresenceReport, mode: WriteMode) -> (String, Self) {
        let (key, id) = match mode {
            WriteMode::Upsert => (report.device_id.clone(), None),
            WriteMode::Append => {
                let generated = uuid::Uuid::new_v4().to_string();
                (generated.clone(), Some(generated))
            }
        };

        let document = StatusDocument {
            id,
            value: report.value,
            timestamp: report.timestamp,
            username: report.display_name.clone(),
        };

        (key, document)
    }
}
