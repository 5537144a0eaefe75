//! Presence classification
//!
//! Total and stateless: the same observation and allow-list always give the
//! same state. Matching is case-sensitive exact string equality.

use crate::model::{AllowList, NetworkObservation, PresenceState};

/// Maps an observation onto a presence state
pub fn classify(observation: &NetworkObservation, allow_list: &AllowList) -> PresenceState {
    let network_id = match observation.network_id.as_deref() {
        Some(id) => id,
        None => return PresenceState::NotConnected,
    };

    if allow_list.contains_exact(network_id) {
        return PresenceState::Inside;
    }

    if allow_list.has_proximity()
        && observation
            .nearby
            .iter()
            .any(|visible| allow_list.contains_proximity(visible))
    {
        return PresenceState::Inside;
    }

    PresenceState::Outside
}

/// Owns the allow-list for the lifetime of a run
#[derive(Debug, Clone)]
pub struct PresenceClassifier {
    allow_list: AllowList,
}

impl PresenceClassifier {
    pub fn new(allow_list: AllowList) -> Self {
        Self { allow_list }
    }

    pub fn classify(&self, observation: &NetworkObservation) -> PresenceState {
        classify(observation, &self.allow_list)
    }

    /// Whether a connected observation needs the list of nearby networks
    pub fn wants_nearby(&self, observation: &NetworkObservation) -> bool {
        match observation.network_id.as_deref() {
            Some(id) => self.allow_list.has_proximity() && !self.allow_list.contains_exact(id),
            None => false,
        }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }
}
