//! Seam over the OS wireless facility

use crate::error::ObserverError;
use crate::model::NetworkObservation;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Receives association changes from an observer
pub trait NetworkChangeSink: Send + Sync {
    fn network_changed(&self, observation: NetworkObservation);
}

/// Read-only view of the designated wireless interface
pub trait NetworkObserver: Send + Sync {
    /// Never fails: unreadable state is an observation without a network id
    fn current_observation(&self) -> NetworkObservation;

    /// Networks currently advertised nearby, associated or not
    fn visible_networks(&self) -> Vec<String> {
        Vec::new()
    }

    /// Starts delivering association changes to `sink`.
    ///
    /// Must only fire when the associated network id changes, never on
    /// unrelated interface events. A monitor task, when the observer runs
    /// one, is handed back so the service can stop it on shutdown.
    fn subscribe_to_changes(
        &self,
        _sink: Arc<dyn NetworkChangeSink>,
    ) -> Result<Option<JoinHandle<()>>, ObserverError> {
        Err(ObserverError::MonitoringUnavailable(
            "change notifications not supported by this observer".to_string(),
        ))
    }
}
