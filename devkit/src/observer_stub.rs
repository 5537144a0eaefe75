/*!
Scripted network observer

The test decides which network the "interface" is associated with and when
the OS reports a change. Change delivery goes through the sink registered by
the service, exactly like a real monitor would.
*/

use officetrack_core::{
    NetworkChangeSink, NetworkObservation, NetworkObserver, ObserverError, UNKNOWN_HARDWARE_ID,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::{AbortHandle, JoinHandle};

#[derive(Default)]
struct ScriptState {
    network_id: Option<String>,
    hardware_id: Option<String>,
    nearby: Vec<String>,
    monitoring_refused: bool,
    sink: Option<Arc<dyn NetworkChangeSink>>,
    monitor: Option<AbortHandle>,
}

#[derive(Clone, Default)]
pub struct ScriptedObserver {
    state: Arc<Mutex<ScriptState>>,
    reads: Arc<AtomicUsize>,
    broken: Arc<AtomicBool>,
}

impl ScriptedObserver {
    /// Interface present but not associated
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected_to(network_id: &str) -> Self {
        let observer = Self::new();
        observer.set_network(Some(network_id));
        observer
    }

    pub fn set_network(&self, network_id: Option<&str>) {
        self.state.lock().unwrap().network_id = network_id.map(str::to_string);
    }

    pub fn set_hardware_id(&self, hardware_id: Option<&str>) {
        self.state.lock().unwrap().hardware_id = hardware_id.map(str::to_string);
    }

    pub fn set_nearby(&self, nearby: &[&str]) {
        self.state.lock().unwrap().nearby = nearby.iter().map(|s| s.to_string()).collect();
    }

    /// Makes `subscribe_to_changes` fail like an OS refusing event monitoring
    pub fn refuse_monitoring(&self) {
        self.state.lock().unwrap().monitoring_refused = true;
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.lock().unwrap().sink.is_some()
    }

    /// Whether the monitor task started by `subscribe_to_changes` is still alive
    pub fn monitor_running(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .monitor
            .as_ref()
            .map_or(false, |monitor| !monitor.is_finished())
    }

    /// Changes the association and notifies the subscribed sink, if any
    pub fn switch_network(&self, network_id: Option<&str>) -> bool {
        self.set_network(network_id);
        let sink = self.state.lock().unwrap().sink.clone();

        match sink {
            Some(sink) => {
                log::info!("[MOCK] Network switched to {:?}", network_id);
                sink.network_changed(self.current_observation());
                true
            }
            None => false,
        }
    }

    /// Makes every later read panic, like an OS binding blowing up mid-query
    pub fn break_reads(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Number of point-in-time reads served
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl NetworkObserver for ScriptedObserver {
    fn current_observation(&self) -> NetworkObservation {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            panic!("scripted observer read failure");
        }
        let state = self.state.lock().unwrap();
        let hardware_id = state
            .hardware_id
            .clone()
            .unwrap_or_else(|| UNKNOWN_HARDWARE_ID.to_string());

        match &state.network_id {
            Some(id) => NetworkObservation::connected(id.clone(), hardware_id),
            None => NetworkObservation::disconnected(hardware_id),
        }
    }

    fn visible_networks(&self) -> Vec<String> {
        self.state.lock().unwrap().nearby.clone()
    }

    fn subscribe_to_changes(
        &self,
        sink: Arc<dyn NetworkChangeSink>,
    ) -> Result<Option<JoinHandle<()>>, ObserverError> {
        let mut state = self.state.lock().unwrap();
        if state.monitoring_refused {
            return Err(ObserverError::MonitoringUnavailable(
                "scripted observer refused monitoring".to_string(),
            ));
        }
        state.sink = Some(sink);

        // stands in for a long-running OS monitor
        let monitor = tokio::spawn(std::future::pending::<()>());
        state.monitor = Some(monitor.abort_handle());
        Ok(Some(monitor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_reads_are_equal() {
        let observer = ScriptedObserver::connected_to("officeNet");
        observer.set_hardware_id(Some("a1:b2:c3:d4:e5:f6"));

        let first = observer.current_observation();
        let second = observer.current_observation();
        assert_eq!(first, second);
        assert_eq!(observer.read_count(), 2);
    }

    #[test]
    fn test_missing_hardware_id_uses_sentinel() {
        let observer = ScriptedObserver::new();
        let observation = observer.current_observation();
        assert_eq!(observation.network_id, None);
        assert_eq!(observation.hardware_id, "unknown");
    }

    #[test]
    fn test_switch_without_subscriber() {
        let observer = ScriptedObserver::new();
        assert!(!observer.switch_network(Some("cafeNet")));
        assert_eq!(observer.current_observation().network_id.as_deref(), Some("cafeNet"));
    }
}
