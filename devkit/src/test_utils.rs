/*!
Test harness for the presence service

Wires a `ScriptedObserver` and a `RecordingReporter` into a real
`PresenceService` and offers waits/assertions on what got reported. By default
only network events and explicit triggers run, so tests decide every cycle.
*/

use crate::contract_helpers::ContractLoader;
use crate::observer_stub::ScriptedObserver;
use crate::reporter_stub::RecordingReporter;
use officetrack_core::{
    AllowList, DisplayName, PresenceClassifier, PresenceHandle, PresenceReport, PresenceService,
    PresenceSnapshot, ReportPolicy, ServiceConfig, TriggerSources,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use anyhow::Result;

pub struct TestHarness {
    pub observer: ScriptedObserver,
    pub reporter: RecordingReporter,
    pub display_name: DisplayName,
    allow_list: AllowList,
    config: ServiceConfig,
    handle: Option<PresenceHandle>,
}

impl TestHarness {
    /// Office allow-list `{"officeNet"}`, manual triggers, report on every cycle
    pub fn new() -> Self {
        env_logger::try_init().ok();

        Self {
            observer: ScriptedObserver::new(),
            reporter: RecordingReporter::new(),
            display_name: DisplayName::default(),
            allow_list: AllowList::new(["officeNet"]),
            config: ServiceConfig {
                poll_interval: Duration::from_secs(3600),
                triggers: TriggerSources {
                    startup: false,
                    timer: false,
                    network_events: true,
                },
                report_policy: ReportPolicy::Always,
                write_timeout: Duration::from_secs(1),
                device_id_fallback: "unknown".to_string(),
            },
            handle: None,
        }
    }

    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    pub fn with_policy(mut self, policy: ReportPolicy) -> Self {
        self.config.report_policy = policy;
        self
    }

    pub fn with_config(mut self, configure: impl FnOnce(&mut ServiceConfig)) -> Self {
        configure(&mut self.config);
        self
    }

    /// Starts the service; call from inside a tokio runtime
    pub fn start(&mut self) -> PresenceHandle {
        let service = PresenceService::new(
            Arc::new(self.observer.clone()),
            PresenceClassifier::new(self.allow_list.clone()),
            Arc::new(self.reporter.clone()),
            self.config.clone(),
        )
        .with_display_name(self.display_name.clone());

        let handle = service.start();
        self.handle = Some(handle.clone());
        log::info!("Test presence service started");
        handle
    }

    /// Waits until at least `count` reports were recorded
    pub async fn wait_for_reports(&self, count: usize, timeout_ms: u64) -> Result<Vec<PresenceReport>> {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if self.reporter.count() >= count {
                return Ok(self.reporter.reports());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        anyhow::bail!(
            "Timeout waiting for {} reports, got {}",
            count,
            self.reporter.count()
        )
    }

    /// Waits until the service published cycle number `cycle`
    pub async fn wait_for_cycle(&self, cycle: u64, timeout_ms: u64) -> Result<PresenceSnapshot> {
        let handle = match &self.handle {
            Some(handle) => handle,
            None => anyhow::bail!("Harness not started"),
        };

        let mut snapshots = handle.subscribe();
        let snapshot = timeout(
            Duration::from_millis(timeout_ms),
            snapshots.wait_for(|s| s.cycle >= cycle),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Timeout waiting for cycle {}", cycle))??
        .clone();

        Ok(snapshot)
    }

    /// Asserts that no further report shows up within `settle_ms`
    pub async fn assert_report_count_stays(&self, count: usize, settle_ms: u64) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(settle_ms)).await;
        let actual = self.reporter.count();
        if actual != count {
            anyhow::bail!("Expected {} reports, got {}", count, actual);
        }
        Ok(())
    }

    /// Contracts from the workspace `contracts/` directory
    pub fn contracts() -> Result<ContractLoader> {
        let mut loader = ContractLoader::new(crate::contracts_dir());
        let count = loader.load_all_contracts()?;
        log::info!("Loaded {} contracts for testing", count);
        Ok(loader)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let mut harness = TestHarness::new();
        harness.observer.set_network(Some("officeNet"));

        let handle = harness.start();
        handle.trigger_immediate_update();

        let reports = harness.wait_for_reports(1, 2000).await.unwrap();
        assert_eq!(reports[0].value, 1);

        let snapshot = harness.wait_for_cycle(1, 2000).await.unwrap();
        assert_eq!(snapshot.network_id.as_deref(), Some("officeNet"));
    }

    #[test]
    fn test_workspace_contracts_load() {
        let loader = TestHarness::contracts().unwrap();
        assert!(loader.get_contract("presence.status").is_some());
        assert!(loader.get_contract("presence.command").is_some());
        assert!(loader.get_contract("presence.document").is_some());
    }
}
