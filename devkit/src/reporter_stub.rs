/*!
Recording status reporter

Keeps every report it is handed, in arrival order. Can be told to fail or to
stall so the outbox error and timeout paths can be observed.
*/

use futures::future::{BoxFuture, FutureExt};
use officetrack_core::{PresenceReport, ReportError, StatusReporter};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<PresenceReport>>>,
    attempts: Arc<Mutex<usize>>,
    failure: Arc<Mutex<Option<String>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock().unwrap() = Some(reason.into());
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Every write sleeps this long before completing
    pub fn stall_for(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Successfully recorded reports
    pub fn reports(&self) -> Vec<PresenceReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn last_report(&self) -> Option<PresenceReport> {
        self.reports.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    /// Writes attempted, failed ones included
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    pub fn clear(&self) {
        self.reports.lock().unwrap().clear();
        *self.attempts.lock().unwrap() = 0;
    }
}

impl StatusReporter for RecordingReporter {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn record(&self, report: PresenceReport) -> BoxFuture<'_, Result<(), ReportError>> {
        async move {
            *self.attempts.lock().unwrap() += 1;

            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let failure = self.failure.lock().unwrap().clone();
            if let Some(reason) = failure {
                log::warn!("[MOCK] Rejecting report for {}: {}", report.device_id, reason);
                return Err(ReportError::Transport(reason));
            }

            log::info!("[MOCK] Recorded status {} for {}", report.value, report.device_id);
            self.reports.lock().unwrap().push(report);
            Ok(())
        }
        .boxed()
    }
}
