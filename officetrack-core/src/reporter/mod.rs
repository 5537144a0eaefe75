//! Status reporting to the remote store
//!
//! Reporters are best-effort telemetry:
//! - one write per report, no automatic retry
//! - failures are logged by the outbox and dropped
//! - the outbox runs writes one at a time, so a device's documents leave in
//!   trigger order and the presence cycle never waits on network I/O

pub mod http;
pub mod mqtt;

pub use http::HttpReporter;
pub use mqtt::{MqttPublish, MqttReporter};

use crate::error::ReportError;
use crate::model::PresenceReport;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Writes one presence report to a remote store
pub trait StatusReporter: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    fn record(&self, report: PresenceReport) -> BoxFuture<'_, Result<(), ReportError>>;
}

/// Starts the task that drains queued reports into `reporter`
pub fn spawn_outbox(
    reporter: Arc<dyn StatusReporter>,
    write_timeout: Duration,
) -> (mpsc::UnboundedSender<PresenceReport>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<PresenceReport>();

    let task = tokio::spawn(async move {
        info!("Status outbox started ({} backend)", reporter.name());

        while let Some(report) = rx.recv().await {
            let device_id = report.device_id.clone();
            let value = report.value;

            let outcome = match tokio::time::timeout(write_timeout, reporter.record(report)).await {
                Ok(result) => result,
                Err(_) => Err(ReportError::Timeout(write_timeout)),
            };

            match outcome {
                Ok(()) => debug!("Status {} recorded for {}", value, device_id),
                Err(e) => error!("Failed to record status for {}: {}", device_id, e),
            }
        }

        debug!("Status outbox closed");
    });

    (tx, task)
}
