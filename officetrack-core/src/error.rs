use std::time::Duration;

/// Failures on the OS side of the network observer.
///
/// None of these reach the service caller: an unavailable observation is
/// classified as `NotConnected`, unavailable monitoring degrades to polling.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("Observation unavailable: {0}")]
    ObservationUnavailable(String),
    #[error("Monitoring unavailable: {0}")]
    MonitoringUnavailable(String),
}

/// Failure of a single status write to the remote store
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Store rejected write (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Write timed out after {0:?}")]
    Timeout(Duration),
    #[error("Transport error: {0}")]
    Transport(String),
}
