//! officetrack core - presence inference and status reporting
//!
//! Infers whether a user is in the office from the wireless network the
//! machine is associated with, and pushes that state to a remote store:
//! - `classifier`: pure mapping of an observation onto a presence state
//! - `observer`: the seam over the OS wireless facility
//! - `service`: single-writer actor driven by startup/timer/network/explicit triggers
//! - `reporter`: keyed upsert (or append) of status documents over MQTT or HTTP

pub mod classifier;
pub mod error;
pub mod model;
pub mod observer;
pub mod reporter;
pub mod service;
pub mod state;

pub use classifier::{classify, PresenceClassifier};
pub use error::{ObserverError, ReportError};
pub use model::{
    AllowList, NetworkObservation, PresenceReport, PresenceState, StatusDocument, WriteMode,
    UNKNOWN_DISPLAY_NAME, UNKNOWN_HARDWARE_ID,
};
pub use observer::{NetworkChangeSink, NetworkObserver};
pub use reporter::StatusReporter;
pub use service::{
    PresenceHandle, PresenceService, PresenceSnapshot, ReportPolicy, ServiceConfig, Trigger,
    TriggerSources,
};
pub use state::DisplayName;
