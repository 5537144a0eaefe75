/*!
# officetrack DevKit - Test doubles for presence agents

Lets the presence service run end to end without a wireless card or a store:
- Scripted network observer with a simulated change feed
- Recording status reporter (optionally failing)
- Mock MQTT publisher behind the MQTT reporter
- Loader/validator for the JSON contracts in `contracts/`
- `TestHarness` wiring all of the above into a running service
*/

pub mod contract_helpers;
pub mod mqtt_stub;
pub mod observer_stub;
pub mod reporter_stub;
pub mod test_utils;

pub use contract_helpers::{Contract, ContractLoader};
pub use mqtt_stub::{MockMessage, MockMqttClient};
pub use observer_stub::ScriptedObserver;
pub use reporter_stub::RecordingReporter;
pub use test_utils::TestHarness;

/// Path of the workspace `contracts/` directory
pub fn contracts_dir() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../contracts")
}
