use officetrack_core::reporter::MqttReporter;
use officetrack_core::{
    AllowList, PresenceClassifier, PresenceReport, PresenceService, PresenceState, ServiceConfig,
    StatusReporter, TriggerSources, WriteMode,
};
use officetrack_devkit::{MockMqttClient, ScriptedObserver, TestHarness};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

fn report(state: PresenceState, device: &str, name: &str) -> PresenceReport {
    PresenceReport::new(state, device, name, 1_700_000_000)
}

#[tokio::test]
async fn test_upsert_publishes_retained_per_device() {
    let client = MockMqttClient::new();
    let reporter = MqttReporter::new(client.clone(), "officetrack", "userStatus", WriteMode::Upsert);

    reporter.record(report(PresenceState::Inside, "dev-a", "Alice")).await.unwrap();
    reporter.record(report(PresenceState::Outside, "dev-a", "Alice")).await.unwrap();
    reporter.record(report(PresenceState::NotConnected, "dev-b", "")).await.unwrap();

    let retained = client.retained_view();
    assert_eq!(retained.len(), 2);

    let latest_a: Value = serde_json::from_slice(&retained["officetrack/userStatus/dev-a"]).unwrap();
    assert_eq!(latest_a, serde_json::json!({"value": 2, "timestamp": 1_700_000_000, "username": "Alice"}));

    let latest_b: Value = serde_json::from_slice(&retained["officetrack/userStatus/dev-b"]).unwrap();
    assert_eq!(latest_b["username"], "Unknown");
    assert_eq!(latest_b["value"], 0);
}

#[tokio::test]
async fn test_append_publishes_log_entries_with_ids() {
    let client = MockMqttClient::new();
    let reporter = MqttReporter::new(client.clone(), "officetrack", "userStatus", WriteMode::Append);

    reporter.record(report(PresenceState::Inside, "dev-a", "Alice")).await.unwrap();
    reporter.record(report(PresenceState::Inside, "dev-a", "Alice")).await.unwrap();

    let messages = client.find_messages_by_topic("officetrack/userStatus/log");
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| !m.retain));
    assert!(client.retained_view().is_empty());

    let ids: Vec<String> = messages
        .iter()
        .map(|m| {
            let doc: Value = serde_json::from_slice(&m.payload).unwrap();
            doc["id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn test_published_documents_match_contracts() {
    let contracts = TestHarness::contracts().unwrap();

    for mode in [WriteMode::Upsert, WriteMode::Append] {
        let client = MockMqttClient::new();
        let reporter = MqttReporter::new(client.clone(), "officetrack", "userStatus", mode);
        reporter.record(report(PresenceState::Outside, "dev-a", "Bob")).await.unwrap();

        for message in client.get_published_messages() {
            let payload: Value = serde_json::from_slice(&message.payload).unwrap();
            contracts.validate("presence.status", &payload).unwrap();
            contracts.validate("presence.document", &payload).unwrap();
        }
    }
}

#[test]
fn test_command_contract_examples() {
    let contracts = TestHarness::contracts().unwrap();

    let rename = serde_json::json!({"command": "set_display_name", "name": "Alice"});
    contracts.validate("presence.command", &rename).unwrap();

    let refresh = serde_json::json!({"command": "refresh"});
    contracts.validate("presence.command", &refresh).unwrap();

    let unknown = serde_json::json!({"command": "reboot"});
    assert!(contracts.validate("presence.command", &unknown).is_err());
}

#[tokio::test]
async fn test_service_over_mqtt_reporter() {
    let client = MockMqttClient::new();
    let observer = ScriptedObserver::connected_to("officeNet");
    observer.set_hardware_id(Some("a1:b2:c3:d4:e5:f6"));

    let service = PresenceService::new(
        Arc::new(observer.clone()),
        PresenceClassifier::new(AllowList::new(["officeNet"])),
        Arc::new(MqttReporter::new(client.clone(), "officetrack", "userStatus", WriteMode::Upsert)),
        ServiceConfig {
            triggers: TriggerSources {
                startup: true,
                timer: false,
                network_events: true,
            },
            ..ServiceConfig::default()
        },
    );
    let handle = service.start();

    let topic = "officetrack/userStatus/a1:b2:c3:d4:e5:f6";
    let mut latest = None;
    for _ in 0..200 {
        if let Some(doc) = client.get_last_json_message::<Value>(topic).unwrap() {
            latest = Some(doc);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(latest.unwrap()["value"], 1);

    // broker outage is absorbed; the service keeps classifying
    client.fail_with("connection reset");
    observer.switch_network(Some("cafeNet"));
    let mut updates = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(2), updates.wait_for(|s| s.cycle >= 2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handle.current_presence_state(), PresenceState::Outside);
    assert_eq!(client.find_messages_by_topic(topic).len(), 1);

    handle.shutdown();
}
