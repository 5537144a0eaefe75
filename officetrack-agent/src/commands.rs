//! Remote commands received over MQTT
//!
//! Topic: `<prefix>/agents/command@v1/<deviceId>`, payloads as in the
//! `presence.command` contract.

use anyhow::{Context, Result};
use officetrack_core::PresenceHandle;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AgentCommand {
    /// Sets the reported name, then reports right away
    SetDisplayName { name: String },
    /// Runs a presence cycle now
    Refresh,
}

pub fn command_topic(topic_prefix: &str, device_id: &str) -> String {
    format!("{}/agents/command@v1/{}", topic_prefix.trim_end_matches('/'), device_id)
}

pub fn parse_command(payload: &[u8]) -> Result<AgentCommand> {
    serde_json::from_slice(payload).context("Invalid command payload")
}

/// Applies a command to the running presence service
pub fn apply(command: AgentCommand, presence: &PresenceHandle) {
    match command {
        AgentCommand::SetDisplayName { name } => {
            info!("Display name set remotely to '{}'", name);
            presence.set_display_name(name);
            presence.trigger_immediate_update();
        }
        AgentCommand::Refresh => {
            info!("Remote refresh requested");
            presence.trigger_immediate_update();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use officetrack_devkit::TestHarness;

    #[test]
    fn test_command_topic() {
        assert_eq!(
            command_topic("officetrack/", "a1:b2:c3:d4:e5:f6"),
            "officetrack/agents/command@v1/a1:b2:c3:d4:e5:f6"
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command(br#"{"command":"set_display_name","name":"Alice"}"#).unwrap(),
            AgentCommand::SetDisplayName {
                name: "Alice".to_string()
            }
        );
        assert_eq!(parse_command(br#"{"command":"refresh"}"#).unwrap(), AgentCommand::Refresh);
        assert!(parse_command(br#"{"command":"reboot"}"#).is_err());
        assert!(parse_command(br#"{"command":"set_display_name"}"#).is_err());
        assert!(parse_command(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_set_display_name_reports_immediately() {
        let mut harness = TestHarness::new();
        harness.observer.set_network(Some("officeNet"));
        let handle = harness.start();

        apply(
            AgentCommand::SetDisplayName {
                name: "Alice".to_string(),
            },
            &handle,
        );

        let reports = harness.wait_for_reports(1, 2000).await.unwrap();
        assert_eq!(reports[0].display_name, "Alice");
        assert_eq!(reports[0].value, 1);
        assert_eq!(handle.display_name(), "Alice");
    }

    #[tokio::test]
    async fn test_refresh_runs_a_cycle() {
        let mut harness = TestHarness::new();
        let handle = harness.start();

        apply(AgentCommand::Refresh, &handle);

        let snapshot = harness.wait_for_cycle(1, 2000).await.unwrap();
        assert_eq!(snapshot.state, officetrack_core::PresenceState::NotConnected);
        let reports = harness.wait_for_reports(1, 2000).await.unwrap();
        assert_eq!(reports[0].display_name, "Unknown");
    }
}
