//! Interactive CLI setup wizard for first-time configuration
//!
//! Walks the user through the office networks, the presence cycle, the
//! remote store and the display name, then writes the TOML config file.

use crate::capabilities::CapabilityDetector;
use crate::config::{
    AgentConfig, HttpConfig, MqttConfig, PresenceConfig, StoreBackend, StoreConfig,
    MAX_POLL_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS,
};
use crate::discovery::WirelessIdentity;
use crate::observer::WifiObserver;
use anyhow::{Context, Result};
use officetrack_core::{ReportPolicy, WriteMode};
use std::io::{self, Write};
use std::path::Path;

pub struct SetupWizard;

impl SetupWizard {
    /// Run the interactive setup wizard, starting from `existing`
    pub async fn run(path: &Path, existing: AgentConfig) -> Result<()> {
        println!();
        println!("🏢 ======================================");
        println!("   OFFICETRACK AGENT CONFIGURATION WIZARD");
        println!("🏢 ======================================");
        println!();

        // Step 0: what the machine sees right now
        let current_network = Self::display_system_info(&existing).await?;

        // Step 1: Office networks and presence cycle
        let presence = Self::configure_presence(&existing.presence, current_network)?;

        // Step 2: Remote store
        let (store, mqtt, http) = Self::configure_store(&existing).await?;

        let config = AgentConfig {
            presence,
            store,
            mqtt,
            http,
        };

        Self::display_summary(&config, path);

        if let Err(e) = config.validate() {
            println!("❌ Configuration is not usable: {:#}", e);
            return Ok(());
        }

        if Self::confirm_save()? {
            config.save(path).await.context("Failed to save configuration")?;

            println!();
            println!("✅ Configuration saved to {}", path.display());
            println!("🚀 Start reporting with `officetrack-agent run`.");
            println!();
        } else {
            println!("❌ Configuration cancelled.");
        }

        Ok(())
    }

    async fn display_system_info(existing: &AgentConfig) -> Result<Option<String>> {
        println!("📋 SYSTEM INFORMATION");
        println!("────────────────────────────────────────");

        let interface = existing.presence.interface.clone();
        let fallback = existing.presence.device_id_fallback.clone();
        let limit = existing.query_limit();

        let (identity, backends, network) = tokio::task::spawn_blocking(move || {
            let identity = WirelessIdentity::discover(interface.as_deref(), &fallback);
            let backends = CapabilityDetector::available_backends();
            let observer = WifiObserver::new(
                identity.interface.clone(),
                identity.hardware_id.clone(),
                backends.clone(),
                limit,
            );
            let network = observer.read_network_id();
            (identity, backends, network)
        })
        .await
        .context("Wireless discovery task failed")?;

        println!("🖥️  Hostname: {}", identity.hostname);
        println!("📶 Interface: {}", identity.interface.as_deref().unwrap_or("none found"));
        println!("📍 Hardware ID: {}", identity.hardware_id);
        let names: Vec<&str> = backends.iter().map(|b| b.program()).collect();
        println!("🔧 Wireless tools: {}", if names.is_empty() { "none".to_string() } else { names.join(", ") });
        println!("🌐 Current network: {}", network.as_deref().unwrap_or("not connected"));
        println!();

        Ok(network)
    }

    fn configure_presence(existing: &PresenceConfig, current_network: Option<String>) -> Result<PresenceConfig> {
        println!("🏢 OFFICE NETWORKS");
        println!("────────────────────────────────────────");
        println!("Networks whose SSID means you are in the office (comma separated, case sensitive).");
        println!("Quote an SSID with leading/trailing spaces or commas: \"  lobby \"");
        println!();

        let default_networks = if existing.office_networks.is_empty() {
            current_network.unwrap_or_default()
        } else {
            join_list(&existing.office_networks)
        };
        let office_networks = split_list(&Self::prompt_with_default("Office networks", &default_networks)?);

        let preferred_network = match &existing.preferred_network {
            Some(preferred) => Some(Self::prompt_with_default("Preferred network", &quote_if_needed(preferred))?),
            None => Self::prompt_optional("Preferred network (leave empty for none)")?,
        }
        .map(|network| unquote(&network));

        let poll_interval_secs = loop {
            let secs: u64 =
                Self::prompt_with_default_parse("Check interval (seconds)", &existing.poll_interval_secs.to_string())?;
            if (MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&secs) {
                break secs;
            }
            println!(
                "❌ Interval must be between {} and {} seconds.",
                MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS
            );
        };

        let policy = Self::prompt_with_options(
            "Report policy",
            &[
                ("always", "Report on every check"),
                ("on_change", "Report only when presence or name changes"),
            ],
            match existing.report_policy {
                ReportPolicy::Always => "always",
                ReportPolicy::OnChange => "on_change",
            },
        )?;
        let report_policy = match policy.as_str() {
            "on_change" => ReportPolicy::OnChange,
            _ => ReportPolicy::Always,
        };

        let display_name = Self::prompt_with_default("Display name", &existing.display_name)?;

        println!();

        Ok(PresenceConfig {
            office_networks,
            preferred_network: preferred_network.filter(|n| !n.is_empty()),
            poll_interval_secs,
            report_policy,
            display_name,
            ..existing.clone()
        })
    }

    async fn configure_store(
        existing: &AgentConfig,
    ) -> Result<(StoreConfig, Option<MqttConfig>, Option<HttpConfig>)> {
        println!("📡 STATUS STORE");
        println!("────────────────────────────────────────");
        println!("Where presence documents are written.");
        println!();

        let backend = Self::prompt_with_options(
            "Store backend",
            &[("mqtt", "Retained MQTT topic per device"), ("http", "HTTP document store")],
            match existing.store.backend {
                StoreBackend::Mqtt => "mqtt",
                StoreBackend::Http => "http",
            },
        )?;

        let write_mode = Self::prompt_with_options(
            "Write mode",
            &[
                ("upsert", "One document per device, overwritten"),
                ("append", "A new document for every report"),
            ],
            match existing.store.write_mode {
                WriteMode::Upsert => "upsert",
                WriteMode::Append => "append",
            },
        )?;

        let collection = Self::prompt_with_default("Collection", &existing.store.collection)?;

        let store = StoreConfig {
            backend: if backend == "http" { StoreBackend::Http } else { StoreBackend::Mqtt },
            write_mode: if write_mode == "append" { WriteMode::Append } else { WriteMode::Upsert },
            collection,
            ..existing.store.clone()
        };

        let (mqtt, http) = match store.backend {
            StoreBackend::Mqtt => {
                let mqtt = Self::configure_mqtt(existing.mqtt.clone().unwrap_or_default()).await?;
                (Some(mqtt), existing.http.clone())
            }
            StoreBackend::Http => {
                let default_url = existing.http.as_ref().map(|h| h.base_url.as_str()).unwrap_or("");
                let base_url = Self::prompt_with_default("Store base URL", default_url)?;
                (existing.mqtt.clone(), Some(HttpConfig { base_url }))
            }
        };

        println!();
        Ok((store, mqtt, http))
    }

    async fn configure_mqtt(existing: MqttConfig) -> Result<MqttConfig> {
        let broker_host = Self::prompt_with_default("MQTT Broker Host", &existing.broker_host)?;
        let broker_port: u16 =
            Self::prompt_with_default_parse("MQTT Broker Port", &existing.broker_port.to_string())?;
        let topic_prefix = Self::prompt_with_default("Topic prefix", &existing.topic_prefix)?;
        let accept_commands = Self::prompt_yes_no("Accept remote commands (rename, refresh)?", existing.accept_commands)?;

        // Test connection
        println!("🔍 Testing MQTT connection...");
        match Self::test_mqtt_connection(&broker_host, broker_port).await {
            Ok(true) => println!("✅ Connection successful!"),
            Ok(false) => println!("⚠️  Connection failed, but configuration will be saved."),
            Err(e) => println!("⚠️  Connection test error: {} - Configuration will be saved anyway.", e),
        }

        Ok(MqttConfig {
            broker_host,
            broker_port,
            topic_prefix,
            accept_commands,
            ..existing
        })
    }

    fn display_summary(config: &AgentConfig, path: &Path) {
        println!("📋 CONFIGURATION SUMMARY");
        println!("────────────────────────────────────────");

        let presence = &config.presence;
        println!("🏢 Presence:");
        println!("   Office networks: {}", presence.office_networks.join(", "));
        println!("   Preferred: {}", presence.preferred_network.as_deref().unwrap_or("none"));
        println!("   Interval: {}s", presence.poll_interval_secs);
        println!("   Policy: {:?}", presence.report_policy);
        println!(
            "   Display name: {}",
            if presence.display_name.trim().is_empty() { "Unknown" } else { &presence.display_name }
        );

        println!();
        println!("📡 Store:");
        println!("   Backend: {:?} ({:?})", config.store.backend, config.store.write_mode);
        println!("   Collection: {}", config.store.collection);
        match config.store.backend {
            StoreBackend::Mqtt => {
                if let Some(mqtt) = &config.mqtt {
                    println!("   Broker: {}:{}", mqtt.broker_host, mqtt.broker_port);
                    println!("   Topic prefix: {}", mqtt.topic_prefix);
                }
            }
            StoreBackend::Http => {
                if let Some(http) = &config.http {
                    println!("   URL: {}", http.base_url);
                }
            }
        }

        println!();
        println!("💾 File: {}", path.display());
        println!();
    }

    fn confirm_save() -> Result<bool> {
        print!("💾 Save this configuration? [Y/n]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        Ok(input.is_empty() || input == "y" || input == "yes")
    }

    // Helper functions for user input
    fn prompt_with_default(prompt: &str, default: &str) -> Result<String> {
        print!("❓ {} [{}]: ", prompt, default);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        if input.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(input.to_string())
        }
    }

    fn prompt_with_default_parse<T: std::str::FromStr>(prompt: &str, default: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        loop {
            let input = Self::prompt_with_default(prompt, default)?;
            match input.parse::<T>() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    println!("❌ Invalid input: {}. Please try again.", e);
                    continue;
                }
            }
        }
    }

    fn prompt_optional(prompt: &str) -> Result<Option<String>> {
        print!("❓ {}: ", prompt);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        if input.is_empty() {
            Ok(None)
        } else {
            Ok(Some(input.to_string()))
        }
    }

    fn prompt_yes_no(prompt: &str, default: bool) -> Result<bool> {
        let default_str = if default { "Y/n" } else { "y/N" };

        loop {
            print!("❓ {} [{}]: ", prompt, default_str);
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;
            let input = input.trim().to_lowercase();

            if input.is_empty() {
                return Ok(default);
            }

            match input.as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => {
                    println!("❌ Please enter 'y' or 'n'.");
                    continue;
                }
            }
        }
    }

    fn prompt_with_options(prompt: &str, options: &[(&str, &str)], default: &str) -> Result<String> {
        println!("❓ {}:", prompt);
        for (key, description) in options {
            let marker = if *key == default { "►" } else { " " };
            println!("  {} {} - {}", marker, key, description);
        }

        loop {
            print!("Choice [{}]: ", default);
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;
            let input = input.trim();

            if input.is_empty() {
                return Ok(default.to_string());
            }

            if options.iter().any(|(key, _)| *key == input) {
                return Ok(input.to_string());
            }

            println!("❌ Invalid choice. Please select from the available options.");
        }
    }

    async fn test_mqtt_connection(host: &str, port: u16) -> Result<bool> {
        let address = format!("{}:{}", host, port);
        let attempt = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            tokio::net::TcpStream::connect(address),
        )
        .await;

        Ok(matches!(attempt, Ok(Ok(_))))
    }
}

/// Comma-separated SSIDs. Unquoted entries are trimmed; a double-quoted entry
/// is kept verbatim, spaces and commas included.
fn split_list(input: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut verbatim = false;

    let mut finish = |current: &mut String, verbatim: &mut bool| {
        let entry = if *verbatim { current.clone() } else { current.trim().to_string() };
        if !entry.is_empty() {
            entries.push(entry);
        }
        current.clear();
        *verbatim = false;
    };

    for c in input.chars() {
        match c {
            '"' if in_quotes => in_quotes = false,
            '"' => {
                in_quotes = true;
                verbatim = true;
                current.clear();
            }
            ',' if !in_quotes => finish(&mut current, &mut verbatim),
            // text after a closing quote is dropped
            _ if verbatim && !in_quotes => {}
            _ => current.push(c),
        }
    }
    finish(&mut current, &mut verbatim);

    entries
}

/// A single SSID, quotes stripped when the whole input is quoted
fn unquote(input: &str) -> String {
    input
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(input)
        .to_string()
}

fn quote_if_needed(ssid: &str) -> String {
    if ssid.trim() != ssid || ssid.contains(',') {
        format!("\"{}\"", ssid)
    } else {
        ssid.to_string()
    }
}

/// Inverse of `split_list`, used to show the current list as a default
fn join_list(ssids: &[String]) -> String {
    ssids.iter().map(|s| quote_if_needed(s)).collect::<Vec<_>>().join(", ")
}
