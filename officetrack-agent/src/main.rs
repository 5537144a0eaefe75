//! officetrack agent - wireless office-presence reporter
//!
//! Watches which wireless network this machine is associated with and
//! reports "in the office / outside / not connected" to a remote store:
//! - Wireless interface discovery and SSID backends per OS
//! - Presence cycles on startup, on a timer and on association changes
//! - Status documents over MQTT (retained per device) or HTTP
//! - Remote rename/refresh commands over MQTT

mod capabilities;
mod commands;
mod config;
mod discovery;
mod execution;
mod observer;
mod wizard;

use anyhow::{Context, Result};
use capabilities::CapabilityDetector;
use clap::{Parser, Subcommand};
use config::{AgentConfig, StoreBackend};
use discovery::WirelessIdentity;
use observer::WifiObserver;
use officetrack_core::reporter::{HttpReporter, MqttReporter};
use officetrack_core::{
    DisplayName, NetworkObserver, PresenceClassifier, PresenceHandle, PresenceService,
    PresenceState, StatusReporter,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "officetrack-agent")]
#[command(version, about = "Reports office presence from the associated wireless network")]
struct Cli {
    /// Config file (defaults to $OFFICETRACK_CONFIG, then the OS config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the presence agent (default)
    Run,

    /// Read and classify the current network once, without reporting
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive first-time configuration
    Setup,
}

/// One-shot status printed by `status`
#[derive(Debug, Serialize)]
struct StatusLine {
    state: PresenceState,
    value: u8,
    description: &'static str,
    network_id: Option<String>,
    hardware_id: String,
    interface: Option<String>,
}

/// MQTT connection shared by the reporter and the command channel
struct MqttLink {
    client: AsyncClient,
    eventloop: rumqttc::EventLoop,
    command_topic: Option<String>,
}

/// Main agent state
struct Agent {
    presence: PresenceHandle,
    mqtt_client: Option<AsyncClient>,
    tasks: Vec<JoinHandle<()>>,
}

impl Agent {
    /// Create new agent instance
    async fn new(config: AgentConfig) -> Result<Self> {
        info!("Initializing officetrack agent v{}", env!("CARGO_PKG_VERSION"));

        let observer = build_observer(&config).await?;
        let device_id = observer.hardware_id().to_string();

        let display_name = DisplayName::new(config.presence.display_name.clone());
        let mut tasks = Vec::new();
        let mut mqtt_link = None;

        let reporter: Arc<dyn StatusReporter> = match config.store.backend {
            StoreBackend::Mqtt => {
                let link = connect_mqtt(&config, &device_id)?;
                let reporter = MqttReporter::new(
                    link.client.clone(),
                    config.mqtt.as_ref().map(|m| m.topic_prefix.as_str()).unwrap_or("officetrack"),
                    config.store.collection.clone(),
                    config.store.write_mode,
                );
                mqtt_link = Some(link);
                Arc::new(reporter)
            }
            StoreBackend::Http => {
                let http = config
                    .http
                    .as_ref()
                    .context("store.backend is \"http\" but [http] is missing")?;
                let timeout = Duration::from_secs(config.store.write_timeout_secs);
                Arc::new(
                    HttpReporter::new(&http.base_url, config.store.collection.clone(), config.store.write_mode, timeout)
                        .context("Failed to build HTTP client")?,
                )
            }
        };

        info!(
            "Reporting to {} store, collection '{}' ({:?})",
            reporter.name(),
            config.store.collection,
            config.store.write_mode
        );

        let service = PresenceService::new(
            Arc::new(observer),
            PresenceClassifier::new(config.allow_list()),
            reporter,
            config.service_config(),
        )
        .with_display_name(display_name);

        let presence = service.start();

        let mqtt_client = mqtt_link.as_ref().map(|link| link.client.clone());
        if let Some(link) = mqtt_link {
            tasks.push(spawn_mqtt_eventloop(link, presence.clone()));
        }

        info!("Agent initialized - Device ID: {}", device_id);

        Ok(Agent {
            presence,
            mqtt_client,
            tasks,
        })
    }

    /// Start agent main loop
    async fn run(&mut self) -> Result<()> {
        info!("Starting agent main loop...");

        let mut updates = self.presence.subscribe();
        let mut last_logged: Option<PresenceState> = None;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    break;
                }

                changed = updates.changed() => {
                    if changed.is_err() {
                        warn!("Presence service stopped");
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    if last_logged != Some(snapshot.state) {
                        info!(
                            "{} (network: {})",
                            snapshot.state.description(),
                            snapshot.network_id.as_deref().unwrap_or("none")
                        );
                        last_logged = Some(snapshot.state);
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.presence.shutdown();
        if let Some(client) = &self.mqtt_client {
            if let Err(e) = client.try_disconnect() {
                debug!("MQTT disconnect failed: {}", e);
            }
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("Agent stopped");
    }
}

/// Interface, hardware id and backends for this host
async fn build_observer(config: &AgentConfig) -> Result<WifiObserver> {
    let interface = config.presence.interface.clone();
    let fallback = config.presence.device_id_fallback.clone();
    let limit = config.query_limit();

    tokio::task::spawn_blocking(move || {
        let identity = WirelessIdentity::discover(interface.as_deref(), &fallback);
        let backends = CapabilityDetector::available_backends();
        if backends.is_empty() {
            warn!("No wireless query tool found; every check will report not connected");
        } else {
            info!("Wireless backends: {:?}", backends);
        }
        WifiObserver::new(identity.interface, identity.hardware_id, backends, limit)
    })
    .await
    .context("Wireless discovery task failed")
}

fn connect_mqtt(config: &AgentConfig, device_id: &str) -> Result<MqttLink> {
    let mqtt = config
        .mqtt
        .as_ref()
        .context("store.backend is \"mqtt\" but [mqtt] is missing")?;

    let client_id = mqtt
        .client_id
        .clone()
        .unwrap_or_else(|| format!("officetrack-{}", device_id.replace(':', "")));

    let mut mqtt_options = MqttOptions::new(&client_id, &mqtt.broker_host, mqtt.broker_port);
    mqtt_options.set_keep_alive(Duration::from_secs(u64::from(mqtt.keep_alive_secs.max(5))));
    mqtt_options.set_clean_session(true);

    let (client, eventloop) = AsyncClient::new(mqtt_options, 10);
    info!("MQTT client {} -> {}:{}", client_id, mqtt.broker_host, mqtt.broker_port);

    let command_topic = mqtt
        .accept_commands
        .then(|| commands::command_topic(&mqtt.topic_prefix, device_id));

    Ok(MqttLink {
        client,
        eventloop,
        command_topic,
    })
}

/// Drives the MQTT connection and dispatches incoming commands
fn spawn_mqtt_eventloop(link: MqttLink, presence: PresenceHandle) -> JoinHandle<()> {
    let MqttLink {
        client,
        mut eventloop,
        command_topic,
    } = link;

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    // clean sessions drop subscriptions on reconnect
                    if let Some(topic) = &command_topic {
                        match client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                            Ok(()) => info!("Subscribed to commands on: {}", topic),
                            Err(e) => warn!("Failed to subscribe to {}: {}", topic, e),
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    debug!("Received MQTT message on topic: {}", publish.topic);
                    if command_topic.as_deref() != Some(publish.topic.as_str()) {
                        continue;
                    }
                    match commands::parse_command(&publish.payload) {
                        Ok(command) => commands::apply(command, &presence),
                        Err(e) => warn!("Ignoring command: {:#}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    })
}

/// `status`: one read, one classification, nothing reported
async fn print_status(config: AgentConfig, json: bool) -> Result<()> {
    let observer = build_observer(&config).await?;
    let classifier = PresenceClassifier::new(config.allow_list());

    let interface = observer.interface().map(String::from);
    let observation = tokio::task::spawn_blocking(move || {
        let observation = observer.current_observation();
        if classifier.wants_nearby(&observation) {
            let nearby = observer.visible_networks();
            (observation.with_nearby(nearby), classifier)
        } else {
            (observation, classifier)
        }
    })
    .await
    .context("Wireless read task failed")?;
    let (observation, classifier) = observation;

    let state = classifier.classify(&observation);
    let line = StatusLine {
        state,
        value: state.code(),
        description: state.description(),
        network_id: observation.network_id,
        hardware_id: observation.hardware_id,
        interface,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&line)?);
    } else {
        println!("{}", line.description);
        println!("  network:   {}", line.network_id.as_deref().unwrap_or("none"));
        println!("  interface: {}", line.interface.as_deref().unwrap_or("none"));
        println!("  device:    {}", line.hardware_id);
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("officetrack_agent=info,officetrack_core=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config_path = AgentConfig::resolve_path(cli.config)?;
    let config = AgentConfig::load(&config_path)
        .await
        .context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Setup => wizard::SetupWizard::run(&config_path, config).await,
        Commands::Status { json } => {
            config.validate().context("Invalid configuration")?;
            print_status(config, json).await
        }
        Commands::Run => {
            if AgentConfig::is_first_time_setup(&config_path) {
                warn!("No config file at {}; using defaults", config_path.display());
            }
            config.validate().context("Invalid configuration")?;

            info!("🏢 officetrack agent starting...");

            let mut agent = Agent::new(config).await.context("Failed to create agent")?;
            agent.run().await.context("Agent execution failed")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["officetrack-agent"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_global_config_flag() {
        let cli = Cli::try_parse_from(["officetrack-agent", "status", "--json", "--config", "/tmp/ot.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ot.toml")));
        assert!(matches!(cli.command, Some(Commands::Status { json: true })));
    }

    #[tokio::test]
    async fn test_mqtt_link_uses_device_topic() {
        let mut config = AgentConfig::default();
        config.presence.office_networks = vec!["officeNet".to_string()];

        let link = connect_mqtt(&config, "a1:b2:c3:d4:e5:f6").unwrap();
        assert_eq!(
            link.command_topic.as_deref(),
            Some("officetrack/agents/command@v1/a1:b2:c3:d4:e5:f6")
        );

        if let Some(mqtt) = config.mqtt.as_mut() {
            mqtt.accept_commands = false;
        }
        assert!(connect_mqtt(&config, "dev").unwrap().command_topic.is_none());
    }
}
