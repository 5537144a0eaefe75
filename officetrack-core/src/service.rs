//! Presence service
//!
//! A single actor task owns the presence state. Every trigger source (startup,
//! timer, network change, explicit user action) only enqueues a `Trigger`; the
//! actor runs each read -> classify -> update -> report cycle to completion
//! before taking the next one. Readers get the last published
//! `PresenceSnapshot` through a watch channel.

use crate::classifier::PresenceClassifier;
use crate::model::{NetworkObservation, PresenceReport, PresenceState, UNKNOWN_HARDWARE_ID};
use crate::observer::{NetworkChangeSink, NetworkObserver};
use crate::reporter::{spawn_outbox, StatusReporter};
use crate::state::DisplayName;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// When a cycle submits a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPolicy {
    /// Every cycle reports, changed or not
    #[default]
    Always,
    /// Only cycles whose (state, device id, username) differ from the last report
    OnChange,
}

/// Trigger sources that may start a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSources {
    pub startup: bool,
    pub timer: bool,
    pub network_events: bool,
}

impl Default for TriggerSources {
    fn default() -> Self {
        Self {
            startup: true,
            timer: true,
            network_events: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub poll_interval: Duration,
    pub triggers: TriggerSources,
    pub report_policy: ReportPolicy,
    /// Upper bound on a single store write; a stuck write would hold up every later report
    pub write_timeout: Duration,
    /// Device id reported when the interface could not be read at all
    pub device_id_fallback: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            triggers: TriggerSources::default(),
            report_policy: ReportPolicy::Always,
            write_timeout: Duration::from_secs(10),
            device_id_fallback: UNKNOWN_HARDWARE_ID.to_string(),
        }
    }
}

/// What started a presence cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Tick,
    NetworkChanged(NetworkObservation),
    Explicit,
}

enum Command {
    Cycle(Trigger),
    Shutdown,
}

/// Last published presence view
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PresenceSnapshot {
    pub state: PresenceState,
    pub network_id: Option<String>,
    pub device_id: Option<String>,
    /// Completed cycles; 0 until the first trigger ran
    pub cycle: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PresenceSnapshot {
    pub fn is_initialized(&self) -> bool {
        self.cycle > 0
    }
}

/// Forwards observer change notifications into the trigger queue
struct TriggerSink {
    commands: mpsc::UnboundedSender<Command>,
}

impl NetworkChangeSink for TriggerSink {
    fn network_changed(&self, observation: NetworkObservation) {
        if self
            .commands
            .send(Command::Cycle(Trigger::NetworkChanged(observation)))
            .is_err()
        {
            debug!("Network change dropped, presence service stopped");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    value: u8,
    device_id: String,
    username: String,
}

impl From<&PresenceReport> for Fingerprint {
    fn from(report: &PresenceReport) -> Self {
        Self {
            value: report.value,
            device_id: report.device_id.clone(),
            username: report.display_name.clone(),
        }
    }
}

/// Wiring of observer, classifier and reporter, consumed by `start`
pub struct PresenceService {
    observer: Arc<dyn NetworkObserver>,
    classifier: PresenceClassifier,
    reporter: Arc<dyn StatusReporter>,
    display_name: DisplayName,
    config: ServiceConfig,
}

impl PresenceService {
    pub fn new(
        observer: Arc<dyn NetworkObserver>,
        classifier: PresenceClassifier,
        reporter: Arc<dyn StatusReporter>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            observer,
            classifier,
            reporter,
            display_name: DisplayName::default(),
            config,
        }
    }

    /// Shares a display-name holder with the UI side
    pub fn with_display_name(mut self, display_name: DisplayName) -> Self {
        self.display_name = display_name;
        self
    }

    /// Spawns the actor, outbox and trigger sources. Must run inside a tokio runtime.
    pub fn start(self) -> PresenceHandle {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(PresenceSnapshot::default());
        let (outbox, outbox_task) = spawn_outbox(self.reporter.clone(), self.config.write_timeout);

        let mut tasks = vec![outbox_task];
        let triggers = self.config.triggers;

        if triggers.network_events {
            let sink = Arc::new(TriggerSink {
                commands: commands.clone(),
            });
            match self.observer.subscribe_to_changes(sink) {
                Ok(monitor) => {
                    info!("Network change notifications enabled");
                    tasks.extend(monitor);
                }
                Err(e) => warn!("{}; falling back to polling only", e),
            }
        }

        if triggers.timer {
            tasks.push(spawn_timer(commands.clone(), self.config.poll_interval));
        }

        if triggers.startup {
            let _ = commands.send(Command::Cycle(Trigger::Startup));
        }

        let actor = PresenceActor {
            observer: self.observer,
            classifier: self.classifier,
            display_name: self.display_name.clone(),
            policy: self.config.report_policy,
            device_id_fallback: self.config.device_id_fallback.clone(),
            outbox,
            snapshots: snapshot_tx,
            last_state: None,
            last_reported: None,
            cycle: 0,
        };
        tasks.push(tokio::spawn(actor.run(command_rx)));

        info!(
            "Presence service started (interval: {:?}, policy: {:?}, triggers: {:?})",
            self.config.poll_interval, self.config.report_policy, triggers
        );

        PresenceHandle {
            commands,
            snapshots,
            display_name: self.display_name,
            tasks: Arc::new(Mutex::new(tasks)),
        }
    }
}

fn spawn_timer(commands: mpsc::UnboundedSender<Command>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        // the startup trigger covers t=0
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            if commands.send(Command::Cycle(Trigger::Tick)).is_err() {
                break;
            }
        }
    })
}

struct PresenceActor {
    observer: Arc<dyn NetworkObserver>,
    classifier: PresenceClassifier,
    display_name: DisplayName,
    policy: ReportPolicy,
    device_id_fallback: String,
    outbox: mpsc::UnboundedSender<PresenceReport>,
    snapshots: watch::Sender<PresenceSnapshot>,
    last_state: Option<PresenceState>,
    last_reported: Option<Fingerprint>,
    cycle: u64,
}

impl PresenceActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Cycle(trigger) => self.run_cycle(trigger).await,
                Command::Shutdown => break,
            }
        }
        debug!("Presence actor stopped after {} cycles", self.cycle);
    }

    async fn run_cycle(&mut self, trigger: Trigger) {
        let observation = match trigger {
            Trigger::NetworkChanged(ref observation) => self.complete(observation.clone()).await,
            _ => self.read_observation().await,
        };

        let state = self.classifier.classify(&observation);
        let previous = self.last_state.replace(state);
        self.cycle += 1;

        match previous {
            Some(previous) if previous == state => {
                debug!("Presence unchanged: {} ({:?})", state, trigger);
            }
            _ => info!(
                "Presence {} -> {} on {} ({:?})",
                previous.map(|s| s.to_string()).unwrap_or_else(|| "uninitialized".to_string()),
                state,
                observation.network_id.as_deref().unwrap_or("<none>"),
                trigger
            ),
        }

        let report = PresenceReport::new(
            state,
            observation.hardware_id.clone(),
            &self.display_name.get(),
            Utc::now().timestamp(),
        );

        if self.should_report(&report) {
            self.last_reported = Some(Fingerprint::from(&report));
            if self.outbox.send(report).is_err() {
                warn!("Status outbox closed, report dropped");
            }
        } else {
            debug!("Report skipped, nothing changed since last report");
        }

        self.snapshots.send_replace(PresenceSnapshot {
            state,
            network_id: observation.network_id,
            device_id: Some(observation.hardware_id),
            cycle: self.cycle,
            updated_at: Some(Utc::now()),
        });
    }

    fn should_report(&self, report: &PresenceReport) -> bool {
        match self.policy {
            ReportPolicy::Always => true,
            ReportPolicy::OnChange => self.last_reported.as_ref() != Some(&Fingerprint::from(report)),
        }
    }

    /// OS reads may shell out, so they run on the blocking pool
    async fn read_observation(&self) -> NetworkObservation {
        let observer = self.observer.clone();
        let classifier = self.classifier.clone();

        let read = tokio::task::spawn_blocking(move || {
            let mut observation = observer.current_observation();
            if classifier.wants_nearby(&observation) {
                observation.nearby = observer.visible_networks();
            }
            observation
        })
        .await;

        match read {
            Ok(observation) => observation,
            Err(e) => {
                warn!("Network observation task failed: {}", e);
                NetworkObservation::disconnected(self.device_id_fallback.clone())
            }
        }
    }

    /// Adds nearby networks to a pushed observation when the proximity rule needs them
    async fn complete(&self, mut observation: NetworkObservation) -> NetworkObservation {
        if observation.nearby.is_empty() && self.classifier.wants_nearby(&observation) {
            let observer = self.observer.clone();
            match tokio::task::spawn_blocking(move || observer.visible_networks()).await {
                Ok(nearby) => observation.nearby = nearby,
                Err(e) => warn!("Nearby network scan failed: {}", e),
            }
        }
        observation
    }
}

/// UI-facing handle on a running presence service
#[derive(Clone)]
pub struct PresenceHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<PresenceSnapshot>,
    display_name: DisplayName,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl PresenceHandle {
    pub fn current_presence_state(&self) -> PresenceState {
        self.snapshots.borrow().state
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every completed cycle
    pub fn subscribe(&self) -> watch::Receiver<PresenceSnapshot> {
        self.snapshots.clone()
    }

    /// Takes effect on the next cycle; no read is started
    pub fn set_display_name(&self, name: impl Into<String>) {
        let name = name.into();
        debug!("Display name set to {:?}", name);
        self.display_name.set(name);
    }

    pub fn display_name(&self) -> String {
        self.display_name.get()
    }

    pub fn trigger_immediate_update(&self) {
        if self.commands.send(Command::Cycle(Trigger::Explicit)).is_err() {
            debug!("Immediate update ignored, presence service stopped");
        }
    }

    /// Stops all service tasks; queued reports are abandoned
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!("Presence service stopped");
    }
}
