//! OS wireless observer
//!
//! Reads the SSID of the designated interface through whichever command-line
//! backend the host offers, and streams association changes from
//! `nmcli monitor` / `iw event` when one of those is installed.
//!
//! Reads never fail: a missing tool, a timeout or an unparseable answer all
//! collapse into "not associated".

use crate::capabilities::{CapabilityDetector, WifiBackend};
use crate::execution::ToolRunner;
use anyhow::Result;
use officetrack_core::{NetworkChangeSink, NetworkObservation, NetworkObserver, ObserverError};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct WifiObserver {
    interface: Option<String>,
    hardware_id: String,
    backends: Vec<WifiBackend>,
    query_limit: Duration,
}

impl WifiObserver {
    pub fn new(
        interface: Option<String>,
        hardware_id: impl Into<String>,
        backends: Vec<WifiBackend>,
        query_limit: Duration,
    ) -> Self {
        Self {
            interface,
            hardware_id: hardware_id.into(),
            backends,
            query_limit,
        }
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    pub fn hardware_id(&self) -> &str {
        &self.hardware_id
    }

    /// SSID as one backend sees it; `Err` means the backend could not answer
    fn query(&self, backend: WifiBackend) -> Result<Option<String>> {
        let iface = self.interface.as_deref();
        let limit = self.query_limit;

        match backend {
            WifiBackend::NetworkManager => {
                let mut args = vec!["-t", "-f", "ACTIVE,SSID", "dev", "wifi", "list", "--rescan", "no"];
                if let Some(name) = iface {
                    args.extend(["ifname", name]);
                }
                let out = ToolRunner::stdout("nmcli", &args, limit)?;
                Ok(parse_nmcli_wifi_list(&out)
                    .into_iter()
                    .find(|(active, _)| *active)
                    .map(|(_, ssid)| ssid))
            }
            WifiBackend::Iwgetid => {
                let mut args = vec!["-r"];
                if let Some(name) = iface {
                    args.push(name);
                }
                // exits non-zero when not associated
                let out = ToolRunner::run("iwgetid", &args, limit)?;
                Ok(if out.success { parse_iwgetid(&out.stdout) } else { None })
            }
            WifiBackend::Iw => {
                let name = iface.ok_or_else(|| anyhow::anyhow!("iw needs an interface name"))?;
                let out = ToolRunner::stdout("iw", &["dev", name, "link"], limit)?;
                Ok(parse_iw_link(&out))
            }
            WifiBackend::Networksetup => {
                let name = iface.unwrap_or("en0");
                let out = ToolRunner::stdout("networksetup", &["-getairportnetwork", name], limit)?;
                Ok(parse_networksetup(&out))
            }
            WifiBackend::Netsh => {
                let out = ToolRunner::stdout("netsh", &["wlan", "show", "interfaces"], limit)?;
                Ok(parse_netsh_interfaces(&out, iface))
            }
        }
    }

    /// First backend that answers is authoritative
    pub fn read_network_id(&self) -> Option<String> {
        for &backend in &self.backends {
            match self.query(backend) {
                Ok(ssid) => {
                    debug!("{} reports network {:?}", backend.program(), ssid);
                    return ssid;
                }
                Err(e) => debug!("{} query failed: {:#}", backend.program(), e),
            }
        }
        None
    }

    fn scan(&self) -> Result<Vec<String>> {
        let backend = CapabilityDetector::scan_backend(&self.backends)
            .ok_or_else(|| anyhow::anyhow!("no backend can list nearby networks"))?;

        match backend {
            WifiBackend::NetworkManager => {
                let out = ToolRunner::stdout(
                    "nmcli",
                    &["-t", "-f", "ACTIVE,SSID", "dev", "wifi", "list"],
                    self.query_limit,
                )?;
                Ok(dedup(parse_nmcli_wifi_list(&out).into_iter().map(|(_, ssid)| ssid)))
            }
            WifiBackend::Netsh => {
                let out = ToolRunner::stdout("netsh", &["wlan", "show", "networks"], self.query_limit)?;
                Ok(parse_netsh_networks(&out))
            }
            other => Err(anyhow::anyhow!("{} cannot scan", other.program())),
        }
    }
}

impl NetworkObserver for WifiObserver {
    fn current_observation(&self) -> NetworkObservation {
        match self.read_network_id() {
            Some(ssid) => NetworkObservation::connected(ssid, self.hardware_id.clone()),
            None => NetworkObservation::disconnected(self.hardware_id.clone()),
        }
    }

    fn visible_networks(&self) -> Vec<String> {
        self.scan().unwrap_or_else(|e| {
            debug!("Nearby scan unavailable: {:#}", e);
            Vec::new()
        })
    }

    fn subscribe_to_changes(
        &self,
        sink: Arc<dyn NetworkChangeSink>,
    ) -> Result<Option<JoinHandle<()>>, ObserverError> {
        let backend = CapabilityDetector::monitor_backend(&self.backends).ok_or_else(|| {
            ObserverError::MonitoringUnavailable("no backend streams wireless events".to_string())
        })?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ObserverError::MonitoringUnavailable(e.to_string()))?;

        let args: &[&str] = match backend {
            WifiBackend::Iw => &["event"],
            _ => &["monitor"],
        };

        // spawn inside the runtime so the child's pipes register with its reactor
        let _guard = runtime.enter();
        let mut child = tokio::process::Command::new(backend.program())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ObserverError::MonitoringUnavailable(format!("{} failed to start: {}", backend.program(), e))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ObserverError::MonitoringUnavailable(format!("{} has no stdout", backend.program()))
        })?;

        let observer = self.clone();
        // aborting the task drops the child, which kills it
        let monitor = runtime.spawn(async move {
            let mut last = {
                let observer = observer.clone();
                tokio::task::spawn_blocking(move || observer.read_network_id())
                    .await
                    .unwrap_or(None)
            };
            info!("Watching {} for association changes (current: {:?})", backend.program(), last);

            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("{} stream error: {}", backend.program(), e);
                        break;
                    }
                };

                if !is_association_event(backend, &line, observer.interface()) {
                    continue;
                }

                let reader = observer.clone();
                let observation = match tokio::task::spawn_blocking(move || reader.current_observation()).await {
                    Ok(observation) => observation,
                    Err(e) => {
                        warn!("Observation task failed: {}", e);
                        continue;
                    }
                };

                if observation.network_id != last {
                    debug!("Association changed: {:?} -> {:?}", last, observation.network_id);
                    last = observation.network_id.clone();
                    sink.network_changed(observation);
                }
            }

            warn!("{} exited; presence falls back to polling", backend.program());
            let _ = child.kill().await;
        });

        Ok(Some(monitor))
    }
}

/// Whether a monitor line may signal an association change
pub fn is_association_event(backend: WifiBackend, line: &str, interface: Option<&str>) -> bool {
    let on_interface = |name: &str| interface.map_or(true, |iface| name == iface);

    match backend {
        // "wlan0 (phy #0): connected to a1:b2:.." / "wlan0 (phy #0): disconnected (by AP)"
        WifiBackend::Iw => {
            let (device, rest) = match line.split_once(':') {
                Some(parts) => parts,
                None => return false,
            };
            let device = device.split_whitespace().next().unwrap_or_default();
            on_interface(device) && rest.contains("connected")
        }
        // "wlan0: connected" / "wlan0: disconnected" / "officeNet: connection profile changed"
        WifiBackend::NetworkManager => match line.split_once(':') {
            Some((device, rest)) => {
                let rest = rest.trim();
                let device_event = rest == "connected"
                    || rest == "disconnected"
                    || rest.starts_with("using connection");
                device_event && on_interface(device.trim())
            }
            None => false,
        },
        _ => false,
    }
}

/// Splits an `nmcli -t` line on unescaped colons
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = vec![String::new()];
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    if let Some(field) = fields.last_mut() {
                        field.push(escaped);
                    }
                }
            }
            ':' => fields.push(String::new()),
            other => {
                if let Some(field) = fields.last_mut() {
                    field.push(other);
                }
            }
        }
    }
    fields
}

/// `(active, ssid)` pairs from `nmcli -t -f ACTIVE,SSID dev wifi list`
pub fn parse_nmcli_wifi_list(output: &str) -> Vec<(bool, String)> {
    output
        .lines()
        .filter_map(|line| {
            let fields = split_terse(line);
            let active = fields.first()?.as_str();
            let ssid = fields.get(1)?;
            if ssid.is_empty() {
                return None;
            }
            Some((active == "yes" || active == "*", ssid.clone()))
        })
        .collect()
}

/// `iwgetid -r` prints the bare SSID
pub fn parse_iwgetid(output: &str) -> Option<String> {
    let ssid = output.trim_end_matches(['\r', '\n']);
    (!ssid.trim().is_empty()).then(|| ssid.to_string())
}

/// `iw dev <if> link`: "Not connected." or an indented `SSID: name` line
pub fn parse_iw_link(output: &str) -> Option<String> {
    if output.trim_start().starts_with("Not connected") {
        return None;
    }
    output
        .lines()
        .find_map(|line| line.trim_start().strip_prefix("SSID: "))
        .map(|ssid| ssid.trim_end().to_string())
        .filter(|ssid| !ssid.is_empty())
}

/// `networksetup -getairportnetwork`: "Current Wi-Fi Network: name"
pub fn parse_networksetup(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| {
            let line = line.trim();
            line.strip_prefix("Current Wi-Fi Network: ")
                .or_else(|| line.strip_prefix("Current AirPort Network: "))
        })
        .map(str::to_string)
        .filter(|ssid| !ssid.is_empty())
}

/// `netsh wlan show interfaces`: the `SSID` of the matching (or first) interface
pub fn parse_netsh_interfaces(output: &str, interface: Option<&str>) -> Option<String> {
    let mut current_name: Option<String> = None;
    let mut connected = false;

    for line in output.lines() {
        let (key, value) = match line.split_once(':') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => continue,
        };

        match key {
            "Name" => {
                current_name = Some(value.to_string());
                connected = false;
            }
            "State" => connected = value.eq_ignore_ascii_case("connected"),
            "SSID" => {
                let wanted = match (interface, current_name.as_deref()) {
                    (Some(iface), Some(name)) => iface == name,
                    _ => true,
                };
                if wanted && connected && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// `netsh wlan show networks`: "SSID 1 : name" lines
pub fn parse_netsh_networks(output: &str) -> Vec<String> {
    dedup(output.lines().filter_map(|line| {
        let (key, value) = line.split_once(':')?;
        let key = key.trim();
        let is_ssid = key.starts_with("SSID ") && !key.starts_with("BSSID");
        let value = value.trim();
        (is_ssid && !value.is_empty()).then(|| value.to_string())
    }))
}

fn dedup(ssids: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for ssid in ssids {
        if !seen.contains(&ssid) {
            seen.push(ssid);
        }
    }
    seen
}
