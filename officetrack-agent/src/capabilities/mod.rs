//! Cross-platform detection of the wireless tools this host offers
//!
//! Detects which SSID query backends are installed, in preference order:
//! - Linux: NetworkManager (`nmcli`), wireless-tools (`iwgetid`), `iw`
//! - macOS: `networksetup`
//! - Windows: `netsh wlan`

use serde::{Deserialize, Serialize};
use std::process::Command;
use tracing::debug;

/// Supported SSID query backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiBackend {
    NetworkManager,
    Iwgetid,
    Iw,
    Networksetup,
    Netsh,
}

impl WifiBackend {
    /// Executable the backend shells out to
    pub fn program(self) -> &'static str {
        match self {
            WifiBackend::NetworkManager => "nmcli",
            WifiBackend::Iwgetid => "iwgetid",
            WifiBackend::Iw => "iw",
            WifiBackend::Networksetup => "networksetup",
            WifiBackend::Netsh => "netsh",
        }
    }

    /// Can stream association changes as a long-running child
    pub fn can_monitor(self) -> bool {
        matches!(self, WifiBackend::NetworkManager | WifiBackend::Iw)
    }

    /// Can list networks advertised nearby
    pub fn can_scan(self) -> bool {
        matches!(self, WifiBackend::NetworkManager | WifiBackend::Netsh)
    }
}

/// Backend detection result
#[derive(Debug)]
pub struct BackendInfo {
    pub backend: WifiBackend,
    pub available: bool,
    pub reason: Option<String>,
}

pub struct CapabilityDetector;

impl CapabilityDetector {
    /// Backends worth probing on the current platform, best first
    pub fn candidates() -> &'static [WifiBackend] {
        if cfg!(target_os = "linux") {
            &[WifiBackend::NetworkManager, WifiBackend::Iwgetid, WifiBackend::Iw]
        } else if cfg!(target_os = "macos") {
            &[WifiBackend::Networksetup]
        } else if cfg!(target_os = "windows") {
            &[WifiBackend::Netsh]
        } else {
            &[]
        }
    }

    /// Probe every candidate backend
    pub fn detect_all() -> Vec<BackendInfo> {
        debug!("Detecting wireless query backends...");

        let backends: Vec<BackendInfo> = Self::candidates()
            .iter()
            .map(|&backend| {
                let available = Self::command_exists(backend.program());
                BackendInfo {
                    backend,
                    available,
                    reason: (!available).then(|| format!("{} not found in PATH", backend.program())),
                }
            })
            .collect();

        for info in backends.iter().filter(|b| !b.available) {
            debug!("{:?} unavailable: {}", info.backend, info.reason.as_deref().unwrap_or("unknown"));
        }

        let available_count = backends.iter().filter(|b| b.available).count();
        debug!("Detected {}/{} wireless backends available", available_count, backends.len());

        backends
    }

    /// Installed backends, best first
    pub fn available_backends() -> Vec<WifiBackend> {
        Self::detect_all()
            .into_iter()
            .filter(|b| b.available)
            .map(|b| b.backend)
            .collect()
    }

    /// First backend among `backends` able to stream association changes
    pub fn monitor_backend(backends: &[WifiBackend]) -> Option<WifiBackend> {
        backends.iter().copied().find(|b| b.can_monitor())
    }

    /// First backend among `backends` able to list nearby networks
    pub fn scan_backend(backends: &[WifiBackend]) -> Option<WifiBackend> {
        backends.iter().copied().find(|b| b.can_scan())
    }

    /// Check if a command exists in PATH
    pub fn command_exists(command: &str) -> bool {
        let check_command = if cfg!(target_os = "windows") {
            Command::new("where").arg(command).output()
        } else {
            Command::new("which").arg(command).output()
        };

        match check_command {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_detection_covers_candidates() {
        let detected = CapabilityDetector::detect_all();
        assert_eq!(detected.len(), CapabilityDetector::candidates().len());
        assert!(detected.iter().all(|b| b.available || b.reason.is_some()));
    }

    #[test]
    fn test_monitor_and_scan_selection() {
        let backends = [WifiBackend::Iwgetid, WifiBackend::Iw, WifiBackend::NetworkManager];
        assert_eq!(CapabilityDetector::monitor_backend(&backends), Some(WifiBackend::Iw));
        assert_eq!(CapabilityDetector::scan_backend(&backends), Some(WifiBackend::NetworkManager));
        assert_eq!(CapabilityDetector::monitor_backend(&[WifiBackend::Iwgetid]), None);
    }

    #[test]
    fn test_missing_command() {
        assert!(!CapabilityDetector::command_exists("officetrack-no-such-tool"));
    }
}
