//! Wireless interface discovery and hardware identification
//!
//! This module handles:
//! - Designated wireless interface selection (configured > OS listing > name patterns)
//! - Interface enumeration with `if-addrs`
//! - Hardware id (lowercase MAC) of the designated interface

use crate::execution::{ToolRunner, DEFAULT_QUERY_LIMIT};
use anyhow::{Context, Result};
use if_addrs::get_if_addrs;
use mac_address::MacAddress;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Network interface information
#[derive(Debug, Clone)]
pub struct NetworkInterface {
    pub name: String,
    pub mac: Option<String>,
    pub interface_type: InterfaceType,
}

/// Interface type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    Ethernet,
    Wireless,
    Loopback,
    Other,
}

/// Identity of the designated wireless interface
#[derive(Debug, Clone)]
pub struct WirelessIdentity {
    pub interface: Option<String>,
    pub hardware_id: String,
    pub hostname: String,
}

impl WirelessIdentity {
    /// Resolves the designated interface and its hardware id
    pub fn discover(configured: Option<&str>, fallback_id: &str) -> Self {
        info!("Starting wireless interface discovery...");

        let interface = select_interface(configured);
        let hardware_id = match interface.as_deref() {
            Some(name) => interface_mac(name).unwrap_or_else(|| {
                warn!("No hardware address for {}, using '{}'", name, fallback_id);
                fallback_id.to_string()
            }),
            None => {
                warn!("No wireless interface found, using hardware id '{}'", fallback_id);
                fallback_id.to_string()
            }
        };

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_default();

        info!(
            "Discovery complete - Interface: {}, Hardware ID: {}, Hostname: {}",
            interface.as_deref().unwrap_or("none"),
            hardware_id,
            hostname
        );

        Self {
            interface,
            hardware_id,
            hostname,
        }
    }
}

/// Picks the designated wireless interface
pub fn select_interface(configured: Option<&str>) -> Option<String> {
    if let Some(name) = configured.map(str::trim).filter(|n| !n.is_empty()) {
        debug!("Using configured interface: {}", name);
        return Some(name.to_string());
    }

    if let Some(name) = os_wireless_interfaces().into_iter().next() {
        info!("Selected wireless interface: {}", name);
        return Some(name);
    }

    match enumerate_interfaces() {
        Ok(interfaces) => pick_wireless(&interfaces).map(|i| {
            info!("Selected wireless interface by name: {}", i.name);
            i.name.clone()
        }),
        Err(e) => {
            warn!("Interface enumeration failed: {:#}", e);
            None
        }
    }
}

/// Wireless interfaces as the OS lists them
fn os_wireless_interfaces() -> Vec<String> {
    if cfg!(target_os = "linux") {
        sysfs_wireless_interfaces()
    } else if cfg!(target_os = "macos") {
        ToolRunner::stdout("networksetup", &["-listallhardwareports"], DEFAULT_QUERY_LIMIT)
            .map(|out| parse_hardware_ports(&out))
            .unwrap_or_default()
    } else if cfg!(target_os = "windows") {
        ToolRunner::stdout("netsh", &["wlan", "show", "interfaces"], DEFAULT_QUERY_LIMIT)
            .map(|out| parse_netsh_interface_names(&out))
            .unwrap_or_default()
    } else {
        Vec::new()
    }
}

/// Interfaces exposing a `wireless` directory under `/sys/class/net`
fn sysfs_wireless_interfaces() -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir("/sys/class/net")
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|entry| entry.path().join("wireless").exists())
                .map(|entry| entry.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Enumerate non-loopback interfaces, one entry per name
pub fn enumerate_interfaces() -> Result<Vec<NetworkInterface>> {
    debug!("Enumerating network interfaces...");

    let if_addrs = get_if_addrs().context("Failed to enumerate network interfaces")?;

    let mut seen = BTreeSet::new();
    let mut interfaces = Vec::new();
    for if_addr in if_addrs {
        if if_addr.is_loopback() || !seen.insert(if_addr.name.clone()) {
            continue;
        }

        let interface = NetworkInterface {
            mac: interface_mac(&if_addr.name),
            interface_type: classify_interface(&if_addr.name),
            name: if_addr.name,
        };
        debug!("Found interface: {} ({:?})", interface.name, interface.interface_type);
        interfaces.push(interface);
    }

    Ok(interfaces)
}

/// Lowercase, colon-separated MAC of a named interface
pub fn interface_mac(interface_name: &str) -> Option<String> {
    match mac_address::mac_address_by_name(interface_name) {
        Ok(Some(mac)) => Some(format_mac(&mac)),
        Ok(None) => {
            debug!("No MAC found for interface: {}", interface_name);
            None
        }
        Err(e) => {
            debug!("Error getting MAC for {}: {}", interface_name, e);
            None
        }
    }
}

pub fn format_mac(mac: &MacAddress) -> String {
    let b = mac.bytes();
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        b[0], b[1], b[2], b[3], b[4], b[5]
    )
}

/// Classify interface type based on name patterns
pub fn classify_interface(name: &str) -> InterfaceType {
    let name_lower = name.to_lowercase();

    if name_lower == "lo" || name_lower.starts_with("lo0") || name_lower.contains("loopback") {
        return InterfaceType::Loopback;
    }

    // Check for wireless patterns
    if name_lower.contains("wlan")
        || name_lower.contains("wifi")
        || name_lower.contains("wi-fi")
        || name_lower.starts_with("wlp")
        || name_lower.starts_with("wlo")
        || name_lower.starts_with("wlx")
    {
        return InterfaceType::Wireless;
    }

    // Check for ethernet patterns
    if name_lower.starts_with("eth") || name_lower.starts_with("en") {
        return InterfaceType::Ethernet;
    }

    InterfaceType::Other
}

/// First wireless-looking interface that has a hardware address
fn pick_wireless(interfaces: &[NetworkInterface]) -> Option<&NetworkInterface> {
    let mut wireless = interfaces
        .iter()
        .filter(|i| i.interface_type == InterfaceType::Wireless);
    let first = wireless.clone().find(|i| i.mac.is_some());
    first.or_else(|| wireless.next())
}

/// Devices of the "Wi-Fi" / "AirPort" ports in `networksetup -listallhardwareports`
pub fn parse_hardware_ports(output: &str) -> Vec<String> {
    let mut devices = Vec::new();
    let mut in_wifi_port = false;

    for line in output.lines().map(str::trim) {
        if let Some(port) = line.strip_prefix("Hardware Port:") {
            let port = port.trim();
            in_wifi_port = port == "Wi-Fi" || port == "AirPort";
        } else if let Some(device) = line.strip_prefix("Device:") {
            if in_wifi_port {
                devices.push(device.trim().to_string());
            }
            in_wifi_port = false;
        }
    }

    devices
}

/// Interface names listed by `netsh wlan show interfaces`
pub fn parse_netsh_interface_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim() == "Name").then(|| value.trim().to_string())
        })
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, mac: Option<&str>) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            mac: mac.map(String::from),
            interface_type: classify_interface(name),
        }
    }

    #[test]
    fn test_interface_classification() {
        assert_eq!(classify_interface("eth0"), InterfaceType::Ethernet);
        assert_eq!(classify_interface("enp3s0"), InterfaceType::Ethernet);
        assert_eq!(classify_interface("wlan0"), InterfaceType::Wireless);
        assert_eq!(classify_interface("wlp2s0"), InterfaceType::Wireless);
        assert_eq!(classify_interface("Wi-Fi"), InterfaceType::Wireless);
        assert_eq!(classify_interface("lo"), InterfaceType::Loopback);
        assert_eq!(classify_interface("docker0"), InterfaceType::Other);
    }

    #[test]
    fn test_configured_interface_wins() {
        assert_eq!(select_interface(Some(" wlan7 ")).as_deref(), Some("wlan7"));
    }

    #[test]
    fn test_pick_wireless_prefers_interface_with_mac() {
        let interfaces = vec![
            iface("eth0", Some("00:11:22:33:44:55")),
            iface("wlan1", None),
            iface("wlp2s0", Some("a1:b2:c3:d4:e5:f6")),
        ];
        assert_eq!(pick_wireless(&interfaces).unwrap().name, "wlp2s0");

        let no_mac = vec![iface("eth0", None), iface("wlan1", None)];
        assert_eq!(pick_wireless(&no_mac).unwrap().name, "wlan1");

        assert!(pick_wireless(&[iface("eth0", None)]).is_none());
    }

    #[test]
    fn test_format_mac_is_lowercase() {
        let mac = MacAddress::new([0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6]);
        assert_eq!(format_mac(&mac), "a1:b2:c3:d4:e5:f6");
    }

    #[test]
    fn test_parse_hardware_ports() {
        let output = "\
Hardware Port: Ethernet
Device: en1
Ethernet Address: 00:11:22:33:44:55

Hardware Port: Wi-Fi
Device: en0
Ethernet Address: a1:b2:c3:d4:e5:f6
";
        assert_eq!(parse_hardware_ports(output), vec!["en0"]);
    }

    #[test]
    fn test_parse_netsh_interface_names() {
        let output = "\
There is 1 interface on the system:

    Name                   : Wi-Fi
    Description            : Intel(R) Wi-Fi 6 AX201 160MHz
    Physical address       : a1:b2:c3:d4:e5:f6
    State                  : connected
";
        assert_eq!(parse_netsh_interface_names(output), vec!["Wi-Fi"]);
    }

    #[test]
    fn test_unknown_interface_falls_back() {
        let identity = WirelessIdentity::discover(Some("officetrack-missing0"), "unknown");
        assert_eq!(identity.interface.as_deref(), Some("officetrack-missing0"));
        assert_eq!(identity.hardware_id, "unknown");
    }
}
