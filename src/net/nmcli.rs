use std::process::Command;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{NetworkManager, WifiConnection};
use crate::error::NetworkError;

/// One row of `nmcli device status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub device: String,
    pub kind: String,
    pub state: String,
    pub connection: String,
}

/// Parse terse `DEVICE:TYPE:STATE:CONNECTION` output.
pub fn parse_device_status(output: &str) -> Vec<DeviceStatus> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(4, ':');
            Some(DeviceStatus {
                device: fields.next()?.to_string(),
                kind: fields.next()?.to_string(),
                state: fields.next()?.to_string(),
                connection: fields.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// NetworkManager backend driven through the `nmcli` command line tool.
pub struct NmcliManager {
    interface: Option<String>,
    settle: Duration,
}

impl NmcliManager {
    pub fn new(interface: Option<String>) -> Self {
        Self {
            interface,
            settle: Duration::from_secs(2),
        }
    }

    fn run(&self, args: &[&str], label: &str) -> Result<String, NetworkError> {
        debug!(command = label, "Running nmcli");
        let output = Command::new("nmcli").args(args).output()?;
        if !output.status.success() {
            return Err(NetworkError::Command {
                command: label.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn device_status(&self) -> Result<Vec<DeviceStatus>, NetworkError> {
        let output = self.run(
            &["--terse", "--fields", "DEVICE,TYPE,STATE,CONNECTION", "device", "status"],
            "nmcli device status",
        )?;
        Ok(parse_device_status(&output))
    }

    fn wifi_device(&self) -> Result<String, NetworkError> {
        if let Some(interface) = &self.interface {
            return Ok(interface.clone());
        }
        self.device_status()?
            .into_iter()
            .find(|d| d.kind.eq_ignore_ascii_case("wifi") && !d.state.eq_ignore_ascii_case("unmanaged"))
            .map(|d| d.device)
            .ok_or(NetworkError::NoDevice)
    }
}

impl NetworkManager for NmcliManager {
    fn current(&mut self) -> Result<Option<WifiConnection>, NetworkError> {
        Ok(self.device_status()?.into_iter().find_map(|d| {
            let connected = d.kind.eq_ignore_ascii_case("wifi") && d.state.eq_ignore_ascii_case("connected");
            let matches_interface = self.interface.as_ref().map_or(true, |i| *i == d.device);
            (connected && matches_interface && !d.connection.is_empty() && d.connection != "off/any").then(|| {
                WifiConnection {
                    ssid: d.connection,
                    device: d.device,
                }
            })
        }))
    }

    fn scan(&mut self) -> Result<(), NetworkError> {
        warn!("Scanning for WiFi networks...");
        self.run(&["device", "wifi", "list", "--rescan", "yes"], "nmcli device wifi list --rescan yes")?;
        info!("WiFi scan completed");
        Ok(())
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), NetworkError> {
        let current = self.current()?;
        if current.as_ref().is_some_and(|c| c.ssid == ssid) {
            info!(ssid, "Already connected to WiFi network");
            return Ok(());
        }

        let device = self.wifi_device()?;
        if current.is_some() {
            if let Err(e) = self.run(&["device", "disconnect", &device], "nmcli device disconnect") {
                warn!("Failed to disconnect from current network: {}", e);
            }
            thread::sleep(self.settle);
        }

        let mut args = vec!["device", "wifi", "connect", ssid];
        if !password.is_empty() {
            args.extend(["password", password]);
        }
        args.extend(["ifname", device.as_str()]);

        // The label leaves the password out of logs and errors
        self.run(&args, &format!("nmcli device wifi connect {} ifname {}", ssid, device))?;
        info!(ssid, device = %device, "Connected to WiFi network");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_status() {
        let output = "wlan0:wifi:connected:HomeNet\nlo:loopback:unmanaged:\neth0:ethernet:unavailable:\n";
        let devices = parse_device_status(output);

        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].device, "wlan0");
        assert_eq!(devices[0].connection, "HomeNet");
        assert_eq!(devices[1].connection, "");
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let devices = parse_device_status("garbage\nwlan1:wifi:disconnected");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].state, "disconnected");
    }
}
