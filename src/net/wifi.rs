use std::thread;
use tracing::{error, info, warn};

use crate::config::WifiConfig;
use crate::error::NetworkError;
use crate::resilience::RetryPolicy;

/// Active wireless connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiConnection {
    pub ssid: String,
    pub device: String,
}

/// Host wireless configuration backend.
pub trait NetworkManager: Send {
    fn current(&mut self) -> Result<Option<WifiConnection>, NetworkError>;

    fn scan(&mut self) -> Result<(), NetworkError>;

    /// Connect to `ssid`; an empty password means an open network.
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), NetworkError>;
}

fn already_on(manager: &mut dyn NetworkManager, ssid: &str) -> bool {
    matches!(manager.current(), Ok(Some(current)) if current.ssid == ssid)
}

/// Try once, then scan and reconnect up to the policy's retry budget.
pub fn connect_with_retry(
    manager: &mut dyn NetworkManager,
    ssid: &str,
    password: &str,
    policy: &RetryPolicy,
) -> Result<(), NetworkError> {
    if already_on(manager, ssid) {
        info!(ssid, "Already connected to WiFi network");
        return Ok(());
    }

    match manager.connect(ssid, password) {
        Ok(()) => return Ok(()),
        Err(e) => warn!(ssid, "Initial connect failed: {}", e),
    }

    let attempts = policy.max_attempts();
    for attempt in 1..=attempts {
        warn!("Scanning and retrying... (attempt {}/{})", attempt, attempts);

        let result = manager.scan().and_then(|()| manager.connect(ssid, password));
        match result {
            Ok(()) => return Ok(()),
            Err(e) => warn!("Connection attempt {}/{} failed: {}", attempt, attempts, e),
        }

        if let Some(delay) = policy.delay_after(attempt) {
            thread::sleep(delay);
        }
    }

    error!(ssid, attempts, "Failed to connect to WiFi");
    Err(NetworkError::Exhausted {
        ssid: ssid.to_string(),
        attempts,
    })
}

/// Wireless connection held for one drone system.
///
/// Remembers the network the host was on before switching so it can be
/// restored at shutdown.
pub struct WifiSession {
    system: String,
    manager: Box<dyn NetworkManager>,
    previous: Option<WifiConnection>,
}

impl WifiSession {
    pub fn establish(
        system: impl Into<String>,
        mut manager: Box<dyn NetworkManager>,
        config: &WifiConfig,
    ) -> Result<Self, NetworkError> {
        let system = system.into();
        let previous = match manager.current() {
            Ok(previous) => previous,
            Err(e) => {
                warn!(system = %system, "Could not read current WiFi connection: {}", e);
                None
            }
        };

        info!(system = %system, ssid = %config.connect.ssid, "Initializing WiFi");
        connect_with_retry(
            manager.as_mut(),
            &config.connect.ssid,
            &config.connect.password,
            &config.retry_policy(),
        )?;

        Ok(Self {
            system,
            manager,
            previous,
        })
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn previous(&self) -> Option<&WifiConnection> {
        self.previous.as_ref()
    }

    /// Reconnect to the network that was active before `establish`.
    pub fn restore(&mut self) -> Result<(), NetworkError> {
        let Some(previous) = self.previous.clone() else {
            return Ok(());
        };
        if already_on(self.manager.as_mut(), &previous.ssid) {
            return Ok(());
        }
        info!(system = %self.system, ssid = %previous.ssid, "Reconnecting to previous WiFi network");
        self.manager.connect(&previous.ssid, "")
    }
}
