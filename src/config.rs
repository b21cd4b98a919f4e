use crate::error::{Result, SoundbarError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default TCP port of the soundbar control service
pub const DEFAULT_PORT: u16 = 9741;

/// Default volume step, in percent of the device volume range
pub const DEFAULT_VOLUME_STEP: f64 = 1.0;

/// Interval between two poll passes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Bound on a single TCP connect attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Bound on the reconnect a failed command performs before giving up
pub const DEFAULT_COMMAND_RECONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration of one soundbar
///
/// The persisted fields mirror what a host stores per configured device. Timing
/// knobs are not persisted and default to the protocol's usual values.
///
/// # Example
///
/// ```
/// use lgsoundbar::DeviceConfig;
///
/// let config: DeviceConfig = serde_json::from_str(
///     r#"{"id": "living", "name": "Living room", "address": "192.168.1.40"}"#,
/// ).unwrap();
/// assert_eq!(config.port, 9741);
/// assert!(!config.always_on);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier, carried in every event
    pub id: String,

    /// Display name
    pub name: String,

    /// Host name or IP address
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Volume step in percent of the volume range
    #[serde(default = "default_volume_step")]
    pub volume_step: f64,

    /// Keep polling even while the device reports itself off
    #[serde(default)]
    pub always_on: bool,

    #[serde(skip, default = "default_poll_interval")]
    pub poll_interval: Duration,

    #[serde(skip, default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    #[serde(skip, default = "default_command_reconnect_timeout")]
    pub command_reconnect_timeout: Duration,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_volume_step() -> f64 {
    DEFAULT_VOLUME_STEP
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_command_reconnect_timeout() -> Duration {
    DEFAULT_COMMAND_RECONNECT_TIMEOUT
}

impl DeviceConfig {
    /// Create a configuration with default port, step and timings
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            port: DEFAULT_PORT,
            volume_step: DEFAULT_VOLUME_STEP,
            always_on: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_reconnect_timeout: DEFAULT_COMMAND_RECONNECT_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_volume_step(mut self, step: f64) -> Self {
        self.volume_step = step;
        self
    }

    pub fn with_always_on(mut self, always_on: bool) -> Self {
        self.always_on = always_on;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_command_reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.command_reconnect_timeout = timeout;
        self
    }

    /// `host:port` used to dial the device
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Reject configurations the client cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(SoundbarError::InvalidConfig("device id is empty".to_string()));
        }
        if self.address.trim().is_empty() {
            return Err(SoundbarError::InvalidConfig("address is empty".to_string()));
        }
        if self.port == 0 {
            return Err(SoundbarError::InvalidConfig("port must not be 0".to_string()));
        }
        if !(self.volume_step > 0.0 && self.volume_step <= 100.0) {
            return Err(SoundbarError::InvalidConfig(format!(
                "volume step {} is outside (0, 100]",
                self.volume_step
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(SoundbarError::InvalidConfig("poll interval must not be zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_applies_defaults() {
        let config: DeviceConfig =
            serde_json::from_str(r#"{"id":"a","name":"Bar","address":"10.0.0.2"}"#).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.volume_step, DEFAULT_VOLUME_STEP);
        assert!(!config.always_on);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.socket_address(), "10.0.0.2:9741");
    }

    #[test]
    fn deserialize_explicit_values() {
        let config: DeviceConfig = serde_json::from_str(
            r#"{"id":"a","name":"Bar","address":"h","port":1234,"volume_step":2.5,"always_on":true}"#,
        )
        .unwrap();
        assert_eq!(config.port, 1234);
        assert_eq!(config.volume_step, 2.5);
        assert!(config.always_on);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(DeviceConfig::new("a", "n", "h").validate().is_ok());
        assert!(DeviceConfig::new("", "n", "h").validate().is_err());
        assert!(DeviceConfig::new("a", "n", " ").validate().is_err());
        assert!(DeviceConfig::new("a", "n", "h").with_port(0).validate().is_err());
        assert!(DeviceConfig::new("a", "n", "h").with_volume_step(0.0).validate().is_err());
        assert!(DeviceConfig::new("a", "n", "h").with_volume_step(101.0).validate().is_err());
        assert!(DeviceConfig::new("a", "n", "h")
            .with_poll_interval(Duration::ZERO)
            .validate()
            .is_err());
    }
}
