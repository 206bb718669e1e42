// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Configuration module

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::camera::FrameSize;
use crate::sensors::Level;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,

    /// Enable demo mode (simulated pin and camera)
    pub demo_mode: bool,

    /// Presence sensor configuration
    pub sensor: SensorConfig,

    /// Camera and capture store configuration
    pub camera: CameraConfig,

    /// Event fan-out configuration
    pub events: EventConfig,

    /// Outbound notification configuration
    pub notify: NotifyConfig,

    /// Web status server configuration
    pub web: WebConfig,

    /// Wall clock configuration
    pub clock: ClockConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            demo_mode: true,
            sensor: SensorConfig::default(),
            camera: CameraConfig::default(),
            events: EventConfig::default(),
            notify: NotifyConfig::default(),
            web: WebConfig::default(),
            clock: ClockConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("coopcam"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(self.sensor.edge_queue_capacity > 0, "sensor.edge_queue_capacity must be > 0");
        ensure!(self.events.capacity > 0, "events.capacity must be > 0");
        ensure!(self.camera.capture_attempts > 0, "camera.capture_attempts must be > 0");
        ensure!(
            (10..=63).contains(&self.camera.jpeg_quality),
            "camera.jpeg_quality must be within 10..=63, got {}",
            self.camera.jpeg_quality
        );
        ensure!(self.camera.recapture_interval_ms > 0, "camera.recapture_interval_ms must be > 0");
        ensure!(self.sensor.poll_interval_ms > 0, "sensor.poll_interval_ms must be > 0");
        ensure!(
            (0.0..=1.0).contains(&self.camera.simulated_failure_rate),
            "camera.simulated_failure_rate must be within 0..=1"
        );
        ensure!(
            (-1439..=1439).contains(&self.clock.utc_offset_minutes),
            "clock.utc_offset_minutes out of range: {}",
            self.clock.utc_offset_minutes
        );
        ensure!(
            !(self.notify.enabled
                && self.notify.has_credentials()
                && self.web.public_url.is_none()
                && self.web.binds_unspecified()),
            "web.public_url must be set when alerts are sent and web.bind is {}",
            self.web.bind
        );
        Ok(())
    }
}

/// Presence sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// GPIO pin number (informational for simulated pins)
    pub pin: u32,

    /// Level that means "object present"
    pub active_level: Level,

    /// Delay between an edge and the confirming read
    pub debounce_ms: u64,

    /// Pending edge notifications before new ones are dropped
    pub edge_queue_capacity: usize,

    /// sysfs value file; defaults to `/sys/class/gpio/gpio<pin>/value`
    pub sysfs_path: Option<PathBuf>,

    /// Level sampling period when edges are found by polling
    pub poll_interval_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            pin: 13,
            active_level: Level::High,
            debounce_ms: 50,
            edge_queue_capacity: 10,
            sysfs_path: None,
            poll_interval_ms: 10,
        }
    }
}

impl SensorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Camera and capture store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub frame_size: FrameSize,

    /// JPEG quality, 10 (best) to 63
    pub jpeg_quality: u8,

    /// Attempts per capture before giving up
    pub capture_attempts: u32,

    /// Fixed delay between capture attempts
    pub retry_backoff_ms: u64,

    /// Bound on device and photo lock acquisition
    pub lock_timeout_ms: u64,

    /// Bound on the `has_photo` existence check
    pub has_photo_timeout_ms: u64,

    /// Recapture period while presence stays confirmed
    pub recapture_interval_ms: u64,

    /// Probability that a simulated capture attempt fails
    pub simulated_failure_rate: f64,

    /// Program and arguments that write one JPEG to stdout, used outside
    /// demo mode
    pub command: Vec<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            frame_size: FrameSize::Svga,
            jpeg_quality: 45,
            capture_attempts: 3,
            retry_backoff_ms: 100,
            lock_timeout_ms: 1000,
            has_photo_timeout_ms: 100,
            recapture_interval_ms: 2000,
            simulated_failure_rate: 0.05,
            command: Vec::new(),
        }
    }
}

impl CameraConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn has_photo_timeout(&self) -> Duration {
        Duration::from_millis(self.has_photo_timeout_ms)
    }

    pub fn recapture_interval(&self) -> Duration {
        Duration::from_millis(self.recapture_interval_ms)
    }
}

/// Event fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Queue capacity between producers and the state consumer
    pub capacity: usize,

    /// How long a producer waits for room before dropping an event
    pub send_timeout_ms: u64,

    /// Consumer idle tick
    pub recv_timeout_ms: u64,

    /// Bound on state cache lock acquisition
    pub state_lock_timeout_ms: u64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            send_timeout_ms: 100,
            recv_timeout_ms: 1000,
            state_lock_timeout_ms: 100,
        }
    }
}

impl EventConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn state_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.state_lock_timeout_ms)
    }
}

/// Outbound notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,

    /// Minimum time between two dispatches
    pub cooldown_secs: u64,

    /// Recipient phone number, international format
    pub phone: Option<String>,

    /// CallMeBot API key
    pub api_key: Option<String>,

    pub api_url: String,

    pub request_timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 10,
            phone: None,
            api_key: None,
            api_url: "https://api.callmebot.com/whatsapp.php".to_string(),
            request_timeout_secs: 15,
        }
    }
}

impl NotifyConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Both phone and API key are present
    pub fn has_credentials(&self) -> bool {
        self.phone.as_deref().map_or(false, |p| !p.is_empty())
            && self.api_key.as_deref().map_or(false, |k| !k.is_empty())
    }
}

/// Web status server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,

    /// Externally reachable base URL used in notification links
    pub public_url: Option<String>,

    /// Auto-refresh period of the HTML page
    pub refresh_secs: u32,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0".to_string(),
            port: 80,
            public_url: None,
            refresh_secs: 5,
        }
    }
}

impl WebConfig {
    /// Base URL for links. Without `public_url` the bind address is used,
    /// and a wildcard bind is replaced by this host's outbound address.
    pub fn base_url(&self) -> String {
        if let Some(url) = &self.public_url {
            return url.trim_end_matches('/').to_string();
        }

        let host = if self.binds_unspecified() {
            let ip = local_address().unwrap_or_else(|| {
                warn!("No routable address found, photo links will use loopback");
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            });
            warn!("web.public_url not set, photo links use {}", ip);
            match ip {
                IpAddr::V6(v6) => format!("[{}]", v6),
                IpAddr::V4(v4) => v4.to_string(),
            }
        } else {
            self.bind.clone()
        };

        if self.port == 80 {
            format!("http://{}", host)
        } else {
            format!("http://{}:{}", host, self.port)
        }
    }

    /// Bind address is `0.0.0.0` or `::`
    pub fn binds_unspecified(&self) -> bool {
        self.bind.parse::<IpAddr>().map_or(false, |ip| ip.is_unspecified())
    }
}

/// Address of the interface that routes outward. Connecting a UDP socket
/// only selects a route; nothing is sent.
fn local_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// Wall clock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Local time offset from UTC in minutes
    pub utc_offset_minutes: i32,

    /// Treat the system clock as synchronised at start-up
    pub assume_synced: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: -300,
            assume_synced: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sensor.debounce(), Duration::from_millis(50));
        assert_eq!(config.camera.recapture_interval(), Duration::from_secs(2));
        assert_eq!(config.notify.cooldown(), Duration::from_secs(10));
        assert_eq!(config.camera.capture_attempts, 3);
        assert_eq!(config.events.capacity, 20);
    }

    #[test]
    fn test_toml_roundtrip_keeps_polarity() {
        let mut config = Config::default();
        config.sensor.active_level = Level::Low;
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.sensor.active_level, Level::Low);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str("[sensor]\ndebounce_ms = 20\n").unwrap();
        assert_eq!(parsed.sensor.debounce_ms, 20);
        assert_eq!(parsed.sensor.edge_queue_capacity, 10);
        assert_eq!(parsed.notify.cooldown_secs, 10);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.events.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_quality_out_of_range() {
        let mut config = Config::default();
        config.camera.jpeg_quality = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_require_both_fields() {
        let mut notify = NotifyConfig::default();
        assert!(!notify.has_credentials());
        notify.phone = Some("+570000000".into());
        assert!(!notify.has_credentials());
        notify.api_key = Some("123456".into());
        assert!(notify.has_credentials());
    }

    #[test]
    fn test_base_url() {
        let mut web = WebConfig::default();
        web.bind = "192.168.1.40".into();
        assert_eq!(web.base_url(), "http://192.168.1.40");
        web.port = 8080;
        assert_eq!(web.base_url(), "http://192.168.1.40:8080");
        web.public_url = Some("http://coop.local/".into());
        assert_eq!(web.base_url(), "http://coop.local");
    }

    #[test]
    fn test_wildcard_bind_never_leaks_into_links() {
        let web = WebConfig::default();
        assert!(web.binds_unspecified());
        let url = web.base_url();
        assert!(url.starts_with("http://"));
        assert!(!url.contains("0.0.0.0"), "unroutable link {}", url);

        let web = WebConfig { bind: "::".into(), port: 8080, ..WebConfig::default() };
        let url = web.base_url();
        assert!(!url.contains("[::]"), "unroutable link {}", url);
        assert!(url.ends_with(":8080"));
    }

    #[test]
    fn test_alerts_with_wildcard_bind_need_public_url() {
        let mut config = Config::default();
        config.notify.phone = Some("+570000000".into());
        config.notify.api_key = Some("123456".into());
        assert!(config.validate().is_err());

        config.web.public_url = Some("http://coop.example.net".into());
        assert!(config.validate().is_ok());

        config.web.public_url = None;
        config.web.bind = "192.168.1.40".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_extreme_utc_offset() {
        let mut config = Config::default();
        config.clock.utc_offset_minutes = i32::MIN;
        assert!(config.validate().is_err());
        config.clock.utc_offset_minutes = 1440;
        assert!(config.validate().is_err());
        config.clock.utc_offset_minutes = -1439;
        assert!(config.validate().is_ok());
    }
}
