use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::display::DEFAULT_COLUMNS;
use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub knobs: KnobsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub stations: StationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

/// Knob behaviour and volume scaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Volume used on first start, before any volume has been persisted.
    #[serde(default = "default_starting_volume")]
    pub starting_volume: u8,
    /// Ceiling percentage: user volume 100 maps to this transport volume.
    #[serde(default = "default_max_volume")]
    pub max_volume: u8,
    /// Volume change per encoder detent.
    #[serde(default = "default_volume_step")]
    pub volume_step: u8,
    /// How long the Volume / Pick / Title views stay up.
    #[serde(default = "default_display_timeout_ms")]
    pub display_timeout_ms: u64,
    /// How long the channel knob must be held to refresh the station list.
    #[serde(default = "default_long_press_ms")]
    pub long_press_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Panel width in character columns.
    #[serde(default = "default_columns")]
    pub columns: usize,
}

/// TCP socket where the GPIO bridge sends knob events and the panel driver
/// receives views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnobsConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_knob_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Any URL that answers quickly when the internet is reachable.
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
    #[serde(default = "default_probe_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,
}

/// Station list source — a local TOML file, or an m3u URL / file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsConfig {
    /// Path to a local TOML station file (highest priority).
    /// Defaults to `~/.config/knob-radio/stations.toml`.
    #[serde(default = "default_stations_toml")]
    pub stations_toml: PathBuf,
    /// URL or file path for an m3u station list (fallback when TOML not found).
    #[serde(default)]
    pub m3u_url: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            starting_volume: default_starting_volume(),
            max_volume: default_max_volume(),
            volume_step: default_volume_step(),
            display_timeout_ms: default_display_timeout_ms(),
            long_press_ms: default_long_press_ms(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
        }
    }
}

impl Default for KnobsConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_knob_port(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_url: default_probe_url(),
            interval_secs: default_probe_interval_secs(),
            timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            stations_toml: default_stations_toml(),
            m3u_url: String::new(),
        }
    }
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_starting_volume() -> u8 {
    50
}

fn default_max_volume() -> u8 {
    80
}

fn default_volume_step() -> u8 {
    2
}

fn default_display_timeout_ms() -> u64 {
    3000
}

fn default_long_press_ms() -> u64 {
    4000
}

fn default_columns() -> usize {
    DEFAULT_COLUMNS
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_knob_port() -> u16 {
    platform::KNOB_TCP_PORT
}

fn default_port() -> u16 {
    8989
}

fn default_probe_url() -> String {
    "http://connectivitycheck.gstatic.com/generate_204".to_string()
}

fn default_probe_interval_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_stations_toml() -> PathBuf {
    platform::config_dir().join("stations.toml")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.controller.starting_volume = config.controller.starting_volume.min(100);
        config.controller.max_volume = config.controller.max_volume.min(100);
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            controller: ControllerConfig::default(),
            display: DisplayConfig::default(),
            knobs: KnobsConfig::default(),
            http: HttpConfig::default(),
            connectivity: ConnectivityConfig::default(),
            stations: StationsConfig::default(),
        }
    }
}
