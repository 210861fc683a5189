use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub switcher: SwitcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

/// Local control surfaces used by screens: a framed TCP socket and an HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_socket_port")]
    pub socket_port: u16,
    #[serde(default = "default_http_enabled")]
    pub http_enabled: bool,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

/// Playlist source: either an http(s):// URL or a local file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistConfig {
    #[serde(default = "default_playlist_url")]
    pub url: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Start the first channel once the playlist has loaded and nothing is playing.
    #[serde(default = "default_true")]
    pub autoplay_first: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Pause between releasing one native player and building the next.
    #[serde(default = "default_grace_delay_ms")]
    pub grace_delay_ms: u64,
    /// A session stuck in Loading longer than this is marked Error.
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
    #[serde(default = "default_min_buffer_ms")]
    pub min_buffer_ms: u64,
    #[serde(default = "default_max_buffer_ms")]
    pub max_buffer_ms: u64,
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitcherConfig {
    /// Quiet period after the last step before the switch commits.
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    /// How long the "now playing" banner stays up after a commit.
    #[serde(default = "default_now_playing_secs")]
    pub now_playing_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            socket_port: default_socket_port(),
            http_enabled: default_http_enabled(),
            http_port: default_http_port(),
        }
    }
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            url: default_playlist_url(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            autoplay_first: true,
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            grace_delay_ms: default_grace_delay_ms(),
            load_timeout_secs: default_load_timeout_secs(),
            min_buffer_ms: default_min_buffer_ms(),
            max_buffer_ms: default_max_buffer_ms(),
            network_timeout_secs: default_network_timeout_secs(),
            user_agent: default_user_agent(),
            referrer: None,
        }
    }
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            now_playing_secs: default_now_playing_secs(),
        }
    }
}

impl PlaylistConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl PlayerConfig {
    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

impl SwitcherConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn now_playing(&self) -> Duration {
        Duration::from_secs(self.now_playing_secs)
    }
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_socket_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_http_enabled() -> bool {
    true
}

fn default_http_port() -> u16 {
    8990
}

fn default_playlist_url() -> String {
    "http://10.224.24.232:8081/tda.m3u".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

fn default_grace_delay_ms() -> u64 {
    100
}

fn default_load_timeout_secs() -> u64 {
    15
}

fn default_min_buffer_ms() -> u64 {
    5000
}

fn default_max_buffer_ms() -> u64 {
    15000
}

fn default_network_timeout_secs() -> u64 {
    8
}

fn default_user_agent() -> String {
    format!("iptv-daemon/{}", env!("CARGO_PKG_VERSION"))
}

fn default_quiet_period_ms() -> u64 {
    1500
}

fn default_now_playing_secs() -> u64 {
    5
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
        Ok(toml::from_str(content)?)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.control.http_enabled);
        assert_eq!(config.control.bind_address, "127.0.0.1");
        assert_eq!(config.switcher.quiet_period(), Duration::from_millis(1500));
        assert_eq!(config.switcher.now_playing(), Duration::from_secs(5));
        assert_eq!(config.player.grace_delay(), Duration::from_millis(100));
        assert!(config.playlist.url.starts_with("http://"));
        assert!(config.daemon.state_file.ends_with("iptv/state.json"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = Config::from_toml_str(
            r#"
            [playlist]
            url = "/srv/tda.m3u"

            [switcher]
            quiet_period_ms = 800
            "#,
        )
        .unwrap();
        assert_eq!(config.playlist.url, "/srv/tda.m3u");
        assert!(config.playlist.autoplay_first);
        assert_eq!(config.switcher.quiet_period_ms, 800);
        assert_eq!(config.switcher.now_playing_secs, 5);
        assert_eq!(config.player.max_buffer_ms, 15000);
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back = Config::from_toml_str(&text).unwrap();
        assert_eq!(back.control.socket_port, config.control.socket_port);
        assert_eq!(back.player.user_agent, config.player.user_agent);
    }
}
