//! # Display Configuration
//!
//! Where the customer display lives and how the channel treats it.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     CHECKOUT_DISPLAY_URL=http://localhost:1420/customer-display         │
//! │     CHECKOUT_DISPLAY_ORIGIN=http://localhost:1420                       │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/checkout/display.toml (Linux)                             │
//! │     ~/Library/Application Support/com.checkout.pos/display.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # display.toml
//! [window]
//! url = "http://localhost:1420/customer-display"
//! name = "customer-display"
//! width = 1024
//! height = 768
//!
//! [channel]
//! # target_origin = "http://localhost:1420"   # derived from url when absent
//! poll_interval_ms = 1000
//! ready_timeout_ms = 1500
//! max_send_retries = 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{DisplayError, DisplayResult};
use crate::surface::WindowSpec;

// =============================================================================
// Window Settings
// =============================================================================

/// The display window itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSettings {
    /// Page loaded into the display window.
    #[serde(default = "default_url")]
    pub url: String,

    /// Window name/label.
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_url() -> String {
    "http://localhost:1420/customer-display".to_string()
}

fn default_name() -> String {
    "customer-display".to_string()
}

fn default_width() -> u32 {
    1024
}

fn default_height() -> u32 {
    768
}

impl Default for WindowSettings {
    fn default() -> Self {
        WindowSettings {
            url: default_url(),
            name: default_name(),
            width: default_width(),
            height: default_height(),
        }
    }
}

// =============================================================================
// Channel Settings
// =============================================================================

/// Channel timing and retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Explicit target origin for posts. Derived from the window URL if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_origin: Option<String>,

    /// Liveness poll interval (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long to wait for `CUSTOMER_DISPLAY_READY` before sending
    /// best-effort (milliseconds).
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_ms: u64,

    /// Reopen attempts after a failed open or post before giving up.
    #[serde(default = "default_max_send_retries")]
    pub max_send_retries: u32,
}

fn default_poll_interval() -> u64 {
    1000
}
fn default_ready_timeout() -> u64 {
    1500
}
fn default_max_send_retries() -> u32 {
    3
}

impl Default for ChannelSettings {
    fn default() -> Self {
        ChannelSettings {
            target_origin: None,
            poll_interval_ms: default_poll_interval(),
            ready_timeout_ms: default_ready_timeout(),
            max_send_retries: default_max_send_retries(),
        }
    }
}

// =============================================================================
// Main Display Configuration
// =============================================================================

/// Complete display configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub window: WindowSettings,

    #[serde(default)]
    pub channel: ChannelSettings,
}

impl DisplayConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (display.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DisplayResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading display config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Display config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load display config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> DisplayResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DisplayError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Display config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DisplayResult<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(DisplayError::InvalidConfig(
                "window width and height must be greater than 0".into(),
            ));
        }

        if self.channel.poll_interval_ms == 0 {
            return Err(DisplayError::InvalidConfig(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }

        if self.channel.ready_timeout_ms == 0 {
            return Err(DisplayError::InvalidConfig(
                "ready_timeout_ms must be greater than 0".into(),
            ));
        }

        // Resolves and checks the origin as a side effect.
        self.target_origin()?;

        Ok(())
    }

    /// The origin every post is addressed to and every reply must come from.
    pub fn target_origin(&self) -> DisplayResult<String> {
        if let Some(origin) = &self.channel.target_origin {
            return parse_origin(origin);
        }
        origin_of(&self.window.url)
    }

    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec {
            name: self.window.name.clone(),
            url: self.window.url.clone(),
            width: self.window.width,
            height: self.window.height,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.channel.poll_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.channel.ready_timeout_ms)
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CHECKOUT_DISPLAY_URL") {
            debug!(url = %url, "Overriding display URL from environment");
            self.window.url = url;
        }

        if let Some(origin) = lookup("CHECKOUT_DISPLAY_ORIGIN") {
            debug!(origin = %origin, "Overriding target origin from environment");
            self.channel.target_origin = Some(origin);
        }

        if let Some(ms) = lookup("CHECKOUT_DISPLAY_POLL_MS") {
            match ms.parse::<u64>() {
                Ok(ms) => self.channel.poll_interval_ms = ms,
                Err(_) => warn!(value = %ms, "Ignoring invalid CHECKOUT_DISPLAY_POLL_MS"),
            }
        }

        if let Some(ms) = lookup("CHECKOUT_DISPLAY_READY_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(ms) => self.channel.ready_timeout_ms = ms,
                Err(_) => warn!(value = %ms, "Ignoring invalid CHECKOUT_DISPLAY_READY_TIMEOUT_MS"),
            }
        }

        if let Some(retries) = lookup("CHECKOUT_DISPLAY_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(n) => self.channel.max_send_retries = n,
                Err(_) => warn!(value = %retries, "Ignoring invalid CHECKOUT_DISPLAY_MAX_RETRIES"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "checkout", "pos")
            .map(|dirs| dirs.config_dir().join("display.toml"))
    }
}

// =============================================================================
// Origin Helpers
// =============================================================================

/// Serialized origin (`scheme://host[:port]`) of a URL.
pub fn origin_of(url: &str) -> DisplayResult<String> {
    let parsed = Url::parse(url)?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return Err(DisplayError::InvalidUrl(format!(
            "{url} has an opaque origin"
        )));
    }
    Ok(origin.ascii_serialization())
}

fn parse_origin(origin: &str) -> DisplayResult<String> {
    let trimmed = origin.trim();
    if trimmed == "*" {
        return Err(DisplayError::WildcardOrigin);
    }
    let normalized = origin_of(trimmed)?;
    if normalized != trimmed.trim_end_matches('/') {
        return Err(DisplayError::InvalidUrl(format!(
            "target origin must not carry a path: {trimmed}"
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = DisplayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_origin().unwrap(), "http://localhost:1420");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.window_spec().name, "customer-display");
    }

    #[test]
    fn test_wildcard_origin_is_rejected() {
        let mut config = DisplayConfig::default();
        config.channel.target_origin = Some("*".into());
        assert!(matches!(
            config.validate(),
            Err(DisplayError::WildcardOrigin)
        ));
    }

    #[test]
    fn test_explicit_origin_must_be_an_origin() {
        let mut config = DisplayConfig::default();
        config.channel.target_origin = Some("https://display.example.com".into());
        assert_eq!(
            config.target_origin().unwrap(),
            "https://display.example.com"
        );

        config.channel.target_origin = Some("https://display.example.com/page".into());
        assert!(config.validate().is_err());

        config.channel.target_origin = Some("not a url".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = DisplayConfig::default();
        config.channel.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = DisplayConfig::default();
        config.window.width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CHECKOUT_DISPLAY_URL", "https://pos.example.com:8443/display"),
            ("CHECKOUT_DISPLAY_POLL_MS", "250"),
            ("CHECKOUT_DISPLAY_MAX_RETRIES", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = DisplayConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.channel.poll_interval_ms, 250);
        assert_eq!(config.channel.max_send_retries, 3);
        assert_eq!(
            config.target_origin().unwrap(),
            "https://pos.example.com:8443"
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let parsed: DisplayConfig = toml::from_str(
            r#"
            [window]
            url = "http://127.0.0.1:5173/display"

            [channel]
            ready_timeout_ms = 800
            "#,
        )
        .unwrap();
        assert_eq!(parsed.window.width, 1024);
        assert_eq!(parsed.channel.ready_timeout_ms, 800);
        assert_eq!(parsed.target_origin().unwrap(), "http://127.0.0.1:5173");

        let toml_str = toml::to_string_pretty(&parsed).unwrap();
        assert!(toml_str.contains("[window]"));
        assert!(toml_str.contains("[channel]"));
    }
}
