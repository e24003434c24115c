//! Startup configuration, read from flags or the environment.
//!
//! Both binaries share [`CommonArgs`] and [`MqttArgs`]; validation turns the raw arguments into
//! [`Settings`] or a [`ConfigError`].

use crate::ChannelIdentity;
use crate::error::ConfigError;
use crate::homeassistant::{DEFAULT_DISCOVERY_PREFIX, Discovery};
use crate::messages::{DEFAULT_TOPIC, GenericTopics};
use crate::monitor::Variant;
use crate::mqtt::{BrokerUrl, SinkOptions, generate_client_id};
use crate::youtube_api::DEFAULT_BASE_URL;
use clap::{Args, Parser};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

pub const DEFAULT_HA_BROKER_URL: &str = "mqtt://core-mosquitto:1883";
pub const DEFAULT_CHANNEL_NAME: &str = "Default Channel";

/// Longest accepted check interval: one week.
pub const MAX_CHECK_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// YouTube Data API v3 key.
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the YouTube Data API.
    #[arg(long, env = "YOUTUBE_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// Minutes between two check cycles.
    #[arg(long = "interval", env = "CHECK_INTERVAL_MINUTES", default_value_t = 5)]
    pub check_interval_minutes: u64,

    /// error, warn, info, debug, or trace. RUST_LOG takes precedence when set.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Args)]
pub struct MqttArgs {
    #[arg(long = "mqtt-username", env = "MQTT_USERNAME")]
    pub username: Option<String>,

    #[arg(long = "mqtt-password", env = "MQTT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Client identifier; a random one is generated when unset.
    #[arg(long = "mqtt-client-id", env = "MQTT_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Keep-alive interval, in seconds.
    #[arg(long = "mqtt-keep-alive", env = "MQTT_KEEP_ALIVE", default_value_t = 60)]
    pub keep_alive_secs: u64,

    /// Pause before re-establishing a lost session, in milliseconds.
    #[arg(
        long = "mqtt-reconnect-period",
        env = "MQTT_RECONNECT_PERIOD",
        default_value_t = 1000
    )]
    pub reconnect_period_ms: u64,

    /// Upper bound on the initial handshake, in milliseconds.
    #[arg(
        long = "mqtt-connect-timeout",
        env = "MQTT_CONNECT_TIMEOUT",
        default_value_t = 30_000
    )]
    pub connect_timeout_ms: u64,
}

/// Publishes subscriber count changes and heartbeats for one channel.
#[derive(Debug, Clone, Parser)]
#[command(name = "youtube-mqtt-monitor", version, about)]
pub struct GenericArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub mqtt: MqttArgs,

    /// Channel to monitor.
    #[arg(long, env = "YOUTUBE_CHANNEL_ID")]
    pub channel_id: Option<String>,

    /// mqtt://, tcp://, mqtts:// or ssl:// URL of the broker.
    #[arg(long, env = "MQTT_BROKER_URL")]
    pub broker_url: Option<String>,

    /// Topic for change events; heartbeats go to `{topic}/heartbeat`.
    #[arg(long, env = "MQTT_TOPIC", default_value = DEFAULT_TOPIC)]
    pub topic: String,
}

/// Exposes YouTube channels to Home Assistant through MQTT discovery.
#[derive(Debug, Clone, Parser)]
#[command(name = "youtube-ha-monitor", version, about)]
pub struct HomeAssistantArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub mqtt: MqttArgs,

    /// JSON array of `{"id": ..., "name": ...}` objects.
    #[arg(long, env = "CHANNELS")]
    pub channels: Option<String>,

    /// Single channel to monitor when no channel list is given.
    #[arg(long, env = "YOUTUBE_CHANNEL_ID")]
    pub channel_id: Option<String>,

    #[arg(long, env = "YOUTUBE_CHANNEL_NAME", default_value = DEFAULT_CHANNEL_NAME)]
    pub channel_name: String,

    #[arg(long, env = "MQTT_BROKER_URL", default_value = DEFAULT_HA_BROKER_URL)]
    pub broker_url: String,

    #[arg(long, env = "HA_DISCOVERY_PREFIX", default_value = DEFAULT_DISCOVERY_PREFIX)]
    pub discovery_prefix: String,
}

/// Validated configuration.
#[derive(Clone)]
pub struct Settings {
    pub api_key: String,
    pub api_base_url: String,
    pub check_interval: Duration,
    pub log_level: LevelFilter,
    pub sink: SinkOptions,
    pub channels: Vec<ChannelIdentity>,
    pub variant: Variant,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("check_interval", &self.check_interval)
            .field("log_level", &self.log_level)
            .field("sink", &self.sink)
            .field("channels", &self.channels)
            .field("variant", &self.variant)
            .finish()
    }
}

impl Settings {
    /// Logs the effective configuration. Secrets are only reported as present or absent.
    pub fn log_summary(&self) {
        tracing::info!(
            api_key_configured = !self.api_key.is_empty(),
            api_base_url = %self.api_base_url,
            interval_minutes = self.check_interval.as_secs() / 60,
            broker = %self.sink.broker,
            client_id = %self.sink.client_id,
            username = self.sink.username.as_deref().unwrap_or("<none>"),
            password_configured = self.sink.password.is_some(),
            "configuration loaded"
        );
        match &self.variant {
            Variant::Generic(topics) => tracing::info!(
                topic = topics.changes(),
                heartbeat_topic = topics.heartbeat(),
                "publishing generic messages"
            ),
            Variant::HomeAssistant(discovery) => tracing::info!(
                discovery_prefix = discovery.prefix(),
                "publishing Home Assistant discovery"
            ),
        }
        for channel in &self.channels {
            tracing::info!(channel = %channel.name, channel_id = %channel.id, "monitoring channel");
        }
    }
}

impl GenericArgs {
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        let channel_id = present(self.channel_id).ok_or(ConfigError::NoChannels)?;
        let broker_url = present(self.broker_url).ok_or(ConfigError::MissingBrokerUrl)?;
        let (api_key, check_interval, log_level) = self.common.validate()?;
        let sink = self.mqtt.sink_options(&broker_url, "yt-mqtt-monitor")?;
        Ok(Settings {
            api_key,
            api_base_url: self.common.api_base_url,
            check_interval,
            log_level,
            sink,
            channels: vec![ChannelIdentity {
                name: channel_id.clone(),
                id: channel_id,
            }],
            variant: Variant::Generic(GenericTopics::new(self.topic)),
        })
    }
}

impl HomeAssistantArgs {
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        let channels = parse_channels(
            self.channels.as_deref(),
            self.channel_id.as_deref(),
            &self.channel_name,
        )?;
        let (api_key, check_interval, log_level) = self.common.validate()?;
        let sink = self.mqtt.sink_options(&self.broker_url, "youtube-monitor")?;
        Ok(Settings {
            api_key,
            api_base_url: self.common.api_base_url,
            check_interval,
            log_level,
            sink,
            channels,
            variant: Variant::HomeAssistant(Discovery::new(self.discovery_prefix)),
        })
    }
}

impl CommonArgs {
    fn validate(&self) -> Result<(String, Duration, LevelFilter), ConfigError> {
        let api_key = present(self.api_key.clone()).ok_or(ConfigError::MissingApiKey)?;
        if !(1..=MAX_CHECK_INTERVAL_MINUTES).contains(&self.check_interval_minutes) {
            return Err(ConfigError::InvalidInterval);
        }
        let interval = Duration::from_secs(self.check_interval_minutes * 60);
        Ok((api_key, interval, parse_log_level(&self.log_level)?))
    }
}

impl MqttArgs {
    fn sink_options(&self, broker_url: &str, client_prefix: &str) -> Result<SinkOptions, ConfigError> {
        let url = BrokerUrl::parse(broker_url)?;
        Ok(SinkOptions {
            broker: url.address,
            client_id: present(self.client_id.clone())
                .unwrap_or_else(|| generate_client_id(client_prefix)),
            // explicit settings win over credentials embedded in the URL
            username: present(self.username.clone()).or(url.username),
            password: present(self.password.clone()).or(url.password),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect_period: Duration::from_millis(self.reconnect_period_ms),
        })
    }
}

/// Treats empty values and the literal `null` (as written by add-on supervisors for unset
/// options) as absent.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| {
        let v = v.trim();
        !v.is_empty() && v != "null"
    })
}

pub fn parse_log_level(level: &str) -> Result<LevelFilter, ConfigError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => Ok(LevelFilter::WARN),
        other => other
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(level.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    id: Option<String>,
    name: Option<String>,
}

/// Resolves the channel list from a JSON array, falling back to a single channel.
pub fn parse_channels(
    channels_json: Option<&str>,
    fallback_id: Option<&str>,
    fallback_name: &str,
) -> Result<Vec<ChannelIdentity>, ConfigError> {
    let mut channels = Vec::new();
    if let Some(json) = present(channels_json.map(str::to_string)) {
        let raw: Vec<RawChannel> =
            serde_json::from_str(&json).map_err(ConfigError::ChannelsJson)?;
        let mut seen = HashSet::new();
        for (index, entry) in raw.into_iter().enumerate() {
            let (Some(id), Some(name)) = (present(entry.id), present(entry.name)) else {
                return Err(ConfigError::MalformedChannel { index });
            };
            let id = id.trim().to_string();
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateChannel { id });
            }
            channels.push(ChannelIdentity {
                id,
                name: name.trim().to_string(),
            });
        }
    }

    if channels.is_empty()
        && let Some(id) = present(fallback_id.map(str::to_string))
    {
        channels.push(ChannelIdentity {
            id: id.trim().to_string(),
            name: present(Some(fallback_name.to_string()))
                .unwrap_or_else(|| DEFAULT_CHANNEL_NAME.to_string()),
        });
    }

    if channels.is_empty() {
        return Err(ConfigError::NoChannels);
    }
    Ok(channels)
}
