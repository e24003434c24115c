//! Republishes YouTube channel statistics to an MQTT broker.
//!
//! Two flavours share the same poll loop:
//!
//! - the generic publisher sends a heartbeat for every check and a change event whenever the
//!   subscriber count moves ([`messages`]);
//! - the Home Assistant variant registers each channel as a device through MQTT discovery and
//!   publishes sensor states and availability ([`homeassistant`]).

use crate::config::Settings;
use crate::monitor::Monitor;
use crate::mqtt::MqttSink;
use crate::youtube_api::YouTubeClient;
use eyre::WrapErr;
use jiff::Timestamp;
use std::io::IsTerminal;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod error;
pub mod homeassistant;
pub mod messages;
pub mod monitor;
pub mod mqtt;
pub mod youtube_api;

/// Upper bound on a single YouTube API request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A channel the user asked us to track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    pub id: String,
    /// Human-readable name used in logs. The title reported by YouTube is used everywhere else.
    pub name: String,
}

/// A snapshot of a channel's public counters.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStats {
    pub channel_id: String,
    pub channel_title: String,
    pub subscriber_count: u64,
    pub view_count: u64,
    pub video_count: u64,
    pub observed_at: Timestamp,
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` still takes precedence over `default_level` for anyone who needs per-module
/// filtering.
pub fn init_tracing(default_level: LevelFilter) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();
}

/// Resolves once the process is asked to terminate, returning the name of the signal.
pub async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM, only handling Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl-C"
    }
}

/// Runs a monitor with the given settings until the process is asked to stop.
pub async fn run(settings: Settings) -> eyre::Result<()> {
    settings.log_summary();

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .wrap_err("build HTTP client")?;
    let youtube = YouTubeClient::new(settings.api_key, http).with_base_url(settings.api_base_url);
    let sink = MqttSink::new(settings.sink);

    Monitor::new(youtube, sink, settings.variant, settings.channels)
        .run_until(settings.check_interval, async {
            let signal = shutdown_signal().await;
            tracing::info!(signal, "received shutdown signal");
        })
        .await
}
