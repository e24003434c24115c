//! Error types returned at component boundaries.
//!
//! Application glue (startup, binaries) works in terms of [`eyre::Result`]; the
//! components themselves return these enums so that the poll loop can decide
//! what is fatal and what only affects a single channel.

use thiserror::Error;

/// Failure to fetch statistics for a single channel.
///
/// None of these are fatal: the poll loop logs them, marks the channel unavailable, and moves on
/// to the next channel.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The API answered, but no channel matched the requested id.
    #[error("channel not found: {channel_id}")]
    NotFound { channel_id: String },

    /// The channel exists, but the response lacked a part we asked for.
    #[error("response for channel {channel_id} is missing its {part} section")]
    DataMissing {
        channel_id: String,
        part: &'static str,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Anything that went wrong below the level of the API's own response body.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to YouTube API failed")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status, which is how the API reports bad keys and exhausted quota.
    #[error("YouTube API request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("could not decode YouTube API response")]
    Decode(#[source] serde_json::Error),
}

/// Failure reported by a [`MessageSink`](crate::mqtt::MessageSink).
#[derive(Debug, Error)]
pub enum SinkError {
    /// The session could not be established.
    #[error("could not connect to MQTT broker at {broker}: {reason}")]
    Connection { broker: String, reason: String },

    /// Publishing was attempted while no session is up.
    #[error("not connected to MQTT broker")]
    NotConnected,

    #[error("failed to publish to {topic}")]
    Publish {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },

    #[error("failed to encode payload for {topic}")]
    Encode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Why checking a single channel failed.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("could not fetch channel statistics")]
    Fetch(#[from] FetchError),

    #[error("could not publish channel statistics")]
    Publish(#[from] SinkError),
}

/// Invalid startup configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YouTube API key is required (set YOUTUBE_API_KEY)")]
    MissingApiKey,

    #[error("at least one channel must be configured")]
    NoChannels,

    #[error("CHANNELS is not a valid JSON array of channels")]
    ChannelsJson(#[source] serde_json::Error),

    #[error("channel entry {index} must have both a non-empty id and name")]
    MalformedChannel { index: usize },

    #[error("channel {id} is configured more than once")]
    DuplicateChannel { id: String },

    #[error("check interval must be between one minute and one week")]
    InvalidInterval,

    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),

    #[error("MQTT broker URL is required (set MQTT_BROKER_URL)")]
    MissingBrokerUrl,

    #[error("invalid MQTT broker URL '{url}': {reason}")]
    InvalidBrokerUrl { url: String, reason: String },
}
