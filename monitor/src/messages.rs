//! Topics and payloads of the generic publisher.
//!
//! Everything goes out as a `{"type": ..., "data": {...}}` envelope: change events on the
//! configured topic, heartbeats on `{topic}/heartbeat`.

use crate::ChannelStats;
use crate::error::SinkError;
use crate::monitor::ChangeEvent;
use crate::mqtt::{MessageSink, PublishOptions};
use jiff::Timestamp;
use serde::Serialize;

/// Default topic for change events.
pub const DEFAULT_TOPIC: &str = "youtube/subscriber_count";

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Message<'a> {
    SubscriberCountChange(&'a ChangeEvent),
    Heartbeat(Heartbeat<'a>),
}

/// Current counters of a channel, published after every successful check.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat<'a> {
    pub channel_id: &'a str,
    pub channel_title: &'a str,
    pub subscriber_count: u64,
    pub view_count: u64,
    pub video_count: u64,
    pub timestamp: Timestamp,
}

impl<'a> From<&'a ChannelStats> for Heartbeat<'a> {
    fn from(stats: &'a ChannelStats) -> Self {
        Self {
            channel_id: &stats.channel_id,
            channel_title: &stats.channel_title,
            subscriber_count: stats.subscriber_count,
            view_count: stats.view_count,
            video_count: stats.video_count,
            timestamp: stats.observed_at,
        }
    }
}

/// The pair of topics the generic publisher writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericTopics {
    changes: String,
    heartbeat: String,
}

impl GenericTopics {
    pub fn new(topic: impl Into<String>) -> Self {
        let changes = topic.into();
        let heartbeat = format!("{changes}/heartbeat");
        Self { changes, heartbeat }
    }

    pub fn changes(&self) -> &str {
        &self.changes
    }

    pub fn heartbeat(&self) -> &str {
        &self.heartbeat
    }

    /// Publishes the retained heartbeat for `stats`.
    pub async fn publish_heartbeat<K>(&self, sink: &K, stats: &ChannelStats) -> Result<(), SinkError>
    where
        K: MessageSink + Sync,
    {
        let message = Message::Heartbeat(Heartbeat::from(stats));
        sink.publish_json(&self.heartbeat, &message, PublishOptions::RETAINED)
            .await
    }

    /// Publishes a change event with at-least-once delivery.
    pub async fn publish_change<K>(&self, sink: &K, event: &ChangeEvent) -> Result<(), SinkError>
    where
        K: MessageSink + Sync,
    {
        let message = Message::SubscriberCountChange(event);
        sink.publish_json(&self.changes, &message, PublishOptions::RELIABLE)
            .await?;
        tracing::debug!(topic = %self.changes, "published subscriber count change");
        Ok(())
    }
}

impl Default for GenericTopics {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC)
    }
}
