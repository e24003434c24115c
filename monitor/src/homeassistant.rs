//! Home Assistant MQTT discovery.
//!
//! Every channel becomes one device with three numeric sensors and a connectivity binary sensor.
//! All topics live under the configured discovery prefix:
//!
//! ```text
//! {prefix}/sensor/youtube_{id}/{subscribers,views,videos}/{config,state}
//! {prefix}/sensor/youtube_{id}/availability
//! {prefix}/binary_sensor/youtube_{id}/online/{config,state}
//! ```

use crate::ChannelStats;
use crate::error::SinkError;
use crate::mqtt::{MessageSink, PublishOptions};
use serde::Serialize;

pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";
const PAYLOAD_ON: &str = "ON";

/// The numeric counters exposed as sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Subscribers,
    Views,
    Videos,
}

impl Metric {
    pub const ALL: [Self; 3] = [Self::Subscribers, Self::Views, Self::Videos];

    /// Topic segment and `unique_id` suffix; doubles as the unit of measurement.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Subscribers => "subscribers",
            Self::Views => "views",
            Self::Videos => "videos",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Subscribers => "Subscribers",
            Self::Views => "Views",
            Self::Videos => "Videos",
        }
    }

    fn icon(self) -> &'static str {
        match self {
            Self::Subscribers => "mdi:youtube",
            Self::Views => "mdi:eye",
            Self::Videos => "mdi:video",
        }
    }

    fn state_class(self) -> &'static str {
        match self {
            // subscribers can go down
            Self::Subscribers => "measurement",
            Self::Views | Self::Videos => "total_increasing",
        }
    }

    pub fn value(self, stats: &ChannelStats) -> u64 {
        match self {
            Self::Subscribers => stats.subscriber_count,
            Self::Views => stats.view_count,
            Self::Videos => stats.video_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HaDevice {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: &'static str,
    pub manufacturer: &'static str,
    pub sw_version: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HaSensorConfig {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    pub device: HaDevice,
    pub unit_of_measurement: &'static str,
    pub icon: &'static str,
    pub state_class: &'static str,
    pub availability_topic: String,
    pub suggested_display_precision: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HaBinarySensorConfig {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    pub device: HaDevice,
    pub device_class: &'static str,
    pub availability_topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DiscoveryConfig {
    Sensor(HaSensorConfig),
    BinarySensor(HaBinarySensorConfig),
}

/// Topic layout and payloads for one discovery prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    prefix: String,
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_PREFIX)
    }
}

impl Discovery {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn device_id(channel_id: &str) -> String {
        format!("youtube_{channel_id}")
    }

    fn sensor_base(&self, channel_id: &str) -> String {
        format!("{}/sensor/youtube_{channel_id}", self.prefix)
    }

    fn online_base(&self, channel_id: &str) -> String {
        format!("{}/binary_sensor/youtube_{channel_id}/online", self.prefix)
    }

    pub fn availability_topic(&self, channel_id: &str) -> String {
        format!("{}/availability", self.sensor_base(channel_id))
    }

    pub fn config_topic(&self, channel_id: &str, metric: Metric) -> String {
        format!("{}/{}/config", self.sensor_base(channel_id), metric.slug())
    }

    pub fn state_topic(&self, channel_id: &str, metric: Metric) -> String {
        format!("{}/{}/state", self.sensor_base(channel_id), metric.slug())
    }

    pub fn online_config_topic(&self, channel_id: &str) -> String {
        format!("{}/config", self.online_base(channel_id))
    }

    pub fn online_state_topic(&self, channel_id: &str) -> String {
        format!("{}/state", self.online_base(channel_id))
    }

    fn device(stats: &ChannelStats) -> HaDevice {
        HaDevice {
            identifiers: vec![Self::device_id(&stats.channel_id)],
            name: format!("{} YouTube Monitor", stats.channel_title),
            model: "YouTube Channel Monitor",
            manufacturer: "Custom",
            sw_version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// The four discovery configs for a channel, sensors first, keyed by topic.
    pub fn configs(&self, stats: &ChannelStats) -> Vec<(String, DiscoveryConfig)> {
        let id = &stats.channel_id;
        let device_id = Self::device_id(id);
        let device = Self::device(stats);
        let availability_topic = self.availability_topic(id);

        let mut configs: Vec<_> = Metric::ALL
            .into_iter()
            .map(|metric| {
                let config = HaSensorConfig {
                    name: format!("{} {}", stats.channel_title, metric.label()),
                    unique_id: format!("{device_id}_{}", metric.slug()),
                    state_topic: self.state_topic(id, metric),
                    device: device.clone(),
                    unit_of_measurement: metric.slug(),
                    icon: metric.icon(),
                    state_class: metric.state_class(),
                    availability_topic: availability_topic.clone(),
                    suggested_display_precision: 0,
                };
                (
                    self.config_topic(id, metric),
                    DiscoveryConfig::Sensor(config),
                )
            })
            .collect();

        configs.push((
            self.online_config_topic(id),
            DiscoveryConfig::BinarySensor(HaBinarySensorConfig {
                name: format!("{} Monitor Online", stats.channel_title),
                unique_id: format!("{device_id}_online"),
                state_topic: self.online_state_topic(id),
                device,
                device_class: "connectivity",
                availability_topic,
            }),
        ));
        configs
    }

    /// The four state values for a channel, keyed by topic.
    pub fn states(&self, stats: &ChannelStats) -> Vec<(String, String)> {
        let id = &stats.channel_id;
        let mut states: Vec<_> = Metric::ALL
            .into_iter()
            .map(|metric| {
                (
                    self.state_topic(id, metric),
                    metric.value(stats).to_string(),
                )
            })
            .collect();
        states.push((self.online_state_topic(id), PAYLOAD_ON.to_string()));
        states
    }

    /// Registers (or refreshes) the channel's entities. Configs are retained so that Home
    /// Assistant picks them up again after a restart.
    pub async fn publish_discovery<K>(&self, sink: &K, stats: &ChannelStats) -> Result<(), SinkError>
    where
        K: MessageSink + Sync,
    {
        for (topic, config) in self.configs(stats) {
            sink.publish_json(&topic, &config, PublishOptions::RETAINED)
                .await?;
        }
        tracing::debug!(
            channel_id = %stats.channel_id,
            title = %stats.channel_title,
            "published discovery config"
        );
        Ok(())
    }

    pub async fn publish_states<K>(&self, sink: &K, stats: &ChannelStats) -> Result<(), SinkError>
    where
        K: MessageSink + Sync,
    {
        for (topic, value) in self.states(stats) {
            sink.publish(&topic, value.into_bytes(), PublishOptions::TRANSIENT)
                .await?;
        }
        tracing::debug!(
            channel_id = %stats.channel_id,
            subscribers = stats.subscriber_count,
            "published sensor states"
        );
        Ok(())
    }

    /// Marks a channel online or offline.
    ///
    /// Best effort: failures are logged and otherwise ignored, and nothing is attempted while the
    /// sink is disconnected.
    pub async fn publish_availability<K>(&self, sink: &K, channel_id: &str, available: bool)
    where
        K: MessageSink + Sync,
    {
        if !sink.is_connected() {
            return;
        }
        let topic = self.availability_topic(channel_id);
        let payload = if available {
            PAYLOAD_ONLINE
        } else {
            PAYLOAD_OFFLINE
        };
        if let Err(e) = sink
            .publish(&topic, payload.as_bytes().to_vec(), PublishOptions::RETAINED)
            .await
        {
            tracing::debug!(%topic, error = %e, "failed to publish availability");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::fakes::RecordingSink;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn stats() -> ChannelStats {
        ChannelStats {
            channel_id: "UC123".to_string(),
            channel_title: "Test Channel".to_string(),
            subscriber_count: 1000,
            view_count: 50000,
            video_count: 42,
            observed_at: jiff::Timestamp::UNIX_EPOCH,
        }
    }

    fn device() -> serde_json::Value {
        json!({
            "identifiers": ["youtube_UC123"],
            "name": "Test Channel YouTube Monitor",
            "model": "YouTube Channel Monitor",
            "manufacturer": "Custom",
            "sw_version": env!("CARGO_PKG_VERSION"),
        })
    }

    #[test]
    fn topic_layout() {
        let discovery = Discovery::default();
        assert_eq!(
            discovery.availability_topic("UC123"),
            "homeassistant/sensor/youtube_UC123/availability"
        );
        assert_eq!(
            discovery.config_topic("UC123", Metric::Views),
            "homeassistant/sensor/youtube_UC123/views/config"
        );
        assert_eq!(
            discovery.state_topic("UC123", Metric::Subscribers),
            "homeassistant/sensor/youtube_UC123/subscribers/state"
        );
        assert_eq!(
            Discovery::new("ha").online_config_topic("UC123"),
            "ha/binary_sensor/youtube_UC123/online/config"
        );
    }

    #[test]
    fn subscriber_sensor_config() {
        let configs = Discovery::default().configs(&stats());
        assert_eq!(configs.len(), 4);

        let (topic, config) = &configs[0];
        assert_eq!(topic, "homeassistant/sensor/youtube_UC123/subscribers/config");
        assert_eq!(
            serde_json::to_value(config).unwrap(),
            json!({
                "name": "Test Channel Subscribers",
                "unique_id": "youtube_UC123_subscribers",
                "state_topic": "homeassistant/sensor/youtube_UC123/subscribers/state",
                "device": device(),
                "unit_of_measurement": "subscribers",
                "icon": "mdi:youtube",
                "state_class": "measurement",
                "availability_topic": "homeassistant/sensor/youtube_UC123/availability",
                "suggested_display_precision": 0,
            })
        );
    }

    #[test]
    fn counters_that_only_grow_are_total_increasing() {
        let configs = Discovery::default().configs(&stats());
        for (topic, config) in &configs[1..3] {
            let DiscoveryConfig::Sensor(sensor) = config else {
                panic!("{topic} should be a sensor");
            };
            assert_eq!(sensor.state_class, "total_increasing");
        }
        let DiscoveryConfig::Sensor(views) = &configs[1].1 else {
            unreachable!()
        };
        assert_eq!(views.icon, "mdi:eye");
        assert_eq!(views.name, "Test Channel Views");
    }

    #[test]
    fn online_binary_sensor_config() {
        let configs = Discovery::default().configs(&stats());
        let (topic, config) = &configs[3];
        assert_eq!(topic, "homeassistant/binary_sensor/youtube_UC123/online/config");
        assert_eq!(
            serde_json::to_value(config).unwrap(),
            json!({
                "name": "Test Channel Monitor Online",
                "unique_id": "youtube_UC123_online",
                "state_topic": "homeassistant/binary_sensor/youtube_UC123/online/state",
                "device": device(),
                "device_class": "connectivity",
                "availability_topic": "homeassistant/sensor/youtube_UC123/availability",
            })
        );
    }

    #[tokio::test]
    async fn configs_are_retained_and_states_are_not() {
        let sink = RecordingSink::connected();
        let discovery = Discovery::default();
        discovery.publish_discovery(&sink, &stats()).await.unwrap();
        discovery.publish_states(&sink, &stats()).await.unwrap();

        let published = sink.published();
        assert_eq!(published.len(), 8);
        assert!(published[..4].iter().all(|p| p.options == PublishOptions::RETAINED));
        assert!(published[4..].iter().all(|p| p.options == PublishOptions::TRANSIENT));

        let states: Vec<_> = published[4..]
            .iter()
            .map(|p| (p.topic.as_str(), p.payload.as_str()))
            .collect();
        assert_eq!(
            states,
            vec![
                ("homeassistant/sensor/youtube_UC123/subscribers/state", "1000"),
                ("homeassistant/sensor/youtube_UC123/views/state", "50000"),
                ("homeassistant/sensor/youtube_UC123/videos/state", "42"),
                ("homeassistant/binary_sensor/youtube_UC123/online/state", "ON"),
            ]
        );
    }

    #[tokio::test]
    async fn republishing_discovery_is_identical() {
        let sink = RecordingSink::connected();
        let discovery = Discovery::default();
        discovery.publish_discovery(&sink, &stats()).await.unwrap();
        discovery.publish_discovery(&sink, &stats()).await.unwrap();

        let published = sink.published();
        assert_eq!(published[..4], published[4..]);
    }

    #[tokio::test]
    async fn availability_is_retained_and_best_effort() {
        let sink = RecordingSink::connected();
        let discovery = Discovery::default();
        discovery.publish_availability(&sink, "UC123", true).await;
        discovery.publish_availability(&sink, "UC123", false).await;

        let published = sink.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].topic, "homeassistant/sensor/youtube_UC123/availability");
        assert_eq!(published[0].payload, "online");
        assert_eq!(published[1].payload, "offline");
        assert!(published.iter().all(|p| p.options == PublishOptions::RETAINED));

        sink.fail_publishes(true);
        discovery.publish_availability(&sink, "UC123", true).await;
        sink.set_connected(false);
        discovery.publish_availability(&sink, "UC123", true).await;
        assert_eq!(sink.published().len(), 2);
    }
}
