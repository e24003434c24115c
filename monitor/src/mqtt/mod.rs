//! Publishing to an MQTT broker.
//!
//! The poll loop only sees the [`MessageSink`] trait. [`MqttSink`] implements it on top of
//! rumqttc; the event loop is driven by a background task that tracks the
//! [`ConnectionState`] and lets rumqttc re-establish lost sessions on its own.

mod sink;
mod state;

pub use rumqttc::QoS;
pub use sink::{BrokerAddress, BrokerUrl, MqttSink, SinkOptions, generate_client_id};
pub use state::ConnectionState;

use crate::error::SinkError;
use serde::Serialize;
use std::future::Future;

/// Delivery options for a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub qos: QoS,
    pub retain: bool,
}

impl PublishOptions {
    /// QoS 0, retained. Discovery configs, availability, and heartbeats.
    pub const RETAINED: Self = Self {
        qos: QoS::AtMostOnce,
        retain: true,
    };

    /// QoS 0, not retained. Sensor states.
    pub const TRANSIENT: Self = Self {
        qos: QoS::AtMostOnce,
        retain: false,
    };

    /// QoS 1, not retained. Change events.
    pub const RELIABLE: Self = Self {
        qos: QoS::AtLeastOnce,
        retain: false,
    };
}

/// A publish/subscribe transport the poll loop can write to.
///
/// `publish` must fail fast with [`SinkError::NotConnected`] rather than implicitly reconnecting;
/// callers reconnect explicitly through `connect`, which is a no-op while connected.
pub trait MessageSink {
    fn connect(&self) -> impl Future<Output = Result<(), SinkError>> + Send;

    fn disconnect(&self) -> impl Future<Output = ()> + Send;

    fn is_connected(&self) -> bool;

    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        options: PublishOptions,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Publishes `value` encoded as JSON.
    fn publish_json<T>(
        &self,
        topic: &str,
        value: &T,
        options: PublishOptions,
    ) -> impl Future<Output = Result<(), SinkError>> + Send
    where
        T: Serialize + ?Sized,
        Self: Sync,
    {
        let payload = serde_json::to_vec(value).map_err(|source| SinkError::Encode {
            topic: topic.to_string(),
            source,
        });
        async move { self.publish(topic, payload?, options).await }
    }
}
