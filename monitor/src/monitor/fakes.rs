//! In-memory stand-ins for the stats source and the message sink.

use crate::ChannelStats;
use crate::error::{FetchError, SinkError};
use crate::mqtt::{MessageSink, PublishOptions};
use crate::youtube_api::StatsSource;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
enum Reply {
    Count { subscribers: u64, latency: Duration },
    Missing,
    /// Never answers.
    Stall,
}

/// Hands out pre-scripted subscriber counts per channel. A channel with nothing left in its script
/// is reported as not found.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStats {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    calls: Arc<Mutex<Vec<(String, Instant)>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedStats {
    pub fn push(&self, channel_id: &str, subscribers: u64) -> &Self {
        self.push_slow(channel_id, subscribers, Duration::ZERO)
    }

    /// Answers with `subscribers` after `latency` has passed.
    pub fn push_slow(&self, channel_id: &str, subscribers: u64, latency: Duration) -> &Self {
        self.push_entry(
            channel_id,
            Reply::Count {
                subscribers,
                latency,
            },
        )
    }

    pub fn push_missing(&self, channel_id: &str) -> &Self {
        self.push_entry(channel_id, Reply::Missing)
    }

    pub fn push_stalled(&self, channel_id: &str) -> &Self {
        self.push_entry(channel_id, Reply::Stall)
    }

    /// Highest number of fetches that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn push_entry(&self, channel_id: &str, entry: Reply) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_default()
            .push_back(entry);
        self
    }

    /// Channel ids fetched so far, with the (virtual) time of each fetch.
    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl StatsSource for ScriptedStats {
    async fn fetch(&self, channel_id: &str) -> Result<ChannelStats, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((channel_id.to_string(), Instant::now()));
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(channel_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Reply::Missing);

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let subscribers = match next {
            Reply::Count {
                subscribers,
                latency,
            } => {
                tokio::time::sleep(latency).await;
                Some(subscribers)
            }
            Reply::Missing => None,
            Reply::Stall => std::future::pending::<Option<u64>>().await,
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let subscribers = subscribers.ok_or_else(|| FetchError::NotFound {
            channel_id: channel_id.to_string(),
        })?;
        Ok(ChannelStats {
            channel_id: channel_id.to_string(),
            channel_title: format!("{channel_id} Title"),
            subscriber_count: subscribers,
            view_count: subscribers * 10,
            video_count: 7,
            observed_at: "2024-01-01T00:00:00Z".parse().unwrap(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub options: PublishOptions,
}

impl Published {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.payload).unwrap()
    }
}

#[derive(Debug, Default)]
struct Recording {
    connected: bool,
    refuse_connect: bool,
    stall_connect: bool,
    fail_publishes: bool,
    fail_topic_suffix: Option<String>,
    connects: usize,
    disconnects: usize,
    published: Vec<Published>,
}

/// Records every successful publish. Failures can be switched on globally or for topics with a
/// given suffix.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingSink {
    pub fn connected() -> Self {
        let sink = Self::default();
        sink.set_connected(true);
        sink
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().unwrap().connected = connected;
    }

    pub fn refuse_connect(&self, refuse: bool) {
        self.inner.lock().unwrap().refuse_connect = refuse;
    }

    /// Makes `connect` hang forever, like a broker that never answers CONNECT.
    pub fn stall_connect(&self, stall: bool) {
        self.inner.lock().unwrap().stall_connect = stall;
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_publishes = fail;
    }

    pub fn fail_topics_ending_with(&self, suffix: Option<&str>) {
        self.inner.lock().unwrap().fail_topic_suffix = suffix.map(str::to_string);
    }

    pub fn published(&self) -> Vec<Published> {
        self.inner.lock().unwrap().published.clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published().into_iter().map(|p| p.topic).collect()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<Published> {
        self.published()
            .into_iter()
            .filter(|p| p.topic == topic)
            .collect()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().published.clear();
    }

    pub fn connects(&self) -> usize {
        self.inner.lock().unwrap().connects
    }

    pub fn disconnects(&self) -> usize {
        self.inner.lock().unwrap().disconnects
    }
}

impl MessageSink for RecordingSink {
    async fn connect(&self) -> Result<(), SinkError> {
        let stall = {
            let mut inner = self.inner.lock().unwrap();
            inner.connects += 1;
            inner.stall_connect
        };
        if stall {
            std::future::pending::<()>().await;
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.refuse_connect {
            return Err(SinkError::Connection {
                broker: "mqtt://fake:1883".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        inner.connected = true;
        Ok(())
    }

    async fn disconnect(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        inner.disconnects += 1;
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().unwrap();
        let rejected = inner.fail_publishes
            || inner
                .fail_topic_suffix
                .as_deref()
                .is_some_and(|suffix| topic.ends_with(suffix));
        if !inner.connected || rejected {
            return Err(SinkError::NotConnected);
        }
        inner.published.push(Published {
            topic: topic.to_string(),
            payload: String::from_utf8(payload).unwrap(),
            options,
        });
        Ok(())
    }
}
