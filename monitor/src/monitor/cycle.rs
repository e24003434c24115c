use super::counts::{LastObservedCounts, Observation};
use crate::error::{CheckError, SinkError};
use crate::homeassistant::Discovery;
use crate::messages::GenericTopics;
use crate::mqtt::MessageSink;
use crate::youtube_api::StatsSource;
use crate::{ChannelIdentity, ChannelStats};
use std::time::Duration;

/// Pause between two channels of the same cycle, to stay gentle on the API quota.
pub const CHANNEL_DELAY: Duration = Duration::from_secs(1);

/// Which flavour of payloads a monitor publishes.
#[derive(Debug, Clone)]
pub enum Variant {
    /// Heartbeats plus change events on a single configurable topic.
    Generic(GenericTopics),
    /// Discovery configs, sensor states, and per-channel availability.
    HomeAssistant(Discovery),
}

/// Outcome of one pass over all channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// The poll loop: fetches every configured channel, publishes what it found, and remembers the
/// last published subscriber count.
#[derive(Debug)]
pub struct Monitor<S, K> {
    pub(super) stats: S,
    pub(super) sink: K,
    pub(super) variant: Variant,
    pub(super) channels: Vec<ChannelIdentity>,
    counts: LastObservedCounts,
    channel_delay: Duration,
}

impl<S, K> Monitor<S, K>
where
    S: StatsSource,
    K: MessageSink + Sync,
{
    pub fn new(stats: S, sink: K, variant: Variant, channels: Vec<ChannelIdentity>) -> Self {
        Self {
            stats,
            sink,
            variant,
            channels,
            counts: LastObservedCounts::default(),
            channel_delay: CHANNEL_DELAY,
        }
    }

    pub fn with_channel_delay(mut self, delay: Duration) -> Self {
        self.channel_delay = delay;
        self
    }

    pub fn channels(&self) -> &[ChannelIdentity] {
        &self.channels
    }

    pub fn counts(&self) -> &LastObservedCounts {
        &self.counts
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Checks every channel once, in configuration order.
    ///
    /// A failing channel is logged and skipped; it never prevents the remaining channels from
    /// being checked.
    pub async fn check_all_channels(&mut self) -> CycleReport {
        let channels = self.channels.clone();
        tracing::info!(channels = channels.len(), "checking channels");

        let mut report = CycleReport::default();
        for (i, channel) in channels.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.channel_delay).await;
            }
            match self.check_channel(channel).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        channel = %channel.name,
                        channel_id = %channel.id,
                        error = %e,
                        cause = %ErrorChain(&e),
                        "channel check failed"
                    );
                }
            }
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "check cycle complete"
        );
        report
    }

    /// Fetches one channel, publishes the result, and updates the recorded count.
    ///
    /// The count is only recorded once everything for the channel has been published, so a
    /// change event that could not be delivered is derived again on the next check.
    pub async fn check_channel(
        &mut self,
        channel: &ChannelIdentity,
    ) -> Result<Observation, CheckError> {
        tracing::debug!(channel = %channel.name, channel_id = %channel.id, "checking channel");

        let stats = match self.stats.fetch(&channel.id).await {
            Ok(stats) => stats,
            Err(e) => {
                self.set_availability(channel, false).await;
                return Err(e.into());
            }
        };
        tracing::info!(
            channel = %channel.name,
            title = %stats.channel_title,
            subscribers = stats.subscriber_count,
            views = stats.view_count,
            videos = stats.video_count,
            "fetched channel statistics"
        );

        let observation = self.counts.compare(&channel.id, &stats);
        if let Err(e) = self.publish(&stats, &observation).await {
            self.set_availability(channel, false).await;
            return Err(e.into());
        }

        match &observation {
            Observation::Initial => tracing::info!(
                channel = %channel.name,
                subscribers = stats.subscriber_count,
                "recorded initial subscriber count"
            ),
            Observation::Unchanged => tracing::info!(
                channel = %channel.name,
                subscribers = stats.subscriber_count,
                "subscriber count unchanged"
            ),
            Observation::Changed(event) => {
                let direction = if event.is_gain() { "gained" } else { "lost" };
                tracing::info!(
                    channel = %channel.name,
                    direction,
                    magnitude = event.magnitude(),
                    previous = event.previous_count,
                    current = event.current_count,
                    "subscriber count changed"
                );
            }
        }

        self.counts.record(&channel.id, stats.subscriber_count);
        self.set_availability(channel, true).await;
        Ok(observation)
    }

    async fn publish(
        &self,
        stats: &ChannelStats,
        observation: &Observation,
    ) -> Result<(), SinkError> {
        match &self.variant {
            Variant::HomeAssistant(discovery) => {
                discovery.publish_discovery(&self.sink, stats).await?;
                discovery.publish_states(&self.sink, stats).await?;
            }
            Variant::Generic(topics) => {
                topics.publish_heartbeat(&self.sink, stats).await?;
                if let Observation::Changed(event) = observation {
                    topics.publish_change(&self.sink, event).await?;
                }
            }
        }
        Ok(())
    }

    /// Announces a channel's availability. Only the Home Assistant variant has an availability
    /// topic; for the generic variant this does nothing.
    pub(super) async fn set_availability(&self, channel: &ChannelIdentity, available: bool) {
        if let Variant::HomeAssistant(discovery) = &self.variant {
            discovery
                .publish_availability(&self.sink, &channel.id, available)
                .await;
        }
    }

    pub(super) async fn set_all_availability(&self, available: bool) {
        for channel in &self.channels {
            self.set_availability(channel, available).await;
        }
    }
}

/// Renders the `source()` chain of an error, which `Display` alone leaves out.
struct ErrorChain<'a>(&'a (dyn std::error::Error + 'static));

impl std::fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut source = self.0.source();
        let mut first = true;
        while let Some(e) = source {
            if !first {
                f.write_str(": ")?;
            }
            write!(f, "{e}")?;
            first = false;
            source = e.source();
        }
        Ok(())
    }
}
