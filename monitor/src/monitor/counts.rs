use crate::ChannelStats;
use jiff::Timestamp;
use serde::Serialize;
use std::collections::HashMap;

/// A subscriber count that moved between two successful checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub channel_id: String,
    pub channel_title: String,
    pub previous_count: u64,
    pub current_count: u64,
    /// `current_count - previous_count`. Never zero.
    #[serde(rename = "change")]
    pub delta: i64,
    pub timestamp: Timestamp,
}

impl ChangeEvent {
    pub fn is_gain(&self) -> bool {
        self.delta > 0
    }

    pub fn magnitude(&self) -> u64 {
        self.delta.unsigned_abs()
    }
}

/// What a fresh observation means relative to the last recorded count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Nothing was recorded for this channel yet, so there is nothing to compare against.
    Initial,
    Unchanged,
    Changed(ChangeEvent),
}

/// The last successfully published subscriber count per channel.
///
/// Counts only ever enter the table through [`record`](Self::record), which the poll loop calls
/// after the observation has been published. A failed check leaves the previous value in place.
#[derive(Debug, Default)]
pub struct LastObservedCounts {
    counts: HashMap<String, u64>,
}

impl LastObservedCounts {
    pub fn get(&self, channel_id: &str) -> Option<u64> {
        self.counts.get(channel_id).copied()
    }

    pub fn compare(&self, channel_id: &str, stats: &ChannelStats) -> Observation {
        let Some(previous) = self.get(channel_id) else {
            return Observation::Initial;
        };
        let current = stats.subscriber_count;
        if previous == current {
            return Observation::Unchanged;
        }

        // Subscriber counts are nowhere near i64::MAX; saturate rather than wrap regardless.
        let delta = i64::try_from(current)
            .unwrap_or(i64::MAX)
            .saturating_sub(i64::try_from(previous).unwrap_or(i64::MAX));
        Observation::Changed(ChangeEvent {
            channel_id: stats.channel_id.clone(),
            channel_title: stats.channel_title.clone(),
            previous_count: previous,
            current_count: current,
            delta,
            timestamp: stats.observed_at,
        })
    }

    pub fn record(&mut self, channel_id: &str, count: u64) {
        self.counts.insert(channel_id.to_string(), count);
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stats(subscribers: u64) -> ChannelStats {
        ChannelStats {
            channel_id: "UC123".to_string(),
            channel_title: "Test Channel".to_string(),
            subscriber_count: subscribers,
            view_count: 0,
            video_count: 0,
            observed_at: Timestamp::UNIX_EPOCH,
        }
    }

    #[test]
    fn first_observation_has_nothing_to_compare() {
        let counts = LastObservedCounts::default();
        assert_eq!(counts.compare("UC123", &stats(1000)), Observation::Initial);
        assert!(counts.is_empty());
    }

    #[test]
    fn equal_counts_are_unchanged() {
        let mut counts = LastObservedCounts::default();
        counts.record("UC123", 1000);
        assert_eq!(counts.compare("UC123", &stats(1000)), Observation::Unchanged);
    }

    #[test]
    fn gains_and_losses_carry_signed_delta() {
        let mut counts = LastObservedCounts::default();
        counts.record("UC123", 1000);

        let Observation::Changed(gain) = counts.compare("UC123", &stats(1005)) else {
            panic!("expected a change");
        };
        assert_eq!(gain.previous_count, 1000);
        assert_eq!(gain.current_count, 1005);
        assert_eq!(gain.delta, 5);
        assert!(gain.is_gain());

        let Observation::Changed(loss) = counts.compare("UC123", &stats(997)) else {
            panic!("expected a change");
        };
        assert_eq!(loss.delta, -3);
        assert_eq!(loss.magnitude(), 3);
        assert!(!loss.is_gain());
    }

    #[test]
    fn comparing_does_not_record() {
        let mut counts = LastObservedCounts::default();
        counts.record("UC123", 1000);
        let _ = counts.compare("UC123", &stats(2000));
        assert_eq!(counts.get("UC123"), Some(1000));

        counts.record("UC123", 2000);
        assert_eq!(counts.get("UC123"), Some(2000));
        assert_eq!(counts.len(), 1);
    }

    #[test]
    fn change_event_wire_format() {
        let event = ChangeEvent {
            channel_id: "UC123".to_string(),
            channel_title: "Test Channel".to_string(),
            previous_count: 1000,
            current_count: 1005,
            delta: 5,
            timestamp: "2024-01-01T00:00:00Z".parse().unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({
                "channelId": "UC123",
                "channelTitle": "Test Channel",
                "previousCount": 1000,
                "currentCount": 1005,
                "change": 5,
                "timestamp": "2024-01-01T00:00:00Z",
            })
        );
    }
}
