//! YouTube Data API v3 client library.
//!
//! Only the read-only `channels.list` endpoint is used, authenticated with a plain API key. The
//! [`StatsSource`] trait is the seam the poll loop depends on, so that it can be driven by
//! something other than the real API.

pub mod channels;
pub mod client;

pub use client::{DEFAULT_BASE_URL, YouTubeClient};

use crate::ChannelStats;
use crate::error::FetchError;
use std::future::Future;

/// Something that can report the current statistics of a channel.
///
/// Implementations must not retry internally; the poll loop decides what a failure means.
pub trait StatsSource {
    fn fetch(
        &self,
        channel_id: &str,
    ) -> impl Future<Output = Result<ChannelStats, FetchError>> + Send;
}
