use super::cycle::{Monitor, Variant};
use crate::error::SinkError;
use crate::mqtt::MessageSink;
use crate::youtube_api::StatsSource;
use eyre::{WrapErr, eyre};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// How long a check cycle that is running when shutdown is requested may take to finish before it
/// is abandoned.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

impl<S, K> Monitor<S, K>
where
    S: StatsSource + Send + Sync + 'static,
    K: MessageSink + Send + Sync + 'static,
{
    /// Connects and then checks every channel right away and every `interval` after that, on a
    /// background task.
    ///
    /// Failing to reach the broker here is fatal. Later on, a cycle that finds the broker
    /// unreachable is skipped and retried on the next tick.
    pub async fn start(self, interval: Duration) -> Result<MonitorHandle<S, K>, SinkError> {
        self.sink.connect().await?;
        Ok(self.spawn(interval))
    }

    /// Like [`start`](Self::start) followed by [`MonitorHandle::run_until`], except that
    /// `shutdown` is also honored while the broker connection is still being set up.
    pub async fn run_until<F>(self, interval: Duration, shutdown: F) -> eyre::Result<()>
    where
        F: Future,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        tokio::select! {
            connected = self.sink.connect() => {
                connected.wrap_err("failed to start monitor")?;
            }
            _ = &mut shutdown => {
                tracing::info!("shutting down before the broker connection was established");
                self.sink.disconnect().await;
                return Ok(());
            }
        }
        self.spawn(interval).run_until(shutdown).await
    }

    /// Marks every channel offline and closes the broker session.
    pub async fn shutdown(self) {
        if matches!(self.variant, Variant::HomeAssistant(_)) {
            self.set_all_availability(false).await;
        }
        self.sink.disconnect().await;
        tracing::info!("monitor stopped");
    }

    fn spawn(self, interval: Duration) -> MonitorHandle<S, K> {
        tracing::info!(
            channels = self.channels.len(),
            interval_secs = interval.as_secs(),
            "monitor started"
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_schedule(self, interval, cancel.clone()));
        MonitorHandle { cancel, task }
    }
}

async fn run_schedule<S, K>(
    mut monitor: Monitor<S, K>,
    period: Duration,
    cancel: CancellationToken,
) -> Monitor<S, K>
where
    S: StatsSource,
    K: MessageSink + Sync,
{
    if matches!(monitor.variant, Variant::HomeAssistant(_)) {
        monitor.set_all_availability(true).await;
    }

    // the first tick completes immediately
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }

        if let Err(e) = monitor.sink.connect().await {
            tracing::warn!(error = %e, "broker unreachable, skipping this check cycle");
            continue;
        }

        let started = Instant::now();
        run_cycle(&mut monitor, &cancel).await;
        if cancel.is_cancelled() {
            break;
        }
        let elapsed = started.elapsed();
        if elapsed > period {
            tracing::warn!(
                elapsed_secs = elapsed.as_secs(),
                interval_secs = period.as_secs(),
                "check cycle took longer than the interval, skipping missed ticks"
            );
        }
    }

    tracing::debug!("scheduler cancelled");
    monitor
}

/// Runs one check cycle. If `cancel` fires while it runs, the cycle gets [`SHUTDOWN_GRACE`] to
/// finish and is dropped after that.
async fn run_cycle<S, K>(monitor: &mut Monitor<S, K>, cancel: &CancellationToken)
where
    S: StatsSource,
    K: MessageSink + Sync,
{
    let mut cycle = std::pin::pin!(monitor.check_all_channels());
    tokio::select! {
        _ = &mut cycle => return,
        _ = cancel.cancelled() => {}
    }

    tracing::info!(
        grace_secs = SHUTDOWN_GRACE.as_secs(),
        "shutdown requested, waiting for the running check cycle"
    );
    if tokio::time::timeout(SHUTDOWN_GRACE, cycle).await.is_err() {
        tracing::warn!("check cycle did not finish in time, abandoning it");
    }
}

/// Handle to a started monitor.
#[derive(Debug)]
pub struct MonitorHandle<S, K> {
    cancel: CancellationToken,
    task: JoinHandle<Monitor<S, K>>,
}

impl<S, K> MonitorHandle<S, K>
where
    S: StatsSource + Send + Sync + 'static,
    K: MessageSink + Send + Sync + 'static,
{
    /// Stops scheduling new cycles, gives a cycle that is already running up to
    /// [`SHUTDOWN_GRACE`] to finish, and shuts the monitor down.
    ///
    /// Returns an error only if the scheduler task panicked.
    pub async fn stop(self) -> eyre::Result<()> {
        self.cancel.cancel();
        let monitor = self.task.await.wrap_err("scheduler task failed")?;
        monitor.shutdown().await;
        Ok(())
    }

    /// Runs until `shutdown` resolves, then [`stop`](Self::stop)s.
    ///
    /// If the scheduler task ends on its own before that, which only happens if it panics, this
    /// returns an error immediately.
    pub async fn run_until<F>(mut self, shutdown: F) -> eyre::Result<()>
    where
        F: Future,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("shutting down");
                self.stop().await
            }
            result = &mut self.task => match result {
                Ok(monitor) => {
                    monitor.shutdown().await;
                    Err(eyre!("scheduler stopped unexpectedly"))
                }
                Err(e) => Err(e).wrap_err("scheduler task failed"),
            },
        }
    }
}
