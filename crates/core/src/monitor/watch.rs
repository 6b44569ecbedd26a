use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::metrics::MetricsRegistry;
use super::ResourceSource;
use crate::types::ResourceSnapshot;

/// Latest snapshot published by the monitoring loop; `None` until the first sample lands.
pub type SnapshotReceiver = watch::Receiver<Option<ResourceSnapshot>>;

/// Publish a finished sample: gauges first, then the watch channel.
fn publish(tx: &watch::Sender<Option<ResourceSnapshot>>, metrics: &MetricsRegistry, snap: ResourceSnapshot) {
    metrics.record_metric("resource.memory_pressure", snap.memory_pressure());
    metrics.record_metric("resource.memory_used_mb", snap.memory_used_mb as f64);
    metrics.record_metric("resource.cpu_percent", snap.cpu_usage_percent);
    metrics.record_metric("resource.battery_level", f64::from(snap.battery_level));
    metrics.record_metric("resource.battery_temperature_c", snap.battery_temperature_c);
    metrics.record_metric("resource.network_latency_ms", snap.network_latency_ms as f64);
    tx.send_replace(Some(snap));
}

/// Spawn the background monitoring loop.
/// Samples immediately, then every `interval`, until `cancel` fires. A
/// sample interrupted by cancellation is dropped without publishing.
pub fn spawn(
    source: Arc<dyn ResourceSource>,
    metrics: Arc<MetricsRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> (JoinHandle<()>, SnapshotReceiver) {
    let (tx, rx) = watch::channel(None);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("resource monitor shutting down");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let snap = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("resource monitor cancelled mid-sample");
                    return;
                }
                snap = source.sample() => snap,
            };

            tracing::debug!(
                memory_pressure = snap.memory_pressure(),
                cpu = snap.cpu_usage_percent,
                battery = snap.battery_level,
                latency_ms = snap.network_latency_ms,
                "resource sample"
            );
            publish(&tx, &metrics, snap);
        }
    });

    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::FixedSource;
    use crate::types::fixtures;
    use async_trait::async_trait;

    /// Never finishes a sample.
    struct StuckSource;

    #[async_trait]
    impl ResourceSource for StuckSource {
        async fn sample(&self) -> ResourceSnapshot {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_on_interval() {
        let source = Arc::new(FixedSource::new(fixtures::calm()));
        let metrics = Arc::new(MetricsRegistry::new());
        let cancel = CancellationToken::new();
        let (handle, mut rx) = spawn(source.clone(), metrics.clone(), Duration::from_secs(30), cancel.clone());

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().map(|s| s.battery_level), Some(80));
        assert_eq!(metrics.metric("resource.battery_level"), Some(80.0));

        source.set(fixtures::snapshot(100, 900, 5.0, 10, 30.0, 20));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().map(|s| s.battery_level), Some(10));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_sample_publishes_nothing() {
        let metrics = Arc::new(MetricsRegistry::new());
        let cancel = CancellationToken::new();
        let (handle, rx) = spawn(Arc::new(StuckSource), metrics.clone(), Duration::from_secs(30), cancel.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(rx.borrow().is_none());
        assert!(metrics.gauges().is_empty());
    }
}
