//! Periodic eviction of finished jobs.
//!
//! The registry is in memory, so without a sweep every job ever submitted
//! would be kept. Terminal jobs whose last update is older than the
//! retention period are dropped; `PENDING` and `RUNNING` jobs are never
//! touched. Stored objects are left in the bucket.

use std::sync::Arc;

use chrono::Utc;
use stemsvc_db::JobRegistry;
use tokio_util::sync::CancellationToken;

use crate::config::RetentionConfig;

/// Run the retention loop until `cancel` is triggered.
pub async fn run(registry: Arc<JobRegistry>, config: RetentionConfig, cancel: CancellationToken) {
    tracing::info!(
        retention_secs = config.retention.as_secs(),
        interval_secs = config.sweep_interval.as_secs(),
        "Job retention task started"
    );

    let mut interval = tokio::time::interval(config.sweep_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention task stopping");
                break;
            }
            _ = interval.tick() => {
                sweep(&registry, &config).await;
            }
        }
    }
}

/// One eviction pass. Returns the number of jobs removed.
pub async fn sweep(registry: &JobRegistry, config: &RetentionConfig) -> usize {
    let retention = match chrono::Duration::from_std(config.retention) {
        Ok(retention) => retention,
        Err(e) => {
            tracing::error!(error = %e, "Job retention: period out of range, skipping sweep");
            return 0;
        }
    };

    let evicted = registry.evict_terminal_before(Utc::now() - retention).await;
    if evicted > 0 {
        tracing::info!(evicted, "Job retention: evicted finished jobs");
    } else {
        tracing::debug!("Job retention: nothing to evict");
    }
    evicted
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stemsvc_db::models::job::{JobTransition, NewJob};

    use super::*;

    #[tokio::test]
    async fn sweep_keeps_unfinished_and_recent_jobs() {
        let registry = JobRegistry::new();
        let pending = registry.create(NewJob::new("source/a.wav")).await.unwrap();
        let failed = registry.create(NewJob::new("source/b.wav")).await.unwrap();
        registry
            .transition(failed.id, JobTransition::Fail("decode".into()))
            .await
            .unwrap();

        let keep_a_day = RetentionConfig::default();
        assert_eq!(sweep(&registry, &keep_a_day).await, 0);
        assert_eq!(registry.len().await, 2);

        let keep_nothing = RetentionConfig {
            retention: Duration::ZERO,
            ..RetentionConfig::default()
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(sweep(&registry, &keep_nothing).await, 1);
        assert!(registry.get(pending.id).await.is_ok());
        assert!(registry.get(failed.id).await.is_err());
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::new(JobRegistry::new()),
            RetentionConfig {
                retention: Duration::from_secs(60),
                sweep_interval: Duration::from_millis(10),
            },
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("retention task did not stop")
            .unwrap();
    }
}
