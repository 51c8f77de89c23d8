//! Leaked-application bookkeeping and the background reaper worker.
//!
//! A submission leaks when its driver pod cannot be located before the
//! lookup deadline. Monitors record such tags here; the process-wide reaper
//! reconciles the recorded tags against the live pod inventory, killing
//! drivers that eventually appeared and expiring tags that never did.

use ::std::collections::HashMap;
use ::std::sync::{Arc, Mutex};
use ::std::time::Duration;

use ::sparkwatch_common::{
    application::{ApplicationTag, SparkApplication},
    time::OffsetDateTime,
    tracing::{error, info, warn},
};
use ::tokio::task::JoinHandle;
use ::tokio::time::interval;
use ::tokio_util::sync::CancellationToken;

use crate::cluster::ClusterClient;
use crate::config::MonitorConfig;
use crate::retry::retry;

/// Tags whose driver pod never appeared or never died cleanly, keyed by the
/// wall-clock time they were first recorded.
#[derive(Debug, Default)]
pub struct LeakedAppsRegistry {
    entries: Mutex<HashMap<ApplicationTag, OffsetDateTime>>,
}

impl LeakedAppsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `tag` as leaked now.
    pub fn record(&self, tag: ApplicationTag) {
        self.record_at(tag, OffsetDateTime::now_utc());
    }

    /// Record `tag` as leaked at `at`. The earliest record wins when the
    /// same tag is recorded twice.
    pub fn record_at(&self, tag: ApplicationTag, at: OffsetDateTime) {
        self.entries.lock().unwrap().entry(tag).or_insert(at);
    }

    pub fn remove(&self, tag: &ApplicationTag) {
        self.entries.lock().unwrap().remove(tag);
    }

    pub fn contains(&self, tag: &ApplicationTag) -> bool {
        self.entries.lock().unwrap().contains_key(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Point-in-time copy of the table. Monitors may record further tags
    /// while the reaper walks the snapshot.
    pub fn snapshot(&self) -> Vec<(ApplicationTag, OffsetDateTime)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(tag, at)| (tag.clone(), *at))
            .collect()
    }
}

/// Process-wide background worker reaping leaked applications.
pub struct LeakReaper {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl LeakReaper {
    /// Spawn the reaper worker. One reaper runs per process.
    pub fn spawn<C: ClusterClient>(
        client: Arc<C>,
        registry: Arc<LeakedAppsRegistry>,
        config: Arc<MonitorConfig>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(client, registry, config, shutdown.clone()));
        Self { shutdown, handle }
    }

    /// Stop the worker and wait for it to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            error!("Leak reaper worker panicked: {}", e);
        }
    }
}

async fn run<C: ClusterClient>(
    client: Arc<C>,
    registry: Arc<LeakedAppsRegistry>,
    config: Arc<MonitorConfig>,
    shutdown: CancellationToken,
) {
    info!("Leak reaper started");
    let mut period = interval(config.leakage_check_interval());
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = period.tick() => {
                if registry.is_empty() {
                    continue;
                }
                reap_cycle(client.as_ref(), &registry, config.leakage_check_timeout()).await;
            }
        }
    }
    info!("Leak reaper stopped");
}

/// One reconciliation pass over the recorded tags. Cluster errors are
/// logged and the cycle is skipped; the worker itself never exits for a
/// recoverable condition.
async fn reap_cycle<C: ClusterClient>(
    client: &C,
    registry: &LeakedAppsRegistry,
    expiry: Duration,
) {
    let now = OffsetDateTime::now_utc();
    let apps = match retry(|| client.list_applications()).await {
        Ok(apps) => apps,
        Err(e) => {
            warn!("Leak reaper failed to list driver pods, skipping this cycle: {}", e);
            return;
        }
    };
    let mut by_tag: HashMap<&str, Vec<&SparkApplication>> = HashMap::new();
    for app in &apps {
        by_tag.entry(app.tag()).or_default().push(app);
    }
    for (tag, recorded_at) in registry.snapshot() {
        match by_tag.get(tag.as_str()) {
            Some(apps) => {
                // resolution is first-match, but reaping kills every driver
                // carrying the tag
                for app in apps {
                    match retry(|| client.kill_application(app)).await {
                        Ok(true) => {
                            registry.remove(&tag);
                            info!(
                                "Killed leaked application {} (driver pod {})",
                                tag,
                                app.driver_pod_name()
                            );
                        }
                        Ok(false) => {
                            warn!(
                                "Driver pod {} of leaked application {} was already gone",
                                app.driver_pod_name(),
                                tag
                            );
                        }
                        Err(e) => {
                            warn!("Failed to kill leaked application {}: {}", tag, e);
                        }
                    }
                }
            }
            None => {
                warn!("No driver pod found for leaked application {}", tag);
                if ((now - recorded_at).whole_milliseconds()) > expiry.as_millis() as i128 {
                    registry.remove(&tag);
                    info!(
                        "Leaked application {} expired after {:?} without a driver pod",
                        tag, expiry
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ::sparkwatch_common::time::Duration as TimeDuration;

    use super::*;

    fn tag(value: &'static str) -> ApplicationTag {
        ApplicationTag::try_from(value).unwrap()
    }

    #[test]
    fn record_keeps_the_earliest_timestamp() {
        let registry = LeakedAppsRegistry::new();
        let first = OffsetDateTime::now_utc() - TimeDuration::seconds(10);
        registry.record_at(tag("t1"), first);
        registry.record(tag("t1"));
        assert_eq!(registry.snapshot(), vec![(tag("t1"), first)]);
    }

    #[test]
    fn remove_and_emptiness() {
        let registry = LeakedAppsRegistry::new();
        assert!(registry.is_empty());
        registry.record(tag("t1"));
        assert!(registry.contains(&tag("t1")));
        assert!(!registry.is_empty());
        registry.remove(&tag("t1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_the_table() {
        let registry = LeakedAppsRegistry::new();
        registry.record(tag("t1"));
        let snapshot = registry.snapshot();
        registry.record(tag("t2"));
        registry.remove(&tag("t1"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, tag("t1"));
    }
}
