//! Kubernetes-backed lifecycle monitor for Spark applications.
//!
//! A submitter hands over a tag (and optionally the child spark-submit
//! process and a listener); a per-application worker resolves the tag to a
//! driver pod, exposes the Spark UI through an ingress bound to the pod's
//! lifetime, polls the cluster for state and log snapshots, and notifies
//! the listener on every transition. A process-wide reaper garbage-collects
//! submissions whose driver never appeared or never died cleanly.

pub mod cluster;
pub mod config;
pub mod ingress;
pub mod monitor;
pub mod reaper;
pub mod report;
pub mod retry;
pub mod submission;

use ::std::sync::Arc;

use ::sparkwatch_common::{application::ApplicationTag, error::Result};

use cluster::k8s_client::K8sClusterClient;
use cluster::ClusterClient;
use config::MonitorConfig;
use monitor::AppMonitor;
use reaper::{LeakReaper, LeakedAppsRegistry};
use submission::{ApplicationListener, DriverProcess};

/// Process-wide monitor state: the shared cluster client, the leaked-tag
/// registry and the reaper worker. Construct once per process with
/// [ClusterMonitor::init].
pub struct ClusterMonitor<C: ClusterClient> {
    client: Arc<C>,
    registry: Arc<LeakedAppsRegistry>,
    reaper: LeakReaper,
    config: Arc<MonitorConfig>,
}

impl ClusterMonitor<K8sClusterClient> {
    /// Build the Kubernetes client from `config` and start the reaper.
    pub async fn init(config: MonitorConfig) -> Result<Self> {
        let config = Arc::new(config);
        let client = Arc::new(K8sClusterClient::from_config(config.clone()).await?);
        Ok(Self::with_client(config, client))
    }
}

impl<C: ClusterClient> ClusterMonitor<C> {
    /// Start the reaper against an existing cluster client.
    pub fn with_client(config: Arc<MonitorConfig>, client: Arc<C>) -> Self {
        let registry = Arc::new(LeakedAppsRegistry::new());
        let reaper = LeakReaper::spawn(client.clone(), registry.clone(), config.clone());
        Self {
            client,
            registry,
            reaper,
            config,
        }
    }

    /// Spawn a monitor worker for one submitted application.
    pub fn monitor(
        &self,
        tag: ApplicationTag,
        app_id: Option<String>,
        process: Option<Box<dyn DriverProcess>>,
        listener: Option<Box<dyn ApplicationListener>>,
    ) -> AppMonitor<C> {
        AppMonitor::spawn(
            self.client.clone(),
            self.registry.clone(),
            self.config.clone(),
            tag,
            app_id,
            process,
            listener,
        )
    }

    /// The leaked-tag table shared by the monitors and the reaper.
    pub fn leaked_apps(&self) -> &Arc<LeakedAppsRegistry> {
        &self.registry
    }

    /// Stop the reaper worker. Running application monitors are unaffected.
    pub async fn shutdown(self) {
        self.reaper.shutdown().await;
    }
}
