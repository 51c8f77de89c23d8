//! Typed facade over the Kubernetes API consumed by the monitors and the
//! leak reaper.

pub mod k8s_client;

use ::async_trait::async_trait;
use ::sparkwatch_common::{application::SparkApplication, error::Result};

use crate::report::ApplicationReport;

/// Thin typed facade over the cluster.
///
/// Every call is made through the retry wrapper, so implementations must be
/// idempotent or recognisably so at the caller. All methods are safe for
/// concurrent use.
#[async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    /// List driver pods carrying both the tag and the id labels, wrapped
    /// into applications, across the configured namespace set.
    async fn list_applications(&self) -> Result<Vec<SparkApplication>>;

    /// Snapshot the cluster state for one application. `log_window` bounds
    /// the driver log tail; a log fetch failure yields an empty window, not
    /// an error.
    async fn get_report(
        &self,
        app: &SparkApplication,
        log_window: usize,
    ) -> Result<ApplicationReport>;

    /// Delete the driver pod of `app`. Returns cluster-reported success; a
    /// pod that is already gone yields `Ok(false)`.
    async fn kill_application(&self, app: &SparkApplication) -> Result<bool>;

    /// Create or replace the Spark UI Service and Ingress for `app` as a
    /// single unit, owner referenced to its driver pod. On failure neither
    /// resource is left behind; applying twice is a no-op.
    async fn create_spark_ui_ingress(&self, app: &SparkApplication) -> Result<()>;
}
