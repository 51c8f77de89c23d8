//! Domain types for monitored Spark applications on Kubernetes.

use ::anyhow::anyhow;
use ::k8s_openapi::api::core::v1::Pod;

use crate::error::{Result, SparkwatchError};

mod app_info;
mod app_state;
mod app_tag;

pub use app_info::AppInfo;
pub use app_state::ApplicationState;
pub use app_tag::ApplicationTag;

/// Label carrying the Spark application id assigned by Spark.
pub const SPARK_APP_ID_LABEL: &str = "spark-app-selector";
/// Label carrying the submission tag.
pub const SPARK_APP_TAG_LABEL: &str = "spark-app-tag";
/// Label distinguishing driver pods from executor pods.
pub const SPARK_ROLE_LABEL: &str = "spark-role";
pub const SPARK_ROLE_DRIVER: &str = "driver";
pub const SPARK_ROLE_EXECUTOR: &str = "executor";
/// Label carrying the executor id on executor pods.
pub const SPARK_EXEC_ID_LABEL: &str = "spark-exec-id";
/// Label carrying an externally provided Spark UI address for the driver.
pub const SPARK_UI_URL_LABEL: &str = "spark-ui-url";
/// Label marking resources created by this service.
pub const CREATED_BY_LABEL: &str = "created-by";
pub const CREATED_BY_VALUE: &str = "livy";

/// One submitted Spark application, wrapped around its driver pod. Tag,
/// application id and namespace are read from the pod at construction.
#[derive(Clone, Debug)]
pub struct SparkApplication {
    app_id: String,
    tag: String,
    namespace: String,
    driver_pod_name: String,
    driver_pod: Pod,
}

impl SparkApplication {
    /// Wrap a driver pod into an application. The pod must carry both the
    /// tag and the application id labels.
    pub fn from_driver_pod(pod: Pod) -> Result<Self> {
        let name = pod.metadata.name.clone().ok_or_else(|| {
            SparkwatchError::not_allowed(anyhow!("Driver pod has no name."))
        })?;
        let tag = Self::label(&pod, SPARK_APP_TAG_LABEL).ok_or_else(|| {
            SparkwatchError::not_allowed(anyhow!(
                "Pod {} does not carry the {} label.",
                name,
                SPARK_APP_TAG_LABEL
            ))
        })?;
        let app_id = Self::label(&pod, SPARK_APP_ID_LABEL).ok_or_else(|| {
            SparkwatchError::not_allowed(anyhow!(
                "Pod {} does not carry the {} label.",
                name,
                SPARK_APP_ID_LABEL
            ))
        })?;
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_owned());
        Ok(Self {
            app_id,
            tag,
            namespace,
            driver_pod_name: name,
            driver_pod: pod,
        })
    }

    fn label(pod: &Pod, key: &str) -> Option<String> {
        pod.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .cloned()
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn driver_pod_name(&self) -> &str {
        &self.driver_pod_name
    }

    pub fn driver_pod(&self) -> &Pod {
        &self.driver_pod
    }
}
