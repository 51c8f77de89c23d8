//! Kubernetes implementation of the cluster facade.

use ::std::sync::Arc;

use ::async_trait::async_trait;
use ::k8s_openapi::api::core::v1::{Pod, Service};
use ::k8s_openapi::api::networking::v1::Ingress;
use ::kube::api::{DeleteParams, ListParams, LogParams, ObjectList, Patch, PatchParams};
use ::kube::config::{
    AuthInfo, Cluster, Context, KubeConfigOptions, Kubeconfig, NamedAuthInfo, NamedCluster,
    NamedContext,
};
use ::kube::{Api, Client, Config};
use ::sparkwatch_common::{
    anyhow::anyhow,
    application::{
        SparkApplication, SPARK_APP_ID_LABEL, SPARK_APP_TAG_LABEL, SPARK_ROLE_DRIVER,
        SPARK_ROLE_EXECUTOR, SPARK_ROLE_LABEL,
    },
    error::{Result, SparkwatchError},
    tracing::{debug, warn},
};

use super::ClusterClient;
use crate::config::{ClusterConfig, MonitorConfig};
use crate::ingress::{build_spark_ui_ingress, build_spark_ui_service, spark_ui_resource_name};
use crate::report::ApplicationReport;

/// Field manager under which the UI resources are applied.
const FIELD_MANAGER: &str = "sparkwatch";

/// Client to interact with the Kubernetes cluster.
pub struct K8sClusterClient {
    client: Client,
    config: Arc<MonitorConfig>,
}

impl K8sClusterClient {
    /// Build the client from the configured cluster options, falling back
    /// to the ambient kubeconfig when none is set.
    pub async fn from_config(config: Arc<MonitorConfig>) -> Result<Self> {
        let client = build_client(&config.cluster).await?;
        Ok(Self { client, config })
    }

    /// Driver pods that carry both the tag and the app id labels.
    fn driver_selector() -> String {
        format!(
            "{}={},{},{}",
            SPARK_ROLE_LABEL, SPARK_ROLE_DRIVER, SPARK_APP_TAG_LABEL, SPARK_APP_ID_LABEL
        )
    }

    fn collect_applications(list: ObjectList<Pod>, apps: &mut Vec<SparkApplication>) {
        for pod in list.items {
            match SparkApplication::from_driver_pod(pod) {
                Ok(app) => apps.push(app),
                Err(e) => debug!("Skipping driver pod: {}", e),
            }
        }
    }

    async fn tail_driver_log(&self, namespace: &str, name: &str, window: usize) -> Vec<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            tail_lines: Some(window as i64),
            ..LogParams::default()
        };
        match pods.logs(name, &params).await {
            Ok(text) => text.lines().map(str::to_owned).collect(),
            Err(e) => {
                debug!("Failed to fetch the log of driver pod {}: {}", name, e);
                Vec::new()
            }
        }
    }

    async fn get_ui_ingress(&self, app: &SparkApplication) -> Option<Ingress> {
        let ingresses: Api<Ingress> = Api::namespaced(self.client.clone(), app.namespace());
        let params =
            ListParams::default().labels(&format!("{}={}", SPARK_APP_TAG_LABEL, app.tag()));
        match ingresses.list(&params).await {
            Ok(list) => list.items.into_iter().next(),
            Err(e) => {
                warn!("Failed to fetch the UI ingress of {}: {}", app.tag(), e);
                None
            }
        }
    }
}

#[async_trait]
impl ClusterClient for K8sClusterClient {
    async fn list_applications(&self) -> Result<Vec<SparkApplication>> {
        let params = ListParams::default().labels(&Self::driver_selector());
        let mut apps = Vec::new();
        if self.config.namespaces.is_empty() {
            let pods: Api<Pod> = Api::all(self.client.clone());
            let list = pods
                .list(&params)
                .await
                .map_err(SparkwatchError::fail_to_list_applications)?;
            Self::collect_applications(list, &mut apps);
        } else {
            // union in namespace iteration order
            for namespace in &self.config.namespaces {
                let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
                let list = pods
                    .list(&params)
                    .await
                    .map_err(SparkwatchError::fail_to_list_applications)?;
                Self::collect_applications(list, &mut apps);
            }
        }
        Ok(apps)
    }

    async fn get_report(
        &self,
        app: &SparkApplication,
        log_window: usize,
    ) -> Result<ApplicationReport> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), app.namespace());
        let params =
            ListParams::default().labels(&format!("{}={}", SPARK_APP_TAG_LABEL, app.tag()));
        let list = pods
            .list(&params)
            .await
            .map_err(SparkwatchError::fail_to_get_report)?;
        let mut driver = None;
        let mut executors = Vec::new();
        for pod in list.items {
            let role = pod
                .metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(SPARK_ROLE_LABEL))
                .map(String::as_str);
            match role {
                Some(SPARK_ROLE_DRIVER) => {
                    // first match wins on duplicate driver pods
                    if driver.is_none() {
                        driver = Some(pod);
                    }
                }
                Some(SPARK_ROLE_EXECUTOR) => executors.push(pod),
                _ => {}
            }
        }
        let log_lines = match driver.as_ref().and_then(|pod| pod.metadata.name.as_deref()) {
            Some(name) => self.tail_driver_log(app.namespace(), name, log_window).await,
            None => Vec::new(),
        };
        let ingress = self.get_ui_ingress(app).await;
        Ok(ApplicationReport::new(
            driver,
            executors,
            log_lines,
            ingress,
            self.config.clone(),
        ))
    }

    async fn kill_application(&self, app: &SparkApplication) -> Result<bool> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), app.namespace());
        debug!("Deleting driver pod {}", app.driver_pod_name());
        match pods
            .delete(app.driver_pod_name(), &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(SparkwatchError::fail_to_kill_application(e)),
        }
    }

    async fn create_spark_ui_ingress(&self, app: &SparkApplication) -> Result<()> {
        let service = build_spark_ui_service(app)?;
        let ingress = build_spark_ui_ingress(app, &self.config.ingress)?;
        let name = spark_ui_resource_name(app.driver_pod_name());
        let params = PatchParams::apply(FIELD_MANAGER).force();
        let services: Api<Service> = Api::namespaced(self.client.clone(), app.namespace());
        services
            .patch(&name, &params, &Patch::Apply(&service))
            .await
            .map_err(SparkwatchError::fail_to_create_ingress)?;
        let ingresses: Api<Ingress> = Api::namespaced(self.client.clone(), app.namespace());
        if let Err(e) = ingresses.patch(&name, &params, &Patch::Apply(&ingress)).await {
            // the pair is one unit: a failed ingress apply must not leave
            // the headless service behind
            if let Err(rollback) = services.delete(&name, &DeleteParams::default()).await {
                warn!(
                    "Failed to roll back UI service {} of {}: {}",
                    name,
                    app.tag(),
                    rollback
                );
            }
            return Err(SparkwatchError::fail_to_create_ingress(e));
        }
        debug!("Applied Spark UI service and ingress {} for {}", name, app.tag());
        Ok(())
    }
}

/// Scrub the `k8s://` prefix Spark uses on master URLs and default the
/// scheme to https. Applying the transform twice equals applying it once.
pub fn spark_master_url(master: &str) -> String {
    let master = master.strip_prefix("k8s://").unwrap_or(master);
    if master.starts_with("http://") || master.starts_with("https://") {
        master.to_owned()
    } else {
        format!("https://{}", master)
    }
}

async fn build_client(config: &ClusterConfig) -> Result<Client> {
    if config.oauth_token_file.is_some() && config.oauth_token_value.is_some() {
        return Err(SparkwatchError::not_allowed(anyhow!(
            "oauth_token_file and oauth_token_value are mutually exclusive."
        )));
    }
    if !config.is_explicit() {
        return match &config.default_namespace {
            Some(namespace) => {
                let mut kube_config = Config::infer()
                    .await
                    .map_err(SparkwatchError::fail_to_create_client)?;
                kube_config.default_namespace = namespace.clone();
                Client::try_from(kube_config).map_err(SparkwatchError::fail_to_create_client)
            }
            None => Client::try_default()
                .await
                .map_err(SparkwatchError::fail_to_create_client),
        };
    }
    let master = config.spark_master.as_deref().ok_or_else(|| {
        SparkwatchError::not_allowed(anyhow!(
            "spark_master is required when other cluster options are set."
        ))
    })?;
    let kubeconfig = Kubeconfig {
        clusters: vec![NamedCluster {
            name: FIELD_MANAGER.to_owned(),
            cluster: Some(Cluster {
                server: Some(spark_master_url(master)),
                certificate_authority: config.ca_cert_file.clone(),
                ..Cluster::default()
            }),
        }],
        auth_infos: vec![NamedAuthInfo {
            name: FIELD_MANAGER.to_owned(),
            auth_info: Some(AuthInfo {
                token: config.oauth_token_value.clone().map(Into::into),
                token_file: config.oauth_token_file.clone(),
                client_certificate: config.client_cert_file.clone(),
                client_key: config.client_key_file.clone(),
                ..AuthInfo::default()
            }),
        }],
        contexts: vec![NamedContext {
            name: FIELD_MANAGER.to_owned(),
            context: Some(Context {
                cluster: FIELD_MANAGER.to_owned(),
                user: Some(FIELD_MANAGER.to_owned()),
                namespace: config.default_namespace.clone(),
                ..Context::default()
            }),
        }],
        current_context: Some(FIELD_MANAGER.to_owned()),
        ..Kubeconfig::default()
    };
    let kube_config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(SparkwatchError::fail_to_create_client)?;
    Client::try_from(kube_config).map_err(SparkwatchError::fail_to_create_client)
}
