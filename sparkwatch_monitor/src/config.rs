//! Configuration for the sparkwatch monitor.

use ::std::time::Duration;

use ::sparkwatch_common::serde::Deserialize;

/// Configuration for the monitor workers, the leak reaper, the Spark UI
/// ingress and the cluster client.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(crate = "sparkwatch_common::serde")]
pub struct MonitorConfig {
    /// Deadline for resolving a tag to a driver pod, in milliseconds.
    pub app_lookup_timeout_millis: u64,
    /// Delay between two polls of one application, in milliseconds.
    pub poll_interval_millis: u64,
    /// Period of the leak reaper, in milliseconds.
    pub leakage_check_interval_millis: u64,
    /// Age after which a leaked tag with no live driver pod is expired,
    /// in milliseconds.
    pub leakage_check_timeout_millis: u64,
    /// Upper bound on the cached driver log window, in lines.
    pub spark_logs_cache_size: usize,
    /// Namespaces to watch. An empty set means all namespaces.
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Base URL of the Spark history server, used for the final UI link.
    #[serde(default)]
    pub ui_history_server_url: Option<String>,
    pub ingress: IngressConfig,
    #[serde(default)]
    pub grafana: GrafanaConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

impl MonitorConfig {
    pub fn app_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.app_lookup_timeout_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn leakage_check_interval(&self) -> Duration {
        Duration::from_millis(self.leakage_check_interval_millis)
    }

    pub fn leakage_check_timeout(&self) -> Duration {
        Duration::from_millis(self.leakage_check_timeout_millis)
    }
}

/// Configuration of the Spark UI ingress created per application.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(crate = "sparkwatch_common::serde")]
pub struct IngressConfig {
    /// Whether to create the Spark UI Service and Ingress at all.
    pub create: bool,
    /// Protocol of the tracking URL, `http` or `https`.
    pub protocol: String,
    /// Host the ingress rule is bound to.
    pub host: String,
    /// TLS secret bound to the host when the protocol is secure.
    #[serde(default)]
    pub tls_secret_name: Option<String>,
    /// Extra ingress annotations in `k=v;k=v` form.
    #[serde(default)]
    pub additional_annotations: Option<String>,
    /// Raw configuration snippet attached as an annotation.
    #[serde(default)]
    pub additional_conf_snippet: Option<String>,
}

/// Configuration of the Grafana explore links for driver and executor logs.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(crate = "sparkwatch_common::serde")]
pub struct GrafanaConfig {
    pub loki_enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_time_range")]
    pub time_range: String,
    #[serde(default = "default_loki_datasource")]
    pub loki_datasource: String,
}

fn default_time_range() -> String {
    "6h".to_owned()
}

fn default_loki_datasource() -> String {
    "Loki".to_owned()
}

impl Default for GrafanaConfig {
    fn default() -> Self {
        Self {
            loki_enabled: false,
            url: None,
            time_range: default_time_range(),
            loki_datasource: default_loki_datasource(),
        }
    }
}

/// Options for constructing the cluster client. When none is set the client
/// falls back to the ambient kubeconfig.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(crate = "sparkwatch_common::serde")]
pub struct ClusterConfig {
    /// Spark master URL; a leading `k8s://` prefix is stripped.
    #[serde(default)]
    pub spark_master: Option<String>,
    /// File whose UTF-8 contents are used as the bearer token.
    #[serde(default)]
    pub oauth_token_file: Option<String>,
    /// Bearer token value. Mutually exclusive with the token file.
    #[serde(default)]
    pub oauth_token_value: Option<String>,
    #[serde(default)]
    pub ca_cert_file: Option<String>,
    #[serde(default)]
    pub client_key_file: Option<String>,
    #[serde(default)]
    pub client_cert_file: Option<String>,
    #[serde(default)]
    pub default_namespace: Option<String>,
}

impl ClusterConfig {
    /// Whether an explicit endpoint or credential option is set. The
    /// default namespace alone does not count: it only overrides the
    /// namespace of the ambient kubeconfig.
    pub fn is_explicit(&self) -> bool {
        self.spark_master.is_some()
            || self.oauth_token_file.is_some()
            || self.oauth_token_value.is_some()
            || self.ca_cert_file.is_some()
            || self.client_key_file.is_some()
            || self.client_cert_file.is_some()
    }
}
