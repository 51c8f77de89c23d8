//! Application report: one immutable snapshot of the cluster state for a
//! single application.

use ::std::sync::Arc;

use ::k8s_openapi::api::core::v1::{Container, Pod};
use ::k8s_openapi::api::networking::v1::Ingress;
use ::k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use ::sparkwatch_common::application::{
    SPARK_APP_TAG_LABEL, SPARK_EXEC_ID_LABEL, SPARK_ROLE_DRIVER, SPARK_ROLE_EXECUTOR,
    SPARK_UI_URL_LABEL,
};
use ::sparkwatch_common::serde_json::json;
use ::url::form_urlencoded;

use crate::config::{GrafanaConfig, MonitorConfig};

/// Snapshot of one application: its driver pod, executor pods, a bounded
/// window of the driver log and the Spark UI ingress, if any.
#[derive(Clone, Debug)]
pub struct ApplicationReport {
    driver: Option<Pod>,
    executors: Vec<Pod>,
    log_window: Vec<String>,
    ingress: Option<Ingress>,
    config: Arc<MonitorConfig>,
}

impl ApplicationReport {
    pub fn new(
        driver: Option<Pod>,
        mut executors: Vec<Pod>,
        log_window: Vec<String>,
        ingress: Option<Ingress>,
        config: Arc<MonitorConfig>,
    ) -> Self {
        executors.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Self {
            driver,
            executors,
            log_window,
            ingress,
            config,
        }
    }

    /// Lower-cased driver pod phase, or `unknown` when there is no driver.
    pub fn state(&self) -> String {
        self.driver
            .as_ref()
            .and_then(|pod| pod.status.as_ref())
            .and_then(|status| status.phase.as_ref())
            .map(|phase| phase.to_lowercase())
            .unwrap_or_else(|| "unknown".to_owned())
    }

    /// The cached driver log window.
    pub fn log(&self) -> &[String] {
        &self.log_window
    }

    /// Grafana explore link selecting the driver's Loki stream.
    pub fn driver_log_url(&self) -> Option<String> {
        let grafana = &self.config.grafana;
        if !grafana.loki_enabled {
            return None;
        }
        let base = grafana.url.as_deref()?;
        let driver = self.driver.as_ref()?;
        let tag = pod_label(driver, SPARK_APP_TAG_LABEL)?;
        Some(grafana_log_url(
            base,
            grafana,
            &[("spark_app_tag", tag), ("spark_role", SPARK_ROLE_DRIVER)],
        ))
    }

    /// Grafana explore links per executor, each prefixed with
    /// `executor-<execId>#` and joined by `;`. Executors without both the
    /// tag and the exec-id labels are skipped.
    pub fn executors_log_urls(&self) -> Option<String> {
        let grafana = &self.config.grafana;
        if !grafana.loki_enabled {
            return None;
        }
        let base = grafana.url.as_deref()?;
        let urls: Vec<String> = self
            .executors
            .iter()
            .filter_map(|pod| {
                let tag = pod_label(pod, SPARK_APP_TAG_LABEL)?;
                let exec_id = pod_label(pod, SPARK_EXEC_ID_LABEL)?;
                let url = grafana_log_url(
                    base,
                    grafana,
                    &[
                        ("spark_app_tag", tag),
                        ("spark_role", SPARK_ROLE_EXECUTOR),
                        ("spark_exec_id", exec_id),
                    ],
                );
                Some(format!("executor-{}#{}", exec_id, url))
            })
            .collect();
        if urls.is_empty() {
            None
        } else {
            Some(urls.join(";"))
        }
    }

    /// Externally visible URL routing to the Spark UI. An explicit
    /// `spark-ui-url` label on the driver pod wins over the ingress route.
    pub fn tracking_url(&self) -> Option<String> {
        let driver = self.driver.as_ref()?;
        if let Some(url) = pod_label(driver, SPARK_UI_URL_LABEL) {
            return Some(url.to_owned());
        }
        let ingress = self.ingress.as_ref()?;
        let host = ingress
            .spec
            .as_ref()?
            .rules
            .as_ref()?
            .first()?
            .host
            .as_ref()?;
        let tag = pod_label(driver, SPARK_APP_TAG_LABEL)?;
        Some(format!(
            "{}://{}/{}",
            self.config.ingress.protocol, host, tag
        ))
    }

    /// Multi-line description of the driver and the executors, ordered by
    /// pod name.
    pub fn diagnostics(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(driver) = &self.driver {
            describe_pod(driver, &mut lines);
        }
        for pod in &self.executors {
            describe_pod(pod, &mut lines);
        }
        lines
    }
}

fn pod_label<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
}

/// `{grafana_url}/explore?left={encoded}` opening a Loki LogQL selector over
/// the given stream labels. The `left` payload is the UTF-8 form-encoding of
/// a JSON array understood by Grafana explore.
fn grafana_log_url(base: &str, grafana: &GrafanaConfig, labels: &[(&str, &str)]) -> String {
    let selector = labels
        .iter()
        .map(|(key, value)| format!("{}=\"{}\"", key, value))
        .collect::<Vec<_>>()
        .join(",");
    let left = json!([
        format!("now-{}", grafana.time_range),
        "now",
        &grafana.loki_datasource,
        { "expr": format!("{{{}}}", selector) },
        { "ui": [true, true, true, "exact"] }
    ])
    .to_string();
    let encoded: String = form_urlencoded::byte_serialize(left.as_bytes()).collect();
    format!("{}/explore?left={}", base, encoded)
}

fn describe_pod(pod: &Pod, lines: &mut Vec<String>) {
    let metadata = &pod.metadata;
    let status = pod.status.as_ref();
    let spec = pod.spec.as_ref();
    lines.push(format!(
        "{}.{}",
        metadata.name.as_deref().unwrap_or("unknown"),
        metadata.namespace.as_deref().unwrap_or("default")
    ));
    lines.push(format!(
        "\tnode: {}",
        spec.and_then(|s| s.node_name.as_deref()).unwrap_or("unknown")
    ));
    lines.push(format!(
        "\thostname: {}",
        spec.and_then(|s| s.hostname.as_deref()).unwrap_or("unknown")
    ));
    lines.push(format!(
        "\tpodIp: {}",
        status.and_then(|s| s.pod_ip.as_deref()).unwrap_or("unknown")
    ));
    lines.push(format!(
        "\tstartTime: {}",
        status
            .and_then(|s| s.start_time.as_ref())
            .map(|t| t.0.to_string())
            .unwrap_or_else(|| "unknown".to_owned())
    ));
    lines.push(format!(
        "\tphase: {}",
        status.and_then(|s| s.phase.as_deref()).unwrap_or("unknown")
    ));
    lines.push(format!(
        "\treason: {}",
        status.and_then(|s| s.reason.as_deref()).unwrap_or("")
    ));
    lines.push(format!(
        "\tmessage: {}",
        status.and_then(|s| s.message.as_deref()).unwrap_or("")
    ));
    let labels = metadata
        .labels
        .as_ref()
        .map(|labels| {
            labels
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();
    lines.push(format!("\tlabels: {}", labels));
    lines.push("\tcontainers:".to_owned());
    if let Some(spec) = spec {
        for container in &spec.containers {
            describe_container(container, lines);
        }
    }
    lines.push("\tconditions:".to_owned());
    if let Some(conditions) = status.and_then(|s| s.conditions.as_ref()) {
        for condition in conditions {
            lines.push(format!(
                "\t\t- {}={} reason={} message={}",
                condition.type_,
                condition.status,
                condition.reason.as_deref().unwrap_or(""),
                condition.message.as_deref().unwrap_or("")
            ));
        }
    }
}

fn describe_container(container: &Container, lines: &mut Vec<String>) {
    let resources = container.resources.as_ref();
    let requests = resources
        .and_then(|r| r.requests.as_ref())
        .map(format_quantities)
        .unwrap_or_default();
    let limits = resources
        .and_then(|r| r.limits.as_ref())
        .map(format_quantities)
        .unwrap_or_default();
    let mut command = container.command.clone().unwrap_or_default();
    command.extend(container.args.clone().unwrap_or_default());
    lines.push(format!(
        "\t\t- {}: image={}, requests=[{}], limits=[{}], command=[{}]",
        container.name,
        container.image.as_deref().unwrap_or("unknown"),
        requests,
        limits,
        command.join(" ")
    ));
}

fn format_quantities(quantities: &std::collections::BTreeMap<String, Quantity>) -> String {
    quantities
        .iter()
        .map(|(key, quantity)| format!("{}={}", key, quantity.0))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use ::sparkwatch_common::serde_json::{self, from_value, json, Value};

    use super::*;

    fn test_config(grafana_enabled: bool) -> Arc<MonitorConfig> {
        Arc::new(
            from_value(json!({
                "app_lookup_timeout_millis": 2000,
                "poll_interval_millis": 500,
                "leakage_check_interval_millis": 1000,
                "leakage_check_timeout_millis": 5000,
                "spark_logs_cache_size": 10,
                "ingress": {
                    "create": true,
                    "protocol": "http",
                    "host": "h"
                },
                "grafana": {
                    "loki_enabled": grafana_enabled,
                    "url": "http://grafana.example.com",
                    "time_range": "6h",
                    "loki_datasource": "Loki"
                }
            }))
            .unwrap(),
        )
    }

    fn driver_pod(phase: &str) -> Pod {
        from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "driver-0",
                "namespace": "spark-jobs",
                "labels": {
                    "spark-app-tag": "t1",
                    "spark-app-selector": "app-t1",
                    "spark-role": "driver"
                }
            },
            "status": { "phase": phase }
        }))
        .unwrap()
    }

    fn executor_pod(name: &str, exec_id: &str) -> Pod {
        from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": name,
                "namespace": "spark-jobs",
                "labels": {
                    "spark-app-tag": "t1",
                    "spark-role": "executor",
                    "spark-exec-id": exec_id
                }
            },
            "status": { "phase": "Running" }
        }))
        .unwrap()
    }

    fn ui_ingress(host: &str) -> Ingress {
        from_value(json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": { "name": "driver-0-ui", "namespace": "spark-jobs" },
            "spec": { "rules": [ { "host": host } ] }
        }))
        .unwrap()
    }

    #[test]
    fn state_is_the_lower_cased_pod_phase() {
        let report = ApplicationReport::new(
            Some(driver_pod("Running")),
            vec![],
            vec![],
            None,
            test_config(false),
        );
        assert_eq!(report.state(), "running");
    }

    #[test]
    fn state_without_driver_is_unknown() {
        let report = ApplicationReport::new(None, vec![], vec![], None, test_config(false));
        assert_eq!(report.state(), "unknown");
    }

    #[test]
    fn tracking_url_routes_through_the_ingress() {
        let report = ApplicationReport::new(
            Some(driver_pod("Running")),
            vec![],
            vec![],
            Some(ui_ingress("h")),
            test_config(false),
        );
        assert_eq!(report.tracking_url().as_deref(), Some("http://h/t1"));
    }

    #[test]
    fn tracking_url_prefers_the_spark_ui_url_label() {
        let mut driver = driver_pod("Running");
        driver
            .metadata
            .labels
            .as_mut()
            .unwrap()
            .insert(SPARK_UI_URL_LABEL.to_owned(), "spark.example.com".to_owned());
        let report = ApplicationReport::new(
            Some(driver),
            vec![],
            vec![],
            Some(ui_ingress("h")),
            test_config(false),
        );
        assert_eq!(report.tracking_url().as_deref(), Some("spark.example.com"));
    }

    #[test]
    fn tracking_url_without_ingress_is_absent() {
        let report = ApplicationReport::new(
            Some(driver_pod("Running")),
            vec![],
            vec![],
            None,
            test_config(false),
        );
        assert_eq!(report.tracking_url(), None);
    }

    #[test]
    fn driver_log_url_is_a_grafana_explore_link() {
        let report = ApplicationReport::new(
            Some(driver_pod("Running")),
            vec![],
            vec![],
            None,
            test_config(true),
        );
        let url = report.driver_log_url().unwrap();
        let query = url
            .strip_prefix("http://grafana.example.com/explore?left=")
            .unwrap();
        let decoded: String = form_urlencoded::parse(format!("left={}", query).as_bytes())
            .map(|(_, value)| value.into_owned())
            .collect();
        let left: Value = serde_json::from_str(&decoded).unwrap();
        assert_eq!(
            left,
            json!([
                "now-6h",
                "now",
                "Loki",
                { "expr": "{spark_app_tag=\"t1\",spark_role=\"driver\"}" },
                { "ui": [true, true, true, "exact"] }
            ])
        );
    }

    #[test]
    fn driver_log_url_is_absent_when_loki_is_disabled() {
        let report = ApplicationReport::new(
            Some(driver_pod("Running")),
            vec![],
            vec![],
            None,
            test_config(false),
        );
        assert_eq!(report.driver_log_url(), None);
    }

    #[test]
    fn executor_log_urls_are_prefixed_and_joined() {
        let report = ApplicationReport::new(
            Some(driver_pod("Running")),
            vec![executor_pod("exec-2", "2"), executor_pod("exec-1", "1")],
            vec![],
            None,
            test_config(true),
        );
        let urls = report.executors_log_urls().unwrap();
        let parts: Vec<&str> = urls.split(';').collect();
        assert_eq!(parts.len(), 2);
        // executors are ordered by pod name
        assert!(parts[0].starts_with("executor-1#http://grafana.example.com/explore?left="));
        assert!(parts[1].starts_with("executor-2#http://grafana.example.com/explore?left="));
    }

    #[test]
    fn executors_without_exec_id_are_skipped() {
        let mut executor = executor_pod("exec-1", "1");
        executor
            .metadata
            .labels
            .as_mut()
            .unwrap()
            .remove("spark-exec-id");
        let report = ApplicationReport::new(
            Some(driver_pod("Running")),
            vec![executor],
            vec![],
            None,
            test_config(true),
        );
        assert_eq!(report.executors_log_urls(), None);
    }

    #[test]
    fn diagnostics_describe_driver_and_executors() {
        let report = ApplicationReport::new(
            Some(driver_pod("CrashLoopBackOff")),
            vec![executor_pod("exec-1", "1")],
            vec![],
            None,
            test_config(false),
        );
        let diagnostics = report.diagnostics().join("\n");
        assert!(diagnostics.contains("driver-0.spark-jobs"));
        assert!(diagnostics.contains("phase: CrashLoopBackOff"));
        assert!(diagnostics.contains("exec-1.spark-jobs"));
    }
}
