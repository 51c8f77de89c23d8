#![allow(dead_code)]

use ::std::sync::atomic::{AtomicUsize, Ordering};
use ::std::sync::{Arc, Mutex};

use ::async_trait::async_trait;
use ::mockall::mock;
use ::sparkwatch_common::{
    application::{AppInfo, ApplicationState, SparkApplication},
    error::Result,
    k8s_openapi::api::core::v1::Pod,
    k8s_openapi::api::networking::v1::Ingress,
    serde_json::{from_value, json, Value},
};
use ::sparkwatch_monitor::{
    cluster::ClusterClient,
    config::MonitorConfig,
    report::ApplicationReport,
    submission::{ApplicationListener, DriverProcess},
};

mock! {
    pub Cluster {}

    #[async_trait]
    impl ClusterClient for Cluster {
        async fn list_applications(&self) -> Result<Vec<SparkApplication>>;
        async fn get_report(
            &self,
            app: &SparkApplication,
            log_window: usize,
        ) -> Result<ApplicationReport>;
        async fn kill_application(&self, app: &SparkApplication) -> Result<bool>;
        async fn create_spark_ui_ingress(&self, app: &SparkApplication) -> Result<()>;
    }
}

/// Base test configuration; top-level keys in `overrides` replace the base.
pub fn test_config(overrides: Value) -> Arc<MonitorConfig> {
    let mut base = json!({
        "app_lookup_timeout_millis": 2000,
        "poll_interval_millis": 100,
        "leakage_check_interval_millis": 100,
        "leakage_check_timeout_millis": 5000,
        "spark_logs_cache_size": 10,
        "ui_history_server_url": "http://history.example.com",
        "ingress": {
            "create": false,
            "protocol": "http",
            "host": "h"
        }
    });
    if let (Some(base), Some(overrides)) = (base.as_object_mut(), overrides.as_object()) {
        for (key, value) in overrides {
            base.insert(key.clone(), value.clone());
        }
    }
    Arc::new(from_value(base).unwrap())
}

pub fn driver_pod(tag: &str, app_id: &str, name: &str, namespace: &str, phase: &str) -> Pod {
    from_value(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("uid-{}", name),
            "labels": {
                "spark-app-tag": tag,
                "spark-app-selector": app_id,
                "spark-role": "driver"
            }
        },
        "status": { "phase": phase }
    }))
    .unwrap()
}

pub fn spark_app(
    tag: &str,
    app_id: &str,
    name: &str,
    namespace: &str,
    phase: &str,
) -> SparkApplication {
    SparkApplication::from_driver_pod(driver_pod(tag, app_id, name, namespace, phase)).unwrap()
}

pub fn ui_ingress(host: &str) -> Ingress {
    from_value(json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": { "name": "ui", "namespace": "spark-jobs" },
        "spec": { "rules": [ { "host": host } ] }
    }))
    .unwrap()
}

pub fn report(
    config: Arc<MonitorConfig>,
    driver: Option<Pod>,
    ingress: Option<Ingress>,
) -> ApplicationReport {
    ApplicationReport::new(
        driver,
        vec![],
        vec!["driver log line".to_owned()],
        ingress,
        config,
    )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenerEvent {
    AppId(String),
    State(ApplicationState, ApplicationState),
    Info(AppInfo),
}

/// Listener recording every callback for later assertions.
#[derive(Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<ListenerEvent>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ApplicationListener for RecordingListener {
    fn app_id_known(&self, app_id: &str) {
        self.events
            .lock()
            .unwrap()
            .push(ListenerEvent::AppId(app_id.to_owned()));
    }

    fn state_changed(&self, old: ApplicationState, new: ApplicationState) {
        self.events
            .lock()
            .unwrap()
            .push(ListenerEvent::State(old, new));
    }

    fn info_changed(&self, info: AppInfo) {
        self.events.lock().unwrap().push(ListenerEvent::Info(info));
    }
}

/// Child process handle counting how often it was destroyed.
#[derive(Clone, Default)]
pub struct FakeDriverProcess {
    destroyed: Arc<AtomicUsize>,
}

impl FakeDriverProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl DriverProcess for FakeDriverProcess {
    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn input_lines(&self) -> Vec<String> {
        vec!["submit stdout".to_owned()]
    }

    fn error_lines(&self) -> Vec<String> {
        vec!["submit stderr".to_owned()]
    }
}
