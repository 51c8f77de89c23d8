use ::serde::{Deserialize, Serialize};

/// URLs describing one application, pushed to the listener whenever any
/// field changes relative to the previous emission.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppInfo {
    pub driver_log_url: Option<String>,
    pub tracking_url: Option<String>,
    pub executors_log_urls: Option<String>,
    pub spark_ui_url: Option<String>,
}
