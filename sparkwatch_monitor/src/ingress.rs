//! Spark UI Service and Ingress construction.
//!
//! Both resources carry a controller OwnerReference to the driver pod, so
//! the Kubernetes garbage collector removes them when the pod disappears.

use ::std::collections::BTreeMap;

use ::k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use ::k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use ::k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use ::sparkwatch_common::{
    anyhow::anyhow,
    application::{
        SparkApplication, CREATED_BY_LABEL, CREATED_BY_VALUE, SPARK_APP_TAG_LABEL,
        SPARK_ROLE_DRIVER, SPARK_ROLE_LABEL,
    },
    error::{Result, SparkwatchError},
};

use crate::config::IngressConfig;

/// Port name shared by the Service and the Ingress backend.
const SPARK_UI_PORT_NAME: &str = "spark-ui";
const SPARK_UI_PORT: i32 = 4040;

/// Fixed annotations applied to every UI ingress.
const INGRESS_ANNOTATIONS: [(&str, &str); 2] = [
    ("kubernetes.io/ingress.class", "traefik"),
    ("traefik.ingress.kubernetes.io/router.pathmatcher", "PathPrefix"),
];
const CONF_SNIPPET_ANNOTATION: &str = "traefik.ingress.kubernetes.io/configuration-snippet";

/// Name shared by the UI Service and Ingress of one application: the driver
/// pod name with a `-ui` suffix, truncated to 63 characters, trailing
/// hyphens stripped, lower-cased.
pub fn spark_ui_resource_name(driver_pod_name: &str) -> String {
    let mut name = format!("{}-ui", driver_pod_name);
    name.truncate(63);
    name.trim_end_matches('-').to_lowercase()
}

/// Headless Service selecting the driver pod of `app` on the Spark UI port.
pub fn build_spark_ui_service(app: &SparkApplication) -> Result<Service> {
    Ok(Service {
        metadata: ObjectMeta {
            name: Some(spark_ui_resource_name(app.driver_pod_name())),
            namespace: Some(app.namespace().to_owned()),
            labels: Some(ui_resource_labels(app)),
            owner_references: Some(vec![driver_owner_reference(app)?]),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_owned()),
            selector: Some(BTreeMap::from([
                (SPARK_APP_TAG_LABEL.to_owned(), app.tag().to_owned()),
                (SPARK_ROLE_LABEL.to_owned(), SPARK_ROLE_DRIVER.to_owned()),
            ])),
            ports: Some(vec![ServicePort {
                name: Some(SPARK_UI_PORT_NAME.to_owned()),
                port: SPARK_UI_PORT,
                protocol: Some("TCP".to_owned()),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    })
}

/// Ingress routing `/{tag}/` on the configured host to the UI Service.
pub fn build_spark_ui_ingress(app: &SparkApplication, config: &IngressConfig) -> Result<Ingress> {
    let name = spark_ui_resource_name(app.driver_pod_name());
    let mut annotations: BTreeMap<String, String> = INGRESS_ANNOTATIONS
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect();
    annotations.insert(CREATED_BY_LABEL.to_owned(), CREATED_BY_VALUE.to_owned());
    annotations.extend(parse_annotations(config.additional_annotations.as_deref()));
    if let Some(snippet) = config.additional_conf_snippet.as_deref() {
        if !snippet.is_empty() {
            annotations.insert(CONF_SNIPPET_ANNOTATION.to_owned(), snippet.to_owned());
        }
    }
    let tls = (config.protocol.ends_with('s') && config.tls_secret_name.is_some()).then(|| {
        vec![IngressTLS {
            hosts: Some(vec![config.host.clone()]),
            secret_name: config.tls_secret_name.clone(),
        }]
    });
    Ok(Ingress {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(app.namespace().to_owned()),
            labels: Some(ui_resource_labels(app)),
            annotations: Some(annotations),
            owner_references: Some(vec![driver_owner_reference(app)?]),
            ..ObjectMeta::default()
        },
        spec: Some(IngressSpec {
            tls,
            rules: Some(vec![IngressRule {
                host: Some(config.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(format!("/{}/", app.tag())),
                        path_type: "Prefix".to_owned(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name,
                                port: Some(ServiceBackendPort {
                                    name: Some(SPARK_UI_PORT_NAME.to_owned()),
                                    number: None,
                                }),
                            }),
                            resource: None,
                        },
                    }],
                }),
            }]),
            ..IngressSpec::default()
        }),
        ..Ingress::default()
    })
}

fn ui_resource_labels(app: &SparkApplication) -> BTreeMap<String, String> {
    BTreeMap::from([
        (SPARK_APP_TAG_LABEL.to_owned(), app.tag().to_owned()),
        (CREATED_BY_LABEL.to_owned(), CREATED_BY_VALUE.to_owned()),
    ])
}

/// Controller reference binding the resource lifetime to the driver pod.
fn driver_owner_reference(app: &SparkApplication) -> Result<OwnerReference> {
    let uid = app.driver_pod().metadata.uid.clone().ok_or_else(|| {
        SparkwatchError::fail_to_create_ingress(anyhow!(
            "Driver pod {} has no uid.",
            app.driver_pod_name()
        ))
    })?;
    Ok(OwnerReference {
        api_version: "v1".to_owned(),
        kind: "Pod".to_owned(),
        name: app.driver_pod_name().to_owned(),
        uid,
        controller: Some(true),
        block_owner_deletion: None,
    })
}

/// Parse `k=v;k=v` annotation pairs; segments without `=` are skipped.
fn parse_annotations(raw: Option<&str>) -> Vec<(String, String)> {
    raw.map(|raw| {
        raw.split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
            .filter(|(key, _)| !key.is_empty())
            .collect()
    })
    .unwrap_or_default()
}
