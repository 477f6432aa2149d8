use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Api, Client};
use std::collections::BTreeMap;

use crate::cluster::key::{self, Role};
use crate::cluster::resources::{contains_all, CrudResource};
use crate::config::OperatorConfig;
use crate::crd::kvmconfig::KvmConfig;
use crate::errors::Error;
use crate::labels_and_annotations::{APP_LABEL, PROMETHEUS_SCRAPE_ANNOTATION};

pub const ETCD_PORT_NAME: &str = "etcd";
pub const API_PORT_NAME: &str = "api";
// Port etcd listens on inside the master VM
const ETCD_TARGET_PORT: i32 = 2379;

/// `master` and `worker` services in front of the VM pods
pub struct ServiceResource;

fn tcp_port(name: &str, port: i32, target_port: i32, node_port: Option<i32>) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        protocol: Some(String::from("TCP")),
        port,
        target_port: Some(IntOrString::Int(target_port)),
        node_port,
        ..ServicePort::default()
    }
}

fn service(
    cr: &KvmConfig,
    role: Role,
    type_: &str,
    ports: Vec<ServicePort>,
    annotations: BTreeMap<String, String>,
) -> Service {
    let mut labels = key::cluster_labels(cr);
    labels.insert(APP_LABEL.to_string(), role.to_string());

    Service {
        metadata: ObjectMeta {
            name: Some(role.to_string()),
            namespace: Some(key::cluster_namespace(cr)),
            labels: Some(labels),
            annotations: Some(annotations),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(type_.to_string()),
            selector: Some(key::role_selector(cr, role)),
            ports: Some(ports),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

fn master_service(cr: &KvmConfig) -> Service {
    let cluster = &cr.spec.cluster;
    service(
        cr,
        Role::Master,
        "ClusterIP",
        vec![
            tcp_port(ETCD_PORT_NAME, cluster.etcd.port, ETCD_TARGET_PORT, None),
            tcp_port(
                API_PORT_NAME,
                cluster.kubernetes.api.secure_port,
                cluster.kubernetes.api.secure_port,
                None,
            ),
        ],
        BTreeMap::from([(PROMETHEUS_SCRAPE_ANNOTATION.to_string(), String::from("true"))]),
    )
}

fn worker_service(cr: &KvmConfig) -> Service {
    let port_mappings = &cr.spec.kvm.port_mappings;
    if port_mappings.is_empty() {
        let ingress = &cr.spec.cluster.kubernetes.ingress_controller;
        return service(
            cr,
            Role::Worker,
            "ClusterIP",
            vec![
                tcp_port("http", ingress.insecure_port, ingress.insecure_port, None),
                tcp_port("https", ingress.secure_port, ingress.secure_port, None),
            ],
            BTreeMap::new(),
        );
    }

    let ports = port_mappings
        .iter()
        .map(|mapping| {
            tcp_port(
                &mapping.name,
                mapping.target_port,
                mapping.target_port,
                Some(mapping.node_port),
            )
        })
        .collect();
    service(cr, Role::Worker, "NodePort", ports, BTreeMap::new())
}

/// Compare the fields we own, ignoring what the API server fills in (cluster IP, defaults)
fn port_signature(service: &Service) -> Vec<(Option<String>, i32, Option<IntOrString>, Option<i32>)> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(|ports| {
            ports
                .iter()
                .map(|port| {
                    (
                        port.name.clone(),
                        port.port,
                        port.target_port.clone(),
                        port.node_port,
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

impl CrudResource for ServiceResource {
    type K = Service;

    fn name(&self) -> &'static str {
        "service"
    }

    fn api(&self, client: Client, cr: &KvmConfig) -> Api<Service> {
        Api::namespaced(client, &key::cluster_namespace(cr))
    }

    fn desired_state(
        &self,
        cr: &KvmConfig,
        _config: &OperatorConfig,
    ) -> Result<Vec<Service>, Error> {
        Ok(vec![master_service(cr), worker_service(cr)])
    }

    fn needs_update(&self, current: &Service, desired: &Service) -> bool {
        let spec_field = |service: &Service| {
            service
                .spec
                .as_ref()
                .map(|spec| (spec.type_.clone(), spec.selector.clone()))
        };
        port_signature(current) != port_signature(desired)
            || spec_field(current) != spec_field(desired)
            || !contains_all(&current.metadata.labels, &desired.metadata.labels)
            || !contains_all(&current.metadata.annotations, &desired.metadata.annotations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fixtures::{kvm_config, operator_config};
    use kube::ResourceExt;
    use pretty_assertions::assert_eq;

    fn desired(cr: &KvmConfig) -> Vec<Service> {
        ServiceResource.desired_state(cr, &operator_config()).unwrap()
    }

    #[test]
    fn master_service_exposes_etcd_and_api() {
        let services = desired(&kvm_config());
        let master = &services[0];
        assert_eq!(master.metadata.name.as_deref(), Some("master"));

        let spec = master.spec.as_ref().unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(
            spec.selector,
            Some(BTreeMap::from([
                (String::from("app"), String::from("master")),
                (String::from("cluster"), String::from("al9qy")),
            ]))
        );
        assert_eq!(
            port_signature(master),
            vec![
                (Some(String::from("etcd")), 2379, Some(IntOrString::Int(2379)), None),
                (Some(String::from("api")), 443, Some(IntOrString::Int(443)), None),
            ]
        );
    }

    #[test]
    fn worker_service_uses_port_mappings() {
        let services = desired(&kvm_config());
        let worker = &services[1];
        assert_eq!(worker.metadata.name.as_deref(), Some("worker"));
        assert_eq!(
            worker.spec.as_ref().and_then(|s| s.type_.as_deref()),
            Some("NodePort")
        );
        assert_eq!(
            port_signature(worker),
            vec![
                (Some(String::from("http")), 30010, Some(IntOrString::Int(30010)), Some(31010)),
                (Some(String::from("https")), 30011, Some(IntOrString::Int(30011)), Some(31011)),
            ]
        );
    }

    #[test]
    fn worker_service_without_port_mappings_uses_ingress_ports() {
        let mut cr = kvm_config();
        cr.spec.kvm.port_mappings.clear();
        let services = desired(&cr);
        let worker = &services[1];
        assert_eq!(
            worker.spec.as_ref().and_then(|s| s.type_.as_deref()),
            Some("ClusterIP")
        );
        assert_eq!(
            port_signature(worker),
            vec![
                (Some(String::from("http")), 30010, Some(IntOrString::Int(30010)), None),
                (Some(String::from("https")), 30011, Some(IntOrString::Int(30011)), None),
            ]
        );
    }

    #[test]
    fn server_assigned_fields_do_not_trigger_updates() {
        let cr = kvm_config();
        let desired = desired(&cr);
        let mut current = desired.clone();
        for service in current.iter_mut() {
            let spec = service.spec.as_mut().unwrap();
            spec.cluster_ip = Some(String::from("172.31.4.4"));
            spec.session_affinity = Some(String::from("None"));
        }
        assert!(ServiceResource.update_change(&current, &desired).is_empty());
    }

    #[test]
    fn changed_port_triggers_update() {
        let cr = kvm_config();
        let current = desired(&cr);
        let mut cr = cr;
        cr.spec.cluster.kubernetes.api.secure_port = 6443;
        let desired = desired(&cr);

        let updates = ServiceResource.update_change(&current, &desired);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].metadata.name.as_deref(), Some("master"));
    }

    #[test]
    fn foreign_labels_and_annotations_do_not_trigger_updates() {
        let desired = desired(&kvm_config());
        let mut current = desired.clone();
        for service in current.iter_mut() {
            service
                .labels_mut()
                .insert(String::from("team"), String::from("platform"));
            service.annotations_mut().insert(
                String::from("kubectl.kubernetes.io/last-applied-configuration"),
                String::from("{}"),
            );
        }
        assert!(ServiceResource.update_change(&current, &desired).is_empty());
    }
}
