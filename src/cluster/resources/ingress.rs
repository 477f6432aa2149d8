use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Api, Client};
use std::collections::BTreeMap;

use crate::cluster::key::{self, Role};
use crate::cluster::resources::service::{API_PORT_NAME, ETCD_PORT_NAME};
use crate::cluster::resources::{contains_all, CrudResource};
use crate::config::OperatorConfig;
use crate::crd::kvmconfig::KvmConfig;
use crate::errors::Error;
use crate::labels_and_annotations::SSL_PASSTHROUGH_ANNOTATION;

/// TLS passthrough ingresses for the tenant API server and etcd
pub struct IngressResource;

fn passthrough_ingress(
    cr: &KvmConfig,
    config: &OperatorConfig,
    name: &str,
    host: &str,
    port_name: &str,
) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(key::cluster_namespace(cr)),
            labels: Some(key::cluster_labels(cr)),
            annotations: Some(BTreeMap::from([(
                SSL_PASSTHROUGH_ANNOTATION.to_string(),
                String::from("true"),
            )])),
            ..ObjectMeta::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some(config.ingress_class.clone()),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![host.to_string()]),
                secret_name: None,
            }]),
            rules: Some(vec![IngressRule {
                host: Some(host.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(String::from("/")),
                        path_type: String::from("Prefix"),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: Role::Master.to_string(),
                                port: Some(ServiceBackendPort {
                                    name: Some(port_name.to_string()),
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
    }
}

impl CrudResource for IngressResource {
    type K = Ingress;

    fn name(&self) -> &'static str {
        "ingress"
    }

    fn api(&self, client: Client, cr: &KvmConfig) -> Api<Ingress> {
        Api::namespaced(client, &key::cluster_namespace(cr))
    }

    fn desired_state(
        &self,
        cr: &KvmConfig,
        config: &OperatorConfig,
    ) -> Result<Vec<Ingress>, Error> {
        let cluster = &cr.spec.cluster;
        Ok(vec![
            passthrough_ingress(
                cr,
                config,
                API_PORT_NAME,
                &cluster.kubernetes.api.domain,
                API_PORT_NAME,
            ),
            passthrough_ingress(
                cr,
                config,
                ETCD_PORT_NAME,
                &cluster.etcd.domain,
                ETCD_PORT_NAME,
            ),
        ])
    }

    fn needs_update(&self, current: &Ingress, desired: &Ingress) -> bool {
        let rules = |ingress: &Ingress| {
            ingress
                .spec
                .as_ref()
                .map(|spec| (spec.rules.clone(), spec.tls.clone(), spec.ingress_class_name.clone()))
        };
        rules(current) != rules(desired)
            || !contains_all(&current.metadata.annotations, &desired.metadata.annotations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fixtures::{kvm_config, operator_config};
    use kube::ResourceExt;
    use pretty_assertions::assert_eq;

    fn host_and_port(ingress: &Ingress) -> (String, String, String) {
        let rule = &ingress.spec.as_ref().unwrap().rules.as_ref().unwrap()[0];
        let backend = rule.http.as_ref().unwrap().paths[0]
            .backend
            .service
            .as_ref()
            .unwrap();
        (
            rule.host.clone().unwrap(),
            backend.name.clone(),
            backend.port.as_ref().unwrap().name.clone().unwrap(),
        )
    }

    #[test]
    fn api_and_etcd_are_routed_to_master() {
        let ingresses = IngressResource
            .desired_state(&kvm_config(), &operator_config())
            .unwrap();
        assert_eq!(ingresses.len(), 2);
        assert_eq!(
            host_and_port(&ingresses[0]),
            (
                String::from("api.al9qy.k8s.example.com"),
                String::from("master"),
                String::from("api")
            )
        );
        assert_eq!(
            host_and_port(&ingresses[1]),
            (
                String::from("etcd.al9qy.k8s.example.com"),
                String::from("master"),
                String::from("etcd")
            )
        );
        assert_eq!(
            ingresses[0]
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(SSL_PASSTHROUGH_ANNOTATION))
                .map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn changed_domain_triggers_update() {
        let cr = kvm_config();
        let current = IngressResource.desired_state(&cr, &operator_config()).unwrap();
        let mut cr = cr;
        cr.spec.cluster.etcd.domain = String::from("etcd.al9qy.example.org");
        let desired = IngressResource.desired_state(&cr, &operator_config()).unwrap();

        let updates = IngressResource.update_change(&current, &desired);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].metadata.name.as_deref(), Some("etcd"));
    }

    #[test]
    fn foreign_annotations_do_not_trigger_updates() {
        let desired = IngressResource
            .desired_state(&kvm_config(), &operator_config())
            .unwrap();
        let mut current = desired.clone();
        for ingress in current.iter_mut() {
            ingress.annotations_mut().insert(
                String::from("field.cattle.io/publicEndpoints"),
                String::from("[]"),
            );
        }
        assert!(IngressResource.update_change(&current, &desired).is_empty());
    }
}
