//! Sample objects shared by unit tests
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use crate::config::OperatorConfig;
use crate::crd::kvmconfig::*;

fn node_resources(cpus: u32, disk: f64, memory: &str) -> NodeResources {
    NodeResources {
        cpus,
        disk,
        memory: memory.to_string(),
        docker_volume_size_gb: 30,
    }
}

pub fn kvm_config() -> KvmConfig {
    let spec = KvmConfigSpec {
        cluster: ClusterSpec {
            id: String::from("al9qy"),
            customer: Customer {
                id: String::from("acme"),
            },
            docker: Docker {
                daemon: DockerDaemon {
                    cidr: String::from("172.17.0.1/16"),
                },
            },
            etcd: Etcd {
                domain: String::from("etcd.al9qy.k8s.example.com"),
                port: 2379,
                prefix: String::from("giantswarm.io"),
            },
            kubernetes: Kubernetes {
                api: KubernetesApi {
                    cluster_ip_range: String::from("172.31.0.0/16"),
                    domain: String::from("api.al9qy.k8s.example.com"),
                    secure_port: 443,
                },
                domain: String::from("cluster.local"),
                ingress_controller: IngressController {
                    domain: String::from("ingress.al9qy.k8s.example.com"),
                    wildcard_domain: String::from("*.al9qy.k8s.example.com"),
                    insecure_port: 30010,
                    secure_port: 30011,
                },
                kubelet: Kubelet {
                    alt_names: String::from("kubernetes,kubernetes.default"),
                    domain: String::from("worker.al9qy.k8s.example.com"),
                    labels: String::from("giantswarm.io/provider=kvm,role=worker"),
                    port: 10250,
                },
                network_setup: NetworkSetup {
                    docker: DockerImage {
                        image: String::from("quay.io/giantswarm/k8s-setup-network-environment"),
                    },
                },
                ssh: Ssh {
                    user_list: vec![SshUser {
                        name: String::from("joe"),
                        public_key: String::from("ssh-ed25519 AAAAC3Nza joe@example.com"),
                    }],
                },
            },
            masters: vec![ClusterNode {
                id: String::from("m1"),
            }],
            workers: vec![
                ClusterNode {
                    id: String::from("w1"),
                },
                ClusterNode {
                    id: String::from("w2"),
                },
            ],
        },
        kvm: KvmSpec {
            endpoint_updater: DockerImageRef {
                docker: DockerImage {
                    image: String::from("quay.io/giantswarm/k8s-endpoint-updater:0.1.0"),
                },
            },
            k8s_kvm: K8sKvm {
                docker: DockerImage {
                    image: String::from("quay.io/giantswarm/k8s-kvm:0.2.0"),
                },
                storage_type: StorageType::HostPath,
            },
            masters: vec![node_resources(2, 20.0, "2 GiB")],
            workers: vec![
                node_resources(4, 40.0, "4 GiB"),
                node_resources(4, 40.0, "4 GiB"),
            ],
            network: KvmNetwork {
                flannel: Flannel { vni: 26 },
            },
            port_mappings: vec![
                PortMapping {
                    name: String::from("http"),
                    node_port: 31010,
                    target_port: 30010,
                },
                PortMapping {
                    name: String::from("https"),
                    node_port: 31011,
                    target_port: 30011,
                },
            ],
        },
        version_bundle: VersionBundle {
            version: String::from(env!("CARGO_PKG_VERSION")),
        },
    };

    let mut cr = KvmConfig::new("al9qy", spec);
    cr.metadata = ObjectMeta {
        name: Some(String::from("al9qy")),
        namespace: Some(String::from("default")),
        ..ObjectMeta::default()
    };
    cr
}

/// [`kvm_config`] with node indexes allocated in node order
pub fn kvm_config_with_indexes() -> KvmConfig {
    let mut cr = kvm_config();
    cr.status = Some(KvmConfigStatus {
        kvm: KvmStatus {
            node_indexes: BTreeMap::from([
                (String::from("m1"), 1),
                (String::from("w1"), 2),
                (String::from("w2"), 3),
            ]),
        },
        ..KvmConfigStatus::default()
    });
    cr
}

pub fn operator_config() -> OperatorConfig {
    OperatorConfig {
        ntp_servers: vec![String::from("0.pool.ntp.org")],
        sso_public_key: Some(String::from("ssh-rsa AAAAB3Nza sso@example.com")),
        ..OperatorConfig::default()
    }
}
