use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMapVolumeSource, Container, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    HostPathVolumeSource, ObjectFieldSelector, PersistentVolumeClaimVolumeSource,
    PodAffinityTerm, PodAntiAffinity, PodSpec, PodTemplateSpec, ResourceRequirements,
    SecurityContext, Volume, VolumeMount, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Api, Client, ResourceExt};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

use crate::cloudconfig::{self, USER_DATA_KEY};
use crate::cluster::key::{self, Node, Role};
use crate::cluster::resources::{find_by_name, CrudResource};
use crate::config::OperatorConfig;
use crate::crd::kvmconfig::{KvmConfig, StorageType};
use crate::errors::Error;
use crate::labels_and_annotations::{CLOUD_CONFIG_HASH_ANNOTATION, VERSION_BUNDLE_ANNOTATION};
use crate::utils::traits::kube::TryStatus;

pub const TEMPLATE_HASH_ANNOTATION: &str = "kvm-operator.giantswarm.io/template-hash";

const K8S_KVM_CONTAINER: &str = "k8s-kvm";
const ENDPOINT_UPDATER_CONTAINER: &str = "k8s-endpoint-updater";
const CLOUD_CONFIG_MOUNT: &str = "/cloudconfig";
const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// One single-replica deployment per node, each running one VM
pub struct DeploymentResource;

fn env(name: &str, value: impl ToString) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..EnvVar::default()
    }
}

fn volume_mount(name: &str, mount_path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: mount_path.to_string(),
        read_only: Some(read_only),
        ..VolumeMount::default()
    }
}

fn host_path_volume(name: &str, path: String) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path,
            type_: Some(String::from("DirectoryOrCreate")),
        }),
        ..Volume::default()
    }
}

fn node_index(cr: &KvmConfig, node: &Node) -> Result<u32, Error> {
    cr.try_status()?
        .kvm
        .node_indexes
        .get(node.id)
        .copied()
        .ok_or_else(|| {
            Error::MissingNodeIndex(key::cluster_id(cr).to_string(), node.id.to_string())
        })
}

fn volumes(cr: &KvmConfig, node: &Node, config: &OperatorConfig) -> Vec<Volume> {
    let mut volumes = vec![
        Volume {
            name: String::from("cloud-config"),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(node.name()),
                ..ConfigMapVolumeSource::default()
            }),
            ..Volume::default()
        },
        host_path_volume("images", config.host_images_path.clone()),
        Volume {
            name: String::from("rootfs"),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Volume::default()
        },
    ];

    if node.role == Role::Master {
        let etcd_data = match cr.spec.kvm.k8s_kvm.storage_type {
            StorageType::PersistentVolume => Volume {
                name: String::from("etcd-data"),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: key::etcd_pvc_name(node.id),
                    read_only: Some(false),
                }),
                ..Volume::default()
            },
            StorageType::HostPath => host_path_volume(
                "etcd-data",
                format!(
                    "{}/{}/{}/etcd",
                    config.host_volumes_path,
                    key::cluster_id(cr),
                    node.id
                ),
            ),
        };
        volumes.push(etcd_data);
    }
    volumes
}

fn k8s_kvm_container(cr: &KvmConfig, node: &Node, node_index: u32) -> Result<Container, Error> {
    let resources = node.resources;
    let quantities = BTreeMap::from([
        (String::from("cpu"), key::cpu_quantity(resources)),
        (String::from("memory"), key::memory_quantity(resources)?),
    ]);

    let mut volume_mounts = vec![
        volume_mount("cloud-config", CLOUD_CONFIG_MOUNT, true),
        volume_mount("images", "/usr/code/images", true),
        volume_mount("rootfs", "/usr/code/rootfs", false),
    ];
    if node.role == Role::Master {
        volume_mounts.push(volume_mount("etcd-data", "/etc/kubernetes/data/etcd", false));
    }

    Ok(Container {
        name: K8S_KVM_CONTAINER.to_string(),
        image: Some(cr.spec.kvm.k8s_kvm.docker.image.clone()),
        env: Some(vec![
            env("CORES", resources.cpus),
            env("DISK", key::disk_quantity(resources).0),
            env("MEMORY", key::guest_memory_mib(resources)?),
            env("DOCKER_VOLUME_SIZE", format!("{}G", resources.docker_volume_size_gb)),
            env("HOSTNAME", node.name()),
            env("ROLE", node.role),
            env("NETWORK_BRIDGE_NAME", key::network_bridge_name(cr)),
            env("NETWORK_TAP_NAME", key::network_tap_name(cr, node_index)?),
            env("MAC_ADDRESS", key::mac_address(cr, node)),
            env(
                "CLOUD_CONFIG_PATH",
                format!("{CLOUD_CONFIG_MOUNT}/{USER_DATA_KEY}"),
            ),
        ]),
        resources: Some(ResourceRequirements {
            requests: Some(quantities.clone()),
            limits: Some(quantities),
            ..ResourceRequirements::default()
        }),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            ..SecurityContext::default()
        }),
        volume_mounts: Some(volume_mounts),
        ..Container::default()
    })
}

fn endpoint_updater_container(cr: &KvmConfig, node: &Node) -> Container {
    Container {
        name: ENDPOINT_UPDATER_CONTAINER.to_string(),
        image: Some(cr.spec.kvm.endpoint_updater.docker.image.clone()),
        command: Some(vec![
            String::from("/opt/k8s-endpoint-updater"),
            String::from("update"),
            format!("--provider.bridge.name={}", key::network_bridge_name(cr)),
            format!(
                "--service.kubernetes.cluster.namespace={}",
                key::cluster_namespace(cr)
            ),
            format!("--service.kubernetes.cluster.service={}", node.role),
            String::from("--service.kubernetes.inCluster=true"),
            String::from("--updater.pod.names=$(POD_NAME)"),
        ]),
        env: Some(vec![EnvVar {
            name: String::from("POD_NAME"),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: String::from("metadata.name"),
                    ..ObjectFieldSelector::default()
                }),
                ..EnvVarSource::default()
            }),
            ..EnvVar::default()
        }]),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            ..SecurityContext::default()
        }),
        ..Container::default()
    }
}

/// Masters must not share a host, workers should not
fn anti_affinity(cr: &KvmConfig, node: &Node) -> Affinity {
    let term = PodAffinityTerm {
        label_selector: Some(LabelSelector {
            match_labels: Some(key::role_selector(cr, node.role)),
            ..LabelSelector::default()
        }),
        topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
        ..PodAffinityTerm::default()
    };

    let pod_anti_affinity = match node.role {
        Role::Master => PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![term]),
            ..PodAntiAffinity::default()
        },
        Role::Worker => PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    pod_affinity_term: term,
                    weight: 100,
                },
            ]),
            ..PodAntiAffinity::default()
        },
    };

    Affinity {
        pod_anti_affinity: Some(pod_anti_affinity),
        ..Affinity::default()
    }
}

fn deployment(cr: &KvmConfig, node: &Node, config: &OperatorConfig) -> Result<Deployment, Error> {
    let node_index = node_index(cr, node)?;
    let cloud_config = cloudconfig::render(cr, node, config)?;
    let labels = key::node_labels(cr, node);
    let version_bundle = key::version_bundle_version(cr).to_string();

    let template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            annotations: Some(BTreeMap::from([
                (CLOUD_CONFIG_HASH_ANNOTATION.to_string(), cloud_config.hash()),
                (VERSION_BUNDLE_ANNOTATION.to_string(), version_bundle.clone()),
            ])),
            ..ObjectMeta::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(key::service_account_name(cr)),
            host_network: Some(true),
            dns_policy: Some(String::from("ClusterFirstWithHostNet")),
            affinity: Some(anti_affinity(cr, node)),
            termination_grace_period_seconds: Some(60),
            containers: vec![
                k8s_kvm_container(cr, node, node_index)?,
                endpoint_updater_container(cr, node),
            ],
            volumes: Some(volumes(cr, node, config)),
            ..PodSpec::default()
        }),
    };
    let template_hash = format!("{:x}", Sha256::digest(serde_json::to_vec(&template)?));

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(node.name()),
            namespace: Some(key::cluster_namespace(cr)),
            labels: Some(labels),
            annotations: Some(BTreeMap::from([
                (TEMPLATE_HASH_ANNOTATION.to_string(), template_hash),
                (VERSION_BUNDLE_ANNOTATION.to_string(), version_bundle),
            ])),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(key::node_selector(cr, node)),
                ..LabelSelector::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some(String::from("Recreate")),
                ..DeploymentStrategy::default()
            }),
            template,
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    })
}

fn template_hash(deployment: &Deployment) -> Option<&String> {
    deployment
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(TEMPLATE_HASH_ANNOTATION))
}

/// A deployment is ready once the controller observed its latest spec and the VM pod is ready
pub fn is_ready(deployment: &Deployment) -> bool {
    let desired_replicas = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    deployment.status.as_ref().is_some_and(|status| {
        status.ready_replicas.unwrap_or(0) >= desired_replicas
            && status.observed_generation >= deployment.metadata.generation
    })
}

pub fn all_ready(deployments: &[Deployment]) -> bool {
    deployments.iter().all(is_ready)
}

impl CrudResource for DeploymentResource {
    type K = Deployment;

    fn name(&self) -> &'static str {
        "deployment"
    }

    fn api(&self, client: Client, cr: &KvmConfig) -> Api<Deployment> {
        Api::namespaced(client, &key::cluster_namespace(cr))
    }

    fn desired_state(
        &self,
        cr: &KvmConfig,
        config: &OperatorConfig,
    ) -> Result<Vec<Deployment>, Error> {
        key::nodes(cr)?
            .iter()
            .map(|node| deployment(cr, node, config))
            .collect()
    }

    fn needs_update(&self, current: &Deployment, desired: &Deployment) -> bool {
        template_hash(current) != template_hash(desired)
    }

    /// Replacing a deployment restarts its VM, so nodes are rolled one at a time and only
    /// while every other node is healthy
    fn update_change(&self, current: &[Deployment], desired: &[Deployment]) -> Vec<Deployment> {
        let mut outdated = desired.iter().filter(|desired| {
            find_by_name(current, &desired.name_any())
                .is_some_and(|current| self.needs_update(current, desired))
        });

        let Some(next) = outdated.next() else {
            return vec![];
        };
        if !all_ready(current) {
            debug!("deployment: postponing update of {}, not all nodes are ready", next.name_any());
            return vec![];
        }
        vec![next.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fixtures::{kvm_config, kvm_config_with_indexes, operator_config};
    use crate::cluster::resources::compute_change_set;
    use k8s_openapi::api::apps::v1::DeploymentStatus;
    use pretty_assertions::assert_eq;

    fn desired(cr: &KvmConfig) -> Vec<Deployment> {
        DeploymentResource
            .desired_state(cr, &operator_config())
            .unwrap()
    }

    fn ready(mut deployment: Deployment) -> Deployment {
        deployment.metadata.generation = Some(2);
        deployment.status = Some(DeploymentStatus {
            observed_generation: Some(2),
            ready_replicas: Some(1),
            ..DeploymentStatus::default()
        });
        deployment
    }

    fn container<'a>(deployment: &'a Deployment, name: &str) -> &'a Container {
        deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|spec| spec.containers.iter().find(|c| c.name == name))
            .unwrap()
    }

    fn env_value(container: &Container, name: &str) -> Option<String> {
        container
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)?
            .value
            .clone()
    }

    fn volume_names(deployment: &Deployment) -> Vec<String> {
        deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|spec| spec.volumes.as_ref())
            .map(|volumes| volumes.iter().map(|v| v.name.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn one_deployment_per_node() {
        let deployments = desired(&kvm_config_with_indexes());
        let names: Vec<String> = deployments.iter().map(|d| d.name_any()).collect();
        assert_eq!(names, vec!["master-m1", "worker-w1", "worker-w2"]);

        let spec = deployments[0].spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(
            spec.strategy.as_ref().and_then(|s| s.type_.as_deref()),
            Some("Recreate")
        );
    }

    #[test]
    fn missing_status_is_an_error() {
        let result = DeploymentResource.desired_state(&kvm_config(), &operator_config());
        assert!(matches!(result, Err(Error::NoStatusSubresource(_))));
    }

    #[test]
    fn missing_node_index_names_the_node() {
        let mut cr = kvm_config_with_indexes();
        if let Some(status) = cr.status.as_mut() {
            status.kvm.node_indexes.remove("w2");
        }
        let result = DeploymentResource.desired_state(&cr, &operator_config());
        assert!(matches!(
            result,
            Err(Error::MissingNodeIndex(cluster, node)) if cluster == "al9qy" && node == "w2"
        ));
    }

    #[test]
    fn vm_container_is_configured_from_node_resources() {
        let deployments = desired(&kvm_config_with_indexes());
        let vm = container(&deployments[1], K8S_KVM_CONTAINER);

        assert_eq!(vm.image.as_deref(), Some("quay.io/giantswarm/k8s-kvm:0.2.0"));
        assert_eq!(env_value(vm, "CORES").as_deref(), Some("4"));
        assert_eq!(env_value(vm, "MEMORY").as_deref(), Some("4096"));
        assert_eq!(env_value(vm, "DISK").as_deref(), Some("40G"));
        assert_eq!(env_value(vm, "ROLE").as_deref(), Some("worker"));
        assert_eq!(env_value(vm, "NETWORK_BRIDGE_NAME").as_deref(), Some("br-al9qy"));
        assert_eq!(env_value(vm, "NETWORK_TAP_NAME").as_deref(), Some("tap-al9qy-2"));
        assert_eq!(
            env_value(vm, "CLOUD_CONFIG_PATH").as_deref(),
            Some("/cloudconfig/user_data")
        );

        let limits = vm.resources.as_ref().and_then(|r| r.limits.as_ref()).unwrap();
        assert_eq!(limits.get("memory").map(|q| q.0.as_str()), Some("5120Mi"));
        assert_eq!(limits.get("cpu").map(|q| q.0.as_str()), Some("4"));

        let updater = container(&deployments[1], ENDPOINT_UPDATER_CONTAINER);
        assert!(updater
            .command
            .as_ref()
            .unwrap()
            .contains(&String::from("--service.kubernetes.cluster.service=worker")));
    }

    #[test]
    fn only_masters_get_etcd_storage() {
        let deployments = desired(&kvm_config_with_indexes());
        assert_eq!(
            volume_names(&deployments[0]),
            vec!["cloud-config", "images", "rootfs", "etcd-data"]
        );
        assert_eq!(volume_names(&deployments[1]), vec!["cloud-config", "images", "rootfs"]);
    }

    #[test]
    fn persistent_storage_mounts_claim() {
        let mut cr = kvm_config_with_indexes();
        cr.spec.kvm.k8s_kvm.storage_type = StorageType::PersistentVolume;
        let deployments = desired(&cr);
        let etcd = deployments[0]
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|spec| spec.volumes.as_ref())
            .and_then(|volumes| volumes.iter().find(|v| v.name == "etcd-data"))
            .unwrap();
        assert_eq!(
            etcd.persistent_volume_claim.as_ref().map(|c| c.claim_name.as_str()),
            Some("pvc-master-etcd-m1")
        );
    }

    #[test]
    fn masters_require_anti_affinity_workers_prefer_it() {
        let deployments = desired(&kvm_config_with_indexes());
        let anti_affinity = |d: &Deployment| {
            d.spec
                .as_ref()
                .and_then(|spec| spec.template.spec.as_ref())
                .and_then(|spec| spec.affinity.clone())
                .and_then(|affinity| affinity.pod_anti_affinity)
                .unwrap()
        };

        let master = anti_affinity(&deployments[0]);
        assert!(master.required_during_scheduling_ignored_during_execution.is_some());
        assert!(master.preferred_during_scheduling_ignored_during_execution.is_none());

        let worker = anti_affinity(&deployments[1]);
        assert!(worker.required_during_scheduling_ignored_during_execution.is_none());
        assert!(worker.preferred_during_scheduling_ignored_during_execution.is_some());
    }

    #[test]
    fn cloud_config_change_rolls_pod_template() {
        let cr = kvm_config_with_indexes();
        let before = desired(&cr);
        let mut cr = cr;
        cr.spec.cluster.kubernetes.ssh.user_list.clear();
        let after = desired(&cr);

        assert_ne!(template_hash(&before[0]), template_hash(&after[0]));
        assert!(DeploymentResource.needs_update(&before[0], &after[0]));
    }

    #[test]
    fn updates_roll_one_node_at_a_time() {
        let cr = kvm_config_with_indexes();
        let current: Vec<Deployment> = desired(&cr).into_iter().map(ready).collect();

        let mut cr = cr;
        cr.spec.kvm.k8s_kvm.docker.image = String::from("quay.io/giantswarm/k8s-kvm:0.3.0");
        let desired = desired(&cr);

        let changes = compute_change_set(&DeploymentResource, &current, &desired);
        let updated: Vec<String> = changes.update.iter().map(|d| d.name_any()).collect();
        assert_eq!(updated, vec!["master-m1"]);
    }

    #[test]
    fn updates_wait_for_unready_nodes() {
        let cr = kvm_config_with_indexes();
        let mut current: Vec<Deployment> = desired(&cr).into_iter().map(ready).collect();
        current[2].status = Some(DeploymentStatus {
            observed_generation: Some(2),
            ready_replicas: Some(0),
            ..DeploymentStatus::default()
        });

        let mut cr = cr;
        cr.spec.kvm.k8s_kvm.docker.image = String::from("quay.io/giantswarm/k8s-kvm:0.3.0");
        let desired = desired(&cr);

        assert!(DeploymentResource.update_change(&current, &desired).is_empty());
    }

    #[test]
    fn readiness_requires_observed_generation() {
        let deployment = desired(&kvm_config_with_indexes()).remove(0);
        assert!(!is_ready(&deployment));

        let mut stale = ready(deployment.clone());
        stale.metadata.generation = Some(3);
        assert!(!is_ready(&stale));

        assert!(is_ready(&ready(deployment)));
    }
}
