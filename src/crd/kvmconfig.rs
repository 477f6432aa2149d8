use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{Patch, PatchParams, PostParams},
    Api, Client, CustomResource, CustomResourceExt, Resource, ResourceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, instrument};

use crate::errors::Error;
use crate::utils::wait_crd_ready;
use crate::OPERATOR_NAME;

pub const CRD_NAME: &str = "kvmconfigs.provider.giantswarm.io";

#[derive(
    CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema,
)]
#[kube(
    group = "provider.giantswarm.io",
    version = "v1alpha1",
    kind = "KVMConfig",
    struct = "KvmConfig",
    status = "KvmConfigStatus",
    derive = "PartialEq",
    derive = "Default",
    shortname = "kvm",
    namespaced,
    printcolumn = r#"{"name":"Cluster", "type":"string", "description":"Tenant cluster ID", "jsonPath":".spec.cluster.id"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "description":"Version bundle", "jsonPath":".spec.versionBundle.version"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KvmConfigSpec {
    pub cluster: ClusterSpec,
    pub kvm: KvmSpec,
    pub version_bundle: VersionBundle,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub id: String,
    pub customer: Customer,
    #[serde(default)]
    pub docker: Docker,
    pub etcd: Etcd,
    pub kubernetes: Kubernetes,
    #[serde(default)]
    pub masters: Vec<ClusterNode>,
    #[serde(default)]
    pub workers: Vec<ClusterNode>,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct Customer {
    pub id: String,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct Docker {
    #[serde(default)]
    pub daemon: DockerDaemon,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct DockerDaemon {
    // CIDR of the docker0 bridge inside the VMs
    #[serde(default)]
    pub cidr: String,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct Etcd {
    pub domain: String,
    pub port: i32,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Kubernetes {
    pub api: KubernetesApi,
    // Cluster domain, e.g. cluster.local
    pub domain: String,
    pub ingress_controller: IngressController,
    pub kubelet: Kubelet,
    #[serde(default)]
    pub network_setup: NetworkSetup,
    #[serde(default)]
    pub ssh: Ssh,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesApi {
    #[serde(rename = "clusterIPRange")]
    pub cluster_ip_range: String,
    pub domain: String,
    pub secure_port: i32,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressController {
    pub domain: String,
    #[serde(default)]
    pub wildcard_domain: String,
    pub insecure_port: i32,
    pub secure_port: i32,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Kubelet {
    #[serde(default)]
    pub alt_names: String,
    pub domain: String,
    // Comma separated key=value pairs
    #[serde(default)]
    pub labels: String,
    pub port: i32,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct NetworkSetup {
    #[serde(default)]
    pub docker: DockerImage,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Ssh {
    #[serde(default)]
    pub user_list: Vec<SshUser>,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SshUser {
    pub name: String,
    pub public_key: String,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct ClusterNode {
    pub id: String,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct DockerImage {
    #[serde(default)]
    pub image: String,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct DockerImageRef {
    pub docker: DockerImage,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KvmSpec {
    pub endpoint_updater: DockerImageRef,
    #[serde(rename = "k8sKVM")]
    pub k8s_kvm: K8sKvm,
    #[serde(default)]
    pub masters: Vec<NodeResources>,
    #[serde(default)]
    pub workers: Vec<NodeResources>,
    #[serde(default)]
    pub network: KvmNetwork,
    #[serde(default)]
    pub port_mappings: Vec<PortMapping>,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct K8sKvm {
    pub docker: DockerImage,
    #[serde(default)]
    pub storage_type: StorageType,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, Copy, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StorageType {
    #[default]
    HostPath,
    PersistentVolume,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeResources {
    pub cpus: u32,
    // Disk size in GB
    pub disk: f64,
    // String to allow suffixes like '2 GiB'
    pub memory: String,
    #[serde(default, rename = "dockerVolumeSizeGB")]
    pub docker_volume_size_gb: u32,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct KvmNetwork {
    #[serde(default)]
    pub flannel: Flannel,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct Flannel {
    #[serde(default)]
    pub vni: u32,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub name: String,
    pub node_port: i32,
    pub target_port: i32,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct VersionBundle {
    pub version: String,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct KvmConfigStatus {
    #[serde(default)]
    pub cluster: ClusterStatus,
    #[serde(default)]
    pub kvm: KvmStatus,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct ClusterStatus {
    #[serde(default)]
    pub conditions: Vec<StatusCondition>,
    #[serde(default)]
    pub versions: Vec<StatusVersion>,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    // RFC 3339
    pub last_transition_time: String,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct StatusVersion {
    pub version: String,
    // RFC 3339
    pub date: String,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KvmStatus {
    #[serde(default)]
    pub node_indexes: BTreeMap<String, u32>,
}

#[instrument(skip(client))]
pub async fn create(client: Client) -> Result<(), Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let patch_params = PatchParams::apply(OPERATOR_NAME).force();

    let crd = KvmConfig::crd();
    crds.patch(CRD_NAME, &patch_params, &Patch::Apply(&crd))
        .await?;
    wait_crd_ready(&crds, CRD_NAME).await?;
    info!("CRD {} applied", CRD_NAME);
    Ok(())
}

pub fn crd_yaml() -> Result<String, Error> {
    Ok(serde_yaml::to_string(&KvmConfig::crd())?)
}

create_set_status!(KvmConfig, KvmConfigStatus, set_kvm_config_status);
