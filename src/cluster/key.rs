//! Names and values derived from a [`KvmConfig`]
//!
//! Everything the resources need to agree on (object names, labels, device names)
//! is computed here so that current and desired state always line up.
use humanize_rs::bytes::Bytes;
use ipnet::Ipv4Net;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::crd::kvmconfig::{KvmConfig, NodeResources};
use crate::errors::Error;
use crate::labels_and_annotations::{
    APP_LABEL, CLUSTER_LABEL, CLUSTER_SHORT_LABEL, CUSTOMER_LABEL, MANAGED_BY_LABEL, NODE_LABEL,
    ORGANIZATION_LABEL,
};
use crate::OPERATOR_NAME;

const MAC_PREFIX: &str = "52:54:00";
const MAX_INTERFACE_NAME_LENGTH: usize = 15;
const MEBIBYTE: u64 = 1024 * 1024;
// Memory reserved for QEMU itself on top of the guest memory
const QEMU_MEMORY_OVERHEAD_MIB: u64 = 1024;

lazy_static! {
    static ref DNS_LABEL: Regex = Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").expect("valid regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Master,
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Worker => "worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant cluster node: its ID from `.spec.cluster` joined with its resources from `.spec.kvm`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node<'a> {
    pub role: Role,
    pub id: &'a str,
    pub resources: &'a NodeResources,
}

impl Node<'_> {
    /// Name shared by the node's config map and deployment
    pub fn name(&self) -> String {
        node_name(self.role, self.id)
    }
}

pub fn cluster_id(cr: &KvmConfig) -> &str {
    &cr.spec.cluster.id
}

pub fn customer_id(cr: &KvmConfig) -> &str {
    &cr.spec.cluster.customer.id
}

/// Every tenant cluster lives in a namespace named after its ID
pub fn cluster_namespace(cr: &KvmConfig) -> String {
    cluster_id(cr).to_string()
}

pub fn version_bundle_version(cr: &KvmConfig) -> &str {
    &cr.spec.version_bundle.version
}

pub fn node_name(role: Role, id: &str) -> String {
    format!("{role}-{id}")
}

pub fn etcd_pvc_name(node_id: &str) -> String {
    format!("pvc-master-etcd-{node_id}")
}

pub fn service_account_name(cr: &KvmConfig) -> String {
    cluster_id(cr).to_string()
}

pub fn network_bridge_name(cr: &KvmConfig) -> String {
    format!("br-{}", cluster_id(cr))
}

pub fn network_tap_name(cr: &KvmConfig, node_index: u32) -> Result<String, Error> {
    let name = format!("tap-{}-{}", cluster_id(cr), node_index);
    if name.len() > MAX_INTERFACE_NAME_LENGTH {
        return Err(Error::invalid_spec(
            cluster_id(cr),
            format!("tap device name {name} exceeds {MAX_INTERFACE_NAME_LENGTH} characters"),
        ));
    }
    Ok(name)
}

/// Deterministic, locally administered MAC address for a node's tap device
pub fn mac_address(cr: &KvmConfig, node: &Node) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cluster_id(cr));
    hasher.update(node.role.as_str());
    hasher.update(node.id);
    let hash = hasher.finalize();
    format!(
        "{}:{:02x}:{:02x}:{:02x}",
        MAC_PREFIX, hash[29], hash[30], hash[31]
    )
}

/// Guest memory plus QEMU overhead, in MiB
pub fn memory_quantity(resources: &NodeResources) -> Result<Quantity, Error> {
    let bytes = resources.memory.parse::<Bytes<u64>>()?.size();
    let mebibytes = bytes.div_ceil(MEBIBYTE) + QEMU_MEMORY_OVERHEAD_MIB;
    Ok(Quantity(format!("{mebibytes}Mi")))
}

/// Guest memory as passed to the VM, in MiB
pub fn guest_memory_mib(resources: &NodeResources) -> Result<u64, Error> {
    let bytes = resources.memory.parse::<Bytes<u64>>()?.size();
    Ok(bytes.div_ceil(MEBIBYTE))
}

pub fn disk_quantity(resources: &NodeResources) -> Quantity {
    Quantity(format!("{}G", resources.disk))
}

pub fn cpu_quantity(resources: &NodeResources) -> Quantity {
    Quantity(resources.cpus.to_string())
}

fn cluster_ip_range(cr: &KvmConfig) -> Result<Ipv4Net, Error> {
    Ok(cr.spec.cluster.kubernetes.api.cluster_ip_range.parse::<Ipv4Net>()?)
}

fn nth_host(cr: &KvmConfig, n: usize) -> Result<Ipv4Addr, Error> {
    cluster_ip_range(cr)?.hosts().nth(n).ok_or_else(|| {
        Error::invalid_spec(
            cluster_id(cr),
            format!(
                "cluster IP range {} is too small",
                cr.spec.cluster.kubernetes.api.cluster_ip_range
            ),
        )
    })
}

/// ClusterIP of the tenant `kubernetes` service, the first host of the range
pub fn api_service_ip(cr: &KvmConfig) -> Result<Ipv4Addr, Error> {
    nth_host(cr, 0)
}

/// ClusterIP of the tenant DNS service, the tenth host of the range
pub fn dns_service_ip(cr: &KvmConfig) -> Result<Ipv4Addr, Error> {
    nth_host(cr, 9)
}

/// Pair up node IDs and node resources, masters first
pub fn nodes(cr: &KvmConfig) -> Result<Vec<Node<'_>>, Error> {
    let groups = [
        (Role::Master, &cr.spec.cluster.masters, &cr.spec.kvm.masters),
        (Role::Worker, &cr.spec.cluster.workers, &cr.spec.kvm.workers),
    ];

    let mut nodes = Vec::new();
    for (role, ids, resources) in groups {
        if ids.len() != resources.len() {
            return Err(Error::invalid_spec(
                cluster_id(cr),
                format!(
                    "{} {role} IDs but {} {role} resource definitions",
                    ids.len(),
                    resources.len()
                ),
            ));
        }
        for (node, resources) in ids.iter().zip(resources.iter()) {
            if !DNS_LABEL.is_match(&node.id) {
                return Err(Error::invalid_spec(
                    cluster_id(cr),
                    format!("{role} ID {:?} is not a valid DNS label", node.id),
                ));
            }
            nodes.push(Node {
                role,
                id: &node.id,
                resources,
            });
        }
    }
    Ok(nodes)
}

/// Values written verbatim into the cloud-config document, by field path
fn rendered_values(cr: &KvmConfig) -> [(&'static str, &str); 10] {
    let cluster = &cr.spec.cluster;
    let kubernetes = &cluster.kubernetes;
    [
        ("docker.daemon.cidr", cluster.docker.daemon.cidr.as_str()),
        ("etcd.domain", cluster.etcd.domain.as_str()),
        ("etcd.prefix", cluster.etcd.prefix.as_str()),
        ("kubernetes.api.clusterIPRange", kubernetes.api.cluster_ip_range.as_str()),
        ("kubernetes.api.domain", kubernetes.api.domain.as_str()),
        ("kubernetes.domain", kubernetes.domain.as_str()),
        ("kubernetes.kubelet.altNames", kubernetes.kubelet.alt_names.as_str()),
        ("kubernetes.kubelet.domain", kubernetes.kubelet.domain.as_str()),
        ("kubernetes.kubelet.labels", kubernetes.kubelet.labels.as_str()),
        ("kubernetes.networkSetup.docker.image", kubernetes.network_setup.docker.image.as_str()),
    ]
}

/// A line break or other control character would end the YAML scalar it is rendered into
pub fn single_line(cr: &KvmConfig, field: &str, value: &str) -> Result<(), Error> {
    if value.chars().any(char::is_control) {
        return Err(Error::invalid_spec(
            cluster_id(cr),
            format!("{field} must be a single line without control characters"),
        ));
    }
    Ok(())
}

pub fn validate_rendered_values(cr: &KvmConfig) -> Result<(), Error> {
    rendered_values(cr)
        .iter()
        .try_for_each(|(field, value)| single_line(cr, field, value))
}

/// Fail early on objects that can not produce a consistent set of resources
pub fn validate(cr: &KvmConfig) -> Result<(), Error> {
    if !DNS_LABEL.is_match(cluster_id(cr)) {
        return Err(Error::invalid_spec(
            cluster_id(cr),
            "cluster ID is not a valid DNS label",
        ));
    }
    if cr.spec.cluster.masters.is_empty() {
        return Err(Error::invalid_spec(cluster_id(cr), "no masters defined"));
    }
    let nodes = nodes(cr)?;
    let mut ids: Vec<&str> = nodes.iter().map(|node| node.id).collect();
    ids.sort_unstable();
    if let Some(duplicate) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(Error::invalid_spec(
            cluster_id(cr),
            format!("node ID {} is used more than once", duplicate[0]),
        ));
    }
    validate_rendered_values(cr)?;
    api_service_ip(cr)?;
    dns_service_ip(cr)?;
    Ok(())
}

/// Labels put on every object managed for a tenant cluster
pub fn cluster_labels(cr: &KvmConfig) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string()),
        (CLUSTER_LABEL.to_string(), cluster_id(cr).to_string()),
        (ORGANIZATION_LABEL.to_string(), customer_id(cr).to_string()),
    ])
}

/// Label selector matching [`cluster_labels`]
pub fn cluster_label_selector(cr: &KvmConfig) -> String {
    format!(
        "{MANAGED_BY_LABEL}={OPERATOR_NAME},{CLUSTER_LABEL}={}",
        cluster_id(cr)
    )
}

/// Selector labels of a node group's pods
pub fn role_selector(cr: &KvmConfig, role: Role) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), role.to_string()),
        (CLUSTER_SHORT_LABEL.to_string(), cluster_id(cr).to_string()),
    ])
}

pub fn node_selector(cr: &KvmConfig, node: &Node) -> BTreeMap<String, String> {
    let mut labels = role_selector(cr, node.role);
    labels.insert(NODE_LABEL.to_string(), node.id.to_string());
    labels
}

pub fn node_labels(cr: &KvmConfig, node: &Node) -> BTreeMap<String, String> {
    let mut labels = cluster_labels(cr);
    labels.extend(node_selector(cr, node));
    labels.insert(CUSTOMER_LABEL.to_string(), customer_id(cr).to_string());
    labels
}
