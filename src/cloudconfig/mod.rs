//! Cloud-config user data handed to each VM through its config map
use askama::Template;
use sha2::{Digest, Sha256};

use crate::cluster::key::{self, Node, Role};
use crate::config::OperatorConfig;
use crate::crd::kvmconfig::KvmConfig;
use crate::errors::Error;

mod templates;

use templates::{CloudConfigTemplate, UserTemplate};

/// Key of the user data in the node config map
pub const USER_DATA_KEY: &str = "user_data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    pub content: String,
}

impl CloudConfig {
    /// SHA-256 of the rendered document, used to roll deployments on changes
    pub fn hash(&self) -> String {
        format!("{:x}", Sha256::digest(self.content.as_bytes()))
    }
}

// JSON strings are valid YAML double-quoted scalars
fn quoted(value: &str) -> Result<String, Error> {
    Ok(serde_json::to_string(value)?)
}

fn node_labels(cr: &KvmConfig, node: &Node) -> String {
    let role_label = format!("node-role.kubernetes.io/{}=", node.role);
    let kubelet_labels = &cr.spec.cluster.kubernetes.kubelet.labels;
    if kubelet_labels.is_empty() {
        role_label
    } else {
        format!("{kubelet_labels},{role_label}")
    }
}

pub fn render(cr: &KvmConfig, node: &Node, config: &OperatorConfig) -> Result<CloudConfig, Error> {
    key::validate_rendered_values(cr)?;
    for server in config.dns_servers.iter().chain(&config.ntp_servers) {
        key::single_line(cr, "operator DNS/NTP server", server)?;
    }
    if let Some(sso_public_key) = &config.sso_public_key {
        key::single_line(cr, "operator SSO public key", sso_public_key)?;
    }

    let cluster = &cr.spec.cluster;
    let kubernetes = &cluster.kubernetes;

    let users = kubernetes
        .ssh
        .user_list
        .iter()
        .map(|user| {
            Ok(UserTemplate {
                name: quoted(&user.name)?,
                public_key: quoted(&user.public_key)?,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let template = CloudConfigTemplate {
        hostname: node.name(),
        master: node.role == Role::Master,
        users,
        has_sso_public_key: config.sso_public_key.is_some(),
        sso_public_key: config.sso_public_key.clone().unwrap_or_default(),
        dns_servers: config.dns_servers.clone(),
        ntp_servers: config.ntp_servers.join(" "),
        docker_cidr: cluster.docker.daemon.cidr.clone(),
        kubelet_port: kubernetes.kubelet.port,
        kubelet_domain: kubernetes.kubelet.domain.clone(),
        kubelet_alt_names: kubernetes.kubelet.alt_names.clone(),
        node_labels: node_labels(cr, node),
        cluster_domain: kubernetes.domain.clone(),
        dns_service_ip: key::dns_service_ip(cr)?.to_string(),
        network_setup_image: kubernetes.network_setup.docker.image.clone(),
        api_domain: kubernetes.api.domain.clone(),
        api_secure_port: kubernetes.api.secure_port,
        api_service_ip: key::api_service_ip(cr)?.to_string(),
        cluster_ip_range: kubernetes.api.cluster_ip_range.clone(),
        etcd_domain: cluster.etcd.domain.clone(),
        etcd_port: cluster.etcd.port,
        etcd_prefix: cluster.etcd.prefix.clone(),
    };

    Ok(CloudConfig {
        content: template.render()?,
    })
}
