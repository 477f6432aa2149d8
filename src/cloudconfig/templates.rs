use askama::Template;

#[derive(Template)]
#[template(path = "cloud-config.yaml", escape = "none")]
pub struct CloudConfigTemplate {
    pub hostname: String,
    pub master: bool,

    // YAML quoted
    pub users: Vec<UserTemplate>,
    pub has_sso_public_key: bool,
    pub sso_public_key: String,

    pub dns_servers: Vec<String>,
    pub ntp_servers: String,
    pub docker_cidr: String,

    pub kubelet_port: i32,
    pub kubelet_domain: String,
    pub kubelet_alt_names: String,
    pub node_labels: String,
    pub cluster_domain: String,
    pub dns_service_ip: String,
    pub network_setup_image: String,

    pub api_domain: String,
    pub api_secure_port: i32,
    pub api_service_ip: String,
    pub cluster_ip_range: String,

    pub etcd_domain: String,
    pub etcd_port: i32,
    pub etcd_prefix: String,
}

pub struct UserTemplate {
    pub name: String,
    pub public_key: String,
}
