use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::errors::Error;

#[derive(Parser, Debug, Default)]
#[command(
    name = "kvm-operator",
    about = "Reconciles KVMConfig objects into tenant clusters running in KVM pods",
    disable_version_flag = true
)]
pub struct Args {
    /// Print the version and exit
    #[arg(long)]
    pub version: bool,

    /// Print the KVMConfig CRD as YAML and exit
    #[arg(long)]
    pub crd: bool,

    /// YAML file with operator settings, overridden by flags
    #[arg(long, env = "KVM_OPERATOR_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "KVM_OPERATOR_LISTEN_ADDRESS")]
    pub listen_address: Option<String>,

    /// Version bundle of KVMConfig objects handled by this instance
    #[arg(long, env = "KVM_OPERATOR_VERSION_BUNDLE")]
    pub version_bundle: Option<String>,

    /// Only reconcile KVMConfig objects matching this label selector
    #[arg(long, env = "KVM_OPERATOR_LABEL_SELECTOR")]
    pub label_selector: Option<String>,

    #[arg(long, env = "KVM_OPERATOR_DNS_SERVERS", value_delimiter = ',')]
    pub dns_servers: Option<Vec<String>>,

    #[arg(long, env = "KVM_OPERATOR_NTP_SERVERS", value_delimiter = ',')]
    pub ntp_servers: Option<Vec<String>>,

    /// Public key added to every node for SSO SSH access
    #[arg(long, env = "KVM_OPERATOR_SSO_PUBLIC_KEY")]
    pub sso_public_key: Option<String>,

    #[arg(long, env = "KVM_OPERATOR_ETCD_STORAGE_CLASS")]
    pub etcd_storage_class: Option<String>,

    #[arg(long, env = "KVM_OPERATOR_ETCD_VOLUME_SIZE")]
    pub etcd_volume_size: Option<String>,

    #[arg(long, env = "KVM_OPERATOR_INGRESS_CLASS")]
    pub ingress_class: Option<String>,

    /// Seconds between periodic reconciliations of a healthy object
    #[arg(long, env = "KVM_OPERATOR_RESYNC_SECONDS")]
    pub resync_seconds: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct OperatorConfig {
    pub listen_address: String,
    pub version_bundle: String,
    pub label_selector: Option<String>,
    pub dns_servers: Vec<String>,
    pub ntp_servers: Vec<String>,
    pub sso_public_key: Option<String>,
    pub etcd_storage_class: String,
    pub etcd_volume_size: String,
    pub ingress_class: String,
    // Host directory holding VM root images
    pub host_images_path: String,
    // Host directory for hostPath backed node data
    pub host_volumes_path: String,
    pub resync_seconds: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            listen_address: String::from("0.0.0.0:8000"),
            version_bundle: String::from(env!("CARGO_PKG_VERSION")),
            label_selector: None,
            dns_servers: vec![String::from("8.8.8.8"), String::from("8.8.4.4")],
            ntp_servers: vec![],
            sso_public_key: None,
            etcd_storage_class: String::from("standard"),
            etcd_volume_size: String::from("15Gi"),
            ingress_class: String::from("nginx"),
            host_images_path: String::from("/home/core/images"),
            host_volumes_path: String::from("/home/core/volumes"),
            resync_seconds: 300,
        }
    }
}

impl OperatorConfig {
    /// Read the config file if one was given and apply flag overrides on top of it
    pub fn load(args: &Args) -> Result<OperatorConfig, Error> {
        let mut config = match &args.config {
            Some(path) => {
                debug!("Reading config from {}", path.display());
                serde_yaml::from_str(&fs::read_to_string(path)?)?
            }
            None => OperatorConfig::default(),
        };
        config.apply_overrides(args);
        Ok(config)
    }

    fn apply_overrides(&mut self, args: &Args) {
        if let Some(listen_address) = &args.listen_address {
            self.listen_address.clone_from(listen_address);
        }
        if let Some(version_bundle) = &args.version_bundle {
            self.version_bundle.clone_from(version_bundle);
        }
        if args.label_selector.is_some() {
            self.label_selector.clone_from(&args.label_selector);
        }
        if let Some(dns_servers) = &args.dns_servers {
            self.dns_servers.clone_from(dns_servers);
        }
        if let Some(ntp_servers) = &args.ntp_servers {
            self.ntp_servers.clone_from(ntp_servers);
        }
        if args.sso_public_key.is_some() {
            self.sso_public_key.clone_from(&args.sso_public_key);
        }
        if let Some(storage_class) = &args.etcd_storage_class {
            self.etcd_storage_class.clone_from(storage_class);
        }
        if let Some(volume_size) = &args.etcd_volume_size {
            self.etcd_volume_size.clone_from(volume_size);
        }
        if let Some(ingress_class) = &args.ingress_class {
            self.ingress_class.clone_from(ingress_class);
        }
        if let Some(resync_seconds) = args.resync_seconds {
            self.resync_seconds = resync_seconds;
        }
    }
}
