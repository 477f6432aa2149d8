use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Api, Client};
use std::collections::BTreeMap;

use crate::cloudconfig::{self, USER_DATA_KEY};
use crate::cluster::key;
use crate::cluster::resources::{contains_all, CrudResource};
use crate::config::OperatorConfig;
use crate::crd::kvmconfig::KvmConfig;
use crate::errors::Error;

/// Cloud-config user data, one config map per node
pub struct ConfigMapResource;

impl CrudResource for ConfigMapResource {
    type K = ConfigMap;

    fn name(&self) -> &'static str {
        "configmap"
    }

    fn api(&self, client: Client, cr: &KvmConfig) -> Api<ConfigMap> {
        Api::namespaced(client, &key::cluster_namespace(cr))
    }

    fn desired_state(
        &self,
        cr: &KvmConfig,
        config: &OperatorConfig,
    ) -> Result<Vec<ConfigMap>, Error> {
        key::nodes(cr)?
            .iter()
            .map(|node| {
                let cloud_config = cloudconfig::render(cr, node, config)?;
                Ok(ConfigMap {
                    metadata: ObjectMeta {
                        name: Some(node.name()),
                        namespace: Some(key::cluster_namespace(cr)),
                        labels: Some(key::node_labels(cr, node)),
                        ..ObjectMeta::default()
                    },
                    data: Some(BTreeMap::from([(
                        USER_DATA_KEY.to_string(),
                        cloud_config.content,
                    )])),
                    ..ConfigMap::default()
                })
            })
            .collect()
    }

    fn needs_update(&self, current: &ConfigMap, desired: &ConfigMap) -> bool {
        current.data != desired.data
            || !contains_all(&current.metadata.labels, &desired.metadata.labels)
    }
}
