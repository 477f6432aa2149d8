use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Api, Client};

use crate::cluster::key;
use crate::cluster::resources::CrudResource;
use crate::config::OperatorConfig;
use crate::crd::kvmconfig::KvmConfig;
use crate::errors::Error;

/// The namespace all other tenant cluster objects live in
pub struct NamespaceResource;

impl CrudResource for NamespaceResource {
    type K = Namespace;

    fn name(&self) -> &'static str {
        "namespace"
    }

    fn api(&self, client: Client, _cr: &KvmConfig) -> Api<Namespace> {
        Api::all(client)
    }

    fn desired_state(
        &self,
        cr: &KvmConfig,
        _config: &OperatorConfig,
    ) -> Result<Vec<Namespace>, Error> {
        Ok(vec![Namespace {
            metadata: ObjectMeta {
                name: Some(key::cluster_namespace(cr)),
                labels: Some(key::cluster_labels(cr)),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        }])
    }
}
