use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Api, Client};

use crate::cluster::key;
use crate::cluster::resources::CrudResource;
use crate::config::OperatorConfig;
use crate::crd::kvmconfig::KvmConfig;
use crate::errors::Error;

/// Identity the VM pods run as
pub struct ServiceAccountResource;

impl CrudResource for ServiceAccountResource {
    type K = ServiceAccount;

    fn name(&self) -> &'static str {
        "serviceaccount"
    }

    fn api(&self, client: Client, cr: &KvmConfig) -> Api<ServiceAccount> {
        Api::namespaced(client, &key::cluster_namespace(cr))
    }

    fn desired_state(
        &self,
        cr: &KvmConfig,
        _config: &OperatorConfig,
    ) -> Result<Vec<ServiceAccount>, Error> {
        Ok(vec![ServiceAccount {
            metadata: ObjectMeta {
                name: Some(key::service_account_name(cr)),
                namespace: Some(key::cluster_namespace(cr)),
                labels: Some(key::cluster_labels(cr)),
                ..ObjectMeta::default()
            },
            ..ServiceAccount::default()
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fixtures::{kvm_config, operator_config};
    use pretty_assertions::assert_eq;

    #[test]
    fn service_account_lives_in_cluster_namespace() {
        let accounts = ServiceAccountResource
            .desired_state(&kvm_config(), &operator_config())
            .unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].metadata.name.as_deref(), Some("al9qy"));
        assert_eq!(accounts[0].metadata.namespace.as_deref(), Some("al9qy"));
    }

    #[test]
    fn service_accounts_are_never_updated() {
        let cr = kvm_config();
        let current = ServiceAccountResource
            .desired_state(&cr, &operator_config())
            .unwrap();
        let mut desired = current.clone();
        desired[0].automount_service_account_token = Some(false);
        assert!(ServiceAccountResource.update_change(&current, &desired).is_empty());
    }
}
