use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Api, Client};
use std::collections::BTreeMap;

use crate::cluster::key::{self, Role};
use crate::cluster::resources::CrudResource;
use crate::config::OperatorConfig;
use crate::crd::kvmconfig::{KvmConfig, StorageType};
use crate::errors::Error;

/// Etcd data volumes of masters backed by persistent storage. Claims are immutable, so they
/// are only ever created and deleted.
pub struct PvcResource;

impl CrudResource for PvcResource {
    type K = PersistentVolumeClaim;

    fn name(&self) -> &'static str {
        "pvc"
    }

    fn api(&self, client: Client, cr: &KvmConfig) -> Api<PersistentVolumeClaim> {
        Api::namespaced(client, &key::cluster_namespace(cr))
    }

    fn desired_state(
        &self,
        cr: &KvmConfig,
        config: &OperatorConfig,
    ) -> Result<Vec<PersistentVolumeClaim>, Error> {
        if cr.spec.kvm.k8s_kvm.storage_type != StorageType::PersistentVolume {
            return Ok(vec![]);
        }

        Ok(key::nodes(cr)?
            .iter()
            .filter(|node| node.role == Role::Master)
            .map(|node| PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(key::etcd_pvc_name(node.id)),
                    namespace: Some(key::cluster_namespace(cr)),
                    labels: Some(key::node_labels(cr, node)),
                    ..ObjectMeta::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec![String::from("ReadWriteOnce")]),
                    storage_class_name: Some(config.etcd_storage_class.clone()),
                    resources: Some(ResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            String::from("storage"),
                            Quantity(config.etcd_volume_size.clone()),
                        )])),
                        ..ResourceRequirements::default()
                    }),
                    ..PersistentVolumeClaimSpec::default()
                }),
                ..PersistentVolumeClaim::default()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fixtures::{kvm_config, operator_config};
    use kube::ResourceExt;
    use pretty_assertions::assert_eq;

    #[test]
    fn host_path_storage_needs_no_claims() {
        let claims = PvcResource
            .desired_state(&kvm_config(), &operator_config())
            .unwrap();
        assert!(claims.is_empty());
    }

    #[test]
    fn persistent_storage_claims_one_volume_per_master() {
        let mut cr = kvm_config();
        cr.spec.kvm.k8s_kvm.storage_type = StorageType::PersistentVolume;
        let config = OperatorConfig {
            etcd_storage_class: String::from("g1"),
            ..operator_config()
        };

        let claims = PvcResource.desired_state(&cr, &config).unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].name_any(), "pvc-master-etcd-m1");

        let spec = claims[0].spec.as_ref().unwrap();
        assert_eq!(spec.storage_class_name.as_deref(), Some("g1"));
        assert_eq!(
            spec.resources
                .as_ref()
                .and_then(|r| r.requests.as_ref())
                .and_then(|r| r.get("storage")),
            Some(&Quantity(String::from("15Gi")))
        );
    }

    #[test]
    fn claims_are_never_updated() {
        let mut cr = kvm_config();
        cr.spec.kvm.k8s_kvm.storage_type = StorageType::PersistentVolume;
        let current = PvcResource.desired_state(&cr, &operator_config()).unwrap();
        let config = OperatorConfig {
            etcd_volume_size: String::from("30Gi"),
            ..operator_config()
        };
        let desired = PvcResource.desired_state(&cr, &config).unwrap();
        assert!(PvcResource.update_change(&current, &desired).is_empty());
    }
}
