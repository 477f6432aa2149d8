use crate::errors::Error;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::WatchParams;
use kube::core::WatchEvent;
use kube::Api;
use tracing::{debug, info, instrument};

pub mod resource_controller;
pub mod strings;
#[macro_use]
pub mod shortcuts;
pub mod traits;

#[instrument]
pub async fn wait_crd_ready(crds: &Api<CustomResourceDefinition>, name: &str) -> Result<(), Error> {
    if let Some(crd) = crds.get_opt(name).await? {
        if names_accepted(&crd) {
            info!("CRD ok: {}", &name);
            return Ok(());
        }
    }

    let watch_params = WatchParams::default()
        .fields(&format!("metadata.name={name}"))
        .timeout(5);
    let mut stream = crds.watch(&watch_params, "0").await?.boxed();

    while let Some(status) = stream.try_next().await? {
        if let WatchEvent::Modified(crd) | WatchEvent::Added(crd) = status {
            debug!("Watch event for {}", name);
            if names_accepted(&crd) {
                info!("CRD accepted: {}", name);
                return Ok(());
            }
        }
    }
    Err(Error::Timeout(format!("Apply CRD {name}")))
}

fn names_accepted(crd: &CustomResourceDefinition) -> bool {
    crd.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "NamesAccepted"))
        .is_some_and(|condition| condition.status == "True")
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
        CustomResourceDefinitionCondition, CustomResourceDefinitionStatus,
    };

    fn crd_with_condition(type_: &str, status: &str) -> CustomResourceDefinition {
        CustomResourceDefinition {
            status: Some(CustomResourceDefinitionStatus {
                conditions: Some(vec![CustomResourceDefinitionCondition {
                    type_: type_.to_string(),
                    status: status.to_string(),
                    ..CustomResourceDefinitionCondition::default()
                }]),
                ..CustomResourceDefinitionStatus::default()
            }),
            ..CustomResourceDefinition::default()
        }
    }

    #[test]
    fn names_accepted_requires_true_condition() {
        assert!(names_accepted(&crd_with_condition("NamesAccepted", "True")));
        assert!(!names_accepted(&crd_with_condition("NamesAccepted", "False")));
        assert!(!names_accepted(&crd_with_condition("Established", "True")));
        assert!(!names_accepted(&CustomResourceDefinition::default()));
    }
}
