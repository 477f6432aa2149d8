//! Bookkeeping in the `KVMConfig` status: node indexes, conditions and the version history
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::chrono::{SecondsFormat, Utc};
use kube::{Client, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, instrument};

use crate::cluster::key;
use crate::cluster::resources::deployment::{self, DeploymentResource};
use crate::cluster::resources::{current_state, CrudResource};
use crate::crd::kvmconfig::{
    set_kvm_config_status, KvmConfig, KvmConfigStatus, StatusCondition, StatusVersion,
};
use crate::errors::Error;
use crate::labels_and_annotations::VERSION_BUNDLE_ANNOTATION;

pub const CONDITION_CREATING: &str = "Creating";
pub const CONDITION_CREATED: &str = "Created";
pub const CONDITION_UPDATING: &str = "Updating";
pub const CONDITION_UPDATED: &str = "Updated";
pub const CONDITION_DELETING: &str = "Deleting";

const CONDITION_TRUE: &str = "True";
const MAX_VERSIONS: usize = 5;

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Keep indexes of nodes still present, drop the rest and give new nodes the lowest free
/// index starting at 1. Indexes end up in tap device names, so they must stay stable.
pub fn allocate_node_indexes(
    existing: &BTreeMap<String, u32>,
    node_ids: &[&str],
) -> BTreeMap<String, u32> {
    let mut indexes: BTreeMap<String, u32> = existing
        .iter()
        .filter(|(id, _)| node_ids.contains(&id.as_str()))
        .map(|(id, index)| (id.clone(), *index))
        .collect();
    let mut taken: BTreeSet<u32> = indexes.values().copied().collect();

    for id in node_ids {
        if indexes.contains_key(*id) {
            continue;
        }
        let free = (1..).find(|index| !taken.contains(index)).unwrap_or(1);
        taken.insert(free);
        indexes.insert(id.to_string(), free);
    }
    indexes
}

/// Most recent condition; conditions are kept one per type, latest last
pub fn latest_condition(status: &KvmConfigStatus) -> Option<&str> {
    status
        .cluster
        .conditions
        .last()
        .map(|condition| condition.type_.as_str())
}

fn set_condition(status: &mut KvmConfigStatus, type_: &str, time: &str) {
    let conditions = &mut status.cluster.conditions;
    conditions.retain(|condition| condition.type_ != type_);
    conditions.push(StatusCondition {
        type_: type_.to_string(),
        status: CONDITION_TRUE.to_string(),
        last_transition_time: time.to_string(),
    });
}

fn record_version(status: &mut KvmConfigStatus, version: &str, time: &str) {
    let versions = &mut status.cluster.versions;
    versions.push(StatusVersion {
        version: version.to_string(),
        date: time.to_string(),
    });
    if versions.len() > MAX_VERSIONS {
        let excess = versions.len() - MAX_VERSIONS;
        versions.drain(..excess);
    }
}

fn last_version(status: &KvmConfigStatus) -> Option<&str> {
    status
        .cluster
        .versions
        .last()
        .map(|version| version.version.as_str())
}

/// Status after one reconciliation. `ready` tells whether every node runs the desired
/// version bundle and is ready.
pub fn next_status(
    status: &KvmConfigStatus,
    version: &str,
    ready: bool,
    time: &str,
) -> KvmConfigStatus {
    let mut next = status.clone();

    match latest_condition(status) {
        None => set_condition(&mut next, CONDITION_CREATING, time),
        Some(CONDITION_CREATING) if ready => {
            set_condition(&mut next, CONDITION_CREATED, time);
            record_version(&mut next, version, time);
        }
        Some(CONDITION_CREATED | CONDITION_UPDATED) if last_version(status) != Some(version) => {
            set_condition(&mut next, CONDITION_UPDATING, time);
        }
        Some(CONDITION_UPDATING) if ready => {
            set_condition(&mut next, CONDITION_UPDATED, time);
            record_version(&mut next, version, time);
        }
        _ => {}
    }
    next
}

/// Every node has a ready deployment carrying the version bundle of the `KVMConfig`
pub fn cluster_ready(cr: &KvmConfig, deployments: &[Deployment]) -> Result<bool, Error> {
    let node_count = key::nodes(cr)?.len();
    let version = key::version_bundle_version(cr);
    let current_version = |deployment: &Deployment| {
        deployment
            .annotations()
            .get(VERSION_BUNDLE_ANNOTATION)
            .is_some_and(|annotation| annotation == version)
    };

    Ok(deployments.len() == node_count
        && deployment::all_ready(deployments)
        && deployments.iter().all(current_version))
}

/// Allocate node indexes and persist them when they changed
#[instrument(skip(cr, client), fields(cluster = key::cluster_id(&cr)))]
pub async fn ensure_node_indexes(cr: KvmConfig, client: Client) -> Result<KvmConfig, Error> {
    let status = cr.status.clone().unwrap_or_default();
    let node_ids: Vec<&str> = key::nodes(&cr)?.iter().map(|node| node.id).collect();
    let indexes = allocate_node_indexes(&status.kvm.node_indexes, &node_ids);

    if indexes == status.kvm.node_indexes {
        return Ok(cr);
    }

    info!("node indexes changed: {:?}", indexes);
    let mut status = status;
    status.kvm.node_indexes = indexes;
    set_kvm_config_status(&cr, status, client).await
}

/// Move the conditions forward based on the current deployments
#[instrument(skip(cr, client), fields(cluster = key::cluster_id(cr)))]
pub async fn update_conditions(cr: &KvmConfig, client: Client) -> Result<KvmConfig, Error> {
    let api = DeploymentResource.api(client.clone(), cr);
    let deployments = current_state(&api, cr).await?;
    let ready = cluster_ready(cr, &deployments)?;

    let status = cr.status.clone().unwrap_or_default();
    let next = next_status(&status, key::version_bundle_version(cr), ready, &now());
    if next == status {
        return Ok(cr.clone());
    }

    if let Some(condition) = latest_condition(&next) {
        info!("cluster {} is {}", key::cluster_id(cr), condition);
    }
    set_kvm_config_status(cr, next, client).await
}

#[instrument(skip(cr, client), fields(cluster = key::cluster_id(cr)))]
pub async fn mark_deleting(cr: &KvmConfig, client: Client) -> Result<KvmConfig, Error> {
    let mut status = cr.status.clone().unwrap_or_default();
    if latest_condition(&status) == Some(CONDITION_DELETING) {
        return Ok(cr.clone());
    }

    set_condition(&mut status, CONDITION_DELETING, &now());
    set_kvm_config_status(cr, status, client).await
}
