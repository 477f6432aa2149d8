//! Current state / desired state / change set pipeline for every object kind a tenant cluster
//! is made of
//!
//! Each kind implements [`CrudResource`]: it knows how to address its objects and what they
//! should look like for a [`KvmConfig`]. The blanket [`ClusterResource`] implementation lists
//! the current objects, diffs them against the desired ones and applies the resulting
//! [`ChangeSet`].
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info, instrument};

use crate::cluster::key;
use crate::config::OperatorConfig;
use crate::crd::kvmconfig::KvmConfig;
use crate::errors::Error;
use crate::utils::strings::field_manager;

pub mod configmap;
pub mod deployment;
pub mod ingress;
pub mod namespace;
pub mod pvc;
pub mod service;
pub mod serviceaccount;

lazy_static! {
    static ref FIELD_MANAGER: String = field_manager("resources");
}

/// Objects to create, update and delete to get from the current to the desired state
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet<K> {
    pub create: Vec<K>,
    pub update: Vec<K>,
    pub delete: Vec<K>,
}

impl<K> ChangeSet<K> {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Creates and updates both become server-side applies, so a single field manager owns
    /// every field and fields dropped from the desired state are removed
    pub fn writes(self) -> Vec<Write<K>> {
        self.create
            .into_iter()
            .chain(self.update)
            .map(Write::Apply)
            .chain(self.delete.into_iter().map(Write::Delete))
            .collect()
    }
}

/// One request against the API server
#[derive(Debug, Clone, PartialEq)]
pub enum Write<K> {
    /// Server-side apply, creating the object if it is missing
    Apply(K),
    Delete(K),
}

/// Desired keys are present with the desired values. Keys added by other actors are ignored.
pub fn contains_all(
    current: &Option<BTreeMap<String, String>>,
    desired: &Option<BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    let current = current.as_ref();
    desired
        .iter()
        .all(|(key, value)| current.and_then(|current| current.get(key)) == Some(value))
}

pub fn find_by_name<'a, K: Resource>(objects: &'a [K], name: &str) -> Option<&'a K> {
    objects.iter().find(|object| object.meta().name.as_deref() == Some(name))
}

pub trait CrudResource: Send + Sync {
    type K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    fn name(&self) -> &'static str;

    fn api(&self, client: Client, cr: &KvmConfig) -> Api<Self::K>;

    fn desired_state(
        &self,
        cr: &KvmConfig,
        config: &OperatorConfig,
    ) -> Result<Vec<Self::K>, Error>;

    /// Whether an existing object differs from its desired version in a way that matters
    fn needs_update(&self, _current: &Self::K, _desired: &Self::K) -> bool {
        false
    }

    /// Desired objects which replace their current counterpart
    fn update_change(&self, current: &[Self::K], desired: &[Self::K]) -> Vec<Self::K> {
        desired
            .iter()
            .filter(|desired| {
                find_by_name(current, &desired.name_any())
                    .is_some_and(|current| self.needs_update(current, desired))
            })
            .cloned()
            .collect()
    }
}

pub fn compute_change_set<R: CrudResource + ?Sized>(
    resource: &R,
    current: &[R::K],
    desired: &[R::K],
) -> ChangeSet<R::K> {
    let create = desired
        .iter()
        .filter(|object| find_by_name(current, &object.name_any()).is_none())
        .cloned()
        .collect();
    let delete = current
        .iter()
        .filter(|object| find_by_name(desired, &object.name_any()).is_none())
        .cloned()
        .collect();
    let update = resource.update_change(current, desired);

    ChangeSet {
        create,
        update,
        delete,
    }
}

#[instrument(skip(api))]
pub(crate) async fn current_state<K>(api: &Api<K>, cr: &KvmConfig) -> Result<Vec<K>, Error>
where
    K: Resource + Clone + Debug + DeserializeOwned,
{
    let list_params = ListParams::default().labels(&key::cluster_label_selector(cr));
    Ok(api.list(&list_params).await?.items)
}

async fn delete_object<K>(api: &Api<K>, object: &K) -> Result<(), Error>
where
    K: Resource + Clone + Debug + DeserializeOwned,
{
    match api.delete(&object.name_any(), &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        // Already gone
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Object safe face of a [`CrudResource`], so all kinds can be driven from one list
#[async_trait]
pub trait ClusterResource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn ensure_created(
        &self,
        cr: &KvmConfig,
        client: Client,
        config: &OperatorConfig,
    ) -> Result<(), Error>;

    async fn ensure_deleted(&self, cr: &KvmConfig, client: Client) -> Result<(), Error>;
}

#[async_trait]
impl<R: CrudResource> ClusterResource for R {
    fn name(&self) -> &'static str {
        CrudResource::name(self)
    }

    #[instrument(skip(self, cr, client, config), fields(resource = CrudResource::name(self)))]
    async fn ensure_created(
        &self,
        cr: &KvmConfig,
        client: Client,
        config: &OperatorConfig,
    ) -> Result<(), Error> {
        let name = CrudResource::name(self);
        let api = self.api(client, cr);
        let current = current_state(&api, cr).await?;
        let desired = self.desired_state(cr, config)?;
        let changes = compute_change_set(self, &current, &desired);

        if changes.is_empty() {
            debug!("{name}: nothing to do");
            return Ok(());
        }

        info!(
            "{name}: {} to create, {} to update, {} to delete",
            changes.create.len(),
            changes.update.len(),
            changes.delete.len()
        );
        let patch_params = PatchParams::apply(&FIELD_MANAGER).force();
        for write in changes.writes() {
            match write {
                Write::Apply(object) => {
                    debug!("{name}: applying {}", object.name_any());
                    api.patch(&object.name_any(), &patch_params, &Patch::Apply(&object))
                        .await?;
                }
                Write::Delete(object) => {
                    info!("{name}: deleting {}", object.name_any());
                    delete_object(&api, &object).await?;
                }
            }
        }
        Ok(())
    }

    #[instrument(skip(self, cr, client), fields(resource = CrudResource::name(self)))]
    async fn ensure_deleted(&self, cr: &KvmConfig, client: Client) -> Result<(), Error> {
        let name = CrudResource::name(self);
        let api = self.api(client, cr);
        for object in current_state(&api, cr).await? {
            info!("{name}: deleting {}", object.name_any());
            delete_object(&api, &object).await?;
        }
        Ok(())
    }
}

/// Every managed kind, in the order they are created. Deletion runs in reverse.
pub fn all() -> Vec<Box<dyn ClusterResource>> {
    vec![
        Box::new(namespace::NamespaceResource),
        Box::new(serviceaccount::ServiceAccountResource),
        Box::new(configmap::ConfigMapResource),
        Box::new(pvc::PvcResource),
        Box::new(service::ServiceResource),
        Box::new(ingress::IngressResource),
        Box::new(deployment::DeploymentResource),
    ]
}
