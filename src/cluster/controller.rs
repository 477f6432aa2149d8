use kube::runtime::controller::Action;
use kube::Client;
use lazy_static::lazy_static;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, instrument};

use crate::cluster::{key, resources, status};
use crate::config::OperatorConfig;
use crate::crd::kvmconfig::KvmConfig;
use crate::errors::Error;
use crate::utils::resource_controller::ResourceControllerBuilder;
use crate::utils::strings::field_manager;
use crate::utils::traits::kube::{qualified_finalizer, ExtendResource};
use crate::OPERATOR_NAME;

lazy_static! {
    static ref FIELD_MANAGER: String = field_manager("kvmconfig");
    static ref FINALIZER: String = qualified_finalizer(OPERATOR_NAME);
}

pub struct State {
    pub client: Client,
    pub config: OperatorConfig,
}

/// Objects of other version bundles belong to other operator instances
fn is_responsible(cr: &KvmConfig, config: &OperatorConfig) -> bool {
    key::version_bundle_version(cr) == config.version_bundle
}

#[instrument(skip(cr, state), fields(cluster = key::cluster_id(&cr)))]
async fn update_fn(cr: Arc<KvmConfig>, state: Arc<State>) -> Result<Action, Error> {
    let client = state.client.clone();
    let config = &state.config;

    if !is_responsible(&cr, config) {
        debug!(
            "skipping version bundle {}, serving {}",
            key::version_bundle_version(&cr),
            config.version_bundle
        );
        return ok_no_requeue!();
    }
    key::validate(&cr)?;

    let mut cr = (*cr).clone();
    cr.ensure_finalizer(OPERATOR_NAME, client.clone(), &FIELD_MANAGER)
        .await?;
    let cr = status::ensure_node_indexes(cr, client.clone()).await?;

    for resource in resources::all() {
        resource.ensure_created(&cr, client.clone(), config).await?;
    }

    status::update_conditions(&cr, client).await?;
    ok_and_requeue!(config.resync_seconds)
}

#[instrument(skip(cr, state), fields(cluster = key::cluster_id(&cr)))]
async fn remove_fn(cr: Arc<KvmConfig>, state: Arc<State>) -> Result<Action, Error> {
    let client = state.client.clone();

    if !cr.has_finalizer(&FINALIZER) {
        return ok_no_requeue!();
    }
    // Finalizers of other version bundles are released by their own operator
    if !is_responsible(&cr, &state.config) {
        return ok_no_requeue!();
    }

    let mut cr = status::mark_deleting(&cr, client.clone()).await?;
    for resource in resources::all().iter().rev() {
        resource.ensure_deleted(&cr, client.clone()).await?;
    }

    cr.remove_finalizer(OPERATOR_NAME, client, &FIELD_MANAGER)
        .await?;
    info!("tenant cluster {} deleted", key::cluster_id(&cr));
    ok_no_requeue!()
}

pub async fn create(client: Client, config: OperatorConfig) -> Result<(), Error> {
    let label_selector = config.label_selector.clone();
    info!("watching KVMConfig objects of version bundle {}", config.version_bundle);

    ResourceControllerBuilder::new(client.clone())
        .with_label_selector(label_selector.as_deref())
        .with_state(State { client, config })
        .with_default_error_policy()
        .with_functions(update_fn, remove_fn)
        .run()
        .await;

    Err(Error::UnexpectedExit(String::from(
        "KVMConfig controller stopped",
    )))
}
