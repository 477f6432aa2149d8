//! Everything that turns a `KVMConfig` into a running tenant cluster
use kube::Client;

use crate::config::OperatorConfig;
use crate::errors::Error;

mod controller;
pub mod key;
pub mod resources;
pub mod status;

#[cfg(test)]
pub mod fixtures;

pub async fn run(client: Client, config: OperatorConfig) -> Result<(), Error> {
    controller::create(client, config).await
}
