#[macro_use]
mod utils;
mod cloudconfig;
mod cluster;
mod config;
mod crd;
mod errors;
mod labels_and_annotations;
mod logging;
mod server;

use clap::Parser;
use kube::Client;
use tracing::info;

use crate::config::{Args, OperatorConfig};
use crate::errors::Error;
use crate::utils::strings::get_version_string;

const OPERATOR_NAME: &str = "kvm-operator";
const GROUP_NAME: &str = "provider.giantswarm.io";

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    if args.version {
        println!("{} {}", env!("CARGO_PKG_VERSION"), get_version_string());
        return Ok(());
    }
    if args.crd {
        print!("{}", crd::kvmconfig::crd_yaml()?);
        return Ok(());
    }

    let config = OperatorConfig::load(&args)?;
    // Keep the provider alive for the lifetime of the process
    let _tracer_provider = logging::setup_tracing()?;
    info!(
        "Starting {} {} ({})",
        OPERATOR_NAME,
        env!("CARGO_PKG_VERSION"),
        get_version_string()
    );

    let client = Client::try_default().await?;
    crd::kvmconfig::create(client.clone()).await?;

    let server_task = tokio::spawn({
        let listen_address = config.listen_address.clone();
        let version_bundle = config.version_bundle.clone();
        async move { server::run(&listen_address, &version_bundle).await }
    });
    let controller_task = tokio::spawn(cluster::run(client, config));

    tokio::try_join!(
        async {
            server_task
                .await
                .map_err(|e| Error::UnexpectedExit(e.to_string()))?
        },
        async {
            controller_task
                .await
                .map_err(|e| Error::UnexpectedExit(e.to_string()))?
        },
    )?;

    Err(Error::UnexpectedExit(String::from(
        "kvm-operator tasks should not exit",
    )))
}
