//! Operational HTTP endpoints: liveness and build information
use serde::Serialize;
use std::net::SocketAddr;
use tracing::info;
use warp::Filter;

use crate::errors::Error;
use crate::utils::strings::get_version_string;
use crate::OPERATOR_NAME;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub name: String,
    pub version: String,
    pub git_revision: String,
    pub version_bundle: String,
}

impl VersionInfo {
    pub fn new(version_bundle: &str) -> VersionInfo {
        VersionInfo {
            name: OPERATOR_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_revision: get_version_string(),
            version_bundle: version_bundle.to_string(),
        }
    }
}

pub fn routes(
    version_info: VersionInfo,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let healthz = warp::path("healthz")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| "ok");

    let version = warp::path("version")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || warp::reply::json(&version_info));

    healthz.or(version)
}

pub async fn run(listen_address: &str, version_bundle: &str) -> Result<(), Error> {
    let address: SocketAddr = listen_address.parse()?;
    info!("HTTP endpoints listening on {}", address);

    let api = routes(VersionInfo::new(version_bundle)).with(warp::trace::request());
    warp::serve(api).run(address).await;

    Err(Error::UnexpectedExit(String::from("HTTP server (warp) died")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    #[tokio::test]
    async fn healthz_says_ok() {
        let response = warp::test::request()
            .method("GET")
            .path("/healthz")
            .reply(&routes(VersionInfo::new("1.0.0")))
            .await;

        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), "ok");
    }

    #[tokio::test]
    async fn version_reports_served_bundle() {
        let response = warp::test::request()
            .method("GET")
            .path("/version")
            .reply(&routes(VersionInfo::new("1.2.3")))
            .await;

        assert_eq!(response.status(), 200);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["name"], "kvm-operator");
        assert_eq!(body["versionBundle"], "1.2.3");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["gitRevision"].is_string());
    }

    #[tokio::test]
    async fn unknown_paths_are_rejected() {
        let response = warp::test::request()
            .method("GET")
            .path("/metrics")
            .reply(&routes(VersionInfo::new("1.0.0")))
            .await;

        assert_eq!(response.status(), 404);
    }
}
