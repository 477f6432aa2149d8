#[derive(thiserror::Error, Debug)]
pub enum Error {
    // Kubernetes
    #[error("Kubernetes error {0}")]
    Kube(#[from] kube::Error),
    #[error("{0}")]
    NoStatusSubresource(String),

    // KVMConfig contents
    #[error("Invalid KVMConfig {0}: {1}")]
    InvalidSpec(String, String),
    #[error("No node index allocated for node {1} of cluster {0}")]
    MissingNodeIndex(String, String),

    // Misc libs
    #[error("JSON error {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Error parsing value: {0}")]
    ParseHumanize(#[from] humanize_rs::ParseError),
    #[error("Error rendering template: {0}")]
    Template(#[from] askama::Error),
    #[error("Error parsing CIDR: {0}")]
    ParseNetwork(#[from] ipnet::AddrParseError),
    #[error("Error parsing listen address: {0}")]
    ParseAddress(#[from] std::net::AddrParseError),
    #[error("I/O error {0}")]
    Io(#[from] std::io::Error),

    // Tracing
    #[error("Failed to install tracing subscriber: {0}")]
    TracingSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
    #[error("Failed to set up trace exporter: {0}")]
    TraceExporter(#[from] opentelemetry::trace::TraceError),

    // Custom/generic
    #[error("Timed out waiting for operation: {0}")]
    Timeout(String),
    #[error("Task ended unexpectedly: {0}")]
    UnexpectedExit(String),
}

impl Error {
    pub fn invalid_spec(cluster: &str, reason: impl Into<String>) -> Error {
        Error::InvalidSpec(cluster.to_string(), reason.into())
    }
}
