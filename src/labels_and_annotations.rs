// Labels on every managed object
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const CLUSTER_LABEL: &str = "giantswarm.io/cluster";
pub const ORGANIZATION_LABEL: &str = "giantswarm.io/organization";

// Labels on node workloads
pub const APP_LABEL: &str = "app";
pub const CLUSTER_SHORT_LABEL: &str = "cluster";
pub const CUSTOMER_LABEL: &str = "customer";
pub const NODE_LABEL: &str = "node";

// Pod template annotations
pub const CLOUD_CONFIG_HASH_ANNOTATION: &str = "kvm-operator.giantswarm.io/cloud-config-hash";
pub const VERSION_BUNDLE_ANNOTATION: &str = "kvm-operator.giantswarm.io/version-bundle";

// Service and ingress annotations
pub const PROMETHEUS_SCRAPE_ANNOTATION: &str = "prometheus.io/scrape";
pub const SSL_PASSTHROUGH_ANNOTATION: &str = "nginx.ingress.kubernetes.io/ssl-passthrough";
