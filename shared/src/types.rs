use std::collections::BTreeSet;
use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Identity and diagnostic fields of a routing resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub uid: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

/// A routing resource as delivered by the watch stream.
///
/// `spec` is kept untyped here; the host extractor decodes it according to
/// `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: serde_json::Value,
}

/// `networking.k8s.io/v1` Ingress spec, reduced to what alias publishing reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngressSpec {
    #[serde(default)]
    pub rules: Vec<IngressRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(default)]
    pub host: Option<String>,
}

/// Traefik IngressRoute spec. Each route carries a rule expression such as
/// ``Host(`app.local`) && PathPrefix(`/api`)``.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngressRouteSpec {
    #[serde(default)]
    pub routes: Vec<IngressRouteRoute>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngressRouteRoute {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(rename = "match", default)]
    pub match_expr: String,
}

/// Notification phase as reported by the orchestration API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchPhase {
    Added,
    Modified,
    Deleted,
    /// Any phase the reconciler has no rule for (kept for diagnostics)
    Other(String),
}

impl From<&str> for WatchPhase {
    fn from(phase: &str) -> Self {
        match phase {
            "ADDED" => WatchPhase::Added,
            "MODIFIED" => WatchPhase::Modified,
            "DELETED" => WatchPhase::Deleted,
            other => WatchPhase::Other(other.to_string()),
        }
    }
}

impl fmt::Display for WatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchPhase::Added => f.write_str("ADDED"),
            WatchPhase::Modified => f.write_str("MODIFIED"),
            WatchPhase::Deleted => f.write_str("DELETED"),
            WatchPhase::Other(phase) => f.write_str(phase),
        }
    }
}

/// One notification about a routing resource.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub phase: WatchPhase,
    pub resource: ResourceDocument,
}

/// A published alias as exposed by the status API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    /// Alias owner name, e.g. "grafana.local"
    pub hostname: String,

    /// CNAME target, e.g. "node1.local"
    pub target: String,

    /// When the record group was committed
    pub published_at: DateTime<Utc>,
}

/// A tracked routing resource as exposed by the status API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub kind: String,
    pub uid: String,
    pub namespace: String,
    pub name: String,
    pub hostnames: BTreeSet<String>,
}
