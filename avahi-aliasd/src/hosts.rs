//! Hostname extraction from routing resources.

use std::sync::LazyLock;

use regex::Regex;
use shared::types::{IngressRouteSpec, IngressSpec, ResourceDocument};

use crate::error::AliasError;

/// Matches one ``Host(...)`` matcher inside a Traefik rule, capturing its
/// argument list.
static HOST_MATCHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bHost\(((?:\s*`[^`]+`\s*,?)+)\)").expect("host matcher pattern is valid")
});

/// One backtick-quoted literal in a matcher argument list.
static HOST_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`([^`]+)`").expect("host literal pattern is valid")
});

/// The routing resource kinds with a known hostname rule.
#[derive(Debug, Clone)]
pub enum RoutingResource {
    /// Hostnames come from `spec.rules[].host`
    Ingress(IngressSpec),
    /// Hostnames come from ``Host(`...`)`` matchers in `spec.routes[].match`
    IngressRoute(IngressRouteSpec),
}

impl RoutingResource {
    /// Decode a document according to its kind tag.
    pub fn from_document(doc: &ResourceDocument) -> Result<Self, AliasError> {
        let malformed = |source| AliasError::MalformedResource {
            kind: doc.kind.clone(),
            name: format!("{}/{}", doc.metadata.namespace, doc.metadata.name),
            source,
        };

        // A missing spec decodes like an empty one
        let spec = match &doc.spec {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            spec => spec.clone(),
        };

        match doc.kind.as_str() {
            "Ingress" => serde_json::from_value(spec)
                .map(RoutingResource::Ingress)
                .map_err(malformed),
            "IngressRoute" => serde_json::from_value(spec)
                .map(RoutingResource::IngressRoute)
                .map_err(malformed),
            other => Err(AliasError::UnsupportedKind(other.to_string())),
        }
    }

    /// Hostnames in declaration order, unfiltered.
    pub fn hostnames(&self) -> Vec<String> {
        match self {
            RoutingResource::Ingress(spec) => spec
                .rules
                .iter()
                .filter_map(|rule| rule.host.clone())
                .collect(),
            RoutingResource::IngressRoute(spec) => spec
                .routes
                .iter()
                .flat_map(|route| host_matchers(&route.match_expr))
                .collect(),
        }
    }
}

fn host_matchers(expr: &str) -> Vec<String> {
    HOST_MATCHER
        .captures_iter(expr)
        .flat_map(|caps| {
            HOST_LITERAL
                .captures_iter(caps.get(1).map_or("", |args| args.as_str()))
                .map(|literal| literal[1].to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Extracts publishable hostnames from resource documents.
#[derive(Debug, Clone)]
pub struct HostExtractor {
    suffix: String,
}

impl HostExtractor {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self { suffix: suffix.into() }
    }

    /// A hostname is publishable only if it ends with the configured suffix.
    /// The comparison is case-sensitive and a trailing dot is not stripped.
    pub fn is_publishable(&self, hostname: &str) -> bool {
        hostname.ends_with(&self.suffix)
    }

    /// Publishable hostnames declared by `doc`, first occurrence order,
    /// without duplicates.
    pub fn extract(&self, doc: &ResourceDocument) -> Result<Vec<String>, AliasError> {
        let resource = RoutingResource::from_document(doc)?;

        let mut hostnames: Vec<String> = Vec::new();
        for hostname in resource.hostnames() {
            if !self.is_publishable(&hostname) {
                tracing::debug!("Ignoring {} - not under {}", hostname, self.suffix);
                continue;
            }
            if !hostnames.contains(&hostname) {
                hostnames.push(hostname);
            }
        }
        Ok(hostnames)
    }
}
