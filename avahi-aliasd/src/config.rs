use std::path::Path;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::LOCAL_SUFFIX;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub alias: AliasConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AliasConfig {
    /// CNAME target; defaults to `<system hostname>.local`
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Watch every namespace instead of `namespace`
    #[serde(default)]
    pub all_namespaces: bool,
    #[serde(default = "default_resources")]
    pub resources: Vec<WatchedResource>,
}

/// A resource kind to watch, addressed by group/version/plural.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatchedResource {
    pub kind: String,
    pub group: String,
    pub version: String,
    pub plural: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_suffix() -> String {
    LOCAL_SUFFIX.to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_resources() -> Vec<WatchedResource> {
    vec![
        WatchedResource {
            kind: "Ingress".to_string(),
            group: "networking.k8s.io".to_string(),
            version: "v1".to_string(),
            plural: "ingresses".to_string(),
        },
        WatchedResource {
            kind: "IngressRoute".to_string(),
            group: "traefik.containo.us".to_string(),
            version: "v1alpha1".to_string(),
            plural: "ingressroutes".to_string(),
        },
    ]
}

fn default_api_enabled() -> bool {
    true
}

fn default_listen() -> String {
    "[::]:8054".to_string()
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            target: None,
            suffix: default_suffix(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            all_namespaces: false,
            resources: default_resources(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

impl AliasConfig {
    /// The configured target, or this machine's mDNS name.
    pub fn resolve_target(&self) -> Result<String> {
        if let Some(target) = &self.target {
            return Ok(target.clone());
        }

        let hostname = hostname::get()
            .context("Failed to get system hostname")?
            .to_string_lossy()
            .to_string();
        Ok(format!("{}{}", hostname, self.suffix))
    }
}
