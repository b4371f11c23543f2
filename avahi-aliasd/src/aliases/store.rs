//! Process-local alias state.
//!
//! `resources` records which hostnames each routing resource owns as of its
//! last reconciliation. `aliases` holds at most one committed record group per
//! hostname and is derived from `resources`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use shared::types::{AliasEntry, ResourceEntry};

use crate::aliases::hash;
use crate::avahi::publisher::{AliasPublisher, GroupState, RecordGroup, Responder};
use crate::error::AliasError;
use crate::hosts::HostExtractor;

/// Identity of a routing resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: String,
    pub uid: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.uid)
    }
}

#[derive(Debug, Clone)]
pub struct TrackedResource {
    pub namespace: String,
    pub name: String,
    pub hostnames: BTreeSet<String>,
}

/// Read-only view of the store published to the status API.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub aliases: Vec<AliasEntry>,
    pub resources: Vec<ResourceEntry>,
    pub hash: String,
}

pub struct AliasStore<G> {
    target: String,
    filter: HostExtractor,
    resources: HashMap<ResourceKey, TrackedResource>,
    aliases: BTreeMap<String, RecordGroup<G>>,
}

impl<G> AliasStore<G> {
    /// `target` is the FQDN every alias points at.
    pub fn new(target: impl Into<String>, filter: HostExtractor) -> Self {
        Self {
            target: target.into(),
            filter,
            resources: HashMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    pub fn resource(&self, key: &ResourceKey) -> Option<&TrackedResource> {
        self.resources.get(key)
    }

    /// Start tracking `key` with no hostnames, or return the existing entry.
    pub fn track(&mut self, key: ResourceKey, namespace: &str, name: &str) -> &mut TrackedResource {
        self.resources.entry(key).or_insert_with(|| TrackedResource {
            namespace: namespace.to_string(),
            name: name.to_string(),
            hostnames: BTreeSet::new(),
        })
    }

    pub fn untrack(&mut self, key: &ResourceKey) -> Option<TrackedResource> {
        self.resources.remove(key)
    }

    /// Keys of every tracked resource of `kind`.
    pub fn tracked_keys(&self, kind: &str) -> Vec<ResourceKey> {
        self.resources
            .keys()
            .filter(|key| key.kind == kind)
            .cloned()
            .collect()
    }

    pub fn has_alias(&self, hostname: &str) -> bool {
        self.aliases.contains_key(hostname)
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Publish `hostname` unless an alias for it already exists.
    ///
    /// Returns `Ok(true)` when an alias for `hostname` is live afterwards,
    /// either newly committed or reused, and `Ok(false)` when the hostname is
    /// not publishable.
    pub async fn add_alias_if_absent<R>(
        &mut self,
        publisher: &AliasPublisher<R>,
        hostname: &str,
        owner: &ResourceKey,
    ) -> Result<bool, AliasError>
    where
        R: Responder<Group = G>,
    {
        if !self.filter.is_publishable(hostname) {
            return Ok(false);
        }
        if let Some(group) = self.aliases.get_mut(hostname) {
            if group.state() == GroupState::Committed {
                tracing::debug!("Reusing alias {} for {}", hostname, owner);
                return Ok(true);
            }

            // Left half-deleted by an earlier failure; nothing is on the network
            tracing::info!("Finishing withdrawal of {} before republishing", hostname);
            publisher.delete_alias(group).await?;
            self.aliases.remove(hostname);
        }

        tracing::info!("Adding {}", hostname);
        let group = publisher.add_alias(hostname, &self.target).await?;
        self.aliases.insert(hostname.to_string(), group);
        Ok(true)
    }

    /// Withdraw the alias for `hostname` if one is tracked.
    ///
    /// Returns `Ok(true)` when an alias was released. The alias stays tracked
    /// when the publisher fails.
    pub async fn delete_alias_if_owned<R>(
        &mut self,
        publisher: &AliasPublisher<R>,
        hostname: &str,
    ) -> Result<bool, AliasError>
    where
        R: Responder<Group = G>,
    {
        if !self.filter.is_publishable(hostname) {
            return Ok(false);
        }
        let Some(group) = self.aliases.get_mut(hostname) else {
            return Ok(false);
        };

        tracing::info!("Deleting {}", hostname);
        publisher.delete_alias(group).await?;
        self.aliases.remove(hostname);
        Ok(true)
    }

    /// Reset and release every alias and forget all resources.
    ///
    /// Failures are logged and do not stop the sweep; aliases that could not
    /// be released stay tracked. Returns the number released, or the first
    /// failure.
    pub async fn release_all<R>(&mut self, publisher: &AliasPublisher<R>) -> Result<usize, AliasError>
    where
        R: Responder<Group = G>,
    {
        let mut released = 0;
        let mut first_error = None;

        let hostnames: Vec<String> = self.aliases.keys().cloned().collect();
        for hostname in hostnames {
            match self.delete_alias_if_owned(publisher, &hostname).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!("Failed to release {}: {}", hostname, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        self.resources.clear();

        match first_error {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }

    /// Committed aliases and tracked resources. Groups left half-deleted by a
    /// failed release are tracked but no longer listed.
    pub fn snapshot(&self) -> Snapshot {
        let aliases: Vec<AliasEntry> = self
            .aliases
            .iter()
            .filter(|(_, group)| group.state() == GroupState::Committed)
            .filter_map(|(hostname, group)| {
                Some(AliasEntry {
                    hostname: hostname.clone(),
                    target: self.target.clone(),
                    published_at: group.committed_at()?,
                })
            })
            .collect();

        let mut resources: Vec<ResourceEntry> = self
            .resources
            .iter()
            .map(|(key, resource)| ResourceEntry {
                kind: key.kind.clone(),
                uid: key.uid.clone(),
                namespace: resource.namespace.clone(),
                name: resource.name.clone(),
                hostnames: resource.hostnames.clone(),
            })
            .collect();
        resources.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));

        let hash = hash::compute_hash(&aliases);
        Snapshot { aliases, resources, hash }
    }
}
