//! Reconciliation engine - converges published aliases to the hostnames
//! declared by routing resources.

use std::collections::{BTreeSet, HashSet};

use shared::types::{ResourceDocument, WatchEvent, WatchPhase};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::aliases::store::{AliasStore, ResourceKey, Snapshot};
use crate::avahi::publisher::{AliasPublisher, Responder};
use crate::error::AliasError;
use crate::hosts::HostExtractor;

/// What a watch stream delivers for one kind.
#[derive(Debug)]
pub enum Notification {
    /// A single change to one resource.
    Event(WatchEvent),
    /// The complete current list of resources of `kind`. Tracked resources
    /// of that kind missing from the list are treated as deleted.
    Resync {
        kind: String,
        resources: Vec<ResourceDocument>,
    },
}

/// Item delivered by a watch stream. An `Err` terminates the stream.
pub type FeedItem = Result<Notification, AliasError>;

/// Notifications for one watched resource kind. The stream ends cleanly
/// when the sender is dropped.
pub struct KindFeed {
    pub kind: String,
    pub rx: mpsc::Receiver<FeedItem>,
}

impl KindFeed {
    pub fn channel(kind: impl Into<String>, capacity: usize) -> (mpsc::Sender<FeedItem>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { kind: kind.into(), rx })
    }
}

/// How a feed stopped.
#[derive(Debug)]
enum StreamEnd {
    Completed,
    Aborted,
    Failed(AliasError),
}

pub struct Reconciler<R: Responder> {
    publisher: AliasPublisher<R>,
    extractor: HostExtractor,
    store: Mutex<AliasStore<R::Group>>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl<R: Responder> Reconciler<R> {
    pub fn new(responder: R, target: impl Into<String>, extractor: HostExtractor) -> Self {
        let (snapshot_tx, _) = watch::channel(Snapshot::default());
        Self {
            publisher: AliasPublisher::new(responder),
            store: Mutex::new(AliasStore::new(target, extractor.clone())),
            extractor,
            snapshot_tx,
        }
    }

    /// Receiver for the store view published after every notification.
    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Process one notification to completion.
    ///
    /// Per-hostname publisher failures are logged and do not abort the
    /// notification. Errors returned here concern the whole notification.
    pub async fn handle(&self, event: WatchEvent) -> Result<(), AliasError> {
        let doc = &event.resource;
        tracing::info!(
            "{} - {}/{}",
            event.phase,
            doc.metadata.namespace,
            doc.metadata.name
        );

        let key = ResourceKey {
            kind: doc.kind.clone(),
            uid: doc.metadata.uid.clone(),
        };

        let hostnames = match event.phase {
            WatchPhase::Added | WatchPhase::Modified => self.extractor.extract(doc)?,
            WatchPhase::Deleted => Vec::new(),
            WatchPhase::Other(ref phase) => {
                tracing::warn!(
                    "Unhandled {} event for {} {}/{}",
                    phase,
                    doc.kind,
                    doc.metadata.namespace,
                    doc.metadata.name
                );
                return Ok(());
            }
        };

        let mut store = self.store.lock().await;
        match event.phase {
            WatchPhase::Added => self.added(&mut store, key, doc, hostnames).await,
            WatchPhase::Modified => self.modified(&mut store, key, doc, hostnames).await,
            WatchPhase::Deleted => self.deleted(&mut store, &key).await,
            WatchPhase::Other(_) => {}
        }
        tracing::debug!(
            aliases = store.alias_count(),
            resources = store.resource_count(),
            "Reconciled {}/{}",
            doc.metadata.namespace,
            doc.metadata.name
        );
        self.snapshot_tx.send_replace(store.snapshot());

        Ok(())
    }

    /// Converge one kind to a full listing.
    ///
    /// Every listed resource is reconciled like MODIFIED, then tracked
    /// resources of `kind` that were not listed are reconciled like DELETED.
    pub async fn resync(&self, kind: &str, resources: Vec<ResourceDocument>) {
        tracing::info!("RESYNC - {} {} resources", resources.len(), kind);

        let mut listed = HashSet::new();
        let mut desired = Vec::new();
        for doc in &resources {
            let key = ResourceKey {
                kind: doc.kind.clone(),
                uid: doc.metadata.uid.clone(),
            };
            listed.insert(key.clone());
            match self.extractor.extract(doc) {
                Ok(hostnames) => desired.push((key, doc, hostnames)),
                Err(e) => tracing::error!(
                    "Failed to read {}/{}: {}",
                    doc.metadata.namespace,
                    doc.metadata.name,
                    e
                ),
            }
        }

        let mut store = self.store.lock().await;
        for (key, doc, hostnames) in desired {
            self.modified(&mut store, key, doc, hostnames).await;
        }

        let vanished: Vec<ResourceKey> = store
            .tracked_keys(kind)
            .into_iter()
            .filter(|key| !listed.contains(key))
            .collect();
        for key in &vanished {
            tracing::info!("{} vanished during resync", key);
            self.deleted(&mut store, key).await;
        }

        tracing::debug!(
            aliases = store.alias_count(),
            resources = store.resource_count(),
            "Resynced {}",
            kind
        );
        self.snapshot_tx.send_replace(store.snapshot());
    }

    async fn added(
        &self,
        store: &mut AliasStore<R::Group>,
        key: ResourceKey,
        doc: &ResourceDocument,
        hostnames: Vec<String>,
    ) {
        let mut owned = Vec::new();
        for hostname in hostnames {
            match store.add_alias_if_absent(&self.publisher, &hostname, &key).await {
                Ok(true) => owned.push(hostname),
                Ok(false) => {}
                Err(e) => tracing::error!("Failed to add alias {}: {}", hostname, e),
            }
        }

        store
            .track(key, &doc.metadata.namespace, &doc.metadata.name)
            .hostnames
            .extend(owned);
    }

    async fn modified(
        &self,
        store: &mut AliasStore<R::Group>,
        key: ResourceKey,
        doc: &ResourceDocument,
        hostnames: Vec<String>,
    ) {
        // Unknown uid (replay ordering) diffs against an empty set
        let current: BTreeSet<String> = store
            .resource(&key)
            .map(|resource| resource.hostnames.clone())
            .unwrap_or_default();
        let desired: BTreeSet<String> = hostnames.iter().cloned().collect();
        let mut owned = current.clone();

        for hostname in hostnames.iter().filter(|h| !current.contains(*h)) {
            match store.add_alias_if_absent(&self.publisher, hostname, &key).await {
                Ok(true) => {
                    owned.insert(hostname.clone());
                }
                Ok(false) => {}
                Err(e) => tracing::error!("Failed to add alias {}: {}", hostname, e),
            }
        }

        for hostname in current.difference(&desired) {
            match store.delete_alias_if_owned(&self.publisher, hostname).await {
                Ok(_) => {
                    owned.remove(hostname);
                }
                Err(e) => tracing::error!("Failed to delete alias {}: {}", hostname, e),
            }
        }

        let resource = store.track(key, &doc.metadata.namespace, &doc.metadata.name);
        resource.namespace = doc.metadata.namespace.clone();
        resource.name = doc.metadata.name.clone();
        resource.hostnames = owned;
    }

    async fn deleted(&self, store: &mut AliasStore<R::Group>, key: &ResourceKey) {
        let Some(resource) = store.untrack(key) else {
            tracing::debug!("Delete for untracked resource {}", key);
            return;
        };

        for hostname in &resource.hostnames {
            // A failed delete leaves the alias in the store for the final sweep
            if let Err(e) = store.delete_alias_if_owned(&self.publisher, hostname).await {
                tracing::error!("Failed to delete alias {}: {}", hostname, e);
            }
        }
    }

    /// Consume every feed until all have ended or `cancel` fires, then release
    /// every alias.
    ///
    /// Returns the first stream error if any feed failed. Cancellation is not
    /// an error.
    pub async fn run(&self, feeds: Vec<KindFeed>, cancel: CancellationToken) -> Result<(), AliasError> {
        let stop = cancel.child_token();

        let ends = futures::future::join_all(
            feeds.into_iter().map(|feed| self.drive(feed, stop.clone())),
        )
        .await;

        let cleanup = self.cleanup().await;

        let mut stream_error = None;
        for end in ends {
            if let StreamEnd::Failed(e) = end {
                stream_error.get_or_insert(e);
            }
        }

        match stream_error {
            Some(e) => Err(e),
            None => cleanup.map(|_| ()),
        }
    }

    async fn drive(&self, mut feed: KindFeed, stop: CancellationToken) -> StreamEnd {
        tracing::info!("Watching {}", feed.kind);

        let end = loop {
            tokio::select! {
                biased;

                _ = stop.cancelled() => break StreamEnd::Aborted,

                item = feed.rx.recv() => match item {
                    Some(Ok(Notification::Event(event))) => {
                        if let Err(e) = self.handle(event).await {
                            tracing::error!("Failed to process {} event: {}", feed.kind, e);
                        }
                    }
                    Some(Ok(Notification::Resync { kind, resources })) => {
                        self.resync(&kind, resources).await;
                    }
                    Some(Err(e)) => {
                        // One failed stream stops the others so cleanup can run
                        stop.cancel();
                        break StreamEnd::Failed(e);
                    }
                    None => break StreamEnd::Completed,
                },
            }
        };

        match &end {
            StreamEnd::Completed => tracing::info!("{} stream ended", feed.kind),
            StreamEnd::Aborted => tracing::info!("{} stream aborted", feed.kind),
            StreamEnd::Failed(e) => tracing::error!("{} stream failed: {}", feed.kind, e),
        }
        end
    }

    /// Reset and release every alias. Best effort: every alias is attempted
    /// and the first failure is returned.
    pub async fn cleanup(&self) -> Result<usize, AliasError> {
        let mut store = self.store.lock().await;
        let result = store.release_all(&self.publisher).await;
        self.snapshot_tx.send_replace(store.snapshot());

        match &result {
            Ok(released) => tracing::info!("Released {} aliases", released),
            Err(e) => tracing::error!("Cleanup incomplete: {}", e),
        }
        result
    }
}
