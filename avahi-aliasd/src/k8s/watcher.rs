use futures::StreamExt;
use kube::api::{Api, ListParams, WatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind, WatchEvent as KubeEvent};
use shared::types::{ObjectMeta, ResourceDocument, WatchEvent, WatchPhase};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{WatchConfig, WatchedResource};
use crate::error::AliasError;
use crate::reconciler::{FeedItem, Notification};

/// HTTP status the API server sends when the requested resourceVersion has
/// been compacted away
const GONE: u16 = 410;

/// Build a dynamic API handle for a configured resource kind.
pub fn api_for(
    client: kube::Client,
    resource: &WatchedResource,
    config: &WatchConfig,
) -> Api<DynamicObject> {
    let gvk = GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind);
    let api_resource = ApiResource::from_gvk_with_plural(&gvk, &resource.plural);

    if config.all_namespaces {
        Api::all_with(client, &api_resource)
    } else {
        Api::namespaced_with(client, &config.namespace, &api_resource)
    }
}

/// Forward watch events for one kind into `tx` until cancelled.
///
/// Every watch starts from a full listing sent as a resync. The watch is
/// resumed from the last seen resourceVersion whenever the API server closes
/// it, and relisted when that version has expired. A transport failure is
/// sent as an `Err` item, which ends the feed. Dropping `tx` on return ends
/// the feed cleanly.
pub async fn run_watcher(
    api: Api<DynamicObject>,
    kind: String,
    tx: mpsc::Sender<FeedItem>,
    cancel: CancellationToken,
) {
    tracing::info!("Starting {} watch", kind);

    let watch_failed = |message: String| AliasError::Watch {
        kind: kind.clone(),
        message,
    };
    let params = WatchParams::default();

    'relist: loop {
        let listed = tokio::select! {
            result = relist(&api, &kind) => result,
            _ = cancel.cancelled() => break,
        };
        let mut version = match listed {
            Ok((version, resources)) => {
                let resync = Notification::Resync {
                    kind: kind.clone(),
                    resources,
                };
                if tx.send(Ok(resync)).await.is_err() {
                    tracing::debug!("{} feed receiver dropped", kind);
                    return;
                }
                version
            }
            Err(e) => {
                let _ = tx.send(Err(watch_failed(e.to_string()))).await;
                return;
            }
        };

        loop {
            // The stream borrows its start version, which `version` moves past
            let from = version.clone();
            let started = tokio::select! {
                result = api.watch(&params, &from) => result,
                _ = cancel.cancelled() => break 'relist,
            };
            let mut stream = match started {
                Ok(stream) => stream.boxed(),
                Err(e) => {
                    let _ = tx.send(Err(watch_failed(e.to_string()))).await;
                    return;
                }
            };

            loop {
                let item = tokio::select! {
                    item = stream.next() => item,
                    _ = cancel.cancelled() => break 'relist,
                };

                let (phase, object) = match item {
                    Some(Ok(KubeEvent::Added(object))) => (WatchPhase::Added, object),
                    Some(Ok(KubeEvent::Modified(object))) => (WatchPhase::Modified, object),
                    Some(Ok(KubeEvent::Deleted(object))) => (WatchPhase::Deleted, object),
                    Some(Ok(KubeEvent::Bookmark(bookmark))) => {
                        version = bookmark.metadata.resource_version;
                        continue;
                    }
                    Some(Ok(KubeEvent::Error(e))) if e.code == GONE => {
                        tracing::warn!("{} watch expired at {}, relisting: {}", kind, version, e.message);
                        continue 'relist;
                    }
                    Some(Ok(KubeEvent::Error(e))) => {
                        let _ = tx.send(Err(watch_failed(e.message))).await;
                        return;
                    }
                    Some(Err(e)) => {
                        let _ = tx.send(Err(watch_failed(e.to_string()))).await;
                        return;
                    }
                    None => {
                        tracing::debug!("{} watch closed by server, resuming at {}", kind, version);
                        break;
                    }
                };

                if let Some(resource_version) = &object.metadata.resource_version {
                    version = resource_version.clone();
                }

                let event = WatchEvent {
                    phase,
                    resource: to_document(&kind, object),
                };
                if tx.send(Ok(Notification::Event(event))).await.is_err() {
                    tracing::debug!("{} feed receiver dropped", kind);
                    return;
                }
            }
        }
    }

    tracing::info!("{} watch shutting down", kind);
}

/// List every resource of the kind, returning the list's resourceVersion to
/// watch from.
async fn relist(api: &Api<DynamicObject>, kind: &str) -> kube::Result<(String, Vec<ResourceDocument>)> {
    let list = api.list(&ListParams::default()).await?;
    let version = list.metadata.resource_version.unwrap_or_else(|| "0".to_string());
    let resources = list
        .items
        .into_iter()
        .map(|object| to_document(kind, object))
        .collect();
    Ok((version, resources))
}

/// Convert a dynamic object into the document shape the reconciler reads.
fn to_document(kind: &str, object: DynamicObject) -> ResourceDocument {
    let spec = object
        .data
        .get("spec")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    ResourceDocument {
        kind: kind.to_string(),
        metadata: ObjectMeta {
            uid: object.metadata.uid.unwrap_or_default(),
            namespace: object.metadata.namespace.unwrap_or_default(),
            name: object.metadata.name.unwrap_or_default(),
        },
        spec,
    }
}
