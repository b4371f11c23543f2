mod aliases;
mod api;
mod avahi;
mod config;
mod error;
mod hosts;
mod k8s;
mod reconciler;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::avahi::dbus::AvahiResponder;
use crate::config::Config;
use crate::hosts::HostExtractor;
use crate::reconciler::{KindFeed, Reconciler};

/// Pending notifications buffered per watched kind
const FEED_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("avahi_aliasd=info"))
        )
        .init();

    tracing::info!("Starting avahi-aliasd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/avahi-aliasd/aliasd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    let target = config.alias.resolve_target()?;
    avahi::fqdn::encode(&target)
        .with_context(|| format!("Invalid alias target {}", target))?;
    tracing::info!("Publishing aliases for {} under {}", target, config.alias.suffix);

    // Connect to Avahi over the system bus
    let bus = zbus::Connection::system()
        .await
        .context("Failed to connect to the system D-Bus")?;
    let responder = AvahiResponder::connect(bus)
        .await
        .context("Failed to reach the Avahi daemon")?;

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let reconciler = Reconciler::new(
        responder,
        target,
        HostExtractor::new(config.alias.suffix.clone()),
    );

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn one watcher task per resource kind
    let mut feeds = Vec::new();
    let mut watcher_handles = Vec::new();
    for resource in &config.watch.resources {
        let (tx, feed) = KindFeed::channel(resource.kind.clone(), FEED_CAPACITY);
        let api = k8s::watcher::api_for(client.clone(), resource, &config.watch);
        let kind = resource.kind.clone();
        let watcher_cancel = cancel.clone();
        watcher_handles.push(tokio::spawn(async move {
            k8s::watcher::run_watcher(api, kind, tx, watcher_cancel).await;
        }));
        feeds.push(feed);
    }

    // Status API
    let server_handle = if config.api.enabled {
        let app = api::routes::router(api::routes::AppState {
            snapshot_rx: reconciler.snapshots(),
        });
        let listener = tokio::net::TcpListener::bind(&config.api.listen)
            .await
            .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

        tracing::info!("API listening on {}", config.api.listen);

        let server_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_cancel.cancelled().await })
                .await
            {
                tracing::error!("Server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Cancel on SIGINT or SIGTERM
    let mut sigterm = signal(SignalKind::terminate())
        .context("Failed to listen for SIGTERM")?;
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
            _ = signal_cancel.cancelled() => return,
        }
        tracing::info!("Shutdown signal received");
        signal_cancel.cancel();
    });

    // Runs until every feed ends or is cancelled; releases all aliases
    let result = reconciler.run(feeds, cancel.clone()).await;

    // Stop remaining tasks
    cancel.cancel();
    for handle in watcher_handles {
        let _ = handle.await;
    }
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }

    tracing::info!("Shutdown complete");
    result.context("Alias reconciliation failed")
}
