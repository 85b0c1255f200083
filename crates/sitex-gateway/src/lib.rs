//! HTTP management surface for site extensions.
//!
//! Routes the feed and installed-set endpoints onto the operation dispatcher,
//! translating the `Prefer: respond-async` request header into the explicit
//! request mode and operation outcomes into status codes, JSON bodies, and
//! the restart notification header.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use sitex_runtime::{RequestMode, SiteExtensionManager, SiteExtensionService};

mod handlers;
#[cfg(test)]
mod tests;
mod types;

use handlers::{
    handle_feed_detail, handle_feed_list, handle_local_detail, handle_local_install,
    handle_local_list, handle_local_uninstall,
};

const EXTENSION_FEED_ENDPOINT: &str = "/api/extensionfeed";
const EXTENSION_FEED_DETAIL_ENDPOINT: &str = "/api/extensionfeed/{id}";
const SITE_EXTENSIONS_ENDPOINT: &str = "/api/siteextensions";
const SITE_EXTENSION_DETAIL_ENDPOINT: &str = "/api/siteextensions/{id}";

/// Response header notifying the hosting platform that a restart is required.
pub const SITE_OPERATION_HEADER: &str = "x-site-operation";
pub const SITE_OPERATION_RESTART: &str = "restart";

const PREFER_HEADER: &str = "prefer";
const PREFER_RESPOND_ASYNC: &str = "respond-async";

/// Configuration for the site extension HTTP server.
#[derive(Clone)]
pub struct SiteExtensionServerConfig {
    pub bind: String,
    pub manager: Arc<dyn SiteExtensionManager>,
    /// Root directory holding the per-extension operation records.
    pub settings_root: PathBuf,
}

pub(crate) struct SiteExtensionServerState {
    service: SiteExtensionService,
}

impl SiteExtensionServerState {
    fn new(config: &SiteExtensionServerConfig) -> Self {
        Self {
            service: SiteExtensionService::new(
                Arc::clone(&config.manager),
                config.settings_root.clone(),
            ),
        }
    }

    pub(crate) fn service(&self) -> &SiteExtensionService {
        &self.service
    }
}

/// Derives the request mode at the transport edge: `Prefer: respond-async`
/// selects the accept-now/poll-later protocol, anything else blocks.
pub(crate) fn request_mode(headers: &HeaderMap) -> RequestMode {
    let prefers_async = headers
        .get(PREFER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case(PREFER_RESPOND_ASYNC))
        })
        .unwrap_or(false);
    if prefers_async {
        RequestMode::Async
    } else {
        RequestMode::Sync
    }
}

pub(crate) fn build_site_extension_router(state: Arc<SiteExtensionServerState>) -> Router {
    Router::new()
        .route(EXTENSION_FEED_ENDPOINT, get(handle_feed_list))
        .route(EXTENSION_FEED_DETAIL_ENDPOINT, get(handle_feed_detail))
        .route(SITE_EXTENSIONS_ENDPOINT, get(handle_local_list))
        .route(
            SITE_EXTENSION_DETAIL_ENDPOINT,
            get(handle_local_detail)
                .put(handle_local_install)
                .delete(handle_local_uninstall),
        )
        .with_state(state)
}

/// Binds and serves the site extension API until interrupted.
pub async fn run_site_extension_server(config: SiteExtensionServerConfig) -> Result<()> {
    std::fs::create_dir_all(&config.settings_root)
        .with_context(|| format!("failed to create {}", config.settings_root.display()))?;

    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{}'", config.bind))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind site extension server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound server address")?;

    println!(
        "site extension server listening: addr={} settings_root={}",
        local_addr,
        config.settings_root.display()
    );

    let state = Arc::new(SiteExtensionServerState::new(&config));
    let app = build_site_extension_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("site extension server exited unexpectedly")?;
    Ok(())
}
