use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::error_handling::HandleErrorLayer;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{BoxError, Router};
use prometheus_client::registry::Registry;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};

use coda_store::Store;
use coda_sync::{Importer, SyncLock, SyncTrigger};

use crate::config::Config;
use crate::denylist::Denylist;
use crate::fetcher::{ContentFetcher, Rehydrator};
use crate::handlers;
use crate::metrics::Metrics;

/// Shared state behind every request handler.
#[derive(Debug)]
pub struct State {
    pub store: Store,
    pub lock: SyncLock,
    pub importer: Importer,
    pub trigger: SyncTrigger,
    pub fetcher: ContentFetcher,
    pub rehydrator: Rehydrator,
    pub denylist: Denylist,
    pub config: Config,
    pub metrics: Metrics,
    pub registry: Option<Arc<Mutex<Registry>>>,
}

/// The gateway server.
#[derive(Debug, Clone)]
pub struct Core {
    state: Arc<State>,
}

impl Core {
    /// Assemble the gateway around an already wired store and replication
    /// engine.
    pub fn new(
        config: Config,
        store: Store,
        lock: SyncLock,
        importer: Importer,
        trigger: SyncTrigger,
        registry: Option<Arc<Mutex<Registry>>>,
    ) -> Result<Self> {
        let fetcher = ContentFetcher::new(
            config.read_peers.clone(),
            config.network_gateway.clone(),
            config.network_timeout(),
            config.request_timeout(),
        )?;
        let (rehydrator, _worker) =
            Rehydrator::spawn(config.network_gateway.clone(), config.network_timeout());
        let denylist = Denylist::new(config.denylist_cids.iter().cloned());
        Ok(Core {
            state: Arc::new(State {
                store,
                lock,
                importer,
                trigger,
                fetcher,
                rehydrator,
                denylist,
                config,
                metrics: Metrics::default(),
                registry,
            }),
        })
    }

    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    pub async fn serve(self) -> Result<()> {
        let port = self.state.config.port;
        let app = get_app_routes(&self.state);
        let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
        info!("gateway listening on {addr}");
        axum::Server::bind(&addr)
            .serve(app.into_make_service())
            .await?;
        Ok(())
    }
}

pub fn get_app_routes(state: &Arc<State>) -> Router {
    Router::new()
        .route("/export", get(handlers::get_export))
        .route("/sync", post(handlers::post_sync))
        .route("/sync_status/:wallet", get(handlers::get_sync_status))
        .route(
            "/users/clock_status/:wallet",
            get(handlers::get_clock_status),
        )
        .route("/ipfs/:cid", get(handlers::get_cid))
        .route("/ipfs/:cid/:filename", get(handlers::get_dir_entry))
        .route("/file_lookup", get(handlers::get_file_lookup))
        .route("/audius_users/metadata", post(handlers::post_user_metadata))
        .route("/audius_users", post(handlers::post_user))
        .route("/tracks/metadata", post(handlers::post_track_metadata))
        .route("/tracks", post(handlers::post_track))
        .route("/image_upload", post(handlers::post_image))
        .route("/track_content", post(handlers::post_track_content))
        .route("/health_check", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_dump))
        .layer(Extension(Arc::clone(state)))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(middleware_error_handler))
                .load_shed()
                .concurrency_limit(state.config.concurrency_limit)
                .timeout(state.config.request_timeout())
                .into_inner(),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &http::Request<axum::body::Body>| {
                info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
}

async fn middleware_error_handler(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Cow::from("service is overloaded, try again later"),
        );
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Cow::from(format!("unhandled internal error: {error}")),
    )
}
