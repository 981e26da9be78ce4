use crate::admission;
use crate::allowlist::{require_allowed, AllowList};
use crate::config::{Config, LimitsConfig};
use crate::directory::ProjectDirectory;
use crate::dispatch::{Dispatcher, Submission};
use crate::error::{IngestError, Result};
use crate::metrics::{render_self_metrics, IngestMetrics, MetricGroups};
use crate::pipeline::{self, EncryptionKey};
use crate::projection;
use axum::{
    body::Body,
    extract::{RawBody, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{any, get},
    Router,
};
use hyper::body::HttpBody;
use hyper::Server;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Everything request handlers share.
#[derive(Clone)]
pub struct AppState {
    pub key: Arc<EncryptionKey>,
    pub directory: Arc<ProjectDirectory>,
    pub groups: Arc<MetricGroups>,
    pub dispatcher: Arc<Dispatcher>,
    pub allowlist: Arc<AllowList>,
    pub limits: LimitsConfig,
}

impl AppState {
    /// Build the shared state from a validated config. Starts the dispatch
    /// pool, so it must run inside a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let key = Arc::new(EncryptionKey::new(&config.encrypted)?);
        let directory = Arc::new(ProjectDirectory::load(&config.projects_file)?);
        let groups = Arc::new(MetricGroups::with_soft_retention(
            config.ttl(),
            config.soft_retention(),
        )?);
        let allowlist = Arc::new(AllowList::new(config.ip_pass.clone()));
        let dispatcher = Dispatcher::start(config.dispatch_settings());
        Ok(Self {
            key,
            directory,
            groups,
            dispatcher,
            allowlist,
            limits: config.limits.clone(),
        })
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "monitor_gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn reply(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "code": status.as_u16(), "msg": msg }))).into_response()
}

/// `POST /metrics_data`: admit an encrypted batch and acknowledge at once.
async fn ingest(State(state): State<AppState>, method: Method, RawBody(body): RawBody) -> Response {
    match accept(&state, method, body).await {
        Ok(()) => reply(StatusCode::OK, "ok"),
        Err(e) => {
            warn!(reason = e.reason(), error = %e, "ingest request rejected");
            IngestMetrics::record_request_rejected(e.reason());
            reply(e.status(), e.client_message())
        }
    }
}

async fn accept(state: &AppState, method: Method, body: Body) -> std::result::Result<(), IngestError> {
    if method != Method::POST {
        return Err(IngestError::MethodNotAllowed(method.to_string()));
    }

    let started = Instant::now();
    let raw = read_body(body, state.limits.max_body_bytes).await?;
    let envelope = pipeline::open(&state.key, &raw, state.limits.max_decompressed_bytes)?;
    let admitted = admission::admit(envelope)?;

    let kind = admitted.kind;
    let records = admitted.data.len();
    let project = admitted.project;
    let groups = state.groups.clone();
    let directory = state.directory.clone();
    let task_project = project.clone();
    let data = admitted.data;

    let outcome = state.dispatcher.submit(kind, &project, move || {
        let name = directory.resolve(&task_project);
        let report = projection::project(&groups, kind, &task_project, &name, data);
        debug!(
            %kind,
            project = %task_project,
            projected = report.projected,
            skipped = report.skipped,
            "batch projected"
        );
    });
    if outcome == Submission::Overflow {
        debug!(%kind, project = %project, "batch dispatched off-pool");
    }

    IngestMetrics::record_batch_accepted(kind, records, raw.len(), started.elapsed().as_secs_f64());
    Ok(())
}

/// Read the whole body, failing as soon as it reaches `limit` bytes.
async fn read_body(mut body: Body, limit: usize) -> std::result::Result<Vec<u8>, IngestError> {
    if let Some(declared) = body.size_hint().exact() {
        admission::check_body_size(declared as usize, limit)?;
    }
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|e| IngestError::Body(e.to_string()))?;
        buf.extend_from_slice(&chunk);
        admission::check_body_size(buf.len(), limit)?;
    }
    Ok(buf)
}

/// `GET /metrics`: telemetry gauges followed by the gateway's own metrics.
async fn scrape(State(state): State<AppState>) -> Response {
    let mut text = state.groups.store().render();
    text.push_str(&render_self_metrics());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        text,
    )
        .into_response()
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let scrape_routes = Router::new()
        .route("/metrics", get(scrape))
        .route_layer(middleware::from_fn_with_state(
            state.allowlist.clone(),
            require_allowed,
        ));

    Router::new()
        .route("/metrics_data", any(ingest))
        .route("/health", get(health))
        .merge(scrape_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves.
pub async fn start_server<F>(state: AppState, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!(%addr, "HTTP server listening");
    info!("Ingest:  http://{addr}/metrics_data");
    info!("Scrape:  http://{addr}/metrics");
    info!("Health:  http://{addr}/health");

    Server::try_bind(&addr)?
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
