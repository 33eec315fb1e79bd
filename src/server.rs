use crate::db::Store;
use crate::error::QueryError;
use crate::graph::{GraphBuilder, GraphFilter};
use crate::indexer::cfg::CfgBuilder;
use crate::model::{EntrypointFilter, EntrypointType, Package, Symbol, SymbolId};
use crate::spine::SpineBuilder;
use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Per-request budget for store reads and graph construction.
const QUERY_TIMEOUT: Duration = Duration::from_secs(15);
/// How long in-flight requests get to drain after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub project_dir: PathBuf,
}

#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
}

/// The API router over an opened store. Split out so tests can drive the
/// routes without binding a socket.
pub fn router(store: Arc<Store>) -> Router {
    let state = AppState { store };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/stats", get(handle_stats))
        .route("/api/entrypoints", get(handle_entrypoints))
        .route("/api/entrypoints/{id}", get(handle_entrypoint_by_id))
        .route("/api/symbol/{id}", get(handle_symbol))
        .route("/api/search", get(handle_search))
        .route("/api/graph/root/{id}", get(handle_graph_root))
        .route("/api/graph/expand/{id}", get(handle_graph_expand))
        .route("/api/spine/{id}", get(handle_spine))
        .route("/api/cfg/{id}", get(handle_cfg))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP API and block until shutdown. SIGINT/SIGTERM stops
/// accepting connections, drains in-flight requests, then closes the store.
pub async fn serve(cfg: ServerConfig) -> Result<()> {
    let store = Store::open(&cfg.project_dir).context("opening store")?;
    let app = router(Arc::new(store));

    let addr = format!("127.0.0.1:{}", cfg.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("server listening on http://localhost:{}", cfg.port);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutting down, draining in-flight requests");
        let _ = shutdown_tx.send(true);
    });

    let mut drain_rx = shutdown_rx.clone();
    let graceful = axum::serve(listener, app).with_graceful_shutdown({
        let mut rx = shutdown_rx;
        async move {
            let _ = rx.changed().await;
        }
    });

    tokio::select! {
        result = async { graceful.await } => result.context("server error")?,
        _ = async {
            let _ = drain_rx.changed().await;
            tokio::time::sleep(DRAIN_TIMEOUT).await;
        } => {
            warn!("drain deadline exceeded, closing");
        }
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// Error mapping.

struct ApiError(QueryError);

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            QueryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            QueryError::Unsupported => StatusCode::METHOD_NOT_ALLOWED,
            QueryError::Analysis(_) | QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.0.to_string();
        error!("API error [{}]: {}", status.as_u16(), message);
        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<axum::Json<T>, ApiError>;

/// Run a blocking store query off the async runtime, bounded by the query
/// timeout. Timed-out queries discard their partial results.
async fn run_query<T, F>(state: &AppState, f: F) -> std::result::Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Store) -> std::result::Result<T, QueryError> + Send + 'static,
{
    let store = state.store.clone();
    let task = tokio::task::spawn_blocking(move || f(&store));
    match tokio::time::timeout(QUERY_TIMEOUT, task).await {
        Err(_) => Err(ApiError(QueryError::Store(anyhow::anyhow!(
            "query timed out"
        )))),
        Ok(Err(join_err)) => Err(ApiError(QueryError::Store(anyhow::anyhow!(
            "query worker failed: {join_err}"
        )))),
        Ok(Ok(result)) => result.map_err(ApiError),
    }
}

fn parse_id(raw: &str, what: &str) -> std::result::Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError(QueryError::InvalidInput(format!("invalid {what} ID"))))
}

fn parse_filters(raw: Option<&str>) -> std::result::Result<GraphFilter, ApiError> {
    match raw {
        None | Some("") => Ok(GraphFilter::default()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|_| ApiError(QueryError::InvalidInput("invalid filters JSON".to_string()))),
    }
}

// Handlers.

async fn handle_health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_stats(State(state): State<AppState>) -> ApiResult<crate::model::Stats> {
    let stats = run_query(&state, |store| {
        store.get_stats().map_err(QueryError::Store)
    })
    .await?;
    Ok(axum::Json(stats))
}

#[derive(Debug, Deserialize)]
struct EntrypointsParams {
    #[serde(rename = "type")]
    ep_type: Option<String>,
    query: Option<String>,
    limit: Option<usize>,
}

async fn handle_entrypoints(
    State(state): State<AppState>,
    Query(params): Query<EntrypointsParams>,
) -> ApiResult<Vec<crate::model::EntrypointWithSymbol>> {
    let ep_type = match params.ep_type.as_deref() {
        None | Some("") => None,
        Some(raw) => match EntrypointType::parse(raw) {
            Some(parsed) => Some(parsed),
            // Unknown type matches nothing.
            None => return Ok(axum::Json(Vec::new())),
        },
    };
    let filter = EntrypointFilter {
        ep_type,
        query: params.query,
        limit: params.limit,
    };

    let entrypoints = run_query(&state, move |store| {
        store.get_entrypoints(&filter).map_err(QueryError::Store)
    })
    .await?;
    Ok(axum::Json(entrypoints))
}

async fn handle_entrypoint_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<crate::model::EntrypointWithSymbol> {
    let id = parse_id(&id, "entrypoint")?;
    let ep = run_query(&state, move |store| {
        store
            .get_entrypoint_by_id(id)?
            .ok_or_else(|| QueryError::NotFound(format!("entrypoint {id}")))
    })
    .await?;
    Ok(axum::Json(ep))
}

#[derive(Debug, Serialize)]
struct SymbolDetail {
    #[serde(flatten)]
    symbol: Symbol,
    tags: Vec<crate::model::Tag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    package: Option<Package>,
    callees: Vec<crate::model::CalleeInfo>,
    callers: Vec<crate::model::CallerInfo>,
}

async fn handle_symbol(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SymbolDetail> {
    let id = parse_id(&id, "symbol")?;
    let detail = run_query(&state, move |store| {
        let symbol = store
            .get_symbol_by_id(id)?
            .ok_or_else(|| QueryError::NotFound(format!("symbol {id}")))?;
        let tags = store.get_symbol_tags(id).unwrap_or_default();
        let package = store.get_package_by_path(&symbol.pkg_path).unwrap_or(None);
        let callees = store.get_callees(id).unwrap_or_default();
        let callers = store.get_callers(id).unwrap_or_default();
        Ok(SymbolDetail {
            symbol,
            tags,
            package,
            callees,
            callers,
        })
    })
    .await?;
    Ok(axum::Json(detail))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: Option<String>,
    limit: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<Symbol>> {
    let Some(query) = params.query.filter(|q| !q.is_empty()) else {
        return Err(ApiError(QueryError::InvalidInput(
            "query parameter required".to_string(),
        )));
    };
    let limit = params.limit.filter(|l| *l > 0).unwrap_or(50);

    let results = run_query(&state, move |store| {
        store
            .search_symbols(&query, limit)
            .map_err(QueryError::Store)
    })
    .await?;
    Ok(axum::Json(results))
}

#[derive(Debug, Deserialize)]
struct GraphParams {
    depth: Option<usize>,
    filters: Option<String>,
}

async fn require_symbol(state: &AppState, id: SymbolId) -> std::result::Result<(), ApiError> {
    run_query(state, move |store| {
        store
            .get_symbol_by_id(id)?
            .ok_or_else(|| QueryError::NotFound(format!("symbol {id}")))
            .map(|_| ())
    })
    .await
}

async fn handle_graph_root(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<GraphParams>,
) -> ApiResult<crate::graph::GraphResponse> {
    let id = parse_id(&id, "symbol")?;
    let depth = params.depth.filter(|d| *d > 0).unwrap_or(3);
    let filter = parse_filters(params.filters.as_deref())?;
    require_symbol(&state, id).await?;

    let response = run_query(&state, move |store| {
        GraphBuilder::new(store, filter).build_from_root(id, depth)
    })
    .await?;
    Ok(axum::Json(response))
}

async fn handle_graph_expand(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<GraphParams>,
) -> ApiResult<crate::graph::GraphResponse> {
    let id = parse_id(&id, "symbol")?;
    let depth = params.depth.filter(|d| *d > 0).unwrap_or(1);
    let filter = parse_filters(params.filters.as_deref())?;
    require_symbol(&state, id).await?;

    let response = run_query(&state, move |store| {
        GraphBuilder::new(store, filter).expand(id, depth)
    })
    .await?;
    Ok(axum::Json(response))
}

async fn handle_spine(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<GraphParams>,
) -> ApiResult<crate::spine::SpineResponse> {
    let id = parse_id(&id, "symbol")?;
    let depth = params.depth.filter(|d| *d > 0).unwrap_or(10);
    let filter = parse_filters(params.filters.as_deref())?;
    require_symbol(&state, id).await?;

    let response = run_query(&state, move |store| {
        SpineBuilder::new(store, filter).build_spine(id, depth)
    })
    .await?;
    Ok(axum::Json(response))
}

async fn handle_cfg(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<crate::indexer::cfg::CfgInfo> {
    let id = parse_id(&id, "symbol")?;
    // Rebuilding SSA can outlast the normal query budget on first call,
    // but stays within the server's request timeout.
    let response = run_query(&state, move |store| CfgBuilder::new(store).build_cfg(id)).await?;
    Ok(axum::Json(response))
}
