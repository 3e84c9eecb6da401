use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;

use rv_config::Config;
use rv_core::PaginationConfig;
use rv_storage::Storage;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{Result, WebError};
use crate::submission::SubmissionClient;
use crate::variables::{self, DeleteVariables};
use crate::views::{self, FailQueueAction, ListParams, PageParams, SearchParams, SummaryParams};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub config: Arc<Config>,
    pub submission: SubmissionClient,
    pub read_only: bool,
}

impl AppState {
    pub fn new(storage: Arc<Storage>, config: Config, read_only: bool) -> anyhow::Result<Self> {
        let submission = SubmissionClient::new(&config.submission)?;
        Ok(Self {
            storage,
            config: Arc::new(config),
            submission,
            read_only,
        })
    }

    pub fn pagination(&self) -> PaginationConfig {
        self.config.pagination.to_pagination()
    }

    pub fn scripts_root(&self) -> &FsPath {
        &self.config.paths.scripts_root
    }
}

pub struct WebServer;

impl WebServer {
    pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
        let app = router(state);

        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr).await?;

        info!("Run viewer listening on {}", addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// All routes, with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    // Add CORS layer to allow connections from any origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_info))
        .route("/runs/queue", get(api_queue))
        .route("/runs/failed", get(api_fail_queue).post(api_fail_queue_action))
        .route("/runs/batch/:instrument", post(api_submit_batch))
        .route("/runs/:instrument", get(api_runs_list))
        .route("/runs/:instrument/:run_number", get(api_run_summary))
        .route(
            "/runs/:instrument/:run_number/:version",
            get(api_run_summary_version),
        )
        .route("/runs/:instrument/batch/:pk", get(api_batch_summary))
        .route(
            "/runs/:instrument/batch/:pk/:version",
            get(api_batch_summary_version),
        )
        .route("/search", get(api_search))
        .route("/experiment/:reference", get(api_experiment_summary))
        .route("/instruments", get(api_instruments))
        .route("/instruments/sync", post(api_sync_instruments))
        .route("/instruments/:name/pause", post(api_pause_instrument))
        .route("/instruments/:name/variables", get(api_variables_summary))
        .route(
            "/instruments/:name/variables/defaults",
            get(api_default_variables),
        )
        .route(
            "/instruments/:name/variables/delete",
            post(api_delete_variables),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn respond<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(context) => Json(context).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET handler for server info/health check
async fn handle_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "reduce-viewer",
        "version": env!("CARGO_PKG_VERSION"),
        "read_only": state.read_only,
    }))
}

/// GET /runs/queue - Queued and processing runs
async fn api_queue(State(state): State<AppState>) -> Response {
    respond(views::queue(&state).await)
}

/// GET /runs/failed - Failed runs not hidden from the queue
async fn api_fail_queue(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Response {
    respond(views::fail_queue(&state, &params).await)
}

/// POST /runs/failed - Act on selected failed runs
async fn api_fail_queue_action(
    State(state): State<AppState>,
    Json(action): Json<FailQueueAction>,
) -> Response {
    if state.read_only {
        return WebError::ReadOnly.into_response();
    }
    respond(views::fail_queue_action(&state, &action).await)
}

/// GET /runs/:instrument - Instrument run list
async fn api_runs_list(
    State(state): State<AppState>,
    Path(instrument): Path<String>,
    Query(params): Query<ListParams>,
) -> Response {
    respond(views::runs_list(&state, &instrument, &params).await)
}

/// GET /runs/:instrument/:run_number - Run summary, version 0
async fn api_run_summary(
    State(state): State<AppState>,
    Path((instrument, run_number)): Path<(String, u64)>,
    Query(params): Query<SummaryParams>,
) -> Response {
    respond(views::run_summary(&state, &instrument, run_number, None, &params).await)
}

/// GET /runs/:instrument/:run_number/:version - Run summary
async fn api_run_summary_version(
    State(state): State<AppState>,
    Path((instrument, run_number, version)): Path<(String, u64, u32)>,
    Query(params): Query<SummaryParams>,
) -> Response {
    respond(views::run_summary(&state, &instrument, run_number, Some(version), &params).await)
}

/// GET /runs/:instrument/batch/:pk - Batch run summary, version 0
async fn api_batch_summary(
    State(state): State<AppState>,
    Path((instrument, pk)): Path<(String, i64)>,
    Query(params): Query<SummaryParams>,
) -> Response {
    respond(views::batch_run_summary(&state, &instrument, pk, None, &params).await)
}

/// GET /runs/:instrument/batch/:pk/:version - Batch run summary
async fn api_batch_summary_version(
    State(state): State<AppState>,
    Path((instrument, pk, version)): Path<(String, i64, u32)>,
    Query(params): Query<SummaryParams>,
) -> Response {
    respond(views::batch_run_summary(&state, &instrument, pk, Some(version), &params).await)
}

/// POST /runs/batch/:instrument - Submit a batch run
async fn api_submit_batch(
    State(state): State<AppState>,
    Path(instrument): Path<String>,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    if state.read_only {
        return WebError::ReadOnly.into_response();
    }
    respond(views::submit_batch_run(&state, &instrument, &form).await)
}

/// GET /search - Run and experiment search
async fn api_search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    respond(views::search(&state, &params).await)
}

/// GET /experiment/:reference - Experiment summary
async fn api_experiment_summary(
    State(state): State<AppState>,
    Path(reference): Path<u64>,
    Query(params): Query<PageParams>,
) -> Response {
    respond(views::experiment_summary(&state, reference, &params).await)
}

/// GET /instruments - List instruments
async fn api_instruments(State(state): State<AppState>) -> Response {
    respond(views::instruments(&state).await)
}

/// POST /instruments/sync - Match instrument activity to the reduction scripts
async fn api_sync_instruments(State(state): State<AppState>) -> Response {
    if state.read_only {
        return WebError::ReadOnly.into_response();
    }
    respond(views::sync_instruments(&state).await)
}

#[derive(Deserialize)]
struct PauseRequest {
    paused: bool,
}

/// POST /instruments/:name/pause - Pause or resume an instrument
async fn api_pause_instrument(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<PauseRequest>,
) -> Response {
    if state.read_only {
        return WebError::ReadOnly.into_response();
    }
    respond(views::set_instrument_paused(&state, &name, req.paused).await)
}

/// GET /instruments/:name/variables - Current and upcoming run variables
async fn api_variables_summary(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    respond(variables::variables_summary(&state, &name).await)
}

/// GET /instruments/:name/variables/defaults - Variables from reduce_vars.json
async fn api_default_variables(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    respond(variables::default_variables(&state, &name).await)
}

/// POST /instruments/:name/variables/delete - Delete stored run variables
async fn api_delete_variables(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DeleteVariables>,
) -> Response {
    if state.read_only {
        return WebError::ReadOnly.into_response();
    }
    respond(variables::delete_variables(&state, &name, &req).await)
}
