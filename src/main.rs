//! Question Replicas - serves replicated exam questions as per-job edit trees.

mod config;
mod error;
mod filters;
mod process;
mod question_tree;
mod schema;
mod store;
mod supabase;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use config::AppConfig;
use error::AppError;
use filters::{FilterOptions, FilterSelection};
use process::ProcessClient;
use question_tree::LinkScope;
use schema::{ProcessJob, QuestionNode, QuestionPatch, ReplicateRequest};
use store::{QuestionStore, ResultsQuery, TaxonomyStore};
use supabase::SupabaseClient;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    questions: Arc<dyn QuestionStore>,
    taxonomy: Arc<dyn TaxonomyStore>,
    process: Arc<ProcessClient>,
    link_scope: LinkScope,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "question_replicas=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(
        "Supabase at {} (schema={}, table={}), link scope {:?}",
        config.supabase.base_url,
        config.supabase.schema,
        config.supabase.results_table,
        config.link_scope
    );

    let http = reqwest::Client::new();
    let supabase = Arc::new(SupabaseClient::new(http.clone(), &config.supabase));

    let state = AppState {
        questions: supabase.clone(),
        taxonomy: supabase,
        process: Arc::new(ProcessClient::new(http, config.process_url.clone())),
        link_scope: config.link_scope,
    };

    let app = router(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/replicate", post(replicate))
        .route("/replicate/results", get(list_results))
        .route(
            "/replicate/results/:id",
            patch(update_result).delete(delete_result),
        )
        .route("/filters", get(list_filters))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

#[derive(serde::Deserialize)]
struct ResultsParams {
    owner: Option<String>,
    search: Option<String>,
}

#[derive(serde::Deserialize)]
struct OwnerParams {
    owner: Option<String>,
}

fn require_owner(owner: Option<String>) -> Result<String, AppError> {
    owner
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .ok_or_else(|| AppError::BadRequest("owner is required".to_string()))
}

/// List an owner's replicated questions as trees of edit variants.
async fn list_results(
    State(state): State<AppState>,
    Query(params): Query<ResultsParams>,
) -> Result<Json<Vec<QuestionNode>>, AppError> {
    let query = ResultsQuery {
        owner: require_owner(params.owner)?,
        search: params.search.filter(|s| !s.trim().is_empty()),
    };

    let rows = state
        .questions
        .list_results(&query)
        .await
        .map_err(AppError::upstream)?;

    let (roots, stats) = question_tree::reconstruct_with_stats(rows, state.link_scope);
    if stats.dropped > 0 {
        debug!(
            "Dropped {} rows ({} orphans) rebuilding results for {}",
            stats.dropped, stats.orphans, query.owner
        );
    }
    debug!(
        "Served {} roots across {} jobs for {}",
        stats.roots, stats.jobs, query.owner
    );

    Ok(Json(roots))
}

/// Edit the scalar fields of one replicated question.
async fn update_result(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<OwnerParams>,
    Json(patch): Json<QuestionPatch>,
) -> Result<Json<QuestionNode>, AppError> {
    let owner = require_owner(params.owner)?;
    if patch.is_empty() {
        return Err(AppError::BadRequest(
            "at least one of question, options, correct_ans, solution is required".to_string(),
        ));
    }

    let row = state
        .questions
        .update_result(&owner, id, &patch)
        .await
        .map_err(AppError::upstream)?
        .ok_or_else(|| AppError::NotFound(format!("Question {} not found", id)))?;

    Ok(Json(question_tree::normalize(row, Vec::new())))
}

/// Soft-delete one replicated question.
async fn delete_result(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<OwnerParams>,
) -> Result<StatusCode, AppError> {
    let owner = require_owner(params.owner)?;

    let deleted = state
        .questions
        .soft_delete_result(&owner, id)
        .await
        .map_err(AppError::upstream)?;

    if !deleted {
        return Err(AppError::NotFound(format!("Question {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Hand a replication job to the process service.
async fn replicate(
    State(state): State<AppState>,
    Json(request): Json<ReplicateRequest>,
) -> Result<(StatusCode, Json<ProcessJob>), AppError> {
    process::validate(&request).map_err(AppError::BadRequest)?;

    let job = state
        .process
        .submit(&request)
        .await
        .map_err(AppError::upstream)?;

    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// Options for the next unselected level of the city/center/course/batch cascade.
async fn list_filters(
    State(state): State<AppState>,
    Query(selection): Query<FilterSelection>,
) -> Result<Json<FilterOptions>, AppError> {
    let query = filters::resolve(&selection).map_err(|e| {
        warn!("Rejected filter selection {:?}: {}", selection, e);
        AppError::BadRequest(e)
    })?;

    let options = state
        .taxonomy
        .list_options(&query)
        .await
        .map_err(AppError::upstream)?;

    Ok(Json(FilterOptions {
        level: query.level,
        options,
    }))
}
