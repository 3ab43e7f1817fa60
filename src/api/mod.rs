pub mod auth;

#[cfg(test)]
mod tests;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::auth::auth_middleware;
use crate::context::AppContext;
use crate::crawler::{ResultMap, SessionStatus};
use crate::error::{ControlError, Result, ScrapingError};
use crate::keywords::{sanitize_keywords, split_csv};
use crate::storage::{RecordQuery, TweetRecord};

const DEFAULT_RESULTS_LIMIT: usize = 10;
const DEFAULT_RELEVANT_LIMIT: usize = 20;
const MAX_RELEVANT_LIMIT: usize = 100;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T>(data: T) -> Reply<T> {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn bad_request<T>(message: String) -> Reply<T> {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message)))
}

#[derive(Debug, Serialize)]
pub struct ControlReply {
    pub message: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub is_running: bool,
    pub db_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ScoredText {
    pub text: String,
    pub relevant: bool,
}

/// `/results` answers with one of three shapes depending on the filter.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResultsView {
    Records(Vec<TweetRecord>),
    Grouped(BTreeMap<String, Vec<TweetRecord>>),
    Live(BTreeMap<String, Vec<ScoredText>>),
}

#[derive(Debug, Default, Deserialize)]
pub struct KeywordParams {
    keywords: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultsParams {
    keyword: Option<String>,
    keywords: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RelevantParams {
    keywords: Option<String>,
    limit: Option<String>,
    recompute: Option<String>,
}

pub fn create_router(ctx: Arc<AppContext>) -> Router {
    let control_routes = Router::new()
        .route("/scrape", get(start_scraping).post(start_scraping))
        .route("/start", post(start_scraping))
        .route("/stop", post(stop_scraping))
        .route("/restart", post(restart_scraping))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    Router::new()
        .route("/status", get(get_status))
        .route("/results", get(get_results))
        .route("/results/raw", get(get_raw_results))
        .route("/tweets/relevant", get(get_relevant_tweets))
        .route("/health", get(health))
        .merge(control_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(ctx)
}

pub async fn start_api_server(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.api.host, ctx.config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ScrapingError::NetworkError(format!("Failed to bind {}: {}", addr, e)))?;
    info!("API server listening on {}", listener.local_addr()?);

    let app = create_router(ctx.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ScrapingError::NetworkError(format!("API server error: {}", e)))?;

    if ctx.manager.is_running().await {
        info!("Stopping active crawl session before exit");
        if let Err(e) = ctx.manager.stop().await {
            warn!("Failed to stop crawl session: {}", e);
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
}

/// JSON body `keywords` array first, then the `?keywords=` CSV.
fn requested_keywords(params: &KeywordParams, body: &[u8]) -> Option<Vec<String>> {
    if !body.is_empty() {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
            if let Some(list) = value.get("keywords").and_then(|k| k.as_array()) {
                return Some(
                    list.iter()
                        .map(|k| match k {
                            serde_json::Value::String(s) => s.trim().to_string(),
                            other => other.to_string(),
                        })
                        .filter(|k| !k.is_empty())
                        .collect(),
                );
            }
        }
    }

    params
        .keywords
        .as_deref()
        .filter(|csv| !csv.is_empty())
        .map(split_csv)
}

fn parse_limit(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|l| l.trim().parse::<usize>().ok()).unwrap_or(default)
}

async fn start_scraping(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<KeywordParams>,
    body: Bytes,
) -> Reply<ControlReply> {
    let requested = requested_keywords(&params, &body).unwrap_or_else(|| ctx.default_keywords.clone());
    let keywords = sanitize_keywords(requested, ctx.limits);
    info!("Start requested with keywords {:?}", keywords);

    if keywords.is_empty() {
        return bad_request(
            "No keywords provided. Send JSON {\"keywords\": [\"cyclone\",\"flood\"]} or use ?keywords=cyclone,flood"
                .to_string(),
        );
    }

    match ctx.manager.start(keywords).await {
        Ok(keywords) => ok(ControlReply {
            message: "Scraping started".to_string(),
            keywords,
        }),
        Err(e) => bad_request(e.to_string()),
    }
}

async fn stop_scraping(State(ctx): State<Arc<AppContext>>) -> Reply<String> {
    match ctx.manager.stop().await {
        Ok(()) => ok("Scraping stopped".to_string()),
        Err(e) => bad_request(e.to_string()),
    }
}

async fn restart_scraping(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<KeywordParams>,
    body: Bytes,
) -> Reply<ControlReply> {
    let keywords = requested_keywords(&params, &body)
        .map(|requested| sanitize_keywords(requested, ctx.limits))
        .filter(|keywords| !keywords.is_empty());

    let outcome = ctx.manager.restart(keywords).await;
    let keywords = ctx.manager.status().await.keywords;
    match outcome {
        Ok(_) => ok(ControlReply {
            message: "Restarted".to_string(),
            keywords,
        }),
        Err(e) => restart_failed(e, keywords),
    }
}

// failed restarts still echo the current keywords
fn restart_failed(error: ControlError, keywords: Vec<String>) -> Reply<ControlReply> {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse {
            success: false,
            data: Some(ControlReply {
                message: error.to_string(),
                keywords,
            }),
            error: Some(error.to_string()),
        }),
    )
}

async fn get_status(State(ctx): State<Arc<AppContext>>) -> Json<ApiResponse<SessionStatus>> {
    Json(ApiResponse::success(ctx.manager.status().await))
}

async fn get_results(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<ResultsParams>,
) -> Json<ApiResponse<ResultsView>> {
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_RESULTS_LIMIT);

    if let Some(keyword) = params.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        let records = ctx.store.fetch_records(&RecordQuery::new(limit).keyword(keyword)).await;
        return Json(ApiResponse::success(ResultsView::Records(
            records.iter().map(TweetRecord::from).collect(),
        )));
    }

    if let Some(csv) = params.keywords.as_deref().filter(|csv| !csv.is_empty()) {
        let mut groups = BTreeMap::new();
        for keyword in split_csv(csv) {
            let records = ctx.store.fetch_records(&RecordQuery::new(limit).keyword(keyword.as_str())).await;
            groups.insert(keyword, records.iter().map(TweetRecord::from).collect());
        }
        return Json(ApiResponse::success(ResultsView::Grouped(groups)));
    }

    let mut live = BTreeMap::new();
    for (keyword, texts) in ctx.manager.results().await {
        let mut scored = Vec::new();
        for text in texts.into_iter().filter(|t| !t.trim().is_empty()) {
            let relevant = ctx.relevance.check_relevance(&text).await;
            scored.push(ScoredText { text, relevant });
        }
        live.insert(keyword, scored);
    }
    Json(ApiResponse::success(ResultsView::Live(live)))
}

async fn get_raw_results(State(ctx): State<Arc<AppContext>>) -> Json<ApiResponse<ResultMap>> {
    Json(ApiResponse::success(ctx.manager.results().await))
}

async fn get_relevant_tweets(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<RelevantParams>,
) -> Json<ApiResponse<Vec<TweetRecord>>> {
    if !ctx.store.is_enabled() {
        return Json(ApiResponse::success(Vec::new()));
    }

    let limit = parse_limit(params.limit.as_deref(), DEFAULT_RELEVANT_LIMIT).clamp(1, MAX_RELEVANT_LIMIT);
    let keywords = params
        .keywords
        .as_deref()
        .map(|csv| sanitize_keywords(split_csv(csv), ctx.limits))
        .unwrap_or_default();

    let query = RecordQuery::new(limit).keywords(keywords.clone()).ignore_case();
    let relevant: Vec<TweetRecord> = ctx
        .store
        .fetch_records(&query.clone().relevant_only())
        .await
        .iter()
        .map(TweetRecord::from)
        .collect();

    let recompute = params
        .recompute
        .as_deref()
        .map(|flag| matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    if !relevant.is_empty() || !recompute {
        return Json(ApiResponse::success(relevant));
    }

    // backfill: re-classify the most recent records and persist the new verdicts
    let candidates = ctx.store.fetch_records(&query).await;
    info!("Re-classifying {} recent records for {:?}", candidates.len(), keywords);
    let mut backfilled = Vec::new();
    for mut record in candidates {
        let relevant = ctx.relevance.check_relevance(&record.text).await;
        if !ctx.store.update_relevance(&record.keyword, &record.text, relevant).await {
            warn!("Failed to store re-classified relevance for '{}'", record.keyword);
        }
        if relevant {
            record.relevant = true;
            backfilled.push(TweetRecord::from(&record));
        }
    }
    Json(ApiResponse::success(backfilled))
}

async fn health(State(ctx): State<Arc<AppContext>>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        is_running: ctx.manager.is_running().await,
        db_enabled: ctx.store.is_enabled(),
    })
}
