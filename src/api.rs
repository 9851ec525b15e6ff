//! API server for site-sleuth.

use crate::models::{FilterMode, ReportSet};
use crate::pipeline::Pipeline;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::Semaphore;
use warp::{Filter, Rejection, Reply, http::StatusCode};

/// Concurrent search runs served at once.
const MAX_CONCURRENT_RUNS: usize = 4;

const DEFAULT_MAX_RESULTS: usize = 10;

/// API response structure
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<ReportSet>,
}

impl ApiResponse {
    fn error(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            total: None,
            results: None,
        }
    }
}

#[derive(Deserialize, Debug)]
struct SearchRequest {
    keyword: String,
    #[serde(default)]
    location: String,
    max_results: Option<usize>,
    mode: Option<FilterMode>,
}

/// Rejection for a request that parsed but cannot be served.
#[derive(Debug)]
struct InvalidRequest(String);

impl warp::reject::Reject for InvalidRequest {}

#[derive(Debug)]
struct ApiError;

impl warp::reject::Reject for ApiError {}

fn routes(
    pipeline: Arc<Pipeline>,
    semaphore: Arc<Semaphore>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let pipeline_filter = warp::any().map(move || pipeline.clone());
    let semaphore_filter = warp::any().map(move || semaphore.clone());

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::json(&ApiResponse {
                success: true,
                message: "Site Sleuth API is running".to_string(),
                total: None,
                results: None,
            })
        });

    let search = warp::path("search")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(pipeline_filter)
        .and(semaphore_filter)
        .and_then(handle_search);

    health
        .or(search)
        .with(warp::cors().allow_any_origin())
        .recover(handle_rejection)
}

/// Start the API server
pub(crate) async fn start_api_server(pipeline: Pipeline, port: u16) {
    let routes = routes(
        Arc::new(pipeline),
        Arc::new(Semaphore::new(MAX_CONCURRENT_RUNS)),
    );
    tracing::info!("Starting API server on port {}", port);
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;
}

async fn handle_search(
    request: SearchRequest,
    pipeline: Arc<Pipeline>,
    semaphore: Arc<Semaphore>,
) -> Result<impl Reply, Rejection> {
    let keyword = request.keyword.trim().to_string();
    if keyword.is_empty() {
        return Err(warp::reject::custom(InvalidRequest(
            "keyword must not be empty".to_string(),
        )));
    }
    let max_results = request.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    let mode = request.mode.unwrap_or(pipeline.config.mode);

    let _permit = semaphore
        .acquire()
        .await
        .map_err(|_| warp::reject::custom(ApiError))?;

    tracing::info!("Processing search request for '{} {}'", keyword, request.location);
    let report = pipeline
        .run(&keyword, &request.location, max_results, mode)
        .await;

    Ok(warp::reply::json(&ApiResponse {
        success: true,
        message: format!("Found {} results", report.len()),
        total: Some(report.len()),
        results: Some(report),
    }))
}

/// Maps rejections to JSON error bodies.
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(InvalidRequest(reason)) = err.find::<InvalidRequest>() {
        (StatusCode::BAD_REQUEST, reason.clone())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if err.find::<ApiError>().is_some() {
        (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
    } else {
        (StatusCode::BAD_REQUEST, "Bad request".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::error(&message)),
        status,
    ))
}
