//! Metric query handlers.
//!
//! Query parameters use the console's camelCase names (`pageIndex`,
//! `startTime`, `viewMode`, ...).

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use sluice_metrics::{MetricQuery, QueryError, ResourceQuery};

use crate::ApiState;
use crate::response::{ApiResponse, error_response};

fn query_error(err: QueryError) -> Response {
    let status = match err {
        QueryError::Invalid(_) => StatusCode::BAD_REQUEST,
        QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&err.to_string(), status).into_response()
}

fn rejected(rejection: QueryRejection) -> Response {
    error_response(&rejection.body_text(), StatusCode::BAD_REQUEST).into_response()
}

/// GET /metric/queryTopResourceMetric.json
pub async fn query_top_resource_metric(
    State(state): State<ApiState>,
    params: Result<Query<MetricQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match params {
        Ok(params) => params,
        Err(rejection) => return rejected(rejection),
    };
    match state.aggregator.query_top_resource_metric(&query) {
        Ok(page) => ApiResponse::ok(page).into_response(),
        Err(e) => query_error(e),
    }
}

/// GET /metric/queryByViewMode.json
pub async fn query_by_view_mode(
    State(state): State<ApiState>,
    params: Result<Query<MetricQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match params {
        Ok(params) => params,
        Err(rejection) => return rejected(rejection),
    };
    match state.aggregator.query_by_view_mode(&query) {
        Ok(page) => ApiResponse::ok(page).into_response(),
        Err(e) => query_error(e),
    }
}

/// GET /metric/queryByAppAndResource.json
pub async fn query_by_app_and_resource(
    State(state): State<ApiState>,
    params: Result<Query<ResourceQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match params {
        Ok(params) => params,
        Err(rejection) => return rejected(rejection),
    };
    match state.aggregator.query_by_app_and_resource(&query) {
        Ok(samples) => ApiResponse::ok(samples).into_response(),
        Err(e) => query_error(e),
    }
}
