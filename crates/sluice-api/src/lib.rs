//! sluice-api — REST API for the Sluice console.
//!
//! Receives client heartbeats and serves the console's application and
//! metric queries. Every response is wrapped as
//! `{ "success": bool, "data": ..., "error": ... }`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/registry/machine` | Client heartbeat (query parameters) |
//! | POST | `/registry/machine` | Client heartbeat (form body, query fallback) |
//! | GET/POST | `/registry/instance` | Same as `/registry/machine` |
//! | GET | `/app/names.json` | Known application names |
//! | GET | `/app/briefinfos.json` | Per-application summaries |
//! | GET | `/app/{app}/machines.json` | Instances of one application |
//! | POST | `/app/{app}/machine/remove.json` | Remove one instance |
//! | GET | `/metric/queryTopResourceMetric.json` | Hottest resources with raw samples |
//! | GET | `/metric/queryByAppAndResource.json` | One resource, unpaged |
//! | GET | `/metric/queryByViewMode.json` | Aggregate or per-instance view |

pub mod handlers;
pub mod metric_handlers;
mod response;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sluice_metrics::MetricsAggregator;
use sluice_registry::AppRegistry;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: AppRegistry,
    pub aggregator: Arc<MetricsAggregator>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let registry_routes = Router::new()
        .route(
            "/machine",
            get(handlers::receive_heartbeat).post(handlers::receive_heartbeat_form),
        )
        .route(
            "/instance",
            get(handlers::receive_heartbeat).post(handlers::receive_heartbeat_form),
        );

    let app_routes = Router::new()
        .route("/names.json", get(handlers::list_app_names))
        .route("/briefinfos.json", get(handlers::list_app_briefs))
        .route("/{app}/machines.json", get(handlers::list_machines))
        .route(
            "/{app}/machine/remove.json",
            post(handlers::remove_machine).delete(handlers::remove_machine),
        );

    let metric_routes = Router::new()
        .route(
            "/queryTopResourceMetric.json",
            get(metric_handlers::query_top_resource_metric),
        )
        .route(
            "/queryByAppAndResource.json",
            get(metric_handlers::query_by_app_and_resource),
        )
        .route(
            "/queryByViewMode.json",
            get(metric_handlers::query_by_view_mode),
        );

    Router::new()
        .nest("/registry", registry_routes)
        .nest("/app", app_routes)
        .nest("/metric", metric_routes)
        .with_state(state)
}
