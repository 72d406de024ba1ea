//! Registry and application handlers.
//!
//! Heartbeats write to the `AppRegistry`; everything else reads snapshots.

use axum::Form;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use sluice_registry::{Heartbeat, InstanceView};

use crate::ApiState;
use crate::response::{ApiResponse, error_response};

// ── Heartbeats ─────────────────────────────────────────────────

/// GET /registry/machine
pub async fn receive_heartbeat(
    State(state): State<ApiState>,
    params: Result<Query<Heartbeat>, QueryRejection>,
) -> impl IntoResponse {
    match params {
        Ok(Query(heartbeat)) => register(&state, heartbeat),
        Err(rejection) => {
            error_response(&rejection.body_text(), StatusCode::BAD_REQUEST).into_response()
        }
    }
}

/// POST /registry/machine
///
/// Reads a form-encoded body; fields missing from the body are taken from
/// the query string. Bodies of any other content type are ignored.
pub async fn receive_heartbeat_form(
    State(state): State<ApiState>,
    params: Result<Query<Heartbeat>, QueryRejection>,
    body: Result<Form<Heartbeat>, FormRejection>,
) -> impl IntoResponse {
    let Query(query) = match params {
        Ok(params) => params,
        Err(rejection) => {
            return error_response(&rejection.body_text(), StatusCode::BAD_REQUEST).into_response();
        }
    };
    let heartbeat = match body {
        Ok(Form(body)) => merge_heartbeat(body, query),
        Err(FormRejection::InvalidFormContentType(_)) => query,
        Err(rejection) => {
            return error_response(&rejection.body_text(), StatusCode::BAD_REQUEST).into_response();
        }
    };
    register(&state, heartbeat)
}

fn register(state: &ApiState, heartbeat: Heartbeat) -> Response {
    let ip = heartbeat.ip.clone().unwrap_or_default();
    match state.registry.register_heartbeat(heartbeat) {
        Ok(_) => ApiResponse::ok("success").into_response(),
        Err(e) => {
            warn!(ip = %ip, error = %e, "rejected heartbeat");
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
    }
}

/// Body fields win over query fields.
fn merge_heartbeat(body: Heartbeat, query: Heartbeat) -> Heartbeat {
    Heartbeat {
        app: body.app.or(query.app),
        app_type: body.app_type.or(query.app_type),
        heartbeat_version: body.heartbeat_version.or(query.heartbeat_version),
        client_version: body.client_version.or(query.client_version),
        hostname: body.hostname.or(query.hostname),
        ip: body.ip.or(query.ip),
        port: body.port.or(query.port),
        domain: body.domain.or(query.domain),
        name: body.name.or(query.name),
    }
}

// ── Applications ───────────────────────────────────────────────

/// GET /app/names.json
pub async fn list_app_names(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.registry.list_app_names())
}

/// GET /app/briefinfos.json
pub async fn list_app_briefs(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.registry.app_briefs())
}

/// GET /app/:app/machines.json
///
/// Unknown applications list no instances.
pub async fn list_machines(
    State(state): State<ApiState>,
    Path(app): Path<String>,
) -> impl IntoResponse {
    let instances: Vec<InstanceView> = state
        .registry
        .get_app(&app)
        .map(|entry| entry.sorted_instances())
        .unwrap_or_default();
    ApiResponse::ok(instances)
}

/// Query parameters of the remove endpoint.
#[derive(Debug, Deserialize)]
pub struct RemoveParams {
    pub ip: Option<String>,
    pub port: Option<i32>,
}

/// POST /app/:app/machine/remove.json
pub async fn remove_machine(
    State(state): State<ApiState>,
    Path(app): Path<String>,
    params: Result<Query<RemoveParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            return error_response(&rejection.body_text(), StatusCode::BAD_REQUEST).into_response();
        }
    };
    let Some(ip) = params.ip.filter(|ip| !ip.trim().is_empty()) else {
        return error_response("ip can't be null or empty", StatusCode::BAD_REQUEST).into_response();
    };
    let Some(port) = params.port else {
        return error_response("port can't be null", StatusCode::BAD_REQUEST).into_response();
    };

    let removed = state.registry.remove_instance(&app, &ip, port);
    debug!(app = %app, ip = %ip, port, removed, "remove machine");
    ApiResponse::ok(serde_json::json!({ "removed": removed })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sluice_core::{DashboardSettings, ManualClock, SettingsHandle};
    use sluice_metrics::{InMemoryMetricsRepository, MetricsAggregator};
    use sluice_registry::{AppRegistry, Liveness};

    const NOW: i64 = 1_700_000_000_000;

    fn test_state() -> ApiState {
        let clock = ManualClock::new(NOW);
        let settings = SettingsHandle::new(DashboardSettings::default());
        let registry = AppRegistry::new(Liveness::new(clock.clone(), settings.clone()));
        let store = InMemoryMetricsRepository::new(clock.clone(), settings);
        ApiState {
            registry,
            aggregator: Arc::new(MetricsAggregator::new(Arc::new(store), clock)),
        }
    }

    fn heartbeat(app: &str, ip: &str, port: i32) -> Query<Heartbeat> {
        Query(Heartbeat {
            app: Some(app.into()),
            ip: Some(ip.into()),
            port: Some(port),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn heartbeat_registers_instance() {
        let state = test_state();
        let resp = receive_heartbeat(State(state.clone()), Ok(heartbeat("orders", "10.0.0.1", 8719)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.registry.list_app_names(), vec!["orders"]);
    }

    #[tokio::test]
    async fn unassigned_port_is_rejected() {
        let state = test_state();
        let resp = receive_heartbeat(State(state.clone()), Ok(heartbeat("orders", "10.0.0.1", -1)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.registry.list_app_names().is_empty());
    }

    #[tokio::test]
    async fn form_heartbeat_registers_instance() {
        let state = test_state();
        let Query(body) = heartbeat("orders", "10.0.0.1", 8719);
        let resp = receive_heartbeat_form(
            State(state.clone()),
            Ok(Query(Heartbeat::default())),
            Ok(Form(body)),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let entry = state.registry.get_app("orders").unwrap();
        assert!(entry.get_instance("10.0.0.1", 8719).is_some());
    }

    #[test]
    fn body_fields_override_query_fields() {
        let Query(query) = heartbeat("orders", "10.0.0.1", 8719);
        let body = Heartbeat {
            port: Some(8720),
            hostname: Some("box-1".into()),
            ..Default::default()
        };
        let merged = merge_heartbeat(body, query);
        assert_eq!(merged.app.as_deref(), Some("orders"));
        assert_eq!(merged.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(merged.port, Some(8720));
        assert_eq!(merged.hostname.as_deref(), Some("box-1"));
    }

    #[tokio::test]
    async fn machines_of_unknown_app_are_empty() {
        let state = test_state();
        let resp = list_machines(State(state), Path("nobody".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn remove_requires_ip_and_port() {
        let state = test_state();
        let resp = remove_machine(
            State(state.clone()),
            Path("orders".to_string()),
            Ok(Query(RemoveParams {
                ip: None,
                port: Some(8719),
            })),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = remove_machine(
            State(state),
            Path("orders".to_string()),
            Ok(Query(RemoveParams {
                ip: Some("10.0.0.1".into()),
                port: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn remove_drops_instance() {
        let state = test_state();
        receive_heartbeat(State(state.clone()), Ok(heartbeat("orders", "10.0.0.1", 8719))).await;

        let resp = remove_machine(
            State(state.clone()),
            Path("orders".to_string()),
            Ok(Query(RemoveParams {
                ip: Some("10.0.0.1".into()),
                port: Some(8719),
            })),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let entry = state.registry.get_app("orders").unwrap();
        assert!(entry.get_instances().is_empty());
    }
}
