//! HTTP routes
//!
//! One unauthenticated token endpoint, a websocket snapshot stream, and
//! the action endpoints from the external-interfaces surface: kill
//! primitives, paranoid mode, rules CRUD, alert pending/decide/settings,
//! and factory reset.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use portwatch_core::types::{AlertSettings, RuleAction, Scope};
use portwatch_enforcement::EnforcementOutcome;
use portwatch_rules::NewRule;
use serde::Deserialize;
use std::str::FromStr;

use crate::auth::{issue_token, AuthToken};
use crate::state::AppState;
use crate::websocket::snapshot_stream;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/token", get(issue_token))
        .route("/ws/snapshot", get(snapshot_stream))
        .route("/api/actions/stop/:pid", post(stop))
        .route("/api/actions/kill/:pid", post(kill))
        .route("/api/actions/kill_group/:pid", post(kill_group))
        .route("/api/actions/kill_tree/:pid", post(kill_tree))
        .route("/api/paranoid", post(set_paranoid))
        .route("/api/kills/clear", post(clear_killed_history))
        .route("/api/rules", get(list_rules).post(create_rule))
        .route("/api/rules/:id", axum::routing::delete(delete_rule))
        .route("/api/alerts/pending", get(pending_alerts))
        .route("/api/alerts/:id/decide", post(decide_alert))
        .route(
            "/api/alerts/settings",
            get(get_alert_settings).post(set_alert_settings),
        )
        .route("/api/alerts/clear_cache", post(clear_alert_cache))
        .route("/api/alerts/test", post(test_notification))
        .route("/api/factory_reset", post(factory_reset))
        .with_state(state)
}

fn outcome_response(pid: u32, outcome: EnforcementOutcome) -> Response {
    match outcome {
        EnforcementOutcome::Ok => {
            (StatusCode::OK, Json(serde_json::json!({"ok": true, "pid": pid}))).into_response()
        }
        EnforcementOutcome::Protected => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"ok": false, "pid": pid, "error": "protected"})),
        )
            .into_response(),
        EnforcementOutcome::PermissionDenied => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"ok": false, "pid": pid, "error": "permission denied"})),
        )
            .into_response(),
        EnforcementOutcome::NotFound => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"ok": false, "pid": pid, "error": "not found"})),
        )
            .into_response(),
        EnforcementOutcome::Error(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"ok": false, "pid": pid, "error": e})),
        )
            .into_response(),
    }
}

async fn stop(_auth: AuthToken, State(state): State<AppState>, Path(pid): Path<u32>) -> Response {
    outcome_response(pid, state.orchestrator.enforcement().stop(pid))
}

async fn kill(_auth: AuthToken, State(state): State<AppState>, Path(pid): Path<u32>) -> Response {
    outcome_response(pid, state.orchestrator.enforcement().kill(pid))
}

async fn kill_group(_auth: AuthToken, State(state): State<AppState>, Path(pid): Path<u32>) -> Response {
    outcome_response(pid, state.orchestrator.enforcement().kill_group(pid))
}

async fn kill_tree(_auth: AuthToken, State(state): State<AppState>, Path(pid): Path<u32>) -> Response {
    outcome_response(pid, state.orchestrator.enforcement().kill_tree(pid))
}

#[derive(Deserialize)]
struct SetParanoid {
    enabled: bool,
}

async fn set_paranoid(
    _auth: AuthToken,
    State(state): State<AppState>,
    Json(body): Json<SetParanoid>,
) -> impl IntoResponse {
    state.orchestrator.set_paranoid(body.enabled);
    Json(serde_json::json!({"ok": true, "paranoid": body.enabled}))
}

async fn clear_killed_history(_auth: AuthToken, State(state): State<AppState>) -> impl IntoResponse {
    state.orchestrator.clear_killed_history();
    Json(serde_json::json!({"ok": true}))
}

async fn list_rules(_auth: AuthToken, State(state): State<AppState>) -> Response {
    match state.orchestrator.rules().list(false).await {
        Ok(rules) => Json(rules).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct CreateRuleRequest {
    process: String,
    destination: String,
    action: String,
    scope: String,
    port: Option<u16>,
    protocol: Option<String>,
    exe_path: Option<String>,
    exe_hash: Option<String>,
    ttl_hours: Option<i64>,
    user_comment: Option<String>,
}

async fn create_rule(
    _auth: AuthToken,
    State(state): State<AppState>,
    Json(req): Json<CreateRuleRequest>,
) -> Response {
    let action = match RuleAction::from_str(&req.action) {
        Ok(a) => a,
        Err(_) => return bad_request("invalid rule action"),
    };
    let scope = match Scope::from_str(&req.scope) {
        Ok(s) => s,
        Err(_) => return bad_request("invalid rule scope"),
    };

    let new_rule = NewRule {
        process: req.process,
        destination: req.destination,
        action,
        scope,
        port: req.port,
        protocol: req.protocol,
        exe_path: req.exe_path,
        exe_hash: req.exe_hash,
        ttl_hours: req.ttl_hours,
        user_comment: req.user_comment,
        context: None,
    };

    match state.orchestrator.rules().create(new_rule).await {
        Ok(id) => Json(serde_json::json!({"ok": true, "id": id})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_rule(_auth: AuthToken, State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.orchestrator.rules().delete(&id).await {
        Ok(()) => Json(serde_json::json!({"ok": true})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn pending_alerts(_auth: AuthToken, State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.alerts().pending_alerts())
}

#[derive(Deserialize)]
struct DecideRequest {
    action: String,
    scope: String,
}

async fn decide_alert(
    _auth: AuthToken,
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
    Json(req): Json<DecideRequest>,
) -> Response {
    let action = match RuleAction::from_str(&req.action) {
        Ok(a) => a,
        Err(_) => return bad_request("invalid action"),
    };
    let scope = match Scope::from_str(&req.scope) {
        Ok(s) => s,
        Err(_) => return bad_request("invalid scope"),
    };

    match state.orchestrator.decide_alert(&alert_id, action, scope).await {
        Ok(found) => Json(serde_json::json!({"ok": found})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_alert_settings(_auth: AuthToken, State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.alerts().settings())
}

async fn set_alert_settings(
    _auth: AuthToken,
    State(state): State<AppState>,
    Json(settings): Json<AlertSettings>,
) -> impl IntoResponse {
    state.orchestrator.alerts().set_settings(settings);
    Json(serde_json::json!({"ok": true}))
}

async fn clear_alert_cache(_auth: AuthToken, State(state): State<AppState>) -> impl IntoResponse {
    state.orchestrator.alerts().clear_cache();
    Json(serde_json::json!({"ok": true}))
}

async fn test_notification(_auth: AuthToken, State(state): State<AppState>) -> impl IntoResponse {
    state.orchestrator.alerts().test_notification().await;
    Json(serde_json::json!({"ok": true}))
}

async fn factory_reset(_auth: AuthToken, State(state): State<AppState>) -> Response {
    match state.orchestrator.factory_reset().await {
        Ok(()) => Json(serde_json::json!({"ok": true})).into_response(),
        Err(e) => error_response(e),
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({"ok": false, "error": message}))).into_response()
}

fn error_response(err: portwatch_core::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"ok": false, "error": err.to_string()})),
    )
        .into_response()
}
