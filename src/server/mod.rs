//! Dashboard REST + WebSocket Server
//!
//! Axum router for the operator surface: live call control over the
//! WebSocket hub and REST for agents, access lists, calls and tasks.

pub mod ws;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::access::AccessStore;
use crate::agents::{AgentRegistry, SECURITY_AGENT_NAME};
use crate::ai::ModelChoice;
use crate::call::{DashboardEvent, SupervisorCommand};
use crate::config::AppConfig;
use crate::db;
use crate::sip::SipUserAgent;

/// Handle to the supervisor of the currently active call
pub struct ActiveCallHandle {
    pub caller_id: String,
    pub agent: String,
    pub commands: mpsc::Sender<SupervisorCommand>,
}

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: SqlitePool,
    pub access: Arc<AccessStore>,
    pub registry: Arc<AgentRegistry>,
    pub sip: Arc<SipUserAgent>,
    pub events: broadcast::Sender<DashboardEvent>,
    pub active_call: Arc<RwLock<Option<ActiveCallHandle>>>,
    pub default_model: Arc<std::sync::RwLock<ModelChoice>>,
}

impl AppState {
    /// Snapshot for the initial dashboard message and `/api/status`
    pub async fn status_event(&self) -> DashboardEvent {
        let active = self.active_call.read().await;
        DashboardEvent::Status {
            sip_registered: self.sip.is_registered().await,
            call_active: active.is_some(),
            caller_id: active.as_ref().map(|c| c.caller_id.clone()),
            active_agent: active.as_ref().map(|c| c.agent.clone()),
            available_agents: self.registry.names(),
            current_model: self
                .default_model
                .read()
                .expect("model lock poisoned")
                .to_string(),
        }
    }
}

/// Create the Axum router with the dashboard surface
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        // Call control
        .route("/api/call/hangup", post(hangup_call))
        .route("/api/ai/mute", post(mute_ai))
        .route("/api/ai/unmute", post(unmute_ai))
        // Agents and model
        .route("/api/agents", get(get_agents))
        .route("/api/agents/switch", post(switch_agent))
        .route("/api/model", get(get_model).post(set_model))
        // Tasks
        .route("/api/tasks", get(get_tasks))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}/cancel", post(cancel_task))
        // Access lists
        .route("/api/blacklist", get(get_blacklist).post(add_blacklist))
        .route("/api/blacklist/{caller_id}", delete(remove_blacklist))
        .route("/api/whitelist", get(get_whitelist).post(add_whitelist))
        .route("/api/whitelist/{caller_id}", delete(remove_whitelist))
        // Call history
        .route("/api/calls", get(get_calls))
        .route("/api/calls/{id}", get(get_call))
        // Dashboard live feed
        .route("/ws", get(ws::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "running",
        "sip_registered": state.sip.is_registered().await,
        "call_active": state.active_call.read().await.is_some(),
    }))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let active = state.active_call.read().await;
    Json(serde_json::json!({
        "sip": {
            "registered": state.sip.is_registered().await,
            "server": state.config.sip.server,
            "user": state.config.sip.username,
            "in_call": active.is_some(),
            "caller_id": active.as_ref().map(|c| c.caller_id.clone()),
        },
        "ai": {
            "model": state.default_model.read().expect("model lock poisoned").to_string(),
        },
        "agent": {
            "active": active.as_ref().map(|c| c.agent.clone()),
            "available": state.registry.names(),
        },
    }))
}

async fn hangup_call(State(state): State<AppState>) -> StatusCode {
    ws::dispatch_command(&state, ws::DashboardCommand::Hangup).await;
    StatusCode::OK
}

async fn mute_ai(State(state): State<AppState>) -> StatusCode {
    ws::dispatch_command(&state, ws::DashboardCommand::MuteAi).await;
    StatusCode::OK
}

async fn unmute_ai(State(state): State<AppState>) -> StatusCode {
    ws::dispatch_command(&state, ws::DashboardCommand::UnmuteAi).await;
    StatusCode::OK
}

async fn get_agents(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "agents": state.registry.infos() }))
}

#[derive(Deserialize)]
struct SwitchAgentBody {
    agent_name: String,
}

async fn switch_agent(
    State(state): State<AppState>,
    Json(body): Json<SwitchAgentBody>,
) -> Result<StatusCode, (StatusCode, String)> {
    if body.agent_name == SECURITY_AGENT_NAME {
        return Err((
            StatusCode::BAD_REQUEST,
            "the security gate cannot be a switch target".to_string(),
        ));
    }
    if state.registry.get(&body.agent_name).is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("unknown agent: {}", body.agent_name),
        ));
    }
    ws::dispatch_command(
        &state,
        ws::DashboardCommand::SwitchAgent {
            agent_name: body.agent_name,
        },
    )
    .await;
    Ok(StatusCode::OK)
}

async fn get_model(State(state): State<AppState>) -> Json<serde_json::Value> {
    let model = state.default_model.read().expect("model lock poisoned");
    Json(serde_json::json!({ "model": model.to_string() }))
}

#[derive(Deserialize)]
struct SetModelBody {
    model: String,
}

async fn set_model(
    State(state): State<AppState>,
    Json(body): Json<SetModelBody>,
) -> Result<StatusCode, (StatusCode, String)> {
    let choice = ModelChoice::parse(&body.model)
        .ok_or((StatusCode::BAD_REQUEST, format!("unknown model: {}", body.model)))?;
    *state.default_model.write().expect("model lock poisoned") = choice;
    ws::publish(
        &state.events,
        DashboardEvent::ModelChanged {
            model: choice.to_string(),
        },
    );
    Ok(StatusCode::OK)
}

async fn get_tasks(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    let tasks = db::tasks::list(&state.pool)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::json!({ "tasks": tasks })))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let task = db::tasks::get_by_id(&state.pool, &id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(serde_json::json!(task)))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let cancelled = db::tasks::cancel(&state.pool, &id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if cancelled {
        Ok(StatusCode::OK)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn get_blacklist(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let entries = state
        .access
        .blacklist()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::json!({ "blacklist": entries })))
}

#[derive(Deserialize)]
struct AccessBody {
    caller_id: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

async fn add_blacklist(
    State(state): State<AppState>,
    Json(body): Json<AccessBody>,
) -> Result<StatusCode, StatusCode> {
    state
        .access
        .add_to_blacklist(&body.caller_id, body.reason.as_deref().unwrap_or("manual"))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    ws::publish(&state.events, DashboardEvent::BlacklistUpdated {});
    Ok(StatusCode::OK)
}

async fn remove_blacklist(
    State(state): State<AppState>,
    Path(caller_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let removed = state
        .access
        .remove_from_blacklist(&caller_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if removed {
        ws::publish(&state.events, DashboardEvent::BlacklistUpdated {});
        Ok(StatusCode::OK)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn get_whitelist(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let entries = state
        .access
        .whitelist()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::json!({ "whitelist": entries })))
}

async fn add_whitelist(
    State(state): State<AppState>,
    Json(body): Json<AccessBody>,
) -> Result<StatusCode, StatusCode> {
    state
        .access
        .add_to_whitelist(&body.caller_id, body.note.as_deref())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    ws::publish(&state.events, DashboardEvent::WhitelistUpdated {});
    Ok(StatusCode::OK)
}

async fn remove_whitelist(
    State(state): State<AppState>,
    Path(caller_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let removed = state
        .access
        .remove_from_whitelist(&caller_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if removed {
        ws::publish(&state.events, DashboardEvent::WhitelistUpdated {});
        Ok(StatusCode::OK)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn get_calls(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    let calls = db::calls::list_recent(&state.pool, 100)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::json!({ "calls": calls })))
}

async fn get_call(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let call = db::calls::get_by_id(&state.pool, &id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(serde_json::json!({
        "call": call,
        "transcript": call.transcript_lines(),
    })))
}
