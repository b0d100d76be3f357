//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::runner::{InstanceStatus, StatusSource};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub started_at: DateTime<Utc>,
    pub instances: RwLock<Vec<StatusSource>>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            instances: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, source: StatusSource) {
        self.instances.write().await.push(source);
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub uptime_secs: i64,
    pub instances: Vec<InstanceStatus>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let instances = state.instances.read().await;
    Json(StatusResponse {
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        instances: instances.iter().map(StatusSource::snapshot).collect(),
    })
}

/// GET /api/status/:name
pub async fn get_instance_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<InstanceStatus>, StatusCode> {
    let instances = state.instances.read().await;
    instances
        .iter()
        .find(|s| s.name() == name)
        .map(|s| Json(s.snapshot()))
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
