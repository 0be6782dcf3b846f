use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

const DEGRADED_AFTER: usize = 5;
const UNAVAILABLE_AFTER: usize = 10;

/// Ingestion progress, shared with the health endpoint
#[derive(Clone, Default)]
pub struct HealthState {
    pub last_date: Arc<RwLock<Option<NaiveDate>>>,
    pub last_success: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub matches_upserted: Arc<RwLock<usize>>,
    pub consecutive_errors: Arc<RwLock<usize>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_day(&self, date: NaiveDate, matches: usize) {
        *self.last_date.write().await = Some(date);
        *self.last_success.write().await = Some(Utc::now());
        *self.matches_upserted.write().await += matches;
        *self.consecutive_errors.write().await = 0;
    }

    pub async fn record_error(&self) {
        *self.consecutive_errors.write().await += 1;
    }

    pub async fn report(&self) -> (StatusCode, Value) {
        let last_date = *self.last_date.read().await;
        let last_success = *self.last_success.read().await;
        let matches = *self.matches_upserted.read().await;
        let errors = *self.consecutive_errors.read().await;

        let status = if errors > DEGRADED_AFTER { "degraded" } else { "ok" };
        let http_status = if errors > UNAVAILABLE_AFTER {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };

        (
            http_status,
            json!({
                "service": "tennis-ingestion",
                "version": env!("CARGO_PKG_VERSION"),
                "status": status,
                "last_date": last_date.map(|d| d.to_string()),
                "last_success": last_success.map(|t| t.to_rfc3339()),
                "matches_upserted": matches,
                "consecutive_errors": errors
            }),
        )
    }
}

async fn health_handler(State(health): State<HealthState>) -> (StatusCode, Json<Value>) {
    let (status, body) = health.report().await;
    (status, Json(body))
}

pub fn router(health: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(health)
}
