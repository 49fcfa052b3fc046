use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::aggregator::{CycleState, MiningAggregator};
use crate::cache::{CacheStatus, SnapshotCache};
use crate::chat::{ChatReply, ChatRequest, ChatService};
use crate::error::ProxyError;
use crate::metrics::metrics_handler;
use crate::presenter::{DashboardCards, DashboardHandle, DashboardView};
use crate::snapshot::RetrievalResult;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<MiningAggregator>,
    pub cache: Arc<SnapshotCache>,
    pub chat: Arc<ChatService>,
    pub dashboard: DashboardHandle,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/mining-proxy", get(mining_stats_handler))
        .route("/mining-proxy/refresh", post(refresh_handler))
        .route("/mining-proxy/cache", get(cache_status_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/ai-chat", post(chat_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(|| async { metrics_handler() }))
        .layer(cors)
        .with_state(state)
}

/// Errors reach clients as `{error, fallback: true}` so the UI can drop back
/// to canned content.
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::CreditsDepleted => StatusCode::PAYMENT_REQUIRED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": self.to_string(),
            "fallback": true,
        }));
        (status, body).into_response()
    }
}

async fn mining_stats_handler(State(state): State<AppState>) -> Json<RetrievalResult> {
    let result = state.cache.get_or_refresh(&state.aggregator).await;
    Json(result.as_ref().clone())
}

/// Forces a cycle through the dashboard poller so its view reflects the
/// refresh, and answers with the result it published.
async fn refresh_handler(State(state): State<AppState>) -> Result<Json<RetrievalResult>, ProxyError> {
    info!("Manual refresh requested over HTTP");
    match state.dashboard.refresh().await {
        Some(result) => Ok(Json(result.as_ref().clone())),
        None => {
            warn!("Dashboard poller is not running, refresh dropped");
            Err(ProxyError::Other("dashboard poller is not running".into()))
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Dashboard {
    #[serde(flatten)]
    view: DashboardView,
    cards: Option<DashboardCards>,
}

async fn dashboard_handler(State(state): State<AppState>) -> Json<Dashboard> {
    let view = state.dashboard.latest();
    let now = Utc::now().timestamp();
    let cards = view
        .result
        .as_deref()
        .map(|result| DashboardCards::from_result(result, now));
    Json(Dashboard { view, cards })
}

async fn cache_status_handler(State(state): State<AppState>) -> Json<CacheStatus> {
    Json(state.cache.status())
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ProxyError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected ai-chat body: {}", rejection.body_text());
        ProxyError::InvalidRequest(rejection.body_text())
    })?;
    match state.chat.respond(request).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            error!("Error in ai-chat: {}", e);
            Err(e)
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    cycle: CycleState,
    cache: CacheStatus,
}

async fn health_handler(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        cycle: state.aggregator.state(),
        cache: state.cache.status(),
    })
}
