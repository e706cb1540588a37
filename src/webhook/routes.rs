//! HTTP surface: WhatsApp webhook, health check, onboarding status.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::workflow::onboarding::{OnboardingRouteState, onboarding_routes};

use super::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<Dispatcher>,
}

/// POST /webhooks/whatsapp
///
/// Always answers 200 with a `{reply}` body, including for bodies that are
/// not valid JSON.
async fn whatsapp_webhook(State(state): State<WebhookState>, body: Bytes) -> impl IntoResponse {
    let body = String::from_utf8_lossy(&body);
    Json(state.dispatcher.dispatch_raw(&body).await)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "bettermeals-agent"
    }))
}

/// Full application router.
pub fn app_router(dispatcher: Arc<Dispatcher>) -> Router {
    let onboarding = onboarding_routes(OnboardingRouteState {
        service: Arc::clone(dispatcher.onboarding()),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/webhooks/whatsapp", post(whatsapp_webhook))
        .route("/health", get(health))
        .with_state(WebhookState { dispatcher })
        .merge(onboarding)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
