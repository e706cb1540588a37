//! REST endpoint for onboarding status.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use super::service::OnboardingService;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub service: Arc<OnboardingService>,
}

/// GET /api/onboarding/{phone}/status
///
/// Returns the reconstructed step and whether onboarding is completed.
async fn get_status(
    State(state): State<OnboardingRouteState>,
    Path(phone): Path<String>,
) -> impl IntoResponse {
    let step = state.service.get_current_step(&phone).await;
    Json(serde_json::json!({
        "phone_number": phone,
        "current_step": step,
        "completed": step.is_terminal(),
    }))
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/{phone}/status", get(get_status))
        .with_state(state)
}
