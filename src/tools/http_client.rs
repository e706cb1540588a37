//! HTTP client for the BetterMeals backend.
//!
//! Every call is a single attempt. Failures surface as `ToolError::Backend`
//! and are never retried.

use std::time::Duration;

use crate::error::ToolError;
use crate::tools::ToolsMode;

/// Client for the product API (`bm_api_base`) and the meal-plan backend
/// (`bm_backend_api_base`).
pub struct BackendClient {
    http: reqwest::Client,
    api_base: String,
    backend_api_base: String,
    mode: ToolsMode,
}

impl BackendClient {
    pub fn new(api_base: &str, backend_api_base: &str, mode: ToolsMode) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            backend_api_base: backend_api_base.trim_end_matches('/').to_string(),
            mode,
        }
    }

    /// A client that never touches the network.
    pub fn stub() -> Self {
        Self::new(
            crate::config::DEFAULT_BM_API_BASE,
            crate::config::DEFAULT_BM_API_BASE,
            ToolsMode::Stub,
        )
    }

    pub fn mode(&self) -> ToolsMode {
        self.mode
    }

    pub fn is_live(&self) -> bool {
        self.mode == ToolsMode::Live
    }

    /// POST a JSON body to `{api_base}{path}`.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let url = format!("{}{}", self.api_base, path);
        self.send(&url, self.http.post(&url).json(body)).await
    }

    /// GET `{api_base}{path}` with query parameters.
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<serde_json::Value, ToolError> {
        let url = format!("{}{}", self.api_base, path);
        self.send(&url, self.http.get(&url).query(query)).await
    }

    /// Ask the meal-plan backend to generate this week's plan for a household.
    ///
    /// Returns `None` without any request in stub mode.
    pub async fn generate_weekly_meal_plan(
        &self,
        household_id: &str,
    ) -> Result<Option<serde_json::Value>, ToolError> {
        if !self.is_live() {
            tracing::debug!(household_id, "Skipping meal plan generation in stub mode");
            return Ok(None);
        }
        let url = format!(
            "{}/api/v1/athena/weekly-meal-plan/{}",
            self.backend_api_base, household_id
        );
        let plan = self
            .send(&url, self.http.get(&url).timeout(Duration::from_secs(10)))
            .await?;
        Ok(Some(plan))
    }

    async fn send(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, ToolError> {
        let backend_error = |reason: String| ToolError::Backend {
            url: url.to_string(),
            reason,
        };
        let resp = request.send().await.map_err(|e| {
            tracing::warn!(url, "Backend request failed: {}", e);
            backend_error(e.to_string())
        })?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "Backend returned an error status");
            return Err(backend_error(format!("HTTP {status}")));
        }
        resp.json()
            .await
            .map_err(|e| backend_error(format!("invalid JSON body: {e}")))
    }
}
