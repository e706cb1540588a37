//! Household and resident onboarding tools.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::tools::http_client::BackendClient;
use crate::tools::tool::{Tool, ToolError, ToolOutput, object_or_empty, require_str};

/// `bm_onboard_household`: create or update a household profile.
pub struct OnboardHouseholdTool {
    client: Arc<BackendClient>,
}

impl OnboardHouseholdTool {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for OnboardHouseholdTool {
    fn name(&self) -> &str {
        "bm_onboard_household"
    }

    fn description(&self) -> &str {
        "Create or update a household profile. Preferences include veg/non-veg, allergies and constraints."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "phone_hash": {"type": "string"},
                "preferences": {"type": "object"}
            },
            "required": ["phone_hash"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let phone_hash = require_str(&params, self.name(), "phone_hash")?;
        let preferences = object_or_empty(&params, "preferences");

        let result = if self.client.is_live() {
            self.client
                .post_json(
                    "/onboarding/household",
                    &serde_json::json!({"phone_hash": phone_hash, "preferences": preferences}),
                )
                .await?
        } else {
            serde_json::json!({
                "success": true,
                "household_id": Uuid::new_v4().to_string(),
                "phone_hash": phone_hash,
                "preferences": preferences,
                "created_at": Utc::now().to_rfc3339(),
                "message": "Household profile created successfully"
            })
        };
        Ok(ToolOutput::success(result, started))
    }
}

/// `bm_onboard_resident`: create or update a resident under a household.
pub struct OnboardResidentTool {
    client: Arc<BackendClient>,
}

impl OnboardResidentTool {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for OnboardResidentTool {
    fn name(&self) -> &str {
        "bm_onboard_resident"
    }

    fn description(&self) -> &str {
        "Create or update a resident profile under a household."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "household_id": {"type": "string"},
                "resident": {"type": "object"}
            },
            "required": ["household_id", "resident"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let household_id = require_str(&params, self.name(), "household_id")?;
        let resident = object_or_empty(&params, "resident");

        let result = if self.client.is_live() {
            self.client
                .post_json(
                    "/onboarding/resident",
                    &serde_json::json!({"household_id": household_id, "resident": resident}),
                )
                .await?
        } else {
            serde_json::json!({
                "success": true,
                "resident_id": Uuid::new_v4().to_string(),
                "household_id": household_id,
                "resident": resident,
                "created_at": Utc::now().to_rfc3339(),
                "message": "Resident profile created successfully"
            })
        };
        Ok(ToolOutput::success(result, started))
    }
}
