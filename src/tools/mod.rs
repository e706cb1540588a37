//! Backend tools the conversational agent can call.
//!
//! Each tool mirrors one BetterMeals backend endpoint. In `stub` mode the
//! tools return canned payloads without any network traffic; in `live` mode
//! they call the backend through `BackendClient`.

pub mod http_client;
pub mod meals;
pub mod onboarding;
pub mod orders;
pub mod registry;
pub mod tool;

use std::str::FromStr;
use std::sync::Arc;

pub use http_client::BackendClient;
pub use registry::ToolRegistry;
pub use tool::*;

use crate::error::ConfigError;

/// Whether tools hit the real backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolsMode {
    #[default]
    Stub,
    Live,
}

impl FromStr for ToolsMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stub" | "mock" => Ok(Self::Stub),
            "live" => Ok(Self::Live),
            other => Err(ConfigError::InvalidValue {
                key: "tools_mode".to_string(),
                message: format!("unknown tools mode {other:?}, expected stub or live"),
            }),
        }
    }
}

/// Registry with every BetterMeals tool registered.
pub fn default_registry(client: Arc<BackendClient>) -> ToolRegistry {
    let registry = ToolRegistry::new();
    registry.register_sync(Arc::new(meals::RecommendMealsTool::new(Arc::clone(&client))));
    registry.register_sync(Arc::new(meals::ScoreMealPlanTool::new(Arc::clone(&client))));
    registry.register_sync(Arc::new(orders::BuildCartTool::new(Arc::clone(&client))));
    registry.register_sync(Arc::new(orders::SubstituteTool::new(Arc::clone(&client))));
    registry.register_sync(Arc::new(orders::CheckoutTool::new(Arc::clone(&client))));
    registry.register_sync(Arc::new(orders::OrderStatusTool::new(Arc::clone(&client))));
    registry.register_sync(Arc::new(onboarding::OnboardHouseholdTool::new(Arc::clone(
        &client,
    ))));
    registry.register_sync(Arc::new(onboarding::OnboardResidentTool::new(client)));
    registry
}
