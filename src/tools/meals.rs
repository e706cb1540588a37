//! Meal recommendation and scoring tools.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::tools::http_client::BackendClient;
use crate::tools::tool::{Tool, ToolError, ToolOutput, object_or_empty, require_str};

pub const DEFAULT_HOUSEHOLD: &str = "default_household";

/// `(day, [(meal type, name, calories)])` for the canned weekly plan.
const CANNED_WEEK: &[(&str, [(&str, &str, u32); 3])] = &[
    (
        "Monday",
        [
            ("breakfast", "Oatmeal with Berries", 320),
            ("lunch", "Grilled Chicken Salad", 450),
            ("dinner", "Salmon with Quinoa", 520),
        ],
    ),
    (
        "Tuesday",
        [
            ("breakfast", "Greek Yogurt Parfait", 280),
            ("lunch", "Turkey Wrap", 380),
            ("dinner", "Vegetable Stir Fry", 420),
        ],
    ),
    (
        "Wednesday",
        [
            ("breakfast", "Avocado Toast", 350),
            ("lunch", "Quinoa Buddha Bowl", 420),
            ("dinner", "Baked Cod with Sweet Potato", 480),
        ],
    ),
    (
        "Thursday",
        [
            ("breakfast", "Smoothie Bowl", 300),
            ("lunch", "Mediterranean Wrap", 400),
            ("dinner", "Chicken Tikka Masala", 550),
        ],
    ),
    (
        "Friday",
        [
            ("breakfast", "Pancakes with Maple Syrup", 380),
            ("lunch", "Caesar Salad", 350),
            ("dinner", "Grilled Steak with Asparagus", 520),
        ],
    ),
    (
        "Saturday",
        [
            ("breakfast", "Eggs Benedict", 450),
            ("lunch", "Fish Tacos", 420),
            ("dinner", "Pasta Primavera", 480),
        ],
    ),
    (
        "Sunday",
        [
            ("breakfast", "French Toast", 400),
            ("lunch", "Grilled Cheese Sandwich", 380),
            ("dinner", "Roast Chicken with Vegetables", 500),
        ],
    ),
];

fn canned_recommendations(household_id: &str, constraints: serde_json::Value) -> serde_json::Value {
    let recommendations: Vec<serde_json::Value> = CANNED_WEEK
        .iter()
        .map(|(day, meals)| {
            let meals: Vec<serde_json::Value> = meals
                .iter()
                .map(|(kind, name, calories)| {
                    serde_json::json!({"type": kind, "name": name, "calories": calories})
                })
                .collect();
            serde_json::json!({"day": day, "meals": meals})
        })
        .collect();

    serde_json::json!({
        "success": true,
        "meal_plan_id": Uuid::new_v4().to_string(),
        "household_id": household_id,
        "constraints": constraints,
        "recommendations": recommendations,
        "total_calories_per_day": 1290,
        "created_at": Utc::now().to_rfc3339(),
        "message": "Meal recommendations generated successfully"
    })
}

/// `bm_recommend_meals`: weekly meal plan for a household.
pub struct RecommendMealsTool {
    client: Arc<BackendClient>,
}

impl RecommendMealsTool {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for RecommendMealsTool {
    fn name(&self) -> &str {
        "bm_recommend_meals"
    }

    fn description(&self) -> &str {
        "Return a recommended weekly meal plan for a household given dietary constraints."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "household_id": {"type": "string", "description": "Household to plan for"},
                "constraints": {"type": "object", "description": "Dietary preferences, empty if none"}
            }
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let household_id = params
            .get("household_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_HOUSEHOLD);
        let constraints = object_or_empty(&params, "constraints");

        let result = if self.client.is_live() {
            self.client
                .post_json(
                    "/meals/weekly_recommendations",
                    &serde_json::json!({"household_id": household_id, "constraints": constraints}),
                )
                .await?
        } else {
            canned_recommendations(household_id, constraints)
        };
        Ok(ToolOutput::success(result, started))
    }
}

/// `bm_score_meal_plan`: nutrition scores for a meal plan.
pub struct ScoreMealPlanTool {
    client: Arc<BackendClient>,
}

impl ScoreMealPlanTool {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for ScoreMealPlanTool {
    fn name(&self) -> &str {
        "bm_score_meal_plan"
    }

    fn description(&self) -> &str {
        "Return nutrition, health and variety scores for a meal plan."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "meal_id": {"type": "string", "description": "Meal plan ID to score"},
                "metrics": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["meal_id"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let meal_id = require_str(&params, self.name(), "meal_id")?;
        let metrics = params
            .get("metrics")
            .filter(|v| v.is_array())
            .cloned()
            .unwrap_or_else(|| serde_json::json!([]));

        let result = if self.client.is_live() {
            self.client
                .post_json(
                    "/meals/score",
                    &serde_json::json!({"meal_id": meal_id, "metrics": metrics}),
                )
                .await?
        } else {
            serde_json::json!({
                "success": true,
                "meal_id": meal_id,
                "metrics": metrics,
                "scores": {
                    "nutrition_score": 8.5,
                    "health_score": 9.2,
                    "variety_score": 7.8,
                    "preference_match": 8.9,
                    "cost_efficiency": 7.5
                },
                "breakdown": {
                    "protein": {"score": 9.0, "percentage": 25},
                    "carbs": {"score": 8.0, "percentage": 45},
                    "fats": {"score": 8.5, "percentage": 30},
                    "fiber": {"score": 9.5, "percentage": 12},
                    "vitamins": {"score": 8.8, "percentage": 95}
                },
                "recommendations": [
                    "Consider adding more leafy greens for better vitamin K intake",
                    "Great protein variety across meals",
                    "Excellent fiber content for digestive health"
                ],
                "calculated_at": Utc::now().to_rfc3339(),
                "message": "Meal plan scored successfully"
            })
        };
        Ok(ToolOutput::success(result, started))
    }
}
