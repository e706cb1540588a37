//! Cart, substitution, checkout and order-status tools.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::tools::http_client::BackendClient;
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

/// `(name, quantity, price)` for the canned cart.
const CANNED_CART: &[(&str, &str, Decimal)] = &[
    ("Chicken Breast", "2 lbs", dec!(12.99)),
    ("Rice", "1 bag", dec!(3.49)),
    ("Broccoli", "1 head", dec!(2.99)),
];

fn canned_cart_total() -> Decimal {
    CANNED_CART.iter().map(|(_, _, price)| *price).sum()
}

/// Prices go out as JSON numbers, the way the backend sends them.
fn price(value: Decimal) -> serde_json::Value {
    serde_json::Value::from(value.to_string().parse::<f64>().unwrap_or_default())
}

/// `bm_build_cart`: grocery cart from a meal plan.
pub struct BuildCartTool {
    client: Arc<BackendClient>,
}

impl BuildCartTool {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for BuildCartTool {
    fn name(&self) -> &str {
        "bm_build_cart"
    }

    fn description(&self) -> &str {
        "Create a grocery cart from a meal plan."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "household_id": {"type": "string"},
                "meal_plan_id": {"type": "string"}
            },
            "required": ["household_id", "meal_plan_id"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let household_id = require_str(&params, self.name(), "household_id")?;
        let meal_plan_id = require_str(&params, self.name(), "meal_plan_id")?;

        let result = if self.client.is_live() {
            self.client
                .post_json(
                    "/orders/build_cart",
                    &serde_json::json!({"household_id": household_id, "meal_plan_id": meal_plan_id}),
                )
                .await?
        } else {
            let items: Vec<serde_json::Value> = CANNED_CART
                .iter()
                .map(|(name, quantity, p)| {
                    serde_json::json!({"name": name, "quantity": quantity, "price": price(*p)})
                })
                .collect();
            serde_json::json!({
                "success": true,
                "cart_id": Uuid::new_v4().to_string(),
                "household_id": household_id,
                "meal_plan_id": meal_plan_id,
                "items": items,
                "total": price(canned_cart_total()),
                "created_at": Utc::now().to_rfc3339(),
                "message": "Cart built successfully from meal plan"
            })
        };
        Ok(ToolOutput::success(result, started))
    }
}

/// `bm_substitute`: swap one cart item for another.
pub struct SubstituteTool {
    client: Arc<BackendClient>,
}

impl SubstituteTool {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for SubstituteTool {
    fn name(&self) -> &str {
        "bm_substitute"
    }

    fn description(&self) -> &str {
        "Propose or accept a substitution of one item in a cart."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "cart_id": {"type": "string"},
                "original": {"type": "string", "description": "Item being replaced"},
                "chosen": {"type": "string", "description": "Replacement item"}
            },
            "required": ["cart_id", "original", "chosen"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let cart_id = require_str(&params, self.name(), "cart_id")?;
        let original = require_str(&params, self.name(), "original")?;
        let chosen = require_str(&params, self.name(), "chosen")?;

        let result = if self.client.is_live() {
            self.client
                .post_json(
                    "/orders/substitute",
                    &serde_json::json!({"cart_id": cart_id, "original": original, "chosen": chosen}),
                )
                .await?
        } else {
            serde_json::json!({
                "success": true,
                "cart_id": cart_id,
                "original": original,
                "chosen": chosen,
                "price_difference": price(dec!(0.50)),
                "updated_at": Utc::now().to_rfc3339(),
                "message": format!("Substituted {original} with {chosen}")
            })
        };
        Ok(ToolOutput::success(result, started))
    }
}

/// `bm_checkout`: place the order. The idempotency key guards against
/// duplicate charges on retried requests.
pub struct CheckoutTool {
    client: Arc<BackendClient>,
}

impl CheckoutTool {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for CheckoutTool {
    fn name(&self) -> &str {
        "bm_checkout"
    }

    fn description(&self) -> &str {
        "Checkout a cart using an idempotency key."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "cart_id": {"type": "string"},
                "idempotency_key": {"type": "string"}
            },
            "required": ["cart_id", "idempotency_key"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let cart_id = require_str(&params, self.name(), "cart_id")?;
        let idempotency_key = require_str(&params, self.name(), "idempotency_key")?;

        let result = if self.client.is_live() {
            self.client
                .post_json(
                    "/orders/checkout",
                    &serde_json::json!({"cart_id": cart_id, "idempotency_key": idempotency_key}),
                )
                .await?
        } else {
            let now = Utc::now();
            serde_json::json!({
                "success": true,
                "order_id": Uuid::new_v4().to_string(),
                "cart_id": cart_id,
                "idempotency_key": idempotency_key,
                "total": price(canned_cart_total()),
                "status": "created",
                "estimated_delivery": (now + Duration::days(2)).to_rfc3339(),
                "created_at": now.to_rfc3339(),
                "message": "Order placed successfully"
            })
        };
        Ok(ToolOutput::success(result, started))
    }
}

/// `bm_order_status`: progress and ETA of an order.
pub struct OrderStatusTool {
    client: Arc<BackendClient>,
}

impl OrderStatusTool {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for OrderStatusTool {
    fn name(&self) -> &str {
        "bm_order_status"
    }

    fn description(&self) -> &str {
        "Get order status (created/packed/delivered) and ETA."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"order_id": {"type": "string"}},
            "required": ["order_id"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let order_id = require_str(&params, self.name(), "order_id")?;

        let result = if self.client.is_live() {
            self.client
                .get_json("/orders/status", &[("order_id", order_id)])
                .await?
        } else {
            let now = Utc::now();
            serde_json::json!({
                "success": true,
                "order_id": order_id,
                "status": "packed",
                "progress": 75,
                "estimated_delivery": (now + Duration::hours(6)).to_rfc3339(),
                "tracking_info": {
                    "current_location": "Distribution Center",
                    "next_update": (now + Duration::hours(2)).to_rfc3339()
                },
                "last_updated": now.to_rfc3339(),
                "message": "Order is packed and ready for delivery"
            })
        };
        Ok(ToolOutput::success(result, started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub() -> Arc<BackendClient> {
        Arc::new(BackendClient::stub())
    }

    #[test]
    fn canned_total_matches_items() {
        assert_eq!(canned_cart_total(), dec!(19.47));
    }

    #[tokio::test]
    async fn build_cart_canned() {
        let tool = BuildCartTool::new(stub());
        let out = tool
            .execute(serde_json::json!({"household_id": "hh1", "meal_plan_id": "mp1"}))
            .await
            .unwrap();
        assert_eq!(out.result["items"].as_array().unwrap().len(), 3);
        assert_eq!(out.result["items"][0]["name"], "Chicken Breast");
        assert_eq!(out.result["items"][0]["price"], 12.99);
        assert_eq!(out.result["total"], 19.47);
    }

    #[tokio::test]
    async fn build_cart_requires_ids() {
        let tool = BuildCartTool::new(stub());
        let err = tool
            .execute(serde_json::json!({"household_id": "hh1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters { .. }));
    }

    #[tokio::test]
    async fn substitute_canned() {
        let tool = SubstituteTool::new(stub());
        let out = tool
            .execute(serde_json::json!({"cart_id": "c1", "original": "Rice", "chosen": "Quinoa"}))
            .await
            .unwrap();
        assert_eq!(out.result["price_difference"], 0.5);
        assert_eq!(out.result["message"], "Substituted Rice with Quinoa");
    }

    #[tokio::test]
    async fn checkout_and_status_canned() {
        let checkout = CheckoutTool::new(stub());
        let out = checkout
            .execute(serde_json::json!({"cart_id": "c1", "idempotency_key": "k1"}))
            .await
            .unwrap();
        assert_eq!(out.result["status"], "created");
        assert_eq!(out.result["idempotency_key"], "k1");

        let status = OrderStatusTool::new(stub());
        let out = status
            .execute(serde_json::json!({"order_id": "o1"}))
            .await
            .unwrap();
        assert_eq!(out.result["status"], "packed");
        assert_eq!(out.result["progress"], 75);
    }
}
