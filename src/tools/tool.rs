//! The `Tool` trait and helpers shared by tool implementations.

use std::time::{Duration, Instant};

use async_trait::async_trait;

pub use crate::error::ToolError;

/// Output of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub result: serde_json::Value,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(result: serde_json::Value, started: Instant) -> Self {
        Self {
            result,
            duration: started.elapsed(),
        }
    }
}

/// A capability exposed to the agent.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the accepted parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError>;
}

/// Extract a required string parameter.
pub fn require_str<'a>(
    params: &'a serde_json::Value,
    tool: &str,
    key: &str,
) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidParameters {
            name: tool.to_string(),
            reason: format!("missing required string parameter '{key}'"),
        })
}

/// Extract an optional object parameter, defaulting to `{}`.
pub fn object_or_empty(params: &serde_json::Value, key: &str) -> serde_json::Value {
    match params.get(key) {
        Some(v) if v.is_object() => v.clone(),
        _ => serde_json::json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_str_rejects_missing_and_empty() {
        let params = serde_json::json!({"cart_id": "c1", "empty": "", "num": 3});
        assert_eq!(require_str(&params, "t", "cart_id").unwrap(), "c1");
        assert!(require_str(&params, "t", "empty").is_err());
        assert!(require_str(&params, "t", "num").is_err());
        assert!(matches!(
            require_str(&params, "t", "missing"),
            Err(ToolError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn object_or_empty_defaults() {
        let params = serde_json::json!({"constraints": {"veg": true}, "list": [1]});
        assert_eq!(object_or_empty(&params, "constraints")["veg"], true);
        assert_eq!(object_or_empty(&params, "list"), serde_json::json!({}));
        assert_eq!(object_or_empty(&params, "nope"), serde_json::json!({}));
    }
}
