//! Workers: run the tool behind an intent and phrase the result.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ToolError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::tools::ToolRegistry;

use super::prompts;
use super::supervisor::{Classification, Intent};

/// Raw tool JSON shown to the user when the LLM cannot phrase it.
const MAX_FALLBACK_CHARS: usize = 1000;

/// Action the user must approve before the flow continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    ApprovePlan,
    ApproveSubstitution,
    ApproveCheckout,
}

impl PendingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApprovePlan => "approve_plan",
            Self::ApproveSubstitution => "approve_substitution",
            Self::ApproveCheckout => "approve_checkout",
        }
    }
}

/// A worker's answer.
#[derive(Debug, Clone)]
pub struct WorkerReply {
    pub reply: String,
    pub pending_action: Option<PendingAction>,
    /// Tool that ran, if any.
    pub tool: Option<String>,
}

/// Per-turn facts the workers may need.
pub struct TurnContext<'a> {
    pub text: &'a str,
    pub household_id: &'a str,
    pub history: &'a [ChatMessage],
}

/// A planned tool call.
struct ToolCall {
    name: &'static str,
    params: serde_json::Value,
    pending_action: Option<PendingAction>,
}

fn arg<'a>(args: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn object_arg(args: &serde_json::Value, key: &str) -> serde_json::Value {
    match args.get(key) {
        Some(v) if v.is_object() => v.clone(),
        _ => serde_json::json!({}),
    }
}

/// Map an intent and its arguments to a tool call. `None` for plain chat.
fn plan_tool_call(classification: &Classification, ctx: &TurnContext<'_>) -> Option<ToolCall> {
    let args = &classification.args;
    let call = |name, params, pending_action| ToolCall {
        name,
        params,
        pending_action,
    };

    match classification.intent {
        Intent::Recommend => Some(call(
            "bm_recommend_meals",
            serde_json::json!({
                "household_id": arg(args, "household_id").unwrap_or(ctx.household_id),
                "constraints": object_arg(args, "constraints"),
            }),
            Some(PendingAction::ApprovePlan),
        )),
        Intent::Score => Some(call(
            "bm_score_meal_plan",
            serde_json::json!({
                "meal_id": arg(args, "meal_id").or_else(|| arg(args, "meal_plan_id")),
                "metrics": args.get("metrics").cloned().unwrap_or_else(|| serde_json::json!([])),
            }),
            None,
        )),
        Intent::Order => Some(match arg(args, "action").unwrap_or("build_cart") {
            "substitute" => call(
                "bm_substitute",
                serde_json::json!({
                    "cart_id": arg(args, "cart_id"),
                    "original": arg(args, "original"),
                    "chosen": arg(args, "chosen"),
                }),
                Some(PendingAction::ApproveSubstitution),
            ),
            "checkout" => call(
                "bm_checkout",
                serde_json::json!({
                    "cart_id": arg(args, "cart_id"),
                    "idempotency_key": arg(args, "idempotency_key")
                        .map(str::to_string)
                        .unwrap_or_else(|| Uuid::new_v4().to_string()),
                }),
                None,
            ),
            "status" => call(
                "bm_order_status",
                serde_json::json!({"order_id": arg(args, "order_id")}),
                None,
            ),
            _ => call(
                "bm_build_cart",
                serde_json::json!({
                    "household_id": arg(args, "household_id").unwrap_or(ctx.household_id),
                    "meal_plan_id": arg(args, "meal_plan_id"),
                }),
                Some(PendingAction::ApproveCheckout),
            ),
        }),
        Intent::Onboarding => {
            let household_id = arg(args, "household_id").unwrap_or(ctx.household_id);
            if args.get("resident").is_some_and(|r| r.is_object()) {
                Some(call(
                    "bm_onboard_resident",
                    serde_json::json!({
                        "household_id": household_id,
                        "resident": object_arg(args, "resident"),
                    }),
                    None,
                ))
            } else {
                Some(call(
                    "bm_onboard_household",
                    serde_json::json!({
                        "phone_hash": arg(args, "phone_hash").unwrap_or(household_id),
                        "preferences": object_arg(args, "preferences"),
                    }),
                    None,
                ))
            }
        }
        Intent::CookUpdate => Some(call(
            "bm_substitute",
            serde_json::json!({
                "cart_id": arg(args, "cart_id"),
                "original": arg(args, "original"),
                "chosen": arg(args, "chosen"),
            }),
            Some(PendingAction::ApproveSubstitution),
        )),
        Intent::Chat => None,
    }
}

/// Truncate on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => format!("{}...", &text[..byte_offset]),
        None => text.to_string(),
    }
}

/// Runs tools and asks the LLM to phrase results.
pub struct Workers {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
}

impl Workers {
    pub fn new(llm: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self { llm, tools }
    }

    pub async fn run(&self, classification: &Classification, ctx: &TurnContext<'_>) -> WorkerReply {
        let Some(call) = plan_tool_call(classification, ctx) else {
            return WorkerReply {
                reply: self.chat(ctx).await,
                pending_action: None,
                tool: None,
            };
        };

        tracing::info!(
            intent = classification.intent.as_str(),
            tool = call.name,
            "Worker calling tool"
        );
        match self.tools.execute(call.name, call.params).await {
            Ok(output) => WorkerReply {
                reply: self
                    .phrase(classification.intent, ctx, &output.result)
                    .await,
                pending_action: call.pending_action,
                tool: Some(call.name.to_string()),
            },
            Err(ToolError::InvalidParameters { reason, .. }) => WorkerReply {
                reply: format!(
                    "I need a bit more detail to do that: {}. Could you share it?",
                    reason.trim_start_matches("missing required string parameter ")
                ),
                pending_action: None,
                tool: Some(call.name.to_string()),
            },
            Err(e) => {
                tracing::error!(tool = call.name, "Tool call failed: {}", e);
                WorkerReply {
                    reply: "Sorry, I couldn't complete that right now. Please try again in a bit."
                        .to_string(),
                    pending_action: None,
                    tool: Some(call.name.to_string()),
                }
            }
        }
    }

    /// Phrase a tool result for WhatsApp. Falls back to the raw JSON.
    async fn phrase(
        &self,
        intent: Intent,
        ctx: &TurnContext<'_>,
        result: &serde_json::Value,
    ) -> String {
        let raw = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
        let request = CompletionRequest::new(vec![
            ChatMessage::system(format!(
                "{}\n\n{}",
                prompts::worker_prompt(intent),
                prompts::WHATSAPP_STYLE
            )),
            ChatMessage::user(format!(
                "User message: \"{}\"\n\nTool result:\n{}",
                ctx.text, raw
            )),
        ])
        .with_max_tokens(1024);

        match self.llm.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => {
                tracing::debug!(
                    cost = %self.llm.calculate_cost(response.input_tokens, response.output_tokens),
                    "Worker reply phrased"
                );
                response.content.trim().to_string()
            }
            Ok(_) => truncate_chars(&raw, MAX_FALLBACK_CHARS),
            Err(e) => {
                tracing::warn!("Worker LLM call failed, returning raw result: {}", e);
                truncate_chars(&raw, MAX_FALLBACK_CHARS)
            }
        }
    }

    async fn chat(&self, ctx: &TurnContext<'_>) -> String {
        let mut messages = vec![ChatMessage::system(format!(
            "{}\n\n{}",
            prompts::CHAT_PROMPT,
            prompts::WHATSAPP_STYLE
        ))];
        messages.extend(ctx.history.iter().cloned());
        messages.push(ChatMessage::user(ctx.text));

        match self
            .llm
            .complete(CompletionRequest::new(messages).with_max_tokens(512))
            .await
        {
            Ok(response) => response.content.trim().to_string(),
            Err(e) => {
                tracing::warn!("Chat LLM call failed: {}", e);
                String::new()
            }
        }
    }
}
