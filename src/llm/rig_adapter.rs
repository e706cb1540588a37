//! Adapter that bridges rig-core's `CompletionModel` to our `LlmProvider`.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel};
use rig::message::Message as RigMessage;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};

/// Wraps a rig-core completion model.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
    input_cost: Decimal,
    output_cost: Decimal,
    default_temperature: Option<f32>,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: impl Into<String>) -> Self {
        let name = model_name.into();
        let (input_cost, output_cost) = model_cost(&name);
        Self {
            model,
            model_name: name,
            input_cost,
            output_cost,
            default_temperature: None,
        }
    }

    /// Temperature used when a request does not set one.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }
}

/// Per-token prices in USD. Unknown models are priced as zero.
fn model_cost(model: &str) -> (Decimal, Decimal) {
    if model.starts_with("claude-3-5-sonnet") {
        (dec!(0.000003), dec!(0.000015))
    } else if model == "openai/gpt-oss-20b" {
        (dec!(0.0000001), dec!(0.0000005))
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    }
}

/// Split our messages into `(preamble, history, prompt)`.
///
/// System messages are concatenated into the preamble. The last user message
/// is the prompt; everything before it is history.
fn convert_messages(
    messages: &[ChatMessage],
) -> Option<(Option<String>, Vec<RigMessage>, RigMessage)> {
    let mut preamble: Option<String> = None;
    let mut history = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => match preamble {
                Some(ref mut p) => {
                    p.push('\n');
                    p.push_str(&msg.content);
                }
                None => preamble = Some(msg.content.clone()),
            },
            Role::User => history.push(RigMessage::user(msg.content.clone())),
            Role::Assistant => history.push(RigMessage::assistant(msg.content.clone())),
        }
    }

    let last_user = messages.iter().rposition(|m| m.role == Role::User)?;
    let non_system_before = messages[..last_user]
        .iter()
        .filter(|m| m.role != Role::System)
        .count();
    let prompt = history.remove(non_system_before);
    history.truncate(non_system_before);
    Some((preamble, history, prompt))
}

fn saturate_u32(val: u64) -> u32 {
    val.min(u32::MAX as u64) as u32
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (self.input_cost, self.output_cost)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, history, prompt) =
            convert_messages(&request.messages).ok_or_else(|| LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason: "completion request has no user message".to_string(),
            })?;

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(t) = request.temperature.or(self.default_temperature) {
            builder = builder.temperature(t as f64);
        }
        if let Some(max) = request.max_tokens {
            builder = builder.max_tokens(max as u64);
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let text: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect();

        Ok(CompletionResponse {
            content: text,
            input_tokens: saturate_u32(response.usage.input_tokens),
            output_tokens: saturate_u32(response.usage.output_tokens),
            finish_reason: FinishReason::Stop,
        })
    }
}
