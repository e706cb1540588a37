//! Supervisor: decides which worker handles a message.
//!
//! The LLM is asked for a JSON `{intent, args}` object. When the call fails
//! or the answer does not parse, keyword rules pick the intent instead.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, ToolDefinition};

use super::prompts;

/// What the user is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Recommend,
    Score,
    Order,
    Onboarding,
    CookUpdate,
    Chat,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recommend => "recommend",
            Self::Score => "score",
            Self::Order => "order",
            Self::Onboarding => "onboarding",
            Self::CookUpdate => "cook_update",
            Self::Chat => "chat",
        }
    }
}

/// Routing decision.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    #[serde(default = "empty_args")]
    pub args: serde_json::Value,
}

fn empty_args() -> serde_json::Value {
    serde_json::json!({})
}

impl Classification {
    fn keyword(intent: Intent) -> Self {
        Self {
            intent,
            args: empty_args(),
        }
    }
}

/// Keyword rules, checked in order. Scoring and ordering come before
/// recommendation since their messages often mention "meal plan" too.
const KEYWORD_RULES: &[(Intent, &str)] = &[
    (Intent::Score, r"(?i)\b(score|rate|rating|nutrition(al)?|how healthy)\b"),
    (
        Intent::Order,
        r"(?i)\b(order|cart|checkout|check out|buy|grocer(y|ies)|deliver(y|ed)?|substitut\w*|replace)\b",
    ),
    (
        Intent::Onboarding,
        r"(?i)\b(sign ?up|onboard\w*|register|resident|household|allerg\w*)\b",
    ),
    (
        Intent::Recommend,
        r"(?i)\b(recommend\w*|suggest\w*|meal ?plan|plan (my|our|the) meals|menu|what should (i|we) (eat|cook))\b",
    ),
];

/// Compiled keyword rules.
pub struct IntentRules {
    rules: Vec<(Intent, Regex)>,
}

impl IntentRules {
    pub fn default_rules() -> Self {
        let rules = KEYWORD_RULES
            .iter()
            .filter_map(|(intent, pattern)| match Regex::new(pattern) {
                Ok(re) => Some((*intent, re)),
                Err(e) => {
                    warn!(intent = intent.as_str(), "Invalid intent regex: {}", e);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// First matching intent, or `Chat`.
    pub fn classify(&self, text: &str) -> Intent {
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::Chat)
    }
}

/// LLM-backed router with keyword fallback.
pub struct Supervisor {
    llm: Arc<dyn LlmProvider>,
    rules: IntentRules,
    system_prompt: String,
}

impl Supervisor {
    pub fn new(llm: Arc<dyn LlmProvider>, tools: &[ToolDefinition]) -> Self {
        Self {
            llm,
            rules: IntentRules::default_rules(),
            system_prompt: prompts::supervisor_prompt(tools),
        }
    }

    /// Classify a message given recent history (oldest first).
    pub async fn classify(&self, text: &str, history: &[ChatMessage]) -> Classification {
        let mut messages = vec![ChatMessage::system(self.system_prompt.clone())];
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(text));

        let request = CompletionRequest::new(messages)
            .with_temperature(0.0)
            .with_max_tokens(300);

        match self.llm.complete(request).await {
            Ok(response) => match parse_classification(&response.content) {
                Some(classification) => {
                    debug!(intent = classification.intent.as_str(), "Supervisor classified message");
                    classification
                }
                None => {
                    warn!(response = %response.content, "Unparseable supervisor output, using keyword rules");
                    Classification::keyword(self.rules.classify(text))
                }
            },
            Err(e) => {
                warn!("Supervisor LLM call failed, using keyword rules: {}", e);
                Classification::keyword(self.rules.classify(text))
            }
        }
    }
}

/// Parse `{intent, args}` from LLM output that may wrap it in prose or a
/// markdown fence.
pub fn parse_classification(output: &str) -> Option<Classification> {
    let json = extract_json_object(output)?;
    let mut classification: Classification = serde_json::from_str(json).ok()?;
    if !classification.args.is_object() {
        classification.args = empty_args();
    }
    Some(classification)
}

/// Outermost `{...}` span of the text.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
