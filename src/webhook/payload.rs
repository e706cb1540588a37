//! Inbound WhatsApp webhook payload and reply body.

use serde::{Deserialize, Serialize};

use crate::agent::{AgentReply, PendingAction};

/// Body posted by the WhatsApp gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub phone_number: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub referral_code: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub household_id: Option<String>,
    #[serde(default)]
    pub sender_role: Option<String>,
}

impl InboundMessage {
    /// Parse a raw body. `None` when it is not JSON or has no usable phone
    /// number.
    pub fn parse(body: &str) -> Option<Self> {
        match serde_json::from_str::<Self>(body) {
            Ok(msg) if !msg.phone_number.trim().is_empty() => Some(msg),
            Ok(_) => {
                tracing::warn!("Webhook payload has an empty phone_number");
                None
            }
            Err(e) => {
                tracing::warn!("Invalid webhook payload: {}", e);
                None
            }
        }
    }
}

/// Reply returned to the gateway. Always sent with status 200.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookReply {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
}

impl WebhookReply {
    pub fn text(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            pending_action: None,
        }
    }
}

impl From<AgentReply> for WebhookReply {
    fn from(r: AgentReply) -> Self {
        Self {
            reply: r.reply,
            pending_action: r.pending_action,
        }
    }
}
