//! Cook assistant: free-form LLM chat for registered cooks.
//!
//! One session per cook per day. History lives in the conversation tables
//! under `{phone}_{YYYYMMDD}`; every turn is also logged to `cook_messages`.

use std::sync::Arc;

use chrono::Utc;

use crate::error::WorkflowError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::store::{Database, MessageRole, WorkflowMessage, collections};

use super::prompts::COOK_ASSISTANT_PROMPT;

pub const EMPTY_MESSAGE_REPLY: &str =
    "I need your message to help you. What would you like to know?";
pub const ERROR_REPLY: &str = "I'm sorry, I encountered an error. Please try again.";

const WORKFLOW_TYPE: &str = "cook_assistant";
const CHANNEL: &str = "cook";
const HISTORY_LIMIT: usize = 20;

/// Session id for a cook on the current UTC day.
pub fn session_id(phone_number: &str) -> String {
    format!("{}_{}", phone_number, Utc::now().format("%Y%m%d"))
}

/// Convert stored conversation rows to chat messages, keeping the newest
/// `limit`.
pub(crate) fn history_messages(
    rows: &[crate::store::ConversationMessage],
    limit: usize,
) -> Vec<ChatMessage> {
    let skip = rows.len().saturating_sub(limit);
    rows[skip..]
        .iter()
        .filter_map(|m| match m.role.as_str() {
            "user" => Some(ChatMessage::user(m.content.clone())),
            "assistant" => Some(ChatMessage::assistant(m.content.clone())),
            _ => None,
        })
        .collect()
}

pub struct CookAssistant {
    db: Arc<dyn Database>,
    llm: Arc<dyn LlmProvider>,
}

impl CookAssistant {
    pub fn new(db: Arc<dyn Database>, llm: Arc<dyn LlmProvider>) -> Self {
        Self { db, llm }
    }

    /// Answer one cook message. Never fails.
    pub async fn process_message(&self, text: &str, phone_number: &str) -> String {
        let text = text.trim();
        if text.is_empty() {
            return EMPTY_MESSAGE_REPLY.to_string();
        }

        let session = session_id(phone_number);
        tracing::info!(phone = %phone_number, session = %session, "Cook assistant message");

        let reply = match self.try_process(text, phone_number, &session).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(phone = %phone_number, "Cook assistant turn failed: {}", e);
                ERROR_REPLY.to_string()
            }
        };
        self.log(phone_number, MessageRole::Bot, &reply).await;
        reply
    }

    async fn try_process(
        &self,
        text: &str,
        phone_number: &str,
        session: &str,
    ) -> Result<String, WorkflowError> {
        self.log(phone_number, MessageRole::User, text).await;
        self.db
            .ensure_conversation(session, CHANNEL, phone_number)
            .await?;
        let rows = self.db.list_conversation_messages(session).await?;

        let mut messages = vec![ChatMessage::system(COOK_ASSISTANT_PROMPT)];
        messages.extend(history_messages(&rows, HISTORY_LIMIT));
        messages.push(ChatMessage::user(text));

        let response = self
            .llm
            .complete(CompletionRequest::new(messages).with_max_tokens(1024))
            .await?;
        let reply = response.content.trim().to_string();
        if reply.is_empty() {
            return Ok(ERROR_REPLY.to_string());
        }

        self.db
            .add_conversation_message(session, "user", text)
            .await?;
        self.db
            .add_conversation_message(session, "assistant", &reply)
            .await?;
        Ok(reply)
    }

    async fn log(&self, phone_number: &str, role: MessageRole, content: &str) {
        let entry = WorkflowMessage::new(
            collections::COOK_MESSAGES,
            phone_number,
            role,
            content,
            WORKFLOW_TYPE,
            "chat",
        );
        if let Err(e) = self.db.append_workflow_message(&entry).await {
            tracing::warn!(phone = %phone_number, "Failed to log cook message: {}", e);
        }
    }
}
