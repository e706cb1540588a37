//! General conversational agent for households past onboarding and weekly
//! plan approval, plus the cook assistant.
//!
//! A supervisor classifies each message into an intent, a worker runs the
//! matching tool and phrases the result. History is kept per thread.

pub mod cook_assistant;
pub mod prompts;
pub mod supervisor;
pub mod workers;

use std::sync::Arc;

use serde::Serialize;

use crate::error::DatabaseError;
use crate::llm::LlmProvider;
use crate::store::Database;
use crate::tools::ToolRegistry;

pub use cook_assistant::CookAssistant;
pub use supervisor::{Classification, Intent, IntentRules, Supervisor};
pub use workers::{PendingAction, TurnContext, WorkerReply, Workers};

/// Reply when a worker produced nothing to say.
pub const FALLBACK_REPLY: &str = "I'm processing your request...";

/// Thread used when the caller supplies neither a thread nor a household.
pub const DEMO_THREAD: &str = "demo_household";

const CHANNEL: &str = "whatsapp";
const HISTORY_LIMIT: usize = 20;

/// The agent's answer to one message.
#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
}

/// Who sent the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderRole {
    #[default]
    Household,
    Cook,
}

impl SenderRole {
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            Some(r) if r.eq_ignore_ascii_case("cook") => Self::Cook,
            _ => Self::Household,
        }
    }
}

/// Conversation thread: explicit thread, else household, else the demo thread.
pub fn resolve_thread_id<'a>(thread_id: Option<&'a str>, household_id: Option<&'a str>) -> &'a str {
    thread_id
        .filter(|s| !s.is_empty())
        .or(household_id.filter(|s| !s.is_empty()))
        .unwrap_or(DEMO_THREAD)
}

pub struct ConversationAgent {
    db: Arc<dyn Database>,
    supervisor: Supervisor,
    workers: Workers,
}

impl ConversationAgent {
    pub async fn new(
        db: Arc<dyn Database>,
        supervisor_llm: Arc<dyn LlmProvider>,
        worker_llm: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let supervisor = Supervisor::new(supervisor_llm, &tools.tool_definitions().await);
        Self {
            db,
            supervisor,
            workers: Workers::new(worker_llm, tools),
        }
    }

    /// Handle one message in a thread. Never fails.
    pub async fn handle(
        &self,
        text: &str,
        thread_id: &str,
        household_id: Option<&str>,
        sender: SenderRole,
    ) -> AgentReply {
        let history = match self.load_history(thread_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(thread = %thread_id, "Failed to load history: {}", e);
                Vec::new()
            }
        };

        let classification = match sender {
            SenderRole::Cook => Classification {
                intent: Intent::CookUpdate,
                args: serde_json::json!({}),
            },
            SenderRole::Household => self.supervisor.classify(text, &history).await,
        };
        tracing::info!(
            thread = %thread_id,
            intent = classification.intent.as_str(),
            "Agent routing message"
        );

        let ctx = TurnContext {
            text,
            household_id: household_id.unwrap_or(thread_id),
            history: &history,
        };
        let out = self.workers.run(&classification, &ctx).await;
        let reply = if out.reply.trim().is_empty() {
            FALLBACK_REPLY.to_string()
        } else {
            out.reply
        };

        if let Err(e) = self.persist_turn(thread_id, text, &reply).await {
            tracing::warn!(thread = %thread_id, "Failed to persist agent turn: {}", e);
        }

        AgentReply {
            reply,
            pending_action: out.pending_action,
        }
    }

    async fn load_history(
        &self,
        thread_id: &str,
    ) -> Result<Vec<crate::llm::ChatMessage>, DatabaseError> {
        let rows = self.db.list_conversation_messages(thread_id).await?;
        Ok(cook_assistant::history_messages(&rows, HISTORY_LIMIT))
    }

    async fn persist_turn(
        &self,
        thread_id: &str,
        text: &str,
        reply: &str,
    ) -> Result<(), DatabaseError> {
        self.db
            .ensure_conversation(thread_id, CHANNEL, thread_id)
            .await?;
        self.db
            .add_conversation_message(thread_id, "user", text)
            .await?;
        self.db
            .add_conversation_message(thread_id, "assistant", reply)
            .await?;
        tracing::debug!(thread = %thread_id, "Agent turn persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason};
    use crate::store::LibSqlBackend;
    use crate::tools::{BackendClient, default_registry};
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    struct Fixed(&'static str);

    #[async_trait]
    impl LlmProvider for Fixed {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }
        async fn complete(&self, _r: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.0.to_string(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    async fn agent(supervisor: &'static str, worker: &'static str) -> (ConversationAgent, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let tools = Arc::new(default_registry(Arc::new(BackendClient::stub())));
        let agent = ConversationAgent::new(
            Arc::clone(&db),
            Arc::new(Fixed(supervisor)),
            Arc::new(Fixed(worker)),
            tools,
        )
        .await;
        (agent, db)
    }

    #[test]
    fn thread_resolution() {
        assert_eq!(resolve_thread_id(Some("t1"), Some("hh1")), "t1");
        assert_eq!(resolve_thread_id(None, Some("hh1")), "hh1");
        assert_eq!(resolve_thread_id(Some(""), None), DEMO_THREAD);
        assert_eq!(SenderRole::parse(Some("Cook")), SenderRole::Cook);
        assert_eq!(SenderRole::parse(None), SenderRole::Household);
    }

    #[tokio::test]
    async fn recommendation_asks_for_plan_approval() {
        let (agent, db) = agent(r#"{"intent": "recommend", "args": {}}"#, "Here is your week").await;
        let out = agent
            .handle("plan my week", "hh1", Some("hh1"), SenderRole::Household)
            .await;
        assert_eq!(out.reply, "Here is your week");
        assert_eq!(out.pending_action, Some(PendingAction::ApprovePlan));

        let rows = db.list_conversation_messages("hh1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].role, "user");
        assert_eq!(rows[1].content, "Here is your week");
    }

    #[tokio::test]
    async fn empty_chat_reply_falls_back() {
        let (agent, _) = agent(r#"{"intent": "chat"}"#, "   ").await;
        let out = agent
            .handle("hello", DEMO_THREAD, None, SenderRole::Household)
            .await;
        assert_eq!(out.reply, FALLBACK_REPLY);
        assert!(out.pending_action.is_none());
    }

    #[tokio::test]
    async fn cooks_route_to_substitution() {
        let (agent, _) = agent(r#"{"intent": "chat"}"#, "ok").await;
        let out = agent
            .handle("no paneer today", "t1", None, SenderRole::Cook)
            .await;
        // No cart id was given, so the worker asks for it.
        assert!(out.reply.contains("cart_id"));
    }
}
