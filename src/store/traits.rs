//! Unified `Database` trait: a single async interface for all persistence.
//!
//! Documents are grouped into named collections. Workflow logs are
//! append-only: nothing here updates or deletes a logged message.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Collection names for workflow logs and summaries.
pub mod collections {
    /// Onboarding conversation log.
    pub const ONBOARDING_MESSAGES: &str = "onboarding_messages";
    /// Generic workflow transaction log.
    pub const WORKFLOW_TRANSACTIONS: &str = "workflow_transactions";
    /// Weekly-plan conversation log.
    pub const WEEKLY_PLAN_CHATS: &str = "weekly_plan_chats";
    /// Cook assistant conversation log.
    pub const COOK_MESSAGES: &str = "cook_messages";
    /// Final onboarding summaries.
    pub const WORKFLOW_STATUS: &str = "workflow_status";
    /// Final weekly-plan summaries.
    pub const WEEKLY_PLAN_STATUS: &str = "weekly_plan_status";
}

/// Form types recorded in `form_submissions`.
pub mod form_types {
    pub const ONBOARDING: &str = "onboarding";
    pub const WEEKLY_PLAN_REVIEW: &str = "weekly_plan_review";
}

/// Author of a logged workflow message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Bot,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "bot" => Some(Self::Bot),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// One entry in a workflow conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMessage {
    pub id: Uuid,
    pub collection: String,
    pub phone_number: String,
    pub role: MessageRole,
    pub content: String,
    pub workflow_type: String,
    /// Step the conversation was in when this entry was written. For step
    /// updates, the step being entered.
    pub current_step: String,
    pub step_update: bool,
    /// Optional partition inside a collection (the ISO week for weekly plans).
    pub scope: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowMessage {
    pub fn new(
        collection: &str,
        phone_number: &str,
        role: MessageRole,
        content: impl Into<String>,
        workflow_type: &str,
        current_step: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection: collection.to_string(),
            phone_number: phone_number.to_string(),
            role,
            content: content.into(),
            workflow_type: workflow_type.to_string(),
            current_step: current_step.to_string(),
            step_update: false,
            scope: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_step_update(mut self) -> Self {
        self.step_update = true;
        self
    }

    pub fn with_scope(mut self, scope: Option<&str>) -> Self {
        self.scope = scope.map(str::to_string);
        self
    }
}

/// A user record, looked up by WhatsApp number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub whatsapp_number: String,
    pub household_id: Option<String>,
    pub data: serde_json::Value,
}

/// A household document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Household {
    pub id: String,
    pub data: serde_json::Value,
}

/// A message in an agent conversation thread.
#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Users & households ──────────────────────────────────────────

    async fn upsert_user(&self, user: &UserRecord) -> Result<(), DatabaseError>;

    /// First user whose WhatsApp number matches.
    async fn get_user_by_whatsapp(
        &self,
        whatsapp_number: &str,
    ) -> Result<Option<UserRecord>, DatabaseError>;

    async fn upsert_household(
        &self,
        id: &str,
        data: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    async fn get_household(&self, id: &str) -> Result<Option<Household>, DatabaseError>;

    /// Set one top-level field of a household document, keeping the rest.
    async fn update_household_field(
        &self,
        id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    // ── Cooks ───────────────────────────────────────────────────────

    async fn add_cook(&self, phone_number: &str, name: &str) -> Result<(), DatabaseError>;

    async fn is_cook(&self, phone_number: &str) -> Result<bool, DatabaseError>;

    // ── Workflow logs ───────────────────────────────────────────────

    /// Append a message to a workflow log.
    async fn append_workflow_message(&self, message: &WorkflowMessage)
    -> Result<(), DatabaseError>;

    /// All messages for a phone number in a collection, newest first.
    /// When `scope` is given only entries with that scope are returned.
    async fn list_workflow_messages(
        &self,
        collection: &str,
        phone_number: &str,
        scope: Option<&str>,
    ) -> Result<Vec<WorkflowMessage>, DatabaseError>;

    /// Store a final workflow summary.
    async fn save_workflow_status(
        &self,
        collection: &str,
        phone_number: &str,
        record: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    /// Summaries for a phone number, newest first.
    async fn list_workflow_status(
        &self,
        collection: &str,
        phone_number: &str,
    ) -> Result<Vec<serde_json::Value>, DatabaseError>;

    // ── Forms ───────────────────────────────────────────────────────

    async fn record_form_submission(
        &self,
        phone_number: &str,
        form_type: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Whether a form of this type was submitted in `[since, until)`.
    async fn has_form_submission(
        &self,
        phone_number: &str,
        form_type: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    // ── Agent conversations ─────────────────────────────────────────

    /// Ensure a conversation exists, creating it if needed.
    async fn ensure_conversation(
        &self,
        thread_id: &str,
        channel: &str,
        user_id: &str,
    ) -> Result<(), DatabaseError>;

    async fn add_conversation_message(
        &self,
        thread_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), DatabaseError>;

    /// Messages in a conversation, oldest first.
    async fn list_conversation_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ConversationMessage>, DatabaseError>;
}
