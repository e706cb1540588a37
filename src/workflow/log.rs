//! Append-only step log: the only persisted state of a workflow.
//!
//! Every turn appends the user's message, the bot's reply, and (on a
//! transition) a `system` entry flagged as a step update. The current step is
//! the `current_step` of the newest step-update entry. Nothing is cached and
//! nothing is locked: each call rescans the log, and two concurrent turns for
//! the same phone number can interleave their appends.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::store::{Database, MessageRole, WorkflowMessage};

/// A closed set of steps a workflow moves through.
pub trait WorkflowStep: Copy + Eq + Debug + Display + Send + Sync + 'static {
    /// Value written to `current_step` in the log.
    fn as_str(&self) -> &'static str;

    fn parse(value: &str) -> Option<Self>;

    /// Step of a conversation with no usable log.
    fn initial() -> Self;
}

/// Current step from log entries ordered newest first.
///
/// Step updates whose value no longer parses are skipped with a warning.
pub fn step_from_entries<S: WorkflowStep>(entries: &[WorkflowMessage]) -> S {
    for entry in entries {
        if !entry.step_update || entry.role != MessageRole::System {
            continue;
        }
        match S::parse(&entry.current_step) {
            Some(step) => return step,
            None => tracing::warn!(
                phone = %entry.phone_number,
                value = %entry.current_step,
                "Ignoring unknown step in workflow log"
            ),
        }
    }
    S::initial()
}

/// Handle on one workflow log (a collection, optionally narrowed to a scope).
#[derive(Clone)]
pub struct StepLog {
    db: Arc<dyn Database>,
    collection: &'static str,
    workflow_type: String,
    scope: Option<String>,
}

impl StepLog {
    pub fn new(db: Arc<dyn Database>, collection: &'static str, workflow_type: &str) -> Self {
        Self {
            db,
            collection,
            workflow_type: workflow_type.to_string(),
            scope: None,
        }
    }

    /// Only read and write entries tagged with `scope`.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn collection(&self) -> &'static str {
        self.collection
    }

    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    /// All entries for a phone number, newest first.
    pub async fn entries(&self, phone_number: &str) -> Result<Vec<WorkflowMessage>, DatabaseError> {
        self.db
            .list_workflow_messages(self.collection, phone_number, self.scope.as_deref())
            .await
    }

    pub async fn current_step<S: WorkflowStep>(
        &self,
        phone_number: &str,
    ) -> Result<S, DatabaseError> {
        let entries = self.entries(phone_number).await?;
        let step = step_from_entries(&entries);
        tracing::debug!(phone = %phone_number, step = %step, "Reconstructed workflow step");
        Ok(step)
    }

    /// Append a step-update entry. Earlier entries are left untouched.
    pub async fn set_step<S: WorkflowStep>(
        &self,
        phone_number: &str,
        step: S,
    ) -> Result<(), DatabaseError> {
        let entry = WorkflowMessage::new(
            self.collection,
            phone_number,
            MessageRole::System,
            format!("Step updated to: {}", step.as_str()),
            &self.workflow_type,
            step.as_str(),
        )
        .with_step_update()
        .with_scope(self.scope.as_deref());
        self.db.append_workflow_message(&entry).await?;
        tracing::debug!(phone = %phone_number, step = %step, "Workflow step updated");
        Ok(())
    }

    /// Append a user or bot message tagged with the current step, which is
    /// returned.
    pub async fn record<S: WorkflowStep>(
        &self,
        phone_number: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<S, DatabaseError> {
        let step: S = self.current_step(phone_number).await?;
        let entry = WorkflowMessage::new(
            self.collection,
            phone_number,
            role,
            content,
            &self.workflow_type,
            step.as_str(),
        )
        .with_scope(self.scope.as_deref());
        self.db.append_workflow_message(&entry).await?;
        Ok(step)
    }

    /// Timestamp of the oldest entry, if any.
    pub async fn started_at(&self, phone_number: &str) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        Ok(self.entries(phone_number).await?.last().map(|e| e.timestamp))
    }
}

/// User messages logged while the conversation was at `step`, newest first.
pub fn user_messages_at<S: WorkflowStep>(entries: &[WorkflowMessage], step: S) -> Vec<&str> {
    entries
        .iter()
        .filter(|e| e.role == MessageRole::User && e.current_step == step.as_str())
        .map(|e| e.content.as_str())
        .collect()
}
