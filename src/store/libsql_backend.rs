//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Documents (households, user
//! data, workflow summaries) are stored as JSON text columns.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    ConversationMessage, Database, Household, MessageRole, UserRecord, WorkflowMessage,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format. Fixed width so text ordering is time ordering.
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn parse_json(s: &str) -> serde_json::Value {
    serde_json::from_str(s).unwrap_or(serde_json::json!({}))
}

fn to_json_text(value: &serde_json::Value) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

const WORKFLOW_COLUMNS: &str = "id, collection, phone_number, role, content, workflow_type, current_step, step_update, scope, timestamp";

/// Map a libsql Row to a WorkflowMessage. Column order matches WORKFLOW_COLUMNS.
fn row_to_workflow_message(row: &libsql::Row) -> Result<WorkflowMessage, DatabaseError> {
    let map = |e: libsql::Error| DatabaseError::Query(format!("read workflow message: {e}"));
    let id_str: String = row.get(0).map_err(map)?;
    let role_str: String = row.get(3).map_err(map)?;
    let timestamp: String = row.get(9).map_err(map)?;
    let role = MessageRole::parse(&role_str).ok_or_else(|| {
        DatabaseError::Serialization(format!("unknown message role {role_str:?}"))
    })?;

    Ok(WorkflowMessage {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        collection: row.get(1).map_err(map)?,
        phone_number: row.get(2).map_err(map)?,
        role,
        content: row.get(4).map_err(map)?,
        workflow_type: row.get(5).map_err(map)?,
        current_step: row.get(6).map_err(map)?,
        step_update: row.get::<i64>(7).map_err(map)? != 0,
        scope: row.get::<String>(8).ok(),
        timestamp: parse_datetime(&timestamp),
    })
}

fn row_to_user(row: &libsql::Row) -> Result<UserRecord, DatabaseError> {
    let map = |e: libsql::Error| DatabaseError::Query(format!("read user: {e}"));
    let data: String = row.get(3).map_err(map)?;
    Ok(UserRecord {
        id: row.get(0).map_err(map)?,
        whatsapp_number: row.get(1).map_err(map)?,
        household_id: row.get::<String>(2).ok().filter(|s| !s.is_empty()),
        data: parse_json(&data),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users & households ──────────────────────────────────────────

    async fn upsert_user(&self, user: &UserRecord) -> Result<(), DatabaseError> {
        let data = to_json_text(&user.data)?;
        self.conn()
            .execute(
                "INSERT INTO users (id, whatsapp_number, household_id, data)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (id) DO UPDATE SET
                    whatsapp_number = ?2, household_id = ?3, data = ?4",
                params![
                    user.id.as_str(),
                    user.whatsapp_number.as_str(),
                    opt_text(user.household_id.as_deref()),
                    data
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_user: {e}")))?;
        Ok(())
    }

    async fn get_user_by_whatsapp(
        &self,
        whatsapp_number: &str,
    ) -> Result<Option<UserRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, whatsapp_number, household_id, data FROM users
                 WHERE whatsapp_number = ?1 ORDER BY rowid ASC LIMIT 1",
                params![whatsapp_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_whatsapp: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_whatsapp: {e}"))),
        }
    }

    async fn upsert_household(
        &self,
        id: &str,
        data: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let data = to_json_text(data)?;
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO households (id, data, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (id) DO UPDATE SET data = ?2, updated_at = ?3",
                params![id, data, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_household: {e}")))?;
        Ok(())
    }

    async fn get_household(&self, id: &str) -> Result<Option<Household>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT id, data FROM households WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_household: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let id: String = row.get(0).unwrap_or_default();
                let data: String = row.get(1).unwrap_or_else(|_| "{}".to_string());
                Ok(Some(Household {
                    id,
                    data: parse_json(&data),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_household: {e}"))),
        }
    }

    async fn update_household_field(
        &self,
        id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let mut data = self
            .get_household(id)
            .await?
            .map(|h| h.data)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "household".to_string(),
                id: id.to_string(),
            })?;

        match data {
            serde_json::Value::Object(ref mut map) => {
                map.insert(key.to_string(), value.clone());
            }
            _ => data = serde_json::json!({ key: value }),
        }

        self.upsert_household(id, &data).await?;
        debug!(household_id = id, key, "Household field updated");
        Ok(())
    }

    // ── Cooks ───────────────────────────────────────────────────────

    async fn add_cook(&self, phone_number: &str, name: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO cooks (phone_number, name) VALUES (?1, ?2)
                 ON CONFLICT (phone_number) DO UPDATE SET name = ?2",
                params![phone_number, name],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_cook: {e}")))?;
        Ok(())
    }

    async fn is_cook(&self, phone_number: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM cooks WHERE phone_number = ?1",
                params![phone_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("is_cook: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) > 0),
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("is_cook: {e}"))),
        }
    }

    // ── Workflow logs ───────────────────────────────────────────────

    async fn append_workflow_message(
        &self,
        message: &WorkflowMessage,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO workflow_messages ({WORKFLOW_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    message.id.to_string(),
                    message.collection.as_str(),
                    message.phone_number.as_str(),
                    message.role.as_str(),
                    message.content.as_str(),
                    message.workflow_type.as_str(),
                    message.current_step.as_str(),
                    message.step_update as i64,
                    opt_text(message.scope.as_deref()),
                    format_timestamp(&message.timestamp)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_workflow_message: {e}")))?;

        debug!(
            collection = %message.collection,
            phone = %message.phone_number,
            role = message.role.as_str(),
            step = %message.current_step,
            step_update = message.step_update,
            "Workflow message appended"
        );
        Ok(())
    }

    async fn list_workflow_messages(
        &self,
        collection: &str,
        phone_number: &str,
        scope: Option<&str>,
    ) -> Result<Vec<WorkflowMessage>, DatabaseError> {
        let conn = self.conn();
        let mut rows = match scope {
            Some(scope) => conn
                .query(
                    &format!(
                        "SELECT {WORKFLOW_COLUMNS} FROM workflow_messages
                         WHERE collection = ?1 AND phone_number = ?2 AND scope = ?3
                         ORDER BY timestamp DESC, rowid DESC"
                    ),
                    params![collection, phone_number, scope],
                )
                .await,
            None => conn
                .query(
                    &format!(
                        "SELECT {WORKFLOW_COLUMNS} FROM workflow_messages
                         WHERE collection = ?1 AND phone_number = ?2
                         ORDER BY timestamp DESC, rowid DESC"
                    ),
                    params![collection, phone_number],
                )
                .await,
        }
        .map_err(|e| DatabaseError::Query(format!("list_workflow_messages: {e}")))?;

        let mut messages = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => messages.push(row_to_workflow_message(&row)?),
                Ok(None) => break,
                Err(e) => {
                    return Err(DatabaseError::Query(format!("list_workflow_messages: {e}")));
                }
            }
        }
        Ok(messages)
    }

    async fn save_workflow_status(
        &self,
        collection: &str,
        phone_number: &str,
        record: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let record = to_json_text(record)?;
        self.conn()
            .execute(
                "INSERT INTO workflow_status (id, collection, phone_number, record, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    collection,
                    phone_number,
                    record,
                    format_timestamp(&Utc::now())
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_workflow_status: {e}")))?;
        Ok(())
    }

    async fn list_workflow_status(
        &self,
        collection: &str,
        phone_number: &str,
    ) -> Result<Vec<serde_json::Value>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT record FROM workflow_status
                 WHERE collection = ?1 AND phone_number = ?2
                 ORDER BY created_at DESC, rowid DESC",
                params![collection, phone_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_workflow_status: {e}")))?;

        let mut records = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    let record: String = row
                        .get(0)
                        .map_err(|e| DatabaseError::Query(format!("list_workflow_status: {e}")))?;
                    let record = serde_json::from_str(&record)
                        .map_err(|e| DatabaseError::Serialization(format!("workflow status: {e}")))?;
                    records.push(record);
                }
                Ok(None) => break,
                Err(e) => {
                    return Err(DatabaseError::Query(format!("list_workflow_status: {e}")));
                }
            }
        }
        Ok(records)
    }

    // ── Forms ───────────────────────────────────────────────────────

    async fn record_form_submission(
        &self,
        phone_number: &str,
        form_type: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO form_submissions (id, phone_number, form_type, submitted_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    phone_number,
                    form_type,
                    format_timestamp(&submitted_at)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_form_submission: {e}")))?;
        Ok(())
    }

    async fn has_form_submission(
        &self,
        phone_number: &str,
        form_type: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM form_submissions
                 WHERE phone_number = ?1 AND form_type = ?2
                   AND submitted_at >= ?3 AND submitted_at < ?4",
                params![
                    phone_number,
                    form_type,
                    format_timestamp(&since),
                    format_timestamp(&until)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("has_form_submission: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) > 0),
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("has_form_submission: {e}"))),
        }
    }

    // ── Agent conversations ─────────────────────────────────────────

    async fn ensure_conversation(
        &self,
        thread_id: &str,
        channel: &str,
        user_id: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO conversations (id, channel, user_id)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (id) DO UPDATE SET last_activity = ?4",
                params![thread_id, channel, user_id, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("ensure_conversation: {e}")))?;
        Ok(())
    }

    async fn add_conversation_message(
        &self,
        thread_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO conversation_messages (id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                thread_id,
                role,
                content,
                format_timestamp(&Utc::now())
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("add_conversation_message: {e}")))?;

        // Touch last_activity
        let now = Utc::now().to_rfc3339();
        let _ = conn
            .execute(
                "UPDATE conversations SET last_activity = ?2 WHERE id = ?1",
                params![thread_id, now],
            )
            .await;

        Ok(())
    }

    async fn list_conversation_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ConversationMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, role, content, created_at FROM conversation_messages
                 WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_conversation_messages: {e}")))?;

        let map = |e: libsql::Error| DatabaseError::Query(format!("list_conversation_messages: {e}"));
        let mut messages = Vec::new();
        loop {
            let Some(row) = rows.next().await.map_err(map)? else {
                break;
            };
            let id_str: String = row.get(0).map_err(map)?;
            let created_str: String = row.get(3).map_err(map)?;
            messages.push(ConversationMessage {
                id: Uuid::parse_str(&id_str)
                    .map_err(|e| DatabaseError::Query(format!("conversation message id {id_str}: {e}")))?,
                role: row.get(1).map_err(map)?,
                content: row.get(2).map_err(map)?,
                created_at: parse_datetime(&created_str),
            });
        }
        Ok(messages)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::traits::{collections, form_types};
    use chrono::TimeZone;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn user(id: &str, phone: &str, household: Option<&str>) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            whatsapp_number: phone.to_string(),
            household_id: household.map(str::to_string),
            data: serde_json::json!({}),
        }
    }

    // ── User & household tests ──────────────────────────────────────

    #[tokio::test]
    async fn user_lookup_by_whatsapp() {
        let db = test_db().await;
        db.upsert_user(&user("u1", "+911", Some("hh1"))).await.unwrap();

        let found = db.get_user_by_whatsapp("+911").await.unwrap().unwrap();
        assert_eq!(found.id, "u1");
        assert_eq!(found.household_id.as_deref(), Some("hh1"));
        assert!(db.get_user_by_whatsapp("+999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn user_lookup_returns_first_match() {
        let db = test_db().await;
        db.upsert_user(&user("u1", "+911", Some("hh1"))).await.unwrap();
        db.upsert_user(&user("u2", "+911", Some("hh2"))).await.unwrap();

        let found = db.get_user_by_whatsapp("+911").await.unwrap().unwrap();
        assert_eq!(found.id, "u1");
    }

    #[tokio::test]
    async fn household_field_update_merges() {
        let db = test_db().await;
        db.upsert_household("hh1", &serde_json::json!({"name": "Sharma"}))
            .await
            .unwrap();
        db.update_household_field(
            "hh1",
            "weekly_plan",
            &serde_json::json!({"status": "approved", "week": 12}),
        )
        .await
        .unwrap();

        let hh = db.get_household("hh1").await.unwrap().unwrap();
        assert_eq!(hh.data["name"], "Sharma");
        assert_eq!(hh.data["weekly_plan"]["week"], 12);
    }

    #[tokio::test]
    async fn household_field_update_missing_household() {
        let db = test_db().await;
        let err = db
            .update_household_field("nope", "k", &serde_json::json!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn cook_registration() {
        let db = test_db().await;
        assert!(!db.is_cook("+912").await.unwrap());
        db.add_cook("+912", "Ramesh").await.unwrap();
        db.add_cook("+912", "Ramesh K").await.unwrap();
        assert!(db.is_cook("+912").await.unwrap());
    }

    // ── Workflow log tests ──────────────────────────────────────────

    #[tokio::test]
    async fn workflow_messages_newest_first() {
        let db = test_db().await;
        for (i, content) in ["one", "two", "three"].iter().enumerate() {
            let mut msg = WorkflowMessage::new(
                collections::ONBOARDING_MESSAGES,
                "+911",
                MessageRole::User,
                *content,
                "onboarding",
                "greeting",
            );
            msg.timestamp = Utc::now() + chrono::Duration::milliseconds(i as i64);
            db.append_workflow_message(&msg).await.unwrap();
        }

        let messages = db
            .list_workflow_messages(collections::ONBOARDING_MESSAGES, "+911", None)
            .await
            .unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["three", "two", "one"]);
    }

    #[tokio::test]
    async fn identical_timestamps_fall_back_to_insertion_order() {
        let db = test_db().await;
        let ts = Utc::now();
        for content in ["first", "second"] {
            let mut msg = WorkflowMessage::new(
                collections::ONBOARDING_MESSAGES,
                "+911",
                MessageRole::Bot,
                content,
                "onboarding",
                "greeting",
            );
            msg.timestamp = ts;
            db.append_workflow_message(&msg).await.unwrap();
        }
        let messages = db
            .list_workflow_messages(collections::ONBOARDING_MESSAGES, "+911", None)
            .await
            .unwrap();
        assert_eq!(messages[0].content, "second");
    }

    #[tokio::test]
    async fn workflow_messages_filtered_by_collection_phone_and_scope() {
        let db = test_db().await;
        let base = WorkflowMessage::new(
            collections::WEEKLY_PLAN_CHATS,
            "+911",
            MessageRole::System,
            "Step updated to: plan_approval",
            "weekly_plan",
            "plan_approval",
        )
        .with_step_update();
        db.append_workflow_message(&base.clone().with_scope(Some("2025-W10")))
            .await
            .unwrap();
        db.append_workflow_message(&WorkflowMessage {
            id: Uuid::new_v4(),
            ..base.clone().with_scope(Some("2025-W11"))
        })
        .await
        .unwrap();
        db.append_workflow_message(&WorkflowMessage {
            id: Uuid::new_v4(),
            phone_number: "+922".to_string(),
            ..base.clone()
        })
        .await
        .unwrap();

        let w10 = db
            .list_workflow_messages(collections::WEEKLY_PLAN_CHATS, "+911", Some("2025-W10"))
            .await
            .unwrap();
        assert_eq!(w10.len(), 1);
        assert!(w10[0].step_update);
        assert_eq!(w10[0].role, MessageRole::System);
        assert_eq!(w10[0].scope.as_deref(), Some("2025-W10"));

        let all = db
            .list_workflow_messages(collections::WEEKLY_PLAN_CHATS, "+911", None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let other = db
            .list_workflow_messages(collections::ONBOARDING_MESSAGES, "+911", None)
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn workflow_status_roundtrip() {
        let db = test_db().await;
        db.save_workflow_status(
            collections::WORKFLOW_STATUS,
            "+911",
            &serde_json::json!({"status": "completed", "current_step": "completed"}),
        )
        .await
        .unwrap();
        let records = db
            .list_workflow_status(collections::WORKFLOW_STATUS, "+911")
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["status"], "completed");
        assert!(
            db.list_workflow_status(collections::WEEKLY_PLAN_STATUS, "+911")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn corrupt_workflow_status_is_an_error() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO workflow_status (id, collection, phone_number, record, created_at)
                 VALUES ('s1', ?1, '+911', 'not json', '2025-01-01T00:00:00.000000Z')",
                params![collections::WORKFLOW_STATUS],
            )
            .await
            .unwrap();
        let err = db
            .list_workflow_status(collections::WORKFLOW_STATUS, "+911")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));
    }

    #[tokio::test]
    async fn form_submissions() {
        let db = test_db().await;
        let since = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        let weekly = form_types::WEEKLY_PLAN_REVIEW;

        assert!(!db.has_form_submission("+911", weekly, since, until).await.unwrap());

        // Outside the window on both sides.
        db.record_form_submission(
            "+911",
            weekly,
            Utc.with_ymd_and_hms(2025, 3, 2, 23, 59, 59).unwrap(),
        )
        .await
        .unwrap();
        db.record_form_submission("+911", weekly, until)
            .await
            .unwrap();
        assert!(!db.has_form_submission("+911", weekly, since, until).await.unwrap());

        db.record_form_submission("+911", weekly, since).await.unwrap();
        assert!(db.has_form_submission("+911", weekly, since, until).await.unwrap());
        assert!(
            !db.has_form_submission("+911", form_types::ONBOARDING, since, until)
                .await
                .unwrap()
        );
    }

    // ── Conversation tests ──────────────────────────────────────────

    #[tokio::test]
    async fn conversation_crud() {
        let db = test_db().await;
        db.ensure_conversation("hh1", "whatsapp", "+911").await.unwrap();
        db.add_conversation_message("hh1", "user", "Hello")
            .await
            .unwrap();
        db.add_conversation_message("hh1", "assistant", "Hi!")
            .await
            .unwrap();

        let messages = db.list_conversation_messages("hh1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content, "Hi!");
    }

    #[tokio::test]
    async fn corrupt_conversation_row_is_an_error() {
        let db = test_db().await;
        db.ensure_conversation("hh1", "whatsapp", "+911").await.unwrap();
        db.add_conversation_message("hh1", "user", "Hello")
            .await
            .unwrap();
        db.conn()
            .execute(
                "INSERT INTO conversation_messages (id, conversation_id, role, content, created_at)
                 VALUES ('not-a-uuid', 'hh1', 'user', 'Hi', '2025-01-01T00:00:00.000000Z')",
                (),
            )
            .await
            .unwrap();
        let err = db.list_conversation_messages("hh1").await.unwrap_err();
        assert!(matches!(err, DatabaseError::Query(_)));
    }

    #[tokio::test]
    async fn ensure_conversation_is_idempotent() {
        let db = test_db().await;
        db.ensure_conversation("hh1", "whatsapp", "+911").await.unwrap();
        db.ensure_conversation("hh1", "whatsapp", "+911").await.unwrap();
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = test_db().await;
        db.init_schema().await.unwrap();
    }

    #[test]
    fn timestamp_format_is_fixed_width() {
        let a = format_timestamp(&DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z").unwrap().with_timezone(&Utc));
        let b = format_timestamp(&DateTime::parse_from_rfc3339("2025-01-01T00:00:00.5Z").unwrap().with_timezone(&Utc));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_datetime(&b).timestamp_subsec_millis(), 500);
    }
}
