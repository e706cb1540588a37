//! Persistence layer: libSQL-backed document collections.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    ConversationMessage, Database, Household, MessageRole, UserRecord, WorkflowMessage,
    collections, form_types,
};
