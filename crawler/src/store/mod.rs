//! Store
//!
//! The pipeline reads and writes persisted state only through [`Store`]:
//! bulk inserts, two fetch shapes over named queries, and task updates.
//! Rows travel as JSON objects and are (de)serialized from the types in [`rows`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display};
use uuid::Uuid;

pub mod memory;
pub mod postgres;
pub mod rows;

pub use memory::InMemoryStore;
pub use postgres::SeaOrmStore;
pub use rows::{RowBatch, TaskKind, TaskRecord};

pub type Row = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Table {
    Messages,
    ParsedBodies,
    Participants,
    GraphNodes,
    Interactions,
    EdgeOwnership,
    Tasks,
}

impl Table {
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Messages => &["owner", "message_id", "thread_id", "last_fetch"],
            Table::ParsedBodies => &[
                "message_id",
                "html_body",
                "text_body",
                "mimetypes",
                "ip_address",
                "subject",
                "date",
                "keywords",
                "labels",
            ],
            Table::Participants => &["email", "name", "domain", "message_id", "role"],
            Table::GraphNodes => &["email", "name", "domain"],
            Table::Interactions => &[
                "id",
                "date",
                "date_string",
                "message_id",
                "node_u",
                "node_v",
                "role",
                "score",
            ],
            Table::EdgeOwnership => &["owner", "parent_node", "interaction_id"],
            Table::Tasks => &[
                "id",
                "owner",
                "kind",
                "time_start",
                "time_finished",
                "success",
                "error",
            ],
        }
    }

    /// Columns of the table's unique key; a row repeating a key is skipped
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            Table::Messages => &["owner", "message_id"],
            Table::ParsedBodies => &["message_id"],
            Table::Participants => &["message_id", "email", "role"],
            Table::GraphNodes => &["email"],
            Table::Interactions => &["id"],
            Table::EdgeOwnership => &["owner", "parent_node", "interaction_id"],
            Table::Tasks => &["id"],
        }
    }
}

/// Named read queries
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Message rows of an owner, most recently fetched first
    LatestMessageForOwner { owner: Uuid },
    /// Participants of the owner's messages dated within `[start, end]`, ordered by message id
    ClusterMembers {
        owner: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    TaskById { task_id: Uuid },
}

/// Fields written when a task finishes
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub time_finished: DateTime<Utc>,
    pub success: bool,
    pub error: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert rows, returning how many were written
    async fn insert_rows(&self, table: Table, rows: Vec<Row>) -> anyhow::Result<u64>;

    async fn fetch_all(&self, query: &Query) -> anyhow::Result<Vec<Row>>;

    async fn fetch_one(&self, query: &Query) -> anyhow::Result<Option<Row>>;

    async fn update_task_record(&self, task_id: Uuid, update: TaskUpdate) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(Table::ParsedBodies.as_ref(), "parsed_bodies");
        assert_eq!(Table::EdgeOwnership.to_string(), "edge_ownership");
    }

    #[test]
    fn test_key_columns_are_columns() {
        for table in [
            Table::Messages,
            Table::ParsedBodies,
            Table::Participants,
            Table::GraphNodes,
            Table::Interactions,
            Table::EdgeOwnership,
            Table::Tasks,
        ] {
            for key in table.key_columns() {
                assert!(table.columns().contains(key), "{table}.{key}");
            }
        }
    }
}
