//! Row shapes written by the pipeline.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
    graph::{ClusterMember, Graph},
    parser::{MessageRecord, Role},
};

use super::{Row, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub owner: Uuid,
    pub message_id: String,
    pub thread_id: String,
    pub last_fetch: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedBodyRow {
    pub message_id: String,
    pub html_body: String,
    pub text_body: String,
    pub mimetypes: Vec<String>,
    pub ip_address: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub keywords: IndexMap<String, u32>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRow {
    pub email: String,
    pub name: String,
    pub domain: String,
    pub message_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNodeRow {
    pub email: String,
    pub name: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRow {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub date_string: String,
    pub message_id: String,
    pub node_u: String,
    pub node_v: String,
    pub role: Role,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeOwnershipRow {
    pub owner: Uuid,
    pub parent_node: String,
    pub interaction_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    Fetch,
    Graph,
    Persist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub owner: Uuid,
    pub kind: TaskKind,
    pub time_start: DateTime<Utc>,
    pub time_finished: Option<DateTime<Utc>>,
    pub success: bool,
    pub error: String,
}

/// Rows for one table, ready for a persistence job
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub table: Table,
    pub rows: Vec<Row>,
}

impl RowBatch {
    pub fn new<T: Serialize>(table: Table, items: &[T]) -> anyhow::Result<Self> {
        Ok(Self {
            table,
            rows: to_rows(items)?,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn to_rows<T: Serialize>(items: &[T]) -> anyhow::Result<Vec<Row>> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(anyhow::Error::from))
        .collect()
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> anyhow::Result<T> {
    Ok(serde_json::from_value(row)?)
}

/// Message, parsed-body and participant rows for fetched records
pub fn record_batches(
    records: &[MessageRecord],
    owner: Uuid,
    fetched_at: DateTime<Utc>,
) -> anyhow::Result<Vec<RowBatch>> {
    let messages: Vec<MessageRow> = records
        .iter()
        .map(|r| MessageRow {
            owner,
            message_id: r.message_id.clone(),
            thread_id: r.thread_id.clone(),
            last_fetch: fetched_at,
        })
        .collect();

    let bodies: Vec<ParsedBodyRow> = records
        .iter()
        .map(|r| ParsedBodyRow {
            message_id: r.message_id.clone(),
            html_body: r.html_body.clone(),
            text_body: r.text_body.clone(),
            mimetypes: r.mimetypes.clone(),
            ip_address: r.ip_address.clone(),
            subject: r.subject.clone(),
            date: r.date,
            keywords: r.keywords.clone(),
            labels: r.labels.clone(),
        })
        .collect();

    let participants: Vec<ParticipantRow> = records
        .iter()
        .flat_map(|r| &r.participants)
        .map(|p| ParticipantRow {
            email: p.email.clone(),
            name: p.name.clone(),
            domain: p.domain.clone(),
            message_id: p.message_id.clone(),
            role: p.role,
        })
        .collect();

    Ok(vec![
        RowBatch::new(Table::Messages, &messages)?,
        RowBatch::new(Table::ParsedBodies, &bodies)?,
        RowBatch::new(Table::Participants, &participants)?,
    ])
}

/// Node, interaction and edge-ownership rows for a built graph
pub fn graph_batches(graph: &Graph, owner: Uuid) -> anyhow::Result<Vec<RowBatch>> {
    let nodes: Vec<GraphNodeRow> = graph
        .nodes
        .values()
        .map(|n| GraphNodeRow {
            email: n.email.clone(),
            name: n.display_name(),
            domain: n.domain.clone(),
        })
        .collect();

    let interactions: Vec<InteractionRow> = graph
        .edges
        .iter()
        .map(|e| InteractionRow {
            id: e.id,
            date: e.date,
            date_string: e.date_string.clone(),
            message_id: e.message_id.clone(),
            node_u: e.node_u.clone(),
            node_v: e.node_v.clone(),
            role: e.role,
            score: e.score,
        })
        .collect();

    let ownership: Vec<EdgeOwnershipRow> = graph
        .nodes
        .values()
        .flat_map(|n| {
            n.edges.iter().map(move |edge_id| EdgeOwnershipRow {
                owner,
                parent_node: n.email.clone(),
                interaction_id: *edge_id,
            })
        })
        .collect();

    Ok(vec![
        RowBatch::new(Table::GraphNodes, &nodes)?,
        RowBatch::new(Table::Interactions, &interactions)?,
        RowBatch::new(Table::EdgeOwnership, &ownership)?,
    ])
}

/// Participant joined with its message date, as returned by cluster queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMemberRow {
    pub message_id: String,
    pub email: String,
    pub name: String,
    pub domain: String,
    pub role: Role,
    pub date: DateTime<Utc>,
}

impl From<ClusterMemberRow> for ClusterMember {
    fn from(row: ClusterMemberRow) -> Self {
        ClusterMember {
            message_id: row.message_id,
            email: row.email,
            name: row.name,
            domain: row.domain,
            role: row.role,
            date: row.date,
        }
    }
}
