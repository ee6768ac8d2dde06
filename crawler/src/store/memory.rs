use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;
use uuid::Uuid;

use super::{
    rows::{from_row, ClusterMemberRow, MessageRow, ParsedBodyRow, ParticipantRow, TaskRecord},
    Query, Row, Store, Table, TaskUpdate,
};

/// Store kept in process memory, for tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<Table, Vec<Row>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.tables
            .read()
            .map(|tables| tables.get(&table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn count(&self, table: Table) -> usize {
        self.rows(table).len()
    }

    fn typed<T: serde::de::DeserializeOwned>(&self, table: Table) -> anyhow::Result<Vec<T>> {
        self.rows(table).into_iter().map(from_row).collect()
    }

    fn run_query(&self, query: &Query) -> anyhow::Result<Vec<Row>> {
        match query {
            Query::LatestMessageForOwner { owner } => {
                let mut messages: Vec<MessageRow> = self
                    .typed::<MessageRow>(Table::Messages)?
                    .into_iter()
                    .filter(|m| m.owner == *owner)
                    .collect();
                messages.sort_by(|a, b| b.last_fetch.cmp(&a.last_fetch));
                super::rows::to_rows(&messages)
            }
            Query::ClusterMembers { owner, start, end } => {
                let owned: Vec<String> = self
                    .typed::<MessageRow>(Table::Messages)?
                    .into_iter()
                    .filter(|m| m.owner == *owner)
                    .map(|m| m.message_id)
                    .collect();
                let dates: HashMap<String, _> = self
                    .typed::<ParsedBodyRow>(Table::ParsedBodies)?
                    .into_iter()
                    .filter(|b| owned.contains(&b.message_id))
                    .filter(|b| b.date >= *start && b.date <= *end)
                    .map(|b| (b.message_id, b.date))
                    .collect();

                let mut members: Vec<ClusterMemberRow> = self
                    .typed::<ParticipantRow>(Table::Participants)?
                    .into_iter()
                    .filter_map(|p| {
                        dates.get(&p.message_id).map(|date| ClusterMemberRow {
                            message_id: p.message_id,
                            email: p.email,
                            name: p.name,
                            domain: p.domain,
                            role: p.role,
                            date: *date,
                        })
                    })
                    .collect();
                // Stable sort keeps insertion order within a message
                members.sort_by(|a, b| a.message_id.cmp(&b.message_id));
                super::rows::to_rows(&members)
            }
            Query::TaskById { task_id } => {
                let tasks: Vec<TaskRecord> = self
                    .typed::<TaskRecord>(Table::Tasks)?
                    .into_iter()
                    .filter(|t| t.id == *task_id)
                    .collect();
                super::rows::to_rows(&tasks)
            }
        }
    }
}

fn same_key(table: Table, a: &Row, b: &Row) -> bool {
    table.key_columns().iter().all(|col| a.get(col) == b.get(col))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_rows(&self, table: Table, rows: Vec<Row>) -> anyhow::Result<u64> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        let existing = tables.entry(table).or_default();

        let mut inserted = 0;
        for row in rows {
            anyhow::ensure!(row.is_object(), "{} row is not an object: {}", table, row);
            if existing.iter().any(|r| same_key(table, r, &row)) {
                continue;
            }
            existing.push(row);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn fetch_all(&self, query: &Query) -> anyhow::Result<Vec<Row>> {
        self.run_query(query)
    }

    async fn fetch_one(&self, query: &Query) -> anyhow::Result<Option<Row>> {
        Ok(self.run_query(query)?.into_iter().next())
    }

    async fn update_task_record(&self, task_id: Uuid, update: TaskUpdate) -> anyhow::Result<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        let id = serde_json::to_value(task_id)?;
        let task = tables
            .get_mut(&Table::Tasks)
            .and_then(|tasks| tasks.iter_mut().find(|t| t.get("id") == Some(&id)))
            .ok_or_else(|| anyhow!("task {} not found", task_id))?;

        task["time_finished"] = serde_json::to_value(update.time_finished)?;
        task["success"] = update.success.into();
        task["error"] = update.error.into();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Role;
    use crate::store::rows::{record_batches, TaskKind};
    use crate::testing::common::sample_record;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn test_insert_skips_duplicate_keys() {
        let store = InMemoryStore::new();
        let row = serde_json::json!({"email": "a@x", "name": "A", "domain": "x"});
        assert_eq!(store.insert_rows(Table::GraphNodes, vec![row.clone()]).await.unwrap(), 1);
        assert_eq!(store.insert_rows(Table::GraphNodes, vec![row]).await.unwrap(), 0);
        assert_eq!(store.count(Table::GraphNodes), 1);
    }

    #[tokio::test]
    async fn test_latest_message_for_owner() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for (id, at) in [("old", t0), ("new", t0 + Duration::hours(1))] {
            let batches = record_batches(&[sample_record(id, &[])], owner, at).unwrap();
            store
                .insert_rows(Table::Messages, batches[0].rows.clone())
                .await
                .unwrap();
        }

        let row = store
            .fetch_one(&Query::LatestMessageForOwner { owner })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["message_id"], "new");

        let other = store
            .fetch_one(&Query::LatestMessageForOwner { owner: Uuid::nil() })
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_cluster_members_filters_by_date_and_owner() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let mut early = sample_record("m1", &[("a@x", Role::From), ("b@y", Role::To)]);
        early.date = Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap();
        let late = sample_record("m2", &[("c@z", Role::From)]);
        for batch in record_batches(&[late, early], owner, Utc::now()).unwrap() {
            store.insert_rows(batch.table, batch.rows).await.unwrap();
        }

        let query = Query::ClusterMembers {
            owner,
            start: Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2019, 12, 31, 0, 0, 0).unwrap(),
        };
        let rows = store.fetch_all(&query).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["message_id"] == "m1"));

        let query = Query::ClusterMembers {
            owner: Uuid::nil(),
            start: Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap(),
            end: Utc::now(),
        };
        assert!(store.fetch_all(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_task_record() {
        let store = InMemoryStore::new();
        let task = TaskRecord {
            id: Uuid::new_v4(),
            owner: Uuid::nil(),
            kind: TaskKind::Graph,
            time_start: Utc::now(),
            time_finished: None,
            success: false,
            error: String::new(),
        };
        store
            .insert_rows(Table::Tasks, vec![serde_json::to_value(&task).unwrap()])
            .await
            .unwrap();

        store
            .update_task_record(
                task.id,
                TaskUpdate {
                    time_finished: Utc::now(),
                    success: true,
                    error: String::new(),
                },
            )
            .await
            .unwrap();

        let row = store
            .fetch_one(&Query::TaskById { task_id: task.id })
            .await
            .unwrap()
            .unwrap();
        let stored: TaskRecord = from_row(row).unwrap();
        assert!(stored.success);
        assert!(stored.time_finished.is_some());

        assert!(store
            .update_task_record(Uuid::nil(), TaskUpdate {
                time_finished: Utc::now(),
                success: false,
                error: "x".to_string(),
            })
            .await
            .is_err());
    }
}
