use anyhow::Context;
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement, Value};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{Query, Row, Store, Table, TaskUpdate};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, FromQueryResult)]
struct JsonRow {
    row: JsonValue,
}

/// Postgres-backed store. Rows are shipped as one jsonb array per insert.
#[derive(Clone)]
pub struct SeaOrmStore {
    conn: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Create the tables when missing
    pub async fn migrate(&self) -> anyhow::Result<()> {
        self.conn
            .execute_unprepared(SCHEMA)
            .await
            .context("Failed to apply schema")?;
        Ok(())
    }

    fn select(query: &Query) -> (&'static str, Vec<Value>) {
        match query {
            Query::LatestMessageForOwner { owner } => (
                r#"
                SELECT to_jsonb(m) AS row
                FROM messages AS m
                WHERE m.owner = $1
                ORDER BY m.last_fetch DESC
                "#,
                vec![(*owner).into()],
            ),
            Query::ClusterMembers { owner, start, end } => (
                r#"
                SELECT jsonb_build_object(
                    'message_id', p.message_id,
                    'email', p.email,
                    'name', p.name,
                    'domain', p.domain,
                    'role', p.role,
                    'date', b.date
                ) AS row
                FROM participants AS p
                JOIN parsed_bodies AS b ON b.message_id = p.message_id
                JOIN messages AS m ON m.message_id = p.message_id
                WHERE m.owner = $1
                    AND b.date >= $2
                    AND b.date <= $3
                ORDER BY p.message_id, p.id
                "#,
                vec![(*owner).into(), (*start).into(), (*end).into()],
            ),
            Query::TaskById { task_id } => (
                r#"
                SELECT to_jsonb(t) AS row
                FROM tasks AS t
                WHERE t.id = $1
                "#,
                vec![(*task_id).into()],
            ),
        }
    }
}

fn insert_sql(table: Table) -> String {
    let columns = table.columns().join(", ");
    format!(
        "INSERT INTO {table} ({columns}) \
         SELECT {columns} FROM jsonb_populate_recordset(NULL::{table}, $1::jsonb) \
         ON CONFLICT DO NOTHING"
    )
}

#[async_trait]
impl Store for SeaOrmStore {
    async fn insert_rows(&self, table: Table, rows: Vec<Row>) -> anyhow::Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let count = rows.len();
        let result = self
            .conn
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                insert_sql(table),
                [JsonValue::Array(rows).into()],
            ))
            .await
            .with_context(|| format!("Error inserting {} rows into {}", count, table))?;

        Ok(result.rows_affected())
    }

    async fn fetch_all(&self, query: &Query) -> anyhow::Result<Vec<Row>> {
        let (sql, values) = Self::select(query);
        let rows = JsonRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            values,
        ))
        .all(&self.conn)
        .await
        .with_context(|| format!("Error running {:?}", query))?;

        Ok(rows.into_iter().map(|r| r.row).collect())
    }

    async fn fetch_one(&self, query: &Query) -> anyhow::Result<Option<Row>> {
        let (sql, values) = Self::select(query);
        let row = JsonRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            values,
        ))
        .one(&self.conn)
        .await
        .with_context(|| format!("Error running {:?}", query))?;

        Ok(row.map(|r| r.row))
    }

    async fn update_task_record(&self, task_id: Uuid, update: TaskUpdate) -> anyhow::Result<()> {
        let result = self
            .conn
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "UPDATE tasks SET time_finished = $1, error = $2, success = $3 WHERE id = $4",
                [
                    update.time_finished.into(),
                    update.error.into(),
                    update.success.into(),
                    task_id.into(),
                ],
            ))
            .await
            .context("Error updating task record")?;

        anyhow::ensure!(result.rows_affected() == 1, "task {} not found", task_id);
        Ok(())
    }
}
