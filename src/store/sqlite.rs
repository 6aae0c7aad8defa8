// SPDX-License-Identifier: MIT

//! SQLite graph store
//!
//! Every identifier reaches SQLite as a bound parameter. Node configuration
//! is persisted as serialized JSON text and handed back as a JSON string;
//! parsing it is the assembler's job.

use super::{EdgeRow, GraphStore, NewWorkflow, NodeRow, PromptRow, RowPatch, StoreId, WorkflowRow};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// `GraphStore` backed by a sqlx SQLite pool
#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    /// Open (creating if needed) the database and run migrations
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database exists per connection, so it gets exactly one.
        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and run migrations on it
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        log::debug!("SQLite graph store ready");
        Ok(Self { pool })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid datetime '{}': {}", s, e)))
}

/// Fixed-width so `ORDER BY created_at` sorts chronologically
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn canonical(id: &str) -> String {
    StoreId::parse(id).canonical()
}

fn map_write_error(err: sqlx::Error, what: &str) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE") => {
            StoreError::Conflict(format!("{} already exists", what))
        }
        other => StoreError::Database(other),
    }
}

fn workflow_from_row(row: &SqliteRow) -> Result<WorkflowRow, StoreError> {
    let id: String = row.try_get("id")?;
    let entry_node: Option<String> = row.try_get("entry_node")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(WorkflowRow {
        id: StoreId::parse(&id),
        agent_id: row.try_get("agent_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        entry_node: entry_node
            .filter(|e| !e.trim().is_empty())
            .map(|e| StoreId::parse(&e)),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

fn node_from_row(row: &SqliteRow) -> Result<NodeRow, StoreError> {
    let id: String = row.try_get("id")?;
    let workflow_id: String = row.try_get("workflow_id")?;
    let config: Option<String> = row.try_get("config")?;
    let prompt_id: Option<String> = row.try_get("system_prompt_id")?;

    Ok(NodeRow {
        id: StoreId::parse(&id),
        workflow_id: StoreId::parse(&workflow_id),
        kind: row.try_get("node_type")?,
        name: row.try_get("name")?,
        config: config.map(Value::String),
        response_template: row.try_get("response_template")?,
        prompt_id: prompt_id.map(|p| StoreId::parse(&p)),
        function_name: row.try_get("function_name")?,
    })
}

fn edge_from_row(row: &SqliteRow) -> Result<EdgeRow, StoreError> {
    let workflow_id: String = row.try_get("workflow_id")?;
    let source: String = row.try_get("source_node_id")?;
    let target: String = row.try_get("target_node_id")?;

    Ok(EdgeRow {
        workflow_id: StoreId::parse(&workflow_id),
        source: StoreId::parse(&source),
        target: StoreId::parse(&target),
        condition_value: row.try_get("condition_value")?,
        condition_type: row.try_get("condition_type")?,
        position: row.try_get("position")?,
    })
}

fn serialize_config(config: &Option<Value>) -> Option<String> {
    match config {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(raw.clone()),
        Some(other) => Some(other.to_string()),
    }
}

async fn insert_nodes(
    conn: &mut SqliteConnection,
    workflow_id: &str,
    nodes: &[NodeRow],
) -> Result<(), StoreError> {
    for node in nodes {
        sqlx::query(
            "INSERT INTO workflow_nodes (workflow_id, id, node_type, name, config, response_template, system_prompt_id, function_name)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(workflow_id)
        .bind(node.id.canonical())
        .bind(&node.kind)
        .bind(&node.name)
        .bind(serialize_config(&node.config))
        .bind(&node.response_template)
        .bind(node.prompt_id.as_ref().map(StoreId::canonical))
        .bind(&node.function_name)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error(e, &format!("node '{}'", node.id)))?;
    }
    Ok(())
}

async fn insert_edges(
    conn: &mut SqliteConnection,
    workflow_id: &str,
    edges: &[EdgeRow],
) -> Result<(), StoreError> {
    for edge in edges {
        sqlx::query(
            "INSERT INTO workflow_edges (workflow_id, position, source_node_id, target_node_id, condition_value, condition_type)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(workflow_id)
        .bind(edge.position)
        .bind(edge.source.canonical())
        .bind(edge.target.canonical())
        .bind(&edge.condition_value)
        .bind(&edge.condition_type)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error(e, &format!("edge at position {}", edge.position)))?;
    }
    Ok(())
}

/// Insert-or-keep, then compare what ended up stored
async fn put_prompt(conn: &mut SqliteConnection, prompt: &PromptRow) -> Result<(), StoreError> {
    let id = prompt.id.canonical();
    sqlx::query("INSERT INTO system_prompts (id, content) VALUES (?, ?) ON CONFLICT(id) DO NOTHING")
        .bind(&id)
        .bind(&prompt.content)
        .execute(&mut *conn)
        .await?;

    let stored: String = sqlx::query("SELECT content FROM system_prompts WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *conn)
        .await?
        .try_get("content")?;
    if stored != prompt.content {
        return Err(StoreError::Conflict(format!(
            "prompt '{}' already exists with different content",
            id
        )));
    }
    Ok(())
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn read_workflow(&self, id: &str) -> Result<Option<WorkflowRow>, StoreError> {
        let row = sqlx::query(
            "SELECT id, agent_id, name, description, entry_node, created_at, updated_at
             FROM workflows WHERE id = ?",
        )
        .bind(canonical(id))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(workflow_from_row).transpose()
    }

    async fn read_nodes(&self, workflow_id: &str) -> Result<Vec<NodeRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT workflow_id, id, node_type, name, config, response_template, system_prompt_id, function_name
             FROM workflow_nodes WHERE workflow_id = ? ORDER BY rowid",
        )
        .bind(canonical(workflow_id))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(node_from_row).collect()
    }

    async fn read_edges(&self, workflow_id: &str) -> Result<Vec<EdgeRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT workflow_id, position, source_node_id, target_node_id, condition_value, condition_type
             FROM workflow_edges WHERE workflow_id = ? ORDER BY position",
        )
        .bind(canonical(workflow_id))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(edge_from_row).collect()
    }

    async fn read_prompt(&self, id: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT content FROM system_prompts WHERE id = ?")
            .bind(canonical(id))
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.try_get::<String, _>("content")).transpose()?)
    }

    async fn read_prompts(&self, ids: &[String]) -> Result<HashMap<String, String>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        // Only placeholders are formatted into the statement; values are bound.
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, content FROM system_prompts WHERE id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(canonical(id));
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut found = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let content: String = row.try_get("content")?;
            found.insert(canonical(&id), content);
        }
        Ok(found)
    }

    async fn list_workflows(&self, agent_id: &str) -> Result<Vec<WorkflowRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, agent_id, name, description, entry_node, created_at, updated_at
             FROM workflows WHERE agent_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(workflow_from_row).collect()
    }

    async fn insert_prompt(&self, prompt: &PromptRow) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        put_prompt(&mut tx, prompt).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_workflow(&self, record: &NewWorkflow) -> Result<(), StoreError> {
        let workflow = &record.workflow;
        let workflow_id = workflow.id.canonical();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO workflows (id, agent_id, name, description, entry_node, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&workflow_id)
        .bind(&workflow.agent_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.entry_node.as_ref().map(StoreId::canonical))
        .bind(format_datetime(&workflow.created_at))
        .bind(format_datetime(&workflow.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, &format!("workflow '{}'", workflow_id)))?;

        for prompt in &record.prompts {
            put_prompt(&mut tx, prompt).await?;
        }
        insert_nodes(&mut tx, &workflow_id, &record.nodes).await?;
        insert_edges(&mut tx, &workflow_id, &record.edges).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_workflow(
        &self,
        id: &str,
        patch: &RowPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let workflow_id = canonical(id);
        let mut tx = self.pool.begin().await?;

        let (set_entry, entry_node) = match &patch.entry_node {
            Some(entry) => (true, entry.as_ref().map(StoreId::canonical)),
            None => (false, None),
        };

        let result = sqlx::query(
            "UPDATE workflows
             SET name = COALESCE(?, name),
                 description = COALESCE(?, description),
                 entry_node = CASE WHEN ? THEN ? ELSE entry_node END,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(set_entry)
        .bind(entry_node)
        .bind(format_datetime(&updated_at))
        .bind(&workflow_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(nodes) = &patch.nodes {
            sqlx::query("DELETE FROM workflow_nodes WHERE workflow_id = ?")
                .bind(&workflow_id)
                .execute(&mut *tx)
                .await?;
            insert_nodes(&mut tx, &workflow_id, nodes).await?;
        }

        if let Some(edges) = &patch.edges {
            sqlx::query("DELETE FROM workflow_edges WHERE workflow_id = ?")
                .bind(&workflow_id)
                .execute(&mut *tx)
                .await?;
            insert_edges(&mut tx, &workflow_id, edges).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn delete_workflow(&self, id: &str) -> Result<bool, StoreError> {
        let workflow_id = canonical(id);
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM workflow_edges WHERE workflow_id = ?")
            .bind(&workflow_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM workflow_nodes WHERE workflow_id = ?")
            .bind(&workflow_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(&workflow_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
