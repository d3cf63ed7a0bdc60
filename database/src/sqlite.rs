//! SQLite implementation of the coordination store.
//!
//! WAL journal mode, foreign keys on, busy timeout, pooled connections.
//! Schema lives in `migrations/sqlite` and is applied with
//! [`SqliteStore::migrate`]; the kanban columns arrive in an additive
//! migration so databases from older deployments upgrade in place.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use foreman_core::error::{CoordError, Result};
use foreman_core::models::{
    Agent, Blocker, ChangelogEntry, ClaimRow, Comment, Dependency, Evidence, Gate, GateRun,
    Intent, Task, TaskFilter, TaskStatus, TimestampMs, WipLimit,
};
use foreman_core::store::{ClaimStore, CollabStore, GateStore, JournalStore, TaskStore};

use crate::common::{
    db_error, encode_list, row_to_agent, row_to_blocker, row_to_changelog, row_to_claim,
    row_to_comment, row_to_evidence, row_to_gate, row_to_gate_run, row_to_intent, row_to_task,
};

/// Pooled SQLite store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a file-backed database.
    pub async fn new(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(db_error)?;
        Ok(Self { pool })
    }

    /// Private in-memory database for tests. The pool is pinned to one
    /// connection so every statement sees the same database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Memory)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(db_error)?;
        Ok(Self { pool })
    }

    /// Apply pending migrations. Safe to call on every startup.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| CoordError::Database(format!("migration failed: {e}")))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// The underlying pool, for tests that need raw SQL.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const TASK_COLUMNS: &str = "id, title, description, status, priority, assigned_agent, \
     due_date, labels, story_points, created_at, started_at, completed_at, updated_at";

#[async_trait]
impl TaskStore for SqliteStore {
    async fn insert_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "INSERT INTO tasks (id, title, description, status, priority, assigned_agent, \
             due_date, labels, story_points, created_at, started_at, completed_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(&task.assigned_agent)
        .bind(task.due_date)
        .bind(encode_list(&task.labels))
        .bind(task.story_points)
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, status = ?, priority = ?, \
             assigned_agent = ?, due_date = ?, labels = ?, story_points = ?, \
             started_at = ?, completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(&task.assigned_agent)
        .bind(task.due_date)
        .bind(encode_list(&task.labels))
        .bind(task.story_points)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.updated_at)
        .bind(&task.id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn delete_task(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1 = 1"));

        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status.as_str());
        }
        if let Some(ref agent) = filter.assigned_agent {
            qb.push(" AND assigned_agent = ");
            qb.push_bind(agent);
        }
        if let Some(ref label) = filter.label {
            // Labels are a JSON array; match the quoted element.
            qb.push(" AND labels LIKE ");
            qb.push_bind(format!("%\"{label}\"%"));
        }
        qb.push(" ORDER BY created_at DESC, id ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(limit));
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn count_tasks_in_status(&self, status: TaskStatus) -> Result<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count as u32)
    }

    async fn insert_dependency(&self, dep: &Dependency) -> Result<()> {
        sqlx::query(
            "INSERT INTO dependencies (task_id, depends_on_task_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(&dep.task_id)
        .bind(&dep.depends_on_task_id)
        .bind(dep.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn delete_dependency(&self, task_id: &str, depends_on: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM dependencies WHERE task_id = ? AND depends_on_task_id = ?",
        )
        .bind(task_id)
        .bind(depends_on)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn dependency_exists(&self, task_id: &str, depends_on: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM dependencies WHERE task_id = ? AND depends_on_task_id = ?",
        )
        .bind(task_id)
        .bind(depends_on)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(count > 0)
    }

    async fn dependencies_of(&self, task_id: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT depends_on_task_id FROM dependencies WHERE task_id = ? ORDER BY created_at",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn dependents_of(&self, task_id: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT task_id FROM dependencies WHERE depends_on_task_id = ? ORDER BY created_at",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn set_wip_limit(&self, status: TaskStatus, limit: Option<u32>) -> Result<()> {
        match limit {
            Some(cap) => {
                sqlx::query(
                    "INSERT INTO wip_limits (status, task_limit) VALUES (?, ?) \
                     ON CONFLICT(status) DO UPDATE SET task_limit = excluded.task_limit",
                )
                .bind(status.as_str())
                .bind(i64::from(cap))
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            }
            None => {
                sqlx::query("DELETE FROM wip_limits WHERE status = ?")
                    .bind(status.as_str())
                    .execute(&self.pool)
                    .await
                    .map_err(db_error)?;
            }
        }
        Ok(())
    }

    async fn get_wip_limit(&self, status: TaskStatus) -> Result<Option<u32>> {
        let limit: Option<i64> =
            sqlx::query_scalar("SELECT task_limit FROM wip_limits WHERE status = ?")
                .bind(status.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        Ok(limit.map(|l| l as u32))
    }

    async fn list_wip_limits(&self) -> Result<Vec<WipLimit>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, task_limit FROM wip_limits ORDER BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
        rows.into_iter()
            .map(|(status, limit)| {
                Ok(WipLimit {
                    status: status
                        .parse()
                        .map_err(|e: String| CoordError::Database(e))?,
                    limit: limit as u32,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ClaimStore for SqliteStore {
    async fn prune_claims(&self, now: TimestampMs) -> Result<u64> {
        let result = sqlx::query("DELETE FROM claims WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        let pruned = result.rows_affected();
        if pruned > 0 {
            tracing::debug!(pruned, "expired claims pruned");
        }
        Ok(pruned)
    }

    async fn active_claim_rows(&self, now: TimestampMs) -> Result<Vec<ClaimRow>> {
        let rows = sqlx::query(
            "SELECT agent_id, file_path, expires_at, created_at FROM claims \
             WHERE expires_at > ? ORDER BY agent_id, file_path",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.iter().map(row_to_claim).collect())
    }

    async fn conflicting_agents(
        &self,
        agent_id: &str,
        files: &[String],
        now: TimestampMs,
    ) -> Result<Vec<String>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT DISTINCT agent_id FROM claims WHERE agent_id <> ",
        );
        qb.push_bind(agent_id);
        qb.push(" AND expires_at > ");
        qb.push_bind(now);
        qb.push(" AND file_path IN (");
        let mut sep = qb.separated(", ");
        for file in files {
            sep.push_bind(file);
        }
        qb.push(") ORDER BY agent_id");

        let rows: Vec<String> = qb
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows)
    }

    async fn upsert_claim_rows(
        &self,
        agent_id: &str,
        files: &[String],
        expires_at: TimestampMs,
        created_at: TimestampMs,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for file in files {
            sqlx::query(
                "INSERT INTO claims (agent_id, file_path, expires_at, created_at) \
                 VALUES (?, ?, ?, ?) \
                 ON CONFLICT(agent_id, file_path) DO UPDATE SET \
                 expires_at = excluded.expires_at, created_at = excluded.created_at",
            )
            .bind(agent_id)
            .bind(file)
            .bind(expires_at)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn delete_claim_rows(&self, agent_id: &str, files: Option<&[String]>) -> Result<u64> {
        let result = match files {
            None => sqlx::query("DELETE FROM claims WHERE agent_id = ?")
                .bind(agent_id)
                .execute(&self.pool)
                .await
                .map_err(db_error)?,
            Some(list) => {
                if list.is_empty() {
                    return Ok(0);
                }
                let mut qb: QueryBuilder<Sqlite> =
                    QueryBuilder::new("DELETE FROM claims WHERE agent_id = ");
                qb.push_bind(agent_id);
                qb.push(" AND file_path IN (");
                let mut sep = qb.separated(", ");
                for file in list {
                    sep.push_bind(file);
                }
                qb.push(")");
                qb.build().execute(&self.pool).await.map_err(db_error)?
            }
        };
        Ok(result.rows_affected())
    }

    async fn extend_claim_rows(
        &self,
        agent_id: &str,
        files: Option<&[String]>,
        additional_ms: TimestampMs,
        now: TimestampMs,
    ) -> Result<u64> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE claims SET expires_at = expires_at + ");
        qb.push_bind(additional_ms);
        qb.push(" WHERE agent_id = ");
        qb.push_bind(agent_id);
        qb.push(" AND expires_at > ");
        qb.push_bind(now);
        if let Some(list) = files {
            if list.is_empty() {
                return Ok(0);
            }
            qb.push(" AND file_path IN (");
            let mut sep = qb.separated(", ");
            for file in list {
                sep.push_bind(file);
            }
            qb.push(")");
        }
        let result = qb.build().execute(&self.pool).await.map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn agent_claim_files(&self, agent_id: &str, now: TimestampMs) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT file_path FROM claims WHERE agent_id = ? AND expires_at > ? \
             ORDER BY file_path",
        )
        .bind(agent_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }
}

#[async_trait]
impl JournalStore for SqliteStore {
    async fn insert_intent(&self, intent: &Intent) -> Result<()> {
        sqlx::query(
            "INSERT INTO intents (id, task_id, agent_id, files, boundaries, \
             acceptance_criteria, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&intent.id)
        .bind(&intent.task_id)
        .bind(&intent.agent_id)
        .bind(encode_list(&intent.files))
        .bind(encode_list(&intent.boundaries))
        .bind(&intent.acceptance_criteria)
        .bind(intent.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn intents_for(&self, task_id: &str, agent_id: &str) -> Result<Vec<Intent>> {
        let rows = sqlx::query(
            "SELECT id, task_id, agent_id, files, boundaries, acceptance_criteria, created_at \
             FROM intents WHERE task_id = ? AND agent_id = ? ORDER BY created_at, id",
        )
        .bind(task_id)
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.iter().map(row_to_intent).collect())
    }

    async fn intents_by_task(&self, task_id: &str) -> Result<Vec<Intent>> {
        let rows = sqlx::query(
            "SELECT id, task_id, agent_id, files, boundaries, acceptance_criteria, created_at \
             FROM intents WHERE task_id = ? ORDER BY created_at, id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.iter().map(row_to_intent).collect())
    }

    async fn insert_evidence(&self, evidence: &Evidence) -> Result<()> {
        sqlx::query(
            "INSERT INTO evidence (id, task_id, agent_id, command, output, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&evidence.id)
        .bind(&evidence.task_id)
        .bind(&evidence.agent_id)
        .bind(&evidence.command)
        .bind(&evidence.output)
        .bind(evidence.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn evidence_for(&self, task_id: &str, agent_id: &str) -> Result<Vec<Evidence>> {
        let rows = sqlx::query(
            "SELECT id, task_id, agent_id, command, output, created_at FROM evidence \
             WHERE task_id = ? AND agent_id = ? ORDER BY created_at, id",
        )
        .bind(task_id)
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.iter().map(row_to_evidence).collect())
    }

    async fn evidence_by_task(&self, task_id: &str) -> Result<Vec<Evidence>> {
        let rows = sqlx::query(
            "SELECT id, task_id, agent_id, command, output, created_at FROM evidence \
             WHERE task_id = ? ORDER BY created_at, id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.iter().map(row_to_evidence).collect())
    }

    async fn insert_change(&self, entry: &ChangelogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO changelog (id, task_id, agent_id, file_path, change_type, summary, \
             diff_snippet, commit_hash, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.task_id)
        .bind(entry.author.as_str())
        .bind(&entry.file_path)
        .bind(entry.change_type.as_str())
        .bind(&entry.summary)
        .bind(&entry.diff_snippet)
        .bind(&entry.commit_hash)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn changes_for(&self, task_id: &str, agent_id: &str) -> Result<Vec<ChangelogEntry>> {
        let rows = sqlx::query(
            "SELECT id, task_id, agent_id, file_path, change_type, summary, diff_snippet, \
             commit_hash, created_at FROM changelog \
             WHERE task_id = ? AND agent_id = ? ORDER BY created_at, id",
        )
        .bind(task_id)
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(row_to_changelog).collect()
    }

    async fn changes_by_task(&self, task_id: &str) -> Result<Vec<ChangelogEntry>> {
        let rows = sqlx::query(
            "SELECT id, task_id, agent_id, file_path, change_type, summary, diff_snippet, \
             commit_hash, created_at FROM changelog WHERE task_id = ? ORDER BY created_at, id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(row_to_changelog).collect()
    }

    async fn recent_changes(&self, limit: u32) -> Result<Vec<ChangelogEntry>> {
        let rows = sqlx::query(
            "SELECT id, task_id, agent_id, file_path, change_type, summary, diff_snippet, \
             commit_hash, created_at FROM changelog ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(row_to_changelog).collect()
    }
}

#[async_trait]
impl GateStore for SqliteStore {
    async fn insert_gate(&self, gate: &Gate) -> Result<()> {
        sqlx::query(
            "INSERT INTO gates (id, task_id, gate_type, command, trigger_status, required, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&gate.id)
        .bind(&gate.task_id)
        .bind(gate.gate_type.as_str())
        .bind(&gate.command)
        .bind(gate.trigger_status.as_str())
        .bind(gate.required)
        .bind(gate.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_gate(&self, id: &str) -> Result<Option<Gate>> {
        let row = sqlx::query(
            "SELECT id, task_id, gate_type, command, trigger_status, required, created_at \
             FROM gates WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.as_ref().map(row_to_gate).transpose()
    }

    async fn gates_for(&self, task_id: &str, trigger: TaskStatus) -> Result<Vec<Gate>> {
        let rows = sqlx::query(
            "SELECT id, task_id, gate_type, command, trigger_status, required, created_at \
             FROM gates WHERE task_id = ? AND trigger_status = ? ORDER BY created_at, id",
        )
        .bind(task_id)
        .bind(trigger.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(row_to_gate).collect()
    }

    async fn gates_by_task(&self, task_id: &str) -> Result<Vec<Gate>> {
        let rows = sqlx::query(
            "SELECT id, task_id, gate_type, command, trigger_status, required, created_at \
             FROM gates WHERE task_id = ? ORDER BY created_at, id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(row_to_gate).collect()
    }

    async fn insert_gate_run(&self, run: &GateRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO gate_runs (id, gate_id, task_id, agent_id, passed, output, \
             duration_ms, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.id)
        .bind(&run.gate_id)
        .bind(&run.task_id)
        .bind(&run.agent_id)
        .bind(run.passed)
        .bind(&run.output)
        .bind(run.duration_ms)
        .bind(run.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn latest_gate_run(&self, gate_id: &str) -> Result<Option<GateRun>> {
        let row = sqlx::query(
            "SELECT id, gate_id, task_id, agent_id, passed, output, duration_ms, created_at \
             FROM gate_runs WHERE gate_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(gate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.as_ref().map(row_to_gate_run))
    }
}

#[async_trait]
impl CollabStore for SqliteStore {
    async fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            "INSERT INTO agents (agent_id, capabilities, registered_at, last_seen_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(agent_id) DO UPDATE SET capabilities = excluded.capabilities, \
             last_seen_at = excluded.last_seen_at",
        )
        .bind(&agent.agent_id)
        .bind(encode_list(&agent.capabilities))
        .bind(agent.registered_at)
        .bind(agent.last_seen_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query(
            "SELECT agent_id, capabilities, registered_at, last_seen_at FROM agents \
             WHERE agent_id = ?",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.as_ref().map(row_to_agent))
    }

    async fn touch_agent(&self, agent_id: &str, seen_at: TimestampMs) -> Result<bool> {
        let result = sqlx::query("UPDATE agents SET last_seen_at = ? WHERE agent_id = ?")
            .bind(seen_at)
            .bind(agent_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query(
            "SELECT agent_id, capabilities, registered_at, last_seen_at FROM agents \
             ORDER BY agent_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.iter().map(row_to_agent).collect())
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<()> {
        sqlx::query(
            "INSERT INTO comments (id, task_id, author, body, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(&comment.task_id)
        .bind(comment.author.as_str())
        .bind(&comment.body)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn comments_by_task(&self, task_id: &str) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT id, task_id, author, body, created_at FROM comments \
             WHERE task_id = ? ORDER BY created_at, id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.iter().map(row_to_comment).collect())
    }

    async fn insert_blocker(&self, blocker: &Blocker) -> Result<()> {
        sqlx::query(
            "INSERT INTO blockers (id, task_id, agent_id, reason, resolved, resolved_at, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&blocker.id)
        .bind(&blocker.task_id)
        .bind(&blocker.agent_id)
        .bind(&blocker.reason)
        .bind(blocker.resolved)
        .bind(blocker.resolved_at)
        .bind(blocker.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_blocker(&self, id: &str) -> Result<Option<Blocker>> {
        let row = sqlx::query(
            "SELECT id, task_id, agent_id, reason, resolved, resolved_at, created_at \
             FROM blockers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.as_ref().map(row_to_blocker))
    }

    async fn resolve_blocker(&self, id: &str, resolved_at: TimestampMs) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE blockers SET resolved = 1, resolved_at = ? WHERE id = ?",
        )
        .bind(resolved_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn blockers_by_task(&self, task_id: &str) -> Result<Vec<Blocker>> {
        let rows = sqlx::query(
            "SELECT id, task_id, agent_id, reason, resolved, resolved_at, created_at \
             FROM blockers WHERE task_id = ? ORDER BY created_at, id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.iter().map(row_to_blocker).collect())
    }
}
