//! Persistence contracts for the coordination kernel.
//!
//! Implementations own durability and indexing only; workflow rules live
//! in the kernel components. All methods must be safe for concurrent
//! readers; write serialization is the coordinator's job, so no method
//! here needs to be atomic beyond its own statement (the one exception is
//! [`ClaimStore::upsert_claim_rows`], which must write all rows in one
//! transaction).
//!
//! Implementations must enforce these cascade rules: deleting a task
//! removes its intents, evidence, comments, blockers, gates, gate runs
//! and dependency edges; changelog entries survive with their `task_id`
//! cleared.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Agent, Blocker, ChangelogEntry, ClaimRow, Comment, Dependency, Evidence, Gate, GateRun,
    Intent, Task, TaskFilter, TaskStatus, TimestampMs, WipLimit,
};

/// Tasks, dependency edges and WIP limits.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a freshly created task.
    ///
    /// # Arguments
    /// * `task` - The complete task row, id and timestamps already assigned
    ///
    /// # Returns
    /// * `Ok(())` - The row was written
    /// * `Err(CoordError::Database)` - If the write fails (including a
    ///   duplicate id)
    async fn insert_task(&self, task: &Task) -> Result<()>;

    /// Overwrite an existing task with a full row; the kernel computes
    /// the new state.
    ///
    /// # Arguments
    /// * `task` - The replacement row, keyed by `task.id`
    ///
    /// # Returns
    /// * `Ok(())` - The row was written (a missing id is a silent no-op;
    ///   the kernel loads before updating)
    /// * `Err(CoordError::Database)` - If the write fails
    async fn update_task(&self, task: &Task) -> Result<()>;

    /// Fetch one task by id.
    ///
    /// # Returns
    /// * `Ok(Some(Task))` - The task if present
    /// * `Ok(None)` - If no task has that id
    /// * `Err(CoordError::Database)` - If the query fails
    async fn get_task(&self, id: &str) -> Result<Option<Task>>;

    /// Delete a task and cascade per the module rules.
    ///
    /// # Returns
    /// * `Ok(true)` - The task existed and was removed
    /// * `Ok(false)` - No task had that id
    /// * `Err(CoordError::Database)` - If the delete fails
    async fn delete_task(&self, id: &str) -> Result<bool>;

    /// List tasks matching the filter, newest first.
    ///
    /// # Arguments
    /// * `filter` - Status/agent/label criteria combined with AND;
    ///   `filter.limit` caps the result
    ///
    /// # Returns
    /// * `Ok(Vec<Task>)` - The matching tasks (may be empty)
    /// * `Err(CoordError::Database)` - If the query fails
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Count the tasks currently sitting in one status column.
    async fn count_tasks_in_status(&self, status: TaskStatus) -> Result<u32>;

    /// Insert a dependency edge. The kernel has already rejected
    /// self-loops, duplicates and cycles.
    ///
    /// # Returns
    /// * `Ok(())` - The edge was written
    /// * `Err(CoordError::Database)` - If the write fails
    async fn insert_dependency(&self, dep: &Dependency) -> Result<()>;

    /// Remove one dependency edge.
    ///
    /// # Returns
    /// * `Ok(true)` - The edge existed and was removed
    /// * `Ok(false)` - No such edge
    /// * `Err(CoordError::Database)` - If the delete fails
    async fn delete_dependency(&self, task_id: &str, depends_on: &str) -> Result<bool>;

    /// Whether the exact edge `task_id -> depends_on` exists.
    async fn dependency_exists(&self, task_id: &str, depends_on: &str) -> Result<bool>;

    /// Ids this task depends on (direct edges only).
    ///
    /// # Returns
    /// * `Ok(Vec<String>)` - Direct dependency ids, possibly empty
    /// * `Err(CoordError::Database)` - If the query fails
    async fn dependencies_of(&self, task_id: &str) -> Result<Vec<String>>;

    /// Ids that depend on this task (direct edges only).
    async fn dependents_of(&self, task_id: &str) -> Result<Vec<String>>;

    /// Set or clear the WIP limit for a column.
    ///
    /// # Arguments
    /// * `status` - The column; the kernel never passes `cancelled`
    /// * `limit` - The cap, or `None` to clear it
    ///
    /// # Returns
    /// * `Ok(())` - The limit was stored or cleared
    /// * `Err(CoordError::Database)` - If the write fails
    async fn set_wip_limit(&self, status: TaskStatus, limit: Option<u32>) -> Result<()>;

    /// The configured limit for a column, if any.
    async fn get_wip_limit(&self, status: TaskStatus) -> Result<Option<u32>>;

    /// All configured limits, in stable (status-name) order.
    async fn list_wip_limits(&self) -> Result<Vec<WipLimit>>;
}

/// Advisory file leases. Rows with `expires_at <= now` are logically
/// absent; `prune_claims` makes that physical.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Delete rows whose `expires_at` is at or before `now`.
    ///
    /// # Arguments
    /// * `now` - The kernel clock reading for this operation
    ///
    /// # Returns
    /// * `Ok(u64)` - How many rows went away
    /// * `Err(CoordError::Database)` - If the delete fails
    async fn prune_claims(&self, now: TimestampMs) -> Result<u64>;

    /// Every row still active at `now`.
    ///
    /// # Returns
    /// * `Ok(Vec<ClaimRow>)` - Active rows in (agent, path) order
    /// * `Err(CoordError::Database)` - If the query fails
    async fn active_claim_rows(&self, now: TimestampMs) -> Result<Vec<ClaimRow>>;

    /// Distinct other agents holding an active lease on any of `files`.
    ///
    /// # Arguments
    /// * `agent_id` - The claimant; its own rows never conflict
    /// * `files` - The paths being requested
    /// * `now` - The kernel clock reading for this operation
    ///
    /// # Returns
    /// * `Ok(Vec<String>)` - Conflicting agent ids, sorted, possibly empty
    /// * `Err(CoordError::Database)` - If the query fails
    async fn conflicting_agents(
        &self,
        agent_id: &str,
        files: &[String],
        now: TimestampMs,
    ) -> Result<Vec<String>>;

    /// Upsert one row per file in a single transaction. A same-agent row
    /// is replaced, refreshing `expires_at` and `created_at`.
    ///
    /// # Arguments
    /// * `agent_id` - The lease holder
    /// * `files` - One row per path
    /// * `expires_at` - Expiry for every row in the batch
    /// * `created_at` - Creation stamp for every row in the batch
    ///
    /// # Returns
    /// * `Ok(())` - All rows were written atomically
    /// * `Err(CoordError::Database)` - If any write fails (none are kept)
    async fn upsert_claim_rows(
        &self,
        agent_id: &str,
        files: &[String],
        expires_at: TimestampMs,
        created_at: TimestampMs,
    ) -> Result<()>;

    /// Delete this agent's rows; all of them when `files` is `None`.
    ///
    /// # Returns
    /// * `Ok(u64)` - The number of rows removed
    /// * `Err(CoordError::Database)` - If the delete fails
    async fn delete_claim_rows(&self, agent_id: &str, files: Option<&[String]>) -> Result<u64>;

    /// Push out `expires_at` on the agent's still-active rows; expired
    /// rows are not revived.
    ///
    /// # Arguments
    /// * `agent_id` - The lease holder
    /// * `files` - Restrict to these paths, or `None` for all
    /// * `additional_ms` - Added to each row's current `expires_at`
    /// * `now` - Rows at or past this instant are left alone
    ///
    /// # Returns
    /// * `Ok(u64)` - The number of rows extended
    /// * `Err(CoordError::Database)` - If the update fails
    async fn extend_claim_rows(
        &self,
        agent_id: &str,
        files: Option<&[String]>,
        additional_ms: TimestampMs,
        now: TimestampMs,
    ) -> Result<u64>;

    /// Active file paths held by one agent, sorted.
    async fn agent_claim_files(&self, agent_id: &str, now: TimestampMs) -> Result<Vec<String>>;
}

/// Append-only journals: intents, evidence and the changelog.
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Append an intent record. The kernel has already verified the task
    /// exists and clipped nothing (intents are never clipped).
    ///
    /// # Returns
    /// * `Ok(())` - The record was written
    /// * `Err(CoordError::Database)` - If the write fails
    async fn insert_intent(&self, intent: &Intent) -> Result<()>;

    /// Intents declared by one agent for one task, oldest first.
    async fn intents_for(&self, task_id: &str, agent_id: &str) -> Result<Vec<Intent>>;

    /// Every intent on a task, oldest first.
    async fn intents_by_task(&self, task_id: &str) -> Result<Vec<Intent>>;

    /// Append an evidence record (output already clipped by the kernel).
    ///
    /// # Returns
    /// * `Ok(())` - The record was written
    /// * `Err(CoordError::Database)` - If the write fails
    async fn insert_evidence(&self, evidence: &Evidence) -> Result<()>;

    /// Evidence attached by one agent to one task, oldest first.
    async fn evidence_for(&self, task_id: &str, agent_id: &str) -> Result<Vec<Evidence>>;

    /// Every evidence record on a task, oldest first.
    async fn evidence_by_task(&self, task_id: &str) -> Result<Vec<Evidence>>;

    /// Append a changelog entry.
    ///
    /// # Returns
    /// * `Ok(())` - The record was written
    /// * `Err(CoordError::Database)` - If the write fails
    async fn insert_change(&self, entry: &ChangelogEntry) -> Result<()>;

    /// Changelog entries authored by one agent on one task, oldest first.
    ///
    /// # Arguments
    /// * `task_id` - The task whose history is wanted
    /// * `agent_id` - Matches the persisted author string, so the
    ///   `"system"` sentinel selects kernel-authored entries
    ///
    /// # Returns
    /// * `Ok(Vec<ChangelogEntry>)` - Matching entries, possibly empty
    /// * `Err(CoordError::Database)` - If the query fails
    async fn changes_for(&self, task_id: &str, agent_id: &str) -> Result<Vec<ChangelogEntry>>;

    /// Every changelog entry on a task, oldest first.
    async fn changes_by_task(&self, task_id: &str) -> Result<Vec<ChangelogEntry>>;

    /// Newest entries across all tasks, newest first, at most `limit`.
    async fn recent_changes(&self, limit: u32) -> Result<Vec<ChangelogEntry>>;
}

/// Gate definitions and their immutable run history.
#[async_trait]
pub trait GateStore: Send + Sync {
    /// Insert a gate definition.
    ///
    /// # Returns
    /// * `Ok(())` - The gate was written
    /// * `Err(CoordError::Database)` - If the write fails
    async fn insert_gate(&self, gate: &Gate) -> Result<()>;

    /// Fetch one gate by id.
    ///
    /// # Returns
    /// * `Ok(Some(Gate))` - The gate if present
    /// * `Ok(None)` - If no gate has that id
    /// * `Err(CoordError::Database)` - If the query fails
    async fn get_gate(&self, id: &str) -> Result<Option<Gate>>;

    /// Gates bound to one task for one trigger status, oldest first.
    async fn gates_for(&self, task_id: &str, trigger: TaskStatus) -> Result<Vec<Gate>>;

    /// Every gate on a task, oldest first.
    async fn gates_by_task(&self, task_id: &str) -> Result<Vec<Gate>>;

    /// Append a gate run (output already clipped by the kernel).
    async fn insert_gate_run(&self, run: &GateRun) -> Result<()>;

    /// The most recent run for a gate, by `created_at`.
    ///
    /// # Returns
    /// * `Ok(Some(GateRun))` - The latest run, ties broken by id
    /// * `Ok(None)` - The gate has never run
    /// * `Err(CoordError::Database)` - If the query fails
    async fn latest_gate_run(&self, gate_id: &str) -> Result<Option<GateRun>>;
}

/// Agents, comments and blockers.
#[async_trait]
pub trait CollabStore: Send + Sync {
    /// Insert or replace an agent row, keyed by `agent.agent_id`.
    ///
    /// # Returns
    /// * `Ok(())` - The row was written
    /// * `Err(CoordError::Database)` - If the write fails
    async fn upsert_agent(&self, agent: &Agent) -> Result<()>;

    /// Fetch one agent by id.
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>>;

    /// Bump an agent's `last_seen_at`.
    ///
    /// # Returns
    /// * `Ok(true)` - The agent existed and was touched
    /// * `Ok(false)` - The agent is unknown
    /// * `Err(CoordError::Database)` - If the update fails
    async fn touch_agent(&self, agent_id: &str, seen_at: TimestampMs) -> Result<bool>;

    /// All registered agents, in id order.
    async fn list_agents(&self) -> Result<Vec<Agent>>;

    /// Append a comment.
    async fn insert_comment(&self, comment: &Comment) -> Result<()>;

    /// Comments on a task, oldest first.
    async fn comments_by_task(&self, task_id: &str) -> Result<Vec<Comment>>;

    /// Append a blocker.
    async fn insert_blocker(&self, blocker: &Blocker) -> Result<()>;

    /// Fetch one blocker by id.
    async fn get_blocker(&self, id: &str) -> Result<Option<Blocker>>;

    /// Mark a blocker resolved.
    ///
    /// # Returns
    /// * `Ok(true)` - The blocker existed and is now resolved
    /// * `Ok(false)` - The blocker is unknown
    /// * `Err(CoordError::Database)` - If the update fails
    async fn resolve_blocker(&self, id: &str, resolved_at: TimestampMs) -> Result<bool>;

    /// Blockers on a task, oldest first, resolved or not.
    async fn blockers_by_task(&self, task_id: &str) -> Result<Vec<Blocker>>;
}

/// The full persistence surface the kernel needs.
pub trait Store:
    TaskStore + ClaimStore + JournalStore + GateStore + CollabStore + 'static
{
}

impl<T> Store for T where
    T: TaskStore + ClaimStore + JournalStore + GateStore + CollabStore + 'static
{
}
