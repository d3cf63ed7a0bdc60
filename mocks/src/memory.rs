//! Thread-safe in-memory implementation of the full store surface.
//!
//! Mirrors the SQLite store's observable behavior, including cascade
//! rules, so kernel tests can run without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use foreman_core::error::Result;
use foreman_core::models::{
    Agent, Blocker, ChangelogEntry, ClaimRow, Comment, Dependency, Evidence, Gate, GateRun,
    Intent, Task, TaskFilter, TaskStatus, TimestampMs, WipLimit,
};
use foreman_core::store::{ClaimStore, CollabStore, GateStore, JournalStore, TaskStore};

#[derive(Default)]
struct MemoryInner {
    tasks: HashMap<String, Task>,
    dependencies: Vec<Dependency>,
    wip_limits: HashMap<TaskStatus, u32>,
    claims: HashMap<(String, String), ClaimRow>,
    intents: Vec<Intent>,
    evidence: Vec<Evidence>,
    changes: Vec<ChangelogEntry>,
    gates: HashMap<String, Gate>,
    gate_runs: Vec<GateRun>,
    agents: HashMap<String, Agent>,
    comments: Vec<Comment>,
    blockers: HashMap<String, Blocker>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw claim rows, active or not. Handy for invariant assertions.
    pub fn claim_rows(&self) -> Vec<ClaimRow> {
        self.inner.lock().claims.values().cloned().collect()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, task: &Task) -> Result<()> {
        self.inner.lock().tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        self.inner.lock().tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.inner.lock().tasks.get(id).cloned())
    }

    async fn delete_task(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.tasks.remove(id).is_none() {
            return Ok(false);
        }
        inner.intents.retain(|i| i.task_id != id);
        inner.evidence.retain(|e| e.task_id != id);
        inner.comments.retain(|c| c.task_id != id);
        inner.blockers.retain(|_, b| b.task_id != id);
        inner.gates.retain(|_, g| g.task_id != id);
        inner.gate_runs.retain(|r| r.task_id != id);
        inner
            .dependencies
            .retain(|d| d.task_id != id && d.depends_on_task_id != id);
        // History survives the task; only the reference is cleared.
        for entry in inner.changes.iter_mut() {
            if entry.task_id.as_deref() == Some(id) {
                entry.task_id = None;
            }
        }
        Ok(true)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let inner = self.inner.lock();
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| {
                filter
                    .assigned_agent
                    .as_ref()
                    .map_or(true, |a| t.assigned_agent.as_ref() == Some(a))
            })
            .filter(|t| {
                filter
                    .label
                    .as_ref()
                    .map_or(true, |l| t.labels.contains(l))
            })
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = filter.limit {
            tasks.truncate(limit as usize);
        }
        Ok(tasks)
    }

    async fn count_tasks_in_status(&self, status: TaskStatus) -> Result<u32> {
        Ok(self
            .inner
            .lock()
            .tasks
            .values()
            .filter(|t| t.status == status)
            .count() as u32)
    }

    async fn insert_dependency(&self, dep: &Dependency) -> Result<()> {
        self.inner.lock().dependencies.push(dep.clone());
        Ok(())
    }

    async fn delete_dependency(&self, task_id: &str, depends_on: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        let before = inner.dependencies.len();
        inner
            .dependencies
            .retain(|d| !(d.task_id == task_id && d.depends_on_task_id == depends_on));
        Ok(inner.dependencies.len() < before)
    }

    async fn dependency_exists(&self, task_id: &str, depends_on: &str) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .dependencies
            .iter()
            .any(|d| d.task_id == task_id && d.depends_on_task_id == depends_on))
    }

    async fn dependencies_of(&self, task_id: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .dependencies
            .iter()
            .filter(|d| d.task_id == task_id)
            .map(|d| d.depends_on_task_id.clone())
            .collect())
    }

    async fn dependents_of(&self, task_id: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .dependencies
            .iter()
            .filter(|d| d.depends_on_task_id == task_id)
            .map(|d| d.task_id.clone())
            .collect())
    }

    async fn set_wip_limit(&self, status: TaskStatus, limit: Option<u32>) -> Result<()> {
        let mut inner = self.inner.lock();
        match limit {
            Some(cap) => {
                inner.wip_limits.insert(status, cap);
            }
            None => {
                inner.wip_limits.remove(&status);
            }
        }
        Ok(())
    }

    async fn get_wip_limit(&self, status: TaskStatus) -> Result<Option<u32>> {
        Ok(self.inner.lock().wip_limits.get(&status).copied())
    }

    async fn list_wip_limits(&self) -> Result<Vec<WipLimit>> {
        let inner = self.inner.lock();
        let mut limits: Vec<WipLimit> = inner
            .wip_limits
            .iter()
            .map(|(status, limit)| WipLimit {
                status: *status,
                limit: *limit,
            })
            .collect();
        limits.sort_by_key(|l| l.status.as_str());
        Ok(limits)
    }
}

#[async_trait]
impl ClaimStore for MemoryStore {
    async fn prune_claims(&self, now: TimestampMs) -> Result<u64> {
        let mut inner = self.inner.lock();
        let before = inner.claims.len();
        inner.claims.retain(|_, row| row.expires_at > now);
        Ok((before - inner.claims.len()) as u64)
    }

    async fn active_claim_rows(&self, now: TimestampMs) -> Result<Vec<ClaimRow>> {
        Ok(self
            .inner
            .lock()
            .claims
            .values()
            .filter(|row| row.is_active(now))
            .cloned()
            .collect())
    }

    async fn conflicting_agents(
        &self,
        agent_id: &str,
        files: &[String],
        now: TimestampMs,
    ) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let mut agents: Vec<String> = inner
            .claims
            .values()
            .filter(|row| {
                row.agent_id != agent_id
                    && row.is_active(now)
                    && files.contains(&row.file_path)
            })
            .map(|row| row.agent_id.clone())
            .collect();
        agents.sort();
        agents.dedup();
        Ok(agents)
    }

    async fn upsert_claim_rows(
        &self,
        agent_id: &str,
        files: &[String],
        expires_at: TimestampMs,
        created_at: TimestampMs,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        for file in files {
            inner.claims.insert(
                (agent_id.to_string(), file.clone()),
                ClaimRow {
                    agent_id: agent_id.to_string(),
                    file_path: file.clone(),
                    expires_at,
                    created_at,
                },
            );
        }
        Ok(())
    }

    async fn delete_claim_rows(&self, agent_id: &str, files: Option<&[String]>) -> Result<u64> {
        let mut inner = self.inner.lock();
        let before = inner.claims.len();
        inner.claims.retain(|(owner, path), _| {
            owner != agent_id || files.is_some_and(|list| !list.contains(path))
        });
        Ok((before - inner.claims.len()) as u64)
    }

    async fn extend_claim_rows(
        &self,
        agent_id: &str,
        files: Option<&[String]>,
        additional_ms: TimestampMs,
        now: TimestampMs,
    ) -> Result<u64> {
        let mut inner = self.inner.lock();
        let mut extended = 0;
        for ((owner, path), row) in inner.claims.iter_mut() {
            if owner == agent_id
                && row.expires_at > now
                && files.map_or(true, |list| list.contains(path))
            {
                row.expires_at += additional_ms;
                extended += 1;
            }
        }
        Ok(extended)
    }

    async fn agent_claim_files(&self, agent_id: &str, now: TimestampMs) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let mut files: Vec<String> = inner
            .claims
            .values()
            .filter(|row| row.agent_id == agent_id && row.is_active(now))
            .map(|row| row.file_path.clone())
            .collect();
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl JournalStore for MemoryStore {
    async fn insert_intent(&self, intent: &Intent) -> Result<()> {
        self.inner.lock().intents.push(intent.clone());
        Ok(())
    }

    async fn intents_for(&self, task_id: &str, agent_id: &str) -> Result<Vec<Intent>> {
        Ok(self
            .inner
            .lock()
            .intents
            .iter()
            .filter(|i| i.task_id == task_id && i.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn intents_by_task(&self, task_id: &str) -> Result<Vec<Intent>> {
        Ok(self
            .inner
            .lock()
            .intents
            .iter()
            .filter(|i| i.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn insert_evidence(&self, evidence: &Evidence) -> Result<()> {
        self.inner.lock().evidence.push(evidence.clone());
        Ok(())
    }

    async fn evidence_for(&self, task_id: &str, agent_id: &str) -> Result<Vec<Evidence>> {
        Ok(self
            .inner
            .lock()
            .evidence
            .iter()
            .filter(|e| e.task_id == task_id && e.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn evidence_by_task(&self, task_id: &str) -> Result<Vec<Evidence>> {
        Ok(self
            .inner
            .lock()
            .evidence
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn insert_change(&self, entry: &ChangelogEntry) -> Result<()> {
        self.inner.lock().changes.push(entry.clone());
        Ok(())
    }

    async fn changes_for(&self, task_id: &str, agent_id: &str) -> Result<Vec<ChangelogEntry>> {
        Ok(self
            .inner
            .lock()
            .changes
            .iter()
            .filter(|c| c.task_id.as_deref() == Some(task_id) && c.author.as_str() == agent_id)
            .cloned()
            .collect())
    }

    async fn changes_by_task(&self, task_id: &str) -> Result<Vec<ChangelogEntry>> {
        Ok(self
            .inner
            .lock()
            .changes
            .iter()
            .filter(|c| c.task_id.as_deref() == Some(task_id))
            .cloned()
            .collect())
    }

    async fn recent_changes(&self, limit: u32) -> Result<Vec<ChangelogEntry>> {
        let inner = self.inner.lock();
        let mut changes: Vec<ChangelogEntry> = inner.changes.clone();
        changes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        changes.truncate(limit as usize);
        Ok(changes)
    }
}

#[async_trait]
impl GateStore for MemoryStore {
    async fn insert_gate(&self, gate: &Gate) -> Result<()> {
        self.inner.lock().gates.insert(gate.id.clone(), gate.clone());
        Ok(())
    }

    async fn get_gate(&self, id: &str) -> Result<Option<Gate>> {
        Ok(self.inner.lock().gates.get(id).cloned())
    }

    async fn gates_for(&self, task_id: &str, trigger: TaskStatus) -> Result<Vec<Gate>> {
        let inner = self.inner.lock();
        let mut gates: Vec<Gate> = inner
            .gates
            .values()
            .filter(|g| g.task_id == task_id && g.trigger_status == trigger)
            .cloned()
            .collect();
        gates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(gates)
    }

    async fn gates_by_task(&self, task_id: &str) -> Result<Vec<Gate>> {
        let inner = self.inner.lock();
        let mut gates: Vec<Gate> = inner
            .gates
            .values()
            .filter(|g| g.task_id == task_id)
            .cloned()
            .collect();
        gates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(gates)
    }

    async fn insert_gate_run(&self, run: &GateRun) -> Result<()> {
        self.inner.lock().gate_runs.push(run.clone());
        Ok(())
    }

    async fn latest_gate_run(&self, gate_id: &str) -> Result<Option<GateRun>> {
        let inner = self.inner.lock();
        Ok(inner
            .gate_runs
            .iter()
            .filter(|r| r.gate_id == gate_id)
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned())
    }
}

#[async_trait]
impl CollabStore for MemoryStore {
    async fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        self.inner
            .lock()
            .agents
            .insert(agent.agent_id.clone(), agent.clone());
        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        Ok(self.inner.lock().agents.get(agent_id).cloned())
    }

    async fn touch_agent(&self, agent_id: &str, seen_at: TimestampMs) -> Result<bool> {
        let mut inner = self.inner.lock();
        match inner.agents.get_mut(agent_id) {
            Some(agent) => {
                agent.last_seen_at = seen_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let inner = self.inner.lock();
        let mut agents: Vec<Agent> = inner.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<()> {
        self.inner.lock().comments.push(comment.clone());
        Ok(())
    }

    async fn comments_by_task(&self, task_id: &str) -> Result<Vec<Comment>> {
        Ok(self
            .inner
            .lock()
            .comments
            .iter()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn insert_blocker(&self, blocker: &Blocker) -> Result<()> {
        self.inner
            .lock()
            .blockers
            .insert(blocker.id.clone(), blocker.clone());
        Ok(())
    }

    async fn get_blocker(&self, id: &str) -> Result<Option<Blocker>> {
        Ok(self.inner.lock().blockers.get(id).cloned())
    }

    async fn resolve_blocker(&self, id: &str, resolved_at: TimestampMs) -> Result<bool> {
        let mut inner = self.inner.lock();
        match inner.blockers.get_mut(id) {
            Some(blocker) => {
                blocker.resolved = true;
                blocker.resolved_at = Some(resolved_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn blockers_by_task(&self, task_id: &str) -> Result<Vec<Blocker>> {
        let inner = self.inner.lock();
        let mut blockers: Vec<Blocker> = inner
            .blockers
            .values()
            .filter(|b| b.task_id == task_id)
            .cloned()
            .collect();
        blockers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(blockers)
    }
}
