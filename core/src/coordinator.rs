//! The kernel facade.
//!
//! Every mutating operation serializes on one write mutex for the whole
//! of precondition check, store write, changelog append and event
//! publish. That atomicity is what makes the claim conflict scan sound:
//! two agents can never both pass the scan and both upsert. Reads run
//! without the lock; they are snapshot queries against the store.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::claims::ClaimEngine;
use crate::clock::Clock;
use crate::compliance::Compliance;
use crate::error::{CoordError, Result};
use crate::events::{Event, EventBus, EventKind, Subscription};
use crate::gates::GateEvaluator;
use crate::journal::{ChangeJournal, EvidenceLog, IntentLog};
use crate::tasks::TaskGraph;
use crate::models::{
    new_id, Agent, Author, Blocker, Board, ChangeType, ChangelogEntry, Claim, ClaimOutcome,
    Comment, ComplianceReport, Dependency, Evidence, Gate, GateRun, GateStatusReport, Intent,
    NewChange, NewEvidence, NewGate, NewGateRun, NewIntent, NewTask, ReadyReport, Task,
    TaskFilter, TaskStatus, TaskUpdateOutcome, UpdateOptions, UpdateTask, WipLimit,
};
use crate::store::Store;
use crate::validation::Validate;

/// Snapshot served by `/api/status`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub tasks_total: u64,
    pub tasks_by_status: Vec<(TaskStatus, u32)>,
    pub agents: usize,
    pub active_claims: usize,
    pub subscribers: usize,
}

/// Public entry point composing the kernel components over one store.
pub struct Coordinator<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
    claims: ClaimEngine<S>,
    tasks: TaskGraph<S>,
    gates: GateEvaluator<S>,
    intents: IntentLog<S>,
    evidence: EvidenceLog<S>,
    changes: ChangeJournal<S>,
    compliance: Compliance<S>,
    write_lock: Mutex<()>,
}

impl<S: Store> Coordinator<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        let bus = Arc::new(EventBus::new(clock.clone()));
        Self {
            claims: ClaimEngine::new(store.clone(), clock.clone(), bus.clone()),
            tasks: TaskGraph::new(store.clone(), clock.clone(), bus.clone()),
            gates: GateEvaluator::new(store.clone(), clock.clone(), bus.clone()),
            intents: IntentLog::new(store.clone(), clock.clone(), bus.clone()),
            evidence: EvidenceLog::new(store.clone(), clock.clone(), bus.clone()),
            changes: ChangeJournal::new(store.clone(), clock.clone(), bus.clone()),
            compliance: Compliance::new(store.clone(), clock.clone()),
            store,
            clock,
            bus,
            write_lock: Mutex::new(()),
        }
    }

    // ---- tasks ----

    pub async fn create_task(&self, input: NewTask) -> Result<Task> {
        let _guard = self.write_lock.lock().await;
        self.tasks.create(input).await
    }

    pub async fn update_task(
        &self,
        task_id: &str,
        updates: UpdateTask,
        opts: UpdateOptions,
    ) -> Result<TaskUpdateOutcome> {
        let _guard = self.write_lock.lock().await;
        self.tasks.update(task_id, updates, opts).await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.tasks.get(task_id).await
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.tasks.list(filter).await
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.tasks.delete(task_id).await
    }

    pub async fn board(&self, filter: &TaskFilter) -> Result<Board> {
        self.tasks.board(filter).await
    }

    pub async fn add_dependency(&self, task_id: &str, depends_on: &str) -> Result<Dependency> {
        let _guard = self.write_lock.lock().await;
        self.tasks.add_dependency(task_id, depends_on).await
    }

    pub async fn remove_dependency(&self, task_id: &str, depends_on: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.tasks.remove_dependency(task_id, depends_on).await
    }

    pub async fn task_readiness(&self, task_id: &str) -> Result<ReadyReport> {
        self.tasks.get(task_id).await?;
        self.tasks.is_ready(task_id).await
    }

    pub async fn set_wip_limit(&self, status: TaskStatus, limit: Option<u32>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.tasks.set_wip_limit(status, limit).await
    }

    pub async fn list_wip_limits(&self) -> Result<Vec<WipLimit>> {
        self.tasks.list_wip_limits().await
    }

    // ---- intents / evidence / changelog ----

    pub async fn post_intent(&self, input: NewIntent) -> Result<Intent> {
        let _guard = self.write_lock.lock().await;
        self.intents.post(input).await
    }

    pub async fn task_intents(&self, task_id: &str) -> Result<Vec<Intent>> {
        self.tasks.get(task_id).await?;
        self.store.intents_by_task(task_id).await
    }

    pub async fn attach_evidence(&self, input: NewEvidence) -> Result<Evidence> {
        let _guard = self.write_lock.lock().await;
        self.evidence.attach(input).await
    }

    pub async fn task_evidence(&self, task_id: &str) -> Result<Vec<Evidence>> {
        self.tasks.get(task_id).await?;
        self.store.evidence_by_task(task_id).await
    }

    pub async fn log_change(&self, input: NewChange) -> Result<ChangelogEntry> {
        let _guard = self.write_lock.lock().await;
        self.changes.log(input).await
    }

    pub async fn task_changes(&self, task_id: &str) -> Result<Vec<ChangelogEntry>> {
        self.tasks.get(task_id).await?;
        self.store.changes_by_task(task_id).await
    }

    pub async fn recent_changes(&self, limit: u32) -> Result<Vec<ChangelogEntry>> {
        self.store.recent_changes(limit).await
    }

    // ---- claims ----

    pub async fn create_claim(
        &self,
        agent_id: &str,
        files: &[String],
        ttl_seconds: u32,
    ) -> Result<ClaimOutcome> {
        Validate::agent_id(agent_id)?;
        Validate::files(files)?;
        Validate::ttl_seconds(ttl_seconds)?;
        let _guard = self.write_lock.lock().await;
        self.claims.create(agent_id, files, ttl_seconds).await
    }

    pub async fn release_claims(
        &self,
        agent_id: &str,
        files: Option<&[String]>,
    ) -> Result<u64> {
        Validate::agent_id(agent_id)?;
        if let Some(list) = files {
            Validate::files(list)?;
        }
        let _guard = self.write_lock.lock().await;
        self.claims.release(agent_id, files).await
    }

    pub async fn extend_claims(
        &self,
        agent_id: &str,
        additional_seconds: u32,
        files: Option<&[String]>,
    ) -> Result<u64> {
        Validate::agent_id(agent_id)?;
        Validate::ttl_seconds(additional_seconds)?;
        if let Some(list) = files {
            Validate::files(list)?;
        }
        let _guard = self.write_lock.lock().await;
        self.claims.extend(agent_id, additional_seconds, files).await
    }

    /// Prunes, so it takes the write lock despite being a query.
    pub async fn active_claims(&self) -> Result<Vec<Claim>> {
        let _guard = self.write_lock.lock().await;
        self.claims.list_active().await
    }

    pub async fn agent_claims(&self, agent_id: &str) -> Result<Vec<String>> {
        Validate::agent_id(agent_id)?;
        let _guard = self.write_lock.lock().await;
        self.claims.agent_claims(agent_id).await
    }

    // ---- gates ----

    pub async fn define_gate(&self, input: NewGate) -> Result<Gate> {
        let _guard = self.write_lock.lock().await;
        self.gates.define(input).await
    }

    pub async fn record_gate_run(&self, input: NewGateRun) -> Result<GateRun> {
        let _guard = self.write_lock.lock().await;
        self.gates.record_run(input).await
    }

    pub async fn gate_status(
        &self,
        task_id: &str,
        for_status: TaskStatus,
    ) -> Result<GateStatusReport> {
        self.gates.status(task_id, for_status).await
    }

    // ---- compliance ----

    pub async fn compliance_check(
        &self,
        task_id: &str,
        agent_id: &str,
    ) -> Result<ComplianceReport> {
        Validate::agent_id(agent_id)?;
        self.compliance.check(task_id, agent_id).await
    }

    // ---- agents / comments / blockers ----

    pub async fn register_agent(
        &self,
        agent_id: &str,
        capabilities: Vec<String>,
    ) -> Result<Agent> {
        Validate::agent_id(agent_id)?;
        let _guard = self.write_lock.lock().await;

        let now = self.clock.now_ms();
        let registered_at = match self.store.get_agent(agent_id).await? {
            Some(existing) => existing.registered_at,
            None => now,
        };
        let agent = Agent {
            agent_id: agent_id.to_string(),
            capabilities,
            registered_at,
            last_seen_at: now,
        };
        self.store.upsert_agent(&agent).await?;
        tracing::info!(agent_id, "agent registered");
        self.bus.publish(EventKind::AgentRegistered {
            agent: agent.clone(),
        });
        Ok(agent)
    }

    pub async fn agent_heartbeat(&self, agent_id: &str) -> Result<()> {
        Validate::agent_id(agent_id)?;
        let _guard = self.write_lock.lock().await;

        if !self.store.touch_agent(agent_id, self.clock.now_ms()).await? {
            return Err(CoordError::agent_not_found(agent_id));
        }
        self.bus.publish(EventKind::AgentHeartbeat {
            agent_id: agent_id.to_string(),
        });
        Ok(())
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        self.store.list_agents().await
    }

    pub async fn add_comment(
        &self,
        task_id: &str,
        author: Author,
        body: &str,
    ) -> Result<Comment> {
        if body.trim().is_empty() {
            return Err(CoordError::empty_field("body"));
        }
        let _guard = self.write_lock.lock().await;
        self.tasks.get(task_id).await?;

        let now = self.clock.now_ms();
        let comment = Comment {
            id: new_id(),
            task_id: task_id.to_string(),
            author: author.clone(),
            body: body.to_string(),
            created_at: now,
        };
        self.store.insert_comment(&comment).await?;
        self.journal_collab(
            task_id,
            author,
            ChangeType::CommentAdded,
            "comment added".to_string(),
            now,
        )
        .await?;
        self.bus.publish(EventKind::CommentAdded {
            comment: comment.clone(),
        });
        Ok(comment)
    }

    pub async fn task_comments(&self, task_id: &str) -> Result<Vec<Comment>> {
        self.tasks.get(task_id).await?;
        self.store.comments_by_task(task_id).await
    }

    pub async fn add_blocker(
        &self,
        task_id: &str,
        agent_id: &str,
        reason: &str,
    ) -> Result<Blocker> {
        Validate::agent_id(agent_id)?;
        if reason.trim().is_empty() {
            return Err(CoordError::empty_field("reason"));
        }
        let _guard = self.write_lock.lock().await;
        self.tasks.get(task_id).await?;

        let now = self.clock.now_ms();
        let blocker = Blocker {
            id: new_id(),
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            reason: reason.to_string(),
            resolved: false,
            resolved_at: None,
            created_at: now,
        };
        self.store.insert_blocker(&blocker).await?;
        self.journal_collab(
            task_id,
            Author::Agent(agent_id.to_string()),
            ChangeType::BlockerAdded,
            format!("blocker: {reason}"),
            now,
        )
        .await?;
        self.bus.publish(EventKind::BlockerAdded {
            blocker: blocker.clone(),
        });
        Ok(blocker)
    }

    pub async fn resolve_blocker(&self, blocker_id: &str) -> Result<Blocker> {
        let _guard = self.write_lock.lock().await;

        let mut blocker = self
            .store
            .get_blocker(blocker_id)
            .await?
            .ok_or_else(|| CoordError::blocker_not_found(blocker_id))?;
        let now = self.clock.now_ms();
        if !self.store.resolve_blocker(blocker_id, now).await? {
            return Err(CoordError::blocker_not_found(blocker_id));
        }
        blocker.resolved = true;
        blocker.resolved_at = Some(now);

        let task_id = blocker.task_id.clone();
        self.journal_collab(
            &task_id,
            Author::Agent(blocker.agent_id.clone()),
            ChangeType::BlockerResolved,
            format!("blocker resolved: {}", blocker.reason),
            now,
        )
        .await?;
        self.bus.publish(EventKind::BlockerResolved {
            blocker: blocker.clone(),
        });
        Ok(blocker)
    }

    pub async fn task_blockers(&self, task_id: &str) -> Result<Vec<Blocker>> {
        self.tasks.get(task_id).await?;
        self.store.blockers_by_task(task_id).await
    }

    // ---- events ----

    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    pub fn unsubscribe(&self, id: u64) {
        self.bus.unsubscribe(id);
    }

    pub fn recent_events(&self, limit: usize) -> Vec<Event> {
        self.bus.recent(limit)
    }

    pub async fn status_summary(&self) -> Result<StatusSummary> {
        let mut tasks_by_status = Vec::new();
        let mut total = 0u64;
        for status in [
            TaskStatus::Backlog,
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Done,
            TaskStatus::Cancelled,
        ] {
            let count = self.store.count_tasks_in_status(status).await?;
            total += u64::from(count);
            tasks_by_status.push((status, count));
        }
        let agents = self.store.list_agents().await?.len();
        let active_claims = self
            .store
            .active_claim_rows(self.clock.now_ms())
            .await?
            .len();
        Ok(StatusSummary {
            tasks_total: total,
            tasks_by_status,
            agents,
            active_claims,
            subscribers: self.bus.subscriber_count(),
        })
    }

    async fn journal_collab(
        &self,
        task_id: &str,
        author: Author,
        change_type: ChangeType,
        summary: String,
        now: i64,
    ) -> Result<()> {
        let entry = ChangelogEntry {
            id: new_id(),
            task_id: Some(task_id.to_string()),
            author,
            file_path: format!("task:{task_id}"),
            change_type,
            summary,
            diff_snippet: None,
            commit_hash: None,
            created_at: now,
        };
        self.store.insert_change(&entry).await?;
        self.bus.publish(EventKind::ChangelogLogged { entry });
        Ok(())
    }
}
