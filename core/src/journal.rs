//! Append-only logs: intents, evidence and the changelog.
//!
//! Every insert validates that the referenced task exists; records are
//! immutable afterwards. Oversized payloads are clipped, never rejected.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{CoordError, Result};
use crate::events::{EventBus, EventKind};
use crate::models::{
    clip_output, new_id, ChangeType, ChangelogEntry, Evidence, Intent, NewChange, NewEvidence,
    NewIntent,
};
use crate::store::Store;
use crate::validation::Validate;

/// Intent declarations per (task, agent).
pub struct IntentLog<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
}

impl<S: Store> IntentLog<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, bus: Arc<EventBus>) -> Self {
        Self { store, clock, bus }
    }

    pub async fn post(&self, input: NewIntent) -> Result<Intent> {
        Validate::agent_id(&input.agent_id)?;
        Validate::files(&input.files)?;
        if let Some(ref criteria) = input.acceptance_criteria {
            Validate::acceptance_criteria(criteria)?;
        }
        if self.store.get_task(&input.task_id).await?.is_none() {
            return Err(CoordError::task_not_found(&input.task_id));
        }

        let intent = Intent {
            id: new_id(),
            task_id: input.task_id,
            agent_id: input.agent_id,
            files: input.files,
            boundaries: input.boundaries,
            acceptance_criteria: input.acceptance_criteria,
            created_at: self.clock.now_ms(),
        };
        self.store.insert_intent(&intent).await?;
        tracing::info!(
            task_id = %intent.task_id,
            agent_id = %intent.agent_id,
            files = intent.files.len(),
            "intent posted"
        );
        self.bus.publish(EventKind::IntentPosted {
            intent: intent.clone(),
        });
        Ok(intent)
    }
}

/// Proof-of-work records per (task, agent).
pub struct EvidenceLog<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
}

impl<S: Store> EvidenceLog<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, bus: Arc<EventBus>) -> Self {
        Self { store, clock, bus }
    }

    pub async fn attach(&self, input: NewEvidence) -> Result<Evidence> {
        Validate::agent_id(&input.agent_id)?;
        Validate::command(&input.command)?;
        Validate::output(&input.output)?;
        if self.store.get_task(&input.task_id).await?.is_none() {
            return Err(CoordError::task_not_found(&input.task_id));
        }

        let evidence = Evidence {
            id: new_id(),
            task_id: input.task_id,
            agent_id: input.agent_id,
            command: input.command,
            output: clip_output(&input.output),
            created_at: self.clock.now_ms(),
        };
        self.store.insert_evidence(&evidence).await?;
        tracing::info!(
            task_id = %evidence.task_id,
            agent_id = %evidence.agent_id,
            "evidence attached"
        );
        self.bus.publish(EventKind::EvidenceAttached {
            evidence: evidence.clone(),
        });
        Ok(evidence)
    }
}

/// The audit trail. The kernel never watches the filesystem itself; file
/// entries arrive from the watcher or from agents through here.
pub struct ChangeJournal<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
}

impl<S: Store> ChangeJournal<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, bus: Arc<EventBus>) -> Self {
        Self { store, clock, bus }
    }

    pub async fn log(&self, input: NewChange) -> Result<ChangelogEntry> {
        if let Some(ref task_id) = input.task_id {
            if self.store.get_task(task_id).await?.is_none() {
                return Err(CoordError::task_not_found(task_id));
            }
        }

        let file_path = match input.file_path {
            Some(path) if !path.is_empty() => path,
            _ => match &input.task_id {
                Some(task_id) => format!("task:{task_id}"),
                None => return Err(CoordError::empty_field("filePath")),
            },
        };

        let entry = ChangelogEntry {
            id: new_id(),
            task_id: input.task_id,
            author: input.author,
            file_path,
            change_type: input.change_type,
            summary: input.summary,
            diff_snippet: input.diff_snippet.as_deref().map(clip_output),
            commit_hash: input.commit_hash,
            created_at: self.clock.now_ms(),
        };
        self.store.insert_change(&entry).await?;

        self.bus.publish(EventKind::ChangelogLogged {
            entry: entry.clone(),
        });
        if entry.change_type.is_file_change() {
            let agent_id = entry.author.as_str().to_string();
            let path = entry.file_path.clone();
            let file_event = match entry.change_type {
                ChangeType::Create => EventKind::FileAdded {
                    path,
                    agent_id,
                },
                ChangeType::Delete => EventKind::FileDeleted {
                    path,
                    agent_id,
                },
                _ => EventKind::FileChanged {
                    path,
                    agent_id,
                },
            };
            self.bus.publish(file_event);
        }
        Ok(entry)
    }
}
