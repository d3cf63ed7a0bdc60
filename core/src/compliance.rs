//! Post-hoc compliance: does an agent's observable work for a task match
//! what it declared up front?
//!
//! The verdict is advisory. The kernel computes it from its own records
//! (intents, evidence, changelog, live claims); whether `can_complete`
//! blocks the `done` transition is the caller's call.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{CoordError, Result};
use crate::models::{ComplianceCheck, ComplianceReport};
use crate::store::Store;

pub struct Compliance<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> Compliance<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn check(&self, task_id: &str, agent_id: &str) -> Result<ComplianceReport> {
        if self.store.get_task(task_id).await?.is_none() {
            return Err(CoordError::task_not_found(task_id));
        }

        let intents = self.store.intents_for(task_id, agent_id).await?;
        let evidence = self.store.evidence_for(task_id, agent_id).await?;
        let changes = self.store.changes_for(task_id, agent_id).await?;
        let now = self.clock.now_ms();
        let held_files: BTreeSet<String> = self
            .store
            .agent_claim_files(agent_id, now)
            .await?
            .into_iter()
            .collect();

        let declared_files: BTreeSet<&str> = intents
            .iter()
            .flat_map(|i| i.files.iter().map(String::as_str))
            .collect();
        let boundaries: BTreeSet<&str> = intents
            .iter()
            .flat_map(|i| i.boundaries.iter().map(String::as_str))
            .collect();
        let touched_files: BTreeSet<&str> = changes
            .iter()
            .filter(|c| c.change_type.is_file_change())
            .map(|c| c.file_path.as_str())
            .collect();

        let mut checks = Vec::with_capacity(5);

        checks.push(verdict(
            "intent_posted",
            true,
            !intents.is_empty(),
            || format!("{} intent(s) declared", intents.len()),
            || "no intent declared before working".to_string(),
        ));

        checks.push(verdict(
            "evidence_attached",
            true,
            !evidence.is_empty(),
            || format!("{} evidence record(s) attached", evidence.len()),
            || "no evidence of verification work".to_string(),
        ));

        let undeclared: Vec<&str> = touched_files
            .iter()
            .filter(|f| !declared_files.contains(*f))
            .copied()
            .collect();
        checks.push(verdict(
            "files_match_intent",
            false,
            undeclared.is_empty(),
            || format!("all {} touched file(s) were declared", touched_files.len()),
            || format!("touched outside declared intent: {}", undeclared.join(", ")),
        ));

        let crossed: Vec<&str> = touched_files
            .iter()
            .filter(|f| boundaries.iter().any(|b| path_under(f, b)))
            .copied()
            .collect();
        checks.push(verdict(
            "boundaries_respected",
            false,
            crossed.is_empty(),
            || "no declared boundary was crossed".to_string(),
            || format!("touched off-limits paths: {}", crossed.join(", ")),
        ));

        let still_held: Vec<&str> = touched_files
            .iter()
            .filter(|f| held_files.contains(**f))
            .copied()
            .collect();
        checks.push(verdict(
            "claims_released",
            false,
            still_held.is_empty(),
            || "no active claim covers the touched files".to_string(),
            || format!("claims still held on: {}", still_held.join(", ")),
        ));

        let passed = checks.iter().filter(|c| c.passed).count();
        let can_complete = checks.iter().all(|c| c.passed || !c.required);
        Ok(ComplianceReport {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            score: passed as f64 / checks.len() as f64,
            can_complete,
            checks,
        })
    }
}

fn verdict(
    name: &str,
    required: bool,
    passed: bool,
    pass_msg: impl FnOnce() -> String,
    fail_msg: impl FnOnce() -> String,
) -> ComplianceCheck {
    ComplianceCheck {
        name: name.to_string(),
        required,
        passed,
        message: if passed { pass_msg() } else { fail_msg() },
    }
}

/// Prefix containment with path-component awareness: `src/legacy` covers
/// `src/legacy/io.rs` and `src/legacy` itself, but not `src/legacy2`.
fn path_under(path: &str, boundary: &str) -> bool {
    let boundary = boundary.trim_end_matches('/');
    if boundary.is_empty() {
        return false;
    }
    path == boundary
        || path
            .strip_prefix(boundary)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::path_under;

    #[test]
    fn path_under_respects_components() {
        assert!(path_under("src/legacy/io.rs", "src/legacy"));
        assert!(path_under("src/legacy/io.rs", "src/legacy/"));
        assert!(path_under("src/legacy", "src/legacy"));
        assert!(!path_under("src/legacy2/io.rs", "src/legacy"));
        assert!(!path_under("src", "src/legacy"));
        assert!(!path_under("src/x.rs", ""));
    }
}
