//! Time-bounded advisory leases on file paths.
//!
//! The invariant: at any instant, at most one agent holds a non-expired
//! row for a given path. The conflict scan and the upsert must therefore
//! run under the coordinator's write lock; nothing here takes its own
//! lock.
//!
//! Expiry is lazy. No timer fires at `expires_at`; a lease stops
//! existing the next time any claim operation prunes.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::Result;
use crate::events::{EventBus, EventKind};
use crate::models::{Claim, ClaimOutcome};
use crate::store::Store;

/// TTL bounds for a fresh claim, in seconds.
pub const TTL_MIN_SECONDS: u32 = 5;
pub const TTL_MAX_SECONDS: u32 = 3_600;

/// Bounds for a single extension, in seconds.
pub const EXTEND_MIN_SECONDS: u32 = 30;
pub const EXTEND_MAX_SECONDS: u32 = 3_600;

pub struct ClaimEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
}

impl<S: Store> ClaimEngine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, bus: Arc<EventBus>) -> Self {
        Self { store, clock, bus }
    }

    /// Attempt to lease `files` for `agent_id`.
    ///
    /// A conflicted attempt is a no-op on state: the returned outcome
    /// carries the would-be claim and the agents that hold overlapping
    /// active leases, and nothing is written. A same-agent re-claim
    /// replaces the existing rows, refreshing their expiry.
    pub async fn create(
        &self,
        agent_id: &str,
        files: &[String],
        ttl_seconds: u32,
    ) -> Result<ClaimOutcome> {
        let now = self.clock.now_ms();
        self.store.prune_claims(now).await?;

        let ttl = ttl_seconds.clamp(TTL_MIN_SECONDS, TTL_MAX_SECONDS);
        let expires_at = now + i64::from(ttl) * 1_000;
        let files = sorted_unique(files);

        let conflicts = self.store.conflicting_agents(agent_id, &files, now).await?;
        let claim = Claim {
            agent_id: agent_id.to_string(),
            files: files.clone(),
            expires_at,
            created_at: now,
        };

        if !conflicts.is_empty() {
            tracing::warn!(
                agent_id,
                conflicts = ?conflicts,
                "claim refused, files already leased"
            );
            self.bus.publish(EventKind::ClaimConflict {
                agent_id: agent_id.to_string(),
                files,
                conflicts_with: conflicts.clone(),
            });
            return Ok(ClaimOutcome {
                claim,
                conflicts_with: conflicts,
            });
        }

        self.store
            .upsert_claim_rows(agent_id, &files, expires_at, now)
            .await?;
        tracing::info!(agent_id, file_count = files.len(), expires_at, "claim granted");
        self.bus.publish(EventKind::ClaimCreated {
            claim: claim.clone(),
        });

        Ok(ClaimOutcome {
            claim,
            conflicts_with: Vec::new(),
        })
    }

    /// Release this agent's leases on `files`, or all of them when `files`
    /// is `None`. Returns how many rows were released.
    pub async fn release(&self, agent_id: &str, files: Option<&[String]>) -> Result<u64> {
        let now = self.clock.now_ms();
        let released_files = match files {
            Some(list) => sorted_unique(list),
            None => self.store.agent_claim_files(agent_id, now).await?,
        };

        let released = self.store.delete_claim_rows(agent_id, files).await?;
        if released > 0 {
            tracing::info!(agent_id, released, "claims released");
            self.bus.publish(EventKind::ClaimReleased {
                agent_id: agent_id.to_string(),
                files: released_files,
            });
        }
        Ok(released)
    }

    /// Push out the expiry of the agent's still-active leases. Rows that
    /// already expired are not revived. Returns how many rows moved.
    pub async fn extend(
        &self,
        agent_id: &str,
        additional_seconds: u32,
        files: Option<&[String]>,
    ) -> Result<u64> {
        let now = self.clock.now_ms();
        let additional = additional_seconds.clamp(EXTEND_MIN_SECONDS, EXTEND_MAX_SECONDS);
        let additional_ms = i64::from(additional) * 1_000;

        let extended = self
            .store
            .extend_claim_rows(agent_id, files, additional_ms, now)
            .await?;
        if extended > 0 {
            let touched = match files {
                Some(list) => sorted_unique(list),
                None => self.store.agent_claim_files(agent_id, now).await?,
            };
            tracing::info!(agent_id, extended, additional_seconds = additional, "claims extended");
            self.bus.publish(EventKind::ClaimExtended {
                agent_id: agent_id.to_string(),
                files: touched,
            });
        }
        Ok(extended)
    }

    /// All active leases, one aggregated claim per agent: sorted file
    /// union, latest expiry, earliest creation. Ordered by creation time
    /// descending.
    pub async fn list_active(&self) -> Result<Vec<Claim>> {
        let now = self.clock.now_ms();
        self.store.prune_claims(now).await?;

        let rows = self.store.active_claim_rows(now).await?;
        let mut by_agent: std::collections::HashMap<String, Claim> = std::collections::HashMap::new();
        let mut file_sets: std::collections::HashMap<String, BTreeSet<String>> =
            std::collections::HashMap::new();

        for row in rows {
            file_sets
                .entry(row.agent_id.clone())
                .or_default()
                .insert(row.file_path.clone());
            by_agent
                .entry(row.agent_id.clone())
                .and_modify(|claim| {
                    claim.expires_at = claim.expires_at.max(row.expires_at);
                    claim.created_at = claim.created_at.min(row.created_at);
                })
                .or_insert(Claim {
                    agent_id: row.agent_id,
                    files: Vec::new(),
                    expires_at: row.expires_at,
                    created_at: row.created_at,
                });
        }

        let mut claims: Vec<Claim> = by_agent
            .into_values()
            .map(|mut claim| {
                if let Some(set) = file_sets.remove(&claim.agent_id) {
                    claim.files = set.into_iter().collect();
                }
                claim
            })
            .collect();

        claims.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        Ok(claims)
    }

    /// The file paths one agent currently leases.
    pub async fn agent_claims(&self, agent_id: &str) -> Result<Vec<String>> {
        let now = self.clock.now_ms();
        self.store.prune_claims(now).await?;
        self.store.agent_claim_files(agent_id, now).await
    }
}

fn sorted_unique(files: &[String]) -> Vec<String> {
    let set: BTreeSet<&String> = files.iter().collect();
    set.into_iter().cloned().collect()
}
