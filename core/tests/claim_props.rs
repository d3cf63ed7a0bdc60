//! Property test: claim mutual exclusion survives arbitrary interleavings
//! of create, release, extend and clock advances.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use tokio::runtime::Runtime;

use foreman_core::claims::ClaimEngine;
use foreman_core::events::EventBus;
use foreman_core::{Clock, ManualClock};
use foreman_mocks::MemoryStore;

#[derive(Debug, Clone)]
enum Op {
    Create { agent: u8, file: u8, ttl: u32 },
    Release { agent: u8, file: Option<u8> },
    Extend { agent: u8, seconds: u32 },
    Advance { ms: i64 },
}

fn agent_name(idx: u8) -> String {
    format!("agent-{idx}")
}

fn file_name(idx: u8) -> String {
    format!("src/file-{idx}.rs")
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, 0u8..6, 5u32..1_200).prop_map(|(agent, file, ttl)| Op::Create {
            agent,
            file,
            ttl
        }),
        (0u8..4, proptest::option::of(0u8..6))
            .prop_map(|(agent, file)| Op::Release { agent, file }),
        (0u8..4, 30u32..900).prop_map(|(agent, seconds)| Op::Extend { agent, seconds }),
        (0i64..2_000_000).prop_map(|ms| Op::Advance { ms }),
    ]
}

/// At most one agent may hold a non-expired row for any path.
fn assert_mutual_exclusion(store: &MemoryStore, now: i64) {
    let mut holders: HashMap<String, Vec<String>> = HashMap::new();
    for row in store.claim_rows() {
        if row.is_active(now) {
            holders
                .entry(row.file_path.clone())
                .or_default()
                .push(row.agent_id.clone());
        }
    }
    for (file, mut agents) in holders {
        agents.sort();
        agents.dedup();
        assert!(
            agents.len() <= 1,
            "path {file} held by multiple agents: {agents:?}"
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn claim_mutual_exclusion_holds_under_interleaving(
        ops in proptest::collection::vec(op_strategy(), 1..60)
    ) {
        let runtime = Runtime::new().expect("tokio runtime");
        runtime.block_on(async move {
            let clock = Arc::new(ManualClock::new(1_700_000_000_000));
            let store = Arc::new(MemoryStore::new());
            let bus = Arc::new(EventBus::new(clock.clone()));
            let engine = ClaimEngine::new(store.clone(), clock.clone(), bus);

            for op in ops {
                match op {
                    Op::Create { agent, file, ttl } => {
                        let outcome = engine
                            .create(&agent_name(agent), &[file_name(file)], ttl)
                            .await
                            .expect("create never errors");
                        // A conflicted attempt must not have written rows
                        // for this agent+file.
                        if !outcome.granted() {
                            let now = clock.now_ms();
                            let held = store
                                .claim_rows()
                                .into_iter()
                                .filter(|r| {
                                    r.agent_id == agent_name(agent)
                                        && r.file_path == file_name(file)
                                        && r.is_active(now)
                                })
                                .count();
                            assert_eq!(held, 0, "conflicted claim wrote state");
                        }
                    }
                    Op::Release { agent, file } => {
                        let paths = file.map(|f| vec![file_name(f)]);
                        engine
                            .release(&agent_name(agent), paths.as_deref())
                            .await
                            .expect("release never errors");
                    }
                    Op::Extend { agent, seconds } => {
                        engine
                            .extend(&agent_name(agent), seconds, None)
                            .await
                            .expect("extend never errors");
                    }
                    Op::Advance { ms } => clock.advance(ms),
                }
                assert_mutual_exclusion(&store, clock.now_ms());
            }
        });
    }
}
