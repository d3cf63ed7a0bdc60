//! Store contract tests against real SQLite.

use foreman_core::models::{
    new_id, Agent, Author, Blocker, ChangeType, ChangelogEntry, Comment, Dependency, Evidence,
    Gate, GateRun, GateType, Intent, Priority, Task, TaskFilter, TaskStatus,
};
use foreman_core::store::{ClaimStore, CollabStore, GateStore, JournalStore, TaskStore};
use foreman_database::SqliteStore;

async fn store() -> SqliteStore {
    let store = SqliteStore::in_memory().await.unwrap();
    store.migrate().await.unwrap();
    store
}

fn task(id: &str, status: TaskStatus, created_at: i64) -> Task {
    Task {
        id: id.to_string(),
        title: format!("task {id}"),
        description: None,
        status,
        priority: Priority::Medium,
        assigned_agent: None,
        due_date: None,
        labels: Vec::new(),
        story_points: None,
        created_at,
        started_at: None,
        completed_at: None,
        updated_at: created_at,
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let store = SqliteStore::in_memory().await.unwrap();
    store.migrate().await.unwrap();
    store.migrate().await.unwrap();
}

#[tokio::test]
async fn file_backed_database_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coord.db");
    let path = path.to_str().unwrap();

    {
        let store = SqliteStore::new(path).await.unwrap();
        store.migrate().await.unwrap();
        store
            .insert_task(&task("task-persisted", TaskStatus::Todo, 100))
            .await
            .unwrap();
    }

    let store = SqliteStore::new(path).await.unwrap();
    store.migrate().await.unwrap();
    let loaded = store.get_task("task-persisted").await.unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Todo);
}

#[tokio::test]
async fn task_round_trip_preserves_every_field() {
    let store = store().await;
    let full = Task {
        id: "task-full".to_string(),
        title: "Full task".to_string(),
        description: Some("details".to_string()),
        status: TaskStatus::InProgress,
        priority: Priority::Critical,
        assigned_agent: Some("agent-a".to_string()),
        due_date: Some(2_000),
        labels: vec!["auth".to_string(), "backend".to_string()],
        story_points: Some(8),
        created_at: 100,
        started_at: Some(150),
        completed_at: None,
        updated_at: 150,
    };
    store.insert_task(&full).await.unwrap();
    let loaded = store.get_task("task-full").await.unwrap().unwrap();
    assert_eq!(loaded, full);

    let mut updated = full.clone();
    updated.status = TaskStatus::Done;
    updated.completed_at = Some(300);
    updated.labels = vec!["auth".to_string()];
    store.update_task(&updated).await.unwrap();
    assert_eq!(store.get_task("task-full").await.unwrap().unwrap(), updated);
}

#[tokio::test]
async fn list_tasks_filters_and_limits() {
    let store = store().await;
    for i in 0..5 {
        let mut t = task(&format!("task-{i}"), TaskStatus::Todo, 100 + i);
        if i % 2 == 0 {
            t.assigned_agent = Some("agent-a".to_string());
            t.labels = vec!["hot".to_string()];
        }
        store.insert_task(&t).await.unwrap();
    }

    let all = store.list_tasks(&TaskFilter::default()).await.unwrap();
    assert_eq!(all.len(), 5);
    // Newest first.
    assert_eq!(all[0].id, "task-4");

    let assigned = store
        .list_tasks(&TaskFilter {
            assigned_agent: Some("agent-a".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(assigned.len(), 3);

    let labeled = store
        .list_tasks(&TaskFilter {
            label: Some("hot".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(labeled.len(), 3);

    let limited = store
        .list_tasks(&TaskFilter {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);

    assert_eq!(
        store.count_tasks_in_status(TaskStatus::Todo).await.unwrap(),
        5
    );
}

#[tokio::test]
async fn task_delete_cascades_but_changelog_survives() {
    let store = store().await;
    store
        .insert_task(&task("task-del", TaskStatus::Todo, 1))
        .await
        .unwrap();
    store
        .insert_task(&task("task-dep", TaskStatus::Todo, 1))
        .await
        .unwrap();

    store
        .insert_intent(&Intent {
            id: new_id(),
            task_id: "task-del".to_string(),
            agent_id: "agent-a".to_string(),
            files: vec!["src/x.rs".to_string()],
            boundaries: Vec::new(),
            acceptance_criteria: None,
            created_at: 2,
        })
        .await
        .unwrap();
    store
        .insert_evidence(&Evidence {
            id: new_id(),
            task_id: "task-del".to_string(),
            agent_id: "agent-a".to_string(),
            command: "npm test".to_string(),
            output: "ok".to_string(),
            created_at: 3,
        })
        .await
        .unwrap();
    store
        .insert_comment(&Comment {
            id: new_id(),
            task_id: "task-del".to_string(),
            author: Author::Agent("agent-a".to_string()),
            body: "note".to_string(),
            created_at: 3,
        })
        .await
        .unwrap();
    store
        .insert_blocker(&Blocker {
            id: "blk-1".to_string(),
            task_id: "task-del".to_string(),
            agent_id: "agent-a".to_string(),
            reason: "stuck".to_string(),
            resolved: false,
            resolved_at: None,
            created_at: 3,
        })
        .await
        .unwrap();
    let gate = Gate {
        id: "gate-1".to_string(),
        task_id: "task-del".to_string(),
        gate_type: GateType::Test,
        command: "npm test".to_string(),
        trigger_status: TaskStatus::Review,
        required: true,
        created_at: 3,
    };
    store.insert_gate(&gate).await.unwrap();
    store
        .insert_gate_run(&GateRun {
            id: new_id(),
            gate_id: "gate-1".to_string(),
            task_id: "task-del".to_string(),
            agent_id: "agent-a".to_string(),
            passed: true,
            output: None,
            duration_ms: None,
            created_at: 4,
        })
        .await
        .unwrap();
    store
        .insert_dependency(&Dependency {
            task_id: "task-del".to_string(),
            depends_on_task_id: "task-dep".to_string(),
            created_at: 4,
        })
        .await
        .unwrap();
    store
        .insert_change(&ChangelogEntry {
            id: "chg-1".to_string(),
            task_id: Some("task-del".to_string()),
            author: Author::Kernel,
            file_path: "task:task-del".to_string(),
            change_type: ChangeType::TaskCreated,
            summary: "created".to_string(),
            diff_snippet: None,
            commit_hash: None,
            created_at: 1,
        })
        .await
        .unwrap();

    assert!(store.delete_task("task-del").await.unwrap());
    assert!(!store.delete_task("task-del").await.unwrap());

    assert!(store
        .intents_by_task("task-del")
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .evidence_by_task("task-del")
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .comments_by_task("task-del")
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .blockers_by_task("task-del")
        .await
        .unwrap()
        .is_empty());
    assert!(store.gates_by_task("task-del").await.unwrap().is_empty());
    assert!(store.latest_gate_run("gate-1").await.unwrap().is_none());
    assert!(store
        .dependencies_of("task-del")
        .await
        .unwrap()
        .is_empty());

    // History outlives the task with its reference cleared.
    let recent = store.recent_changes(10).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, "chg-1");
    assert!(recent[0].task_id.is_none());
}

#[tokio::test]
async fn claim_rows_upsert_prune_and_conflict() {
    let store = store().await;
    let files = vec!["src/a.rs".to_string(), "src/b.rs".to_string()];
    store
        .upsert_claim_rows("agent-a", &files, 10_000, 1_000)
        .await
        .unwrap();

    // Same-agent upsert replaces, refreshing expiry.
    store
        .upsert_claim_rows("agent-a", &files[..1].to_vec(), 20_000, 2_000)
        .await
        .unwrap();
    let rows = store.active_claim_rows(0).await.unwrap();
    assert_eq!(rows.len(), 2);
    let a = rows.iter().find(|r| r.file_path == "src/a.rs").unwrap();
    assert_eq!(a.expires_at, 20_000);

    let conflicts = store
        .conflicting_agents("agent-b", &files, 5_000)
        .await
        .unwrap();
    assert_eq!(conflicts, vec!["agent-a".to_string()]);
    // The holder itself never conflicts.
    assert!(store
        .conflicting_agents("agent-a", &files, 5_000)
        .await
        .unwrap()
        .is_empty());
    // Expired rows do not conflict.
    assert!(store
        .conflicting_agents("agent-b", &files[1..].to_vec(), 15_000)
        .await
        .unwrap()
        .is_empty());

    let pruned = store.prune_claims(15_000).await.unwrap();
    assert_eq!(pruned, 1);
    assert_eq!(
        store
            .agent_claim_files("agent-a", 15_000)
            .await
            .unwrap(),
        vec!["src/a.rs".to_string()]
    );

    let extended = store
        .extend_claim_rows("agent-a", None, 5_000, 15_000)
        .await
        .unwrap();
    assert_eq!(extended, 1);

    let deleted = store.delete_claim_rows("agent-a", None).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(store.active_claim_rows(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn latest_gate_run_picks_newest() {
    let store = store().await;
    store
        .insert_task(&task("task-g", TaskStatus::Review, 1))
        .await
        .unwrap();
    let gate = Gate {
        id: "gate-g".to_string(),
        task_id: "task-g".to_string(),
        gate_type: GateType::Test,
        command: "cargo test".to_string(),
        trigger_status: TaskStatus::Review,
        required: true,
        created_at: 1,
    };
    store.insert_gate(&gate).await.unwrap();

    for (id, passed, at) in [("run-1", false, 10), ("run-2", true, 20)] {
        store
            .insert_gate_run(&GateRun {
                id: id.to_string(),
                gate_id: "gate-g".to_string(),
                task_id: "task-g".to_string(),
                agent_id: "agent-a".to_string(),
                passed,
                output: None,
                duration_ms: None,
                created_at: at,
            })
            .await
            .unwrap();
    }

    let latest = store.latest_gate_run("gate-g").await.unwrap().unwrap();
    assert_eq!(latest.id, "run-2");
    assert!(latest.passed);

    let gates = store
        .gates_for("task-g", TaskStatus::Review)
        .await
        .unwrap();
    assert_eq!(gates.len(), 1);
    assert!(store
        .gates_for("task-g", TaskStatus::Done)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn wip_limits_round_trip() {
    let store = store().await;
    store
        .set_wip_limit(TaskStatus::InProgress, Some(3))
        .await
        .unwrap();
    store
        .set_wip_limit(TaskStatus::Review, Some(2))
        .await
        .unwrap();
    store
        .set_wip_limit(TaskStatus::InProgress, Some(5))
        .await
        .unwrap();

    assert_eq!(
        store.get_wip_limit(TaskStatus::InProgress).await.unwrap(),
        Some(5)
    );
    assert_eq!(store.list_wip_limits().await.unwrap().len(), 2);

    store.set_wip_limit(TaskStatus::Review, None).await.unwrap();
    assert_eq!(store.get_wip_limit(TaskStatus::Review).await.unwrap(), None);
}

#[tokio::test]
async fn agents_upsert_and_touch() {
    let store = store().await;
    let agent = Agent {
        agent_id: "agent-a".to_string(),
        capabilities: vec!["rust".to_string()],
        registered_at: 100,
        last_seen_at: 100,
    };
    store.upsert_agent(&agent).await.unwrap();
    assert!(store.touch_agent("agent-a", 500).await.unwrap());
    assert!(!store.touch_agent("ghost", 500).await.unwrap());

    let loaded = store.get_agent("agent-a").await.unwrap().unwrap();
    assert_eq!(loaded.last_seen_at, 500);
    assert_eq!(loaded.capabilities, vec!["rust".to_string()]);
}

#[tokio::test]
async fn journal_scoping_by_task_and_agent() {
    let store = store().await;
    store
        .insert_task(&task("task-j", TaskStatus::Todo, 1))
        .await
        .unwrap();

    for (agent, path, at) in [
        ("agent-a", "src/a.rs", 10),
        ("agent-b", "src/b.rs", 20),
        ("agent-a", "src/c.rs", 30),
    ] {
        store
            .insert_change(&ChangelogEntry {
                id: new_id(),
                task_id: Some("task-j".to_string()),
                author: Author::Agent(agent.to_string()),
                file_path: path.to_string(),
                change_type: ChangeType::Modify,
                summary: format!("touch {path}"),
                diff_snippet: None,
                commit_hash: None,
                created_at: at,
            })
            .await
            .unwrap();
    }

    assert_eq!(store.changes_by_task("task-j").await.unwrap().len(), 3);
    let mine = store.changes_for("task-j", "agent-a").await.unwrap();
    assert_eq!(mine.len(), 2);
    // Oldest first within a task.
    assert_eq!(mine[0].file_path, "src/a.rs");

    let recent = store.recent_changes(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    // Newest first for the feed.
    assert_eq!(recent[0].file_path, "src/c.rs");
}
