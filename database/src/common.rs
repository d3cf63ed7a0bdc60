//! Row conversion and error mapping helpers shared by the SQLite store.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use foreman_core::error::{CoordError, Result};
use foreman_core::models::{
    Agent, Author, Blocker, ChangeType, ChangelogEntry, ClaimRow, Comment, Evidence, Gate,
    GateRun, GateType, Intent, Priority, Task, TaskStatus,
};

/// Map a sqlx failure onto the kernel's error type.
pub fn db_error(err: sqlx::Error) -> CoordError {
    match &err {
        sqlx::Error::Database(db_err) => {
            CoordError::Database(format!("constraint or engine error: {}", db_err.message()))
        }
        sqlx::Error::PoolTimedOut => CoordError::Database("connection pool timeout".to_string()),
        sqlx::Error::Io(io_err) => CoordError::Database(format!("database i/o error: {io_err}")),
        _ => CoordError::Database(format!("database operation failed: {err}")),
    }
}

/// Encode a string list for a TEXT column. The raw JSON never leaves the
/// store layer.
pub fn encode_list(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a TEXT column back into a string list.
pub fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_status(raw: &str) -> Result<TaskStatus> {
    raw.parse()
        .map_err(|e: String| CoordError::Database(format!("bad status column: {e}")))
}

fn parse_priority(raw: &str) -> Result<Priority> {
    raw.parse()
        .map_err(|e: String| CoordError::Database(format!("bad priority column: {e}")))
}

fn parse_change_type(raw: &str) -> Result<ChangeType> {
    raw.parse()
        .map_err(|e: String| CoordError::Database(format!("bad change_type column: {e}")))
}

fn parse_gate_type(raw: &str) -> Result<GateType> {
    raw.parse()
        .map_err(|e: String| CoordError::Database(format!("bad gate_type column: {e}")))
}

pub fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let status: String = row.get("status");
    let priority: String = row.get("priority");
    let labels: String = row.get("labels");
    Ok(Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        status: parse_status(&status)?,
        priority: parse_priority(&priority)?,
        assigned_agent: row.get("assigned_agent"),
        due_date: row.get("due_date"),
        labels: decode_list(&labels),
        story_points: row.get("story_points"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        updated_at: row.get("updated_at"),
    })
}

pub fn row_to_intent(row: &SqliteRow) -> Intent {
    let files: String = row.get("files");
    let boundaries: String = row.get("boundaries");
    Intent {
        id: row.get("id"),
        task_id: row.get("task_id"),
        agent_id: row.get("agent_id"),
        files: decode_list(&files),
        boundaries: decode_list(&boundaries),
        acceptance_criteria: row.get("acceptance_criteria"),
        created_at: row.get("created_at"),
    }
}

pub fn row_to_claim(row: &SqliteRow) -> ClaimRow {
    ClaimRow {
        agent_id: row.get("agent_id"),
        file_path: row.get("file_path"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }
}

pub fn row_to_evidence(row: &SqliteRow) -> Evidence {
    Evidence {
        id: row.get("id"),
        task_id: row.get("task_id"),
        agent_id: row.get("agent_id"),
        command: row.get("command"),
        output: row.get("output"),
        created_at: row.get("created_at"),
    }
}

pub fn row_to_changelog(row: &SqliteRow) -> Result<ChangelogEntry> {
    let change_type: String = row.get("change_type");
    let author: String = row.get("agent_id");
    Ok(ChangelogEntry {
        id: row.get("id"),
        task_id: row.get("task_id"),
        author: Author::from(author),
        file_path: row.get("file_path"),
        change_type: parse_change_type(&change_type)?,
        summary: row.get("summary"),
        diff_snippet: row.get("diff_snippet"),
        commit_hash: row.get("commit_hash"),
        created_at: row.get("created_at"),
    })
}

pub fn row_to_gate(row: &SqliteRow) -> Result<Gate> {
    let gate_type: String = row.get("gate_type");
    let trigger: String = row.get("trigger_status");
    Ok(Gate {
        id: row.get("id"),
        task_id: row.get("task_id"),
        gate_type: parse_gate_type(&gate_type)?,
        command: row.get("command"),
        trigger_status: parse_status(&trigger)?,
        required: row.get("required"),
        created_at: row.get("created_at"),
    })
}

pub fn row_to_gate_run(row: &SqliteRow) -> GateRun {
    GateRun {
        id: row.get("id"),
        gate_id: row.get("gate_id"),
        task_id: row.get("task_id"),
        agent_id: row.get("agent_id"),
        passed: row.get("passed"),
        output: row.get("output"),
        duration_ms: row.get("duration_ms"),
        created_at: row.get("created_at"),
    }
}

pub fn row_to_agent(row: &SqliteRow) -> Agent {
    let capabilities: String = row.get("capabilities");
    Agent {
        agent_id: row.get("agent_id"),
        capabilities: decode_list(&capabilities),
        registered_at: row.get("registered_at"),
        last_seen_at: row.get("last_seen_at"),
    }
}

pub fn row_to_comment(row: &SqliteRow) -> Comment {
    let author: String = row.get("author");
    Comment {
        id: row.get("id"),
        task_id: row.get("task_id"),
        author: Author::from(author),
        body: row.get("body"),
        created_at: row.get("created_at"),
    }
}

pub fn row_to_blocker(row: &SqliteRow) -> Blocker {
    Blocker {
        id: row.get("id"),
        task_id: row.get("task_id"),
        agent_id: row.get("agent_id"),
        reason: row.get("reason"),
        resolved: row.get("resolved"),
        resolved_at: row.get("resolved_at"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_encoding_round_trips() {
        let files = vec!["src/a.rs".to_string(), "src/b.rs".to_string()];
        assert_eq!(decode_list(&encode_list(&files)), files);
        assert_eq!(decode_list("[]"), Vec::<String>::new());
        assert_eq!(decode_list("not json"), Vec::<String>::new());
    }
}
