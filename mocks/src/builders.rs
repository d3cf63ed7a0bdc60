//! Deterministic input builders for kernel tests.

use foreman_core::models::{GateType, NewGate, NewIntent, NewTask, Priority, TaskStatus};

/// A backlog task with the given title and default everything else.
pub fn task(title: &str) -> NewTask {
    NewTask::titled(title)
}

/// A task created directly into a status with a priority.
pub fn task_in(title: &str, status: TaskStatus, priority: Priority) -> NewTask {
    NewTask {
        status: Some(status),
        priority: Some(priority),
        ..NewTask::titled(title)
    }
}

/// An intent declaring `files` for `(task_id, agent_id)`.
pub fn intent(task_id: &str, agent_id: &str, files: &[&str]) -> NewIntent {
    NewIntent {
        task_id: task_id.to_string(),
        agent_id: agent_id.to_string(),
        files: files.iter().map(|f| f.to_string()).collect(),
        boundaries: Vec::new(),
        acceptance_criteria: None,
    }
}

/// A required test gate triggering on `review`.
pub fn gate(task_id: &str, command: &str) -> NewGate {
    NewGate {
        task_id: task_id.to_string(),
        gate_type: GateType::Test,
        command: command.to_string(),
        trigger_status: TaskStatus::Review,
        required: true,
    }
}
