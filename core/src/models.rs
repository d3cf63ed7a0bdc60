use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Millisecond timestamps as produced by [`crate::clock::Clock`].
pub type TimestampMs = i64;

/// Maximum stored length for evidence output and diff snippets, in chars.
pub const OUTPUT_CLIP_LEN: usize = 20_000;

/// Suffix appended to clipped output.
pub const OUTPUT_CLIP_SUFFIX: &str = "\n[clipped to 20000 chars]";

/// Generate a fresh collision-resistant entity id.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Clip `text` to [`OUTPUT_CLIP_LEN`] characters, appending the clip marker
/// when truncation happened. Counts characters, not bytes, so multi-byte
/// content never splits a code point.
///
/// # Arguments
/// * `text` - The raw output to store
///
/// # Returns
/// The text unchanged when it fits, otherwise the first 20,000 characters
/// followed by [`OUTPUT_CLIP_SUFFIX`].
///
/// # Examples
///
/// ```rust
/// use foreman_core::models::{clip_output, OUTPUT_CLIP_SUFFIX};
///
/// assert_eq!(clip_output("npm test: ok"), "npm test: ok");
///
/// let noisy = "x".repeat(30_000);
/// assert!(clip_output(&noisy).ends_with(OUTPUT_CLIP_SUFFIX));
/// ```
pub fn clip_output(text: &str) -> String {
    match text.char_indices().nth(OUTPUT_CLIP_LEN) {
        Some((byte_idx, _)) => {
            let mut clipped = text[..byte_idx].to_string();
            clipped.push_str(OUTPUT_CLIP_SUFFIX);
            clipped
        }
        None => text.to_string(),
    }
}

/// Kanban column a task currently sits in.
///
/// The wire strings (`in_progress`, …) are shared by the HTTP API, the
/// database and the event stream; [`TaskStatus::as_str`] and the
/// [`std::str::FromStr`] impl round-trip them.
///
/// # Examples
///
/// ```rust
/// use foreman_core::models::TaskStatus;
///
/// let status: TaskStatus = "in_progress".parse().unwrap();
/// assert_eq!(status, TaskStatus::InProgress);
/// assert_eq!(status.as_str(), "in_progress");
/// assert!("archived".parse::<TaskStatus>().is_err());
/// ```
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Todo,
    InProgress,
    Review,
    Done,
    Cancelled,
}

impl TaskStatus {
    /// Board column order. `Cancelled` is intentionally absent: cancelled
    /// tasks never appear on the board.
    pub const BOARD_ORDER: [TaskStatus; 5] = [
        TaskStatus::Backlog,
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(TaskStatus::Backlog),
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "review" => Ok(TaskStatus::Review),
            "done" => Ok(TaskStatus::Done),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority. Ordering on the board is priority first, then age.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Sort rank: lower sorts earlier on the board.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored a journal row: the kernel itself or a named agent.
///
/// Persisted as the string `"system"` for kernel-authored rows, so databases
/// written by earlier deployments stay readable.
///
/// # Examples
///
/// ```rust
/// use foreman_core::models::Author;
///
/// let kernel = Author::from("system".to_string());
/// assert_eq!(kernel, Author::Kernel);
/// assert_eq!(kernel.as_str(), "system");
/// assert_eq!(kernel.agent_id(), None);
///
/// let agent = Author::from("backend-agent".to_string());
/// assert_eq!(agent.agent_id(), Some("backend-agent"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum Author {
    Kernel,
    Agent(String),
}

/// Sentinel stored for kernel-authored rows.
pub const KERNEL_AUTHOR: &str = "system";

impl Author {
    pub fn as_str(&self) -> &str {
        match self {
            Author::Kernel => KERNEL_AUTHOR,
            Author::Agent(id) => id,
        }
    }

    /// The agent id, if this author is an agent.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Author::Kernel => None,
            Author::Agent(id) => Some(id),
        }
    }
}

impl From<String> for Author {
    fn from(s: String) -> Self {
        if s == KERNEL_AUTHOR {
            Author::Kernel
        } else {
            Author::Agent(s)
        }
    }
}

impl From<Author> for String {
    fn from(a: Author) -> Self {
        a.as_str().to_string()
    }
}

/// Unit of work on the shared board.
///
/// `started_at` is set on the first transition into `in_progress` and
/// `completed_at` on the first transition into `done`; neither is ever
/// rewritten afterwards. `updated_at` moves on every mutation.
///
/// # Examples
///
/// ```rust
/// use foreman_core::models::{Priority, Task, TaskStatus};
///
/// let task = Task {
///     id: "b1946ac92492d2347c6235b4d2611184".to_string(),
///     title: "Implement token refresh".to_string(),
///     description: Some("Rotate refresh tokens on every use".to_string()),
///     status: TaskStatus::InProgress,
///     priority: Priority::High,
///     assigned_agent: Some("backend-agent".to_string()),
///     due_date: None,
///     labels: vec!["auth".to_string()],
///     story_points: Some(5),
///     created_at: 1_700_000_000_000,
///     started_at: Some(1_700_000_060_000),
///     completed_at: None,
///     updated_at: 1_700_000_060_000,
/// };
///
/// // Wire JSON is camelCase with the snake_case status strings.
/// let json = serde_json::to_value(&task).unwrap();
/// assert_eq!(json["status"], "in_progress");
/// assert_eq!(json["assignedAgent"], "backend-agent");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assigned_agent: Option<String>,
    pub due_date: Option<TimestampMs>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub story_points: Option<i32>,
    pub created_at: TimestampMs,
    pub started_at: Option<TimestampMs>,
    pub completed_at: Option<TimestampMs>,
    pub updated_at: TimestampMs,
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assigned_agent: Option<String>,
    pub due_date: Option<TimestampMs>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub story_points: Option<i32>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update for a task. Double-`Option` fields distinguish "leave as
/// is" (outer `None`) from "clear" (inner `None`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assigned_agent: Option<Option<String>>,
    pub due_date: Option<Option<TimestampMs>>,
    pub labels: Option<Vec<String>>,
    pub story_points: Option<Option<i32>>,
}

impl UpdateTask {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Options controlling how strictly a status transition is gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Refuse `in_progress` when unresolved dependencies exist.
    pub enforce_dependencies: bool,
    /// Refuse a column move that would breach the column's WIP limit.
    pub enforce_wip_limits: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            enforce_dependencies: true,
            enforce_wip_limits: false,
        }
    }
}

/// A task plus any soft-gate warnings collected while updating it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdateOutcome {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Filter criteria for task queries. Fields combine with AND.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assigned_agent: Option<String>,
    pub label: Option<String>,
    pub limit: Option<u32>,
}

/// One column of the kanban board, already ordered.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BoardColumn {
    pub status: TaskStatus,
    pub tasks: Vec<Task>,
}

/// The board: one column per non-cancelled status, in board order.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub columns: Vec<BoardColumn>,
}

/// An agent's declaration that it will touch a set of files for a task.
/// Immutable once posted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub id: String,
    pub task_id: String,
    pub agent_id: String,
    pub files: Vec<String>,
    /// Path prefixes the agent declared off-limits for itself.
    #[serde(default)]
    pub boundaries: Vec<String>,
    pub acceptance_criteria: Option<String>,
    pub created_at: TimestampMs,
}

/// Input for posting an intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewIntent {
    pub task_id: String,
    pub agent_id: String,
    pub files: Vec<String>,
    #[serde(default)]
    pub boundaries: Vec<String>,
    pub acceptance_criteria: Option<String>,
}

/// One persisted lease row: a single (agent, path) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRow {
    pub agent_id: String,
    pub file_path: String,
    pub expires_at: TimestampMs,
    pub created_at: TimestampMs,
}

impl ClaimRow {
    pub fn is_active(&self, now: TimestampMs) -> bool {
        self.expires_at > now
    }
}

/// Aggregated view of one agent's lease: the sorted union of its file
/// paths, the latest expiry and the earliest creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub agent_id: String,
    pub files: Vec<String>,
    pub expires_at: TimestampMs,
    pub created_at: TimestampMs,
}

/// Result of a claim attempt. A non-empty `conflicts_with` means nothing
/// was written and the listed agents hold overlapping active leases.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimOutcome {
    pub claim: Claim,
    pub conflicts_with: Vec<String>,
}

impl ClaimOutcome {
    pub fn granted(&self) -> bool {
        self.conflicts_with.is_empty()
    }
}

/// Proof-of-work record: a command an agent ran and what it printed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: String,
    pub task_id: String,
    pub agent_id: String,
    pub command: String,
    pub output: String,
    pub created_at: TimestampMs,
}

/// Input for attaching evidence. `output` is clipped on insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewEvidence {
    pub task_id: String,
    pub agent_id: String,
    pub command: String,
    pub output: String,
}

/// Closed set of audited change kinds: three file events plus the task
/// lifecycle entries the kernel writes itself.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Modify,
    Delete,
    TaskCreated,
    TaskStatusChange,
    TaskAssigned,
    TaskPriorityChange,
    TaskCompleted,
    BlockerAdded,
    BlockerResolved,
    DependencyAdded,
    DependencyRemoved,
    CommentAdded,
}

impl ChangeType {
    /// True for the three kinds produced by actual file activity.
    pub fn is_file_change(&self) -> bool {
        matches!(
            self,
            ChangeType::Create | ChangeType::Modify | ChangeType::Delete
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Modify => "modify",
            ChangeType::Delete => "delete",
            ChangeType::TaskCreated => "task_created",
            ChangeType::TaskStatusChange => "task_status_change",
            ChangeType::TaskAssigned => "task_assigned",
            ChangeType::TaskPriorityChange => "task_priority_change",
            ChangeType::TaskCompleted => "task_completed",
            ChangeType::BlockerAdded => "blocker_added",
            ChangeType::BlockerResolved => "blocker_resolved",
            ChangeType::DependencyAdded => "dependency_added",
            ChangeType::DependencyRemoved => "dependency_removed",
            ChangeType::CommentAdded => "comment_added",
        }
    }
}

impl std::str::FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeType::Create),
            "modify" => Ok(ChangeType::Modify),
            "delete" => Ok(ChangeType::Delete),
            "task_created" => Ok(ChangeType::TaskCreated),
            "task_status_change" => Ok(ChangeType::TaskStatusChange),
            "task_assigned" => Ok(ChangeType::TaskAssigned),
            "task_priority_change" => Ok(ChangeType::TaskPriorityChange),
            "task_completed" => Ok(ChangeType::TaskCompleted),
            "blocker_added" => Ok(ChangeType::BlockerAdded),
            "blocker_resolved" => Ok(ChangeType::BlockerResolved),
            "dependency_added" => Ok(ChangeType::DependencyAdded),
            "dependency_removed" => Ok(ChangeType::DependencyRemoved),
            "comment_added" => Ok(ChangeType::CommentAdded),
            other => Err(format!("unknown change type: {other}")),
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record. Task-lifecycle entries use the synthetic
/// path `task:<taskId>`; file entries carry the real path. Survives task
/// deletion with `task_id` nulled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogEntry {
    pub id: String,
    pub task_id: Option<String>,
    pub author: Author,
    pub file_path: String,
    pub change_type: ChangeType,
    pub summary: String,
    pub diff_snippet: Option<String>,
    pub commit_hash: Option<String>,
    pub created_at: TimestampMs,
}

/// Input for journaling a change. `file_path` may be omitted for task
/// lifecycle kinds; the journal synthesizes `task:<taskId>` then.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewChange {
    pub task_id: Option<String>,
    pub author: Author,
    pub file_path: Option<String>,
    pub change_type: ChangeType,
    pub summary: String,
    pub diff_snippet: Option<String>,
    pub commit_hash: Option<String>,
}

/// Directed edge: `task_id` depends on `depends_on_task_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub task_id: String,
    pub depends_on_task_id: String,
    pub created_at: TimestampMs,
}

/// Readiness verdict for a task: ready iff no unfinished dependency is
/// reachable.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadyReport {
    pub ready: bool,
    pub blocking_tasks: Vec<String>,
}

/// Per-column cap on concurrently held tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WipLimit {
    pub status: TaskStatus,
    pub limit: u32,
}

/// Result of a WIP-limit check for one column.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WipCheck {
    pub allowed: bool,
    pub count: u32,
    pub limit: Option<u32>,
}

/// Kind of check a gate runs.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GateType {
    Lint,
    Test,
    Build,
    Review,
    Custom,
}

impl GateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateType::Lint => "lint",
            GateType::Test => "test",
            GateType::Build => "build",
            GateType::Review => "review",
            GateType::Custom => "custom",
        }
    }
}

impl std::str::FromStr for GateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lint" => Ok(GateType::Lint),
            "test" => Ok(GateType::Test),
            "build" => Ok(GateType::Build),
            "review" => Ok(GateType::Review),
            "custom" => Ok(GateType::Custom),
            other => Err(format!("unknown gate type: {other}")),
        }
    }
}

/// Named check bound to a task and the status transition it guards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gate {
    pub id: String,
    pub task_id: String,
    pub gate_type: GateType,
    pub command: String,
    pub trigger_status: TaskStatus,
    pub required: bool,
    pub created_at: TimestampMs,
}

/// Input for defining a gate. `required` defaults to true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewGate {
    pub task_id: String,
    pub gate_type: GateType,
    pub command: String,
    pub trigger_status: TaskStatus,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// Immutable record of one gate execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GateRun {
    pub id: String,
    pub gate_id: String,
    pub task_id: String,
    pub agent_id: String,
    pub passed: bool,
    pub output: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: TimestampMs,
}

/// Input for recording a gate run. `output` is clipped on insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewGateRun {
    pub gate_id: String,
    pub agent_id: String,
    pub passed: bool,
    pub output: Option<String>,
    pub duration_ms: Option<i64>,
}

/// Derived per-gate state: only the most recent run counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    NotRun,
    Passed,
    Failed,
}

/// One gate with its derived state and the run that produced it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GateStatusEntry {
    pub gate: Gate,
    pub state: GateState,
    pub last_run: Option<GateRun>,
}

/// Transition-authorization summary for one (task, trigger status) pair.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GateStatusReport {
    pub all_passed: bool,
    pub gates: Vec<GateStatusEntry>,
    /// Ids of required gates whose state is not `passed`.
    pub blocked_by: Vec<String>,
}

/// Registered agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub agent_id: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub registered_at: TimestampMs,
    pub last_seen_at: TimestampMs,
}

/// Free-form note on a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub task_id: String,
    pub author: Author,
    pub body: String,
    pub created_at: TimestampMs,
}

/// Declared impediment on a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blocker {
    pub id: String,
    pub task_id: String,
    pub agent_id: String,
    pub reason: String,
    pub resolved: bool,
    pub resolved_at: Option<TimestampMs>,
    pub created_at: TimestampMs,
}

/// One named compliance check with its verdict.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCheck {
    pub name: String,
    pub required: bool,
    pub passed: bool,
    pub message: String,
}

/// Full compliance verdict for a (task, agent) pair. Advisory: callers
/// decide whether `can_complete` blocks the `done` transition.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub task_id: String,
    pub agent_id: String,
    pub checks: Vec<ComplianceCheck>,
    /// Fraction of checks that passed.
    pub score: f64,
    pub can_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_output_short_text_untouched() {
        assert_eq!(clip_output("npm test ok"), "npm test ok");
        assert_eq!(clip_output(""), "");
    }

    #[test]
    fn clip_output_truncates_with_marker() {
        let long = "x".repeat(OUTPUT_CLIP_LEN + 500);
        let clipped = clip_output(&long);
        assert!(clipped.ends_with(OUTPUT_CLIP_SUFFIX));
        assert_eq!(
            clipped.chars().count(),
            OUTPUT_CLIP_LEN + OUTPUT_CLIP_SUFFIX.chars().count()
        );
    }

    #[test]
    fn clip_output_exact_boundary_untouched() {
        let exact = "y".repeat(OUTPUT_CLIP_LEN);
        assert_eq!(clip_output(&exact), exact);
    }

    #[test]
    fn clip_output_counts_chars_not_bytes() {
        let wide = "é".repeat(OUTPUT_CLIP_LEN + 1);
        let clipped = clip_output(&wide);
        assert!(clipped.ends_with(OUTPUT_CLIP_SUFFIX));
    }

    #[test]
    fn status_wire_strings_round_trip() {
        for status in [
            TaskStatus::Backlog,
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Done,
            TaskStatus::Cancelled,
        ] {
            let parsed: TaskStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("archived".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn priority_ranks_are_total_order() {
        assert!(Priority::Critical.rank() < Priority::High.rank());
        assert!(Priority::High.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::Low.rank());
    }

    #[test]
    fn author_sentinel_round_trip() {
        let kernel: Author = "system".to_string().into();
        assert_eq!(kernel, Author::Kernel);
        assert_eq!(kernel.as_str(), "system");

        let agent: Author = "agent-7".to_string().into();
        assert_eq!(agent, Author::Agent("agent-7".to_string()));
        assert_eq!(agent.agent_id(), Some("agent-7"));

        let json = serde_json::to_string(&Author::Kernel).unwrap();
        assert_eq!(json, "\"system\"");
    }

    #[test]
    fn change_type_file_predicate() {
        assert!(ChangeType::Create.is_file_change());
        assert!(ChangeType::Modify.is_file_change());
        assert!(ChangeType::Delete.is_file_change());
        assert!(!ChangeType::TaskCreated.is_file_change());
        assert!(!ChangeType::CommentAdded.is_file_change());
    }

    #[test]
    fn change_type_wire_strings_round_trip() {
        let all = [
            ChangeType::Create,
            ChangeType::Modify,
            ChangeType::Delete,
            ChangeType::TaskCreated,
            ChangeType::TaskStatusChange,
            ChangeType::TaskAssigned,
            ChangeType::TaskPriorityChange,
            ChangeType::TaskCompleted,
            ChangeType::BlockerAdded,
            ChangeType::BlockerResolved,
            ChangeType::DependencyAdded,
            ChangeType::DependencyRemoved,
            ChangeType::CommentAdded,
        ];
        for ct in all {
            let parsed: ChangeType = ct.as_str().parse().unwrap();
            assert_eq!(parsed, ct);
        }
    }

    #[test]
    fn new_ids_are_unique_and_opaque() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert!(a.len() >= 4);
    }

    #[test]
    fn claim_row_activity_window() {
        let row = ClaimRow {
            agent_id: "a".into(),
            file_path: "src/x.rs".into(),
            expires_at: 1_000,
            created_at: 0,
        };
        assert!(row.is_active(999));
        assert!(!row.is_active(1_000));
        assert!(!row.is_active(1_001));
    }

    #[test]
    fn task_serializes_camel_case() {
        let task = Task {
            id: "t1".into(),
            title: "Fix login".into(),
            description: None,
            status: TaskStatus::InProgress,
            priority: Priority::High,
            assigned_agent: Some("agent-1".into()),
            due_date: None,
            labels: vec!["auth".into()],
            story_points: Some(3),
            created_at: 1,
            started_at: Some(2),
            completed_at: None,
            updated_at: 2,
        };
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["status"], "in_progress");
        assert_eq!(value["assignedAgent"], "agent-1");
        assert_eq!(value["storyPoints"], 3);
        assert!(value.get("assigned_agent").is_none());
    }
}
