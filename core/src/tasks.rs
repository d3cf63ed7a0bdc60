//! Tasks, dependencies, WIP limits and the board.

use std::collections::HashSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{CoordError, Result};
use crate::events::{EventBus, EventKind};
use crate::models::{
    new_id, Author, Board, BoardColumn, ChangeType, ChangelogEntry, Dependency, NewTask, Priority,
    ReadyReport, Task, TaskFilter, TaskStatus, TaskUpdateOutcome, UpdateOptions, UpdateTask,
    WipCheck,
};
use crate::store::Store;
use crate::validation::Validate;

pub struct TaskGraph<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
}

impl<S: Store> TaskGraph<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, bus: Arc<EventBus>) -> Self {
        Self { store, clock, bus }
    }

    pub async fn create(&self, input: NewTask) -> Result<Task> {
        Validate::title(&input.title)?;
        if let Some(ref description) = input.description {
            Validate::description(description)?;
        }
        if let Some(points) = input.story_points {
            Validate::story_points(points)?;
        }
        if let Some(ref agent) = input.assigned_agent {
            Validate::agent_id(agent)?;
        }

        let now = self.clock.now_ms();
        let status = input.status.unwrap_or(TaskStatus::Backlog);
        let task = Task {
            id: new_id(),
            title: input.title,
            description: input.description,
            status,
            priority: input.priority.unwrap_or(Priority::Medium),
            assigned_agent: input.assigned_agent,
            due_date: input.due_date,
            labels: input.labels,
            story_points: input.story_points,
            created_at: now,
            // Tasks born past a milestone carry its timestamp from birth.
            started_at: matches!(status, TaskStatus::InProgress | TaskStatus::Done)
                .then_some(now),
            completed_at: (status == TaskStatus::Done).then_some(now),
            updated_at: now,
        };

        self.store.insert_task(&task).await?;
        self.journal(
            &task.id,
            ChangeType::TaskCreated,
            format!("task created: {}", task.title),
            now,
        )
        .await?;
        tracing::info!(task_id = %task.id, status = %task.status, "task created");
        self.bus.publish(EventKind::TaskCreated { task: task.clone() });
        Ok(task)
    }

    /// Apply a partial update, gating status transitions on dependency
    /// readiness and WIP limits. Soft failures land in `warnings`; hard
    /// enforcement raises `Validation`.
    pub async fn update(
        &self,
        task_id: &str,
        updates: UpdateTask,
        opts: UpdateOptions,
    ) -> Result<TaskUpdateOutcome> {
        let mut task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoordError::task_not_found(task_id))?;

        let mut warnings = Vec::new();
        let old_status = task.status;
        let old_agent = task.assigned_agent.clone();
        let old_priority = task.priority;

        if let Some(new_status) = updates.status {
            if new_status == TaskStatus::InProgress && old_status != TaskStatus::InProgress {
                let readiness = self.is_ready(task_id).await?;
                if !readiness.ready {
                    let message = format!(
                        "task '{task_id}' is blocked by unfinished dependencies: {}",
                        readiness.blocking_tasks.join(", ")
                    );
                    if opts.enforce_dependencies {
                        return Err(CoordError::Validation(message));
                    }
                    warnings.push(message);
                }
            }

            if new_status != old_status {
                let wip = self.check_wip_limit(new_status).await?;
                if !wip.allowed {
                    let message = format!(
                        "column '{new_status}' is at its WIP limit ({} of {})",
                        wip.count,
                        wip.limit.unwrap_or(0)
                    );
                    if opts.enforce_wip_limits {
                        return Err(CoordError::Validation(message));
                    }
                    warnings.push(message);
                }
            }
        }

        if let Some(title) = updates.title {
            Validate::title(&title)?;
            task.title = title;
        }
        if let Some(description) = updates.description {
            if let Some(ref text) = description {
                Validate::description(text)?;
            }
            task.description = description;
        }
        if let Some(priority) = updates.priority {
            task.priority = priority;
        }
        if let Some(agent) = updates.assigned_agent {
            if let Some(ref id) = agent {
                Validate::agent_id(id)?;
            }
            task.assigned_agent = agent;
        }
        if let Some(due) = updates.due_date {
            task.due_date = due;
        }
        if let Some(labels) = updates.labels {
            task.labels = labels;
        }
        if let Some(points) = updates.story_points {
            if let Some(value) = points {
                Validate::story_points(value)?;
            }
            task.story_points = points;
        }

        let now = self.clock.now_ms();
        let mut newly_done = false;
        if let Some(new_status) = updates.status {
            task.status = new_status;
            // First entry only; later visits never rewrite the milestones.
            if new_status == TaskStatus::InProgress && task.started_at.is_none() {
                task.started_at = Some(now);
            }
            if new_status == TaskStatus::Done && task.completed_at.is_none() {
                task.completed_at = Some(now);
                if task.started_at.is_none() {
                    task.started_at = Some(now);
                }
                newly_done = true;
            }
        }
        task.updated_at = now;

        self.store.update_task(&task).await?;

        if task.status != old_status {
            let change_type = if task.status == TaskStatus::Done {
                ChangeType::TaskCompleted
            } else {
                ChangeType::TaskStatusChange
            };
            self.journal(
                task_id,
                change_type,
                format!("status: {old_status} -> {}", task.status),
                now,
            )
            .await?;
        }
        if task.assigned_agent != old_agent {
            self.journal(
                task_id,
                ChangeType::TaskAssigned,
                format!(
                    "assigned: {} -> {}",
                    old_agent.as_deref().unwrap_or("nobody"),
                    task.assigned_agent.as_deref().unwrap_or("nobody")
                ),
                now,
            )
            .await?;
        }
        if task.priority != old_priority {
            self.journal(
                task_id,
                ChangeType::TaskPriorityChange,
                format!("priority: {old_priority} -> {}", task.priority),
                now,
            )
            .await?;
        }

        self.bus.publish(EventKind::TaskUpdated { task: task.clone() });
        if newly_done {
            self.bus
                .publish(EventKind::TaskCompleted { task: task.clone() });
        }

        Ok(TaskUpdateOutcome { task, warnings })
    }

    pub async fn get(&self, task_id: &str) -> Result<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoordError::task_not_found(task_id))
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.store.list_tasks(filter).await
    }

    pub async fn delete(&self, task_id: &str) -> Result<()> {
        if !self.store.delete_task(task_id).await? {
            return Err(CoordError::task_not_found(task_id));
        }
        tracing::info!(task_id, "task deleted");
        Ok(())
    }

    /// Add the edge `task_id` depends on `depends_on`. Rejects self-loops,
    /// duplicates, and anything that would close a cycle.
    pub async fn add_dependency(&self, task_id: &str, depends_on: &str) -> Result<Dependency> {
        if task_id == depends_on {
            return Err(CoordError::Validation(
                "a task cannot depend on itself".to_string(),
            ));
        }
        self.get(task_id).await?;
        self.get(depends_on).await?;

        if self.store.dependency_exists(task_id, depends_on).await? {
            return Err(CoordError::Validation(format!(
                "dependency {task_id} -> {depends_on} already exists"
            )));
        }
        if self.reaches(depends_on, task_id).await? {
            return Err(CoordError::Validation(format!(
                "dependency {task_id} -> {depends_on} would create a cycle"
            )));
        }

        let dep = Dependency {
            task_id: task_id.to_string(),
            depends_on_task_id: depends_on.to_string(),
            created_at: self.clock.now_ms(),
        };
        self.store.insert_dependency(&dep).await?;
        self.journal(
            task_id,
            ChangeType::DependencyAdded,
            format!("now depends on {depends_on}"),
            dep.created_at,
        )
        .await?;
        self.bus.publish(EventKind::DependencyAdded {
            task_id: task_id.to_string(),
            depends_on_task_id: depends_on.to_string(),
        });
        Ok(dep)
    }

    pub async fn remove_dependency(&self, task_id: &str, depends_on: &str) -> Result<()> {
        if !self.store.delete_dependency(task_id, depends_on).await? {
            return Err(CoordError::NotFound(format!(
                "dependency {task_id} -> {depends_on} does not exist"
            )));
        }
        self.journal(
            task_id,
            ChangeType::DependencyRemoved,
            format!("no longer depends on {depends_on}"),
            self.clock.now_ms(),
        )
        .await?;
        self.bus.publish(EventKind::DependencyRemoved {
            task_id: task_id.to_string(),
            depends_on_task_id: depends_on.to_string(),
        });
        Ok(())
    }

    /// Ready iff every dependency, direct or transitive, is done. The
    /// blocking set lists every unfinished task encountered.
    pub async fn is_ready(&self, task_id: &str) -> Result<ReadyReport> {
        let mut blocking = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = self.store.dependencies_of(task_id).await?;

        while let Some(dep_id) = stack.pop() {
            if !visited.insert(dep_id.clone()) {
                continue;
            }
            // Cascade keeps edges consistent, so a missing task is just skipped.
            if let Some(dep) = self.store.get_task(&dep_id).await? {
                if dep.status != TaskStatus::Done {
                    blocking.push(dep_id.clone());
                }
            }
            stack.extend(self.store.dependencies_of(&dep_id).await?);
        }

        blocking.sort();
        Ok(ReadyReport {
            ready: blocking.is_empty(),
            blocking_tasks: blocking,
        })
    }

    /// `cancelled` is never limited; other columns compare the current
    /// population against the configured cap.
    pub async fn check_wip_limit(&self, status: TaskStatus) -> Result<WipCheck> {
        if status == TaskStatus::Cancelled {
            return Ok(WipCheck {
                allowed: true,
                count: 0,
                limit: None,
            });
        }
        let count = self.store.count_tasks_in_status(status).await?;
        let limit = self.store.get_wip_limit(status).await?;
        Ok(WipCheck {
            allowed: limit.map_or(true, |cap| count < cap),
            count,
            limit,
        })
    }

    pub async fn set_wip_limit(&self, status: TaskStatus, limit: Option<u32>) -> Result<()> {
        if status == TaskStatus::Cancelled {
            return Err(CoordError::Validation(
                "the cancelled column cannot carry a WIP limit".to_string(),
            ));
        }
        if let Some(cap) = limit {
            Validate::wip_limit(cap)?;
        }
        self.store.set_wip_limit(status, limit).await
    }

    pub async fn list_wip_limits(&self) -> Result<Vec<crate::models::WipLimit>> {
        self.store.list_wip_limits().await
    }

    /// The board: non-cancelled tasks grouped into columns, each ordered
    /// by priority then age.
    pub async fn board(&self, filter: &TaskFilter) -> Result<Board> {
        let mut unfiltered = filter.clone();
        unfiltered.limit = None;

        let mut columns: Vec<BoardColumn> = TaskStatus::BOARD_ORDER
            .iter()
            .map(|status| BoardColumn {
                status: *status,
                tasks: Vec::new(),
            })
            .collect();

        for task in self.store.list_tasks(&unfiltered).await? {
            if task.status == TaskStatus::Cancelled {
                continue;
            }
            if let Some(column) = columns.iter_mut().find(|c| c.status == task.status) {
                column.tasks.push(task);
            }
        }

        for column in &mut columns {
            column.tasks.sort_by(|a, b| {
                a.priority
                    .rank()
                    .cmp(&b.priority.rank())
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            });
        }

        Ok(Board { columns })
    }

    /// DFS over dependency edges: can `from` reach `target`?
    async fn reaches(&self, from: &str, target: &str) -> Result<bool> {
        let mut visited = HashSet::new();
        let mut stack = vec![from.to_string()];

        while let Some(current) = stack.pop() {
            if current == target {
                return Ok(true);
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            stack.extend(self.store.dependencies_of(&current).await?);
        }
        Ok(false)
    }

    async fn journal(
        &self,
        task_id: &str,
        change_type: ChangeType,
        summary: String,
        now: i64,
    ) -> Result<()> {
        let entry = ChangelogEntry {
            id: new_id(),
            task_id: Some(task_id.to_string()),
            author: Author::Kernel,
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
