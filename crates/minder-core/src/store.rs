use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::filter::Filter;
use crate::reminder::{Clock, ReminderScheduler};
use crate::task::{self, Category, Task, TaskDraft, TaskId, TaskPatch};

/// In-memory task collection plus the active view filter. Every mutation
/// keeps the reminder scheduler in sync, so a completed or deleted task can
/// never fire a stale notification.
pub struct TaskStore {
    tasks: Vec<Task>,
    filter: Filter,
    scheduler: ReminderScheduler,
    clock: Arc<dyn Clock>,
}

impl TaskStore {
    pub fn new(scheduler: ReminderScheduler, clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: Vec::new(),
            filter: Filter::default(),
            scheduler,
            clock,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn total_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|task| task.completed).count()
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn add(&mut self, draft: TaskDraft) -> TaskId {
        let now = self.clock.now();
        let id = task::allocate_id(now, |candidate| {
            self.tasks.iter().any(|task| task.id == candidate)
        });

        let task = Task::new(id, draft, now);
        if task.due_date.is_some() {
            self.scheduler.schedule(&task);
        }
        self.tasks.push(task);

        info!(id = %id, count = self.tasks.len(), "task added");
        id
    }

    /// Applies `patch` to the task with `id`. Returns false when no such
    /// task exists; the collection is left untouched in that case.
    #[instrument(skip(self, patch))]
    pub fn update(&mut self, id: TaskId, patch: TaskPatch) -> bool {
        let now = self.clock.now();
        let due_touched = patch.due_date.is_some();

        let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) else {
            debug!(id = %id, "update target not found");
            return false;
        };

        let was_completed = task.completed;
        patch.apply(task);
        task.updated_at = Some(now);

        if task.completed {
            self.scheduler.cancel(id);
        } else if due_touched || was_completed {
            match task.due_date {
                Some(_) => {
                    self.scheduler.schedule(task);
                }
                None => {
                    self.scheduler.cancel(id);
                }
            }
        }

        info!(id = %id, "task updated");
        true
    }

    /// Removes the task with `id` and aborts any armed reminder for it.
    #[instrument(skip(self))]
    pub fn delete(&mut self, id: TaskId) -> bool {
        let Some(position) = self.tasks.iter().position(|task| task.id == id) else {
            debug!(id = %id, "delete target not found");
            return false;
        };

        self.tasks.remove(position);
        self.scheduler.cancel(id);
        info!(id = %id, count = self.tasks.len(), "task deleted");
        true
    }

    /// Flips completion and returns the new state, or None for unknown ids.
    #[instrument(skip(self))]
    pub fn toggle(&mut self, id: TaskId) -> Option<bool> {
        let now = self.clock.now();
        let task = self.tasks.iter_mut().find(|task| task.id == id)?;

        task.completed = !task.completed;
        task.updated_at = Some(now);

        if task.completed {
            self.scheduler.cancel(id);
        } else if task.due_date.is_some() {
            self.scheduler.schedule(task);
        }

        info!(id = %id, completed = task.completed, "task toggled");
        Some(task.completed)
    }

    pub fn set_filter(&mut self, filter: Filter) {
        debug!(?filter, "filter replaced");
        self.filter = filter;
    }

    /// Drops every completed task, cancelling their reminders first.
    #[instrument(skip(self))]
    pub fn clear_completed(&mut self) -> usize {
        let before = self.tasks.len();
        for task in self.tasks.iter().filter(|task| task.completed) {
            self.scheduler.cancel(task.id);
        }
        self.tasks.retain(|task| !task.completed);

        let removed = before - self.tasks.len();
        info!(removed, remaining = self.tasks.len(), "cleared completed tasks");
        removed
    }

    /// Wholesale replacement, used by imports and startup loading. Does not
    /// arm any reminders; call `rearm_all` when timers are wanted.
    #[instrument(skip(self, tasks))]
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        for task in &self.tasks {
            self.scheduler.cancel(task.id);
        }
        info!(count = tasks.len(), "task collection replaced");
        self.tasks = tasks;
    }

    pub fn rearm_all(&self) -> usize {
        self.scheduler.reschedule_all(&self.tasks)
    }

    /// Tasks passing the active filter, in insertion order.
    pub fn filtered(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| self.filter.matches(task))
            .collect()
    }

    /// Partition of the whole collection by category. Every category is
    /// present as a key, even when its bucket is empty.
    pub fn by_category(&self) -> BTreeMap<Category, Vec<&Task>> {
        let mut map: BTreeMap<Category, Vec<&Task>> = Category::ALL
            .iter()
            .map(|category| (*category, Vec::new()))
            .collect();
        for task in &self.tasks {
            map.entry(task.category).or_default().push(task);
        }
        map
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
