use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Personal,
    Shopping,
    Health,
    Others,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Work,
        Category::Personal,
        Category::Shopping,
        Category::Health,
        Category::Others,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Work => "work",
            Category::Personal => "personal",
            Category::Shopping => "shopping",
            Category::Health => "health",
            Category::Others => "others",
        }
    }

    pub fn from_keyword(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "work" => Some(Category::Work),
            "personal" => Some(Category::Personal),
            "shopping" => Some(Category::Shopping),
            "health" => Some(Category::Health),
            "others" | "other" => Some(Category::Others),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn from_keyword(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" | "h" => Some(Priority::High),
            "medium" | "m" => Some(Priority::Medium),
            "low" | "l" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub category: Category,

    pub priority: Priority,

    #[serde(default)]
    pub completed: bool,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, draft: TaskDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            priority: draft.priority,
            completed: draft.completed,
            created_at,
            updated_at: None,
            due_date: draft.due_date,
            notes: draft.notes,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_date.map(|due| due < now).unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub priority: Priority,
    pub completed: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Default for TaskDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: None,
            category: Category::Others,
            priority: Priority::Medium,
            completed: false,
            due_date: None,
            notes: None,
        }
    }
}

/// Field edit for an existing task. The outer `Option` marks whether the
/// field is part of the patch; for nullable fields the inner `Option`
/// distinguishes setting a value from clearing it.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub completed: Option<bool>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub notes: Option<Option<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.priority.is_none()
            && self.completed.is_none()
            && self.due_date.is_none()
            && self.notes.is_none()
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(category) = self.category {
            task.category = category;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(notes) = self.notes {
            task.notes = notes;
        }
    }
}

/// Picks an id from the millisecond timestamp, bumping past values that are
/// already taken so rapid consecutive inserts stay unique.
pub fn allocate_id<F>(now: DateTime<Utc>, mut taken: F) -> TaskId
where
    F: FnMut(TaskId) -> bool,
{
    let mut candidate = now.timestamp_millis().max(0) as u64;
    while taken(TaskId(candidate)) {
        candidate += 1;
    }
    TaskId(candidate)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Category, Priority, Task, TaskDraft, TaskId, TaskPatch, allocate_id};

    fn sample_task() -> Task {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 30, 0)
            .single()
            .expect("valid now");
        Task::new(
            TaskId(100),
            TaskDraft {
                title: "买菜".to_string(),
                description: Some("周末采购".to_string()),
                category: Category::Shopping,
                priority: Priority::High,
                notes: Some("记得带购物袋".to_string()),
                ..TaskDraft::default()
            },
            now,
        )
    }

    #[test]
    fn new_task_starts_open_and_unmodified() {
        let task = sample_task();
        assert!(!task.completed);
        assert_eq!(task.updated_at, None);
        assert_eq!(task.due_date, None);
    }

    #[test]
    fn allocate_id_uses_millis_and_bumps_collisions() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 30, 0)
            .single()
            .expect("valid now");
        let base = now.timestamp_millis() as u64;

        let free = allocate_id(now, |_| false);
        assert_eq!(free, TaskId(base));

        let bumped = allocate_id(now, |id| id.0 < base + 3);
        assert_eq!(bumped, TaskId(base + 3));
    }

    #[test]
    fn patch_sets_clears_and_leaves_fields() {
        let mut task = sample_task();
        let patch = TaskPatch {
            title: Some("买菜和水果".to_string()),
            description: Some(None),
            priority: Some(Priority::Low),
            ..TaskPatch::default()
        };
        assert!(!patch.is_empty());
        patch.apply(&mut task);

        assert_eq!(task.title, "买菜和水果");
        assert_eq!(task.description, None);
        assert_eq!(task.priority, Priority::Low);
        // untouched fields survive
        assert_eq!(task.category, Category::Shopping);
        assert_eq!(task.notes.as_deref(), Some("记得带购物袋"));
    }

    #[test]
    fn empty_patch_reports_empty() {
        assert!(TaskPatch::default().is_empty());
    }

    #[test]
    fn serde_uses_camel_case_keys_and_lowercase_enums() {
        let task = sample_task();
        let json = serde_json::to_string(&task).expect("serialize task");

        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"shopping\""));
        assert!(json.contains("\"high\""));
        // absent optionals are omitted entirely
        assert!(!json.contains("dueDate"));
        assert!(!json.contains("updatedAt"));

        let back: Task = serde_json::from_str(&json).expect("deserialize task");
        assert_eq!(back, task);
    }

    #[test]
    fn keywords_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_keyword(category.as_str()), Some(category));
        }
        for priority in Priority::ALL {
            assert_eq!(Priority::from_keyword(priority.as_str()), Some(priority));
        }
        assert_eq!(Category::from_keyword("WORK"), Some(Category::Work));
        assert_eq!(Category::from_keyword("laundry"), None);
        assert_eq!(Priority::from_keyword("urgent"), None);
    }

    #[test]
    fn overdue_requires_open_task_with_past_due() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
            .single()
            .expect("valid now");
        let mut task = sample_task();
        assert!(!task.is_overdue(now));

        task.due_date = Some(now - chrono::Duration::hours(1));
        assert!(task.is_overdue(now));

        task.completed = true;
        assert!(!task.is_overdue(now));
    }
}
