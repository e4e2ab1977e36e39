use chrono::{DateTime, Utc};

use crate::task::{Category, Priority, Task};

/// Active view criteria. Every populated field must hold for a task to pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub completed: Option<bool>,
    pub search_text: Option<String>,
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.priority.is_none()
            && self.completed.is_none()
            && self.search_text.as_deref().is_none_or(str::is_empty)
            && self.date_range.is_none()
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(category) = self.category
            && task.category != category
        {
            return false;
        }

        if let Some(priority) = self.priority
            && task.priority != priority
        {
            return false;
        }

        if let Some(completed) = self.completed
            && task.completed != completed
        {
            return false;
        }

        if let Some(text) = &self.search_text
            && !text.is_empty()
        {
            let needle = text.to_lowercase();
            if !task.title.to_lowercase().contains(&needle) {
                return false;
            }
        }

        if let Some((start, end)) = self.date_range
            && (task.created_at < start || task.created_at > end)
        {
            return false;
        }

        true
    }
}
