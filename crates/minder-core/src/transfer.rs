use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::storage;
use crate::store::TaskStore;
use crate::task::{self, Category, Priority, Task};

/// Column order is part of the exchange format and must not change.
pub const CSV_HEADER: &str = "标题,描述,分类,优先级,完成状态,创建时间,更新时间,截止时间,备注";

const BOM: char = '\u{feff}';
const EXPORT_PREFIX: &str = "minder";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import payload is empty")]
    Empty,

    #[error("JSON import must be a top-level array of tasks")]
    NotAnArray,

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn from_keyword(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        Self::from_keyword(extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

pub fn export_json(store: &TaskStore) -> anyhow::Result<String> {
    let payload = serde_json::to_string_pretty(store.tasks())?;
    Ok(payload)
}

/// Excel-friendly CSV: UTF-8 BOM first, unquoted header row, then every
/// data cell wrapped in double quotes. Completion renders as 是/否 and
/// timestamps as RFC 3339 with millisecond precision.
pub fn export_csv(store: &TaskStore) -> String {
    let mut lines = Vec::with_capacity(store.total_count() + 1);
    lines.push(CSV_HEADER.to_string());

    for task in store.tasks() {
        let cells = [
            task.title.clone(),
            task.description.clone().unwrap_or_default(),
            task.category.as_str().to_string(),
            task.priority.as_str().to_string(),
            (if task.completed { "是" } else { "否" }).to_string(),
            format_timestamp(task.created_at),
            task.updated_at.map(format_timestamp).unwrap_or_default(),
            task.due_date.map(format_timestamp).unwrap_or_default(),
            task.notes.clone().unwrap_or_default(),
        ];
        let row = cells
            .iter()
            .map(|cell| format!("\"{cell}\""))
            .collect::<Vec<_>>()
            .join(",");
        lines.push(row);
    }

    format!("{BOM}{}", lines.join("\n"))
}

pub fn export_file_name(format: ExportFormat, date: NaiveDate) -> String {
    format!(
        "{EXPORT_PREFIX}-{}.{}",
        date.format("%Y-%m-%d"),
        format.extension()
    )
}

/// Serializes the whole collection into `dir` under a date-stamped name
/// and returns the path written.
#[instrument(skip(store, now))]
pub fn write_export(
    store: &TaskStore,
    dir: &Path,
    format: ExportFormat,
    now: DateTime<Utc>,
) -> anyhow::Result<PathBuf> {
    let payload = match format {
        ExportFormat::Json => export_json(store)?,
        ExportFormat::Csv => export_csv(store),
    };
    let path = dir.join(export_file_name(format, now.date_naive()));
    storage::write_atomic(&path, payload.as_bytes())?;
    info!(file = %path.display(), count = store.total_count(), "exported tasks");
    Ok(path)
}

/// Replaces the store's collection with the tasks in `text`. On any error
/// the store is left untouched. Imported tasks arm no reminders.
#[instrument(skip(store, text))]
pub fn import_json(store: &mut TaskStore, text: &str) -> Result<usize, ImportError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_array() {
        return Err(ImportError::NotAnArray);
    }

    let tasks: Vec<Task> = serde_json::from_value(value)?;
    let count = tasks.len();
    store.replace_all(tasks);
    info!(count, "imported tasks from JSON");
    Ok(count)
}

/// CSV counterpart of `import_json`. Rows get fresh ids; unknown cell
/// values fall back to defaults instead of failing the whole import.
#[instrument(skip(store, text, now))]
pub fn import_csv(
    store: &mut TaskStore,
    text: &str,
    now: DateTime<Utc>,
) -> Result<usize, ImportError> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    if text.trim().is_empty() {
        return Err(ImportError::Empty);
    }

    let quoted = Regex::new("^\"(.*)\"$").ok();
    let mut tasks: Vec<Task> = Vec::new();

    // the first line is the header row
    for (row, line) in text.lines().skip(1).enumerate() {
        let line_no = row + 2;
        if line.trim().is_empty() {
            debug!(line = line_no, "skipping blank row");
            continue;
        }

        let cells: Vec<String> = line
            .split(',')
            .map(|cell| unquote_cell(cell, quoted.as_ref()))
            .collect();
        let col = |idx: usize| {
            cells
                .get(idx)
                .map(String::as_str)
                .filter(|cell| !cell.is_empty())
        };

        let category = match col(2) {
            Some(raw) => Category::from_keyword(raw).unwrap_or_else(|| {
                warn!(line = line_no, value = raw, "unknown category; defaulting to others");
                Category::Others
            }),
            None => Category::Others,
        };
        let priority = match col(3) {
            Some(raw) => Priority::from_keyword(raw).unwrap_or_else(|| {
                warn!(line = line_no, value = raw, "unknown priority; defaulting to medium");
                Priority::Medium
            }),
            None => Priority::Medium,
        };

        let id = task::allocate_id(now, |candidate| tasks.iter().any(|t| t.id == candidate));
        tasks.push(Task {
            id,
            title: col(0).unwrap_or_default().to_string(),
            description: col(1).map(str::to_string),
            category,
            priority,
            completed: col(4) == Some("是"),
            created_at: col(5)
                .and_then(|raw| parse_timestamp(raw, line_no, "createdAt"))
                .unwrap_or(now),
            updated_at: col(6).and_then(|raw| parse_timestamp(raw, line_no, "updatedAt")),
            due_date: col(7).and_then(|raw| parse_timestamp(raw, line_no, "dueDate")),
            notes: col(8).map(str::to_string),
        });
    }

    let count = tasks.len();
    store.replace_all(tasks);
    info!(count, "imported tasks from CSV");
    Ok(count)
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str, line_no: usize, field: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(err) => {
            warn!(line = line_no, field, value = raw, error = %err, "unparseable timestamp");
            None
        }
    }
}

/// Strips one pair of surrounding double quotes, matching how the export
/// wraps cells. Cells containing commas were split already and cannot be
/// recovered here.
fn unquote_cell(raw: &str, quoted: Option<&Regex>) -> String {
    let trimmed = raw.trim();
    if let Some(re) = quoted
        && let Some(caps) = re.captures(trimmed)
        && let Some(inner) = caps.get(1)
    {
        return inner.as_str().to_string();
    }
    trimmed.to_string()
}
