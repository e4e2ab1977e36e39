use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::datetime::{fmt_local_date, fmt_local_datetime};
use crate::store::TaskStore;
use crate::task::{Priority, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            color: io::stdout().is_terminal(),
        }
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table(
        &mut self,
        tasks: &[&Task],
        compact: bool,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if tasks.is_empty() {
            writeln!(out, "No tasks to show.")?;
            return Ok(());
        }

        let mut headers = vec![
            "ID".to_string(),
            "Done".to_string(),
            "Pri".to_string(),
            "Category".to_string(),
            "Title".to_string(),
            "Due".to_string(),
        ];
        if !compact {
            headers.push("Notes".to_string());
        }

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = self.paint(&task.id.to_string(), "33");
            let done = if task.completed { "x" } else { "" }.to_string();
            let priority = match task.priority {
                Priority::High => self.paint("high", "31"),
                Priority::Medium => self.paint("medium", "33"),
                Priority::Low => "low".to_string(),
            };

            let due = task.due_date.map(fmt_local_datetime).unwrap_or_default();
            let due = if task.is_overdue(now) {
                self.paint(&due, "31")
            } else {
                due
            };

            let mut row = vec![
                id,
                done,
                priority,
                task.category.to_string(),
                task.title.clone(),
                due,
            ];
            if !compact {
                row.push(task.notes.clone().unwrap_or_default());
            }
            rows.push(row);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task, now))]
    pub fn print_task_detail(&mut self, task: &Task, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id         {}", task.id)?;
        writeln!(out, "title      {}", task.title)?;
        writeln!(
            out,
            "state      {}",
            if task.completed {
                "completed"
            } else if task.is_overdue(now) {
                "overdue"
            } else {
                "open"
            }
        )?;
        writeln!(out, "category   {}", task.category)?;
        writeln!(out, "priority   {}", task.priority)?;
        writeln!(out, "created    {}", fmt_local_datetime(task.created_at))?;

        if let Some(updated) = task.updated_at {
            writeln!(out, "updated    {}", fmt_local_datetime(updated))?;
        }
        if let Some(due) = task.due_date {
            writeln!(out, "due        {}", fmt_local_datetime(due))?;
        }
        if let Some(description) = &task.description {
            writeln!(out, "desc       {description}")?;
        }
        if let Some(notes) = &task.notes {
            writeln!(out, "notes      {notes}")?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, store, now))]
    pub fn print_stats(&mut self, store: &TaskStore, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let total = store.total_count();
        let completed = store.completed_count();
        let overdue = store
            .tasks()
            .iter()
            .filter(|task| task.is_overdue(now))
            .count();

        writeln!(out, "{} ({})", self.paint("Tasks", "1"), fmt_local_date(now))?;
        writeln!(out, "  total      {total}")?;
        writeln!(out, "  open       {}", total - completed)?;
        writeln!(out, "  completed  {completed}")?;
        writeln!(out, "  overdue    {overdue}")?;

        writeln!(out)?;
        writeln!(out, "{}", self.paint("By category", "1"))?;
        for (category, tasks) in store.by_category() {
            writeln!(out, "  {:<9} {}", category.to_string(), tasks.len())?;
        }

        writeln!(out)?;
        writeln!(out, "{}", self.paint("By priority", "1"))?;
        for priority in Priority::ALL {
            let count = store
                .tasks()
                .iter()
                .filter(|task| task.priority == priority)
                .count();
            writeln!(out, "  {:<9} {}", priority.to_string(), count)?;
        }

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::strip_ansi;

    #[test]
    fn strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi("\x1b[31m买菜\x1b[0m"), "买菜");
        assert_eq!(strip_ansi("plain"), "plain");
    }
}
