use std::io::{self, IsTerminal, Write};

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::task::Task;

pub const NOTE_TITLE: &str = "待办事项提醒";

/// Rendered reminder content, independent of where it gets delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderNote {
    pub tag: String,
    pub title: String,
    pub body: String,
}

impl ReminderNote {
    pub fn for_task(task: &Task) -> Self {
        Self {
            tag: format!("todo-{}", task.id),
            title: NOTE_TITLE.to_string(),
            body: format!("任务\"{}\"即将到期", task.title),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification permission not granted")]
    PermissionDenied,

    #[error("notification channel closed")]
    ChannelClosed,

    #[error("failed to write notification: {0}")]
    Io(#[from] io::Error),
}

pub trait NotifySink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this sink is currently allowed to reach the user.
    fn permission(&self) -> bool;

    fn deliver(&self, note: &ReminderNote) -> Result<(), NotifyError>;

    fn play_sound(&self) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Prints reminders to stdout. Only has permission when stdout is a tty.
#[derive(Debug, Default)]
pub struct TerminalSink;

impl TerminalSink {
    pub fn new() -> Self {
        Self
    }
}

impl NotifySink for TerminalSink {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn permission(&self) -> bool {
        io::stdout().is_terminal()
    }

    fn deliver(&self, note: &ReminderNote) -> Result<(), NotifyError> {
        if !self.permission() {
            return Err(NotifyError::PermissionDenied);
        }
        let mut out = io::stdout().lock();
        writeln!(out, "[{}] {}: {}", note.tag, note.title, note.body)?;
        out.flush()?;
        Ok(())
    }

    fn play_sound(&self) -> Result<(), NotifyError> {
        let mut out = io::stdout().lock();
        out.write_all(b"\x07")?;
        out.flush()?;
        Ok(())
    }
}

/// Forwards reminders over an in-process channel, for embedding and tests.
#[derive(Debug)]
pub struct ChannelSink {
    tx: UnboundedSender<ReminderNote>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<ReminderNote>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotifySink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn permission(&self) -> bool {
        true
    }

    fn deliver(&self, note: &ReminderNote) -> Result<(), NotifyError> {
        debug!(tag = %note.tag, "forwarding note to channel");
        self.tx
            .send(note.clone())
            .map_err(|_| NotifyError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ChannelSink, NotifySink, ReminderNote};
    use crate::task::{Task, TaskDraft, TaskId};

    #[test]
    fn note_content_matches_the_fixed_template() {
        let task = Task::new(
            TaskId(17),
            TaskDraft {
                title: "交房租".to_string(),
                ..TaskDraft::default()
            },
            Utc::now(),
        );
        let note = ReminderNote::for_task(&task);

        assert_eq!(note.tag, "todo-17");
        assert_eq!(note.title, "待办事项提醒");
        assert_eq!(note.body, "任务\"交房租\"即将到期");
    }

    #[tokio::test]
    async fn channel_sink_hands_notes_to_the_receiver() {
        let (sink, mut rx) = ChannelSink::new();
        assert!(sink.permission());

        let task = Task::new(
            TaskId(5),
            TaskDraft {
                title: "repay loan".to_string(),
                ..TaskDraft::default()
            },
            Utc::now(),
        );
        let note = ReminderNote::for_task(&task);
        sink.deliver(&note).expect("deliver note");

        let received = rx.recv().await.expect("receive note");
        assert_eq!(received, note);
    }

    #[test]
    fn channel_sink_reports_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);

        let task = Task::new(TaskId(1), TaskDraft::default(), Utc::now());
        let err = sink
            .deliver(&ReminderNote::for_task(&task))
            .expect_err("closed channel");
        assert!(matches!(err, super::NotifyError::ChannelClosed));
    }
}
