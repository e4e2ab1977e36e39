use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument};

use crate::cli::{
    AddArgs, Command, ConfigAction, ConfigArgs, DEFAULT_DUE_KEYWORD, ExportArgs, ImportArgs,
    ListArgs, ModifyArgs,
};
use crate::datetime;
use crate::filter::Filter;
use crate::reminder::Clock;
use crate::render::Renderer;
use crate::settings::{Settings, SettingsStore};
use crate::storage;
use crate::store::TaskStore;
use crate::task::{Category, Priority, TaskDraft, TaskId, TaskPatch};
use crate::transfer::{self, ExportFormat};

#[instrument(skip(store, settings, renderer, clock, command))]
pub async fn dispatch(
    store: &mut TaskStore,
    settings: &Arc<SettingsStore>,
    renderer: &mut Renderer,
    clock: &Arc<dyn Clock>,
    data_path: &Path,
    command: Command,
) -> anyhow::Result<()> {
    let now = clock.now();
    debug!(data_file = %data_path.display(), "dispatching command");

    let mutated = match command {
        Command::Add(args) => cmd_add(store, settings, args, now)?,
        Command::List(args) => cmd_list(store, settings, renderer, args, now)?,
        Command::Show { id } => cmd_show(store, renderer, id, now)?,
        Command::Done { id } => cmd_done(store, id)?,
        Command::Delete { id } => cmd_delete(store, id)?,
        Command::Modify(args) => cmd_modify(store, args, now)?,
        Command::ClearCompleted => cmd_clear_completed(store)?,
        Command::Stats => cmd_stats(store, renderer, now)?,
        Command::Export(args) => cmd_export(store, args, now)?,
        Command::Import(args) => cmd_import(store, args, now)?,
        Command::Config(args) => cmd_config(settings, args)?,
        Command::Watch => cmd_watch(store).await?,
    };

    if mutated {
        storage::save_tasks_atomic(data_path, store.tasks())?;
        debug!(file = %data_path.display(), count = store.total_count(), "task file saved");
    }

    Ok(())
}

#[instrument(skip(store, settings, args))]
fn cmd_add(
    store: &mut TaskStore,
    settings: &Arc<SettingsStore>,
    args: AddArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    info!("command add");
    let defaults = settings.snapshot().defaults;

    let category = match args.category.as_deref() {
        Some(raw) => {
            Category::from_keyword(raw).ok_or_else(|| anyhow!("unknown category: {raw}"))?
        }
        None => defaults.category,
    };
    let priority = match args.priority.as_deref() {
        Some(raw) => {
            Priority::from_keyword(raw).ok_or_else(|| anyhow!("unknown priority: {raw}"))?
        }
        None => defaults.priority,
    };
    let due_date = match args.due.as_deref() {
        Some(DEFAULT_DUE_KEYWORD) => {
            let offset = chrono::Duration::try_hours(defaults.due_hours)
                .ok_or_else(|| anyhow!("configured default due offset is out of range"))?;
            Some(now + offset)
        }
        Some(expr) => Some(datetime::parse_due_expr(expr, now)?),
        None => None,
    };

    let id = store.add(TaskDraft {
        title: args.title.join(" "),
        description: args.description,
        category,
        priority,
        completed: false,
        due_date,
        notes: args.notes,
    });

    println!("Created task {id}.");
    Ok(true)
}

#[instrument(skip(store, settings, renderer, args))]
fn cmd_list(
    store: &mut TaskStore,
    settings: &Arc<SettingsStore>,
    renderer: &mut Renderer,
    args: ListArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    info!("command list");

    let mut filter = Filter::default();
    if let Some(raw) = args.category.as_deref() {
        filter.category =
            Some(Category::from_keyword(raw).ok_or_else(|| anyhow!("unknown category: {raw}"))?);
    }
    if let Some(raw) = args.priority.as_deref() {
        filter.priority =
            Some(Priority::from_keyword(raw).ok_or_else(|| anyhow!("unknown priority: {raw}"))?);
    }
    if args.completed {
        filter.completed = Some(true);
    } else if args.open {
        filter.completed = Some(false);
    }
    filter.search_text = args.search;
    if args.from.is_some() || args.to.is_some() {
        let start = match args.from.as_deref() {
            Some(raw) => datetime::parse_day_start(raw)?,
            None => DateTime::<Utc>::MIN_UTC,
        };
        let end = match args.to.as_deref() {
            Some(raw) => datetime::parse_day_end(raw)?,
            None => DateTime::<Utc>::MAX_UTC,
        };
        filter.date_range = Some((start, end));
    }
    store.set_filter(filter);

    let display = settings.snapshot().display;
    let mut rows = store.filtered();
    if !(args.all || args.completed || display.show_completed) {
        rows.retain(|task| !task.completed);
    }

    renderer.print_task_table(&rows, display.compact_mode, now)?;
    Ok(false)
}

#[instrument(skip(store, renderer))]
fn cmd_show(
    store: &TaskStore,
    renderer: &mut Renderer,
    id: u64,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    info!("command show");
    match store.get(TaskId(id)) {
        Some(task) => renderer.print_task_detail(task, now)?,
        None => println!("No task with id {id}."),
    }
    Ok(false)
}

#[instrument(skip(store))]
fn cmd_done(store: &mut TaskStore, id: u64) -> anyhow::Result<bool> {
    info!("command done");
    match store.toggle(TaskId(id)) {
        Some(true) => {
            println!("Completed task {id}.");
            Ok(true)
        }
        Some(false) => {
            println!("Reopened task {id}.");
            Ok(true)
        }
        None => {
            println!("No task with id {id}.");
            Ok(false)
        }
    }
}

#[instrument(skip(store))]
fn cmd_delete(store: &mut TaskStore, id: u64) -> anyhow::Result<bool> {
    info!("command delete");
    if store.delete(TaskId(id)) {
        println!("Deleted task {id}.");
        Ok(true)
    } else {
        println!("No task with id {id}.");
        Ok(false)
    }
}

#[instrument(skip(store, args))]
fn cmd_modify(store: &mut TaskStore, args: ModifyArgs, now: DateTime<Utc>) -> anyhow::Result<bool> {
    info!("command modify");

    let mut patch = TaskPatch {
        title: args.title,
        ..TaskPatch::default()
    };
    if let Some(raw) = args.category.as_deref() {
        patch.category =
            Some(Category::from_keyword(raw).ok_or_else(|| anyhow!("unknown category: {raw}"))?);
    }
    if let Some(raw) = args.priority.as_deref() {
        patch.priority =
            Some(Priority::from_keyword(raw).ok_or_else(|| anyhow!("unknown priority: {raw}"))?);
    }
    if args.clear_due {
        patch.due_date = Some(None);
    } else if let Some(expr) = args.due.as_deref() {
        patch.due_date = Some(Some(datetime::parse_due_expr(expr, now)?));
    }
    if args.clear_description {
        patch.description = Some(None);
    } else if let Some(description) = args.description {
        patch.description = Some(Some(description));
    }
    if args.clear_notes {
        patch.notes = Some(None);
    } else if let Some(notes) = args.notes {
        patch.notes = Some(Some(notes));
    }

    if patch.is_empty() {
        return Err(anyhow!("modify: no changes requested"));
    }

    if store.update(TaskId(args.id), patch) {
        println!("Modified task {}.", args.id);
        Ok(true)
    } else {
        println!("No task with id {}.", args.id);
        Ok(false)
    }
}

#[instrument(skip(store))]
fn cmd_clear_completed(store: &mut TaskStore) -> anyhow::Result<bool> {
    info!("command clear-completed");
    let removed = store.clear_completed();
    println!("Cleared {removed} completed task(s).");
    Ok(removed > 0)
}

#[instrument(skip(store, renderer))]
fn cmd_stats(
    store: &TaskStore,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    info!("command stats");
    renderer.print_stats(store, now)?;
    Ok(false)
}

#[instrument(skip(store, args))]
fn cmd_export(store: &TaskStore, args: ExportArgs, now: DateTime<Utc>) -> anyhow::Result<bool> {
    info!("command export");

    let format = ExportFormat::from_keyword(&args.format)
        .ok_or_else(|| anyhow!("unknown export format: {} (expected json or csv)", args.format))?;
    let dir = match args.out {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot resolve current directory")?,
    };

    let path = transfer::write_export(store, &dir, format, now)?;
    println!("Exported {} task(s) to {}.", store.total_count(), path.display());
    Ok(false)
}

#[instrument(skip(store, args))]
fn cmd_import(store: &mut TaskStore, args: ImportArgs, now: DateTime<Utc>) -> anyhow::Result<bool> {
    info!("command import");

    let format = match args.format.as_deref() {
        Some(raw) => ExportFormat::from_keyword(raw)
            .ok_or_else(|| anyhow!("unknown import format: {raw} (expected json or csv)"))?,
        None => ExportFormat::from_path(&args.path).ok_or_else(|| {
            anyhow!("cannot infer format from {}; pass --format", args.path.display())
        })?,
    };

    let text = fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;

    let outcome = match format {
        ExportFormat::Json => transfer::import_json(store, &text),
        ExportFormat::Csv => transfer::import_csv(store, &text, now),
    };
    match outcome {
        Ok(count) => {
            println!("Imported {count} task(s).");
            Ok(true)
        }
        Err(err) => {
            error!(file = %args.path.display(), error = %err, "import failed");
            Err(err.into())
        }
    }
}

#[instrument(skip(settings, args))]
fn cmd_config(settings: &Arc<SettingsStore>, args: ConfigArgs) -> anyhow::Result<bool> {
    info!("command config");
    match args.action {
        ConfigAction::Show => {
            for (key, value) in settings_entries(&settings.snapshot()) {
                println!("{key}={value}");
            }
        }
        ConfigAction::Set { key, value } => {
            settings.set_key(&key, &value)?;
            println!("Set {key} = {value}.");
        }
        ConfigAction::Path => match settings.path() {
            Some(path) => println!("{}", path.display()),
            None => println!("(ephemeral)"),
        },
    }
    Ok(false)
}

#[instrument(skip(store))]
async fn cmd_watch(store: &TaskStore) -> anyhow::Result<bool> {
    info!("command watch");

    let armed = store.rearm_all();
    println!("Armed {armed} reminder(s). Press ctrl-c to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for ctrl-c")?;
    println!("\nStopped watching.");
    info!(pending = store.scheduler().pending_count(), "watch interrupted");
    Ok(false)
}

fn settings_entries(settings: &Settings) -> Vec<(String, String)> {
    vec![
        ("defaults.category".to_string(), settings.defaults.category.to_string()),
        ("defaults.due-hours".to_string(), settings.defaults.due_hours.to_string()),
        ("defaults.priority".to_string(), settings.defaults.priority.to_string()),
        ("display.compact-mode".to_string(), settings.display.compact_mode.to_string()),
        ("display.show-completed".to_string(), settings.display.show_completed.to_string()),
        ("display.sidebar-width".to_string(), settings.display.sidebar_width.to_string()),
        ("language".to_string(), settings.language.clone()),
        ("notifications.enabled".to_string(), settings.notifications.enabled.to_string()),
        (
            "notifications.lead-minutes".to_string(),
            settings.notifications.lead_minutes.to_string(),
        ),
        ("notifications.sound".to_string(), settings.notifications.sound.to_string()),
        ("theme".to_string(), settings.theme.to_string()),
        ("version".to_string(), settings.version.to_string()),
    ]
}
