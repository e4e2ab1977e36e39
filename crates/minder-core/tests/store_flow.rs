use std::fs;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use minder_core::filter::Filter;
use minder_core::reminder::{FixedClock, ReminderScheduler};
use minder_core::settings::SettingsStore;
use minder_core::storage;
use minder_core::store::TaskStore;
use minder_core::task::{Category, Priority, TaskDraft, TaskPatch};
use minder_core::transfer::{self, ExportFormat};
use tempfile::tempdir;

fn store_at(day: u32, hour: u32) -> TaskStore {
    let now = Utc
        .with_ymd_and_hms(2026, 3, day, hour, 0, 0)
        .single()
        .expect("valid now");
    TaskStore::new(ReminderScheduler::disabled(), Arc::new(FixedClock(now)))
}

#[test]
fn crud_filter_and_persistence_round_trip() {
    let temp = tempdir().expect("tempdir");
    let data_path = temp.path().join("tasks.json");

    let mut store = store_at(1, 9);
    let report = store.add(TaskDraft {
        title: "写季度报告".to_string(),
        category: Category::Work,
        priority: Priority::High,
        ..TaskDraft::default()
    });
    let groceries = store.add(TaskDraft {
        title: "buy groceries".to_string(),
        category: Category::Shopping,
        ..TaskDraft::default()
    });
    let dentist = store.add(TaskDraft {
        title: "book dentist".to_string(),
        category: Category::Health,
        ..TaskDraft::default()
    });

    // narrow the view, then verify it is an ordered subset
    store.set_filter(Filter {
        completed: Some(false),
        ..Filter::default()
    });
    assert_eq!(store.filtered().len(), 3);

    assert_eq!(store.toggle(groceries), Some(true));
    assert_eq!(store.filtered().len(), 2);

    let changed = store.update(
        report,
        TaskPatch {
            priority: Some(Priority::Medium),
            notes: Some(Some("附上图表".to_string())),
            ..TaskPatch::default()
        },
    );
    assert!(changed);

    storage::save_tasks_atomic(&data_path, store.tasks()).expect("save tasks");

    // reload into a fresh store, exactly as startup does
    let mut reloaded = store_at(1, 10);
    reloaded.replace_all(storage::load_tasks(&data_path).expect("load tasks"));
    assert_eq!(reloaded.tasks(), store.tasks());

    let task = reloaded.get(report).expect("report present");
    assert_eq!(task.priority, Priority::Medium);
    assert_eq!(task.notes.as_deref(), Some("附上图表"));

    assert_eq!(reloaded.clear_completed(), 1);
    assert!(reloaded.get(groceries).is_none());
    assert!(reloaded.get(dentist).is_some());
}

#[test]
fn export_files_round_trip_through_import() {
    let temp = tempdir().expect("tempdir");
    let now = Utc
        .with_ymd_and_hms(2026, 8, 24, 15, 30, 0)
        .single()
        .expect("valid now");

    let mut source = store_at(1, 9);
    source.add(TaskDraft {
        title: "续订域名".to_string(),
        category: Category::Work,
        priority: Priority::High,
        due_date: Some(
            Utc.with_ymd_and_hms(2026, 9, 1, 10, 0, 0)
                .single()
                .expect("valid due"),
        ),
        notes: Some("用公司账户支付".to_string()),
        ..TaskDraft::default()
    });
    let done = source.add(TaskDraft {
        title: "water plants".to_string(),
        category: Category::Others,
        ..TaskDraft::default()
    });
    source.toggle(done);

    let json_path =
        transfer::write_export(&source, temp.path(), ExportFormat::Json, now).expect("json export");
    let csv_path =
        transfer::write_export(&source, temp.path(), ExportFormat::Csv, now).expect("csv export");
    assert!(json_path.ends_with("minder-2026-08-24.json"));
    assert!(csv_path.ends_with("minder-2026-08-24.csv"));

    // JSON import preserves tasks byte for byte
    let json_text = fs::read_to_string(&json_path).expect("read json export");
    let mut from_json = store_at(2, 9);
    let count = transfer::import_json(&mut from_json, &json_text).expect("import json");
    assert_eq!(count, 2);
    assert_eq!(from_json.tasks(), source.tasks());

    // CSV import regenerates ids but keeps the visible fields
    let csv_text = fs::read_to_string(&csv_path).expect("read csv export");
    let mut from_csv = store_at(2, 10);
    let count = transfer::import_csv(&mut from_csv, &csv_text, Utc::now()).expect("import csv");
    assert_eq!(count, 2);
    for (new, old) in from_csv.tasks().iter().zip(source.tasks()) {
        assert_ne!(new.id, old.id);
        assert_eq!(new.title, old.title);
        assert_eq!(new.completed, old.completed);
        assert_eq!(new.due_date, old.due_date);
    }
}

#[test]
fn settings_store_end_to_end() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("conf").join("settings.json");

    // first run: nothing on disk, defaults apply
    let store = SettingsStore::load(path.clone()).expect("load settings");
    assert_eq!(store.snapshot().notifications.lead_minutes, 30);
    assert!(store.snapshot().display.show_completed);

    store.set_key("notifications.lead-minutes", "10").expect("set lead");
    store.set_key("display.show-completed", "off").expect("set show");

    // second run sees the persisted values merged over defaults
    let reloaded = SettingsStore::load(path.clone()).expect("reload settings");
    let settings = reloaded.snapshot();
    assert_eq!(settings.notifications.lead_minutes, 10);
    assert!(!settings.display.show_completed);
    assert_eq!(settings.language, "zh-CN");

    // hand-written partial files merge the same way
    fs::write(&path, r#"{"defaultValues":{"category":"work"}}"#).expect("write partial");
    let partial = SettingsStore::load(path).expect("load partial");
    assert_eq!(partial.snapshot().defaults.category, Category::Work);
    assert_eq!(partial.snapshot().defaults.due_hours, 24);
}
