use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::task::Task;

pub const SETTINGS_ENV_VAR: &str = "MINDER_SETTINGS";
pub const DATA_ENV_VAR: &str = "MINDER_DATA";

const APP_DIR: &str = "minder";
const SETTINGS_FILE: &str = "settings.json";
const DATA_FILE: &str = "tasks.json";

/// Settings file location: explicit flag, then $MINDER_SETTINGS, then the
/// platform config directory.
pub fn resolve_settings_path(override_path: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }

    if let Ok(raw) = env::var(SETTINGS_ENV_VAR)
        && !raw.trim().is_empty()
    {
        return Ok(PathBuf::from(raw));
    }

    let base = dirs::config_dir().ok_or_else(|| anyhow!("cannot determine config directory"))?;
    Ok(base.join(APP_DIR).join(SETTINGS_FILE))
}

/// Task file location: explicit flag, then $MINDER_DATA, then the platform
/// data directory.
pub fn resolve_data_path(override_path: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }

    if let Ok(raw) = env::var(DATA_ENV_VAR)
        && !raw.trim().is_empty()
    {
        return Ok(PathBuf::from(raw));
    }

    let base = dirs::data_dir().ok_or_else(|| anyhow!("cannot determine data directory"))?;
    Ok(base.join(APP_DIR).join(DATA_FILE))
}

/// Loads the task collection. A missing file is an empty collection, not
/// an error.
#[tracing::instrument(skip(path))]
pub fn load_tasks(path: &Path) -> anyhow::Result<Vec<Task>> {
    if !path.exists() {
        debug!(file = %path.display(), "no task file yet");
        return Ok(Vec::new());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let tasks: Vec<Task> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse task file {}", path.display()))?;
    info!(file = %path.display(), count = tasks.len(), "loaded tasks");
    Ok(tasks)
}

#[tracing::instrument(skip(path, tasks))]
pub fn save_tasks_atomic(path: &Path, tasks: &[Task]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving tasks atomically");
    let payload = serde_json::to_string_pretty(tasks).context("failed to serialize tasks")?;
    write_atomic(path, payload.as_bytes())
}

/// Writes via a temp file in the target directory and renames it into
/// place, so readers never observe a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
