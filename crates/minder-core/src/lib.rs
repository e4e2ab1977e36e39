pub mod cli;
pub mod commands;
pub mod datetime;
pub mod filter;
pub mod notify;
pub mod reminder;
pub mod render;
pub mod settings;
pub mod storage;
pub mod store;
pub mod task;
pub mod transfer;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::notify::{NotifySink, TerminalSink};
use crate::reminder::{Clock, ReminderScheduler, SystemClock};
use crate::render::Renderer;
use crate::settings::SettingsStore;
use crate::store::TaskStore;

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting minder CLI"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    runtime.block_on(run_with(cli))
}

async fn run_with(cli: cli::GlobalCli) -> anyhow::Result<()> {
    let settings_path = storage::resolve_settings_path(cli.settings.as_deref())?;
    let settings = Arc::new(
        SettingsStore::load(settings_path).context("failed to load settings")?,
    );

    let sink: Arc<dyn NotifySink> = Arc::new(TerminalSink::new());
    if !sink.permission() {
        warn!(
            sink = sink.name(),
            "notification permission not granted; reminders will stay silent"
        );
    }
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler =
        ReminderScheduler::new(Arc::clone(&settings), Arc::clone(&sink), Arc::clone(&clock));

    let data_path = storage::resolve_data_path(cli.data.as_deref())?;
    let mut store = TaskStore::new(scheduler, Arc::clone(&clock));
    store.replace_all(
        storage::load_tasks(&data_path)
            .with_context(|| format!("failed to load task file {}", data_path.display()))?,
    );

    let mut renderer = Renderer::new();
    commands::dispatch(
        &mut store,
        &settings,
        &mut renderer,
        &clock,
        &data_path,
        cli.command,
    )
    .await?;

    info!("done");
    Ok(())
}
