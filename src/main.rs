//! Yoga Timer CLI - guided practice in the terminal
//!
//! Plays a sequence of timed steps with a short pause between them:
//! - Built-in presets (kirtan and meditation) or a custom JSON step list
//! - Local history of completed steps
//! - Best-effort time tracking in Clockify with an offline queue

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use tokio::sync::mpsc;

use yoga_timer::cli::{Cli, Commands, Display, RunArgs};
use yoga_timer::config::{default_data_dir, AppConfig};
use yoga_timer::{
    default_presets, find_preset, record_completions, ClockifySink, CompletionForwarder,
    ConfigSource, Connectivity, FileStore, HistoryStore, PendingQueue, PersistentStore,
    SystemClock, TimerEngine, TimerEvent, TimerStep, TrackingSync,
};

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    match cli.command {
        Some(Commands::Run(args)) => {
            let config = AppConfig::load(&data_dir)?;
            run_practice(args, &data_dir, &config).await?;
        }
        Some(Commands::Presets) => {
            Display::show_presets(&default_presets());
        }
        Some(Commands::History { limit }) => {
            let config = AppConfig::load(&data_dir)?;
            let history = HistoryStore::load(open_store(&data_dir), config.history.session_gap());
            Display::show_history(&history.recent(limit as usize));
        }
        Some(Commands::Pending { clear }) => {
            let config = AppConfig::load(&data_dir)?;
            let queue = PendingQueue::with_max_attempts(open_store(&data_dir), config.sync.max_attempts);
            if clear {
                queue.clear().context("Failed to clear pending queue")?;
                Display::show_pending_cleared();
            } else {
                let entries = match config.tracking.owner_id.as_deref() {
                    Some(owner) => queue.list_for_owner(owner)?,
                    None => queue.entries()?,
                };
                Display::show_pending(&entries, queue.max_attempts());
            }
        }
        Some(Commands::Sync) => {
            let config = AppConfig::load(&data_dir)?;
            let owner = config
                .tracking
                .owner_id
                .clone()
                .context("tracking.owner_id is not set in config.json")?;
            let sync = build_sync(open_store(&data_dir), &config, true)?;
            let outcome = sync
                .drain(&owner, &config.tracking.tracking_config())
                .await;
            Display::show_sync_outcome(&outcome);
        }
        Some(Commands::Completions { shell }) => {
            generate_completions(shell);
        }
        None => {
            // No command provided, show help
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

fn open_store(data_dir: &Path) -> Arc<dyn PersistentStore> {
    Arc::new(FileStore::new(data_dir))
}

fn build_sync(
    store: Arc<dyn PersistentStore>,
    config: &AppConfig,
    online: bool,
) -> Result<TrackingSync> {
    let sink = ClockifySink::new(config.tracking.base_url.clone())
        .context("Failed to create Clockify client")?;
    let queue = PendingQueue::with_max_attempts(store, config.sync.max_attempts);

    Ok(TrackingSync::new(
        Arc::new(sink),
        Arc::new(queue),
        Connectivity::new(online),
        ConfigSource::new(config.tracking.tracking_config()),
    )
    .with_config_debounce(Duration::from_secs(config.sync.config_debounce_secs)))
}

/// Reads a JSON array of steps.
fn load_steps(path: &Path) -> Result<Vec<TimerStep>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read steps file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse steps file: {}", path.display()))
}

/// Plays a sequence until it completes or Ctrl-C is pressed.
async fn run_practice(args: RunArgs, data_dir: &Path, config: &AppConfig) -> Result<()> {
    let steps = match &args.steps {
        Some(path) => load_steps(path)?,
        None => {
            find_preset(&args.preset)
                .with_context(|| format!("Unknown preset: {}", args.preset))?
                .steps
        }
    };
    if steps.is_empty() {
        bail!("No steps to play");
    }

    let store = open_store(data_dir);
    let history = Arc::new(HistoryStore::load(store.clone(), config.history.session_gap()));
    let (history_tx, history_rx) = mpsc::unbounded_channel();
    let (tracking_tx, tracking_rx) = mpsc::unbounded_channel();
    let completions = Arc::new(
        CompletionForwarder::new()
            .with_history(history_tx)
            .with_tracking(tracking_tx),
    );
    let history_writer = tokio::spawn(record_completions(history, history_rx));

    let sync = Arc::new(build_sync(store, config, !args.offline)?);
    let worker = tokio::spawn(sync.run(config.tracking.owner_id.clone(), tracking_rx));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut engine = TimerEngine::new(
        Arc::new(SystemClock),
        completions,
        &config.timer,
        Some(event_tx),
    );
    let machine = engine.machine();
    {
        let mut machine = machine.lock().await;
        machine.set_queue(steps);
        machine.set_is_looping(args.looping);
        machine.start();
    }

    // the printer must not keep the machine alive
    let weak = Arc::downgrade(&machine);
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                TimerEvent::Tick { .. } | TimerEvent::Started { .. } | TimerEvent::Advanced { .. } => {
                    if let Some(machine) = weak.upgrade() {
                        let snapshot = machine.lock().await.snapshot();
                        Display::show_countdown(&snapshot);
                    }
                }
                TimerEvent::StepCompleted { label, cue, .. } => {
                    Display::show_step_completed(&label, cue);
                }
                TimerEvent::Looped => Display::show_looped(),
                TimerEvent::RunCompleted => Display::show_run_completed(),
                _ => {}
            }
        }
    });

    tokio::select! {
        result = engine.run_until_completed() => result?,
        _ = tokio::signal::ctrl_c() => {
            machine.lock().await.pause();
            println!();
            tracing::info!("Interrupted; stopping");
        }
    }

    // dropping the machine closes the event, history and tracking channels
    drop(machine);
    drop(engine);
    printer.await.context("Display task failed")?;
    history_writer.await.context("History writer failed")?;
    worker.await.context("Tracking worker failed")?;

    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::parse_from(["yoga-timer"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["yoga-timer", "run"]);
        assert!(matches!(cli.command, Some(Commands::Run(_))));
    }

    #[test]
    fn test_cli_parse_verbose() {
        let cli = Cli::parse_from(["yoga-timer", "--verbose", "presets"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_load_steps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steps.json");
        std::fs::write(
            &path,
            r#"[{"id":"a","label":"Asanas","duration":900},{"id":"b","label":"Rest","duration":300,"type":"break"}]"#,
        )
        .unwrap();

        let steps = load_steps(&path).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].label, "Rest");
    }

    #[test]
    fn test_load_steps_missing_file() {
        let err = load_steps(Path::new("/nonexistent/steps.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read steps file"));
    }
}
