use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use cronwork_core::config::CronworkConfig;
use cronwork_core::CronworkError;
use cronwork_executor::{ExecOptions, MemoryLockService, ShellExecutor};
use cronwork_scheduler::{CronCompiler, SchedulerEngine, Trigger, TriggerCompiler};
use cronwork_sink::{BatchingLogSink, LogStore};
use cronwork_store::TaskStore;
use tracing::{error, info, warn};

mod watcher;

#[derive(Parser)]
#[command(
    name = "cronwork-worker",
    about = "Cron-style shell task worker",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $CRONWORK_CONFIG, then ~/.cronwork/cronwork.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule and execute the configured tasks (default)
    Run,

    /// Print the execution history of a task as JSON lines
    Logs {
        /// Task name
        #[arg(long)]
        task: String,

        /// Number of most recent runs to skip
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Maximum number of runs to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Validate every configured trigger and show its next fire time
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cronwork_worker=info,cronwork_scheduler=info,cronwork_executor=info,\
                 cronwork_sink=info,cronwork_store=info"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();
    // explicit --config > CRONWORK_CONFIG env > ~/.cronwork/cronwork.toml
    let config_path = cli.config.or_else(|| std::env::var("CRONWORK_CONFIG").ok());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config_path).await,
        Commands::Logs { task, skip, limit } => {
            let config = load_config(config_path.as_deref());
            print_logs(&config, &task, skip, limit)
        }
        Commands::Check => {
            let config = CronworkConfig::load(config_path.as_deref())?;
            check(&config)
        }
    }
}

fn load_config(path: Option<&str>) -> CronworkConfig {
    CronworkConfig::load(path).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        CronworkConfig::default()
    })
}

async fn run(config_path: Option<String>) -> anyhow::Result<()> {
    let config = load_config(config_path.as_deref());

    info!(path = %config.sink.path, "opening task log database");
    let log_store = Arc::new(
        LogStore::open(&config.sink.path)
            .with_context(|| format!("opening log database {}", config.sink.path))?,
    );
    let (sink, writer) = BatchingLogSink::new(Arc::clone(&log_store), &config.sink);
    let writer_join = tokio::spawn(writer.run());

    let store = Arc::new(TaskStore::new());
    let seeded = store.sync(config.tasks.clone()).map_err(CronworkError::from)?;
    info!(tasks = seeded.saved, "task store seeded from config");

    let locks = Arc::new(MemoryLockService::new());
    let executor = Arc::new(ShellExecutor::new(locks, ExecOptions::from(&config.executor)));
    let engine = SchedulerEngine::new(&config.worker, executor, Arc::new(sink));
    let handle = engine.handle();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_join = tokio::spawn(engine.run(shutdown_rx.clone()));
    let watch_join = tokio::spawn(watcher::forward_events(
        Arc::clone(&store),
        handle,
        shutdown_rx,
    ));

    let mut reload = ReloadSignal::new()?;
    info!("cronwork worker running");
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!(error = %e, "failed to listen for ctrl-c");
                }
                info!("shutdown requested");
                break;
            }
            () = reload.recv() => reload_tasks(&store, config_path.as_deref()),
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = watch_join.await {
        error!(error = %e, "task watch panicked");
    }
    if let Err(e) = engine_join.await {
        error!(error = %e, "scheduler engine panicked");
    }
    // The engine owned the last sink handle; the writer now drains and exits.
    if let Err(e) = writer_join.await {
        error!(error = %e, "log writer panicked");
    }
    info!("cronwork worker stopped");
    Ok(())
}

/// Re-read the config file and bring the store in line with its `[[tasks]]`.
///
/// Other sections only take effect on restart.
fn reload_tasks(store: &TaskStore, config_path: Option<&str>) {
    info!("reloading task configuration");
    let config = match CronworkConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(code = e.code(), error = %e, "config reload failed, keeping current tasks");
            return;
        }
    };
    if let Err(e) = store.sync(config.tasks) {
        let e = CronworkError::from(e);
        warn!(code = e.code(), error = %e, "config reload rejected, keeping current tasks");
    }
}

fn print_logs(config: &CronworkConfig, task: &str, skip: usize, limit: usize) -> anyhow::Result<()> {
    let store = LogStore::open(&config.sink.path)
        .with_context(|| format!("opening log database {}", config.sink.path))?;
    for record in store.list_logs(task, skip, limit)? {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

fn check(config: &CronworkConfig) -> anyhow::Result<()> {
    let compiler = CronCompiler;
    let now = Utc::now();
    let mut failed = 0usize;

    for task in &config.tasks {
        match compiler.compile(&task.trigger) {
            Ok(trigger) => match trigger.next_after(now) {
                Some(next) => println!("ok    {:<24} {:<20} next {}", task.name, task.trigger, next),
                None => println!("ok    {:<24} {:<20} never fires again", task.name, task.trigger),
            },
            Err(e) => {
                failed += 1;
                println!("error {:<24} {}", task.name, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} task triggers are invalid", config.tasks.len());
    }
    println!("{} task(s) ok", config.tasks.len());
    Ok(())
}

/// SIGHUP listener. Never fires on platforms without it.
struct ReloadSignal {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl ReloadSignal {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            hangup: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?,
        })
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if self.hangup.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        #[cfg(not(unix))]
        {
            std::future::pending::<()>().await;
        }
    }
}
