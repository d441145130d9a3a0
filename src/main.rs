//! Surface Mixer - per-application volume from a MIDI control surface

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use surface_mixer::backend::{AudioBackend, ConsoleBackend, NullIndicators};
use surface_mixer::cli::{self, Cli};
use surface_mixer::config::{AppConfig, ConfigWatcher};
use surface_mixer::engine::{Engine, EngineHandle, Notification};
use surface_mixer::paths::AppPaths;
use surface_mixer::persistence::{PersistenceActor, SnapshotStore};
use surface_mixer::router::Router;
use surface_mixer::surface::{self, SurfaceConnection};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    let paths = AppPaths::detect().with_config(args.config.clone());
    paths.ensure_directories()?;
    let _log_guard = init_logging(&args.log_level, &paths.logs_dir)?;

    info!("Starting Surface Mixer v{}", env!("CARGO_PKG_VERSION"));
    info!("Run mode: {:?}, config: {}", paths.mode, paths.config.display());

    if !paths.config.exists() {
        info!("No config found, writing defaults to {}", paths.config.display());
        AppConfig::default().save(&paths.config).await?;
    }

    let (config_watcher, config) = ConfigWatcher::new(paths.config.clone()).await?;

    if args.list_ports {
        surface::print_ports(&config.midi)?;
        return Ok(());
    }

    let paths = paths.with_state_dir(config.persistence.state_dir.clone());
    paths.ensure_directories()?;

    let backend = Arc::new(ConsoleBackend::new(config.simulated_targets.clone()));
    info!("Audio backend: {}", backend.name());

    let store: Option<Arc<dyn SnapshotStore>> = if config.persistence.enabled {
        let handle = PersistenceActor::spawn(paths.sled_db_path(), config.persistence.debounce_ms)?;
        let store: Arc<dyn SnapshotStore> = Arc::new(handle);
        Some(store)
    } else {
        info!("Persistence disabled");
        None
    };

    let router = Router::new(
        config.engine.router_settings(),
        backend.clone(),
        Arc::new(NullIndicators),
    );
    let engine = Engine::spawn(router, store);
    let ticker = engine.spawn_ticker(config.engine.refresh_interval());

    engine
        .subscribe(Arc::new(|notification: &Notification| {
            info!("{}", describe(notification));
        }))
        .await;

    let surface = if args.no_surface {
        info!("Running without a control surface");
        None
    } else {
        match SurfaceConnection::connect(&config.midi, engine.clone()) {
            Ok(connection) => {
                engine.set_indicators(connection.indicators());
                Some(connection)
            }
            Err(e) => {
                warn!("Control surface unavailable, continuing without it: {:#}", e);
                None
            }
        }
    };

    info!("Ready");
    run(engine.clone(), backend, config_watcher, args.repl).await?;

    info!("Shutting down...");
    ticker.abort();
    engine.shutdown().await;
    drop(surface);
    info!("Surface Mixer shutdown complete");
    Ok(())
}

/// Apply config reloads until ctrl-c or the REPL quits
async fn run(
    engine: EngineHandle,
    backend: Arc<ConsoleBackend>,
    mut config_watcher: ConfigWatcher,
    repl: bool,
) -> Result<()> {
    let repl_task = repl.then(|| {
        let repl_engine = engine.clone();
        let runtime = tokio::runtime::Handle::current();
        tokio::task::spawn_blocking(move || cli::run_repl(repl_engine, runtime))
    });
    let repl_done = async move {
        match repl_task {
            Some(task) => task.await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(repl_done);

    loop {
        tokio::select! {
            Some(new_config) = config_watcher.next_config() => {
                info!("Configuration file changed, applying engine settings");
                engine.update_settings(new_config.engine.router_settings());
                backend.set_targets(new_config.simulated_targets);
            }
            result = &mut repl_done => {
                match result {
                    Ok(Ok(())) => info!("REPL closed"),
                    Ok(Err(e)) => warn!("REPL failed: {:#}", e),
                    Err(e) => warn!("REPL task panicked: {}", e),
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

fn describe(notification: &Notification) -> String {
    match notification {
        Notification::LearnArmed(session) => {
            format!("Learn armed: {} -> {}", session.action, session.target)
        }
        Notification::LearnCancelled(session) => format!("Learn cancelled: {}", session.action),
        Notification::Learn(outcome) => format!("Learn: {:?}", outcome),
        Notification::Rejected(rejection) => format!("Rejected: {}", rejection),
        Notification::Directory(report) => format!("Targets changed: {:?}", report),
        Notification::Restored(summary) => format!(
            "Restored {} mappings, {} targets, {} assignments",
            summary.mappings, summary.targets, summary.assignments
        ),
    }
}

fn init_logging(level: &str, logs_dir: &Path) -> Result<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(logs_dir, "surface-mixer.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}
