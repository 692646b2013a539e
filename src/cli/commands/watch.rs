//! Watch command: run the watcher in the foreground until Ctrl+C.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;

use crate::cli::args::WatchArgs;
use crate::config::Settings;
use crate::engine::LoggingEngine;
use crate::loader::ParentContext;
use crate::watcher::ClassWatcher;

/// How long the loop gets to notice the stop flag after Ctrl+C.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Fold command-line overrides into the loaded settings.
pub fn apply_overrides(mut settings: Settings, args: &WatchArgs) -> Settings {
    if !args.roots.is_empty() {
        settings.watch.roots = args.roots.clone();
    }
    if let Some(suffix) = &args.suffix {
        settings.watch.artifact_suffix = suffix.clone();
    }
    if let Some(settle_ms) = args.settle_ms {
        settings.watch.settle_ms = settle_ms;
    }
    if let Some(poll_ms) = args.poll_ms {
        settings.watch.poll_interval_ms = poll_ms;
    }
    if let Some(context) = &args.context {
        settings.engine.context = context.clone();
    }
    settings
}

/// Run watch command - block until the loop ends or Ctrl+C is received.
pub async fn run_watch(args: WatchArgs, settings: Settings) -> anyhow::Result<()> {
    let settings = apply_overrides(settings, &args);
    let roots = settings.effective_roots();
    let engine = Arc::new(LoggingEngine::new());

    let handle = ClassWatcher::builder()
        .settings(&settings)
        .roots(roots.iter().cloned())
        .parent(ParentContext::new(settings.engine.context.clone()))
        .engine_arc(engine.clone())
        .build()?
        .start()
        .context("Failed to start the watcher")?;

    for root in &roots {
        eprintln!("Watching {}", root.display());
    }
    eprintln!("Press Ctrl+C to stop");

    let stop = handle.stop_flag();
    let mut joined = tokio::task::spawn_blocking(move || handle.join());

    let summary = tokio::select! {
        result = &mut joined => result??,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            crate::log_event!("watcher", "stopping", "interrupt received");
            stop.store(false, Ordering::Release);
            tokio::time::timeout(SHUTDOWN_TIMEOUT, joined)
                .await
                .context("Watcher did not stop in time")???
        }
    };

    println!(
        "Loaded {} classes ({} failed), {} directories watched at exit",
        summary.loaded, summary.failed, summary.directories
    );
    Ok(())
}
