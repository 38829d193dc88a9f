//! Configuration watcher (C9): file-change notification with polling
//! fallback and SHA-256 content confirmation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::{self, Settings};

/// Invoked with a freshly-loaded, already-validated settings document each
/// time the watched file's content actually changes.
pub type ChangeHandler = Arc<dyn Fn(Settings) -> BoxFuture<'static, ()> + Send + Sync>;

/// Watches a single settings file and re-runs the loader on change.
pub struct ConfigWatcher {
    path: PathBuf,
    poll_interval: std::time::Duration,
    on_change: ChangeHandler,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConfigWatcher {
    pub fn new(
        path: impl Into<PathBuf>,
        poll_interval: std::time::Duration,
        on_change: ChangeHandler,
    ) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            on_change,
            task: Mutex::new(None),
        }
    }

    /// Starts the worker task. Idempotent: a second call while already
    /// running is a no-op (logged).
    pub async fn start(&self) {
        let mut guard = self.task.lock().await;
        if guard.is_some() {
            tracing::warn!(path = %self.path.display(), "config_watcher_already_running");
            return;
        }
        let path = self.path.clone();
        let poll_interval = self.poll_interval;
        let on_change = self.on_change.clone();
        let initial_hash = hash_file(&path);

        *guard = Some(tokio::spawn(async move {
            run(path, poll_interval, on_change, initial_hash).await;
        }));
        tracing::info!(path = %self.path.display(), "config_watcher_started");
    }

    /// Cancels the worker and waits for it to drain. Idempotent.
    pub async fn stop(&self) {
        let mut guard = self.task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
            let _ = handle.await;
            tracing::info!(path = %self.path.display(), "config_watcher_stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }
}

fn hash_file(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            format!("{:x}", hasher.finalize())
        }
        Err(_) => String::new(),
    }
}

async fn run(
    path: PathBuf,
    poll_interval: std::time::Duration,
    on_change: ChangeHandler,
    initial_hash: String,
) {
    let mut last_hash = initial_hash;
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    let watch_path = path.clone();
    let watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if res.is_ok() {
                let _ = tx.send(());
            }
        },
        notify::Config::default(),
    )
    .and_then(|mut w| {
        w.watch(&watch_path, RecursiveMode::NonRecursive)?;
        Ok(w)
    });

    match watcher {
        Ok(watcher) => {
            tracing::info!(path = %path.display(), mode = "events", "config_watcher_mode_selected");
            // Keep the watcher alive for the duration of the event loop below;
            // dropping it would stop delivery.
            let _watcher = watcher;
            while rx.recv().await.is_some() {
                check_and_fire(&path, &on_change, &mut last_hash).await;
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                interval = ?poll_interval,
                "config_watcher_events_unavailable_falling_back_to_polling"
            );
            loop {
                tokio::time::sleep(poll_interval).await;
                check_and_fire(&path, &on_change, &mut last_hash).await;
            }
        }
    }
}

async fn check_and_fire(path: &Path, on_change: &ChangeHandler, last_hash: &mut String) {
    let current = hash_file(path);
    if current == *last_hash {
        return;
    }
    *last_hash = current;
    tracing::info!(path = %path.display(), "config_change_detected");
    match config::load_settings(path) {
        Ok(settings) => {
            on_change(settings).await;
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "config_change_parse_failed_keeping_previous");
        }
    }
}
