//! Live reload: background file watching with a bounded hand-off queue.
//!
//! A watcher thread blocks on filesystem events for one file, re-reads and
//! re-decodes it (CPU only), and stages the result on a [`ReloadQueue`]. The
//! render thread drains the queue with a non-blocking poll once per frame
//! and does all GPU mutation itself.
//!
//! ```text
//! Idle --event--> Reparsing --ok--> Staged --poll--> Idle
//!                     \--err (logged)--------------> Idle
//! ```

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    thread,
};

use anyhow::{Context, anyhow};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Staged updates the queue holds before the watcher thread blocks.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// A freshly decoded replacement for the resource identified by `target`.
#[derive(Clone, Debug)]
pub struct ReloadUpdate<K, T> {
    pub target: K,
    pub payload: T,
}

/// Consumer side of the hand-off. Owned by whoever owns the GPU resources.
pub struct ReloadQueue<K, T> {
    tx: Sender<ReloadUpdate<K, T>>,
    rx: Receiver<ReloadUpdate<K, T>>,
}

impl<K, T> ReloadQueue<K, T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self { tx, rx }
    }

    /// Producer handle for a watcher thread (or a test).
    pub fn stager(&self) -> Stager<K, T> {
        Stager {
            tx: self.tx.clone(),
        }
    }

    /// Take one staged update if present. Never blocks.
    pub fn poll(&self) -> Option<ReloadUpdate<K, T>> {
        match self.rx.try_recv() {
            Ok(update) => Some(update),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Poll once and, if an update was staged, hand it to `apply` on the
    /// calling thread. Returns whether anything was applied.
    pub fn poll_and_apply(&self, apply: impl FnOnce(ReloadUpdate<K, T>)) -> bool {
        match self.poll() {
            Some(update) => {
                apply(update);
                true
            }
            None => false,
        }
    }
}

impl<K, T> Default for ReloadQueue<K, T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Producer side of a [`ReloadQueue`].
pub struct Stager<K, T> {
    tx: Sender<ReloadUpdate<K, T>>,
}

impl<K, T> Clone for Stager<K, T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<K, T> Stager<K, T> {
    /// Blocks while the queue is full. Fails only once the queue is gone.
    pub fn stage(&self, update: ReloadUpdate<K, T>) -> anyhow::Result<()> {
        self.tx
            .send(update)
            .map_err(|_| anyhow!("reload queue was dropped"))
    }
}

/// What one reparse attempt did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadOutcome {
    Staged,
    /// Reload failed; the resource currently in use stays in effect.
    Failed,
    /// Consumer is gone; the watcher should stop.
    Closed,
}

/// Reparse `path` once and stage the result for `target`.
pub fn reload_now<K, T, F>(
    path: &Path,
    target: &K,
    reload: &F,
    stager: &Stager<K, T>,
) -> ReloadOutcome
where
    K: Clone,
    F: Fn(&Path) -> anyhow::Result<T>,
{
    match reload(path) {
        Ok(payload) => {
            let update = ReloadUpdate {
                target: target.clone(),
                payload,
            };
            match stager.stage(update) {
                Ok(()) => {
                    log::debug!("Staged reload of {}", path.display());
                    ReloadOutcome::Staged
                }
                Err(_) => ReloadOutcome::Closed,
            }
        }
        Err(err) => {
            log::warn!("Reload of {} failed: {err:#}", path.display());
            ReloadOutcome::Failed
        }
    }
}

/// Keeps a file watch alive. Dropping it stops the OS watcher, which ends
/// the background thread after any in-flight reparse.
pub struct FileWatch {
    _watcher: RecommendedWatcher,
}

/// Start watching `path`. Every create/modify event for that file triggers a
/// reparse through `reload`, and successful results are staged for `target`.
///
/// The parent directory is watched rather than the file itself, so saves that
/// replace the file by rename are still seen.
pub fn watch_file<K, T, F>(
    path: impl Into<PathBuf>,
    target: K,
    stager: Stager<K, T>,
    reload: F,
) -> anyhow::Result<FileWatch>
where
    K: Clone + Send + 'static,
    T: Send + 'static,
    F: Fn(&Path) -> anyhow::Result<T> + Send + 'static,
{
    let path = path.into();
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| anyhow!("cannot watch {}: no file name", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let (event_tx, event_rx) = crossbeam_channel::unbounded::<notify::Result<Event>>();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        },
        Config::default(),
    )
    .context("Failed to create file watcher")?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;

    let thread_path = path.clone();
    thread::Builder::new()
        .name(format!("watch:{}", file_name.to_string_lossy()))
        .spawn(move || watch_loop(&thread_path, &file_name, event_rx, target, stager, reload))
        .context("Failed to spawn watcher thread")?;

    log::info!("Watching {} for changes", path.display());
    Ok(FileWatch { _watcher: watcher })
}

fn watch_loop<K, T, F>(
    path: &Path,
    file_name: &OsString,
    events: Receiver<notify::Result<Event>>,
    target: K,
    stager: Stager<K, T>,
    reload: F,
) where
    K: Clone,
    F: Fn(&Path) -> anyhow::Result<T>,
{
    while let Ok(res) = events.recv() {
        match res {
            Ok(event) if touches(&event, file_name) => {}
            Ok(_) => continue,
            Err(err) => {
                log::warn!("Watch error for {}: {err}", path.display());
                continue;
            }
        }

        // One save usually fires several events; reparse once for the burst.
        while events.try_recv().is_ok() {}

        log::trace!("Change detected in {}", path.display());
        if reload_now(path, &target, &reload, &stager) == ReloadOutcome::Closed {
            break;
        }
    }
    log::debug!("Stopped watching {}", path.display());
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}
