//! Filesystem watcher for a PRD document.
//!
//! The worker rewrites the PRD while it runs. The watcher reloads it on every
//! write and only reports when story status moved, so title or description
//! edits stay silent.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::model::Prd;
use crate::error::{PrdloopError, Result};

/// Capacity of the outgoing watch event channel
const WATCH_BUFFER: usize = 16;

/// Notification from a running watcher.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// Story status differs from the last reported snapshot
    Changed(Prd),
    /// The document vanished or the watch backend failed
    Error(String),
}

/// True if story status differs between two snapshots.
///
/// Status means: the number of stories, the set of ids, and each story's
/// `passes`/`in_progress` flags. Content fields are ignored.
pub fn has_status_changed(old: &Prd, new: &Prd) -> bool {
    if old.user_stories.len() != new.user_stories.len() {
        return true;
    }

    new.user_stories.iter().any(|story| match old.story(&story.id) {
        None => true,
        Some(prev) => prev.passes != story.passes || prev.in_progress != story.in_progress,
    })
}

struct ActiveWatch {
    // Held so the OS watch lives as long as the task
    _watcher: Arc<Mutex<RecommendedWatcher>>,
    cancel: CancellationToken,
}

/// Watches one PRD file. One instance per workload.
pub struct PrdWatcher {
    path: PathBuf,
    active: Option<ActiveWatch>,
}

impl PrdWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            active: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Start watching. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Result<mpsc::Receiver<WatchEvent>> {
        if self.active.is_some() {
            return Err(PrdloopError::InvalidState(format!(
                "watcher for {} already started",
                self.path.display()
            )));
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| PrdloopError::InvalidState(format!("not a file path: {}", self.path.display())))?;
        let dir = Prd::dir_of(&self.path);

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = raw_tx.send(res);
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        let watcher = Arc::new(Mutex::new(watcher));

        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let cancel = CancellationToken::new();
        let snapshot = Prd::load(&self.path).ok();

        let task = WatchTask {
            path: self.path.clone(),
            dir,
            file_name,
            watcher: watcher.clone(),
            snapshot,
        };
        tokio::spawn(task.run(raw_rx, tx, cancel.clone()));

        log::debug!("Watching {}", self.path.display());
        self.active = Some(ActiveWatch {
            _watcher: watcher,
            cancel,
        });
        Ok(rx)
    }

    /// Stop watching. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            log::debug!("Stopped watching {}", self.path.display());
        }
    }
}

impl Drop for PrdWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WatchTask {
    path: PathBuf,
    dir: PathBuf,
    file_name: OsString,
    watcher: Arc<Mutex<RecommendedWatcher>>,
    snapshot: Option<Prd>,
}

impl WatchTask {
    async fn run(
        mut self,
        mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        tx: mpsc::Sender<WatchEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let res = tokio::select! {
                _ = cancel.cancelled() => break,
                res = raw_rx.recv() => match res {
                    Some(res) => res,
                    None => break,
                },
            };

            let outgoing = match res {
                Ok(event) => self.handle(event),
                Err(e) => Some(WatchEvent::Error(e.to_string())),
            };

            if let Some(event) = outgoing
                && tx.send(event).await.is_err()
            {
                break;
            }
        }
    }

    fn handle(&mut self, event: Event) -> Option<WatchEvent> {
        let touches_prd = event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(self.file_name.as_os_str()));
        if !touches_prd {
            return None;
        }

        match event.kind {
            EventKind::Remove(_) => {
                self.rewatch();
                Some(WatchEvent::Error(format!("PRD removed: {}", self.path.display())))
            }
            EventKind::Create(_) | EventKind::Modify(_) => self.reload(),
            _ => None,
        }
    }

    fn reload(&mut self) -> Option<WatchEvent> {
        // Partial writes fail to parse; the follow-up write event catches up
        let prd = match Prd::load(&self.path) {
            Ok(prd) => prd,
            Err(e) => {
                log::debug!("Skipping unreadable PRD {}: {}", self.path.display(), e);
                return None;
            }
        };

        let changed = match &self.snapshot {
            Some(prev) => has_status_changed(prev, &prd),
            None => true,
        };
        if !changed {
            return None;
        }

        self.snapshot = Some(prd.clone());
        Some(WatchEvent::Changed(prd))
    }

    fn rewatch(&self) {
        let Ok(mut watcher) = self.watcher.lock() else {
            return;
        };
        let _ = watcher.unwatch(&self.dir);
        if let Err(e) = watcher.watch(&self.dir, RecursiveMode::NonRecursive) {
            log::warn!("Failed to re-watch {}: {}", self.dir.display(), e);
        }
    }
}
