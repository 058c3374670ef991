//! Manager implementation
//!
//! Manager owns the registry of PRDs and runs each one on its own task. The
//! registry map sits behind a RwLock; every instance has its own Mutex so a
//! slow instance never blocks lookups of the others.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::domain::{EventKind, LoopEvent, LoopInstance, LoopState};
use crate::error::{PrdloopError, Result};
use crate::prd::Prd;
use crate::runner::{LoopConfig, PrdLoop, RetryConfig, WorkerConfig};

/// Capacity of each loop's event channel
pub const LOOP_EVENT_CAPACITY: usize = 256;

/// Capacity of the aggregate event channel
pub const MANAGER_EVENT_CAPACITY: usize = 1024;

/// A loop event tagged with the PRD it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerEvent {
    pub name: String,
    pub event: LoopEvent,
}

/// What a post-completion hook gets to work with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCompletion {
    pub name: String,
    pub branch: Option<String>,
    pub work_dir: PathBuf,
}

/// Invoked once per run when a PRD completes, e.g. to push or merge the branch.
#[async_trait]
pub trait PostCompletionHook: Send + Sync {
    async fn on_complete(&self, completion: PostCompletion);
}

/// Plain completion callback, receives the PRD name
pub type CompletionCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Configuration for the Manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Working directory for PRDs registered without a worktree
    pub base_dir: PathBuf,
    pub max_iterations: u32,
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            max_iterations: 10,
            worker: WorkerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Default, Clone)]
struct Hooks {
    on_complete: Option<CompletionCallback>,
    post_completion: Option<Arc<dyn PostCompletionHook>>,
}

struct InstanceSlot {
    info: LoopInstance,
    runner: Option<Arc<PrdLoop>>,
    cancel: Option<CancellationToken>,
}

type Slot = Arc<Mutex<InstanceSlot>>;

/// Runs many PRD loops concurrently.
///
/// Events from every loop arrive on a single channel obtained with
/// [`Manager::take_events`]. The channel is bounded, so a caller that never
/// drains it eventually stalls the loops.
pub struct Manager {
    config: ManagerConfig,
    retry: std::sync::RwLock<RetryConfig>,
    instances: RwLock<HashMap<String, Slot>>,
    tracker: TaskTracker,
    events_tx: mpsc::Sender<ManagerEvent>,
    events_rx: std::sync::Mutex<Option<mpsc::Receiver<ManagerEvent>>>,
    hooks: Arc<std::sync::RwLock<Hooks>>,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(MANAGER_EVENT_CAPACITY);
        Self {
            retry: std::sync::RwLock::new(config.retry.clone()),
            config,
            instances: RwLock::new(HashMap::new()),
            tracker: TaskTracker::new(),
            events_tx,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
            hooks: Arc::new(std::sync::RwLock::new(Hooks::default())),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Aggregate event stream. Returns None after the first call.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ManagerEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Called with the PRD name on the first completion of each run.
    pub fn on_complete(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.hooks_mut().on_complete = Some(Arc::new(callback));
    }

    /// Hook called after the completion callback on the first completion of
    /// each run.
    pub fn set_post_completion_hook(&self, hook: Arc<dyn PostCompletionHook>) {
        self.hooks_mut().post_completion = Some(hook);
    }

    /// Retry policy applied to runs started from now on.
    pub fn set_retry_config(&self, retry: RetryConfig) {
        *self.retry.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = retry;
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Register a PRD that runs in the base directory.
    pub async fn register(&self, name: &str, prd_path: impl Into<PathBuf>) -> Result<()> {
        self.insert(LoopInstance::new(name, prd_path)).await
    }

    /// Register a PRD that runs in its own worktree.
    pub async fn register_with_worktree(
        &self,
        name: &str,
        prd_path: impl Into<PathBuf>,
        worktree_dir: impl Into<PathBuf>,
        branch: impl Into<String>,
    ) -> Result<()> {
        self.insert(LoopInstance::new(name, prd_path).with_worktree(worktree_dir, branch))
            .await
    }

    async fn insert(&self, info: LoopInstance) -> Result<()> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(&info.name) {
            return Err(PrdloopError::AlreadyRegistered(info.name));
        }
        tracing::debug!(prd = %info.name, path = %info.prd_path.display(), "Registered PRD");
        instances.insert(
            info.name.clone(),
            Arc::new(Mutex::new(InstanceSlot {
                info,
                runner: None,
                cancel: None,
            })),
        );
        Ok(())
    }

    /// Stop the PRD if it is running and forget it.
    pub async fn unregister(&self, name: &str) -> Result<()> {
        self.stop(name).await?;
        self.instances.write().await.remove(name);
        tracing::debug!(prd = %name, "Unregistered PRD");
        Ok(())
    }

    /// Start a fresh run.
    pub async fn start(&self, name: &str) -> Result<()> {
        let slot = self.slot(name).await?;
        let mut guard = slot.lock().await;
        if guard.info.state.is_active() {
            return Err(PrdloopError::InvalidState(format!("{} is already running", name)));
        }
        self.launch(name, &slot, &mut guard);
        Ok(())
    }

    /// Ask a running PRD to pause after its current iteration. The state turns
    /// `Paused` once the loop has returned.
    pub async fn pause(&self, name: &str) -> Result<()> {
        let slot = self.slot(name).await?;
        let guard = slot.lock().await;
        match (&guard.info.state, &guard.runner) {
            (LoopState::Running, Some(runner)) => {
                runner.pause();
                tracing::info!(prd = %name, "Pause requested");
                Ok(())
            }
            (state, _) => Err(PrdloopError::InvalidState(format!(
                "{} is not running ({:?})",
                name, state
            ))),
        }
    }

    /// Start a new run for a paused PRD.
    pub async fn resume(&self, name: &str) -> Result<()> {
        let slot = self.slot(name).await?;
        let mut guard = slot.lock().await;
        if guard.info.state != LoopState::Paused {
            return Err(PrdloopError::InvalidState(format!(
                "{} is not paused ({:?})",
                name, guard.info.state
            )));
        }
        self.launch(name, &slot, &mut guard);
        Ok(())
    }

    /// Stop a PRD. A no-op unless it is running or paused.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let slot = self.slot(name).await?;
        let mut guard = slot.lock().await;
        match guard.info.state {
            LoopState::Running => {
                if let Some(runner) = &guard.runner {
                    runner.stop();
                }
                if let Some(cancel) = &guard.cancel {
                    cancel.cancel();
                }
                guard.info.state = LoopState::Stopping;
                tracing::info!(prd = %name, "Stopping");
            }
            LoopState::Paused => {
                guard.info.state = LoopState::Stopped;
                tracing::info!(prd = %name, "Stopped while paused");
            }
            _ => {}
        }
        Ok(())
    }

    /// Stop everything and wait until every loop and forwarder task has exited.
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.instances.read().await.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.stop(&name).await {
                tracing::warn!(prd = %name, error = %e, "Stop failed");
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
        tracing::info!("All loops stopped");
    }

    pub async fn get_state(&self, name: &str) -> Option<LoopState> {
        let slot = self.instances.read().await.get(name).cloned()?;
        let state = slot.lock().await.info.state;
        Some(state)
    }

    pub async fn get_instance(&self, name: &str) -> Option<LoopInstance> {
        let slot = self.instances.read().await.get(name).cloned()?;
        let info = slot.lock().await.info.clone();
        Some(info)
    }

    /// Snapshots of every instance, sorted by name.
    pub async fn get_all_instances(&self) -> Vec<LoopInstance> {
        let slots: Vec<Slot> = self.instances.read().await.values().cloned().collect();
        let mut all = Vec::with_capacity(slots.len());
        for slot in slots {
            all.push(slot.lock().await.info.clone());
        }
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Names of PRDs in the `Running` state, sorted.
    pub async fn running_prds(&self) -> Vec<String> {
        self.get_all_instances()
            .await
            .into_iter()
            .filter(|i| i.state == LoopState::Running)
            .map(|i| i.name)
            .collect()
    }

    pub async fn running_count(&self) -> usize {
        self.running_prds().await.len()
    }

    async fn slot(&self, name: &str) -> Result<Slot> {
        self.instances
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| PrdloopError::NotRegistered(name.to_string()))
    }

    fn hooks_mut(&self) -> std::sync::RwLockWriteGuard<'_, Hooks> {
        self.hooks.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn launch(&self, name: &str, slot: &Slot, instance: &mut InstanceSlot) {
        let (loop_tx, loop_rx) = mpsc::channel(LOOP_EVENT_CAPACITY);
        let work_dir = instance
            .info
            .worktree_dir
            .clone()
            .unwrap_or_else(|| self.config.base_dir.clone());
        let config = LoopConfig {
            max_iterations: self.config.max_iterations,
            work_dir: Some(work_dir.clone()),
            worker: self.config.worker.clone(),
            retry: self.retry_config(),
            log_path: None,
        };
        let runner = Arc::new(PrdLoop::new(&instance.info.prd_path, config, loop_tx));
        let cancel = CancellationToken::new();

        instance.info.state = LoopState::Running;
        instance.info.iteration = 0;
        instance.info.started_at = Some(Utc::now());
        instance.info.last_error = None;
        instance.runner = Some(Arc::clone(&runner));
        instance.cancel = Some(cancel.clone());

        tracing::info!(prd = %name, work_dir = %work_dir.display(), "Starting loop");

        self.tracker.spawn(forward_events(
            name.to_string(),
            loop_rx,
            Arc::clone(slot),
            self.events_tx.clone(),
            Arc::clone(&self.hooks),
            PostCompletion {
                name: name.to_string(),
                branch: instance.info.branch.clone(),
                work_dir,
            },
        ));
        self.tracker
            .spawn(run_loop(name.to_string(), runner, cancel, Arc::clone(slot)));
    }
}

/// Tags events with the PRD name, tracks the iteration, and fires the
/// completion hooks on the first `Complete` of the run.
async fn forward_events(
    name: String,
    mut loop_rx: mpsc::Receiver<LoopEvent>,
    slot: Slot,
    events_tx: mpsc::Sender<ManagerEvent>,
    hooks: Arc<std::sync::RwLock<Hooks>>,
    completion: PostCompletion,
) {
    let mut completed = false;

    while let Some(event) = loop_rx.recv().await {
        match event.kind {
            EventKind::IterationStart { .. } => {
                let mut guard = slot.lock().await;
                guard.info.iteration = guard.info.iteration.max(event.iteration);
            }
            EventKind::Complete if !completed => {
                completed = true;
                let hooks = hooks
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone();
                tracing::info!(prd = %name, iteration = event.iteration, "PRD complete");
                if let Some(callback) = &hooks.on_complete {
                    callback(&name);
                }
                if let Some(hook) = &hooks.post_completion {
                    hook.on_complete(completion.clone()).await;
                }
            }
            _ => {}
        }

        let tagged = ManagerEvent {
            name: name.clone(),
            event,
        };
        if events_tx.send(tagged).await.is_err() {
            tracing::debug!(prd = %name, "Event receiver dropped");
        }
    }
}

/// Runs the loop and records the state it ended in.
async fn run_loop(name: String, runner: Arc<PrdLoop>, cancel: CancellationToken, slot: Slot) {
    let result = runner.run(cancel.clone()).await;
    let prd_complete = Prd::load(runner.prd_path())
        .map(|prd| prd.all_complete())
        .unwrap_or(false);

    let mut guard = slot.lock().await;
    let last = runner.iteration().min(runner.config().max_iterations);
    guard.info.iteration = guard.info.iteration.max(last);
    let state = match &result {
        Err(e) => {
            guard.info.last_error = Some(e.to_string());
            LoopState::Error
        }
        Ok(()) if runner.is_paused() => LoopState::Paused,
        Ok(()) if runner.is_stopped() || cancel.is_cancelled() => LoopState::Stopped,
        Ok(()) if prd_complete => LoopState::Complete,
        // Ran out of iterations without finishing; resumable
        Ok(()) => LoopState::Paused,
    };
    guard.info.state = state;
    guard.runner = None;
    guard.cancel = None;
    drop(guard);

    match &result {
        Ok(()) => tracing::info!(prd = %name, state = ?state, "Loop finished"),
        Err(e) => tracing::error!(prd = %name, error = %e, "Loop failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prd::Story;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_prd(dir: &Path, passes: bool) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let mut story = Story::new("US-001", "Login", 1);
        story.passes = passes;
        let path = dir.join("prd.json");
        Prd::new("auth", "Auth").with_story(story).save(&path).unwrap();
        path
    }

    fn manager(base: &Path, script: &str) -> Manager {
        Manager::new(ManagerConfig {
            base_dir: base.to_path_buf(),
            max_iterations: 3,
            worker: WorkerConfig::script(script),
            retry: RetryConfig::disabled(),
        })
    }

    async fn wait_for_state(manager: &Manager, name: &str, want: LoopState) {
        for _ in 0..200 {
            if manager.get_state(name).await == Some(want) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!(
            "{} never reached {:?}, last {:?}",
            name,
            want,
            manager.get_state(name).await
        );
    }

    #[tokio::test]
    async fn test_register_duplicate() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path(), "true");

        manager.register("auth", temp.path().join("prd.json")).await.unwrap();
        let err = manager.register("auth", "other.json").await.unwrap_err();

        assert!(matches!(err, PrdloopError::AlreadyRegistered(name) if name == "auth"));
        assert_eq!(manager.get_state("auth").await, Some(LoopState::Ready));
    }

    #[tokio::test]
    async fn test_unknown_name_errors() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path(), "true");

        assert!(matches!(
            manager.start("nope").await,
            Err(PrdloopError::NotRegistered(_))
        ));
        assert!(matches!(manager.stop("nope").await, Err(PrdloopError::NotRegistered(_))));
        assert!(manager.get_instance("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_register_with_worktree() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path(), "true");

        manager
            .register_with_worktree("auth", "prd.json", "/wt/auth", "prdloop/auth")
            .await
            .unwrap();

        let instance = manager.get_instance("auth").await.unwrap();
        assert_eq!(instance.worktree_dir, Some(PathBuf::from("/wt/auth")));
        assert_eq!(instance.branch.as_deref(), Some("prdloop/auth"));
    }

    #[tokio::test]
    async fn test_stop_idle_is_noop() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path(), "true");
        manager.register("auth", temp.path().join("prd.json")).await.unwrap();

        manager.stop("auth").await.unwrap();
        manager.stop("auth").await.unwrap();

        assert_eq!(manager.get_state("auth").await, Some(LoopState::Ready));
    }

    #[tokio::test]
    async fn test_pause_requires_running() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path(), "true");
        manager.register("auth", temp.path().join("prd.json")).await.unwrap();

        assert!(matches!(manager.pause("auth").await, Err(PrdloopError::InvalidState(_))));
        assert!(matches!(manager.resume("auth").await, Err(PrdloopError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_run_to_complete_fires_callbacks_once() {
        struct Recorder(std::sync::Mutex<Vec<PostCompletion>>);

        #[async_trait]
        impl PostCompletionHook for Recorder {
            async fn on_complete(&self, completion: PostCompletion) {
                self.0.lock().unwrap().push(completion);
            }
        }

        let temp = TempDir::new().unwrap();
        let prd_dir = temp.path().join("auth");
        let prd_path = write_prd(&prd_dir, false);
        write_prd(&temp.path().join("done"), true);
        // Prints the sentinel and finishes the PRD: two Complete events, one callback
        let script = format!(
            "echo '{}'; cp {} {}",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"<promise>COMPLETE</promise>"}]}}"#,
            temp.path().join("done/prd.json").display(),
            prd_path.display()
        );
        let manager = manager(temp.path(), &script);
        let mut events = manager.take_events().unwrap();
        assert!(manager.take_events().is_none());

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        manager.on_complete(move |name| {
            assert_eq!(name, "auth");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        manager.set_post_completion_hook(recorder.clone());

        manager
            .register_with_worktree("auth", &prd_path, temp.path(), "prdloop/auth")
            .await
            .unwrap();
        manager.start("auth").await.unwrap();
        wait_for_state(&manager, "auth", LoopState::Complete).await;
        manager.stop_all().await;

        assert_eq!(manager.get_state("auth").await, Some(LoopState::Complete));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let completions = recorder.0.lock().unwrap();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].branch.as_deref(), Some("prdloop/auth"));
        assert_eq!(completions[0].work_dir, temp.path());

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert!(received.iter().all(|e| e.name == "auth"));
        let completes = received
            .iter()
            .filter(|e| e.event.kind == EventKind::Complete)
            .count();
        assert_eq!(completes, 2);
    }

    #[tokio::test]
    async fn test_exhausted_iterations_fall_back_to_paused() {
        let temp = TempDir::new().unwrap();
        let prd_path = write_prd(temp.path(), false);
        let manager = manager(temp.path(), "true");
        let _events = manager.take_events();

        manager.register("auth", &prd_path).await.unwrap();
        manager.start("auth").await.unwrap();
        wait_for_state(&manager, "auth", LoopState::Paused).await;

        let instance = manager.get_instance("auth").await.unwrap();
        assert_eq!(instance.iteration, 3);
        assert!(instance.started_at.is_some());
        assert!(instance.last_error.is_none());
    }

    #[tokio::test]
    async fn test_failure_sets_error_state() {
        let temp = TempDir::new().unwrap();
        let prd_path = write_prd(temp.path(), false);
        let manager = manager(temp.path(), "exit 7");
        let _events = manager.take_events();

        manager.register("auth", &prd_path).await.unwrap();
        manager.start("auth").await.unwrap();
        wait_for_state(&manager, "auth", LoopState::Error).await;

        let instance = manager.get_instance("auth").await.unwrap();
        assert!(instance.last_error.unwrap().contains("Iteration 1 failed"));

        // An errored PRD can be started again
        manager.start("auth").await.unwrap();
        wait_for_state(&manager, "auth", LoopState::Error).await;
    }

    #[tokio::test]
    async fn test_start_twice_and_stop() {
        let temp = TempDir::new().unwrap();
        let prd_path = write_prd(temp.path(), false);
        let manager = manager(temp.path(), "sleep 30");
        let _events = manager.take_events();

        manager.register("auth", &prd_path).await.unwrap();
        manager.start("auth").await.unwrap();

        assert!(matches!(manager.start("auth").await, Err(PrdloopError::InvalidState(_))));
        assert_eq!(manager.running_prds().await, vec!["auth".to_string()]);
        assert_eq!(manager.running_count().await, 1);

        manager.stop("auth").await.unwrap();
        assert!(matches!(
            manager.get_state("auth").await,
            Some(LoopState::Stopping) | Some(LoopState::Stopped)
        ));

        tokio::time::timeout(Duration::from_secs(10), manager.stop_all())
            .await
            .unwrap();
        assert_eq!(manager.get_state("auth").await, Some(LoopState::Stopped));
        assert_eq!(manager.running_count().await, 0);
    }

    #[tokio::test]
    async fn test_pause_then_resume() {
        let temp = TempDir::new().unwrap();
        let prd_path = write_prd(temp.path(), false);
        let manager = manager(temp.path(), "sleep 0.3");
        let _events = manager.take_events();

        manager.register("auth", &prd_path).await.unwrap();
        manager.start("auth").await.unwrap();
        manager.pause("auth").await.unwrap();
        wait_for_state(&manager, "auth", LoopState::Paused).await;
        assert_eq!(manager.get_instance("auth").await.unwrap().iteration, 1);

        manager.resume("auth").await.unwrap();
        assert_eq!(manager.get_state("auth").await, Some(LoopState::Running));

        manager.stop_all().await;
        assert_eq!(manager.get_state("auth").await, Some(LoopState::Stopped));
    }

    #[tokio::test]
    async fn test_stop_paused_is_stopped() {
        let temp = TempDir::new().unwrap();
        let prd_path = write_prd(temp.path(), false);
        let manager = manager(temp.path(), "true");
        let _events = manager.take_events();

        manager.register("auth", &prd_path).await.unwrap();
        manager.start("auth").await.unwrap();
        wait_for_state(&manager, "auth", LoopState::Paused).await;

        manager.stop("auth").await.unwrap();
        assert_eq!(manager.get_state("auth").await, Some(LoopState::Stopped));
    }

    #[tokio::test]
    async fn test_concurrent_prds_and_unregister() {
        let temp = TempDir::new().unwrap();
        let a = write_prd(&temp.path().join("a"), false);
        let b = write_prd(&temp.path().join("b"), false);
        let manager = manager(temp.path(), "sleep 30");
        let _events = manager.take_events();

        manager.register("a", &a).await.unwrap();
        manager.register("b", &b).await.unwrap();
        manager.start("a").await.unwrap();
        manager.start("b").await.unwrap();
        assert_eq!(manager.running_prds().await, vec!["a".to_string(), "b".to_string()]);

        manager.unregister("a").await.unwrap();
        assert!(manager.get_state("a").await.is_none());
        assert_eq!(manager.get_all_instances().await.len(), 1);

        tokio::time::timeout(Duration::from_secs(10), manager.stop_all())
            .await
            .unwrap();
        assert_eq!(manager.get_state("b").await, Some(LoopState::Stopped));
    }

    #[tokio::test]
    async fn test_retry_config_applies_to_new_runs() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path(), "true");
        assert!(!manager.retry_config().enabled);

        let retry = RetryConfig {
            max_retries: 1,
            delays: vec![Duration::from_millis(5)],
            enabled: true,
        };
        manager.set_retry_config(retry.clone());
        assert_eq!(manager.retry_config(), retry);
    }
}
