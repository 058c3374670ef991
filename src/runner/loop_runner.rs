//! PrdLoop drives one PRD to completion.
//!
//! Each iteration spawns the worker with a fresh process (and therefore fresh
//! context). The worker edits the PRD on disk; the loop only reads it back
//! between iterations to decide whether it is done.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::LoopConfig;
use crate::domain::{EventKind, LoopEvent};
use crate::error::{PrdloopError, Result};
use crate::prd::Prd;
use crate::stream::classify_line;

/// File name of the per-PRD output log
pub const LOG_FILE: &str = "prdloop.log";

/// How long a killed worker's output readers may keep draining
const READER_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
struct LoopControl {
    stopped: bool,
    paused: bool,
    iteration: u32,
    /// Cancelled to kill the current worker process
    kill: Option<CancellationToken>,
}

enum Exit {
    Status(ExitStatus),
    Interrupted,
}

/// Runs the worker against a single PRD until it is complete, the iteration
/// budget is spent, or it is stopped.
pub struct PrdLoop {
    prd_path: PathBuf,
    config: LoopConfig,
    events: mpsc::Sender<LoopEvent>,
    control: Mutex<LoopControl>,
}

impl PrdLoop {
    pub fn new(prd_path: impl Into<PathBuf>, config: LoopConfig, events: mpsc::Sender<LoopEvent>) -> Self {
        Self {
            prd_path: prd_path.into(),
            config,
            events,
            control: Mutex::new(LoopControl::default()),
        }
    }

    pub fn prd_path(&self) -> &Path {
        &self.prd_path
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Directory the worker runs in.
    pub fn work_dir(&self) -> PathBuf {
        self.config
            .work_dir
            .clone()
            .unwrap_or_else(|| Prd::dir_of(&self.prd_path))
    }

    pub fn log_path(&self) -> PathBuf {
        self.config
            .log_path
            .clone()
            .unwrap_or_else(|| Prd::dir_of(&self.prd_path).join(LOG_FILE))
    }

    /// Stop after the current iteration, killing the worker if one is running.
    pub fn stop(&self) {
        let mut control = self.lock();
        control.stopped = true;
        if let Some(kill) = &control.kill {
            kill.cancel();
        }
    }

    /// Stop at the next iteration boundary. The current worker keeps running.
    pub fn pause(&self) {
        self.lock().paused = true;
    }

    pub fn resume(&self) {
        self.lock().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Iteration currently (or last) executed
    pub fn iteration(&self) -> u32 {
        self.lock().iteration
    }

    /// Iterate until done.
    ///
    /// Returns `Ok` when the PRD completes, the budget is spent, or the loop is
    /// paused, stopped or cancelled. Errors are also reported as an
    /// [`EventKind::Error`] event before being returned.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let log_path = self.log_path();
        let sink = LogSink::open(&log_path)?;
        log::info!(
            "Starting loop for {} in {} (log {})",
            self.prd_path.display(),
            self.work_dir().display(),
            log_path.display()
        );

        loop {
            let iteration = {
                let mut control = self.lock();
                if control.stopped || control.paused {
                    return Ok(());
                }
                control.iteration += 1;
                control.iteration
            };

            if iteration > self.config.max_iterations {
                log::info!("{} reached max iterations", self.prd_path.display());
                self.emit(
                    iteration,
                    EventKind::MaxIterationsReached {
                        max: self.config.max_iterations,
                    },
                )
                .await;
                return Ok(());
            }

            let prd = match Prd::load(&self.prd_path) {
                Ok(prd) => prd,
                Err(e) => return Err(self.fail(iteration, e).await),
            };
            let story_id = prd.next_story().map(|s| s.id.clone());
            self.emit(iteration, EventKind::IterationStart { story_id }).await;

            if let Err(e) = self.run_with_retry(iteration, &cancel, &sink).await {
                return Err(self.fail(iteration, e).await);
            }

            if cancel.is_cancelled() {
                return Ok(());
            }

            match Prd::load(&self.prd_path) {
                Ok(prd) if prd.all_complete() => {
                    log::info!("{} complete after {} iteration(s)", prd.name, iteration);
                    self.emit(iteration, EventKind::Complete).await;
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return Err(self.fail(iteration, e).await),
            }
        }
    }

    async fn run_with_retry(&self, iteration: u32, cancel: &CancellationToken, sink: &LogSink) -> Result<()> {
        let mut last = match self.run_iteration(iteration, cancel, sink).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let retry = &self.config.retry;
        if !retry.enabled {
            return Err(last);
        }

        for attempt in 1..=retry.max_retries {
            let delay = retry.delay_for(attempt);
            log::warn!(
                "Iteration {} failed ({}), retry {}/{} in {:?}",
                iteration,
                last,
                attempt,
                retry.max_retries,
                delay
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Ok(()),
            }

            self.emit(
                iteration,
                EventKind::Retrying {
                    attempt,
                    max_retries: retry.max_retries,
                    delay,
                },
            )
            .await;

            if self.is_stopped() {
                return Ok(());
            }

            match self.run_iteration(iteration, cancel, sink).await {
                Ok(()) => return Ok(()),
                Err(e) => last = e,
            }
        }

        Err(PrdloopError::MaxRetriesExceeded {
            retries: retry.max_retries,
            source: Box::new(last),
        })
    }

    async fn run_iteration(&self, iteration: u32, cancel: &CancellationToken, sink: &LogSink) -> Result<()> {
        let kill = cancel.child_token();
        {
            let mut control = self.lock();
            if control.stopped {
                return Ok(());
            }
            control.kill = Some(kill.clone());
        }

        let result = self.spawn_and_wait(iteration, &kill, sink).await;
        self.lock().kill = None;

        match result? {
            Exit::Status(status) if !status.success() && !self.is_stopped() && !cancel.is_cancelled() => {
                Err(PrdloopError::IterationFailed {
                    iteration,
                    status: status.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    async fn spawn_and_wait(&self, iteration: u32, kill: &CancellationToken, sink: &LogSink) -> Result<Exit> {
        let worker = &self.config.worker;
        let mut child = Command::new(&worker.program)
            .args(worker.command_args())
            .current_dir(self.work_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().map(|out| {
            tokio::spawn(pump_stdout(
                out,
                iteration,
                self.events.clone(),
                sink.clone(),
                kill.clone(),
            ))
        });
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(pump_stderr(err, sink.clone())));

        let exit = tokio::select! {
            status = child.wait() => Exit::Status(status?),
            _ = kill.cancelled() => Exit::Interrupted,
        };

        if matches!(exit, Exit::Interrupted) {
            log::info!("Killing worker for {} (iteration {})", self.prd_path.display(), iteration);
            if let Err(e) = child.kill().await {
                log::debug!("kill failed: {}", e);
            }
        }

        for reader in [stdout, stderr].into_iter().flatten() {
            join_reader(reader, kill).await;
        }

        Ok(exit)
    }

    async fn fail(&self, iteration: u32, err: PrdloopError) -> PrdloopError {
        log::error!("Loop for {} failed: {}", self.prd_path.display(), err);
        self.emit(
            iteration,
            EventKind::Error {
                message: err.to_string(),
            },
        )
        .await;
        err
    }

    async fn emit(&self, iteration: u32, kind: EventKind) {
        // Receiver gone means nobody is listening; the loop carries on
        let _ = self.events.send(LoopEvent::new(iteration, kind)).await;
    }

    fn lock(&self) -> MutexGuard<'_, LoopControl> {
        self.control.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Append-only sink for raw worker output. Write failures are logged and
/// otherwise ignored.
#[derive(Clone)]
struct LogSink(Arc<Mutex<File>>);

impl LogSink {
    fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self(Arc::new(Mutex::new(file))))
    }

    fn write_line(&self, line: &str) {
        let mut file = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(file, "{}", line) {
            log::debug!("log write failed: {}", e);
        }
    }
}

/// Wait for an output reader. Once the iteration is killed, processes the
/// worker spawned may still hold its pipes open; the reader is abandoned after
/// a grace period.
async fn join_reader(mut reader: JoinHandle<()>, kill: &CancellationToken) {
    let joined = tokio::select! {
        res = &mut reader => Some(res),
        _ = kill.cancelled() => None,
    };

    let res = match joined {
        Some(res) => res,
        None => match tokio::time::timeout(READER_GRACE, &mut reader).await {
            Ok(res) => res,
            Err(_) => {
                log::debug!("Worker output still open after kill, abandoning reader");
                reader.abort();
                return;
            }
        },
    };

    if let Err(e) = res {
        log::warn!("Output reader panicked: {}", e);
    }
}

async fn pump_stdout(
    out: impl AsyncRead + Unpin,
    iteration: u32,
    events: mpsc::Sender<LoopEvent>,
    sink: LogSink,
    kill: CancellationToken,
) {
    let mut lines = BufReader::new(out).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        sink.write_line(&line);
        let Some(kind) = classify_line(&line) else {
            continue;
        };
        tokio::select! {
            sent = events.send(LoopEvent::new(iteration, kind)) => {
                if sent.is_err() {
                    log::debug!("event receiver dropped, draining worker output");
                }
            }
            _ = kill.cancelled() => {}
        }
    }
}

async fn pump_stderr(err: impl AsyncRead + Unpin, sink: LogSink) {
    let mut lines = BufReader::new(err).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        sink.write_line(&format!("[stderr] {}", line));
    }
}
