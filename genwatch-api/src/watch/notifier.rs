use super::job::{EventStream, JobHandle};
use super::poller::{DirectoryPoller, NewFile};
use super::{EndEvent, FileEvent, JobStatus, WatchError, WatchEvent, WatchSettings};
use crate::id::JobId;
use crate::process::{Launcher, ProcessExit, ProcessHandle};
use crate::prompt::PromptSink;

use flume::Sender;
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Starts generation jobs and watches their output directory.
#[derive(Clone, Debug, Default)]
pub struct Notifier {
    settings: WatchSettings,
}

impl Notifier {
    pub fn new(settings: WatchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &WatchSettings {
        &self.settings
    }

    pub fn start<L: Launcher>(
        &self,
        output_dir: impl Into<PathBuf>,
        launcher: L,
        sink: Arc<dyn PromptSink>,
    ) -> (JobHandle, EventStream) {
        self.start_job(JobId::new_v4(), output_dir, launcher, sink)
    }

    /// Spawns the job on the current tokio runtime. The process is launched
    /// by the job task, not by this call.
    pub fn start_job<L: Launcher>(
        &self,
        id: JobId,
        output_dir: impl Into<PathBuf>,
        launcher: L,
        sink: Arc<dyn PromptSink>,
    ) -> (JobHandle, EventStream) {
        let output_dir = output_dir.into();
        let (tx_events, rx_events) = flume::unbounded();
        let (tx_state, rx_state) = watch::channel(JobStatus::Pending);
        let (tx_stop, rx_stop) = watch::channel(false);
        let tx_stop = Arc::new(tx_stop);

        let job = GenerationJob {
            id,
            output_dir: output_dir.clone(),
            settings: self.settings.clone(),
            sink,
            tx_events,
            tx_state,
            _tx_stop: tx_stop.clone(),
        };
        tokio::spawn(job.run(launcher, rx_stop));

        (
            JobHandle::new(id, output_dir, tx_stop, rx_state),
            EventStream::new(id, rx_events),
        )
    }
}

struct GenerationJob {
    id: JobId,
    output_dir: PathBuf,
    settings: WatchSettings,
    sink: Arc<dyn PromptSink>,
    tx_events: Sender<WatchEvent>,
    tx_state: watch::Sender<JobStatus>,
    // keeps the stop channel open after every handle is dropped
    _tx_stop: Arc<watch::Sender<bool>>,
}

impl GenerationJob {
    async fn run<L: Launcher>(self, launcher: L, rx_stop: watch::Receiver<bool>) {
        let end = self.drive(launcher, rx_stop).await;
        self.finish(end);
    }

    async fn drive<L: Launcher>(
        &self,
        launcher: L,
        mut rx_stop: watch::Receiver<bool>,
    ) -> EndEvent {
        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            return EndEvent::failed(
                WatchError::Launch(format!(
                    "cannot create output directory `{}` - {e}",
                    self.output_dir.display()
                )),
                None,
            );
        }

        let mut poller =
            DirectoryPoller::new(&self.output_dir, self.settings.image_extensions.clone());
        match poller.baseline().await {
            Ok(n) => log::debug!(
                "[{}] {n} entries already present in {}",
                self.id,
                self.output_dir.display()
            ),
            Err(e) => {
                return EndEvent::failed(
                    WatchError::Launch(format!(
                        "cannot list output directory `{}` - {e}",
                        self.output_dir.display()
                    )),
                    None,
                )
            }
        }

        if *rx_stop.borrow_and_update() {
            log::info!("[{}] stopped before the process was launched", self.id);
            return EndEvent::stopped(None);
        }

        let mut process = match launcher.launch() {
            Ok(process) => process,
            Err(e) => return EndEvent::failed(WatchError::Launch(e.to_string()), None),
        };
        self.set_state(JobStatus::Running);
        log::info!("[{}] watching {}", self.id, self.output_dir.display());

        // interval_at panics on a zero period
        let poll_interval = self.settings.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut listing_failures = 0;

        loop {
            tokio::select! {
                biased;
                changed = rx_stop.changed() => {
                    if changed.is_ok() && *rx_stop.borrow_and_update() {
                        return self.stop(&mut process, &mut poller).await;
                    }
                }
                exit = process.wait() => {
                    return match exit {
                        Ok(exit) => self.complete(&mut poller, exit).await,
                        Err(e) => {
                            log::error!("[{}] failed to wait for generation process - {e}", self.id);
                            let exit_code = self.terminate(&mut process).await;
                            self.drain(&mut poller, None).await;
                            EndEvent::failed(WatchError::ProcessFailure { exit_code }, exit_code)
                        }
                    };
                }
                _ = ticker.tick() => {
                    match self.tick(&mut poller).await {
                        Ok(true) => listing_failures = 0,
                        Ok(false) => {
                            log::info!("[{}] subscriber went away, stopping", self.id);
                            return self.stop(&mut process, &mut poller).await;
                        }
                        Err(e) => {
                            listing_failures += 1;
                            log::warn!(
                                "[{}] {} ({listing_failures}/{})",
                                self.id,
                                WatchError::Listing(e.to_string()),
                                self.settings.max_listing_failures
                            );
                            if listing_failures >= self.settings.max_listing_failures {
                                let exit_code = self.terminate(&mut process).await;
                                return EndEvent::failed(
                                    WatchError::ListingFatal {
                                        attempts: listing_failures,
                                        reason: e.to_string(),
                                    },
                                    exit_code,
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    /// One poll tick. Returns `Ok(false)` once nobody listens anymore.
    async fn tick(&self, poller: &mut DirectoryPoller) -> io::Result<bool> {
        if self.tx_events.is_disconnected() {
            return Ok(false);
        }

        let files = poller.poll_once().await?;
        if !self.emit(files) {
            return Ok(false);
        }

        if poller.has_pending() {
            tokio::time::sleep(self.settings.settle_delay).await;
            let files = poller.poll_once().await?;
            if !self.emit(files) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    async fn complete(&self, poller: &mut DirectoryPoller, exit: ProcessExit) -> EndEvent {
        log::info!("[{}] generation process exited ({:?})", self.id, exit.code);
        self.set_state(JobStatus::Draining);
        self.drain(poller, None).await;

        if exit.success() {
            EndEvent::completed(0)
        } else {
            EndEvent::failed(
                WatchError::ProcessFailure {
                    exit_code: exit.code,
                },
                exit.code,
            )
        }
    }

    /// Only images already present when the stop is observed are drained.
    async fn stop<P: ProcessHandle>(
        &self,
        process: &mut P,
        poller: &mut DirectoryPoller,
    ) -> EndEvent {
        self.set_state(JobStatus::Draining);
        let snapshot = poller.snapshot().await.unwrap_or_else(|e| {
            log::warn!(
                "[{}] listing {} at stop failed - {e}",
                self.id,
                self.output_dir.display()
            );
            HashSet::new()
        });
        let exit_code = self.terminate(process).await;
        self.drain(poller, Some(&snapshot)).await;
        EndEvent::stopped(exit_code)
    }

    async fn drain(&self, poller: &mut DirectoryPoller, only: Option<&HashSet<String>>) {
        match poller.drain(only).await {
            Ok(files) => {
                self.emit(files);
            }
            Err(e) => log::warn!(
                "[{}] final listing of {} failed - {e}",
                self.id,
                self.output_dir.display()
            ),
        }
    }

    /// Stop sentinel first, then a kill once the grace period ran out.
    async fn terminate<P: ProcessHandle>(&self, process: &mut P) -> Option<i32> {
        match process.try_exit() {
            Ok(Some(exit)) => return exit.code,
            Ok(None) => {}
            Err(e) => log::warn!("[{}] failed to query generation process - {e}", self.id),
        }

        let sink = self.sink.clone();
        match tokio::task::spawn_blocking(move || sink.write_stop_sentinel()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("[{}] failed to write stop sentinel - {e}", self.id),
            Err(e) => log::warn!("[{}] stop sentinel writer panicked - {e}", self.id),
        }

        let grace = self.settings.stop_grace_period;
        match tokio::time::timeout(grace, process.wait()).await {
            Ok(Ok(exit)) => {
                log::info!("[{}] generation process exited after stop sentinel", self.id);
                return exit.code;
            }
            Ok(Err(e)) => {
                log::warn!("[{}] failed to wait for generation process - {e}", self.id)
            }
            Err(_) => log::warn!(
                "[{}] generation process still running after {}ms, killing it",
                self.id,
                grace.as_millis()
            ),
        }

        match process.kill().await {
            Ok(exit) => exit.code,
            Err(e) => {
                log::error!("[{}] failed to kill generation process - {e}", self.id);
                None
            }
        }
    }

    fn emit(&self, files: Vec<NewFile>) -> bool {
        for file in files {
            log::info!("[{}] image available: {}", self.id, file.path.display());
            let event = WatchEvent::File(FileEvent {
                name: file.name,
                path: file.path,
            });
            if self.tx_events.send(event).is_err() {
                return false;
            }
        }
        true
    }

    fn set_state(&self, state: JobStatus) {
        log::debug!("[{}] {}", self.id, state.as_ref());
        self.tx_state.send_replace(state);
    }

    fn finish(self, end: EndEvent) {
        match &end.error {
            Some(e) => log::error!("[{}] job {} - {e}", self.id, end.state.as_ref()),
            None => log::info!(
                "[{}] job {} (exit code {:?})",
                self.id,
                end.state.as_ref(),
                end.exit_code
            ),
        }
        self.set_state(end.state);
        let _ = self.tx_events.send(WatchEvent::End(end));
    }
}
