use super::{JobStatus, WatchEvent};
use crate::id::JobId;

use flume::Receiver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Control side of a running generation job.
///
/// Cloning is cheap; every clone refers to the same job.
#[derive(Clone, Debug)]
pub struct JobHandle {
    id: JobId,
    output_dir: PathBuf,
    tx_stop: Arc<watch::Sender<bool>>,
    rx_state: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub(super) fn new(
        id: JobId,
        output_dir: PathBuf,
        tx_stop: Arc<watch::Sender<bool>>,
        rx_state: watch::Receiver<JobStatus>,
    ) -> Self {
        Self {
            id,
            output_dir,
            tx_stop,
            rx_state,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn state(&self) -> JobStatus {
        *self.rx_state.borrow()
    }

    pub fn is_active(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Asks the job to stop without waiting for it. Returns `false` if a
    /// stop had already been requested.
    pub fn request_stop(&self) -> bool {
        self.tx_stop.send_if_modified(|stop| !std::mem::replace(stop, true))
    }

    /// Stops the job and waits until it reached a terminal state.
    ///
    /// Idempotent: later calls resolve to the same terminal state. Stopping a
    /// job that already finished leaves its state untouched.
    pub async fn stop(&self) -> JobStatus {
        if self.is_active() && self.request_stop() {
            log::info!("[{}] stop requested", self.id);
        }
        self.wait().await
    }

    /// Waits until the job reached a terminal state.
    pub async fn wait(&self) -> JobStatus {
        let mut rx_state = self.rx_state.clone();
        if let Ok(state) = rx_state.wait_for(JobStatus::is_terminal).await {
            return *state;
        }
        // the job task is gone; its last published state is final
        let state = *rx_state.borrow();
        state
    }
}

/// Single-pass stream of a job's events, terminated by exactly one
/// [`WatchEvent::End`].
pub struct EventStream {
    job_id: JobId,
    rx_events: Receiver<WatchEvent>,
}

impl EventStream {
    pub(super) fn new(job_id: JobId, rx_events: Receiver<WatchEvent>) -> Self {
        Self { job_id, rx_events }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Next event, or `None` once the end event has been consumed.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx_events.recv_async().await.ok()
    }

    pub fn into_stream(self) -> flume::r#async::RecvStream<'static, WatchEvent> {
        self.rx_events.into_stream()
    }

    /// Drains the stream up to and including the end event.
    pub async fn collect(mut self) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }
}
