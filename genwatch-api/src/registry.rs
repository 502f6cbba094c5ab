use crate::id::JobId;
use crate::process::Launcher;
use crate::prompt::PromptSink;
use crate::watch::{EventStream, JobHandle, JobStatus, Notifier};
use crate::{Error, Result};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Jobs {
    handles: HashMap<JobId, JobHandle>,
    reserved: HashSet<PathBuf>,
}

impl Jobs {
    fn is_busy(&self, output_dir: &Path) -> bool {
        self.reserved.contains(output_dir)
            || self
                .handles
                .values()
                .any(|job| job.is_active() && job.output_dir() == output_dir)
    }
}

/// Jobs known to the server. At most one job is active per output
/// directory.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<Jobs>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Jobs> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims `output_dir` for a new job. The claim is released when the
    /// reservation is dropped without being started.
    pub fn reserve(&self, output_dir: impl Into<PathBuf>) -> Result<Reservation> {
        let output_dir = output_dir.into();
        let mut jobs = self.lock();
        jobs.handles.retain(|_, job| job.is_active());
        if jobs.is_busy(&output_dir) {
            return Err(Error::JobAlreadyRunning(output_dir));
        }
        jobs.reserved.insert(output_dir.clone());

        Ok(Reservation {
            output_dir,
            registry: self.clone(),
            started: false,
        })
    }

    pub fn get(&self, id: &JobId) -> Option<JobHandle> {
        self.lock().handles.get(id).cloned()
    }

    pub fn active(&self) -> Vec<JobHandle> {
        self.lock()
            .handles
            .values()
            .filter(|job| job.is_active())
            .cloned()
            .collect()
    }

    /// Stops every active job and waits for all of them.
    pub async fn stop_all(&self) -> Vec<(JobId, JobStatus)> {
        let mut stopped = Vec::new();
        for job in self.active() {
            let state = job.stop().await;
            stopped.push((job.id(), state));
        }
        stopped
    }
}

pub struct Reservation {
    output_dir: PathBuf,
    registry: JobRegistry,
    started: bool,
}

impl Reservation {
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn start<L: Launcher>(
        mut self,
        notifier: &Notifier,
        id: JobId,
        launcher: L,
        sink: Arc<dyn PromptSink>,
    ) -> (JobHandle, EventStream) {
        let mut jobs = self.registry.lock();
        let (handle, events) = notifier.start_job(id, self.output_dir.clone(), launcher, sink);
        jobs.reserved.remove(&self.output_dir);
        jobs.handles.insert(handle.id(), handle.clone());
        drop(jobs);

        self.started = true;
        (handle, events)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.started {
            self.registry.lock().reserved.remove(&self.output_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessExit;
    use crate::process::ProcessHandle;
    use crate::watch::WatchSettings;

    use std::future::Future;
    use std::io;
    use std::time::Duration;

    struct Idle;

    impl ProcessHandle for Idle {
        fn try_exit(&mut self) -> io::Result<Option<ProcessExit>> {
            Ok(None)
        }

        fn wait(&mut self) -> impl Future<Output = io::Result<ProcessExit>> + Send {
            std::future::pending()
        }

        fn kill(&mut self) -> impl Future<Output = io::Result<ProcessExit>> + Send {
            std::future::ready(Ok(ProcessExit { code: None }))
        }
    }

    struct NullSink;

    impl PromptSink for NullSink {
        fn write(&self, _prompts: &[String]) -> io::Result<()> {
            Ok(())
        }

        fn write_stop_sentinel(&self) -> io::Result<()> {
            Ok(())
        }
    }

    fn notifier() -> Notifier {
        Notifier::new(WatchSettings {
            poll_interval: Duration::from_millis(20),
            stop_grace_period: Duration::from_millis(20),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn one_active_job_per_output_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let notifier = notifier();

        let reservation = registry.reserve(tmp.path()).unwrap();
        assert!(matches!(
            registry.reserve(tmp.path()),
            Err(Error::JobAlreadyRunning(_))
        ));

        let (handle, _events) = reservation.start(
            &notifier,
            JobId::new_v4(),
            || Ok::<_, io::Error>(Idle),
            Arc::new(NullSink),
        );
        assert!(registry.get(&handle.id()).is_some());
        assert!(registry.reserve(tmp.path()).is_err());
        assert!(registry.reserve(tmp.path().join("other")).is_ok());

        let stopped = registry.stop_all().await;
        assert_eq!(stopped, vec![(handle.id(), JobStatus::Stopped)]);
        assert!(registry.active().is_empty());
        assert!(registry.reserve(tmp.path()).is_ok());
    }

    #[test]
    fn dropped_reservation_frees_the_directory() {
        let registry = JobRegistry::new();
        let reservation = registry.reserve("generated_images").unwrap();
        assert_eq!(reservation.output_dir(), Path::new("generated_images"));
        drop(reservation);
        assert!(registry.reserve("generated_images").is_ok());
    }
}
