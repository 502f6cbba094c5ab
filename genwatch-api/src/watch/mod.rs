//! Watches an output directory while an external generation process runs
//! and turns newly finished image files into an ordered, cancellable
//! event stream.

mod event;
mod job;
mod notifier;
mod poller;

pub use event::{EndEvent, FileEvent, WatchEvent};
pub use genwatch_core::generation::JobStatus;
pub use job::{EventStream, JobHandle};
pub use notifier::Notifier;
pub use poller::{DirectoryPoller, NewFile};

use genwatch_core::generation::{FailureKind, StreamFailure};
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub stop_grace_period: Duration,
    /// Consecutive listing failures tolerated before the job fails.
    pub max_listing_failures: usize,
    /// Lowercase extensions without the leading dot.
    pub image_extensions: Vec<String>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_millis(150),
            stop_grace_period: Duration::from_secs(5),
            max_listing_failures: 3,
            image_extensions: vec!["png".into()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("failed to launch generation process - {0}")]
    Launch(String),
    #[error("failed to list output directory - {0}")]
    Listing(String),
    #[error("listing the output directory failed {attempts} times in a row - {reason}")]
    ListingFatal { attempts: usize, reason: String },
    #[error("generation process failed ({})", describe_exit(.exit_code))]
    ProcessFailure { exit_code: Option<i32> },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".into(),
    }
}

impl WatchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            WatchError::Launch(_) => FailureKind::Launch,
            WatchError::Listing(_) | WatchError::ListingFatal { .. } => FailureKind::ListingFatal,
            WatchError::ProcessFailure { .. } => FailureKind::Process,
        }
    }

    pub fn to_stream_failure(&self) -> StreamFailure {
        StreamFailure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}
