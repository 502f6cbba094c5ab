use super::{JobStatus, WatchError};
use genwatch_core::generation::StreamEnd;

use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    File(FileEvent),
    /// Always the last event of a stream.
    End(EndEvent),
}

impl WatchEvent {
    pub fn is_end(&self) -> bool {
        matches!(self, WatchEvent::End(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEvent {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndEvent {
    pub state: JobStatus,
    pub exit_code: Option<i32>,
    pub error: Option<WatchError>,
}

impl EndEvent {
    pub fn completed(exit_code: i32) -> Self {
        Self {
            state: JobStatus::Completed,
            exit_code: Some(exit_code),
            error: None,
        }
    }

    pub fn stopped(exit_code: Option<i32>) -> Self {
        Self {
            state: JobStatus::Stopped,
            exit_code,
            error: None,
        }
    }

    pub fn failed(error: WatchError, exit_code: Option<i32>) -> Self {
        Self {
            state: JobStatus::Failed,
            exit_code,
            error: Some(error),
        }
    }

    pub fn to_stream_end(&self) -> StreamEnd {
        StreamEnd {
            state: self.state,
            exit_code: self.exit_code,
            error: self.error.as_ref().map(WatchError::to_stream_failure),
        }
    }
}
