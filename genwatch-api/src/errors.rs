use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("The provided IP is not valid - {0}")]
    InvalidIp(String),
    #[error(transparent)]
    HyperError(#[from] hyper::Error),
    #[error("failed to read configuration file - {0}")]
    ConfigReadFailed(std::io::Error),
    #[error("failed to deserialize configuration file as yaml - {0}")]
    ConfigDeserializeFailed(serde_yaml::Error),
    #[error("failed to write prompt file `{0}` - {1}")]
    PromptWriteFailed(PathBuf, std::io::Error),
    #[error("failed to append to history file `{0}` - {1}")]
    HistoryWriteFailed(PathBuf, std::io::Error),
    #[error("failed to access selected captions file `{0}` - {1}")]
    CaptionsFailed(PathBuf, std::io::Error),
    #[error("failed to access output directory `{0}` - {1}")]
    OutputDirFailed(PathBuf, std::io::Error),
    #[error("a generation job is already running for `{0}`")]
    JobAlreadyRunning(PathBuf),
    #[error("Prompt is required")]
    InvalidPrompt,
    #[error("generation job `{0}` not found")]
    JobNotFound(String),
    #[error("image `{0}` not found")]
    ImageNotFound(String),
    #[error("invalid image path `{0}`")]
    InvalidImagePath(String),
    #[error(transparent)]
    WatchError(#[from] crate::watch::WatchError),
}
