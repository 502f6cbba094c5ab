use crate::{Error, Result};

use chrono::{DateTime, Local};
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryEntry {
    UserPrompt,
    DiversifiedPrompts,
    SelectedImages,
}

impl AsRef<str> for HistoryEntry {
    fn as_ref(&self) -> &str {
        match self {
            HistoryEntry::UserPrompt => "User prompt",
            HistoryEntry::DiversifiedPrompts => "Diversified prompts",
            HistoryEntry::SelectedImages => "Selected images",
        }
    }
}

/// Append-only log of what was asked for during one server run.
pub struct HistoryLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HistoryLog {
    pub fn new(dir: impl AsRef<Path>, started: DateTime<Local>) -> Self {
        let name = started.format("output_%Y-%m-%d_%H-%M-%S.txt").to_string();
        Self {
            path: dir.as_ref().join(name),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, entry: HistoryEntry, payload: impl Display) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let fail = |e| Error::HistoryWriteFailed(self.path.clone(), e);

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(fail)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(fail)?;
        writeln!(
            file,
            "{} - {}: {payload}",
            Local::now().to_rfc3339(),
            entry.as_ref()
        )
        .map_err(fail)
    }
}
