use crate::{Error, Result};

use std::io;
use std::path::{Path, PathBuf};

/// Captions of the images the user picked last, one per line.
#[derive(Clone, Debug)]
pub struct CaptionStore {
    path: PathBuf,
}

impl CaptionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => Ok(data
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("no selected captions at {}", self.path.display());
                Ok(vec![])
            }
            Err(e) => Err(Error::CaptionsFailed(self.path.clone(), e)),
        }
    }

    /// Replaces the previous selection.
    pub fn save(&self, captions: &[String]) -> Result<()> {
        let fail = |e| Error::CaptionsFailed(self.path.clone(), e);
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(fail)?;
        }
        let mut data = String::new();
        for caption in captions {
            data.push_str(caption);
            data.push('\n');
        }
        std::fs::write(&self.path, data).map_err(fail)
    }
}
