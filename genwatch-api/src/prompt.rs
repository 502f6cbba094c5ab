//! Hand-off of prompts to the external generation process.

use std::io;
use std::path::{Path, PathBuf};

/// Where the external process reads its prompts from.
pub trait PromptSink: Send + Sync {
    fn write(&self, prompts: &[String]) -> io::Result<()>;

    /// Asks the external process to finish its work.
    fn write_stop_sentinel(&self) -> io::Result<()>;
}

/// Prompt file shared with the generation process, one prompt per line.
#[derive(Clone, Debug)]
pub struct FilePromptSink {
    path: PathBuf,
    stop_sentinel: String,
}

impl FilePromptSink {
    pub fn new(path: impl Into<PathBuf>, stop_sentinel: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            stop_sentinel: stop_sentinel.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn overwrite(&self, contents: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, contents)
    }
}

impl PromptSink for FilePromptSink {
    fn write(&self, prompts: &[String]) -> io::Result<()> {
        let mut contents = String::new();
        for prompt in prompts {
            contents.push_str(prompt.trim());
            contents.push('\n');
        }
        self.overwrite(&contents)
    }

    fn write_stop_sentinel(&self) -> io::Result<()> {
        log::debug!("writing stop sentinel to {}", self.path.display());
        if self.stop_sentinel.is_empty() {
            self.overwrite("")
        } else {
            self.overwrite(&format!("{}\n", self.stop_sentinel))
        }
    }
}

/// The same prompt once per requested image.
pub fn fan_out(prompt: &str, num_images: usize) -> Vec<String> {
    vec![prompt.trim().to_string(); num_images]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_prompt_per_line() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FilePromptSink::new(tmp.path().join("backend/prompt.txt"), "");

        sink.write(&fan_out(" A painting of a beach ", 3)).unwrap();
        assert_eq!(
            std::fs::read_to_string(sink.path()).unwrap(),
            "A painting of a beach\nA painting of a beach\nA painting of a beach\n"
        );
    }

    #[test]
    fn empty_sentinel_truncates_the_prompt_file() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FilePromptSink::new(tmp.path().join("prompt.txt"), "");
        sink.write(&["a forest".to_string()]).unwrap();

        sink.write_stop_sentinel().unwrap();
        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "");
    }

    #[test]
    fn custom_sentinel_replaces_pending_prompts() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FilePromptSink::new(tmp.path().join("prompt.txt"), "<stop>");
        sink.write(&["a forest".to_string(), "a lake".to_string()]).unwrap();

        sink.write_stop_sentinel().unwrap();
        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "<stop>\n");
    }
}
