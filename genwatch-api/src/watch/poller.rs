use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFile {
    pub name: String,
    pub path: PathBuf,
}

struct Candidate {
    name: String,
    path: PathBuf,
    size: u64,
    modified: Option<SystemTime>,
}

/// Diffs directory listings against the set of files already seen.
///
/// A file is reported once its size is non-zero and unchanged across two
/// consecutive listings. `known` only ever grows, so a name is reported at
/// most once.
pub struct DirectoryPoller {
    dir: PathBuf,
    extensions: Vec<String>,
    known: HashSet<String>,
    /// Candidates seen in the previous listing with their size at the time.
    pending: HashMap<String, u64>,
}

impl DirectoryPoller {
    pub fn new(dir: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            extensions,
            known: HashSet::new(),
            pending: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn known_files(&self) -> &HashSet<String> {
        &self.known
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Marks everything currently in the directory as already seen.
    pub async fn baseline(&mut self) -> io::Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Ok(name) = entry.file_name().into_string() {
                self.known.insert(name);
            }
        }
        Ok(self.known.len())
    }

    /// One poll tick: reports files that passed the settle check.
    pub async fn poll_once(&mut self) -> io::Result<Vec<NewFile>> {
        let candidates = self.list_candidates().await?;

        let mut settled = Vec::new();
        let mut pending = HashMap::new();
        for candidate in candidates {
            match self.pending.get(&candidate.name) {
                Some(size) if *size == candidate.size && candidate.size > 0 => {
                    settled.push(candidate)
                }
                _ => {
                    pending.insert(candidate.name.clone(), candidate.size);
                }
            }
        }
        self.pending = pending;

        Ok(self.accept(settled))
    }

    /// Names of the unreported images currently in the directory.
    pub async fn snapshot(&self) -> io::Result<HashSet<String>> {
        Ok(self
            .list_candidates()
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    /// Final poll after the writer has exited. Every new image is reported
    /// without a settle check. With `only` set, images missing from that
    /// snapshot are skipped.
    pub async fn drain(&mut self, only: Option<&HashSet<String>>) -> io::Result<Vec<NewFile>> {
        let candidates = self.list_candidates().await?;
        self.pending.clear();

        let accepted = candidates
            .into_iter()
            .filter(|c| only.map_or(true, |names| names.contains(&c.name)))
            .collect();

        Ok(self.accept(accepted))
    }

    fn accept(&mut self, mut files: Vec<Candidate>) -> Vec<NewFile> {
        files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
        files
            .into_iter()
            .filter(|c| self.known.insert(c.name.clone()))
            .map(|c| NewFile {
                name: c.name,
                path: c.path,
            })
            .collect()
    }

    async fn list_candidates(&self) -> io::Result<Vec<Candidate>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut candidates = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if self.known.contains(&name) || !self.is_image(&name) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // removed between the listing and the stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if !metadata.is_file() {
                continue;
            }
            candidates.push(Candidate {
                path: entry.path(),
                size: metadata.len(),
                modified: metadata.modified().ok(),
                name,
            });
        }

        Ok(candidates)
    }

    fn is_image(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poller(dir: &Path) -> DirectoryPoller {
        DirectoryPoller::new(dir, vec!["png".into()])
    }

    fn names(files: &[NewFile]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    #[tokio::test]
    async fn reports_a_file_once_its_size_is_stable() {
        let tmp = tempfile::tempdir().unwrap();
        let mut poller = poller(tmp.path());
        poller.baseline().await.unwrap();

        std::fs::write(tmp.path().join("a.png"), b"abc").unwrap();
        assert!(poller.poll_once().await.unwrap().is_empty());
        assert!(poller.has_pending());

        let files = poller.poll_once().await.unwrap();
        assert_eq!(names(&files), vec!["a.png"]);
        assert_eq!(files[0].path, tmp.path().join("a.png"));
        assert!(!poller.has_pending());

        // never reported twice
        assert!(poller.poll_once().await.unwrap().is_empty());
        assert!(poller.poll_once().await.unwrap().is_empty());
        assert!(poller.known_files().contains("a.png"));
    }

    #[tokio::test]
    async fn growing_or_empty_files_are_held_back() {
        let tmp = tempfile::tempdir().unwrap();
        let mut poller = poller(tmp.path());
        poller.baseline().await.unwrap();

        let path = tmp.path().join("growing.png");
        std::fs::write(&path, b"").unwrap();
        assert!(poller.poll_once().await.unwrap().is_empty());
        assert!(poller.poll_once().await.unwrap().is_empty());

        std::fs::write(&path, b"12").unwrap();
        assert!(poller.poll_once().await.unwrap().is_empty());
        std::fs::write(&path, b"1234").unwrap();
        assert!(poller.poll_once().await.unwrap().is_empty());

        assert_eq!(names(&poller.poll_once().await.unwrap()), vec!["growing.png"]);
    }

    #[tokio::test]
    async fn ignores_baseline_and_non_image_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("old.png"), b"old").unwrap();
        let mut poller = poller(tmp.path());
        assert_eq!(poller.baseline().await.unwrap(), 1);

        std::fs::write(tmp.path().join("notes.txt"), b"text").unwrap();
        std::fs::write(tmp.path().join("UPPER.PNG"), b"img").unwrap();
        std::fs::create_dir(tmp.path().join("dir.png")).unwrap();

        poller.poll_once().await.unwrap();
        let files = poller.poll_once().await.unwrap();
        assert_eq!(names(&files), vec!["UPPER.PNG"]);
    }

    #[tokio::test]
    async fn drain_skips_the_settle_check() {
        let tmp = tempfile::tempdir().unwrap();
        let mut poller = poller(tmp.path());
        poller.baseline().await.unwrap();

        std::fs::write(tmp.path().join("a.png"), b"a").unwrap();
        assert!(poller.poll_once().await.unwrap().is_empty());
        std::fs::write(tmp.path().join("b.png"), b"").unwrap();

        let files = poller.drain(None).await.unwrap();
        let mut drained = names(&files);
        drained.sort();
        assert_eq!(drained, vec!["a.png", "b.png"]);
        assert!(poller.drain(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn drain_limited_to_a_snapshot_skips_later_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut poller = poller(tmp.path());
        poller.baseline().await.unwrap();

        std::fs::write(tmp.path().join("before.png"), b"a").unwrap();
        let snapshot = poller.snapshot().await.unwrap();
        assert_eq!(snapshot, HashSet::from(["before.png".to_string()]));

        std::fs::write(tmp.path().join("after.png"), b"b").unwrap();

        let files = poller.drain(Some(&snapshot)).await.unwrap();
        assert_eq!(names(&files), vec!["before.png"]);
        assert!(!poller.known_files().contains("after.png"));
    }

    #[tokio::test]
    async fn listing_a_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut poller = poller(&tmp.path().join("missing"));
        assert!(poller.baseline().await.is_err());
        assert!(poller.poll_once().await.is_err());
    }
}
