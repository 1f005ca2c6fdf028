//! Periodic glob expansion with set diffing.
//!
//! A [`GlobWatcher`] remembers the files it reported and, on each rescan,
//! returns only what changed. A plain path is a pattern matching at most
//! one file, so a log that does not exist yet is picked up once created.

use std::{
    collections::HashSet,
    env,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use glob::{MatchOptions, glob_with};
use log::warn;
use regex::Regex;

/// Changes observed by one rescan.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GlobDiff {
    pub found: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl GlobDiff {
    pub fn is_empty(&self) -> bool {
        self.found.is_empty() && self.deleted.is_empty()
    }
}

/// Tracks the set of files matching one watch target.
#[derive(Debug)]
pub struct GlobWatcher {
    pattern: String,
    exclude: Option<Regex>,
    interval: Duration,
    known: HashSet<PathBuf>,
    next_due: Instant,
}

impl GlobWatcher {
    /// Create a watcher whose first rescan is due immediately.
    ///
    /// Relative patterns are anchored at the current directory so every
    /// reported path is absolute.
    pub fn new(
        pattern: &str,
        exclude: Option<Regex>,
        interval: Duration,
    ) -> Result<Self, glob::PatternError> {
        let pattern = absolute_pattern(pattern);
        glob::Pattern::new(&pattern)?;
        Ok(Self {
            pattern,
            exclude,
            interval,
            known: HashSet::new(),
            next_due: Instant::now(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    pub fn known(&self) -> impl Iterator<Item = &Path> {
        self.known.iter().map(PathBuf::as_path)
    }

    /// Expand the pattern and report files added or removed since the
    /// previous rescan. Each file is reported as found once per
    /// appearance.
    pub fn rescan(&mut self, now: Instant) -> GlobDiff {
        self.next_due = now + self.interval;
        let Some(current) = self.expand() else {
            return GlobDiff::default();
        };

        let mut found: Vec<PathBuf> = current.difference(&self.known).cloned().collect();
        let mut deleted: Vec<PathBuf> = self.known.difference(&current).cloned().collect();
        found.sort();
        deleted.sort();
        self.known = current;
        GlobDiff { found, deleted }
    }

    /// Forget `path` so the next rescan reports it again if it still
    /// matches.
    pub fn forget(&mut self, path: &Path) -> bool {
        self.known.remove(path)
    }

    fn expand(&self) -> Option<HashSet<PathBuf>> {
        let options = MatchOptions {
            require_literal_leading_dot: true,
            ..MatchOptions::new()
        };
        let entries = match glob_with(&self.pattern, options) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("invalid glob {}: {err}", self.pattern);
                return None;
            }
        };

        let mut current = HashSet::new();
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    warn!("error expanding {}: {err}", self.pattern);
                    continue;
                }
            };
            if path.is_dir() || self.is_excluded(&path) {
                continue;
            }
            current.insert(path);
        }
        Some(current)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.exclude
            .as_ref()
            .is_some_and(|re| re.is_match(&path.to_string_lossy()))
    }
}

fn absolute_pattern(pattern: &str) -> String {
    if Path::new(pattern).is_absolute() {
        return pattern.to_string();
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(pattern).to_string_lossy().into_owned(),
        Err(_) => pattern.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::fs;
    use tempfile::TempDir;

    #[fixture]
    fn dir() -> TempDir {
        TempDir::new().expect("create temp dir")
    }

    fn watcher(dir: &TempDir, pattern: &str, exclude: Option<&str>) -> GlobWatcher {
        let pattern = format!("{}/{pattern}", dir.path().display());
        GlobWatcher::new(
            &pattern,
            exclude.map(|e| Regex::new(e).expect("valid exclude")),
            Duration::from_secs(10),
        )
        .expect("valid pattern")
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().expect("file name").to_string_lossy().into_owned())
            .collect()
    }

    #[rstest]
    fn reports_new_files_once(dir: TempDir) {
        fs::write(dir.path().join("a.log"), "").expect("write a");
        let mut watcher = watcher(&dir, "*.log", None);

        let diff = watcher.rescan(Instant::now());
        assert_eq!(names(&diff.found), vec!["a.log"]);

        fs::write(dir.path().join("b.log"), "").expect("write b");
        let diff = watcher.rescan(Instant::now());
        assert_eq!(names(&diff.found), vec!["b.log"]);

        assert!(watcher.rescan(Instant::now()).is_empty());
    }

    #[rstest]
    fn reports_deleted_files(dir: TempDir) {
        let path = dir.path().join("a.log");
        fs::write(&path, "").expect("write a");
        let mut watcher = watcher(&dir, "*.log", None);
        watcher.rescan(Instant::now());

        fs::remove_file(&path).expect("remove a");
        let diff = watcher.rescan(Instant::now());
        assert!(diff.found.is_empty());
        assert_eq!(names(&diff.deleted), vec!["a.log"]);

        fs::write(&path, "").expect("recreate a");
        let diff = watcher.rescan(Instant::now());
        assert_eq!(names(&diff.found), vec!["a.log"]);
    }

    #[rstest]
    fn plain_path_is_picked_up_after_creation(dir: TempDir) {
        let mut watcher = watcher(&dir, "later.log", None);
        assert!(watcher.rescan(Instant::now()).is_empty());

        fs::write(dir.path().join("later.log"), "").expect("create file");
        let diff = watcher.rescan(Instant::now());
        assert_eq!(names(&diff.found), vec!["later.log"]);
    }

    #[rstest]
    fn excluded_and_directories_are_skipped(dir: TempDir) {
        fs::write(dir.path().join("keep.log"), "").expect("write keep");
        fs::write(dir.path().join("old.log.gz"), "").expect("write gz");
        fs::create_dir(dir.path().join("nested.log")).expect("create dir");
        let mut watcher = watcher(&dir, "*.log*", Some(r"\.gz$"));

        let diff = watcher.rescan(Instant::now());
        assert_eq!(names(&diff.found), vec!["keep.log"]);
    }

    #[rstest]
    fn rescan_schedules_next_due(dir: TempDir) {
        let mut watcher = watcher(&dir, "*.log", None);
        let now = Instant::now();
        assert!(watcher.is_due(now));
        watcher.rescan(now);
        assert!(!watcher.is_due(now));
        assert_eq!(watcher.next_due(), now + Duration::from_secs(10));
    }

    #[rstest]
    fn forget_causes_rediscovery(dir: TempDir) {
        let path = dir.path().join("a.log");
        fs::write(&path, "").expect("write a");
        let mut watcher = watcher(&dir, "*.log", None);
        watcher.rescan(Instant::now());

        assert!(watcher.forget(&path));
        assert_eq!(names(&watcher.rescan(Instant::now()).found), vec!["a.log"]);
    }

    #[rstest]
    fn relative_patterns_become_absolute() {
        let watcher =
            GlobWatcher::new("logs/*.log", None, Duration::from_secs(1)).expect("valid pattern");
        assert!(Path::new(watcher.pattern()).is_absolute());
    }

    #[rstest]
    fn rejects_invalid_pattern() {
        assert!(GlobWatcher::new("/tmp/[unclosed", None, Duration::from_secs(1)).is_err());
    }
}
