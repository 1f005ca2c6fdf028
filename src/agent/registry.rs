//! Files currently being tailed, keyed by normalised path.
//!
//! Several watch targets may match the same file. Each match is recorded
//! as an alias; the tailer runs while at least one alias remains.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use crossbeam_channel::Sender;
use log::debug;

use crate::{
    tag::tag_for_path,
    tailer::{FileTail, LineBatch, TailEvent, TailMode, TailStatus, TailWorker, spawn_worker},
};

/// How a tracked file is read.
#[derive(Debug)]
enum Reader {
    /// Polled by the event loop.
    Inline { tail: FileTail, batch: LineBatch },
    /// Read on a worker thread; dropping the handle stops the thread.
    Threaded { _worker: TailWorker },
}

#[derive(Debug)]
struct TrackedFile {
    key: PathBuf,
    tag: String,
    aliases: usize,
    reader: Reader,
}

/// A watch-target match: the watcher index and the path it reported.
type Alias = (usize, PathBuf);

/// What happened when a watcher reported a file.
#[derive(Debug, PartialEq, Eq)]
pub enum Discovery {
    /// A new tailer was started.
    Started { id: u64, key: PathBuf },
    /// The file is already tailed through another match.
    Shared,
    /// This watcher had already reported the path.
    Known,
}

/// All tracked files and their readers.
#[derive(Debug)]
pub struct Registry {
    mode: TailMode,
    poll_interval: Duration,
    events: Sender<TailEvent>,
    next_id: u64,
    files: HashMap<u64, TrackedFile>,
    by_key: HashMap<PathBuf, u64>,
    aliases: HashMap<Alias, u64>,
}

/// Canonical form of `path`, or `path` itself if it cannot be resolved.
pub fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl Registry {
    pub fn new(mode: TailMode, poll_interval: Duration, events: Sender<TailEvent>) -> Self {
        Self {
            mode,
            poll_interval,
            events,
            next_id: 0,
            files: HashMap::new(),
            by_key: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn tag(&self, id: u64) -> Option<&str> {
        self.files.get(&id).map(|f| f.tag.as_str())
    }

    /// Record that watcher `watcher` matched `path`, starting a tailer at
    /// the end of the file unless the same file is already tailed.
    ///
    /// The canonical path only identifies the file. The tailer reads and
    /// is tagged through `path` as discovered, so a symlink keeps its own
    /// name and a re-pointed link is followed.
    pub fn file_found(&mut self, watcher: usize, path: &Path) -> io::Result<Discovery> {
        let alias = (watcher, path.to_path_buf());
        if self.aliases.contains_key(&alias) {
            return Ok(Discovery::Known);
        }
        let key = normalize(path);
        if let Some(&id) = self.by_key.get(&key) {
            if let Some(file) = self.files.get_mut(&id) {
                file.aliases += 1;
            }
            self.aliases.insert(alias, id);
            return Ok(Discovery::Shared);
        }

        let tail = FileTail::open_at_end(path)?;
        let id = self.next_id;
        self.next_id += 1;
        let reader = match self.mode {
            TailMode::Reactor => Reader::Inline {
                tail,
                batch: LineBatch::new(),
            },
            TailMode::Threaded => {
                let worker = spawn_worker(id, tail, self.poll_interval, self.events.clone())?;
                Reader::Threaded { _worker: worker }
            }
        };
        self.files.insert(
            id,
            TrackedFile {
                key: key.clone(),
                tag: tag_for_path(path),
                aliases: 1,
                reader,
            },
        );
        self.by_key.insert(key.clone(), id);
        self.aliases.insert(alias, id);
        Ok(Discovery::Started { id, key })
    }

    /// Drop the alias for `path` and stop its tailer when no other match
    /// refers to the file. Returns the stopped file's key.
    pub fn file_deleted(&mut self, watcher: usize, path: &Path) -> Option<PathBuf> {
        let id = self.aliases.remove(&(watcher, path.to_path_buf()))?;
        let file = self.files.get_mut(&id)?;
        file.aliases = file.aliases.saturating_sub(1);
        if file.aliases > 0 {
            return None;
        }
        self.remove(id).map(|(key, _)| key)
    }

    /// Stop tailing `id`. Returns its key and the aliases that referred to
    /// it so watchers can forget them.
    pub fn remove(&mut self, id: u64) -> Option<(PathBuf, Vec<Alias>)> {
        let file = self.files.remove(&id)?;
        self.by_key.remove(&file.key);
        let mut stale = Vec::new();
        self.aliases.retain(|alias, owner| {
            if *owner == id {
                stale.push(alias.clone());
                false
            } else {
                true
            }
        });
        debug!("stopped tailing {}", file.key.display());
        Some((file.key, stale))
    }

    /// Read every inline file, handing completed lines to `deliver` in
    /// file order. Returns the ids of tails that failed with their error.
    pub fn poll_inline(
        &mut self,
        mut deliver: impl FnMut(&str, Vec<String>),
    ) -> Vec<(u64, io::Error)> {
        let mut failed = Vec::new();
        for (&id, file) in &mut self.files {
            let Reader::Inline { tail, batch } = &mut file.reader else {
                continue;
            };
            let status = tail.poll(batch);
            let lines = batch.take_lines();
            if !lines.is_empty() {
                deliver(&file.tag, lines);
            }
            if status == TailStatus::Stopped {
                let error = batch
                    .take_error()
                    .unwrap_or_else(|| io::Error::other("tail stopped"));
                failed.push((id, error));
            }
        }
        failed
    }
}
