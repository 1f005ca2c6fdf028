//! Incremental file tailing.
//!
//! [`FileTail`] owns one open file and reads only bytes appended after it
//! was opened. Consumers receive those bytes through a [`TailHandler`];
//! the two strategies selected by [`TailMode`] differ only in which
//! thread drives [`FileTail::poll`].

mod lines;
mod worker;

#[cfg(test)]
mod tests;

use std::{
    fs::{self, File},
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    str::FromStr,
};

use log::debug;

pub use lines::LineBatch;
pub use worker::{TailEvent, TailWorker, spawn_worker};

const READ_CHUNK: usize = 64 * 1024;

/// Receives data read by a [`FileTail`].
pub trait TailHandler {
    /// Newly appended bytes, in file order.
    fn on_data(&mut self, data: &[u8]);
    /// An unrecoverable read error. The tail stops after this call.
    fn on_error(&mut self, err: io::Error);
    /// The file was truncated or replaced; bytes delivered so far do not
    /// continue into the next [`TailHandler::on_data`].
    fn on_reset(&mut self) {}
}

/// Outcome of a poll, consumed by whoever owns the tail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TailStatus {
    Active,
    Stopped,
}

/// Which thread reads tailed files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TailMode {
    /// The event loop polls every file on a short interval.
    #[default]
    Reactor,
    /// One background reader per file hands line batches to the loop.
    Threaded,
}

impl FromStr for TailMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reactor" => Ok(TailMode::Reactor),
            "threaded" => Ok(TailMode::Threaded),
            other => Err(format!("unknown tail mode: {other}")),
        }
    }
}

/// Read position within one file.
#[derive(Debug)]
pub struct FileTail {
    path: PathBuf,
    file: File,
    offset: u64,
    #[cfg(unix)]
    inode: u64,
    buf: Vec<u8>,
}

impl FileTail {
    /// Open `path` positioned at its current end so existing content is
    /// never replayed.
    pub fn open_at_end(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let offset = file.seek(SeekFrom::End(0))?;
        #[cfg(unix)]
        let inode = inode_of(&file.metadata()?);
        Ok(Self {
            path,
            file,
            offset,
            #[cfg(unix)]
            inode,
            buf: vec![0; READ_CHUNK],
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read everything appended since the last poll.
    ///
    /// Truncation moves the offset to the new end of file. On Unix a new
    /// inode at the same path is followed after the old handle is drained.
    /// Both discontinuities are reported through [`TailHandler::on_reset`].
    pub fn poll<H: TailHandler>(&mut self, handler: &mut H) -> TailStatus {
        match self.poll_inner(handler) {
            Ok(()) => TailStatus::Active,
            Err(err) => {
                handler.on_error(err);
                TailStatus::Stopped
            }
        }
    }

    fn poll_inner<H: TailHandler>(&mut self, handler: &mut H) -> io::Result<()> {
        self.check_truncation(handler)?;
        self.read_available(handler)?;
        #[cfg(unix)]
        self.follow_replacement(handler)?;
        Ok(())
    }

    fn check_truncation<H: TailHandler>(&mut self, handler: &mut H) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        if len < self.offset {
            debug!(
                "{} truncated from {} to {len} bytes",
                self.path.display(),
                self.offset
            );
            self.offset = len;
            handler.on_reset();
        }
        Ok(())
    }

    fn read_available<H: TailHandler>(&mut self, handler: &mut H) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.offset))?;
        loop {
            let n = match self.file.read(&mut self.buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            self.offset += n as u64;
            handler.on_data(&self.buf[..n]);
        }
    }

    #[cfg(unix)]
    fn follow_replacement<H: TailHandler>(&mut self, handler: &mut H) -> io::Result<()> {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            // Removed; keep the handle until the owner stops this tail.
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        if inode_of(&meta) == self.inode {
            return Ok(());
        }
        debug!("{} was replaced; reopening", self.path.display());
        self.file = File::open(&self.path)?;
        self.inode = inode_of(&self.file.metadata()?);
        self.offset = 0;
        handler.on_reset();
        self.read_available(handler)
    }
}

#[cfg(unix)]
fn inode_of(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}
