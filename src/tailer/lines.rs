//! Collects framed lines from a tail between polls.

use std::io;

use crate::framer::LineFramer;

/// A [`TailHandler`](super::TailHandler) that frames incoming bytes and
/// buffers the completed lines until [`LineBatch::take_lines`].
#[derive(Debug, Default)]
pub struct LineBatch {
    framer: LineFramer,
    lines: Vec<String>,
    error: Option<io::Error>,
}

impl LineBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }

    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

impl super::TailHandler for LineBatch {
    fn on_data(&mut self, data: &[u8]) {
        self.lines.extend(
            self.framer
                .feed(data)
                .into_iter()
                .map(|line| String::from_utf8_lossy(&line).into_owned()),
        );
    }

    fn on_error(&mut self, err: io::Error) {
        self.error = Some(err);
    }

    fn on_reset(&mut self) {
        self.framer.reset();
    }
}
