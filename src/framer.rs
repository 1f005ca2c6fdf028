//! Newline framing for tailed byte streams.
//!
//! `LineFramer` accumulates raw bytes and yields each completed line,
//! keeping an incomplete trailing fragment until more data arrives. The
//! output depends only on the concatenated input, never on how it was
//! chunked.

/// Splits a byte stream into `\n`-terminated lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    /// Offset into `buffer` already scanned for a terminator.
    scanned: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `data` and return every line it completes, in order.
    ///
    /// The terminator is not included in the returned lines and a single
    /// trailing `\r` is removed.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut pos = self.scanned;
        while let Some(idx) = self.buffer[pos..].iter().position(|&b| b == b'\n') {
            let end = pos + idx;
            let mut line = &self.buffer[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            lines.push(line.to_vec());
            start = end + 1;
            pos = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// Bytes held back waiting for a terminator.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Discard any partial line.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}
