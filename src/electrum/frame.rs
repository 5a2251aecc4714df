//! Newline framing for the Electrum line protocol.

const DELIMITER: u8 = b'\n';

/// Accumulates socket chunks and hands out complete `\n`-terminated frames.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known not to contain a delimiter.
    scanned: usize,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every frame it completes, in order, without
    /// the trailing delimiter. A partial tail stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut pos = self.scanned;
        while let Some(offset) = self.buffer[pos..].iter().position(|b| *b == DELIMITER) {
            let end = pos + offset;
            frames.push(self.buffer[start..end].to_vec());
            start = end + 1;
            pos = start;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        self.scanned = self.buffer.len();
        frames
    }

    /// Size of the buffered partial frame.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}
