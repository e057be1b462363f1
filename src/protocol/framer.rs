//! Frame reassembly
//!
//! Splits the inbound serial byte stream into complete CR-LF terminated
//! frames. The line buffer is capped; on overflow it is flushed and the
//! event logged so a runaway stream cannot grow memory without bound.

use crate::logging::{get_logger, StructuredLogger};

/// Upper bound on the reassembly buffer
pub const MAX_BUFFER: usize = 4096;

/// Consecutive undecodable status-shaped frames that declare a desync
pub const DESYNC_LIMIT: u32 = 10;

/// CR-LF frame reassembler
pub struct Framer {
    buffer: Vec<u8>,
    oversize_flushes: u64,
    logger: StructuredLogger,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            oversize_flushes: 0,
            logger: get_logger("framer"),
        }
    }

    /// Append raw bytes and return every complete frame they finish.
    ///
    /// Frames are returned without their CR-LF terminator, stripped of
    /// leading whitespace. Empty lines are dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        loop {
            let Some(pos) = find_crlf(&self.buffer) else {
                break;
            };
            let mut line: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            line.truncate(pos);
            let start = line
                .iter()
                .position(|b| !b" \t\r\n".contains(b))
                .unwrap_or(line.len());
            if start < line.len() {
                frames.push(line.split_off(start));
            }
        }

        if self.buffer.len() > MAX_BUFFER {
            self.oversize_flushes += 1;
            self.logger.warn(&format!(
                "oversize frame: flushing {} buffered bytes",
                self.buffer.len()
            ));
            self.buffer.clear();
        }

        frames
    }

    /// Drop any partial line, realigning with the stream.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of oversize flushes since startup
    pub fn oversize_flushes(&self) -> u64 {
        self.oversize_flushes
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut framer = Framer::new();
        let frames = framer.push(b"(X007)\r\n");
        assert_eq!(frames, vec![b"(X007)".to_vec()]);
    }

    #[test]
    fn test_split_across_reads() {
        let mut framer = Framer::new();
        assert!(framer.push(b"(X0").is_empty());
        assert!(framer.push(b"07)\r").is_empty());
        let frames = framer.push(b"\n(s)\r\n");
        assert_eq!(frames, vec![b"(X007)".to_vec(), b"(s)".to_vec()]);
    }

    #[test]
    fn test_leading_whitespace_stripped() {
        let mut framer = Framer::new();
        let frames = framer.push(b"  \t(s)\r\n");
        assert_eq!(frames, vec![b"(s)".to_vec()]);
    }

    #[test]
    fn test_empty_lines_dropped() {
        let mut framer = Framer::new();
        let frames = framer.push(b"\r\n\r\n(s)\r\n");
        assert_eq!(frames, vec![b"(s)".to_vec()]);
    }

    #[test]
    fn test_oversize_flush() {
        let mut framer = Framer::new();
        let garbage = vec![b'x'; MAX_BUFFER + 1];
        assert!(framer.push(&garbage).is_empty());
        assert_eq!(framer.oversize_flushes(), 1);
        // Stream realigns afterwards
        let frames = framer.push(b"(s)\r\n");
        assert_eq!(frames, vec![b"(s)".to_vec()]);
    }

    #[test]
    fn test_reset_discards_partial() {
        let mut framer = Framer::new();
        assert!(framer.push(b"(trunc").is_empty());
        framer.reset();
        let frames = framer.push(b"(s)\r\n");
        assert_eq!(frames, vec![b"(s)".to_vec()]);
    }
}
