//! Serial channel
//!
//! Byte pipe to the controller. Inbound bytes are reassembled into frames by
//! the protocol framer; outbound messages go through a FIFO queue that
//! enforces the minimum spacing the device needs between writes while it is
//! emitting status lines.

use crate::config::SerialConfig;
use crate::error::{AeolusError, Result};
use crate::logging::{get_logger, StructuredLogger};
use crate::protocol::Framer;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt, ReadHalf, WriteHalf};
use tokio::time::{Duration, Instant};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Minimum time between two successive writes to the device
pub const WRITE_PACE: Duration = Duration::from_secs(1);

/// Open the configured serial port.
pub fn open(config: &SerialConfig) -> Result<SerialStream> {
    let stream = tokio_serial::new(&config.port, config.baud)
        .open_native_async()
        .map_err(|e| {
            AeolusError::serial(format!("could not open {}: {}", config.port, e))
        })?;
    Ok(stream)
}

/// Open and split the port into its two halves.
pub fn open_split(
    config: &SerialConfig,
) -> Result<(FrameReader<ReadHalf<SerialStream>>, WriteHalf<SerialStream>)> {
    let stream = open(config)?;
    let (rd, wr) = tokio::io::split(stream);
    Ok((FrameReader::new(rd), wr))
}

/// Reads available bytes and yields complete frames.
pub struct FrameReader<R> {
    inner: R,
    framer: Framer,
    pending: VecDeque<Vec<u8>>,
    nreads: u64,
    logger: StructuredLogger,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            framer: Framer::new(),
            pending: VecDeque::new(),
            nreads: 0,
            logger: get_logger("serial"),
        }
    }

    /// Next complete frame from the stream.
    ///
    /// Cancel-safe: a partially assembled line stays in the framer and
    /// already-framed lines stay queued.
    pub async fn next_frame(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                self.nreads += 1;
                self.logger
                    .trace(&format!("Rx {}", String::from_utf8_lossy(&frame)));
                return Ok(frame);
            }
            let mut buf = [0u8; 512];
            let n = self.inner.read(&mut buf).await?;
            if n == 0 {
                return Err(AeolusError::serial("serial port closed"));
            }
            for frame in self.framer.push(&buf[..n]) {
                self.pending.push_back(frame);
            }
        }
    }

    /// Drop buffered partial input, realigning with the stream.
    pub fn reset(&mut self) {
        self.framer.reset();
        self.pending.clear();
    }

    pub fn frames_read(&self) -> u64 {
        self.nreads
    }
}

/// Outbound FIFO with pacing and hold/resume.
///
/// Pure bookkeeping: the owner asks when the next write may go out and pops
/// one message at a time. Holding stops dequeueing without dropping anything.
pub struct WriteQueue {
    queue: VecDeque<Vec<u8>>,
    last_write: Option<Instant>,
    held: bool,
    nwrites: u64,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            last_write: None,
            held: false,
            nwrites: 0,
        }
    }

    /// Append a message to the queue.
    pub fn enqueue(&mut self, message: impl Into<Vec<u8>>) {
        self.queue.push_back(message.into());
    }

    /// Stop or resume dequeueing.
    pub fn hold(&mut self, flag: bool) {
        self.held = flag;
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn writes_done(&self) -> u64 {
        self.nwrites
    }

    /// Worst-case delay a message enqueued now would wait before
    /// transmission. Command deadlines are padded by this much.
    pub fn queue_delay(&self) -> Duration {
        WRITE_PACE * (self.queue.len() as u32 + 1)
    }

    /// When the head of the queue may be written, if anything is pending.
    pub fn next_ready_at(&self, now: Instant) -> Option<Instant> {
        if self.held || self.queue.is_empty() {
            return None;
        }
        let at = match self.last_write {
            Some(last) => last + WRITE_PACE,
            None => now,
        };
        Some(at.max(now))
    }

    /// Pop the head if the pace allows it, recording the write time.
    pub fn pop_ready(&mut self, now: Instant) -> Option<Vec<u8>> {
        if self.held || self.queue.is_empty() {
            return None;
        }
        if let Some(last) = self.last_write {
            if now < last + WRITE_PACE {
                return None;
            }
        }
        self.last_write = Some(now);
        self.nwrites += 1;
        self.queue.pop_front()
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new()
    }
}
