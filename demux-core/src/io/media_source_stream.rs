//! A buffered, seekable wrapper around a boxed [`MediaSource`], grounded on symphonia-core's
//! non-generic `MediaSourceStream` (the lifetime-generic variant elsewhere in the corpus was not
//! used here, see DESIGN.md, because a concrete, non-generic reader composes more simply with
//! the trait objects used throughout the demuxer/parser framework).

use std::io::{Read, Seek, SeekFrom};

use super::{MediaSource, SeekBuffered, SourceFlags};
use crate::error::Result;

const MIN_BLOCK_LEN: usize = 1024;
const MAX_BLOCK_LEN: usize = 32 * 1024;

pub struct MediaSourceStream {
    inner: Box<dyn MediaSource>,
    flags: SourceFlags,
    ring: Vec<u8>,
    /// Offset of `ring[0]` within the underlying source.
    ring_base: u64,
    /// Current read cursor, relative to `ring_base`.
    read_pos: usize,
    /// Length of valid data currently in `ring`.
    len: usize,
    read_block_len: usize,
}

impl MediaSourceStream {
    pub fn new(inner: Box<dyn MediaSource>) -> Self {
        let mut flags = SourceFlags::empty();
        if inner.is_seekable() {
            flags |= SourceFlags::CAN_SEEK_BYTE;
        }

        MediaSourceStream {
            inner,
            flags,
            ring: Vec::new(),
            ring_base: 0,
            read_pos: 0,
            len: 0,
            read_block_len: MIN_BLOCK_LEN,
        }
    }

    pub fn flags(&self) -> SourceFlags {
        self.flags
    }

    /// Forces `CAN_SEEK_TIME` to be reported, for use by mock inputs in tests that exercise the
    /// seek engine's "input time-seek" strategy dispatch.
    pub fn set_can_seek_time(&mut self, can: bool) {
        self.flags.set(SourceFlags::CAN_SEEK_TIME, can);
    }

    pub fn byte_len(&self) -> Option<u64> {
        self.inner.byte_len()
    }

    /// The absolute byte position of the read cursor within the underlying source.
    pub fn pos(&self) -> u64 {
        self.ring_base + self.read_pos as u64
    }

    fn unread_len(&self) -> usize {
        self.len - self.read_pos
    }

    /// Guarantee that at least `n` bytes are available to read without consuming them. Grows the
    /// ring buffer and the adaptive read-ahead block length geometrically, exactly as
    /// symphonia-core's `MediaSourceStream` does.
    pub fn ensure_buffered(&mut self, n: usize) -> Result<usize> {
        while self.unread_len() < n {
            // Compact: drop bytes already consumed so the ring doesn't grow unboundedly.
            if self.read_pos > 0 {
                self.ring.drain(0..self.read_pos);
                self.ring_base += self.read_pos as u64;
                self.len -= self.read_pos;
                self.read_pos = 0;
            }

            let to_read = self.read_block_len;
            let old_len = self.ring.len();
            self.ring.resize(old_len + to_read, 0);
            let n_read = self.inner.read(&mut self.ring[old_len..old_len + to_read])?;
            self.ring.truncate(old_len + n_read);
            self.len = self.ring.len();

            if self.read_block_len < MAX_BLOCK_LEN {
                self.read_block_len = (self.read_block_len * 2).min(MAX_BLOCK_LEN);
            }

            if n_read == 0 {
                break;
            }
        }

        Ok(self.unread_len().min(n))
    }

    /// Copy up to `buf.len()` buffered bytes starting at the read cursor, without consuming them.
    pub fn peek_buf(&mut self, buf: &mut [u8]) -> Result<usize> {
        let avail = self.ensure_buffered(buf.len())?;
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&self.ring[self.read_pos..self.read_pos + n]);
        Ok(n)
    }

    /// Advance the read cursor by `n` bytes, which must already be buffered or obtainable via a
    /// fresh read.
    pub fn ignore_bytes(&mut self, n: u64) -> Result<()> {
        let mut remaining = n;
        while remaining > 0 {
            let want = remaining.min(MAX_BLOCK_LEN as u64) as usize;
            let avail = self.ensure_buffered(want)?;
            if avail == 0 {
                return crate::error::end_of_stream_error();
            }
            let take = avail.min(want);
            self.read_pos += take;
            remaining -= take as u64;
        }
        Ok(())
    }

    /// Rewind the read cursor back within the currently buffered window.
    pub fn rewind(&mut self, n: usize) {
        self.read_pos = self.read_pos.saturating_sub(n);
    }
}

impl Read for MediaSourceStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let avail = self
            .ensure_buffered(buf.len())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&self.ring[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        Ok(n)
    }
}

impl Seek for MediaSourceStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::End(delta) => {
                let len = self
                    .inner
                    .byte_len()
                    .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Unsupported, "unknown length"))?;
                (len as i64 + delta) as u64
            }
            SeekFrom::Current(delta) => (self.pos() as i64 + delta) as u64,
        };

        // If the target lies within the buffered window, just move the cursor.
        if target >= self.ring_base && target <= self.ring_base + self.len as u64 {
            self.read_pos = (target - self.ring_base) as usize;
            return Ok(target);
        }

        let new_pos = self.inner.seek(SeekFrom::Start(target))?;
        self.ring.clear();
        self.ring_base = new_pos;
        self.read_pos = 0;
        self.len = 0;
        self.read_block_len = MIN_BLOCK_LEN;
        Ok(new_pos)
    }
}

impl SeekBuffered for MediaSourceStream {
    fn seek_buffered(&mut self, pos: u64) -> u64 {
        assert!(
            pos >= self.ring_base && pos <= self.ring_base + self.len as u64,
            "seek_buffered target is outside the buffered window"
        );
        self.read_pos = (pos - self.ring_base) as usize;
        pos
    }

    fn seek_buffered_rel(&mut self, delta: i64) -> u64 {
        let target = (self.pos() as i64 + delta) as u64;
        self.seek_buffered(target)
    }

    fn read_buffer_len(&self) -> usize {
        self.unread_len()
    }
}
