//! The byte-input abstraction: a seekable octet source, endian-aware readers, and a ring-buffer
//! read-ahead wrapper (`MediaSourceStream`) that every demuxer in this workspace reads through.

mod media_source_stream;

pub use media_source_stream::MediaSourceStream;

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};

use bitflags::bitflags;

use crate::error::Result;

bitflags! {
    /// Capabilities of a [`MediaSource`], queried by the demuxer framework and the seek engine.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct SourceFlags: u32 {
        /// The source supports seeking to an arbitrary byte offset.
        const CAN_SEEK_BYTE = 1 << 0;
        /// The source supports seeking to an arbitrary point in time without a byte offset.
        const CAN_SEEK_TIME = 1 << 1;
        /// Seeking is supported but expensive (e.g. requires a network round-trip).
        const SEEK_SLOW     = 1 << 2;
        /// The source can be paused and resumed without losing its position.
        const CAN_PAUSE     = 1 << 3;
    }
}

/// A byte source that can be read sequentially and, if `byte_len` returns `Some`, has a known
/// total length. Mirrors symphonia-core's `MediaSource` trait.
pub trait MediaSource: Read + Seek + Send {
    /// Returns `true` if the source is seekable.
    fn is_seekable(&self) -> bool;

    /// The total length of the source in bytes, if known in advance.
    fn byte_len(&self) -> Option<u64>;
}

impl MediaSource for File {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.metadata().map(|m| m.len()).ok()
    }
}

impl MediaSource for Cursor<Vec<u8>> {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.get_ref().len() as u64)
    }
}

impl MediaSource for Cursor<&'static [u8]> {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.get_ref().len() as u64)
    }
}

/// Wraps a plain `Read` (non-seekable, length-unknown) source so it can be used as a
/// [`MediaSource`]. Grounded on symphonia's identical `ReadOnlySource<R>` adapter.
pub struct ReadOnlySource<R: Read + Send> {
    inner: R,
}

impl<R: Read + Send> ReadOnlySource<R> {
    pub fn new(inner: R) -> Self {
        ReadOnlySource { inner }
    }
}

impl<R: Read + Send> Read for ReadOnlySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Seek for ReadOnlySource<R> {
    fn seek(&mut self, _pos: SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "source is not seekable"))
    }
}

impl<R: Read + Send> MediaSource for ReadOnlySource<R> {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// Endian-aware integer and float readers over anything implementing `std::io::Read`.
///
/// Blanket-implemented the way symphonia does, so any `Read` (a `File`, a `Cursor`, a
/// `MediaSourceStream`) gets these helpers for free.
pub trait ReadBytes {
    fn read_u8(&mut self) -> Result<u8>;

    fn read_boxed_slice_exact(&mut self, len: usize) -> Result<Box<[u8]>> {
        let mut buf = vec![0u8; len];
        self.read_buf_exact(&mut buf)?;
        Ok(buf.into_boxed_slice())
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    fn ignore_bytes(&mut self, count: u64) -> Result<()> {
        let mut remaining = count;
        let mut scratch = [0u8; 1024];
        while remaining > 0 {
            let n = remaining.min(scratch.len() as u64) as usize;
            self.read_buf_exact(&mut scratch[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }

    fn read_be_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_buf_exact(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    fn read_le_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_buf_exact(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    fn read_be_u24(&mut self) -> Result<u32> {
        let mut b = [0u8; 3];
        self.read_buf_exact(&mut b)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    fn read_le_u24(&mut self) -> Result<u32> {
        let mut b = [0u8; 3];
        self.read_buf_exact(&mut b)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    fn read_be_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_buf_exact(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    fn read_le_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_buf_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    fn read_be_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_buf_exact(&mut b)?;
        Ok(u64::from_be_bytes(b))
    }

    fn read_le_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_buf_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    fn read_be_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_be_u32()?))
    }

    fn read_le_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_le_u32()?))
    }

    fn read_be_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_be_u64()?))
    }

    fn read_le_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_le_u64()?))
    }

    /// Reads a Pascal string: a one-byte length prefix followed by that many bytes, decoded
    /// lossily as UTF-8.
    fn read_pascal_string(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_boxed_slice_exact(len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl<R: Read + ?Sized> ReadBytes for R {
    fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.read_exact(buf)?;
        Ok(())
    }
}

/// Seeking within the bytes already buffered by a [`MediaSourceStream`], without touching the
/// underlying source.
pub trait SeekBuffered {
    /// Seek to an absolute position, which must lie within the currently buffered window.
    fn seek_buffered(&mut self, pos: u64) -> u64;

    /// Seek by a relative offset from the current position, which must remain within the
    /// currently buffered window.
    fn seek_buffered_rel(&mut self, delta: i64) -> u64;

    /// The number of buffered bytes available to read without a new underlying read.
    fn read_buffer_len(&self) -> usize;
}
