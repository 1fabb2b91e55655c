//! The atom (box) framing shared by every ISO-BMFF structure: a 4-byte big-endian size, a 4-byte
//! FourCC type, and an optional 8-byte 64-bit size when the 32-bit size field reads `1`. A size of
//! `0` means "extends to the end of the enclosing container."
//!
//! Grounded on symphonia-core's `AtomHeader`/`AtomIterator`, adapted from a generic
//! `B: ReadBytes` reader to this workspace's concrete, seekable `MediaSourceStream` so skipping an
//! atom's content can seek past it instead of reading and discarding it.

use std::io::{Seek, SeekFrom};

use demux_core::error::{decode_error, Result};
use demux_core::fourcc::FourCc;
use demux_core::io::{MediaSourceStream, ReadBytes};

#[derive(Copy, Clone, Debug)]
pub struct AtomHeader {
    pub atom_type: FourCc,
    /// Absolute offset of the first header byte.
    pub start: u64,
    /// Size of the size+type header itself (8, or 16 for the 64-bit size form).
    pub header_len: u64,
    /// Absolute offset one past the atom's last content byte, or `None` if it runs to EOF.
    pub end: Option<u64>,
}

impl AtomHeader {
    pub fn content_start(&self) -> u64 {
        self.start + self.header_len
    }

    pub fn content_len(&self) -> Option<u64> {
        self.end.map(|end| end - self.content_start())
    }

    pub fn read(mss: &mut MediaSourceStream) -> Result<AtomHeader> {
        let start = mss.pos();
        let size32 = mss.read_be_u32()?;
        let mut type_bytes = [0u8; 4];
        mss.read_buf_exact(&mut type_bytes)?;
        let atom_type = FourCc::new(&type_bytes);

        let (header_len, end) = match size32 {
            0 => (8u64, None),
            1 => {
                let size64 = mss.read_be_u64()?;
                if size64 < 16 {
                    return decode_error("isomp4: atom size is invalid");
                }
                (16u64, Some(start + size64))
            }
            _ => {
                if u64::from(size32) < 8 {
                    return decode_error("isomp4: atom size is invalid");
                }
                (8u64, Some(start + u64::from(size32)))
            }
        };

        Ok(AtomHeader { atom_type, start, header_len, end })
    }
}

fn seek_to(mss: &mut MediaSourceStream, pos: u64) -> Result<()> {
    mss.seek(SeekFrom::Start(pos))?;
    Ok(())
}

/// Walks a sequence of sibling atoms bounded by `bound_end` (the parent's content end, or `None`
/// for the top level / an atom that runs to EOF).
pub struct AtomIterator<'a> {
    mss: &'a mut MediaSourceStream,
    bound_end: Option<u64>,
    next_pos: u64,
}

impl<'a> AtomIterator<'a> {
    pub fn new(mss: &'a mut MediaSourceStream, bound_end: Option<u64>) -> Self {
        let next_pos = mss.pos();
        AtomIterator { mss, bound_end, next_pos }
    }

    pub fn mss(&mut self) -> &mut MediaSourceStream {
        self.mss
    }

    /// Returns the next sibling atom's header, or `None` once `bound_end` is reached or the
    /// underlying source is exhausted.
    pub fn next(&mut self) -> Result<Option<AtomHeader>> {
        let cur = self.mss.pos();
        if cur != self.next_pos {
            seek_to(self.mss, self.next_pos)?;
        }

        if let Some(bound) = self.bound_end {
            if self.next_pos >= bound {
                return Ok(None);
            }
        }

        if self.mss.byte_len().is_some_and(|len| self.next_pos >= len) {
            return Ok(None);
        }

        let header = match AtomHeader::read(self.mss) {
            Ok(h) => h,
            Err(demux_core::error::Error::EndOfStream) => return Ok(None),
            Err(e) => return Err(e),
        };

        self.next_pos = header.end.unwrap_or_else(|| self.bound_end.unwrap_or(u64::MAX));

        Ok(Some(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn atom(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
        out.extend_from_slice(fourcc);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn verify_iterates_siblings() {
        let mut data = atom(b"ftyp", b"isom");
        data.extend_from_slice(&atom(b"free", b""));

        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        let mut iter = AtomIterator::new(&mut mss, None);

        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.atom_type, FourCc::new(b"ftyp"));
        assert_eq!(first.content_len(), Some(4));

        let second = iter.next().unwrap().unwrap();
        assert_eq!(second.atom_type, FourCc::new(b"free"));
        assert_eq!(second.content_len(), Some(0));

        assert!(iter.next().unwrap().is_none());
    }
}
