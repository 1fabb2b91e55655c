//! A 32-bit container/codec tag, stored big-endian the way ISO-BMFF and RIFF both print it.

use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const fn new(tag: &[u8; 4]) -> Self {
        FourCc(*tag)
    }

    pub const fn from_be_u32(v: u32) -> Self {
        FourCc(v.to_be_bytes())
    }

    pub const fn to_be_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic() || c == ' ') => {
                write!(f, "FourCc({:?})", s)
            }
            _ => write!(f, "FourCc({:#010x})", self.to_be_u32()),
        }
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic() || c == ' ') => write!(f, "{}", s),
            _ => write!(f, "{:#010x}", self.to_be_u32()),
        }
    }
}
