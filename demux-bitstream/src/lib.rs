//! Bitstream primitives shared by the per-codec packet parsers: MPEG/H.264 startcode finding,
//! H.264 NAL unescape, and an MSB-first bit reader for exp-Golomb decoding.

pub mod bitreader;
pub mod startcode;

pub use bitreader::BitReaderLtr;
pub use startcode::{find_startcode, unescape_nal};
