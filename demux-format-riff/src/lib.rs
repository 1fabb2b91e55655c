//! RIFF-family container demuxers: WAVE (linear PCM / simple compressed audio) and AVI
//! (interleaved video/audio with optional `idx1` packet index).
//!
//! Both formats share the `RIFF`/`LIST`/four-char-chunk-ID/little-endian-`u32`-size structure but
//! little else, so each gets its own reader rather than a shared `FormatReader` impl; only the
//! `fmt `/`strf` `WAVEFORMATEX` tag table (`wav::codec_for_format_tag`) is shared, since AVI audio
//! streams use the same tag space as WAVE.

pub mod avi;
pub mod wav;

pub use avi::{probe_avi, AviReader};
pub use wav::{probe_wav, WavReader};
