//! ID3v1, ID3v2, and Vorbis comment metadata parsing, shared by the formats that embed them
//! (MP3/ADTS elementary streams, Ogg Vorbis, MP4 via `demux-format-mpegaudio`/`demux-format-ogg`).

pub mod genres;
pub mod id3v1;
pub mod id3v2;
pub mod vorbis_comment;

pub use id3v1::read_id3v1;
pub use id3v2::read_id3v2;
pub use vorbis_comment::read_vorbis_comment;
