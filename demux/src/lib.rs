//! Facade crate: builds a [`Probe`] with every format reader this workspace carries registered,
//! and exposes a single [`open`] entry point, the way symphonia-core's `default` module wires
//! up `symphonia_core::probe::Probe` from its format crates (grounded on
//! `symphonia/src/lib.rs`'s `default::get_probe`).
//!
//! Unlike that crate, none of this is feature-gated: this workspace's format crates are always
//! enabled, so `get_probe` registers all of them unconditionally rather than behind `#[cfg(feature
//! = ...)]`.

use demux_core::formats::probe::Probe;
use demux_core::formats::{FormatOptions, FormatReader};
use demux_core::io::MediaSourceStream;
use demux_core::error::Result;

pub use demux_core::error::Error;
pub use demux_core::formats;
pub use demux_core::io;
pub use demux_core::units;

/// Builds a probe with every format reader this workspace supports registered, `Preferred`-tier
/// (strong container signatures) before `Standard`-tier (formats needing a byte-stepped resync
/// scan), matching `Probe::probe`'s own tier ordering.
pub fn get_probe() -> Probe {
    let mut probe = Probe::new();

    probe.register(demux_format_isomp4::probe_isomp4());
    probe.register(demux_format_riff::probe_wav());
    probe.register(demux_format_riff::probe_avi());
    probe.register(demux_format_ogg::probe_ogg());
    probe.register(demux_format_webvtt::probe_webvtt());
    probe.register(demux_format_mpegaudio::probe_id3());
    probe.register(demux_format_mpegts::probe_ts());
    probe.register(demux_format_mpegaudio::probe_sync());

    probe
}

/// Probes `mss` against every registered format and opens the first match.
///
/// This is the workspace's single entry point: build a [`MediaSourceStream`] from any
/// `Read + Seek` source (or [`io::ReadOnlySource`] for a non-seekable one), and call `open`.
pub fn open(mss: MediaSourceStream, opts: &FormatOptions) -> Result<Box<dyn FormatReader>> {
    get_probe().probe(mss, opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_probe_registers_every_format() {
        let probe = get_probe();
        assert_eq!(probe.descriptors().len(), 8);
    }
}
