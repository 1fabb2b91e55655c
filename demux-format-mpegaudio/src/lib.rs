//! Raw MP3 elementary-stream demuxer: ID3v1/v2 tag extraction, frame-sync probing, and one audio
//! stream fed through `demux-codec-mp3`'s `Mp3Parser` in `ParserMode::Full`.
//!
//! Grounded on `lib/demux_mpegaudio.c`'s sync-scan-then-ID3-fallback opening sequence.

use demux_codec_mp3::{looks_like_frame_sync, Mp3Parser};
use demux_core::codecs::{CodecId, CodecParameters};
use demux_core::error::{unsupported_error, Result};
use demux_core::formats::probe::{Descriptor, ProbeDataMatchSpec, Tier};
use demux_core::formats::stream::{StreamAction, StreamFlags, StreamKind};
use demux_core::formats::track::{Track, TrackTable};
use demux_core::formats::{FormatInfo, FormatOptions, FormatReader, NextPacket};
use demux_core::fourcc::FourCc;
use demux_core::io::{MediaSourceStream, ReadBytes};
use demux_core::metadata::MetadataMap;
use demux_core::parser::{ParserMode, ParserSink};
use demux_core::units::Timestamp;

const ID3V1_TAG_SIZE: u64 = 128;
const READ_CHUNK: usize = 4096;
/// Upper bound on how far the opening sequence scans past an (absent or malformed) ID3v2 tag
/// looking for the first valid MP3 frame header.
const MAX_SYNC_SCAN: usize = 64 * 1024;

const AUDIO_STREAM_ID: u32 = 0;

fn read_id3v2_skip_len(mss: &mut MediaSourceStream) -> Result<u64> {
    let mut header = [0u8; 10];
    let n = mss.peek_buf(&mut header)?;
    if n < 10 || &header[0..3] != b"ID3" {
        return Ok(0);
    }
    let size = ((header[6] as u32 & 0x7f) << 21)
        | ((header[7] as u32 & 0x7f) << 14)
        | ((header[8] as u32 & 0x7f) << 7)
        | (header[9] as u32 & 0x7f);
    Ok(10 + size as u64)
}

pub struct MpegAudioReader {
    mss: MediaSourceStream,
    info: FormatInfo,
    tracks: TrackTable,
    metadata: MetadataMap,
    data_start: u64,
    data_end: Option<u64>,
}

impl MpegAudioReader {
    fn scan_for_sync(&mut self) -> Result<()> {
        let mut window = vec![0u8; 8];
        for step in 0..MAX_SYNC_SCAN {
            let n = self.mss.peek_buf(&mut window)?;
            if n == 0 {
                return unsupported_error("no MPEG audio frame sync found");
            }
            window.truncate(n);
            if looks_like_frame_sync(&window) {
                return Ok(());
            }
            self.mss.ignore_bytes(1)?;
            let _ = step;
            window.resize(8, 0);
        }
        unsupported_error("no MPEG audio frame sync found within the resync window")
    }

    fn read_id3v1_trailer(&mut self) -> Result<Option<MetadataMap>> {
        let Some(total_len) = self.mss.byte_len() else { return Ok(None) };
        if total_len < ID3V1_TAG_SIZE {
            return Ok(None);
        }

        let saved_pos = self.mss.pos();
        self.mss.seek(std::io::SeekFrom::Start(total_len - ID3V1_TAG_SIZE))?;

        let mut map = MetadataMap::new();
        let result = demux_metadata::read_id3v1(&mut self.mss, &mut map);

        self.mss.seek(std::io::SeekFrom::Start(saved_pos))?;

        match result {
            Ok(()) => {
                self.data_end = Some(total_len - ID3V1_TAG_SIZE);
                Ok(Some(map))
            }
            Err(_) => Ok(None),
        }
    }
}

impl FormatReader for MpegAudioReader {
    fn try_open(mut mss: MediaSourceStream, _opts: &FormatOptions) -> Result<Self> {
        let mut metadata = MetadataMap::new();

        let id3v2_len = read_id3v2_skip_len(&mut mss)?;
        if id3v2_len > 0 {
            let _ = demux_metadata::read_id3v2(&mut mss, &mut metadata);
            mss.seek(std::io::SeekFrom::Start(id3v2_len))?;
        }

        let data_start = mss.pos();

        let parser = ParserSink::new(ParserMode::Full, Box::new(Mp3Parser::new()), AUDIO_STREAM_ID);

        let mut stream = demux_core::formats::stream::Stream::new(
            AUDIO_STREAM_ID,
            StreamKind::Audio,
            CodecParameters::new(CodecId::Mp3),
        );
        stream.timescale = 1; // refined to the sample rate once the first frame is parsed.
        stream.set_parser(parser);
        stream.flags |= StreamFlags::PARSE_FULL;
        stream.action = StreamAction::Parse;

        let mut track = Track::new(0);
        track.data_start = data_start;
        track.add_stream(stream);

        let mut tracks = TrackTable::new();
        tracks.push(track);

        let mut reader = MpegAudioReader {
            mss,
            info: FormatInfo {
                id: demux_core::formats::FormatId::new(&FourCc::new(b"MPGA")),
                short_name: "mpegaudio",
                long_name: "Raw MPEG Audio (MP3) elementary stream",
            },
            tracks,
            metadata,
            data_start,
            data_end: None,
        };

        reader.scan_for_sync()?;

        if let Some(id3v1) = reader.read_id3v1_trailer()? {
            for (k, v) in id3v1.iter() {
                if reader.metadata.get(k).is_none() {
                    reader.metadata.set(k, v);
                }
            }
        }

        Ok(reader)
    }

    fn format_info(&self) -> &FormatInfo {
        &self.info
    }

    fn tracks(&self) -> &TrackTable {
        &self.tracks
    }

    fn tracks_mut(&mut self) -> &mut TrackTable {
        &mut self.tracks
    }

    fn metadata(&self) -> Option<&MetadataMap> {
        Some(&self.metadata)
    }

    fn next_packet(&mut self) -> Result<NextPacket> {
        loop {
            let track = self.tracks.current_mut().expect("mpeg audio always has exactly one track");
            let stream = track.stream_by_id_mut(AUDIO_STREAM_ID).expect("audio stream must exist");

            if let Some(pkt) = stream.pop_buffered() {
                return Ok(NextPacket::Packet(pkt));
            }

            let pos = self.mss.pos();
            if let Some(end) = self.data_end {
                if pos >= end {
                    stream.mark_eof();
                    return Ok(NextPacket::Eof);
                }
            }

            let mut chunk = vec![0u8; READ_CHUNK];
            let n = self.mss.peek_buf(&mut chunk)?;
            if n == 0 {
                stream.mark_eof();
                return Ok(NextPacket::Eof);
            }
            chunk.truncate(n);
            self.mss.ignore_bytes(n as u64)?;

            stream.push_raw(&chunk, Timestamp::UNDEFINED, Some(pos))?;

            if stream.timescale == 1 {
                if let Some(audio) = &stream.codec_params.audio {
                    stream.timescale = audio.sample_rate;
                }
            }
        }
    }

    fn into_inner(self: Box<Self>) -> MediaSourceStream {
        self.mss
    }
}

/// Opens an `ID3`-tagged or bare MPEG audio elementary stream. Matches [`Descriptor::factory`]'s
/// signature for registration with `demux_core::formats::probe::Probe`.
pub fn try_new(mss: MediaSourceStream, opts: &FormatOptions) -> Result<Box<dyn FormatReader>> {
    Ok(Box::new(MpegAudioReader::try_open(mss, opts)?))
}

/// Preferred-tier probe: an ID3v2 tag at the very start of the input is an unambiguous signature.
pub fn probe_id3() -> Descriptor {
    Descriptor {
        name: "mpegaudio-id3",
        tier: Tier::Preferred,
        spec: ProbeDataMatchSpec { markers: &[b"ID3"], offset: 0, anchored: true },
        factory: try_new,
    }
}

/// Standard-tier probe: a bare elementary stream is recognized only by its frame sync pattern,
/// which may require the byte-stepped resync scan to find.
pub fn probe_sync() -> Descriptor {
    Descriptor {
        name: "mpegaudio-sync",
        tier: Tier::Standard,
        spec: ProbeDataMatchSpec {
            markers: &[
                &[0xFF, 0xFB],
                &[0xFF, 0xFA],
                &[0xFF, 0xF3],
                &[0xFF, 0xF2],
                &[0xFF, 0xE3],
                &[0xFF, 0xE2],
            ],
            offset: 0,
            anchored: false,
        },
        factory: try_new,
    }
}
