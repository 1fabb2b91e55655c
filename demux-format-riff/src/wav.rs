//! WAVE (`RIFF....WAVE`) reader: walks the top-level chunk list for `fmt `, `LIST/INFO`, and
//! `data`, then hands out raw PCM/codec payload split into fixed-size blocks as packets.
//!
//! Grounded on `symphonia-format-riff`'s `WavReader` (`wave/mod.rs`): a single top-level RIFF
//! chunk walk, `fmt ` populating `CodecParameters`, `data` becoming the one audio track.

use demux_core::codecs::{AudioParams, CodecId, CodecParameters};
use demux_core::error::{decode_error, unsupported_error, Result};
use demux_core::formats::probe::{Descriptor, ProbeDataMatchSpec, Tier};
use demux_core::formats::stream::{Stream, StreamAction, StreamKind};
use demux_core::formats::track::{Track, TrackTable};
use demux_core::formats::{FormatId, FormatInfo, FormatOptions, FormatReader, NextPacket};
use demux_core::fourcc::FourCc;
use demux_core::io::{MediaSourceStream, ReadBytes};
use demux_core::metadata::{keys, MetadataMap};
use demux_core::packet::PacketBuilder;
use demux_core::units::Timestamp;

const WAVE_FORM: [u8; 4] = *b"WAVE";
const AUDIO_STREAM_ID: u32 = 0;

/// Bytes read per packet when the format carries no natural frame boundary (linear PCM, A-law,
/// mu-law); keeps packet sizes comparable to a few dozen milliseconds of audio at typical rates.
const PCM_BLOCK_FRAMES: u64 = 4096;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_ALAW: u16 = 0x0006;
const WAVE_FORMAT_MULAW: u16 = 0x0007;
const WAVE_FORMAT_MPEGLAYER3: u16 = 0x0055;

pub(crate) fn codec_for_format_tag(tag: u16) -> CodecId {
    match tag {
        WAVE_FORMAT_PCM => CodecId::Pcm,
        WAVE_FORMAT_ALAW => CodecId::ALaw,
        WAVE_FORMAT_MULAW => CodecId::ULaw,
        WAVE_FORMAT_MPEGLAYER3 => CodecId::Mp3,
        _ => CodecId::Extended,
    }
}

fn read_info_chunk(mss: &mut MediaSourceStream, len: u32, metadata: &mut MetadataMap) -> Result<()> {
    let list_form = mss.read_le_u32()?.to_le_bytes();
    if &list_form != b"INFO" {
        mss.ignore_bytes((len - 4) as u64)?;
        return Ok(());
    }

    let mut remaining = len as i64 - 4;
    while remaining >= 8 {
        let tag = mss.read_le_u32()?.to_le_bytes();
        let size = mss.read_le_u32()?;
        remaining -= 8;

        let key = match &tag {
            b"INAM" => Some(keys::TITLE),
            b"IART" => Some(keys::ARTIST),
            b"IPRD" => Some(keys::ALBUM),
            b"ICRD" => Some(keys::DATE),
            b"ILNG" => Some(keys::LANGUAGE),
            b"ISFT" => Some(keys::ENCODER),
            b"IGNR" => Some(keys::GENRE),
            b"ICMT" => Some(keys::COMMENT),
            _ => None,
        };

        let value = mss.read_boxed_slice_exact(size as usize)?;
        let padded = size % 2 == 1;
        if padded {
            mss.ignore_bytes(1)?;
        }
        remaining -= size as i64 + if padded { 1 } else { 0 };

        if let Some(key) = key {
            let text = String::from_utf8_lossy(&value);
            let text = text.trim_end_matches('\0');
            metadata.set(key, text);
        }
    }

    if remaining > 0 {
        mss.ignore_bytes(remaining as u64)?;
    }

    Ok(())
}

pub struct WavReader {
    mss: MediaSourceStream,
    info: FormatInfo,
    tracks: TrackTable,
    metadata: MetadataMap,
    data_start: u64,
    data_end: u64,
    bytes_per_frame: u32,
}

impl FormatReader for WavReader {
    fn try_open(mut mss: MediaSourceStream, _opts: &FormatOptions) -> Result<Self> {
        let marker = mss.read_le_u32()?.to_le_bytes();
        if &marker != b"RIFF" {
            return unsupported_error("wav: missing RIFF marker");
        }

        let riff_len = mss.read_le_u32()?;
        let form = mss.read_le_u32()?.to_le_bytes();
        if form != WAVE_FORM {
            return unsupported_error("wav: riff form is not WAVE");
        }

        let mut consumed = 4u32; // the "WAVE" form tag, counted against riff_len's 4-byte overhead
        let chunk_limit = riff_len.saturating_sub(4);

        let mut codec_params = CodecParameters::new(CodecId::None);
        let mut metadata = MetadataMap::new();
        let mut data_start = None;
        let mut data_len = None;
        let mut bytes_per_frame = 1u32;

        while consumed + 8 <= chunk_limit {
            let tag = mss.read_le_u32()?.to_le_bytes();
            let size = mss.read_le_u32()?;
            consumed += 8;

            match &tag {
                b"fmt " => {
                    let format_tag = mss.read_le_u16()?;
                    let channels = mss.read_le_u16()? as u32;
                    let sample_rate = mss.read_le_u32()?;
                    let _avg_bytes_per_sec = mss.read_le_u32()?;
                    let block_align = mss.read_le_u16()? as u32;
                    let bits_per_sample = mss.read_le_u16()? as u32;

                    bytes_per_frame = block_align.max(1);

                    codec_params = CodecParameters::new(codec_for_format_tag(format_tag));
                    codec_params.codec_tag = Some(format_tag as u32);
                    codec_params.audio = Some(AudioParams {
                        sample_rate,
                        num_channels: channels,
                        bits_per_sample,
                        block_align,
                        ..Default::default()
                    });

                    if size > 16 {
                        mss.ignore_bytes((size - 16) as u64)?;
                    }
                }
                b"LIST" => {
                    read_info_chunk(&mut mss, size, &mut metadata)?;
                }
                b"data" => {
                    data_start = Some(mss.pos());
                    // ffmpeg writes (2^32)-1 for streamed output whose length is unknown ahead of
                    // time; fall back to whatever the source reports as its total length.
                    let len = if size == u32::MAX {
                        mss.byte_len().map(|total| total.saturating_sub(mss.pos())).unwrap_or(0)
                    }
                    else {
                        size as u64
                    };
                    data_len = Some(len);
                    mss.ignore_bytes(len)?;
                }
                _ => {
                    mss.ignore_bytes(size as u64)?;
                }
            }

            if size % 2 == 1 {
                mss.ignore_bytes(1)?;
            }
            consumed = consumed.saturating_add(size).saturating_add(size % 2);
        }

        let Some(data_start) = data_start else {
            return decode_error("wav: no data chunk found");
        };
        let data_len = data_len.unwrap_or(0);

        if codec_params.audio.is_none() {
            return decode_error("wav: no fmt chunk found before data");
        }

        let mut stream = Stream::new(AUDIO_STREAM_ID, StreamKind::Audio, codec_params.clone());
        stream.timescale = codec_params.audio.as_ref().map(|a| a.sample_rate).unwrap_or(1);
        stream.sample_timescale = stream.timescale;
        stream.action = StreamAction::Decode;

        let mut track = Track::new(0);
        track.data_start = data_start;
        track.data_end = Some(data_start + data_len);
        track.add_stream(stream);

        let mut tracks = TrackTable::new();
        tracks.push(track);

        mss.seek(std::io::SeekFrom::Start(data_start))?;

        Ok(WavReader {
            mss,
            info: FormatInfo {
                id: FormatId::new(&FourCc::new(b"WAVE")),
                short_name: "wav",
                long_name: "Waveform Audio File Format",
            },
            tracks,
            metadata,
            data_start,
            data_end: data_start + data_len,
            bytes_per_frame,
        })
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
        let pos = self.mss.pos();
        if pos >= self.data_end {
            let track = self.tracks.current_mut().expect("wav reader always builds exactly one track");
            let stream = track.stream_by_id_mut(AUDIO_STREAM_ID).expect("audio stream must exist");
            stream.mark_eof();
            return Ok(NextPacket::Eof);
        }

        let want = (PCM_BLOCK_FRAMES * self.bytes_per_frame as u64).min(self.data_end - pos);
        let mut buf = vec![0u8; want as usize];
        self.mss.read_buf_exact(&mut buf)?;

        let frame_count = want / self.bytes_per_frame.max(1) as u64;
        let sample_pos = (pos - self.data_start) / self.bytes_per_frame.max(1) as u64;

        let pkt = PacketBuilder::default()
            .stream_id(AUDIO_STREAM_ID)
            .pts(Timestamp::new(sample_pos as i64))
            .dur(demux_core::units::Duration::new(frame_count))
            .data(buf)
            .build();

        Ok(NextPacket::Packet(pkt))
    }

    fn seek(&mut self, to: demux_core::formats::SeekTo) -> Result<demux_core::formats::SeekedTo> {
        let track = self.tracks.current().expect("wav reader always builds exactly one track");
        let stream = track.streams().first().expect("audio stream must exist");
        let timescale = stream.timescale.max(1);

        let target_sample = (to.time.as_secs_f64() * timescale as f64) as u64;
        let byte_off = self.data_start + target_sample * self.bytes_per_frame.max(1) as u64;
        let byte_off = byte_off.min(self.data_end);

        self.mss.seek(std::io::SeekFrom::Start(byte_off))?;

        Ok(demux_core::formats::SeekedTo {
            actual_time: demux_core::units::Time::from(target_sample as f64 / timescale as f64),
            track_id: track.id,
        })
    }

    fn into_inner(self: Box<Self>) -> MediaSourceStream {
        self.mss
    }
}

pub fn try_new(mss: MediaSourceStream, opts: &FormatOptions) -> Result<Box<dyn FormatReader>> {
    Ok(Box::new(WavReader::try_open(mss, opts)?))
}

pub fn probe_wav() -> Descriptor {
    Descriptor {
        name: "wav",
        tier: Tier::Preferred,
        // The RIFF form tag ("WAVE") at offset 8 disambiguates this from other RIFF-family
        // formats (AVI, etc.) that share the same "RIFF" marker at offset 0.
        spec: ProbeDataMatchSpec { markers: &[b"WAVE"], offset: 8, anchored: true },
        factory: try_new,
    }
}
