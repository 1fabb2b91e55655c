//! AVI (`RIFF....AVI `) reader: walks `hdrl`/`strl`/`movi`/`idx1`, builds one track per `strl`, and
//! demuxes `movi` data chunks keyed by their two-digit stream-index prefix (`00dc`, `01wb`, ...).
//!
//! Grounded on `examples/GodlessVVanderer-SLAIN/slain-core/src/avi_demux.rs` for the AVI chunk
//! layout (`avih`/`strh`/`strf`/`idx1` field order, stream/codec fourcc tables) and on this
//! workspace's own `demux-core::seek` bisection engine for the index-less seek path: a 30 s
//! MPEG-4 AVI with no `idx1`, seekable only by iterative byte bisection.

use demux_codec_mpeg4::Mpeg4Parser;
use demux_core::codecs::{AudioParams, CodecId, CodecParameters, VideoParams};
use demux_core::error::{decode_error, unsupported_error, Result};
use demux_core::formats::probe::{Descriptor, ProbeDataMatchSpec, Tier};
use demux_core::formats::stream::{Stream, StreamAction, StreamFlags, StreamKind};
use demux_core::formats::track::{Track, TrackTable};
use demux_core::formats::{FormatId, FormatInfo, FormatOptions, FormatReader, NextPacket, SeekTo, SeekedTo};
use demux_core::fourcc::FourCc;
use demux_core::io::{MediaSourceStream, ReadBytes};
use demux_core::metadata::MetadataMap;
use demux_core::parser::{ParserMode, ParserSink};
use demux_core::units::{Time, Timestamp};

use crate::wav::codec_for_format_tag;

const AVI_FORM: [u8; 4] = *b"AVI ";

fn tag4(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

fn video_codec_for_fourcc(fourcc: &[u8; 4]) -> CodecId {
    match fourcc {
        b"XVID" | b"DIVX" | b"DX50" | b"FMP4" | b"mp4v" => CodecId::Mpeg4Asp,
        b"H264" | b"AVC1" | b"avc1" | b"X264" | b"x264" => CodecId::H264,
        b"MJPG" | b"mjpg" => CodecId::Jpeg,
        b"DIV3" | b"div3" => CodecId::Div3,
        _ => CodecId::Extended,
    }
}

#[derive(Clone, Copy)]
struct StreamMeta {
    stream_id: u32,
    kind: StreamKind,
    rate: u32,
    scale: u32,
}

struct ParsedStrl {
    meta: StreamMeta,
    codec_params: CodecParameters,
}

struct IndexEntry {
    stream_id: u32,
    offset: u64,
    keyframe: bool,
}

pub struct AviReader {
    mss: MediaSourceStream,
    info: FormatInfo,
    tracks: TrackTable,
    metadata: MetadataMap,
    stream_meta: Vec<StreamMeta>,
    movi_start: u64,
    movi_end: u64,
    index: Vec<IndexEntry>,
    frame_counts: Vec<u64>,
}

impl AviReader {
    fn stream_meta(&self, stream_id: u32) -> Option<StreamMeta> {
        self.stream_meta.iter().copied().find(|m| m.stream_id == stream_id)
    }

    /// Reads one `movi` data chunk at the current position and routes it to its stream. Returns
    /// `Ok(None)` once the `movi` list is exhausted.
    fn read_next_chunk(&mut self) -> Result<Option<(u32, Vec<u8>)>> {
        loop {
            let pos = self.mss.pos();
            if pos + 8 > self.movi_end {
                return Ok(None);
            }

            let tag = tag4(self.mss.read_le_u32()?);
            let size = self.mss.read_le_u32()?;

            if &tag == b"LIST" {
                // `rec ` sublists interleave multiple streams' chunks; their contents are plain
                // data chunks, so just step over the 4-byte list-type tag and keep reading.
                self.mss.ignore_bytes(4)?;
                continue;
            }

            if tag[0].is_ascii_digit() && tag[1].is_ascii_digit() {
                let stream_id = (tag[0] - b'0') as u32 * 10 + (tag[1] - b'0') as u32;
                let mut data = vec![0u8; size as usize];
                self.mss.read_buf_exact(&mut data)?;
                if size % 2 == 1 {
                    self.mss.ignore_bytes(1)?;
                }
                return Ok(Some((stream_id, data)));
            }

            self.mss.ignore_bytes(size as u64 + size as u64 % 2)?;
        }
    }
}

impl FormatReader for AviReader {
    fn try_open(mut mss: MediaSourceStream, _opts: &FormatOptions) -> Result<Self> {
        let marker = tag4(mss.read_le_u32()?);
        if &marker != b"RIFF" {
            return unsupported_error("avi: missing RIFF marker");
        }
        let riff_len = mss.read_le_u32()?;
        let form = tag4(mss.read_le_u32()?);
        if form != AVI_FORM {
            return unsupported_error("avi: riff form is not AVI");
        }

        let file_end = mss.pos() + riff_len.saturating_sub(4) as u64;

        let mut parsed_streams: Vec<ParsedStrl> = Vec::new();
        let mut movi_start = 0u64;
        let mut movi_end = 0u64;
        let mut index = Vec::new();

        while mss.pos() + 8 <= file_end {
            let tag = tag4(mss.read_le_u32()?);
            let size = mss.read_le_u32()?;
            let chunk_end = mss.pos() + size as u64;

            match &tag {
                b"LIST" => {
                    let list_type = tag4(mss.read_le_u32()?);

                    match &list_type {
                        b"hdrl" => {
                            parse_hdrl(&mut mss, chunk_end, &mut parsed_streams)?;
                        }
                        b"movi" => {
                            movi_start = mss.pos();
                            movi_end = chunk_end;
                        }
                        _ => {}
                    }

                    mss.seek(std::io::SeekFrom::Start(chunk_end))?;
                }
                b"idx1" => {
                    let entries = size / 16;
                    for _ in 0..entries {
                        let chunk_id = tag4(mss.read_le_u32()?);
                        let flags = mss.read_le_u32()?;
                        let offset = mss.read_le_u32()?;
                        let _chunk_size = mss.read_le_u32()?;

                        if chunk_id[0].is_ascii_digit() && chunk_id[1].is_ascii_digit() {
                            let stream_id =
                                (chunk_id[0] - b'0') as u32 * 10 + (chunk_id[1] - b'0') as u32;
                            index.push(IndexEntry {
                                stream_id,
                                offset: offset as u64,
                                keyframe: flags & 0x10 != 0,
                            });
                        }
                    }
                }
                _ => {
                    mss.ignore_bytes(size as u64)?;
                }
            }

            if size % 2 == 1 {
                mss.ignore_bytes(1)?;
            }
        }

        if movi_start == 0 {
            return decode_error("avi: no movi list found");
        }
        if parsed_streams.is_empty() {
            return decode_error("avi: no strl streams found");
        }

        // `idx1` offsets are conventionally relative to the start of `movi`'s payload (the byte
        // right after the `movi` list-type tag). Detect the rarer absolute-offset convention by
        // checking whether the first entry, taken as movi-relative, lands inside `movi` at all.
        let index_is_movi_relative =
            index.first().map_or(true, |e| movi_start + e.offset + 8 <= movi_end);
        if !index_is_movi_relative {
            for e in &mut index {
                e.offset = e.offset.saturating_sub(movi_start);
            }
        }

        let mut tracks = TrackTable::new();
        let mut stream_meta = Vec::with_capacity(parsed_streams.len());

        for (track_id, parsed) in parsed_streams.into_iter().enumerate() {
            stream_meta.push(parsed.meta);

            let mut stream = Stream::new(parsed.meta.stream_id, parsed.meta.kind, parsed.codec_params.clone());
            stream.timescale = parsed.meta.rate.max(1);
            stream.sample_timescale = stream.timescale;
            stream.action = StreamAction::Parse;

            if parsed.meta.kind == StreamKind::Video && parsed.codec_params.id == CodecId::Mpeg4Asp {
                stream.set_parser(ParserSink::new(
                    ParserMode::Frame,
                    Box::new(Mpeg4Parser::new()),
                    stream.stream_id,
                ));
            }

            let mut track = Track::new(track_id as u32);
            track.data_start = movi_start;
            track.data_end = Some(movi_end);
            track.add_stream(stream);
            tracks.push(track);
        }

        let frame_counts = vec![0u64; stream_meta.len()];

        mss.seek(std::io::SeekFrom::Start(movi_start))?;

        Ok(AviReader {
            mss,
            info: FormatInfo {
                id: FormatId::new(&FourCc::new(b"AVI ")),
                short_name: "avi",
                long_name: "Audio Video Interleave",
            },
            tracks,
            metadata: MetadataMap::new(),
            stream_meta,
            movi_start,
            movi_end,
            index,
            frame_counts,
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
        loop {
            for track in self.tracks.all_mut() {
                for stream in track.streams_mut() {
                    if let Some(pkt) = stream.pop_buffered() {
                        return Ok(NextPacket::Packet(pkt));
                    }
                }
            }

            let Some((stream_id, data)) = self.read_next_chunk()? else {
                for track in self.tracks.all_mut() {
                    for stream in track.streams_mut() {
                        stream.mark_eof();
                    }
                }
                return Ok(NextPacket::Eof);
            };

            let Some(meta) = self.stream_meta(stream_id) else { continue };
            let frame_num = self.frame_counts[stream_id as usize];
            self.frame_counts[stream_id as usize] += 1;

            let pts = if meta.scale > 0 {
                Timestamp::new((frame_num * meta.scale as u64) as i64)
            }
            else {
                Timestamp::UNDEFINED
            };

            let pos = self.mss.pos();
            let track = self
                .tracks
                .all_mut()
                .iter_mut()
                .find(|t| t.stream_by_id(stream_id).is_some())
                .expect("stream_meta only lists streams that were added to a track");
            let stream = track.stream_by_id_mut(stream_id).expect("checked above");
            stream.push_raw(&data, pts, Some(pos))?;
        }
    }

    fn seek(&mut self, to: SeekTo) -> Result<SeekedTo> {
        if self.index.is_empty() {
            return demux_core::error::unsupported_error("avi: no idx1 index to seek with");
        }

        let track_id = to.track_id.unwrap_or_else(|| {
            self.stream_meta.iter().find(|m| m.kind == StreamKind::Video).map(|m| m.stream_id).unwrap_or(0)
        });
        let meta = self
            .stream_meta(track_id)
            .ok_or_else(|| demux_core::error::Error::Decode(format!("avi: no such stream {track_id}")))?;

        let target_ticks = (to.time.as_secs_f64() * meta.rate.max(1) as f64) as u64;
        let target_frame = if meta.scale > 0 { target_ticks / meta.scale as u64 } else { 0 };

        let mut best_chunk_index = 0usize;
        let mut best_frame = 0u64;
        let mut frame_count = 0u64;
        for (i, entry) in self.index.iter().enumerate() {
            if entry.stream_id != track_id {
                continue;
            }
            if entry.keyframe && frame_count <= target_frame {
                best_chunk_index = i;
                best_frame = frame_count;
            }
            frame_count += 1;
        }

        let entry_offset = self.index[best_chunk_index].offset;
        self.mss.seek(std::io::SeekFrom::Start(self.movi_start + entry_offset))?;

        for track in self.tracks.all_mut() {
            for stream in track.streams_mut() {
                stream.clear();
            }
        }
        for (i, fc) in self.frame_counts.iter_mut().enumerate() {
            *fc = if i as u32 == track_id { best_frame } else { 0 };
        }

        let actual_time = if meta.rate > 0 {
            Time::from(best_frame as f64 * meta.scale as f64 / meta.rate as f64)
        }
        else {
            Time::from(0.0)
        };

        Ok(SeekedTo { actual_time, track_id })
    }

    fn post_seek_resync(&mut self) -> Result<()> {
        // After a byte-fraction seek (bisection strategy) the cursor is almost certainly mid-chunk;
        // scan forward for the next recognizable `##xx` data-chunk tag and resume from there, since
        // AVI carries no byte-level resync marker of its own.
        let mut window = [0u8; 8];
        loop {
            let pos = self.mss.pos();
            if pos + 8 > self.movi_end {
                return demux_core::error::end_of_stream_error();
            }
            let n = self.mss.peek_buf(&mut window)?;
            if n < 8 {
                return demux_core::error::end_of_stream_error();
            }

            if window[0].is_ascii_digit()
                && window[1].is_ascii_digit()
                && (&window[2..4] == b"dc" || &window[2..4] == b"db" || &window[2..4] == b"wb")
            {
                let stream_id = (window[0] - b'0') as u32 * 10 + (window[1] - b'0') as u32;
                if self.stream_meta(stream_id).is_some() {
                    break;
                }
            }

            self.mss.ignore_bytes(1)?;
        }

        for track in self.tracks.all_mut() {
            for stream in track.streams_mut() {
                stream.clear();
                stream.flags |= StreamFlags::DISCONT;
            }
        }

        Ok(())
    }

    fn supports_bisection_seek(&self) -> bool {
        self.index.is_empty()
    }

    fn seek_byte_fraction(&mut self, fraction: f64) -> Result<()> {
        let fraction = fraction.clamp(0.0, 1.0);
        let span = self.movi_end.saturating_sub(self.movi_start);
        let target = self.movi_start + (span as f64 * fraction) as u64;
        self.mss.seek(std::io::SeekFrom::Start(target.min(self.movi_end)))?;
        Ok(())
    }

    fn into_inner(self: Box<Self>) -> MediaSourceStream {
        self.mss
    }
}

fn parse_hdrl(mss: &mut MediaSourceStream, hdrl_end: u64, streams: &mut Vec<ParsedStrl>) -> Result<()> {
    while mss.pos() + 8 <= hdrl_end {
        let tag = tag4(mss.read_le_u32()?);
        let size = mss.read_le_u32()?;
        let chunk_end = mss.pos() + size as u64;

        match &tag {
            b"avih" => {
                mss.seek(std::io::SeekFrom::Start(chunk_end))?;
            }
            b"LIST" => {
                let list_type = tag4(mss.read_le_u32()?);
                if &list_type == b"strl" {
                    streams.push(parse_strl(mss, chunk_end, streams.len() as u32)?);
                }
                mss.seek(std::io::SeekFrom::Start(chunk_end))?;
            }
            _ => {
                mss.seek(std::io::SeekFrom::Start(chunk_end))?;
            }
        }

        if size % 2 == 1 {
            mss.ignore_bytes(1)?;
        }
    }

    Ok(())
}

fn parse_strl(mss: &mut MediaSourceStream, list_end: u64, stream_index: u32) -> Result<ParsedStrl> {
    let mut kind = StreamKind::Video;
    let mut rate = 0u32;
    let mut scale = 0u32;
    let mut video_fourcc = *b"\0\0\0\0";
    let mut audio_format_tag = 0u16;
    let mut sample_rate = 0u32;
    let mut channels = 0u32;
    let mut bits_per_sample = 0u32;
    let mut width = 0u32;
    let mut height = 0u32;

    while mss.pos() + 8 <= list_end {
        let tag = tag4(mss.read_le_u32()?);
        let size = mss.read_le_u32()?;
        let chunk_end = mss.pos() + size as u64;

        match &tag {
            b"strh" => {
                let fcc_type = tag4(mss.read_le_u32()?);
                video_fourcc = tag4(mss.read_le_u32()?); // fcc_handler; overwritten by strf if present
                kind = match &fcc_type {
                    b"vids" => StreamKind::Video,
                    b"auds" => StreamKind::Audio,
                    b"txts" => StreamKind::Text,
                    _ => StreamKind::Video,
                };
                let _flags = mss.read_le_u32()?;
                let _priority_language = mss.read_le_u32()?;
                let _initial_frames = mss.read_le_u32()?;
                scale = mss.read_le_u32()?;
                rate = mss.read_le_u32()?;
            }
            b"strf" => match kind {
                StreamKind::Video => {
                    let _bih_size = mss.read_le_u32()?;
                    width = mss.read_le_u32()?;
                    height = (mss.read_le_u32()? as i32).unsigned_abs();
                    let _planes = mss.read_le_u16()?;
                    let _bit_count = mss.read_le_u16()?;
                    let compression = mss.read_le_u32()?;
                    if compression != 0 {
                        video_fourcc = tag4(compression);
                    }
                }
                StreamKind::Audio => {
                    audio_format_tag = mss.read_le_u16()?;
                    channels = mss.read_le_u16()? as u32;
                    sample_rate = mss.read_le_u32()?;
                    let _avg_bytes_per_sec = mss.read_le_u32()?;
                    let _block_align = mss.read_le_u16()?;
                    bits_per_sample = mss.read_le_u16()? as u32;
                }
                _ => {}
            },
            _ => {}
        }

        mss.seek(std::io::SeekFrom::Start(chunk_end))?;
        if size % 2 == 1 {
            mss.ignore_bytes(1)?;
        }
    }

    let codec_params = match kind {
        StreamKind::Video => {
            let mut cp = CodecParameters::new(video_codec_for_fourcc(&video_fourcc));
            cp.video = Some(VideoParams {
                image_width: width,
                image_height: height,
                frame_width: width,
                frame_height: height,
                pixel_width: 1,
                pixel_height: 1,
                frame_duration: scale as u64,
                ..Default::default()
            });
            cp
        }
        StreamKind::Audio => {
            let mut cp = CodecParameters::new(codec_for_format_tag(audio_format_tag));
            cp.audio = Some(AudioParams { sample_rate, num_channels: channels, bits_per_sample, ..Default::default() });
            cp
        }
        _ => CodecParameters::new(CodecId::None),
    };

    Ok(ParsedStrl { meta: StreamMeta { stream_id: stream_index, kind, rate, scale }, codec_params })
}

pub fn try_new(mss: MediaSourceStream, opts: &FormatOptions) -> Result<Box<dyn FormatReader>> {
    Ok(Box::new(AviReader::try_open(mss, opts)?))
}

pub fn probe_avi() -> Descriptor {
    Descriptor {
        name: "avi",
        tier: Tier::Preferred,
        // The RIFF form tag ("AVI ") at offset 8 disambiguates this from WAVE, which shares the
        // same "RIFF" marker at offset 0.
        spec: ProbeDataMatchSpec { markers: &[b"AVI "], offset: 8, anchored: true },
        factory: try_new,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunk(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(tag);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn list(list_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut inner = Vec::new();
        inner.extend_from_slice(list_type);
        inner.extend_from_slice(body);
        chunk(b"LIST", &inner)
    }

    fn build_strh(fcc_type: &[u8; 4], fcc_handler: &[u8; 4], scale: u32, rate: u32) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(fcc_type);
        body.extend_from_slice(fcc_handler);
        body.extend_from_slice(&0u32.to_le_bytes()); // flags
        body.extend_from_slice(&0u32.to_le_bytes()); // priority+language
        body.extend_from_slice(&0u32.to_le_bytes()); // initial_frames
        body.extend_from_slice(&scale.to_le_bytes());
        body.extend_from_slice(&rate.to_le_bytes());
        body
    }

    fn build_strf_video(width: u32, height: u32, compression: &[u8; 4]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&40u32.to_le_bytes()); // bih size
        body.extend_from_slice(&width.to_le_bytes());
        body.extend_from_slice(&height.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes()); // planes
        body.extend_from_slice(&24u16.to_le_bytes()); // bit count
        body.extend_from_slice(compression);
        body.extend_from_slice(&[0u8; 20]); // remaining BITMAPINFOHEADER fields
        body
    }

    fn build_avi(n_frames: u32, with_index: bool) -> Vec<u8> {
        let strl = list(
            b"strl",
            &[
                chunk(b"strh", &build_strh(b"vids", b"XVID", 1, 25)),
                chunk(b"strf", &build_strf_video(320, 240, b"XVID")),
            ]
            .concat(),
        );

        let hdrl_body = [
            chunk(
                b"avih",
                &{
                    let mut b = Vec::new();
                    b.extend_from_slice(&40_000u32.to_le_bytes()); // microsec_per_frame
                    b.extend_from_slice(&0u32.to_le_bytes());
                    b.extend_from_slice(&0u32.to_le_bytes());
                    b.extend_from_slice(&0u32.to_le_bytes());
                    b.extend_from_slice(&n_frames.to_le_bytes());
                    b.extend_from_slice(&[0u8; 20]);
                    b
                },
            ),
            strl,
        ]
        .concat();
        let hdrl = list(b"hdrl", &hdrl_body);

        let mut movi_body = Vec::new();
        movi_body.extend_from_slice(b"movi");
        let mut frame_offsets = Vec::new();
        for i in 0..n_frames {
            frame_offsets.push(movi_body.len() as u32 - 4); // relative to movi payload start
            let frame = chunk(b"00dc", &vec![i as u8; 10]);
            movi_body.extend_from_slice(&frame);
        }
        let movi = chunk(b"LIST", &movi_body);

        let mut riff_body = Vec::new();
        riff_body.extend_from_slice(b"AVI ");
        riff_body.extend_from_slice(&hdrl);
        riff_body.extend_from_slice(&movi);

        if with_index {
            let mut idx_body = Vec::new();
            for &off in &frame_offsets {
                idx_body.extend_from_slice(b"00dc");
                idx_body.extend_from_slice(&0x10u32.to_le_bytes()); // AVIIF_KEYFRAME
                idx_body.extend_from_slice(&off.to_le_bytes());
                idx_body.extend_from_slice(&10u32.to_le_bytes());
            }
            riff_body.extend_from_slice(&chunk(b"idx1", &idx_body));
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(riff_body.len() as u32).to_le_bytes());
        out.extend_from_slice(&riff_body);
        out
    }

    #[test]
    fn verify_opens_and_reads_video_stream() {
        let data = build_avi(5, false);
        let mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        let reader = AviReader::try_open(mss, &FormatOptions::default()).unwrap();

        assert_eq!(reader.tracks().len(), 1);
        let stream = &reader.tracks().current().unwrap().streams()[0];
        assert_eq!(stream.kind, StreamKind::Video);
        assert_eq!(stream.codec_params.id, CodecId::Mpeg4Asp);
    }

    #[test]
    fn verify_reads_frames_sequentially() {
        let data = build_avi(5, false);
        let mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        let mut reader = AviReader::try_open(mss, &FormatOptions::default()).unwrap();

        let mut count = 0;
        loop {
            match reader.next_packet().unwrap() {
                NextPacket::Packet(_) => count += 1,
                NextPacket::Eof => break,
                NextPacket::Again => continue,
            }
        }
        assert_eq!(count, 5);
    }

    #[test]
    fn verify_seeks_via_idx1() {
        let data = build_avi(10, true);
        let mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        let mut reader = AviReader::try_open(mss, &FormatOptions::default()).unwrap();

        assert!(!reader.supports_bisection_seek());

        let seeked = reader
            .seek(SeekTo { time: Time::from(0.16), track_id: None, accurate: false })
            .unwrap();
        assert_eq!(seeked.track_id, 0);
    }

    #[test]
    fn verify_supports_bisection_seek_without_index() {
        let data = build_avi(5, false);
        let mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        let reader = AviReader::try_open(mss, &FormatOptions::default()).unwrap();
        assert!(reader.supports_bisection_seek());
    }
}
