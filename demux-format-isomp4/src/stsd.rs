//! Sample description (`stsd`): the single sample entry this workspace supports per track (`avc1`
//! for H.264 video, `mp4a` for AAC/MP3 audio), turned into this workspace's `CodecParameters`.
//!
//! Grounded on symphonia's `stsd.rs` for the sample-entry byte layout (base `SampleEntry` fields
//! followed by nested codec-setup atoms), but targets this workspace's flat `CodecParameters`
//! model instead of symphonia's `Audio`/`Video`/`Subtitle` enum-of-structs.

use demux_core::codecs::{AudioParams, ChannelLayout, CodecId, CodecParameters, FramerateMode, VideoParams};
use demux_core::error::{decode_error, unsupported_error, Result};
use demux_core::fourcc::FourCc;
use demux_core::io::{MediaSourceStream, ReadBytes};

use crate::atom::{AtomHeader, AtomIterator};
use crate::descriptors;

pub struct SampleEntryResult {
    pub codec_params: CodecParameters,
    /// NAL length field size from `avcC`, needed to wire up `AvccToAnnexBFilter`.
    pub h264_nal_length_size: Option<u8>,
}

fn channel_layout_for(num_channels: u32) -> ChannelLayout {
    match num_channels {
        1 => ChannelLayout::Mono,
        2 => ChannelLayout::Stereo,
        6 => ChannelLayout::Surround51,
        _ => ChannelLayout::Unknown,
    }
}

fn read_visual_sample_entry(mss: &mut MediaSourceStream, header: AtomHeader) -> Result<SampleEntryResult> {
    mss.ignore_bytes(6)?; // reserved
    let _data_reference_index = mss.read_be_u16()?;
    mss.ignore_bytes(16)?; // pre-defined / reserved
    let width = mss.read_be_u16()?;
    let height = mss.read_be_u16()?;
    mss.ignore_bytes(4)?; // horizontal resolution (fixed-point)
    mss.ignore_bytes(4)?; // vertical resolution (fixed-point)
    mss.ignore_bytes(4)?; // reserved
    let _frame_count = mss.read_be_u16()?;
    mss.ignore_bytes(32)?; // compressor name (pascal string, padded to 32 bytes)
    let _depth = mss.read_be_u16()?;
    mss.ignore_bytes(2)?; // pre-defined

    let video = VideoParams {
        image_width: u32::from(width),
        image_height: u32::from(height),
        frame_width: u32::from(width),
        frame_height: u32::from(height),
        pixel_width: 1,
        pixel_height: 1,
        frame_duration: 0,
        framerate_mode: FramerateMode::Constant,
        interlaced: false,
        pixelformat: None,
        palette: None,
    };

    let mut codec_id = CodecId::None;
    let mut codec_header = None;
    let mut h264_nal_length_size = None;

    let Some(content_end) = header.end else {
        return decode_error("isomp4 (stsd): visual sample entry has unknown size");
    };

    let mut iter = AtomIterator::new(mss, Some(content_end));
    while let Some(sub_header) = iter.next()? {
        if sub_header.atom_type == FourCc::new(b"avcC") {
            let len = sub_header.content_len().unwrap_or(0) as usize;
            let bytes = iter.mss().read_boxed_slice_exact(len)?;
            let parsed = descriptors::parse_avcc(&bytes)?;
            codec_id = CodecId::H264;
            h264_nal_length_size = Some(parsed.nal_length_size);
            codec_header = Some(bytes);
        }
    }
    let mut codec_params = CodecParameters::new(codec_id).with_video(video);
    if let Some(header_bytes) = codec_header {
        codec_params = codec_params.with_codec_header(header_bytes);
    }

    Ok(SampleEntryResult { codec_params, h264_nal_length_size })
}

fn read_audio_sample_entry(mss: &mut MediaSourceStream, header: AtomHeader) -> Result<SampleEntryResult> {
    mss.ignore_bytes(6)?; // reserved
    let _data_reference_index = mss.read_be_u16()?;
    let version = mss.read_be_u16()?;
    mss.ignore_bytes(6)?; // revision + vendor
    let num_channels = u32::from(mss.read_be_u16()?);
    let sample_size = u32::from(mss.read_be_u16()?);
    mss.ignore_bytes(4)?; // compression ID + packet size
    let sample_rate_fixed = mss.read_be_u32()?;
    let sample_rate = sample_rate_fixed >> 16;

    match version {
        1 => mss.ignore_bytes(16)?, // samples/packet, bytes/packet, bytes/frame, bytes/sample
        2 => mss.ignore_bytes(20)?, // sizeOfStructOnly + v2-specific fields
        _ => {}
    }

    let audio = AudioParams {
        sample_rate,
        num_channels,
        bits_per_sample: sample_size,
        block_align: 0,
        channel_layout: channel_layout_for(num_channels),
        pre_skip: 0,
        sync_samples: 0,
    };

    let mut codec_id = CodecId::None;
    let mut codec_header = None;

    let Some(content_end) = header.end else {
        return decode_error("isomp4 (stsd): audio sample entry has unknown size");
    };

    let mut iter = AtomIterator::new(mss, Some(content_end));
    while let Some(sub_header) = iter.next()? {
        if sub_header.atom_type == FourCc::new(b"esds") {
            let _version_flags = iter.mss().read_be_u32()?;
            let len = sub_header.content_len().unwrap_or(0).saturating_sub(4) as usize;
            let bytes = iter.mss().read_boxed_slice_exact(len)?;
            let es = descriptors::parse_es_descriptor(&bytes)?;
            if let Some(id) = descriptors::audio_codec_from_object_type(es.object_type_indication) {
                codec_id = id;
            }
            codec_header = es.dec_specific_info;
        }
    }

    if header.atom_type == FourCc::new(b"mp3 ") || header.atom_type == FourCc::new(b".mp3") {
        codec_id = CodecId::Mp3;
    }

    let mut codec_params = CodecParameters::new(codec_id).with_audio(audio);
    if let Some(header_bytes) = codec_header {
        codec_params = codec_params.with_codec_header(header_bytes);
    }

    Ok(SampleEntryResult { codec_params, h264_nal_length_size: None })
}

/// Reads the `stsd` atom's content (version/flags already consumed by the caller is NOT assumed:
/// this function consumes them itself, matching the other `stXX` readers in this crate).
pub fn read_stsd(mss: &mut MediaSourceStream, _header: AtomHeader) -> Result<SampleEntryResult> {
    let _version_flags = mss.read_be_u32()?;
    let entry_count = mss.read_be_u32()?;
    if entry_count == 0 {
        return decode_error("isomp4 (stsd): missing sample entry");
    }
    if entry_count > 1 {
        return unsupported_error("isomp4 (stsd): more than one sample entry is not supported");
    }

    let entry_header = AtomHeader::read(mss)?;

    let is_video =
        entry_header.atom_type == FourCc::new(b"avc1") || entry_header.atom_type == FourCc::new(b"avc2");

    if is_video {
        read_visual_sample_entry(mss, entry_header)
    }
    else {
        read_audio_sample_entry(mss, entry_header)
    }
}
