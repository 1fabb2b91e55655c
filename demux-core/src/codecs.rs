//! Per-stream compression info: the codec identity and decoder-setup metadata a demuxer hands
//! off to a (not-implemented-here) decoder.

use bitflags::bitflags;

/// The codec carried by a stream. `Extended` covers anything identified only by a container-level
/// fourcc that this workspace does not special-case.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CodecId {
    None,
    Extended,
    Pcm,
    Png,
    Jpeg,
    Mpeg1,
    Mpeg2,
    Mpeg4Asp,
    H264,
    Theora,
    Dirac,
    Dv,
    Vp8,
    Div3,
    Aac,
    Ac3,
    Dts,
    Mp2,
    Mp3,
    ALaw,
    ULaw,
    Vorbis,
    Opus,
    Speex,
    Flac,
    Tiff,
    Tga,
    DvdSub,
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct CodecFlags: u32 {
        const HAS_B_FRAMES      = 1 << 0;
        const HAS_P_FRAMES      = 1 << 1;
        const HAS_FIELD_PICTURES = 1 << 2;
        const HAS_SBR           = 1 << 3;
    }
}

/// Channel layout, kept deliberately coarse (count + a handful of well-known layouts) since
/// full SMPTE channel-position tables are outside this workspace's scope.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ChannelLayout {
    #[default]
    Unknown,
    Mono,
    Stereo,
    Surround51,
}

#[derive(Clone, Debug, Default)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub num_channels: u32,
    pub bits_per_sample: u32,
    pub block_align: u32,
    pub channel_layout: ChannelLayout,
    /// Samples to discard from the start of the decoded stream (codec delay / preroll).
    pub pre_skip: u32,
    /// Number of samples that must be accumulated before a seek is considered resynchronized.
    pub sync_samples: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum FramerateMode {
    #[default]
    Constant,
    Variable,
    Still,
}

#[derive(Clone, Debug, Default)]
pub struct VideoParams {
    pub image_width: u32,
    pub image_height: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Ticks of the video timebase per frame, for `FramerateMode::Constant` streams.
    pub frame_duration: u64,
    pub framerate_mode: FramerateMode,
    pub interlaced: bool,
    pub pixelformat: Option<&'static str>,
    pub palette: Option<Box<[u8]>>,
}

#[derive(Clone, Debug, Default)]
pub struct SubtitleParams {
    pub charset: Option<String>,
}

/// Per-stream compression parameters and codec-setup metadata.
#[derive(Clone, Debug)]
pub struct CodecParameters {
    pub id: CodecId,
    /// The container-level fourcc, populated when `id == CodecId::Extended`.
    pub codec_tag: Option<u32>,
    /// Codec-specific setup bytes (SPS/PPS, Vorbis setup triplet, WAVEFORMATEX tail, …).
    pub codec_header: Option<Box<[u8]>>,
    pub bitrate: Option<u32>,
    pub video_buffer_size: Option<u32>,
    pub flags: CodecFlags,
    pub audio: Option<AudioParams>,
    pub video: Option<VideoParams>,
    pub subtitle: Option<SubtitleParams>,
}

impl CodecParameters {
    pub fn new(id: CodecId) -> Self {
        CodecParameters {
            id,
            codec_tag: None,
            codec_header: None,
            bitrate: None,
            video_buffer_size: None,
            flags: CodecFlags::empty(),
            audio: None,
            video: None,
            subtitle: None,
        }
    }

    pub fn with_audio(mut self, audio: AudioParams) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_video(mut self, video: VideoParams) -> Self {
        self.video = Some(video);
        self
    }

    pub fn with_codec_header(mut self, header: impl Into<Box<[u8]>>) -> Self {
        self.codec_header = Some(header.into());
        self
    }
}
