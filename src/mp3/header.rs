use crate::common::{ChannelCount, SampleRate};

/// Length of an MPEG audio frame header.
pub const HEADER_LEN: usize = 4;

/// Largest frame any valid header can describe: MPEG-2.5 layer II at 160 kbps and 8 kHz with
/// padding.
pub const MAX_FRAME_SIZE: usize = 2881;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layer {
    I,
    II,
    III,
}

// Bitrates in kbps for bitrate indices 1..=14.
const BITRATES_V1_L1: [u32; 14] = [
    32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448,
];
const BITRATES_V1_L2: [u32; 14] = [
    32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384,
];
const BITRATES_V1_L3: [u32; 14] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const BITRATES_V2_L1: [u32; 14] = [
    32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256,
];
const BITRATES_V2_L23: [u32; 14] = [8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

const SAMPLE_RATES_V1: [u32; 3] = [44100, 48000, 32000];
const SAMPLE_RATES_V2: [u32; 3] = [22050, 24000, 16000];
const SAMPLE_RATES_V25: [u32; 3] = [11025, 12000, 8000];

/// A decoded MPEG audio frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: Layer,
    /// Bits per second.
    pub bitrate: u32,
    pub sample_rate: SampleRate,
    pub padding: bool,
    pub channels: ChannelCount,
    /// Whole frame size in bytes, header included.
    pub frame_size: usize,
    /// Samples per channel decoded from this frame.
    pub samples_per_frame: usize,
}

impl FrameHeader {
    /// Parses the four header bytes, returning `None` for anything that is not a valid frame
    /// header (including free-format frames).
    pub fn parse(bytes: [u8; HEADER_LEN]) -> Option<Self> {
        if !has_sync(bytes[0], bytes[1]) {
            return None;
        }

        let version = match (bytes[1] >> 3) & 0x03 {
            0 => MpegVersion::Mpeg25,
            2 => MpegVersion::Mpeg2,
            3 => MpegVersion::Mpeg1,
            _ => return None,
        };
        let layer = match (bytes[1] >> 1) & 0x03 {
            1 => Layer::III,
            2 => Layer::II,
            3 => Layer::I,
            _ => return None,
        };

        let bitrate_index = (bytes[2] >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }
        let sample_rate_index = ((bytes[2] >> 2) & 0x03) as usize;
        if sample_rate_index == 3 {
            return None;
        }

        let bitrate = bitrate_table(version, layer)[bitrate_index - 1] * 1000;
        let sample_rate = match version {
            MpegVersion::Mpeg1 => SAMPLE_RATES_V1,
            MpegVersion::Mpeg2 => SAMPLE_RATES_V2,
            MpegVersion::Mpeg25 => SAMPLE_RATES_V25,
        }[sample_rate_index];
        let padding = (bytes[2] >> 1) & 0x01 == 1;
        let channels = if bytes[3] >> 6 == 3 { 1 } else { 2 };

        Some(FrameHeader {
            version,
            layer,
            bitrate,
            sample_rate,
            padding,
            channels,
            frame_size: frame_size(version, layer, bitrate, sample_rate, padding),
            samples_per_frame: samples_per_frame(version, layer),
        })
    }

    /// Length of the layer III side information following the header.
    pub fn side_info_len(&self) -> usize {
        match (self.version, self.channels) {
            (MpegVersion::Mpeg1, 1) => 17,
            (MpegVersion::Mpeg1, _) => 32,
            (_, 1) => 9,
            _ => 17,
        }
    }
}

/// Checks the 11 frame sync bits.
#[inline]
pub fn has_sync(first: u8, second: u8) -> bool {
    first == 0xFF && second & 0xE0 == 0xE0
}

fn bitrate_table(version: MpegVersion, layer: Layer) -> &'static [u32; 14] {
    match (version, layer) {
        (MpegVersion::Mpeg1, Layer::I) => &BITRATES_V1_L1,
        (MpegVersion::Mpeg1, Layer::II) => &BITRATES_V1_L2,
        (MpegVersion::Mpeg1, Layer::III) => &BITRATES_V1_L3,
        (_, Layer::I) => &BITRATES_V2_L1,
        _ => &BITRATES_V2_L23,
    }
}

fn frame_size(
    version: MpegVersion,
    layer: Layer,
    bitrate: u32,
    sample_rate: u32,
    padding: bool,
) -> usize {
    let padding = padding as usize;
    let (bitrate, sample_rate) = (bitrate as usize, sample_rate as usize);

    match (version, layer) {
        (_, Layer::I) => (12 * bitrate / sample_rate + padding) * 4,
        (MpegVersion::Mpeg1, _) | (_, Layer::II) => 144 * bitrate / sample_rate + padding,
        _ => 72 * bitrate / sample_rate + padding,
    }
}

fn samples_per_frame(version: MpegVersion, layer: Layer) -> usize {
    match (version, layer) {
        (_, Layer::I) => 384,
        (MpegVersion::Mpeg1, _) | (_, Layer::II) => 1152,
        _ => 576,
    }
}

/// Checks whether a complete frame carries a Xing, Info or VBRI header instead of audio.
pub fn is_meta_frame(header: &FrameHeader, frame: &[u8]) -> bool {
    let xing = HEADER_LEN + header.side_info_len();
    let vbri = HEADER_LEN + 32;

    let tag_at = |offset: usize| frame.get(offset..offset + 4);
    matches!(tag_at(xing), Some(b"Xing" | b"Info")) || tag_at(vbri) == Some(b"VBRI")
}
