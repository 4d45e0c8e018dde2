use std::time::Duration;

use crate::common::{samples_to_duration, ChannelCount, SampleRate};
use crate::error::{ContainerError, HeaderResultExt, Result};
use crate::io::{read_array, skip, BitReader, ByteSource};
use crate::seek::SeekPoint;
use crate::tags::{vorbis_comment, TagMap};

pub const FLAC_MAGIC: &[u8; 4] = b"fLaC";

/// Length of the STREAMINFO block body.
pub const STREAM_INFO_LEN: usize = 34;

const BLOCK_STREAMINFO: u8 = 0;
const BLOCK_SEEKTABLE: u8 = 3;
const BLOCK_VORBIS_COMMENT: u8 = 4;

const SEEK_POINT_LEN: u32 = 18;
const PLACEHOLDER_POINT: u64 = u64::MAX;

/// Fields of the STREAMINFO metadata block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlacStreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    pub min_frame_size: u32,
    pub max_frame_size: u32,
    pub sample_rate: SampleRate,
    pub channels: ChannelCount,
    pub bits_per_sample: u32,
    /// Samples per channel, `None` when the encoder did not know it.
    pub total_samples: Option<u64>,
    pub md5: [u8; 16],
    /// The block body as stored, handed to decoders that want it verbatim.
    pub raw: [u8; STREAM_INFO_LEN],
}

impl FlacStreamInfo {
    pub fn parse(raw: [u8; STREAM_INFO_LEN]) -> Result<Self> {
        let mut bits = BitReader::new(&raw[..]);
        let min_block_size = bits.read_u16().in_header("STREAMINFO")?;
        let max_block_size = bits.read_u16().in_header("STREAMINFO")?;
        let min_frame_size = bits.read_bits(24).in_header("STREAMINFO")? as u32;
        let max_frame_size = bits.read_bits(24).in_header("STREAMINFO")? as u32;
        let sample_rate = bits.read_bits(20).in_header("STREAMINFO")? as u32;
        let channels = bits.read_bits(3).in_header("STREAMINFO")? as u16 + 1;
        let bits_per_sample = bits.read_bits(5).in_header("STREAMINFO")? as u32 + 1;
        let total_samples = bits.read_bits(36).in_header("STREAMINFO")?;
        let mut md5 = [0u8; 16];
        bits.read_bytes(&mut md5).in_header("STREAMINFO")?;

        if sample_rate == 0 {
            return Err(ContainerError::malformed("FLAC sample rate is zero"));
        }
        if max_block_size < 16 || min_block_size > max_block_size {
            return Err(ContainerError::malformed(format!(
                "invalid FLAC block sizes {min_block_size}..{max_block_size}"
            )));
        }
        if bits_per_sample < 4 {
            return Err(ContainerError::malformed(format!(
                "unsupported FLAC sample size {bits_per_sample}"
            )));
        }

        Ok(FlacStreamInfo {
            min_block_size,
            max_block_size,
            min_frame_size,
            max_frame_size,
            sample_rate,
            channels,
            bits_per_sample,
            total_samples: (total_samples != 0).then_some(total_samples),
            md5,
            raw,
        })
    }

    pub fn duration(&self) -> Option<Duration> {
        self.total_samples
            .map(|samples| samples_to_duration(samples, self.sample_rate))
    }
}

/// Everything read from the metadata blocks before the first frame.
#[derive(Clone, Debug)]
pub struct FlacTrackInfo {
    pub stream_info: FlacStreamInfo,
    /// Seek points with offsets relative to `first_frame_position`.
    pub seek_points: Vec<SeekPoint>,
    pub tags: TagMap,
    /// Absolute offset of the first audio frame.
    pub first_frame_position: u64,
}

impl FlacTrackInfo {
    /// Reads the `fLaC` marker and all metadata blocks, leaving the source at the first frame.
    pub fn read<S: ByteSource + ?Sized>(source: &mut S) -> Result<Self> {
        let magic: [u8; 4] = read_array(source).in_header("FLAC marker")?;
        if &magic != FLAC_MAGIC {
            return Err(ContainerError::malformed("missing fLaC marker"));
        }

        let (last, block_type, length) = read_block_header(source)?;
        if block_type != BLOCK_STREAMINFO || length as usize != STREAM_INFO_LEN {
            return Err(ContainerError::malformed(
                "FLAC stream does not start with STREAMINFO",
            ));
        }
        let stream_info = FlacStreamInfo::parse(read_array(source).in_header("STREAMINFO")?)?;

        let mut info = FlacTrackInfo {
            stream_info,
            seek_points: Vec::new(),
            tags: TagMap::new(),
            first_frame_position: 0,
        };

        let mut last = last;
        while !last {
            let (is_last, block_type, length) = read_block_header(source)?;
            last = is_last;

            match block_type {
                BLOCK_SEEKTABLE => info.seek_points = read_seek_table(source, length)?,
                BLOCK_VORBIS_COMMENT => {
                    let mut data = vec![0u8; length as usize];
                    source.read_exact(&mut data).in_header("VORBIS_COMMENT")?;
                    info.tags = vorbis_comment::parse(&data).tags;
                }
                BLOCK_STREAMINFO => {
                    return Err(ContainerError::malformed("duplicate STREAMINFO block"))
                }
                other => {
                    tracing::trace!("skipping FLAC metadata block {other} of {length} bytes");
                    skip(source, length as u64)?;
                }
            }
        }

        info.first_frame_position = source.position()?;
        tracing::debug!(
            "FLAC stream: {} Hz, {} channels, {} bits, {} seek points, audio at {}",
            info.stream_info.sample_rate,
            info.stream_info.channels,
            info.stream_info.bits_per_sample,
            info.seek_points.len(),
            info.first_frame_position
        );
        Ok(info)
    }
}

fn read_block_header<S: ByteSource + ?Sized>(source: &mut S) -> Result<(bool, u8, u32)> {
    let [flags, a, b, c] = read_array(source).in_header("FLAC metadata block header")?;
    Ok((flags & 0x80 != 0, flags & 0x7F, u32::from_be_bytes([0, a, b, c])))
}

fn read_seek_table<S: ByteSource + ?Sized>(source: &mut S, length: u32) -> Result<Vec<SeekPoint>> {
    let count = length / SEEK_POINT_LEN;
    let mut points = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let entry: [u8; 18] = read_array(source).in_header("SEEKTABLE")?;
        let mut sample = [0u8; 8];
        let mut offset = [0u8; 8];
        sample.copy_from_slice(&entry[0..8]);
        offset.copy_from_slice(&entry[8..16]);

        let sample_index = u64::from_be_bytes(sample);
        if sample_index == PLACEHOLDER_POINT {
            continue;
        }
        points.push(SeekPoint::new(sample_index, u64::from_be_bytes(offset)));
    }

    skip(source, (length % SEEK_POINT_LEN) as u64)?;
    Ok(points)
}
