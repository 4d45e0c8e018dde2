//! Seeking strategies for MP3 streams.
//!
//! MP3 has no index of its own. A Xing/Info header, when present and complete, provides a coarse
//! table of contents. Otherwise a stream of known length is assumed to have a constant bitrate,
//! and a stream of unknown length cannot be seeked at all.

use std::time::Duration;

use crate::common::Timecode;
use crate::error::{ContainerError, Result};
use crate::io::ByteSource;

use super::header::{FrameHeader, HEADER_LEN};

const XING_FRAMES: u32 = 0x01;
const XING_BYTES: u32 = 0x02;
const XING_TOC: u32 = 0x04;
const XING_REQUIRED: u32 = XING_FRAMES | XING_BYTES | XING_TOC;

const TOC_LEN: usize = 100;

/// Seeks using the 100-entry table of contents from a Xing or Info frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XingSeeker {
    sample_rate: u32,
    samples_per_frame: u64,
    first_frame_position: u64,
    frame_count: u64,
    data_size: u64,
    toc: [u8; TOC_LEN],
}

impl XingSeeker {
    /// Parses the Xing header of a complete frame located at `frame_position`.
    ///
    /// Returns `None` unless the frame is a Xing or Info frame carrying the frame count, the byte
    /// count and the table of contents.
    pub fn parse(header: &FrameHeader, frame_position: u64, frame: &[u8]) -> Option<Self> {
        let offset = HEADER_LEN + header.side_info_len();
        let body = frame.get(offset..)?;

        let tag = body.get(0..4)?;
        if tag != b"Xing" && tag != b"Info" {
            return None;
        }

        let flags = be_u32(body, 4)?;
        if flags & XING_REQUIRED != XING_REQUIRED {
            tracing::debug!("Xing header without seek information (flags {flags:#x})");
            return None;
        }

        let frame_count = be_u32(body, 8)? as u64;
        let data_size = be_u32(body, 12)? as u64;
        let mut toc = [0u8; TOC_LEN];
        toc.copy_from_slice(body.get(16..16 + TOC_LEN)?);

        Some(XingSeeker {
            sample_rate: header.sample_rate,
            samples_per_frame: header.samples_per_frame as u64,
            first_frame_position: frame_position + header.frame_size as u64,
            frame_count,
            data_size,
            toc,
        })
    }

    fn duration_ms(&self) -> u64 {
        self.frame_count * self.samples_per_frame * 1000 / self.sample_rate as u64
    }

    fn seek<S: ByteSource + ?Sized>(&self, timecode: Timecode, source: &mut S) -> Result<u64> {
        let duration = self.duration_ms().max(1);
        let percentile = (timecode.saturating_mul(100) / duration).min(TOC_LEN as u64 - 1);

        let frame_index = self.frame_count * percentile / 100;
        let position =
            self.first_frame_position + self.data_size * self.toc[percentile as usize] as u64 / 256;

        source.seek_to(position)?;
        Ok(frame_index)
    }
}

/// Seeks by assuming every frame has the size of the first one.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantRateSeeker {
    sample_rate: u32,
    samples_per_frame: u64,
    first_frame_position: u64,
    average_frame_size: f64,
    max_frame_index: u64,
}

impl ConstantRateSeeker {
    pub fn new(header: &FrameHeader, first_frame_position: u64, content_length: u64) -> Self {
        let samples_per_frame = header.samples_per_frame as u64;
        let average_frame_size =
            samples_per_frame as f64 * header.bitrate as f64 / 8.0 / header.sample_rate as f64;
        let data_length = content_length.saturating_sub(first_frame_position);

        ConstantRateSeeker {
            sample_rate: header.sample_rate,
            samples_per_frame,
            first_frame_position,
            average_frame_size,
            max_frame_index: (data_length as f64 / average_frame_size) as u64,
        }
    }

    fn duration_ms(&self) -> u64 {
        self.max_frame_index * self.samples_per_frame * 1000 / self.sample_rate as u64
    }

    fn seek<S: ByteSource + ?Sized>(&self, timecode: Timecode, source: &mut S) -> Result<u64> {
        let requested =
            timecode.saturating_mul(self.sample_rate as u64) / 1000 / self.samples_per_frame;
        let frame_index = requested.min(self.max_frame_index);
        let position =
            self.first_frame_position + (frame_index as f64 * self.average_frame_size) as u64;

        source.seek_to(position)?;
        Ok(frame_index)
    }
}

/// The strategy chosen for a stream when its headers are parsed.
#[derive(Clone, Debug, PartialEq)]
pub enum Mp3Seeker {
    Xing(XingSeeker),
    ConstantRate(ConstantRateSeeker),
    /// Forward-only playback of a stream of unknown length.
    Stream,
}

impl Mp3Seeker {
    pub fn is_seekable(&self) -> bool {
        !matches!(self, Mp3Seeker::Stream)
    }

    pub fn duration(&self) -> Option<Duration> {
        let millis = match self {
            Mp3Seeker::Xing(seeker) => seeker.duration_ms(),
            Mp3Seeker::ConstantRate(seeker) => seeker.duration_ms(),
            Mp3Seeker::Stream => return None,
        };
        Some(Duration::from_millis(millis))
    }

    /// Repositions `source` near `timecode` and returns the index of the frame found there.
    pub fn seek<S: ByteSource + ?Sized>(&self, timecode: Timecode, source: &mut S) -> Result<u64> {
        match self {
            Mp3Seeker::Xing(seeker) => seeker.seek(timecode, source),
            Mp3Seeker::ConstantRate(seeker) => seeker.seek(timecode, source),
            Mp3Seeker::Stream => Err(ContainerError::NotSeekable),
        }
    }
}

fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header() -> FrameHeader {
        FrameHeader::parse([0xFF, 0xFB, 0x90, 0x00]).unwrap()
    }

    fn xing_frame(flags: u32) -> Vec<u8> {
        let header = header();
        let mut frame = vec![0u8; header.frame_size];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        let body = &mut frame[36..];
        body[..4].copy_from_slice(b"Xing");
        body[4..8].copy_from_slice(&flags.to_be_bytes());
        body[8..12].copy_from_slice(&1000u32.to_be_bytes());
        body[12..16].copy_from_slice(&417_000u32.to_be_bytes());
        for (index, entry) in body[16..116].iter_mut().enumerate() {
            *entry = (index * 256 / 100) as u8;
        }
        frame
    }

    #[test]
    fn xing_table_of_contents() {
        let seeker = XingSeeker::parse(&header(), 100, &xing_frame(0x0F)).unwrap();
        let seeker = Mp3Seeker::Xing(seeker);
        // 1000 frames of 1152 samples at 44.1 kHz.
        assert_eq!(seeker.duration(), Some(Duration::from_millis(26122)));

        let mut source = Cursor::new(vec![0u8; 500_000]);
        let frame_index = seeker.seek(13061, &mut source).unwrap();
        assert_eq!(frame_index, 500);
        // toc[50] = 128, so half of the data.
        assert_eq!(source.position(), 517 + 208_500);
    }

    #[test]
    fn xing_seek_past_end_uses_last_entry() {
        let seeker = Mp3Seeker::Xing(XingSeeker::parse(&header(), 0, &xing_frame(0x07)).unwrap());
        let mut source = Cursor::new(Vec::new());
        assert_eq!(seeker.seek(10_000_000, &mut source).unwrap(), 990);
    }

    #[test]
    fn xing_without_toc_is_ignored() {
        assert_eq!(XingSeeker::parse(&header(), 0, &xing_frame(0x03)), None);
        assert_eq!(XingSeeker::parse(&header(), 0, &vec![0u8; 417]), None);
    }

    #[test]
    fn constant_rate_positions() {
        // 128 kbps: 417.96 bytes per frame on average.
        let seeker = Mp3Seeker::ConstantRate(ConstantRateSeeker::new(&header(), 1000, 419_000));
        let mut source = Cursor::new(Vec::new());

        let frame_index = seeker.seek(1000, &mut source).unwrap();
        assert_eq!(frame_index, 38);
        assert_eq!(source.position(), 1000 + 15882);

        let last = seeker.seek(u32::MAX as u64, &mut source).unwrap();
        assert_eq!(last, 1000);
        assert_eq!(seeker.duration(), Some(Duration::from_millis(26122)));
    }

    #[test]
    fn stream_cannot_seek() {
        let seeker = Mp3Seeker::Stream;
        assert!(!seeker.is_seekable());
        assert_eq!(seeker.duration(), None);
        assert!(matches!(
            seeker.seek(0, &mut Cursor::new(Vec::new())),
            Err(ContainerError::NotSeekable)
        ));
    }
}
