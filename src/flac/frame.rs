//! FLAC frame boundary detection.
//!
//! FLAC frames carry no length field. A frame ends where the next valid frame header starts,
//! and a candidate header is only accepted if the bytes before it close the current frame with
//! a matching CRC-16 footer. Headers themselves are validated with their CRC-8 and against the
//! stream's STREAMINFO.

use std::io;

use super::metadata::FlacStreamInfo;
use crate::error::Result;
use crate::io::{read_up_to, ByteSource};

/// Longest possible frame header: sync, codes, 7 byte coded number, 16 bit block size,
/// 16 bit sample rate and CRC-8.
const MAX_HEADER_LEN: usize = 16;

const READ_CHUNK: usize = 16 * 1024;

const SAMPLE_RATES: [u32; 12] = [
    0, 88200, 176400, 192000, 8000, 16000, 22050, 24000, 32000, 44100, 48000, 96000,
];

const CRC8_TABLE: [u8; 256] = crc8_table();
const CRC16_TABLE: [u16; 256] = crc16_table();

const fn crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x8005 } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

pub(crate) fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, &b| CRC8_TABLE[(crc ^ b) as usize])
}

#[inline]
pub(crate) fn crc16_update(crc: u16, byte: u8) -> u16 {
    (crc << 8) ^ CRC16_TABLE[((crc >> 8) as u8 ^ byte) as usize]
}

pub(crate) fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0, |crc, &b| crc16_update(crc, b))
}

/// Decoded fields of a frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlacFrameHeader {
    /// Variable blocking strategy: `number` counts samples instead of frames.
    pub variable_block_size: bool,
    pub block_size: u32,
    pub sample_rate: Option<u32>,
    pub channels: u16,
    pub bits_per_sample: Option<u32>,
    /// Frame number, or first sample number for variable block size streams.
    pub number: u64,
    /// Length of the header in bytes, CRC-8 included.
    pub header_len: usize,
}

/// Outcome of attempting to parse a header at some offset.
#[derive(Debug, PartialEq, Eq)]
pub enum HeaderParse {
    Valid(FlacFrameHeader),
    Invalid,
    /// More bytes are needed to decide.
    Incomplete,
}

impl FlacFrameHeader {
    /// Parses a frame header at the start of `data`.
    pub fn parse(data: &[u8]) -> HeaderParse {
        let mut pos = 0;
        macro_rules! next {
            () => {{
                let Some(&byte) = data.get(pos) else {
                    return HeaderParse::Incomplete;
                };
                pos += 1;
                byte
            }};
        }

        if next!() != 0xFF {
            return HeaderParse::Invalid;
        }
        let b1 = next!();
        if b1 & 0xFE != 0xF8 {
            return HeaderParse::Invalid;
        }
        let variable_block_size = b1 & 0x01 != 0;

        let b2 = next!();
        let block_code = b2 >> 4;
        let rate_code = b2 & 0x0F;
        if block_code == 0 || rate_code == 0x0F {
            return HeaderParse::Invalid;
        }

        let b3 = next!();
        let channels = match b3 >> 4 {
            assignment @ 0..=7 => assignment as u16 + 1,
            8..=10 => 2,
            _ => return HeaderParse::Invalid,
        };
        let bits_per_sample = match (b3 >> 1) & 0x07 {
            0 => None,
            1 => Some(8),
            2 => Some(12),
            4 => Some(16),
            5 => Some(20),
            6 => Some(24),
            7 => Some(32),
            _ => return HeaderParse::Invalid,
        };
        if b3 & 0x01 != 0 {
            return HeaderParse::Invalid;
        }

        // UTF-8 style coded frame or sample number.
        let first = next!();
        let (mut number, extra) = match first.leading_ones() {
            0 => (first as u64, 0),
            n @ 2..=7 => ((first as u32 & (0xFF >> (n + 1))) as u64, n - 1),
            _ => return HeaderParse::Invalid,
        };
        if !variable_block_size && extra > 5 {
            return HeaderParse::Invalid;
        }
        for _ in 0..extra {
            let byte = next!();
            if byte & 0xC0 != 0x80 {
                return HeaderParse::Invalid;
            }
            number = (number << 6) | (byte & 0x3F) as u64;
        }

        let block_size = match block_code {
            1 => 192,
            2..=5 => 576 << (block_code - 2),
            6 => next!() as u32 + 1,
            7 => u16::from_be_bytes([next!(), next!()]) as u32 + 1,
            _ => 256 << (block_code - 8),
        };

        let sample_rate = match rate_code {
            0 => None,
            1..=11 => Some(SAMPLE_RATES[rate_code as usize]),
            12 => Some(next!() as u32 * 1000),
            13 => Some(u16::from_be_bytes([next!(), next!()]) as u32),
            _ => Some(u16::from_be_bytes([next!(), next!()]) as u32 * 10),
        };

        let crc = next!();
        if crc8(&data[..pos - 1]) != crc {
            return HeaderParse::Invalid;
        }

        HeaderParse::Valid(FlacFrameHeader {
            variable_block_size,
            block_size,
            sample_rate,
            channels,
            bits_per_sample,
            number,
            header_len: pos,
        })
    }

    /// Whether the header is consistent with the stream it was found in.
    pub fn matches(&self, info: &FlacStreamInfo) -> bool {
        self.channels == info.channels
            && self.block_size <= info.max_block_size as u32
            && self.sample_rate.is_none_or(|rate| rate == info.sample_rate)
            && self
                .bits_per_sample
                .is_none_or(|bits| bits == info.bits_per_sample)
    }
}

/// Splits the audio part of a FLAC stream into frames.
pub struct FlacFrameReader {
    buffer: Vec<u8>,
    /// Absolute offset of `buffer[0]`.
    base: u64,
    eof: bool,
    skipped_warned: bool,
}

impl FlacFrameReader {
    pub fn new(position: u64) -> Self {
        FlacFrameReader {
            buffer: Vec::with_capacity(READ_CHUNK * 2),
            base: position,
            eof: false,
            skipped_warned: false,
        }
    }

    /// Discards read-ahead after the source was repositioned to `position`.
    pub fn reset(&mut self, position: u64) {
        self.buffer.clear();
        self.base = position;
        self.eof = false;
    }

    /// Absolute offset of the next unread frame byte.
    pub fn position(&self) -> u64 {
        self.base
    }

    /// Reads the next frame into `frame`, returning its header, or `None` at the end.
    ///
    /// Bytes that do not form a valid frame header are skipped.
    pub fn read_frame<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        info: &FlacStreamInfo,
        frame: &mut Vec<u8>,
    ) -> Result<Option<FlacFrameHeader>> {
        let Some(header) = self.sync(source, info)? else {
            return Ok(None);
        };

        let mut crc = crc16(&self.buffer[..header.header_len]);
        let mut end = header.header_len;

        loop {
            if end + MAX_HEADER_LEN > self.buffer.len() && !self.eof {
                self.fill(source)?;
                continue;
            }
            if end >= self.buffer.len() {
                break;
            }
            if crc == 0 && self.is_next_header(end, &header, info) {
                break;
            }
            crc = crc16_update(crc, self.buffer[end]);
            end += 1;
        }

        frame.clear();
        frame.extend_from_slice(&self.buffer[..end]);
        self.consume(end);
        Ok(Some(header))
    }

    /// Advances to the next valid header, returning it with the buffer starting at it.
    fn sync<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        info: &FlacStreamInfo,
    ) -> Result<Option<FlacFrameHeader>> {
        let mut skipped = 0usize;
        loop {
            if self.buffer.len() < MAX_HEADER_LEN && !self.eof {
                self.fill(source)?;
                continue;
            }
            if self.buffer.is_empty() {
                return Ok(None);
            }

            match FlacFrameHeader::parse(&self.buffer) {
                HeaderParse::Valid(header) if header.matches(info) => {
                    if skipped > 0 && !self.skipped_warned {
                        tracing::warn!("skipped {skipped} bytes of garbage before a FLAC frame");
                        self.skipped_warned = true;
                    }
                    return Ok(Some(header));
                }
                HeaderParse::Incomplete if !self.eof => {
                    self.fill(source)?;
                }
                _ => {
                    let next = self.buffer[1..]
                        .iter()
                        .position(|&b| b == 0xFF)
                        .map_or(self.buffer.len(), |i| i + 1);
                    skipped += next;
                    self.consume(next);
                }
            }
        }
    }

    fn is_next_header(&self, at: usize, current: &FlacFrameHeader, info: &FlacStreamInfo) -> bool {
        if self.buffer[at] != 0xFF {
            return false;
        }
        match FlacFrameHeader::parse(&self.buffer[at..]) {
            HeaderParse::Valid(next) => {
                next.variable_block_size == current.variable_block_size && next.matches(info)
            }
            _ => false,
        }
    }

    fn fill<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> io::Result<()> {
        let len = self.buffer.len();
        self.buffer.resize(len + READ_CHUNK, 0);
        let read = read_up_to(source, &mut self.buffer[len..])?;
        self.buffer.truncate(len + read);
        if read == 0 {
            self.eof = true;
        }
        Ok(())
    }

    fn consume(&mut self, count: usize) {
        self.buffer.drain(..count);
        self.base += count as u64;
    }
}
