#![allow(dead_code)]
//! Shared fixtures for the integration tests: synthetic container builders, a scripted decoder
//! and recording downstream collaborators.
//!
//! Lives in its own folder so it is not run as an integration test itself.

use std::cell::RefCell;
use std::rc::Rc;

use audiodemux::codec::{AudioDecoder, CodecConfig, CodecKind, DecoderError};
use audiodemux::pipeline::{PacketRouter, PcmFormat, Pipeline, PipelineError};
use audiodemux::sample::{PcmBatch, PcmBuffer};
use audiodemux::{ContainerError, Timecode};

/// Sample types the scripted decoder can produce.
pub trait MarkerSample: Copy + Default + 'static {
    fn from_marker(marker: u8) -> Self;
}

impl MarkerSample for i32 {
    fn from_marker(marker: u8) -> Self {
        marker as i32 * 100
    }
}

impl MarkerSample for i16 {
    fn from_marker(marker: u8) -> Self {
        marker as i16 * 100
    }
}

impl MarkerSample for f32 {
    fn from_marker(marker: u8) -> Self {
        marker as f32 / 100.0
    }
}

/// What a [`ScriptedDecoder`] was asked to do.
#[derive(Debug, Default)]
pub struct DecoderLog {
    pub configured: Option<CodecKind>,
    pub packets: Vec<Vec<u8>>,
    pub resets: usize,
    pub closes: usize,
}

/// Decodes every packet to `frames_per_packet` frames whose samples all encode the byte found at
/// `marker_offset` of the packet.
pub struct ScriptedDecoder<S> {
    kind: CodecKind,
    frames_per_packet: usize,
    marker_offset: usize,
    pending: usize,
    marker: u8,
    closed: bool,
    pub log: Rc<RefCell<DecoderLog>>,
    _sample: std::marker::PhantomData<S>,
}

impl<S: MarkerSample> ScriptedDecoder<S> {
    pub fn new(kind: CodecKind, frames_per_packet: usize, marker_offset: usize) -> Self {
        ScriptedDecoder {
            kind,
            frames_per_packet,
            marker_offset,
            pending: 0,
            marker: 0,
            closed: false,
            log: Rc::default(),
            _sample: std::marker::PhantomData,
        }
    }

    pub fn log(&self) -> Rc<RefCell<DecoderLog>> {
        Rc::clone(&self.log)
    }
}

impl<S: MarkerSample> AudioDecoder for ScriptedDecoder<S> {
    type Sample = S;

    fn kind(&self) -> CodecKind {
        self.kind
    }

    fn configure(&mut self, config: CodecConfig<'_>) -> Result<(), DecoderError> {
        if config.kind() != self.kind {
            return Err(DecoderError::WrongCodec {
                expected: self.kind,
                actual: config.kind(),
            });
        }
        self.log.borrow_mut().configured = Some(config.kind());
        Ok(())
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<(), DecoderError> {
        if self.log.borrow().configured.is_none() {
            return Err(DecoderError::NotConfigured);
        }
        self.marker = packet.get(self.marker_offset).copied().unwrap_or_default();
        self.pending = self.frames_per_packet;
        self.log.borrow_mut().packets.push(packet.to_vec());
        Ok(())
    }

    fn receive_frames(&mut self, out: &mut PcmBuffer<S>) -> Result<usize, DecoderError> {
        let frames = self.pending.min(out.capacity());
        for plane in out.planes_mut() {
            plane[..frames].fill(S::from_marker(self.marker));
        }
        out.set_frames(frames);
        self.pending -= frames;
        Ok(frames)
    }

    fn reset(&mut self) {
        self.pending = 0;
        self.log.borrow_mut().resets += 1;
    }

    fn close(&mut self) -> Result<(), DecoderError> {
        if self.closed {
            return Err(DecoderError::Closed);
        }
        self.closed = true;
        self.log.borrow_mut().closes += 1;
        Ok(())
    }
}

/// One batch as seen by the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedBatch {
    pub frames: usize,
    pub channels: usize,
    /// Channel 0 converted to `f32` without scaling.
    pub first_channel: Vec<f32>,
}

#[derive(Debug, Default)]
pub struct PipelineLog {
    pub format: Option<PcmFormat>,
    pub batches: Vec<RecordedBatch>,
    pub seeks: Vec<(Timecode, Timecode)>,
    pub flushes: usize,
    pub closes: usize,
}

impl PipelineLog {
    pub fn total_frames(&self) -> usize {
        self.batches.iter().map(|batch| batch.frames).sum()
    }

    /// First sample of every batch.
    pub fn leading_samples(&self) -> Vec<f32> {
        self.batches
            .iter()
            .filter_map(|batch| batch.first_channel.first().copied())
            .collect()
    }
}

#[derive(Default)]
pub struct RecordingPipeline {
    pub log: Rc<RefCell<PipelineLog>>,
}

impl RecordingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Rc<RefCell<PipelineLog>> {
        Rc::clone(&self.log)
    }
}

impl Pipeline for RecordingPipeline {
    fn configure(&mut self, format: PcmFormat) -> Result<(), PipelineError> {
        self.log.borrow_mut().format = Some(format);
        Ok(())
    }

    fn process(&mut self, batch: PcmBatch<'_>) -> Result<(), PipelineError> {
        let first_channel = match batch {
            PcmBatch::I16(planar) => planar.channel(0).iter().map(|&s| s as f32).collect(),
            PcmBatch::F32(planar) => planar.channel(0).to_vec(),
        };
        self.log.borrow_mut().batches.push(RecordedBatch {
            frames: batch.frames(),
            channels: batch.channel_count(),
            first_channel,
        });
        Ok(())
    }

    fn seek_performed(&mut self, requested: Timecode, achieved: Timecode) -> Result<(), PipelineError> {
        self.log.borrow_mut().seeks.push((requested, achieved));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PipelineError> {
        self.log.borrow_mut().flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        let mut log = self.log.borrow_mut();
        if log.closes > 0 {
            return Err(PipelineError::Closed);
        }
        log.closes += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RouterLog {
    pub inputs: Vec<usize>,
    pub packets: Vec<Vec<u8>>,
    pub multiplier: Option<f32>,
    pub seeks: Vec<(Timecode, Timecode)>,
    pub flushes: usize,
    pub closes: usize,
}

/// Packet router that only records what it is given.
#[derive(Default)]
pub struct RecordingRouter {
    current: Vec<u8>,
    pub log: Rc<RefCell<RouterLog>>,
}

impl RecordingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Rc<RefCell<RouterLog>> {
        Rc::clone(&self.log)
    }
}

impl PacketRouter for RecordingRouter {
    fn process_input(&mut self, input: &[u8]) -> audiodemux::Result<()> {
        self.log.borrow_mut().inputs.push(input.len());
        self.current.extend_from_slice(input);
        Ok(())
    }

    fn end_packet(&mut self) -> audiodemux::Result<()> {
        let packet = std::mem::take(&mut self.current);
        self.log.borrow_mut().packets.push(packet);
        Ok(())
    }

    fn set_volume_multiplier(&mut self, multiplier: f32) {
        self.log.borrow_mut().multiplier = Some(multiplier);
    }

    fn seek_performed(&mut self, requested: Timecode, achieved: Timecode) -> audiodemux::Result<()> {
        self.current.clear();
        self.log.borrow_mut().seeks.push((requested, achieved));
        Ok(())
    }

    fn flush(&mut self) -> audiodemux::Result<()> {
        self.log.borrow_mut().flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> audiodemux::Result<()> {
        let mut log = self.log.borrow_mut();
        if log.closes > 0 {
            return Err(ContainerError::Closed);
        }
        log.closes += 1;
        Ok(())
    }
}

// FLAC

pub const FLAC_BLOCK_SIZE: usize = 4096;
pub const FLAC_SAMPLE_RATE: u32 = 44100;

/// Offset of the marker byte inside a frame built by [`flac_file`].
pub const FLAC_MARKER_OFFSET: usize = 6;

fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |mut crc, &byte| {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
        crc
    })
}

fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |mut crc, &byte| {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x8005 } else { crc << 1 };
        }
        crc
    })
}

/// A stereo 16-bit 44.1 kHz frame of 4096 samples; frame numbers must stay below 128.
pub fn flac_frame(number: u8) -> Vec<u8> {
    let mut frame = vec![0xFF, 0xF8, 0xC9, 0x18, number];
    frame.push(crc8(&frame));
    frame.push(number);
    frame.extend_from_slice(&[0x11; 24]);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

fn flac_block(last: bool, kind: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![kind | if last { 0x80 } else { 0 }];
    out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(body);
    out
}

fn stream_info(total_samples: u64) -> Vec<u8> {
    let mut raw = vec![0u8; 34];
    raw[0..2].copy_from_slice(&(FLAC_BLOCK_SIZE as u16).to_be_bytes());
    raw[2..4].copy_from_slice(&(FLAC_BLOCK_SIZE as u16).to_be_bytes());
    let packed: u64 =
        ((FLAC_SAMPLE_RATE as u64) << 44) | (1u64 << 41) | (15u64 << 36) | total_samples;
    raw[10..18].copy_from_slice(&packed.to_be_bytes());
    raw
}

/// Vorbis comment block body, also the payload of Ogg comment packets after their magic.
pub fn vorbis_comment(tags: &[(&str, &str)]) -> Vec<u8> {
    let vendor = b"audiodemux tests";
    let mut out = (vendor.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(vendor);
    out.extend_from_slice(&(tags.len() as u32).to_le_bytes());
    for (key, value) in tags {
        let entry = format!("{key}={value}");
        out.extend_from_slice(&(entry.len() as u32).to_le_bytes());
        out.extend_from_slice(entry.as_bytes());
    }
    out
}

/// A FLAC file with `frame_count` frames, a seek point per frame when `seek_table` is set, and
/// the given tags.
pub fn flac_file(frame_count: u8, seek_table: bool, tags: &[(&str, &str)]) -> Vec<u8> {
    let frames: Vec<Vec<u8>> = (0..frame_count).map(flac_frame).collect();

    let mut data = b"fLaC".to_vec();
    let total = frame_count as u64 * FLAC_BLOCK_SIZE as u64;
    data.extend(flac_block(false, 0, &stream_info(total)));

    if seek_table {
        let mut table = Vec::new();
        let mut offset = 0u64;
        for (index, frame) in frames.iter().enumerate() {
            table.extend_from_slice(&(index as u64 * FLAC_BLOCK_SIZE as u64).to_be_bytes());
            table.extend_from_slice(&offset.to_be_bytes());
            table.extend_from_slice(&(FLAC_BLOCK_SIZE as u16).to_be_bytes());
            offset += frame.len() as u64;
        }
        // A placeholder point, which must be ignored.
        table.extend_from_slice(&u64::MAX.to_be_bytes());
        table.extend_from_slice(&[0; 10]);
        data.extend(flac_block(false, 3, &table));
    }

    data.extend(flac_block(true, 4, &vorbis_comment(tags)));
    for frame in frames {
        data.extend(frame);
    }
    data
}

// MP3

/// MPEG-1 layer III, 128 kbps, 44.1 kHz, stereo, no padding: 417 byte frames.
pub const MP3_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];
pub const MP3_FRAME_SIZE: usize = 417;
pub const MP3_MARKER_OFFSET: usize = 4;

pub fn mp3_frame(marker: u8) -> Vec<u8> {
    let mut frame = vec![0x55; MP3_FRAME_SIZE];
    frame[..4].copy_from_slice(&MP3_HEADER);
    frame[MP3_MARKER_OFFSET] = marker;
    frame
}

pub fn mp3_frames(count: u8) -> Vec<u8> {
    (0..count).flat_map(mp3_frame).collect()
}

/// A Xing frame with a linear table of contents followed by `count` audio frames.
pub fn mp3_xing_stream(count: u8) -> Vec<u8> {
    let mut xing = vec![0u8; MP3_FRAME_SIZE];
    xing[..4].copy_from_slice(&MP3_HEADER);
    // Stereo MPEG-1 side information is 32 bytes.
    let body = 4 + 32;
    xing[body..body + 4].copy_from_slice(b"Xing");
    xing[body + 4..body + 8].copy_from_slice(&7u32.to_be_bytes());
    xing[body + 8..body + 12].copy_from_slice(&(count as u32).to_be_bytes());
    xing[body + 12..body + 16]
        .copy_from_slice(&(count as u32 * MP3_FRAME_SIZE as u32).to_be_bytes());
    for index in 0..100 {
        xing[body + 16 + index] = (index * 256 / 100) as u8;
    }

    xing.extend(mp3_frames(count));
    xing
}

/// An ID3v2.3 text frame with ISO-8859-1 content.
pub fn id3v23_text_frame(id: &str, text: &str) -> Vec<u8> {
    let mut content = vec![0u8];
    content.extend(text.bytes());
    let mut out = id.as_bytes().to_vec();
    out.extend_from_slice(&(content.len() as u32).to_be_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend(content);
    out
}

/// An ID3v2.3 tag around `frames`, followed by `padding` zero bytes inside the tag.
pub fn id3v23_tag(frames: &[Vec<u8>], padding: usize) -> Vec<u8> {
    let body: Vec<u8> = frames
        .iter()
        .flatten()
        .copied()
        .chain(std::iter::repeat_n(0, padding))
        .collect();
    let size = body.len() as u32;
    let mut out = b"ID3\x03\x00\x00".to_vec();
    out.extend_from_slice(&[
        ((size >> 21) & 0x7F) as u8,
        ((size >> 14) & 0x7F) as u8,
        ((size >> 7) & 0x7F) as u8,
        (size & 0x7F) as u8,
    ]);
    out.extend(body);
    out
}

// Ogg

fn ogg_crc(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |mut crc, &byte| {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
        crc
    })
}

/// Builds one page holding complete packets.
pub fn ogg_page(flags: u8, granule: u64, serial: u32, sequence: u32, packets: &[&[u8]]) -> Vec<u8> {
    let mut segments = Vec::new();
    let mut body = Vec::new();
    for packet in packets {
        segments.extend(std::iter::repeat_n(255u8, packet.len() / 255));
        segments.push((packet.len() % 255) as u8);
        body.extend_from_slice(packet);
    }

    let mut page = b"OggS\0".to_vec();
    page.push(flags);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&[0; 4]);
    page.push(segments.len() as u8);
    page.extend(segments);
    page.extend(body);
    let crc = ogg_crc(&page);
    page[22..26].copy_from_slice(&crc.to_le_bytes());
    page
}

/// Header pages followed by `audio_pages` pages, each holding one audio packet whose first byte
/// is the page index and which advances the granule position by `samples_per_page`.
pub fn ogg_stream(headers: &[&[u8]], audio_pages: u8, samples_per_page: u64, granule_base: u64) -> Vec<u8> {
    const SERIAL: u32 = 0x1234;
    let mut data = ogg_page(0x02, 0, SERIAL, 0, &headers[..1]);
    if headers.len() > 1 {
        data.extend(ogg_page(0, 0, SERIAL, 1, &headers[1..]));
    }
    for index in 0..audio_pages {
        let mut packet = vec![index; 120];
        packet[1..].fill(0x42);
        let granule = granule_base + (index as u64 + 1) * samples_per_page;
        let flags = if index + 1 == audio_pages { 0x04 } else { 0 };
        data.extend(ogg_page(flags, granule, SERIAL, index as u32 + 2, &[&packet]));
    }
    data
}

pub fn vorbis_identification(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut packet = b"\x01vorbis".to_vec();
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.push(channels);
    packet.extend_from_slice(&sample_rate.to_le_bytes());
    packet.extend_from_slice(&0i32.to_le_bytes());
    packet.extend_from_slice(&128_000i32.to_le_bytes());
    packet.extend_from_slice(&0i32.to_le_bytes());
    packet.extend_from_slice(&[0xB8, 0x01]);
    packet
}

pub fn vorbis_comment_packet(tags: &[(&str, &str)]) -> Vec<u8> {
    let mut packet = b"\x03vorbis".to_vec();
    packet.extend(vorbis_comment(tags));
    packet.push(1);
    packet
}

pub fn vorbis_setup_packet() -> Vec<u8> {
    let mut packet = b"\x05vorbis".to_vec();
    packet.extend_from_slice(&[0x2A; 40]);
    packet
}

pub fn opus_head(channels: u8, pre_skip: u16, output_gain: i16) -> Vec<u8> {
    let mut packet = b"OpusHead".to_vec();
    packet.push(1);
    packet.push(channels);
    packet.extend_from_slice(&pre_skip.to_le_bytes());
    packet.extend_from_slice(&48000u32.to_le_bytes());
    packet.extend_from_slice(&output_gain.to_le_bytes());
    packet.push(0);
    packet
}

pub fn opus_tags_packet(tags: &[(&str, &str)]) -> Vec<u8> {
    let mut packet = b"OpusTags".to_vec();
    packet.extend(vorbis_comment(tags));
    packet
}
