//! FLAC container support.
//!
//! [`FlacTrackInfo`] reads the metadata blocks in front of the audio. [`FlacTrackProvider`]
//! then splits the audio into frames, hands each frame to an [`AudioDecoder`] that yields
//! samples at the native bit depth, converts them to 16-bit and forwards them.
//!
//! Seeking uses the SEEKTABLE block only: playback resumes at the last seek point at or before
//! the requested position, and the achieved position is reported downstream so the pipeline
//! can account for the difference. Without a table every seek restarts the stream.

use std::time::Duration;

use dasp_sample::{Sample as _, I24};

use crate::codec::{AudioDecoder, CodecConfig};
use crate::common::{samples_to_timecode, timecode_to_samples, Timecode};
use crate::control::Interrupt;
use crate::error::{ContainerError, Result};
use crate::gain::{self, GainPolicy, GainState};
use crate::io::ByteSource;
use crate::pipeline::{PcmFormat, Pipeline, SampleFormat};
use crate::provider::{self, FrameOutcome, Lifecycle, TrackInfo, TrackProvider};
use crate::sample::PcmBuffer;
use crate::seek::find_seek_point;
use crate::settings::Settings;

mod frame;
mod metadata;

pub use self::frame::{FlacFrameHeader, FlacFrameReader, HeaderParse};
pub use self::metadata::{FlacStreamInfo, FlacTrackInfo, FLAC_MAGIC, STREAM_INFO_LEN};

/// Converts a raw FLAC sample of the given bit depth to 16-bit.
#[inline]
pub fn to_i16(raw: i32, bits_per_sample: u32) -> i16 {
    match bits_per_sample {
        8 => (raw as i8).to_sample(),
        16 => raw as i16,
        24 => I24::new(raw).unwrap_or(I24::EQUILIBRIUM).to_sample(),
        32 => raw.to_sample(),
        // 12 and 20 bit streams have no dedicated dasp type; widen to 32 bits first.
        bits @ 1..=31 => (raw << (32 - bits)).to_sample(),
        _ => raw.to_sample(),
    }
}

/// Per-stream state created by [`FlacTrackProvider::parse_headers`].
struct FlacStream {
    info: FlacTrackInfo,
    reader: FlacFrameReader,
    frame: Vec<u8>,
    raw: PcmBuffer<i32>,
    output: PcmBuffer<i16>,
    gain: GainState,
}

/// Decodes a FLAC file and feeds its frames to a pipeline.
pub struct FlacTrackProvider<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = i32>,
    P: Pipeline,
{
    source: S,
    decoder: D,
    pipeline: P,
    settings: Settings,
    interrupt: Interrupt,
    stream: Option<FlacStream>,
    state: Lifecycle,
}

impl<S, D, P> FlacTrackProvider<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = i32>,
    P: Pipeline,
{
    pub fn new(source: S, decoder: D, pipeline: P, settings: Settings, interrupt: Interrupt) -> Self {
        FlacTrackProvider {
            source,
            decoder,
            pipeline,
            settings,
            interrupt,
            stream: None,
            state: Lifecycle::Created,
        }
    }

    /// Reads the metadata blocks and configures the decoder and pipeline.
    pub fn parse_headers(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        if self.stream.is_some() {
            return Ok(());
        }

        let info = FlacTrackInfo::read(&mut self.source)?;
        let stream_info = &info.stream_info;
        let gain = gain::resolve(&info.tags, None, GainPolicy::LegacyOnly, &self.settings);
        let capacity = stream_info.max_block_size as usize;

        self.decoder.configure(CodecConfig::Flac {
            stream_info: &stream_info.raw,
            sample_rate: stream_info.sample_rate,
            channels: stream_info.channels,
            bits_per_sample: stream_info.bits_per_sample,
            max_block_size: stream_info.max_block_size as u32,
        })?;
        self.pipeline.configure(PcmFormat::new(
            stream_info.channels,
            stream_info.sample_rate,
            SampleFormat::I16,
        ))?;

        self.stream = Some(FlacStream {
            reader: FlacFrameReader::new(info.first_frame_position),
            frame: Vec::with_capacity(stream_info.max_frame_size.max(1024) as usize),
            raw: PcmBuffer::new(stream_info.channels, capacity),
            output: PcmBuffer::new(stream_info.channels, capacity),
            gain,
            info,
        });
        self.state = Lifecycle::HeaderParsed;
        Ok(())
    }

    pub fn track_info(&self) -> Option<&FlacTrackInfo> {
        self.stream.as_ref().map(|stream| &stream.info)
    }

    pub fn is_replay_gain_applied(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|stream| stream.gain.is_applied())
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }
}

impl<S, D, P> TrackProvider for FlacTrackProvider<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = i32>,
    P: Pipeline,
{
    fn provide_frames(&mut self) -> Result<FrameOutcome> {
        self.state.ensure_ready()?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(ContainerError::HeadersNotParsed);
        };
        self.state = Lifecycle::Streaming;
        let bits = stream.info.stream_info.bits_per_sample;

        loop {
            if self.interrupt.is_raised() {
                return Ok(FrameOutcome::Interrupted);
            }

            let header =
                stream
                    .reader
                    .read_frame(&mut self.source, &stream.info.stream_info, &mut stream.frame)?;
            if header.is_none() {
                return Ok(FrameOutcome::EndOfStream);
            }

            self.decoder.send_packet(&stream.frame)?;
            let frames = self.decoder.receive_frames(&mut stream.raw)?;
            if frames == 0 {
                return Ok(FrameOutcome::EndOfStream);
            }

            for channel in 0..stream.raw.channel_count() {
                let raw = stream.raw.channel(channel);
                let output = &mut stream.output.channel_mut(channel)[..frames];
                for (out, &sample) in output.iter_mut().zip(raw) {
                    *out = to_i16(sample, bits);
                }
            }
            stream.output.set_frames(frames);
            stream.output.apply_volume(stream.gain.multiplier());
            self.pipeline.process(stream.output.batch())?;
        }
    }

    fn seek_to_timecode(&mut self, timecode: Timecode) -> Result<Timecode> {
        self.state.ensure_ready()?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(ContainerError::HeadersNotParsed);
        };
        self.state = Lifecycle::Seeking;
        let sample_rate = stream.info.stream_info.sample_rate;

        let target = timecode_to_samples(timecode, sample_rate);
        let point = find_seek_point(&stream.info.seek_points, target);
        let position = stream.info.first_frame_position + point.byte_offset;

        self.source.seek_to(position)?;
        stream.reader.reset(position);
        self.decoder.reset();

        let achieved = samples_to_timecode(point.sample_index, sample_rate);
        tracing::debug!("FLAC seek to {timecode} ms landed at {achieved} ms (offset {position})");
        self.pipeline.seek_performed(timecode, achieved)?;
        self.state = Lifecycle::Streaming;
        Ok(achieved)
    }

    fn is_seekable(&self) -> bool {
        self.stream.is_some()
    }

    fn duration(&self) -> Option<Duration> {
        self.stream
            .as_ref()
            .and_then(|stream| stream.info.stream_info.duration())
    }

    fn close(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.state = Lifecycle::Closed;
        provider::close_pair(&mut self.decoder, Some(&mut self.pipeline))
    }
}

impl<S, D, P> TrackInfo for FlacTrackProvider<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = i32>,
    P: Pipeline,
{
    fn title(&self) -> Option<&str> {
        self.track_info()?.tags.get("TITLE")
    }

    fn author(&self) -> Option<&str> {
        self.track_info()?.tags.get("ARTIST")
    }

    fn isrc(&self) -> Option<&str> {
        self.track_info()?.tags.get("ISRC")
    }

    fn length(&self) -> Option<Duration> {
        self.duration()
    }
}

impl<S, D, P> Drop for FlacTrackProvider<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = i32>,
    P: Pipeline,
{
    fn drop(&mut self) {
        let state = self.state;
        provider::close_on_drop(self, state);
    }
}
