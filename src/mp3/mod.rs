//! MP3 stream support.
//!
//! An MP3 file is a run of ID3v2 tags followed by self-synchronising MPEG audio frames. The
//! stream is opened with [`Mp3Stream::open`], which skips the tags, finds the first frame and
//! picks an [`Mp3Seeker`]. [`Mp3TrackProvider`] then walks the frames, decoding each one.

use std::time::Duration;

use crate::codec::{AudioDecoder, CodecConfig};
use crate::common::Timecode;
use crate::control::Interrupt;
use crate::error::{ContainerError, Result};
use crate::gain::{self, GainPolicy, GainState};
use crate::io::ByteSource;
use crate::pipeline::{PcmFormat, Pipeline, SampleFormat};
use crate::provider::{self, FrameOutcome, Lifecycle, TrackInfo, TrackProvider};
use crate::sample::PcmBuffer;
use crate::settings::Settings;
use crate::tags::id3::{self, Id3Tags};
use crate::tags::{TagMap, REPLAYGAIN_TRACK_GAIN};

mod frame_reader;
mod header;
mod seeker;

pub use self::frame_reader::Mp3FrameReader;
pub use self::header::{
    has_sync, is_meta_frame, FrameHeader, Layer, MpegVersion, HEADER_LEN, MAX_FRAME_SIZE,
};
pub use self::seeker::{ConstantRateSeeker, Mp3Seeker, XingSeeker};

/// Leading meta frames skipped when probing a constant bitrate stream for metadata.
const MAX_SKIPPED_META_FRAMES: usize = 2;

/// Largest number of samples per channel in one frame.
const MAX_SAMPLES_PER_FRAME: usize = 1152;

/// An MP3 stream positioned on its first audio frame.
pub struct Mp3Stream {
    first_frame: FrameHeader,
    first_frame_position: u64,
    tags: Id3Tags,
    seeker: Mp3Seeker,
    reader: Mp3FrameReader,
}

impl Mp3Stream {
    /// Parses the stream for playback.
    pub fn open<S: ByteSource + ?Sized>(source: &mut S, settings: &Settings) -> Result<Self> {
        Self::read(source, settings, false)
    }

    /// Parses the stream for its metadata only.
    ///
    /// Unlike [`Mp3Stream::open`], leading Info and VBRI frames are skipped before a constant
    /// bitrate is assumed, so that the duration estimate is based on an audio frame.
    pub fn probe<S: ByteSource + ?Sized>(source: &mut S, settings: &Settings) -> Result<Self> {
        Self::read(source, settings, true)
    }

    fn read<S: ByteSource + ?Sized>(
        source: &mut S,
        settings: &Settings,
        metadata_only: bool,
    ) -> Result<Self> {
        let skipped = id3::skip_tags(source)?;
        if !skipped.leftover.is_empty() {
            let position = source.position()?;
            source.seek_to(position - skipped.leftover.len() as u64)?;
        }

        let mut reader = Mp3FrameReader::new();
        if !reader.scan_for_frame(source, settings.mp3_first_frame_scan)? {
            return Err(ContainerError::malformed(
                "file ended before the first frame was found",
            ));
        }
        let first_frame = current_header(&reader)?;
        let first_frame_position = reader.frame_position();
        if !reader.fill_frame_buffer(source)? {
            return Err(ContainerError::TruncatedInput("first MP3 frame"));
        }

        let xing = reader
            .frame()
            .and_then(|frame| XingSeeker::parse(&first_frame, reader.frame_position(), frame));

        let seeker = match (xing, source.content_length()) {
            (Some(xing), _) => {
                reader.next_frame(source)?;
                Mp3Seeker::Xing(xing)
            }
            (None, None) => Mp3Seeker::Stream,
            (None, Some(content_length)) => {
                if metadata_only {
                    skip_meta_frames(&mut reader, source)?;
                }
                let header = current_header(&reader)?;
                Mp3Seeker::ConstantRate(ConstantRateSeeker::new(
                    &header,
                    reader.frame_position(),
                    content_length,
                ))
            }
        };

        tracing::debug!(
            "MP3 stream: {} Hz, {} channels, {} ID3 tags, {} seeker",
            first_frame.sample_rate,
            first_frame.channels,
            skipped.tags.tag_count,
            seeker_name(&seeker)
        );

        Ok(Mp3Stream {
            first_frame,
            first_frame_position,
            tags: skipped.tags,
            seeker,
            reader,
        })
    }

    pub fn first_frame(&self) -> &FrameHeader {
        &self.first_frame
    }

    /// Absolute offset of the first frame, Xing or Info frames included.
    pub fn first_frame_position(&self) -> u64 {
        self.first_frame_position
    }

    pub fn tags(&self) -> &Id3Tags {
        &self.tags
    }

    pub fn seeker(&self) -> &Mp3Seeker {
        &self.seeker
    }

    /// Tag map handed to the gain resolver.
    fn gain_tags(&self, settings: &Settings) -> TagMap {
        let mut tags = TagMap::new();
        let value = self
            .tags
            .replay_gain_text
            .as_deref()
            .and_then(|text| id3::txxx_gain_value(text, settings.txxx_gain_parsing));
        if let Some(value) = value {
            tags.insert(REPLAYGAIN_TRACK_GAIN, value);
        }
        tags
    }
}

impl TrackInfo for Mp3Stream {
    fn title(&self) -> Option<&str> {
        self.tags.tags.get(id3::TITLE)
    }

    fn author(&self) -> Option<&str> {
        self.tags.tags.get(id3::ARTIST)
    }

    fn isrc(&self) -> Option<&str> {
        self.tags.tags.get(id3::ISRC)
    }

    fn length(&self) -> Option<Duration> {
        self.seeker.duration()
    }
}

fn current_header(reader: &Mp3FrameReader) -> Result<FrameHeader> {
    reader
        .frame_header()
        .copied()
        .ok_or_else(|| ContainerError::malformed("file ended before the first frame was found"))
}

fn skip_meta_frames<S: ByteSource + ?Sized>(
    reader: &mut Mp3FrameReader,
    source: &mut S,
) -> Result<()> {
    for _ in 0..MAX_SKIPPED_META_FRAMES {
        let header = current_header(reader)?;
        let is_meta = reader
            .frame()
            .is_some_and(|frame| is_meta_frame(&header, frame));
        if !is_meta {
            break;
        }
        if !reader.next_frame(source)? || !reader.fill_frame_buffer(source)? {
            return Err(ContainerError::malformed(
                "file ended before the first frame was found",
            ));
        }
    }
    Ok(())
}

fn seeker_name(seeker: &Mp3Seeker) -> &'static str {
    match seeker {
        Mp3Seeker::Xing(_) => "xing",
        Mp3Seeker::ConstantRate(_) => "constant rate",
        Mp3Seeker::Stream => "stream",
    }
}

/// Decodes an MP3 stream and feeds its frames to a pipeline.
pub struct Mp3TrackProvider<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = i16>,
    P: Pipeline,
{
    source: S,
    decoder: D,
    pipeline: P,
    settings: Settings,
    interrupt: Interrupt,
    stream: Option<Mp3Stream>,
    output: PcmBuffer<i16>,
    gain: GainState,
    state: Lifecycle,
}

impl<S, D, P> Mp3TrackProvider<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = i16>,
    P: Pipeline,
{
    pub fn new(source: S, decoder: D, pipeline: P, settings: Settings, interrupt: Interrupt) -> Self {
        Mp3TrackProvider {
            source,
            decoder,
            pipeline,
            settings,
            interrupt,
            stream: None,
            output: PcmBuffer::new(0, 0),
            gain: GainState::default(),
            state: Lifecycle::Created,
        }
    }

    /// Skips the ID3 tags, locates the first frame and configures the decoder and pipeline.
    pub fn parse_headers(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = Mp3Stream::open(&mut self.source, &self.settings)?;
        let first = *stream.first_frame();

        self.gain = gain::resolve(
            &stream.gain_tags(&self.settings),
            None,
            GainPolicy::LegacyOnly,
            &self.settings,
        );
        self.decoder.configure(CodecConfig::Mp3 {
            sample_rate: first.sample_rate,
            channels: first.channels,
        })?;
        self.pipeline.configure(PcmFormat::new(
            first.channels,
            first.sample_rate,
            SampleFormat::I16,
        ))?;

        self.output = PcmBuffer::new(first.channels, MAX_SAMPLES_PER_FRAME);
        self.stream = Some(stream);
        self.state = Lifecycle::HeaderParsed;
        Ok(())
    }

    pub fn stream(&self) -> Option<&Mp3Stream> {
        self.stream.as_ref()
    }

    pub fn is_replay_gain_applied(&self) -> bool {
        self.gain.is_applied()
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Reports a seek performed outside of this provider without repositioning.
    pub fn record_seek(&mut self, requested: Timecode, achieved: Timecode) -> Result<()> {
        self.state.ensure_ready()?;
        self.pipeline.seek_performed(requested, achieved)?;
        Ok(())
    }
}

impl<S, D, P> TrackProvider for Mp3TrackProvider<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = i16>,
    P: Pipeline,
{
    fn provide_frames(&mut self) -> Result<FrameOutcome> {
        self.state.ensure_ready()?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(ContainerError::HeadersNotParsed);
        };
        self.state = Lifecycle::Streaming;

        loop {
            if self.interrupt.is_raised() {
                return Ok(FrameOutcome::Interrupted);
            }
            if !stream.reader.fill_frame_buffer(&mut self.source)? {
                return Ok(FrameOutcome::EndOfStream);
            }

            if let (Some(header), Some(frame)) =
                (stream.reader.frame_header(), stream.reader.frame())
            {
                self.decoder.send_packet(frame)?;
                let produced = self.decoder.receive_frames(&mut self.output)?;
                if produced > 0 {
                    self.output
                        .set_frames(produced.min(header.samples_per_frame));
                    self.output.apply_volume(self.gain.multiplier());
                    self.pipeline.process(self.output.batch())?;
                }
            }

            stream.reader.next_frame(&mut self.source)?;
        }
    }

    fn seek_to_timecode(&mut self, timecode: Timecode) -> Result<Timecode> {
        self.state.ensure_ready()?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(ContainerError::HeadersNotParsed);
        };
        self.state = Lifecycle::Seeking;

        let frame_index = stream.seeker.seek(timecode, &mut self.source)?;
        let header = &stream.first_frame;
        let achieved =
            frame_index * header.samples_per_frame as u64 * 1000 / header.sample_rate as u64;

        self.decoder.reset();
        self.pipeline.seek_performed(timecode, achieved)?;
        if !stream.reader.scan_for_frame(&mut self.source, MAX_FRAME_SIZE)? {
            // The reader has no current frame, so the next provide_frames ends the stream.
            tracing::debug!("no MP3 frame found after seeking to {timecode} ms");
        }

        tracing::debug!("MP3 seek to {timecode} ms landed on frame {frame_index} ({achieved} ms)");
        self.state = Lifecycle::Streaming;
        Ok(achieved)
    }

    fn is_seekable(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|stream| stream.seeker.is_seekable())
    }

    fn duration(&self) -> Option<Duration> {
        self.stream.as_ref()?.seeker.duration()
    }

    fn close(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.state = Lifecycle::Closed;
        provider::close_pair(&mut self.decoder, Some(&mut self.pipeline))
    }
}

impl<S, D, P> TrackInfo for Mp3TrackProvider<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = i16>,
    P: Pipeline,
{
    fn title(&self) -> Option<&str> {
        self.stream.as_ref()?.title()
    }

    fn author(&self) -> Option<&str> {
        self.stream.as_ref()?.author()
    }

    fn isrc(&self) -> Option<&str> {
        self.stream.as_ref()?.isrc()
    }

    fn length(&self) -> Option<Duration> {
        self.duration()
    }
}

impl<S, D, P> Drop for Mp3TrackProvider<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = i16>,
    P: Pipeline,
{
    fn drop(&mut self) {
        let state = self.state;
        provider::close_on_drop(self, state);
    }
}
