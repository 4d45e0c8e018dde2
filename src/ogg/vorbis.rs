use std::time::Duration;

use crate::codec::{AudioDecoder, CodecConfig};
use crate::common::{ChannelCount, SampleRate, Timecode};
use crate::control::Interrupt;
use crate::error::{ContainerError, Result};
use crate::gain::{self, GainPolicy, GainState};
use crate::io::ByteSource;
use crate::pipeline::{PcmFormat, Pipeline, SampleFormat};
use crate::provider::{self, FrameOutcome, Lifecycle, TrackInfo, TrackProvider};
use crate::sample::PcmBuffer;
use crate::settings::Settings;
use crate::tags::TagMap;

use super::{
    read_comments, OggCodec, OggPacketStream, OggSeekTable, OggTrackBlueprint, OggTrackHandler,
};

pub const IDENTIFICATION_MAGIC: &[u8] = b"\x01vorbis";
pub const COMMENT_MAGIC: &[u8] = b"\x03vorbis";
pub const SETUP_MAGIC: &[u8] = b"\x05vorbis";

const IDENTIFICATION_LEN: usize = 30;

/// Frames per channel of the decode buffer.
pub(crate) const PCM_BUFFER_FRAMES: usize = 4096;

/// Fields of the Vorbis identification header used for playback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VorbisIdentification {
    pub channels: ChannelCount,
    pub sample_rate: SampleRate,
    pub nominal_bitrate: i32,
}

impl VorbisIdentification {
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < IDENTIFICATION_LEN || !packet.starts_with(IDENTIFICATION_MAGIC) {
            return Err(ContainerError::malformed("invalid Vorbis identification header"));
        }

        let le_u32 = |at: usize| {
            u32::from_le_bytes([packet[at], packet[at + 1], packet[at + 2], packet[at + 3]])
        };
        let version = le_u32(7);
        let channels = packet[11] as ChannelCount;
        let sample_rate = le_u32(12);

        if version != 0 {
            return Err(ContainerError::malformed(format!(
                "unsupported Vorbis version {version}"
            )));
        }
        if channels == 0 || sample_rate == 0 {
            return Err(ContainerError::malformed(
                "Vorbis identification header without channels or sample rate",
            ));
        }

        Ok(VorbisIdentification {
            channels,
            sample_rate,
            nominal_bitrate: le_u32(20) as i32,
        })
    }
}

/// Plays an Ogg Vorbis stream through a float decoder.
pub struct OggVorbisTrackHandler<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = f32>,
    P: Pipeline,
{
    packets: OggPacketStream<S>,
    decoder: D,
    pipeline: P,
    settings: Settings,
    interrupt: Interrupt,
    info: VorbisIdentification,
    identification: Vec<u8>,
    setup: Vec<u8>,
    tags: TagMap,
    seek_table: Option<OggSeekTable>,
    buffer: PcmBuffer<f32>,
    gain: GainState,
    state: Lifecycle,
}

impl<S, D, P> OggVorbisTrackHandler<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = f32>,
    P: Pipeline,
{
    /// Reads the comment and setup headers following the identification packet of `blueprint`
    /// and builds the seek table.
    pub fn open(
        mut packets: OggPacketStream<S>,
        blueprint: &OggTrackBlueprint,
        decoder: D,
        pipeline: P,
        settings: Settings,
        interrupt: Interrupt,
    ) -> Result<Self> {
        if blueprint.codec() != OggCodec::Vorbis {
            return Err(ContainerError::malformed("Ogg stream does not carry Vorbis"));
        }
        let info = VorbisIdentification::parse(blueprint.identification())?;
        let comments = read_comments(&mut packets, COMMENT_MAGIC, &settings)?;

        let setup = packets
            .next_packet()?
            .ok_or_else(|| ContainerError::malformed("End of track before header setup header"))?
            .to_vec();
        if !setup.starts_with(SETUP_MAGIC) {
            tracing::warn!("Vorbis setup header has an unexpected magic");
        }

        let seek_table =
            OggSeekTable::build(&mut packets, info.sample_rate, 0, settings.ogg_seek_points)?;

        tracing::debug!(
            "Ogg Vorbis: {} Hz, {} channels, {} tags",
            info.sample_rate,
            info.channels,
            comments.tags.len()
        );

        Ok(OggVorbisTrackHandler {
            packets,
            decoder,
            pipeline,
            settings,
            interrupt,
            info,
            identification: blueprint.identification().to_vec(),
            setup,
            tags: comments.tags,
            seek_table,
            buffer: PcmBuffer::new(info.channels, PCM_BUFFER_FRAMES),
            gain: GainState::default(),
            state: Lifecycle::Created,
        })
    }

    pub fn identification(&self) -> &VorbisIdentification {
        &self.info
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Decodes one packet and forwards everything the decoder produces for it.
    fn decode_packet(&mut self) -> Result<bool> {
        let Some(packet) = self.packets.next_packet()? else {
            return Ok(false);
        };
        if packet.is_empty() {
            return Ok(true);
        }
        self.decoder.send_packet(packet)?;

        loop {
            let frames = self.decoder.receive_frames(&mut self.buffer)?;
            if frames > 0 {
                self.buffer.apply_volume(self.gain.multiplier());
                self.pipeline.process(self.buffer.batch())?;
            }
            if frames < self.buffer.capacity() {
                return Ok(true);
            }
        }
    }
}

impl<S, D, P> OggTrackHandler for OggVorbisTrackHandler<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = f32>,
    P: Pipeline,
{
    fn initialise(&mut self, desired: Timecode, achieved: Timecode) -> Result<()> {
        self.state.ensure_open()?;

        if self.state == Lifecycle::Created {
            self.gain = gain::resolve(&self.tags, None, GainPolicy::LegacyOnly, &self.settings);
            self.decoder.configure(CodecConfig::Vorbis {
                identification: &self.identification,
                setup: &self.setup,
            })?;
            self.pipeline.configure(PcmFormat::new(
                self.info.channels,
                self.info.sample_rate,
                SampleFormat::F32,
            ))?;
            self.state = Lifecycle::HeaderParsed;
        }

        self.pipeline.seek_performed(desired, achieved)?;
        Ok(())
    }

    fn tags(&self) -> &TagMap {
        &self.tags
    }

    fn is_replay_gain_applied(&self) -> bool {
        self.gain.is_applied()
    }
}

impl<S, D, P> TrackProvider for OggVorbisTrackHandler<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = f32>,
    P: Pipeline,
{
    fn provide_frames(&mut self) -> Result<FrameOutcome> {
        self.state.ensure_ready()?;
        self.state = Lifecycle::Streaming;

        loop {
            if self.interrupt.is_raised() {
                return Ok(FrameOutcome::Interrupted);
            }
            if !self.decode_packet()? {
                return Ok(FrameOutcome::EndOfStream);
            }
        }
    }

    fn seek_to_timecode(&mut self, timecode: Timecode) -> Result<Timecode> {
        self.state.ensure_ready()?;
        let table = self.seek_table.as_ref().ok_or(ContainerError::NotSeekable)?;
        self.state = Lifecycle::Seeking;

        let achieved = table.seek(&mut self.packets, timecode)?;
        self.decoder.reset();
        self.pipeline.seek_performed(timecode, achieved)?;

        tracing::debug!("Ogg Vorbis seek to {timecode} ms landed at {achieved} ms");
        self.state = Lifecycle::Streaming;
        Ok(achieved)
    }

    fn is_seekable(&self) -> bool {
        self.seek_table.is_some()
    }

    fn duration(&self) -> Option<Duration> {
        self.seek_table.as_ref()?.duration()
    }

    fn close(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.state = Lifecycle::Closed;
        provider::close_pair(&mut self.decoder, Some(&mut self.pipeline))
    }
}

impl<S, D, P> TrackInfo for OggVorbisTrackHandler<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = f32>,
    P: Pipeline,
{
    fn title(&self) -> Option<&str> {
        super::title(&self.tags)
    }

    fn author(&self) -> Option<&str> {
        super::author(&self.tags)
    }

    fn isrc(&self) -> Option<&str> {
        super::isrc(&self.tags)
    }

    fn length(&self) -> Option<Duration> {
        self.duration()
    }
}

impl<S, D, P> Drop for OggVorbisTrackHandler<S, D, P>
where
    S: ByteSource,
    D: AudioDecoder<Sample = f32>,
    P: Pipeline,
{
    fn drop(&mut self) {
        let state = self.state;
        provider::close_on_drop(self, state);
    }
}
