use std::time::Duration;

use crate::common::{ChannelCount, Timecode};
use crate::control::Interrupt;
use crate::error::{ContainerError, Result};
use crate::gain::{self, GainPolicy, GainState};
use crate::io::ByteSource;
use crate::pipeline::PacketRouter;
use crate::provider::{FrameOutcome, Lifecycle, TrackInfo, TrackProvider};
use crate::settings::Settings;
use crate::tags::TagMap;

use super::{
    read_comments, OggCodec, OggPacketStream, OggSeekTable, OggTrackBlueprint, OggTrackHandler,
};

pub const HEAD_MAGIC: &[u8] = b"OpusHead";
pub const TAGS_MAGIC: &[u8] = b"OpusTags";

/// Opus always decodes at 48 kHz; granule positions count samples at this rate.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

const HEAD_MIN_LEN: usize = 19;

/// The identification header of an Opus stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpusHead {
    pub version: u8,
    pub channels: ChannelCount,
    /// Samples at 48 kHz to discard from the start of the decoded output.
    pub pre_skip: u16,
    /// Sample rate of the original input, informational only.
    pub input_sample_rate: u32,
    /// Signed Q7.8 gain in dB to apply to the decoded output.
    pub output_gain: i16,
    pub mapping_family: u8,
}

impl OpusHead {
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < HEAD_MIN_LEN || !packet.starts_with(HEAD_MAGIC) {
            return Err(ContainerError::malformed("invalid OpusHead packet"));
        }

        let version = packet[8];
        if version >> 4 != 0 {
            return Err(ContainerError::malformed(format!(
                "unsupported Opus version {version}"
            )));
        }
        let channels = packet[9] as ChannelCount;
        if channels == 0 {
            return Err(ContainerError::malformed("OpusHead declares no channels"));
        }

        Ok(OpusHead {
            version,
            channels,
            pre_skip: u16::from_le_bytes([packet[10], packet[11]]),
            input_sample_rate: u32::from_le_bytes([
                packet[12], packet[13], packet[14], packet[15],
            ]),
            output_gain: i16::from_le_bytes([packet[16], packet[17]]),
            mapping_family: packet[18],
        })
    }
}

/// Plays an Ogg Opus stream through a [`PacketRouter`].
///
/// The router should be set up with
/// [`RouterConfig::opus`](crate::pipeline::RouterConfig::opus) from the blueprint's
/// identification packet.
pub struct OggOpusTrackHandler<S, R>
where
    S: ByteSource,
    R: PacketRouter,
{
    packets: OggPacketStream<S>,
    router: R,
    settings: Settings,
    interrupt: Interrupt,
    head: OpusHead,
    tags: TagMap,
    seek_table: Option<OggSeekTable>,
    gain: GainState,
    state: Lifecycle,
}

impl<S, R> OggOpusTrackHandler<S, R>
where
    S: ByteSource,
    R: PacketRouter,
{
    /// Reads the comment header following the identification packet of `blueprint` and builds
    /// the seek table.
    pub fn open(
        mut packets: OggPacketStream<S>,
        blueprint: &OggTrackBlueprint,
        router: R,
        settings: Settings,
        interrupt: Interrupt,
    ) -> Result<Self> {
        if blueprint.codec() != OggCodec::Opus {
            return Err(ContainerError::malformed("Ogg stream does not carry Opus"));
        }
        let head = OpusHead::parse(blueprint.identification())?;
        let comments = read_comments(&mut packets, TAGS_MAGIC, &settings)?;
        let seek_table = OggSeekTable::build(
            &mut packets,
            OPUS_SAMPLE_RATE,
            head.pre_skip as u64,
            settings.ogg_seek_points,
        )?;

        tracing::debug!(
            "Ogg Opus: {} channels, pre-skip {}, header gain {}",
            head.channels,
            head.pre_skip,
            head.output_gain
        );

        Ok(OggOpusTrackHandler {
            packets,
            router,
            settings,
            interrupt,
            head,
            tags: comments.tags,
            seek_table,
            gain: GainState::default(),
            state: Lifecycle::Created,
        })
    }

    pub fn head(&self) -> &OpusHead {
        &self.head
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }
}

impl<S, R> OggTrackHandler for OggOpusTrackHandler<S, R>
where
    S: ByteSource,
    R: PacketRouter,
{
    fn initialise(&mut self, desired: Timecode, achieved: Timecode) -> Result<()> {
        self.state.ensure_open()?;

        if self.state == Lifecycle::Created {
            self.gain = gain::resolve(
                &self.tags,
                Some(self.head.output_gain),
                GainPolicy::R128PlusHeader,
                &self.settings,
            );
            self.router.set_volume_multiplier(self.gain.multiplier());
            self.state = Lifecycle::HeaderParsed;
        }

        self.router.seek_performed(desired, achieved)
    }

    fn tags(&self) -> &TagMap {
        &self.tags
    }

    fn is_replay_gain_applied(&self) -> bool {
        self.gain.is_applied()
    }
}

impl<S, R> TrackProvider for OggOpusTrackHandler<S, R>
where
    S: ByteSource,
    R: PacketRouter,
{
    fn provide_frames(&mut self) -> Result<FrameOutcome> {
        self.state.ensure_ready()?;
        self.state = Lifecycle::Streaming;

        loop {
            if self.interrupt.is_raised() {
                return Ok(FrameOutcome::Interrupted);
            }
            let Some(packet) = self.packets.next_packet()? else {
                return Ok(FrameOutcome::EndOfStream);
            };
            if packet.is_empty() {
                continue;
            }
            self.router.process_input(packet)?;
            self.router.end_packet()?;
        }
    }

    fn seek_to_timecode(&mut self, timecode: Timecode) -> Result<Timecode> {
        self.state.ensure_ready()?;
        let table = self.seek_table.as_ref().ok_or(ContainerError::NotSeekable)?;
        self.state = Lifecycle::Seeking;

        let achieved = table.seek(&mut self.packets, timecode)?;
        self.router.seek_performed(timecode, achieved)?;

        tracing::debug!("Ogg Opus seek to {timecode} ms landed at {achieved} ms");
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
        self.router.close()
    }
}

impl<S, R> TrackInfo for OggOpusTrackHandler<S, R>
where
    S: ByteSource,
    R: PacketRouter,
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

impl<S, R> Drop for OggOpusTrackHandler<S, R>
where
    S: ByteSource,
    R: PacketRouter,
{
    fn drop(&mut self) {
        let state = self.state;
        crate::provider::close_on_drop(self, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_head() {
        let mut packet = HEAD_MAGIC.to_vec();
        packet.push(1);
        packet.push(2);
        packet.extend_from_slice(&312u16.to_le_bytes());
        packet.extend_from_slice(&44100u32.to_le_bytes());
        packet.extend_from_slice(&(-768i16).to_le_bytes());
        packet.push(0);

        let head = OpusHead::parse(&packet).unwrap();
        assert_eq!(head.channels, 2);
        assert_eq!(head.pre_skip, 312);
        assert_eq!(head.input_sample_rate, 44100);
        assert_eq!(head.output_gain, -768);
        assert_eq!(head.mapping_family, 0);
    }

    #[test]
    fn rejects_short_head() {
        assert!(OpusHead::parse(b"OpusHead\x01\x02").is_err());
    }

    #[test]
    fn rejects_future_major_version() {
        let mut packet = HEAD_MAGIC.to_vec();
        packet.extend_from_slice(&[0x10, 2, 0, 0, 0x80, 0xBB, 0, 0, 0, 0, 0]);
        assert!(OpusHead::parse(&packet).is_err());
    }
}
