//! Consumers for audio tracks demultiplexed from Matroska/WebM files.
//!
//! EBML parsing and block extraction happen outside this crate. The demuxer hands each block
//! payload of the selected track to a [`MatroskaTrackConsumer`], which decodes it and forwards the
//! PCM downstream.

use crate::common::{ChannelCount, Timecode};
use crate::error::{ContainerError, Result};
use crate::ogg::lacing;
use crate::provider::Lifecycle;

mod aac;
mod opus;
mod vorbis;

pub use self::aac::MatroskaAacTrackConsumer;
pub use self::opus::MatroskaOpusTrackConsumer;
pub use self::vorbis::MatroskaVorbisTrackConsumer;

/// The `Audio` element of a track entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioDetails {
    pub sampling_frequency: f32,
    pub output_sampling_frequency: f32,
    pub channels: ChannelCount,
    pub bit_depth: u32,
}

impl AudioDetails {
    pub fn new(sampling_frequency: f32, channels: ChannelCount) -> Self {
        AudioDetails {
            sampling_frequency,
            output_sampling_frequency: 0.0,
            channels,
            bit_depth: 0,
        }
    }

    /// Sampling frequency rounded to whole Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sampling_frequency.round() as u32
    }
}

/// Audio codecs with a Matroska consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatroskaCodec {
    Aac,
    Opus,
    Vorbis,
}

impl MatroskaCodec {
    /// Maps a `CodecID` such as `A_OPUS` or `A_AAC/MPEG4/LC` to the consumer that handles it.
    pub fn from_codec_id(codec_id: &str) -> Option<Self> {
        match codec_id {
            "A_OPUS" => Some(MatroskaCodec::Opus),
            "A_VORBIS" => Some(MatroskaCodec::Vorbis),
            id if id.starts_with("A_AAC") => Some(MatroskaCodec::Aac),
            _ => None,
        }
    }
}

/// A track entry of the file as far as the consumers need it.
#[derive(Clone, Debug, PartialEq)]
pub struct MatroskaAudioTrack {
    pub number: u64,
    pub codec_id: String,
    pub codec_private: Vec<u8>,
    pub audio: AudioDetails,
}

impl MatroskaAudioTrack {
    pub fn codec(&self) -> Option<MatroskaCodec> {
        MatroskaCodec::from_codec_id(&self.codec_id)
    }
}

/// Decodes the block payloads of one Matroska audio track.
pub trait MatroskaTrackConsumer {
    fn track(&self) -> &MatroskaAudioTrack;

    /// Sets up the decoder. Must be called before the first payload.
    fn initialise(&mut self) -> Result<()>;

    /// Decodes one block payload and forwards the output.
    fn consume(&mut self, payload: &[u8]) -> Result<()>;

    /// Reports that playback continues from `achieved` after `requested` was asked for.
    fn seek_performed(&mut self, requested: Timecode, achieved: Timecode) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Releases the decoder and pipeline. A second call fails with [`ContainerError::Closed`].
    fn close(&mut self) -> Result<()>;

    fn is_replay_gain_applied(&self) -> bool;
}

/// Header packets stored Xiph laced in the codec private data of a Vorbis track.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct XiphHeaders<'a> {
    pub identification: &'a [u8],
    pub comments: &'a [u8],
    pub setup: &'a [u8],
}

impl<'a> XiphHeaders<'a> {
    /// Splits codec private data made of a lace count byte (number of packets minus one), the
    /// laced sizes of all packets but the last, and the packets themselves.
    pub(crate) fn split(codec_private: &'a [u8]) -> Result<Self> {
        let (&count, rest) = codec_private
            .split_first()
            .ok_or_else(|| ContainerError::malformed("empty codec private data"))?;
        if count != 2 {
            return Err(ContainerError::malformed("Unexpected lacing count"));
        }

        let (sizes, consumed) = lacing::read_lacing_values(rest, 2)
            .ok_or_else(|| ContainerError::malformed("codec private data ends in lacing"))?;
        let packets = &rest[consumed..];
        let (identification_len, comments_len) = (sizes[0], sizes[1]);
        if identification_len + comments_len > packets.len() {
            return Err(ContainerError::malformed(
                "codec private data shorter than its laced headers",
            ));
        }

        let (identification, packets) = packets.split_at(identification_len);
        let (comments, setup) = packets.split_at(comments_len);
        Ok(XiphHeaders {
            identification,
            comments,
            setup,
        })
    }
}

/// Closes a consumer that is dropped while still open, logging instead of failing.
fn close_on_drop<C: MatroskaTrackConsumer + ?Sized>(consumer: &mut C, state: Lifecycle) {
    if state == Lifecycle::Closed {
        return;
    }
    if let Err(err) = consumer.close() {
        tracing::warn!(
            "failed to close Matroska track {} on drop: {err}",
            consumer.track().number
        );
    }
}
