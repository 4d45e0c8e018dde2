//! Decoder capability consumed by the track providers.
//!
//! The compressed audio itself is decoded by an engine outside this crate. Providers talk to it
//! through [`AudioDecoder`]: configure once, then alternate [`AudioDecoder::send_packet`] and
//! [`AudioDecoder::receive_frames`]. With the `symphonia` feature, [`SymphoniaDecoder`] offers
//! an implementation for MP3, FLAC and AAC.

use crate::common::{ChannelCount, SampleRate};
use crate::sample::PcmBuffer;

#[cfg(feature = "symphonia")]
mod symphonia;

#[cfg(feature = "symphonia")]
pub use self::symphonia::{DecodedSample, SymphoniaDecoder};

/// Compressed formats a decoder can be asked to handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodecKind {
    Flac,
    Mp3,
    Vorbis,
    Opus,
    Aac,
}

/// Codec-specific setup data.
#[derive(Clone, Copy, Debug)]
pub enum CodecConfig<'a> {
    Flac {
        /// Raw 34 byte STREAMINFO block body.
        stream_info: &'a [u8],
        sample_rate: SampleRate,
        channels: ChannelCount,
        bits_per_sample: u32,
        max_block_size: u32,
    },
    Mp3 {
        sample_rate: SampleRate,
        channels: ChannelCount,
    },
    Vorbis {
        /// Complete identification header packet, magic included.
        identification: &'a [u8],
        /// Complete setup header packet, magic included.
        setup: &'a [u8],
    },
    Opus {
        sample_rate: SampleRate,
        channels: ChannelCount,
        /// The `OpusHead` packet or Matroska codec private data.
        head: &'a [u8],
    },
    Aac {
        /// AudioSpecificConfig from the container.
        codec_private: &'a [u8],
        sample_rate: SampleRate,
        channels: ChannelCount,
    },
}

impl CodecConfig<'_> {
    pub fn kind(&self) -> CodecKind {
        match self {
            CodecConfig::Flac { .. } => CodecKind::Flac,
            CodecConfig::Mp3 { .. } => CodecKind::Mp3,
            CodecConfig::Vorbis { .. } => CodecKind::Vorbis,
            CodecConfig::Opus { .. } => CodecKind::Opus,
            CodecConfig::Aac { .. } => CodecKind::Aac,
        }
    }
}

/// Errors reported by a decoder engine.
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("decoder was used before it was configured")]
    NotConfigured,

    #[error("decoder for {expected:?} cannot be configured for {actual:?}")]
    WrongCodec { expected: CodecKind, actual: CodecKind },

    #[error("unsupported codec configuration: {0}")]
    Unsupported(String),

    #[error("packet could not be decoded: {0}")]
    InvalidPacket(String),

    #[error("decoder is closed")]
    Closed,

    #[cfg(feature = "symphonia")]
    #[error(transparent)]
    Symphonia(#[from] ::symphonia::core::errors::Error),
}

/// A codec decode engine.
///
/// For FLAC, decoders produce `i32` samples at the stream's native bit depth; the provider
/// converts them to 16-bit.
pub trait AudioDecoder {
    /// Sample type written to the output buffer.
    type Sample: Copy + Default;

    /// The codec this decoder handles.
    fn kind(&self) -> CodecKind;

    /// One-time setup from the container's codec private data.
    fn configure(&mut self, config: CodecConfig<'_>) -> Result<(), DecoderError>;

    /// Feeds one compressed packet or frame.
    fn send_packet(&mut self, packet: &[u8]) -> Result<(), DecoderError>;

    /// Moves pending decoded frames into `out` and returns how many were written.
    ///
    /// A return value lower than `out.capacity()` means nothing is left pending.
    fn receive_frames(&mut self, out: &mut PcmBuffer<Self::Sample>) -> Result<usize, DecoderError>;

    /// Drops state carried between packets, after the stream was repositioned.
    fn reset(&mut self) {}

    /// Releases the engine. Called exactly once.
    fn close(&mut self) -> Result<(), DecoderError>;
}

impl<D: AudioDecoder + ?Sized> AudioDecoder for Box<D> {
    type Sample = D::Sample;

    fn kind(&self) -> CodecKind {
        (**self).kind()
    }

    fn configure(&mut self, config: CodecConfig<'_>) -> Result<(), DecoderError> {
        (**self).configure(config)
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<(), DecoderError> {
        (**self).send_packet(packet)
    }

    fn receive_frames(&mut self, out: &mut PcmBuffer<Self::Sample>) -> Result<usize, DecoderError> {
        (**self).receive_frames(out)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn close(&mut self) -> Result<(), DecoderError> {
        (**self).close()
    }
}
