use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{
    CodecParameters, CodecType, Decoder, DecoderOptions, CODEC_TYPE_AAC, CODEC_TYPE_FLAC,
    CODEC_TYPE_MP3,
};
use symphonia::core::conv::ConvertibleSample;
use symphonia::core::errors::Error;
use symphonia::core::formats::Packet;

use super::{AudioDecoder, CodecConfig, CodecKind, DecoderError};
use crate::common::ChannelCount;
use crate::sample::PcmBuffer;

/// Consecutive corrupt packets tolerated before decoding fails.
const MAX_DECODE_RETRIES: usize = 3;

/// Output sample types supported by [`SymphoniaDecoder`].
pub trait DecodedSample: ConvertibleSample + Copy + Default {
    /// Restores a sample Symphonia scaled to the full range of the type.
    ///
    /// Only meaningful for `i32` FLAC output, which providers expect at the native bit depth.
    fn from_full_scale(self, bits_per_sample: u32) -> Self {
        let _ = bits_per_sample;
        self
    }
}

impl DecodedSample for i16 {}

impl DecodedSample for f32 {}

impl DecodedSample for i32 {
    #[inline]
    fn from_full_scale(self, bits_per_sample: u32) -> Self {
        if (1..32).contains(&bits_per_sample) {
            self >> (32 - bits_per_sample)
        } else {
            self
        }
    }
}

/// [`AudioDecoder`] backed by a Symphonia codec, for MP3, FLAC and AAC.
pub struct SymphoniaDecoder<S: DecodedSample> {
    kind: CodecKind,
    decoder: Option<Box<dyn Decoder>>,
    closed: bool,
    bits_per_sample: u32,
    /// Planar samples of the last decoded packet.
    pending: Vec<S>,
    pending_frames: usize,
    pending_offset: usize,
    channels: usize,
    timestamp: u64,
    decode_errors: usize,
}

impl<S: DecodedSample> SymphoniaDecoder<S> {
    pub fn new(kind: CodecKind) -> Self {
        SymphoniaDecoder {
            kind,
            decoder: None,
            closed: false,
            bits_per_sample: 0,
            pending: Vec::new(),
            pending_frames: 0,
            pending_offset: 0,
            channels: 0,
            timestamp: 0,
            decode_errors: 0,
        }
    }

    fn codec_type(&self) -> Result<CodecType, DecoderError> {
        match self.kind {
            CodecKind::Flac => Ok(CODEC_TYPE_FLAC),
            CodecKind::Mp3 => Ok(CODEC_TYPE_MP3),
            CodecKind::Aac => Ok(CODEC_TYPE_AAC),
            other => Err(DecoderError::Unsupported(format!(
                "{other:?} is not decoded through Symphonia"
            ))),
        }
    }
}

fn channel_layout(count: ChannelCount) -> Channels {
    let count = (count as u32).min(31);
    Channels::from_bits_truncate((1u32 << count) - 1)
}

impl<S: DecodedSample> AudioDecoder for SymphoniaDecoder<S> {
    type Sample = S;

    fn kind(&self) -> CodecKind {
        self.kind
    }

    fn configure(&mut self, config: CodecConfig<'_>) -> Result<(), DecoderError> {
        if self.closed {
            return Err(DecoderError::Closed);
        }
        if config.kind() != self.kind {
            return Err(DecoderError::WrongCodec {
                expected: self.kind,
                actual: config.kind(),
            });
        }

        let mut params = CodecParameters::new();
        params.for_codec(self.codec_type()?);
        match config {
            CodecConfig::Flac {
                stream_info,
                sample_rate,
                channels,
                bits_per_sample,
                max_block_size,
            } => {
                params
                    .with_sample_rate(sample_rate)
                    .with_channels(channel_layout(channels))
                    .with_bits_per_sample(bits_per_sample)
                    .with_max_frames_per_packet(max_block_size as u64)
                    .with_extra_data(stream_info.to_vec().into_boxed_slice());
                self.bits_per_sample = bits_per_sample;
            }
            CodecConfig::Mp3 {
                sample_rate,
                channels,
            } => {
                params
                    .with_sample_rate(sample_rate)
                    .with_channels(channel_layout(channels));
            }
            CodecConfig::Aac {
                codec_private,
                sample_rate,
                channels,
            } => {
                params
                    .with_sample_rate(sample_rate)
                    .with_channels(channel_layout(channels));
                if !codec_private.is_empty() {
                    params.with_extra_data(codec_private.to_vec().into_boxed_slice());
                }
            }
            CodecConfig::Vorbis { .. } | CodecConfig::Opus { .. } => {
                return Err(DecoderError::Unsupported(format!(
                    "{:?} configuration",
                    config.kind()
                )))
            }
        }

        let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;
        self.decoder = Some(decoder);
        Ok(())
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<(), DecoderError> {
        if self.closed {
            return Err(DecoderError::Closed);
        }
        let decoder = self.decoder.as_mut().ok_or(DecoderError::NotConfigured)?;

        let packet = Packet::new_from_slice(0, self.timestamp, 0, packet);
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(Error::DecodeError(reason)) => {
                self.decode_errors += 1;
                if self.decode_errors > MAX_DECODE_RETRIES {
                    return Err(DecoderError::InvalidPacket(reason.to_owned()));
                }
                tracing::debug!("dropping undecodable packet: {reason}");
                self.pending_frames = 0;
                self.pending_offset = 0;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        self.decode_errors = 0;

        let spec = *decoded.spec();
        let frames = decoded.frames();
        let mut buffer = SampleBuffer::<S>::new(decoded.capacity() as u64, spec);
        buffer.copy_planar_ref(decoded);

        let bits = self.bits_per_sample;
        self.channels = spec.channels.count();
        self.pending.clear();
        self.pending.extend(
            buffer
                .samples()
                .iter()
                .map(|sample| sample.from_full_scale(bits)),
        );
        self.pending_frames = frames;
        self.pending_offset = 0;
        self.timestamp += frames as u64;
        Ok(())
    }

    fn receive_frames(&mut self, out: &mut PcmBuffer<S>) -> Result<usize, DecoderError> {
        if self.closed {
            return Err(DecoderError::Closed);
        }
        let available = self.pending_frames - self.pending_offset;
        let frames = available.min(out.capacity());
        let channels = self.channels.min(out.channel_count());

        for channel in 0..channels {
            let start = channel * self.pending_frames + self.pending_offset;
            out.channel_mut(channel)[..frames]
                .copy_from_slice(&self.pending[start..start + frames]);
        }

        self.pending_offset += frames;
        out.set_frames(frames);
        Ok(frames)
    }

    fn reset(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
        self.pending_frames = 0;
        self.pending_offset = 0;
    }

    fn close(&mut self) -> Result<(), DecoderError> {
        if self.closed {
            return Err(DecoderError::Closed);
        }
        self.closed = true;
        if let Some(mut decoder) = self.decoder.take() {
            decoder.finalize();
        }
        self.pending = Vec::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_scale_flac_samples_are_shifted_back() {
        assert_eq!((-5i32 << 16).from_full_scale(16), -5);
        assert_eq!((100i32 << 8).from_full_scale(24), 100);
        assert_eq!(7i32.from_full_scale(32), 7);
        assert_eq!(0.5f32.from_full_scale(16), 0.5);
    }

    #[test]
    fn vorbis_is_rejected() {
        let mut decoder = SymphoniaDecoder::<f32>::new(CodecKind::Vorbis);
        let err = decoder
            .configure(CodecConfig::Vorbis {
                identification: &[],
                setup: &[],
            })
            .unwrap_err();
        assert!(matches!(err, DecoderError::Unsupported(_)));
    }

    #[test]
    fn packets_before_configure_fail() {
        let mut decoder = SymphoniaDecoder::<i16>::new(CodecKind::Mp3);
        assert!(matches!(
            decoder.send_packet(&[0xFF, 0xFB]),
            Err(DecoderError::NotConfigured)
        ));
        let mut out = PcmBuffer::new(2, 16);
        assert_eq!(decoder.receive_frames(&mut out).unwrap(), 0);
    }
}
