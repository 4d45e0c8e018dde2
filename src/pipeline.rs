//! Downstream collaborators: the audio pipeline and the packet router.
//!
//! A [`Pipeline`] receives decoded, gain-adjusted PCM and seek reports. A [`PacketRouter`]
//! sits one step earlier for the codecs whose decoding is shared between containers (AAC and
//! Opus): it owns the decoder and applies the volume multiplier itself.

use crate::codec::{AudioDecoder, CodecConfig, CodecKind};
use crate::common::{ChannelCount, SampleRate, Timecode};
use crate::error::{ContainerError, Result};
use crate::sample::{PcmBatch, PcmBuffer};

/// Numeric representation of the samples in a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    I16,
    F32,
}

/// Shape of the PCM a provider will deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: ChannelCount,
    pub sample_rate: SampleRate,
    pub sample_format: SampleFormat,
}

impl PcmFormat {
    pub fn new(channels: ChannelCount, sample_rate: SampleRate, sample_format: SampleFormat) -> Self {
        PcmFormat {
            channels,
            sample_rate,
            sample_format,
        }
    }
}

/// Errors reported by the downstream pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline is closed")]
    Closed,

    #[error("pipeline cannot accept {0:?}")]
    UnsupportedFormat(PcmFormat),

    #[error("pipeline output failed: {0}")]
    Output(String),
}

/// Receives decoded PCM from a track provider.
pub trait Pipeline {
    /// Announces the PCM format. Called once, before the first batch.
    fn configure(&mut self, format: PcmFormat) -> Result<(), PipelineError> {
        let _ = format;
        Ok(())
    }

    fn process(&mut self, batch: PcmBatch<'_>) -> Result<(), PipelineError>;

    /// Reports that playback continues from `achieved` after `requested` was asked for.
    fn seek_performed(&mut self, requested: Timecode, achieved: Timecode) -> Result<(), PipelineError>;

    fn flush(&mut self) -> Result<(), PipelineError>;

    /// Releases the pipeline. Called exactly once.
    fn close(&mut self) -> Result<(), PipelineError>;
}

impl<P: Pipeline + ?Sized> Pipeline for Box<P> {
    fn configure(&mut self, format: PcmFormat) -> Result<(), PipelineError> {
        (**self).configure(format)
    }

    fn process(&mut self, batch: PcmBatch<'_>) -> Result<(), PipelineError> {
        (**self).process(batch)
    }

    fn seek_performed(&mut self, requested: Timecode, achieved: Timecode) -> Result<(), PipelineError> {
        (**self).seek_performed(requested, achieved)
    }

    fn flush(&mut self) -> Result<(), PipelineError> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        (**self).close()
    }
}

/// Decodes, scales and forwards packets of a codec shared between containers.
pub trait PacketRouter {
    /// Appends bytes of the current packet. A packet may arrive in several chunks.
    fn process_input(&mut self, input: &[u8]) -> Result<()>;

    /// Marks the current packet complete, decoding and forwarding its output.
    fn end_packet(&mut self) -> Result<()>;

    /// Sets the gain multiplier applied to every decoded batch.
    fn set_volume_multiplier(&mut self, multiplier: f32);

    fn seek_performed(&mut self, requested: Timecode, achieved: Timecode) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Releases the decoder and pipeline. Called exactly once.
    fn close(&mut self) -> Result<()>;
}

/// Decoder setup owned by a [`DecodingPacketRouter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterConfig {
    pub kind: CodecKind,
    pub sample_rate: SampleRate,
    pub channels: ChannelCount,
    pub codec_private: Vec<u8>,
    /// Largest number of frames a single packet can decode to.
    pub max_frames: usize,
}

impl RouterConfig {
    /// AAC with its AudioSpecificConfig. HE-AAC packets decode to at most 2048 frames.
    pub fn aac(codec_private: &[u8], sample_rate: SampleRate, channels: ChannelCount) -> Self {
        RouterConfig {
            kind: CodecKind::Aac,
            sample_rate,
            channels,
            codec_private: codec_private.to_vec(),
            max_frames: 2048,
        }
    }

    /// Opus at 48 kHz; a packet holds at most 120 ms.
    pub fn opus(head: &[u8], channels: ChannelCount) -> Self {
        RouterConfig {
            kind: CodecKind::Opus,
            sample_rate: 48000,
            channels,
            codec_private: head.to_vec(),
            max_frames: 5760,
        }
    }

    fn codec_config(&self) -> Result<CodecConfig<'_>> {
        match self.kind {
            CodecKind::Aac => Ok(CodecConfig::Aac {
                codec_private: &self.codec_private,
                sample_rate: self.sample_rate,
                channels: self.channels,
            }),
            CodecKind::Opus => Ok(CodecConfig::Opus {
                sample_rate: self.sample_rate,
                channels: self.channels,
                head: &self.codec_private,
            }),
            other => Err(ContainerError::malformed(format!(
                "{other:?} is not routed through a packet router"
            ))),
        }
    }
}

/// [`PacketRouter`] composed of a 16-bit decoder and a pipeline.
///
/// The decoder and pipeline are configured lazily, on the first complete packet.
pub struct DecodingPacketRouter<D, P> {
    decoder: D,
    pipeline: P,
    config: RouterConfig,
    packet: Vec<u8>,
    output: PcmBuffer<i16>,
    multiplier: f32,
    configured: bool,
    closed: bool,
}

impl<D, P> DecodingPacketRouter<D, P>
where
    D: AudioDecoder<Sample = i16>,
    P: Pipeline,
{
    pub fn new(decoder: D, pipeline: P, config: RouterConfig) -> Self {
        let output = PcmBuffer::new(config.channels, config.max_frames);
        DecodingPacketRouter {
            decoder,
            pipeline,
            config,
            packet: Vec::new(),
            output,
            multiplier: 1.0,
            configured: false,
            closed: false,
        }
    }

    pub fn volume_multiplier(&self) -> f32 {
        self.multiplier
    }

    fn ensure_configured(&mut self) -> Result<()> {
        if self.configured {
            return Ok(());
        }
        self.decoder.configure(self.config.codec_config()?)?;
        self.pipeline.configure(PcmFormat::new(
            self.config.channels,
            self.config.sample_rate,
            SampleFormat::I16,
        ))?;
        self.configured = true;
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(ContainerError::Closed);
        }
        Ok(())
    }
}

impl<D, P> PacketRouter for DecodingPacketRouter<D, P>
where
    D: AudioDecoder<Sample = i16>,
    P: Pipeline,
{
    fn process_input(&mut self, input: &[u8]) -> Result<()> {
        self.check_open()?;
        self.packet.extend_from_slice(input);
        Ok(())
    }

    fn end_packet(&mut self) -> Result<()> {
        self.check_open()?;
        if self.packet.is_empty() {
            return Ok(());
        }
        self.ensure_configured()?;

        let result = self.decoder.send_packet(&self.packet);
        self.packet.clear();
        result?;

        loop {
            let frames = self.decoder.receive_frames(&mut self.output)?;
            if frames > 0 {
                self.output.apply_volume(self.multiplier);
                self.pipeline.process(self.output.batch())?;
            }
            if frames < self.output.capacity() {
                return Ok(());
            }
        }
    }

    fn set_volume_multiplier(&mut self, multiplier: f32) {
        self.multiplier = multiplier;
    }

    fn seek_performed(&mut self, requested: Timecode, achieved: Timecode) -> Result<()> {
        self.check_open()?;
        self.packet.clear();
        self.decoder.reset();
        self.pipeline.seek_performed(requested, achieved)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        self.pipeline.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.check_open()?;
        self.closed = true;
        let pipeline = self.pipeline.close();
        let decoder = self.decoder.close();
        pipeline?;
        decoder?;
        Ok(())
    }
}
