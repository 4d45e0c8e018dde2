use crate::codec::{AudioDecoder, CodecConfig};
use crate::common::Timecode;
use crate::error::{ContainerError, Result};
use crate::gain::{self, GainPolicy, GainState};
use crate::ogg::vorbis::PCM_BUFFER_FRAMES;
use crate::pipeline::{PcmFormat, Pipeline, SampleFormat};
use crate::provider::{self, Lifecycle};
use crate::sample::PcmBuffer;
use crate::settings::Settings;
use crate::tags::TagMap;

use super::{AudioDetails, MatroskaAudioTrack, MatroskaTrackConsumer, XiphHeaders};

/// Offset of the channel count in the identification header: 7 byte magic, 4 byte version.
const CHANNELS_OFFSET: usize = 11;
const SAMPLE_RATE_OFFSET: usize = 12;

/// Decodes Vorbis block payloads with a float decoder.
///
/// The codec private data holds the three Vorbis header packets, Xiph laced.
pub struct MatroskaVorbisTrackConsumer<D, P>
where
    D: AudioDecoder<Sample = f32>,
    P: Pipeline,
{
    track: MatroskaAudioTrack,
    details: AudioDetails,
    decoder: D,
    pipeline: P,
    buffer: PcmBuffer<f32>,
    gain: GainState,
    state: Lifecycle,
}

impl<D, P> MatroskaVorbisTrackConsumer<D, P>
where
    D: AudioDecoder<Sample = f32>,
    P: Pipeline,
{
    pub fn new(
        track: MatroskaAudioTrack,
        tags: &TagMap,
        decoder: D,
        pipeline: P,
        settings: &Settings,
    ) -> Result<Self> {
        let details = fill_missing_details(track.audio, &track.codec_private)?;
        let gain = gain::resolve(tags, None, GainPolicy::R128Preferred, settings);

        Ok(MatroskaVorbisTrackConsumer {
            track,
            details,
            decoder,
            pipeline,
            buffer: PcmBuffer::new(details.channels, PCM_BUFFER_FRAMES),
            gain,
            state: Lifecycle::Created,
        })
    }

    /// Audio details with the channel count and sample rate filled in from the headers when the
    /// container left them out.
    pub fn details(&self) -> &AudioDetails {
        &self.details
    }
}

fn fill_missing_details(details: AudioDetails, codec_private: &[u8]) -> Result<AudioDetails> {
    if details.channels != 0 && details.sampling_frequency > 0.0 {
        return Ok(details);
    }

    let identification = XiphHeaders::split(codec_private)?.identification;
    let mut filled = details;
    if filled.channels == 0 {
        let channels = *identification.get(CHANNELS_OFFSET).ok_or_else(|| {
            ContainerError::malformed("Vorbis identification header too short for channel count")
        })?;
        filled.channels = channels as u16;
    }
    if filled.sampling_frequency <= 0.0 {
        if let Some(rate) = identification.get(SAMPLE_RATE_OFFSET..SAMPLE_RATE_OFFSET + 4) {
            filled.sampling_frequency =
                u32::from_le_bytes([rate[0], rate[1], rate[2], rate[3]]) as f32;
        }
    }

    tracing::debug!(
        "filled Matroska Vorbis details from headers: {} channels, {} Hz",
        filled.channels,
        filled.sampling_frequency
    );
    Ok(filled)
}

impl<D, P> MatroskaTrackConsumer for MatroskaVorbisTrackConsumer<D, P>
where
    D: AudioDecoder<Sample = f32>,
    P: Pipeline,
{
    fn track(&self) -> &MatroskaAudioTrack {
        &self.track
    }

    fn initialise(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        if self.state != Lifecycle::Created {
            return Ok(());
        }

        let headers = XiphHeaders::split(&self.track.codec_private)?;
        self.decoder.configure(CodecConfig::Vorbis {
            identification: headers.identification,
            setup: headers.setup,
        })?;
        self.pipeline.configure(PcmFormat::new(
            self.details.channels,
            self.details.sample_rate(),
            SampleFormat::F32,
        ))?;

        self.state = Lifecycle::HeaderParsed;
        Ok(())
    }

    fn consume(&mut self, payload: &[u8]) -> Result<()> {
        self.state.ensure_ready()?;
        self.state = Lifecycle::Streaming;

        self.decoder.send_packet(payload)?;
        loop {
            let frames = self.decoder.receive_frames(&mut self.buffer)?;
            if frames > 0 {
                self.buffer.apply_volume(self.gain.multiplier());
                self.pipeline.process(self.buffer.batch())?;
            }
            if frames < self.buffer.capacity() {
                return Ok(());
            }
        }
    }

    fn seek_performed(&mut self, requested: Timecode, achieved: Timecode) -> Result<()> {
        self.state.ensure_open()?;
        self.decoder.reset();
        self.pipeline.seek_performed(requested, achieved)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.pipeline.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.state = Lifecycle::Closed;
        provider::close_pair(&mut self.decoder, Some(&mut self.pipeline))
    }

    fn is_replay_gain_applied(&self) -> bool {
        self.gain.is_applied()
    }
}

impl<D, P> Drop for MatroskaVorbisTrackConsumer<D, P>
where
    D: AudioDecoder<Sample = f32>,
    P: Pipeline,
{
    fn drop(&mut self) {
        let state = self.state;
        super::close_on_drop(self, state);
    }
}
