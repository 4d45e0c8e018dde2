use crate::common::Timecode;
use crate::error::Result;
use crate::gain::{self, GainPolicy, GainState};
use crate::pipeline::PacketRouter;
use crate::provider::Lifecycle;
use crate::settings::Settings;
use crate::tags::TagMap;

use super::{MatroskaAudioTrack, MatroskaTrackConsumer};

/// Offset of the Q7.8 output gain in an `OpusHead` stored as codec private data.
const HEADER_GAIN_OFFSET: usize = 16;

/// Feeds Opus block payloads to a [`PacketRouter`], one packet per block.
pub struct MatroskaOpusTrackConsumer<R: PacketRouter> {
    track: MatroskaAudioTrack,
    router: R,
    gain: GainState,
    state: Lifecycle,
}

impl<R: PacketRouter> MatroskaOpusTrackConsumer<R> {
    pub fn new(track: MatroskaAudioTrack, tags: &TagMap, mut router: R, settings: &Settings) -> Self {
        let header_gain = header_gain(&track.codec_private);
        let gain = gain::resolve(tags, header_gain, GainPolicy::R128PlusHeader, settings);
        if gain.is_applied() {
            router.set_volume_multiplier(gain.multiplier());
        }

        MatroskaOpusTrackConsumer {
            track,
            router,
            gain,
            state: Lifecycle::Created,
        }
    }
}

/// Output gain from codec private data long enough to hold it.
fn header_gain(codec_private: &[u8]) -> Option<i16> {
    let bytes = codec_private.get(HEADER_GAIN_OFFSET..HEADER_GAIN_OFFSET + 2)?;
    Some(i16::from_le_bytes([bytes[0], bytes[1]]))
}

impl<R: PacketRouter> MatroskaTrackConsumer for MatroskaOpusTrackConsumer<R> {
    fn track(&self) -> &MatroskaAudioTrack {
        &self.track
    }

    fn initialise(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.state = Lifecycle::HeaderParsed;
        Ok(())
    }

    fn consume(&mut self, payload: &[u8]) -> Result<()> {
        self.state.ensure_ready()?;
        self.state = Lifecycle::Streaming;

        if payload.is_empty() {
            return Ok(());
        }
        self.router.process_input(payload)?;
        self.router.end_packet()
    }

    fn seek_performed(&mut self, requested: Timecode, achieved: Timecode) -> Result<()> {
        self.state.ensure_open()?;
        self.router.seek_performed(requested, achieved)
    }

    fn flush(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.router.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.state = Lifecycle::Closed;
        self.router.close()
    }

    fn is_replay_gain_applied(&self) -> bool {
        self.gain.is_applied()
    }
}

impl<R: PacketRouter> Drop for MatroskaOpusTrackConsumer<R> {
    fn drop(&mut self) {
        let state = self.state;
        super::close_on_drop(self, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_gain_needs_eighteen_bytes() {
        let mut private = b"OpusHead\x01\x02\x38\x01\x80\xBB\x00\x00".to_vec();
        assert_eq!(header_gain(&private), None);
        private.extend_from_slice(&(-512i16).to_le_bytes());
        assert_eq!(header_gain(&private), Some(-512));
    }
}
