use crate::common::Timecode;
use crate::error::Result;
use crate::gain::{self, GainPolicy, GainState};
use crate::pipeline::PacketRouter;
use crate::provider::Lifecycle;
use crate::settings::Settings;
use crate::tags::TagMap;

use super::{MatroskaAudioTrack, MatroskaTrackConsumer};

/// Size of the chunks block payloads are handed to the router in.
const TRANSFER_CHUNK: usize = 4096;

/// Feeds AAC block payloads to a [`PacketRouter`].
///
/// The router is expected to be built with
/// [`RouterConfig::aac`](crate::pipeline::RouterConfig::aac) from the track's codec private
/// data.
pub struct MatroskaAacTrackConsumer<R: PacketRouter> {
    track: MatroskaAudioTrack,
    router: R,
    gain: GainState,
    state: Lifecycle,
}

impl<R: PacketRouter> MatroskaAacTrackConsumer<R> {
    pub fn new(track: MatroskaAudioTrack, tags: &TagMap, mut router: R, settings: &Settings) -> Self {
        let gain = gain::resolve(tags, None, GainPolicy::R128Preferred, settings);
        if gain.is_applied() {
            router.set_volume_multiplier(gain.multiplier());
        }

        MatroskaAacTrackConsumer {
            track,
            router,
            gain,
            state: Lifecycle::Created,
        }
    }
}

impl<R: PacketRouter> MatroskaTrackConsumer for MatroskaAacTrackConsumer<R> {
    fn track(&self) -> &MatroskaAudioTrack {
        &self.track
    }

    fn initialise(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        tracing::debug!(
            "initialising AAC track with expected frequency {} and channel count {}",
            self.track.audio.sampling_frequency,
            self.track.audio.channels
        );
        self.state = Lifecycle::HeaderParsed;
        Ok(())
    }

    fn consume(&mut self, payload: &[u8]) -> Result<()> {
        self.state.ensure_ready()?;
        self.state = Lifecycle::Streaming;

        for chunk in payload.chunks(TRANSFER_CHUNK) {
            self.router.process_input(chunk)?;
        }
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

impl<R: PacketRouter> Drop for MatroskaAacTrackConsumer<R> {
    fn drop(&mut self) {
        let state = self.state;
        super::close_on_drop(self, state);
    }
}
