//! Configuration shared by all track providers.
//!
//! Settings are plain values; loading them from files or the environment is the
//! responsibility of the embedding application. Construct with [`Settings::default`] and adjust
//! with the `with_*` methods:
//!
//! ```
//! use audiodemux::settings::{OpusHeaderGain, Settings};
//!
//! let settings = Settings::default()
//!     .with_replay_gain(true)
//!     .with_opus_header_gain(OpusHeaderGain::WithReplayGain);
//! assert!(settings.replay_gain());
//! ```

/// How the output gain field of an Opus identification header is treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpusHeaderGain {
    /// Always apply the header gain, even when ReplayGain normalization is disabled.
    ///
    /// RFC 7845 requires players to apply this gain, so this is the default.
    #[default]
    Always,
    /// Only apply the header gain when ReplayGain normalization is enabled.
    WithReplayGain,
}

/// How a `TXXX` ID3 frame carrying `REPLAYGAIN_TRACK_GAIN` is split into key and value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TxxxGainParsing {
    /// The description (up to the first NUL, or `=` when there is no NUL) must equal
    /// `REPLAYGAIN_TRACK_GAIN` ignoring case. The value is everything after the separator.
    #[default]
    Strict,
    /// Any text containing `REPLAYGAIN_TRACK_GAIN` and `dB` is accepted; NULs are treated as `=`
    /// and the second `=` separated field is taken as the value.
    Lenient,
}

/// Track provider configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Whether ReplayGain/R128 loudness normalization is applied.
    pub(crate) replay_gain: bool,

    /// Treatment of the Opus header output gain.
    pub(crate) opus_header_gain: OpusHeaderGain,

    /// Treatment of MP3 `TXXX` ReplayGain frames.
    pub(crate) txxx_gain_parsing: TxxxGainParsing,

    /// Number of bytes searched for the first MP3 frame after the ID3 tags.
    pub(crate) mp3_first_frame_scan: usize,

    /// Bytes of a Vorbis/Opus comment packet that are kept for tag parsing.
    pub(crate) comment_saved_limit: usize,

    /// Bytes of a Vorbis/Opus comment packet that are read at all before giving up.
    pub(crate) comment_read_limit: usize,

    /// Maximum number of points collected when building an Ogg seek table.
    pub(crate) ogg_seek_points: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            replay_gain: false,
            opus_header_gain: OpusHeaderGain::default(),
            txxx_gain_parsing: TxxxGainParsing::default(),
            mp3_first_frame_scan: 2048,
            comment_saved_limit: 128 * 1024,
            comment_read_limit: 120 * 1024 * 1024,
            ogg_seek_points: 256,
        }
    }
}

impl Settings {
    /// Enables or disables loudness normalization from track tags.
    pub fn with_replay_gain(mut self, enabled: bool) -> Self {
        self.replay_gain = enabled;
        self
    }

    /// Sets when the Opus header output gain is applied.
    pub fn with_opus_header_gain(mut self, mode: OpusHeaderGain) -> Self {
        self.opus_header_gain = mode;
        self
    }

    /// Sets how `TXXX` ReplayGain frames are split.
    pub fn with_txxx_gain_parsing(mut self, mode: TxxxGainParsing) -> Self {
        self.txxx_gain_parsing = mode;
        self
    }

    /// Sets how far past the ID3 tags to search for the first MP3 frame.
    pub fn with_mp3_first_frame_scan(mut self, bytes: usize) -> Self {
        self.mp3_first_frame_scan = bytes;
        self
    }

    /// Sets the saved and read limits for comment header packets.
    ///
    /// The read limit is raised to the saved limit if it is smaller.
    pub fn with_comment_limits(mut self, saved: usize, read: usize) -> Self {
        self.comment_saved_limit = saved;
        self.comment_read_limit = read.max(saved);
        self
    }

    /// Sets the maximum number of Ogg seek table points.
    pub fn with_ogg_seek_points(mut self, points: usize) -> Self {
        self.ogg_seek_points = points.max(1);
        self
    }

    pub fn replay_gain(&self) -> bool {
        self.replay_gain
    }

    pub fn opus_header_gain(&self) -> OpusHeaderGain {
        self.opus_header_gain
    }

    pub fn txxx_gain_parsing(&self) -> TxxxGainParsing {
        self.txxx_gain_parsing
    }
}
