//! Loudness normalization gain resolution.
//!
//! Every container resolves its playback gain through [`resolve`]; the formats only differ in
//! the [`GainPolicy`] they pass:
//!
//! | Container / codec        | Policy                          |
//! |--------------------------|---------------------------------|
//! | FLAC, MP3, Ogg Vorbis    | [`GainPolicy::LegacyOnly`]      |
//! | Matroska AAC and Vorbis  | [`GainPolicy::R128Preferred`]   |
//! | Ogg Opus, Matroska Opus  | [`GainPolicy::R128PlusHeader`]  |
//!
//! The tag value is chosen first (`R128_TRACK_GAIN` over `REPLAYGAIN_TRACK_GAIN` where the
//! policy allows it), then the Opus header gain is added on top. Malformed values are logged
//! and contribute nothing.

use crate::math::{db_to_linear, q78_to_db};
use crate::settings::{OpusHeaderGain, Settings};
use crate::tags::{TagMap, R128_TRACK_GAIN, REPLAYGAIN_TRACK_GAIN};

/// Which gain sources a format honours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GainPolicy {
    /// Only `REPLAYGAIN_TRACK_GAIN`.
    LegacyOnly,
    /// `R128_TRACK_GAIN` if it parses, else `REPLAYGAIN_TRACK_GAIN`.
    R128Preferred,
    /// As [`GainPolicy::R128Preferred`], plus the Opus header output gain.
    R128PlusHeader,
}

/// Gain fixed for the lifetime of a provider.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainState {
    decibels: f32,
    multiplier: f32,
    applied: bool,
}

impl Default for GainState {
    fn default() -> Self {
        GainState {
            decibels: 0.0,
            multiplier: 1.0,
            applied: false,
        }
    }
}

impl GainState {
    /// Gain state for a total adjustment in dB. Zero leaves samples untouched.
    pub fn from_decibels(decibels: f32) -> Self {
        if decibels == 0.0 {
            return GainState::default();
        }
        GainState {
            decibels,
            multiplier: db_to_linear(decibels),
            applied: true,
        }
    }

    #[inline]
    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    pub fn decibels(&self) -> f32 {
        self.decibels
    }

    /// Whether samples are scaled at all.
    #[inline]
    pub fn is_applied(&self) -> bool {
        self.applied
    }
}

/// A gain tag whose value could not be parsed.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum GainParseError {
    #[error("R128 gain {0:?} is not an integer")]
    R128(String),
    #[error("ReplayGain value {0:?} is not a number")]
    ReplayGain(String),
}

/// Parses a Q7.8 `R128_*_GAIN` tag value to dB.
pub fn parse_r128(value: &str) -> Result<f32, GainParseError> {
    value
        .trim()
        .parse::<i32>()
        .map(q78_to_db)
        .map_err(|_| GainParseError::R128(value.to_owned()))
}

/// Parses a `"<float> dB"` ReplayGain tag value to dB.
pub fn parse_replay_gain(value: &str) -> Result<f32, GainParseError> {
    let trimmed = value.trim();
    let number = trimmed
        .strip_suffix("dB")
        .or_else(|| trimmed.strip_suffix("db"))
        .or_else(|| trimmed.strip_suffix("DB"))
        .unwrap_or(trimmed);
    number
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|db| db.is_finite())
        .ok_or_else(|| GainParseError::ReplayGain(value.to_owned()))
}

/// Resolves the playback gain from tags and, for Opus, the identification header gain.
pub fn resolve(
    tags: &TagMap,
    header_gain: Option<i16>,
    policy: GainPolicy,
    settings: &Settings,
) -> GainState {
    let header_db = match (policy, header_gain) {
        (GainPolicy::R128PlusHeader, Some(raw)) if raw != 0 => Some(q78_to_db(raw as i32)),
        _ => None,
    };

    if !settings.replay_gain {
        return match header_db {
            Some(db) if settings.opus_header_gain == OpusHeaderGain::Always => {
                tracing::debug!("applying Opus header gain of {db} dB");
                GainState::from_decibels(db)
            }
            _ => GainState::default(),
        };
    }

    let tag_db = tag_gain(tags, policy);
    let total = tag_db.unwrap_or(0.0) + header_db.unwrap_or(0.0);
    let state = GainState::from_decibels(total);
    if state.is_applied() {
        tracing::debug!(
            "applying gain: tag {tag_db:?} dB, header {header_db:?} dB -> {}x multiplier",
            state.multiplier
        );
    }
    state
}

fn tag_gain(tags: &TagMap, policy: GainPolicy) -> Option<f32> {
    if policy != GainPolicy::LegacyOnly {
        if let Some(value) = tags.get(R128_TRACK_GAIN) {
            match parse_r128(value) {
                Ok(db) => return Some(db),
                Err(err) => tracing::warn!("ignoring gain tag: {err}"),
            }
        }
    }

    let value = tags.get(REPLAYGAIN_TRACK_GAIN)?;
    match parse_replay_gain(value) {
        Ok(db) => Some(db),
        Err(err) => {
            tracing::warn!("ignoring gain tag: {err}");
            None
        }
    }
}
