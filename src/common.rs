use std::time::Duration;

/// Stream sample rate (samples per second per channel).
pub type SampleRate = u32;

/// Number of channels in a stream.
pub type ChannelCount = u16;

/// Position in a track, in milliseconds.
pub type Timecode = u64;

/// Converts a per-channel sample index to a timecode, rounding down.
///
/// A zero sample rate yields zero rather than dividing by it.
#[inline]
pub fn samples_to_timecode(samples: u64, sample_rate: SampleRate) -> Timecode {
    if sample_rate == 0 {
        return 0;
    }
    (samples as u128 * 1000 / sample_rate as u128) as Timecode
}

/// Converts a timecode to the per-channel sample index it starts at.
#[inline]
pub fn timecode_to_samples(timecode: Timecode, sample_rate: SampleRate) -> u64 {
    (timecode as u128 * sample_rate as u128 / 1000) as u64
}

/// Converts sample count and sample rate to precise duration.
///
/// The fractional second is carried with nanosecond precision.
pub fn samples_to_duration(samples: u64, sample_rate: SampleRate) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let sample_rate = sample_rate as u64;
    let secs = samples / sample_rate;
    let nanos = ((samples % sample_rate) * 1_000_000_000) / sample_rate;
    Duration::new(secs, nanos as u32)
}
