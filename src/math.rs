/// Converts decibels to a linear amplitude multiplier.
///
/// `0.0` dB maps to exactly `1.0`.
#[inline]
pub fn db_to_linear(decibels: f32) -> f32 {
    if decibels == 0.0 {
        return 1.0;
    }
    10f32.powf(decibels / 20.0)
}

/// Converts a signed Q7.8 fixed point gain to decibels.
///
/// This is the representation used by the Opus output gain header field and by the
/// `R128_*_GAIN` tags.
#[inline]
pub fn q78_to_db(raw: i32) -> f32 {
    raw as f32 / 256.0
}
