//! Decoded sample storage and volume application.
//!
//! Decoders write into a [`PcmBuffer`] that is allocated once per provider and reused for
//! every frame. After decoding, [`PcmBuffer::apply_volume`] scales the decoded frames in place
//! and [`PcmBuffer::batch`] lends them to the downstream pipeline.

use crate::common::ChannelCount;

/// Represents a value of a single decoded sample.
///
/// Implemented for `i16` (16-bit PCM, silence at `0`, full scale at `i16::MIN`/`i16::MAX`) and
/// `f32` (silence at `0.0`, nominal full scale at `-1.0`/`1.0`).
pub trait Sample: Copy + Default + PartialEq + Send + 'static {
    /// Multiplies the value of this sample by the given amount.
    fn amplify(self, value: f32) -> Self;

    /// Returns the value corresponding to the absence of sound.
    fn zero_value() -> Self;

    /// Wraps planar channel data of this sample type as a batch.
    fn batch(channels: &[Vec<Self>], frames: usize) -> PcmBatch<'_>;
}

impl Sample for i16 {
    /// Rounds to the nearest integer and saturates at the 16-bit range.
    #[inline]
    fn amplify(self, value: f32) -> i16 {
        ((self as f32) * value)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16
    }

    #[inline]
    fn zero_value() -> i16 {
        0
    }

    fn batch(channels: &[Vec<i16>], frames: usize) -> PcmBatch<'_> {
        PcmBatch::I16(Planar { channels, frames })
    }
}

impl Sample for f32 {
    /// Plain multiplication, limiting is left to the pipeline.
    #[inline]
    fn amplify(self, value: f32) -> f32 {
        self * value
    }

    #[inline]
    fn zero_value() -> f32 {
        0.0
    }

    fn batch(channels: &[Vec<f32>], frames: usize) -> PcmBatch<'_> {
        PcmBatch::F32(Planar { channels, frames })
    }
}

/// Planar per-channel sample buffer with a fixed capacity in frames.
#[derive(Clone, Debug)]
pub struct PcmBuffer<S> {
    channels: Vec<Vec<S>>,
    capacity: usize,
    frames: usize,
}

impl<S: Copy + Default> PcmBuffer<S> {
    /// Allocates `channels` planes of `capacity` frames each.
    pub fn new(channels: ChannelCount, capacity: usize) -> Self {
        PcmBuffer {
            channels: vec![vec![S::default(); capacity]; channels as usize],
            capacity,
            frames: 0,
        }
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of valid frames currently held.
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Marks the first `frames` frames as valid, clamped to the capacity.
    #[inline]
    pub fn set_frames(&mut self, frames: usize) {
        self.frames = frames.min(self.capacity);
    }

    #[inline]
    pub fn clear(&mut self) {
        self.frames = 0;
    }

    /// Valid samples of one channel.
    pub fn channel(&self, index: usize) -> &[S] {
        &self.channels[index][..self.frames]
    }

    /// Whole plane of one channel, for decoders to write into.
    pub fn channel_mut(&mut self, index: usize) -> &mut [S] {
        &mut self.channels[index]
    }

    /// All planes at full capacity.
    pub fn planes_mut(&mut self) -> impl Iterator<Item = &mut [S]> {
        self.channels.iter_mut().map(Vec::as_mut_slice)
    }

    /// Copies interleaved samples in, returning the number of frames stored.
    ///
    /// Frames beyond the capacity are dropped.
    pub fn fill_interleaved(&mut self, interleaved: &[S]) -> usize {
        let channel_count = self.channels.len().max(1);
        let frames = (interleaved.len() / channel_count).min(self.capacity);
        for (frame, samples) in interleaved.chunks_exact(channel_count).take(frames).enumerate() {
            for (plane, &sample) in self.channels.iter_mut().zip(samples) {
                plane[frame] = sample;
            }
        }
        self.frames = frames;
        frames
    }
}

impl<S: Sample> PcmBuffer<S> {
    /// Scales every valid sample in place. A multiplier of exactly `1.0` is a no-op.
    pub fn apply_volume(&mut self, multiplier: f32) {
        if multiplier == 1.0 {
            return;
        }
        let frames = self.frames;
        for plane in &mut self.channels {
            for sample in &mut plane[..frames] {
                *sample = sample.amplify(multiplier);
            }
        }
    }

    /// Borrows the valid frames as a batch for the pipeline.
    pub fn batch(&self) -> PcmBatch<'_> {
        S::batch(&self.channels, self.frames)
    }
}

/// Borrowed planar samples.
#[derive(Clone, Copy, Debug)]
pub struct Planar<'a, S> {
    channels: &'a [Vec<S>],
    frames: usize,
}

impl<'a, S: Copy> Planar<'a, S> {
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &'a [S] {
        &self.channels[index][..self.frames]
    }

    pub fn interleaved(&self) -> Vec<S> {
        let mut out = Vec::with_capacity(self.frames * self.channels.len());
        for frame in 0..self.frames {
            out.extend(self.channels.iter().map(|plane| plane[frame]));
        }
        out
    }
}

/// A batch of decoded frames handed to the pipeline.
#[derive(Clone, Copy, Debug)]
pub enum PcmBatch<'a> {
    I16(Planar<'a, i16>),
    F32(Planar<'a, f32>),
}

impl PcmBatch<'_> {
    pub fn frames(&self) -> usize {
        match self {
            PcmBatch::I16(planar) => planar.frames(),
            PcmBatch::F32(planar) => planar.frames(),
        }
    }

    pub fn channel_count(&self) -> usize {
        match self {
            PcmBatch::I16(planar) => planar.channel_count(),
            PcmBatch::F32(planar) => planar.channel_count(),
        }
    }
}
