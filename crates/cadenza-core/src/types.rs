//! Common types for Cadenza
//!
//! This module contains the fundamental audio types used throughout the
//! engine: stereo samples, stereo buffers, and the per-block render context
//! handed to every processor.

use std::ops::{Index, IndexMut};

/// Default sample rate used when no configuration overrides it
pub const DEFAULT_SAMPLE_RATE: f32 = 48000.0;

/// Default render block size in frames
pub const DEFAULT_BLOCK_SIZE: usize = 128;

/// Tempo used by tempo-synced processors when no tempo source is attached
pub const DEFAULT_BPM: f64 = 120.0;

/// Audio sample type
pub type Sample = f32;

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right],
/// so a block casts straight to interleaved `f32` with bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Average of both channels
    #[inline]
    pub fn mid(&self) -> Sample {
        (self.left + self.right) * 0.5
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A buffer of stereo samples
///
/// This is the block type every node in the routing graph reads and writes.
/// Render-thread code only ever calls the non-allocating methods on buffers
/// that were pre-allocated with [`StereoBuffer::silence`].
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from a mono signal (duplicated to both channels)
    pub fn from_mono(mono: &[Sample]) -> Self {
        Self {
            samples: mono.iter().map(|&s| StereoSample::mono(s)).collect(),
        }
    }

    /// Get the number of stereo samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Fills any newly exposed elements with silence. Never allocates as long
    /// as `new_len` does not exceed the capacity the buffer was created with.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let current_len = self.samples.len();
        if new_len > current_len {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    /// Get a slice of the samples
    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    /// Get a mutable slice of the samples
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Copy samples to an interleaved output buffer [L, R, L, R, ...]
    pub fn to_interleaved(&self, output: &mut [Sample]) {
        let len = self.samples.len().min(output.len() / 2);
        output[..len * 2].copy_from_slice(bytemuck::cast_slice(&self.samples[..len]));
    }

    /// Add another buffer scaled by `gain`
    pub fn add_scaled(&mut self, other: &StereoBuffer, gain: Sample) {
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src * gain;
        }
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Copy from another buffer (real-time safe if pre-allocated)
    ///
    /// This method will not allocate if `self.capacity() >= other.len()`.
    pub fn copy_from(&mut self, other: &StereoBuffer) {
        let len = other.samples.len();
        debug_assert!(
            len <= self.samples.capacity(),
            "copy_from: insufficient capacity ({} < {})",
            self.samples.capacity(),
            len
        );
        self.set_len_from_capacity(len);
        self.samples[..len].copy_from_slice(&other.samples[..len]);
    }

    /// Get an iterator over the samples
    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    /// Get a mutable iterator over the samples
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

/// Per-block render context
///
/// Carries what the external collaborators supply: the sample rate, the
/// current tempo from the tempo source and the render clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessContext {
    /// Sample rate in Hz
    pub sample_rate: f32,
    /// Current tempo in beats per minute
    pub bpm: f64,
    /// Render time of the first frame in this block, in samples
    pub frame_time: u64,
}

impl ProcessContext {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            bpm: DEFAULT_BPM,
            frame_time: 0,
        }
    }

    pub fn with_bpm(mut self, bpm: f64) -> Self {
        self.bpm = bpm;
        self
    }

}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_sample_operations() {
        let a = StereoSample::new(1.0, 2.0);
        let b = StereoSample::new(0.5, 0.5);

        let sum = a + b;
        assert_eq!(sum.left, 1.5);
        assert_eq!(sum.right, 2.5);

        let scaled = a * 0.5;
        assert_eq!(scaled.left, 0.5);
        assert_eq!(scaled.right, 1.0);
        assert_eq!(a.mid(), 1.5);
    }

    #[test]
    fn test_stereo_buffer_to_interleaved() {
        let mut buffer = StereoBuffer::silence(2);
        buffer[0] = StereoSample::new(1.0, 2.0);
        buffer[1] = StereoSample::new(3.0, 4.0);
        let mut output = [0.0; 6];
        buffer.to_interleaved(&mut output);

        assert_eq!(output, [1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_set_len_keeps_capacity() {
        let mut buffer = StereoBuffer::silence(256);
        buffer.set_len_from_capacity(64);
        assert_eq!(buffer.len(), 64);
        buffer.set_len_from_capacity(256);
        assert_eq!(buffer.len(), 256);
        assert!(buffer.iter().all(|s| *s == StereoSample::silence()));
    }
}
