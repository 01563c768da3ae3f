//! Preallocated storage for normalized frames.

use crate::session::ChannelConfig;
use crate::traits::{DaqError, Result, Sample};

/// Fixed-capacity storage for normalized frames.
///
/// A buffer holds `frame_capacity * samples_per_frame` samples in one flat,
/// zero-initialized store, frame-major: the sample for channel `ch` of frame
/// `f` lives at index `f * spf + ch`. Buffers have a lifecycle independent of
/// any session and may be reused across read calls, and across sessions with
/// the same channel count.
#[derive(Debug)]
pub struct SampleBuffer {
    spf: usize,
    frames: usize,
    samples: Vec<Sample>,
}

impl SampleBuffer {
    /// Allocate a zero-initialized buffer for `frames` frames of `spf`
    /// samples each.
    ///
    /// Fails with [`DaqError::Allocation`] if the store cannot be obtained;
    /// no partial state is retained in that case.
    pub fn allocate(spf: usize, frames: usize) -> Result<Self> {
        let total = frames
            .checked_mul(spf)
            .ok_or(DaqError::Allocation { frames, spf })?;

        let mut samples = Vec::new();
        samples
            .try_reserve_exact(total)
            .map_err(|_| DaqError::Allocation { frames, spf })?;
        samples.resize(total, 0.0);

        Ok(Self {
            spf,
            frames,
            samples,
        })
    }

    /// Allocate a buffer sized for the channel count of `config`.
    pub fn for_config(config: &ChannelConfig, frames: usize) -> Result<Self> {
        Self::allocate(config.channels as usize, frames)
    }

    /// Number of samples in each frame.
    #[must_use]
    pub const fn samples_per_frame(&self) -> usize {
        self.spf
    }

    /// Number of frames this buffer can hold. Fixed at allocation.
    #[must_use]
    pub const fn frame_capacity(&self) -> usize {
        self.frames
    }

    /// The flat sample store, frame-major.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Mutable access to the flat sample store.
    pub fn samples_mut(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// The samples of frame `index`, if it is within capacity.
    #[must_use]
    pub fn frame(&self, index: usize) -> Option<&[Sample]> {
        let start = index.checked_mul(self.spf)?;
        self.samples.get(start..start + self.spf)
    }
}
