//! Blocking and non-blocking frame reads: raw device codes in, normalized
//! frames out.

use crate::buffer::SampleBuffer;
use crate::session::DaqSession;
use crate::traits::{DaqDevice, DaqError, RawSample, Result, RAW_SAMPLE_SIZE};

/// Upper bound on frames fetched by a single read, bounding the raw scratch
/// buffer.
pub const MAX_FRAMES_PER_READ: usize = 4096;

/// Reads raw samples from a session's device and converts them through the
/// calibration table into a [`SampleBuffer`].
///
/// Holds the session mutably for its lifetime, so reads on one session are
/// serialized by construction.
pub struct FrameReader<'a, D: DaqDevice> {
    session: &'a mut DaqSession<D>,
}

impl<'a, D: DaqDevice> FrameReader<'a, D> {
    pub(crate) fn new(session: &'a mut DaqSession<D>) -> Self {
        Self { session }
    }

    /// Read up to `frames` frames into `buf`.
    ///
    /// The request is capped at the buffer's capacity. A blocking read
    /// suspends until the driver delivers data and returns fewer frames than
    /// requested only on a short read from the device; a non-blocking read
    /// is additionally capped at what the driver has already buffered and
    /// never suspends. Partial trailing frames are dropped. Returns the
    /// number of frames converted.
    pub fn read(&mut self, buf: &mut SampleBuffer, frames: usize, blocking: bool) -> Result<usize> {
        let spf = buf.samples_per_frame();
        if spf != self.session.config.channels as usize {
            return Err(DaqError::InvalidConfig {
                message: format!(
                    "buffer holds {spf} samples per frame but the session reads {} channels",
                    self.session.config.channels
                ),
            });
        }

        let subdevice = self.session.config.subdevice;
        let frame_bytes = spf * RAW_SAMPLE_SIZE;
        let mut frames = frames.min(buf.frame_capacity()).min(MAX_FRAMES_PER_READ);

        if !blocking {
            let ready = self.session.device.buffered_bytes(subdevice)? / frame_bytes;
            frames = frames.min(ready);
        }

        if frames == 0 {
            return Ok(0);
        }

        // Heap-backed scratch for the raw codes, dropped on every exit path.
        let mut raw = vec![0u8; frames * frame_bytes];

        // Some drivers only expose recently captured samples after a poll.
        self.session.device.poll(subdevice)?;

        let bytes = self.session.device.read_raw(&mut raw)?;
        let frames_read = bytes / frame_bytes;
        let samples = frames_read * spf;

        let entries = self.session.calibration.entries();
        let dest = buf.samples_mut();
        for (i, chunk) in raw.chunks_exact(RAW_SAMPLE_SIZE).take(samples).enumerate() {
            let code = RawSample::from_ne_bytes([chunk[0], chunk[1]]);
            dest[i] = entries[i % spf].to_physical(code);
        }

        Ok(frames_read)
    }
}
