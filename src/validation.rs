//! Sample-stream validation utilities.
//!
//! This module provides functions to check that converted frames are
//! consistent with the session's calibration. Useful for integration testing
//! against the virtual backend.

use crate::buffer::SampleBuffer;
use crate::session::CalibrationTable;
use crate::traits::{DaqError, Result, Sample};

/// Validates that the first `frames` frames of `buf` lie within the range of
/// their channel's calibration entry.
///
/// Samples are checked against the entry selected by flattened sample index
/// modulo the channel count. NaN samples fail.
///
/// # Errors
///
/// Returns [`DaqError::Read`] naming the offending sample if any value falls
/// outside its calibrated range, or if the buffer and table disagree on the
/// channel count.
pub fn validate_sample_bounds(
    buf: &SampleBuffer,
    frames: usize,
    table: &CalibrationTable,
) -> Result<()> {
    let spf = buf.samples_per_frame();
    if table.len() != spf {
        return Err(DaqError::Read {
            message: format!(
                "calibration table has {} entries for {spf} samples per frame",
                table.len()
            ),
        });
    }

    let count = frames.min(buf.frame_capacity()) * spf;
    for (i, &sample) in buf.samples().iter().take(count).enumerate() {
        let range = table.entries()[i % spf].range;
        if !(sample >= range.min && sample <= range.max) {
            return Err(DaqError::Read {
                message: format!(
                    "sample {i} = {sample} outside calibrated range [{}, {}]",
                    range.min, range.max
                ),
            });
        }
    }

    Ok(())
}

/// Validates that a sample series actually moves: the span between its
/// smallest and largest value must reach `min_span`.
///
/// Guards against a silent flat-line from a misconfigured source when a
/// varying signal is expected.
///
/// # Errors
///
/// Returns [`DaqError::Read`] if the series is empty or its span is below
/// `min_span`.
pub fn validate_activity(samples: &[Sample], min_span: f64) -> Result<()> {
    if samples.is_empty() {
        return Err(DaqError::Read {
            message: "cannot validate an empty sample series".to_owned(),
        });
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &sample in samples {
        min = min.min(sample);
        max = max.max(sample);
    }

    let span = max - min;
    if !(span >= min_span) {
        return Err(DaqError::Read {
            message: format!("signal span {span} below expected minimum {min_span}"),
        });
    }

    Ok(())
}
