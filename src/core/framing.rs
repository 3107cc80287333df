//! Splitting resampled sequences into overlapping analysis frames.
//!
//! A sequence of length `L` is cut into `frame_count + 1` segments of
//! `L / (frame_count + 1)` samples (the remainder is dropped from the end).
//! Every frame spans two consecutive segments, so adjacent frames overlap by
//! one segment.

use serde::{Deserialize, Serialize};

/// Segments must be longer than this for framing to succeed.
pub const MIN_SEGMENT_LENGTH: usize = 3;

/// Geometry of a successful framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    pub frame_count: usize,
    pub segment_length: usize,
    /// Trailing samples dropped from each axis
    pub discarded: usize,
}

impl FrameLayout {
    /// Compute the layout for a sequence of `data_length` samples.
    ///
    /// Returns `None` when the segments would be two samples or shorter,
    /// which is an expected outcome for short recordings.
    pub fn new(data_length: usize, frame_count: usize) -> Option<Self> {
        if frame_count == 0 {
            return None;
        }
        let segment_count = frame_count + 1;
        let segment_length = data_length / segment_count;
        if segment_length < MIN_SEGMENT_LENGTH {
            return None;
        }

        Some(Self {
            frame_count,
            segment_length,
            discarded: data_length % segment_count,
        })
    }

    /// Nominal frame length (two segments).
    pub fn frame_length(&self) -> usize {
        2 * self.segment_length
    }

    /// Length kept after dropping the remainder.
    pub fn used_length(&self) -> usize {
        (self.frame_count + 1) * self.segment_length
    }

    /// Sample range covered by frame `index`.
    pub fn frame_range(&self, index: usize) -> std::ops::Range<usize> {
        let start = index * self.segment_length;
        let end = (start + self.frame_length()).min(self.used_length());
        start..end
    }

    /// Smallest sequence length that can be framed into `frame_count` frames.
    pub fn min_data_length(frame_count: usize) -> usize {
        (frame_count + 1) * MIN_SEGMENT_LENGTH
    }
}

/// Frames of a multi-axis sequence, borrowed from the resampled data.
#[derive(Debug, Clone, PartialEq)]
pub struct Frames<'a> {
    pub layout: FrameLayout,
    /// `per_axis[axis][frame]`
    pub per_axis: Vec<Vec<&'a [f64]>>,
}

impl<'a> Frames<'a> {
    /// All axes' slices for one frame, in axis order.
    pub fn frame(&self, index: usize) -> Vec<&'a [f64]> {
        self.per_axis.iter().map(|frames| frames[index]).collect()
    }

    pub fn frame_count(&self) -> usize {
        self.layout.frame_count
    }

    pub fn axis_count(&self) -> usize {
        self.per_axis.len()
    }
}

/// Split equal-length axes into `frame_count` overlapping frames.
///
/// Returns `None` when there is not enough data, or when there are no axes.
pub fn split_in_frames<A: AsRef<[f64]>>(axes: &[A], frame_count: usize) -> Option<Frames<'_>> {
    let data_length = axes.first()?.as_ref().len();
    if axes.iter().any(|axis| axis.as_ref().len() != data_length) {
        tracing::warn!("cannot frame axes of unequal length");
        return None;
    }
    let layout = FrameLayout::new(data_length, frame_count)?;

    let per_axis = axes
        .iter()
        .map(|axis| {
            let axis = axis.as_ref();
            (0..layout.frame_count)
                .map(|index| &axis[layout.frame_range(index)])
                .collect()
        })
        .collect();

    Some(Frames { layout, per_axis })
}
