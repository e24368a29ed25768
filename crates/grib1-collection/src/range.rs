//! Axis selections expressed as `(first, last, stride)` triples.

use serde::{Deserialize, Serialize};

use crate::error::{CollectionError, Result};

/// A selection along one axis: `first, first + stride, ... <= last`.
///
/// Both endpoints are inclusive axis indices; `stride` is at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    first: usize,
    last: usize,
    stride: usize,
}

impl Range {
    /// Create a range, validating `first <= last` and `stride >= 1`.
    pub fn new(first: usize, last: usize, stride: usize) -> Result<Self> {
        if first > last {
            return Err(CollectionError::invalid_request(format!(
                "range first {} exceeds last {}",
                first, last
            )));
        }
        if stride == 0 {
            return Err(CollectionError::invalid_request("range stride must be >= 1"));
        }
        Ok(Self { first, last, stride })
    }

    /// A single-index selection.
    pub fn single(index: usize) -> Self {
        Self { first: index, last: index, stride: 1 }
    }

    /// The full extent of an axis of length `len` (which must be >= 1).
    pub fn all(len: usize) -> Self {
        debug_assert!(len >= 1);
        Self { first: 0, last: len.saturating_sub(1), stride: 1 }
    }

    pub fn first(&self) -> usize {
        self.first
    }

    pub fn last(&self) -> usize {
        self.last
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of indices the range enumerates.
    pub fn len(&self) -> usize {
        (self.last - self.first) / self.stride + 1
    }

    pub fn is_empty(&self) -> bool {
        false // a valid range always selects at least one index
    }

    /// Iterate the selected axis indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> {
        let Range { first, last, stride } = *self;
        (first..=last).step_by(stride)
    }

    /// Dense position of a selected axis index within this range.
    ///
    /// `value` must be one of the indices enumerated by [`Range::iter`].
    pub fn offset(&self, value: usize) -> usize {
        (value - self.first) / self.stride
    }

    /// Whether every selected index is below `axis_len`.
    pub fn fits(&self, axis_len: usize) -> bool {
        self.last < axis_len
    }
}
