//! Dense float result arrays returned by reads.

/// A row-major dense float array with an explicit shape.
///
/// Missing cells carry the NaN sentinel documented on the schema's
/// `missing_value` attribute. The caller owns the buffer exclusively.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatArray {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl FloatArray {
    pub(crate) fn from_parts(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    /// Element-wise lengths of the ranges supplied to the read.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The backing buffer in row-major order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Consume the array, keeping only the buffer.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at a multidimensional index; `None` when the rank or any
    /// coordinate is out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0usize;
        for (&idx, &dim) in index.iter().zip(self.shape.iter()) {
            if idx >= dim {
                return None;
            }
            flat = flat * dim + idx;
        }
        self.data.get(flat).copied()
    }
}
