//! Owned tensor storage with row-major strides and bounds-checked slicing.

use ndarray::{ArrayViewD, IxDyn};

use crate::element::TensorElement;
use crate::error::{Result, TensorError};
use crate::view::TensorView;

/// Flat buffer of `T` plus the dimension sizes that describe it.
///
/// An empty shape describes a flat 1-D view over all of `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct StridedBlob<T> {
    data: Vec<T>,
    shape: Vec<usize>,
}

impl<T: TensorElement> StridedBlob<T> {
    /// Wrap `data` with `shape`. Fails when the shape does not describe exactly
    /// `data.len()` elements; an empty shape is always accepted.
    pub fn new(data: Vec<T>, shape: Vec<usize>) -> Result<Self> {
        if !shape.is_empty() {
            let expected = element_count(&shape)?;
            if expected != data.len() {
                return Err(TensorError::ShapeMismatch {
                    expected,
                    actual: data.len(),
                });
            }
        }
        Ok(Self { data, shape })
    }

    pub fn from_flat(data: Vec<T>) -> Self {
        Self {
            data,
            shape: Vec::new(),
        }
    }

    /// Copy a typed view (for example an engine output) into an owned blob.
    pub fn from_view(view: &TensorView<'_>) -> Result<Self> {
        let actual = view.element_type();
        let data = view
            .data()
            .typed::<T>()
            .ok_or(TensorError::ElementTypeMismatch {
                expected: T::ELEMENT_TYPE,
                actual,
            })?;
        let shape = view
            .shape()
            .iter()
            .enumerate()
            .map(|(axis, &extent)| {
                usize::try_from(extent).map_err(|_| TensorError::NegativeDimension { axis, extent })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(data.to_vec(), shape)
    }

    /// Dimension sizes as given at construction (possibly empty).
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Shape used for indexing: the stored shape, or `[len]` for a flat blob.
    pub fn dims(&self) -> Vec<usize> {
        if self.shape.is_empty() {
            vec![self.data.len()]
        } else {
            self.shape.clone()
        }
    }

    /// Dimension sizes in the signed form used by tensor views.
    pub fn dims_i64(&self) -> Vec<i64> {
        self.dims().iter().map(|&d| d as i64).collect()
    }

    pub fn rank(&self) -> usize {
        self.dims().len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<usize>) {
        let dims = self.dims();
        (self.data, dims)
    }

    /// Row-major strides: the last dimension has stride 1.
    pub fn strides(&self) -> Vec<usize> {
        row_major_strides(&self.dims())
    }

    /// Contiguous run selected by a prefix of dimension indices.
    ///
    /// With `k` indices the run covers every combination of the remaining
    /// dimensions, `stride[k - 1]` elements. No indices selects the whole
    /// buffer; a full set of indices selects one element.
    pub fn index(&self, indices: &[usize]) -> Result<&[T]> {
        let dims = self.dims();
        if indices.len() > dims.len() {
            return Err(TensorError::RankExceeded {
                rank: dims.len(),
                indices: indices.len(),
            });
        }
        for (axis, (&index, &extent)) in indices.iter().zip(&dims).enumerate() {
            if index >= extent {
                return Err(TensorError::IndexOutOfRange {
                    axis,
                    index,
                    extent,
                });
            }
        }

        let strides = row_major_strides(&dims);
        let start: usize = indices.iter().zip(&strides).map(|(i, s)| i * s).sum();
        let len = match indices.len() {
            0 => self.data.len(),
            k => strides[k - 1],
        };
        let end = start + len;
        if end > self.data.len() {
            return Err(TensorError::OutOfBounds {
                start,
                end,
                len: self.data.len(),
            });
        }
        Ok(&self.data[start..end])
    }

    /// Dynamic-rank ndarray view sharing this blob's storage.
    pub fn as_array(&self) -> ArrayViewD<'_, T> {
        ArrayViewD::from_shape(IxDyn(&self.dims()), &self.data)
            .expect("blob data length is validated at construction")
    }

    /// Borrowed tensor view over the blob.
    pub fn view(&self) -> TensorView<'_> {
        TensorView::new(self.dims_i64(), T::tensor_slice(&self.data))
    }
}

/// Product of `dims`, failing instead of wrapping on overflow.
pub(crate) fn element_count(dims: &[usize]) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| TensorError::ElementCountOverflow {
            dims: dims.to_vec(),
        })
}

pub(crate) fn row_major_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = dims[i + 1] * strides[i + 1];
    }
    strides
}
