use std::fmt;

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::element::TensorElement;
use crate::error::{Result, TensorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

impl ImageSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.width, self.height)
    }
}

/// Row-major pixel buffer with interleaved channels (HWC).
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
    channels: usize,
}

/// Sample count of a `rows x cols x channels` image. Rejects images without
/// channels and extents whose product does not fit in `usize`.
fn sample_count(rows: usize, cols: usize, channels: usize) -> Result<usize> {
    if channels == 0 {
        return Err(TensorError::NoChannels);
    }
    rows.checked_mul(cols)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| TensorError::ElementCountOverflow {
            dims: vec![rows, cols, channels],
        })
}

impl<T: TensorElement> Image<T> {
    /// Wrap interleaved samples. `data.len()` must equal `rows * cols * channels`.
    pub fn new(data: Vec<T>, rows: usize, cols: usize, channels: usize) -> Result<Self> {
        let expected = sample_count(rows, cols, channels)?;
        if data.len() != expected {
            return Err(TensorError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            rows,
            cols,
            channels,
        })
    }

    pub fn filled(rows: usize, cols: usize, channels: usize, value: T) -> Result<Self> {
        let len = sample_count(rows, cols, channels)?;
        Ok(Self {
            data: vec![value; len],
            rows,
            cols,
            channels,
        })
    }

    /// Build an image by evaluating `f(row, col, channel)` for every sample.
    pub fn from_fn(
        rows: usize,
        cols: usize,
        channels: usize,
        mut f: impl FnMut(usize, usize, usize) -> T,
    ) -> Result<Self> {
        let mut data = Vec::with_capacity(sample_count(rows, cols, channels)?);
        for r in 0..rows {
            for c in 0..cols {
                for ch in 0..channels {
                    data.push(f(r, c, ch));
                }
            }
        }
        Ok(Self {
            data,
            rows,
            cols,
            channels,
        })
    }

    /// Take ownership of an `(rows, cols, channels)` array.
    pub fn from_array(array: Array3<T>) -> Result<Self> {
        let (rows, cols, channels) = array.dim();
        if channels == 0 {
            return Err(TensorError::NoChannels);
        }
        let data = if array.is_standard_layout() {
            array.into_raw_vec_and_offset().0
        } else {
            array.iter().copied().collect()
        };
        Ok(Self {
            data,
            rows,
            cols,
            channels,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.cols, self.rows)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Interleaved samples of the pixel at `(row, col)`.
    pub fn pixel(&self, row: usize, col: usize) -> Option<&[T]> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let start = (row * self.cols + col) * self.channels;
        Some(&self.data[start..start + self.channels])
    }

    /// HWC view over the samples.
    pub fn as_array(&self) -> ArrayView3<'_, T> {
        ArrayView3::from_shape((self.rows, self.cols, self.channels), &self.data)
            .expect("image data length is validated at construction")
    }

    /// Convert every sample to another element type. This is the only way to
    /// change element width; the layout converter never reinterprets bytes.
    pub fn map<U: TensorElement>(&self, f: impl FnMut(T) -> U) -> Image<U> {
        Image {
            data: self.data.iter().copied().map(f).collect(),
            rows: self.rows,
            cols: self.cols,
            channels: self.channels,
        }
    }
}
