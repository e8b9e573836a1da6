//! Non-owning tensor views.
//!
//! A [`TensorView`] pairs an element-typed slice with the shape it is read
//! under. It never owns the elements: the lifetime `'a` ties it to whatever
//! does (a [`StridedBlob`](crate::blob::StridedBlob), a
//! [`TensorSet`](crate::tensor_set::TensorSet) entry, caller memory, or the
//! engine's output values).

use crate::element::{ElementType, TensorElement, TensorSlice};

#[derive(Debug, Clone, PartialEq)]
pub struct TensorView<'a> {
    shape: Vec<i64>,
    data: TensorSlice<'a>,
}

impl<'a> TensorView<'a> {
    /// Pair `data` with `shape` without checking them against each other;
    /// use [`TensorView::is_tensor`] to ask whether the pair is consistent.
    pub fn new(shape: Vec<i64>, data: TensorSlice<'a>) -> Self {
        Self { shape, data }
    }

    pub fn from_slice<T: TensorElement>(shape: Vec<i64>, data: &'a [T]) -> Self {
        Self::new(shape, T::tensor_slice(data))
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn data(&self) -> TensorSlice<'a> {
        self.data
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    /// Number of elements the shape describes; `None` if any dimension is
    /// negative or the product overflows.
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &d| {
            usize::try_from(d).ok().and_then(|d| acc.checked_mul(d))
        })
    }

    /// Whether the shape is concrete and describes exactly the viewed elements.
    pub fn is_tensor(&self) -> bool {
        self.element_count() == Some(self.data.len())
    }

    pub fn typed<T: TensorElement>(&self) -> Option<&'a [T]> {
        self.data.typed::<T>()
    }
}
