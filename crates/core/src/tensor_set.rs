//! Ordered set of tensor views, each paired with the storage that backs it.
//!
//! Entries either own their elements (everything built from images, arrays,
//! scalars, copied data or a moved-in blob) or borrow caller memory for the
//! set's lifetime `'a`. Views handed out by the set borrow the set itself, so
//! an entry cannot be replaced, and the set cannot be cleared or dropped,
//! while any of its views is still alive.

use tracing::debug;

use crate::blob::{element_count, StridedBlob};
use crate::convert::{array_batch_to_blob, image_batch_to_blob};
use crate::element::{TensorBuffer, TensorElement, TensorSlice};
use crate::error::{Result, TensorError};
use crate::image::Image;
use crate::view::TensorView;

#[derive(Debug)]
enum Backing<'a> {
    Owned(TensorBuffer),
    Borrowed(TensorSlice<'a>),
}

#[derive(Debug)]
struct Entry<'a> {
    shape: Vec<i64>,
    backing: Backing<'a>,
}

impl<'a> Entry<'a> {
    fn owned<T: TensorElement>(blob: StridedBlob<T>) -> Self {
        let shape = blob.dims_i64();
        Self {
            shape,
            backing: Backing::Owned(T::into_buffer(blob.into_data())),
        }
    }

    /// Copy `data` under exactly `shape`. An empty shape is rank 0 and holds
    /// one element.
    fn copied<T: TensorElement>(data: &[T], shape: &[usize]) -> Result<Self> {
        let expected = element_count(shape)?;
        if expected != data.len() {
            return Err(TensorError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            shape: shape.iter().map(|&d| d as i64).collect(),
            backing: Backing::Owned(T::into_buffer(data.to_vec())),
        })
    }

    fn borrowed(view: TensorView<'a>) -> Self {
        Self {
            shape: view.shape().to_vec(),
            backing: Backing::Borrowed(view.data()),
        }
    }

    fn view(&self) -> TensorView<'_> {
        let data = match &self.backing {
            Backing::Owned(buffer) => buffer.as_slice(),
            Backing::Borrowed(slice) => *slice,
        };
        TensorView::new(self.shape.clone(), data)
    }

    fn is_owned(&self) -> bool {
        matches!(self.backing, Backing::Owned(_))
    }

    /// Refuse entries whose view does not describe a consistent tensor.
    fn checked(self, index: usize) -> Result<Self> {
        if self.view().is_tensor() {
            Ok(self)
        } else {
            Err(TensorError::InvalidTensor { index })
        }
    }
}

#[derive(Debug, Default)]
pub struct TensorSet<'a> {
    entries: Vec<Entry<'a>>,
}

impl<'a> TensorSet<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry together with the storage it owns.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether entry `index` owns its storage (as opposed to borrowing it).
    pub fn owns_buffer(&self, index: usize) -> Option<bool> {
        self.entries.get(index).map(Entry::is_owned)
    }

    pub fn get(&self, index: usize) -> Option<TensorView<'_>> {
        self.entries.get(index).map(Entry::view)
    }

    pub fn view(&self, index: usize) -> Result<TensorView<'_>> {
        self.get(index).ok_or(TensorError::IndexOutOfRange {
            axis: 0,
            index,
            extent: self.len(),
        })
    }

    pub fn front(&self) -> Result<TensorView<'_>> {
        self.entries
            .first()
            .map(Entry::view)
            .ok_or(TensorError::EmptyCollection)
    }

    pub fn back(&self) -> Result<TensorView<'_>> {
        self.entries
            .last()
            .map(Entry::view)
            .ok_or(TensorError::EmptyCollection)
    }

    pub fn iter(&self) -> impl Iterator<Item = TensorView<'_>> + '_ {
        self.entries.iter().map(Entry::view)
    }

    pub fn views(&self) -> Vec<TensorView<'_>> {
        self.iter().collect()
    }

    fn push(&mut self, entry: Entry<'a>) -> Result<()> {
        let index = self.entries.len();
        let entry = entry.checked(index)?;
        debug!(
            index,
            shape = ?entry.shape,
            dtype = %entry.view().element_type(),
            owned = entry.is_owned(),
            "Inserted tensor"
        );
        self.entries.push(entry);
        Ok(())
    }

    /// Build the replacement only after `index` is known to exist, then swap
    /// it in. The previous entry, and any storage it owned, is dropped.
    fn replace_with(
        &mut self,
        index: usize,
        build: impl FnOnce() -> Result<Entry<'a>>,
    ) -> Result<()> {
        let extent = self.entries.len();
        if index >= extent {
            return Err(TensorError::IndexOutOfRange {
                axis: 0,
                index,
                extent,
            });
        }
        let entry = build()?.checked(index)?;
        debug!(
            index,
            shape = ?entry.shape,
            dtype = %entry.view().element_type(),
            owned = entry.is_owned(),
            "Replaced tensor"
        );
        self.entries[index] = entry;
        Ok(())
    }

    // Borrowed views.

    pub fn insert_view(&mut self, view: TensorView<'a>) -> Result<()> {
        self.push(Entry::borrowed(view))
    }

    pub fn insert_views(&mut self, views: impl IntoIterator<Item = TensorView<'a>>) -> Result<()> {
        views.into_iter().try_for_each(|view| self.insert_view(view))
    }

    pub fn replace_view_at(&mut self, index: usize, view: TensorView<'a>) -> Result<()> {
        self.replace_with(index, || Ok(Entry::borrowed(view)))
    }

    // Owned blobs.

    pub fn insert_tensor_from_blob<T: TensorElement>(&mut self, blob: StridedBlob<T>) -> Result<()> {
        self.push(Entry::owned(blob))
    }

    pub fn replace_tensor_with_blob_at<T: TensorElement>(
        &mut self,
        index: usize,
        blob: StridedBlob<T>,
    ) -> Result<()> {
        self.replace_with(index, || Ok(Entry::owned(blob)))
    }

    // Images, encoded as `[N, C, H, W]`.

    pub fn insert_tensor_from_batched_images<T: TensorElement>(
        &mut self,
        images: &[Image<T>],
    ) -> Result<()> {
        self.push(Entry::owned(image_batch_to_blob(images)?))
    }

    pub fn replace_tensor_from_batched_images_at<T: TensorElement>(
        &mut self,
        index: usize,
        images: &[Image<T>],
    ) -> Result<()> {
        self.replace_with(index, || Ok(Entry::owned(image_batch_to_blob(images)?)))
    }

    pub fn insert_tensor_from_image<T: TensorElement>(&mut self, image: &Image<T>) -> Result<()> {
        self.insert_tensor_from_batched_images(std::slice::from_ref(image))
    }

    pub fn replace_tensor_from_image_at<T: TensorElement>(
        &mut self,
        index: usize,
        image: &Image<T>,
    ) -> Result<()> {
        self.replace_tensor_from_batched_images_at(index, std::slice::from_ref(image))
    }

    // Arrays, stacked as `[N, len]`.

    pub fn insert_tensor_from_batched_arrays<T, A>(&mut self, arrays: &[A]) -> Result<()>
    where
        T: TensorElement,
        A: AsRef<[T]>,
    {
        self.push(Entry::owned(array_batch_to_blob(arrays)?))
    }

    pub fn replace_tensor_from_batched_arrays_at<T, A>(
        &mut self,
        index: usize,
        arrays: &[A],
    ) -> Result<()>
    where
        T: TensorElement,
        A: AsRef<[T]>,
    {
        self.replace_with(index, || Ok(Entry::owned(array_batch_to_blob(arrays)?)))
    }

    pub fn insert_tensor_from_array<T: TensorElement>(&mut self, array: &[T]) -> Result<()> {
        self.insert_tensor_from_batched_arrays::<T, &[T]>(&[array])
    }

    pub fn replace_tensor_from_array_at<T: TensorElement>(
        &mut self,
        index: usize,
        array: &[T],
    ) -> Result<()> {
        self.replace_tensor_from_batched_arrays_at::<T, &[T]>(index, &[array])
    }

    // Scalars, as shape `[1]`.

    pub fn insert_tensor_from_scalar<T: TensorElement>(&mut self, value: T) -> Result<()> {
        self.push(Entry::owned(StridedBlob::new(vec![value], vec![1])?))
    }

    pub fn replace_tensor_from_scalar_at<T: TensorElement>(
        &mut self,
        index: usize,
        value: T,
    ) -> Result<()> {
        self.replace_with(index, || Ok(Entry::owned(StridedBlob::new(vec![value], vec![1])?)))
    }

    // Raw data copied under an explicit shape. Unlike a blob, an empty shape
    // here means rank 0.

    pub fn insert_tensor_from_data<T: TensorElement>(
        &mut self,
        data: &[T],
        shape: &[usize],
    ) -> Result<()> {
        self.push(Entry::copied(data, shape)?)
    }

    pub fn replace_tensor_from_data_at<T: TensorElement>(
        &mut self,
        index: usize,
        data: &[T],
        shape: &[usize],
    ) -> Result<()> {
        self.replace_with(index, || Entry::copied(data, shape))
    }
}
