//! Conversion between interleaved images and planar `[N, C, H, W]` blobs.
//!
//! Encoding transposes each image channel by channel into its plane of the
//! destination; decoding copies each plane back out and interleaves them. The
//! element type never changes on either path: an `Image<T>` becomes a
//! `StridedBlob<T>` and nothing else. Use [`Image::map`] to change widths.

use std::slice;

use ndarray::{s, Array4};
use tracing::debug;

use crate::blob::StridedBlob;
use crate::element::TensorElement;
use crate::error::{BatchField, Result, TensorError};
use crate::image::{Image, ImageSize};

/// Check that every image shares the first image's channel, row, and column
/// counts (in that order) and return them as `(channels, rows, cols)`.
pub fn validate_batch<T: TensorElement>(images: &[Image<T>]) -> Result<(usize, usize, usize)> {
    let first = images.first().ok_or(TensorError::EmptyBatch)?;
    let expected = (first.channels(), first.rows(), first.cols());

    for (index, image) in images.iter().enumerate().skip(1) {
        let checks = [
            (BatchField::Channels, expected.0, image.channels()),
            (BatchField::Rows, expected.1, image.rows()),
            (BatchField::Cols, expected.2, image.cols()),
        ];
        if let Some(&(field, expected, actual)) = checks.iter().find(|(_, e, a)| e != a) {
            return Err(TensorError::BatchShapeMismatch {
                index,
                field,
                expected,
                actual,
            });
        }
    }
    Ok(expected)
}

/// Encode a batch of same-shaped images as an `[N, C, H, W]` blob.
pub fn image_batch_to_blob<T: TensorElement>(images: &[Image<T>]) -> Result<StridedBlob<T>> {
    let (c, h, w) = validate_batch(images)?;
    let n = images.len();

    let mut nchw = Array4::<T>::default((n, c, h, w));
    for (b, image) in images.iter().enumerate() {
        let hwc = image.as_array();
        for ch in 0..c {
            nchw.slice_mut(s![b, ch, .., ..])
                .assign(&hwc.slice(s![.., .., ch]));
        }
    }
    debug!(n, c, h, w, dtype = %T::ELEMENT_TYPE, "Encoded image batch");

    let (data, _) = nchw.into_raw_vec_and_offset();
    StridedBlob::new(data, vec![n, c, h, w])
}

pub fn image_to_blob<T: TensorElement>(image: &Image<T>) -> Result<StridedBlob<T>> {
    image_batch_to_blob(slice::from_ref(image))
}

/// Decode an `[N, C, H, W]` blob into `N` images of `channels` interleaved
/// channels, passing each through `post_process` before it is collected.
pub fn blob_to_image_batch_with<T, F>(
    blob: &StridedBlob<T>,
    expected_size: ImageSize,
    channels: usize,
    mut post_process: F,
) -> Result<Vec<Image<T>>>
where
    T: TensorElement,
    F: FnMut(Image<T>) -> Image<T>,
{
    let dims = blob.dims();
    let [n, c, h, w] = dims[..] else {
        return Err(TensorError::RankMismatch {
            expected: 4,
            actual: dims.len(),
        });
    };
    let actual_size = ImageSize::new(w, h);
    if actual_size != expected_size {
        return Err(TensorError::SizeMismatch {
            expected: expected_size,
            actual: actual_size,
        });
    }
    if c != channels {
        return Err(TensorError::ChannelMismatch {
            expected: channels,
            actual: c,
        });
    }

    let mut images = Vec::with_capacity(n);
    for b in 0..n {
        let image = if c == 1 {
            Image::new(blob.index(&[b])?.to_vec(), h, w, 1)?
        } else {
            let planes = (0..c)
                .map(|ch| blob.index(&[b, ch]))
                .collect::<Result<Vec<_>>>()?;
            let mut data = Vec::with_capacity(c * h * w);
            for i in 0..h * w {
                data.extend(planes.iter().map(|plane| plane[i]));
            }
            Image::new(data, h, w, c)?
        };
        images.push(post_process(image));
    }
    debug!(n, c, h, w, dtype = %T::ELEMENT_TYPE, "Decoded image batch");
    Ok(images)
}

pub fn blob_to_image_batch<T: TensorElement>(
    blob: &StridedBlob<T>,
    expected_size: ImageSize,
    channels: usize,
) -> Result<Vec<Image<T>>> {
    blob_to_image_batch_with(blob, expected_size, channels, |image| image)
}

/// Decode a blob that must hold exactly one image.
pub fn blob_to_image<T: TensorElement>(
    blob: &StridedBlob<T>,
    expected_size: ImageSize,
    channels: usize,
) -> Result<Image<T>> {
    let mut images = blob_to_image_batch(blob, expected_size, channels)?;
    if images.len() != 1 {
        return Err(TensorError::NotSingleBatch {
            actual: images.len(),
        });
    }
    Ok(images.remove(0))
}

/// Stack equal-length arrays into an `[N, len]` blob. The first array's
/// length is authoritative.
pub fn array_batch_to_blob<T, A>(arrays: &[A]) -> Result<StridedBlob<T>>
where
    T: TensorElement,
    A: AsRef<[T]>,
{
    let len = arrays.first().ok_or(TensorError::EmptyBatch)?.as_ref().len();
    let mut data = Vec::with_capacity(arrays.len() * len);
    for (index, array) in arrays.iter().enumerate() {
        let array = array.as_ref();
        if array.len() != len {
            return Err(TensorError::BatchShapeMismatch {
                index,
                field: BatchField::Length,
                expected: len,
                actual: array.len(),
            });
        }
        data.extend_from_slice(array);
    }
    StridedBlob::new(data, vec![arrays.len(), len])
}

/// Split an `[N, len]` blob into its rows.
pub fn blob_to_array_batch<T: TensorElement>(
    blob: &StridedBlob<T>,
    len: usize,
) -> Result<Vec<Vec<T>>> {
    let dims = blob.dims();
    let [n, row_len] = dims[..] else {
        return Err(TensorError::RankMismatch {
            expected: 2,
            actual: dims.len(),
        });
    };
    if row_len != len {
        return Err(TensorError::LengthMismatch {
            expected: len,
            actual: row_len,
        });
    }
    (0..n).map(|i| Ok(blob.index(&[i])?.to_vec())).collect()
}

/// Read the single row of a `[1, len]` blob.
pub fn blob_to_array<T: TensorElement>(blob: &StridedBlob<T>, len: usize) -> Result<Vec<T>> {
    let mut rows = blob_to_array_batch(blob, len)?;
    if rows.len() != 1 {
        return Err(TensorError::NotSingleBatch { actual: rows.len() });
    }
    Ok(rows.remove(0))
}

#[cfg(test)]
mod tests {
    use half::f16;

    use super::*;

    fn gradient(rows: usize, cols: usize, channels: usize, seed: u16) -> Image<u16> {
        Image::from_fn(rows, cols, channels, |r, c, ch| {
            seed.wrapping_mul(1000) + (r * 100 + c * 10 + ch) as u16
        })
        .unwrap()
    }

    #[test]
    fn test_validate_batch_reports_first_field_in_order() {
        let a = gradient(4, 4, 3, 0);
        // Differs in channels, rows and cols: channels wins.
        let b = gradient(5, 6, 1, 1);
        let err = validate_batch(&[a.clone(), a.clone(), b]).unwrap_err();
        assert!(matches!(
            err,
            TensorError::BatchShapeMismatch {
                index: 2,
                field: BatchField::Channels,
                expected: 3,
                actual: 1
            }
        ));

        let c = gradient(4, 5, 3, 1);
        let err = validate_batch(&[a, c]).unwrap_err();
        assert!(matches!(
            err,
            TensorError::BatchShapeMismatch {
                index: 1,
                field: BatchField::Cols,
                ..
            }
        ));
    }

    #[test]
    fn test_validate_batch_rejects_empty() {
        let err = validate_batch::<u8>(&[]).unwrap_err();
        assert!(matches!(err, TensorError::EmptyBatch));
    }

    #[test]
    fn test_encode_is_planar() {
        // 1x2 RGB: pixels (1,2,3) and (4,5,6).
        let image = Image::new(vec![1u8, 2, 3, 4, 5, 6], 1, 2, 3).unwrap();
        let blob = image_to_blob(&image).unwrap();
        assert_eq!(blob.shape(), &[1, 3, 1, 2]);
        assert_eq!(blob.data(), &[1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_roundtrip_for_common_channel_counts() {
        for channels in [1, 3, 4] {
            let batch: Vec<_> = (0..3).map(|i| gradient(6, 9, channels, i)).collect();
            let blob = image_batch_to_blob(&batch).unwrap();
            assert_eq!(blob.shape(), &[3, channels, 6, 9]);

            let decoded = blob_to_image_batch(&blob, ImageSize::new(9, 6), channels).unwrap();
            assert_eq!(decoded, batch, "channels = {channels}");
        }
    }

    #[test]
    fn test_roundtrip_f16() {
        let image = Image::from_fn(3, 2, 3, |r, c, ch| f16::from_f32((r + c + ch) as f32 * 0.25))
            .unwrap();
        let blob = image_to_blob(&image).unwrap();
        let back = blob_to_image(&blob, ImageSize::new(2, 3), 3).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn test_post_process_runs_per_image() {
        let batch = vec![Image::<f32>::filled(2, 2, 1, 1.0).unwrap(); 3];
        let blob = image_batch_to_blob(&batch).unwrap();
        let mut calls = 0;
        let decoded = blob_to_image_batch_with(&blob, ImageSize::new(2, 2), 1, |img| {
            calls += 1;
            img.map(|v| v * 2.0)
        })
        .unwrap();
        assert_eq!(calls, 3);
        assert!(decoded.iter().all(|img| img.as_slice() == [2.0; 4]));
    }

    #[test]
    fn test_decode_checks_rank_size_and_channels() {
        let flat = StridedBlob::new(vec![0.0f32; 8], vec![2, 4]).unwrap();
        assert!(matches!(
            blob_to_image_batch(&flat, ImageSize::new(4, 2), 1).unwrap_err(),
            TensorError::RankMismatch {
                expected: 4,
                actual: 2
            }
        ));

        let blob = image_to_blob(&gradient(4, 8, 3, 0)).unwrap();
        let err = blob_to_image_batch(&blob, ImageSize::new(4, 8), 3).unwrap_err();
        match err {
            TensorError::SizeMismatch { expected, actual } => {
                assert_eq!(expected, ImageSize::new(4, 8));
                assert_eq!(actual, ImageSize::new(8, 4));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            blob_to_image_batch(&blob, ImageSize::new(8, 4), 1).unwrap_err(),
            TensorError::ChannelMismatch {
                expected: 1,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_single_image_requires_single_batch() {
        let batch = vec![gradient(2, 2, 3, 0), gradient(2, 2, 3, 1)];
        let blob = image_batch_to_blob(&batch).unwrap();
        assert!(matches!(
            blob_to_image(&blob, ImageSize::new(2, 2), 3).unwrap_err(),
            TensorError::NotSingleBatch { actual: 2 }
        ));

        let single = image_to_blob(&batch[1]).unwrap();
        assert_eq!(blob_to_image(&single, ImageSize::new(2, 2), 3).unwrap(), batch[1]);
    }

    #[test]
    fn test_array_batches() {
        let blob = array_batch_to_blob(&[vec![1i64, 2, 3], vec![4, 5, 6]]).unwrap();
        assert_eq!(blob.shape(), &[2, 3]);
        assert_eq!(
            blob_to_array_batch(&blob, 3).unwrap(),
            vec![vec![1, 2, 3], vec![4, 5, 6]]
        );
        assert!(matches!(
            blob_to_array_batch(&blob, 4).unwrap_err(),
            TensorError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        ));
        assert!(matches!(
            blob_to_array(&blob, 3).unwrap_err(),
            TensorError::NotSingleBatch { actual: 2 }
        ));

        let err = array_batch_to_blob(&[&[1.0f32, 2.0][..], &[3.0][..]]).unwrap_err();
        assert!(matches!(
            err,
            TensorError::BatchShapeMismatch {
                index: 1,
                field: BatchField::Length,
                expected: 2,
                actual: 1
            }
        ));
        assert!(matches!(
            array_batch_to_blob::<u8, Vec<u8>>(&[]).unwrap_err(),
            TensorError::EmptyBatch
        ));
    }
}
