use std::fmt;

use thiserror::Error;

use crate::element::ElementType;
use crate::image::ImageSize;

pub type Result<T> = std::result::Result<T, TensorError>;

/// Which per-image property differed inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchField {
    Channels,
    Rows,
    Cols,
    Length,
}

impl fmt::Display for BatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Channels => "channels",
            Self::Rows => "rows",
            Self::Cols => "columns",
            Self::Length => "elements",
        })
    }
}

/// Every failure the data plane can report. All variants describe a
/// caller-side inconsistency and carry the position where it was found.
#[derive(Debug, Error)]
pub enum TensorError {
    #[error("shape describes {expected} elements but {actual} were supplied")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("dimensions {dims:?} describe more elements than can be addressed")]
    ElementCountOverflow { dims: Vec<usize> },

    #[error("an image must have at least one channel")]
    NoChannels,

    #[error("dimension {axis} has negative extent {extent}")]
    NegativeDimension { axis: usize, extent: i64 },

    #[error("batch cannot be empty")]
    EmptyBatch,

    #[error("for batched item {index}, expected {expected} {field} but received {actual}")]
    BatchShapeMismatch {
        index: usize,
        field: BatchField,
        expected: usize,
        actual: usize,
    },

    #[error("index {index} is out of range for axis {axis} with extent {extent}")]
    IndexOutOfRange {
        axis: usize,
        index: usize,
        extent: usize,
    },

    #[error("cannot slice a blob of rank {rank} with {indices} indices")]
    RankExceeded { rank: usize, indices: usize },

    #[error("slice [{start}, {end}) lies outside a buffer of {len} elements")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("expected a tensor of rank {expected} but received rank {actual}")]
    RankMismatch { expected: usize, actual: usize },

    #[error("expected image size {expected} but received {actual}")]
    SizeMismatch {
        expected: ImageSize,
        actual: ImageSize,
    },

    #[error("expected {expected} channels but the tensor holds {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("expected rows of length {expected} but the tensor holds rows of length {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("expected exactly one item but the batch holds {actual}")]
    NotSingleBatch { actual: usize },

    #[error("tensor {index} is not a valid tensor")]
    InvalidTensor { index: usize },

    #[error("expected element type {expected} but received {actual}")]
    ElementTypeMismatch {
        expected: ElementType,
        actual: ElementType,
    },

    #[error("invalid number of input tensors, expected {expected} but received {actual}")]
    InputCountMismatch { expected: usize, actual: usize },

    #[error("invalid number of output tensors, expected {expected} but received {actual}")]
    OutputCountMismatch { expected: usize, actual: usize },

    #[error("invalid input tensor type for tensor {input}, expected {expected} but received {actual}")]
    TypeMismatch {
        input: usize,
        expected: ElementType,
        actual: ElementType,
    },

    #[error("invalid input tensor rank for tensor {input}, expected {expected} but received {actual}")]
    InputRankMismatch {
        input: usize,
        expected: usize,
        actual: usize,
    },

    #[error("on input tensor {input}, dimension {axis}, expected {expected} but received {actual}")]
    DimensionMismatch {
        input: usize,
        axis: usize,
        expected: u64,
        actual: i64,
    },

    #[error("input {input} ('{name}') has element type {type_name}, which is not supported")]
    UnsupportedElementType {
        input: usize,
        name: String,
        type_name: String,
    },

    #[error("cannot access an element of an empty collection")]
    EmptyCollection,

    #[error("inference engine error: {0}")]
    Engine(#[from] ort::Error),
}
