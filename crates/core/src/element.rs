//! Closed set of tensor element types supported by the data plane.
//!
//! Every call site names its element type statically through [`TensorElement`];
//! [`ElementType`] is only consulted where values cross into type-erased
//! storage (a [`TensorSet`](crate::tensor_set::TensorSet) entry) or out to the
//! inference engine.

use std::fmt;
use std::str::FromStr;

use half::f16;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Float32,
    Uint8,
    Uint16,
    Float16,
    Int64,
}

impl ElementType {
    pub const ALL: [ElementType; 5] = [
        ElementType::Float32,
        ElementType::Uint8,
        ElementType::Uint16,
        ElementType::Float16,
        ElementType::Int64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Float16 => "float16",
            Self::Int64 => "int64",
        }
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            Self::Uint8 => 1,
            Self::Uint16 | Self::Float16 => 2,
            Self::Float32 => 4,
            Self::Int64 => 8,
        }
    }

    /// Map an ONNX `TensorProto.DataType` code. Returns `None` for types the
    /// data plane cannot produce.
    pub fn from_onnx(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Float32),
            2 => Some(Self::Uint8),
            4 => Some(Self::Uint16),
            7 => Some(Self::Int64),
            10 => Some(Self::Float16),
            _ => None,
        }
    }

    pub fn onnx_code(self) -> i32 {
        match self {
            Self::Float32 => 1,
            Self::Uint8 => 2,
            Self::Uint16 => 4,
            Self::Int64 => 7,
            Self::Float16 => 10,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ElementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float32" | "f32" | "float" => Ok(Self::Float32),
            "uint8" | "u8" => Ok(Self::Uint8),
            "uint16" | "u16" => Ok(Self::Uint16),
            "float16" | "f16" | "half" => Ok(Self::Float16),
            "int64" | "i64" => Ok(Self::Int64),
            other => Err(format!(
                "unknown element type '{other}' (expected one of float32, uint8, uint16, float16, int64)"
            )),
        }
    }
}

/// Owned, type-erased element storage. One variant per [`ElementType`].
#[derive(Debug, Clone, PartialEq)]
pub enum TensorBuffer {
    Float32(Vec<f32>),
    Uint8(Vec<u8>),
    Uint16(Vec<u16>),
    Float16(Vec<f16>),
    Int64(Vec<i64>),
}

/// Borrowed counterpart of [`TensorBuffer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TensorSlice<'a> {
    Float32(&'a [f32]),
    Uint8(&'a [u8]),
    Uint16(&'a [u16]),
    Float16(&'a [f16]),
    Int64(&'a [i64]),
}

impl TensorBuffer {
    pub fn element_type(&self) -> ElementType {
        self.as_slice().element_type()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> TensorSlice<'_> {
        match self {
            Self::Float32(v) => TensorSlice::Float32(v),
            Self::Uint8(v) => TensorSlice::Uint8(v),
            Self::Uint16(v) => TensorSlice::Uint16(v),
            Self::Float16(v) => TensorSlice::Float16(v),
            Self::Int64(v) => TensorSlice::Int64(v),
        }
    }
}

impl<'a> TensorSlice<'a> {
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Float32(_) => ElementType::Float32,
            Self::Uint8(_) => ElementType::Uint8,
            Self::Uint16(_) => ElementType::Uint16,
            Self::Float16(_) => ElementType::Float16,
            Self::Int64(_) => ElementType::Int64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Float32(s) => s.len(),
            Self::Uint8(s) => s.len(),
            Self::Uint16(s) => s.len(),
            Self::Float16(s) => s.len(),
            Self::Int64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the referenced run in bytes.
    pub fn byte_len(&self) -> usize {
        self.len() * self.element_type().size_in_bytes()
    }

    /// Address of the first element. Used to tell entries apart in tests and
    /// diagnostics; never dereferenced.
    pub fn addr(&self) -> usize {
        match self {
            Self::Float32(s) => s.as_ptr() as usize,
            Self::Uint8(s) => s.as_ptr() as usize,
            Self::Uint16(s) => s.as_ptr() as usize,
            Self::Float16(s) => s.as_ptr() as usize,
            Self::Int64(s) => s.as_ptr() as usize,
        }
    }

    /// Typed access; `None` when `T` is not the stored element type.
    pub fn typed<T: TensorElement>(self) -> Option<&'a [T]> {
        T::from_tensor_slice(self)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Rust types that can be stored in a tensor. Sealed: the set is closed.
pub trait TensorElement:
    sealed::Sealed + Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static
{
    const ELEMENT_TYPE: ElementType;

    fn into_buffer(data: Vec<Self>) -> TensorBuffer;

    fn tensor_slice(data: &[Self]) -> TensorSlice<'_>;

    fn from_tensor_slice(slice: TensorSlice<'_>) -> Option<&[Self]>;
}

macro_rules! impl_tensor_element {
    ($ty:ty, $variant:ident) => {
        impl sealed::Sealed for $ty {}

        impl TensorElement for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            fn into_buffer(data: Vec<Self>) -> TensorBuffer {
                TensorBuffer::$variant(data)
            }

            fn tensor_slice(data: &[Self]) -> TensorSlice<'_> {
                TensorSlice::$variant(data)
            }

            fn from_tensor_slice(slice: TensorSlice<'_>) -> Option<&[Self]> {
                match slice {
                    TensorSlice::$variant(s) => Some(s),
                    _ => None,
                }
            }
        }
    };
}

impl_tensor_element!(f32, Float32);
impl_tensor_element!(u8, Uint8);
impl_tensor_element!(u16, Uint16);
impl_tensor_element!(f16, Float16);
impl_tensor_element!(i64, Int64);
