//! Data plane around an ONNX inference session: interleaved images and
//! arrays in, planar tensors out, with the storage behind every tensor view
//! kept alive for exactly as long as the view.

pub mod blob;
pub mod config;
pub mod contract;
pub mod convert;
pub mod element;
pub mod engine;
pub mod error;
pub mod image;
pub mod logging;
pub mod model_inspect;
pub mod onnx_proto;
pub mod runtime;
pub mod safe_op;
pub mod session;
pub mod tensor_set;
pub mod view;

pub use blob::StridedBlob;
pub use contract::{Dim, InputSpec, ModelContract};
pub use element::{ElementType, TensorElement};
pub use error::{Result, TensorError};
pub use image::{Image, ImageSize};
pub use tensor_set::TensorSet;
pub use view::TensorView;
