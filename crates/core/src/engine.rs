//! Adapters between the data plane and `ort`.
//!
//! This is the only place element types are dispatched at runtime: inputs are
//! lent to the session as borrowed `TensorRef`s, and outputs are read back as
//! views over the session's own result values. Nothing here runs a graph.

use std::borrow::Cow;

use ort::session::{Session, SessionInputValue, SessionOutputs};
use ort::tensor::TensorElementType;
use ort::value::{DynValue, TensorRef, ValueType};
use tracing::debug;

use crate::contract::{check_outputs, Dim, InputSpec, ModelContract};
use crate::element::{ElementType, TensorSlice};
use crate::error::{Result, TensorError};
use crate::tensor_set::TensorSet;
use crate::view::TensorView;

/// Named inputs in the form accepted by `SessionInputs::ValueMap`.
pub type NamedInputs<'v> = Vec<(Cow<'static, str>, SessionInputValue<'v>)>;

pub fn element_type_from_ort(ty: TensorElementType) -> Option<ElementType> {
    match ty {
        TensorElementType::Float32 => Some(ElementType::Float32),
        TensorElementType::Uint8 => Some(ElementType::Uint8),
        TensorElementType::Uint16 => Some(ElementType::Uint16),
        TensorElementType::Float16 => Some(ElementType::Float16),
        TensorElementType::Int64 => Some(ElementType::Int64),
        _ => None,
    }
}

impl ModelContract {
    /// Read the declared inputs and outputs of a loaded session.
    pub fn from_session(session: &Session) -> Result<Self> {
        let inputs = session
            .inputs()
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let unsupported = |type_name: String| TensorError::UnsupportedElementType {
                    input: index,
                    name: input.name().to_string(),
                    type_name,
                };
                match input.dtype() {
                    ValueType::Tensor { ty, shape, .. } => {
                        let element_type = element_type_from_ort(*ty)
                            .ok_or_else(|| unsupported(format!("{ty:?}").to_lowercase()))?;
                        let dims = shape.iter().copied().map(Dim::from).collect();
                        Ok(InputSpec::new(input.name(), element_type, dims))
                    }
                    other => Err(unsupported(format!("{other:?}"))),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let outputs = session
            .outputs()
            .iter()
            .map(|output| output.name().to_string())
            .collect();

        Ok(Self::new(inputs, outputs))
    }
}

impl<'a> TensorView<'a> {
    /// Lend the viewed elements to the engine without copying.
    pub fn to_session_value(&self) -> Result<SessionInputValue<'a>> {
        let shape = self.shape().to_vec();
        let value: SessionInputValue<'a> = match self.data() {
            TensorSlice::Float32(s) => TensorRef::from_array_view((shape, s))?.into(),
            TensorSlice::Uint8(s) => TensorRef::from_array_view((shape, s))?.into(),
            TensorSlice::Uint16(s) => TensorRef::from_array_view((shape, s))?.into(),
            TensorSlice::Float16(s) => TensorRef::from_array_view((shape, s))?.into(),
            TensorSlice::Int64(s) => TensorRef::from_array_view((shape, s))?.into(),
        };
        Ok(value)
    }
}

impl TensorSet<'_> {
    /// Validate the set against `contract` and pair each view with its
    /// declared input name, ready for `Session::run`.
    pub fn session_inputs(&self, contract: &ModelContract) -> Result<NamedInputs<'_>> {
        let views = self.views();
        contract.check_inputs(&views)?;

        views
            .iter()
            .zip(contract.input_names())
            .map(|(view, name)| Ok((Cow::Owned(name.to_string()), view.to_session_value()?)))
            .collect()
    }
}

fn value_view(value: &DynValue, index: usize) -> Result<TensorView<'_>> {
    let ValueType::Tensor { ty, .. } = value.dtype() else {
        return Err(TensorError::InvalidTensor { index });
    };
    let view = match element_type_from_ort(*ty) {
        Some(ElementType::Float32) => {
            let (shape, data) = value.try_extract_tensor::<f32>()?;
            TensorView::from_slice(shape.iter().copied().collect(), data)
        }
        Some(ElementType::Uint8) => {
            let (shape, data) = value.try_extract_tensor::<u8>()?;
            TensorView::from_slice(shape.iter().copied().collect(), data)
        }
        Some(ElementType::Uint16) => {
            let (shape, data) = value.try_extract_tensor::<u16>()?;
            TensorView::from_slice(shape.iter().copied().collect(), data)
        }
        Some(ElementType::Float16) => {
            let (shape, data) = value.try_extract_tensor::<half::f16>()?;
            TensorView::from_slice(shape.iter().copied().collect(), data)
        }
        Some(ElementType::Int64) => {
            let (shape, data) = value.try_extract_tensor::<i64>()?;
            TensorView::from_slice(shape.iter().copied().collect(), data)
        }
        None => return Err(TensorError::InvalidTensor { index }),
    };
    Ok(view)
}

/// Views over the session's results, in the order of `names`.
pub fn output_views<'o>(
    outputs: &'o SessionOutputs<'_>,
    names: &[String],
) -> Result<Vec<TensorView<'o>>> {
    if outputs.len() != names.len() {
        return Err(TensorError::OutputCountMismatch {
            expected: names.len(),
            actual: outputs.len(),
        });
    }

    let views = names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let value = outputs
                .get(name.as_str())
                .ok_or(TensorError::InvalidTensor { index })?;
            value_view(value, index)
        })
        .collect::<Result<Vec<_>>>()?;

    check_outputs(&views, names)?;
    for (name, view) in names.iter().zip(&views) {
        debug!(output = %name, shape = ?view.shape(), dtype = %view.element_type(), "Read output");
    }
    Ok(views)
}
