//! Model input/output contract and pre-flight validation of tensor views
//! against it.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::element::ElementType;
use crate::error::{Result, TensorError};
use crate::view::TensorView;

/// One declared dimension: a fixed extent, or any extent chosen per call.
///
/// Serialized as an integer with `-1` standing for [`Dim::Any`], the way ONNX
/// tooling prints symbolic dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Dim {
    Fixed(u64),
    Any,
}

impl Dim {
    pub fn accepts(self, extent: i64) -> bool {
        match self {
            Self::Any => true,
            Self::Fixed(expected) => u64::try_from(extent).is_ok_and(|e| e == expected),
        }
    }
}

impl From<i64> for Dim {
    fn from(value: i64) -> Self {
        u64::try_from(value).map_or(Self::Any, Self::Fixed)
    }
}

impl From<Dim> for i64 {
    fn from(dim: Dim) -> Self {
        match dim {
            Dim::Fixed(extent) => i64::try_from(extent).unwrap_or(i64::MAX),
            Dim::Any => -1,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(extent) => write!(f, "{extent}"),
            Self::Any => f.write_str("?"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    pub element_type: ElementType,
    pub dims: Vec<Dim>,
}

impl InputSpec {
    pub fn new(name: impl Into<String>, element_type: ElementType, dims: Vec<Dim>) -> Self {
        Self {
            name: name.into(),
            element_type,
            dims,
        }
    }

    /// Concrete shape with every dynamic dimension replaced by `fill`.
    pub fn concrete_shape(&self, fill: u64) -> Vec<usize> {
        self.dims
            .iter()
            .map(|dim| match dim {
                Dim::Fixed(extent) => *extent as usize,
                Dim::Any => fill as usize,
            })
            .collect()
    }
}

/// Declared inputs (in feed order) and output names of a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelContract {
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<String>,
}

impl ModelContract {
    pub fn new(inputs: Vec<InputSpec>, outputs: Vec<String>) -> Self {
        Self { inputs, outputs }
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|input| input.name.as_str())
    }

    pub fn check_inputs(&self, provided: &[TensorView<'_>]) -> Result<()> {
        check_inputs(provided, &self.inputs)
    }

    pub fn check_outputs(&self, results: &[TensorView<'_>]) -> Result<()> {
        check_outputs(results, &self.outputs)
    }
}

/// Compare provided views against declared inputs: count, then per input the
/// element type, rank and each fixed dimension. The first mismatch in index
/// order is reported.
pub fn check_inputs(provided: &[TensorView<'_>], declared: &[InputSpec]) -> Result<()> {
    if provided.len() != declared.len() {
        return Err(TensorError::InputCountMismatch {
            expected: declared.len(),
            actual: provided.len(),
        });
    }

    for (input, (view, spec)) in provided.iter().zip(declared).enumerate() {
        if view.element_type() != spec.element_type {
            return Err(TensorError::TypeMismatch {
                input,
                expected: spec.element_type,
                actual: view.element_type(),
            });
        }
        if view.rank() != spec.dims.len() {
            return Err(TensorError::InputRankMismatch {
                input,
                expected: spec.dims.len(),
                actual: view.rank(),
            });
        }
        for (axis, (&actual, &dim)) in view.shape().iter().zip(&spec.dims).enumerate() {
            if let Dim::Fixed(expected) = dim {
                if !dim.accepts(actual) {
                    return Err(TensorError::DimensionMismatch {
                        input,
                        axis,
                        expected,
                        actual,
                    });
                }
            }
        }
    }
    debug!(inputs = provided.len(), "Inputs match model contract");
    Ok(())
}

/// Check that the engine returned one valid tensor per expected output.
pub fn check_outputs(results: &[TensorView<'_>], expected_names: &[String]) -> Result<()> {
    if results.len() != expected_names.len() {
        return Err(TensorError::OutputCountMismatch {
            expected: expected_names.len(),
            actual: results.len(),
        });
    }
    if let Some(index) = results.iter().position(|view| !view.is_tensor()) {
        return Err(TensorError::InvalidTensor { index });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(values: &[i64]) -> Vec<Dim> {
        values.iter().copied().map(Dim::from).collect()
    }

    fn grayscale_contract() -> ModelContract {
        ModelContract::new(
            vec![InputSpec::new("image", ElementType::Float32, dims(&[1, 1, -1, -1]))],
            vec!["mask".to_string()],
        )
    }

    #[test]
    fn test_dynamic_dims_accept_any_extent() {
        let contract = grayscale_contract();
        for (h, w) in [(32usize, 64usize), (7, 3), (1, 1)] {
            let data = vec![0.0f32; h * w];
            let view = TensorView::from_slice(vec![1, 1, h as i64, w as i64], &data);
            contract.check_inputs(&[view]).unwrap();
        }
    }

    #[test]
    fn test_fixed_dim_mismatch_reports_position() {
        let contract = grayscale_contract();
        let data = vec![0.0f32; 2 * 4 * 4];
        let view = TensorView::from_slice(vec![1, 2, 4, 4], &data);
        let err = contract.check_inputs(&[view]).unwrap_err();
        assert!(matches!(
            err,
            TensorError::DimensionMismatch {
                input: 0,
                axis: 1,
                expected: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_checks_run_in_order() {
        let contract = ModelContract::new(
            vec![
                InputSpec::new("a", ElementType::Uint8, dims(&[3])),
                InputSpec::new("b", ElementType::Int64, dims(&[1, 2])),
            ],
            Vec::new(),
        );
        let a = [0u8; 3];
        let b_wrong_type = [0.0f32; 2];
        let b_wrong_rank = [0i64; 2];

        let err = contract
            .check_inputs(&[TensorView::from_slice(vec![3], &a)])
            .unwrap_err();
        assert!(matches!(
            err,
            TensorError::InputCountMismatch {
                expected: 2,
                actual: 1
            }
        ));

        let err = contract
            .check_inputs(&[
                TensorView::from_slice(vec![3], &a),
                TensorView::from_slice(vec![1, 2], &b_wrong_type),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            TensorError::TypeMismatch {
                input: 1,
                expected: ElementType::Int64,
                actual: ElementType::Float32
            }
        ));

        let err = contract
            .check_inputs(&[
                TensorView::from_slice(vec![3], &a),
                TensorView::from_slice(vec![2], &b_wrong_rank),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            TensorError::InputRankMismatch {
                input: 1,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_check_outputs() {
        let contract = grayscale_contract();
        let data = [0.0f32; 4];
        assert!(matches!(
            contract.check_outputs(&[]).unwrap_err(),
            TensorError::OutputCountMismatch {
                expected: 1,
                actual: 0
            }
        ));
        assert!(matches!(
            contract
                .check_outputs(&[TensorView::from_slice(vec![3], &data)])
                .unwrap_err(),
            TensorError::InvalidTensor { index: 0 }
        ));
        contract
            .check_outputs(&[TensorView::from_slice(vec![1, 1, 2, 2], &data)])
            .unwrap();
    }

    #[test]
    fn test_oversized_fixed_dim_saturates() {
        assert_eq!(i64::from(Dim::Fixed(u64::MAX)), i64::MAX);
        assert_eq!(i64::from(Dim::Fixed(7)), 7);
        assert!(!Dim::Fixed(u64::MAX).accepts(-1));
    }

    #[test]
    fn test_dim_serializes_any_as_minus_one() {
        let spec = InputSpec::new("x", ElementType::Float16, dims(&[1, -1, 8]));
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, r#"{"name":"x","element_type":"float16","dims":[1,-1,8]}"#);
        let back: InputSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
        assert_eq!(spec.concrete_shape(5), vec![1, 5, 8]);
        assert_eq!(Dim::Any.to_string(), "?");
    }
}
