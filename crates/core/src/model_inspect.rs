use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use prost::Message;
use serde::Serialize;

use crate::contract::{Dim, InputSpec, ModelContract};
use crate::element::ElementType;
use crate::error::TensorError;
use crate::onnx_proto;

#[derive(Debug, Clone, Serialize)]
pub struct TensorInfo {
    pub name: String,
    /// Human-readable data type, e.g. "float32", "float16", "int64".
    pub data_type: String,
    /// Dimensions. `-1` represents a dynamic/symbolic dimension.
    pub shape: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInspection {
    pub ir_version: i64,
    pub opset_version: i64,
    pub producer_name: String,
    pub producer_version: String,
    pub domain: String,
    pub model_version: i64,
    pub graph_name: String,
    /// Feedable inputs only; graph inputs backed by an initializer are omitted.
    pub inputs: Vec<TensorInfo>,
    pub outputs: Vec<TensorInfo>,
    /// Sum of all initializer tensor element counts.
    pub param_count: u64,
    /// Number of graph nodes (operations).
    pub op_count: usize,
    /// Node count per operator type.
    pub op_types: BTreeMap<String, usize>,
}

/// Map ONNX `TensorProto.DataType` enum value to a human-readable string.
pub fn data_type_name(dt: i32) -> String {
    if let Some(ty) = ElementType::from_onnx(dt) {
        return ty.name().into();
    }
    match dt {
        3 => "int8".into(),
        5 => "int16".into(),
        6 => "int32".into(),
        8 => "string".into(),
        9 => "bool".into(),
        11 => "float64".into(),
        12 => "uint32".into(),
        13 => "uint64".into(),
        14 => "complex64".into(),
        15 => "complex128".into(),
        16 => "bfloat16".into(),
        _ => format!("unknown({dt})"),
    }
}

fn tensor_type(vi: &onnx_proto::ValueInfoProto) -> Option<&onnx_proto::type_proto::Tensor> {
    vi.r#type
        .as_ref()
        .and_then(|tp| tp.value.as_ref())
        .map(|val| match val {
            onnx_proto::type_proto::Value::TensorType(t) => t,
        })
}

fn tensor_dims(t: &onnx_proto::type_proto::Tensor) -> Vec<i64> {
    t.shape
        .as_ref()
        .map(|s| {
            s.dim
                .iter()
                .map(|d| match &d.value {
                    Some(onnx_proto::tensor_shape_proto::dimension::Value::DimValue(v)) => *v,
                    _ => -1, // symbolic / unknown
                })
                .collect()
        })
        .unwrap_or_default()
}

fn value_info_to_tensor(vi: &onnx_proto::ValueInfoProto) -> TensorInfo {
    let (data_type, shape) = tensor_type(vi)
        .map(|t| (data_type_name(t.elem_type), tensor_dims(t)))
        .unwrap_or_else(|| ("unknown".into(), vec![]));

    TensorInfo {
        name: vi.name.clone(),
        data_type,
        shape,
    }
}

/// Element count of an initializer. No dims is a scalar; a malformed negative
/// extent counts as empty.
fn tensor_element_count(dims: &[i64]) -> u64 {
    dims.iter()
        .map(|&d| u64::try_from(d).unwrap_or(0))
        .product()
}

fn decode_model(bytes: &[u8]) -> Result<onnx_proto::ModelProto> {
    onnx_proto::ModelProto::decode(bytes).context("failed to decode ONNX protobuf")
}

/// Graph inputs the caller must feed, i.e. not shadowed by an initializer.
fn feedable_inputs(graph: &onnx_proto::GraphProto) -> impl Iterator<Item = &onnx_proto::ValueInfoProto> {
    let initializers: HashSet<&str> = graph.initializer.iter().map(|t| t.name.as_str()).collect();
    graph
        .input
        .iter()
        .filter(move |vi| !initializers.contains(vi.name.as_str()))
}

/// Inspect an ONNX model file and extract metadata without loading it into
/// a runtime.
pub fn inspect_onnx(path: &Path) -> Result<ModelInspection> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read ONNX file: {}", path.display()))?;

    inspect_onnx_bytes(&bytes)
}

pub fn inspect_onnx_bytes(bytes: &[u8]) -> Result<ModelInspection> {
    let model = decode_model(bytes)?;

    let opset_version = model
        .opset_import
        .iter()
        .filter(|op| op.domain.is_empty()) // default ONNX domain
        .map(|op| op.version)
        .max()
        .unwrap_or(0);

    let graph = model.graph.as_ref().context("ONNX model has no graph")?;

    let inputs: Vec<TensorInfo> = feedable_inputs(graph).map(value_info_to_tensor).collect();
    let outputs: Vec<TensorInfo> = graph.output.iter().map(value_info_to_tensor).collect();

    let mut op_types = BTreeMap::new();
    for node in &graph.node {
        *op_types.entry(node.op_type.clone()).or_insert(0) += 1;
    }

    let param_count: u64 = graph
        .initializer
        .iter()
        .map(|t| tensor_element_count(&t.dims))
        .sum();

    Ok(ModelInspection {
        ir_version: model.ir_version,
        opset_version,
        producer_name: model.producer_name.clone(),
        producer_version: model.producer_version.clone(),
        domain: model.domain.clone(),
        model_version: model.model_version,
        graph_name: graph.name.clone(),
        inputs,
        outputs,
        param_count,
        op_count: graph.node.len(),
        op_types,
    })
}

impl ModelContract {
    /// Read the input/output contract from serialized ONNX bytes.
    pub fn from_onnx_bytes(bytes: &[u8]) -> Result<Self> {
        let model = decode_model(bytes)?;
        let graph = model.graph.as_ref().context("ONNX model has no graph")?;

        let inputs = feedable_inputs(graph)
            .enumerate()
            .map(|(index, vi)| {
                let tensor = tensor_type(vi);
                let element_type = tensor
                    .and_then(|t| ElementType::from_onnx(t.elem_type))
                    .ok_or_else(|| TensorError::UnsupportedElementType {
                        input: index,
                        name: vi.name.clone(),
                        type_name: tensor
                            .map(|t| data_type_name(t.elem_type))
                            .unwrap_or_else(|| "unknown".into()),
                    })?;
                let dims = tensor
                    .map(tensor_dims)
                    .unwrap_or_default()
                    .into_iter()
                    .map(Dim::from)
                    .collect();
                Ok(InputSpec::new(vi.name.clone(), element_type, dims))
            })
            .collect::<std::result::Result<Vec<_>, TensorError>>()?;

        let outputs = graph.output.iter().map(|vi| vi.name.clone()).collect();
        Ok(Self::new(inputs, outputs))
    }

    pub fn from_onnx_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read ONNX file: {}", path.display()))?;
        Self::from_onnx_bytes(&bytes)
            .with_context(|| format!("failed to read model contract: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onnx_proto::*;

    fn value_info(name: &str, elem_type: i32, dims: &[tensor_shape_proto::dimension::Value]) -> ValueInfoProto {
        ValueInfoProto {
            name: name.into(),
            r#type: Some(TypeProto {
                value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                    elem_type,
                    shape: Some(TensorShapeProto {
                        dim: dims
                            .iter()
                            .map(|v| tensor_shape_proto::Dimension {
                                value: Some(v.clone()),
                            })
                            .collect(),
                    }),
                })),
            }),
        }
    }

    fn fixed(v: i64) -> tensor_shape_proto::dimension::Value {
        tensor_shape_proto::dimension::Value::DimValue(v)
    }

    fn param(name: &str) -> tensor_shape_proto::dimension::Value {
        tensor_shape_proto::dimension::Value::DimParam(name.into())
    }

    /// A single Mul node: dynamic-size grayscale image times an initializer
    /// `scale`, which is also listed as a graph input.
    fn build_test_onnx_bytes(image_elem_type: i32) -> Vec<u8> {
        let graph = GraphProto {
            node: vec![NodeProto {
                input: vec!["image".into(), "scale".into()],
                output: vec!["mask".into()],
                name: "mul_0".into(),
                op_type: "Mul".into(),
                domain: String::new(),
            }],
            name: "test_graph".into(),
            initializer: vec![TensorProto {
                dims: vec![1, 1, 1, 1],
                data_type: 1,
                name: "scale".into(),
            }],
            input: vec![
                value_info(
                    "image",
                    image_elem_type,
                    &[fixed(1), fixed(1), param("height"), param("width")],
                ),
                value_info("scale", 1, &[fixed(1), fixed(1), fixed(1), fixed(1)]),
            ],
            output: vec![value_info(
                "mask",
                1,
                &[fixed(1), fixed(1), param("height"), param("width")],
            )],
        };

        let model = ModelProto {
            ir_version: 8,
            opset_import: vec![
                OperatorSetIdProto {
                    domain: String::new(),
                    version: 17,
                },
                OperatorSetIdProto {
                    domain: "com.microsoft".into(),
                    version: 1,
                },
            ],
            producer_name: "test".into(),
            producer_version: "1.0".into(),
            domain: "test.domain".into(),
            model_version: 1,
            doc_string: "Test model".into(),
            graph: Some(graph),
        };

        model.encode_to_vec()
    }

    #[test]
    fn test_inspect_minimal_onnx() {
        let info = inspect_onnx_bytes(&build_test_onnx_bytes(1)).expect("inspect should succeed");

        assert_eq!(info.ir_version, 8);
        assert_eq!(info.opset_version, 17);
        assert_eq!(info.producer_name, "test");
        assert_eq!(info.graph_name, "test_graph");

        assert_eq!(info.inputs.len(), 1);
        assert_eq!(info.inputs[0].name, "image");
        assert_eq!(info.inputs[0].data_type, "float32");
        assert_eq!(info.inputs[0].shape, vec![1, 1, -1, -1]);

        assert_eq!(info.outputs.len(), 1);
        assert_eq!(info.outputs[0].name, "mask");

        assert_eq!(info.op_count, 1);
        assert_eq!(info.op_types.get("Mul"), Some(&1));
        assert_eq!(info.param_count, 1);
    }

    #[test]
    fn test_scalar_initializers_count_one_parameter() {
        assert_eq!(tensor_element_count(&[]), 1);
        assert_eq!(tensor_element_count(&[2, 3]), 6);
        assert_eq!(tensor_element_count(&[0, 4]), 0);

        let mut model = ModelProto::decode(build_test_onnx_bytes(1).as_slice()).unwrap();
        if let Some(graph) = model.graph.as_mut() {
            graph.initializer.push(TensorProto {
                dims: Vec::new(),
                data_type: 1,
                name: "bias".into(),
            });
        }
        let info = inspect_onnx_bytes(&model.encode_to_vec()).unwrap();
        assert_eq!(info.param_count, 2);
    }

    #[test]
    fn test_contract_from_bytes() {
        let contract = ModelContract::from_onnx_bytes(&build_test_onnx_bytes(1)).unwrap();
        assert_eq!(contract.inputs.len(), 1);
        let input = &contract.inputs[0];
        assert_eq!(input.name, "image");
        assert_eq!(input.element_type, ElementType::Float32);
        assert_eq!(
            input.dims,
            vec![Dim::Fixed(1), Dim::Fixed(1), Dim::Any, Dim::Any]
        );
        assert_eq!(contract.outputs, vec!["mask".to_string()]);
    }

    #[test]
    fn test_contract_rejects_unsupported_input_type() {
        let err = ModelContract::from_onnx_bytes(&build_test_onnx_bytes(6)).unwrap_err();
        match err.downcast_ref::<TensorError>() {
            Some(TensorError::UnsupportedElementType {
                input,
                name,
                type_name,
            }) => {
                assert_eq!(*input, 0);
                assert_eq!(name, "image");
                assert_eq!(type_name, "int32");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_inspect_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_model.onnx");
        std::fs::write(&path, build_test_onnx_bytes(10)).unwrap();

        let info = inspect_onnx(&path).expect("inspect file should succeed");
        assert_eq!(info.inputs[0].data_type, "float16");

        let contract = ModelContract::from_onnx_file(&path).unwrap();
        assert_eq!(contract.inputs[0].element_type, ElementType::Float16);
    }

    #[test]
    fn test_inspect_invalid_bytes() {
        assert!(inspect_onnx_bytes(b"not a valid protobuf").is_err());
        assert!(ModelContract::from_onnx_bytes(b"not a valid protobuf").is_err());
        assert!(inspect_onnx(Path::new("/nonexistent/model.onnx")).is_err());
    }

    #[test]
    fn test_model_without_graph() {
        let bytes = ModelProto {
            ir_version: 8,
            ..Default::default()
        }
        .encode_to_vec();
        let err = inspect_onnx_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("no graph"));
    }

    #[test]
    fn test_data_type_names() {
        assert_eq!(data_type_name(1), "float32");
        assert_eq!(data_type_name(2), "uint8");
        assert_eq!(data_type_name(6), "int32");
        assert_eq!(data_type_name(10), "float16");
        assert_eq!(data_type_name(16), "bfloat16");
        assert_eq!(data_type_name(999), "unknown(999)");
    }
}
