//! Shared ONNX Runtime plumbing for the caption and alignment models.

use std::path::Path;

use ort::session::{Session, SessionOutputs};
use ort::value::{DynValue, Value};

use crate::error::PipelineError;

/// Load an ONNX model, failing with a message that points at `models download`.
pub(crate) fn load_session(model_path: &Path) -> Result<Session, PipelineError> {
    if !model_path.exists() {
        return Err(PipelineError::Model {
            path: model_path.to_path_buf(),
            message: "Model file not found. Run `semlens models download` first.".to_string(),
        });
    }

    let session = Session::builder()
        .map_err(|e| PipelineError::Model {
            path: model_path.to_path_buf(),
            message: format!("Failed to create ONNX session builder: {e}"),
        })?
        .commit_from_file(model_path)
        .map_err(|e| PipelineError::Model {
            path: model_path.to_path_buf(),
            message: format!("Failed to load ONNX model: {e}"),
        })?;

    tracing::debug!(
        "Loaded {:?} (inputs: {:?}, outputs: {:?})",
        model_path,
        input_names(&session),
        session
            .outputs()
            .iter()
            .map(|o| o.name())
            .collect::<Vec<_>>()
    );

    Ok(session)
}

/// Input tensor names declared by the exported graph.
pub(crate) fn input_names(session: &Session) -> Vec<String> {
    session
        .inputs()
        .iter()
        .map(|i| i.name().to_string())
        .collect()
}

/// Build an f32 ONNX tensor from a shape and row-major data.
pub(crate) fn f32_tensor(shape: Vec<i64>, data: Vec<f32>) -> Result<DynValue, String> {
    Value::from_array((shape, data))
        .map(|v| v.into_dyn())
        .map_err(|e| format!("Failed to create input tensor: {e}"))
}

/// Build an i64 ONNX tensor (token ids, masks).
pub(crate) fn i64_tensor(shape: Vec<i64>, data: Vec<i64>) -> Result<DynValue, String> {
    Value::from_array((shape, data))
        .map(|v| v.into_dyn())
        .map_err(|e| format!("Failed to create input tensor: {e}"))
}

/// Extract a named f32 output as `(shape, data)`.
pub(crate) fn extract_f32(
    outputs: &SessionOutputs,
    name: &str,
) -> Result<(Vec<i64>, Vec<f32>), String> {
    let (_, value) = outputs
        .iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| format!("Model did not produce {name}"))?;
    let (shape, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|e| format!("Failed to extract {name} tensor: {e}"))?;
    Ok((shape.iter().copied().collect(), data.to_vec()))
}
