//! ONNX Runtime session loading and single-input inference.

use crate::capabilities::StageError;
use ndarray::Array4;
use ort::session::Session as OrtSession;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const INTRA_THREADS: usize = 2;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Load an ONNX model, logging its input and output signature.
pub fn load_session(model_path: &Path, label: &str) -> Result<OrtSession, ModelLoadError> {
    if !model_path.exists() {
        return Err(ModelLoadError::NotFound(model_path.to_path_buf()));
    }

    let session = OrtSession::builder()?
        .with_intra_threads(INTRA_THREADS)?
        .commit_from_file(model_path)?;

    tracing::info!(
        model = label,
        path = %model_path.display(),
        inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded ONNX model"
    );

    Ok(session)
}

/// Run a single-input model and copy out its first output as f32.
pub fn run_first_output(session: &mut OrtSession, input: &Array4<f32>) -> Result<Vec<f32>, StageError> {
    let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

    let (_, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| StageError::InferenceFailed(format!("output extraction: {e}")))?;

    Ok(data.to_vec())
}
