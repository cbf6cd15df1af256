//! The loaded predictor and the loader that builds it from an artifact on disk.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fmt, fs, path::Path, sync::Arc};
use thiserror::Error;

use crate::features::FeatureRow;

pub mod encoder;
pub mod estimators;
pub mod pipeline;
#[cfg(feature = "torch")]
pub mod torch;

pub use pipeline::Pipeline;

/// Pipeline step whose feature importances back the explanation.
pub const EXPLAIN_STEP: &str = "clf";

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("{0} is not supported by this model")]
    Unsupported(&'static str),
    #[error("feature length mismatch: got {got}, expected {expected}")]
    FeatureCount { expected: usize, got: usize },
    #[error("model is malformed: {0}")]
    Malformed(String),
    #[error("predicted label {0} is not an integer")]
    NonIntegerLabel(String),
    #[error("model backend failed: {0}")]
    Backend(String),
}

/// A class label as stored in the artifact.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ClassLabel {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ClassLabel {
    pub fn to_i64(&self) -> Result<i64, PredictError> {
        match self {
            ClassLabel::Int(v) => Ok(*v),
            ClassLabel::Float(v)
                if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 =>
            {
                Ok(*v as i64)
            }
            ClassLabel::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| PredictError::NonIntegerLabel(format!("{:?}", s))),
            other => Err(PredictError::NonIntegerLabel(other.to_string())),
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassLabel::Int(v) => write!(f, "{}", v),
            ClassLabel::Float(v) => write!(f, "{}", v),
            ClassLabel::Text(s) => f.write_str(s),
        }
    }
}

/// Opaque pre-trained classifier. Shared read-only across requests.
pub trait Predictor: Send + Sync {
    /// One label per input row.
    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<ClassLabel>, PredictError>;

    /// One probability distribution over classes per input row.
    fn predict_proba(&self, _rows: &[FeatureRow]) -> Result<Vec<Vec<f64>>, PredictError> {
        Err(PredictError::Unsupported("probability estimation"))
    }

    /// Importance weights exposed by the named sub-component.
    fn feature_importances(&self, _step: &str) -> Result<Vec<f64>, PredictError> {
        Err(PredictError::Unsupported("feature importances"))
    }

    /// Short human-readable summary for startup logs.
    fn describe(&self) -> String;
}

/// Load the artifact at `model_path`. TorchScript modules (`.pt`, `.ts`) need
/// the `torch` feature and a sidecar meta file; everything else is read as a
/// JSON pipeline.
pub fn load(model_path: &Path, meta_path: Option<&Path>) -> Result<Arc<dyn Predictor>> {
    if !model_path.exists() {
        bail!("model artifact not found at {}", model_path.display());
    }

    match model_path.extension().and_then(|e| e.to_str()) {
        Some("pt") | Some("ts") => load_torchscript(model_path, meta_path),
        _ => {
            let txt = fs::read_to_string(model_path)
                .with_context(|| format!("failed to read model at {}", model_path.display()))?;
            let pipeline = Pipeline::from_json(&txt)
                .with_context(|| format!("failed to parse model {}", model_path.display()))?;
            Ok(Arc::new(pipeline))
        }
    }
}

#[cfg(feature = "torch")]
fn load_torchscript(model_path: &Path, meta_path: Option<&Path>) -> Result<Arc<dyn Predictor>> {
    let default_meta = model_path.with_extension("meta.json");
    let meta_path = meta_path.unwrap_or(&default_meta);
    Ok(Arc::new(torch::TorchPredictor::load(model_path, meta_path)?))
}

#[cfg(not(feature = "torch"))]
fn load_torchscript(model_path: &Path, _meta_path: Option<&Path>) -> Result<Arc<dyn Predictor>> {
    bail!(
        "{} is a TorchScript module but this build lacks the `torch` feature",
        model_path.display()
    )
}

/// Classify the all-defaults row once so a model that cannot score the
/// schema is caught before serving.
pub fn warmup(predictor: &dyn Predictor) -> Result<()> {
    let labels = predictor
        .predict(&[FeatureRow::default()])
        .context("warmup prediction failed")?;
    let first = labels
        .first()
        .context("warmup prediction returned no labels")?;
    first
        .to_i64()
        .context("warmup prediction returned a non-integer label")?;
    Ok(())
}

/// Index of the largest value; ties go to the first.
pub(crate) fn argmax(xs: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &x) in xs.iter().enumerate() {
        match best {
            Some((_, b)) if x <= b => {}
            _ => best = Some((i, x)),
        }
    }
    best.map(|(i, _)| i)
}
