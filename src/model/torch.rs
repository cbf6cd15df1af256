//! TorchScript backend. The module maps `[rows, width]` float inputs to
//! `[rows, classes]` logits; a sidecar meta file supplies the column layout
//! and the class labels.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};
use tch::{kind::Kind, CModule, Device, Tensor};

use crate::features::FeatureRow;

use super::encoder::ColumnEncoder;
use super::estimators::softmax;
use super::{argmax, ClassLabel, PredictError, Predictor};

#[derive(Deserialize)]
struct MetaJson {
    encoder: ColumnEncoder,
    classes: Vec<ClassLabel>,
}

pub struct TorchPredictor {
    model: CModule,
    device: Device,
    encoder: ColumnEncoder,
    classes: Vec<ClassLabel>,
}

impl TorchPredictor {
    pub fn load(model_path: &Path, meta_path: &Path) -> Result<Self> {
        let device = Device::Cpu;

        let meta_txt = fs::read_to_string(meta_path)
            .with_context(|| format!("failed to read meta at {}", meta_path.display()))?;
        let meta: MetaJson = serde_json::from_str(&meta_txt)
            .with_context(|| format!("failed to parse {}", meta_path.display()))?;
        meta.encoder.validate().context("invalid encoder in meta")?;

        let model = CModule::load_on_device(model_path, device)
            .with_context(|| format!("failed to load TorchScript {}", model_path.display()))?;

        // Probe output shape with a dummy forward; expect [1, classes].
        let width = meta.encoder.width();
        let dummy = Tensor::zeros([1, width as i64], (Kind::Float, device));
        let t = model.forward_ts(&[dummy])?;
        let sz = t.size();
        if sz.len() != 2 || sz[0] != 1 || sz[1] != meta.classes.len() as i64 {
            bail!(
                "unexpected model output size {:?} for {} classes",
                sz,
                meta.classes.len()
            );
        }

        Ok(Self {
            model,
            device,
            encoder: meta.encoder,
            classes: meta.classes,
        })
    }

    fn logits(&self, rows: &[FeatureRow]) -> Result<Vec<Vec<f64>>, PredictError> {
        let width = self.encoder.width();
        let mut flat = Vec::with_capacity(rows.len() * width);
        for row in rows {
            flat.extend(self.encoder.encode(row)?.into_iter().map(|v| v as f32));
        }

        let input = Tensor::from_slice(&flat)
            .reshape([rows.len() as i64, width as i64])
            .to_device(self.device);
        let t = self
            .model
            .forward_ts(&[input])
            .map_err(|e| PredictError::Backend(e.to_string()))?;

        let k = self.classes.len();
        if t.size() != [rows.len() as i64, k as i64] {
            return Err(PredictError::Backend(format!(
                "unexpected output size {:?}",
                t.size()
            )));
        }
        Ok((0..rows.len() as i64)
            .map(|i| (0..k as i64).map(|j| t.double_value(&[i, j])).collect())
            .collect())
    }
}

impl Predictor for TorchPredictor {
    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<ClassLabel>, PredictError> {
        self.logits(rows)?
            .iter()
            .map(|z| {
                let idx = argmax(z).unwrap_or(0);
                self.classes
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| PredictError::Malformed(format!("class index {}", idx)))
            })
            .collect()
    }

    fn predict_proba(&self, rows: &[FeatureRow]) -> Result<Vec<Vec<f64>>, PredictError> {
        Ok(self
            .logits(rows)?
            .into_iter()
            .map(|z| softmax(&z))
            .collect())
    }

    fn describe(&self) -> String {
        format!(
            "torchscript module with {} features and {} classes",
            self.encoder.width(),
            self.classes.len()
        )
    }
}
