//! JSON pipeline artifact: an encoder, optional scalers, then one classifier.
//!
//! ```json
//! { "steps": [
//!     ["prep", { "type": "encoder", "columns": [...] }],
//!     ["clf",  { "type": "random_forest", "classes": [1, 2, 3, 4], ... }]
//! ] }
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::features::FeatureRow;

use super::encoder::ColumnEncoder;
use super::estimators::{Classifier, DecisionTree, LinearModel, RandomForest, StandardScaler};
use super::{ClassLabel, PredictError, Predictor};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Step {
    Encoder(ColumnEncoder),
    StandardScaler(StandardScaler),
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    LogisticRegression(LinearModel),
    LinearSvc(LinearModel),
}

#[derive(Debug, Deserialize)]
struct PipelineJson {
    steps: Vec<(String, Step)>,
}

/// A validated pipeline ready to score rows.
#[derive(Debug)]
pub struct Pipeline {
    encoder: ColumnEncoder,
    scalers: Vec<StandardScaler>,
    step_names: Vec<String>,
    classifier: Classifier,
}

impl Pipeline {
    pub fn from_json(txt: &str) -> Result<Self> {
        let raw: PipelineJson = serde_json::from_str(txt).context("invalid pipeline JSON")?;
        Self::from_steps(raw.steps)
    }

    fn from_steps(steps: Vec<(String, Step)>) -> Result<Self> {
        let step_names: Vec<String> = steps.iter().map(|(n, _)| n.clone()).collect();
        for (i, name) in step_names.iter().enumerate() {
            if step_names[..i].contains(name) {
                bail!("duplicate step name {:?}", name);
            }
        }

        let mut it = steps.into_iter();
        let encoder = match it.next() {
            Some((_, Step::Encoder(e))) => e,
            Some((name, _)) => bail!("first step {:?} must be an encoder", name),
            None => bail!("pipeline has no steps"),
        };
        encoder.validate().context("invalid encoder")?;
        let width = encoder.width();

        let mut scalers = Vec::new();
        let mut classifier = None;
        for (name, step) in it {
            if classifier.is_some() {
                bail!("step {:?} follows the classifier", name);
            }
            match step {
                Step::Encoder(_) => bail!("encoder step {:?} must come first", name),
                Step::StandardScaler(s) => {
                    s.validate(width)
                        .with_context(|| format!("invalid step {:?}", name))?;
                    scalers.push(s);
                }
                Step::DecisionTree(m) => classifier = Some(Classifier::DecisionTree(m)),
                Step::RandomForest(m) => classifier = Some(Classifier::RandomForest(m)),
                Step::LogisticRegression(m) => {
                    classifier = Some(Classifier::LogisticRegression(m))
                }
                Step::LinearSvc(m) => classifier = Some(Classifier::LinearSvc(m)),
            }
        }

        let Some(classifier) = classifier else {
            bail!("pipeline does not end in a classifier");
        };
        let clf_name = step_names.last().map(String::as_str).unwrap_or_default();
        classifier
            .validate()
            .with_context(|| format!("invalid step {:?}", clf_name))?;
        if classifier.n_features() != width {
            bail!(
                "encoder produces {} features but {:?} expects {}",
                width,
                clf_name,
                classifier.n_features()
            );
        }

        Ok(Self {
            encoder,
            scalers,
            step_names,
            classifier,
        })
    }

    pub fn classes(&self) -> &[ClassLabel] {
        self.classifier.classes()
    }

    fn transform(&self, row: &FeatureRow) -> Result<Vec<f64>, PredictError> {
        let mut x = self.encoder.encode(row)?;
        for s in &self.scalers {
            s.transform(&mut x);
        }
        Ok(x)
    }

    fn classifier_name(&self) -> &str {
        self.step_names.last().map(String::as_str).unwrap_or_default()
    }
}

impl Predictor for Pipeline {
    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<ClassLabel>, PredictError> {
        rows.iter()
            .map(|row| {
                let x = self.transform(row)?;
                self.classifier.predict_row(&x).cloned()
            })
            .collect()
    }

    fn predict_proba(&self, rows: &[FeatureRow]) -> Result<Vec<Vec<f64>>, PredictError> {
        rows.iter()
            .map(|row| self.classifier.proba_row(&self.transform(row)?))
            .collect()
    }

    fn feature_importances(&self, step: &str) -> Result<Vec<f64>, PredictError> {
        if step == self.classifier_name() {
            self.classifier.feature_importances()
        } else {
            Err(PredictError::Unsupported("feature importances"))
        }
    }

    fn describe(&self) -> String {
        format!(
            "pipeline [{}] {} with {} features and classes {:?}",
            self.step_names.join(", "),
            self.classifier.kind(),
            self.classifier.n_features(),
            self.classes()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        )
    }
}
