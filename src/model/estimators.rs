//! Classifiers and transformers that can appear as pipeline steps.

use anyhow::{bail, ensure, Result};
use serde::Deserialize;

use super::{argmax, ClassLabel, PredictError};

/// Leaf marker in `children_left` / `children_right`.
const TREE_LEAF: i64 = -1;

// ---------- Transformers ----------

#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn validate(&self, width: usize) -> Result<()> {
        ensure!(
            self.mean.len() == width && self.scale.len() == width,
            "scaler expects {} features but has mean[{}] scale[{}]",
            width,
            self.mean.len(),
            self.scale.len()
        );
        Ok(())
    }

    pub fn transform(&self, x: &mut [f64]) {
        for ((v, m), s) in x.iter_mut().zip(&self.mean).zip(&self.scale) {
            let s = if *s == 0.0 { 1.0 } else { *s };
            *v = (*v - m) / s;
        }
    }
}

// ---------- Trees ----------

/// Flat node arrays; node 0 is the root.
#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per-node class weights, `[n_nodes][n_classes]`.
    pub value: Vec<Vec<f64>>,
}

impl Tree {
    fn validate(&self, n_features: usize, n_classes: usize) -> Result<()> {
        let n = self.children_left.len();
        ensure!(n > 0, "tree has no nodes");
        ensure!(
            self.children_right.len() == n
                && self.feature.len() == n
                && self.threshold.len() == n
                && self.value.len() == n,
            "tree node arrays disagree in length"
        );
        for i in 0..n {
            let (l, r) = (self.children_left[i], self.children_right[i]);
            if l == TREE_LEAF {
                ensure!(r == TREE_LEAF, "node {} has only one child", i);
            } else {
                // Children always follow their parent, so descent terminates.
                for c in [l, r] {
                    ensure!(
                        c > i as i64 && (c as usize) < n,
                        "node {} has out-of-order child {}",
                        i,
                        c
                    );
                }
                let f = self.feature[i];
                ensure!(
                    f >= 0 && (f as usize) < n_features,
                    "node {} splits on feature {} of {}",
                    i,
                    f,
                    n_features
                );
            }
            ensure!(
                self.value[i].len() == n_classes,
                "node {} has {} class weights, expected {}",
                i,
                self.value[i].len(),
                n_classes
            );
        }
        Ok(())
    }

    fn leaf(&self, x: &[f64]) -> usize {
        let mut node = 0usize;
        while self.children_left[node] != TREE_LEAF {
            let f = self.feature[node] as usize;
            node = if x[f] <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        node
    }

    fn proba(&self, x: &[f64]) -> Vec<f64> {
        let w = &self.value[self.leaf(x)];
        let total: f64 = w.iter().sum();
        if total > 0.0 {
            w.iter().map(|v| v / total).collect()
        } else {
            vec![1.0 / w.len() as f64; w.len()]
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
    pub classes: Vec<ClassLabel>,
    pub n_features: usize,
    #[serde(flatten)]
    pub tree: Tree,
    #[serde(default)]
    pub feature_importances: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RandomForest {
    pub classes: Vec<ClassLabel>,
    pub n_features: usize,
    pub trees: Vec<Tree>,
    #[serde(default)]
    pub feature_importances: Option<Vec<f64>>,
}

// ---------- Linear models ----------

#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    pub classes: Vec<ClassLabel>,
    pub n_features: usize,
    /// One row for binary problems, one per class otherwise.
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
}

impl LinearModel {
    fn validate(&self) -> Result<()> {
        let k = self.classes.len();
        let rows = if k == 2 { 1 } else { k };
        ensure!(
            self.coef.len() == rows && self.intercept.len() == rows,
            "linear model with {} classes needs {} coefficient rows, got coef[{}] intercept[{}]",
            k,
            rows,
            self.coef.len(),
            self.intercept.len()
        );
        for (i, row) in self.coef.iter().enumerate() {
            ensure!(
                row.len() == self.n_features,
                "coefficient row {} has {} entries, expected {}",
                i,
                row.len(),
                self.n_features
            );
        }
        Ok(())
    }

    fn decision(&self, x: &[f64]) -> Vec<f64> {
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(w, b)| w.iter().zip(x).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }

    fn class_index(&self, x: &[f64]) -> usize {
        let d = self.decision(x);
        if d.len() == 1 {
            usize::from(d[0] > 0.0)
        } else {
            argmax(&d).unwrap_or(0)
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

pub(crate) fn softmax(z: &[f64]) -> Vec<f64> {
    let max = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = z.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

// ---------- Classifier ----------

#[derive(Debug, Clone)]
pub enum Classifier {
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    LogisticRegression(LinearModel),
    LinearSvc(LinearModel),
}

impl Classifier {
    pub fn kind(&self) -> &'static str {
        match self {
            Classifier::DecisionTree(_) => "decision_tree",
            Classifier::RandomForest(_) => "random_forest",
            Classifier::LogisticRegression(_) => "logistic_regression",
            Classifier::LinearSvc(_) => "linear_svc",
        }
    }

    pub fn classes(&self) -> &[ClassLabel] {
        match self {
            Classifier::DecisionTree(m) => &m.classes,
            Classifier::RandomForest(m) => &m.classes,
            Classifier::LogisticRegression(m) | Classifier::LinearSvc(m) => &m.classes,
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Classifier::DecisionTree(m) => m.n_features,
            Classifier::RandomForest(m) => m.n_features,
            Classifier::LogisticRegression(m) | Classifier::LinearSvc(m) => m.n_features,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let k = self.classes().len();
        if k < 2 {
            bail!("{} needs at least two classes, got {}", self.kind(), k);
        }
        match self {
            Classifier::DecisionTree(m) => m.tree.validate(m.n_features, k),
            Classifier::RandomForest(m) => {
                ensure!(!m.trees.is_empty(), "random forest has no trees");
                for (i, t) in m.trees.iter().enumerate() {
                    t.validate(m.n_features, k)
                        .map_err(|e| e.context(format!("tree {}", i)))?;
                }
                Ok(())
            }
            Classifier::LogisticRegression(m) | Classifier::LinearSvc(m) => m.validate(),
        }
    }

    fn check_width(&self, x: &[f64]) -> Result<(), PredictError> {
        let expected = self.n_features();
        if x.len() != expected {
            return Err(PredictError::FeatureCount {
                expected,
                got: x.len(),
            });
        }
        Ok(())
    }

    pub fn predict_row(&self, x: &[f64]) -> Result<&ClassLabel, PredictError> {
        self.check_width(x)?;
        let idx = match self {
            Classifier::LinearSvc(m) => m.class_index(x),
            _ => argmax(&self.proba_row(x)?).unwrap_or(0),
        };
        self.classes()
            .get(idx)
            .ok_or_else(|| PredictError::Malformed(format!("class index {} out of range", idx)))
    }

    pub fn proba_row(&self, x: &[f64]) -> Result<Vec<f64>, PredictError> {
        self.check_width(x)?;
        match self {
            Classifier::DecisionTree(m) => Ok(m.tree.proba(x)),
            Classifier::RandomForest(m) => {
                let mut acc = vec![0.0; m.classes.len()];
                for t in &m.trees {
                    for (a, p) in acc.iter_mut().zip(t.proba(x)) {
                        *a += p;
                    }
                }
                let n = m.trees.len() as f64;
                Ok(acc.into_iter().map(|a| a / n).collect())
            }
            Classifier::LogisticRegression(m) => {
                let d = m.decision(x);
                if d.len() == 1 {
                    let p = sigmoid(d[0]);
                    Ok(vec![1.0 - p, p])
                } else {
                    Ok(softmax(&d))
                }
            }
            Classifier::LinearSvc(_) => Err(PredictError::Unsupported("probability estimation")),
        }
    }

    pub fn feature_importances(&self) -> Result<Vec<f64>, PredictError> {
        let stored = match self {
            Classifier::DecisionTree(m) => m.feature_importances.as_ref(),
            Classifier::RandomForest(m) => m.feature_importances.as_ref(),
            Classifier::LogisticRegression(_) | Classifier::LinearSvc(_) => {
                return Err(PredictError::Unsupported("feature importances"))
            }
        };
        let fi = stored.ok_or(PredictError::Unsupported("feature importances"))?;
        if fi.len() != self.n_features() {
            return Err(PredictError::Malformed(format!(
                "{} feature importances for {} features",
                fi.len(),
                self.n_features()
            )));
        }
        Ok(fi.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stump() -> Tree {
        serde_json::from_value(json!({
            "children_left": [1, -1, -1],
            "children_right": [2, -1, -1],
            "feature": [0, -2, -2],
            "threshold": [0.5, -2.0, -2.0],
            "value": [[4.0, 4.0], [3.0, 1.0], [0.0, 2.0]]
        }))
        .unwrap()
    }

    fn labels() -> Vec<ClassLabel> {
        vec![ClassLabel::Int(0), ClassLabel::Int(1)]
    }

    #[test]
    fn decision_tree_follows_threshold() {
        let clf = Classifier::DecisionTree(DecisionTree {
            classes: labels(),
            n_features: 1,
            tree: stump(),
            feature_importances: Some(vec![1.0]),
        });
        clf.validate().unwrap();
        assert_eq!(clf.proba_row(&[0.5]).unwrap(), vec![0.75, 0.25]);
        assert_eq!(clf.predict_row(&[0.5]).unwrap(), &ClassLabel::Int(0));
        assert_eq!(clf.predict_row(&[0.6]).unwrap(), &ClassLabel::Int(1));
        assert_eq!(clf.feature_importances().unwrap(), vec![1.0]);
    }

    #[test]
    fn forest_averages_tree_probabilities() {
        let mut flipped = stump();
        flipped.value = vec![vec![4.0, 4.0], vec![0.0, 4.0], vec![2.0, 0.0]];
        let clf = Classifier::RandomForest(RandomForest {
            classes: labels(),
            n_features: 1,
            trees: vec![stump(), flipped],
            feature_importances: None,
        });
        clf.validate().unwrap();
        assert_eq!(clf.proba_row(&[0.0]).unwrap(), vec![0.375, 0.625]);
        assert_eq!(clf.predict_row(&[0.0]).unwrap(), &ClassLabel::Int(1));
        assert!(matches!(
            clf.feature_importances(),
            Err(PredictError::Unsupported(_))
        ));
    }

    #[test]
    fn cyclic_tree_is_rejected() {
        let mut t = stump();
        t.children_left = vec![1, 0, -1];
        t.children_right = vec![2, 2, -1];
        t.feature = vec![0, 0, -2];
        let clf = Classifier::DecisionTree(DecisionTree {
            classes: labels(),
            n_features: 1,
            tree: t,
            feature_importances: None,
        });
        assert!(clf.validate().is_err());
    }

    #[test]
    fn split_on_missing_feature_is_rejected() {
        let mut t = stump();
        t.feature[0] = 3;
        let clf = Classifier::DecisionTree(DecisionTree {
            classes: labels(),
            n_features: 1,
            tree: t,
            feature_importances: None,
        });
        assert!(clf.validate().is_err());
    }

    #[test]
    fn binary_logistic_uses_sigmoid() {
        let clf = Classifier::LogisticRegression(LinearModel {
            classes: labels(),
            n_features: 2,
            coef: vec![vec![1.0, -1.0]],
            intercept: vec![0.0],
        });
        clf.validate().unwrap();
        let p = clf.proba_row(&[1.0, 1.0]).unwrap();
        assert_eq!(p, vec![0.5, 0.5]);
        assert_eq!(clf.predict_row(&[3.0, 0.0]).unwrap(), &ClassLabel::Int(1));
        assert!(matches!(
            clf.feature_importances(),
            Err(PredictError::Unsupported(_))
        ));
    }

    #[test]
    fn multiclass_logistic_sums_to_one() {
        let clf = Classifier::LogisticRegression(LinearModel {
            classes: vec![ClassLabel::Int(1), ClassLabel::Int(2), ClassLabel::Int(3)],
            n_features: 1,
            coef: vec![vec![1.0], vec![0.0], vec![-1.0]],
            intercept: vec![0.0, 0.5, 0.0],
        });
        clf.validate().unwrap();
        let p = clf.proba_row(&[2.0]).unwrap();
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(clf.predict_row(&[2.0]).unwrap(), &ClassLabel::Int(1));
        assert_eq!(clf.predict_row(&[-2.0]).unwrap(), &ClassLabel::Int(3));
    }

    #[test]
    fn linear_svc_has_no_probabilities() {
        let clf = Classifier::LinearSvc(LinearModel {
            classes: labels(),
            n_features: 1,
            coef: vec![vec![2.0]],
            intercept: vec![-1.0],
        });
        clf.validate().unwrap();
        assert_eq!(clf.predict_row(&[1.0]).unwrap(), &ClassLabel::Int(1));
        assert_eq!(clf.predict_row(&[0.0]).unwrap(), &ClassLabel::Int(0));
        assert!(matches!(
            clf.proba_row(&[1.0]),
            Err(PredictError::Unsupported(_))
        ));
    }

    #[test]
    fn width_mismatch_is_reported() {
        let clf = Classifier::DecisionTree(DecisionTree {
            classes: labels(),
            n_features: 1,
            tree: stump(),
            feature_importances: Some(vec![0.5, 0.5]),
        });
        assert!(matches!(
            clf.predict_row(&[1.0, 2.0]),
            Err(PredictError::FeatureCount { expected: 1, got: 2 })
        ));
        assert!(matches!(
            clf.feature_importances(),
            Err(PredictError::Malformed(_))
        ));
    }

    #[test]
    fn scaler_ignores_zero_scale() {
        let s = StandardScaler {
            mean: vec![1.0, 2.0],
            scale: vec![2.0, 0.0],
        };
        s.validate(2).unwrap();
        let mut x = vec![5.0, 3.0];
        s.transform(&mut x);
        assert_eq!(x, vec![2.0, 1.0]);
        assert!(s.validate(3).is_err());
    }
}
