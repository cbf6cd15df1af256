//! Maps a [`FeatureRow`] onto the numeric input vector a classifier expects.

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::features::{kind_of, FeatureKind, FeatureRow, FeatureValue};

use super::PredictError;

#[derive(Debug, Clone, Deserialize)]
pub struct EncodedColumn {
    /// Logical column name, e.g. `"Visibility(mi)"`.
    pub name: String,
    /// Present for one-hot encoded text columns.
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

/// Ordered column layout. Numeric columns pass through; text columns expand
/// into one indicator per known category (unknown categories encode as zeros).
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnEncoder {
    pub columns: Vec<EncodedColumn>,
}

impl ColumnEncoder {
    /// Reject layouts that name columns outside the schema or encode a column
    /// against its declared kind.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            bail!("encoder has no columns");
        }
        for col in &self.columns {
            let Some(kind) = kind_of(&col.name) else {
                bail!("encoder column {:?} is not part of the feature schema", col.name);
            };
            match (&col.categories, kind) {
                (Some(cats), FeatureKind::Text) if cats.is_empty() => {
                    bail!("encoder column {:?} lists no categories", col.name)
                }
                (Some(_), FeatureKind::Text) | (None, FeatureKind::Int | FeatureKind::Float) => {}
                (Some(_), _) => bail!("numeric column {:?} cannot be one-hot encoded", col.name),
                (None, FeatureKind::Text) => {
                    bail!("text column {:?} needs a category list", col.name)
                }
            }
        }
        Ok(())
    }

    /// Width of the encoded vector.
    pub fn width(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.categories.as_ref().map_or(1, Vec::len))
            .sum()
    }

    pub fn encode(&self, row: &FeatureRow) -> Result<Vec<f64>, PredictError> {
        let mut v = Vec::with_capacity(self.width());
        for col in &self.columns {
            let cell = row.value(&col.name).ok_or_else(|| {
                PredictError::Malformed(format!("unknown column {:?}", col.name))
            })?;
            match (&col.categories, cell) {
                (Some(cats), FeatureValue::Text(s)) => {
                    v.extend(cats.iter().map(|c| if c == s { 1.0 } else { 0.0 }));
                }
                (None, cell) => {
                    let x = cell.as_f64().ok_or_else(|| {
                        PredictError::Malformed(format!("column {:?} is not numeric", col.name))
                    })?;
                    v.push(x);
                }
                (Some(_), _) => {
                    return Err(PredictError::Malformed(format!(
                        "column {:?} is not categorical",
                        col.name
                    )))
                }
            }
        }
        Ok(v)
    }
}
