//! Accident-severity prediction served over `POST /predict`.
//!
//! A sparse JSON payload becomes a fixed nine-column [`features::FeatureRow`],
//! the row is scored by a [`model::Predictor`] loaded once at startup, and the
//! label comes back with best-effort probabilities and feature importances.

pub mod config;
pub mod features;
pub mod model;
pub mod server;
pub mod types;
