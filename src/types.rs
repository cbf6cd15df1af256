use serde::{Deserialize, Serialize};

use crate::features::{de_float, de_int, de_text};

/// Body of `POST /predict`. Every field is optional; unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct PredictRequest {
    #[serde(default, deserialize_with = "de_int")]
    pub hour: Option<i64>,
    #[serde(default, deserialize_with = "de_int")]
    pub weekday: Option<i64>,
    #[serde(default, deserialize_with = "de_int")]
    pub month: Option<i64>,
    #[serde(default, deserialize_with = "de_int")]
    pub is_weekend: Option<i64>,
    #[serde(default, deserialize_with = "de_int")]
    pub rush_hour: Option<i64>,
    #[serde(default, deserialize_with = "de_text")]
    pub weather: Option<String>, // -> weather_simple
    #[serde(default, deserialize_with = "de_float")]
    pub visibility: Option<f64>, // -> Visibility(mi)
    #[serde(default, deserialize_with = "de_float")]
    pub temperature: Option<f64>, // -> Temperature(F)
    #[serde(default, deserialize_with = "de_float")]
    pub wind_speed: Option<f64>, // -> Wind_Speed(mph)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub feature_importances: Vec<f64>,
}

/// `probabilities` and `explanation` serialize as `null` when unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: i64,
    pub probabilities: Option<Vec<f64>>,
    pub explanation: Option<Explanation>,
}
