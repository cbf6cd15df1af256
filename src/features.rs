//! Fixed-schema feature row and the lenient coercions used to build it.
//!
//! The model expects exactly nine columns. Callers send any subset of them
//! under short aliases; everything missing falls back to the defaults below.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::PredictRequest;

pub const DEFAULT_HOUR: i64 = 8;
pub const DEFAULT_WEEKDAY: i64 = 1;
pub const DEFAULT_MONTH: i64 = 1;
pub const DEFAULT_IS_WEEKEND: i64 = 0;
pub const DEFAULT_RUSH_HOUR: i64 = 0;
pub const DEFAULT_WEATHER: &str = "clear";
pub const DEFAULT_VISIBILITY_MI: f64 = 10.0;
pub const DEFAULT_TEMPERATURE_F: f64 = 70.0;
pub const DEFAULT_WIND_SPEED_MPH: f64 = 5.0;

/// Declared type of a schema column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureKind {
    Int,
    Float,
    Text,
}

/// Logical column names in schema order, as the trained model knows them.
pub const SCHEMA: [(&str, FeatureKind); 9] = [
    ("hour", FeatureKind::Int),
    ("weekday", FeatureKind::Int),
    ("month", FeatureKind::Int),
    ("is_weekend", FeatureKind::Int),
    ("rush_hour", FeatureKind::Int),
    ("weather_simple", FeatureKind::Text),
    ("Visibility(mi)", FeatureKind::Float),
    ("Temperature(F)", FeatureKind::Float),
    ("Wind_Speed(mph)", FeatureKind::Float),
];

/// Look up the declared kind of a logical column.
pub fn kind_of(column: &str) -> Option<FeatureKind> {
    SCHEMA
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, kind)| *kind)
}

/// A borrowed cell of a [`FeatureRow`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FeatureValue<'a> {
    Int(i64),
    Float(f64),
    Text(&'a str),
}

impl FeatureValue<'_> {
    /// Numeric view of the cell; text has none.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            FeatureValue::Int(v) => Some(v as f64),
            FeatureValue::Float(v) => Some(v),
            FeatureValue::Text(_) => None,
        }
    }
}

/// One record fed to the predictor.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureRow {
    pub hour: i64,
    pub weekday: i64,
    pub month: i64,
    pub is_weekend: i64,
    pub rush_hour: i64,
    pub weather_simple: String,
    #[serde(rename = "Visibility(mi)")]
    pub visibility_mi: f64,
    #[serde(rename = "Temperature(F)")]
    pub temperature_f: f64,
    #[serde(rename = "Wind_Speed(mph)")]
    pub wind_speed_mph: f64,
}

impl Default for FeatureRow {
    fn default() -> Self {
        Self {
            hour: DEFAULT_HOUR,
            weekday: DEFAULT_WEEKDAY,
            month: DEFAULT_MONTH,
            is_weekend: DEFAULT_IS_WEEKEND,
            rush_hour: DEFAULT_RUSH_HOUR,
            weather_simple: DEFAULT_WEATHER.to_string(),
            visibility_mi: DEFAULT_VISIBILITY_MI,
            temperature_f: DEFAULT_TEMPERATURE_F,
            wind_speed_mph: DEFAULT_WIND_SPEED_MPH,
        }
    }
}

impl FeatureRow {
    /// Fill every column from the request, falling back to the defaults.
    pub fn from_request(req: &PredictRequest) -> Self {
        Self {
            hour: req.hour.unwrap_or(DEFAULT_HOUR),
            weekday: req.weekday.unwrap_or(DEFAULT_WEEKDAY),
            month: req.month.unwrap_or(DEFAULT_MONTH),
            is_weekend: req.is_weekend.unwrap_or(DEFAULT_IS_WEEKEND),
            rush_hour: req.rush_hour.unwrap_or(DEFAULT_RUSH_HOUR),
            weather_simple: req
                .weather
                .clone()
                .unwrap_or_else(|| DEFAULT_WEATHER.to_string()),
            visibility_mi: req.visibility.unwrap_or(DEFAULT_VISIBILITY_MI),
            temperature_f: req.temperature.unwrap_or(DEFAULT_TEMPERATURE_F),
            wind_speed_mph: req.wind_speed.unwrap_or(DEFAULT_WIND_SPEED_MPH),
        }
    }

    /// Cell for a logical column name, `None` for names outside the schema.
    pub fn value(&self, column: &str) -> Option<FeatureValue<'_>> {
        let v = match column {
            "hour" => FeatureValue::Int(self.hour),
            "weekday" => FeatureValue::Int(self.weekday),
            "month" => FeatureValue::Int(self.month),
            "is_weekend" => FeatureValue::Int(self.is_weekend),
            "rush_hour" => FeatureValue::Int(self.rush_hour),
            "weather_simple" => FeatureValue::Text(&self.weather_simple),
            "Visibility(mi)" => FeatureValue::Float(self.visibility_mi),
            "Temperature(F)" => FeatureValue::Float(self.temperature_f),
            "Wind_Speed(mph)" => FeatureValue::Float(self.wind_speed_mph),
            _ => return None,
        };
        Some(v)
    }
}

// ---------- Lenient coercions ----------
//
// Used as `deserialize_with` on optional request fields. Only an absent key
// takes the default; an explicit `null` is a coercion failure.

pub(crate) fn coerce_int(v: &Value) -> Result<i64, String> {
    match v {
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.trunc().abs() < i64::MAX as f64 => {
                        Ok(f.trunc() as i64)
                    }
                    _ => Err(format!("number {} does not fit an integer", n)),
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid integer literal {:?}", s)),
        other => Err(format!("expected an integer, got {}", type_name(other))),
    }
}

pub(crate) fn coerce_float(v: &Value) -> Result<f64, String> {
    match v {
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("number {} is not representable as a float", n)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("could not convert string to float: {:?}", s))
            .and_then(|f| {
                if f.is_finite() {
                    Ok(f)
                } else {
                    Err(format!("non-finite value {:?} is not a valid input", s))
                }
            }),
        other => Err(format!("expected a number, got {}", type_name(other))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn de_int<'de, D>(d: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    coerce_int(&v).map(Some).map_err(de::Error::custom)
}

pub(crate) fn de_float<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    coerce_float(&v).map(Some).map_err(de::Error::custom)
}

pub(crate) fn de_text<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(d)? {
        Value::String(s) => Ok(Some(s)),
        other => Err(de::Error::custom(format!(
            "expected a string, got {}",
            type_name(&other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(payload: Value) -> FeatureRow {
        let req: PredictRequest = serde_json::from_value(payload).unwrap();
        FeatureRow::from_request(&req)
    }

    #[test]
    fn empty_payload_is_default_row() {
        let r = row(json!({}));
        assert_eq!(r, FeatureRow::default());
        assert_eq!(r.hour, 8);
        assert_eq!(r.weekday, 1);
        assert_eq!(r.month, 1);
        assert_eq!(r.is_weekend, 0);
        assert_eq!(r.rush_hour, 0);
        assert_eq!(r.weather_simple, "clear");
        assert_eq!(r.visibility_mi, 10.0);
        assert_eq!(r.temperature_f, 70.0);
        assert_eq!(r.wind_speed_mph, 5.0);
    }

    #[test]
    fn supplied_fields_override_only_themselves() {
        let r = row(json!({ "weather": "rain", "hour": 17 }));
        let expected = FeatureRow {
            hour: 17,
            weather_simple: "rain".to_string(),
            ..FeatureRow::default()
        };
        assert_eq!(r, expected);
    }

    #[test]
    fn aliases_map_to_logical_columns() {
        let r = row(json!({ "visibility": 0.5, "temperature": 28, "wind_speed": "12.5" }));
        assert_eq!(r.value("Visibility(mi)"), Some(FeatureValue::Float(0.5)));
        assert_eq!(r.value("Temperature(F)"), Some(FeatureValue::Float(28.0)));
        assert_eq!(r.value("Wind_Speed(mph)"), Some(FeatureValue::Float(12.5)));
    }

    #[test]
    fn logical_names_are_not_request_keys() {
        let r = row(json!({ "weather_simple": "snow", "Visibility(mi)": 1.0 }));
        assert_eq!(r, FeatureRow::default());
    }

    #[test]
    fn flags_accept_booleans_and_numeric_strings() {
        let r = row(json!({ "is_weekend": true, "rush_hour": "1" }));
        assert_eq!(r.is_weekend, 1);
        assert_eq!(r.rush_hour, 1);

        let r = row(json!({ "is_weekend": false, "rush_hour": 1.9 }));
        assert_eq!(r.is_weekend, 0);
        assert_eq!(r.rush_hour, 1);
    }

    #[test]
    fn explicit_null_is_rejected() {
        for key in [
            "hour",
            "weekday",
            "month",
            "is_weekend",
            "rush_hour",
            "weather",
            "visibility",
            "temperature",
            "wind_speed",
        ] {
            let mut payload = serde_json::Map::new();
            payload.insert(key.to_string(), Value::Null);
            let err = serde_json::from_value::<PredictRequest>(Value::Object(payload)).unwrap_err();
            assert!(err.to_string().contains("null"), "{key}: {err}");
        }
    }

    #[test]
    fn non_finite_float_strings_are_rejected() {
        for v in ["nan", "NaN", "inf", "-Infinity", "+infinity"] {
            let err = serde_json::from_value::<PredictRequest>(json!({ "visibility": v }))
                .unwrap_err();
            assert!(err.to_string().contains("non-finite"), "{v}: {err}");
        }
        assert_eq!(coerce_float(&json!("1e3")), Ok(1000.0));
        assert!(coerce_float(&json!("1e400")).is_err());
    }

    #[test]
    fn non_numeric_float_is_rejected() {
        let err = serde_json::from_value::<PredictRequest>(json!({ "visibility": "foggy" }))
            .unwrap_err();
        assert!(err.to_string().contains("foggy"), "{err}");
    }

    #[test]
    fn wrongly_typed_fields_are_rejected() {
        assert!(serde_json::from_value::<PredictRequest>(json!({ "weather": 3 })).is_err());
        assert!(serde_json::from_value::<PredictRequest>(json!({ "hour": [1] })).is_err());
        assert!(serde_json::from_value::<PredictRequest>(json!({ "month": "May" })).is_err());
    }

    #[test]
    fn coerce_int_truncates_toward_zero() {
        assert_eq!(coerce_int(&json!(-2.7)), Ok(-2));
        assert_eq!(coerce_int(&json!(" 42 ")), Ok(42));
        assert!(coerce_int(&json!(1e300)).is_err());
    }

    #[test]
    fn schema_covers_every_column_once() {
        let r = FeatureRow::default();
        for (name, kind) in SCHEMA {
            let v = r.value(name).expect(name);
            let actual = match v {
                FeatureValue::Int(_) => FeatureKind::Int,
                FeatureValue::Float(_) => FeatureKind::Float,
                FeatureValue::Text(_) => FeatureKind::Text,
            };
            assert_eq!(actual, kind, "{name}");
        }
        assert_eq!(kind_of("weather"), None);
        assert_eq!(r.value("weather"), None);
    }
}
