//! Core frame types
//!
//! - `Frame`: a named set of fields, optionally sharing a time axis
//! - `Field`: one named, labelled column of values
//! - `FieldData`: the typed values of a field
//!
//! A frame with a time axis is a *series* frame: every field holds one value
//! per timestamp. A frame without one is a *number set*: every field holds
//! exactly one value (this is what reductions produce).

use super::error::{FrameError, FrameResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Series labels (e.g. `{"host": "web-1"}`)
pub type Labels = BTreeMap<String, String>;

/// Typed values of a single field
///
/// Numeric values are `Option<f64>`: `None` is a missing value, `Some(NaN)`
/// is a real NaN sample. The two are kept apart because reducers treat them
/// differently from math.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum FieldData {
    /// Floating point values
    Number(#[serde(with = "wire_numbers")] Vec<Option<f64>>),
    /// String values; never accepted by numeric operators
    String(Vec<Option<String>>),
}

impl FieldData {
    /// Number of values
    pub fn len(&self) -> usize {
        match self {
            FieldData::Number(values) => values.len(),
            FieldData::String(values) => values.len(),
        }
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the value type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldData::Number(_) => "number",
            FieldData::String(_) => "string",
        }
    }
}

/// One column of a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Series labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    /// Field values
    pub data: FieldData,
}

impl Field {
    /// Create a numeric field
    pub fn number(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            data: FieldData::Number(values),
        }
    }

    /// Create a numeric field with no missing values
    pub fn from_f64(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::number(name, values.into_iter().map(Some).collect())
    }

    /// Create a string field
    pub fn string(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            data: FieldData::String(values),
        }
    }

    /// Builder method: add a label
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Builder method: replace all labels
    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Numeric values, or `None` for non-numeric fields
    pub fn numbers(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            FieldData::Number(values) => Some(values),
            FieldData::String(_) => None,
        }
    }

    /// Numeric value at a row
    pub fn number_at(&self, row: usize) -> Option<f64> {
        self.numbers().and_then(|values| values.get(row).copied().flatten())
    }
}

/// A named collection of equal-length fields, optionally time-indexed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame name (the producing node's RefID once evaluated)
    #[serde(default)]
    pub name: String,
    /// Shared time axis in Unix milliseconds; `None` for number sets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Vec<i64>>,
    /// Fields
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Frame {
    /// Create a validated series frame
    pub fn series(name: impl Into<String>, time: Vec<i64>, fields: Vec<Field>) -> FrameResult<Self> {
        let frame = Self {
            name: name.into(),
            time: Some(time),
            fields,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Create a validated number set (one row per field)
    pub fn number_set(name: impl Into<String>, fields: Vec<Field>) -> FrameResult<Self> {
        let frame = Self {
            name: name.into(),
            time: None,
            fields,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Create a one-field, one-row scalar frame
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        let name = name.into();
        Self {
            fields: vec![Field::number(name.clone(), vec![Some(value)])],
            name,
            time: None,
        }
    }

    /// Builder method: rename the frame
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether the frame has a time axis
    pub fn is_series(&self) -> bool {
        self.time.is_some()
    }

    /// Number of rows (always 1 for number sets)
    pub fn row_count(&self) -> usize {
        match &self.time {
            Some(time) => time.len(),
            None => 1,
        }
    }

    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check the frame invariants
    ///
    /// Series: every field has one value per timestamp and the time axis is
    /// non-decreasing. Number set: every field has exactly one value.
    pub fn validate(&self) -> FrameResult<()> {
        let expected = self.row_count();

        for field in &self.fields {
            if field.len() != expected {
                return Err(FrameError::LengthMismatch {
                    field: field.name.clone(),
                    expected,
                    actual: field.len(),
                });
            }
        }

        if let Some(time) = &self.time {
            if let Some(row) = time.windows(2).position(|w| w[1] < w[0]) {
                return Err(FrameError::UnsortedTime { row: row + 1 });
            }
        }

        Ok(())
    }
}

/// Serde helpers for numeric values
///
/// JSON has no NaN or infinities, so they travel as the strings `"NaN"`,
/// `"+Inf"` and `"-Inf"`. Missing values are `null`.
mod wire_numbers {
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum WireNumber {
        Finite(f64),
        Special(String),
    }

    pub fn serialize<S: Serializer>(values: &[Option<f64>], serializer: S) -> Result<S::Ok, S::Error> {
        let wire: Vec<Option<WireNumber>> = values
            .iter()
            .map(|v| {
                v.map(|v| {
                    if v.is_nan() {
                        WireNumber::Special("NaN".to_string())
                    } else if v == f64::INFINITY {
                        WireNumber::Special("+Inf".to_string())
                    } else if v == f64::NEG_INFINITY {
                        WireNumber::Special("-Inf".to_string())
                    } else {
                        WireNumber::Finite(v)
                    }
                })
            })
            .collect();
        wire.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Option<f64>>, D::Error> {
        let wire = Vec::<Option<WireNumber>>::deserialize(deserializer)?;
        wire.into_iter()
            .map(|v| match v {
                None => Ok(None),
                Some(WireNumber::Finite(v)) => Ok(Some(v)),
                Some(WireNumber::Special(s)) => match s.as_str() {
                    "NaN" => Ok(Some(f64::NAN)),
                    "+Inf" | "Inf" => Ok(Some(f64::INFINITY)),
                    "-Inf" => Ok(Some(f64::NEG_INFINITY)),
                    other => Err(de::Error::custom(format!("invalid number '{}'", other))),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_frame_validation() {
        let frame = Frame::series(
            "A",
            vec![1000, 2000, 3000],
            vec![Field::from_f64("cpu", vec![1.0, 2.0, 3.0])],
        )
        .unwrap();
        assert!(frame.is_series());
        assert_eq!(frame.row_count(), 3);

        let err = Frame::series(
            "A",
            vec![1000, 2000],
            vec![Field::from_f64("cpu", vec![1.0, 2.0, 3.0])],
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { expected: 2, actual: 3, .. }));
    }

    #[test]
    fn test_unsorted_time_rejected() {
        let err = Frame::series(
            "A",
            vec![1000, 3000, 2000],
            vec![Field::from_f64("cpu", vec![1.0, 2.0, 3.0])],
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::UnsortedTime { row: 2 }));

        // Equal timestamps are allowed
        assert!(Frame::series("A", vec![1000, 1000], vec![Field::from_f64("x", vec![1.0, 2.0])]).is_ok());
    }

    #[test]
    fn test_number_set_has_one_row() {
        let frame = Frame::number_set(
            "B",
            vec![
                Field::from_f64("a", vec![1.0]).label("host", "web-1"),
                Field::from_f64("b", vec![2.0]),
            ],
        )
        .unwrap();
        assert!(!frame.is_series());
        assert_eq!(frame.row_count(), 1);

        assert!(Frame::number_set("B", vec![Field::from_f64("a", vec![1.0, 2.0])]).is_err());
    }

    #[test]
    fn test_scalar_frame() {
        let frame = Frame::scalar("C", 4.5);
        assert_eq!(frame.fields.len(), 1);
        assert_eq!(frame.fields[0].number_at(0), Some(4.5));
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_json_special_values() {
        let frame = Frame::series(
            "A",
            vec![1, 2, 3, 4],
            vec![Field::number(
                "v",
                vec![Some(1.5), Some(f64::NAN), None, Some(f64::INFINITY)],
            )],
        )
        .unwrap();

        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#"[1.5,"NaN",null,"+Inf"]"#), "json: {}", json);

        let decoded: Frame = serde_json::from_str(&json).unwrap();
        let values = decoded.fields[0].numbers().unwrap();
        assert_eq!(values[0], Some(1.5));
        assert!(values[1].unwrap().is_nan());
        assert_eq!(values[2], None);
        assert_eq!(values[3], Some(f64::INFINITY));
    }

    #[test]
    fn test_string_field_is_not_numeric() {
        let field = Field::string("host", vec![Some("web-1".to_string())]);
        assert!(field.numbers().is_none());
        assert_eq!(field.data.type_name(), "string");
    }
}
