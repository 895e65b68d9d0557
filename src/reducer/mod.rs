//! Reducers
//!
//! Functions that collapse a value sequence to one scalar, and the settings
//! that control how non-numeric values are treated before reducing.
//!
//! - **Types**: `ReducerId`, `ReduceMode`, `ReduceSettings`, `NonNumberPolicy`, `Upsampler`
//! - **Registry**: injectable id → function table (`ReducerRegistry`)

mod registry;

pub use registry::{ReduceFn, Reducer, ReducerRegistry};

use serde::{Deserialize, Serialize};

/// Reducer identifier as it appears on the wire (`"mean"`, `"last"`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReducerId(String);

impl ReducerId {
    pub const SUM: &'static str = "sum";
    pub const MEAN: &'static str = "mean";
    pub const MIN: &'static str = "min";
    pub const MAX: &'static str = "max";
    pub const COUNT: &'static str = "count";
    pub const LAST: &'static str = "last";

    /// Create a reducer id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ReducerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for ReducerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-number behavior mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReduceMode {
    /// Drop non-numbers
    #[serde(rename = "dropNN")]
    Drop,
    /// Replace non-numbers
    #[serde(rename = "replaceNN")]
    Replace,
}

impl std::fmt::Display for ReduceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Drop => write!(f, "dropNN"),
            Self::Replace => write!(f, "replaceNN"),
        }
    }
}

/// Reducer options as sent on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReduceSettings {
    /// Non-number reduce behavior
    pub mode: ReduceMode,
    /// Only valid when mode is replace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_with_value: Option<f64>,
}

impl ReduceSettings {
    /// Settings that drop non-numbers
    pub fn drop_non_numbers() -> Self {
        Self {
            mode: ReduceMode::Drop,
            replace_with_value: None,
        }
    }

    /// Settings that replace non-numbers with `value`
    pub fn replace_non_numbers(value: f64) -> Self {
        Self {
            mode: ReduceMode::Replace,
            replace_with_value: Some(value),
        }
    }

    /// Validate the settings and turn them into a policy
    pub fn policy(&self) -> Result<NonNumberPolicy, String> {
        match (self.mode, self.replace_with_value) {
            (ReduceMode::Drop, None) => Ok(NonNumberPolicy::Drop),
            (ReduceMode::Drop, Some(_)) => {
                Err("replaceWithValue is only valid when mode is replaceNN".to_string())
            }
            (ReduceMode::Replace, Some(v)) => Ok(NonNumberPolicy::Replace(v)),
            (ReduceMode::Replace, None) => {
                Err("mode replaceNN requires replaceWithValue".to_string())
            }
        }
    }
}

/// How NaN and missing values are treated before reducing
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NonNumberPolicy {
    /// No settings: missing values read as NaN and NaN propagates
    #[default]
    Strict,
    /// Exclude NaN and missing values
    Drop,
    /// Substitute the value for every NaN and missing value
    Replace(f64),
}

impl NonNumberPolicy {
    /// Apply the policy to raw field values
    pub fn prepare(&self, values: &[Option<f64>]) -> Vec<f64> {
        match self {
            Self::Strict => values.iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
            Self::Drop => values
                .iter()
                .filter_map(|v| v.filter(|x| !x.is_nan()))
                .collect(),
            Self::Replace(replacement) => values
                .iter()
                .map(|v| match v {
                    Some(x) if !x.is_nan() => *x,
                    _ => *replacement,
                })
                .collect(),
        }
    }
}

/// Fill strategy for resample buckets that contain no samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsampler {
    /// Carry the previous sample forward
    Pad,
    /// Pull the next sample backward
    Backfilling,
    /// Leave the bucket as NaN
    FillNa,
}

impl Upsampler {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pad => "pad",
            Self::Backfilling => "backfilling",
            Self::FillNa => "fillna",
        }
    }
}

impl std::str::FromStr for Upsampler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pad" | "last" => Ok(Self::Pad),
            "backfilling" | "backfill" | "first" => Ok(Self::Backfilling),
            "fillna" => Ok(Self::FillNa),
            other => Err(format!("unknown upsampler '{}'", other)),
        }
    }
}

impl std::fmt::Display for Upsampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsampler_aliases() {
        assert_eq!("pad".parse::<Upsampler>(), Ok(Upsampler::Pad));
        assert_eq!("last".parse::<Upsampler>(), Ok(Upsampler::Pad));
        assert_eq!("backfill".parse::<Upsampler>(), Ok(Upsampler::Backfilling));
        assert_eq!("first".parse::<Upsampler>(), Ok(Upsampler::Backfilling));
        assert_eq!("fillna".parse::<Upsampler>(), Ok(Upsampler::FillNa));
        assert!("mean".parse::<Upsampler>().is_err());
    }

    #[test]
    fn test_settings_wire_format() {
        let settings: ReduceSettings =
            serde_json::from_str(r#"{"mode":"replaceNN","replaceWithValue":0}"#).unwrap();
        assert_eq!(settings, ReduceSettings::replace_non_numbers(0.0));

        let settings: ReduceSettings = serde_json::from_str(r#"{"mode":"dropNN"}"#).unwrap();
        assert_eq!(settings.policy(), Ok(NonNumberPolicy::Drop));

        assert!(serde_json::from_str::<ReduceSettings>(r#"{"mode":"keepNN"}"#).is_err());
    }

    #[test]
    fn test_settings_validation() {
        assert!(ReduceSettings {
            mode: ReduceMode::Replace,
            replace_with_value: None
        }
        .policy()
        .is_err());

        assert!(ReduceSettings {
            mode: ReduceMode::Drop,
            replace_with_value: Some(1.0)
        }
        .policy()
        .is_err());
    }

    #[test]
    fn test_policy_prepare() {
        let values = [Some(1.0), Some(f64::NAN), None, Some(3.0)];

        assert_eq!(NonNumberPolicy::Drop.prepare(&values), vec![1.0, 3.0]);
        assert_eq!(
            NonNumberPolicy::Replace(0.0).prepare(&values),
            vec![1.0, 0.0, 0.0, 3.0]
        );

        let strict = NonNumberPolicy::Strict.prepare(&values);
        assert_eq!(strict.len(), 4);
        assert!(strict[1].is_nan() && strict[2].is_nan());
    }
}
