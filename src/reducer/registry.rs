//! Reducer registry
//!
//! Maps reducer ids to functions. Evaluators receive a registry instead of
//! relying on a global table, so tests and callers can swap in their own set.

use super::{NonNumberPolicy, ReducerId};
use crate::expr::{ExprError, ExprResult};
use std::collections::HashMap;
use std::sync::Arc;

/// A reducer function over already-prepared values
///
/// Must return NaN for an empty slice unless an empty input has a natural
/// answer (`count` returns 0).
pub type ReduceFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// A registered reducer
#[derive(Clone)]
pub struct Reducer {
    func: ReduceFn,
    /// Reads the final row directly instead of the policy-prepared values
    final_row: bool,
}

impl Reducer {
    /// Reducer over values prepared by the non-number policy
    pub fn new(func: impl Fn(&[f64]) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            func: Arc::new(func),
            final_row: false,
        }
    }

    /// Reducer that returns the value of the highest-timestamp row as-is
    pub fn final_row() -> Self {
        Self {
            func: Arc::new(|values: &[f64]| values.last().copied().unwrap_or(f64::NAN)),
            final_row: true,
        }
    }

    /// Reduce raw field values under a policy
    pub fn reduce(&self, values: &[Option<f64>], policy: NonNumberPolicy) -> f64 {
        if self.final_row {
            return values.last().copied().flatten().unwrap_or(f64::NAN);
        }
        (self.func)(&policy.prepare(values))
    }

    /// Reduce values that need no preparation
    pub fn reduce_prepared(&self, values: &[f64]) -> f64 {
        (self.func)(values)
    }
}

impl std::fmt::Debug for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reducer")
            .field("final_row", &self.final_row)
            .finish_non_exhaustive()
    }
}

/// Injectable reducer table
#[derive(Debug, Clone)]
pub struct ReducerRegistry {
    reducers: HashMap<String, Reducer>,
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ReducerRegistry {
    /// Registry with no reducers
    pub fn empty() -> Self {
        Self {
            reducers: HashMap::new(),
        }
    }

    /// Registry with the standard reducers and the legacy classic vocabulary
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();

        registry.register(ReducerId::SUM, Reducer::new(sum));
        registry.register(ReducerId::MEAN, Reducer::new(mean));
        registry.register(ReducerId::MIN, Reducer::new(min));
        registry.register(ReducerId::MAX, Reducer::new(max));
        registry.register(ReducerId::COUNT, Reducer::new(|v: &[f64]| v.len() as f64));
        registry.register(ReducerId::LAST, Reducer::final_row());
        registry.register("median", Reducer::new(median));
        registry.register("first", Reducer::new(|v: &[f64]| v.first().copied().unwrap_or(f64::NAN)));
        registry.register("diff", Reducer::new(diff));
        registry.register("diff_abs", Reducer::new(|v: &[f64]| diff(v).abs()));
        registry.register("percent_diff", Reducer::new(percent_diff));
        registry.register("percent_diff_abs", Reducer::new(|v: &[f64]| percent_diff(v).abs()));
        registry.register(
            "count_non_null",
            Reducer::new(|v: &[f64]| v.iter().filter(|x| !x.is_nan()).count() as f64),
        );

        // Legacy classic-condition spelling
        registry.alias("avg", ReducerId::MEAN);

        registry
    }

    /// Register (or replace) a reducer
    pub fn register(&mut self, id: impl Into<String>, reducer: Reducer) {
        self.reducers.insert(id.into(), reducer);
    }

    /// Register `alias` as another name for an existing reducer
    pub fn alias(&mut self, alias: impl Into<String>, target: &str) {
        if let Some(reducer) = self.reducers.get(target).cloned() {
            self.reducers.insert(alias.into(), reducer);
        }
    }

    /// Look up a reducer
    pub fn get(&self, id: &ReducerId) -> ExprResult<&Reducer> {
        self.reducers
            .get(id.as_str())
            .ok_or_else(|| ExprError::UnknownReducer(id.to_string()))
    }

    /// Whether the id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.reducers.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.reducers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Reduce raw field values with the named reducer
    pub fn reduce(
        &self,
        id: &ReducerId,
        values: &[Option<f64>],
        policy: NonNumberPolicy,
    ) -> ExprResult<f64> {
        Ok(self.get(id)?.reduce(values, policy))
    }
}

fn sum(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

// f64::min/max skip NaN, so propagate it explicitly
fn min(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

fn max(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn diff(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) => last - first,
        _ => f64::NAN,
    }
}

fn percent_diff(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) => (last - first) / first.abs() * 100.0,
        _ => f64::NAN,
    }
}
