//! Resample evaluator
//!
//! Re-grids a series onto a regular axis of width `window`.
//!
//! Buckets are epoch-aligned and half-open: a sample at `t` belongs to the
//! bucket starting at `floor(t / w) * w`, and each output row is labelled
//! with its bucket start. The output spans the first sample's bucket through
//! the last sample's bucket.
//!
//! - Bucket with samples: the downsampler reduces them (strict mode, so a
//!   NaN sample makes the bucket NaN).
//! - Empty bucket: the upsampler fills it from the nearest sample before
//!   (`pad`) or after (`backfilling`) the gap, or with NaN (`fillna`).

use std::ops::Range;

use super::{numeric, EvalEnv, Inputs};
use crate::expr::{parse_duration, ExprError, ExprResult};
use crate::frame::{Field, FieldData, Frame};
use crate::reducer::{NonNumberPolicy, ReducerId, Upsampler};

/// Upper bound on output rows per resample
pub const MAX_BUCKETS: i64 = 1_000_000;

pub(crate) fn evaluate(
    input: &str,
    window: &str,
    downsampler: &ReducerId,
    upsampler: Upsampler,
    inputs: &Inputs,
    env: &EvalEnv,
) -> ExprResult<Frame> {
    let width = parse_duration(window)?;
    let reducer = env.registry.get(downsampler)?;
    let frame = inputs.get(input)?;

    let time = frame.time.as_deref().ok_or_else(|| {
        ExprError::ShapeMismatch(format!("cannot resample '{}': it has no time axis", frame.name))
    })?;

    let (starts, ranges) = buckets(time, width, window)?;

    let mut fields = Vec::with_capacity(frame.fields.len());
    let mut step = 0usize;

    for field in &frame.fields {
        let values = numeric(field, "resample")?;
        let mut out = Vec::with_capacity(ranges.len());

        for range in &ranges {
            env.checkpoint(step)?;
            step += 1;

            let value = if range.is_empty() {
                fill(values, range.start, upsampler)
            } else {
                Some(reducer.reduce(&values[range.clone()], NonNumberPolicy::Strict))
            };
            out.push(value);
        }

        fields.push(Field {
            name: field.name.clone(),
            labels: field.labels.clone(),
            data: FieldData::Number(out),
        });
    }

    Ok(Frame {
        name: frame.name.clone(),
        time: Some(starts),
        fields,
    })
}

/// Bucket start times and the row range of each bucket
///
/// `time` must be non-decreasing. An empty bucket's range is empty and
/// starts at the first row after the gap.
fn buckets(time: &[i64], width: i64, window: &str) -> ExprResult<(Vec<i64>, Vec<Range<usize>>)> {
    let (first, last) = match (time.first(), time.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Ok((Vec::new(), Vec::new())),
    };

    let align = |t: i64| {
        t.div_euclid(width).checked_mul(width).ok_or_else(|| {
            ExprError::InvalidDuration(format!(
                "window '{}' cannot align timestamp {}: out of range",
                window, t
            ))
        })
    };
    let start = align(first)?;
    let end = align(last)?;
    let count = (i128::from(end) - i128::from(start)) / i128::from(width) + 1;

    if count > i128::from(MAX_BUCKETS) {
        return Err(ExprError::InvalidDuration(format!(
            "window '{}' yields {} buckets; the limit is {}",
            window, count, MAX_BUCKETS
        )));
    }

    let count = count as usize;
    let mut starts = Vec::with_capacity(count);
    let mut ranges = Vec::with_capacity(count);
    let mut row = 0usize;

    for i in 0..count {
        let bucket_start = (i as i64)
            .checked_mul(width)
            .and_then(|offset| start.checked_add(offset))
            .ok_or_else(|| {
                ExprError::InvalidDuration(format!("window '{}' overflows the time axis", window))
            })?;
        // No end past i64::MAX: the last bucket takes every remaining row
        let bucket_end = bucket_start.checked_add(width);
        let from = row;
        while row < time.len() && bucket_end.map_or(true, |end| time[row] < end) {
            row += 1;
        }
        starts.push(bucket_start);
        ranges.push(from..row);
    }

    Ok((starts, ranges))
}

/// Fill an empty bucket whose gap ends before row `next`
fn fill(values: &[Option<f64>], next: usize, upsampler: Upsampler) -> Option<f64> {
    match upsampler {
        Upsampler::Pad => next.checked_sub(1).and_then(|prev| values[prev]),
        Upsampler::Backfilling => values.get(next).copied().flatten(),
        Upsampler::FillNa => Some(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: i64 = 1000;
    const MIN: i64 = 60 * SEC;

    fn resample(frame: Frame, window: &str, down: &str, up: Upsampler) -> ExprResult<Frame> {
        let inputs = Inputs::new().with("A", frame);
        evaluate("A", window, &ReducerId::from(down), up, &inputs, &EvalEnv::default())
    }

    fn values(frame: &Frame) -> Vec<Option<f64>> {
        frame.fields[0].numbers().unwrap().to_vec()
    }

    #[test]
    fn test_downsample_10s_to_1m_mean() {
        // Two full minutes of 10s samples: 0..=5 then 6..=11
        let time: Vec<i64> = (0..12).map(|i| i * 10 * SEC).collect();
        let vals: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let frame = Frame::series("A", time, vec![Field::from_f64("v", vals)]).unwrap();

        let out = resample(frame, "1m", "mean", Upsampler::FillNa).unwrap();
        assert_eq!(out.time, Some(vec![0, MIN]));
        assert_eq!(values(&out), vec![Some(2.5), Some(8.5)]);
    }

    #[test]
    fn test_half_open_buckets() {
        // A sample exactly on a boundary opens the next bucket
        let frame = Frame::series(
            "A",
            vec![0, 30 * SEC, MIN],
            vec![Field::from_f64("v", vec![1.0, 3.0, 100.0])],
        )
        .unwrap();

        let out = resample(frame, "1m", "sum", Upsampler::FillNa).unwrap();
        assert_eq!(out.time, Some(vec![0, MIN]));
        assert_eq!(values(&out), vec![Some(4.0), Some(100.0)]);
    }

    #[test]
    fn test_upsample_fill_strategies() {
        // Samples at 0s and 30s, 10s window: buckets 10s and 20s are empty
        let frame = || {
            Frame::series("A", vec![0, 30 * SEC], vec![Field::from_f64("v", vec![1.0, 4.0])]).unwrap()
        };

        let pad = resample(frame(), "10s", "mean", Upsampler::Pad).unwrap();
        assert_eq!(pad.time, Some(vec![0, 10 * SEC, 20 * SEC, 30 * SEC]));
        assert_eq!(values(&pad), vec![Some(1.0), Some(1.0), Some(1.0), Some(4.0)]);

        let back = resample(frame(), "10s", "mean", Upsampler::Backfilling).unwrap();
        assert_eq!(values(&back), vec![Some(1.0), Some(4.0), Some(4.0), Some(4.0)]);

        let na = resample(frame(), "10s", "mean", Upsampler::FillNa).unwrap();
        let na = values(&na);
        assert!(na[1].unwrap().is_nan() && na[2].unwrap().is_nan());
    }

    #[test]
    fn test_unaligned_start() {
        let frame = Frame::series(
            "A",
            vec![90 * SEC, 150 * SEC],
            vec![Field::from_f64("v", vec![1.0, 2.0])],
        )
        .unwrap();

        let out = resample(frame, "1m", "last", Upsampler::Pad).unwrap();
        assert_eq!(out.time, Some(vec![MIN, 2 * MIN]));
        assert_eq!(values(&out), vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_empty_series() {
        let frame = Frame::series("A", vec![], vec![Field::from_f64("v", vec![])]).unwrap();
        let out = resample(frame, "1m", "mean", Upsampler::Pad).unwrap();
        assert_eq!(out.time, Some(vec![]));
        assert!(values(&out).is_empty());
    }

    #[test]
    fn test_errors() {
        let frame = || Frame::series("A", vec![0], vec![Field::from_f64("v", vec![1.0])]).unwrap();

        let err = resample(frame(), "soon", "mean", Upsampler::Pad).unwrap_err();
        assert!(matches!(err, ExprError::InvalidDuration(_)));

        let err = resample(frame(), "1m", "mode", Upsampler::Pad).unwrap_err();
        assert_eq!(err, ExprError::UnknownReducer("mode".to_string()));

        let err = resample(Frame::scalar("A", 1.0), "1m", "mean", Upsampler::Pad).unwrap_err();
        assert!(matches!(err, ExprError::ShapeMismatch(_)));
    }

    #[test]
    fn test_extreme_timestamps() {
        // Flooring i64::MIN to a minute boundary leaves the i64 range
        let frame = Frame::series("A", vec![i64::MIN, i64::MIN + 1], vec![Field::from_f64("v", vec![1.0, 2.0])])
            .unwrap();
        let err = resample(frame, "1m", "mean", Upsampler::Pad).unwrap_err();
        assert!(matches!(err, ExprError::InvalidDuration(_)));

        // The top of the range still aligns and buckets
        let frame = Frame::series("A", vec![i64::MAX - 1, i64::MAX], vec![Field::from_f64("v", vec![1.0, 3.0])])
            .unwrap();
        let out = resample(frame, "1m", "mean", Upsampler::Pad).unwrap();
        assert_eq!(out.time, Some(vec![i64::MAX.div_euclid(MIN) * MIN]));
        assert_eq!(values(&out), vec![Some(2.0)]);
    }

    #[test]
    fn test_bucket_limit() {
        let frame = Frame::series(
            "A",
            vec![0, 365 * 24 * 60 * MIN],
            vec![Field::from_f64("v", vec![1.0, 2.0])],
        )
        .unwrap();

        let err = resample(frame, "1s", "mean", Upsampler::Pad).unwrap_err();
        assert!(matches!(err, ExprError::InvalidDuration(_)));
    }
}
