//! Benchmarks for the alertexpr evaluators and executor
//!
//! Run with: cargo bench

use alertexpr::config::EngineConfig;
use alertexpr::eval::{evaluate_node, EvalEnv, Inputs};
use alertexpr::executor::{EvaluationRequest, Executor};
use alertexpr::expr::{parse_math, QueryNode, RawQueryNode};
use alertexpr::frame::{Field, Frame};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn create_series(rows: usize, fields: usize) -> Frame {
    let time = (0..rows as i64).map(|i| i * 10_000).collect();
    let fields = (0..fields)
        .map(|f| {
            Field::from_f64("cpu", (0..rows).map(|i| (i * (f + 1)) as f64 % 100.0).collect())
                .label("host", format!("web-{}", f))
        })
        .collect();
    Frame::series("A", time, fields).unwrap()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    group.bench_function("math_expression", |b| {
        b.iter(|| parse_math(black_box("($A + $B) * 2 / ${C} - -$D % 3 > 10 && $E < 5")).unwrap())
    });

    group.finish();
}

fn bench_evaluators(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluators");
    let env = EvalEnv::default();

    for rows in [1_000, 100_000] {
        let inputs = Inputs::new()
            .with("A", create_series(rows, 4))
            .with("B", create_series(rows, 4));

        group.throughput(Throughput::Elements((rows * 4) as u64));

        let math = QueryNode::math("M", "$A * 2 + $B").unwrap();
        group.bench_function(format!("math_{}", rows), |b| {
            b.iter(|| evaluate_node(black_box(&math), &inputs, &env).unwrap())
        });

        let reduce = QueryNode::reduce("R", "$A", "mean", None).unwrap();
        group.bench_function(format!("reduce_{}", rows), |b| {
            b.iter(|| evaluate_node(black_box(&reduce), &inputs, &env).unwrap())
        });

        let resample = QueryNode::resample("S", "$A", "1m", "max", "pad").unwrap();
        group.bench_function(format!("resample_{}", rows), |b| {
            b.iter(|| evaluate_node(black_box(&resample), &inputs, &env).unwrap())
        });
    }

    group.finish();
}

fn bench_executor(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("executor");

    // Eight independent branches off one base query
    let mut queries: Vec<RawQueryNode> =
        vec![serde_json::from_str(r#"{"refId": "A", "queryType": "prometheus"}"#).unwrap()];
    for i in 0..8 {
        queries.push(
            serde_json::from_value(serde_json::json!({
                "refId": format!("M{}", i),
                "queryType": "math",
                "expression": format!("$A * {} + 1", i),
            }))
            .unwrap(),
        );
        queries.push(
            serde_json::from_value(serde_json::json!({
                "refId": format!("R{}", i),
                "queryType": "reduce",
                "expression": format!("$M{}", i),
                "reducer": "max",
            }))
            .unwrap(),
        );
    }
    let request = EvaluationRequest::new(queries).with_frame("A", create_series(50_000, 4));

    for (name, config) in [
        ("parallel", EngineConfig::default()),
        ("sequential", EngineConfig::sequential()),
    ] {
        let executor = Executor::new(config);
        group.bench_function(name, |b| {
            b.iter(|| rt.block_on(executor.execute(black_box(request.clone()))).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_evaluators, bench_executor);
criterion_main!(benches);
