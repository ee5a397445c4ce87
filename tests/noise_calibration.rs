//! Noise Calibration Tests
//!
//! - Laplace draws have the calibrated location and scale
//! - Channel statistics widen with ingest and survive deletes
//! - Noisy aggregates reject degenerate sensitivity ranges

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sensorgate::gateway::SensorGate;
use sensorgate::model::{Channel, ChannelType, Stream, TimeWindow, Tuple, Value};
use sensorgate::planner::{PlannerConfig, PlannerErrorCode, QueryRequest};
use sensorgate::privacy::{PrivacyNoiseEngine, SensitivityRange};
use sensorgate::store::{MemoryCatalog, MemoryStore, TimeSeriesStore};

// =============================================================================
// Helper Functions
// =============================================================================

const DRAWS: usize = 100_000;

fn draws(aggregate: &str, range: SensitivityRange, epsilon: f64, count: Option<u64>) -> Vec<f64> {
    let engine = PrivacyNoiseEngine::new();
    let mut rng = StdRng::seed_from_u64(7);
    (0..DRAWS)
        .map(|_| {
            engine
                .sample_with(&mut rng, aggregate, range, epsilon, count)
                .unwrap()
        })
        .collect()
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn variance(xs: &[f64]) -> f64 {
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64
}

async fn deploy() -> (Arc<MemoryStore>, SensorGate, Stream) {
    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let stream = catalog
        .create_stream(
            "alice",
            "env",
            vec![
                Channel::new("temp", ChannelType::Float),
                Channel::new("steps", ChannelType::Int),
            ],
            vec![],
        )
        .unwrap();
    store.create_stream(&stream).await.unwrap();
    let gate = SensorGate::new(store.clone(), catalog, PlannerConfig::default());
    (store, gate, stream)
}

fn day() -> TimeWindow {
    TimeWindow::between(
        Utc.with_ymd_and_hms(2013, 3, 4, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2013, 3, 4, 23, 59, 59).unwrap(),
    )
    .unwrap()
}

// =============================================================================
// Distribution Tests
// =============================================================================

/// max over [0, 10] at ε = 1 is unbiased: λ = 10, so scale 0.1 and variance 0.02.
#[test]
fn test_max_noise_is_unbiased() {
    let xs = draws("max", SensitivityRange::new(0.0, 10.0), 1.0, None);

    assert!(mean(&xs).abs() < 0.005, "mean {}", mean(&xs));
    let var = variance(&xs);
    assert!((var - 0.02).abs() < 0.02 * 0.05, "variance {}", var);
}

/// avg scales with the sample count: ε · n / Δ = 0.5 · 40 / 20 = 1.
#[test]
fn test_avg_draws_match_scale() {
    let xs = draws("avg", SensitivityRange::new(10.0, 30.0), 0.5, Some(40));

    assert!(mean(&xs).abs() < 0.05, "mean {}", mean(&xs));
    let mean_abs = xs.iter().map(|x| x.abs()).sum::<f64>() / xs.len() as f64;
    assert!((mean_abs - 1.0).abs() < 0.03, "mean |x| {}", mean_abs);
}

/// Half the mass lies within scale · ln 2 of zero.
#[test]
fn test_median_of_absolute_draws() {
    let xs = draws("median", SensitivityRange::new(0.0, 4.0), 2.0, None);
    // λ = 2 · 2 / 4 = 1
    let mut abs: Vec<f64> = xs.iter().map(|x| x.abs()).collect();
    abs.sort_by(|a, b| a.total_cmp(b));
    let median = abs[abs.len() / 2];
    assert!((median - std::f64::consts::LN_2).abs() < 0.02, "median |x| {}", median);
}

/// The same seed reproduces the same sequence.
#[test]
fn test_seeded_sequences_repeat() {
    let a = draws("sum", SensitivityRange::new(-3.0, 5.0), 1.0, None);
    let b = draws("sum", SensitivityRange::new(-3.0, 5.0), 1.0, None);
    assert_eq!(a[..100], b[..100]);
}

// =============================================================================
// Statistics Widening
// =============================================================================

#[tokio::test]
async fn test_statistics_widen_with_ingest() {
    let (_store, gate, stream) = deploy().await;

    gate.ingest_json("alice", "env", r#"["2013-03-04 10:00:00", 21.5, 100]"#)
        .await
        .unwrap();
    let temp = gate.tracker().range(stream.id, 0).unwrap();
    assert_eq!((temp.min, temp.max), (21.5, 21.5));

    gate.ingest_json(
        "alice",
        "env",
        r#"[["2013-03-04 11:00:00", 19, null], ["2013-03-04 12:00:00", 26, 40]]"#,
    )
    .await
    .unwrap();
    let temp = gate.tracker().range(stream.id, 0).unwrap();
    let steps = gate.tracker().range(stream.id, 1).unwrap();
    assert_eq!((temp.min, temp.max), (19.0, 26.0));
    assert_eq!((steps.min, steps.max), (40.0, 100.0));
}

#[tokio::test]
async fn test_delete_keeps_statistics() {
    let (_store, gate, stream) = deploy().await;
    gate.ingest_json(
        "alice",
        "env",
        r#"[["2013-03-04 10:00:00", 5, 1], ["2013-03-04 11:00:00", 35, 2]]"#,
    )
    .await
    .unwrap();

    let removed = gate.delete_range("alice", "env", &day()).await.unwrap();
    assert_eq!(removed, 2);

    let temp = gate.tracker().range(stream.id, 0).unwrap();
    assert_eq!((temp.min, temp.max), (5.0, 35.0));
}

// =============================================================================
// Planner Integration
// =============================================================================

/// With a huge budget the noise is negligible and values stay close.
#[tokio::test]
async fn test_noisy_aggregate_close_to_exact() {
    let (_store, gate, _stream) = deploy().await;
    gate.ingest_json(
        "alice",
        "env",
        r#"[
            ["2013-03-04 10:00:00", 20, 1],
            ["2013-03-04 10:20:00", 24, 2],
            ["2013-03-04 11:10:00", 30, 3]
        ]"#,
    )
    .await
    .unwrap();

    let request = QueryRequest::new("alice", "alice", "env")
        .with_window(day())
        .with_aggregator("NoisyAggregateBy('avg($temp), max($temp)', '1hour', 1000000)");
    let rows = gate.read(request).await.unwrap();

    assert_eq!(rows.len(), 2);
    let expected = [[22.0, 24.0], [30.0, 30.0]];
    for (row, want) in rows.iter().zip(expected) {
        for (value, want) in row.values.iter().zip(want) {
            let got = value.as_f64().unwrap();
            assert!((got - want).abs() < 0.01, "{} vs {}", got, want);
        }
    }
    assert_eq!(gate.metrics().snapshot().noise_samples, 4);
}

/// A channel whose every value was equal has zero sensitivity, for sums too.
#[tokio::test]
async fn test_constant_channel_is_degenerate() {
    let (store, gate, _stream) = deploy().await;
    gate.ingest_json(
        "alice",
        "env",
        r#"[["2013-03-04 10:00:00", 20, 1], ["2013-03-04 11:00:00", 20, 2]]"#,
    )
    .await
    .unwrap();

    for aggregator in [
        "NoisyAggregateRange('median($temp)', 0.5)",
        "NoisyAggregateRange('sum($temp)', 0.5)",
    ] {
        let request = QueryRequest::new("alice", "alice", "env")
            .with_window(day())
            .with_aggregator(aggregator);
        let err = gate.build_and_execute(request).await.err().unwrap();

        assert_eq!(err.code(), PlannerErrorCode::SgNoiseDegenerateSensitivity, "{}", aggregator);
    }
    assert!(store.live_views().is_empty());
}

/// Rows that reached the store without passing ingest have no statistics.
#[tokio::test]
async fn test_untracked_channel_is_degenerate() {
    let (store, gate, stream) = deploy().await;
    store
        .append_tuple(
            stream.id,
            Tuple::new(
                Utc.with_ymd_and_hms(2013, 3, 4, 10, 0, 0).unwrap(),
                vec![Value::Float(20.0), Value::Int(1)],
            ),
        )
        .await
        .unwrap();

    let request = QueryRequest::new("alice", "alice", "env")
        .with_window(day())
        .with_aggregator("NoisyAggregateRange('sum($temp)', 1.0)");
    let err = gate.build_and_execute(request).await.err().unwrap();
    assert_eq!(err.code(), PlannerErrorCode::SgNoiseDegenerateSensitivity);
}

/// A sum over a channel bounded away from zero still calibrates.
#[test]
fn test_sum_uses_largest_magnitude() {
    let engine = PrivacyNoiseEngine::new();
    let lambda = engine
        .precision("sum", SensitivityRange::new(-8.0, 3.0), 0.25, None)
        .unwrap();
    assert_eq!(lambda, 2.0);
}
