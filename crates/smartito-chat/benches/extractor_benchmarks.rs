//! Benchmarks for parameter extraction and memory folding.

use std::time::Duration;

use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, Criterion};
use smartito_chat::context::merge;
use smartito_chat::parser::ParameterExtractor;
use smartito_core::config::default_markets;
use smartito_core::types::ParameterSet;

const MESSAGES: &[&str] = &[
    "¿Cuál es la tasa de conversión en Brasil para diciembre?",
    "¿y en móvil?",
    "What was the traffic in Chile and Peru last month?",
    "Compare desktop vs mobile conversion for paid traffic in Q3 2024",
    "Dame el tráfico orgánico de Colombia entre 2024-06-01 y 2024-06-30",
    "conversion in the last 7 days",
    "¿Cómo le fue a Argentina este año?",
    "Explain the payment confirmations for US in march 2024 with recommendations",
];

fn bench_extraction(c: &mut Criterion) {
    let extractor = ParameterExtractor::new(&default_markets());
    let now = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap_or_default();

    let mut group = c.benchmark_group("parameter_extractor");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("extract_single", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let params = extractor.extract(MESSAGES[idx % MESSAGES.len()], now);
            idx += 1;
            params
        });
    });

    group.bench_function("extract_and_fold_conversation", |b| {
        b.iter(|| {
            MESSAGES.iter().fold(ParameterSet::default(), |acc, text| {
                merge(&acc, &extractor.extract(text, now))
            })
        });
    });

    group.bench_function("build_extractor", |b| {
        b.iter(|| ParameterExtractor::new(&default_markets()));
    });

    group.finish();
}

criterion_group!(benches, bench_extraction);
criterion_main!(benches);
