//! Dataset merge benchmarks
//!
//! - Merging per-analysable tables into one dataset
//! - CSV serialization and parsing of the merged result

use analytics_pipeline::dataset::DatasetTable;
use anyhow::Result;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// One per-analysable table with `rows` rows and 4 feature columns.
fn create_table(analysable: usize, rows: usize) -> Result<DatasetTable> {
    let mut table = DatasetTable::new(
        vec!["time_splitting".to_string(), "format".to_string()],
        vec!["quarters".to_string(), format!("format_{}", analysable % 3)],
        ["sampleid", "reads", "reads/mean", "before_start", "target"]
            .iter()
            .map(ToString::to_string)
            .collect(),
    );
    for row in 0..rows {
        let sample = analysable * 100_000 + row;
        table.push_row(vec![
            format!("{sample}-{}", row % 2),
            format!("{:.2}", (row % 7) as f64 / 7.0),
            "0.5".to_string(),
            (row % 2).to_string(),
            (row % 2).to_string(),
        ])?;
    }
    Ok(table)
}

fn create_tables(analysables: usize, rows: usize) -> Result<Vec<DatasetTable>> {
    (0..analysables).map(|a| create_table(a, rows)).collect()
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("dataset_merge");
    for analysables in [10, 100, 500] {
        let tables = create_tables(analysables, 50).expect("tables");
        group.bench_with_input(BenchmarkId::from_parameter(analysables), &tables, |b, tables| {
            b.iter(|| DatasetTable::merge(black_box(tables)).expect("merge"));
        });
    }
    group.finish();
}

fn bench_csv_round_trip(c: &mut Criterion) {
    let tables = create_tables(100, 50).expect("tables");
    let merged = DatasetTable::merge(&tables).expect("merge");
    let csv = merged.to_csv();

    c.bench_function("dataset_to_csv", |b| b.iter(|| black_box(&merged).to_csv()));
    c.bench_function("dataset_parse", |b| {
        b.iter(|| DatasetTable::parse(black_box(&csv)).expect("parse"));
    });
}

criterion_group!(benches, bench_merge, bench_csv_round_trip);
criterion_main!(benches);
