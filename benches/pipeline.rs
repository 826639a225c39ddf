use std::sync::Arc;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use chrono::{Duration, TimeZone, Utc};
use kanon::{
    EngineConfig, InMemoryAuditLog, InMemoryCompanyStore, InMemoryReviewQueue, InMemoryRunState,
    InMemorySuppressionStore, RawRecord, RecordFields, ResolutionEngine, SourceType,
};

fn make_engine(group_workers: usize) -> ResolutionEngine {
    let config = EngineConfig {
        group_workers,
        ..EngineConfig::default()
    };
    ResolutionEngine::new(
        Arc::new(InMemoryCompanyStore::new()),
        Arc::new(InMemoryRunState::new()),
        Arc::new(InMemorySuppressionStore::new()),
        Arc::new(InMemoryReviewQueue::new()),
        Arc::new(InMemoryAuditLog::new()),
        config,
    )
    .unwrap()
}

/// `companies` distinct companies, each observed from three sources with
/// name variants, so every company costs three comparisons plus a merge.
fn make_batch(companies: usize) -> Vec<RawRecord> {
    let base = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
    let mut records = Vec::with_capacity(companies * 3);
    for i in 0..companies {
        let domain = format!("firma{i}.com.tr");
        let variants = [
            (SourceType::GoogleSearch, format!("Firma {i} Ticaret")),
            (SourceType::GooglePlaces, format!("Firma {i} Tic. A.Ş.")),
            (SourceType::Website, format!("Firma {i} Ticaret A.Ş.")),
        ];
        for (j, (source, name)) in variants.into_iter().enumerate() {
            records.push(RawRecord::new(
                source,
                format!("ref-{i}-{j}"),
                base + Duration::seconds((i * 3 + j) as i64),
                "v2.1",
                RecordFields {
                    legal_name: Some(name),
                    city: Some("Ankara".to_string()),
                    website: Some(domain.clone()),
                    ..RecordFields::default()
                },
            ));
        }
    }
    records
}

fn bench_batch_serial(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline/batch_serial");
    group.throughput(Throughput::Elements(300 * 3));
    group.bench_function("300_companies_x3", |b| {
        b.iter_custom(|iters| {
            let mut total = std::time::Duration::ZERO;
            for _ in 0..iters {
                // Fresh state per sample so the second run is not a
                // high-water-mark no-op.
                let engine = make_engine(1);
                let batch = make_batch(300);
                let start = Instant::now();
                let report = engine.run_batch(batch).unwrap();
                total += start.elapsed();
                assert_eq!(report.new_companies, 300);
            }
            total
        });
    });
    group.finish();
}

fn bench_batch_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline/batch_parallel");
    group.throughput(Throughput::Elements(300 * 3));
    group.bench_function("300_companies_x3_4workers", |b| {
        b.iter_custom(|iters| {
            let mut total = std::time::Duration::ZERO;
            for _ in 0..iters {
                let engine = make_engine(4);
                let batch = make_batch(300);
                let start = Instant::now();
                let report = engine.run_batch(batch).unwrap();
                total += start.elapsed();
                assert_eq!(report.new_companies, 300);
            }
            total
        });
    });
    group.finish();
}

fn bench_incremental_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline/incremental");
    group.throughput(Throughput::Elements(100));
    group.bench_function("100_new_records_against_300_companies", |b| {
        b.iter_custom(|iters| {
            let mut total = std::time::Duration::ZERO;
            for _ in 0..iters {
                let engine = make_engine(1);
                engine.run_batch(make_batch(300)).unwrap();

                let base = Utc.with_ymd_and_hms(2026, 6, 2, 0, 0, 0).unwrap();
                let increment: Vec<RawRecord> = (0..100)
                    .map(|i| {
                        RawRecord::new(
                            SourceType::Whois,
                            format!("whois-{i}"),
                            base + Duration::seconds(i),
                            "v2.1",
                            RecordFields {
                                legal_name: Some(format!("Firma {i} Ticaret")),
                                city: Some("Ankara".to_string()),
                                website: Some(format!("firma{i}.com.tr")),
                                ..RecordFields::default()
                            },
                        )
                    })
                    .collect();

                let start = Instant::now();
                let report = engine.run_batch(increment).unwrap();
                total += start.elapsed();
                assert_eq!(report.new_companies, 0);
            }
            total
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_batch_serial,
    bench_batch_parallel,
    bench_incremental_fold
);
criterion_main!(benches);
