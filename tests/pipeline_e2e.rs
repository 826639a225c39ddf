use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use kanon::{
    CompanyStore, EngineConfig, InMemoryAuditLog, InMemoryCompanyStore, InMemoryReviewQueue,
    InMemoryRunState, InMemorySuppressionStore, RawRecord, RecordFields, ResolutionEngine,
    SourceType,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn engine_with_store() -> (ResolutionEngine, Arc<InMemoryCompanyStore>) {
    init_tracing();
    let companies = Arc::new(InMemoryCompanyStore::new());
    let engine = ResolutionEngine::new(
        companies.clone(),
        Arc::new(InMemoryRunState::new()),
        Arc::new(InMemorySuppressionStore::new()),
        Arc::new(InMemoryReviewQueue::new()),
        Arc::new(InMemoryAuditLog::new()),
        EngineConfig::default(),
    )
    .unwrap();
    (engine, companies)
}

fn at(day: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::days(day)
}

fn record(day: i64, source: SourceType, fields: RecordFields) -> RawRecord {
    RawRecord::new(source, format!("src-{day}"), at(day), "v2.1", fields)
}

/// One company observed five times across four sources, under name
/// variants a Turkish trade registry actually produces.
fn demirtas_batch() -> Vec<RawRecord> {
    vec![
        record(
            0,
            SourceType::GoogleSearch,
            RecordFields {
                legal_name: Some("Demirtaş Makine".to_string()),
                city: Some("Konya".to_string()),
                website: Some("demirtasmakine.com.tr".to_string()),
                ..RecordFields::default()
            },
        ),
        record(
            1,
            SourceType::GooglePlaces,
            RecordFields {
                legal_name: Some("Demirtaş Makine San. ve Tic. A.Ş.".to_string()),
                city: Some("KONYA".to_string()),
                website: Some("https://www.demirtasmakine.com.tr".to_string()),
                phone: Some("0332 345 67 89".to_string()),
                rating: Some(4.4),
                reviews_count: Some(61),
                ..RecordFields::default()
            },
        ),
        record(
            2,
            SourceType::TradeRegistry,
            RecordFields {
                legal_name: Some("DEMİRTAŞ MAKİNE SANAYİ VE TİCARET ANONİM ŞİRKETİ".to_string()),
                city: Some("Konya".to_string()),
                website: Some("demirtasmakine.com.tr".to_string()),
                company_type: Some("A.Ş.".to_string()),
                address: Some("Organize Sanayi Bölgesi 12. Cadde No: 7".to_string()),
                ..RecordFields::default()
            },
        ),
        record(
            3,
            SourceType::Website,
            RecordFields {
                legal_name: Some("Demirtaş Makine A.Ş.".to_string()),
                city: Some("Konya".to_string()),
                website: Some("demirtasmakine.com.tr/iletisim".to_string()),
                emails: vec!["info@demirtasmakine.com.tr".to_string()],
                keywords: vec!["cnc".to_string(), "torna".to_string()],
                ..RecordFields::default()
            },
        ),
        record(
            4,
            SourceType::Whois,
            RecordFields {
                legal_name: Some("Demirtas Makine".to_string()),
                city: Some("Konya".to_string()),
                website: Some("demirtasmakine.com.tr".to_string()),
                emails: vec!["hostmaster@demirtasmakine.com.tr".to_string()],
                ..RecordFields::default()
            },
        ),
    ]
}

#[test]
fn multi_source_batch_resolves_to_one_company() {
    let (engine, companies) = engine_with_store();
    let report = engine.run_batch(demirtas_batch()).unwrap();

    assert_eq!(report.received, 5);
    assert_eq!(report.invalid, 0);
    assert_eq!(report.new_companies, 1);
    assert_eq!(companies.len().unwrap(), 1);

    let company = &companies.all().unwrap()[0];
    assert_eq!(company.member_count(), 5);
    assert_eq!(company.data_sources.len(), 5);
    assert_eq!(
        company.website_domain.as_ref().map(|v| v.value.as_str()),
        Some("demirtasmakine.com.tr")
    );
    assert_eq!(
        company.phone.as_ref().map(|v| v.value.as_str()),
        Some("+903323456789")
    );
    // Every canonical field names the record it was taken from.
    let name = &company.legal_name;
    assert!(company.is_member(name.chosen_from.record_id));
}

#[test]
fn unrelated_companies_stay_separate() {
    let (engine, companies) = engine_with_store();
    let mut batch = demirtas_batch();
    batch.push(record(
        0,
        SourceType::GooglePlaces,
        RecordFields {
            legal_name: Some("Yıldız Pastanesi".to_string()),
            city: Some("Konya".to_string()),
            phone: Some("0332 111 22 33".to_string()),
            ..RecordFields::default()
        },
    ));
    engine.run_batch(batch).unwrap();
    assert_eq!(companies.len().unwrap(), 2);
}

#[test]
fn incremental_runs_fold_and_stay_idempotent() {
    let (engine, companies) = engine_with_store();
    let first = engine.run_batch(demirtas_batch()).unwrap();
    assert_eq!(first.new_companies, 1);
    let company_id = companies.all().unwrap()[0].company_id;

    // A later scrape of the same site.
    let incremental = vec![record(
        10,
        SourceType::GoogleSearch,
        RecordFields {
            legal_name: Some("Demirtaş Makine Sanayi".to_string()),
            city: Some("Konya".to_string()),
            website: Some("demirtasmakine.com.tr".to_string()),
            ..RecordFields::default()
        },
    )];
    let second = engine.run_batch(incremental.clone()).unwrap();
    assert_eq!(second.new_companies, 0);
    assert_eq!(second.upserts, 1);
    assert_eq!(
        companies.get(company_id).unwrap().unwrap().member_count(),
        6
    );

    // Replaying both batches changes nothing.
    let third = engine
        .run_batch(demirtas_batch().into_iter().chain(incremental).collect())
        .unwrap();
    assert_eq!(third.skipped_high_water, 6);
    assert_eq!(third.upserts, 0);
    assert_eq!(companies.len().unwrap(), 1);
}

#[test]
fn mixed_batch_reports_invalid_records_without_failing() {
    let (engine, companies) = engine_with_store();
    let mut batch = demirtas_batch();
    // No location signal at all.
    batch.push(record(
        5,
        SourceType::Whois,
        RecordFields {
            legal_name: Some("Hayalet Ticaret".to_string()),
            ..RecordFields::default()
        },
    ));
    // No name at all.
    batch.push(record(
        6,
        SourceType::GooglePlaces,
        RecordFields {
            city: Some("Konya".to_string()),
            phone: Some("0332 999 88 77".to_string()),
            ..RecordFields::default()
        },
    ));
    let report = engine.run_batch(batch).unwrap();
    assert_eq!(report.invalid, 2);
    assert_eq!(companies.len().unwrap(), 1);
    // Invalid records never hold the mark back.
    assert!(report.high_water_mark.is_some());
}

#[test]
fn company_ids_are_stable_across_fresh_engines() {
    let (engine_a, companies_a) = engine_with_store();
    let (engine_b, companies_b) = engine_with_store();

    engine_a.run_batch(demirtas_batch()).unwrap();
    // Same content in a different arrival order.
    let mut reversed = demirtas_batch();
    reversed.reverse();
    engine_b.run_batch(reversed).unwrap();

    let id_a = companies_a.all().unwrap()[0].company_id;
    let id_b = companies_b.all().unwrap()[0].company_id;
    assert_eq!(id_a, id_b);
}
