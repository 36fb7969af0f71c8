// Integration tests for invoice number allocation under concurrency and per-tenant formats.

#[path = "../helpers/mod.rs"]
mod helpers;

use std::collections::HashSet;
use std::sync::Arc;

use enrollpay::config::tenants::TenantOverrides;
use enrollpay::config::{BillingSettings, StaticTenantConfig};
use enrollpay::core::AppError;
use enrollpay::modules::schedules::ScheduleStore;
use helpers::*;
use rust_decimal_macros::dec;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_allocations_are_distinct_and_gap_free() {
    let t = Arc::new(TestEngine::new());
    let acme = tenant("acme");

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let t = t.clone();
            let acme = acme.clone();
            tokio::spawn(async move { t.engine.invoice_numbers.allocate(&acme).await })
        })
        .collect();

    let mut counters = Vec::new();
    let mut values = HashSet::new();
    for handle in handles {
        let number = handle.await.unwrap().unwrap();
        counters.push(number.counter);
        values.insert(number.value);
    }
    counters.sort_unstable();

    assert_eq!(counters, (1..=50).collect::<Vec<i64>>());
    assert_eq!(values.len(), 50);
    assert!(values.contains("INV-2025-000050"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_enrollments_get_distinct_numbers() {
    let t = Arc::new(TestEngine::new());
    let acme = tenant("acme");

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let t = t.clone();
            let acme = acme.clone();
            tokio::spawn(async move {
                t.engine
                    .schedules
                    .create_enrollment_schedule(&acme, create_cmd(dec!(300), deposit_plan()))
                    .await
            })
        })
        .collect();

    let mut numbers = HashSet::new();
    for handle in handles {
        let view = handle.await.unwrap().unwrap();
        numbers.insert(view.enrollment.invoice_number);
    }
    assert_eq!(numbers.len(), 20);

    let next = t.engine.invoice_numbers.allocate(&acme).await.unwrap();
    assert_eq!(next.counter, 21);
}

#[tokio::test]
async fn test_counters_are_per_tenant() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let globex = tenant("globex");

    for _ in 0..3 {
        t.engine.invoice_numbers.allocate(&acme).await.unwrap();
    }
    let first_globex = t.engine.invoice_numbers.allocate(&globex).await.unwrap();
    let fourth_acme = t.engine.invoice_numbers.allocate(&acme).await.unwrap();

    assert_eq!(first_globex.value, "INV-2025-000001");
    assert_eq!(first_globex.tenant_id, globex);
    assert_eq!(fourth_acme.value, "INV-2025-000004");
}

#[tokio::test]
async fn test_rolled_back_allocation_is_reused() {
    let t = TestEngine::new();
    let acme = tenant("acme");

    {
        let mut tx = t.store.begin().await.unwrap();
        let number = t
            .engine
            .invoice_numbers
            .allocate_in(tx.as_mut(), &acme)
            .await
            .unwrap();
        assert_eq!(number.counter, 1);
        // dropped without commit
    }

    let committed = t.engine.invoice_numbers.allocate(&acme).await.unwrap();
    assert_eq!(committed.counter, 1);
}

#[tokio::test]
async fn test_failed_enrollment_does_not_consume_a_number() {
    let t = TestEngine::new();
    let acme = tenant("acme");

    let result = t
        .engine
        .schedules
        .create_enrollment_schedule(&acme, create_cmd(dec!(0), deposit_plan()))
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let view = t
        .engine
        .schedules
        .create_enrollment_schedule(&acme, create_cmd(dec!(100), deposit_plan()))
        .await
        .unwrap();
    assert_eq!(view.enrollment.invoice_number, "INV-2025-000001");
}

#[tokio::test]
async fn test_tenant_format_overrides() {
    let acme = tenant("acme");
    let globex = tenant("globex");
    let tenants = StaticTenantConfig::new("INV")
        .with_tenant(
            acme.clone(),
            TenantOverrides {
                invoice_prefix: Some("ACME".to_string()),
                counter_width: Some(4),
                ..TenantOverrides::default()
            },
        )
        .with_tenant(
            globex.clone(),
            TenantOverrides {
                include_year: Some(false),
                ..TenantOverrides::default()
            },
        );
    let t = TestEngine::with_tenants(BillingSettings::default(), tenants);

    let acme_number = t.engine.invoice_numbers.allocate(&acme).await.unwrap();
    let globex_number = t.engine.invoice_numbers.allocate(&globex).await.unwrap();
    let default_number = t
        .engine
        .invoice_numbers
        .allocate(&tenant("initech"))
        .await
        .unwrap();

    assert_eq!(acme_number.value, "ACME-2025-0001");
    assert_eq!(globex_number.value, "INV-000001");
    assert_eq!(default_number.value, "INV-2025-000001");
}

#[tokio::test]
async fn test_year_follows_the_clock() {
    let t = TestEngine::new();
    let acme = tenant("acme");

    t.engine.invoice_numbers.allocate(&acme).await.unwrap();
    t.clock.set(at(2026, 1, 2));
    let number = t.engine.invoice_numbers.allocate(&acme).await.unwrap();

    assert_eq!(number.value, "INV-2026-000002");
}
