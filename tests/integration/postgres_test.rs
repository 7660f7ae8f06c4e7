//! PostgreSQL backend tests. Run with a database available:
//! `DATABASE_URL=postgres://... cargo test --test postgres_test -- --ignored`

mod helpers;

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;

use accelhub_core::config::{DatabaseConfig, QuotaBackend, QuotaConfig};
use accelhub_core::types::ReservationId;
use accelhub_database::DatabasePool;
use accelhub_database::repositories::AcceleratorRepository;
use accelhub_entity::quota::ReservationStatus;
use accelhub_quota::{
    LimitOverrides, QuotaEngine, QuotaError, QuotaLimiter, QuotaStoreDispatch, ReserveRequest,
    UsageRefresher,
};

async fn postgres_engine(limits: &[(&str, i64)]) -> Arc<QuotaEngine> {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let database: DatabaseConfig =
        serde_json::from_value(serde_json::json!({ "url": url })).expect("database config");
    let pool = DatabasePool::connect(&database)
        .await
        .expect("Failed to connect to test database");
    let pool = pool.pool().clone();

    accelhub_database::migration::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let config = QuotaConfig {
        backend: QuotaBackend::Postgres,
        ..helpers::quota_config(limits)
    };
    let refresher = UsageRefresher::new(Arc::new(AcceleratorRepository::new(pool.clone())));
    let store = QuotaStoreDispatch::new(&config, pool.clone(), refresher);
    let limiter = QuotaLimiter::new(LimitOverrides::for_backend(config.backend, pool), &config);
    Arc::new(QuotaEngine::new(Arc::new(store), Arc::new(limiter), config))
}

/// A project id no other test run has used
fn fresh_project() -> String {
    format!("test-{}", ReservationId::new())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_concurrent_reservers_never_over_admit() {
    let engine = postgres_engine(&[("fpga", 3)]).await;
    let project = fresh_project();

    let tasks = (0..20).map(|_| {
        let engine = Arc::clone(&engine);
        let project = project.clone();
        tokio::spawn(async move {
            match engine
                .reserve(ReserveRequest::new(project).delta("fpga", 1))
                .await
            {
                Ok(_) => true,
                Err(QuotaError::OverQuota { .. }) => false,
                Err(other) => panic!("unexpected reservation error: {other:?}"),
            }
        })
    });
    let admitted = join_all(tasks)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(true)))
        .count();

    assert_eq!(admitted, 3);
    let usage = engine.project_usage(&project).await.unwrap();
    assert_eq!(usage[0].reserved, 3);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_settlement_is_terminal() {
    let engine = postgres_engine(&[("fpga", 2)]).await;
    let project = fresh_project();

    let handle = engine
        .reserve(ReserveRequest::new(project.as_str()).delta("fpga", 2))
        .await
        .unwrap();
    assert_eq!(engine.commit(handle.ids()).await.unwrap(), 1);
    assert_eq!(engine.rollback(handle.ids()).await.unwrap(), 0);

    let usage = engine.project_usage(&project).await.unwrap();
    assert_eq!((usage[0].in_use, usage[0].reserved), (2, 0));

    let unknown = ReservationId::new();
    let err = engine.commit(&[unknown]).await.unwrap_err();
    assert!(matches!(err, QuotaError::UnknownReservation { .. }));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_sweep_rolls_back_expired() {
    let engine = postgres_engine(&[("fpga", 2)]).await;
    let project = fresh_project();

    let handle = engine
        .reserve(
            ReserveRequest::new(project.as_str())
                .delta("fpga", 1)
                .expire_in(Duration::minutes(1)),
        )
        .await
        .unwrap();

    let reclaimed = engine
        .sweep_expired_at(Utc::now() + Duration::minutes(5))
        .await
        .unwrap();
    assert!(reclaimed >= 1);

    let reservation = engine.reservation(handle.ids()[0]).await.unwrap().unwrap();
    assert_eq!(reservation.status, ReservationStatus::RolledBack);
    let usage = engine.project_usage(&project).await.unwrap();
    assert_eq!(usage[0].reserved, 0);
}
