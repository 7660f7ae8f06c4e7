//! Integration tests for reservation admission and settlement.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use accelhub_core::error::{AppError, ErrorKind};
use accelhub_core::result::AppResult;
use accelhub_core::types::ReservationId;
use accelhub_entity::quota::{Reservation, ReservationStatus, ResourceUsage};
use accelhub_quota::admission::{RefreshPolicy, ReservePlan, Settlement};
use accelhub_quota::store::MemoryQuotaStore;
use accelhub_quota::{OverQuota, QuotaError, QuotaStore, ReserveRequest};

use helpers::TestEngine;

#[tokio::test]
async fn test_fpga_limit_scenario() {
    let app = TestEngine::new(&[("fpga", 2)]);

    let first = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 2))
        .await
        .expect("first reservation fits the limit");
    let usage = app.usage("p1", "fpga").await;
    assert_eq!((usage.in_use, usage.reserved), (0, 2));

    let err = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1))
        .await
        .unwrap_err();
    match err {
        QuotaError::OverQuota { project_id, overs } => {
            assert_eq!(project_id, "p1");
            assert_eq!(
                overs,
                vec![OverQuota {
                    resource: "fpga".into(),
                    requested: 1,
                    limit: 2,
                    projected: 3,
                }]
            );
        }
        other => panic!("expected OverQuota, got {other:?}"),
    }

    assert_eq!(app.engine.commit(first.ids()).await.unwrap(), 1);
    let usage = app.usage("p1", "fpga").await;
    assert_eq!((usage.in_use, usage.reserved), (2, 0));

    let err = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::OverQuota { ref overs, .. } if overs[0].projected == 3));
}

#[tokio::test]
async fn test_reaching_limit_exactly_is_admitted() {
    let app = TestEngine::new(&[("fpga", 3)]);

    app.engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1))
        .await
        .unwrap();
    app.engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 2))
        .await
        .expect("projected total equal to the limit is allowed");

    assert_eq!(app.usage("p1", "fpga").await.reserved, 3);
}

#[tokio::test]
async fn test_release_admitted_regardless_of_limit() {
    let app = TestEngine::new(&[("fpga", 2)]);
    app.inventory.set_count("p1", "fpga", 2);
    app.limiter.set_project_limit("p1", "fpga", 1).await.unwrap();

    let release = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", -1))
        .await
        .expect("releases are never refused");

    // Releases are not held.
    let usage = app.usage("p1", "fpga").await;
    assert_eq!((usage.in_use, usage.reserved), (2, 0));

    app.engine.commit(release.ids()).await.unwrap();
    let usage = app.usage("p1", "fpga").await;
    assert_eq!((usage.in_use, usage.reserved), (1, 0));
}

#[tokio::test]
async fn test_rolled_back_release_leaves_usage() {
    let app = TestEngine::new(&[("fpga", 2)]);
    app.inventory.set_count("p1", "fpga", 1);

    let release = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", -1))
        .await
        .unwrap();
    app.engine.rollback(release.ids()).await.unwrap();

    let usage = app.usage("p1", "fpga").await;
    assert_eq!((usage.in_use, usage.reserved), (1, 0));
}

#[tokio::test]
async fn test_commit_then_rollback_is_noop() {
    let app = TestEngine::new(&[("fpga", 4)]);

    let handle = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 2))
        .await
        .unwrap();

    assert_eq!(app.engine.commit(handle.ids()).await.unwrap(), 1);
    assert_eq!(app.engine.rollback(handle.ids()).await.unwrap(), 0);
    assert_eq!(app.engine.commit(handle.ids()).await.unwrap(), 0);

    let usage = app.usage("p1", "fpga").await;
    assert_eq!((usage.in_use, usage.reserved), (2, 0));

    let reservation = app.engine.reservation(handle.ids()[0]).await.unwrap().unwrap();
    assert_eq!(reservation.status, ReservationStatus::Committed);
}

#[tokio::test]
async fn test_rollback_then_commit_is_noop() {
    let app = TestEngine::new(&[("fpga", 4)]);

    let handle = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 2))
        .await
        .unwrap();

    assert_eq!(app.engine.rollback(handle.ids()).await.unwrap(), 1);
    assert_eq!(app.engine.commit(handle.ids()).await.unwrap(), 0);

    let usage = app.usage("p1", "fpga").await;
    assert_eq!((usage.in_use, usage.reserved), (0, 0));

    let reservation = app.engine.reservation(handle.ids()[0]).await.unwrap().unwrap();
    assert_eq!(reservation.status, ReservationStatus::RolledBack);
}

#[tokio::test]
async fn test_commit_and_rollback_restore_accounting() {
    let app = TestEngine::new(&[("fpga", 10)]);

    let seed = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 3))
        .await
        .unwrap();
    app.engine.commit(seed.ids()).await.unwrap();
    let open = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1))
        .await
        .unwrap();
    let before = app.usage("p1", "fpga").await;

    let rolled = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 2))
        .await
        .unwrap();
    app.engine.rollback(rolled.ids()).await.unwrap();
    let after = app.usage("p1", "fpga").await;
    assert_eq!((after.in_use, after.reserved), (before.in_use, before.reserved));

    let committed = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 2))
        .await
        .unwrap();
    app.engine.commit(committed.ids()).await.unwrap();
    let after = app.usage("p1", "fpga").await;
    assert_eq!(after.in_use, before.in_use + 2);
    assert_eq!(after.reserved, before.reserved);

    app.engine.rollback(open.ids()).await.unwrap();
}

#[tokio::test]
async fn test_multi_resource_reservation_is_all_or_nothing() {
    let app = TestEngine::new(&[("accelerators", 10), ("fpga", 4), ("gpu", 1)]);

    let err = app
        .engine
        .reserve(
            ReserveRequest::new("p1")
                .delta("accelerators", 2)
                .delta("fpga", 5)
                .delta("gpu", 2),
        )
        .await
        .unwrap_err();

    match err {
        QuotaError::OverQuota { overs, .. } => {
            let resources: Vec<&str> = overs.iter().map(|o| o.resource.as_str()).collect();
            assert_eq!(resources, vec!["fpga", "gpu"]);
        }
        other => panic!("expected OverQuota, got {other:?}"),
    }

    let usage = app.engine.project_usage("p1").await.unwrap();
    assert!(usage.iter().all(|row| row.reserved == 0 && row.in_use == 0));

    let handle = app
        .engine
        .reserve(
            ReserveRequest::new("p1")
                .delta("accelerators", 2)
                .delta("fpga", 2)
                .delta("gpu", 1),
        )
        .await
        .unwrap();
    assert_eq!(handle.ids().len(), 3);
    assert_eq!(app.usage("p1", "accelerators").await.reserved, 2);
    assert_eq!(app.usage("p1", "gpu").await.reserved, 1);
}

#[tokio::test]
async fn test_allow_over_quota_admits_and_is_counted() {
    let app = TestEngine::new(&[("fpga", 1)]);

    app.engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 3).allow_over_quota())
        .await
        .expect("administrative reservations skip the limit check");
    assert_eq!(app.usage("p1", "fpga").await.reserved, 3);

    let err = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::OverQuota { ref overs, .. } if overs[0].projected == 5));
}

#[tokio::test]
async fn test_project_override_and_unlimited() {
    let app = TestEngine::new(&[("fpga", 2)]);
    app.limiter.set_project_limit("p1", "fpga", 5).await.unwrap();
    app.limiter.set_project_limit("p3", "fpga", -1).await.unwrap();

    app.engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 5))
        .await
        .expect("override raises the limit");
    app.engine
        .reserve(ReserveRequest::new("p3").delta("fpga", 1_000))
        .await
        .expect("unlimited override");

    let err = app
        .engine
        .reserve(ReserveRequest::new("p2").delta("fpga", 3))
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::OverQuota { .. }));

    assert!(app.limiter.remove_project_limit("p1", "fpga").await.unwrap());
    let err = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::OverQuota { ref overs, .. } if overs[0].limit == 2));
}

#[tokio::test]
async fn test_huge_delta_refused_without_wrapping() {
    let app = TestEngine::new(&[("fpga", 2)]);

    app.engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1))
        .await
        .unwrap();

    let err = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", i64::MAX))
        .await
        .unwrap_err();
    match err {
        QuotaError::OverQuota { overs, .. } => {
            assert_eq!(overs.len(), 1);
            assert_eq!(overs[0].requested, i64::MAX);
            assert_eq!(overs[0].projected, i64::MAX);
        }
        other => panic!("expected OverQuota, got {other:?}"),
    }

    let usage = app.usage("p1", "fpga").await;
    assert_eq!((usage.in_use, usage.reserved), (0, 1));
}

#[tokio::test]
async fn test_overflowing_hold_on_unlimited_resource_rejected() {
    let app = TestEngine::new(&[("fpga", 2)]);
    app.limiter.set_project_limit("p1", "fpga", -1).await.unwrap();

    app.engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1))
        .await
        .unwrap();
    let err = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", i64::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::InvalidRequest(_)));
    assert_eq!(app.usage("p1", "fpga").await.reserved, 1);
}

#[tokio::test]
async fn test_accumulated_delta_overflow_rejected_before_storage() {
    let app = TestEngine::new(&[("fpga", 2)]);

    let err = app
        .engine
        .reserve(
            ReserveRequest::new("p1")
                .delta("fpga", i64::MAX)
                .delta("fpga", 1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::InvalidRequest(_)));
    assert_eq!(app.inventory.calls(), 0);
}

#[tokio::test]
async fn test_unknown_resource_rejected_before_storage() {
    let app = TestEngine::new(&[("fpga", 2)]);

    let err = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1).delta("asic", 1))
        .await
        .unwrap_err();

    assert!(matches!(err, QuotaError::UnknownResource { ref resource } if resource == "asic"));
    assert_eq!(app.inventory.calls(), 0);
    assert!(app.engine.project_usage("p1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_requests_rejected() {
    let app = TestEngine::new(&[("fpga", 2)]);

    let err = app.engine.reserve(ReserveRequest::new("p1")).await.unwrap_err();
    assert!(matches!(err, QuotaError::InvalidRequest(_)));

    let err = app
        .engine
        .reserve(ReserveRequest::new(" ").delta("fpga", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::InvalidRequest(_)));

    let err = app
        .engine
        .reserve(
            ReserveRequest::new("p1")
                .delta("fpga", 1)
                .expire_in(chrono::Duration::zero()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::InvalidRequest(_)));

    let err = app
        .engine
        .reserve(
            ReserveRequest::new("p1")
                .delta("fpga", 1)
                .expire_in(chrono::Duration::days(1_000_000_000)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::InvalidRequest(_)));
    assert!(app.engine.project_usage("p1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_settling_unknown_reservation_changes_nothing() {
    let app = TestEngine::new(&[("fpga", 2)]);
    let handle = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1))
        .await
        .unwrap();
    let unknown = ReservationId::new();

    let err = app
        .engine
        .commit(&[handle.ids()[0], unknown])
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::UnknownReservation { ref ids } if ids == &vec![unknown]));

    let app_err = AppError::from(err);
    assert_eq!(app_err.kind, ErrorKind::NotFound);

    let reservation = app.engine.reservation(handle.ids()[0]).await.unwrap().unwrap();
    assert_eq!(reservation.status, ReservationStatus::Pending);
    assert_eq!(app.usage("p1", "fpga").await.reserved, 1);
}

#[tokio::test]
async fn test_run_reserved_commits_on_success() {
    let app = TestEngine::new(&[("fpga", 2)]);

    let value = app
        .engine
        .run_reserved(ReserveRequest::new("p1").delta("fpga", 1), || async {
            Ok::<_, AppError>("created")
        })
        .await
        .unwrap();

    assert_eq!(value, "created");
    let usage = app.usage("p1", "fpga").await;
    assert_eq!((usage.in_use, usage.reserved), (1, 0));
}

#[tokio::test]
async fn test_run_reserved_rolls_back_on_failure() {
    let app = TestEngine::new(&[("fpga", 2)]);

    let err = app
        .engine
        .run_reserved(ReserveRequest::new("p1").delta("fpga", 2), || async {
            Err::<(), _>(AppError::internal("device discovery failed"))
        })
        .await
        .unwrap_err();

    assert_eq!(err.message, "device discovery failed");
    let usage = app.usage("p1", "fpga").await;
    assert_eq!((usage.in_use, usage.reserved), (0, 0));
}

#[tokio::test]
async fn test_run_reserved_refusal_skips_operation() {
    let app = TestEngine::new(&[("fpga", 1)]);
    let ran = AtomicU32::new(0);

    let err = app
        .engine
        .run_reserved(ReserveRequest::new("p1").delta("fpga", 2), || async {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(())
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

/// Store whose admissions fail with a storage error a fixed number of times
#[derive(Debug)]
struct FlakyStore {
    inner: MemoryQuotaStore,
    failures: AtomicU32,
    attempts: Arc<AtomicU32>,
    transient: bool,
}

#[async_trait]
impl QuotaStore for FlakyStore {
    async fn reserve(&self, plan: &ReservePlan) -> Result<Vec<Reservation>, QuotaError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            let err = if self.transient {
                AppError::service_unavailable("could not serialize access")
            } else {
                AppError::database("relation does not exist")
            };
            return Err(QuotaError::Storage(err));
        }
        self.inner.reserve(plan).await
    }

    async fn settle(
        &self,
        ids: &[ReservationId],
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, QuotaError> {
        self.inner.settle(ids, settlement, now).await
    }

    async fn refresh(
        &self,
        project_id: &str,
        resource: &str,
        policy: &RefreshPolicy,
        now: DateTime<Utc>,
    ) -> Result<ResourceUsage, QuotaError> {
        self.inner.refresh(project_id, resource, policy, now).await
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<ReservationId>> {
        self.inner.find_expired(now, limit).await
    }

    async fn usage(&self, project_id: &str) -> AppResult<Vec<ResourceUsage>> {
        self.inner.usage(project_id).await
    }

    async fn reservation(&self, id: ReservationId) -> AppResult<Option<Reservation>> {
        self.inner.reservation(id).await
    }

    async fn purge_settled(&self, before: DateTime<Utc>) -> AppResult<u64> {
        self.inner.purge_settled(before).await
    }
}

fn flaky_engine(failures: u32, transient: bool) -> (TestEngine, Arc<AtomicU32>) {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let app = TestEngine::with_store(helpers::quota_config(&[("fpga", 2)]), move |inner| {
        Arc::new(FlakyStore {
            inner,
            failures: AtomicU32::new(failures),
            attempts: counter,
            transient,
        }) as Arc<dyn QuotaStore>
    });
    (app, attempts)
}

#[tokio::test]
async fn test_transient_storage_failures_are_retried() {
    let (app, attempts) = flaky_engine(2, true);

    app.engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1))
        .await
        .expect("succeeds after two retries");

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(app.usage("p1", "fpga").await.reserved, 1);
}

#[tokio::test]
async fn test_retries_give_up_after_limit() {
    let (app, attempts) = flaky_engine(10, true);

    let err = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1))
        .await
        .unwrap_err();

    assert!(err.is_transient());
    // One attempt plus `max_retries`.
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_permanent_storage_failure_not_retried() {
    let (app, attempts) = flaky_engine(1, false);

    let err = app
        .engine
        .reserve(ReserveRequest::new("p1").delta("fpga", 1))
        .await
        .unwrap_err();

    assert!(matches!(err, QuotaError::Storage(ref e) if e.kind == ErrorKind::Database));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
