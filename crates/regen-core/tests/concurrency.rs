//! Concurrency tests for the regeneration service.
//!
//! These drive many simultaneous `regenerate` calls against the in-memory
//! store and check that elapsed ticks are applied exactly once in total.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use futures::future::join_all;
use regen_core::{
    AccrualPolicy, BalanceStore, Loaded, ManualClock, MemoryBalanceStore, RegenerationService,
    StoreError,
};
use regen_types::{Fid, UserBalance};
use tokio::sync::Barrier;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).single().unwrap()
}

fn minutes(m: i64) -> DateTime<Utc> {
    t0() + TimeDelta::minutes(m)
}

fn fid(raw: u64) -> Fid {
    Fid::new(raw).unwrap()
}

fn service(store: Arc<dyn BalanceStore>) -> RegenerationService {
    RegenerationService::new(
        store,
        Arc::new(ManualClock::new(t0())),
        AccrualPolicy::new(TimeDelta::minutes(15), 10).unwrap(),
    )
}

/// Holds the first `gate` reads at a barrier so that every caller observes
/// the same stale watermark before anyone commits.
struct StaleReadStore {
    inner: MemoryBalanceStore,
    gate: usize,
    reads: AtomicUsize,
    barrier: Barrier,
}

impl StaleReadStore {
    fn new(gate: usize) -> Self {
        Self {
            inner: MemoryBalanceStore::new(),
            gate,
            reads: AtomicUsize::new(0),
            barrier: Barrier::new(gate),
        }
    }
}

#[async_trait]
impl BalanceStore for StaleReadStore {
    async fn read_and_lock(&self, fid: Fid, now: DateTime<Utc>) -> Result<Loaded, StoreError> {
        let loaded = self.inner.read_and_lock(fid, now).await?;
        if self.reads.fetch_add(1, Ordering::SeqCst) < self.gate {
            self.barrier.wait().await;
        }
        Ok(loaded)
    }

    async fn commit(
        &self,
        fid: Fid,
        new_balance: u64,
        new_last_updated_at: DateTime<Utc>,
        expected_prior_last_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner
            .commit(
                fid,
                new_balance,
                new_last_updated_at,
                expected_prior_last_updated_at,
            )
            .await
    }

    async fn fetch(&self, fid: Fid) -> Result<Option<UserBalance>, StoreError> {
        self.inner.fetch(fid).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_stale_calls_apply_ticks_once() {
    const CALLERS: usize = 8;

    let store = Arc::new(StaleReadStore::new(CALLERS));
    store
        .inner
        .insert(UserBalance::initial(fid(1), t0()))
        .await;
    let service = service(Arc::clone(&store) as Arc<dyn BalanceStore>);

    let calls = (0..CALLERS).map(|_| {
        let service = service.clone();
        tokio::spawn(async move { service.regenerate(fid(1), minutes(50)).await })
    });
    let outcomes: Vec<_> = join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("regenerate failed"))
        .collect();

    let applied: u64 = outcomes.iter().map(|o| o.intervals_elapsed).sum();
    assert_eq!(applied, 3, "ticks must be applied exactly once in total");
    assert_eq!(
        outcomes.iter().filter(|o| o.intervals_elapsed > 0).count(),
        1
    );
    assert!(outcomes.iter().all(|o| o.balance == 30));

    let record = store.fetch(fid(1)).await.unwrap().unwrap();
    assert_eq!(record.balance, 30);
    assert_eq!(record.last_updated_at, minutes(45));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_touch_creates_one_record() {
    let store = Arc::new(MemoryBalanceStore::new());
    let service = service(Arc::clone(&store) as Arc<dyn BalanceStore>);

    let calls = (0..16).map(|i| {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .regenerate(fid(7), t0() + TimeDelta::seconds(i))
                .await
        })
    });
    for joined in join_all(calls).await {
        let outcome = joined.unwrap().unwrap();
        assert_eq!(outcome.intervals_elapsed, 0);
        assert_eq!(outcome.balance, 0);
    }
    assert_eq!(store.len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn balance_is_independent_of_call_cadence() {
    let store = Arc::new(MemoryBalanceStore::new());
    let service =
        service(Arc::clone(&store) as Arc<dyn BalanceStore>).with_max_commit_attempts(64);

    let users: Vec<Fid> = (1..=5).map(fid).collect();
    for user in &users {
        service.regenerate(*user, t0()).await.unwrap();
    }

    // Irregular, overlapping, out-of-order polls for every user.
    let offsets: [i64; 12] = [3, 17, 17, 44, 29, 61, 61, 90, 122, 119, 200, 201];
    let calls = users.iter().flat_map(|user| {
        offsets.iter().map(|m| {
            let service = service.clone();
            let user = *user;
            let at = minutes(*m);
            tokio::spawn(async move { service.regenerate(user, at).await })
        })
    });
    for joined in join_all(calls).await {
        joined.unwrap().unwrap();
    }

    let t_last = minutes(247);
    for user in &users {
        let final_outcome = service.regenerate(*user, t_last).await.unwrap();
        // floor(247 / 15) = 16 ticks at 10 per tick.
        assert_eq!(final_outcome.balance, 160);
        assert_eq!(final_outcome.last_updated_at, minutes(240));
    }
}

#[tokio::test]
async fn missed_polls_catch_up_on_next_call() {
    let store: Arc<dyn BalanceStore> = Arc::new(MemoryBalanceStore::new());
    let service = service(store);

    service.regenerate(fid(2), t0()).await.unwrap();
    let outcome = service.regenerate(fid(2), minutes(120)).await.unwrap();
    assert_eq!(outcome.intervals_elapsed, 8);
    assert_eq!(outcome.balance, 80);
    assert_eq!(outcome.next_tick_at, minutes(135));
}
