//! Concurrent pledges against one summon must all land, exactly once.

mod common;

use std::sync::Arc;

use parley::domain::models::{Config, SummonTarget};
use parley::{AppContext, DomainError, PledgeLedger};
use proptest::prelude::*;
use uuid::Uuid;

async fn pledge_concurrently(ledger: Arc<PledgeLedger>, summon_id: Uuid, amounts: &[i64]) -> Vec<Uuid> {
    let mut handles = Vec::new();
    let mut backers = Vec::new();
    for &amount in amounts {
        let backer = Uuid::new_v4();
        backers.push(backer);
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move { ledger.submit(summon_id, backer, amount).await }));
    }
    for handle in handles {
        handle.await.expect("pledge task panicked").expect("pledge failed");
    }
    backers
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: the aggregate equals the sum of every accepted pledge
    ///
    /// No matter how the submissions interleave, each backer appears once
    /// and the totals match the entries.
    #[test]
    fn prop_concurrent_pledges_sum_exactly(amounts in prop::collection::vec(1i64..1_000, 1..12)) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let (summon, backers) = runtime.block_on(async {
            let ctx = common::context().await;
            let summon = ctx.pledges.create_summon(Uuid::new_v4(), SummonTarget::new("target")).await.unwrap();
            let backers = pledge_concurrently(ctx.pledges.clone(), summon.id, &amounts).await;
            (ctx.pledges.get_summon(summon.id).await.unwrap(), backers)
        });

        prop_assert_eq!(summon.total_pledged, amounts.iter().sum::<i64>());
        prop_assert_eq!(summon.backer_count, i64::try_from(amounts.len()).unwrap());
        prop_assert_eq!(summon.entries.len(), amounts.len());
        prop_assert!(summon.is_consistent());
        for backer in backers {
            prop_assert!(summon.has_backer(backer));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_duplicate_backer_lands_once() {
    let ctx = common::context().await;
    let summon_id = ctx
        .pledges
        .create_summon(Uuid::new_v4(), SummonTarget::new("duplicate race"))
        .await
        .unwrap()
        .id;
    let backer = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = ctx.pledges.clone();
        handles.push(tokio::spawn(async move { ledger.submit(summon_id, backer, 5).await }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(DomainError::AlreadyBacked { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(accepted, 1);

    let summon = ctx.pledges.get_summon(summon_id).await.unwrap();
    assert_eq!(summon.total_pledged, 5);
    assert_eq!(summon.backer_count, 1);

    let stats = ctx.pledges.backer_stats(backer).await.unwrap();
    assert_eq!(stats.pledge_count, 1);
    assert_eq!(stats.total_pledged, 5);
}

#[tokio::test]
async fn test_cancelled_caller_does_not_lose_pledge() {
    let ctx = common::context().await;
    let summon_id = ctx
        .pledges
        .create_summon(Uuid::new_v4(), SummonTarget::new("cancel"))
        .await
        .unwrap()
        .id;
    let backer = Uuid::new_v4();

    let ledger = ctx.pledges.clone();
    let caller = tokio::spawn(async move { ledger.submit(summon_id, backer, 9).await });
    tokio::task::yield_now().await;
    caller.abort();
    let _ = caller.await;

    // Either the write finished or it never began; a half-applied pledge is never visible
    let mut summon_now = ctx.pledges.get_summon(summon_id).await.unwrap();
    for _ in 0..50 {
        if summon_now.backer_count == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        summon_now = ctx.pledges.get_summon(summon_id).await.unwrap();
    }
    assert!(summon_now.is_consistent());
    assert!(summon_now.total_pledged == 0 || summon_now.total_pledged == 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pledges_across_summons_on_shared_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.database.path = dir.path().join("parley.db").display().to_string();
    config.database.max_connections = 8;
    let ctx = AppContext::new(config).await.unwrap();

    let mut summon_ids = Vec::new();
    for name in ["north", "south", "east", "west"] {
        summon_ids.push(ctx.pledges.create_summon(Uuid::new_v4(), SummonTarget::new(name)).await.unwrap().id);
    }

    let mut handles = Vec::new();
    for &summon_id in &summon_ids {
        for amount in 1..=10i64 {
            let ledger = ctx.pledges.clone();
            handles.push(tokio::spawn(async move { ledger.submit(summon_id, Uuid::new_v4(), amount).await }));
        }
    }
    for handle in handles {
        handle.await.unwrap().expect("pledge should survive store contention");
    }

    for summon_id in summon_ids {
        let summon = ctx.pledges.get_summon(summon_id).await.unwrap();
        assert_eq!(summon.total_pledged, 55);
        assert_eq!(summon.backer_count, 10);
        assert!(summon.is_consistent());
    }
    ctx.shutdown().await;
}

