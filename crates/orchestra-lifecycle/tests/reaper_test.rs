// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the reaper - deleting instances past their TTL.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::{OWNER, TestContext};
use orchestra_lifecycle::gateway::{GatewayOp, ResourceKind};
use orchestra_lifecycle::reaper::ReaperConfig;
use orchestra_store::{EventStore, InstanceStatus};

const HOUR: Duration = Duration::from_secs(3600);

async fn status_of(ctx: &TestContext, name: &str) -> InstanceStatus {
    ctx.manager.status(name).await.unwrap().status
}

#[tokio::test]
async fn test_reaps_only_expired_instances() {
    let ctx = TestContext::new().await;
    let old = ctx.manager.create("org/old", OWNER).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let fresh = ctx.manager.create("org/fresh", OWNER).await.unwrap();

    let report = ctx
        .reaper(ReaperConfig::default())
        .reap_once(Duration::from_millis(150))
        .await
        .unwrap();

    assert_eq!(report.candidates, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(status_of(&ctx, &old.name).await, InstanceStatus::Deleted);
    assert_eq!(status_of(&ctx, &fresh.name).await, InstanceStatus::Created);
    assert!(!ctx.gateway.contains(ResourceKind::Workload, &old.name).await);
    assert!(ctx.gateway.contains(ResourceKind::Workload, &fresh.name).await);
}

#[tokio::test]
async fn test_failing_candidate_does_not_stop_the_batch() {
    let ctx = TestContext::new().await;
    let mut names = Vec::new();
    for _ in 0..5 {
        names.push(ctx.manager.create("org/repo", OWNER).await.unwrap().name);
    }
    let broken = names[2].clone();
    ctx.gateway
        .fail_on_name(GatewayOp::Delete(ResourceKind::Route), &broken)
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let report = ctx
        .reaper(ReaperConfig::default())
        .reap_once(Duration::from_millis(1))
        .await
        .unwrap();

    assert_eq!(report.candidates, 5);
    assert_eq!(report.deleted, 4);
    assert_eq!(report.failed, 1);
    for name in &names {
        let expected = if *name == broken {
            InstanceStatus::Created
        } else {
            InstanceStatus::Deleted
        };
        assert_eq!(status_of(&ctx, name).await, expected, "{name}");
    }
}

#[tokio::test]
async fn test_run_reap_counts_and_skips_deleted() {
    let ctx = TestContext::new().await;
    ctx.manager.create("org/a", OWNER).await.unwrap();
    ctx.manager.create("org/b", OWNER).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let reaper = ctx.reaper(ReaperConfig::default());

    assert_eq!(reaper.run_reap(Duration::from_millis(1)).await.unwrap(), 2);
    let mutations = ctx.gateway.mutation_count().await;

    assert_eq!(reaper.run_reap(Duration::ZERO).await.unwrap(), 0);
    assert_eq!(ctx.gateway.mutation_count().await, mutations);
}

#[tokio::test]
async fn test_default_ttl_keeps_new_instances() {
    let ctx = TestContext::new().await;
    ctx.manager.create("org/repo", OWNER).await.unwrap();

    let reaper = ctx.reaper(ReaperConfig::default());
    let report = reaper.reap_once(reaper.config().ttl).await.unwrap();

    assert_eq!(report.candidates, 0);
}

#[tokio::test]
async fn test_orphan_sweep_removes_unrecorded_workloads() {
    let ctx = TestContext::new().await;
    let now = Utc::now();
    ctx.gateway
        .seed_workload("ghost-abcdefgh", "org/ghost", now - chrono::Duration::hours(9))
        .await;
    ctx.gateway
        .seed_workload("young-abcdefgh", "org/young", now - chrono::Duration::minutes(5))
        .await;
    let live = ctx.manager.create("org/live", OWNER).await.unwrap();

    let reaper = ctx.reaper(ReaperConfig::default());
    let removed = reaper.sweep_orphans(8 * HOUR, now).await.unwrap();

    assert_eq!(removed, 1);
    assert!(!ctx.gateway.contains(ResourceKind::Workload, "ghost-abcdefgh").await);
    assert!(ctx.gateway.contains(ResourceKind::Workload, "young-abcdefgh").await);
    assert!(ctx.gateway.contains(ResourceKind::Workload, &live.name).await);
}

#[tokio::test]
async fn test_orphan_sweep_skips_live_instances() {
    let ctx = TestContext::new().await;
    let live = ctx.manager.create("org/live", OWNER).await.unwrap();

    let reaper = ctx.reaper(ReaperConfig::default());
    let later = Utc::now() + chrono::Duration::hours(9);
    let removed = reaper.sweep_orphans(8 * HOUR, later).await.unwrap();

    assert_eq!(removed, 0);
    assert!(ctx.gateway.contains(ResourceKind::Workload, &live.name).await);
    let record = ctx.store.get_instance_by_name(&live.name).await.unwrap().unwrap();
    assert_eq!(
        ctx.store.latest_status(&record.id).await.unwrap(),
        InstanceStatus::Created
    );
}

#[tokio::test]
async fn test_reap_once_includes_orphans_when_enabled() {
    let ctx = TestContext::new().await;
    ctx.gateway
        .seed_workload(
            "ghost-abcdefgh",
            "org/ghost",
            Utc::now() - chrono::Duration::hours(1),
        )
        .await;

    let config = ReaperConfig {
        sweep_orphans: true,
        ..Default::default()
    };
    let report = ctx.reaper(config).reap_once(HOUR / 2).await.unwrap();

    assert_eq!(report.candidates, 0);
    assert_eq!(report.orphans_deleted, 1);
}

#[tokio::test]
async fn test_background_loop_reaps_and_stops() {
    let ctx = TestContext::new().await;
    let provisioned = ctx.manager.create("org/repo", OWNER).await.unwrap();

    let config = ReaperConfig {
        enabled: true,
        poll_interval: Duration::from_millis(50),
        ttl: Duration::from_millis(1),
        sweep_orphans: false,
    };
    let reaper = ctx.reaper(config);
    let shutdown = reaper.shutdown_handle();
    let handle = tokio::spawn(async move { reaper.run().await });

    let mut deleted = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if status_of(&ctx, &provisioned.name).await == InstanceStatus::Deleted {
            deleted = true;
            break;
        }
    }
    assert!(deleted, "reaper loop did not delete the expired instance");

    shutdown.notify_one();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("reaper did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_disabled_reaper_returns_immediately() {
    let ctx = TestContext::new().await;
    let reaper = ctx.reaper(ReaperConfig {
        enabled: false,
        ..Default::default()
    });

    tokio::time::timeout(Duration::from_secs(1), reaper.run())
        .await
        .expect("disabled reaper should return");
}
