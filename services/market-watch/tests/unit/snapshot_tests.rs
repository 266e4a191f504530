//! Snapshot store tests

use crate::support::{ScriptedTransport, T0, eventually, open_service, test_config};
use anyhow::Result;
use common::{Depth, DepthLevel, MarketWatchError, Ohlc, Tick};
use market_watch::{SnapshotStore, TickCache};
use pretty_assertions::assert_eq;
use rstest::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{RwLock, watch};

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn full_tick(token: u32, last: f64) -> Tick {
    Tick::ltp(token, last)
        .with_ohlc(Ohlc {
            open: 100.0,
            high: 112.0,
            low: 98.0,
            close: 101.0,
        })
        .with_volume(42_000)
        .with_change(3.96)
        .with_depth(Depth {
            buy: vec![DepthLevel {
                price: last - 0.05,
                quantity: 300,
                orders: 4,
            }],
            sell: vec![DepthLevel {
                price: last + 0.05,
                quantity: 150,
                orders: 2,
            }],
        })
}

fn populated_cache() -> Result<Arc<RwLock<TickCache>>> {
    let mut cache = TickCache::new();
    for (offset, token, price) in [(0, 408065, 105.0), (4, 408065, 106.5), (31, 738561, 2_510.0)] {
        cache.merge_at(&full_tick(token, price), T0 + offset)?;
    }
    cache.merge_at(&Tick::ltp(256265, 24_150.0).non_tradable(), T0 + 7)?;
    Ok(Arc::new(RwLock::new(cache)))
}

#[rstest]
#[tokio::test]
async fn test_snapshot_round_trip(temp_dir: TempDir) -> Result<()> {
    let cache = populated_cache()?;
    let store = SnapshotStore::new(test_config(&temp_dir).snapshot_path(), Arc::clone(&cache));

    let before = cache.read().await.to_snapshot().entries;
    assert!(store.save().await? > 0);

    cache.write().await.clear();
    assert!(cache.read().await.is_empty());

    assert_eq!(store.restore().await, before.len());
    let after = cache.read().await.to_snapshot().entries;
    assert_eq!(after, before);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_corrupt_snapshot_is_ignored(temp_dir: TempDir) -> Result<()> {
    let path = test_config(&temp_dir).snapshot_path();
    std::fs::create_dir_all(path.parent().unwrap())?;
    std::fs::write(&path, b"definitely not bincode")?;

    let service = open_service(&temp_dir, ScriptedTransport::new([])).await;

    assert_eq!(service.restore_snapshot().await, 0);
    assert!(service.market_watch().await.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_missing_snapshot_restores_nothing(temp_dir: TempDir) -> Result<()> {
    let service = open_service(&temp_dir, ScriptedTransport::new([])).await;
    assert_eq!(service.restore_snapshot().await, 0);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_clear_snapshot(temp_dir: TempDir) -> Result<()> {
    let service = open_service(&temp_dir, ScriptedTransport::new([])).await;
    service
        .cache()
        .write()
        .await
        .merge_at(&Tick::ltp(408065, 100.0), T0)?;
    service.snapshot_now().await?;
    let path = service.config().snapshot_path();
    assert!(path.exists());

    let ack = service.clear_snapshot().await?;

    assert_eq!(ack, "snapshot cleared");
    assert!(!path.exists());
    assert!(service.market_watch().await.is_empty());
    // Clearing twice is harmless
    service.clear_snapshot().await?;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_final_snapshot_on_shutdown(temp_dir: TempDir) -> Result<()> {
    let service = open_service(&temp_dir, ScriptedTransport::new([])).await;
    service
        .cache()
        .write()
        .await
        .merge_at(&Tick::ltp(408065, 100.0), T0)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = service.spawn_snapshots(shutdown_rx);
    shutdown_tx.send(true)?;
    task.await?;

    let reopened = open_service(&temp_dir, ScriptedTransport::new([])).await;
    assert_eq!(reopened.restore_snapshot().await, 1);
    assert_eq!(reopened.market_watch().await[0].quote.last_price, 100.0);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_write_failures_keep_timer_running(temp_dir: TempDir) -> Result<()> {
    // A regular file where the snapshot directory should be
    let blocker = temp_dir.path().join("snapshot");
    std::fs::write(&blocker, b"not a directory")?;
    let path = blocker.join("tick_cache.bin");

    let cache = populated_cache()?;
    let store = Arc::new(SnapshotStore::new(path.clone(), Arc::clone(&cache)));
    assert!(matches!(
        store.save().await,
        Err(MarketWatchError::Persistence(_))
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = Arc::clone(&store).spawn(Duration::from_millis(10), shutdown_rx);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());

    // Merges proceed while writes fail
    cache.write().await.merge_at(&Tick::ltp(5633, 42.0), T0)?;

    std::fs::remove_file(&blocker)?;
    eventually(|| path.exists()).await;

    shutdown_tx.send(true)?;
    task.await?;

    cache.write().await.clear();
    assert_eq!(store.restore().await, 4);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_clear_is_not_undone_by_pending_save(temp_dir: TempDir) -> Result<()> {
    let cache = populated_cache()?;
    let store = SnapshotStore::new(test_config(&temp_dir).snapshot_path(), Arc::clone(&cache));

    for round in 0..10_u64 {
        cache
            .write()
            .await
            .merge_at(&Tick::ltp(408065, 100.0 + round as f64), T0 + round)?;

        let (saved, cleared) = tokio::join!(store.save(), store.clear());
        saved?;
        assert_eq!(cleared?, "snapshot cleared");

        assert!(cache.read().await.is_empty());
        assert_eq!(store.restore().await, 0);
    }
    Ok(())
}
