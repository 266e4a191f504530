//! Group to channel subscription tests

use crate::support::{ScriptedTransport, T0, instrument, open_service};
use anyhow::Result;
use common::{MarketWatchError, Tick};
use market_watch::{MarketWatchService, SubscriptionSummary};
use pretty_assertions::assert_eq;
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

/// Group `G` holding `A(token=1)` and `B(token=2)`
async fn service_with_group(dir: &TempDir) -> Result<MarketWatchService> {
    let service = open_service(dir, ScriptedTransport::new([])).await;
    service
        .add_instruments("G", vec![instrument(1, "A"), instrument(2, "B")])
        .await?;
    Ok(service)
}

#[rstest]
#[tokio::test]
async fn test_subscribe_into_empty_channel(temp_dir: TempDir) -> Result<()> {
    let service = service_with_group(&temp_dir).await?;

    let summary = service.subscribe("G", "ticker1").await?;

    assert_eq!(
        summary,
        SubscriptionSummary {
            new_instruments_counter: 2,
            existing_instrument_counter: 0,
            total_instruments: 2,
        }
    );
    assert_eq!(service.ticker_info("ticker1").await?, 2);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_subscribe_counts_existing(temp_dir: TempDir) -> Result<()> {
    let service = service_with_group(&temp_dir).await?;
    service.add_instruments("solo", vec![instrument(1, "A")]).await?;
    service.subscribe("solo", "ticker1").await?;

    let summary = service.subscribe("G", "ticker1").await?;

    assert_eq!(
        summary,
        SubscriptionSummary {
            new_instruments_counter: 1,
            existing_instrument_counter: 1,
            total_instruments: 2,
        }
    );
    assert_eq!(service.ticker_info("ticker1").await?, 2);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_subscribe_is_idempotent(temp_dir: TempDir) -> Result<()> {
    let service = service_with_group(&temp_dir).await?;

    service.subscribe("G", "ticker2").await?;
    let second = service.subscribe("G", "ticker2").await?;

    assert_eq!(second.new_instruments_counter, 0);
    assert_eq!(second.existing_instrument_counter, second.total_instruments);
    assert_eq!(service.ticker_info("ticker2").await?, 2);
    Ok(())
}

#[rstest]
#[case("missing", "ticker1", "group")]
#[case("G", "ticker9", "channel")]
#[tokio::test]
async fn test_subscribe_unknown_target(
    temp_dir: TempDir,
    #[case] group: &str,
    #[case] channel: &str,
    #[case] expected_kind: &str,
) -> Result<()> {
    let service = service_with_group(&temp_dir).await?;

    match service.subscribe(group, channel).await {
        Err(MarketWatchError::NotFound { kind, .. }) => assert_eq!(kind, expected_kind),
        other => panic!("expected NotFound, got {other:?}"),
    }
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_subscriptions_survive_restart(temp_dir: TempDir) -> Result<()> {
    {
        let service = service_with_group(&temp_dir).await?;
        service.subscribe("G", "ticker3").await?;
    }

    let reopened = open_service(&temp_dir, ScriptedTransport::new([])).await;
    assert_eq!(reopened.ticker_info("ticker3").await?, 2);
    assert_eq!(reopened.group_instruments("G").await?.len(), 2);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_flush_evicts_only_channel_instruments(temp_dir: TempDir) -> Result<()> {
    let service = service_with_group(&temp_dir).await?;
    service.subscribe("G", "ticker1").await?;
    {
        let cache = service.cache();
        let mut cache = cache.write().await;
        for token in [1, 2, 3] {
            cache.merge_at(&Tick::ltp(token, 100.0), T0)?;
        }
    }

    let ack = service.flush_channel("ticker1").await?;

    assert_eq!(ack, "ticker1 flushed");
    assert_eq!(service.ticker_info("ticker1").await?, 0);
    let tokens: Vec<u32> = service
        .market_watch()
        .await
        .iter()
        .map(|row| row.instrument_token)
        .collect();
    assert_eq!(tokens, vec![3]);
    // The group itself is untouched
    assert_eq!(service.group_instruments("G").await?.len(), 2);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_persisted_flush_survives_restart(temp_dir: TempDir) -> Result<()> {
    {
        let service = service_with_group(&temp_dir).await?;
        service.subscribe("G", "ticker1").await?;
        {
            let cache = service.cache();
            let mut cache = cache.write().await;
            for token in [1, 2, 3] {
                cache.merge_at(&Tick::ltp(token, 100.0), T0)?;
            }
        }
        service.snapshot_now().await?;
    }

    // A fresh process with an empty cache, as the flush command runs
    let flusher = open_service(&temp_dir, ScriptedTransport::new([])).await;
    assert_eq!(flusher.flush_persisted("ticker1").await?, "ticker1 flushed");

    let reopened = open_service(&temp_dir, ScriptedTransport::new([])).await;
    assert_eq!(reopened.restore_snapshot().await, 1);
    let tokens: Vec<u32> = reopened
        .market_watch()
        .await
        .iter()
        .map(|row| row.instrument_token)
        .collect();
    assert_eq!(tokens, vec![3]);
    assert_eq!(reopened.ticker_info("ticker1").await?, 0);
    Ok(())
}
