//! Service facade tests: market watch view, analytics and groups

use crate::support::{ScriptedTransport, T0, instrument, open_service};
use anyhow::Result;
use common::{MarketWatchError, Ohlc, Tick};
use market_watch::{AppEntry, MarketWatchService};
use pretty_assertions::assert_eq;
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

async fn merge(service: &MarketWatchService, ticks: &[(u64, Tick)]) -> Result<()> {
    let cache = service.cache();
    let mut cache = cache.write().await;
    for (offset, tick) in ticks {
        cache.merge_at(tick, T0 + offset)?;
    }
    Ok(())
}

fn traded(token: u32, last: f64, ohlc: Ohlc) -> Tick {
    Tick::ltp(token, last)
        .with_ohlc(ohlc)
        .with_volume(10_000)
        .with_change(2.468)
}

#[rstest]
#[tokio::test]
async fn test_market_watch_rows(temp_dir: TempDir) -> Result<()> {
    let service = open_service(&temp_dir, ScriptedTransport::new([])).await;
    service
        .add_instruments("G", vec![instrument(408065, "INFY")])
        .await?;
    service.subscribe("G", "ticker1").await?;

    let ohlc = Ohlc {
        open: 100.0,
        high: 110.0,
        low: 90.0,
        close: 98.0,
    };
    merge(
        &service,
        &[(0, traded(408065, 105.0, ohlc)), (0, Tick::ltp(999, 12.0))],
    )
    .await?;

    let rows = service.market_watch().await;
    assert_eq!(rows.len(), 2);

    let unknown = &rows[0];
    assert_eq!(unknown.instrument_token, 999);
    assert_eq!(unknown.trading_symbol, None);
    assert_eq!(unknown.analytics.fluctuation, None);
    assert_eq!(unknown.analytics.spike10min, Some(0.0));

    let infy = &rows[1];
    assert_eq!(infy.trading_symbol.as_deref(), Some("INFY"));
    assert_eq!(infy.exchange.as_deref(), Some("NSE"));
    assert_eq!(infy.analytics.fluctuation, Some(20.0));
    assert_eq!(infy.analytics.price_zone, Some(75.0));
    assert_eq!(infy.analytics.change, Some(2.46));
    assert_eq!(infy.analytics.volume, Some(10.0));
    assert_eq!(infy.updated_at.as_secs(), T0);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_spike_over_ten_minute_window(temp_dir: TempDir) -> Result<()> {
    let service = open_service(&temp_dir, ScriptedTransport::new([])).await;
    merge(
        &service,
        &[
            (0, Tick::ltp(5633, 110.0)),
            (10, Tick::ltp(5633, 100.0)),
            (20, Tick::ltp(5633, 105.0)),
        ],
    )
    .await?;

    let rows = service.market_watch().await;
    assert_eq!(rows[0].analytics.spike10min, Some(9.52));
    assert_eq!(rows[0].analytics.spike3min, Some(9.52));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_flat_day_range_has_no_price_zone(temp_dir: TempDir) -> Result<()> {
    let service = open_service(&temp_dir, ScriptedTransport::new([])).await;
    let flat = Ohlc {
        open: 50.0,
        high: 50.0,
        low: 50.0,
        close: 50.0,
    };
    merge(&service, &[(0, traded(3045, 50.0, flat))]).await?;

    let analytics = service.market_watch().await[0].analytics;
    assert_eq!(analytics.price_zone, None);
    assert_eq!(analytics.fluctuation, Some(0.0));

    let json = serde_json::to_value(analytics)?;
    assert!(json["price_zone"].is_null());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_activation_is_deduplicated(temp_dir: TempDir) -> Result<()> {
    let service = open_service(&temp_dir, ScriptedTransport::new([])).await;

    service.activate("nifty50", "scanner").await?;
    service.activate("nifty50", "scanner").await?;
    let group = service.deactivate("nifty50", "scanner").await?;

    assert_eq!(
        group.apps,
        vec![AppEntry {
            app_name: "scanner".to_string(),
            active: false,
        }]
    );
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_unknown_group_operations(temp_dir: TempDir) -> Result<()> {
    let service = open_service(&temp_dir, ScriptedTransport::new([])).await;

    assert!(matches!(
        service.deactivate("ghost", "scanner").await,
        Err(MarketWatchError::NotFound { kind: "group", .. })
    ));
    assert!(matches!(
        service.group_instruments("ghost").await,
        Err(MarketWatchError::NotFound { kind: "group", .. })
    ));
    assert!(service.list_groups().await.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_groups_survive_reopen(temp_dir: TempDir) -> Result<()> {
    {
        let service = open_service(&temp_dir, ScriptedTransport::new([])).await;
        let added = service
            .add_instruments(
                "banks",
                vec![instrument(1, "HDFCBANK"), instrument(2, "ICICIBANK"), instrument(1, "HDFCBANK")],
            )
            .await?;
        assert_eq!(added, 2);
        assert!(service.remove_instrument("banks", 2).await?);
        assert!(!service.remove_instrument("banks", 2).await?);
        service.activate("banks", "dashboard").await?;
    }

    let reopened = open_service(&temp_dir, ScriptedTransport::new([])).await;
    let names: Vec<String> = reopened
        .list_groups()
        .await
        .into_iter()
        .map(|group| group.name)
        .collect();
    assert_eq!(names, vec!["banks".to_string()]);
    assert!(reopened.group("banks").await?.apps[0].active);

    let symbols: Vec<String> = reopened
        .group_instruments("banks")
        .await?
        .into_iter()
        .map(|i| i.trading_symbol)
        .collect();
    assert_eq!(symbols, vec!["HDFCBANK".to_string()]);
    Ok(())
}
