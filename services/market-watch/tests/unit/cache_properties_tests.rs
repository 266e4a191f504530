//! Tick cache merge and rolling window properties

use crate::support::T0;
use common::Tick;
use market_watch::TickCache;
use market_watch::cache::{bucket_3min, bucket_10min};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;

#[test]
fn test_same_bucket_keeps_last_write() {
    let mut cache = TickCache::new();
    for (offset, price) in [(0, 100.0), (4, 105.0), (9, 98.0)] {
        cache.merge_at(&Tick::ltp(408065, price), T0 + offset).unwrap();
    }

    let window = cache.get_window(408065).unwrap();
    assert_eq!(window.window_10min.get(bucket_10min(T0)), Some(98.0));
    assert_eq!(window.window_10min.values().count(), 1);
    // 3 s buckets split the same ticks across slots 0, 1 and 3
    assert_eq!(window.window_3min.get(0), Some(100.0));
    assert_eq!(window.window_3min.get(1), Some(105.0));
    assert_eq!(window.window_3min.get(3), Some(98.0));
}

#[test]
fn test_window_wraps_after_full_period() {
    let mut cache = TickCache::new();
    cache.merge_at(&Tick::ltp(5633, 50.0), T0 + 5).unwrap();
    cache.merge_at(&Tick::ltp(5633, 51.5), T0 + 605).unwrap();

    let window = cache.get_window(5633).unwrap();
    assert_eq!(window.window_10min.get(0), Some(51.5));
    assert_eq!(window.window_10min.values().count(), 1);
}

#[test]
fn test_partial_tick_keeps_earlier_fields() {
    let mut cache = TickCache::new();
    cache
        .merge_at(&Tick::ltp(738561, 2_500.0).with_volume(1_200), T0)
        .unwrap();
    cache.merge_at(&Tick::ltp(738561, 2_502.5), T0 + 1).unwrap();

    let quote = &cache.get(738561).unwrap().quote;
    assert_eq!(quote.last_price, 2_502.5);
    assert_eq!(quote.volume, Some(1_200));
}

proptest! {
    #[test]
    fn test_windows_hold_last_price_per_bucket(
        steps in prop::collection::vec((0u64..40, 1u32..5_000_000, 0u64..10_000_000), 1..200)
    ) {
        let mut cache = TickCache::new();
        let mut expected_10min = BTreeMap::new();
        let mut expected_3min = BTreeMap::new();
        let mut now = T0;
        let mut last_price = 0.0;
        let mut last_volume = 0;

        for (gap, paise, volume) in steps {
            now += gap;
            last_price = f64::from(paise) / 100.0;
            last_volume = volume;
            cache
                .merge_at(&Tick::ltp(256265, last_price).with_volume(volume), now)
                .unwrap();
            expected_10min.insert(bucket_10min(now), last_price);
            expected_3min.insert(bucket_3min(now), last_price);
        }

        let entry = cache.get(256265).unwrap();
        prop_assert_eq!(entry.quote.last_price, last_price);
        prop_assert_eq!(entry.quote.volume, Some(last_volume));
        prop_assert_eq!(entry.updated_at.as_secs(), now);

        for slot in 0..60 {
            prop_assert_eq!(entry.window_10min.get(slot), expected_10min.get(&slot).copied());
            prop_assert_eq!(entry.window_3min.get(slot), expected_3min.get(&slot).copied());
        }
    }

    #[test]
    fn test_buckets_stay_in_range(secs in any::<u64>()) {
        prop_assert!(bucket_10min(secs) < 60);
        prop_assert!(bucket_3min(secs) < 60);
    }
}
