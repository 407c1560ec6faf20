//! Re-bucketing of a base series to a coarser width.

use std::collections::BTreeMap;

use super::{bucket_start, Timeframe};
use crate::domain::market::Bar;

/// Resample `bars` to `timeframe`.
///
/// Output is ascending by bucket start. Pure and deterministic.
#[must_use]
pub fn resample(bars: &[Bar], timeframe: Timeframe) -> Vec<Bar> {
    resample_width(bars, timeframe.as_secs())
}

/// Resample `bars` into buckets of `width` seconds.
///
/// Bars are grouped by `floor(time / width) × width`, ordered by time within
/// the bucket (stable for ties), and reduced: open of the first, close of
/// the last, extreme high and low, summed volume. A non-positive width
/// returns the input unchanged.
#[must_use]
pub fn resample_width(bars: &[Bar], width: i64) -> Vec<Bar> {
    if width <= 0 {
        return bars.to_vec();
    }

    let mut buckets: BTreeMap<i64, Vec<&Bar>> = BTreeMap::new();
    for bar in bars {
        buckets
            .entry(bucket_start(bar.time, width))
            .or_default()
            .push(bar);
    }

    buckets
        .into_iter()
        .filter_map(|(start, mut members)| {
            members.sort_by_key(|bar| bar.time);
            reduce(start, &members)
        })
        .collect()
}

fn reduce(start: i64, members: &[&Bar]) -> Option<Bar> {
    let first = members.first()?;
    let last = members.last()?;
    let mut bar = Bar {
        symbol: first.symbol.clone(),
        time: start,
        open: first.open,
        high: first.high,
        low: first.low,
        close: last.close,
        volume: first.volume,
    };
    for member in &members[1..] {
        bar.high = bar.high.max(member.high);
        bar.low = bar.low.min(member.low);
        bar.volume += member.volume;
    }
    Some(bar)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::test_support::{d, ohlc_bar};

    #[test]
    fn sixty_one_second_bars_make_one_minute() {
        let bars: Vec<Bar> = (0..60)
            .map(|t| ohlc_bar("BTC", t, ["100", "105", "95", "100", "10"]))
            .collect();

        let out = resample(&bars, Timeframe::M1);

        assert_eq!(out, vec![ohlc_bar("BTC", 0, ["100", "105", "95", "100", "600"])]);
    }

    #[test]
    fn reduces_open_close_high_low_volume() {
        let bars = vec![
            ohlc_bar("X", 0, ["10", "12", "9", "11", "1"]),
            ohlc_bar("X", 20, ["11", "15", "10", "14", "2"]),
            ohlc_bar("X", 40, ["14", "14", "7", "8", "3"]),
            ohlc_bar("X", 60, ["8", "9", "8", "9", "4"]),
        ];

        let out = resample(&bars, Timeframe::M1);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0], ohlc_bar("X", 0, ["10", "15", "7", "8", "6"]));
        assert_eq!(out[1], ohlc_bar("X", 60, ["8", "9", "8", "9", "4"]));
    }

    #[test]
    fn unsorted_input_is_ordered_within_bucket() {
        let bars = vec![
            ohlc_bar("X", 30, ["2", "2", "2", "2", "1"]),
            ohlc_bar("X", 0, ["1", "1", "1", "1", "1"]),
        ];

        let out = resample(&bars, Timeframe::M1);

        assert_eq!(out[0].open, d("1"));
        assert_eq!(out[0].close, d("2"));
    }

    #[test]
    fn negative_times_floor() {
        let bars = vec![
            ohlc_bar("X", -30, ["1", "1", "1", "1", "1"]),
            ohlc_bar("X", 10, ["2", "2", "2", "2", "1"]),
        ];

        let out = resample(&bars, Timeframe::M1);

        assert_eq!(out.iter().map(|b| b.time).collect::<Vec<_>>(), vec![-60, 0]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(resample(&[], Timeframe::H1).is_empty());
    }

    #[test_case(Timeframe::M5, 12 ; "five minutes")]
    #[test_case(Timeframe::M15, 4 ; "fifteen minutes")]
    #[test_case(Timeframe::H1, 1 ; "one hour")]
    fn hour_of_minute_bars(timeframe: Timeframe, expected: usize) {
        let bars: Vec<Bar> = (0..60)
            .map(|i| ohlc_bar("X", i * 60, ["1", "1", "1", "1", "1"]))
            .collect();
        assert_eq!(resample(&bars, timeframe).len(), expected);
    }

    #[test]
    fn resampling_is_deterministic() {
        let bars: Vec<Bar> = (0..500)
            .map(|i| ohlc_bar("X", i * 7, ["1", "3", "0.5", "2", "1"]))
            .collect();
        assert_eq!(resample(&bars, Timeframe::M5), resample(&bars, Timeframe::M5));
    }
}
