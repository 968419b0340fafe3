//! Tick sources and the bar/ATR plumbing built on top of them.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use gridguard_core::domain::snapshot::Bar;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// One quote update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub time: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
}

pub trait TickFeed {
    fn next_tick(&mut self) -> Option<Tick>;
}

/// Seeded random-walk price path. Deterministic per seed.
pub struct RandomWalkFeed {
    rng: StdRng,
    price: f64,
    spread: f64,
    step: f64,
    time: DateTime<Utc>,
    interval: Duration,
    remaining: usize,
}

impl RandomWalkFeed {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seed: u64,
        start_price: f64,
        spread_points: f64,
        step_points: f64,
        point: f64,
        start_time: DateTime<Utc>,
        interval_secs: i64,
        count: usize,
    ) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            price: start_price,
            spread: spread_points * point,
            step: step_points * point,
            time: start_time,
            interval: Duration::seconds(interval_secs),
            remaining: count,
        }
    }
}

impl TickFeed for RandomWalkFeed {
    fn next_tick(&mut self) -> Option<Tick> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let shock: f64 = self.rng.gen_range(-1.0..=1.0);
        self.price = (self.price + shock * self.step).max(self.step);
        let tick = Tick { time: self.time, bid: self.price, ask: self.price + self.spread };
        self.time += self.interval;
        Some(tick)
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("csv read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: {detail}")]
    BadRow { row: usize, detail: String },
}

/// Replay feed over a CSV of `time,bid,ask` rows (RFC 3339 timestamps).
pub struct CsvFeed {
    ticks: std::vec::IntoIter<Tick>,
}

impl CsvFeed {
    pub fn from_path(path: &Path) -> Result<Self, FeedError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut ticks = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let parse = |i: usize| -> Result<&str, FeedError> {
                record.get(i).ok_or(FeedError::BadRow {
                    row,
                    detail: format!("missing column {i}"),
                })
            };
            let time = parse(0)?
                .parse::<DateTime<Utc>>()
                .map_err(|e| FeedError::BadRow { row, detail: e.to_string() })?;
            let bid = parse(1)?
                .parse::<f64>()
                .map_err(|e| FeedError::BadRow { row, detail: e.to_string() })?;
            let ask = parse(2)?
                .parse::<f64>()
                .map_err(|e| FeedError::BadRow { row, detail: e.to_string() })?;
            ticks.push(Tick { time, bid, ask });
        }
        Ok(Self { ticks: ticks.into_iter() })
    }
}

impl TickFeed for CsvFeed {
    fn next_tick(&mut self) -> Option<Tick> {
        self.ticks.next()
    }
}

/// Folds ticks into fixed-period bars (mid price).
pub struct BarAggregator {
    period_secs: i64,
    bucket: Option<i64>,
    current: Option<Bar>,
    last_completed: Option<Bar>,
}

impl BarAggregator {
    pub fn new(period_secs: i64) -> Self {
        assert!(period_secs > 0);
        Self { period_secs, bucket: None, current: None, last_completed: None }
    }

    /// Push a tick; returns the bar that just completed, if any.
    pub fn push(&mut self, tick: &Tick) -> Option<Bar> {
        let mid = (tick.bid + tick.ask) / 2.0;
        let bucket = tick.time.timestamp().div_euclid(self.period_secs);

        let mut completed = None;
        match (self.bucket, &mut self.current) {
            (Some(prev), Some(bar)) if prev == bucket => {
                bar.high = bar.high.max(mid);
                bar.low = bar.low.min(mid);
                bar.close = mid;
            }
            (Some(_), current) => {
                completed = current.take();
                self.last_completed = completed;
                *current = Some(Bar { open: mid, high: mid, low: mid, close: mid });
                self.bucket = Some(bucket);
            }
            (None, current) => {
                *current = Some(Bar { open: mid, high: mid, low: mid, close: mid });
                self.bucket = Some(bucket);
            }
        }
        completed
    }

    /// Most recently completed bar.
    pub fn prior_bar(&self) -> Option<Bar> {
        self.last_completed
    }
}

/// Average true range over completed bars (simple moving average of the
/// true range).
pub struct AtrIndicator {
    period: usize,
    true_ranges: Vec<f64>,
    prev_close: Option<f64>,
}

impl AtrIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period > 0);
        Self { period, true_ranges: Vec::new(), prev_close: None }
    }

    fn true_range(bar: &Bar, prev_close: Option<f64>) -> f64 {
        let high_low = bar.high - bar.low;
        match prev_close {
            Some(pc) => {
                let high_prev = (bar.high - pc).abs();
                let low_prev = (bar.low - pc).abs();
                high_low.max(high_prev).max(low_prev)
            }
            None => high_low,
        }
    }

    pub fn on_bar(&mut self, bar: &Bar) {
        let tr = Self::true_range(bar, self.prev_close);
        self.prev_close = Some(bar.close);
        self.true_ranges.push(tr);
        if self.true_ranges.len() > self.period {
            self.true_ranges.remove(0);
        }
    }

    /// ATR in price units. `None` until enough bars have completed.
    pub fn value(&self) -> Option<f64> {
        if self.true_ranges.len() < self.period {
            return None;
        }
        Some(self.true_ranges.iter().sum::<f64>() / self.period as f64)
    }

    /// ATR in points, the unit the spacing engine consumes.
    pub fn value_points(&self, point: f64) -> Option<f64> {
        self.value().map(|atr| atr / point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn random_walk_is_deterministic_per_seed() {
        let mk = || RandomWalkFeed::new(7, 1.1, 2.0, 10.0, 0.00001, t(0), 1, 50);
        let a: Vec<Tick> = std::iter::from_fn({
            let mut f = mk();
            move || f.next_tick()
        })
        .collect();
        let b: Vec<Tick> = std::iter::from_fn({
            let mut f = mk();
            move || f.next_tick()
        })
        .collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert!(a.iter().all(|tick| tick.ask > tick.bid));
    }

    #[test]
    fn aggregator_completes_bars_on_period_rollover() {
        let mut agg = BarAggregator::new(60);
        assert!(agg.push(&Tick { time: t(0), bid: 1.0, ask: 1.0 }).is_none());
        assert!(agg.push(&Tick { time: t(30), bid: 1.2, ask: 1.2 }).is_none());
        let bar = agg.push(&Tick { time: t(60), bid: 1.1, ask: 1.1 }).unwrap();
        assert_eq!(bar.open, 1.0);
        assert_eq!(bar.high, 1.2);
        assert_eq!(bar.close, 1.2);
        assert_eq!(agg.prior_bar(), Some(bar));
    }

    #[test]
    fn atr_warms_up_then_averages_true_ranges() {
        let mut atr = AtrIndicator::new(2);
        assert_eq!(atr.value(), None);
        atr.on_bar(&Bar { open: 1.0, high: 1.2, low: 0.9, close: 1.1 }); // TR 0.3
        assert_eq!(atr.value(), None);
        atr.on_bar(&Bar { open: 1.1, high: 1.3, low: 1.0, close: 1.2 }); // TR 0.3
        assert!((atr.value().unwrap() - 0.3).abs() < 1e-12);
        // In points with a 0.00001 point: 30_000.
        assert!((atr.value_points(0.00001).unwrap() - 30_000.0).abs() < 1e-6);
    }

    #[test]
    fn csv_feed_round_trips_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticks.csv");
        std::fs::write(
            &path,
            "time,bid,ask\n2024-03-04T12:00:00Z,1.1000,1.1002\n2024-03-04T12:00:01Z,1.1001,1.1003\n",
        )
        .unwrap();

        let mut feed = CsvFeed::from_path(&path).unwrap();
        let first = feed.next_tick().unwrap();
        assert_eq!(first.bid, 1.1000);
        let second = feed.next_tick().unwrap();
        assert_eq!(second.ask, 1.1003);
        assert!(feed.next_tick().is_none());
    }
}
