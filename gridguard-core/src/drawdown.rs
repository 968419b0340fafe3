//! Drawdown tracking: normalized drawdown percentages against three
//! reference points (high-water mark, starting balance, day-start equity)
//! and a monotonic high-water mark.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::RingBuffer;
use crate::schedule::{next_daily_boundary, poll_daily};

/// Current drawdown view, refreshed once per cycle.
///
/// All `dd_*` fields are percentages in [0, 100]. `high_water_mark` is
/// non-decreasing except through [`DrawdownTracker::reset_high_water_mark`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownSnapshot {
    pub current_equity: f64,
    pub current_balance: f64,
    pub starting_balance: f64,
    pub high_water_mark: f64,
    pub daily_start_equity: f64,
    pub dd_from_balance: f64,
    pub dd_from_hwm: f64,
    pub dd_daily: f64,
    /// Signed daily performance: negative when the day is under water.
    pub daily_pl_pct: f64,
    /// Worst `dd_from_hwm` seen since the last high-water-mark reset.
    pub max_dd_reached: f64,
    pub last_update: DateTime<Utc>,
    pub next_daily_reset: DateTime<Utc>,
}

fn drawdown_pct(reference: f64, equity: f64) -> f64 {
    if reference <= 0.0 {
        return 0.0;
    }
    ((reference - equity) / reference * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone)]
pub struct DrawdownTracker {
    snap: DrawdownSnapshot,
    history: RingBuffer<f64>,
    daily_reset_hour: u32,
}

impl DrawdownTracker {
    pub fn new(
        starting_balance: f64,
        now: DateTime<Utc>,
        daily_reset_hour: u32,
        history_capacity: usize,
    ) -> Self {
        let snap = DrawdownSnapshot {
            current_equity: starting_balance,
            current_balance: starting_balance,
            starting_balance,
            high_water_mark: starting_balance,
            daily_start_equity: starting_balance,
            dd_from_balance: 0.0,
            dd_from_hwm: 0.0,
            dd_daily: 0.0,
            daily_pl_pct: 0.0,
            max_dd_reached: 0.0,
            last_update: now,
            next_daily_reset: next_daily_boundary(now, daily_reset_hour),
        };
        Self { snap, history: RingBuffer::new(history_capacity), daily_reset_hour }
    }

    pub fn snapshot(&self) -> &DrawdownSnapshot {
        &self.snap
    }

    /// Recent equity samples, oldest first.
    pub fn equity_window(&self) -> impl Iterator<Item = &f64> {
        self.history.iter()
    }

    /// Refresh with the latest telemetry. Returns `true` when a daily
    /// boundary was crossed by this update (the day-start equity was
    /// re-based before the daily figures were computed).
    pub fn update(&mut self, equity: f64, balance: f64, now: DateTime<Utc>) -> bool {
        let boundary = poll_daily(now, self.snap.next_daily_reset, self.daily_reset_hour);
        if boundary.fire {
            self.snap.daily_start_equity = equity;
        }
        self.snap.next_daily_reset = boundary.next;

        self.snap.current_equity = equity;
        self.snap.current_balance = balance;
        if equity > self.snap.high_water_mark {
            self.snap.high_water_mark = equity;
        }

        self.snap.dd_from_hwm = drawdown_pct(self.snap.high_water_mark, equity);
        self.snap.dd_from_balance = drawdown_pct(self.snap.starting_balance, equity);
        self.snap.dd_daily = drawdown_pct(self.snap.daily_start_equity, equity);
        self.snap.daily_pl_pct = if self.snap.daily_start_equity > 0.0 {
            (equity - self.snap.daily_start_equity) / self.snap.daily_start_equity * 100.0
        } else {
            0.0
        };
        if self.snap.dd_from_hwm > self.snap.max_dd_reached {
            self.snap.max_dd_reached = self.snap.dd_from_hwm;
        }
        self.snap.last_update = now;
        self.history.push(equity);
        boundary.fire
    }

    /// Administrative operation: re-base the high-water mark to current
    /// equity and clear the worst-drawdown record.
    pub fn reset_high_water_mark(&mut self, now: DateTime<Utc>) {
        self.snap.high_water_mark = self.snap.current_equity;
        self.snap.max_dd_reached = 0.0;
        self.snap.dd_from_hwm = 0.0;
        self.snap.last_update = now;
        tracing::info!(hwm = self.snap.high_water_mark, "high-water mark re-based");
    }

    /// Full administrative re-base: every reference point moves to the
    /// current equity. Used by the scheduled full reset.
    pub fn rebase(&mut self, now: DateTime<Utc>) {
        let equity = self.snap.current_equity;
        self.snap.starting_balance = equity;
        self.snap.high_water_mark = equity;
        self.snap.daily_start_equity = equity;
        self.snap.dd_from_balance = 0.0;
        self.snap.dd_from_hwm = 0.0;
        self.snap.dd_daily = 0.0;
        self.snap.daily_pl_pct = 0.0;
        self.snap.max_dd_reached = 0.0;
        self.snap.last_update = now;
        tracing::info!(equity, "drawdown references fully re-based");
    }

    /// Adopt a persisted high-water mark (restore path). Ignored when the
    /// stored value is below current equity — the mark never decreases.
    pub fn restore_high_water_mark(&mut self, stored: f64) {
        if stored > self.snap.high_water_mark {
            self.snap.high_water_mark = stored;
        }
    }
}
