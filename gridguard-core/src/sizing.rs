//! Drawdown-adaptive position sizing.
//!
//! # Formula
//! ```text
//! dd <= 0                      -> 1.0 (or recovery boost, once, after an episode)
//! 0 < dd < reduction_start     -> 1.0
//! reduction_start..reduction_full -> linear from 1.0 down to min_multiplier
//! dd >= reduction_full         -> min_multiplier
//! ```
//!
//! The output lot is `base_lot × multiplier`, quantized to the instrument
//! lot step and clamped to broker bounds — quantization happens last,
//! after the multiplier, never before.

use crate::config::SizingConfig;
use crate::domain::instrument::Instrument;

#[derive(Debug, Clone)]
pub struct AdaptiveSizingEngine {
    reduction_start: f64,
    reduction_full: f64,
    min_multiplier: f64,
    recovery_boost: f64,
    in_recovery: bool,
}

impl AdaptiveSizingEngine {
    pub fn new(cfg: &SizingConfig) -> Self {
        Self {
            reduction_start: cfg.reduction_start_pct,
            reduction_full: cfg.reduction_full_pct,
            min_multiplier: cfg.min_multiplier,
            recovery_boost: cfg.recovery_boost,
            in_recovery: false,
        }
    }

    /// Whether a reduction episode is still flagged as in recovery.
    pub fn in_recovery(&self) -> bool {
        self.in_recovery
    }

    /// Size multiplier for the current drawdown. Stateful: entering the
    /// reduction band arms the recovery flag; the boost pays out on the
    /// first call after drawdown returns to zero, then the flag clears.
    pub fn multiplier(&mut self, dd: f64) -> f64 {
        if dd >= self.reduction_start {
            self.in_recovery = true;
            if dd >= self.reduction_full {
                return self.min_multiplier;
            }
            let progress = (dd - self.reduction_start) / (self.reduction_full - self.reduction_start);
            return 1.0 - progress * (1.0 - self.min_multiplier);
        }

        if dd <= 0.0 && self.in_recovery {
            self.in_recovery = false;
            return self.recovery_boost;
        }
        if dd > 0.0 {
            self.in_recovery = false;
        }
        1.0
    }

    /// Final lot for a new entry: multiplier applied to the base lot,
    /// then quantized and clamped by the instrument.
    pub fn lot(&mut self, base_lot: f64, dd: f64, instrument: &Instrument) -> f64 {
        let raw = base_lot * self.multiplier(dd);
        instrument.quantize_lot(raw)
    }
}
