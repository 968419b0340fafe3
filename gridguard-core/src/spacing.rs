//! Volatility-driven grid spacing and level placement.

use crate::config::SpacingConfig;
use crate::domain::instrument::Instrument;
use crate::domain::position::TradeDirection;
use crate::ports::{AlertEvent, AlertSink};

/// One spacing decision, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spacing {
    pub points: f64,
    /// True when dynamic mode fell back to the fixed value because the
    /// volatility reading was missing or non-positive.
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct GridSpacingEngine {
    dynamic: bool,
    fixed_points: f64,
    atr_multiplier: f64,
    min_points: f64,
    max_points: f64,
    level_lot_multiplier: f64,
    /// Set while operating degraded, so the warning logs once per
    /// occurrence instead of every cycle.
    degraded: bool,
}

impl GridSpacingEngine {
    pub fn new(cfg: &SpacingConfig) -> Self {
        Self {
            dynamic: cfg.dynamic,
            fixed_points: cfg.fixed_points,
            atr_multiplier: cfg.atr_multiplier,
            min_points: cfg.min_dynamic_points,
            max_points: cfg.max_dynamic_points,
            level_lot_multiplier: cfg.level_lot_multiplier,
            degraded: false,
        }
    }

    /// Current spacing. In dynamic mode a bad volatility reading degrades
    /// to the fixed value; the engine keeps operating.
    pub fn spacing(&mut self, atr_points: Option<f64>, alerts: &dyn AlertSink) -> Spacing {
        if !self.dynamic {
            return Spacing { points: self.fixed_points, degraded: false };
        }
        match atr_points {
            Some(atr) if atr > 0.0 => {
                if self.degraded {
                    tracing::info!("volatility reading restored, dynamic spacing resumed");
                    self.degraded = false;
                }
                let raw = atr * self.atr_multiplier;
                Spacing { points: raw.clamp(self.min_points, self.max_points), degraded: false }
            }
            _ => {
                if !self.degraded {
                    tracing::warn!(fallback = self.fixed_points, "volatility unavailable, using fixed spacing");
                    alerts.notify(&AlertEvent::SpacingDegraded);
                    self.degraded = true;
                }
                Spacing { points: self.fixed_points, degraded: true }
            }
        }
    }

    /// Price of grid level `index` for the given direction. Buy grids
    /// ladder below the base price, sell grids above it.
    pub fn level_price(
        &self,
        base_price: f64,
        spacing_points: f64,
        index: usize,
        direction: TradeDirection,
        instrument: &Instrument,
    ) -> f64 {
        let offset = instrument.points_to_price(spacing_points) * index as f64;
        match direction {
            TradeDirection::Buy => base_price - offset,
            TradeDirection::Sell => base_price + offset,
        }
    }

    /// Lot for grid level `index`: `base_lot × multiplier^index`,
    /// quantized per instrument rules.
    pub fn level_lot(&self, base_lot: f64, index: usize, instrument: &Instrument) -> f64 {
        let scaled = base_lot * self.level_lot_multiplier.powi(index as i32);
        instrument.quantize_lot(scaled)
    }
}
