use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Instrument metadata: point size, lot granularity, broker volume bounds.
///
/// A *point* is the smallest quoted price increment; all spacing and
/// stop distances in the engine are expressed in points and converted
/// to price through this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub symbol: String,
    /// Price value of one point (e.g. 0.00001 for 5-digit FX quotes).
    pub point: f64,
    /// Smallest volume increment accepted by the broker.
    pub lot_step: f64,
    /// Broker minimum volume per order.
    pub min_lot: f64,
    /// Broker maximum volume per order.
    pub max_lot: f64,
    /// Account-currency profit of a one-point move per 1.0 lot.
    pub point_value: f64,
}

impl Instrument {
    pub fn new(
        symbol: String,
        point: f64,
        lot_step: f64,
        min_lot: f64,
        max_lot: f64,
        point_value: f64,
    ) -> Result<Self, InstrumentError> {
        if point <= 0.0 || lot_step <= 0.0 || point_value <= 0.0 {
            return Err(InstrumentError::InvalidMetadata {
                symbol,
                detail: "point, lot_step and point_value must be positive".into(),
            });
        }
        if min_lot <= 0.0 || max_lot < min_lot {
            return Err(InstrumentError::InvalidMetadata {
                symbol,
                detail: format!("volume bounds inverted: min={min_lot}, max={max_lot}"),
            });
        }
        Ok(Self { symbol, point, lot_step, min_lot, max_lot, point_value })
    }

    /// Quantize a raw volume to the lot step (round down), then clamp to
    /// the broker volume bounds. Rounding down never inflates exposure.
    pub fn quantize_lot(&self, raw: f64) -> f64 {
        if raw <= 0.0 {
            return 0.0;
        }
        let steps = (raw / self.lot_step + 1e-9).floor();
        let quantized = steps * self.lot_step;
        quantized.clamp(self.min_lot, self.max_lot)
    }

    /// Convert a distance in points to a price distance.
    pub fn points_to_price(&self, points: f64) -> f64 {
        points * self.point
    }

    /// Convert a price distance to points.
    pub fn price_to_points(&self, price_distance: f64) -> f64 {
        price_distance / self.point
    }
}

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("invalid instrument metadata for {symbol}: {detail}")]
    InvalidMetadata { symbol: String, detail: String },
}
