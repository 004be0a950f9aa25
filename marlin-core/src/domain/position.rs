//! Position ledger — cost-basis averaging, closes and flips.

use super::order::{Order, Side};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Net holding in one pair: direction, average entry price, quantity.
///
/// A pair is either long or short, never both; `quantity` stays
/// non-negative with the direction carried by `side`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub avg_price: f64,
    pub quantity: f64,
    pub created_at: DateTime<Utc>,
}

/// Realized outcome of an opposite-side fill: exactly one per fill,
/// including flips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    pub pair: String,
    pub profit_pct: f64,
    pub profit_abs: f64,
    pub side: Side,
    #[serde(with = "duration_seconds")]
    pub duration: Duration,
    pub created_at: DateTime<Utc>,
}

mod duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.num_seconds().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::seconds(i64::deserialize(d)?))
    }
}

impl Position {
    /// Seed a position from the first fill on a flat pair.
    pub fn open(order: &Order) -> Self {
        Self {
            side: order.side,
            avg_price: order.fill_price(),
            quantity: order.quantity,
            created_at: order.created_at,
        }
    }

    /// Fold a fill into the position.
    ///
    /// Same-direction fills re-average the cost basis; opposite-direction
    /// fills realize PnL on `min(position, fill)` quantity against the
    /// pre-fill average, then shrink, close, or flip. Returns the realized
    /// result (if any) and whether the position is now closed and should
    /// be removed. The fill's transient profit fields are set alongside.
    pub fn update(&mut self, order: &mut Order) -> (Option<TradeResult>, bool) {
        let price = order.fill_price();

        if self.side == order.side {
            self.avg_price = (self.avg_price * self.quantity + price * order.quantity)
                / (self.quantity + order.quantity);
            self.quantity += order.quantity;
            return (None, false);
        }

        // Opposite direction: realize against the pre-fill state.
        let closed = self.quantity.min(order.quantity);
        let profit_pct = (price - self.avg_price) / self.avg_price;
        let profit_abs = (price - self.avg_price) * closed;
        let duration = order.created_at - self.created_at;
        let closed_side = self.side;

        let mut finished = false;
        if order.quantity == self.quantity {
            finished = true;
        } else if order.quantity < self.quantity {
            self.quantity -= order.quantity;
        } else {
            // Flip: the excess opens a fresh position on the other side.
            self.quantity = order.quantity - self.quantity;
            self.side = order.side;
            self.avg_price = price;
            self.created_at = order.created_at;
        }

        order.profit_pct = profit_pct;
        order.profit_abs = profit_abs;

        let result = TradeResult {
            pair: order.pair.clone(),
            profit_pct,
            profit_abs,
            side: closed_side,
            duration,
            created_at: order.created_at,
        };
        (Some(result), finished)
    }
}
