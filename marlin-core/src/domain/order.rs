//! Order types and the order status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// What kind of order: how and when it becomes a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Fill at the limit price or better.
    Limit,
    /// Limit order that only rests (OCO profit leg).
    LimitMaker,
    /// Fill immediately at the current price.
    Market,
    /// Sell when price falls to the stop, at market.
    StopLoss,
    /// Sell when price falls to the stop, at the limit price.
    StopLossLimit,
    /// Close when price reaches the target, at market.
    TakeProfit,
    /// Close when price reaches the target, at the limit price.
    TakeProfitLimit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderKind::Limit => "LIMIT",
            OrderKind::LimitMaker => "LIMIT_MAKER",
            OrderKind::Market => "MARKET",
            OrderKind::StopLoss => "STOP_LOSS",
            OrderKind::StopLossLimit => "STOP_LOSS_LIMIT",
            OrderKind::TakeProfit => "TAKE_PROFIT",
            OrderKind::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
        };
        write!(f, "{s}")
    }
}

/// Order lifecycle states.
///
/// Transitions are monotonic: New → {PartiallyFilled, Filled, Canceled,
/// PendingCancel, Rejected, Expired}; PartiallyFilled → {Filled, Canceled};
/// PendingCancel → Canceled. Filled, Canceled, Rejected and Expired are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::PendingCancel => "PENDING_CANCEL",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

/// A single order.
///
/// `id` is the storage identifier, assigned on first persist;
/// `exchange_id` is the venue's identifier. `group_id` links OCO legs.
/// The realized-profit fields are transient bookkeeping filled in by the
/// position ledger on a closing fill; they are never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Option<u64>,
    pub exchange_id: u64,
    pub pair: String,
    pub side: Side,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub price: f64,
    pub quantity: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub stop: Option<f64>,
    pub group_id: Option<u64>,

    #[serde(skip)]
    pub profit_pct: f64,
    #[serde(skip)]
    pub profit_abs: f64,
}

impl Order {
    /// The price a fill of this order settles at: the stop price for
    /// stop orders, the order price otherwise.
    pub fn fill_price(&self) -> f64 {
        match self.kind {
            OrderKind::StopLoss | OrderKind::StopLossLimit => {
                self.stop.unwrap_or(self.price)
            }
            _ => self.price,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} | ID: {}, Type: {}, {} x ${} (~${:.0})",
            self.status,
            self.side,
            self.pair,
            self.exchange_id,
            self.kind,
            self.quantity,
            self.price,
            self.quantity * self.price,
        )
    }
}
