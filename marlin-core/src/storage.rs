//! Order persistence contract and the in-memory implementation.

use crate::domain::{Order, OrderStatus};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("order {0} not found")]
    NotFound(u64),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Composable predicate over persisted orders.
#[derive(Debug, Clone)]
pub enum OrderFilter {
    StatusIn(Vec<OrderStatus>),
    Pair(String),
    UpdatedBefore(DateTime<Utc>),
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderFilter::StatusIn(statuses) => statuses.contains(&order.status),
            OrderFilter::Pair(pair) => &order.pair == pair,
            OrderFilter::UpdatedBefore(cutoff) => order.updated_at <= *cutoff,
        }
    }
}

/// Order persistence. Orders are created once, updated by the
/// reconciliation loop, and never deleted.
pub trait Storage: Send + Sync {
    /// Persist a new order, assigning its storage id.
    fn create_order(&self, order: &mut Order) -> Result<(), StorageError>;

    /// Persist a state change to an existing order.
    fn update_order(&self, order: &Order) -> Result<(), StorageError>;

    /// All orders matching every given filter.
    fn orders(&self, filters: &[OrderFilter]) -> Result<Vec<Order>, StorageError>;
}

/// Mutex-guarded in-memory storage, the default for backtests.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    orders: Vec<Order>,
    next_id: u64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn create_order(&self, order: &mut Order) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("storage lock poisoned");
        inner.next_id += 1;
        order.id = Some(inner.next_id);
        inner.orders.push(order.clone());
        Ok(())
    }

    fn update_order(&self, order: &Order) -> Result<(), StorageError> {
        let id = order.id.ok_or(StorageError::NotFound(0))?;
        let mut inner = self.inner.lock().expect("storage lock poisoned");
        let slot = inner
            .orders
            .iter_mut()
            .find(|o| o.id == Some(id))
            .ok_or(StorageError::NotFound(id))?;
        *slot = order.clone();
        Ok(())
    }

    fn orders(&self, filters: &[OrderFilter]) -> Result<Vec<Order>, StorageError> {
        let inner = self.inner.lock().expect("storage lock poisoned");
        Ok(inner
            .orders
            .iter()
            .filter(|order| filters.iter().all(|f| f.matches(order)))
            .cloned()
            .collect())
    }
}
