//! Order event fan-out: a bounded per-pair publish/subscribe.
//!
//! Each pair with at least one subscriber gets a bounded channel and one
//! dispatch task invoking subscriber callbacks in registration order.
//! `publish` awaits channel capacity (backpressure instead of a task per
//! event); `stop` drains in-flight events and ends the tasks.

use crate::domain::Order;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Callback receiving order updates for one subscription.
pub type OrderConsumer = Arc<dyn Fn(Order) + Send + Sync>;

struct OrderSubscription {
    only_new: bool,
    consumer: OrderConsumer,
}

const CHANNEL_CAPACITY: usize = 64;

/// Per-pair order event bus.
#[derive(Default)]
pub struct OrderFeed {
    subscriptions: Mutex<HashMap<String, Vec<OrderSubscription>>>,
    senders: Mutex<HashMap<String, mpsc::Sender<(Order, bool)>>>,
}

impl OrderFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer for one pair's order events. With `only_new`
    /// set, the consumer sees creations but not reconciliation updates.
    pub fn subscribe(&self, pair: &str, consumer: OrderConsumer, only_new: bool) {
        self.subscriptions
            .lock()
            .expect("order feed lock poisoned")
            .entry(pair.to_string())
            .or_default()
            .push(OrderSubscription { only_new, consumer });
    }

    /// Spawn one dispatch task per subscribed pair.
    pub fn start(&self) {
        let subscriptions = self.subscriptions.lock().expect("order feed lock poisoned");
        let mut senders = self.senders.lock().expect("order feed lock poisoned");
        for (pair, subs) in subscriptions.iter() {
            if senders.contains_key(pair) {
                continue;
            }
            let (tx, mut rx) = mpsc::channel::<(Order, bool)>(CHANNEL_CAPACITY);
            let consumers: Vec<(bool, OrderConsumer)> = subs
                .iter()
                .map(|s| (s.only_new, Arc::clone(&s.consumer)))
                .collect();
            tokio::spawn(async move {
                while let Some((order, is_new)) = rx.recv().await {
                    for (only_new, consumer) in &consumers {
                        if *only_new && !is_new {
                            continue;
                        }
                        consumer(order.clone());
                    }
                }
            });
            senders.insert(pair.clone(), tx);
        }
    }

    /// Deliver an order event to the pair's subscribers. `is_new` marks
    /// creations as opposed to reconciliation state changes. A pair with
    /// no subscribers drops the event.
    pub async fn publish(&self, order: Order, is_new: bool) {
        let sender = {
            let senders = self.senders.lock().expect("order feed lock poisoned");
            senders.get(&order.pair).cloned()
        };
        if let Some(sender) = sender {
            let _ = sender.send((order, is_new)).await;
        }
    }

    /// Drop the channel senders: dispatch tasks drain what is queued and
    /// exit.
    pub fn stop(&self) {
        self.senders.lock().expect("order feed lock poisoned").clear();
    }
}
