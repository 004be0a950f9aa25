//! Ordered event queue — a locked min-heap with a streaming pop mode.
//!
//! Producers `push` from any thread; consumers either poll with `pop`
//! (backtest drain) or take the bounded stream (live), which delivers
//! items in comparator order as they become available. The stream is a
//! single forwarder task over a bounded channel; dropping the receiver
//! shuts it down.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

#[derive(Debug)]
struct Inner<T> {
    heap: Mutex<BinaryHeap<Reverse<T>>>,
    available: Notify,
}

/// Thread-safe priority queue delivering the smallest element first.
#[derive(Debug)]
pub struct EventQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for EventQueue<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Ord> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> EventQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                heap: Mutex::new(BinaryHeap::new()),
                available: Notify::new(),
            }),
        }
    }

    /// Insert an item and wake the stream, if one is attached.
    pub fn push(&self, item: T) {
        self.inner
            .heap
            .lock()
            .expect("queue lock poisoned")
            .push(Reverse(item));
        self.inner.available.notify_one();
    }

    /// Remove and return the smallest item, or `None` when empty.
    pub fn pop(&self) -> Option<T> {
        self.inner
            .heap
            .lock()
            .expect("queue lock poisoned")
            .pop()
            .map(|Reverse(item)| item)
    }

    pub fn len(&self) -> usize {
        self.inner.heap.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Ord + Clone> EventQueue<T> {
    /// Non-destructive look at the smallest item.
    pub fn peek(&self) -> Option<T> {
        self.inner
            .heap
            .lock()
            .expect("queue lock poisoned")
            .peek()
            .map(|Reverse(item)| item.clone())
    }
}

impl<T: Ord + Send + 'static> EventQueue<T> {
    /// Continuous ordered delivery without polling.
    ///
    /// Spawns one forwarder over a channel of `capacity` items: every
    /// push wakes it, it pops in comparator order and sends downstream.
    /// The task exits when the receiver is dropped.
    pub fn stream(&self, capacity: usize) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(capacity);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                let next = inner
                    .heap
                    .lock()
                    .expect("queue lock poisoned")
                    .pop()
                    .map(|Reverse(item)| item);
                match next {
                    Some(item) => {
                        if tx.send(item).await.is_err() {
                            return;
                        }
                    }
                    None => inner.available.notified().await,
                }
            }
        });
        rx
    }
}
