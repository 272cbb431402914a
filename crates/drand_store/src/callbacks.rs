//! Synchronous-looking, asynchronously-dispatched store callbacks (§4.B).
//!
//! Callbacks are invoked in registration order after a `put` completes,
//! but run off a dedicated background task fed by a bounded channel so a
//! slow subscriber (e.g. a public-rand waiter) cannot stall the backend
//! that called `put`.

use std::sync::{Arc, Mutex};

use drand_core::Beacon;
use tokio::sync::mpsc;

pub type Callback = Arc<dyn Fn(&Beacon) + Send + Sync>;

const QUEUE_CAPACITY: usize = 64;

pub struct CallbackRegistry {
    callbacks: Arc<Mutex<Vec<(String, Callback)>>>,
    tx: mpsc::Sender<Beacon>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        let callbacks: Arc<Mutex<Vec<(String, Callback)>>> = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = mpsc::channel::<Beacon>(QUEUE_CAPACITY);
        let dispatch_callbacks = callbacks.clone();
        tokio::spawn(async move {
            while let Some(beacon) = rx.recv().await {
                let snapshot: Vec<Callback> = dispatch_callbacks
                    .lock()
                    .expect("callback registry lock poisoned")
                    .iter()
                    .map(|(_, cb)| cb.clone())
                    .collect();
                for cb in snapshot {
                    cb(&beacon);
                }
            }
        });
        Self { callbacks, tx }
    }

    pub fn add(&self, id: impl Into<String>, cb: Callback) {
        self.callbacks
            .lock()
            .expect("callback registry lock poisoned")
            .push((id.into(), cb));
    }

    pub fn remove(&self, id: &str) {
        self.callbacks
            .lock()
            .expect("callback registry lock poisoned")
            .retain(|(existing, _)| existing != id);
    }

    pub async fn notify(&self, beacon: Beacon) {
        if self.tx.send(beacon).await.is_err() {
            tracing::warn!("callback dispatcher task is gone, dropping beacon notification");
        }
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn callbacks_fire_in_registration_order() {
        let registry = CallbackRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        registry.add("a", Arc::new(move |_| o1.lock().unwrap().push("a")));
        let o2 = order.clone();
        registry.add("b", Arc::new(move |_| o2.lock().unwrap().push("b")));

        registry.notify(Beacon::genesis(vec![0; 32])).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn removed_callback_does_not_fire() {
        let registry = CallbackRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        registry.add("x", Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        registry.remove("x");

        registry.notify(Beacon::genesis(vec![0; 32])).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
