//! A station: the one live upstream shared by every subscriber of a given
//! attribute key (spec §4.3, implementation notes §4.3.1).

use pdp_core::{AttributeTiming, EvalError, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::finder::AttributeFinder;

const CHANNEL_CAPACITY: usize = 64;

/// One finder invocation's live state: a broadcast fan-out, a last-value
/// cache for new joiners, a reference count, and the task driving the
/// upstream finder.
pub struct Station {
    tx: broadcast::Sender<Value>,
    last_value: Mutex<Option<Value>>,
    subscribers: AtomicUsize,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Station {
    /// Spawn a station driving `finder(entity, args, variables)` under
    /// `timing`.
    pub fn spawn(
        finder: Arc<dyn AttributeFinder>,
        entity: Value,
        args: Vec<Value>,
        variables: Vec<(String, Value)>,
        timing: AttributeTiming,
    ) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let station = Arc::new(Self {
            tx: tx.clone(),
            last_value: Mutex::new(None),
            subscribers: AtomicUsize::new(0),
            cancel: cancel.clone(),
            driver: Mutex::new(None),
        });

        let last_value_slot = Arc::downgrade(&station);
        let handle = tokio::spawn(Self::drive(last_value_slot, finder, entity, args, variables, timing, tx, cancel));
        *station.driver.lock().unwrap() = Some(handle);
        station
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        station: std::sync::Weak<Self>,
        finder: Arc<dyn AttributeFinder>,
        entity: Value,
        args: Vec<Value>,
        variables: Vec<(String, Value)>,
        timing: AttributeTiming,
        tx: broadcast::Sender<Value>,
        cancel: CancellationToken,
    ) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let result = Self::fetch_with_retry(&*finder, &entity, &args, &variables, &timing, &cancel).await;
            match result {
                Ok(value) => {
                    if let Some(st) = station.upgrade() {
                        *st.last_value.lock().unwrap() = Some(value.clone());
                    } else {
                        return;
                    }
                    let _ = tx.send(value);
                }
                Err(err) => {
                    debug!(error = %err, "attribute station terminating");
                    let _ = tx.send(Value::error(err));
                    return;
                }
            }

            if finder.is_push_driven() {
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(timing.poll_interval) => {}
            }
        }
    }

    /// Call `finder.fetch` until it succeeds, exhausting `retries` with a
    /// doubling delay capped at one `poll_interval` (spec §4.3/§5).
    async fn fetch_with_retry(
        finder: &dyn AttributeFinder,
        entity: &Value,
        args: &[Value],
        variables: &[(String, Value)],
        timing: &AttributeTiming,
        cancel: &CancellationToken,
    ) -> Result<Value, EvalError> {
        let mut delay = timing.backoff;
        let cap = timing.backoff_cap();
        let mut attempt = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(EvalError::Timeout),
                outcome = finder.fetch(entity, args, variables) => {
                    match outcome {
                        Ok(value) => return Ok(value),
                        Err(err) => {
                            if attempt >= timing.retries {
                                return Err(err);
                            }
                            attempt += 1;
                            tokio::select! {
                                _ = cancel.cancelled() => return Err(EvalError::Timeout),
                                _ = sleep(delay) => {}
                            }
                            delay = std::cmp::min(delay * 2, cap);
                        }
                    }
                }
            }
        }
    }

    /// Attach a new subscriber, incrementing the reference count.
    pub fn subscribe(self: &Arc<Self>) -> broadcast::Receiver<Value> {
        self.subscribers.fetch_add(1, Ordering::SeqCst);
        self.tx.subscribe()
    }

    /// The last value produced, if any (primes a new subscriber).
    pub fn last_value(&self) -> Option<Value> {
        self.last_value.lock().unwrap().clone()
    }

    /// Detach a subscriber, returning the post-decrement count.
    pub fn unsubscribe(&self) -> usize {
        self.subscribers.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Current subscriber count, for linger-eviction re-checks.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    /// Cooperatively cancel the driver task (spec §4.3: "the finder is
    /// signalled and expected to finish promptly").
    pub fn cancel(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.driver.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::ConstantFinder;
    use std::time::Duration;

    #[tokio::test]
    async fn a_constant_finder_produces_one_value_then_keeps_polling() {
        let timing = AttributeTiming {
            initial_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(20),
            backoff: Duration::from_millis(5),
            retries: 2,
        };
        let station = Station::spawn(Arc::new(ConstantFinder(Value::int(7))), Value::Undefined, vec![], vec![], timing);
        let mut rx = station.subscribe();
        let first = rx.recv().await.unwrap();
        assert_eq!(first, Value::int(7));
        station.cancel();
    }
}
