//! The attribute broker (C3): `attributeStream(key) -> lazy sequence of
//! Value`, with de-duplication, freshness, timing, and cancellation.

use dashmap::DashMap;
use pdp_core::{AttributeTiming, EvalError, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;

use crate::finder::AttributeFinder;
use crate::key::AttributeKey;
use crate::station::Station;

const OUT_CHANNEL_CAPACITY: usize = 16;

/// Shared table of stations plus the default linger used when a request
/// doesn't override it.
#[derive(Clone)]
pub struct AttributeBroker {
    stations: Arc<DashMap<AttributeKey, Arc<Station>>>,
    default_linger: Duration,
}

/// One subscription request (spec §3/§4.3).
pub struct AttributeRequest {
    /// The de-duplication key (ignored when `fresh` is true).
    pub key: AttributeKey,
    /// The finder driving this attribute.
    pub finder: Arc<dyn AttributeFinder>,
    /// The entity the finder is evaluated against; `Value::Undefined` for
    /// an environment-scoped finder.
    pub entity: Value,
    /// The finder's already-evaluated argument list.
    pub args: Vec<Value>,
    /// Snapshot of the variable bindings in scope at the invocation site
    /// (spec §3's "relevant-variables-snapshot"); part of the de-duplication
    /// key as well as an argument to the finder itself.
    pub variables: Vec<(String, Value)>,
    /// Timing parameters for this invocation.
    pub timing: AttributeTiming,
    /// Bypass sharing: allocate a private station regardless of key.
    pub fresh: bool,
    /// Override the broker's default linger before a drained station's
    /// cache is evicted.
    pub linger: Option<Duration>,
}

impl AttributeBroker {
    /// A broker with no stations yet, evicting orphaned shared stations
    /// after `default_linger`.
    pub fn new(default_linger: Duration) -> Self {
        Self { stations: Arc::new(DashMap::new()), default_linger }
    }

    /// Open `attributeStream(key)`: a lazy sequence of `Value`s for this
    /// request, primed with the station's last value (if any) and
    /// terminating only when the caller drops the stream or the upstream
    /// finder fails terminally.
    pub fn subscribe(&self, request: AttributeRequest) -> ReceiverStream<Value> {
        let AttributeRequest { key, finder, entity, args, variables, timing, fresh, linger } = request;

        let station = if fresh {
            Station::spawn(finder, entity, args, variables, timing)
        } else {
            self.stations
                .entry(key.clone())
                .or_insert_with(|| Station::spawn(finder, entity, args, variables, timing))
                .clone()
        };

        let rx = station.subscribe();
        let primed = station.last_value();
        let (out_tx, out_rx) = mpsc::channel(OUT_CHANNEL_CAPACITY);

        let stations = self.stations.clone();
        let linger = linger.unwrap_or(self.default_linger);
        let dedup_key = if fresh { None } else { Some(key) };
        tokio::spawn(Self::bridge(
            station,
            rx,
            primed,
            timing.initial_timeout,
            out_tx,
            fresh,
            stations,
            dedup_key,
            linger,
        ));

        ReceiverStream::new(out_rx)
    }

    #[allow(clippy::too_many_arguments)]
    async fn bridge(
        station: Arc<Station>,
        mut rx: broadcast::Receiver<Value>,
        primed: Option<Value>,
        initial_timeout: Duration,
        out_tx: mpsc::Sender<Value>,
        fresh: bool,
        stations: Arc<DashMap<AttributeKey, Arc<Station>>>,
        dedup_key: Option<AttributeKey>,
        linger: Duration,
    ) {
        let mut got_first = primed.is_some();
        if let Some(v) = primed {
            if out_tx.send(v).await.is_err() {
                Self::detach(&station, fresh, &stations, dedup_key, linger);
                return;
            }
        }
        let mut timeout_emitted = false;

        loop {
            tokio::select! {
                biased;
                received = rx.recv() => {
                    match received {
                        Ok(value) => {
                            got_first = true;
                            if out_tx.send(value).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                () = sleep(initial_timeout), if !got_first && !timeout_emitted => {
                    timeout_emitted = true;
                    if out_tx.send(Value::error(EvalError::Timeout)).await.is_err() {
                        break;
                    }
                }
            }
        }

        Self::detach(&station, fresh, &stations, dedup_key, linger);
    }

    fn detach(
        station: &Arc<Station>,
        fresh: bool,
        stations: &Arc<DashMap<AttributeKey, Arc<Station>>>,
        dedup_key: Option<AttributeKey>,
        linger: Duration,
    ) {
        if fresh {
            station.cancel();
            return;
        }
        let remaining = station.unsubscribe();
        if remaining != 0 {
            return;
        }
        let Some(key) = dedup_key else { return };
        let stations = stations.clone();
        let station = station.clone();
        tokio::spawn(async move {
            if !linger.is_zero() {
                sleep(linger).await;
            }
            // Only evict if this is still the registered station for `key`
            // and nobody re-subscribed during the linger window.
            let removed = stations.remove_if(&key, |_, v| {
                Arc::ptr_eq(v, &station) && station.subscriber_count() == 0
            });
            if removed.is_some() {
                station.cancel();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::ConstantFinder;
    use tokio_stream::StreamExt;

    fn timing() -> AttributeTiming {
        AttributeTiming {
            initial_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(30),
            backoff: Duration::from_millis(10),
            retries: 1,
        }
    }

    #[tokio::test]
    async fn two_equal_keyed_requests_share_one_station() {
        let broker = AttributeBroker::new(Duration::ZERO);
        let key = AttributeKey::new("pdp", "f", None, &[], &[]);
        let req = |key: AttributeKey| AttributeRequest {
            key,
            finder: Arc::new(ConstantFinder(Value::int(1))),
            entity: Value::Undefined,
            args: vec![],
            variables: vec![],
            timing: timing(),
            fresh: false,
            linger: None,
        };
        let mut a = broker.subscribe(req(key.clone()));
        let mut b = broker.subscribe(req(key));
        assert_eq!(a.next().await, Some(Value::int(1)));
        assert_eq!(b.next().await, Some(Value::int(1)));
        assert_eq!(broker.stations.len(), 1);
    }

    #[tokio::test]
    async fn fresh_requests_never_share_a_station() {
        let broker = AttributeBroker::new(Duration::ZERO);
        let key = AttributeKey::new("pdp", "f", None, &[], &[]);
        let req = AttributeRequest {
            key,
            finder: Arc::new(ConstantFinder(Value::int(2))),
            entity: Value::Undefined,
            args: vec![],
            variables: vec![],
            timing: timing(),
            fresh: true,
            linger: None,
        };
        let mut s = broker.subscribe(req);
        assert_eq!(s.next().await, Some(Value::int(2)));
        assert_eq!(broker.stations.len(), 0);
    }

    #[tokio::test]
    async fn slow_upstream_emits_a_timeout_error_exactly_once() {
        struct NeverFinder;
        #[async_trait::async_trait]
        impl AttributeFinder for NeverFinder {
            async fn fetch(&self, _entity: &Value, _args: &[Value], _variables: &[(String, Value)]) -> Result<Value, EvalError> {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
        let broker = AttributeBroker::new(Duration::ZERO);
        let key = AttributeKey::new("pdp", "slow", None, &[], &[]);
        let req = AttributeRequest {
            key,
            finder: Arc::new(NeverFinder),
            entity: Value::Undefined,
            args: vec![],
            variables: vec![],
            timing: AttributeTiming {
                initial_timeout: Duration::from_millis(10),
                poll_interval: Duration::from_millis(50),
                backoff: Duration::from_millis(5),
                retries: 0,
            },
            fresh: true,
            linger: None,
        };
        let mut s = broker.subscribe(req);
        let first = s.next().await.unwrap();
        assert!(first.is_error());
    }
}
