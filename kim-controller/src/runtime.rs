//! Controller runtime: watch events in, reconciles out.
//!
//! Guarantees per controller:
//! - at most one reconcile in flight per key; events arriving meanwhile are
//!   coalesced into a single re-run;
//! - a watch event for a key that is being reconciled cancels the running
//!   reconcile, which is then re-run against the latest state;
//! - total concurrency is bounded by `workers`;
//! - failures are requeued with exponential backoff;
//! - every key is re-reconciled on the resync interval.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use kim_api::{ObjectKey, Resource};
use kim_store::{Api, BoxFuture};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::action::{error_policy, Action};
use crate::config::ControllerConfig;
use crate::error::Error;

type ReconcileFn = Arc<dyn Fn(ObjectKey) -> BoxFuture<'static, Result<Action, Error>> + Send + Sync>;
type Hook = Arc<dyn Fn(&ObjectKey) + Send + Sync>;
type KeySource = Arc<dyn Fn() -> Vec<ObjectKey> + Send + Sync>;

/// Enqueues keys into a running controller from outside its watch stream.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<ObjectKey>,
}

impl QueueHandle {
    pub fn enqueue(&self, key: ObjectKey) {
        // A stopped controller drops the key.
        let _ = self.tx.send(key);
    }
}

pub struct Controller<R: Resource> {
    api: Arc<dyn Api<R>>,
    reconcile: ReconcileFn,
    config: ControllerConfig,
    on_reconciled: Option<Hook>,
    known_keys: Option<KeySource>,
    queue_tx: mpsc::UnboundedSender<ObjectKey>,
    queue_rx: mpsc::UnboundedReceiver<ObjectKey>,
}

impl<R: Resource> Controller<R> {
    pub fn new<F, Fut>(api: Arc<dyn Api<R>>, config: ControllerConfig, reconcile: F) -> Self
    where
        F: Fn(ObjectKey) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Action, Error>> + Send + 'static,
    {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            api,
            reconcile: Arc::new(move |key| -> BoxFuture<'static, Result<Action, Error>> {
                Box::pin(reconcile(key))
            }),
            config,
            on_reconciled: None,
            known_keys: None,
            queue_tx,
            queue_rx,
        }
    }

    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            tx: self.queue_tx.clone(),
        }
    }

    /// Called after every successful reconcile.
    pub fn on_reconciled(mut self, hook: impl Fn(&ObjectKey) + Send + Sync + 'static) -> Self {
        self.on_reconciled = Some(Arc::new(hook));
        self
    }

    /// Extra keys to reconcile on resync, such as keys the model still holds
    /// whose delete event was missed.
    pub fn known_keys(mut self, source: impl Fn() -> Vec<ObjectKey> + Send + Sync + 'static) -> Self {
        self.known_keys = Some(Arc::new(source));
        self
    }

    /// Run until `shutdown` is cancelled or the watch stream closes.
    pub async fn run(self, shutdown: CancellationToken) {
        let Controller {
            api,
            reconcile,
            config,
            on_reconciled,
            known_keys,
            queue_tx,
            mut queue_rx,
        } = self;

        // Subscribe before the initial list so no change falls in between.
        let mut events = api.watch();
        let mut queue = WorkQueue {
            kind: R::KIND,
            states: HashMap::new(),
            tasks: JoinSet::new(),
            semaphore: Arc::new(Semaphore::new(config.workers.max(1))),
            reconcile,
            on_reconciled,
            queue_tx,
            shutdown: shutdown.clone(),
            config: config.clone(),
        };

        resync(&mut queue, api.as_ref(), known_keys.as_ref()).await;
        let period = config.resync;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        tracing::info!(controller = R::KIND, workers = config.workers, "controller started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => queue.schedule(event.key, true),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(controller = R::KIND, skipped, "watch lagged, resyncing");
                        resync(&mut queue, api.as_ref(), known_keys.as_ref()).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!(controller = R::KIND, "watch stream closed");
                        break;
                    }
                },
                Some(key) = queue_rx.recv() => queue.schedule(key, false),
                Some(joined) = queue.tasks.join_next(), if !queue.tasks.is_empty() => match joined {
                    Ok((key, outcome)) => queue.finish(key, outcome),
                    Err(e) => tracing::error!(controller = R::KIND, error = %e, "reconcile task failed"),
                },
                _ = ticker.tick() => {
                    tracing::debug!(controller = R::KIND, "periodic resync");
                    resync(&mut queue, api.as_ref(), known_keys.as_ref()).await;
                }
            }
        }

        queue.tasks.shutdown().await;
        tracing::info!(controller = R::KIND, "controller stopped");
    }
}

async fn resync<R: Resource>(queue: &mut WorkQueue, api: &dyn Api<R>, known: Option<&KeySource>) {
    match api.list().await {
        Ok(items) => {
            for item in items {
                queue.schedule(item.key(), false);
            }
        }
        Err(e) => tracing::warn!(controller = R::KIND, error = %e, "resync list failed"),
    }
    if let Some(known) = known {
        for key in known() {
            queue.schedule(key, false);
        }
    }
}

enum Outcome {
    Finished(Result<Action, Error>),
    Cancelled,
    Panicked,
}

#[derive(Default)]
struct KeyState {
    running: Option<CancellationToken>,
    pending: bool,
    failures: u32,
}

struct WorkQueue {
    kind: &'static str,
    states: HashMap<ObjectKey, KeyState>,
    tasks: JoinSet<(ObjectKey, Outcome)>,
    semaphore: Arc<Semaphore>,
    reconcile: ReconcileFn,
    on_reconciled: Option<Hook>,
    queue_tx: mpsc::UnboundedSender<ObjectKey>,
    shutdown: CancellationToken,
    config: ControllerConfig,
}

impl WorkQueue {
    /// Start a reconcile for `key`, or mark it for a re-run if one is in
    /// flight. `supersede` cancels the in-flight reconcile.
    fn schedule(&mut self, key: ObjectKey, supersede: bool) {
        if let Some(state) = self.states.get_mut(&key) {
            if let Some(token) = &state.running {
                state.pending = true;
                if supersede {
                    token.cancel();
                }
                return;
            }
        }
        self.start(key);
    }

    fn start(&mut self, key: ObjectKey) {
        let token = self.shutdown.child_token();
        let state = self.states.entry(key.clone()).or_default();
        state.running = Some(token.clone());
        state.pending = false;

        let reconcile = self.reconcile.clone();
        let semaphore = self.semaphore.clone();
        self.tasks.spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => Outcome::Cancelled,
                outcome = async {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return Outcome::Cancelled;
                    };
                    match AssertUnwindSafe(reconcile(key.clone())).catch_unwind().await {
                        Ok(result) => Outcome::Finished(result),
                        Err(_) => Outcome::Panicked,
                    }
                } => outcome,
            };
            (key, outcome)
        });
    }

    fn finish(&mut self, key: ObjectKey, outcome: Outcome) {
        let kind = self.kind;
        let Some(state) = self.states.get_mut(&key) else {
            return;
        };
        state.running = None;

        let requeue = match outcome {
            Outcome::Finished(Ok(action)) => {
                state.failures = 0;
                if let Some(hook) = &self.on_reconciled {
                    hook(&key);
                }
                action.requeue_after()
            }
            Outcome::Finished(Err(err)) => {
                state.failures = state.failures.saturating_add(1);
                let action = error_policy(&err, state.failures, &self.config);
                tracing::warn!(
                    controller = kind,
                    key = %key,
                    error = %err,
                    failures = state.failures,
                    retry_in = ?action.requeue_after(),
                    "reconcile failed"
                );
                action.requeue_after()
            }
            Outcome::Cancelled => {
                tracing::debug!(controller = kind, key = %key, "reconcile superseded");
                None
            }
            Outcome::Panicked => {
                state.failures = state.failures.saturating_add(1);
                tracing::error!(controller = kind, key = %key, "reconcile panicked");
                Some(crate::action::backoff(&self.config, state.failures))
            }
        };

        let rerun = state.pending;
        let idle = !rerun && state.failures == 0;
        if rerun {
            self.start(key.clone());
        } else if idle {
            self.states.remove(&key);
        }
        if let Some(delay) = requeue {
            self.requeue_later(key, delay);
        }
    }

    fn requeue_later(&self, key: ObjectKey, delay: std::time::Duration) {
        let tx = self.queue_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(key);
                }
            }
        });
    }
}
