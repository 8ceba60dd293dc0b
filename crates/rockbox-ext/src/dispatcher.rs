//! Op dispatcher: routes calls to handlers and settles their completions.
//!
//! Every domain owns one lane, a FIFO worker task fed by an unbounded
//! channel, so calls to the same domain run one at a time in dispatch order
//! while different domains proceed concurrently. Calls in flight live in the
//! pending table until they settle; settling removes the entry first, which
//! is what makes completion happen exactly once.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::OpError;
use crate::marshal::{self, Args};
use crate::registry::{Domain, Handler, Operation, Registry};

type Completion = oneshot::Sender<Result<Value, OpError>>;

// ─── Call handle ────────────────────────────────────────────────────────

/// The script-side end of one call. Resolves once the call settles.
#[derive(Debug)]
pub struct CallHandle {
    id: Uuid,
    rx: oneshot::Receiver<Result<Value, OpError>>,
}

impl CallHandle {
    /// Token identifying the call, usable with `Dispatcher::cancel`.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// A handle that is already settled with `result`.
    pub(crate) fn settled(result: Result<Value, OpError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self {
            id: Uuid::new_v4(),
            rx,
        }
    }
}

impl Future for CallHandle {
    type Output = Result<Value, OpError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(OpError::Cancelled)))
    }
}

// ─── Pending table ──────────────────────────────────────────────────────

struct PendingCall {
    op: String,
    /// Raw script arguments, kept for diagnostics.
    args: Vec<Value>,
    started: Instant,
    completion: Completion,
}

#[derive(Default)]
struct PendingTable {
    calls: Mutex<HashMap<Uuid, PendingCall>>,
}

impl PendingTable {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, PendingCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, id: Uuid, call: PendingCall) {
        self.lock().insert(id, call);
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.lock().contains_key(id)
    }

    /// Complete a call. Returns `false` when it had already settled.
    fn settle(&self, id: Uuid, result: Result<Value, OpError>) -> bool {
        let Some(call) = self.lock().remove(&id) else {
            return false;
        };
        let elapsed_ms = call.started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::debug!(op = %call.op, call_id = %id, elapsed_ms, "call settled"),
            Err(e) => tracing::debug!(
                op = %call.op,
                call_id = %id,
                elapsed_ms,
                kind = %e.kind(),
                "call failed"
            ),
        }
        // The script may have dropped its handle; nothing left to notify.
        let _ = call.completion.send(result);
        true
    }

    fn drain(&self) -> Vec<(Uuid, PendingCall)> {
        self.lock().drain().collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

// ─── Lanes ──────────────────────────────────────────────────────────────

struct Job {
    id: Uuid,
    op: Arc<Operation>,
    args: Args,
}

struct Lane {
    tx: mpsc::UnboundedSender<Job>,
    /// Jobs queued or running on this lane.
    depth: Arc<AtomicUsize>,
}

async fn run_lane(
    domain: Domain,
    mut rx: mpsc::UnboundedReceiver<Job>,
    depth: Arc<AtomicUsize>,
    pending: Arc<PendingTable>,
) {
    while let Some(job) = rx.recv().await {
        if pending.contains(&job.id) {
            let result = run_job(&job).await;
            pending.settle(job.id, result);
        } else {
            tracing::debug!(op = %job.op.name, call_id = %job.id, "skipping cancelled call");
        }
        depth.fetch_sub(1, Ordering::AcqRel);
    }
    tracing::debug!(domain = %domain, "lane closed");
}

async fn run_job(job: &Job) -> Result<Value, OpError> {
    let result = match &job.op.handler {
        Handler::Inline(f) => run_inline(f.as_ref(), job.args.clone(), &job.op, job.id),
        Handler::Task(f) => {
            let f = f.clone();
            let args = job.args.clone();
            match tokio::spawn(async move { f(args).await }).await {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    tracing::error!(op = %job.op.name, call_id = %job.id, "handler panicked");
                    Err(OpError::Internal(format!("{} failed unexpectedly", job.op.name)))
                }
                Err(_) => Err(OpError::Cancelled),
            }
        }
    };
    finish(&job.op, job.id, result)
}

fn run_inline(
    f: &crate::registry::InlineFn,
    args: Args,
    op: &Operation,
    id: Uuid,
) -> Result<Value, OpError> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| f(args))) {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(op = %op.name, call_id = %id, "handler panicked");
            Err(OpError::Internal(format!("{} failed unexpectedly", op.name)))
        }
    }
}

/// Enforce the declared result type and failure set.
fn finish(op: &Operation, id: Uuid, result: Result<Value, OpError>) -> Result<Value, OpError> {
    match result {
        Ok(value) => marshal::check_return(&op.returns, value).map_err(|reason| {
            tracing::error!(op = %op.name, call_id = %id, "handler returned a bad value: {reason}");
            OpError::Internal(format!("{} returned an unexpected value", op.name))
        }),
        Err(e) if op.declares(e.kind()) => Err(e),
        Err(e) => {
            tracing::error!(
                op = %op.name,
                call_id = %id,
                kind = %e.kind(),
                "undeclared failure: {e}"
            );
            Err(OpError::Internal(format!("{} failed", op.name)))
        }
    }
}

// ─── Dispatcher ─────────────────────────────────────────────────────────

struct Inner {
    registry: Arc<Registry>,
    lanes: HashMap<Domain, Lane>,
    pending: Arc<PendingTable>,
    closed: AtomicBool,
}

/// Routes `dispatch(name, args)` to the registered handler.
///
/// Cloning is cheap; every clone feeds the same lanes.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("lanes", &self.inner.lanes.len())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Dispatcher {
    /// Freeze `registry` and start one lane per domain.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(registry: Arc<Registry>) -> Self {
        registry.freeze();
        let pending = Arc::new(PendingTable::default());

        let mut lanes = HashMap::new();
        for domain in registry.domains() {
            let (tx, rx) = mpsc::unbounded_channel();
            let depth = Arc::new(AtomicUsize::new(0));
            tokio::spawn(run_lane(domain, rx, depth.clone(), pending.clone()));
            lanes.insert(domain, Lane { tx, depth });
        }

        Self {
            inner: Arc::new(Inner {
                registry,
                lanes,
                pending,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Start a call. Never blocks; the returned handle resolves on settlement.
    pub fn dispatch(&self, name: &str, raw_args: Vec<Value>) -> CallHandle {
        if self.inner.closed.load(Ordering::Acquire) {
            return CallHandle::settled(Err(OpError::Cancelled));
        }

        let Some(op) = self.inner.registry.resolve(name) else {
            tracing::debug!(op = %name, "unknown operation");
            return CallHandle::settled(Err(OpError::UnknownOperation(name.to_string())));
        };

        let args = match marshal::to_native(&op.params, &raw_args) {
            Ok(args) => args,
            Err(e) => {
                tracing::debug!(op = %name, "rejected arguments: {e}");
                return CallHandle::settled(Err(e));
            }
        };

        let Some(lane) = self.inner.lanes.get(&op.domain) else {
            tracing::error!(op = %name, domain = %op.domain, "no lane for domain");
            return CallHandle::settled(Err(OpError::Internal("no lane for operation".into())));
        };

        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        // Inline reads skip the lane when nothing is queued ahead of them.
        if let Handler::Inline(f) = &op.handler {
            if lane.depth.load(Ordering::Acquire) == 0 {
                let result = run_inline(f.as_ref(), args, &op, id);
                let _ = tx.send(finish(&op, id, result));
                return CallHandle { id, rx };
            }
        }

        self.inner.pending.insert(
            id,
            PendingCall {
                op: op.name.clone(),
                args: raw_args,
                started: Instant::now(),
                completion: tx,
            },
        );
        lane.depth.fetch_add(1, Ordering::AcqRel);
        if lane.tx.send(Job { id, op, args }).is_err() {
            lane.depth.fetch_sub(1, Ordering::AcqRel);
            self.inner.pending.settle(id, Err(OpError::Cancelled));
        }

        CallHandle { id, rx }
    }

    /// Dispatch and wait for the result.
    pub async fn call(&self, name: &str, raw_args: Vec<Value>) -> Result<Value, OpError> {
        self.dispatch(name, raw_args).await
    }

    /// Settle an outstanding call with `Cancelled`. A handler already running
    /// finishes, but its result is dropped.
    pub fn cancel(&self, id: Uuid) -> bool {
        self.inner.pending.settle(id, Err(OpError::Cancelled))
    }

    /// Cancel every outstanding call; returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained = self.inner.pending.drain();
        let count = drained.len();
        for (id, call) in drained {
            tracing::debug!(op = %call.op, call_id = %id, args = ?call.args, "call cancelled");
            let _ = call.completion.send(Err(OpError::Cancelled));
        }
        count
    }

    /// Cancel everything and refuse further calls.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let cancelled = self.cancel_all();
        tracing::info!(cancelled, "dispatcher shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Calls accepted but not yet settled.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────
