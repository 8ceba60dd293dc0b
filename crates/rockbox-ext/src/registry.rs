//! Capability registry: the authoritative table of operations.
//!
//! Domains register their operations during initialization; `freeze()` ends
//! that phase. Lookups after freezing never contend with writers.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::{ErrorKind, OpError, RegistryError};
use crate::marshal::{Args, Param, Presence, Returns};

/// Capability area an operation belongs to. Each domain gets its own
/// dispatcher lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Playback,
    Playlist,
    Library,
    Settings,
    System,
    Browse,
    Sound,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Playback => "playback",
            Domain::Playlist => "playlist",
            Domain::Library => "library",
            Domain::Settings => "settings",
            Domain::System => "system",
            Domain::Browse => "browse",
            Domain::Sound => "sound",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the dispatcher runs a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Pure state read, completed on the calling turn when the lane is idle.
    Inline,
    /// May block; runs on the domain's lane inside a spawned task.
    Task,
}

pub type OpFuture = Pin<Box<dyn Future<Output = Result<Value, OpError>> + Send>>;

pub type InlineFn = dyn Fn(Args) -> Result<Value, OpError> + Send + Sync;
pub type TaskFn = dyn Fn(Args) -> OpFuture + Send + Sync;

#[derive(Clone)]
pub enum Handler {
    Inline(Arc<InlineFn>),
    Task(Arc<TaskFn>),
}

/// One host-callable operation. Immutable once registered.
pub struct Operation {
    pub name: String,
    pub domain: Domain,
    pub params: Vec<Param>,
    pub returns: Returns,
    pub failures: Vec<ErrorKind>,
    pub handler: Handler,
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("failures", &self.failures)
            .field("execution", &self.execution())
            .finish_non_exhaustive()
    }
}

impl Operation {
    /// An inline operation named `<domain>.<method>`.
    pub fn inline<F>(domain: Domain, method: &str, handler: F) -> Self
    where
        F: Fn(Args) -> Result<Value, OpError> + Send + Sync + 'static,
    {
        Self::new(domain, method, Handler::Inline(Arc::new(handler)))
    }

    /// A task operation named `<domain>.<method>`.
    pub fn task<F, Fut>(domain: Domain, method: &str, handler: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, OpError>> + Send + 'static,
    {
        let handler: Arc<TaskFn> = Arc::new(move |args| Box::pin(handler(args)) as OpFuture);
        Self::new(domain, method, Handler::Task(handler))
    }

    fn new(domain: Domain, method: &str, handler: Handler) -> Self {
        Self {
            name: format!("{domain}.{method}"),
            domain,
            params: Vec::new(),
            returns: Returns::Void,
            failures: Vec::new(),
            handler,
        }
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, returns: Returns) -> Self {
        self.returns = returns;
        self
    }

    pub fn fails(mut self, kinds: &[ErrorKind]) -> Self {
        self.failures.extend_from_slice(kinds);
        self
    }

    pub fn execution(&self) -> Execution {
        match self.handler {
            Handler::Inline(_) => Execution::Inline,
            Handler::Task(_) => Execution::Task,
        }
    }

    /// The method part of the name.
    pub fn method(&self) -> &str {
        self.name
            .split_once('.')
            .map(|(_, m)| m)
            .unwrap_or(&self.name)
    }

    /// Whether a handler may fail with `kind` without it being a bug.
    pub fn declares(&self, kind: ErrorKind) -> bool {
        kind.is_implicit() || self.failures.contains(&kind)
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidSchema {
            operation: self.name.clone(),
            reason,
        };

        let mut seen = HashSet::new();
        let mut optional_seen = false;
        for param in &self.params {
            if !seen.insert(param.name.as_str()) {
                return Err(invalid(format!("duplicate parameter `{}`", param.name)));
            }
            if param.is_required() {
                if optional_seen {
                    return Err(invalid(format!(
                        "required parameter `{}` follows an optional one",
                        param.name
                    )));
                }
            } else {
                optional_seen = true;
            }
            if let Presence::Default(default) = &param.presence {
                param.ty.check(&param.name, default).map_err(|e| {
                    invalid(format!("default of `{}` is invalid: {e}", param.name))
                })?;
            }
        }
        Ok(())
    }
}

// ─── Registry ───────────────────────────────────────────────────────────

/// Operation table keyed by `<domain>.<method>`.
#[derive(Default)]
pub struct Registry {
    ops: RwLock<HashMap<String, Arc<Operation>>>,
    frozen: AtomicBool,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("operations", &self.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, op: Operation) -> Result<(), RegistryError> {
        if self.is_frozen() {
            return Err(RegistryError::RegistryFrozen(op.name));
        }
        op.validate()?;

        let mut ops = self.ops.write().unwrap_or_else(|e| e.into_inner());
        if ops.contains_key(&op.name) {
            return Err(RegistryError::DuplicateOperation(op.name));
        }
        tracing::debug!(op = %op.name, execution = ?op.execution(), "operation registered");
        ops.insert(op.name.clone(), Arc::new(op));
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<Operation>> {
        self.ops
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Domains with at least one operation, in declaration order.
    pub fn domains(&self) -> Vec<Domain> {
        let mut domains: Vec<Domain> = self
            .ops
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|op| op.domain)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        domains.sort();
        domains
    }

    /// Registered operation names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .ops
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.ops.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────
