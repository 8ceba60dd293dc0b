//! Script sessions: the cooperative loop between a guest and the bridge.
//!
//! The guest is started with the namespace description and its input. Each
//! step it returns lists the calls it wants made; the host dispatches them
//! in order, waits for all of them and resumes the guest with the outcomes.
//! The session ends when the guest reports `done` with no calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dispatcher::CallHandle;
use crate::error::{BridgeError, OpError, ScriptError};
use crate::namespace::Projection;

/// Maximum log message length accepted from scripts.
const MAX_LOG_MESSAGE_LEN: usize = 2048;

/// Strip control characters (except newline and tab) and truncate.
pub(crate) fn sanitize_log_message(message: &str) -> String {
    let cleaned: String = message
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(MAX_LOG_MESSAGE_LEN)
        .collect();
    if message.chars().count() > MAX_LOG_MESSAGE_LEN {
        format!("{cleaned}… (truncated)")
    } else {
        cleaned
    }
}

// ─── Guest protocol ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptInit {
    pub namespace: Value,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GuestCall {
    pub id: u64,
    /// Namespace path, with or without the leading `rb.`.
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GuestLog {
    #[serde(default = "default_level")]
    pub level: String,
    pub message: String,
}

fn default_level() -> String {
    "info".into()
}

/// What the guest hands back from `start` and `resume`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GuestStep {
    pub calls: Vec<GuestCall>,
    pub logs: Vec<GuestLog>,
    pub done: bool,
    pub result: Value,
}

/// Settlement of one guest call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallOutcome {
    pub id: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ScriptError>,
}

impl CallOutcome {
    pub fn from_result(id: u64, result: Result<Value, OpError>) -> Self {
        match result {
            Ok(value) => Self {
                id,
                ok: true,
                value: Some(value),
                error: None,
            },
            Err(e) => Self {
                id,
                ok: false,
                value: None,
                error: Some(e.to_script()),
            },
        }
    }
}

/// The script side of a session. `start` and `resume` may block for as
/// long as the guest computes, so the session runs them off the async
/// workers.
pub trait ScriptGuest: Send + 'static {
    fn name(&self) -> &str;

    fn start(&mut self, init: &ScriptInit) -> Result<GuestStep, BridgeError>;

    fn resume(&mut self, outcomes: &[CallOutcome]) -> Result<GuestStep, BridgeError>;
}

// ─── Session ────────────────────────────────────────────────────────────

/// One run of one guest. Dropping the session (or the `run` future)
/// cancels calls still in flight.
pub struct ScriptSession<G: ScriptGuest> {
    /// `None` only while a step is running on the blocking pool.
    guest: Option<G>,
    name: String,
    projection: Arc<Projection>,
    max_turns: usize,
    in_flight: Vec<Uuid>,
}

impl<G: ScriptGuest> ScriptSession<G> {
    pub fn new(guest: G, projection: Arc<Projection>, max_turns: usize) -> Self {
        Self {
            name: guest.name().to_string(),
            guest: Some(guest),
            projection,
            max_turns,
            in_flight: Vec::new(),
        }
    }

    /// Drive the guest to completion and return its result.
    pub async fn run(mut self, input: Value) -> Result<Value, BridgeError> {
        let init = ScriptInit {
            namespace: self.projection.describe(),
            input,
        };
        tracing::debug!(script = %self.name, "script started");
        let mut step = self.step_guest(move |guest| guest.start(&init)).await?;

        for turn in 1..=self.max_turns {
            self.forward_logs(&step.logs);
            if step.done {
                if !step.calls.is_empty() {
                    return Err(BridgeError::Protocol(
                        "script finished with calls outstanding".into(),
                    ));
                }
                tracing::info!(script = %self.name, turns = turn, "script finished");
                return Ok(step.result);
            }
            if step.calls.is_empty() {
                return Err(BridgeError::Protocol(
                    "script made no calls and did not finish".into(),
                ));
            }

            let outcomes = self.execute(std::mem::take(&mut step.calls)).await?;
            step = self
                .step_guest(move |guest| guest.resume(&outcomes))
                .await?;
        }

        Err(BridgeError::TurnLimit {
            script: self.name.clone(),
            turns: self.max_turns,
        })
    }

    /// Run one guest step on the blocking pool and take the guest back.
    async fn step_guest<F>(&mut self, step: F) -> Result<GuestStep, BridgeError>
    where
        F: FnOnce(&mut G) -> Result<GuestStep, BridgeError> + Send + 'static,
    {
        let mut guest = self
            .guest
            .take()
            .ok_or_else(|| BridgeError::Sandbox(format!("script {} is no longer loaded", self.name)))?;
        let (guest, result) = tokio::task::spawn_blocking(move || {
            let result = step(&mut guest);
            (guest, result)
        })
        .await
        .map_err(|e| BridgeError::Sandbox(format!("script {} step failed: {e}", self.name)))?;
        self.guest = Some(guest);
        result
    }

    /// Dispatch every call in order, then wait for all of them.
    async fn execute(&mut self, calls: Vec<GuestCall>) -> Result<Vec<CallOutcome>, BridgeError> {
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = calls.iter().find(|c| !seen.insert(c.id)) {
            return Err(BridgeError::Protocol(format!("duplicate call id {}", dup.id)));
        }

        let handles: Vec<(u64, CallHandle)> = calls
            .into_iter()
            .map(|call| {
                let path = call.method.strip_prefix("rb.").unwrap_or(&call.method);
                (call.id, self.projection.call(path, call.args))
            })
            .collect();
        self.in_flight = handles.iter().map(|(_, handle)| handle.id()).collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            outcomes.push(CallOutcome::from_result(id, handle.await));
        }
        self.in_flight.clear();
        Ok(outcomes)
    }

    fn forward_logs(&self, logs: &[GuestLog]) {
        let script = &self.name;
        for log in logs {
            let msg = sanitize_log_message(&log.message);
            match log.level.as_str() {
                "trace" => tracing::trace!(script = %script, "{msg}"),
                "debug" => tracing::debug!(script = %script, "{msg}"),
                "warn" => tracing::warn!(script = %script, "{msg}"),
                "error" => tracing::error!(script = %script, "{msg}"),
                _ => tracing::info!(script = %script, "{msg}"),
            }
        }
    }
}

impl<G: ScriptGuest> Drop for ScriptSession<G> {
    fn drop(&mut self) {
        let dispatcher = self.projection.dispatcher();
        for id in self.in_flight.drain(..) {
            dispatcher.cancel(id);
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::error::ErrorKind;
    use crate::marshal::{ArgType, Param, Returns};
    use crate::namespace::Namespace;
    use crate::registry::{Domain, Operation, Registry};
    use serde_json::json;

    /// Replays a fixed list of steps and records what it was resumed with.
    struct Scripted {
        steps: Vec<GuestStep>,
        seen: Arc<std::sync::Mutex<Vec<Vec<CallOutcome>>>>,
        init: Arc<std::sync::Mutex<Option<ScriptInit>>>,
    }

    impl Scripted {
        fn new(steps: Vec<GuestStep>) -> Self {
            Self {
                steps: steps.into_iter().rev().collect(),
                seen: Arc::default(),
                init: Arc::default(),
            }
        }

        fn next(&mut self) -> Result<GuestStep, BridgeError> {
            self.steps
                .pop()
                .ok_or_else(|| BridgeError::Protocol("out of steps".into()))
        }
    }

    impl ScriptGuest for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn start(&mut self, init: &ScriptInit) -> Result<GuestStep, BridgeError> {
            *self.init.lock().unwrap() = Some(init.clone());
            self.next()
        }

        fn resume(&mut self, outcomes: &[CallOutcome]) -> Result<GuestStep, BridgeError> {
            self.seen.lock().unwrap().push(outcomes.to_vec());
            self.next()
        }
    }

    fn step(calls: Value) -> GuestStep {
        serde_json::from_value(json!({ "calls": calls })).unwrap()
    }

    fn done(result: Value) -> GuestStep {
        GuestStep {
            done: true,
            result,
            ..GuestStep::default()
        }
    }

    fn projection() -> Arc<Projection> {
        let registry = Registry::new();
        registry
            .register(
                Operation::inline(Domain::System, "echo", |args| {
                    Ok(args.get("value").cloned().unwrap_or(Value::Null))
                })
                .param(Param::required("value", ArgType::int()))
                .returns(Returns::Int),
            )
            .unwrap();
        registry
            .register(
                Operation::task(Domain::Sound, "wait", |_| async {
                    std::future::pending::<()>().await;
                    Ok(Value::Null)
                }),
            )
            .unwrap();
        let namespace = Namespace::new()
            .child(
                "system",
                Namespace::new().method("echo", "system.echo"),
            )
            .child("sound", Namespace::new().method("wait", "sound.wait"));
        let dispatcher = Dispatcher::new(Arc::new(registry));
        Arc::new(Projection::new(namespace, dispatcher).unwrap())
    }

    #[test]
    fn test_sanitize_log_message() {
        assert_eq!(sanitize_log_message("hello world"), "hello world");
        assert_eq!(sanitize_log_message("line1\nline2"), "line1\nline2");
        assert_eq!(sanitize_log_message("bad\x00\x1b[31mchars"), "bad[31mchars");
        let long = "x".repeat(3000);
        let result = sanitize_log_message(&long);
        assert!(result.len() < 3000);
        assert!(result.ends_with("… (truncated)"));
    }

    #[test]
    fn test_outcome_serialization() {
        let ok = serde_json::to_value(CallOutcome::from_result(1, Ok(Value::Null))).unwrap();
        assert_eq!(ok, json!({ "id": 1, "ok": true, "value": null }));
        let err = serde_json::to_value(CallOutcome::from_result(
            2,
            Err(OpError::argument("index", "must be an integer")),
        ))
        .unwrap();
        assert_eq!(err["ok"], false);
        assert_eq!(err["error"]["kind"], "ArgumentError");
        assert_eq!(err["error"]["parameter"], "index");
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let guest = Scripted::new(vec![
            step(json!([
                { "id": 1, "method": "rb.system.echo", "args": [7] },
                { "id": 2, "method": "system.nope" },
                { "id": 3, "method": "system.echo", "args": [] }
            ])),
            done(json!("finished")),
        ]);
        let seen = guest.seen.clone();
        let init = guest.init.clone();

        let result = ScriptSession::new(guest, projection(), 10)
            .run(json!({ "user": "x" }))
            .await
            .unwrap();
        assert_eq!(result, json!("finished"));

        let init = init.lock().unwrap().clone().unwrap();
        assert_eq!(init.input, json!({ "user": "x" }));
        assert!(init.namespace["system"]["echo"].is_object());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let outcomes = &seen[0];
        assert_eq!(outcomes.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(outcomes[0].value, Some(json!(7)));
        assert_eq!(
            outcomes[1].error.as_ref().unwrap().kind,
            ErrorKind::UnknownOperation
        );
        assert_eq!(
            outcomes[2].error.as_ref().unwrap().kind,
            ErrorKind::ArgumentError
        );
    }

    #[tokio::test]
    async fn test_protocol_violations() {
        let guest = Scripted::new(vec![GuestStep::default()]);
        let err = ScriptSession::new(guest, projection(), 10)
            .run(Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));

        let mut finished = done(Value::Null);
        finished.calls = step(json!([{ "id": 1, "method": "system.echo", "args": [1] }])).calls;
        let err = ScriptSession::new(Scripted::new(vec![finished]), projection(), 10)
            .run(Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));

        let dup = step(json!([
            { "id": 4, "method": "system.echo", "args": [1] },
            { "id": 4, "method": "system.echo", "args": [2] }
        ]));
        let err = ScriptSession::new(Scripted::new(vec![dup]), projection(), 10)
            .run(Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(ref m) if m.contains("duplicate")));
    }

    #[tokio::test]
    async fn test_turn_limit() {
        let call = || step(json!([{ "id": 1, "method": "system.echo", "args": [1] }]));
        let guest = Scripted::new(vec![call(), call(), call(), call()]);
        let err = ScriptSession::new(guest, projection(), 3)
            .run(Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::TurnLimit { turns: 3, .. }));
    }

    /// Blocks in `start` until the test opens the gate.
    struct Gated {
        gate: std::sync::mpsc::Receiver<()>,
    }

    impl ScriptGuest for Gated {
        fn name(&self) -> &str {
            "gated"
        }

        fn start(&mut self, _init: &ScriptInit) -> Result<GuestStep, BridgeError> {
            self.gate
                .recv_timeout(std::time::Duration::from_secs(5))
                .map_err(|_| BridgeError::Protocol("gate never opened".into()))?;
            Ok(done(json!("through")))
        }

        fn resume(&mut self, _outcomes: &[CallOutcome]) -> Result<GuestStep, BridgeError> {
            Err(BridgeError::Protocol("not resumable".into()))
        }
    }

    #[tokio::test]
    async fn test_blocking_guest_leaves_runtime_free() {
        // Single-threaded runtime: a guest step run inline would keep the
        // gate from ever being opened.
        let (open, gate) = std::sync::mpsc::channel();
        let run = tokio::spawn(ScriptSession::new(Gated { gate }, projection(), 10).run(Value::Null));
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let status = projection().call("system.echo", vec![json!(3)]).await.unwrap();
        assert_eq!(status, json!(3));
        open.send(()).unwrap();
        assert_eq!(run.await.unwrap().unwrap(), json!("through"));
    }

    #[tokio::test]
    async fn test_dropping_session_cancels_calls() {
        let projection = projection();
        let guest = Scripted::new(vec![step(json!([{ "id": 1, "method": "sound.wait" }]))]);
        let session = ScriptSession::new(guest, projection.clone(), 10);

        let run = tokio::spawn(session.run(Value::Null));
        for _ in 0..50 {
            if projection.dispatcher().pending_count() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(projection.dispatcher().pending_count(), 1);
        run.abort();
        let _ = run.await;
        assert_eq!(projection.dispatcher().pending_count(), 0);
    }
}
