//! Rockbox scripting bridge
//!
//! Exposes the player to sandboxed WASM scripts as an `rb` namespace.
//! Host operations are registered per domain (playback, playlist, library,
//! settings, system, browse, sound), checked against a parameter schema,
//! and executed on one FIFO lane per domain. Scripts talk to the host in
//! turns: each turn hands a batch of calls over and gets every outcome
//! back before the next.

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod domains;
pub mod error;
pub mod marshal;
pub mod namespace;
pub mod registry;
pub mod sandbox;
pub mod script;

#[cfg(test)]
mod testing;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use dispatcher::{CallHandle, Dispatcher};
pub use error::{BridgeError, ErrorKind, OpError, RegistryError, ScriptError};
pub use marshal::{ArgType, Args, InsertPosition, Param, Returns};
pub use namespace::{Namespace, Node, Projection};
pub use registry::{Domain, Execution, Operation, Registry};
pub use sandbox::{SandboxConfig, ScriptSandbox};
pub use script::{CallOutcome, GuestCall, GuestLog, GuestStep, ScriptGuest, ScriptInit, ScriptSession};
