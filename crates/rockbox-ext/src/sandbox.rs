//! WASM script guests run under Extism (wasmtime).
//!
//! A script is a module exporting `start` and `resume`, both JSON in and
//! JSON out; see [`crate::script`] for the exchange. Memory is capped for
//! the module's lifetime and fuel is refilled on every export call, so a
//! script that loops forever fails the turn it loops in.

use std::path::Path;
use std::time::Instant;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::BridgeError;
use crate::script::{CallOutcome, GuestStep, ScriptGuest, ScriptInit};

const REQUIRED_EXPORTS: [&str; 2] = ["start", "resume"];

const WASM_PAGE_BYTES: u32 = 64 * 1024;
const DEFAULT_MEMORY_LIMIT_MB: u32 = 32;
const DEFAULT_FUEL_LIMIT: u64 = 1_000_000;

// ─── Configuration ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    pub memory_limit_mb: u32,
    /// Fuel granted to each `start`/`resume` call.
    pub fuel_limit: u64,
    /// Off by default: scripts get no env vars, filesystem or stdio.
    pub wasi_enabled: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            fuel_limit: DEFAULT_FUEL_LIMIT,
            wasi_enabled: false,
        }
    }
}

impl SandboxConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from `SCRIPT_MEMORY_LIMIT_MB`, `SCRIPT_FUEL_LIMIT` and
    /// `SCRIPT_WASI_ENABLED` as returned by `lookup`. Unparsable values
    /// fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            memory_limit_mb: lookup("SCRIPT_MEMORY_LIMIT_MB")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.memory_limit_mb),
            fuel_limit: lookup("SCRIPT_FUEL_LIMIT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.fuel_limit),
            wasi_enabled: lookup("SCRIPT_WASI_ENABLED")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
        }
    }

    /// The memory cap in 64 KiB WASM pages.
    pub fn memory_pages(&self) -> u32 {
        self.memory_limit_mb.saturating_mul(1024 * 1024) / WASM_PAGE_BYTES
    }
}

/// Map an Extism failure to the bridge error naming where it happened.
fn classify_failure(script: &str, export: &str, turn: usize, message: &str) -> BridgeError {
    let at = format!("{script} ({export}, turn {turn})");
    let lower = message.to_ascii_lowercase();
    if lower.contains("fuel") {
        BridgeError::FuelExhausted(at)
    } else if lower.contains("memory") {
        BridgeError::MemoryExceeded(at)
    } else {
        BridgeError::Sandbox(format!("{at}: {message}"))
    }
}

// ─── Guest ──────────────────────────────────────────────────────────────

/// A loaded script module.
pub struct ScriptSandbox {
    plugin: extism::Plugin,
    name: String,
    /// Export calls made so far; `start` is turn 0.
    turns: usize,
}

impl std::fmt::Debug for ScriptSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptSandbox")
            .field("name", &self.name)
            .field("turns", &self.turns)
            .finish_non_exhaustive()
    }
}

impl ScriptSandbox {
    /// Load a module from disk. The script is named after the file stem.
    pub fn load(wasm_path: &Path, config: SandboxConfig) -> Result<Self, BridgeError> {
        let wasm_bytes = std::fs::read(wasm_path)?;
        let name = wasm_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".into());
        Self::from_bytes(wasm_bytes, config, &name)
    }

    pub fn from_bytes(wasm_bytes: Vec<u8>, config: SandboxConfig, name: &str) -> Result<Self, BridgeError> {
        if config.wasi_enabled {
            tracing::warn!(script = %name, "WASI enabled; the script can read environment variables");
        }
        let manifest = extism::Manifest::new([extism::Wasm::data(wasm_bytes)])
            .with_memory_max(config.memory_pages());
        let plugin = extism::PluginBuilder::new(manifest)
            .with_wasi(config.wasi_enabled)
            .with_fuel_limit(config.fuel_limit)
            .build()
            .map_err(|e| BridgeError::Sandbox(format!("script {name} failed to load: {e}")))?;

        if let Some(missing) = REQUIRED_EXPORTS.iter().find(|e| !plugin.function_exists(**e)) {
            return Err(BridgeError::Protocol(format!(
                "script {name} does not export `{missing}`"
            )));
        }
        tracing::debug!(script = %name, memory_mb = config.memory_limit_mb, fuel = config.fuel_limit, "script loaded");

        Ok(Self {
            plugin,
            name: name.to_string(),
            turns: 0,
        })
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Call `export` with `input` as JSON and decode its JSON reply.
    fn exchange<I: Serialize + ?Sized, O: DeserializeOwned>(
        &mut self,
        export: &str,
        input: &I,
    ) -> Result<O, BridgeError> {
        let turn = self.turns;
        self.turns += 1;

        let payload = serde_json::to_vec(input)?;
        let started = Instant::now();
        let reply = self
            .plugin
            .call::<&[u8], Vec<u8>>(export, payload.as_slice())
            .map_err(|e| classify_failure(&self.name, export, turn, &e.to_string()));
        tracing::debug!(
            script = %self.name,
            export,
            turn,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = reply.is_ok(),
            "guest step"
        );

        serde_json::from_slice(&reply?).map_err(|e| {
            BridgeError::Protocol(format!(
                "script {} returned malformed JSON from {export} (turn {turn}): {e}",
                self.name
            ))
        })
    }
}

impl ScriptGuest for ScriptSandbox {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, init: &ScriptInit) -> Result<GuestStep, BridgeError> {
        self.exchange("start", init)
    }

    fn resume(&mut self, outcomes: &[CallOutcome]) -> Result<GuestStep, BridgeError> {
        self.exchange("resume", outcomes)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────
