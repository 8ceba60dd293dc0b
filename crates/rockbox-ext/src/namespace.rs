//! The script-visible `rb` namespace.
//!
//! Each domain contributes a subtree; subtrees are merged additively into one
//! root. Methods are bound to registered operation names, so projecting a
//! call is a name lookup followed by `Dispatcher::dispatch`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::dispatcher::{CallHandle, Dispatcher};
use crate::error::{OpError, RegistryError};
use crate::marshal::{InsertPosition, Presence};
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Namespace(Namespace),
    /// Bound to the named operation.
    Method(String),
    Constant(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespace {
    entries: BTreeMap<String, Node>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, name: &str, op: &str) -> Self {
        self.entries
            .insert(name.to_string(), Node::Method(op.to_string()));
        self
    }

    pub fn constant(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.entries
            .insert(name.to_string(), Node::Constant(value.into()));
        self
    }

    pub fn child(mut self, name: &str, namespace: Namespace) -> Self {
        self.entries
            .insert(name.to_string(), Node::Namespace(namespace));
        self
    }

    /// Wrap this namespace as the single child `name` of a new root.
    pub fn under(self, name: &str) -> Namespace {
        Namespace::new().child(name, self)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `other` into `self`.
    ///
    /// Binding the same method to the same operation twice is a no-op; any
    /// other overlap fails with `NamespaceConflict` and leaves `self` as it was.
    pub fn merge(&mut self, other: Namespace) -> Result<(), RegistryError> {
        let mut merged = self.clone();
        merged.merge_at("rb", other)?;
        *self = merged;
        Ok(())
    }

    fn merge_at(&mut self, path: &str, other: Namespace) -> Result<(), RegistryError> {
        for (name, node) in other.entries {
            let child_path = format!("{path}.{name}");
            match (self.entries.get_mut(&name), node) {
                (None, node) => {
                    self.entries.insert(name, node);
                }
                (Some(Node::Namespace(mine)), Node::Namespace(theirs)) => {
                    mine.merge_at(&child_path, theirs)?;
                }
                (Some(Node::Method(mine)), Node::Method(theirs)) if *mine == theirs => {}
                (Some(Node::Constant(mine)), Node::Constant(theirs)) if *mine == theirs => {}
                _ => return Err(RegistryError::NamespaceConflict(child_path)),
            }
        }
        Ok(())
    }

    /// Look up a dotted path such as `playlist.insertTracks`.
    pub fn get(&self, path: &str) -> Option<&Node> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut node = self.entries.get(first)?;
        for segment in segments {
            match node {
                Node::Namespace(ns) => node = ns.entries.get(segment)?,
                _ => return None,
            }
        }
        Some(node)
    }

    fn bindings(&self, prefix: &str, out: &mut Vec<(String, String)>) {
        for (name, node) in &self.entries {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            match node {
                Node::Namespace(ns) => ns.bindings(&path, out),
                Node::Method(op) => out.push((path, op.clone())),
                Node::Constant(_) => {}
            }
        }
    }
}

// ─── Projection ─────────────────────────────────────────────────────────

/// The merged namespace bound to a dispatcher.
#[derive(Debug, Clone)]
pub struct Projection {
    root: Arc<Namespace>,
    dispatcher: Dispatcher,
}

impl Projection {
    /// Check that every method names a registered operation.
    pub fn new(root: Namespace, dispatcher: Dispatcher) -> Result<Self, RegistryError> {
        let mut bindings = Vec::new();
        root.bindings("", &mut bindings);
        for (path, operation) in bindings {
            if dispatcher.registry().resolve(&operation).is_none() {
                return Err(RegistryError::UnknownBinding { path, operation });
            }
        }
        Ok(Self {
            root: Arc::new(root),
            dispatcher,
        })
    }

    pub fn root(&self) -> &Namespace {
        &self.root
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Call the method at `path`. Paths that do not name a projected
    /// method settle with `UnknownOperation`, even when the registry holds
    /// an operation by that name.
    pub fn call(&self, path: &str, args: Vec<Value>) -> CallHandle {
        match self.root.get(path) {
            Some(Node::Method(op)) => self.dispatcher.dispatch(op, args),
            _ => CallHandle::settled(Err(OpError::UnknownOperation(path.to_string()))),
        }
    }

    /// JSON description of the namespace handed to the guest.
    pub fn describe(&self) -> Value {
        describe_namespace(&self.root, self.dispatcher.registry())
    }

    /// TypeScript declarations for the namespace.
    pub fn typescript(&self) -> String {
        let registry = self.dispatcher.registry();
        let mut out = String::new();
        let mut records = Vec::new();
        let mut interfaces = Vec::new();

        collect_interfaces("Rb", &self.root, registry, &mut interfaces, &mut records);

        let _ = writeln!(out, "// Generated declarations for the `rb` namespace.\n");
        let names: Vec<String> = InsertPosition::SENTINELS
            .iter()
            .map(|(_, short, _)| format!("\"{short}\""))
            .collect();
        let _ = writeln!(out, "declare type InsertPositionName = {};\n", names.join(" | "));
        records.sort_unstable();
        for record in records {
            let _ = writeln!(out, "declare type {record} = {{ [key: string]: unknown }};");
        }
        out.push('\n');
        for interface in interfaces {
            out.push_str(&interface);
            out.push('\n');
        }
        out.push_str("declare const rb: Rb;\n");
        out
    }
}

fn describe_namespace(ns: &Namespace, registry: &Registry) -> Value {
    let mut map = Map::new();
    for (name, node) in ns.entries() {
        let value = match node {
            Node::Namespace(child) => describe_namespace(child, registry),
            Node::Constant(value) => json!({ "const": value }),
            Node::Method(op_name) => match registry.resolve(op_name) {
                Some(op) => {
                    let params: Vec<Value> = op
                        .params
                        .iter()
                        .map(|p| {
                            let mut param = json!({
                                "name": p.name,
                                "type": p.ty.ts(),
                                "required": p.is_required(),
                            });
                            if let Presence::Default(default) = &p.presence {
                                param["default"] = default.clone();
                            }
                            param
                        })
                        .collect();
                    json!({
                        "op": op.name,
                        "params": params,
                        "returns": op.returns.ts(),
                    })
                }
                None => json!({ "op": op_name }),
            },
        };
        map.insert(name.clone(), value);
    }
    Value::Object(map)
}

fn pascal(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn collect_interfaces(
    interface: &str,
    ns: &Namespace,
    registry: &Registry,
    out: &mut Vec<String>,
    records: &mut Vec<&'static str>,
) {
    let mut body = String::new();
    for (name, node) in ns.entries() {
        match node {
            Node::Namespace(child) => {
                let child_interface = format!("{interface}{}", pascal(name));
                let child_interface = child_interface.strip_prefix("Rb").unwrap_or(&child_interface);
                let _ = writeln!(body, "  {name}: {child_interface};");
                collect_interfaces(child_interface, child, registry, out, records);
            }
            Node::Constant(value) => {
                let _ = writeln!(body, "  readonly {name}: {value};");
            }
            Node::Method(op_name) => {
                let Some(op) = registry.resolve(op_name) else {
                    continue;
                };
                op.returns.records(records);
                let params: Vec<String> = op
                    .params
                    .iter()
                    .map(|p| {
                        let optional = if p.is_required() { "" } else { "?" };
                        format!("{}{optional}: {}", p.name, p.ty.ts())
                    })
                    .collect();
                let _ = writeln!(
                    body,
                    "  {name}({}): Promise<{}>;",
                    params.join(", "),
                    op.returns.ts()
                );
            }
        }
    }
    out.push(format!("declare interface {interface} {{\n{body}}}\n"));
}

// ─── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::{ArgType, Param, Returns};
    use crate::registry::{Domain, Operation};

    fn playback_ns() -> Namespace {
        Namespace::new()
            .method("pause", "playback.pause")
            .method("status", "playback.status")
            .under("playback")
    }

    fn dispatcher() -> Dispatcher {
        let registry = Arc::new(Registry::new());
        registry
            .register(Operation::inline(Domain::Playback, "pause", |_| Ok(Value::Null)))
            .unwrap();
        registry
            .register(
                Operation::inline(Domain::Playback, "status", |_| Ok(json!(3)))
                    .returns(Returns::Int),
            )
            .unwrap();
        registry
            .register(
                Operation::inline(Domain::Playlist, "insertTracks", |_| Ok(json!(0)))
                    .param(Param::required("position", ArgType::InsertPosition))
                    .param(Param::required("tracks", ArgType::list(ArgType::Path)))
                    .returns(Returns::Int),
            )
            .unwrap();
        Dispatcher::new(registry)
    }

    #[test]
    fn test_merge_is_additive() {
        let mut root = Namespace::new();
        root.merge(playback_ns()).unwrap();
        root.merge(
            Namespace::new()
                .method("insertTracks", "playlist.insertTracks")
                .constant("PLAYLIST_PREPEND", -1)
                .under("playlist"),
        )
        .unwrap();
        assert!(matches!(root.get("playback.pause"), Some(Node::Method(_))));
        assert!(matches!(
            root.get("playlist.PLAYLIST_PREPEND"),
            Some(Node::Constant(_))
        ));
    }

    #[test]
    fn test_merge_same_binding_is_idempotent() {
        let mut root = Namespace::new();
        root.merge(playback_ns()).unwrap();
        root.merge(playback_ns()).unwrap();
        assert_eq!(root, {
            let mut once = Namespace::new();
            once.merge(playback_ns()).unwrap();
            once
        });
    }

    #[test]
    fn test_merge_conflict_leaves_root_untouched() {
        let mut root = Namespace::new();
        root.merge(playback_ns()).unwrap();
        let before = root.clone();

        let clash = Namespace::new()
            .method("resume", "playback.resume")
            .method("pause", "playback.stop")
            .under("playback");
        let err = root.merge(clash).unwrap_err();
        assert_eq!(err, RegistryError::NamespaceConflict("rb.playback.pause".into()));
        assert_eq!(root, before);

        let shape_clash = Namespace::new().method("playback", "playback.pause");
        assert!(root.merge(shape_clash).is_err());
    }

    #[tokio::test]
    async fn test_projection_rejects_unknown_binding() {
        let ns = Namespace::new().method("warp", "playback.warp").under("playback");
        let err = Projection::new(ns, dispatcher()).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownBinding { .. }));
    }

    #[tokio::test]
    async fn test_projection_call() {
        let projection = Projection::new(playback_ns(), dispatcher()).unwrap();
        assert_eq!(projection.call("playback.status", vec![]).await, Ok(json!(3)));
        assert_eq!(
            projection.call("playback.nothing", vec![]).await,
            Err(OpError::UnknownOperation("playback.nothing".into()))
        );
        // A namespace is not callable.
        assert!(projection.call("playback", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_projection_hides_unprojected_operations() {
        let ns = playback_ns().constant("VERSION", 1);
        let projection = Projection::new(ns, dispatcher()).unwrap();

        let handle = projection.call("playlist.insertTracks", vec![json!(-3), json!(["a.mp3"])]);
        assert_eq!(
            handle.await,
            Err(OpError::UnknownOperation("playlist.insertTracks".into()))
        );
        assert_eq!(
            projection.call("VERSION", vec![]).await,
            Err(OpError::UnknownOperation("VERSION".into()))
        );
        assert_eq!(projection.dispatcher().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_describe() {
        let ns = Namespace::new()
            .method("insertTracks", "playlist.insertTracks")
            .constant("PLAYLIST_INSERT_LAST", -3)
            .under("playlist");
        let projection = Projection::new(ns, dispatcher()).unwrap();
        let desc = projection.describe();
        assert_eq!(desc["playlist"]["insertTracks"]["op"], "playlist.insertTracks");
        assert_eq!(desc["playlist"]["insertTracks"]["params"][1]["type"], "string[]");
        assert_eq!(desc["playlist"]["PLAYLIST_INSERT_LAST"]["const"], -3);
    }

    #[tokio::test]
    async fn test_typescript() {
        let mut root = playback_ns();
        root.merge(
            Namespace::new()
                .method("insertTracks", "playlist.insertTracks")
                .under("playlist"),
        )
        .unwrap();
        let projection = Projection::new(root, dispatcher()).unwrap();
        let ts = projection.typescript();
        assert!(ts.contains("declare interface Playback {"));
        assert!(ts.contains("  status(): Promise<number>;"));
        assert!(ts.contains(
            "  insertTracks(position: number | InsertPositionName, tracks: string[]): Promise<number>;"
        ));
        assert!(ts.contains("  playback: Playback;"));
        assert!(ts.contains("declare const rb: Rb;"));
    }
}
