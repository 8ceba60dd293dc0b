//! Global status counters and version information.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::domains::browse::BrowseDomain;
use crate::domains::playlist::PlaylistDomain;
use crate::domains::sound::SoundDomain;
use crate::error::RegistryError;
use crate::marshal::{to_script, Returns};
use crate::namespace::Namespace;
use crate::registry::{Domain, Operation, Registry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub resume_index: i64,
    pub resume_elapsed: u64,
    pub resume_offset: u64,
    /// Seconds since the bridge started.
    pub runtime: u64,
    /// Longest runtime seen.
    pub topruntime: u64,
    /// Directory entries held in the browse cache.
    pub dircache_size: usize,
    /// No screens are tracked; always -1.
    pub last_screen: i32,
    pub viewer_icon_count: u32,
    /// Seconds since the Unix epoch, 0 if the volume never changed.
    pub last_volume_change: u64,
}

pub struct SystemDomain {
    version: String,
    started: Instant,
    top_runtime: AtomicU64,
    playlist: Arc<PlaylistDomain>,
    browse: Arc<BrowseDomain>,
    sound: Arc<SoundDomain>,
}

impl SystemDomain {
    pub fn new(
        version: impl Into<String>,
        playlist: Arc<PlaylistDomain>,
        browse: Arc<BrowseDomain>,
        sound: Arc<SoundDomain>,
    ) -> Self {
        Self {
            version: version.into(),
            started: Instant::now(),
            top_runtime: AtomicU64::new(0),
            playlist,
            browse,
            sound,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub async fn status(&self) -> SystemStatus {
        let runtime = self.started.elapsed().as_secs();
        let topruntime = self.top_runtime.fetch_max(runtime, Ordering::AcqRel).max(runtime);
        let resume = self.playlist.lock().await.resume;
        SystemStatus {
            resume_index: resume.index,
            resume_elapsed: resume.elapsed,
            resume_offset: resume.offset,
            runtime,
            topruntime,
            dircache_size: self.browse.cached_entries(),
            last_screen: -1,
            viewer_icon_count: 0,
            last_volume_change: self.sound.last_volume_change(),
        }
    }
}

/// Register `system.*` and return its namespace.
pub fn register(registry: &Registry, system: Arc<SystemDomain>) -> Result<Namespace, RegistryError> {
    let domain = system.clone();
    registry.register(
        Operation::task(Domain::System, "getGlobalStatus", move |_| {
            let system = domain.clone();
            async move { to_script(&system.status().await) }
        })
        .returns(Returns::Record("SystemStatus")),
    )?;

    registry.register(
        Operation::inline(Domain::System, "getRockboxVersion", move |_| {
            Ok(Value::from(system.version()))
        })
        .returns(Returns::Str),
    )?;

    Ok(Namespace::new()
        .method("getGlobalStatus", "system.getGlobalStatus")
        .method("getRockboxVersion", "system.getRockboxVersion")
        .under("system"))
}
