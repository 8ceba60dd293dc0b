//! Filesystem browsing under the library root.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rockbox_audio::{is_audio_extension, is_playlist_extension};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, OpError, RegistryError};
use crate::marshal::{to_script, ArgType, Args, Param, Returns};
use crate::namespace::Namespace;
use crate::registry::{Domain, Operation, Registry};

/// Attribute bit marking a directory entry.
pub const ATTR_DIRECTORY: u32 = 0x10;

/// One directory entry as scripts see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Path relative to the library root, `/`-separated.
    pub name: String,
    pub attr: u32,
    /// Last write, seconds since the Unix epoch.
    pub time_write: u64,
    pub customaction: i32,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.attr & ATTR_DIRECTORY != 0
    }
}

// ─── Library root ───────────────────────────────────────────────────────

/// The directory scripts are confined to.
#[derive(Debug, Clone)]
pub struct LibraryRoot {
    root: PathBuf,
}

impl LibraryRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Lexically normalize a script path into components below the root.
    ///
    /// Leading `/` is ignored; `..` anywhere is refused.
    pub fn relative(&self, path: &str) -> Result<PathBuf, OpError> {
        let input = Path::new(path);
        let input = if self.root.is_absolute() {
            input.strip_prefix(&self.root).unwrap_or(input)
        } else {
            input
        };
        let mut out = PathBuf::new();
        for component in input.components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(OpError::PathNotFound(path.to_string()))
                }
            }
        }
        Ok(out)
    }

    /// Resolve a script path to an existing filesystem path inside the root.
    ///
    /// Symlinks are followed; anything resolving outside the root is
    /// reported as missing.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, OpError> {
        let joined = self.root.join(self.relative(path)?);
        let resolved = std::fs::canonicalize(&joined)
            .map_err(|_| OpError::PathNotFound(path.to_string()))?;
        if !resolved.starts_with(&self.root) {
            tracing::warn!(path = %path, "path resolves outside the library root");
            return Err(OpError::PathNotFound(path.to_string()));
        }
        Ok(resolved)
    }

    /// `/`-separated name of `path` relative to the root.
    pub fn display_name(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Immediate children of `dir`: directories plus audio and playlist files,
/// directories first, names compared case-insensitively.
pub fn list_dir(root: &LibraryRoot, dir: &Path, show_hidden: bool) -> std::io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for item in std::fs::read_dir(dir)? {
        let item = item?;
        let file_name = item.file_name().to_string_lossy().into_owned();
        if !show_hidden && file_name.starts_with('.') {
            continue;
        }
        // Follows symlinks; dangling links are skipped.
        let Ok(meta) = std::fs::metadata(item.path()) else {
            continue;
        };

        let attr = if meta.is_dir() {
            ATTR_DIRECTORY
        } else {
            let ext = Path::new(&file_name)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");
            if !is_audio_extension(ext) && !is_playlist_extension(ext) {
                continue;
            }
            0
        };

        entries.push(Entry {
            name: root.display_name(&item.path()),
            attr,
            time_write: meta.modified().map(unix_secs).unwrap_or(0),
            customaction: 0,
        });
    }

    entries.sort_by(|a, b| {
        b.is_dir()
            .cmp(&a.is_dir())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    Ok(entries)
}

// ─── Domain ─────────────────────────────────────────────────────────────

/// Directories whose listings are kept by default.
pub const LISTING_CACHE_CAPACITY: usize = 64;

type ListingKey = (PathBuf, bool);

struct CachedListing {
    modified: SystemTime,
    entries: Arc<Vec<Entry>>,
    last_used: u64,
}

/// Listings keyed by directory and hidden-file flag, evicted least
/// recently used first.
#[derive(Default)]
struct ListingCache {
    listings: HashMap<ListingKey, CachedListing>,
    clock: u64,
}

impl ListingCache {
    /// The cached listing if the directory has not changed since. A stale
    /// listing is dropped.
    fn get(&mut self, key: &ListingKey, modified: SystemTime) -> Option<Arc<Vec<Entry>>> {
        let fresh = self.listings.get(key).map(|c| c.modified == modified)?;
        if !fresh {
            self.listings.remove(key);
            return None;
        }
        self.clock += 1;
        let cached = self.listings.get_mut(key)?;
        cached.last_used = self.clock;
        Some(cached.entries.clone())
    }

    fn insert(&mut self, key: ListingKey, modified: SystemTime, entries: Arc<Vec<Entry>>, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.listings.len() >= capacity && !self.listings.contains_key(&key) {
            let Some(oldest) = self
                .listings
                .iter()
                .min_by_key(|(_, c)| c.last_used)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            self.listings.remove(&oldest);
        }
        self.clock += 1;
        self.listings.insert(
            key,
            CachedListing {
                modified,
                entries,
                last_used: self.clock,
            },
        );
    }
}

/// Directory listings with a bounded per-directory cache keyed by
/// modification time.
pub struct BrowseDomain {
    root: LibraryRoot,
    capacity: usize,
    cache: Mutex<ListingCache>,
}

impl BrowseDomain {
    pub fn new(root: LibraryRoot) -> Self {
        Self::with_cache_capacity(root, LISTING_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(root: LibraryRoot, capacity: usize) -> Self {
        Self {
            root,
            capacity,
            cache: Mutex::new(ListingCache::default()),
        }
    }

    pub fn root(&self) -> &LibraryRoot {
        &self.root
    }

    /// Children of the directory at `path`. Blocking.
    pub fn entries(&self, path: &str, show_hidden: bool) -> Result<Arc<Vec<Entry>>, OpError> {
        let dir = self.root.resolve(path)?;
        let meta = std::fs::metadata(&dir).map_err(|_| OpError::PathNotFound(path.to_string()))?;
        if !meta.is_dir() {
            return Err(OpError::NotADirectory(path.to_string()));
        }
        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        let key = (dir.clone(), show_hidden);

        if let Some(entries) = self.lock_cache().get(&key, modified) {
            return Ok(entries);
        }

        let entries = Arc::new(list_dir(&self.root, &dir, show_hidden).map_err(|e| {
            tracing::warn!(path = %path, "failed to list directory: {e}");
            OpError::PathNotFound(path.to_string())
        })?);
        self.lock_cache()
            .insert(key, modified, entries.clone(), self.capacity);
        Ok(entries)
    }

    /// Number of entries held in the listing cache.
    pub fn cached_entries(&self) -> usize {
        self.lock_cache()
            .listings
            .values()
            .map(|c| c.entries.len())
            .sum()
    }

    /// Number of directories held in the listing cache.
    pub fn cached_dirs(&self) -> usize {
        self.lock_cache().listings.len()
    }

    pub fn clear_cache(&self) {
        self.lock_cache().listings.clear();
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ListingCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetEntriesArgs {
    path: String,
    show_hidden: bool,
}

/// Register `browse.*` and return its namespace.
pub fn register(registry: &Registry, browse: Arc<BrowseDomain>) -> Result<Namespace, RegistryError> {
    registry.register(
        Operation::task(Domain::Browse, "getEntries", move |args: Args| {
            let browse = browse.clone();
            async move {
                let GetEntriesArgs { path, show_hidden } = args.parse()?;
                let entries = tokio::task::spawn_blocking(move || browse.entries(&path, show_hidden))
                    .await
                    .map_err(|e| OpError::Internal(format!("directory listing aborted: {e}")))??;
                to_script(entries.as_ref())
            }
        })
        .param(Param::with_default("path", ArgType::Path, ""))
        .param(Param::with_default("showHidden", ArgType::Bool, false))
        .returns(Returns::list(Returns::Record("Entry")))
        .fails(&[ErrorKind::PathNotFound, ErrorKind::NotADirectory]),
    )?;

    Ok(Namespace::new()
        .method("getEntries", "browse.getEntries")
        .under("browse"))
}

// ─── Tests ──────────────────────────────────────────────────────────────
