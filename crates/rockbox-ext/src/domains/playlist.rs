//! The dynamic playlist: ordered track references plus cursor and resume
//! bookmark, persisted to a JSON control file on `sync`.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rockbox_audio::{is_audio_file, is_playlist_extension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use crate::domains::browse::{list_dir, LibraryRoot};
use crate::domains::playback::PlaybackDomain;
use crate::domains::settings::SettingsDomain;
use crate::domains::write_atomic;
use crate::error::{ErrorKind, OpError, RegistryError};
use crate::marshal::{to_script, ArgType, Args, InsertPosition, Param, Returns};
use crate::namespace::Namespace;
use crate::registry::{Domain, Operation, Registry};

/// Where playback picks up after a restart. `index` is -1 when unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeInfo {
    pub index: i64,
    pub elapsed: u64,
    pub offset: u64,
}

impl Default for ResumeInfo {
    fn default() -> Self {
        Self {
            index: -1,
            elapsed: 0,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistTrackInfo {
    pub filename: String,
    pub attr: u32,
    pub index: usize,
    pub display_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistInfo {
    pub name: Option<String>,
    pub amount: usize,
    pub index: i64,
    pub first_index: usize,
    pub display_index: usize,
    pub last_insert_pos: i64,
    pub seed: u64,
    pub modified: bool,
    pub tracks: Vec<String>,
}

// ─── Playlist ───────────────────────────────────────────────────────────

/// Playlist state. Track entries are `/`-separated paths relative to the
/// library root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Playlist {
    pub name: Option<String>,
    pub tracks: Vec<String>,
    /// Cursor; `None` exactly when `tracks` is empty.
    pub index: Option<usize>,
    pub first_index: usize,
    pub last_insert_pos: Option<usize>,
    pub seed: u64,
    pub modified: bool,
    pub resume: ResumeInfo,
}

impl Playlist {
    pub fn amount(&self) -> usize {
        self.tracks.len()
    }

    /// 1-based position counted from `first_index`; 0 when empty.
    pub fn display_index(&self) -> usize {
        self.display_index_of(self.index)
    }

    fn display_index_of(&self, index: Option<usize>) -> usize {
        match index {
            Some(i) if !self.tracks.is_empty() => {
                let len = self.tracks.len();
                (i + len - self.first_index % len) % len + 1
            }
            _ => 0,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.index
            .and_then(|i| self.tracks.get(i))
            .map(String::as_str)
    }

    pub fn track_info(&self, index: usize) -> Option<PlaylistTrackInfo> {
        self.tracks.get(index).map(|filename| PlaylistTrackInfo {
            filename: filename.clone(),
            attr: 0,
            index,
            display_index: self.display_index_of(Some(index)),
        })
    }

    /// Index `delta` steps from the cursor, wrapping when `wrap` is set.
    pub fn peek(&self, delta: i64, wrap: bool) -> Option<usize> {
        let current = self.index? as i64;
        let len = self.tracks.len() as i64;
        let target = current + delta;
        if wrap {
            Some(target.rem_euclid(len) as usize)
        } else if (0..len).contains(&target) {
            Some(target as usize)
        } else {
            None
        }
    }

    pub fn info(&self) -> PlaylistInfo {
        PlaylistInfo {
            name: self.name.clone(),
            amount: self.tracks.len(),
            index: self.index.map(|i| i as i64).unwrap_or(-1),
            first_index: self.first_index,
            display_index: self.display_index(),
            last_insert_pos: self.last_insert_pos.map(|i| i as i64).unwrap_or(-1),
            seed: self.seed,
            modified: self.modified,
            tracks: self.tracks.clone(),
        }
    }

    /// Insert `tracks` at `position`; returns the index of the first
    /// inserted track (the lowest one for shuffled insertion).
    pub fn insert<R: Rng + ?Sized>(
        &mut self,
        position: InsertPosition,
        tracks: Vec<String>,
        rng: &mut R,
    ) -> Result<usize, OpError> {
        let len = self.tracks.len();
        let after_current = self.index.map(|c| c + 1).unwrap_or(0);

        let first = match position {
            InsertPosition::Replace => {
                self.index = if tracks.is_empty() { None } else { Some(0) };
                self.tracks = tracks;
                self.first_index = 0;
                self.last_insert_pos = None;
                self.modified = true;
                return Ok(0);
            }
            InsertPosition::At(at) if at > len => {
                return Err(OpError::argument(
                    "position",
                    format!("index {at} is past the end of a {len}-track playlist"),
                ))
            }
            InsertPosition::At(at) => self.splice_at(at, tracks),
            InsertPosition::Prepend => self.splice_at(0, tracks),
            InsertPosition::First => self.splice_at(after_current, tracks),
            InsertPosition::Insert => {
                let at = self
                    .last_insert_pos
                    .map(|p| p + 1)
                    .unwrap_or(after_current)
                    .min(len);
                self.splice_at(at, tracks)
            }
            InsertPosition::Last => self.splice_at(len, tracks),
            InsertPosition::LastShuffled => {
                let mut tracks = tracks;
                tracks.shuffle(rng);
                self.splice_at(len, tracks)
            }
            InsertPosition::Shuffled => {
                let was_empty = self.tracks.is_empty();
                let mut lowest = self.tracks.len();
                for track in tracks {
                    let at = rng.random_range(after_current..=self.tracks.len());
                    self.tracks.insert(at, track);
                    lowest = lowest.min(at);
                    self.last_insert_pos = Some(at);
                }
                if was_empty && !self.tracks.is_empty() {
                    self.index = Some(0);
                }
                lowest
            }
        };
        self.modified = true;
        Ok(first)
    }

    fn splice_at(&mut self, at: usize, tracks: Vec<String>) -> usize {
        let count = tracks.len();
        if count == 0 {
            return at;
        }
        self.tracks.splice(at..at, tracks);
        self.index = match self.index {
            Some(c) if at <= c => Some(c + count),
            Some(c) => Some(c),
            None => Some(0),
        };
        self.last_insert_pos = Some(at + count - 1);
        at
    }

    /// Remove the tracks at `positions`. All positions are checked before
    /// anything changes. Returns the new cursor.
    pub fn remove(&mut self, positions: &[usize]) -> Result<Option<usize>, OpError> {
        let len = self.tracks.len();
        let doomed: BTreeSet<usize> = positions.iter().copied().collect();
        if let Some(&bad) = doomed.iter().find(|&&p| p >= len) {
            return Err(OpError::argument(
                "positions",
                format!("index {bad} is out of range for a {len}-track playlist"),
            ));
        }
        if doomed.is_empty() {
            return Ok(self.index);
        }

        let shift = |i: usize| doomed.range(..i).count();
        let index = self.index.map(|c| c - shift(c));
        let first_index = self.first_index - shift(self.first_index.min(len));

        let mut position = 0;
        self.tracks.retain(|_| {
            let keep = !doomed.contains(&position);
            position += 1;
            keep
        });

        let remaining = self.tracks.len();
        self.index = match index {
            _ if remaining == 0 => None,
            Some(c) => Some(c.min(remaining - 1)),
            None => None,
        };
        self.first_index = if remaining == 0 {
            0
        } else {
            first_index.min(remaining - 1)
        };
        self.last_insert_pos = None;
        self.modified = true;
        Ok(self.index)
    }

    pub fn remove_all(&mut self) {
        self.tracks.clear();
        self.index = None;
        self.first_index = 0;
        self.last_insert_pos = None;
        self.modified = true;
    }

    /// Shuffle with `seed`, moving the track at `start` (default: the
    /// current one) to the front and the cursor onto it.
    pub fn shuffle(&mut self, start: Option<usize>, seed: u64) -> Result<(), OpError> {
        let len = self.tracks.len();
        if len == 0 {
            self.seed = seed;
            return Ok(());
        }
        let start = start.or(self.index).unwrap_or(0);
        if start >= len {
            return Err(OpError::argument(
                "startIndex",
                format!("index {start} is out of range for a {len}-track playlist"),
            ));
        }

        let head = self.tracks.remove(start);
        let mut rng = StdRng::seed_from_u64(seed);
        self.tracks.shuffle(&mut rng);
        self.tracks.insert(0, head);

        self.index = Some(0);
        self.first_index = 0;
        self.last_insert_pos = None;
        self.seed = seed;
        self.modified = true;
        Ok(())
    }
}

// ─── Path handling ──────────────────────────────────────────────────────

/// Resolve `.` and `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

/// Audio files under `dir`: files first, then subdirectories when `recurse`.
fn collect_tracks(root: &LibraryRoot, dir: &Path, recurse: bool, seen: &mut HashSet<PathBuf>) -> Vec<String> {
    let canonical = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    if !canonical.starts_with(root.path()) || !seen.insert(canonical) {
        return Vec::new();
    }
    let entries = match list_dir(root, dir, false) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), "skipping unreadable directory: {e}");
            return Vec::new();
        }
    };

    let mut tracks: Vec<String> = entries
        .iter()
        .filter(|e| !e.is_dir() && is_audio_file(Path::new(&e.name)))
        .map(|e| e.name.clone())
        .collect();
    if recurse {
        for entry in entries.iter().filter(|e| e.is_dir()) {
            tracks.extend(collect_tracks(root, &root.path().join(&entry.name), true, seen));
        }
    }
    tracks
}

// ─── Domain ─────────────────────────────────────────────────────────────

pub struct PlaylistDomain {
    root: LibraryRoot,
    control_file: PathBuf,
    settings: Arc<SettingsDomain>,
    state: Mutex<Playlist>,
}

impl PlaylistDomain {
    pub fn new(root: LibraryRoot, control_file: impl Into<PathBuf>, settings: Arc<SettingsDomain>) -> Self {
        Self {
            root,
            control_file: control_file.into(),
            settings,
            state: Mutex::new(Playlist::default()),
        }
    }

    pub fn root(&self) -> &LibraryRoot {
        &self.root
    }

    pub fn control_file(&self) -> &Path {
        &self.control_file
    }

    /// Lock the playlist. Callers holding the playback lock take it first.
    pub async fn lock(&self) -> MutexGuard<'_, Playlist> {
        self.state.lock().await
    }

    pub async fn snapshot(&self) -> Playlist {
        self.state.lock().await.clone()
    }

    /// Whether `next` past the last track wraps around.
    pub async fn repeat_all(&self) -> bool {
        self.settings.snapshot().await.repeat_mode == 1
    }

    /// Check a script-supplied track path and return it relative to the root.
    /// A leading `/` means the library root, as in `browse.getEntries`.
    pub fn normalize_track(&self, parameter: &str, raw: &str) -> Result<String, OpError> {
        if raw.contains('\0') {
            return Err(OpError::argument(parameter, "path contains a NUL byte"));
        }
        let relative = self
            .root
            .relative(raw)
            .map_err(|_| OpError::argument(parameter, "path must not contain `..`"))?;
        if relative.as_os_str().is_empty() {
            return Err(OpError::argument(parameter, "path is empty"));
        }
        Ok(self.root.display_name(&relative))
    }

    fn normalize_tracks(&self, tracks: Vec<String>) -> Result<Vec<String>, OpError> {
        tracks
            .iter()
            .enumerate()
            .map(|(i, t)| self.normalize_track(&format!("tracks[{i}]"), t))
            .collect()
    }

    pub async fn insert_tracks(&self, position: InsertPosition, tracks: Vec<String>) -> Result<usize, OpError> {
        let tracks = self.normalize_tracks(tracks)?;
        let mut playlist = self.state.lock().await;
        let count = tracks.len();
        let first = playlist.insert(position, tracks, &mut rand::rng())?;
        tracing::debug!(position = position.code(), count, first, "tracks inserted");
        Ok(first)
    }

    pub async fn insert_directory(
        &self,
        position: InsertPosition,
        directory: &str,
        recurse: bool,
    ) -> Result<usize, OpError> {
        let dir = self.root.resolve(directory)?;
        if !tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(OpError::NotADirectory(directory.to_string()));
        }

        let root = self.root.clone();
        let tracks = tokio::task::spawn_blocking(move || collect_tracks(&root, &dir, recurse, &mut HashSet::new()))
            .await
            .map_err(|e| OpError::Internal(format!("directory scan aborted: {e}")))?;

        let mut playlist = self.state.lock().await;
        playlist.insert(position, tracks, &mut rand::rng())
    }

    /// Insert the entries of an m3u playlist file. Entries that leave the
    /// library root or are not audio files are skipped.
    pub async fn insert_playlist(&self, position: InsertPosition, filename: &str) -> Result<usize, OpError> {
        let file = self.root.resolve(filename)?;
        let is_playlist = file
            .extension()
            .and_then(|e| e.to_str())
            .map(is_playlist_extension)
            .unwrap_or(false);
        if !is_playlist {
            return Err(OpError::argument("filename", "not an m3u playlist"));
        }
        let contents = tokio::fs::read_to_string(&file)
            .await
            .map_err(|_| OpError::PathNotFound(filename.to_string()))?;
        let base = file.parent().unwrap_or(self.root.path()).to_path_buf();

        let mut tracks = Vec::new();
        for line in contents.lines() {
            let line = line.trim_start_matches('\u{feff}').trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.replace('\\', "/");
            let candidate = if Path::new(&line).is_absolute() {
                PathBuf::from(&line)
            } else {
                base.join(&line)
            };
            let candidate = lexical_normalize(&candidate);
            if !candidate.starts_with(self.root.path()) || !is_audio_file(&candidate) {
                tracing::warn!(playlist = %filename, entry = %line, "skipping playlist entry");
                continue;
            }
            tracks.push(self.root.display_name(&candidate));
        }

        let mut playlist = self.state.lock().await;
        playlist.insert(position, tracks, &mut rand::rng())
    }

    pub async fn remove_tracks(&self, positions: &[usize]) -> Result<i64, OpError> {
        let mut playlist = self.state.lock().await;
        let index = playlist.remove(positions)?;
        Ok(index.map(|i| i as i64).unwrap_or(-1))
    }

    pub async fn remove_all(&self) {
        self.state.lock().await.remove_all();
    }

    pub async fn shuffle(&self, start: Option<usize>) -> Result<(), OpError> {
        let seed = rand::rng().random::<u64>();
        self.state.lock().await.shuffle(start, seed)
    }

    pub async fn create(&self, name: &str, tracks: Vec<String>) -> Result<(), OpError> {
        let tracks = self.normalize_tracks(tracks)?;
        let mut playlist = self.state.lock().await;
        let resume = playlist.resume;
        *playlist = Playlist {
            name: Some(name.to_string()),
            index: if tracks.is_empty() { None } else { Some(0) },
            tracks,
            modified: true,
            resume,
            ..Playlist::default()
        };
        Ok(())
    }

    /// Write the control file.
    pub async fn sync(&self) -> Result<(), OpError> {
        let playlist = self.state.lock().await;
        let contents = serde_json::to_vec_pretty(&*playlist).map_err(|e| {
            tracing::error!("failed to encode playlist: {e}");
            OpError::Storage("playlist could not be encoded".into())
        })?;
        write_atomic(&self.control_file, contents).await?;
        tracing::debug!(path = %self.control_file.display(), tracks = playlist.amount(), "playlist synced");
        Ok(())
    }

    /// Restore the playlist from the control file. Returns whether anything
    /// was restored.
    pub async fn restore(&self) -> Result<bool, OpError> {
        let contents = match tokio::fs::read(&self.control_file).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                tracing::error!(path = %self.control_file.display(), "failed to read playlist: {e}");
                return Err(OpError::Storage("playlist control file unreadable".into()));
            }
        };
        let mut saved: Playlist = serde_json::from_slice(&contents).map_err(|e| {
            tracing::error!(path = %self.control_file.display(), "corrupt playlist control file: {e}");
            OpError::Storage("playlist control file is corrupt".into())
        })?;
        if saved.tracks.is_empty() {
            return Ok(false);
        }

        let len = saved.tracks.len();
        saved.index = Some(saved.index.unwrap_or(0).min(len - 1));
        saved.first_index = saved.first_index.min(len - 1);
        if saved.resume.index >= len as i64 {
            saved.resume = ResumeInfo::default();
        }
        *self.state.lock().await = saved;
        Ok(true)
    }

    /// Erasing would lose unsaved changes and the user asked to be warned.
    pub async fn warn_on_erase(&self) -> bool {
        let warn = self.settings.snapshot().await.warnon_erase_dynplaylist;
        let playlist = self.state.lock().await;
        warn && playlist.modified && !playlist.tracks.is_empty()
    }
}

// ─── Registration ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct InsertTracksArgs {
    position: InsertPosition,
    tracks: Vec<String>,
}

#[derive(Deserialize)]
struct InsertDirectoryArgs {
    position: InsertPosition,
    directory: String,
    recurse: bool,
}

#[derive(Deserialize)]
struct InsertPlaylistArgs {
    position: InsertPosition,
    filename: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartArgs {
    index: usize,
    elapsed_ms: u64,
    offset_bytes: u64,
}

#[derive(Deserialize)]
struct CreateArgs {
    name: String,
    tracks: Vec<String>,
}

fn op<F, Fut>(playlist: &Arc<PlaylistDomain>, method: &str, handler: F) -> Operation
where
    F: Fn(Arc<PlaylistDomain>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, OpError>> + Send + 'static,
{
    let playlist = playlist.clone();
    Operation::task(Domain::Playlist, method, move |args| handler(playlist.clone(), args))
}

fn optional_index(args: &Args, name: &str) -> Option<usize> {
    args.get(name).and_then(Value::as_u64).map(|i| i as usize)
}

/// Register `playlist.*` and return its namespace. `start` and
/// `resumeTrack` hand over to `playback`.
pub fn register(
    registry: &Registry,
    playlist: Arc<PlaylistDomain>,
    playback: Arc<PlaybackDomain>,
) -> Result<Namespace, RegistryError> {
    let pl = &playlist;

    registry.register(
        op(pl, "getCurrent", |pl, _| async move { to_script(&pl.lock().await.info()) })
            .returns(Returns::Record("PlaylistInfo")),
    )?;
    registry.register(
        op(pl, "getResumeInfo", |pl, _| async move { to_script(&pl.lock().await.resume) })
            .returns(Returns::Record("ResumeInfo")),
    )?;
    registry.register(
        op(pl, "getTrackInfo", |pl, args| async move {
            let playlist = pl.lock().await;
            let info = optional_index(&args, "index")
                .or(playlist.index)
                .and_then(|i| playlist.track_info(i));
            to_script(&info)
        })
        .param(Param::optional("index", ArgType::non_negative()))
        .returns(Returns::nullable(Returns::Record("PlaylistTrackInfo"))),
    )?;
    registry.register(
        op(pl, "getFirstIndex", |pl, _| async move {
            Ok(Value::from(pl.lock().await.first_index))
        })
        .returns(Returns::Int),
    )?;
    registry.register(
        op(pl, "getDisplayIndex", |pl, _| async move {
            Ok(Value::from(pl.lock().await.display_index()))
        })
        .returns(Returns::Int),
    )?;
    registry.register(
        op(pl, "amount", |pl, _| async move { Ok(Value::from(pl.lock().await.amount())) })
            .returns(Returns::Int),
    )?;

    registry.register(
        op(pl, "insertTracks", |pl, args| async move {
            let InsertTracksArgs { position, tracks } = args.parse()?;
            Ok(Value::from(pl.insert_tracks(position, tracks).await?))
        })
        .param(Param::required("position", ArgType::InsertPosition))
        .param(Param::required("tracks", ArgType::list(ArgType::Path)))
        .returns(Returns::Int),
    )?;
    registry.register(
        op(pl, "insertDirectory", |pl, args| async move {
            let InsertDirectoryArgs {
                position,
                directory,
                recurse,
            } = args.parse()?;
            Ok(Value::from(
                pl.insert_directory(position, &directory, recurse).await?,
            ))
        })
        .param(Param::required("position", ArgType::InsertPosition))
        .param(Param::required("directory", ArgType::Path))
        .param(Param::with_default("recurse", ArgType::Bool, false))
        .returns(Returns::Int)
        .fails(&[ErrorKind::PathNotFound, ErrorKind::NotADirectory]),
    )?;
    registry.register(
        op(pl, "insertPlaylist", |pl, args| async move {
            let InsertPlaylistArgs { position, filename } = args.parse()?;
            Ok(Value::from(pl.insert_playlist(position, &filename).await?))
        })
        .param(Param::required("position", ArgType::InsertPosition))
        .param(Param::required("filename", ArgType::Path))
        .returns(Returns::Int)
        .fails(&[ErrorKind::PathNotFound]),
    )?;

    registry.register(
        op(pl, "removeAllTracks", |pl, _| async move {
            pl.remove_all().await;
            Ok(Value::from(0))
        })
        .returns(Returns::Int),
    )?;
    registry.register(
        op(pl, "removeTracks", |pl, args| async move {
            #[derive(Deserialize)]
            struct RemoveArgs {
                positions: Vec<usize>,
            }
            let RemoveArgs { positions } = args.parse()?;
            Ok(Value::from(pl.remove_tracks(&positions).await?))
        })
        .param(Param::required("positions", ArgType::list(ArgType::non_negative())))
        .returns(Returns::Int),
    )?;
    registry.register(
        op(pl, "shufflePlaylist", |pl, args| async move {
            pl.shuffle(optional_index(&args, "startIndex")).await?;
            Ok(Value::Null)
        })
        .param(Param::optional("startIndex", ArgType::non_negative())),
    )?;

    let pb = playback.clone();
    registry.register(
        op(pl, "start", move |_, args| {
            let playback = pb.clone();
            async move {
                let StartArgs {
                    index,
                    elapsed_ms,
                    offset_bytes,
                } = args.parse()?;
                playback.start_at(index, elapsed_ms, offset_bytes).await?;
                Ok(Value::Null)
            }
        })
        .param(Param::with_default("index", ArgType::non_negative(), 0))
        .param(Param::with_default("elapsedMs", ArgType::non_negative(), 0))
        .param(Param::with_default("offsetBytes", ArgType::non_negative(), 0))
        .fails(&[ErrorKind::InvalidStateTransition]),
    )?;

    registry.register(
        op(pl, "createPlaylist", |pl, args| async move {
            let CreateArgs { name, tracks } = args.parse()?;
            pl.create(&name, tracks).await?;
            Ok(Value::from(0))
        })
        .param(Param::required("name", ArgType::non_empty_string()))
        .param(Param::with_default(
            "tracks",
            ArgType::list(ArgType::Path),
            Value::Array(Vec::new()),
        ))
        .returns(Returns::Int),
    )?;
    registry.register(
        op(pl, "sync", |pl, _| async move {
            pl.sync().await?;
            Ok(Value::Null)
        })
        .fails(&[ErrorKind::StorageError]),
    )?;
    registry.register(
        op(pl, "setModified", |pl, args| async move {
            let modified = args.get("modified").and_then(Value::as_bool).unwrap_or(true);
            pl.lock().await.modified = modified;
            Ok(Value::Null)
        })
        .param(Param::with_default("modified", ArgType::Bool, true)),
    )?;
    registry.register(
        op(pl, "playlistResume", |pl, _| async move {
            let restored = pl.restore().await?;
            Ok(Value::from(if restored { 0 } else { -1 }))
        })
        .returns(Returns::Int)
        .fails(&[ErrorKind::StorageError]),
    )?;

    let pb = playback;
    registry.register(
        op(pl, "resumeTrack", move |_, _| {
            let playback = pb.clone();
            async move {
                playback.resume_from_bookmark().await?;
                Ok(Value::Null)
            }
        })
        .fails(&[ErrorKind::InvalidStateTransition]),
    )?;
    registry.register(
        op(pl, "warnOnPlaylistErase", |pl, _| async move {
            Ok(Value::from(pl.warn_on_erase().await))
        })
        .returns(Returns::Bool),
    )?;

    let mut namespace = Namespace::new();
    for method in [
        "getCurrent",
        "getResumeInfo",
        "getTrackInfo",
        "getFirstIndex",
        "getDisplayIndex",
        "amount",
        "insertTracks",
        "insertDirectory",
        "insertPlaylist",
        "removeAllTracks",
        "removeTracks",
        "shufflePlaylist",
        "start",
        "createPlaylist",
        "sync",
        "setModified",
        "playlistResume",
        "resumeTrack",
        "warnOnPlaylistErase",
    ] {
        namespace = namespace.method(method, &format!("playlist.{method}"));
    }
    for (name, _, code) in InsertPosition::SENTINELS {
        namespace = namespace.constant(name, code);
    }
    Ok(namespace.under("playlist"))
}

// ─── Tests ──────────────────────────────────────────────────────────────
