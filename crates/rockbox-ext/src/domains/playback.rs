//! Playback state machine driving the audio engine from the playlist cursor.
//!
//! Lock order: the playback state first, then the playlist.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use rockbox_audio::{read_track_metadata, AudioEngine, TrackMetadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domains::playlist::{Playlist, PlaylistDomain, ResumeInfo};
use crate::error::{ErrorKind, OpError, RegistryError};
use crate::marshal::{to_script, ArgType, Args, Param, Returns};
use crate::namespace::Namespace;
use crate::registry::{Domain, Operation, Registry};

/// Engine status codes as scripts see them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlaybackStatus {
    Stopped = 0,
    Playing = 1,
    /// Playing with the pause bit set.
    Paused = 3,
}

impl PlaybackStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Playing,
            3 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// The loaded track: tag metadata plus where it sits and how far it got.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayingTrack {
    #[serde(flatten)]
    pub metadata: TrackMetadata,
    pub path: String,
    /// Playlist position, -1 once the track has been removed from the playlist.
    pub index: i64,
    pub elapsed: u64,
    pub offset: u64,
}

/// The track handed to the engine. Its playlist position is not kept here:
/// the playlist cursor follows it through inserts and removals.
#[derive(Debug, Clone)]
struct Loaded {
    path: String,
}

#[derive(Default)]
struct PlaybackState {
    loaded: Option<Loaded>,
    metadata: HashMap<String, TrackMetadata>,
}

pub struct PlaybackDomain {
    engine: Arc<dyn AudioEngine>,
    playlist: Arc<PlaylistDomain>,
    /// Mirror of the state machine for lock-free `status` reads.
    status: AtomicU8,
    state: Mutex<PlaybackState>,
}

impl PlaybackDomain {
    pub fn new(engine: Arc<dyn AudioEngine>, playlist: Arc<PlaylistDomain>) -> Self {
        Self {
            engine,
            playlist,
            status: AtomicU8::new(PlaybackStatus::Stopped.code()),
            state: Mutex::new(PlaybackState::default()),
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus::from_code(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: PlaybackStatus) {
        self.status.store(status.code(), Ordering::Release);
    }

    async fn load(
        &self,
        state: &mut PlaybackState,
        playlist: &Playlist,
        index: usize,
        elapsed: u64,
        offset: u64,
    ) -> Result<(), OpError> {
        let path = playlist
            .tracks
            .get(index)
            .cloned()
            .ok_or_else(|| OpError::InvalidStateTransition(format!("no track at index {index}")))?;
        let full = self.playlist.root().path().join(&path);
        self.engine.play(&full, elapsed, offset).await?;
        tracing::debug!(track = %path, index, elapsed, offset, "track started");
        state.loaded = Some(Loaded { path });
        self.set_status(PlaybackStatus::Playing);
        Ok(())
    }

    /// Save the engine position as the playlist's resume bookmark.
    async fn record_resume(&self, state: &PlaybackState) {
        if state.loaded.is_none() {
            return;
        }
        let position = match self.engine.position().await {
            Ok(position) => position,
            Err(e) => {
                tracing::warn!("could not record resume position: {e}");
                return;
            }
        };
        let mut playlist = self.playlist.lock().await;
        let Some(index) = playlist.index else {
            return;
        };
        playlist.resume = ResumeInfo {
            index: index as i64,
            elapsed: position.elapsed,
            offset: position.offset,
        };
    }

    pub async fn play(&self, elapsed: u64, offset: u64) -> Result<(), OpError> {
        let mut state = self.state.lock().await;
        let playlist = self.playlist.lock().await;
        let index = playlist
            .index
            .ok_or_else(|| OpError::InvalidStateTransition("playlist is empty".into()))?;
        self.load(&mut state, &playlist, index, elapsed, offset).await
    }

    pub async fn pause(&self) -> Result<(), OpError> {
        let state = self.state.lock().await;
        if self.status() != PlaybackStatus::Playing {
            return Ok(());
        }
        self.engine.pause().await?;
        self.set_status(PlaybackStatus::Paused);
        self.record_resume(&state).await;
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), OpError> {
        let _state = self.state.lock().await;
        match self.status() {
            PlaybackStatus::Playing => Ok(()),
            PlaybackStatus::Stopped => Err(OpError::InvalidStateTransition(
                "cannot resume while stopped".into(),
            )),
            PlaybackStatus::Paused => {
                self.engine.resume().await?;
                self.set_status(PlaybackStatus::Playing);
                Ok(())
            }
        }
    }

    /// Move the cursor by `delta`. Playing continues on the new track and
    /// Paused loads it paused; Stopped only moves the cursor.
    pub async fn step(&self, delta: i64) -> Result<(), OpError> {
        let wrap = self.playlist.repeat_all().await;
        let mut state = self.state.lock().await;
        let mut playlist = self.playlist.lock().await;
        if playlist.index.is_none() {
            return Ok(());
        }

        let target = match playlist.peek(delta, wrap) {
            Some(target) => target,
            None if delta < 0 => 0,
            None => {
                if self.status() != PlaybackStatus::Stopped {
                    self.engine.stop().await?;
                    self.set_status(PlaybackStatus::Stopped);
                    state.loaded = None;
                    tracing::debug!("end of playlist");
                }
                return Ok(());
            }
        };
        playlist.index = Some(target);

        match self.status() {
            PlaybackStatus::Stopped => {}
            PlaybackStatus::Playing => self.load(&mut state, &playlist, target, 0, 0).await?,
            PlaybackStatus::Paused => {
                self.load(&mut state, &playlist, target, 0, 0).await?;
                self.engine.pause().await?;
                self.set_status(PlaybackStatus::Paused);
            }
        }
        Ok(())
    }

    pub async fn fast_forward_rewind(&self, new_time: u64) -> Result<(), OpError> {
        let _state = self.state.lock().await;
        if self.status() == PlaybackStatus::Stopped {
            return Err(OpError::InvalidStateTransition("nothing is playing".into()));
        }
        self.engine.seek(new_time).await?;
        Ok(())
    }

    async fn metadata(&self, state: &mut PlaybackState, path: &str) -> TrackMetadata {
        if let Some(cached) = state.metadata.get(path) {
            return cached.clone();
        }
        let full = self.playlist.root().path().join(path);
        let metadata = match tokio::task::spawn_blocking({
            let full = full.clone();
            move || read_track_metadata(&full)
        })
        .await
        {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => {
                tracing::debug!(track = %path, "no readable tags: {e}");
                TrackMetadata::untagged(&full)
            }
            Err(e) => {
                tracing::warn!(track = %path, "metadata task failed: {e}");
                TrackMetadata::untagged(&full)
            }
        };
        state.metadata.insert(path.to_string(), metadata.clone());
        metadata
    }

    pub async fn current_track(&self) -> Result<Option<PlayingTrack>, OpError> {
        let mut state = self.state.lock().await;
        if self.status() == PlaybackStatus::Stopped {
            return Ok(None);
        }
        let Some(loaded) = state.loaded.clone() else {
            return Ok(None);
        };
        let index = {
            let playlist = self.playlist.lock().await;
            match playlist.index {
                Some(i) if playlist.tracks.get(i) == Some(&loaded.path) => i as i64,
                _ => -1,
            }
        };
        let position = self.engine.position().await?;
        let metadata = self.metadata(&mut state, &loaded.path).await;
        Ok(Some(PlayingTrack {
            metadata,
            path: loaded.path,
            index,
            elapsed: position.elapsed,
            offset: position.offset,
        }))
    }

    pub async fn next_track(&self) -> Result<Option<PlayingTrack>, OpError> {
        let wrap = self.playlist.repeat_all().await;
        let mut state = self.state.lock().await;
        let next = {
            let playlist = self.playlist.lock().await;
            playlist
                .peek(1, wrap)
                .and_then(|i| playlist.tracks.get(i).map(|p| (i, p.clone())))
        };
        let Some((index, path)) = next else {
            return Ok(None);
        };
        let metadata = self.metadata(&mut state, &path).await;
        Ok(Some(PlayingTrack {
            metadata,
            path,
            index: index as i64,
            elapsed: 0,
            offset: 0,
        }))
    }

    pub async fn file_position(&self) -> Result<u64, OpError> {
        let _state = self.state.lock().await;
        if self.status() == PlaybackStatus::Stopped {
            return Ok(0);
        }
        Ok(self.engine.position().await?.offset)
    }

    pub async fn hard_stop(&self) -> Result<(), OpError> {
        let mut state = self.state.lock().await;
        if self.status() != PlaybackStatus::Stopped {
            self.record_resume(&state).await;
        }
        self.engine.stop().await?;
        self.set_status(PlaybackStatus::Stopped);
        state.loaded = None;
        Ok(())
    }

    pub async fn flush_and_reload_tracks(&self) -> Result<(), OpError> {
        let mut state = self.state.lock().await;
        state.metadata.clear();
        self.engine.flush_and_reload_tracks().await?;
        Ok(())
    }

    /// Move the cursor to `index` and play from the given position.
    pub async fn start_at(&self, index: usize, elapsed: u64, offset: u64) -> Result<(), OpError> {
        let mut state = self.state.lock().await;
        let mut playlist = self.playlist.lock().await;
        let len = playlist.amount();
        if len == 0 {
            return Err(OpError::InvalidStateTransition("playlist is empty".into()));
        }
        if index >= len {
            return Err(OpError::argument(
                "index",
                format!("index {index} is out of range for a {len}-track playlist"),
            ));
        }
        playlist.index = Some(index);
        self.load(&mut state, &playlist, index, elapsed, offset).await
    }

    /// Play from the playlist's resume bookmark.
    pub async fn resume_from_bookmark(&self) -> Result<(), OpError> {
        let mut state = self.state.lock().await;
        let mut playlist = self.playlist.lock().await;
        let ResumeInfo {
            index,
            elapsed,
            offset,
        } = playlist.resume;
        if index < 0 || index as usize >= playlist.amount() {
            return Err(OpError::InvalidStateTransition("no resume bookmark".into()));
        }
        let index = index as usize;
        playlist.index = Some(index);
        self.load(&mut state, &playlist, index, elapsed, offset).await
    }
}

// ─── Registration ───────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayArgs {
    elapsed_ms: u64,
    offset_bytes: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeekArgs {
    new_time_ms: u64,
}

fn op<F, Fut>(playback: &Arc<PlaybackDomain>, method: &str, handler: F) -> Operation
where
    F: Fn(Arc<PlaybackDomain>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, OpError>> + Send + 'static,
{
    let playback = playback.clone();
    Operation::task(Domain::Playback, method, move |args| handler(playback.clone(), args))
}

const TRANSITION: &[ErrorKind] = &[ErrorKind::InvalidStateTransition];

/// Register `playback.*` and return its namespace.
pub fn register(registry: &Registry, playback: Arc<PlaybackDomain>) -> Result<Namespace, RegistryError> {
    let pb = &playback;

    registry.register(
        op(pb, "play", |pb, args| async move {
            let PlayArgs {
                elapsed_ms,
                offset_bytes,
            } = args.parse()?;
            pb.play(elapsed_ms, offset_bytes).await?;
            Ok(Value::Null)
        })
        .param(Param::with_default("elapsedMs", ArgType::non_negative(), 0))
        .param(Param::with_default("offsetBytes", ArgType::non_negative(), 0))
        .fails(TRANSITION),
    )?;
    registry.register(op(pb, "pause", |pb, _| async move {
        pb.pause().await?;
        Ok(Value::Null)
    }))?;
    registry.register(
        op(pb, "resume", |pb, _| async move {
            pb.resume().await?;
            Ok(Value::Null)
        })
        .fails(TRANSITION),
    )?;
    registry.register(op(pb, "next", |pb, _| async move {
        pb.step(1).await?;
        Ok(Value::Null)
    }))?;
    registry.register(op(pb, "previous", |pb, _| async move {
        pb.step(-1).await?;
        Ok(Value::Null)
    }))?;
    registry.register(
        op(pb, "fastForwardRewind", |pb, args| async move {
            let SeekArgs { new_time_ms } = args.parse()?;
            pb.fast_forward_rewind(new_time_ms).await?;
            Ok(Value::Null)
        })
        .param(Param::required("newTimeMs", ArgType::non_negative()))
        .fails(TRANSITION),
    )?;

    let status = playback.clone();
    registry.register(
        Operation::inline(Domain::Playback, "status", move |_| {
            Ok(Value::from(status.status().code()))
        })
        .returns(Returns::Int),
    )?;

    registry.register(
        op(pb, "currentTrack", |pb, _| async move { to_script(&pb.current_track().await?) })
            .returns(Returns::nullable(Returns::Record("PlayingTrack"))),
    )?;
    registry.register(
        op(pb, "nextTrack", |pb, _| async move { to_script(&pb.next_track().await?) })
            .returns(Returns::nullable(Returns::Record("PlayingTrack"))),
    )?;
    registry.register(
        op(pb, "getFilePosition", |pb, _| async move {
            Ok(Value::from(pb.file_position().await?))
        })
        .returns(Returns::Int),
    )?;
    registry.register(op(pb, "hardStop", |pb, _| async move {
        pb.hard_stop().await?;
        Ok(Value::Null)
    }))?;
    registry.register(op(pb, "flushAndReloadTracks", |pb, _| async move {
        pb.flush_and_reload_tracks().await?;
        Ok(Value::Null)
    }))?;

    let mut namespace = Namespace::new();
    for method in [
        "play",
        "pause",
        "resume",
        "next",
        "previous",
        "fastForwardRewind",
        "status",
        "currentTrack",
        "nextTrack",
        "getFilePosition",
        "hardStop",
        "flushAndReloadTracks",
    ] {
        namespace = namespace.method(method, &format!("playback.{method}"));
    }
    Ok(namespace
        .constant("STOPPED", PlaybackStatus::Stopped.code())
        .constant("PLAYING", PlaybackStatus::Playing.code())
        .constant("PAUSED", PlaybackStatus::Paused.code())
        .under("playback"))
}

// ─── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::browse::LibraryRoot;
    use crate::domains::settings::{SettingsDomain, UserSettings};
    use crate::marshal::InsertPosition;
    use crate::testing::FakeEngine;
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        engine: Arc<FakeEngine>,
        settings: Arc<SettingsDomain>,
        playlist: Arc<PlaylistDomain>,
        playback: PlaybackDomain,
    }

    async fn fixture(tracks: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Music");
        std::fs::create_dir_all(&root).unwrap();
        for track in tracks {
            std::fs::write(root.join(track), b"not really audio").unwrap();
        }
        let engine = Arc::new(FakeEngine::default());
        let settings = Arc::new(
            SettingsDomain::load(dir.path().join("settings.toml"), UserSettings::default(), engine.clone())
                .await
                .unwrap(),
        );
        let playlist = Arc::new(PlaylistDomain::new(
            LibraryRoot::new(&root),
            dir.path().join("playlist.json"),
            settings.clone(),
        ));
        playlist
            .insert_tracks(
                InsertPosition::Last,
                tracks.iter().map(|t| t.to_string()).collect(),
            )
            .await
            .unwrap();
        let playback = PlaybackDomain::new(engine.clone(), playlist.clone());
        Fixture {
            _dir: dir,
            engine,
            settings,
            playlist,
            playback,
        }
    }

    fn last_play(engine: &FakeEngine) -> String {
        engine
            .commands()
            .into_iter()
            .filter(|c| c.starts_with("play "))
            .last()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_play_empty_playlist() {
        let f = fixture(&[]).await;
        let err = f.playback.play(0, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(f.playback.status(), PlaybackStatus::Stopped);
    }

    #[tokio::test]
    async fn test_play_pause_resume() {
        let f = fixture(&["a.mp3", "b.mp3"]).await;
        f.playback.play(1500, 0).await.unwrap();
        assert_eq!(f.playback.status(), PlaybackStatus::Playing);
        assert!(last_play(&f.engine).ends_with("a.mp3 1500 0"));

        f.playback.pause().await.unwrap();
        f.playback.pause().await.unwrap();
        assert_eq!(f.playback.status(), PlaybackStatus::Paused);
        assert_eq!(
            f.engine.commands().iter().filter(|c| *c == "pause").count(),
            1
        );
        assert_eq!(f.playlist.snapshot().await.resume.index, 0);
        assert_eq!(f.playlist.snapshot().await.resume.elapsed, 1500);

        f.playback.resume().await.unwrap();
        assert_eq!(f.playback.status(), PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn test_resume_and_seek_when_stopped() {
        let f = fixture(&["a.mp3"]).await;
        f.playback.pause().await.unwrap();
        assert_eq!(f.playback.status(), PlaybackStatus::Stopped);
        assert_eq!(
            f.playback.resume().await.unwrap_err().kind(),
            ErrorKind::InvalidStateTransition
        );
        assert_eq!(
            f.playback.fast_forward_rewind(10).await.unwrap_err().kind(),
            ErrorKind::InvalidStateTransition
        );
        assert_eq!(f.playback.file_position().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_next_past_end_stops() {
        let f = fixture(&["a.mp3", "b.mp3"]).await;
        f.playback.play(0, 0).await.unwrap();
        f.playback.step(1).await.unwrap();
        assert!(last_play(&f.engine).ends_with("b.mp3 0 0"));
        f.playback.step(1).await.unwrap();
        assert_eq!(f.playback.status(), PlaybackStatus::Stopped);
        assert_eq!(f.playlist.snapshot().await.index, Some(1));
        assert_eq!(f.engine.commands().last().unwrap(), "stop");
    }

    #[tokio::test]
    async fn test_previous_at_start_and_stopped_moves_cursor() {
        let f = fixture(&["a.mp3", "b.mp3"]).await;
        f.playback.step(-1).await.unwrap();
        assert_eq!(f.playlist.snapshot().await.index, Some(0));
        f.playback.step(1).await.unwrap();
        assert_eq!(f.playlist.snapshot().await.index, Some(1));
        assert!(f.engine.commands().is_empty());
    }

    #[tokio::test]
    async fn test_next_while_paused_stays_paused() {
        let f = fixture(&["a.mp3", "b.mp3"]).await;
        f.playback.play(0, 0).await.unwrap();
        f.playback.pause().await.unwrap();
        f.playback.step(1).await.unwrap();
        assert_eq!(f.playback.status(), PlaybackStatus::Paused);
        assert!(last_play(&f.engine).ends_with("b.mp3 0 0"));
        assert_eq!(f.engine.commands().last().unwrap(), "pause");
    }

    #[tokio::test]
    async fn test_repeat_all_wraps() {
        let f = fixture(&["a.mp3", "b.mp3"]).await;
        f.settings
            .save(json!({ "repeat_mode": 1 }).as_object().unwrap().clone())
            .await
            .unwrap();
        f.playback.start_at(1, 0, 0).await.unwrap();
        f.playback.step(1).await.unwrap();
        assert_eq!(f.playback.status(), PlaybackStatus::Playing);
        assert!(last_play(&f.engine).ends_with("a.mp3 0 0"));
    }

    #[tokio::test]
    async fn test_current_and_next_track() {
        let f = fixture(&["a.mp3", "b.mp3"]).await;
        assert_eq!(f.playback.current_track().await.unwrap(), None);

        f.playback.play(0, 0).await.unwrap();
        f.engine.set_position(2000, 8192);
        let current = f.playback.current_track().await.unwrap().unwrap();
        assert_eq!(current.path, "a.mp3");
        assert_eq!(current.metadata.title, "a");
        assert_eq!(current.elapsed, 2000);
        assert_eq!(current.offset, 8192);
        assert_eq!(f.playback.file_position().await.unwrap(), 8192);

        let next = f.playback.next_track().await.unwrap().unwrap();
        assert_eq!((next.index, next.path.as_str()), (1, "b.mp3"));

        let value = to_script(&current).unwrap();
        assert_eq!(value["title"], "a");
        assert_eq!(value["index"], 0);
    }

    #[tokio::test]
    async fn test_hard_stop_and_resume_bookmark() {
        let f = fixture(&["a.mp3", "b.mp3"]).await;
        f.playback.start_at(1, 0, 0).await.unwrap();
        f.engine.set_position(42_000, 1_000_000);
        f.playback.hard_stop().await.unwrap();
        assert_eq!(f.playback.status(), PlaybackStatus::Stopped);
        assert_eq!(
            f.playlist.snapshot().await.resume,
            ResumeInfo {
                index: 1,
                elapsed: 42_000,
                offset: 1_000_000
            }
        );

        f.playlist.lock().await.index = Some(0);
        f.playback.resume_from_bookmark().await.unwrap();
        assert!(last_play(&f.engine).ends_with("b.mp3 42000 1000000"));
        assert_eq!(f.playlist.snapshot().await.index, Some(1));

        f.playback.hard_stop().await.unwrap();
        f.playback.hard_stop().await.unwrap();
        assert_eq!(f.engine.commands().iter().filter(|c| *c == "stop").count(), 3);
    }

    #[tokio::test]
    async fn test_playlist_edits_follow_loaded_track() {
        let f = fixture(&["a.mp3", "b.mp3", "c.mp3"]).await;
        f.playback.start_at(1, 0, 0).await.unwrap();

        f.playlist.remove_tracks(&[0]).await.unwrap();
        let current = f.playback.current_track().await.unwrap().unwrap();
        assert_eq!((current.index, current.path.as_str()), (0, "b.mp3"));

        f.playlist
            .insert_tracks(InsertPosition::Prepend, vec!["c.mp3".into()])
            .await
            .unwrap();
        let current = f.playback.current_track().await.unwrap().unwrap();
        assert_eq!(current.index, 1);

        f.engine.set_position(3_000, 4_096);
        f.playback.pause().await.unwrap();
        let saved = f.playlist.snapshot().await;
        assert_eq!(saved.resume.index, 1);
        assert_eq!(saved.tracks[1], "b.mp3");

        f.playback.hard_stop().await.unwrap();
        f.playback.resume_from_bookmark().await.unwrap();
        assert!(last_play(&f.engine).ends_with("b.mp3 3000 4096"));
    }

    #[tokio::test]
    async fn test_removed_track_has_no_index() {
        let f = fixture(&["a.mp3", "b.mp3"]).await;
        f.playback.play(0, 0).await.unwrap();
        f.playlist.remove_tracks(&[0]).await.unwrap();
        let current = f.playback.current_track().await.unwrap().unwrap();
        assert_eq!((current.index, current.path.as_str()), (-1, "a.mp3"));
    }

    #[tokio::test]
    async fn test_start_at_out_of_range() {
        let f = fixture(&["a.mp3"]).await;
        assert_eq!(
            f.playback.start_at(3, 0, 0).await.unwrap_err().kind(),
            ErrorKind::ArgumentError
        );
        assert_eq!(
            f.playback.resume_from_bookmark().await.unwrap_err().kind(),
            ErrorKind::InvalidStateTransition
        );
    }

    #[tokio::test]
    async fn test_engine_failure_keeps_state() {
        let f = fixture(&["a.mp3"]).await;
        f.engine.set_failing(true);
        let err = f.playback.play(0, 0).await.unwrap_err();
        assert_eq!(err, OpError::Internal("audio engine unavailable".into()));
        assert_eq!(f.playback.status(), PlaybackStatus::Stopped);
    }
}
