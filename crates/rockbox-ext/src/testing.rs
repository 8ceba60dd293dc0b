//! In-process fakes of the audio engine and library index for unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rockbox_audio::{AudioEngine, AudioError, EnginePosition};
use rockbox_library::sea_orm::DbErr;
use rockbox_library::{Album, Artist, LibraryIndex, Track};

/// Records every command; `position` reports the last play/seek.
#[derive(Default)]
pub struct FakeEngine {
    commands: Mutex<Vec<String>>,
    position: Mutex<EnginePosition>,
    failing: AtomicBool,
}

impl FakeEngine {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_position(&self, elapsed: u64, offset: u64) {
        *self.position.lock().unwrap() = EnginePosition { elapsed, offset };
    }

    fn record(&self, command: String) -> Result<(), AudioError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AudioError::Http("connection refused".into()));
        }
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

#[async_trait]
impl AudioEngine for FakeEngine {
    async fn play(&self, path: &Path, elapsed_ms: u64, offset: u64) -> Result<(), AudioError> {
        self.record(format!("play {} {elapsed_ms} {offset}", path.display()))?;
        self.set_position(elapsed_ms, offset);
        Ok(())
    }

    async fn pause(&self) -> Result<(), AudioError> {
        self.record("pause".into())
    }

    async fn resume(&self) -> Result<(), AudioError> {
        self.record("resume".into())
    }

    async fn stop(&self) -> Result<(), AudioError> {
        self.record("stop".into())
    }

    async fn seek(&self, elapsed_ms: u64) -> Result<(), AudioError> {
        self.record(format!("seek {elapsed_ms}"))?;
        self.position.lock().unwrap().elapsed = elapsed_ms;
        Ok(())
    }

    async fn position(&self) -> Result<EnginePosition, AudioError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AudioError::Http("connection refused".into()));
        }
        Ok(*self.position.lock().unwrap())
    }

    async fn flush_and_reload_tracks(&self) -> Result<(), AudioError> {
        self.record("flush".into())
    }

    async fn set_sound(&self, setting: &str, value: i32) -> Result<(), AudioError> {
        self.record(format!("sound {setting} {value}"))
    }

    async fn set_pitch(&self, pitch: i32) -> Result<(), AudioError> {
        self.record(format!("pitch {pitch}"))
    }

    async fn beep(&self, frequency_hz: u32, duration_ms: u32, amplitude: u32) -> Result<(), AudioError> {
        self.record(format!("beep {frequency_hz} {duration_ms} {amplitude}"))
    }

    async fn set_low_latency(&self, enabled: bool) -> Result<(), AudioError> {
        self.record(format!("low_latency {enabled}"))
    }
}

/// Fixed albums/artists/tracks, or a failing index.
#[derive(Default)]
pub struct FakeLibrary {
    pub albums: Vec<Album>,
    pub artists: Vec<Artist>,
    pub tracks: Vec<Track>,
    pub failing: bool,
}

impl FakeLibrary {
    fn check(&self) -> Result<(), DbErr> {
        if self.failing {
            return Err(DbErr::Custom("database is locked".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LibraryIndex for FakeLibrary {
    async fn album(&self, id: &str) -> Result<Option<Album>, DbErr> {
        self.check()?;
        Ok(self.albums.iter().find(|a| a.id == id).cloned())
    }

    async fn albums(&self) -> Result<Vec<Album>, DbErr> {
        self.check()?;
        Ok(self.albums.clone())
    }

    async fn artist(&self, id: &str) -> Result<Option<Artist>, DbErr> {
        self.check()?;
        Ok(self.artists.iter().find(|a| a.id == id).cloned())
    }

    async fn artists(&self) -> Result<Vec<Artist>, DbErr> {
        self.check()?;
        Ok(self.artists.clone())
    }

    async fn track(&self, id: &str) -> Result<Option<Track>, DbErr> {
        self.check()?;
        Ok(self.tracks.iter().find(|t| t.id == id).cloned())
    }

    async fn tracks(&self) -> Result<Vec<Track>, DbErr> {
        self.check()?;
        Ok(self.tracks.clone())
    }
}
