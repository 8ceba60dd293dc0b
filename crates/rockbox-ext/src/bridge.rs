//! Assembles the domains into one registry and one `rb` namespace.

use std::sync::Arc;

use rockbox_audio::{AudioEngine, EngineConfig, HttpEngine};
use rockbox_library::{DatabaseConfig, Library, LibraryIndex};
use serde_json::Value;

use crate::config::BridgeConfig;
use crate::dispatcher::{CallHandle, Dispatcher};
use crate::domains::browse::{self, BrowseDomain, LibraryRoot};
use crate::domains::playback::{self, PlaybackDomain};
use crate::domains::playlist::{self, PlaylistDomain};
use crate::domains::settings::{self, SettingsDomain, UserSettings};
use crate::domains::sound::{self, SoundDomain};
use crate::domains::system::{self, SystemDomain};
use crate::domains::library;
use crate::error::BridgeError;
use crate::namespace::{Namespace, Projection};
use crate::registry::Registry;
use crate::script::{ScriptGuest, ScriptSession};

/// Everything a script can reach, wired together.
pub struct Bridge {
    config: BridgeConfig,
    projection: Arc<Projection>,
    playback: Arc<PlaybackDomain>,
    playlist: Arc<PlaylistDomain>,
    settings: Arc<SettingsDomain>,
    browse: Arc<BrowseDomain>,
    sound: Arc<SoundDomain>,
    system: Arc<SystemDomain>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("dispatcher", self.projection.dispatcher())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Build the bridge around an engine and a library index.
    ///
    /// Settings and the saved playlist are loaded from `config.data_dir`.
    /// Must be called from within a Tokio runtime.
    pub async fn new(
        config: BridgeConfig,
        engine: Arc<dyn AudioEngine>,
        library: Arc<dyn LibraryIndex>,
    ) -> Result<Self, BridgeError> {
        let root = LibraryRoot::new(&config.library_root);
        let defaults = UserSettings {
            music_dir: root.path().to_string_lossy().into_owned(),
            ..UserSettings::default()
        };

        let settings = Arc::new(SettingsDomain::load(config.settings_file(), defaults, engine.clone()).await?);
        let playlist = Arc::new(PlaylistDomain::new(root.clone(), config.playlist_file(), settings.clone()));
        match playlist.restore().await {
            Ok(true) => tracing::info!(path = %config.playlist_file().display(), "restored saved playlist"),
            Ok(false) => {}
            Err(e) => tracing::warn!("starting with an empty playlist: {e}"),
        }
        let playback = Arc::new(PlaybackDomain::new(engine.clone(), playlist.clone()));
        let browse = Arc::new(BrowseDomain::new(root));
        let sound = Arc::new(SoundDomain::new(settings.clone(), engine));
        let system = Arc::new(SystemDomain::new(
            config.version.clone(),
            playlist.clone(),
            browse.clone(),
            sound.clone(),
        ));

        let registry = Registry::new();
        let mut namespace = Namespace::new();
        namespace.merge(playback::register(&registry, playback.clone())?)?;
        namespace.merge(playlist::register(&registry, playlist.clone(), playback.clone())?)?;
        namespace.merge(library::register(&registry, library)?)?;
        namespace.merge(settings::register(&registry, settings.clone())?)?;
        namespace.merge(system::register(&registry, system.clone())?)?;
        namespace.merge(browse::register(&registry, browse.clone())?)?;
        namespace.merge(sound::register(&registry, sound.clone())?)?;

        let registry = Arc::new(registry);
        let dispatcher = Dispatcher::new(registry.clone());
        let projection = Arc::new(Projection::new(namespace, dispatcher)?);

        tracing::info!(
            operations = registry.len(),
            library = %config.library_root.display(),
            "scripting bridge ready"
        );

        Ok(Self {
            config,
            projection,
            playback,
            playlist,
            settings,
            browse,
            sound,
            system,
        })
    }

    /// Bridge over the HTTP engine and the SQLite library index, both
    /// configured from the environment.
    pub async fn from_env() -> Result<Self, BridgeError> {
        let engine = HttpEngine::new(&EngineConfig::from_env())?;
        let db = rockbox_library::connect(&DatabaseConfig::from_env()).await?;
        rockbox_library::create_schema(&db).await?;
        Self::new(BridgeConfig::from_env(), Arc::new(engine), Arc::new(Library::new(db))).await
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn projection(&self) -> &Arc<Projection> {
        &self.projection
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.projection.dispatcher()
    }

    pub fn playback(&self) -> &Arc<PlaybackDomain> {
        &self.playback
    }

    pub fn playlist(&self) -> &Arc<PlaylistDomain> {
        &self.playlist
    }

    pub fn settings(&self) -> &Arc<SettingsDomain> {
        &self.settings
    }

    pub fn browse(&self) -> &Arc<BrowseDomain> {
        &self.browse
    }

    pub fn sound(&self) -> &Arc<SoundDomain> {
        &self.sound
    }

    pub fn system(&self) -> &Arc<SystemDomain> {
        &self.system
    }

    /// Call a namespace method, e.g. `playback.pause` or `rb.playback.pause`.
    pub fn call(&self, path: &str, args: Vec<Value>) -> CallHandle {
        let path = path.strip_prefix("rb.").unwrap_or(path);
        self.projection.call(path, args)
    }

    /// A session running `guest` against this bridge.
    pub fn session<G: ScriptGuest>(&self, guest: G) -> ScriptSession<G> {
        ScriptSession::new(guest, self.projection.clone(), self.config.max_turns)
    }

    /// Cancel outstanding calls, refuse new ones and save the playlist.
    pub async fn shutdown(&self) {
        self.dispatcher().shutdown();
        if let Err(e) = self.playlist.sync().await {
            tracing::warn!("playlist not saved on shutdown: {e}");
        }
    }
}
