//! User settings: a TOML-backed record read and patched by scripts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rockbox_audio::AudioEngine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::domains::sound::{sound_setting, SOUND_SETTINGS};
use crate::domains::write_atomic;
use crate::error::{BridgeError, ErrorKind, OpError, RegistryError};
use crate::marshal::{to_script, ArgType, Args, Param, Returns};
use crate::namespace::Namespace;
use crate::registry::{Domain, Operation, Registry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaygainSettings {
    pub noclip: bool,
    /// 0 track, 1 album, 2 shuffle, 3 off.
    #[serde(rename = "type")]
    pub kind: i32,
    /// Tenths of a dB.
    pub preamp: i32,
}

impl Default for ReplaygainSettings {
    fn default() -> Self {
        Self {
            noclip: false,
            kind: 3,
            preamp: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqBandSetting {
    /// Hz.
    pub cutoff: i32,
    /// Tenths.
    pub q: i32,
    /// Tenths of a dB.
    pub gain: i32,
}

impl Default for EqBandSetting {
    fn default() -> Self {
        Self {
            cutoff: 1000,
            q: 7,
            gain: 0,
        }
    }
}

pub const MAX_EQ_BANDS: usize = 10;

fn default_eq_bands() -> Vec<EqBandSetting> {
    [32, 64, 125, 250, 500, 1000, 2000, 4000, 8000, 16000]
        .into_iter()
        .map(|cutoff| EqBandSetting {
            cutoff,
            ..EqBandSetting::default()
        })
        .collect()
}

/// The persisted settings record. Missing fields in `settings.toml` take
/// their defaults; nested tables come last so the TOML stays flat on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub music_dir: String,

    pub volume: i32,
    pub balance: i32,
    pub bass: i32,
    pub treble: i32,
    pub channel_config: i32,
    pub stereo_width: i32,
    pub bass_cutoff: i32,
    pub treble_cutoff: i32,

    pub crossfade: i32,
    pub crossfade_fade_in_delay: i32,
    pub crossfade_fade_out_delay: i32,
    pub crossfade_fade_in_duration: i32,
    pub crossfade_fade_out_duration: i32,
    pub crossfade_fade_out_mixmode: i32,

    pub crossfeed: i32,
    pub crossfeed_direct_gain: i32,
    pub crossfeed_cross_gain: i32,
    pub crossfeed_hf_attenuation: i32,
    pub crossfeed_hf_cutoff: i32,

    pub eq_enabled: bool,
    pub eq_precut: i32,

    pub beep: i32,
    pub keyclick: i32,
    pub dithering_enabled: bool,
    pub timestretch_enabled: bool,

    pub repeat_mode: i32,
    pub single_mode: bool,
    pub party_mode: bool,
    pub playlist_shuffle: bool,
    pub fade_on_stop: bool,
    pub warnon_erase_dynplaylist: bool,
    pub keep_current_track_on_replace_playlist: bool,
    pub recursive_dir_insert: i32,

    pub replaygain_settings: ReplaygainSettings,
    pub eq_band_settings: Vec<EqBandSetting>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            music_dir: String::new(),
            volume: -25,
            balance: 0,
            bass: 0,
            treble: 0,
            channel_config: 0,
            stereo_width: 100,
            bass_cutoff: 0,
            treble_cutoff: 0,
            crossfade: 0,
            crossfade_fade_in_delay: 0,
            crossfade_fade_out_delay: 0,
            crossfade_fade_in_duration: 2,
            crossfade_fade_out_duration: 2,
            crossfade_fade_out_mixmode: 0,
            crossfeed: 0,
            crossfeed_direct_gain: -15,
            crossfeed_cross_gain: -60,
            crossfeed_hf_attenuation: -160,
            crossfeed_hf_cutoff: 700,
            eq_enabled: false,
            eq_precut: 0,
            beep: 0,
            keyclick: 0,
            dithering_enabled: false,
            timestretch_enabled: false,
            repeat_mode: 0,
            single_mode: false,
            party_mode: false,
            playlist_shuffle: false,
            fade_on_stop: true,
            warnon_erase_dynplaylist: true,
            keep_current_track_on_replace_playlist: false,
            recursive_dir_insert: 0,
            replaygain_settings: ReplaygainSettings::default(),
            eq_band_settings: default_eq_bands(),
        }
    }
}

fn check_range(field: &str, value: i32, min: i32, max: i32) -> Result<(), OpError> {
    if value < min || value > max {
        return Err(OpError::argument(
            field,
            format!("{value} is outside {min}..={max}"),
        ));
    }
    Ok(())
}

impl UserSettings {
    /// Current value of a sound setting by name.
    pub fn sound_value(&self, name: &str) -> Option<i32> {
        match name {
            "volume" => Some(self.volume),
            "balance" => Some(self.balance),
            "bass" => Some(self.bass),
            "treble" => Some(self.treble),
            "channel_config" => Some(self.channel_config),
            "stereo_width" => Some(self.stereo_width),
            _ => None,
        }
    }

    fn sound_value_mut(&mut self, name: &str) -> Option<&mut i32> {
        match name {
            "volume" => Some(&mut self.volume),
            "balance" => Some(&mut self.balance),
            "bass" => Some(&mut self.bass),
            "treble" => Some(&mut self.treble),
            "channel_config" => Some(&mut self.channel_config),
            "stereo_width" => Some(&mut self.stereo_width),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), OpError> {
        for setting in SOUND_SETTINGS.iter() {
            if let Some(value) = self.sound_value(setting.name) {
                check_range(setting.name, value, setting.min, setting.max)?;
            }
        }
        check_range("repeat_mode", self.repeat_mode, 0, 4)?;
        check_range("crossfade", self.crossfade, 0, 6)?;
        check_range("crossfeed", self.crossfeed, 0, 2)?;
        check_range("recursive_dir_insert", self.recursive_dir_insert, 0, 2)?;
        check_range("beep", self.beep, 0, 3)?;
        check_range("keyclick", self.keyclick, 0, 3)?;
        check_range("eq_precut", self.eq_precut, 0, 240)?;
        check_range("replaygain_settings.type", self.replaygain_settings.kind, 0, 3)?;
        check_range(
            "replaygain_settings.preamp",
            self.replaygain_settings.preamp,
            -120,
            120,
        )?;
        if self.eq_band_settings.len() > MAX_EQ_BANDS {
            return Err(OpError::argument(
                "eq_band_settings",
                format!("at most {MAX_EQ_BANDS} bands"),
            ));
        }
        for (i, band) in self.eq_band_settings.iter().enumerate() {
            check_range(&format!("eq_band_settings[{i}].gain"), band.gain, -240, 240)?;
            check_range(&format!("eq_band_settings[{i}].q"), band.q, 1, 640)?;
            check_range(&format!("eq_band_settings[{i}].cutoff"), band.cutoff, 20, 22050)?;
        }
        Ok(())
    }
}

/// Merge `patch` into `target`, collecting keys `target` does not have.
fn merge_into(target: &mut Map<String, Value>, patch: Map<String, Value>, prefix: &str, unknown: &mut Vec<String>) {
    for (key, value) in patch {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match (target.get_mut(&key), value) {
            (None, _) => unknown.push(path),
            (Some(Value::Object(nested)), Value::Object(inner)) => {
                merge_into(nested, inner, &path, unknown)
            }
            (Some(slot), value) => *slot = value,
        }
    }
}

// ─── Domain ─────────────────────────────────────────────────────────────

pub struct SettingsDomain {
    path: PathBuf,
    state: Mutex<UserSettings>,
    engine: Arc<dyn AudioEngine>,
}

impl SettingsDomain {
    /// Load `path` if present, otherwise start from `defaults`.
    pub async fn load(
        path: impl Into<PathBuf>,
        defaults: UserSettings,
        engine: Arc<dyn AudioEngine>,
    ) -> Result<Self, BridgeError> {
        let path = path.into();
        let settings = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let settings: UserSettings = toml::from_str(&contents)?;
                tracing::info!(path = %path.display(), "settings loaded");
                settings
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => defaults,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            state: Mutex::new(settings),
            engine,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> UserSettings {
        self.state.lock().await.clone()
    }

    /// Apply a partial record. Nothing changes unless every field is known
    /// and the merged record validates. `music_dir` is fixed at startup.
    pub async fn save(&self, patch: Map<String, Value>) -> Result<UserSettings, OpError> {
        let mut state = self.state.lock().await;

        let mut merged = match to_script(&*state)? {
            Value::Object(map) => map,
            _ => return Err(OpError::Internal("settings are not a record".into())),
        };
        let mut unknown = Vec::new();
        merge_into(&mut merged, patch, "", &mut unknown);
        if !unknown.is_empty() {
            return Err(OpError::argument(
                "settings",
                format!("unknown fields: {}", unknown.join(", ")),
            ));
        }

        let next: UserSettings = serde_json::from_value(Value::Object(merged))
            .map_err(|e| OpError::argument("settings", e.to_string()))?;
        if next.music_dir != state.music_dir {
            return Err(OpError::argument("settings", "music_dir is read-only"));
        }
        next.validate()?;

        self.commit(&mut state, next).await
    }

    /// Read-modify-write one sound value under the settings lock. Returns
    /// the value before and after.
    pub async fn update_sound(
        &self,
        name: &str,
        update: impl FnOnce(i32) -> i32,
    ) -> Result<(i32, i32), OpError> {
        if sound_setting(name).is_none() {
            return Err(OpError::argument("setting", format!("unknown sound setting `{name}`")));
        }
        let mut state = self.state.lock().await;
        let current = state
            .sound_value(name)
            .ok_or_else(|| OpError::Internal(format!("sound setting `{name}` has no value")))?;
        let target = update(current);
        if target == current {
            return Ok((current, current));
        }

        let mut next = state.clone();
        if let Some(slot) = next.sound_value_mut(name) {
            *slot = target;
        }
        next.validate()?;
        self.commit(&mut state, next).await?;
        Ok((current, target))
    }

    /// Store one sound value.
    pub async fn store_sound(&self, name: &str, value: i32) -> Result<(), OpError> {
        self.update_sound(name, |_| value).await.map(|_| ())
    }

    /// Push changed sound values to the engine, write the file, then swap
    /// the state. On failure the engine gets its previous values back.
    async fn commit(&self, state: &mut UserSettings, next: UserSettings) -> Result<UserSettings, OpError> {
        let mut applied: Vec<(&'static str, i32)> = Vec::new();
        for setting in SOUND_SETTINGS.iter() {
            let (old, new) = (state.sound_value(setting.name), next.sound_value(setting.name));
            if let (Some(old), Some(new)) = (old, new) {
                if old != new {
                    if let Err(e) = self.engine.set_sound(setting.name, new).await {
                        self.restore_sound(&applied).await;
                        return Err(e.into());
                    }
                    applied.push((setting.name, old));
                }
            }
        }

        if let Err(e) = self.persist(&next).await {
            self.restore_sound(&applied).await;
            return Err(e);
        }

        *state = next.clone();
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(next)
    }

    async fn persist(&self, settings: &UserSettings) -> Result<(), OpError> {
        let contents = toml::to_string_pretty(settings).map_err(|e| {
            tracing::error!("failed to encode settings: {e}");
            OpError::Storage("settings could not be encoded".into())
        })?;
        write_atomic(&self.path, contents.into_bytes()).await?;
        Ok(())
    }

    async fn restore_sound(&self, applied: &[(&'static str, i32)]) {
        for (name, old) in applied.iter().rev() {
            if let Err(e) = self.engine.set_sound(name, *old).await {
                tracing::warn!(setting = %name, "failed to restore sound setting: {e}");
            }
        }
    }
}

#[derive(Deserialize)]
struct SaveArgs {
    settings: Map<String, Value>,
}

/// Register `settings.*` and return its namespace.
pub fn register(registry: &Registry, settings: Arc<SettingsDomain>) -> Result<Namespace, RegistryError> {
    let domain = settings.clone();
    registry.register(
        Operation::task(Domain::Settings, "getGlobalSettings", move |_| {
            let settings = domain.clone();
            async move { to_script(&settings.snapshot().await) }
        })
        .returns(Returns::Record("UserSettings")),
    )?;

    let domain = settings;
    registry.register(
        Operation::task(Domain::Settings, "saveSettings", move |args: Args| {
            let settings = domain.clone();
            async move {
                let SaveArgs { settings: patch } = args.parse()?;
                to_script(&settings.save(patch).await?)
            }
        })
        .param(Param::required("settings", ArgType::Object))
        .returns(Returns::Record("UserSettings"))
        .fails(&[ErrorKind::StorageError]),
    )?;

    Ok(Namespace::new()
        .method("getGlobalSettings", "settings.getGlobalSettings")
        .method("saveSettings", "settings.saveSettings")
        .under("settings"))
}

// ─── Tests ──────────────────────────────────────────────────────────────
