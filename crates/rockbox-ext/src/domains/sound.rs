//! Sound controls: volume, tone, balance, stereo width, pitch.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rockbox_audio::AudioEngine;
use serde::Deserialize;
use serde_json::Value;

use crate::domains::settings::SettingsDomain;
use crate::error::{ErrorKind, OpError, RegistryError};
use crate::marshal::{ArgType, Args, Param, Returns};
use crate::namespace::Namespace;
use crate::registry::{Domain, Operation, Registry};

/// Limits of one adjustable sound setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundSetting {
    pub name: &'static str,
    pub unit: &'static str,
    pub min: i32,
    pub max: i32,
    pub step: i32,
    pub default: i32,
}

pub const SOUND_SETTINGS: [SoundSetting; 6] = [
    SoundSetting { name: "volume", unit: "dB", min: -80, max: 6, step: 1, default: -25 },
    SoundSetting { name: "balance", unit: "%", min: -100, max: 100, step: 1, default: 0 },
    SoundSetting { name: "bass", unit: "dB", min: -24, max: 24, step: 1, default: 0 },
    SoundSetting { name: "treble", unit: "dB", min: -24, max: 24, step: 1, default: 0 },
    SoundSetting { name: "channel_config", unit: "", min: 0, max: 5, step: 1, default: 0 },
    SoundSetting { name: "stereo_width", unit: "%", min: 0, max: 250, step: 5, default: 100 },
];

pub fn sound_setting(name: &str) -> Option<&'static SoundSetting> {
    SOUND_SETTINGS.iter().find(|s| s.name == name)
}

fn known_setting(name: &str) -> Result<&'static SoundSetting, OpError> {
    sound_setting(name)
        .ok_or_else(|| OpError::argument("setting", format!("unknown sound setting `{name}`")))
}

pub const PITCH_MIN: i32 = 500;
pub const PITCH_MAX: i32 = 2000;
pub const PITCH_DEFAULT: i32 = 1000;

const KEYCLICK_FREQUENCY: u32 = 4000;
const KEYCLICK_DURATION_MS: u32 = 2;
/// Amplitude per keyclick level (1 weak, 2 moderate, 3 strong).
const KEYCLICK_AMPLITUDE: u32 = 2500;

/// Physical value of a setting: dB settings in tenths of a dB, the rest
/// unchanged.
pub fn val2phys(setting: &SoundSetting, value: i32) -> Result<i32, OpError> {
    if value < setting.min || value > setting.max {
        return Err(OpError::argument(
            "value",
            format!("{} must be within {}..={}, got {value}", setting.name, setting.min, setting.max),
        ));
    }
    Ok(match setting.unit {
        "dB" => value * 10,
        _ => value,
    })
}

// ─── Domain ─────────────────────────────────────────────────────────────

pub struct SoundDomain {
    settings: Arc<SettingsDomain>,
    engine: Arc<dyn AudioEngine>,
    pitch: AtomicI32,
    low_latency: AtomicBool,
    /// Seconds since the Unix epoch; 0 until the volume first changes.
    last_volume_change: AtomicU64,
}

impl SoundDomain {
    pub fn new(settings: Arc<SettingsDomain>, engine: Arc<dyn AudioEngine>) -> Self {
        Self {
            settings,
            engine,
            pitch: AtomicI32::new(PITCH_DEFAULT),
            low_latency: AtomicBool::new(false),
            last_volume_change: AtomicU64::new(0),
        }
    }

    pub fn pitch(&self) -> i32 {
        self.pitch.load(Ordering::Acquire)
    }

    pub fn last_volume_change(&self) -> u64 {
        self.last_volume_change.load(Ordering::Acquire)
    }

    fn touch_volume(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.last_volume_change.store(now, Ordering::Release);
    }

    pub async fn current(&self, name: &str) -> Result<i32, OpError> {
        known_setting(name)?;
        self.settings
            .snapshot()
            .await
            .sound_value(name)
            .ok_or_else(|| OpError::Internal(format!("sound setting `{name}` has no value")))
    }

    /// Move the volume by `steps`, clamped to its range. Returns the new value.
    pub async fn adjust_volume(&self, steps: i64) -> Result<i32, OpError> {
        let setting = known_setting("volume")?;
        let (before, after) = self
            .settings
            .update_sound(setting.name, |current| {
                i64::from(current)
                    .saturating_add(steps.saturating_mul(i64::from(setting.step)))
                    .clamp(i64::from(setting.min), i64::from(setting.max)) as i32
            })
            .await?;
        if before != after {
            self.touch_volume();
        }
        Ok(after)
    }

    pub async fn set(&self, name: &str, value: i64) -> Result<(), OpError> {
        let setting = known_setting(name)?;
        if value < i64::from(setting.min) || value > i64::from(setting.max) {
            return Err(OpError::argument(
                "value",
                format!("{name} must be within {}..={}, got {value}", setting.min, setting.max),
            ));
        }
        self.settings.store_sound(name, value as i32).await?;
        if name == "volume" {
            self.touch_volume();
        }
        Ok(())
    }

    pub async fn set_pitch(&self, pitch: i32) -> Result<(), OpError> {
        self.engine.set_pitch(pitch).await?;
        self.pitch.store(pitch, Ordering::Release);
        Ok(())
    }

    pub fn low_latency(&self) -> bool {
        self.low_latency.load(Ordering::Acquire)
    }

    pub async fn set_low_latency(&self, enabled: bool) -> Result<(), OpError> {
        self.engine.set_low_latency(enabled).await?;
        self.low_latency.store(enabled, Ordering::Release);
        Ok(())
    }

    pub async fn beep(&self, frequency_hz: u32, duration_ms: u32, amplitude: u32) -> Result<(), OpError> {
        self.engine.beep(frequency_hz, duration_ms, amplitude).await?;
        Ok(())
    }

    /// Play a key click at the configured strength. Returns false when
    /// key clicks are off.
    pub async fn key_click(&self) -> Result<bool, OpError> {
        let level = self.settings.snapshot().await.keyclick;
        if level <= 0 {
            return Ok(false);
        }
        self.beep(KEYCLICK_FREQUENCY, KEYCLICK_DURATION_MS, KEYCLICK_AMPLITUDE * level as u32)
            .await?;
        Ok(true)
    }
}

#[derive(Deserialize)]
struct SettingArgs {
    setting: String,
}

#[derive(Deserialize)]
struct SetArgs {
    setting: String,
    value: i64,
}

fn setting_param() -> Param {
    Param::required("setting", ArgType::non_empty_string())
}

fn register_limit(
    registry: &Registry,
    method: &str,
    limit: fn(&SoundSetting) -> Value,
    returns: Returns,
) -> Result<(), RegistryError> {
    registry.register(
        Operation::inline(Domain::Sound, method, move |args: Args| {
            let SettingArgs { setting } = args.parse()?;
            Ok(limit(known_setting(&setting)?))
        })
        .param(setting_param())
        .returns(returns),
    )
}

/// Register `sound.*` and return its namespace.
pub fn register(registry: &Registry, sound: Arc<SoundDomain>) -> Result<Namespace, RegistryError> {
    let domain = sound.clone();
    registry.register(
        Operation::task(Domain::Sound, "adjustVolume", move |args: Args| {
            let sound = domain.clone();
            async move {
                #[derive(Deserialize)]
                struct AdjustArgs {
                    steps: i64,
                }
                let AdjustArgs { steps } = args.parse()?;
                Ok(Value::from(sound.adjust_volume(steps).await?))
            }
        })
        .param(Param::required("steps", ArgType::int()))
        .returns(Returns::Int)
        .fails(&[ErrorKind::StorageError]),
    )?;

    let domain = sound.clone();
    registry.register(
        Operation::task(Domain::Sound, "soundSet", move |args: Args| {
            let sound = domain.clone();
            async move {
                let SetArgs { setting, value } = args.parse()?;
                sound.set(&setting, value).await?;
                Ok(Value::Null)
            }
        })
        .param(setting_param())
        .param(Param::required("value", ArgType::int()))
        .fails(&[ErrorKind::StorageError]),
    )?;

    let domain = sound.clone();
    registry.register(
        Operation::task(Domain::Sound, "soundCurrent", move |args: Args| {
            let sound = domain.clone();
            async move {
                let SettingArgs { setting } = args.parse()?;
                Ok(Value::from(sound.current(&setting).await?))
            }
        })
        .param(setting_param())
        .returns(Returns::Int),
    )?;

    register_limit(registry, "soundDefault", |s| Value::from(s.default), Returns::Int)?;
    register_limit(registry, "soundMin", |s| Value::from(s.min), Returns::Int)?;
    register_limit(registry, "soundMax", |s| Value::from(s.max), Returns::Int)?;
    register_limit(registry, "soundUnit", |s| Value::from(s.unit), Returns::Str)?;

    let domain = sound.clone();
    registry.register(
        Operation::inline(Domain::Sound, "getPitch", move |_| Ok(Value::from(domain.pitch())))
            .returns(Returns::Int),
    )?;

    registry.register(
        Operation::inline(Domain::Sound, "soundVal2Phys", |args: Args| {
            let SetArgs { setting, value } = args.parse()?;
            let value = i32::try_from(value)
                .map_err(|_| OpError::argument("value", format!("{value} is out of range")))?;
            Ok(Value::from(val2phys(known_setting(&setting)?, value)?))
        })
        .param(setting_param())
        .param(Param::required("value", ArgType::int()))
        .returns(Returns::Int),
    )?;

    let domain = sound.clone();
    registry.register(
        Operation::inline(Domain::Sound, "pcmGetLowLatency", move |_| {
            Ok(Value::from(domain.low_latency()))
        })
        .returns(Returns::Bool),
    )?;

    let domain = sound.clone();
    registry.register(
        Operation::task(Domain::Sound, "pcmSetLowLatency", move |args: Args| {
            let sound = domain.clone();
            async move {
                #[derive(Deserialize)]
                struct LatencyArgs {
                    enabled: bool,
                }
                let LatencyArgs { enabled } = args.parse()?;
                sound.set_low_latency(enabled).await?;
                Ok(Value::Null)
            }
        })
        .param(Param::required("enabled", ArgType::Bool)),
    )?;

    let domain = sound.clone();
    registry.register(
        Operation::task(Domain::Sound, "beepPlay", move |args: Args| {
            let sound = domain.clone();
            async move {
                #[derive(Deserialize)]
                struct BeepArgs {
                    frequency: u32,
                    duration: u32,
                    amplitude: u32,
                }
                let BeepArgs { frequency, duration, amplitude } = args.parse()?;
                sound.beep(frequency, duration, amplitude).await?;
                Ok(Value::Null)
            }
        })
        .param(Param::required("frequency", ArgType::int_range(20, 20_000)))
        .param(Param::required("duration", ArgType::int_range(1, 10_000)))
        .param(Param::required("amplitude", ArgType::int_range(0, 32_767))),
    )?;

    let domain = sound.clone();
    registry.register(
        Operation::task(Domain::Sound, "keyClickClick", move |_| {
            let sound = domain.clone();
            async move { Ok(Value::from(sound.key_click().await?)) }
        })
        .returns(Returns::Bool),
    )?;

    let domain = sound;
    registry.register(
        Operation::task(Domain::Sound, "setPitch", move |args: Args| {
            let sound = domain.clone();
            async move {
                #[derive(Deserialize)]
                struct PitchArgs {
                    pitch: i32,
                }
                let PitchArgs { pitch } = args.parse()?;
                sound.set_pitch(pitch).await?;
                Ok(Value::Null)
            }
        })
        .param(Param::required(
            "pitch",
            ArgType::int_range(i64::from(PITCH_MIN), i64::from(PITCH_MAX)),
        )),
    )?;

    let mut namespace = Namespace::new();
    for method in [
        "adjustVolume",
        "soundSet",
        "soundCurrent",
        "soundDefault",
        "soundMin",
        "soundMax",
        "soundUnit",
        "soundVal2Phys",
        "getPitch",
        "setPitch",
        "beepPlay",
        "pcmGetLowLatency",
        "pcmSetLowLatency",
        "keyClickClick",
    ] {
        namespace = namespace.method(method, &format!("sound.{method}"));
    }
    Ok(namespace.under("sound"))
}

// ─── Tests ──────────────────────────────────────────────────────────────
