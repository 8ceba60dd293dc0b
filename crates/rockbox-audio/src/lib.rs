pub mod engine;
pub mod metadata;

pub use engine::{AudioEngine, AudioError, EngineConfig, EnginePosition, HttpEngine};
pub use metadata::{
    is_audio_extension, is_audio_file, is_playlist_extension, read_track_metadata,
    MetadataError, TrackMetadata, AUDIO_EXTENSIONS, PLAYLIST_EXTENSIONS,
};
