use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::ItemKey;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Lofty error: {0}")]
    Lofty(#[from] lofty::error::LoftyError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// File extensions the player decodes.
pub const AUDIO_EXTENSIONS: [&str; 17] = [
    "mp3", "ogg", "flac", "m4a", "aac", "mp4", "alac", "wav", "wv", "mpc", "aiff", "ac3", "opus",
    "spx", "sid", "ape", "wma",
];

/// Playlist file extensions shown alongside audio files when browsing.
pub const PLAYLIST_EXTENSIONS: [&str; 2] = ["m3u", "m3u8"];

/// Tag and stream properties of one audio file.
///
/// Lengths are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub length: u64,
    pub bitrate: Option<u32>,
    pub frequency: Option<u32>,
    pub channels: Option<u8>,
    pub codec: String,
    pub filesize: u64,
    pub has_album_art: bool,
}

impl TrackMetadata {
    /// Metadata for a file whose tags could not be read: the title falls back
    /// to the file stem.
    pub fn untagged(path: &Path) -> Self {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            title,
            codec: extension_of(path),
            ..Default::default()
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Check if a file extension is a decodable audio format
pub fn is_audio_extension(extension: &str) -> bool {
    AUDIO_EXTENSIONS.contains(&extension.to_lowercase().as_str())
}

/// Check if a file extension is a playlist format
pub fn is_playlist_extension(extension: &str) -> bool {
    PLAYLIST_EXTENSIONS.contains(&extension.to_lowercase().as_str())
}

/// Check if a path names an audio file, judging by its extension.
pub fn is_audio_file(path: &Path) -> bool {
    is_audio_extension(&extension_of(path))
}

/// Normalize a genre string: split compound genres on common separators,
/// take the first segment, trim whitespace, and title-case it.
pub fn normalize_genre(raw: &str) -> String {
    let first = raw
        .split(&['/', ';', ',', ':', '\\', '|'][..])
        .next()
        .unwrap_or(raw)
        .trim();

    if first.is_empty() {
        return String::new();
    }

    first
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => {
                    let upper: String = c.to_uppercase().collect();
                    upper + &chars.as_str().to_lowercase()
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read tags and stream properties from an audio file using lofty.
///
/// Blocking; call from `spawn_blocking` inside async code.
pub fn read_track_metadata(path: &Path) -> Result<TrackMetadata, MetadataError> {
    let codec = extension_of(path);
    if !is_audio_extension(&codec) {
        return Err(MetadataError::UnsupportedFormat(codec));
    }

    let filesize = std::fs::metadata(path)?.len();
    let tagged_file = Probe::open(path)?.read()?;

    let properties = tagged_file.properties();
    let length = properties.duration().as_millis() as u64;
    let bitrate = properties.audio_bitrate();
    let frequency = properties.sample_rate();
    let channels = properties.channels();

    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());

    let mut metadata = TrackMetadata {
        length,
        bitrate,
        frequency,
        channels,
        codec,
        filesize,
        ..TrackMetadata::untagged(path)
    };

    if let Some(tag) = tag {
        if let Some(title) = tag.title() {
            metadata.title = title.to_string();
        }
        metadata.artist = tag.artist().map(|a| a.to_string());
        metadata.album = tag.album().map(|a| a.to_string());
        metadata.album_artist = tag.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string());
        metadata.genre = tag
            .genre()
            .map(|g| normalize_genre(g.as_ref()))
            .filter(|g| !g.is_empty());
        metadata.year = tag.year();
        metadata.track_number = tag.track();
        metadata.disc_number = tag.disk();
        metadata.has_album_art = !tag.pictures().is_empty();
    }

    Ok(metadata)
}
