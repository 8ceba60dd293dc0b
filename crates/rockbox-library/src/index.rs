use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};

use crate::entities::{album, artist, track};

/// A library track as handed to scripts.
///
/// Timestamps are seconds since the Unix epoch; `length` is milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub path: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub composer: String,
    pub bitrate: u32,
    pub frequency: u32,
    pub filesize: u64,
    pub length: u64,
    pub disc_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    pub md5: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_art: Option<String>,
    pub artist_id: String,
    pub album_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<track::Model> for Track {
    fn from(m: track::Model) -> Self {
        Self {
            id: m.id,
            path: m.path,
            title: m.title,
            artist: m.artist,
            album: m.album,
            album_artist: m.album_artist,
            composer: m.composer,
            bitrate: m.bitrate.max(0) as u32,
            frequency: m.frequency.max(0) as u32,
            filesize: m.filesize.max(0) as u64,
            length: m.length.max(0) as u64,
            disc_number: m.disc_number.max(0) as u32,
            track_number: m.track_number.map(|n| n.max(0) as u32),
            year: m.year.map(|y| y.max(0) as u32),
            year_string: m.year_string,
            genre: m.genre,
            md5: m.md5,
            album_art: m.album_art,
            artist_id: m.artist_id,
            album_id: m.album_id,
            created_at: m.created_at.timestamp(),
            updated_at: m.updated_at.timestamp(),
        }
    }
}

/// An album with its tracks in disc/track order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub year: u32,
    pub year_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_art: Option<String>,
    pub md5: String,
    pub artist_id: String,
    pub tracks: Vec<Track>,
}

impl Album {
    fn from_model(m: album::Model, tracks: Vec<Track>) -> Self {
        Self {
            id: m.id,
            title: m.title,
            artist: m.artist,
            year: m.year.max(0) as u32,
            year_string: m.year_string,
            album_art: m.album_art,
            md5: m.md5,
            artist_id: m.artist_id,
            tracks,
        }
    }
}

/// An artist with their albums and tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub albums: Vec<Album>,
    pub tracks: Vec<Track>,
}

/// Read access to the on-device library index.
///
/// Lookups by id return `Ok(None)` for unknown ids; errors are reserved for
/// index failures.
#[async_trait]
pub trait LibraryIndex: Send + Sync {
    async fn album(&self, id: &str) -> Result<Option<Album>, DbErr>;

    /// All albums ordered by title. Listed albums carry no tracks.
    async fn albums(&self) -> Result<Vec<Album>, DbErr>;

    async fn artist(&self, id: &str) -> Result<Option<Artist>, DbErr>;

    /// All artists ordered by name. Listed artists carry no albums or tracks.
    async fn artists(&self) -> Result<Vec<Artist>, DbErr>;

    async fn track(&self, id: &str) -> Result<Option<Track>, DbErr>;

    async fn tracks(&self) -> Result<Vec<Track>, DbErr>;
}

/// `LibraryIndex` backed by the sea-orm library database.
#[derive(Debug, Clone)]
pub struct Library {
    db: DatabaseConnection,
}

impl Library {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn album_tracks(&self, album_id: &str) -> Result<Vec<Track>, DbErr> {
        let rows = track::Entity::find()
            .filter(track::Column::AlbumId.eq(album_id))
            .order_by_asc(track::Column::DiscNumber)
            .order_by_asc(track::Column::TrackNumber)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Track::from).collect())
    }
}

#[async_trait]
impl LibraryIndex for Library {
    async fn album(&self, id: &str) -> Result<Option<Album>, DbErr> {
        let Some(model) = album::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        let tracks = self.album_tracks(&model.id).await?;
        Ok(Some(Album::from_model(model, tracks)))
    }

    async fn albums(&self) -> Result<Vec<Album>, DbErr> {
        let rows = album::Entity::find()
            .order_by_asc(album::Column::Title)
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| Album::from_model(m, Vec::new()))
            .collect())
    }

    async fn artist(&self, id: &str) -> Result<Option<Artist>, DbErr> {
        let Some(model) = artist::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let albums = album::Entity::find()
            .filter(album::Column::ArtistId.eq(id))
            .order_by_asc(album::Column::Year)
            .order_by_asc(album::Column::Title)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| Album::from_model(m, Vec::new()))
            .collect();

        let tracks = track::Entity::find()
            .filter(track::Column::ArtistId.eq(id))
            .order_by_asc(track::Column::Title)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Track::from)
            .collect();

        Ok(Some(Artist {
            id: model.id,
            name: model.name,
            bio: model.bio,
            image: model.image,
            albums,
            tracks,
        }))
    }

    async fn artists(&self) -> Result<Vec<Artist>, DbErr> {
        let rows = artist::Entity::find()
            .order_by_asc(artist::Column::Name)
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| Artist {
                id: m.id,
                name: m.name,
                bio: m.bio,
                image: m.image,
                albums: Vec::new(),
                tracks: Vec::new(),
            })
            .collect())
    }

    async fn track(&self, id: &str) -> Result<Option<Track>, DbErr> {
        Ok(track::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .map(Track::from))
    }

    async fn tracks(&self) -> Result<Vec<Track>, DbErr> {
        let rows = track::Entity::find()
            .order_by_asc(track::Column::Title)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Track::from).collect())
    }
}
