//! Narrow interface contracts for the out-of-scope collaborators: the
//! streaming-music metadata client, the audio-acquisition backends and the
//! tag-embedding subprocesses (§1, §6, §9). Nothing in this module resolves
//! an actual network call — these are the seams the Generator and Executor
//! are written against, and test code supplies fakes.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::plan::PlanItem;

#[derive(Debug, Error, Clone)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub source_id: String,
    pub title: String,
    pub url: Option<String>,
    pub alt_url: Option<String>,
    pub track_number: u32,
    pub disc_number: u32,
    pub artist_name: String,
    pub album_name: String,
    pub cover_url: Option<String>,
    pub explicit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogAlbumRef {
    pub source_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogArtistRef {
    pub source_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPlaylistRef {
    pub source_id: String,
    pub name: String,
}

/// What a catalog URL resolves to (§4.C "resolve its catalog object").
#[derive(Debug, Clone)]
pub enum CatalogResource {
    Track(CatalogTrack),
    Album(CatalogAlbumRef),
    Artist(CatalogArtistRef),
    Playlist(CatalogPlaylistRef),
}

/// One page of a paginated playlist track listing (§4.C "page through
/// tracks respecting the provider's pagination contract").
pub struct CatalogPage {
    pub tracks: Vec<CatalogTrack>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<CatalogResource, CatalogError>;
    async fn album_tracks(&self, album_source_id: &str) -> Result<Vec<CatalogTrack>, CatalogError>;
    async fn artist_albums(
        &self,
        artist_source_id: &str,
    ) -> Result<Vec<CatalogAlbumRef>, CatalogError>;
    async fn playlist_page(
        &self,
        playlist_source_id: &str,
        cursor: Option<&str>,
    ) -> Result<CatalogPage, CatalogError>;
}

/// Result of one download attempt, matching the `(ok, path, err)` shape
/// the Executor's per-task algorithm dispatches against (§4.E step 3).
pub struct DownloadOutcome {
    pub ok: bool,
    pub path: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, item: &PlanItem, cancel: CancellationToken) -> DownloadOutcome;
}

/// Capability contract for subprocess-based tag embedders (§9).
#[async_trait]
pub trait TagEmbedder: Send + Sync {
    async fn embed(
        &self,
        file: &Path,
        metadata: &HashMap<String, Value>,
        cover_url: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<(), String>;
}
