//! [MODULE C] Generator — config → plan tree (§4.C).

use std::collections::HashMap;

use crate::catalog::{CatalogProvider, CatalogResource, CatalogTrack};
use crate::config::{Configuration, SourceEntry};
use crate::errors::PlanError;
use crate::plan::{DownloadPlan, ItemType, PlanItem};

/// Tracks which source ids have already produced a plan item, so a track
/// reachable from more than one container is recorded once with an
/// auxiliary `child_of` reference rather than duplicated (§4.C, §9).
struct Dedup {
    item_id_by_source: HashMap<String, String>,
}

impl Dedup {
    fn new() -> Self {
        Self {
            item_id_by_source: HashMap::new(),
        }
    }
}

pub struct Generator<'a> {
    provider: &'a dyn CatalogProvider,
}

impl<'a> Generator<'a> {
    pub fn new(provider: &'a dyn CatalogProvider) -> Self {
        Self { provider }
    }

    /// Builds a freshly generated plan in pending state (§4.C). Per-item
    /// resolution failures become failed leaves; failure to resolve a
    /// top-level entry aborts generation (§4.C "Errors").
    pub async fn generate(&self, config: &Configuration) -> Result<DownloadPlan, PlanError> {
        let mut plan = DownloadPlan::new();
        let mut dedup = Dedup::new();

        for entry in &config.songs {
            self.add_song(&mut plan, entry, &mut dedup).await?;
        }
        for entry in &config.albums {
            self.add_album_entry(&mut plan, entry, &mut dedup).await?;
        }
        for entry in &config.artists {
            self.add_artist_entry(&mut plan, entry, &mut dedup).await?;
        }
        for entry in &config.playlists {
            self.add_playlist_entry(&mut plan, entry, &mut dedup).await?;
        }

        Ok(plan)
    }

    async fn add_song(
        &self,
        plan: &mut DownloadPlan,
        entry: &SourceEntry,
        dedup: &mut Dedup,
    ) -> Result<(), PlanError> {
        match self.provider.resolve(&entry.url).await {
            Ok(CatalogResource::Track(track)) => {
                self.insert_track(plan, &track, "", dedup);
                Ok(())
            }
            Ok(_) => Err(PlanError::GenerationFailed {
                name: entry.name.clone(),
                message: "expected a track url in the songs list".to_string(),
            }),
            Err(e) => Err(PlanError::GenerationFailed {
                name: entry.name.clone(),
                message: e.to_string(),
            }),
        }
    }

    async fn add_album_entry(
        &self,
        plan: &mut DownloadPlan,
        entry: &SourceEntry,
        dedup: &mut Dedup,
    ) -> Result<(), PlanError> {
        let album_ref = match self.provider.resolve(&entry.url).await {
            Ok(CatalogResource::Album(a)) => a,
            Ok(_) => {
                return Err(PlanError::GenerationFailed {
                    name: entry.name.clone(),
                    message: "expected an album url in the albums list".to_string(),
                })
            }
            Err(e) => {
                return Err(PlanError::GenerationFailed {
                    name: entry.name.clone(),
                    message: e.to_string(),
                })
            }
        };

        let album_id = PlanItem::make_id(ItemType::Album, &album_ref.source_id);
        if !plan.contains(&album_id) {
            let album_item = PlanItem::new(ItemType::Album, &album_ref.source_id, &album_ref.name);
            plan.add_item(album_item)?;
        }

        let tracks = self
            .provider
            .album_tracks(&album_ref.source_id)
            .await
            .map_err(|e| PlanError::GenerationFailed {
                name: entry.name.clone(),
                message: e.to_string(),
            })?;
        for track in &tracks {
            self.insert_track(plan, track, &album_id, dedup);
        }

        if entry.create_m3u {
            self.add_m3u_sibling(plan, &album_id)?;
        }
        Ok(())
    }

    async fn add_artist_entry(
        &self,
        plan: &mut DownloadPlan,
        entry: &SourceEntry,
        dedup: &mut Dedup,
    ) -> Result<(), PlanError> {
        let artist_ref = match self.provider.resolve(&entry.url).await {
            Ok(CatalogResource::Artist(a)) => a,
            Ok(_) => {
                return Err(PlanError::GenerationFailed {
                    name: entry.name.clone(),
                    message: "expected an artist url in the artists list".to_string(),
                })
            }
            Err(e) => {
                return Err(PlanError::GenerationFailed {
                    name: entry.name.clone(),
                    message: e.to_string(),
                })
            }
        };

        let artist_id = PlanItem::make_id(ItemType::Artist, &artist_ref.source_id);
        if !plan.contains(&artist_id) {
            let artist_item =
                PlanItem::new(ItemType::Artist, &artist_ref.source_id, &artist_ref.name);
            plan.add_item(artist_item)?;
        }

        let albums = self
            .provider
            .artist_albums(&artist_ref.source_id)
            .await
            .map_err(|e| PlanError::GenerationFailed {
                name: entry.name.clone(),
                message: e.to_string(),
            })?;

        for album in &albums {
            let album_id = PlanItem::make_id(ItemType::Album, &album.source_id);
            if !plan.contains(&album_id) {
                let album_item = PlanItem::new(ItemType::Album, &album.source_id, &album.name);
                plan.add_item(album_item)?;
            }
            self.attach_child(plan, &artist_id, &album_id).await;

            let tracks = self
                .provider
                .album_tracks(&album.source_id)
                .await
                .map_err(|e| PlanError::GenerationFailed {
                    name: entry.name.clone(),
                    message: e.to_string(),
                })?;
            for track in &tracks {
                self.insert_track(plan, track, &album_id, dedup);
            }
        }

        if entry.create_m3u {
            self.add_m3u_sibling(plan, &artist_id)?;
        }
        Ok(())
    }

    async fn add_playlist_entry(
        &self,
        plan: &mut DownloadPlan,
        entry: &SourceEntry,
        dedup: &mut Dedup,
    ) -> Result<(), PlanError> {
        let playlist_ref = match self.provider.resolve(&entry.url).await {
            Ok(CatalogResource::Playlist(p)) => p,
            Ok(_) => {
                return Err(PlanError::GenerationFailed {
                    name: entry.name.clone(),
                    message: "expected a playlist url in the playlists list".to_string(),
                })
            }
            Err(e) => {
                return Err(PlanError::GenerationFailed {
                    name: entry.name.clone(),
                    message: e.to_string(),
                })
            }
        };

        let playlist_id = PlanItem::make_id(ItemType::Playlist, &playlist_ref.source_id);
        if !plan.contains(&playlist_id) {
            let playlist_item = PlanItem::new(
                ItemType::Playlist,
                &playlist_ref.source_id,
                &playlist_ref.name,
            );
            plan.add_item(playlist_item)?;
        }

        let mut cursor = None;
        loop {
            let page = self
                .provider
                .playlist_page(&playlist_ref.source_id, cursor.as_deref())
                .await
                .map_err(|e| PlanError::GenerationFailed {
                    name: entry.name.clone(),
                    message: e.to_string(),
                })?;
            for track in &page.tracks {
                self.insert_track(plan, track, &playlist_id, dedup);
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        if entry.create_m3u {
            self.add_m3u_sibling(plan, &playlist_id)?;
        }
        Ok(())
    }

    /// Adds a track item if unseen, or records an auxiliary `child_of`
    /// reference against the already-existing item for `parent_id` if seen
    /// before (dedup by `source_id`, §4.C/§9). Either way, `parent_id`'s
    /// `child_ids` records this track directly underneath it so container
    /// rollup and M3U generation can walk the tree without re-resolving
    /// source ids.
    fn insert_track(
        &self,
        plan: &mut DownloadPlan,
        track: &CatalogTrack,
        parent_id: &str,
        dedup: &mut Dedup,
    ) {
        if let Some(existing_id) = dedup.item_id_by_source.get(&track.source_id).cloned() {
            if !parent_id.is_empty() {
                if let Some(handle) = plan.get_item(&existing_id) {
                    if let Ok(mut item) = handle.try_lock() {
                        item.add_child_of(parent_id.to_string());
                    }
                }
                self.attach_child_sync(plan, parent_id, &existing_id);
            }
            return;
        }

        let mut item = PlanItem::new(ItemType::Track, &track.source_id, &track.title);
        item.source_url = track.url.clone();
        item.alt_url = track.alt_url.clone();
        item.parent_id = parent_id.to_string();
        item.metadata.insert(
            "artist_name".to_string(),
            serde_json::Value::String(track.artist_name.clone()),
        );
        item.metadata.insert(
            "album_name".to_string(),
            serde_json::Value::String(track.album_name.clone()),
        );
        item.metadata.insert(
            "track_number".to_string(),
            serde_json::Value::Number(track.track_number.into()),
        );
        item.metadata.insert(
            "disc_number".to_string(),
            serde_json::Value::Number(track.disc_number.into()),
        );
        if let Some(cover) = &track.cover_url {
            item.metadata
                .insert("cover_url".to_string(), serde_json::Value::String(cover.clone()));
        }
        item.metadata.insert(
            "explicit".to_string(),
            serde_json::Value::Bool(track.explicit),
        );

        let item_id = item.item_id.clone();
        // Duplicate ids cannot occur here since we just checked `dedup`
        // above and ids are derived deterministically from `source_id`.
        let _ = plan.add_item(item);
        dedup.item_id_by_source.insert(track.source_id.clone(), item_id.clone());
        self.attach_child_sync(plan, parent_id, &item_id);
    }

    fn add_m3u_sibling(&self, plan: &mut DownloadPlan, container_id: &str) -> Result<(), PlanError> {
        let container_handle = plan
            .get_item(container_id)
            .ok_or_else(|| PlanError::ItemNotFound {
                item_id: container_id.to_string(),
            })?;
        let (source_id, name) = {
            let container = container_handle
                .try_lock()
                .map_err(|_| PlanError::ItemNotFound {
                    item_id: container_id.to_string(),
                })?;
            (container.source_id.clone(), container.name.clone())
        };

        let mut m3u_item = PlanItem::new(ItemType::M3u, format!("{source_id}-m3u"), name);
        m3u_item.parent_id = container_id.to_string();
        let m3u_id = m3u_item.item_id.clone();
        plan.add_item(m3u_item)?;
        self.attach_child_sync(plan, container_id, &m3u_id);
        Ok(())
    }

    async fn attach_child(&self, plan: &mut DownloadPlan, parent_id: &str, child_id: &str) {
        self.attach_child_sync(plan, parent_id, child_id);
    }

    fn attach_child_sync(&self, plan: &mut DownloadPlan, parent_id: &str, child_id: &str) {
        if parent_id.is_empty() {
            return;
        }
        if let Some(handle) = plan.get_item(parent_id) {
            if let Ok(mut parent) = handle.try_lock() {
                if !parent.child_ids.contains(&child_id.to_string()) {
                    parent.child_ids.push(child_id.to_string());
                }
            }
        }
    }
}
