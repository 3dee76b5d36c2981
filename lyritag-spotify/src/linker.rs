//! Adds tagged tracks to a Spotify playlist.
//!
//! Every outcome the user cares about is reported through host notifications;
//! nothing here is fatal to the rest of the process.

use crate::config::SpotifyLinkerConfig;
use crate::error::{Result, SpotifyError};
use crate::oauth::SpotifyOAuth;
use crate::store::TokenStore;
use lyritag_core::{Notification, Notifier};
use rspotify::model::{
    PlayableId, PlayableItem, PlaylistId, SearchResult, SearchType, TrackId, UserId,
};
use rspotify::prelude::*;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub const NOTIFICATION_TRACK_STATUS: &str = "spotify_track_status";
pub const NOTIFICATION_PLAYLIST_CREATED: &str = "spotify_playlist_created";
pub const NOTIFICATION_AUTH_REQUIRED: &str = "spotify_auth_required";

/// Playlist items fetched per request
pub const PAGE_SIZE: u32 = 100;

const PLAYLIST_DESCRIPTION: &str = "Tracks identified by Home Assistant ACR";

/// Best catalog match for a title and artist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundTrack {
    pub id: TrackId<'static>,
    pub name: String,
    pub artist: String,
}

/// What `add_track_to_playlist` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(FoundTrack),
    AlreadyPresent(FoundTrack),
    NotFound,
    AuthorizationRequired,
    Failed(String),
}

impl AddOutcome {
    #[must_use]
    pub const fn is_saved(&self) -> bool {
        matches!(self, Self::Added(_) | Self::AlreadyPresent(_))
    }
}

/// `track:{title} artist:{artist}`
#[must_use]
pub fn search_query(title: &str, artist: &str) -> String {
    format!("track:{title} artist:{artist}")
}

/// Offset of the page after `offset`, if any items remain
#[must_use]
pub fn next_offset(offset: u32, total: u32) -> Option<u32> {
    let next = offset.saturating_add(PAGE_SIZE);
    (next < total).then_some(next)
}

pub struct PlaylistLinker {
    oauth: SpotifyOAuth,
    notifier: Arc<dyn Notifier>,
    config: SpotifyLinkerConfig,
    playlist_id: Mutex<Option<String>>,
}

impl PlaylistLinker {
    #[must_use]
    pub fn new(
        config: SpotifyLinkerConfig,
        store: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let oauth = SpotifyOAuth::new(&config, store);
        let playlist_id = config.playlist_id().map(ToString::to_string);
        Self {
            oauth,
            notifier,
            config,
            playlist_id: Mutex::new(playlist_id),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SpotifyLinkerConfig {
        &self.config
    }

    #[must_use]
    pub const fn oauth(&self) -> &SpotifyOAuth {
        &self.oauth
    }

    /// Playlist tracks are added to
    pub async fn playlist_id(&self) -> Option<String> {
        self.playlist_id.lock().await.clone()
    }

    /// Restore persisted tokens and create the discovery playlist if needed.
    ///
    /// Returns whether the linker is authorized.
    pub async fn setup(&self) -> bool {
        match self.oauth.load_cached_token().await {
            Ok(true) => {}
            Ok(false) => {
                info!("Spotify not authorized yet, visit the authorization URL to link an account");
                return false;
            }
            Err(e) => {
                warn!("Could not restore Spotify token: {}", e);
                return false;
            }
        }

        if self.playlist_id().await.is_none() && self.config.create_playlist {
            if let Err(e) = self.create_playlist().await {
                error!("Failed to create Spotify playlist: {}", e);
            }
        }
        true
    }

    pub async fn is_authorized(&self) -> bool {
        self.oauth.is_authorized().await
    }

    /// # Errors
    ///
    /// Returns an error if the authorization URL cannot be generated.
    pub fn authorize_url(&self) -> Result<String> {
        self.oauth.authorize_url()
    }

    /// Complete authorization with the code from the OAuth callback
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or the token cannot be persisted.
    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        self.oauth.exchange_code(code).await?;

        if self.playlist_id().await.is_none() && self.config.create_playlist {
            if let Err(e) = self.create_playlist().await {
                error!("Failed to create Spotify playlist: {}", e);
            }
        }
        Ok(())
    }

    /// Create the discovery playlist and remember its id
    ///
    /// # Errors
    ///
    /// Returns an error if unauthorized or the API call fails.
    pub async fn create_playlist(&self) -> Result<String> {
        self.oauth.ensure_token_fresh().await?;
        let user_id = self
            .oauth
            .user_id()
            .await
            .ok_or_else(|| SpotifyError::AuthFailed {
                reason: "No Spotify user id recorded".into(),
            })?;

        let playlist = self
            .oauth
            .client()
            .user_playlist_create(
                UserId::from_id(user_id.as_str())?,
                &self.config.playlist_name,
                Some(false),
                None,
                Some(PLAYLIST_DESCRIPTION),
            )
            .await?;

        let id = playlist.id.id().to_string();
        *self.playlist_id.lock().await = Some(id.clone());
        info!(
            "Created new Spotify playlist: {} (ID: {})",
            self.config.playlist_name, id
        );

        self.notify(
            "Spotify Playlist Created",
            format!(
                "Created new playlist '{}' for discovered tracks.",
                self.config.playlist_name
            ),
            NOTIFICATION_PLAYLIST_CREATED,
        )
        .await;
        Ok(id)
    }

    /// First catalog match for a title and artist
    ///
    /// # Errors
    ///
    /// Returns an error if unauthorized or the search fails.
    pub async fn search_track(&self, title: &str, artist: &str) -> Result<Option<FoundTrack>> {
        self.oauth.ensure_token_fresh().await?;
        let result = self
            .oauth
            .client()
            .search(
                &search_query(title, artist),
                SearchType::Track,
                None,
                None,
                Some(1),
                None,
            )
            .await?;

        let SearchResult::Tracks(page) = result else {
            return Ok(None);
        };
        Ok(page.items.into_iter().find_map(|track| {
            let id = track.id?;
            Some(FoundTrack {
                id,
                artist: track
                    .artists
                    .first()
                    .map(|a| a.name.clone())
                    .unwrap_or_default(),
                name: track.name,
            })
        }))
    }

    /// Scan the playlist page by page for `track_id`
    ///
    /// # Errors
    ///
    /// Returns an error if unauthorized or a page request fails.
    pub async fn check_track_in_playlist(
        &self,
        playlist_id: &str,
        track_id: &TrackId<'_>,
    ) -> Result<bool> {
        self.oauth.ensure_token_fresh().await?;
        let playlist = PlaylistId::from_id_or_uri(playlist_id)?;

        let mut offset = 0;
        loop {
            let page = self
                .oauth
                .client()
                .playlist_items_manual(
                    playlist.as_ref(),
                    None,
                    None,
                    Some(PAGE_SIZE),
                    Some(offset),
                )
                .await?;

            let found = page.items.iter().any(|item| {
                matches!(&item.track, Some(PlayableItem::Track(track))
                    if track.id.as_ref().is_some_and(|id| id.id() == track_id.id()))
            });
            if found {
                return Ok(true);
            }

            match next_offset(offset, page.total) {
                Some(next) => offset = next,
                None => return Ok(false),
            }
        }
    }

    /// Search, skip if already present, add, and report the result.
    pub async fn add_track_to_playlist(&self, title: &str, artist: &str) -> AddOutcome {
        if !self.is_authorized().await {
            self.request_authorization().await;
            return AddOutcome::AuthorizationRequired;
        }

        let playlist_id = match self.playlist_id().await {
            Some(id) => id,
            None if self.config.create_playlist => match self.create_playlist().await {
                Ok(id) => id,
                Err(e) => {
                    error!("Failed to create playlist: {}", e);
                    return AddOutcome::Failed(e.to_string());
                }
            },
            None => {
                error!("No playlist ID provided");
                return AddOutcome::Failed(SpotifyError::NoPlaylist.to_string());
            }
        };

        let found = match self.search_track(title, artist).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                warn!("No Spotify track found for: {} - {}", title, artist);
                self.notify(
                    "Spotify Track Not Found",
                    format!("Could not find '{title}' by {artist} on Spotify."),
                    NOTIFICATION_TRACK_STATUS,
                )
                .await;
                return AddOutcome::NotFound;
            }
            Err(e) => return self.report_failure(e).await,
        };

        match self.check_track_in_playlist(&playlist_id, &found.id).await {
            Ok(true) => {
                self.notify(
                    "Spotify Track Already Saved",
                    format!(
                        "The track '{}' by {} is already in your playlist.",
                        found.name, found.artist
                    ),
                    NOTIFICATION_TRACK_STATUS,
                )
                .await;
                return AddOutcome::AlreadyPresent(found);
            }
            Ok(false) => {}
            // A failed scan should not block adding
            Err(e) => warn!("Could not check playlist contents: {}", e),
        }

        let added = async {
            let playlist = PlaylistId::from_id_or_uri(&playlist_id)?;
            self.oauth
                .client()
                .playlist_add_items(
                    playlist,
                    [PlayableId::Track(found.id.as_ref())],
                    None,
                )
                .await?;
            Ok::<(), SpotifyError>(())
        }
        .await;

        match added {
            Ok(()) => {
                info!("Added {} - {} to playlist {}", found.artist, found.name, playlist_id);
                self.notify(
                    "Added Track to Spotify",
                    format!(
                        "Successfully added '{}' by {} to your Spotify playlist.",
                        found.name, found.artist
                    ),
                    NOTIFICATION_TRACK_STATUS,
                )
                .await;
                AddOutcome::Added(found)
            }
            Err(e) => self.report_failure(e).await,
        }
    }

    async fn request_authorization(&self) {
        let message = match self.authorize_url() {
            Ok(url) => format!(
                "Spotify authorization required to add tracks to playlists. [Click here to authorize]({url})"
            ),
            Err(e) => {
                error!("{}", e);
                "Spotify authorization required to add tracks to playlists.".to_string()
            }
        };
        self.notify(
            "Spotify Authorization Required",
            message,
            NOTIFICATION_AUTH_REQUIRED,
        )
        .await;
    }

    async fn report_failure(&self, e: SpotifyError) -> AddOutcome {
        error!("Error adding track to playlist: {}", e);
        self.notify(
            "Spotify Error",
            format!("Failed to add track to playlist: {e}"),
            NOTIFICATION_TRACK_STATUS,
        )
        .await;
        AddOutcome::Failed(e.to_string())
    }

    async fn notify(&self, title: &str, message: String, notification_id: &str) {
        self.notifier
            .notify(Notification::new(title, message, notification_id))
            .await;
    }
}
