//! The invokable operations behind the HTTP command surface.

use crate::error::AppError;
use lyritag_core::{
    AddToPlaylistCommand, EntityStore, FetchAudioTagCommand, FetchLyricsCommand, FetchOutcome,
    PlaybackWatcher, RecognizedTrack, TaggingConfig,
};
use lyritag_spotify::{AddOutcome, PlaylistLinker};
use lyritag_tagging::{FingerprintTagger, TaggingRun};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Reply to `fetch_audio_tag`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggingSummary {
    pub matched: bool,
    pub attempts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<RecognizedTrack>,
}

impl From<&TaggingRun> for TaggingSummary {
    fn from(run: &TaggingRun) -> Self {
        Self {
            matched: run.is_match(),
            attempts: run.attempts.len(),
            track: run.track.clone(),
        }
    }
}

/// Reply to `add_to_spotify`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistSummary {
    pub saved: bool,
    pub outcome: &'static str,
}

impl From<&AddOutcome> for PlaylistSummary {
    fn from(outcome: &AddOutcome) -> Self {
        let label = match outcome {
            AddOutcome::Added(_) => "added",
            AddOutcome::AlreadyPresent(_) => "already_present",
            AddOutcome::NotFound => "not_found",
            AddOutcome::AuthorizationRequired => "authorization_required",
            AddOutcome::Failed(_) => "failed",
        };
        Self {
            saved: outcome.is_saved(),
            outcome: label,
        }
    }
}

pub struct Services {
    store: Arc<EntityStore>,
    watcher: Arc<PlaybackWatcher>,
    tagger: Option<Arc<FingerprintTagger>>,
    linker: Option<Arc<PlaylistLinker>>,
    tagging: TaggingConfig,
    last_tagged: Arc<Mutex<Option<RecognizedTrack>>>,
}

impl Services {
    #[must_use]
    pub fn new(
        store: Arc<EntityStore>,
        watcher: Arc<PlaybackWatcher>,
        tagger: Option<Arc<FingerprintTagger>>,
        linker: Option<Arc<PlaylistLinker>>,
        tagging: TaggingConfig,
    ) -> Self {
        Self {
            store,
            watcher,
            tagger,
            linker,
            tagging,
            last_tagged: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Track from the last successful tagging run
    pub async fn last_tagged(&self) -> Option<RecognizedTrack> {
        self.last_tagged.lock().await.clone()
    }

    /// `fetch_lyrics`
    ///
    /// # Errors
    ///
    /// Returns an error if the entity id is malformed.
    pub async fn fetch_lyrics(
        &self,
        command: &FetchLyricsCommand,
    ) -> Result<FetchOutcome, AppError> {
        command.validate()?;
        info!("fetch_lyrics called for {}", command.entity_id);
        Ok(self.watcher.fetch_lyrics(&command.entity_id).await)
    }

    /// `fetch_audio_tag`
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid payload, when tagging is not configured
    /// or while another run is in progress.
    pub async fn fetch_audio_tag(
        &self,
        command: &FetchAudioTagCommand,
    ) -> Result<TaggingSummary, AppError> {
        let request = command.resolve(
            self.tagging.default_duration_secs,
            self.tagging.include_lyrics,
        )?;
        let tagger = Arc::clone(self.tagger.as_ref().ok_or(AppError::Unavailable("tagging"))?);

        info!(
            "fetch_audio_tag called. Recording duration: {} seconds",
            request.duration_secs
        );
        let max_duration = Duration::from_secs(request.duration_secs);
        let chunk_duration = Duration::from_secs(self.tagging.chunk_secs);
        let linker = self.linker.clone();
        let last_tagged = Arc::clone(&self.last_tagged);

        // Runs detached so a caller that goes away does not abort the recording
        let task = tokio::spawn(async move {
            let run = tagger
                .run(max_duration, chunk_duration, request.include_lyrics)
                .await;
            if let Some(track) = &run.track {
                *last_tagged.lock().await = Some(track.clone());
                if let Some(linker) = linker.filter(|l| l.config().auto_add_tagged) {
                    linker.add_track_to_playlist(&track.title, &track.artist).await;
                }
            }
            run
        });
        let run = task.await?;
        if run.busy {
            return Err(AppError::Busy);
        }

        Ok(TaggingSummary::from(&run))
    }

    /// `add_to_spotify`
    ///
    /// # Errors
    ///
    /// Returns an error when Spotify is not configured or neither the payload
    /// nor the last tagged track names a track.
    pub async fn add_to_spotify(
        &self,
        command: &AddToPlaylistCommand,
    ) -> Result<PlaylistSummary, AppError> {
        let linker = self.linker.as_ref().ok_or(AppError::Unavailable("spotify"))?;
        let last = self.last_tagged().await;
        let track = command.resolve(last.as_ref())?;

        info!("add_to_spotify called for: {}", track);
        let outcome = linker
            .add_track_to_playlist(&track.title, &track.artist)
            .await;
        Ok(PlaylistSummary::from(&outcome))
    }
}
