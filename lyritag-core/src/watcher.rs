//! Decides when host playback changes start, skip or stop lyrics sessions.

use crate::config::LyritagConfig;
use crate::host::Host;
use crate::playback::{ContentClass, NowPlaying, PlayerState, RecognizedTrack, TrackIdentity};
use crate::session::{SessionCoordinator, SessionHandle, SessionRequest, SessionTrigger};
use crate::clock::SyncAnchor;
use crate::store::StateChange;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const PLACEHOLDER_ENTITY_NOT_FOUND: &str = "Media player entity not found";
pub const PLACEHOLDER_WAITING: &str = "Waiting for playback to start";
pub const PLACEHOLDER_MISSING_METADATA: &str = "Missing track or artist";

/// Watcher tuning taken from `[host]` and `[lyrics]`
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    /// Player used for pause checks of tagging sessions when nothing is watched
    pub default_player: String,
    pub radio_prefixes: Vec<String>,
    /// Seconds subtracted from a recognized play offset
    pub finetune_sync_secs: f64,
    pub interrupt_on_pause: bool,
}

impl WatcherSettings {
    #[must_use]
    pub fn from_config(config: &LyritagConfig) -> Self {
        Self {
            default_player: config.host.media_player.clone(),
            radio_prefixes: config.lyrics.radio_prefixes.clone(),
            finetune_sync_secs: config.lyrics.finetune_sync_secs,
            interrupt_on_pause: config.lyrics.interrupt_on_pause,
        }
    }
}

/// What the watcher did with a playback change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchDecision {
    /// Not the watched entity, or nothing relevant changed
    Ignored,
    /// Same stream as the last one handled
    AlreadyProcessed,
    Started,
    /// New stream without title or artist
    MissingMetadata,
    RadioSuppressed,
    /// Playback stopped; any session was interrupted
    Interrupted,
}

/// Result of a `fetch_lyrics` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Started,
    EntityNotFound,
    NotPlaying,
    MissingMetadata,
    Radio,
}

/// Receives tracks identified by audio fingerprinting
#[async_trait]
pub trait RecognitionHandoff: Send + Sync {
    async fn track_recognized(&self, track: &RecognizedTrack);
}

#[derive(Debug, Default)]
struct WatchState {
    watched: Option<String>,
    last_processed: Option<String>,
}

/// Observes one media player and drives the session coordinator
pub struct PlaybackWatcher {
    host: Arc<dyn Host>,
    coordinator: Arc<SessionCoordinator>,
    settings: WatcherSettings,
    state: Mutex<WatchState>,
}

impl PlaybackWatcher {
    #[must_use]
    pub fn new(
        host: Arc<dyn Host>,
        coordinator: Arc<SessionCoordinator>,
        settings: WatcherSettings,
    ) -> Self {
        Self {
            host,
            coordinator,
            settings,
            state: Mutex::new(WatchState::default()),
        }
    }

    #[must_use]
    pub const fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    /// Entity currently watched
    pub async fn watched(&self) -> Option<String> {
        self.state.lock().await.watched.clone()
    }

    /// Handle a `fetch_lyrics` request.
    ///
    /// Stops the current session, watches `entity_id` from now on and, if it
    /// is playing a track, starts a session at its current position.
    pub async fn fetch_lyrics(&self, entity_id: &str) -> FetchOutcome {
        if self.coordinator.cancel_active().await {
            warn!("Stopping current lyrics session for new request");
        }

        {
            let mut state = self.state.lock().await;
            state.watched = Some(entity_id.to_string());
        }
        info!("Watching media player: {}", entity_id);

        let Some(now_playing) = self.host.now_playing(entity_id).await else {
            warn!("Media player entity {} not found", entity_id);
            self.coordinator
                .show_message(PLACEHOLDER_ENTITY_NOT_FOUND)
                .await;
            return FetchOutcome::EntityNotFound;
        };

        if !now_playing.state.is_playing() {
            info!("Media player is {}, waiting for playback", now_playing.state);
            self.coordinator.show_message(PLACEHOLDER_WAITING).await;
            return FetchOutcome::NotPlaying;
        }

        let Some(identity) = now_playing.identity() else {
            warn!("Missing track or artist information on {}", entity_id);
            self.coordinator
                .show_message(PLACEHOLDER_MISSING_METADATA)
                .await;
            return FetchOutcome::MissingMetadata;
        };

        let key = now_playing.media_key();
        if self.is_radio(&now_playing) {
            info!("Radio station detected on {}, not fetching lyrics", entity_id);
            self.state.lock().await.last_processed = key;
            return FetchOutcome::Radio;
        }

        self.state.lock().await.last_processed = key;
        self.coordinator
            .start(SessionRequest {
                track: identity,
                anchor: now_playing.current_anchor(),
                trigger: SessionTrigger::Command,
                player: Some(entity_id.to_string()),
            })
            .await;
        FetchOutcome::Started
    }

    /// React to a state change of `entity_id`
    pub async fn on_playback_changed(
        &self,
        entity_id: &str,
        previous: Option<&NowPlaying>,
        current: &NowPlaying,
    ) -> WatchDecision {
        let mut state = self.state.lock().await;
        if state.watched.as_deref() != Some(entity_id) {
            return WatchDecision::Ignored;
        }

        debug!(
            "Media player state changed: {} -> {}",
            previous.map_or_else(|| "none".to_string(), |p| p.state.to_string()),
            current.state
        );

        match current.state {
            PlayerState::Playing => {
                let Some(key) = current.media_key() else {
                    debug!("No content id or track metadata yet, skipping");
                    return WatchDecision::Ignored;
                };
                if state.last_processed.as_deref() == Some(key.as_str()) {
                    debug!("Track already processed, skipping lyrics fetch");
                    return WatchDecision::AlreadyProcessed;
                }

                if self.is_radio(current) {
                    info!("Radio station detected, lyrics lookup suppressed");
                    state.last_processed = Some(key);
                    drop(state);
                    self.coordinator.cancel_active().await;
                    return WatchDecision::RadioSuppressed;
                }

                info!("New media detected ({}), fetching lyrics", key);
                let identity = current.identity();
                if identity.is_some() {
                    state.last_processed = Some(key);
                }
                drop(state);
                self.coordinator.cancel_active().await;

                let Some(identity) = identity else {
                    warn!("Missing track or artist information");
                    return WatchDecision::MissingMetadata;
                };

                self.coordinator
                    .start(SessionRequest {
                        track: identity,
                        anchor: current.track_start_anchor(),
                        trigger: SessionTrigger::Playback,
                        player: Some(entity_id.to_string()),
                    })
                    .await;
                WatchDecision::Started
            }
            PlayerState::Paused if !self.settings.interrupt_on_pause => WatchDecision::Ignored,
            _ => {
                let transitioned = previous.map_or(true, |p| p.state != current.state);
                drop(state);
                if !transitioned {
                    return WatchDecision::Ignored;
                }
                if self.coordinator.cancel_active().await {
                    info!("Lyrics stopped (media player is {})", current.state);
                }
                WatchDecision::Interrupted
            }
        }
    }

    /// Anchor for a recognized offset, backed off by the fine-tune offset
    #[must_use]
    pub fn tagging_anchor(&self, play_offset_ms: u64, now: DateTime<Utc>) -> SyncAnchor {
        #[allow(clippy::cast_precision_loss)]
        let offset_secs = play_offset_ms as f64 / 1000.0;
        SyncAnchor::new((offset_secs - self.settings.finetune_sync_secs).max(0.0), now)
    }

    /// Start a session for a fingerprint match.
    ///
    /// Dropped when a tagging session is already live; any other session is
    /// replaced.
    pub async fn start_from_tagging(&self, track: &RecognizedTrack) -> Option<SessionHandle> {
        if track.title.is_empty() || track.artist.is_empty() {
            warn!("Cannot trigger lyrics lookup: missing title or artist");
            return None;
        }

        if self.coordinator.active_trigger().await == Some(SessionTrigger::Tagging) {
            info!("Lyrics loop already active from tagging, ignoring");
            return None;
        }

        let player = self
            .watched()
            .await
            .or_else(|| Some(self.settings.default_player.clone()))
            .filter(|player| !player.is_empty());
        let anchor = self.tagging_anchor(track.play_offset_ms, self.coordinator.clock().now());

        info!("Fetching lyrics for tagged song: {} - {}", track.artist, track.title);
        Some(
            self.coordinator
                .start(SessionRequest {
                    track: TrackIdentity::new(&track.title, &track.artist),
                    anchor,
                    trigger: SessionTrigger::Tagging,
                    player,
                })
                .await,
        )
    }

    fn is_radio(&self, now_playing: &NowPlaying) -> bool {
        ContentClass::classify(now_playing.content_id.as_deref(), &self.settings.radio_prefixes)
            == ContentClass::Radio
    }

    /// Start the watcher loop in a background task
    #[must_use]
    pub fn start(
        self: Arc<Self>,
        rx: broadcast::Receiver<StateChange>,
        cancel_token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(rx, cancel_token).await;
        })
    }

    /// Feed host state changes into [`Self::on_playback_changed`] until cancelled
    pub async fn run(
        &self,
        mut rx: broadcast::Receiver<StateChange>,
        cancel_token: CancellationToken,
    ) {
        info!("Initializing playback watcher");

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("Playback watcher shutting down");
                    break;
                }
                event = rx.recv() => {
                    match event {
                        Ok(change) => self.handle_change(&change).await,
                        Err(RecvError::Lagged(missed)) => {
                            warn!("Playback watcher missed {} state changes", missed);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    async fn handle_change(&self, change: &StateChange) {
        if self.watched().await.as_deref() != Some(change.entity_id.as_str()) {
            return;
        }
        let previous = change.old.as_ref().map(NowPlaying::from_entity);
        let current = NowPlaying::from_entity(&change.new);
        let decision = self
            .on_playback_changed(&change.entity_id, previous.as_ref(), &current)
            .await;
        debug!("Playback change on {}: {:?}", change.entity_id, decision);
    }
}

#[async_trait]
impl RecognitionHandoff for PlaybackWatcher {
    async fn track_recognized(&self, track: &RecognizedTrack) {
        self.start_from_tagging(track).await;
    }
}
