//! In-process entity store standing in for the home automation host.
//!
//! Entities are `entity_id -> {state, attributes}` like the host's own state
//! machine. Every write is broadcast as a [`StateChange`], which is what the
//! playback watcher listens to.

use crate::host::{
    CaptureSwitch, DisplaySink, FeatureToggle, Notification, Notifier, NowPlayingSource,
    TaggingResultSink,
};
use crate::lrc::DisplayLines;
use crate::playback::NowPlaying;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

const EVENT_CAPACITY: usize = 256;

/// State and attributes of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl EntityState {
    pub fn new(state: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            state: state.into(),
            attributes,
            last_updated: Utc::now(),
        }
    }

    /// Equal state and attributes, ignoring the update timestamp
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.state == other.state && self.attributes == other.attributes
    }
}

/// Emitted for every entity write that changed something
#[derive(Debug, Clone)]
pub struct StateChange {
    pub entity_id: String,
    pub old: Option<EntityState>,
    pub new: EntityState,
}

struct StoreInner {
    entities: HashMap<String, EntityState>,
    notifications: Vec<Notification>,
}

/// Shared entity store
pub struct EntityStore {
    inner: RwLock<StoreInner>,
    event_tx: broadcast::Sender<StateChange>,
}

impl EntityStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            inner: RwLock::new(StoreInner {
                entities: HashMap::new(),
                notifications: Vec::new(),
            }),
            event_tx,
        })
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.event_tx.subscribe()
    }

    pub async fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.inner.read().await.entities.get(entity_id).cloned()
    }

    /// State string only
    pub async fn state_of(&self, entity_id: &str) -> Option<String> {
        self.get(entity_id).await.map(|entity| entity.state)
    }

    pub async fn all(&self) -> Vec<(String, EntityState)> {
        let inner = self.inner.read().await;
        let mut entities: Vec<_> = inner
            .entities
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect();
        entities.sort_by(|a, b| a.0.cmp(&b.0));
        entities
    }

    /// Replace an entity's state and attributes.
    ///
    /// Writes that change nothing are not broadcast.
    pub async fn set(&self, entity_id: &str, new: EntityState) {
        let mut inner = self.inner.write().await;
        let old = inner.entities.insert(entity_id.to_string(), new.clone());
        if old.as_ref().is_some_and(|old| old.same_content(&new)) {
            return;
        }

        debug!("State change: {} -> {}", entity_id, new.state);
        // Nobody listening is fine
        let _ = self.event_tx.send(StateChange {
            entity_id: entity_id.to_string(),
            old,
            new,
        });
    }

    /// Set the state string, keeping existing attributes
    pub async fn set_state(&self, entity_id: &str, state: &str) {
        let attributes = self
            .get(entity_id)
            .await
            .map(|entity| entity.attributes)
            .unwrap_or_default();
        self.set(entity_id, EntityState::new(state, attributes)).await;
    }

    /// Add or replace a notification by id
    pub async fn push_notification(&self, notification: Notification) {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .notifications
            .iter_mut()
            .find(|n| n.notification_id == notification.notification_id)
        {
            *existing = notification;
        } else {
            inner.notifications.push(notification);
        }
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.inner.read().await.notifications.clone()
    }

    pub async fn notification(&self, notification_id: &str) -> Option<Notification> {
        self.inner
            .read()
            .await
            .notifications
            .iter()
            .find(|n| n.notification_id == notification_id)
            .cloned()
    }
}

/// Entity ids the [`StoreHost`] writes to
#[derive(Debug, Clone)]
pub struct HostEntities {
    pub lyrics_enable: String,
    pub display_lines: [String; 3],
    pub capture_switch: String,
    pub tagging_result: String,
}

impl From<&crate::config::HostConfig> for HostEntities {
    fn from(config: &crate::config::HostConfig) -> Self {
        Self {
            lyrics_enable: config.lyrics_enable.clone(),
            display_lines: config.display_lines.clone(),
            capture_switch: config.capture_switch.clone(),
            tagging_result: config.tagging_result.clone(),
        }
    }
}

impl Default for HostEntities {
    fn default() -> Self {
        Self::from(&crate::config::HostConfig::default())
    }
}

/// Host collaborators backed by an [`EntityStore`]
#[derive(Clone)]
pub struct StoreHost {
    store: Arc<EntityStore>,
    entities: HostEntities,
}

impl StoreHost {
    #[must_use]
    pub const fn new(store: Arc<EntityStore>, entities: HostEntities) -> Self {
        Self { store, entities }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    #[must_use]
    pub const fn entities(&self) -> &HostEntities {
        &self.entities
    }

    /// Current content of the three display slots
    pub async fn displayed(&self) -> DisplayLines {
        let [previous, current, next] = &self.entities.display_lines;
        DisplayLines {
            previous: self.store.state_of(previous).await.unwrap_or_default(),
            current: self.store.state_of(current).await.unwrap_or_default(),
            next: self.store.state_of(next).await.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl DisplaySink for StoreHost {
    async fn show(&self, lines: &DisplayLines) {
        let [previous, current, next] = &self.entities.display_lines;
        self.store.set_state(previous, &lines.previous).await;
        self.store.set_state(current, &lines.current).await;
        self.store.set_state(next, &lines.next).await;
    }
}

#[async_trait]
impl NowPlayingSource for StoreHost {
    async fn now_playing(&self, entity_id: &str) -> Option<NowPlaying> {
        self.store
            .get(entity_id)
            .await
            .map(|entity| NowPlaying::from_entity(&entity))
    }
}

#[async_trait]
impl FeatureToggle for StoreHost {
    async fn lyrics_enabled(&self) -> bool {
        self.store
            .state_of(&self.entities.lyrics_enable)
            .await
            .is_some_and(|state| state == "on")
    }
}

#[async_trait]
impl CaptureSwitch for StoreHost {
    async fn set_capture(&self, enabled: bool) {
        let state = if enabled { "on" } else { "off" };
        self.store.set_state(&self.entities.capture_switch, state).await;
    }
}

#[async_trait]
impl TaggingResultSink for StoreHost {
    async fn set_tagging_result(&self, text: &str) {
        self.store.set_state(&self.entities.tagging_result, text).await;
    }
}

#[async_trait]
impl Notifier for StoreHost {
    async fn notify(&self, notification: Notification) {
        debug!(
            "Notification [{}]: {}",
            notification.notification_id, notification.title
        );
        self.store.push_notification(notification).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host() -> StoreHost {
        StoreHost::new(EntityStore::new(), HostEntities::default())
    }

    #[tokio::test]
    async fn test_set_broadcasts_changes_only() {
        let store = EntityStore::new();
        let mut rx = store.subscribe();

        store.set_state("sensor.a", "1").await;
        store.set_state("sensor.a", "1").await;
        store.set_state("sensor.a", "2").await;

        let first = rx.recv().await.unwrap();
        assert!(first.old.is_none());
        assert_eq!(first.new.state, "1");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.old.unwrap().state, "1");
        assert_eq!(second.new.state, "2");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_set_state_keeps_attributes() {
        let store = EntityStore::new();
        let attrs = json!({ "media_title": "Song" }).as_object().cloned().unwrap();
        store.set("media_player.a", EntityState::new("playing", attrs)).await;
        store.set_state("media_player.a", "paused").await;

        let entity = store.get("media_player.a").await.unwrap();
        assert_eq!(entity.state, "paused");
        assert_eq!(entity.attributes["media_title"], "Song");
    }

    #[tokio::test]
    async fn test_display_roundtrip() {
        let host = host();
        host.show(&DisplayLines::new("a", "b", "c")).await;
        assert_eq!(host.displayed().await, DisplayLines::new("a", "b", "c"));
        host.clear().await;
        assert!(host.displayed().await.is_empty());
        assert_eq!(
            host.store().state_of("input_text.line2").await.as_deref(),
            Some("")
        );
    }

    #[tokio::test]
    async fn test_lyrics_toggle() {
        let host = host();
        assert!(!host.lyrics_enabled().await);
        host.store().set_state("input_boolean.lyrics_enable", "on").await;
        assert!(host.lyrics_enabled().await);
        host.store().set_state("input_boolean.lyrics_enable", "off").await;
        assert!(!host.lyrics_enabled().await);
    }

    #[tokio::test]
    async fn test_capture_and_result() {
        let host = host();
        host.set_capture(true).await;
        assert_eq!(
            host.store().state_of("switch.tagging_enable").await.as_deref(),
            Some("on")
        );
        host.set_capture(false).await;
        host.set_tagging_result("No match").await;
        assert_eq!(
            host.store().state_of("switch.tagging_enable").await.as_deref(),
            Some("off")
        );
        assert_eq!(
            host.store().state_of("sensor.tagging_result").await.as_deref(),
            Some("No match")
        );
    }

    #[tokio::test]
    async fn test_notifications_dedup_by_id() {
        let host = host();
        host.notify(Notification::new("A", "first", "tagging_result")).await;
        host.notify(Notification::new("B", "other", "spotify_track_status")).await;
        host.notify(Notification::new("A", "second", "tagging_result")).await;

        let all = host.store().notifications().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "second");
        assert_eq!(
            host.store().notification("spotify_track_status").await.unwrap().title,
            "B"
        );
    }

    #[tokio::test]
    async fn test_now_playing_missing_entity() {
        let host = host();
        assert!(host.now_playing("media_player.none").await.is_none());
    }
}
