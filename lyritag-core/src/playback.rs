use crate::clock::SyncAnchor;
use crate::normalize::normalize_track_name;
use crate::store::EntityState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Media player state as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerState {
    Playing,
    Paused,
    Idle,
    /// Anything else the host reports (`off`, `buffering`, `unavailable`, ...)
    Other(String),
}

impl PlayerState {
    #[must_use]
    pub fn parse(state: &str) -> Self {
        match state {
            "playing" => Self::Playing,
            "paused" => Self::Paused,
            "idle" => Self::Idle,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub const fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
            Self::Idle => write!(f, "idle"),
            Self::Other(other) => write!(f, "{other}"),
        }
    }
}

/// Now-playing snapshot of a media player entity
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub state: PlayerState,
    pub title: Option<String>,
    pub artist: Option<String>,
    /// Position in seconds at `position_updated_at`
    pub position: Option<f64>,
    pub position_updated_at: Option<DateTime<Utc>>,
    pub content_id: Option<String>,
}

impl NowPlaying {
    /// Read the standard media player attributes from an entity
    #[must_use]
    pub fn from_entity(entity: &EntityState) -> Self {
        let attrs = &entity.attributes;
        Self {
            state: PlayerState::parse(&entity.state),
            title: non_empty_str(attrs.get("media_title")),
            artist: non_empty_str(attrs.get("media_artist")),
            position: attrs.get("media_position").and_then(Value::as_f64),
            position_updated_at: attrs
                .get("media_position_updated_at")
                .and_then(Value::as_str)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            content_id: non_empty_str(attrs.get("media_content_id")),
        }
    }

    /// Title and artist, if both are present
    #[must_use]
    pub fn identity(&self) -> Option<TrackIdentity> {
        match (&self.title, &self.artist) {
            (Some(title), Some(artist)) => Some(TrackIdentity::new(title, artist)),
            _ => None,
        }
    }

    /// Anchor at the host-reported position
    #[must_use]
    pub const fn current_anchor(&self) -> SyncAnchor {
        SyncAnchor {
            position_seconds: self.position,
            observed_at: self.position_updated_at,
        }
    }

    /// Anchor at the start of the track, observed when the host last
    /// updated the position
    #[must_use]
    pub const fn track_start_anchor(&self) -> SyncAnchor {
        SyncAnchor {
            position_seconds: Some(0.0),
            observed_at: self.position_updated_at,
        }
    }

    /// Key used to detect that this stream was already handled.
    ///
    /// The content id when the host provides one, otherwise the normalized
    /// title and artist.
    #[must_use]
    pub fn media_key(&self) -> Option<String> {
        self.content_id.clone().or_else(|| {
            self.identity()
                .map(|identity| format!("{}|{}", identity.lookup_title(), identity.artist))
        })
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Raw title and artist of a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackIdentity {
    pub title: String,
    pub artist: String,
}

impl TrackIdentity {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }

    /// Title normalized for lyrics lookup
    #[must_use]
    pub fn lookup_title(&self) -> String {
        normalize_track_name(&self.title)
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// A track identified by audio fingerprinting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedTrack {
    pub title: String,
    pub artist: String,
    /// Position within the track when the sample was taken
    pub play_offset_ms: u64,
}

/// What kind of stream a content id points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Radio,
    Track,
}

impl ContentClass {
    #[must_use]
    pub fn classify(content_id: Option<&str>, radio_prefixes: &[String]) -> Self {
        match content_id {
            Some(id) if radio_prefixes.iter().any(|prefix| id.starts_with(prefix.as_str())) => {
                Self::Radio
            }
            _ => Self::Track,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(state: &str, attributes: &Value) -> EntityState {
        EntityState::new(state, attributes.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_from_entity() {
        let e = entity(
            "playing",
            &json!({
                "media_title": "Yellow (Live)",
                "media_artist": "Coldplay",
                "media_position": 12.5,
                "media_position_updated_at": "2024-05-01T12:00:00+00:00",
                "media_content_id": "spotify:track:1",
            }),
        );
        let now_playing = NowPlaying::from_entity(&e);
        assert_eq!(now_playing.state, PlayerState::Playing);
        assert_eq!(now_playing.position, Some(12.5));
        assert!(now_playing.position_updated_at.is_some());
        assert_eq!(now_playing.media_key().as_deref(), Some("spotify:track:1"));
        assert_eq!(now_playing.identity().unwrap().lookup_title(), "Yellow");
    }

    #[test]
    fn test_missing_metadata() {
        let e = entity("paused", &json!({ "media_title": "  ", "media_position": "bogus" }));
        let now_playing = NowPlaying::from_entity(&e);
        assert_eq!(now_playing.state, PlayerState::Paused);
        assert!(now_playing.identity().is_none());
        assert!(now_playing.position.is_none());
        assert!(now_playing.media_key().is_none());
        assert!(!now_playing.current_anchor().is_complete());
    }

    #[test]
    fn test_media_key_falls_back_to_identity() {
        let e = entity(
            "playing",
            &json!({ "media_title": "Song (Remix)", "media_artist": "Band" }),
        );
        assert_eq!(
            NowPlaying::from_entity(&e).media_key().as_deref(),
            Some("Song|Band")
        );
    }

    #[test]
    fn test_player_state_parse() {
        assert_eq!(PlayerState::parse("idle"), PlayerState::Idle);
        assert_eq!(
            PlayerState::parse("buffering"),
            PlayerState::Other("buffering".into())
        );
        assert_eq!(PlayerState::parse("off").to_string(), "off");
    }

    #[test]
    fn test_classify_radio() {
        let prefixes = vec!["library://radio".to_string()];
        assert_eq!(
            ContentClass::classify(Some("library://radio/12"), &prefixes),
            ContentClass::Radio
        );
        assert_eq!(
            ContentClass::classify(Some("library://track/12"), &prefixes),
            ContentClass::Track
        );
        assert_eq!(ContentClass::classify(None, &prefixes), ContentClass::Track);
    }
}
