//! Payload schemas of the invokable operations.

use crate::error::{CoreError, Result};
use crate::playback::{RecognizedTrack, TrackIdentity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Accepted recording length in seconds
pub const DURATION_RANGE: std::ops::RangeInclusive<u64> = 1..=60;

fn invalid(reason: impl Into<String>) -> CoreError {
    CoreError::InvalidCommand {
        reason: reason.into(),
    }
}

/// Check that `entity_id` looks like `domain.object_id`
///
/// # Errors
///
/// Returns `InvalidCommand` if either part is empty or contains anything but
/// lowercase ASCII letters, digits and underscores.
pub fn validate_entity_id(entity_id: &str) -> Result<()> {
    let valid_part =
        |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    match entity_id.split_once('.') {
        Some((domain, object_id)) if valid_part(domain) && valid_part(object_id) => Ok(()),
        _ => Err(invalid(format!("invalid entity id: {entity_id:?}"))),
    }
}

/// `fetch_lyrics { entity_id }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchLyricsCommand {
    pub entity_id: String,
}

impl FetchLyricsCommand {
    /// # Errors
    ///
    /// Returns `InvalidCommand` for a malformed entity id.
    pub fn validate(&self) -> Result<()> {
        validate_entity_id(&self.entity_id)
    }
}

/// `fetch_audio_tag { duration?, include_lyrics? }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchAudioTagCommand {
    /// Integer seconds; numeric strings are coerced
    #[serde(default)]
    pub duration: Option<Value>,
    #[serde(default)]
    pub include_lyrics: Option<bool>,
}

/// Validated tagging parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTagRequest {
    pub duration_secs: u64,
    pub include_lyrics: bool,
}

impl FetchAudioTagCommand {
    /// Apply defaults and validate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCommand` if `duration` is not an integer in 1..=60.
    pub fn resolve(&self, default_duration: u64, default_include_lyrics: bool) -> Result<AudioTagRequest> {
        let duration_secs = match &self.duration {
            None | Some(Value::Null) => default_duration,
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| invalid(format!("duration must be an integer, got {n}")))?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid(format!("duration must be an integer, got {s:?}")))?,
            Some(other) => return Err(invalid(format!("duration must be an integer, got {other}"))),
        };

        if !DURATION_RANGE.contains(&duration_secs) {
            return Err(invalid(format!(
                "duration must be between {} and {} seconds, got {duration_secs}",
                DURATION_RANGE.start(),
                DURATION_RANGE.end()
            )));
        }

        Ok(AudioTagRequest {
            duration_secs,
            include_lyrics: self.include_lyrics.unwrap_or(default_include_lyrics),
        })
    }
}

/// `add_to_spotify { title?, artist? }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddToPlaylistCommand {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
}

impl AddToPlaylistCommand {
    /// Fill missing fields from the last tagged track.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCommand` when neither the payload nor the fallback
    /// provides both title and artist.
    pub fn resolve(&self, last_tagged: Option<&RecognizedTrack>) -> Result<TrackIdentity> {
        let title = pick(self.title.as_ref(), last_tagged.map(|t| &t.title));
        let artist = pick(self.artist.as_ref(), last_tagged.map(|t| &t.artist));

        match (title, artist) {
            (Some(title), Some(artist)) => Ok(TrackIdentity::new(title, artist)),
            _ => Err(invalid("title and artist are required when nothing has been tagged yet")),
        }
    }
}

fn pick(given: Option<&String>, fallback: Option<&String>) -> Option<String> {
    given
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .or_else(|| fallback.map(String::as_str))
        .map(ToString::to_string)
}
