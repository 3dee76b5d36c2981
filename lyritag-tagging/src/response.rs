//! ACRCloud identification response.

use crate::error::Result;
use lyritag_core::{strip_cjk, RecognizedTrack};
use serde::Deserialize;

/// Status message ACRCloud sends with a match
pub const STATUS_SUCCESS: &str = "Success";

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionResponse {
    pub status: Status,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// The JSON exactly as received
    #[serde(skip)]
    pub raw_payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub code: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub music: Vec<MusicMatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MusicMatch {
    pub title: Option<String>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub play_offset_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Artist {
    pub name: String,
}

impl RecognitionResponse {
    /// Parse a response body, keeping the raw text.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a recognition response.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut response: Self = serde_json::from_str(raw)?;
        response.raw_payload = raw.to_string();
        Ok(response)
    }

    #[must_use]
    pub fn first_match(&self) -> Option<&MusicMatch> {
        self.metadata.as_ref().and_then(|m| m.music.first())
    }

    /// Success status with at least one match
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.msg == STATUS_SUCCESS && self.first_match().is_some()
    }

    /// The first match with CJK stripped and placeholders for missing names
    #[must_use]
    pub fn recognized_track(&self) -> Option<RecognizedTrack> {
        if !self.is_success() {
            return None;
        }
        let first = self.first_match()?;

        let title = cleaned_or(first.title.as_deref(), UNKNOWN_TITLE);
        let artist = cleaned_or(first.artists.first().map(|a| a.name.as_str()), UNKNOWN_ARTIST);

        Some(RecognizedTrack {
            title,
            artist,
            play_offset_ms: first.play_offset_ms,
        })
    }
}

fn cleaned_or(text: Option<&str>, fallback: &str) -> String {
    text.map(|t| strip_cjk(t).trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
