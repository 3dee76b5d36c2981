//! Collaborator interfaces the host application provides.
//!
//! Every call is fire-and-forget from the caller's point of view: an adapter
//! that talks to a remote host logs its own failures.

use crate::lrc::DisplayLines;
use crate::playback::NowPlaying;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The three-line lyrics display
#[async_trait]
pub trait DisplaySink: Send + Sync {
    async fn show(&self, lines: &DisplayLines);

    async fn clear(&self) {
        self.show(&DisplayLines::default()).await;
    }
}

/// Queryable media player entities
#[async_trait]
pub trait NowPlayingSource: Send + Sync {
    /// `None` when the entity does not exist
    async fn now_playing(&self, entity_id: &str) -> Option<NowPlaying>;
}

/// Boolean gate for lyrics fetching
#[async_trait]
pub trait FeatureToggle: Send + Sync {
    async fn lyrics_enabled(&self) -> bool;
}

/// Switch that enables the microphone stream while recording
#[async_trait]
pub trait CaptureSwitch: Send + Sync {
    async fn set_capture(&self, enabled: bool);
}

/// Text entity holding the last tagging result
#[async_trait]
pub trait TaggingResultSink: Send + Sync {
    async fn set_tagging_result(&self, text: &str);
}

/// A persistent user notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    /// Notifications with the same id replace each other
    pub notification_id: String,
}

impl Notification {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        notification_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            notification_id: notification_id.into(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Everything the lyrics and tagging pipelines need from the host
pub trait Host:
    DisplaySink + NowPlayingSource + FeatureToggle + CaptureSwitch + TaggingResultSink + Notifier
{
}

impl<T> Host for T where
    T: DisplaySink + NowPlayingSource + FeatureToggle + CaptureSwitch + TaggingResultSink + Notifier
{
}

/// Short status text that must not overwrite a running lyrics session
#[async_trait]
pub trait StatusDisplay: Send + Sync {
    /// Show `text` in the middle slot.
    ///
    /// Returns a ticket for [`Self::clear_status`], or `None` if the display
    /// is busy and nothing was written.
    async fn show_status(&self, text: &str) -> Option<u64>;

    /// Blank the display if it still shows the status behind `ticket`
    async fn clear_status(&self, ticket: u64);
}
