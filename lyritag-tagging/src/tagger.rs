//! Chunked fingerprint tagging.
//!
//! A run records fixed-length chunks one after another and submits each to
//! the recognition provider, stopping at the first match.

use crate::acrcloud::RecognitionProvider;
use crate::recorder::ChunkSource;
use crate::response::RecognitionResponse;
use async_trait::async_trait;
use lyritag_core::{
    DisplayLines, DurationExt, Host, Notification, RecognitionHandoff, RecognizedTrack,
    StatusDisplay,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub const PLACEHOLDER_LISTENING: &str = "Listening......";
pub const RESULT_NO_MATCH: &str = "No match";
pub const MESSAGE_NO_MUSIC: &str = "No music recognized.";

pub const NOTIFICATION_FULL_RESULT: &str = "tagging_full_result";
pub const NOTIFICATION_RESULT: &str = "tagging_result";

/// Outcome of one submitted chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Matched(RecognizedTrack),
    /// Provider answered without a match, with its status message
    NoMatch(String),
    /// Capture or provider fault
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionAttempt {
    /// Zero-based
    pub chunk_index: u32,
    /// Size of the submitted WAV in bytes
    pub audio_len: usize,
    pub result: AttemptResult,
}

/// Summary of a tagging run
#[derive(Debug, Clone, Default)]
pub struct TaggingRun {
    pub attempts: Vec<RecognitionAttempt>,
    pub track: Option<RecognizedTrack>,
    /// Raw provider JSON of the matching response
    pub raw_payload: Option<String>,
    /// Another run held the capture source; nothing was recorded
    pub busy: bool,
}

impl TaggingRun {
    fn busy() -> Self {
        Self {
            busy: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_match(&self) -> bool {
        self.track.is_some()
    }
}

/// Number of chunks needed to cover `max_duration`, at least one
#[must_use]
pub fn attempts_for(max_duration: Duration, chunk_duration: Duration) -> u32 {
    let chunk_ms = chunk_duration.as_millis();
    if chunk_ms == 0 {
        return 1;
    }
    u32::try_from(max_duration.as_millis().div_ceil(chunk_ms))
        .unwrap_or(u32::MAX)
        .max(1)
}

/// `Title - Artist (M:SS)`
#[must_use]
pub fn summary(track: &RecognizedTrack) -> String {
    format!(
        "{} - {} ({})",
        track.title,
        track.artist,
        Duration::from_millis(track.play_offset_ms).as_play_time()
    )
}

fn result_message(track: &RecognizedTrack) -> String {
    format!(
        "🎵 **Title**: {}\n👤 **Artist**: {}\n⏱️ **Play Offset**: {} (MM:SS)",
        track.title,
        track.artist,
        Duration::from_millis(track.play_offset_ms).as_play_time()
    )
}

/// Writes status text straight to the host display
struct HostStatus(Arc<dyn Host>);

#[async_trait]
impl StatusDisplay for HostStatus {
    async fn show_status(&self, text: &str) -> Option<u64> {
        self.0.show(&DisplayLines::message(text)).await;
        Some(0)
    }

    async fn clear_status(&self, _ticket: u64) {
        self.0.clear().await;
    }
}

/// Turns capture off and removes the status when a run ends, also when the
/// run's future is dropped before it finishes
struct CaptureGuard {
    host: Arc<dyn Host>,
    status: Arc<dyn StatusDisplay>,
    ticket: Option<u64>,
    armed: bool,
}

impl CaptureGuard {
    async fn release(mut self) {
        self.armed = false;
        reset_capture(self.host.as_ref(), self.status.as_ref(), self.ticket).await;
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Tagging run abandoned, turning capture off");
        let host = Arc::clone(&self.host);
        let status = Arc::clone(&self.status);
        let ticket = self.ticket;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    reset_capture(host.as_ref(), status.as_ref(), ticket).await;
                });
            }
            Err(e) => error!("Could not turn capture off: {}", e),
        }
    }
}

async fn reset_capture(host: &dyn Host, status: &dyn StatusDisplay, ticket: Option<u64>) {
    host.set_capture(false).await;
    if let Some(ticket) = ticket {
        status.clear_status(ticket).await;
    }
}

pub struct FingerprintTagger {
    host: Arc<dyn Host>,
    source: Arc<dyn ChunkSource>,
    provider: Arc<dyn RecognitionProvider>,
    handoff: Option<Arc<dyn RecognitionHandoff>>,
    status: Arc<dyn StatusDisplay>,
    running: Mutex<()>,
}

impl FingerprintTagger {
    #[must_use]
    pub fn new(
        host: Arc<dyn Host>,
        source: Arc<dyn ChunkSource>,
        provider: Arc<dyn RecognitionProvider>,
    ) -> Self {
        Self {
            status: Arc::new(HostStatus(Arc::clone(&host))),
            host,
            source,
            provider,
            handoff: None,
            running: Mutex::new(()),
        }
    }

    /// Show "Listening" through `status` instead of writing the display directly
    #[must_use]
    pub fn with_status_display(mut self, status: Arc<dyn StatusDisplay>) -> Self {
        self.status = status;
        self
    }

    /// Where matches go when lyrics are requested
    #[must_use]
    pub fn with_handoff(mut self, handoff: Arc<dyn RecognitionHandoff>) -> Self {
        self.handoff = Some(handoff);
        self
    }

    /// Record and identify until the first match or `max_duration` is covered.
    ///
    /// Never fails: faults are logged and count as a failed attempt. The
    /// capture switch is always turned off again, even if this future is
    /// dropped before it completes.
    pub async fn run(
        &self,
        max_duration: Duration,
        chunk_duration: Duration,
        include_lyrics: bool,
    ) -> TaggingRun {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("Tagging already in progress, ignoring request");
            return TaggingRun::busy();
        };

        let total = attempts_for(max_duration, chunk_duration);
        info!(
            "Starting tagging: up to {} chunks of {}s",
            total,
            chunk_duration.as_secs()
        );

        self.host.set_capture(true).await;
        let mut guard = CaptureGuard {
            host: Arc::clone(&self.host),
            status: Arc::clone(&self.status),
            ticket: None,
            armed: true,
        };
        guard.ticket = self.status.show_status(PLACEHOLDER_LISTENING).await;

        let mut run = TaggingRun::default();
        for chunk_index in 0..total {
            let (attempt, response) = self.attempt(chunk_index, chunk_duration).await;
            let matched = match &attempt.result {
                AttemptResult::Matched(track) => Some(track.clone()),
                AttemptResult::NoMatch(status) => {
                    info!("Chunk {} not recognized: {}", chunk_index + 1, status);
                    None
                }
                AttemptResult::Failed(reason) => {
                    error!("Chunk {} failed: {}", chunk_index + 1, reason);
                    None
                }
            };
            run.attempts.push(attempt);

            if let Some(track) = matched {
                run.track = Some(track);
                run.raw_payload = response.map(|r| r.raw_payload);
                break;
            }
        }

        guard.release().await;

        if let Some(track) = &run.track {
            self.report_match(track, run.raw_payload.as_deref().unwrap_or_default())
                .await;
            if include_lyrics {
                if let Some(handoff) = &self.handoff {
                    handoff.track_recognized(track).await;
                }
            }
        } else {
            self.report_no_match().await;
        }

        run
    }

    async fn attempt(
        &self,
        chunk_index: u32,
        chunk_duration: Duration,
    ) -> (RecognitionAttempt, Option<RecognitionResponse>) {
        let wav = match self.source.record(chunk_duration).await {
            Ok(wav) => wav,
            Err(e) => {
                let attempt = RecognitionAttempt {
                    chunk_index,
                    audio_len: 0,
                    result: AttemptResult::Failed(e.to_string()),
                };
                return (attempt, None);
            }
        };
        let audio_len = wav.len();
        info!(
            "Recorded chunk {} ({} bytes), sending to {}",
            chunk_index + 1,
            audio_len,
            self.provider.name()
        );

        match self.provider.identify(wav).await {
            Ok(response) => {
                let result = response.recognized_track().map_or_else(
                    || AttemptResult::NoMatch(response.status.msg.clone()),
                    AttemptResult::Matched,
                );
                let attempt = RecognitionAttempt {
                    chunk_index,
                    audio_len,
                    result,
                };
                (attempt, Some(response))
            }
            Err(e) => {
                let attempt = RecognitionAttempt {
                    chunk_index,
                    audio_len,
                    result: AttemptResult::Failed(e.to_string()),
                };
                (attempt, None)
            }
        }
    }

    async fn report_match(&self, track: &RecognizedTrack, raw_payload: &str) {
        info!("Recognized: {}", summary(track));
        self.host.set_tagging_result(&summary(track)).await;
        self.host
            .notify(Notification::new(
                "Audio Tagging Full Result",
                format!("```json\n{raw_payload}\n```"),
                NOTIFICATION_FULL_RESULT,
            ))
            .await;
        self.host
            .notify(Notification::new(
                "Audio Tagging Result",
                result_message(track),
                NOTIFICATION_RESULT,
            ))
            .await;
    }

    async fn report_no_match(&self) {
        info!("No music recognized");
        self.host.set_tagging_result(RESULT_NO_MATCH).await;
        self.host
            .notify(Notification::new(
                "Audio Tagging Result",
                MESSAGE_NO_MUSIC,
                NOTIFICATION_RESULT,
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TaggingError};
    use lyritag_core::DisplaySink;
    use lyritag_core::{EntityStore, HostEntities, StoreHost};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NO_RESULT: &str = r#"{"status": {"msg": "No result", "code": 1001}}"#;
    const MATCH: &str = r#"{"status": {"msg": "Success", "code": 0},
        "metadata": {"music": [{"title": "Song X", "artists": [{"name": "Artist Y"}], "play_offset_ms": 45000}]}}"#;

    /// Sleeps for the chunk length and returns a fixed sample
    struct SilentSource;

    #[async_trait]
    impl ChunkSource for SilentSource {
        async fn record(&self, duration: Duration) -> Result<Vec<u8>> {
            tokio::time::sleep(duration).await;
            Ok(vec![0; 64])
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl ChunkSource for BrokenSource {
        async fn record(&self, _duration: Duration) -> Result<Vec<u8>> {
            Err(TaggingError::Capture(std::io::Error::other("socket closed")))
        }
    }

    /// Replies from a script; answers "No result" once it runs out
    struct ScriptedProvider {
        replies: std::sync::Mutex<VecDeque<Option<&'static str>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Option<&'static str>>) -> Arc<Self> {
            Arc::new(Self {
                replies: std::sync::Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecognitionProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn identify(&self, _wav: Vec<u8>) -> Result<RecognitionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Some(NO_RESULT));
            match reply {
                Some(body) => RecognitionResponse::parse(body),
                None => Err(TaggingError::Http {
                    status: 500,
                    body: "boom".into(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingHandoff {
        tracks: std::sync::Mutex<Vec<RecognizedTrack>>,
    }

    #[async_trait]
    impl RecognitionHandoff for RecordingHandoff {
        async fn track_recognized(&self, track: &RecognizedTrack) {
            self.tracks.lock().unwrap().push(track.clone());
        }
    }

    struct Fixture {
        host: Arc<StoreHost>,
        provider: Arc<ScriptedProvider>,
        handoff: Arc<RecordingHandoff>,
        tagger: Arc<FingerprintTagger>,
    }

    fn fixture_with(source: Arc<dyn ChunkSource>, replies: Vec<Option<&'static str>>) -> Fixture {
        let host = Arc::new(StoreHost::new(EntityStore::new(), HostEntities::default()));
        let provider = ScriptedProvider::new(replies);
        let handoff = Arc::new(RecordingHandoff::default());
        let tagger = Arc::new(
            FingerprintTagger::new(host.clone(), source, provider.clone())
                .with_handoff(handoff.clone()),
        );
        Fixture {
            host,
            provider,
            handoff,
            tagger,
        }
    }

    fn fixture(replies: Vec<Option<&'static str>>) -> Fixture {
        fixture_with(Arc::new(SilentSource), replies)
    }

    const SECS_12: Duration = Duration::from_secs(12);
    const SECS_3: Duration = Duration::from_secs(3);

    #[test]
    fn test_attempts_for() {
        assert_eq!(attempts_for(SECS_12, SECS_3), 4);
        assert_eq!(attempts_for(Duration::from_secs(10), SECS_3), 4);
        assert_eq!(attempts_for(Duration::from_secs(2), SECS_3), 1);
        assert_eq!(attempts_for(SECS_3, Duration::ZERO), 1);
    }

    #[test]
    fn test_summary_format() {
        let track = RecognizedTrack {
            title: "Song X".into(),
            artist: "Artist Y".into(),
            play_offset_ms: 125_900,
        };
        assert_eq!(summary(&track), "Song X - Artist Y (2:05)");
        assert_eq!(
            result_message(&track),
            "🎵 **Title**: Song X\n👤 **Artist**: Artist Y\n⏱️ **Play Offset**: 2:05 (MM:SS)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_chunks_without_match() {
        let f = fixture(vec![]);
        let run = f.tagger.run(SECS_12, SECS_3, true).await;

        assert_eq!(f.provider.calls(), 4);
        assert_eq!(run.attempts.len(), 4);
        assert!(!run.is_match());
        assert!(run
            .attempts
            .iter()
            .all(|a| a.result == AttemptResult::NoMatch("No result".into())));

        let store = f.host.store();
        assert_eq!(
            store.state_of("sensor.tagging_result").await.as_deref(),
            Some(RESULT_NO_MATCH)
        );
        assert_eq!(
            store.notification(NOTIFICATION_RESULT).await.unwrap().message,
            MESSAGE_NO_MUSIC
        );
        assert!(f.handoff.tracks.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_match() {
        let f = fixture(vec![Some(NO_RESULT), Some(MATCH), Some(MATCH)]);
        let start = tokio::time::Instant::now();
        let run = f.tagger.run(SECS_12, SECS_3, true).await;

        assert_eq!(f.provider.calls(), 2);
        assert_eq!(run.attempts.len(), 2);
        assert_eq!(run.attempts[1].chunk_index, 1);
        assert_eq!(run.attempts[1].audio_len, 64);
        assert_eq!(start.elapsed(), Duration::from_secs(6));

        let track = run.track.clone().unwrap();
        assert_eq!(track.title, "Song X");
        assert_eq!(track.play_offset_ms, 45000);
        assert_eq!(run.raw_payload.as_deref(), Some(MATCH));

        let store = f.host.store();
        assert_eq!(
            store.state_of("sensor.tagging_result").await.as_deref(),
            Some("Song X - Artist Y (0:45)")
        );
        let full = store.notification(NOTIFICATION_FULL_RESULT).await.unwrap();
        assert_eq!(full.title, "Audio Tagging Full Result");
        assert!(full.message.starts_with("```json\n"));
        assert!(store
            .notification(NOTIFICATION_RESULT)
            .await
            .unwrap()
            .message
            .contains("**Artist**: Artist Y"));
        assert_eq!(*f.handoff.tracks.lock().unwrap(), vec![track]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_switch_and_display_reset() {
        let f = fixture(vec![Some(MATCH)]);
        let tagger = f.tagger.clone();
        let task = tokio::spawn(async move { tagger.run(SECS_12, SECS_3, false).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let store = f.host.store();
        assert_eq!(store.state_of("switch.tagging_enable").await.as_deref(), Some("on"));
        assert_eq!(f.host.displayed().await.current, PLACEHOLDER_LISTENING);

        let run = task.await.unwrap();
        assert!(run.is_match());
        assert_eq!(store.state_of("switch.tagging_enable").await.as_deref(), Some("off"));
        assert!(f.host.displayed().await.is_empty());
        // include_lyrics = false
        assert!(f.handoff.tracks.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_run_turns_capture_off() {
        let f = fixture(vec![]);
        let store = f.host.store();

        let cut_short =
            tokio::time::timeout(Duration::from_secs(4), f.tagger.run(SECS_12, SECS_3, true)).await;
        assert!(cut_short.is_err());

        // cleanup runs on a spawned task
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.state_of("switch.tagging_enable").await.as_deref(), Some("off"));
        assert!(f.host.displayed().await.is_empty());

        // the run lock was released with the dropped future
        let run = f.tagger.run(SECS_3, SECS_3, true).await;
        assert!(!run.busy);
    }

    struct BusyDisplay {
        shown: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StatusDisplay for BusyDisplay {
        async fn show_status(&self, text: &str) -> Option<u64> {
            self.shown.lock().unwrap().push(text.to_string());
            None
        }

        async fn clear_status(&self, ticket: u64) {
            self.shown.lock().unwrap().push(format!("clear {ticket}"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_display_left_untouched() {
        let host = Arc::new(StoreHost::new(EntityStore::new(), HostEntities::default()));
        host.show(&DisplayLines::new("a", "b", "c")).await;
        let display = Arc::new(BusyDisplay {
            shown: std::sync::Mutex::new(Vec::new()),
        });
        let tagger = FingerprintTagger::new(
            host.clone(),
            Arc::new(SilentSource),
            ScriptedProvider::new(vec![Some(MATCH)]),
        )
        .with_status_display(display.clone());

        let run = tagger.run(SECS_3, SECS_3, false).await;
        assert!(run.is_match());
        assert_eq!(*display.shown.lock().unwrap(), vec![PLACEHOLDER_LISTENING]);
        assert_eq!(host.displayed().await, DisplayLines::new("a", "b", "c"));
        assert_eq!(
            host.store().state_of("switch.tagging_enable").await.as_deref(),
            Some("off")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_errors_are_contained() {
        let f = fixture(vec![None, None]);
        let run = f.tagger.run(Duration::from_secs(6), SECS_3, true).await;

        assert_eq!(run.attempts.len(), 2);
        assert!(matches!(run.attempts[0].result, AttemptResult::Failed(_)));
        assert!(!run.is_match());
        assert_eq!(
            f.host.store().state_of("switch.tagging_enable").await.as_deref(),
            Some("off")
        );
        assert_eq!(
            f.host.store().state_of("sensor.tagging_result").await.as_deref(),
            Some(RESULT_NO_MATCH)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_errors_skip_provider() {
        let f = fixture_with(Arc::new(BrokenSource), vec![]);
        let run = f.tagger.run(Duration::from_secs(6), SECS_3, true).await;

        assert_eq!(f.provider.calls(), 0);
        assert_eq!(run.attempts.len(), 2);
        assert!(run.attempts.iter().all(|a| a.audio_len == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_run_is_rejected() {
        let f = fixture(vec![]);
        let tagger = f.tagger.clone();
        let first = tokio::spawn(async move { tagger.run(SECS_12, SECS_3, true).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = f.tagger.run(SECS_12, SECS_3, true).await;
        assert!(second.busy);
        assert!(second.attempts.is_empty());

        let first = first.await.unwrap();
        assert!(!first.busy);
        assert_eq!(first.attempts.len(), 4);
        assert_eq!(f.provider.calls(), 4);
    }
}
