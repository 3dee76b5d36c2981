//! Lyrics synchronization sessions.
//!
//! A session fetches one lyrics document, turns it into a timeline and keeps
//! the three-line display in step with the projected playback position until
//! the timeline ends or it is cancelled. The [`SessionCoordinator`] owns the
//! single live session and the right to write to the display.

use crate::clock::{SyncAnchor, WallClock};
use crate::fetcher::LyricsFetcher;
use crate::host::{Host, StatusDisplay};
use crate::lrc::{Cue, DisplayLines, LyricsTimeline};
use crate::playback::{PlayerState, TrackIdentity};
use crate::provider::LyricsQuery;
use crate::time::secs_to_millis;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shown when a document has no usable timestamps
pub const PLACEHOLDER_NOT_SYNCED: &str = "Lyrics not synced";

/// Shortest wait between two display updates
const MIN_TICK: Duration = Duration::from_millis(100);

/// How often a paused player is re-checked
const PAUSE_POLL: Duration = Duration::from_secs(1);

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Exited without doing anything (lyrics disabled)
    Idle,
    Loading,
    Synced,
    Displaying,
    Paused,
    Finished,
    Interrupted,
}

impl SessionState {
    /// Whether the session still runs its loop
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(
            self,
            Self::Loading | Self::Synced | Self::Displaying | Self::Paused
        )
    }
}

/// What started a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTrigger {
    /// The watched player switched to a new track
    Playback,
    /// A fingerprint match
    Tagging,
    /// An explicit `fetch_lyrics` request
    Command,
}

/// Everything needed to start a session
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub track: TrackIdentity,
    pub anchor: SyncAnchor,
    pub trigger: SessionTrigger,
    /// Player polled for pause/resume while displaying
    pub player: Option<String>,
}

/// Observer side of a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    trigger: SessionTrigger,
    token: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn trigger(&self) -> SessionTrigger {
        self.trigger
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state().is_live() && !self.token.is_cancelled()
    }

    /// Wait until the session has left its loop and return the final state
    pub async fn finished(&mut self) -> SessionState {
        let done = match self.state.wait_for(|state| !state.is_live()).await {
            Ok(state) => Some(*state),
            Err(_) => None,
        };
        done.unwrap_or_else(|| *self.state.borrow())
    }
}

/// Serializes display writes and drops those from sessions that lost it
struct DisplayGuard {
    host: Arc<dyn Host>,
    owner: Mutex<u64>,
}

impl DisplayGuard {
    /// Hand the display to `id` and blank it
    async fn claim(&self, id: u64) {
        let mut owner = self.owner.lock().await;
        *owner = id;
        self.host.clear().await;
    }

    async fn show(&self, id: u64, lines: &DisplayLines) -> bool {
        let owner = self.owner.lock().await;
        if *owner != id {
            return false;
        }
        self.host.show(lines).await;
        true
    }

    async fn clear(&self, id: u64) {
        let owner = self.owner.lock().await;
        if *owner == id {
            self.host.clear().await;
        }
    }
}

#[derive(Clone)]
struct SessionContext {
    host: Arc<dyn Host>,
    display: Arc<DisplayGuard>,
    fetcher: Arc<LyricsFetcher>,
    clock: Arc<dyn WallClock>,
}

/// Enforces a single live session process-wide
pub struct SessionCoordinator {
    ctx: SessionContext,
    active: Mutex<Option<SessionHandle>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl SessionCoordinator {
    /// Create a coordinator.
    ///
    /// Sessions run on child tokens of `shutdown`, so cancelling it stops
    /// every session.
    #[must_use]
    pub fn new(
        host: Arc<dyn Host>,
        fetcher: Arc<LyricsFetcher>,
        clock: Arc<dyn WallClock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ctx: SessionContext {
                display: Arc::new(DisplayGuard {
                    host: Arc::clone(&host),
                    owner: Mutex::new(0),
                }),
                host,
                fetcher,
                clock,
            },
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
            shutdown,
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Wall clock used for projections
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn WallClock> {
        &self.ctx.clock
    }

    /// Start a session, interrupting the current one.
    ///
    /// The display is cleared and handed to the new session before it is
    /// spawned; the old session is only signalled and stops on its own.
    pub async fn start(&self, request: SessionRequest) -> SessionHandle {
        let id = self.allocate_id();
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            if previous.is_live() {
                info!(
                    "Interrupting lyrics session {} ({:?}) for new request",
                    previous.id, previous.trigger
                );
            }
            previous.token.cancel();
        }

        self.ctx.display.claim(id).await;

        let token = self.shutdown.child_token();
        let (state_tx, state_rx) = watch::channel(SessionState::Loading);
        let handle = SessionHandle {
            id,
            trigger: request.trigger,
            token: token.clone(),
            state: state_rx,
        };
        *active = Some(handle.clone());
        drop(active);

        info!(
            "Starting lyrics session {} for {} ({:?})",
            id, request.track, request.trigger
        );
        tokio::spawn(run_session(self.ctx.clone(), id, request, token, state_tx));

        handle
    }

    /// Cancel a specific session. The display is cleared if it was the
    /// active one.
    pub async fn cancel(&self, handle: &SessionHandle) {
        handle.token.cancel();
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|a| a.id == handle.id) {
            *active = None;
            self.ctx.display.claim(self.allocate_id()).await;
        }
    }

    /// Interrupt whatever session is running and clear the display.
    ///
    /// Returns whether a live session was interrupted.
    pub async fn cancel_active(&self) -> bool {
        let mut active = self.active.lock().await;
        let was_live = match active.take() {
            Some(previous) => {
                let live = previous.is_live();
                previous.token.cancel();
                if live {
                    info!("Interrupted lyrics session {}", previous.id);
                }
                live
            }
            None => false,
        };
        self.ctx.display.claim(self.allocate_id()).await;
        was_live
    }

    /// Trigger of the live session, if any
    pub async fn active_trigger(&self) -> Option<SessionTrigger> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|handle| handle.is_live())
            .map(SessionHandle::trigger)
    }

    pub async fn active(&self) -> Option<SessionHandle> {
        self.active.lock().await.clone()
    }

    /// Show a placeholder in the middle slot. Any session loses the display.
    pub async fn show_message(&self, text: &str) {
        let id = self.allocate_id();
        self.ctx.display.claim(id).await;
        self.ctx.display.show(id, &DisplayLines::message(text)).await;
    }
}

#[async_trait]
impl StatusDisplay for SessionCoordinator {
    async fn show_status(&self, text: &str) -> Option<u64> {
        if let Some(trigger) = self.active_trigger().await {
            debug!("Lyrics session ({:?}) owns the display, not showing {:?}", trigger, text);
            return None;
        }
        let id = self.allocate_id();
        self.ctx.display.claim(id).await;
        self.ctx.display.show(id, &DisplayLines::message(text)).await;
        Some(id)
    }

    async fn clear_status(&self, ticket: u64) {
        self.ctx.display.clear(ticket).await;
    }
}

async fn run_session(
    ctx: SessionContext,
    id: u64,
    request: SessionRequest,
    token: CancellationToken,
    state_tx: watch::Sender<SessionState>,
) {
    let final_state = drive(&ctx, id, request, &token, &state_tx).await;
    debug!("Lyrics session {} ended: {:?}", id, final_state);
    state_tx.send_replace(final_state);
}

async fn drive(
    ctx: &SessionContext,
    id: u64,
    request: SessionRequest,
    token: &CancellationToken,
    state_tx: &watch::Sender<SessionState>,
) -> SessionState {
    let SessionRequest {
        track,
        mut anchor,
        player,
        ..
    } = request;

    if !anchor.is_complete() {
        error!("Position or its timestamp is missing, not syncing {}", track);
        return SessionState::Finished;
    }

    if !ctx.host.lyrics_enabled().await {
        info!("Lyrics fetching is disabled by toggle, skipping {}", track);
        return SessionState::Idle;
    }

    let query = LyricsQuery::new(track.lookup_title(), track.artist.clone());
    let fetched = tokio::select! {
        () = token.cancelled() => return interrupted(ctx, id).await,
        fetched = ctx.fetcher.fetch(&query) => fetched,
    };

    let Some(fetched) = fetched else {
        warn!("No lyrics found for {}", track);
        ctx.display.clear(id).await;
        return SessionState::Finished;
    };

    let timeline = LyricsTimeline::parse(fetched.result.document().unwrap_or_default());
    if timeline.is_empty() {
        error!("Lyrics for {} have no timeline", track);
        ctx.display
            .show(id, &DisplayLines::message(PLACEHOLDER_NOT_SYNCED))
            .await;
        return SessionState::Finished;
    }

    state_tx.send_replace(SessionState::Synced);
    info!("Synchronizing {} lines for {}", timeline.len(), track);
    state_tx.send_replace(SessionState::Displaying);

    loop {
        if token.is_cancelled() {
            return interrupted(ctx, id).await;
        }

        if let Some(player) = player.as_deref() {
            if is_paused(ctx, player).await {
                info!("Media player paused, clearing lyrics display");
                state_tx.send_replace(SessionState::Paused);
                ctx.display.clear(id).await;

                let paused_at = Instant::now();
                while is_paused(ctx, player).await {
                    tokio::select! {
                        () = token.cancelled() => return interrupted(ctx, id).await,
                        () = sleep(PAUSE_POLL) => {}
                    }
                }

                let paused_for = paused_at.elapsed();
                info!(
                    "Media player resumed, shifting anchor by {:.1}s",
                    paused_for.as_secs_f64()
                );
                anchor.shift(paused_for);
                state_tx.send_replace(SessionState::Displaying);
            }
        }

        let offset_ms = secs_to_millis(anchor.project(ctx.clock.now()));
        match timeline.locate(offset_ms) {
            Cue::Finished => {
                info!("Lyrics finished for {}", track);
                ctx.display.clear(id).await;
                return SessionState::Finished;
            }
            Cue::Show { lines, until_ms } => {
                if !ctx.display.show(id, &lines).await {
                    debug!("Session {} lost the display", id);
                }
                let wait = Duration::from_millis(until_ms.saturating_sub(offset_ms)).max(MIN_TICK);
                tokio::select! {
                    () = token.cancelled() => return interrupted(ctx, id).await,
                    () = sleep(wait) => {}
                }
            }
        }
    }
}

async fn is_paused(ctx: &SessionContext, player: &str) -> bool {
    ctx.host
        .now_playing(player)
        .await
        .is_some_and(|now_playing| now_playing.state == PlayerState::Paused)
}

async fn interrupted(ctx: &SessionContext, id: u64) -> SessionState {
    info!("Lyrics session {} interrupted", id);
    ctx.display.clear(id).await;
    SessionState::Interrupted
}
