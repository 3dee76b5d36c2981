//! HTTP command surface.
//!
//! `POST /api/services/<name>` invokes an operation with a JSON payload;
//! `/api/states` exposes the entity store so another process can play the
//! role of the home automation host.

use crate::error::AppError;
use crate::services::{PlaylistSummary, Services, TaggingSummary};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use lyritag_core::{
    validate_entity_id, AddToPlaylistCommand, CoreError, EntityState, FetchAudioTagCommand,
    FetchLyricsCommand, FetchOutcome, Notification,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

type Shared = State<Arc<Services>>;

/// Reply to `fetch_lyrics`
#[derive(Debug, Serialize)]
pub struct FetchLyricsReply {
    pub outcome: FetchOutcome,
}

/// Body of `POST /api/states/{entity_id}`
#[derive(Debug, Deserialize)]
pub struct SetStateRequest {
    pub state: String,
    #[serde(default)]
    pub attributes: Option<Map<String, Value>>,
}

/// Entity as returned by the state endpoints
#[derive(Debug, Serialize)]
pub struct EntityReply {
    pub entity_id: String,
    #[serde(flatten)]
    pub entity: EntityState,
}

pub fn router(services: Arc<Services>) -> Router {
    Router::new()
        .route("/api/services/fetch_lyrics", post(fetch_lyrics))
        .route("/api/services/fetch_audio_tag", post(fetch_audio_tag))
        .route("/api/services/add_to_spotify", post(add_to_spotify))
        .route("/api/states", get(list_states))
        .route("/api/states/{entity_id}", get(get_state).post(set_state))
        .route("/api/notifications", get(list_notifications))
        .with_state(services)
}

/// Serve `router` on `listen` until `cancel_token` fires
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(
    listen: &str,
    router: Router,
    cancel_token: CancellationToken,
) -> Result<(), AppError> {
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|source| AppError::Bind {
            addr: listen.to_string(),
            source,
        })?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel_token.cancelled().await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

/// Decode a JSON payload; an empty body counts as `{}`
fn parse_payload<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(raw).map_err(|e| {
        AppError::Core(CoreError::InvalidCommand {
            reason: e.to_string(),
        })
    })
}

async fn fetch_lyrics(
    State(services): Shared,
    body: Bytes,
) -> Result<Json<FetchLyricsReply>, AppError> {
    let command: FetchLyricsCommand = parse_payload(&body)?;
    let outcome = services.fetch_lyrics(&command).await?;
    Ok(Json(FetchLyricsReply { outcome }))
}

async fn fetch_audio_tag(
    State(services): Shared,
    body: Bytes,
) -> Result<Json<TaggingSummary>, AppError> {
    let command: FetchAudioTagCommand = parse_payload(&body)?;
    Ok(Json(services.fetch_audio_tag(&command).await?))
}

async fn add_to_spotify(
    State(services): Shared,
    body: Bytes,
) -> Result<Json<PlaylistSummary>, AppError> {
    let command: AddToPlaylistCommand = parse_payload(&body)?;
    Ok(Json(services.add_to_spotify(&command).await?))
}

async fn list_states(State(services): Shared) -> Json<Vec<EntityReply>> {
    let entities = services
        .store()
        .all()
        .await
        .into_iter()
        .map(|(entity_id, entity)| EntityReply { entity_id, entity })
        .collect();
    Json(entities)
}

async fn get_state(
    State(services): Shared,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityReply>, AppError> {
    let entity = services
        .store()
        .get(&entity_id)
        .await
        .ok_or_else(|| AppError::EntityNotFound(entity_id.clone()))?;
    Ok(Json(EntityReply { entity_id, entity }))
}

async fn set_state(
    State(services): Shared,
    Path(entity_id): Path<String>,
    body: Bytes,
) -> Result<Json<EntityReply>, AppError> {
    validate_entity_id(&entity_id)?;
    let request: SetStateRequest = parse_payload(&body)?;

    let store = services.store();
    match request.attributes {
        Some(attributes) => {
            store
                .set(&entity_id, EntityState::new(request.state, attributes))
                .await;
        }
        None => store.set_state(&entity_id, &request.state).await,
    }

    let entity = store
        .get(&entity_id)
        .await
        .ok_or_else(|| AppError::EntityNotFound(entity_id.clone()))?;
    Ok(Json(EntityReply { entity_id, entity }))
}

async fn list_notifications(State(services): Shared) -> Json<Vec<Notification>> {
    Json(services.store().notifications().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tests::services;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn status_of(result: Result<impl IntoResponse, AppError>) -> StatusCode {
        match result {
            Ok(reply) => reply.into_response().status(),
            Err(e) => e.status(),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_is_bad_request() {
        let services = services(false);
        let result = fetch_lyrics(State(services), Bytes::from_static(b"{not json")).await;
        assert_eq!(status_of(result), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_entity_id_is_bad_request() {
        let services = services(false);
        let result = fetch_lyrics(State(services), Bytes::new()).await;
        assert_eq!(status_of(result), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_fetch_lyrics_reports_outcome() {
        let services = services(false);
        let Json(reply) = fetch_lyrics(
            State(services),
            Bytes::from_static(br#"{"entity_id": "media_player.kitchen"}"#),
        )
        .await
        .unwrap();
        assert_eq!(reply.outcome, FetchOutcome::EntityNotFound);
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            serde_json::json!({ "outcome": "entity_not_found" })
        );
    }

    #[tokio::test]
    async fn test_tagging_unconfigured_is_unavailable() {
        let services = services(false);
        let result = fetch_audio_tag(State(services), Bytes::new()).await;
        assert_eq!(status_of(result), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_set_and_get_state() {
        let services = services(false);
        let Json(set) = set_state(
            State(services.clone()),
            Path("media_player.kitchen".to_string()),
            Bytes::from_static(br#"{"state": "playing", "attributes": {"media_title": "Song"}}"#),
        )
        .await
        .unwrap();
        assert_eq!(set.entity.state, "playing");

        // State-only update keeps attributes
        set_state(
            State(services.clone()),
            Path("media_player.kitchen".to_string()),
            Bytes::from_static(br#"{"state": "paused"}"#),
        )
        .await
        .unwrap();

        let Json(got) = get_state(State(services), Path("media_player.kitchen".to_string()))
            .await
            .unwrap();
        assert_eq!(got.entity.state, "paused");
        assert_eq!(got.entity.attributes["media_title"], "Song");
    }

    #[tokio::test]
    async fn test_unknown_state_is_not_found() {
        let services = services(false);
        let result = get_state(State(services), Path("sensor.nothing".to_string())).await;
        assert_eq!(status_of(result), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_entity_id_rejected() {
        let services = services(false);
        let result = set_state(
            State(services),
            Path("Not An Entity".to_string()),
            Bytes::from_static(br#"{"state": "on"}"#),
        )
        .await;
        assert_eq!(status_of(result), StatusCode::BAD_REQUEST);
    }
}
