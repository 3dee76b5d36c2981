//! OAuth redirect target.

use crate::config::CALLBACK_PATH;
use crate::linker::PlaylistLinker;
use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

/// Query parameters for the OAuth callback
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Router serving `GET /api/spotify/callback`
pub fn router(linker: Arc<PlaylistLinker>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .with_state(linker)
}

/// Exchange the code and answer with a small HTML page
pub async fn handle_callback(
    State(linker): State<Arc<PlaylistLinker>>,
    Query(params): Query<CallbackParams>,
) -> Html<String> {
    let Some(code) = params.code else {
        let reason = params.error.unwrap_or_else(|| "Unknown error".into());
        error!("Spotify authentication failed: {}", reason);
        return Html(error_page(&reason));
    };

    info!("Received authorization code, exchanging for token...");
    match linker.exchange_code(&code).await {
        Ok(()) => Html(SUCCESS_HTML.to_string()),
        Err(e) => {
            error!("Spotify token exchange failed: {}", e);
            Html(error_page(&e.to_string()))
        }
    }
}

fn error_page(reason: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body style="font-family: sans-serif; text-align: center; padding: 50px;">
    <h1>Authentication Error</h1>
    <p>{}</p>
    <p>Please close this window and try again.</p>
</body>
</html>"#,
        escape_html(reason)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// HTML response shown on successful authorization
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Authorization Successful</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            text-align: center;
            padding: 50px;
            background: linear-gradient(135deg, #1DB954 0%, #191414 100%);
            color: white;
        }
    </style>
</head>
<body>
    <h1>Authentication Successful</h1>
    <p>Lyritag can now add tagged tracks to your Spotify playlist.</p>
    <p>You can close this window now.</p>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpotifyLinkerConfig;
    use crate::store::FileTokenStore;
    use lyritag_core::{EntityStore, HostEntities, StoreHost};

    fn linker(dir: &tempfile::TempDir) -> Arc<PlaylistLinker> {
        let config = SpotifyLinkerConfig {
            client_id: "client".into(),
            client_secret: "secret".into(),
            oauth_redirect_uri: "http://127.0.0.1:8099/api/spotify/callback".into(),
            playlist_id: None,
            create_playlist: false,
            playlist_name: "Discoveries".into(),
            auto_add_tagged: false,
        };
        let host = Arc::new(StoreHost::new(EntityStore::new(), HostEntities::default()));
        Arc::new(PlaylistLinker::new(
            config,
            Arc::new(FileTokenStore::new(dir.path().join("tokens.json"))),
            host,
        ))
    }

    #[tokio::test]
    async fn test_error_param_renders_error_page() {
        let dir = tempfile::tempdir().unwrap();
        let Html(body) = handle_callback(
            State(linker(&dir)),
            Query(CallbackParams {
                code: None,
                error: Some("access_denied".into()),
            }),
        )
        .await;
        assert!(body.contains("Authentication Error"));
        assert!(body.contains("access_denied"));
    }

    #[tokio::test]
    async fn test_missing_code() {
        let dir = tempfile::tempdir().unwrap();
        let Html(body) =
            handle_callback(State(linker(&dir)), Query(CallbackParams::default())).await;
        assert!(body.contains("Unknown error"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape_html("<b>&\""), "&lt;b&gt;&amp;&quot;");
    }
}
