use crate::config::SpotifyLinkerConfig;
use crate::error::{Result, SpotifyError};
use crate::store::{StoredToken, TokenStore};
use chrono::{DateTime, Utc};
use rspotify::{prelude::*, scopes, AuthCodeSpotify, Credentials, OAuth, Token};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Refresh the access token when it expires within this many seconds
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// Whether `token` is within the refresh margin at `now`.
///
/// A token without an expiry never needs refreshing.
#[must_use]
pub fn needs_refresh(token: &Token, now: DateTime<Utc>) -> bool {
    token
        .expires_at
        .is_some_and(|expires_at| (expires_at - now).num_seconds() <= REFRESH_MARGIN_SECS)
}

/// Spotify OAuth token lifecycle
pub struct SpotifyOAuth {
    client: AuthCodeSpotify,
    store: Arc<dyn TokenStore>,
    user_id: Mutex<Option<String>>,
}

impl SpotifyOAuth {
    /// Create a new Spotify OAuth manager
    #[must_use]
    pub fn new(config: &SpotifyLinkerConfig, store: Arc<dyn TokenStore>) -> Self {
        let creds = Credentials::new(&config.client_id, &config.client_secret);

        let oauth = OAuth {
            redirect_uri: config.oauth_redirect_uri.clone(),
            scopes: scopes!(
                "playlist-modify-private",
                "playlist-modify-public",
                "user-read-private"
            ),
            ..Default::default()
        };

        Self {
            client: AuthCodeSpotify::new(creds, oauth),
            store,
            user_id: Mutex::new(None),
        }
    }

    /// Acquire lock on token.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired.
    async fn lock_token(&self) -> Result<futures::lock::MutexGuard<'_, Option<Token>>> {
        self.client
            .token
            .lock()
            .await
            .map_err(|_| SpotifyError::AuthFailed {
                reason: "Failed to acquire token lock".to_string(),
            })
    }

    /// Try to load the persisted token, refreshing it if it is about to expire
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the refresh fails.
    pub async fn load_cached_token(&self) -> Result<bool> {
        let Some(stored) = self.store.load().await? else {
            info!("No cached Spotify token found");
            return Ok(false);
        };

        let token = stored.to_token();
        *self.user_id.lock().await = stored.user_id;

        if needs_refresh(&token, Utc::now()) {
            if token.refresh_token.is_some() {
                info!("Cached token is expiring but has refresh token, attempting refresh...");
                *self.lock_token().await? = Some(token);
                return self.refresh_token().await.map(|()| true);
            }
            info!("Cached token is expired and has no refresh token, re-authorization required");
            return Ok(false);
        }

        *self.lock_token().await? = Some(token);
        info!("Loaded valid cached Spotify token");
        Ok(true)
    }

    /// A token is held
    pub async fn is_authorized(&self) -> bool {
        self.lock_token()
            .await
            .is_ok_and(|guard| guard.is_some())
    }

    /// Spotify user id recorded at authorization
    pub async fn user_id(&self) -> Option<String> {
        self.user_id.lock().await.clone()
    }

    /// Persist the current token
    async fn save_token(&self) -> Result<()> {
        let stored = {
            let token_guard = self.lock_token().await?;
            let Some(ref token) = *token_guard else {
                return Ok(());
            };
            StoredToken::from_token(token, self.user_id().await)
        };
        self.store.save(&stored).await
    }

    /// Refresh the access token
    ///
    /// # Errors
    ///
    /// Returns an error if the token refresh fails or the token cannot be saved.
    pub async fn refresh_token(&self) -> Result<()> {
        info!("Refreshing Spotify access token");

        self.client
            .refresh_token()
            .await
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Token refresh failed: {e}"),
            })?;

        self.save_token().await
    }

    /// Refresh the token if it expires within the margin.
    ///
    /// Call before every API request.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthorized` without a token, `TokenExpired` when an expiring
    /// token cannot be refreshed.
    pub async fn ensure_token_fresh(&self) -> Result<()> {
        let (expiring, refreshable) = {
            let token_guard = self.lock_token().await?;
            let Some(token) = token_guard.as_ref() else {
                return Err(SpotifyError::NotAuthorized);
            };
            (needs_refresh(token, Utc::now()), token.refresh_token.is_some())
        };

        if !expiring {
            return Ok(());
        }
        if !refreshable {
            warn!("Spotify token is expiring and has no refresh token");
            return Err(SpotifyError::TokenExpired);
        }
        debug!("Token expires within {}s, refreshing", REFRESH_MARGIN_SECS);
        self.refresh_token().await
    }

    /// Get the authorization URL for the user to visit
    ///
    /// # Errors
    ///
    /// Returns an error if the authorization URL cannot be generated.
    pub fn authorize_url(&self) -> Result<String> {
        self.client
            .get_authorize_url(true)
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Failed to generate auth URL: {e}"),
            })
    }

    /// Exchange an authorization code, record the user and persist the token
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange, the user lookup or the save fails.
    pub async fn exchange_code(&self, code: &str) -> Result<String> {
        self.client
            .request_token(code)
            .await
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Token exchange failed: {e}"),
            })?;

        let user = self.client.current_user().await?;
        let user_id = user.id.id().to_string();
        *self.user_id.lock().await = Some(user_id.clone());

        self.save_token().await?;
        info!("Spotify authenticated for user: {}", user_id);
        Ok(user_id)
    }

    /// Get the underlying Spotify client
    #[must_use]
    pub const fn client(&self) -> &AuthCodeSpotify {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileTokenStore;
    use chrono::TimeDelta;

    fn config() -> SpotifyLinkerConfig {
        SpotifyLinkerConfig {
            client_id: "client".into(),
            client_secret: "secret".into(),
            oauth_redirect_uri: "http://127.0.0.1:8099/api/spotify/callback".into(),
            playlist_id: None,
            create_playlist: false,
            playlist_name: "Discoveries".into(),
            auto_add_tagged: false,
        }
    }

    fn token_expiring_at(expires_at: Option<DateTime<Utc>>) -> Token {
        Token {
            access_token: "a".into(),
            expires_in: TimeDelta::zero(),
            expires_at,
            refresh_token: None,
            scopes: std::collections::HashSet::new(),
        }
    }

    #[test]
    fn test_refresh_margin() {
        let now = Utc::now();
        assert!(needs_refresh(&token_expiring_at(Some(now + TimeDelta::seconds(200))), now));
        assert!(needs_refresh(&token_expiring_at(Some(now + TimeDelta::seconds(300))), now));
        assert!(needs_refresh(&token_expiring_at(Some(now - TimeDelta::seconds(10))), now));
        assert!(!needs_refresh(&token_expiring_at(Some(now + TimeDelta::seconds(400))), now));
        assert!(!needs_refresh(&token_expiring_at(None), now));
    }

    #[tokio::test]
    async fn test_load_valid_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileTokenStore::new(dir.path().join("tokens.json")));
        store
            .save(&StoredToken {
                access_token: "access".into(),
                refresh_token: Some("refresh".into()),
                expires_at: Some((Utc::now() + TimeDelta::hours(1)).timestamp()),
                scopes: vec![],
                user_id: Some("listener".into()),
            })
            .await
            .unwrap();

        let oauth = SpotifyOAuth::new(&config(), store);
        assert!(oauth.load_cached_token().await.unwrap());
        assert!(oauth.is_authorized().await);
        assert_eq!(oauth.user_id().await.as_deref(), Some("listener"));
        assert!(oauth.ensure_token_fresh().await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileTokenStore::new(dir.path().join("tokens.json")));
        store
            .save(&StoredToken {
                access_token: "access".into(),
                refresh_token: None,
                expires_at: Some((Utc::now() - TimeDelta::hours(1)).timestamp()),
                scopes: vec![],
                user_id: None,
            })
            .await
            .unwrap();

        let oauth = SpotifyOAuth::new(&config(), store);
        assert!(!oauth.load_cached_token().await.unwrap());
        assert!(!oauth.is_authorized().await);
    }

    #[tokio::test]
    async fn test_unauthorized_without_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileTokenStore::new(dir.path().join("tokens.json")));
        let oauth = SpotifyOAuth::new(&config(), store);

        assert!(!oauth.load_cached_token().await.unwrap());
        assert!(matches!(
            oauth.ensure_token_fresh().await,
            Err(SpotifyError::NotAuthorized)
        ));

        let url = oauth.authorize_url().unwrap();
        assert!(url.starts_with("https://accounts.spotify.com/authorize"));
        assert!(url.contains("client_id=client"));
        assert!(url.contains("playlist-modify-private"));
    }
}
