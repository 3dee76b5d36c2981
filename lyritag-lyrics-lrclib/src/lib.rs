//! LRCLIB.net lyrics provider.
//!
//! Lookup order: exact `/get` match, then `/search?track_name=`, then a
//! free-text `/search?q=`. Synced documents are preferred over plain ones.

use async_trait::async_trait;
use lyritag_core::{
    CoreError, FetchedLyrics, LyricsProvider, LyricsQuery, LyricsResult, LyricsTimeline,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::fmt::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Provider name used in `[lyrics] providers`
pub const PROVIDER_NAME: &str = "lrclib";

const LRCLIB_API_URL: &str = "https://lrclib.net/api";

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Penalty for a candidate that only has plain lyrics
const UNSYNCED_PENALTY: i32 = 100;

/// Score for duration matching (lower is better), capped at `i32::MAX`
#[allow(clippy::cast_possible_truncation)]
fn duration_score(actual: Option<f64>, expected: Option<u32>) -> i32 {
    match (actual, expected) {
        (Some(d), Some(q)) => {
            let diff = (d - f64::from(q)).abs();
            if diff > f64::from(i32::MAX) {
                i32::MAX
            } else {
                diff as i32
            }
        }
        _ => 50,
    }
}

/// LRCLIB.net lyrics provider
pub struct LrclibProvider {
    client: ClientWithMiddleware,
    base_url: String,
}

impl LrclibProvider {
    /// Create a new LRCLIB provider with default 10-second timeout and 3 retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, CoreError> {
        Self::with_base_url(LRCLIB_API_URL)
    }

    /// Same as [`Self::new`] against another LRCLIB-compatible server.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_base_url(base_url: &str) -> Result<Self, CoreError> {
        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("Lyritag/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Retry transient failures with exponential backoff
        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(DEFAULT_MAX_RETRIES);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn exact_url(&self, query: &LyricsQuery) -> String {
        let mut url = format!(
            "{}/get?artist_name={}&track_name={}",
            self.base_url,
            urlencoding::encode(&query.artist_name),
            urlencoding::encode(&query.track_name)
        );
        if let Some(ref album) = query.album_name {
            let _ = write!(url, "&album_name={}", urlencoding::encode(album));
        }
        if let Some(duration) = query.duration_secs {
            let _ = write!(url, "&duration={duration}");
        }
        url
    }

    fn track_search_url(&self, query: &LyricsQuery) -> String {
        format!(
            "{}/search?track_name={}&artist_name={}",
            self.base_url,
            urlencoding::encode(&query.track_name),
            urlencoding::encode(&query.artist_name)
        )
    }

    fn free_search_url(&self, query: &LyricsQuery) -> String {
        let search_query = format!("{} {}", query.artist_name, query.track_name);
        format!(
            "{}/search?q={}",
            self.base_url,
            urlencoding::encode(&search_query)
        )
    }
}

/// Record returned by LRCLIB
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibRecord {
    id: i64,
    #[serde(default)]
    artist_name: String,
    duration: Option<f64>,
    #[serde(default)]
    instrumental: bool,
    plain_lyrics: Option<String>,
    synced_lyrics: Option<String>,
}

impl LrclibRecord {
    fn has_synced(&self) -> bool {
        self.synced_lyrics
            .as_deref()
            .is_some_and(|s| !LyricsTimeline::parse(s).is_empty())
    }

    fn has_plain(&self) -> bool {
        self.plain_lyrics.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    fn is_usable(&self) -> bool {
        !self.instrumental && (self.has_synced() || self.has_plain())
    }

    fn rank(&self, expected_duration: Option<u32>) -> i32 {
        let sync_score = if self.has_synced() { 0 } else { UNSYNCED_PENALTY };
        sync_score.saturating_add(duration_score(self.duration, expected_duration))
    }
}

/// Pick the best usable search result
fn best_candidate(records: Vec<LrclibRecord>, query: &LyricsQuery) -> Option<LrclibRecord> {
    records
        .into_iter()
        .filter(LrclibRecord::is_usable)
        .min_by_key(|r| r.rank(query.duration_secs))
}

#[async_trait]
impl LyricsProvider for LrclibProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn fetch(&self, query: &LyricsQuery) -> Result<FetchedLyrics, CoreError> {
        info!(
            "Fetching lyrics from LRCLIB for: {} - {}",
            query.artist_name, query.track_name
        );

        let url = self.exact_url(query);
        debug!("LRCLIB GET (exact match): {}", url);
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            info!("LRCLIB exact match not found, searching by track name");
            return self.search(query).await;
        }

        if !response.status().is_success() {
            warn!("LRCLIB returned status: {}", response.status());
            return Err(CoreError::LyricsProviderFailed {
                provider: self.name().to_string(),
                reason: format!("LRCLIB returned status: {}", response.status()),
            });
        }

        let record: LrclibRecord = response.json().await?;
        info!("LRCLIB found exact match with id: {}", record.id);
        if record.is_usable() {
            Ok(parse_response(record))
        } else {
            self.search(query).await
        }
    }
}

impl LrclibProvider {
    /// Track-name search first, free-text search as the last resort
    async fn search(&self, query: &LyricsQuery) -> Result<FetchedLyrics, CoreError> {
        for url in [self.track_search_url(query), self.free_search_url(query)] {
            debug!("LRCLIB GET (search): {}", url);
            let response = self.client.get(&url).send().await?;

            if !response.status().is_success() {
                warn!("LRCLIB search returned status: {}", response.status());
                continue;
            }

            let records: Vec<LrclibRecord> = response.json().await?;
            if let Some(best) = best_candidate(records, query) {
                info!(
                    "LRCLIB found match via search (id: {}, artist: {})",
                    best.id, best.artist_name
                );
                return Ok(parse_response(best));
            }
        }

        info!(
            "LRCLIB has no lyrics for {} - {}",
            query.artist_name, query.track_name
        );
        Ok(FetchedLyrics {
            result: LyricsResult::NotFound,
            provider_id: String::new(),
        })
    }
}

fn parse_response(record: LrclibRecord) -> FetchedLyrics {
    let provider_id = record.id.to_string();

    if record.instrumental {
        debug!("Track is instrumental (lrclib id: {})", record.id);
        return FetchedLyrics {
            result: LyricsResult::NotFound,
            provider_id,
        };
    }

    let synced = record.has_synced();
    let plain = record.has_plain();

    let result = match (record.synced_lyrics, record.plain_lyrics) {
        (Some(document), _) if synced => LyricsResult::Synced(document),
        (_, Some(document)) if plain => LyricsResult::Unsynced(document),
        _ => LyricsResult::NotFound,
    };
    FetchedLyrics {
        result,
        provider_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> LrclibRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_prefers_synced() {
        let fetched = parse_response(record(
            r#"{"id": 7, "artistName": "A", "duration": 200.0, "instrumental": false,
                "plainLyrics": "hello", "syncedLyrics": "[00:01.00]hello"}"#,
        ));
        assert_eq!(fetched.provider_id, "7");
        assert_eq!(fetched.result, LyricsResult::Synced("[00:01.00]hello".into()));
    }

    #[test]
    fn test_falls_back_to_plain() {
        let fetched = parse_response(record(
            r#"{"id": 8, "instrumental": false, "plainLyrics": "hello", "syncedLyrics": ""}"#,
        ));
        assert_eq!(fetched.result, LyricsResult::Unsynced("hello".into()));
    }

    #[test]
    fn test_instrumental_not_found() {
        let fetched = parse_response(record(
            r#"{"id": 9, "instrumental": true, "plainLyrics": null, "syncedLyrics": null}"#,
        ));
        assert_eq!(fetched.result, LyricsResult::NotFound);
    }

    #[test]
    fn test_best_candidate_ranking() {
        let records: Vec<LrclibRecord> = serde_json::from_str(
            r#"[
                {"id": 1, "duration": 180.0, "instrumental": false, "plainLyrics": "only plain", "syncedLyrics": null},
                {"id": 2, "duration": 240.0, "instrumental": false, "plainLyrics": "x", "syncedLyrics": "[00:01.00]far"},
                {"id": 3, "duration": 181.0, "instrumental": false, "plainLyrics": "x", "syncedLyrics": "[00:01.00]close"},
                {"id": 4, "duration": 180.0, "instrumental": true, "plainLyrics": null, "syncedLyrics": null}
            ]"#,
        )
        .unwrap();
        let query = LyricsQuery::new("Song", "Artist").with_duration(180);
        assert_eq!(best_candidate(records, &query).unwrap().id, 3);
    }

    #[test]
    fn test_best_candidate_none_usable() {
        let records: Vec<LrclibRecord> = serde_json::from_str(
            r#"[{"id": 1, "instrumental": true, "plainLyrics": null, "syncedLyrics": null}]"#,
        )
        .unwrap();
        assert!(best_candidate(records, &LyricsQuery::new("a", "b")).is_none());
    }

    #[test]
    fn test_urls_are_encoded() {
        let provider = LrclibProvider::with_base_url("http://localhost:3000/api/").unwrap();
        let query = LyricsQuery::new("Don't Stop", "Fleetwood Mac").with_duration(193);
        assert_eq!(
            provider.exact_url(&query),
            "http://localhost:3000/api/get?artist_name=Fleetwood%20Mac&track_name=Don%27t%20Stop&duration=193"
        );
        assert_eq!(
            provider.free_search_url(&query),
            "http://localhost:3000/api/search?q=Fleetwood%20Mac%20Don%27t%20Stop"
        );
    }
}
