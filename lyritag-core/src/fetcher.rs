//! Lyrics fetcher that tries multiple lyrics providers in order.

use tracing::{info, warn};

use crate::provider::{FetchedLyrics, LyricsProvider, LyricsQuery, LyricsResult};

/// Ordered chain of lyrics providers
pub struct LyricsFetcher {
    providers: Vec<Box<dyn LyricsProvider>>,
}

impl LyricsFetcher {
    /// Create a new lyrics fetcher
    ///
    /// # Arguments
    /// * `providers` - List of lyrics providers to try in order
    #[must_use]
    pub fn new(providers: Vec<Box<dyn LyricsProvider>>) -> Self {
        Self { providers }
    }

    #[must_use]
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Fetch lyrics for a query.
    ///
    /// The first synced document wins. If no provider has synced lyrics, the
    /// first plain document is returned so the caller can report it as not
    /// synced. Provider errors are logged and the next provider is tried.
    pub async fn fetch(&self, query: &LyricsQuery) -> Option<FetchedLyrics> {
        let provider_names = self.provider_names();
        info!(
            "Fetching lyrics for: {} - {} (providers: {:?})",
            query.artist_name, query.track_name, provider_names
        );

        let mut unsynced_fallback = None;

        for provider in &self.providers {
            info!("Trying provider: {}", provider.name());
            match provider.fetch(query).await {
                Ok(fetched) => match &fetched.result {
                    LyricsResult::Synced(document) => {
                        info!(
                            "Found synced lyrics from {} ({} bytes, provider_id: {})",
                            provider.name(),
                            document.len(),
                            fetched.provider_id
                        );
                        return Some(fetched);
                    }
                    LyricsResult::Unsynced(_) => {
                        info!(
                            "Provider {} returned unsynced lyrics, trying remaining providers",
                            provider.name()
                        );
                        if unsynced_fallback.is_none() {
                            unsynced_fallback = Some(fetched);
                        }
                    }
                    LyricsResult::NotFound => {
                        info!("Provider {} returned no lyrics", provider.name());
                    }
                },
                Err(e) => {
                    warn!("Provider {} failed with error: {}", provider.name(), e);
                }
            }
        }

        if unsynced_fallback.is_none() {
            info!(
                "No lyrics found for {} - {} (tried {} providers: {:?})",
                query.artist_name,
                query.track_name,
                self.providers.len(),
                provider_names
            );
        }
        unsynced_fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StaticProvider {
        name: &'static str,
        result: Option<LyricsResult>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LyricsProvider for StaticProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, _query: &LyricsQuery) -> Result<FetchedLyrics, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Some(result) => Ok(FetchedLyrics {
                    result: result.clone(),
                    provider_id: self.name.to_string(),
                }),
                None => Err(CoreError::LyricsProviderFailed {
                    provider: self.name.to_string(),
                    reason: "boom".into(),
                }),
            }
        }
    }

    fn provider(
        name: &'static str,
        result: Option<LyricsResult>,
        calls: &Arc<AtomicUsize>,
    ) -> Box<dyn LyricsProvider> {
        Box::new(StaticProvider {
            name,
            result,
            calls: Arc::clone(calls),
        })
    }

    fn query() -> LyricsQuery {
        LyricsQuery::new("Song", "Artist")
    }

    #[tokio::test]
    async fn test_error_then_synced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = LyricsFetcher::new(vec![
            provider("broken", None, &calls),
            provider("good", Some(LyricsResult::Synced("[00:01.00]a".into())), &calls),
            provider("never", Some(LyricsResult::NotFound), &calls),
        ]);

        let fetched = fetcher.fetch(&query()).await.unwrap();
        assert_eq!(fetched.provider_id, "good");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_synced_preferred_over_earlier_plain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = LyricsFetcher::new(vec![
            provider("plain", Some(LyricsResult::Unsynced("words".into())), &calls),
            provider("synced", Some(LyricsResult::Synced("[00:01.00]a".into())), &calls),
        ]);

        let fetched = fetcher.fetch(&query()).await.unwrap();
        assert!(fetched.result.is_synced());
    }

    #[tokio::test]
    async fn test_plain_fallback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = LyricsFetcher::new(vec![
            provider("missing", Some(LyricsResult::NotFound), &calls),
            provider("plain", Some(LyricsResult::Unsynced("words".into())), &calls),
        ]);

        let fetched = fetcher.fetch(&query()).await.unwrap();
        assert_eq!(fetched.result.document(), Some("words"));
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = LyricsFetcher::new(vec![provider("missing", Some(LyricsResult::NotFound), &calls)]);
        assert!(fetcher.fetch(&query()).await.is_none());
        assert!(LyricsFetcher::new(Vec::new()).fetch(&query()).await.is_none());
    }
}
