mod error;
mod server;
mod services;

use crate::error::AppError;
use crate::services::Services;
use lyritag_core::{
    file_logging_enabled, log_file_path, CoreError, EntityStore, FetchLyricsCommand,
    HostEntities, LyricsFetcher, LyricsProvider, LyritagConfig, PlaybackWatcher,
    SessionCoordinator, StoreHost, SystemClock, WatcherSettings,
};
use lyritag_lyrics_lrclib::LrclibProvider;
use lyritag_spotify::{
    FileTokenStore, PlaylistLinker, SpotifyLinkerConfig, SPOTIFY_CONFIG_TEMPLATE,
};
use lyritag_tagging::{
    AcrCloudClient, AcrCloudConfig, AudioChunkRecorder, FingerprintTagger,
    ACRCLOUD_CONFIG_TEMPLATE,
};
use std::fs::File;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    // Tracing comes up before the full config load so config errors get logged
    init_tracing(file_logging_enabled(&LyritagConfig::config_path()));

    let provider_templates: &[&str] = &[ACRCLOUD_CONFIG_TEMPLATE, SPOTIFY_CONFIG_TEMPLATE];
    let config = match LyritagConfig::load_or_create(provider_templates) {
        Ok(config) => config,
        Err(e @ CoreError::ConfigNotFound { .. }) => {
            info!("{e}");
            std::process::exit(0);
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let cancel_token = CancellationToken::new();

    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    if let Err(e) = runtime.block_on(run(config, cancel_token)) {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(config: LyritagConfig, cancel_token: CancellationToken) -> Result<(), AppError> {
    let store = EntityStore::new();
    let host = Arc::new(StoreHost::new(store.clone(), HostEntities::from(&config.host)));

    // The store starts empty, so the feature toggle defaults to on
    store.set_state(&config.host.lyrics_enable, "on").await;

    let providers = create_providers(&config);
    let provider_names: Vec<_> = providers.iter().map(|p| p.name()).collect();
    info!(
        "Initialized {} lyrics provider(s): {:?}",
        providers.len(),
        provider_names
    );

    let coordinator = Arc::new(SessionCoordinator::new(
        host.clone(),
        Arc::new(LyricsFetcher::new(providers)),
        Arc::new(SystemClock),
        cancel_token.clone(),
    ));
    let watcher = Arc::new(PlaybackWatcher::new(
        host.clone(),
        coordinator,
        WatcherSettings::from_config(&config),
    ));
    let watcher_handle = watcher
        .clone()
        .start(store.subscribe(), cancel_token.clone());

    let tagger = create_tagger(&config, host.clone(), &watcher).await;
    let linker = create_linker(&config, host).await;

    let services = Arc::new(Services::new(
        store,
        watcher,
        tagger,
        linker.clone(),
        config.tagging.clone(),
    ));

    if config.server.autostart {
        let command = FetchLyricsCommand {
            entity_id: config.host.media_player.clone(),
        };
        match services.fetch_lyrics(&command).await {
            Ok(outcome) => info!("Autostart for {}: {:?}", command.entity_id, outcome),
            Err(e) => warn!("Autostart failed: {}", e),
        }
    }

    let mut router = server::router(services);
    if let Some(linker) = linker {
        router = router.merge(lyritag_spotify::callback::router(linker));
    }

    let result = server::serve(&config.server.listen, router, cancel_token.clone()).await;

    // Make sure background tasks stop even if the server failed on its own
    cancel_token.cancel();
    if let Err(e) = watcher_handle.await {
        error!("Playback watcher task failed: {}", e);
    }
    result
}

fn create_providers(config: &LyritagConfig) -> Vec<Box<dyn LyricsProvider>> {
    config
        .lyrics
        .providers
        .iter()
        .filter_map(|name| -> Option<Box<dyn LyricsProvider>> {
            match name.as_str() {
                lyritag_lyrics_lrclib::PROVIDER_NAME => {
                    info!("Initializing LRCLIB provider");
                    match LrclibProvider::new() {
                        Ok(provider) => Some(Box::new(provider)),
                        Err(e) => {
                            error!("Failed to create LRCLIB provider: {}", e);
                            None
                        }
                    }
                }
                other => {
                    warn!("Unknown lyrics provider {:?}, skipping", other);
                    None
                }
            }
        })
        .collect()
}

/// Build the fingerprint tagger, or `None` if ACRCloud is not configured
async fn create_tagger(
    config: &LyritagConfig,
    host: Arc<StoreHost>,
    watcher: &Arc<PlaybackWatcher>,
) -> Option<Arc<FingerprintTagger>> {
    let acr_config = match AcrCloudConfig::from_providers(&config.providers) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            info!("Audio tagging disabled: providers.acrcloud not configured");
            return None;
        }
        Err(e) => {
            warn!("Audio tagging disabled: {}", e);
            return None;
        }
    };
    if let Err(e) = acr_config.validate() {
        warn!("Audio tagging disabled: {}", e);
        return None;
    }

    let client = match AcrCloudClient::new(acr_config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create ACRCloud client: {}", e);
            return None;
        }
    };

    let recorder =
        match AudioChunkRecorder::bind(&config.tagging.listen_host, config.tagging.listen_port)
            .await
        {
            Ok(recorder) => recorder,
            Err(e) => {
                error!("Audio tagging disabled: {}", e);
                return None;
            }
        };

    info!(
        "Audio tagging ready, receiving on {}:{}",
        config.tagging.listen_host, config.tagging.listen_port
    );
    let tagger = FingerprintTagger::new(host, Arc::new(recorder), Arc::new(client))
        .with_handoff(watcher.clone())
        .with_status_display(watcher.coordinator().clone());
    Some(Arc::new(tagger))
}

/// Build the playlist linker, or `None` if Spotify is not configured
async fn create_linker(config: &LyritagConfig, host: Arc<StoreHost>) -> Option<Arc<PlaylistLinker>> {
    let spotify_config = match SpotifyLinkerConfig::from_providers(&config.providers) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            info!("Spotify playlist linking disabled: providers.spotify not configured");
            return None;
        }
        Err(e) => {
            warn!("Spotify playlist linking disabled: {}", e);
            return None;
        }
    };
    if let Err(e) = spotify_config.validate() {
        warn!("Spotify playlist linking disabled: {}", e);
        return None;
    }

    let linker = Arc::new(PlaylistLinker::new(
        spotify_config,
        Arc::new(FileTokenStore::default_location()),
        host,
    ));
    if !linker.setup().await {
        match linker.authorize_url() {
            Ok(url) => info!("Authorize Spotify access at: {}", url),
            Err(e) => error!("Failed to build Spotify authorization URL: {}", e),
        }
    }
    Some(linker)
}

/// Initialize tracing with console output and optional file logging
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rspotify_http=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer();

    if file_logging_enabled {
        let log_path = log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
