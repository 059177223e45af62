use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ha_webrtc::config::{AppConfig, ConfigStore};
use ha_webrtc::events::{EventBus, SessionEvent};
use ha_webrtc::hass::HassClient;
use ha_webrtc::viewer::CameraViewer;
use ha_webrtc::webrtc::{LogSink, Negotiator, RtcConnectionFactory};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// ha-webrtc command line arguments
#[derive(Parser, Debug)]
#[command(name = "ha-webrtc")]
#[command(version, about = "WebRTC viewer for Home Assistant cameras", long_about = None)]
struct CliArgs {
    /// Configuration file (default: /etc/ha-webrtc/config.toml)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Home Assistant websocket URL (overrides config)
    #[arg(short = 'u', long, value_name = "URL")]
    url: Option<String>,

    /// Long-lived access token (overrides config and HA_WEBRTC_TOKEN)
    #[arg(short = 't', long, value_name = "TOKEN")]
    token: Option<String>,

    /// Camera entity to stream (overrides config)
    #[arg(long, value_name = "ENTITY")]
    camera: Option<String>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting ha-webrtc v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().unwrap_or_else(get_config_path);
    tracing::info!("Configuration file: {}", config_path.display());
    let config_store = ConfigStore::new(&config_path).await?;
    let config = apply_overrides((*config_store.get()).clone(), &args);

    let token = config
        .hass
        .token
        .clone()
        .or_else(|| std::env::var("HA_WEBRTC_TOKEN").ok())
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!("No access token: set hass.token, --token or HA_WEBRTC_TOKEN")
        })?;

    let client = Arc::new(HassClient::connect(&config.hass.url, &token).await?);
    let events = Arc::new(EventBus::new());

    let factory = RtcConnectionFactory::new(config.webrtc.mdns_mode.clone());
    #[allow(unused_mut)]
    let mut negotiator = Negotiator::new(client.clone(), client.clone(), Arc::new(factory))
        .with_config(config.webrtc.negotiation())
        .with_events(events.clone());

    #[cfg(feature = "microphone")]
    {
        if config.webrtc.local_audio {
            let microphone = ha_webrtc::audio::AlsaMicrophone::default();
            negotiator = negotiator.with_local_media(Arc::new(microphone));
        }
    }

    let sink_name = config
        .card
        .title
        .clone()
        .or_else(|| config.card.camera_image.clone())
        .unwrap_or_else(|| "camera".to_string());
    let sink = Arc::new(LogSink::new(sink_name, config.card.muted()));
    let viewer = Arc::new(CameraViewer::new(
        config.card.clone(),
        Arc::new(negotiator),
        sink,
    ));

    tokio::spawn(log_events(events.subscribe()));
    spawn_reload_handler(config_store.clone());
    spawn_config_watcher(config_store.clone(), viewer.clone(), args.camera.clone());

    viewer.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    viewer.stop().await;

    tracing::info!("Goodbye");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "ha_webrtc=error,webrtc=error",
        LogLevel::Warn => "ha_webrtc=warn,webrtc=warn",
        LogLevel::Info => "ha_webrtc=info,webrtc=warn",
        LogLevel::Verbose => "ha_webrtc=debug,webrtc=warn",
        LogLevel::Debug => "ha_webrtc=debug,webrtc=info",
        LogLevel::Trace => "ha_webrtc=trace,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Get the configuration file path
fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("HA_WEBRTC_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("/etc/ha-webrtc/config.toml")
}

/// Command line values win over the file
fn apply_overrides(mut config: AppConfig, args: &CliArgs) -> AppConfig {
    if let Some(url) = &args.url {
        config.hass.url = url.clone();
    }
    if let Some(token) = &args.token {
        config.hass.token = Some(token.clone());
    }
    if let Some(camera) = &args.camera {
        config.card.camera_image = Some(camera.clone());
    }
    config
}

/// Render session errors the way the card shows them
async fn log_events(mut rx: broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await {
            Ok(SessionEvent::Error { session_id, message }) => {
                tracing::error!("[{}] {}", session_id, message);
            }
            Ok(SessionEvent::TrackAdded {
                session_id,
                track_id,
                kind,
            }) => {
                tracing::info!("[{}] {} track {} playing", session_id, kind, track_id);
            }
            Ok(event) => {
                tracing::debug!("[{}] {}", event.session_id(), event.event_name());
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Event logger lagged by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Reload the configuration file on SIGHUP
#[cfg(unix)]
fn spawn_reload_handler(store: ConfigStore) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                tracing::warn!("SIGHUP reload unavailable: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            match store.reload().await {
                Ok(true) => {}
                Ok(false) => tracing::info!("Configuration unchanged"),
                Err(e) => tracing::error!("Failed to reload configuration: {}", e),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_handler(_store: ConfigStore) {}

/// Restart the viewer when the card configuration changes
fn spawn_config_watcher(store: ConfigStore, viewer: Arc<CameraViewer>, camera: Option<String>) {
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        while changes.recv().await.is_ok() {
            let mut card = store.get().card.clone();
            if let Some(camera) = &camera {
                card.camera_image = Some(camera.clone());
            }
            match viewer.set_config(card).await {
                Ok(true) => tracing::info!("Card configuration changed, viewer restarted"),
                Ok(false) => {}
                Err(e) => tracing::error!("{}", e.detail()),
            }
        }
    });
}
