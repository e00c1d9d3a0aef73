//! # Voice Bridge Backend - Main Application Entry Point
//!
//! Real-time voice call relay with live translated captions. Participants
//! join a call over WebSocket and stream raw PCM; the server relays the
//! audio between them and, in the background, transcribes each speaker,
//! translates the text, and broadcasts captions back to the room.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **session**: call membership registry and payload fan-out
//! - **audio**: accumulation, snapshots, and voice-activity gating
//! - **pipeline**: per-snapshot transcription-translation orchestration
//! - **recognition / translation**: the Candle-rs model collaborators
//! - **cleanup**: transient WAV artifact lifecycle
//! - **websocket**: the per-connection actor
//! - **health**: liveness and metrics endpoints

mod audio;
mod cleanup;
mod config;
mod error;
mod events;
mod health;
mod pipeline;
mod recognition;
mod session;
mod state;
mod translation;
mod websocket;

#[cfg(test)]
mod testutil;

use crate::cleanup::TempStore;
use crate::config::AppConfig;
use crate::pipeline::PipelineCoordinator;
use crate::recognition::WhisperRecognizer;
use crate::session::SessionRegistry;
use crate::state::{AppState, CallMetrics};
use crate::translation::MarianTranslator;
use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal set by the SIGTERM/SIGINT handlers.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-bridge-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}, whisper model: {}",
        config.server.host, config.server.port, config.recognition.model_size
    );

    // Temp artifact store, sweeping anything a previous run left behind
    let temp = Arc::new(TempStore::new(&config.server.temp_dir)?);
    temp.sweep_stale(Duration::from_secs(config.cleanup.stale_max_age_seconds));

    // The recognition model is loaded up front so the first caller does
    // not eat the download; translation pairs load lazily on first use
    let recognizer = Arc::new(
        WhisperRecognizer::load(&config.recognition.model_size, &config.recognition.device)
            .await
            .context("Failed to load speech recognition model")?,
    );
    let translator = Arc::new(MarianTranslator::new(&config.translation));

    let registry = Arc::new(SessionRegistry::new());
    let metrics = Arc::new(RwLock::new(CallMetrics::default()));
    let pipeline = Arc::new(PipelineCoordinator::new(
        registry.clone(),
        recognizer,
        translator,
        temp,
        &config,
        metrics.clone(),
    ));

    let app_state = AppState::new(config.clone(), registry, pipeline, metrics);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .route(
                "/call/{call_id}/{source_lang}/{target_lang}",
                web::get().to(websocket::call_socket),
            )
            .route("/", web::get().to(health::root))
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize structured logging; RUST_LOG overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_bridge_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Install SIGTERM/SIGINT handlers that flip the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag without busy-waiting.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
