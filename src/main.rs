//! # Stress Feedback Server - Main Application Entry Point
//!
//! Receives a live microphone stream over WebSocket, estimates loudness and pitch for
//! every frame, classifies the speaker as relaxed, loud or anxious, and occasionally
//! answers with a calming message.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: The HTTP server and the WebSocket actors run on an async runtime
//! - **modules**: Code is organized into separate modules (mod statements)
//! - **Result<T, E>**: Startup failures (bad config, port in use) end the process cleanly
//! - **Arc**: The immutable configuration and the shared cooldown are reference counted
//!
//! ## Application Architecture:
//! - **config**: Configuration (TOML file + environment variables)
//! - **analysis**: Per-frame pipeline (decode, loudness, pitch, classify)
//! - **feedback**: Cooldown gate and message responder
//! - **session**: Registry of open audio streams
//! - **state**: Shared application state and frame metrics
//! - **websocket**: The `/ws` streaming endpoint
//! - **health**, **handlers**: Read-only HTTP endpoints
//! - **error**: Error types and HTTP error responses

mod analysis;    // Per-frame analysis pipeline (analysis/ directory)
mod config;      // Configuration management (config.rs)
mod error;       // Error handling types (error.rs)
mod feedback;    // Cooldown gate and responders (feedback/ directory)
mod handlers;    // HTTP request handlers (handlers/ directory)
mod health;      // Health check endpoints (health.rs)
mod session;     // Stream session registry (session.rs)
mod state;       // Application state management (state.rs)
mod websocket;   // WebSocket audio streaming (websocket.rs)

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use crate::config::AppConfig;
use crate::state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set by the signal handler task; polled by `wait_for_shutdown`.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables, and validates it
/// 2. **Sets up logging** for debugging and monitoring
/// 3. **Creates shared application state** (metrics, sessions, cooldown, responder)
/// 4. **Configures the HTTP server** with the WebSocket route and read-only endpoints
/// 5. **Handles graceful shutdown** when receiving system signals
#[actix_web::main]
async fn main() -> Result<()> {
    // .ok(): it's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!(
        sample_rate = config.analysis.sample_rate,
        noise_floor = config.analysis.noise_floor,
        loud_threshold = config.analysis.loud_threshold,
        pitch_threshold = config.analysis.pitch_threshold,
        cooldown_seconds = config.feedback.cooldown_seconds,
        cooldown_scope = config.feedback.cooldown_scope.as_str(),
        "Analysis configuration loaded"
    );

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config)?;

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
            .wrap(TracingLogger::default())
            // Audio streaming
            .route("/ws", web::get().to(websocket::stress_websocket))
            .route("/ws/audio", web::get().to(websocket::stress_websocket))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
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

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g. "debug", "stress_feedback_server=trace")
/// - If not set, defaults to "stress_feedback_server=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stress_feedback_server=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Listen for SIGTERM / SIGINT and raise the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                return;
            }
        };
        let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
            Ok(signal) => signal,
            Err(e) => {
                error!("Failed to install SIGINT handler: {}", e);
                return;
            }
        };

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

/// Resolve once the shutdown flag is set, polling every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
