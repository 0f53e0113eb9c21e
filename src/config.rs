//! # Configuration Management
//!
//! This module handles loading and validating the server configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Converts between Rust structs and TOML/JSON/environment data
//! - **derive macros**: Generate Debug, Clone, Serialize and Deserialize implementations
//! - **Result<T, E>**: Loading and validation can fail, and the caller must handle it
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__PORT, APP_ANALYSIS__NOISE_FLOOR, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impls)
//!
//! ## Immutability:
//! The configuration is loaded once at startup, validated, wrapped in an `Arc` and handed
//! to every component. Nothing mutates it afterwards; recalibrating thresholds means
//! restarting the process with new values.

use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                    // For reading environment variables

/// Upper bound for the artificial "thinking" pause before a feedback message is sent.
pub const MAX_THINKING_DELAY_MS: u64 = 5_000;

/// Main application configuration that contains all settings.
///
/// ## Sections:
/// - `server`: where to listen
/// - `analysis`: signal thresholds used by the per-frame pipeline
/// - `feedback`: cooldown and message catalog
/// - `performance`: connection and frame size limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub analysis: AnalysisConfig,
    pub feedback: FeedbackConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (e.g. a game client on the LAN)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Thresholds consumed by the frame decoder, loudness gate, pitch detector and classifier.
///
/// ## Fields:
/// - `sample_rate`: Sample rate the client records at, in Hz (frames carry no header)
/// - `noise_floor`: RMS at or below which a frame is treated as silence and dropped
/// - `loud_threshold`: RMS above which a frame is classified as `Loud`
/// - `pitch_threshold`: Dominant frequency (Hz) above which a frame is classified as `Anxious`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    pub sample_rate: u32,
    pub noise_floor: f32,
    pub loud_threshold: f32,
    pub pitch_threshold: f32,
}

/// Which sessions share a cooldown clock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    /// One clock for the whole process: feedback volume is bounded system-wide
    Global,
    /// Every connection gets its own clock
    PerSession,
}

impl CooldownScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            CooldownScope::Global => "global",
            CooldownScope::PerSession => "per_session",
        }
    }
}

/// Feedback emission settings.
///
/// ## Fields:
/// - `cooldown_seconds`: Minimum time between two emitted messages
/// - `cooldown_scope`: Whether that minimum applies per connection or to the whole server
/// - `thinking_delay_ms`: Optional pause before a message is delivered (0 disables it)
/// - `messages`: Catalog the responder picks from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    pub cooldown_seconds: f64,
    pub cooldown_scope: CooldownScope,
    pub thinking_delay_ms: u64,
    pub messages: Vec<String>,
}

/// Performance and resource limits.
///
/// ## Fields:
/// - `max_concurrent_sessions`: Maximum number of open audio streams
/// - `max_frame_bytes`: Largest WebSocket frame accepted (4 bytes per sample)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
    pub max_frame_bytes: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            noise_floor: 0.01,
            loud_threshold: 0.1,
            pitch_threshold: 300.0,
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 5.0,
            cooldown_scope: CooldownScope::Global,
            thinking_delay_ms: 0,
            messages: default_messages(),
        }
    }
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// Default values let the server start without any configuration file, and they
/// document reasonable starting points for each threshold.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            analysis: AnalysisConfig::default(),
            feedback: FeedbackConfig::default(),
            performance: PerformanceConfig {
                max_concurrent_sessions: 32,
                max_frame_bytes: 1024 * 1024,  // 262144 samples, ~6s at 44.1kHz
            },
        }
    }
}

/// The built-in feedback catalog.
pub fn default_messages() -> Vec<String> {
    [
        "Are you okay? Can I get you a glass of water?",
        "Could you speak a little more slowly?",
        "Please don't worry too much, I'm here to help.",
        "Try taking a deep breath.",
        "Is something wrong? You seem a bit upset.",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=9000`: Override server port
    /// - `APP_ANALYSIS__PITCH_THRESHOLD=280`: Override the anxious pitch threshold
    /// - `APP_FEEDBACK__COOLDOWN_SCOPE=per_session`: Give each connection its own cooldown
    /// - `PORT=3000`: Special case for deployment platforms
    ///
    /// A double underscore separates sections so that field names can keep their own underscores.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Sample rate is positive and thresholds are finite, non-negative numbers
    /// - Cooldown is finite and non-negative, the thinking delay is bounded
    /// - The message catalog is non-empty and contains no blank entries
    /// - Session and frame limits allow at least one session and one sample
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        let analysis = &self.analysis;
        if analysis.sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rate must be greater than 0"));
        }

        for (name, value) in [
            ("noise_floor", analysis.noise_floor),
            ("loud_threshold", analysis.loud_threshold),
            ("pitch_threshold", analysis.pitch_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(anyhow::anyhow!(
                    "analysis.{} must be a finite, non-negative number (got {})",
                    name,
                    value
                ));
            }
        }

        let feedback = &self.feedback;
        if !feedback.cooldown_seconds.is_finite() || feedback.cooldown_seconds < 0.0 {
            return Err(anyhow::anyhow!(
                "feedback.cooldown_seconds must be a finite, non-negative number (got {})",
                feedback.cooldown_seconds
            ));
        }

        if feedback.thinking_delay_ms > MAX_THINKING_DELAY_MS {
            return Err(anyhow::anyhow!(
                "feedback.thinking_delay_ms must be at most {} (got {})",
                MAX_THINKING_DELAY_MS,
                feedback.thinking_delay_ms
            ));
        }

        if feedback.messages.is_empty() {
            return Err(anyhow::anyhow!("Feedback message catalog cannot be empty"));
        }

        if feedback.messages.iter().any(|m| m.trim().is_empty()) {
            return Err(anyhow::anyhow!("Feedback message catalog contains a blank entry"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.performance.max_frame_bytes < 4 {
            return Err(anyhow::anyhow!("Max frame size must hold at least one 32-bit sample"));
        }

        Ok(())
    }
}
