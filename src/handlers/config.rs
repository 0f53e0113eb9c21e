use crate::{error::AppResult, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Read-only view of the effective configuration.
///
/// There is deliberately no update route: thresholds are fixed for the life of the process.
pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "analysis": {
                "sample_rate": config.analysis.sample_rate,
                "noise_floor": config.analysis.noise_floor,
                "loud_threshold": config.analysis.loud_threshold,
                "pitch_threshold": config.analysis.pitch_threshold
            },
            "feedback": {
                "cooldown_seconds": config.feedback.cooldown_seconds,
                "cooldown_scope": config.feedback.cooldown_scope.as_str(),
                "thinking_delay_ms": config.feedback.thinking_delay_ms,
                "message_count": config.feedback.messages.len()
            },
            "performance": {
                "max_concurrent_sessions": config.performance.max_concurrent_sessions,
                "max_frame_bytes": config.performance.max_frame_bytes
            }
        }
    })))
}
