use crate::config::CooldownScope;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let active_sessions = state.sessions.active_session_count();
    let gate = state.shared_gate();
    // Per-session gates live in their actors; only the global one has a meaningful age.
    let last_emission_seconds_ago = match gate.scope() {
        CooldownScope::Global => gate.last_emission().map(|at| at.elapsed().as_secs_f64()),
        CooldownScope::PerSession => None,
    };

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "frames": {
            "received": metrics.frames_received,
            "analyzed": metrics.analyzed_frames,
            "feedback_emitted": metrics.feedback_emitted
        },
        "sessions": {
            "active": active_sessions,
            "max": state.sessions.max_concurrent_sessions(),
            "load": load_status(active_sessions, state.sessions.max_concurrent_sessions())
        },
        "feedback": {
            "cooldown_scope": gate.scope().as_str(),
            "cooldown_seconds": gate.cooldown().as_secs_f64(),
            "last_emission_seconds_ago": last_emission_seconds_ago
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "frames": {
            "received": metrics.frames_received,
            "malformed": metrics.malformed_frames,
            "silent": metrics.silent_frames,
            "analyzed": metrics.analyzed_frames,
            "frames_per_second": rate(metrics.frames_received, uptime_seconds)
        },
        "status_counts": {
            "Relaxed": metrics.relaxed_frames,
            "Loud": metrics.loud_frames,
            "Anxious": metrics.anxious_frames
        },
        "feedback": {
            "emitted": metrics.feedback_emitted,
            "suppressed_by_cooldown": metrics.feedback_suppressed
        },
        "sessions": state.sessions.summaries()
    }))
}

fn rate(count: u64, seconds: u64) -> f64 {
    if seconds > 0 {
        count as f64 / seconds as f64
    } else {
        0.0
    }
}

fn load_status(active: usize, max: usize) -> &'static str {
    let usage = if max > 0 { active as f64 / max as f64 } else { 0.0 };

    if usage > 0.9 {
        "high_load"
    } else if usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    }
}
