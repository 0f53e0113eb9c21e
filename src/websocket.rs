//! # WebSocket Audio Streaming Handler
//!
//! Clients connect to `/ws` (or `/ws/audio`) and stream raw audio frames; the server
//! answers each analyzed frame with a JSON message.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: The upgrade is refused with 503 when the session limit is reached
//! 2. **Ready**: The server sends a `session_status` message carrying the session id
//! 3. **Audio Streaming**: Each binary message is one frame of mono little-endian `f32`
//!    samples at the configured sample rate
//! 4. **Results**: Frames above the noise floor produce one `analysis` message each;
//!    silent and malformed frames produce nothing
//! 5. **Heartbeat**: The server pings every 30s and drops clients silent for 60s
//!
//! ## Message Format:
//! - **Client → Server**: Binary audio frames, optional JSON `{"type":"ping","timestamp":n}`
//! - **Server → Client**: JSON, e.g.
//!   `{"type":"analysis","session_id":"…","stress_score":85,"pitch":441.43,"status":"Anxious","volume":0.3536,"ai_message":"…"}`
//!
//! ## Ordering:
//! Each connection is one actor and frames are analyzed inside the stream handler, so a
//! connection's frames are processed strictly one after another. Outbound messages go
//! through a per-connection outbox: a result delayed by the thinking delay holds back
//! every later result of that connection, and whatever is still queued when the actor
//! stops is dropped.
//!
//! ## Fragmented messages:
//! Continuation frames are reassembled up to `performance.max_frame_bytes` and then
//! handled like an unfragmented binary or text message.

use crate::analysis::classifier::StressStatus;
use crate::analysis::{AnalysisPipeline, AnalysisResult};
use crate::error::{AppError, AppResult};
use crate::session::StreamSession;
use crate::state::AppState;

use actix::prelude::*;
use actix_http::ws::Item;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the server pings the client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a client may stay silent before the connection is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Messages sent by the server.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Result of one analyzed frame
    #[serde(rename = "analysis")]
    Analysis {
        session_id: String,
        /// Intensity score of the status
        stress_score: u8,
        /// Dominant frequency in Hz, 2 decimal places
        pitch: f64,
        status: StressStatus,
        /// RMS loudness, 4 decimal places
        volume: f64,
        /// Feedback text, empty when none was emitted
        ai_message: String,
    },

    #[serde(rename = "session_status")]
    SessionStatus {
        session_id: String,
        status: String,
        message: Option<String>,
    },

    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
        session_id: Option<String>,
    },

    #[serde(rename = "pong")]
    Pong { timestamp: u64 },
}

impl ServerMessage {
    pub fn analysis(session_id: &str, result: &AnalysisResult) -> Self {
        ServerMessage::Analysis {
            session_id: session_id.to_string(),
            stress_score: result.intensity,
            pitch: round_to(result.pitch_hz, 2),
            status: result.status,
            volume: round_to(result.loudness, 4),
            ai_message: result.feedback_message.clone(),
        }
    }
}

/// Messages accepted from the client as text frames.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "ping")]
    Ping { timestamp: u64 },
}

fn round_to(value: f32, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value as f64 * factor).round() / factor
}

/// A message rebuilt from its continuation frames.
#[derive(Debug, PartialEq)]
enum Reassembled {
    Binary(Vec<u8>),
    Text(String),
}

#[derive(Debug, PartialEq)]
enum FragmentError {
    NotStarted,
    TooLarge { limit: usize },
    InvalidUtf8,
}

impl fmt::Display for FragmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentError::NotStarted => write!(f, "continuation frame without a first fragment"),
            FragmentError::TooLarge { limit } => {
                write!(f, "fragmented message exceeds {} bytes", limit)
            }
            FragmentError::InvalidUtf8 => write!(f, "fragmented text message is not valid UTF-8"),
        }
    }
}

/// Collects continuation frames until the last one arrives.
struct FragmentBuffer {
    limit: usize,
    binary: bool,
    data: Option<Vec<u8>>,
}

impl FragmentBuffer {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            binary: true,
            data: None,
        }
    }

    fn push(&mut self, item: Item) -> Result<Option<Reassembled>, FragmentError> {
        let (chunk, last) = match item {
            Item::FirstBinary(chunk) => {
                self.binary = true;
                self.data = Some(Vec::new());
                (chunk, false)
            }
            Item::FirstText(chunk) => {
                self.binary = false;
                self.data = Some(Vec::new());
                (chunk, false)
            }
            Item::Continue(chunk) => (chunk, false),
            Item::Last(chunk) => (chunk, true),
        };

        let data = self.data.as_mut().ok_or(FragmentError::NotStarted)?;
        if data.len() + chunk.len() > self.limit {
            self.data = None;
            return Err(FragmentError::TooLarge { limit: self.limit });
        }
        data.extend_from_slice(&chunk);

        if !last {
            return Ok(None);
        }

        let data = self.data.take().unwrap_or_default();
        if self.binary {
            Ok(Some(Reassembled::Binary(data)))
        } else {
            String::from_utf8(data)
                .map(|text| Some(Reassembled::Text(text)))
                .map_err(|_| FragmentError::InvalidUtf8)
        }
    }
}

/// One audio stream connection.
///
/// ## Actor Model:
/// Each connection is an independent actor. Frames from the same connection arrive as
/// sequential `StreamHandler` calls; different connections run concurrently and only
/// meet at the shared state (metrics, and the cooldown gate when it is global).
pub struct StressWebSocket {
    session: Arc<StreamSession>,
    pipeline: AnalysisPipeline,
    state: AppState,
    thinking_delay: Duration,
    /// Serialized messages waiting for their send time, in send order
    outbox: VecDeque<(Instant, String)>,
    fragments: FragmentBuffer,
    last_heartbeat: Instant,
}

impl StressWebSocket {
    pub fn new(state: AppState, session: Arc<StreamSession>) -> Self {
        let thinking_delay = Duration::from_millis(state.config.feedback.thinking_delay_ms);
        let fragments = FragmentBuffer::new(state.config.performance.max_frame_bytes);
        Self {
            pipeline: state.pipeline_for_session(),
            session,
            state,
            thinking_delay,
            outbox: VecDeque::new(),
            fragments,
            last_heartbeat: Instant::now(),
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => ctx.text(json),
            Err(err) => error!("Failed to serialize outbound message: {}", err),
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        let error_msg = ServerMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
            session_id: Some(self.session.session_id.clone()),
        };
        self.send(ctx, &error_msg);
        warn!(session_id = %self.session.session_id, "WebSocket error {}: {}", code, message);
    }

    /// Run one binary frame through the pipeline and forward the result, if any.
    fn handle_audio_frame(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        let Some(result) = self.pipeline.analyze(data, Instant::now()) else {
            self.session.record_frame(false, false);
            return;
        };
        self.session.record_frame(true, result.has_feedback());

        let json = match serde_json::to_string(&ServerMessage::analysis(&self.session.session_id, &result)) {
            Ok(json) => json,
            Err(err) => {
                error!("Failed to serialize analysis result: {}", err);
                return;
            }
        };

        let delay = if result.has_feedback() {
            self.thinking_delay
        } else {
            Duration::ZERO
        };
        self.deliver(json, delay, ctx);
    }

    /// Send now, or queue behind anything still waiting in the outbox.
    fn deliver(&mut self, json: String, delay: Duration, ctx: &mut ws::WebsocketContext<Self>) {
        if self.outbox.is_empty() && delay.is_zero() {
            ctx.text(json);
            return;
        }

        let mut due = Instant::now() + delay;
        if let Some((last_due, _)) = self.outbox.back() {
            due = due.max(*last_due);
        }

        let idle = self.outbox.is_empty();
        self.outbox.push_back((due, json));
        if idle {
            self.schedule_flush(ctx);
        }
    }

    fn schedule_flush(&self, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some((due, _)) = self.outbox.front() {
            let wait = due.saturating_duration_since(Instant::now());
            // Cancelled with the actor, taking the queued messages with it.
            ctx.run_later(wait, |act, ctx| act.flush_outbox(ctx));
        }
    }

    fn flush_outbox(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let now = Instant::now();
        while self.outbox.front().is_some_and(|(due, _)| *due <= now) {
            if let Some((_, json)) = self.outbox.pop_front() {
                ctx.text(json);
            }
        }
        self.schedule_flush(ctx);
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Ping { timestamp }) => {
                self.last_heartbeat = Instant::now();
                self.send(ctx, &ServerMessage::Pong { timestamp });
            }
            Err(_) => {
                self.send_error(
                    ctx,
                    "unexpected_text",
                    "Audio must be sent as binary frames of little-endian f32 samples",
                );
            }
        }
    }

    fn handle_continuation(&mut self, item: Item, ctx: &mut ws::WebsocketContext<Self>) {
        match self.fragments.push(item) {
            Ok(None) => {}
            Ok(Some(Reassembled::Binary(data))) => self.handle_audio_frame(&data, ctx),
            Ok(Some(Reassembled::Text(text))) => self.handle_text(&text, ctx),
            Err(err) => {
                self.session.record_frame(false, false);
                self.send_error(ctx, "fragment_error", &err.to_string());
            }
        }
    }
}

impl Actor for StressWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            session_id = %self.session.session_id,
            cooldown_scope = self.pipeline.gate().scope().as_str(),
            "WebSocket session started"
        );

        self.send(
            ctx,
            &ServerMessage::SessionStatus {
                session_id: self.session.session_id.clone(),
                status: "ready".to_string(),
                message: Some("Send binary audio frames to start analysis".to_string()),
            },
        );

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(session_id = %act.session.session_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let summary = self.session.summary();
        self.state.sessions.remove_session(&self.session.session_id);
        info!(
            session_id = %summary.session_id,
            frames_received = summary.frames_received,
            frames_analyzed = summary.frames_analyzed,
            feedback_emitted = summary.feedback_emitted,
            dropped_messages = self.outbox.len(),
            duration_seconds = summary.duration_seconds,
            "WebSocket session stopped"
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for StressWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                self.handle_audio_frame(&data, ctx);
            }
            Ok(ws::Message::Text(text)) => {
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session.session_id, "WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(item)) => {
                self.last_heartbeat = Instant::now();
                self.handle_continuation(item, ctx);
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session_id = %self.session.session_id, "WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler.
///
/// Registers a session, then upgrades the HTTP request. The session is released again if
/// the handshake fails; otherwise the actor releases it when it stops.
pub async fn stress_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    debug!("New WebSocket connection request from: {:?}", req.connection_info().peer_addr());

    let session = state
        .sessions
        .create_session()
        .map_err(AppError::ServiceUnavailable)?;
    let session_id = session.session_id.clone();
    let max_frame_bytes = state.config.performance.max_frame_bytes;

    let actor = StressWebSocket::new(state.get_ref().clone(), session);
    ws::WsResponseBuilder::new(actor, &req, stream)
        .frame_size(max_frame_bytes)
        .start()
        .map_err(|err| {
            state.sessions.remove_session(&session_id);
            AppError::BadRequest(format!("WebSocket handshake failed: {}", err))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, CooldownScope};
    use actix_web::test as actix_test;
    use actix_web::{App, HttpServer};
    use actix_web::web::Bytes;
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::{Data, OpCode};
    use tokio_tungstenite::tungstenite::protocol::frame::Frame;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    fn result(status: StressStatus, message: &str) -> AnalysisResult {
        AnalysisResult {
            loudness: 0.123_456_7,
            pitch_hz: 441.434_3,
            status,
            intensity: status.intensity(),
            feedback_message: message.to_string(),
        }
    }

    fn sine_frame(freq: f32, amplitude: f32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / 44_100.0).sin())
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    /// Serve `/ws` on an ephemeral port. Returns the client URL.
    fn serve(state: AppState) -> (String, actix_web::dev::ServerHandle) {
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/ws", web::get().to(stress_websocket))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (format!("ws://{}/ws", addr), handle)
    }

    async fn connect(url: &str) -> (Client, String) {
        let (mut client, _) = connect_async(url).await.unwrap();
        let ready = next_json(&mut client).await;
        assert_eq!(ready["type"], "session_status");
        assert_eq!(ready["status"], "ready");
        let session_id = ready["session_id"].as_str().unwrap().to_string();
        (client, session_id)
    }

    async fn next_json(client: &mut Client) -> serde_json::Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("no message within 5s")
                .expect("connection closed")
                .unwrap();
            match msg {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    async fn wait_for_no_sessions(state: &AppState) {
        for _ in 0..50 {
            if state.sessions.active_session_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("session still registered");
    }

    #[test]
    fn test_analysis_message_format() {
        let msg = ServerMessage::analysis("abc", &result(StressStatus::Anxious, "Breathe."));
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "analysis");
        assert_eq!(json["session_id"], "abc");
        assert_eq!(json["stress_score"], 85);
        assert_eq!(json["status"], "Anxious");
        assert_eq!(json["pitch"], 441.43);
        assert_eq!(json["volume"], 0.1235);
        assert_eq!(json["ai_message"], "Breathe.");
    }

    #[test]
    fn test_suppressed_feedback_is_empty_string() {
        let msg = ServerMessage::analysis("abc", &result(StressStatus::Loud, ""));
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["stress_score"], 70);
        assert_eq!(json["ai_message"], "");
    }

    #[test]
    fn test_client_ping_parsing() {
        match serde_json::from_str::<ClientMessage>(r#"{"type":"ping","timestamp":42}"#).unwrap() {
            ClientMessage::Ping { timestamp } => assert_eq!(timestamp, 42),
        }
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"config"}"#).is_err());
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_to(0.000_04, 4), 0.0);
        assert_eq!(round_to(299.996, 2), 300.0);
    }

    #[test]
    fn test_fragments_reassemble() {
        let mut buffer = FragmentBuffer::new(16);
        assert_eq!(buffer.push(Item::FirstBinary(Bytes::from_static(&[1, 2]))), Ok(None));
        assert_eq!(buffer.push(Item::Continue(Bytes::from_static(&[3]))), Ok(None));
        assert_eq!(
            buffer.push(Item::Last(Bytes::from_static(&[4]))),
            Ok(Some(Reassembled::Binary(vec![1, 2, 3, 4])))
        );

        assert_eq!(buffer.push(Item::FirstText(Bytes::from_static(b"he"))), Ok(None));
        assert_eq!(
            buffer.push(Item::Last(Bytes::from_static(b"llo"))),
            Ok(Some(Reassembled::Text("hello".to_string())))
        );
    }

    #[test]
    fn test_fragment_errors() {
        let mut buffer = FragmentBuffer::new(4);
        assert_eq!(
            buffer.push(Item::Last(Bytes::from_static(&[0]))),
            Err(FragmentError::NotStarted)
        );

        assert_eq!(buffer.push(Item::FirstBinary(Bytes::from_static(&[0; 3]))), Ok(None));
        assert_eq!(
            buffer.push(Item::Continue(Bytes::from_static(&[0; 2]))),
            Err(FragmentError::TooLarge { limit: 4 })
        );
        // The oversized message is discarded, not resumed.
        assert_eq!(
            buffer.push(Item::Last(Bytes::from_static(&[0]))),
            Err(FragmentError::NotStarted)
        );

        assert_eq!(buffer.push(Item::FirstText(Bytes::from_static(&[0xff]))), Ok(None));
        assert_eq!(
            buffer.push(Item::Last(Bytes::new())),
            Err(FragmentError::InvalidUtf8)
        );
    }

    #[actix_web::test]
    async fn test_upgrade_refused_when_sessions_exhausted() {
        let mut config = AppConfig::default();
        config.performance.max_concurrent_sessions = 1;
        let state = AppState::new(config).unwrap();
        let _held = state.sessions.create_session().unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/ws", web::get().to(stress_websocket)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/ws").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_plain_get_is_rejected_and_session_released() {
        let state = AppState::new(AppConfig::default()).unwrap();
        let sessions = state.sessions.clone();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/ws", web::get().to(stress_websocket)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/ws").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
        assert_eq!(sessions.active_session_count(), 0);
    }

    #[actix_web::test]
    async fn test_binary_frame_is_analyzed() {
        let state = AppState::new(AppConfig::default()).unwrap();
        let (url, server) = serve(state.clone());
        let (mut client, session_id) = connect(&url).await;

        client.send(Message::Binary(sine_frame(100.0, 0.5, 4096))).await.unwrap();
        let reply = next_json(&mut client).await;

        assert_eq!(reply["type"], "analysis");
        assert_eq!(reply["session_id"], session_id.as_str());
        assert_eq!(reply["status"], "Loud");
        assert_eq!(reply["stress_score"], 70);
        assert!(!reply["ai_message"].as_str().unwrap().is_empty());
        assert_eq!(state.get_metrics_snapshot().feedback_emitted, 1);

        client.close(None).await.unwrap();
        wait_for_no_sessions(&state).await;
        server.stop(false).await;
    }

    #[actix_web::test]
    async fn test_silent_and_malformed_frames_send_nothing() {
        let state = AppState::new(AppConfig::default()).unwrap();
        let (url, server) = serve(state.clone());
        let (mut client, _) = connect(&url).await;

        client.send(Message::Binary(vec![0; 4096])).await.unwrap();
        client.send(Message::Binary(vec![0; 3])).await.unwrap();
        client.send(Message::Text(r#"{"type":"ping","timestamp":7}"#.into())).await.unwrap();

        // Frames are handled in order, so the pong is the very next message.
        let reply = next_json(&mut client).await;
        assert_eq!(reply["type"], "pong");
        assert_eq!(reply["timestamp"], 7);

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.silent_frames, 1);
        assert_eq!(metrics.malformed_frames, 1);
        assert_eq!(metrics.analyzed_frames, 0);

        server.stop(false).await;
    }

    #[actix_web::test]
    async fn test_unexpected_text_is_an_error() {
        let state = AppState::new(AppConfig::default()).unwrap();
        let (url, server) = serve(state);
        let (mut client, session_id) = connect(&url).await;

        client.send(Message::Text("hello".into())).await.unwrap();
        let reply = next_json(&mut client).await;

        assert_eq!(reply["type"], "error");
        assert_eq!(reply["code"], "unexpected_text");
        assert_eq!(reply["session_id"], session_id.as_str());

        server.stop(false).await;
    }

    #[actix_web::test]
    async fn test_fragmented_frame_is_analyzed() {
        let state = AppState::new(AppConfig::default()).unwrap();
        let (url, server) = serve(state);
        let (mut client, _) = connect(&url).await;

        let frame = sine_frame(100.0, 0.5, 4096);
        let (head, tail) = frame.split_at(frame.len() / 2);
        client
            .send(Message::Frame(Frame::message(head.to_vec(), OpCode::Data(Data::Binary), false)))
            .await
            .unwrap();
        client
            .send(Message::Frame(Frame::message(tail.to_vec(), OpCode::Data(Data::Continue), true)))
            .await
            .unwrap();

        let reply = next_json(&mut client).await;
        assert_eq!(reply["type"], "analysis");
        assert_eq!(reply["status"], "Loud");

        server.stop(false).await;
    }

    #[actix_web::test]
    async fn test_thinking_delay_keeps_frame_order() {
        let mut config = AppConfig::default();
        config.feedback.thinking_delay_ms = 300;
        config.feedback.cooldown_scope = CooldownScope::PerSession;
        let state = AppState::new(config).unwrap();
        let (url, server) = serve(state);
        let (mut client, _) = connect(&url).await;

        let sent_at = Instant::now();
        client.send(Message::Binary(sine_frame(100.0, 0.5, 4096))).await.unwrap();
        client.send(Message::Binary(sine_frame(100.0, 0.05, 4096))).await.unwrap();

        let first = next_json(&mut client).await;
        let second = next_json(&mut client).await;

        assert!(sent_at.elapsed() >= Duration::from_millis(300));
        assert_eq!(first["status"], "Loud");
        assert!(!first["ai_message"].as_str().unwrap().is_empty());
        assert_eq!(second["status"], "Relaxed");
        assert_eq!(second["ai_message"], "");

        server.stop(false).await;
    }

    #[actix_web::test]
    async fn test_delayed_message_dropped_on_close() {
        let mut config = AppConfig::default();
        config.feedback.thinking_delay_ms = 2000;
        let state = AppState::new(config).unwrap();
        let (url, server) = serve(state.clone());
        let (mut client, _) = connect(&url).await;

        client.send(Message::Binary(sine_frame(440.0, 0.5, 4096))).await.unwrap();
        client.close(None).await.unwrap();

        loop {
            let msg = tokio::time::timeout(Duration::from_secs(1), client.next())
                .await
                .expect("close not acknowledged within 1s");
            match msg {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(Message::Text(text))) => panic!("delayed message was sent: {}", text),
                Some(Ok(_)) => continue,
            }
        }

        wait_for_no_sessions(&state).await;
        assert_eq!(state.get_metrics_snapshot().feedback_emitted, 1);
        server.stop(false).await;
    }
}
