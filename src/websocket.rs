//! # WebSocket Call Handler
//!
//! One actor per participant connection. Clients connect to
//! `/call/{call_id}/{source_lang}/{target_lang}` and stream raw binary PCM;
//! the actor relays each frame to the rest of the room immediately and
//! accumulates a copy until the transcription threshold is crossed.
//!
//! ## Protocol:
//! - **Client → Server**: binary frames of raw little-endian 16-bit PCM
//!   (mono, configured sample rate)
//! - **Server → Client**: binary frames (relayed peer audio) and JSON text
//!   frames (`transcription` / `error` / `status` events)

use crate::audio::AudioAccumulator;
use crate::events::OutboundFrame;
use crate::pipeline::{CallRoute, PipelineCoordinator};
use crate::session::SessionRegistry;
use crate::state::AppState;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the server pings an idle connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a connection may go without any sign of life.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket actor for one call participant.
///
/// ## Actor Model:
/// Every connection is an independent actor; the registry holds its
/// `Recipient<OutboundFrame>` so relays and broadcasts from other
/// connections and pipeline tasks are just mailbox sends.
pub struct CallSocket {
    route: CallRoute,

    /// Participant identity within the call (the source language code)
    participant_id: String,

    /// Per-connection threshold buffer
    accumulator: AudioAccumulator,

    registry: Arc<SessionRegistry>,
    pipeline: Arc<PipelineCoordinator>,
    state: AppState,
    last_heartbeat: Instant,
}

impl CallSocket {
    pub fn new(route: CallRoute, state: AppState) -> Self {
        Self {
            participant_id: route.source_lang.clone(),
            accumulator: AudioAccumulator::new(&state.config.audio),
            registry: state.registry.clone(),
            pipeline: state.pipeline.clone(),
            state,
            route,
            last_heartbeat: Instant::now(),
        }
    }

    /// Handle one inbound audio frame.
    ///
    /// Relay first so peers hear each other with no added latency, then
    /// buffer; a threshold crossing hands the captured snapshot to its own
    /// pipeline task and never blocks this receive loop.
    fn handle_audio(&mut self, data: &[u8]) {
        self.registry
            .relay_bytes(&self.route.call_id, data, &self.participant_id);

        if let Some(snapshot) = self.accumulator.append(data) {
            info!(
                "Buffer threshold reached: {} bytes, dispatching for transcription",
                snapshot.len()
            );
            self.pipeline.spawn(snapshot, self.route.clone());
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(
                    "Heartbeat timeout for participant {} in call {}, closing",
                    act.participant_id, act.route.call_id
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for CallSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            "WebSocket connected: call_id={}, user_id={}, source={}, target={}",
            self.route.call_id, self.participant_id, self.route.source_lang, self.route.target_lang
        );

        self.start_heartbeat(ctx);
        self.state.connection_opened();
        self.registry.join(
            &self.route.call_id,
            &self.participant_id,
            ctx.address().recipient(),
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(
            "WebSocket disconnected: call_id={}, user_id={}",
            self.route.call_id, self.participant_id
        );

        // Membership goes immediately; pipelines already in flight against
        // earlier snapshots run to completion regardless
        self.registry.leave(&self.route.call_id, &self.participant_id);
        self.state.connection_closed();
    }
}

/// Deliver frames queued by the registry, broadcaster, or pipeline tasks.
impl Handler<OutboundFrame> for CallSocket {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        match msg {
            OutboundFrame::Audio(payload) => ctx.binary(payload),
            OutboundFrame::Event(event) => match serde_json::to_string(&event) {
                Ok(json) => ctx.text(json),
                Err(err) => error!("Failed to serialize event: {}", err),
            },
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for CallSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                debug!("Received {} bytes from {}", data.len(), self.participant_id);
                self.handle_audio(&data);
            }
            Ok(ws::Message::Text(_)) => {
                warn!("Unexpected text frame from {}; protocol is binary-in", self.participant_id);
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed: {:?}", reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// HTTP → WebSocket upgrade for the call endpoint.
pub async fn call_socket(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<(String, String, String)>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (call_id, source_lang, target_lang) = path.into_inner();

    info!(
        "New call connection request from {:?}: call_id={}, {} -> {}",
        req.connection_info().peer_addr(),
        call_id,
        source_lang,
        target_lang
    );

    let socket = CallSocket::new(
        CallRoute {
            call_id,
            source_lang,
            target_lang,
        },
        state.get_ref().clone(),
    );

    ws::start(socket, &req, stream)
}
