//! Per-connection WebSocket handling.
//!
//! Each connection is one source of one session: `/ws/audio/{session}/{mic|sys}`.
//! Binary frames carry audio in the wire codec, text frames carry JSON
//! control messages, and everything the server says flows back as JSON
//! events. Audio ingestion never blocks on the pipeline: when the inbound
//! queue is full, frames are dropped and the segmenter rides over the gap.

use crate::audio::frame::AudioFrame;
use crate::config::Config;
use crate::server::AppState;
use crate::server::protocol::{self, ControlMessage, EventMessage};
use crate::session::{self, SourceId, SourceStats, run_source_pipeline};
use crate::wire;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub async fn upgrade(
    State(state): State<Arc<AppState>>,
    Path((session_id, source)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    match source.parse::<SourceId>() {
        Ok(source) => {
            ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, source))
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    session_id: String,
    source: SourceId,
) {
    let (mut sink, mut stream) = socket.split();

    let handle = match state.registry.attach(&session_id, source) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(session = %session_id, source = %source, "connection refused: {}", e);
            send_event(
                &mut sink,
                &EventMessage::Error {
                    seq: 0,
                    text: e.to_string(),
                },
            )
            .await;
            let _ = sink.close().await;
            return;
        }
    };
    let cancel = handle.cancel_token();
    let stats = Arc::new(SourceStats::default());

    // Inbound queue sized so buffered PCM stays under the configured byte cap
    let frame_bytes =
        (state.config.audio.sample_rate as usize * state.config.audio.frame_ms as usize / 1000)
            * 2;
    let inbound_capacity =
        (state.config.server.inbound_buffer_bytes / frame_bytes.max(2)).max(1);
    let (frame_tx, frame_rx) = mpsc::channel::<AudioFrame>(inbound_capacity);
    let (event_tx, mut event_rx) = mpsc::channel(256);

    let pipeline = tokio::spawn(run_source_pipeline(
        session_id.clone(),
        source,
        Arc::clone(&state.config),
        Arc::clone(&state.pool),
        Arc::clone(&stats),
        cancel.clone(),
        frame_rx,
        event_tx,
    ));

    info!(session = %session_id, source = %source, "client connected");
    let greeting = EventMessage::Info {
        seq: 0,
        text: format!("connected to session '{}' as '{}'", session_id, source),
    };
    if send_event(&mut sink, &greeting).await {
        let (status_tx, mut status_rx) = mpsc::channel::<String>(4);
        let mut system_audio =
            SystemAudio::new(Arc::clone(&state.config), frame_tx.clone(), status_tx);

        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(event) => {
                        if !send_event(&mut sink, &EventMessage::from(&event)).await {
                            break;
                        }
                    }
                    None => break,
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Binary(bytes))) => match wire::decode(&bytes) {
                        Ok(frame) => {
                            if frame_tx.try_send(frame).is_err() {
                                session::note_frame_dropped(&stats, &session_id, source);
                            }
                        }
                        Err(e) => {
                            // One bad frame does not end the stream
                            SourceStats::incr(&stats.decode_errors);
                            let reply = EventMessage::Error { seq: 0, text: e.to_string() };
                            if !send_event(&mut sink, &reply).await {
                                break;
                            }
                        }
                    },
                    Some(Ok(Message::Text(text))) => {
                        let reply = match protocol::parse_control(&text) {
                            Ok(ControlMessage::Stop) => {
                                debug!(session = %session_id, "stop requested by client");
                                state.registry.stop(&session_id);
                                break;
                            }
                            Ok(ControlMessage::StartSystemAudio) => {
                                if source == SourceId::Sys {
                                    match system_audio.start() {
                                        Ok(text) => EventMessage::Info { seq: 0, text },
                                        Err(e) => EventMessage::Error {
                                            seq: 0,
                                            text: e.to_string(),
                                        },
                                    }
                                } else {
                                    EventMessage::Error {
                                        seq: 0,
                                        text: "system audio capture is only available on the 'sys' source"
                                            .to_string(),
                                    }
                                }
                            }
                            Ok(ControlMessage::StopSystemAudio) => EventMessage::Info {
                                seq: 0,
                                text: system_audio.stop(),
                            },
                            Err(e) => EventMessage::Error {
                                seq: 0,
                                text: e.to_string(),
                            },
                        };
                        if !send_event(&mut sink, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session = %session_id, source = %source, "client closed the socket");
                        break;
                    }
                    // Ping/pong are answered by axum
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(session = %session_id, source = %source, "socket error: {}", e);
                        break;
                    }
                },
                status = status_rx.recv() => {
                    if let Some(text) = status {
                        let _ = system_audio.stop();
                        let reply = EventMessage::Error { seq: 0, text };
                        if !send_event(&mut sink, &reply).await {
                            break;
                        }
                    }
                }
                () = cancel.cancelled() => {
                    debug!(session = %session_id, source = %source, "source cancelled");
                    break;
                }
            }
        }

        let _ = system_audio.stop();
        drop(system_audio);
    }

    // Close the frame channel so the pipeline flushes its open segment and
    // drains in-flight recognition; forward whatever it still produces.
    drop(frame_tx);
    while let Some(event) = event_rx.recv().await {
        if !send_event(&mut sink, &EventMessage::from(&event)).await {
            break;
        }
    }

    state.registry.detach(&handle);
    let _ = sink.close().await;
    let _ = pipeline.await;
    info!(session = %session_id, source = %source, "client disconnected");
}

async fn send_event(sink: &mut SplitSink<WebSocket, Message>, message: &EventMessage) -> bool {
    // Serialization of these enums cannot fail; treat it as a non-event
    let Ok(json) = serde_json::to_string(message) else {
        return true;
    };
    sink.send(Message::Text(json.into())).await.is_ok()
}

/// Server-side loopback capture control for a `sys` connection.
#[cfg_attr(not(feature = "capture"), allow(dead_code))]
struct SystemAudio {
    config: Arc<Config>,
    frame_tx: mpsc::Sender<AudioFrame>,
    status_tx: mpsc::Sender<String>,
    #[cfg(feature = "capture")]
    handle: Option<crate::audio::capture::CaptureHandle>,
}

impl SystemAudio {
    fn new(
        config: Arc<Config>,
        frame_tx: mpsc::Sender<AudioFrame>,
        status_tx: mpsc::Sender<String>,
    ) -> Self {
        Self {
            config,
            frame_tx,
            status_tx,
            #[cfg(feature = "capture")]
            handle: None,
        }
    }

    #[cfg(feature = "capture")]
    fn start(&mut self) -> crate::error::Result<String> {
        use crate::audio::capture;
        use crate::audio::framer::FramerConfig;

        if self.handle.is_some() {
            return Ok("system audio capture already running".to_string());
        }
        let handle = capture::start_system_capture(
            self.config.audio.device.as_deref(),
            FramerConfig {
                // native_rate is replaced with the device's actual rate
                native_rate: self.config.audio.sample_rate,
                target_rate: self.config.audio.sample_rate,
                frame_ms: self.config.audio.frame_ms,
            },
            self.frame_tx.clone(),
            self.status_tx.clone(),
        )?;
        let text = format!("system audio capture started on '{}'", handle.device_name());
        self.handle = Some(handle);
        Ok(text)
    }

    #[cfg(not(feature = "capture"))]
    fn start(&mut self) -> crate::error::Result<String> {
        Err(crate::error::InterscribeError::AudioCapture {
            message: "server built without system audio capture support".to_string(),
        })
    }

    fn stop(&mut self) -> String {
        #[cfg(feature = "capture")]
        if let Some(handle) = self.handle.take() {
            handle.stop();
            return "system audio capture stopped".to_string();
        }
        "system audio capture not running".to_string()
    }
}
