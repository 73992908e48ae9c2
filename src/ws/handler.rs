//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::geometry::Point;
use crate::game::MatchError;
use crate::util::rate_limit::TrackerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    info!(session_id = %session_id, "new WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    // Direct replies (welcome, pong, rejections) go through this
    // channel; the writer task interleaves them with the broadcast.
    let (reply_tx, reply_rx) = mpsc::channel::<ServerMsg>(64);
    let broadcast_rx = state.events.subscribe();

    let welcome = ServerMsg::Welcome {
        session_id,
        server_time: unix_millis(),
    };
    let _ = reply_tx.send(welcome).await;

    let writer = tokio::spawn(write_loop(session_id, ws_sink, reply_rx, broadcast_rx));

    read_loop(session_id, ws_stream, &state, reply_tx).await;

    writer.abort();
    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Forward broadcast and direct messages to the socket
async fn write_loop(
    session_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut reply_rx: mpsc::Receiver<ServerMsg>,
    mut broadcast_rx: broadcast::Receiver<ServerMsg>,
) {
    loop {
        let msg = tokio::select! {
            reply = reply_rx.recv() => match reply {
                Some(msg) => msg,
                None => break,
            },
            broadcasted = broadcast_rx.recv() => match broadcasted {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        session_id = %session_id,
                        lagged_count = n,
                        "client lagging, dropped broadcasts"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        if send_msg(&mut ws_sink, &msg).await.is_err() {
            debug!(session_id = %session_id, "WebSocket send failed");
            break;
        }
    }
}

/// Parse and apply incoming client messages
async fn read_loop(
    session_id: Uuid,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    reply_tx: mpsc::Sender<ServerMsg>,
) {
    let rate_limiter = TrackerRateLimiter::new();

    while let Some(Ok(message)) = ws_stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let msg: ClientMsg = match serde_json::from_str(&text) {
            Ok(msg) => msg,
            Err(e) => {
                let reply = ServerMsg::Error {
                    code: "bad_message".to_string(),
                    message: e.to_string(),
                };
                if reply_tx.send(reply).await.is_err() {
                    break;
                }
                continue;
            }
        };

        if matches!(msg, ClientMsg::Position { .. }) && !rate_limiter.check_position() {
            debug!(session_id = %session_id, "position report rate limited");
            continue;
        }

        if let Some(reply) = apply(state, msg) {
            if reply_tx.send(reply).await.is_err() {
                break;
            }
        }
    }
}

/// Apply a client message to the engine. Events are broadcast to every
/// session; the returned message, if any, goes to the sender only.
fn apply(state: &AppState, msg: ClientMsg) -> Option<ServerMsg> {
    let now = unix_millis();

    match msg {
        ClientMsg::Ping { t } => Some(ServerMsg::Pong { t }),

        ClientMsg::Position { camp, x, y, t } => {
            state.engine.lock().report_position(camp, Point::new(x, y), t);
            None
        }

        ClientMsg::Start { camp, stage } => {
            let result = state.engine.lock().start(camp, stage, now);
            control(state, "start", result, now)
        }
        ClientMsg::Pause => {
            let result = state.engine.lock().pause(now);
            control(state, "pause", result, now)
        }
        ClientMsg::Resume => {
            let result = state.engine.lock().resume(now);
            control(state, "resume", result, now)
        }
        ClientMsg::End => {
            let result = state.engine.lock().end();
            control(state, "end", result, now)
        }

        ClientMsg::Foul => {
            if let Some(event) = state.engine.lock().foul() {
                state.broadcast_events(vec![event]);
            }
            None
        }
        ClientMsg::PlaceChargingStation => {
            if let Some(event) = state.engine.lock().place_charging_station() {
                state.broadcast_events(vec![event]);
            }
            None
        }
        ClientMsg::ForceOrder { action } => {
            match state.engine.lock().force_order(action, now) {
                Ok(events) => {
                    state.broadcast_events(events);
                    None
                }
                Err(e) => Some(rejection("force_order", &e)),
            }
        }
    }
}

/// Handle a control command result: success refreshes every client's
/// snapshot immediately, rejection is reported to the sender.
fn control(
    state: &AppState,
    command: &'static str,
    result: Result<(), MatchError>,
    now: i64,
) -> Option<ServerMsg> {
    match result {
        Ok(()) => {
            state.broadcast_snapshot(now);
            None
        }
        Err(e) => {
            warn!(command, error = %e, "control command rejected");
            Some(rejection(command, &e))
        }
    }
}

fn rejection(command: &str, error: &MatchError) -> ServerMsg {
    ServerMsg::Error {
        code: format!("{command}_rejected"),
        message: error.to_string(),
    }
}

/// Serialize and send a message over the socket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(msg).map_err(axum::Error::new)?;
    sink.send(Message::Text(text)).await
}
