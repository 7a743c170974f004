//! WebSocket connection adapter.
//!
//! Each upgraded connection registers one subscription with the hub. The
//! send loop drains the outbox onto the socket in the connection task; the
//! receive loop runs in its own task and only watches for liveness and
//! close. Whichever side fails first moves the subscription to `Closing`,
//! which removes it from the pool before the transport is torn down.

use anyhow::anyhow;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message as WsMessage, Utf8Bytes, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, Level};

use kubecast_core::WebSocketConfig;
use kubecast_hub::{CloseReason, Subscription, SubscriptionCloser};

use crate::state::AppState;

/// Timing settings for one connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub heartbeat: Option<Duration>,
}

impl From<&WebSocketConfig> for ConnectionSettings {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            heartbeat: config.heartbeat(),
        }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let connections = state.connections.clone();
    ws.on_upgrade(move |socket| connections.track_future(handle_socket(socket, state)))
}

/// Handle individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let subscription = state.hub.subscribe();
    let settings = ConnectionSettings::from(&state.config.websocket);
    info!(
        subscriber = %subscription.id(),
        pool_size = state.hub.pool_size(),
        "WebSocket client connected"
    );

    let reason = run_connection(socket, subscription, settings).await;

    let pool_size = state.hub.pool_size();
    if disconnect_level(reason) == Level::DEBUG {
        debug!(reason = %reason, pool_size, "WebSocket client disconnected");
    } else {
        info!(reason = %reason, pool_size, "WebSocket client disconnected");
    }
}

/// Idle timeouts are routine and stay at debug.
fn disconnect_level(reason: CloseReason) -> Level {
    match reason {
        CloseReason::ReadTimeout => Level::DEBUG,
        _ => Level::INFO,
    }
}

/// Drive one connection until it closes. Returns why it closed.
pub async fn run_connection(
    socket: WebSocket,
    mut subscription: Subscription,
    settings: ConnectionSettings,
) -> CloseReason {
    let id = subscription.id();
    let closer = subscription.closer();
    let (mut sender, receiver) = socket.split();

    let recv_task = tokio::spawn(receive_loop(receiver, closer.clone(), settings.read_timeout));

    if let Err(e) = send_loop(&mut sender, &mut subscription, &settings).await {
        debug!(subscriber = %id, error = %e, "WebSocket send failed, client disconnected");
        closer.close(CloseReason::TransportError);
    }
    recv_task.abort();

    let reason = subscription
        .close_reason()
        .unwrap_or(CloseReason::Released);

    // Out of the pool by now; only the transport is left to release.
    if let Some(frame) = close_frame(reason) {
        let _ = tokio::time::timeout(settings.write_timeout, sender.send(WsMessage::Close(Some(frame))))
            .await;
    }
    drop(sender);
    drop(subscription);

    debug!(subscriber = %id, reason = %reason, "Connection closed");
    reason
}

/// Forward queued messages to the client until the outbox ends.
async fn send_loop(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    subscription: &mut Subscription,
    settings: &ConnectionSettings,
) -> anyhow::Result<()> {
    let id = subscription.id();
    let mut heartbeat = settings.heartbeat.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        // Pings go first so a long burst cannot starve the heartbeat.
        tokio::select! {
            biased;

            _ = tick(&mut heartbeat) => {
                write(sender, WsMessage::Ping(Default::default()), settings.write_timeout).await?;
            }

            next = subscription.next() => {
                let Some(message) = next else {
                    return Ok(());
                };
                if subscription.close_reason().is_some_and(|r| r.abandons_outbox()) {
                    debug!(
                        subscriber = %id,
                        abandoned = subscription.queued() + 1,
                        "Peer gone, abandoning queued messages"
                    );
                    return Ok(());
                }
                let json = match message.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        // Only this client misses this message.
                        error!(
                            subscriber = %id,
                            message_type = %message.message_type(),
                            error = %e,
                            "Failed to serialize message"
                        );
                        continue;
                    }
                };
                write(sender, WsMessage::Text(json.into()), settings.write_timeout).await?;
            }
        }
    }
}

/// Watch the client side for close, errors and the idle read deadline.
async fn receive_loop(
    mut receiver: SplitStream<WebSocket>,
    closer: SubscriptionCloser,
    read_timeout: Duration,
) {
    let id = closer.id();
    let reason = loop {
        match tokio::time::timeout(read_timeout, receiver.next()).await {
            Err(_) => {
                debug!(
                    subscriber = %id,
                    timeout_secs = read_timeout.as_secs(),
                    "WebSocket read deadline expired"
                );
                break CloseReason::ReadTimeout;
            }
            Ok(None) => break CloseReason::PeerClosed,
            Ok(Some(Ok(WsMessage::Close(frame)))) => {
                debug!(subscriber = %id, ?frame, "WebSocket client sent close frame");
                break CloseReason::PeerClosed;
            }
            Ok(Some(Ok(WsMessage::Text(text)))) => {
                debug!(subscriber = %id, len = text.len(), "Ignoring inbound text frame");
            }
            // Ping, pong and binary frames only prove liveness.
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => {
                debug!(subscriber = %id, error = %e, "WebSocket read failed");
                break CloseReason::TransportError;
            }
        }
    };
    closer.close(reason);
}

async fn write(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    message: WsMessage,
    write_timeout: Duration,
) -> anyhow::Result<()> {
    tokio::time::timeout(write_timeout, sender.send(message))
        .await
        .map_err(|_| anyhow!("write timed out after {}s", write_timeout.as_secs()))??;
    Ok(())
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Close frame to send, if the peer can still receive one.
fn close_frame(reason: CloseReason) -> Option<CloseFrame> {
    let code = match reason {
        CloseReason::PeerClosed | CloseReason::TransportError => return None,
        CloseReason::Shutdown => close_code::AWAY,
        CloseReason::Overflow => close_code::AGAIN,
        CloseReason::ReadTimeout | CloseReason::Unsubscribed | CloseReason::Released => {
            close_code::NORMAL
        }
    };
    Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason.as_str()),
    })
}
