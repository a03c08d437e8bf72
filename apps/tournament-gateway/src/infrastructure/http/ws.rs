//! Client Session
//!
//! Glue between one downstream WebSocket and the shared stream it asked
//! for. The session forwards the frames queued on its [`ClientHandle`] to
//! the socket and ends on client close, read error or write error. The
//! [`Subscription`](crate::application::services::Subscription) guard is
//! dropped on every exit path, which detaches the client exactly once.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use super::controller::AppState;
use super::request::StreamQuery;
use crate::domain::streaming::ServerFrame;
use crate::domain::subscription::ClientHandle;

pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state, query))
}

async fn run_session(socket: WebSocket, state: AppState, query: StreamQuery) {
    let (mut sender, mut receiver) = socket.split();

    let Some((symbol, interval)) = query.validated() else {
        tracing::debug!(?query, "Rejecting stream request without symbol or interval");
        if let Ok(json) = ServerFrame::missing_params().to_json() {
            let _ = sender.send(Message::Text(json.into())).await;
        }
        let _ = sender.send(Message::Close(None)).await;
        return;
    };

    tracing::info!(symbol, interval, "New stream client");

    let (client, mut outbound) = ClientHandle::channel(state.registry.settings().client_buffer);
    let subscription = state.registry.subscribe(client, symbol, interval);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(text) = frame else { break };
                if let Err(e) = sender.send(Message::Text(text.to_string().into())).await {
                    tracing::debug!(subscriber = %subscription.subscriber_id(), error = %e, "Client write failed");
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Client frames carry no commands
                    }
                    Some(Err(e)) => {
                        tracing::debug!(subscriber = %subscription.subscriber_id(), error = %e, "Client read failed");
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!(stream = %subscription.key(), subscriber = %subscription.subscriber_id(), "Stream client left");
    subscription.close();
    let _ = sender.close().await;
}
