use axum::extract::ws::{Message, WebSocket};
use common::PointerInput;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::engine::EngineHandle;
use crate::gesture::{PointerRouter, Routed};

pub async fn handle_socket(socket: WebSocket, engine: EngineHandle) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Messages for the client
    let (tx, mut rx) = mpsc::channel::<String>(256);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // The router lives in this task; when the task ends it is dropped and
    // any gesture still in progress is released.
    let mut recv_task = tokio::spawn(async move {
        let mut router = PointerRouter::new(engine.clone());
        while let Some(Ok(msg)) = ws_receiver.next().await {
            if let Message::Text(text) = msg {
                handle_client_message(&text, &mut router, &engine, &tx).await;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn handle_client_message(
    text: &str,
    router: &mut PointerRouter,
    engine: &EngineHandle,
    sender: &mpsc::Sender<String>,
) {
    let input: PointerInput = match serde_json::from_str(text) {
        Ok(input) => input,
        Err(e) => {
            tracing::debug!("Ignoring WebSocket message: {}", e);
            return;
        }
    };

    if router.route(&input) != Routed::Ended {
        return;
    }

    match engine.state().await {
        Ok(state) => {
            let msg = serde_json::json!({ "type": "state", "state": state });
            let _ = sender.send(msg.to_string()).await;
        }
        Err(e) => tracing::warn!("Canvas closed while streaming: {}", e),
    }
}
