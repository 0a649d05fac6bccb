use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use accord_types::events::{GatewayCommand, GatewayEvent};

use crate::log::ChatLog;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection. The JWT was already
/// validated at the HTTP upgrade layer, so the first frame is Ready.
///
/// Each Subscribe command gets its own forwarder task pumping message-list
/// snapshots into the per-connection channel; Unsubscribe (or disconnect)
/// aborts the forwarder, which releases the underlying subscription.
pub async fn handle_connection(socket: WebSocket, chat: ChatLog, phone: String) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} connected to gateway", phone);

    let ready = GatewayEvent::Ready {
        phone: phone.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<GatewayEvent>();
    let forwarders: Arc<Mutex<HashMap<Uuid, tokio::task::AbortHandle>>> =
        Arc::new(Mutex::new(HashMap::new()));

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward subscription snapshots -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let chat_recv = chat.clone();
    let forwarders_recv = forwarders.clone();
    let phone_recv = phone.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&chat_recv, &event_tx, &forwarders_recv, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            phone_recv,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    for (_, handle) in forwarders
        .lock()
        .expect("forwarder lock poisoned")
        .drain()
    {
        handle.abort();
    }

    info!("{} disconnected from gateway", phone);
}

async fn handle_command(
    chat: &ChatLog,
    event_tx: &mpsc::UnboundedSender<GatewayEvent>,
    forwarders: &Arc<Mutex<HashMap<Uuid, tokio::task::AbortHandle>>>,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::Subscribe { request_id } => {
            if forwarders
                .lock()
                .expect("forwarder lock poisoned")
                .contains_key(&request_id)
            {
                return;
            }

            // Subscribe before the initial snapshot so an append racing the
            // snapshot is never missed (a duplicate full list is harmless).
            let mut sub = chat.subscribe(request_id).await;

            match chat.list(request_id).await {
                Ok(messages) => {
                    let _ = event_tx.send(GatewayEvent::MessageList {
                        request_id,
                        messages,
                    });
                }
                Err(e) => {
                    warn!("failed to load messages for {}: {}", request_id, e);
                }
            }

            let tx = event_tx.clone();
            let task = tokio::spawn(async move {
                while let Some(messages) = sub.next().await {
                    if tx
                        .send(GatewayEvent::MessageList {
                            request_id,
                            messages,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            });

            forwarders
                .lock()
                .expect("forwarder lock poisoned")
                .insert(request_id, task.abort_handle());
        }
        GatewayCommand::Unsubscribe { request_id } => {
            if let Some(handle) = forwarders
                .lock()
                .expect("forwarder lock poisoned")
                .remove(&request_id)
            {
                handle.abort();
            }
        }
    }
}
