use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use wallflower_match::Sender;
use wallflower_types::events::{GatewayCommand, GatewayEvent};

use crate::registry::Registry;
use crate::router::EventRouter;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection. The token was already
/// validated at the HTTP upgrade layer, so the connection goes straight to
/// registration + Ready + event loop.
pub async fn handle_connection(
    socket: WebSocket,
    registry: Registry,
    router: EventRouter,
    member_id: Uuid,
    wall_id: Uuid,
) {
    let (mut sender, mut receiver) = socket.split();

    info!(%member_id, %wall_id, "connected to gateway");

    let (conn_id, mut event_rx) = registry.register(member_id, wall_id).await;

    let ready = GatewayEvent::Ready { member_id, wall_id };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        registry.deregister(member_id, wall_id, conn_id).await;
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward registry events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = event_rx.recv() => {
                    let Some(event) = result else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode event: {}", e);
                            continue;
                        }
                    };
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
                            warn!("heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
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
    let router_recv = router.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&router_recv, member_id, cmd).await,
                    Err(e) => {
                        warn!(
                            %member_id,
                            "bad command: {} -- raw: {}",
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

    registry.deregister(member_id, wall_id, conn_id).await;
    info!(%member_id, %wall_id, "disconnected from gateway");
}

async fn handle_command(router: &EventRouter, member_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::SendChatMessage {
            conversation_id,
            body,
        } => {
            // Errors never tear down the connection; the client retries
            // through the fallback path.
            if let Err(e) = router
                .send_chat(conversation_id, Sender::Member(member_id), body)
                .await
            {
                warn!(%member_id, %conversation_id, "chat message rejected: {}", e);
            }
        }

        GatewayCommand::Typing { conversation_id } => {
            router.typing(conversation_id, member_id).await;
        }
    }
}
