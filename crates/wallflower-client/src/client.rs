use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use wallflower_types::events::{GatewayCommand, GatewayEvent};
use wallflower_types::models::{ChatMessage, RelationshipStage, RelationshipStatus};

use crate::error::{ClientError, ClientResult};
use crate::fallback::FallbackApi;

/// Delivery client configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Gateway WebSocket URL (e.g. ws://localhost:3000/gateway).
    pub gateway_url: String,
    /// REST base URL for the fallback path (e.g. http://localhost:3000).
    pub api_url: String,
    /// Base reconnect delay in seconds; doubles per attempt.
    pub reconnect_base_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub reconnect_max_delay_secs: u64,
    /// Attempts before the client parks itself in `GaveUp`.
    pub max_reconnect_attempts: u32,
    /// End-to-end timeout for fallback calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            gateway_url: "ws://localhost:3000/gateway".to_string(),
            api_url: "http://localhost:3000".to_string(),
            reconnect_base_delay_secs: 2,
            reconnect_max_delay_secs: 30,
            max_reconnect_attempts: 10,
            request_timeout_secs: 10,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts exhausted; the client stays here until the caller
    /// tears it down and connects fresh.
    GaveUp,
}

/// Events emitted by the delivery client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected,
    Disconnected(Option<String>),
    /// A gateway event arrived over the push channel.
    Event(GatewayEvent),
    GaveUp,
}

/// Outcome of `send_chat_message`.
#[derive(Debug)]
pub enum SendOutcome {
    /// Delivered over the live push channel; the canonical message will
    /// arrive through the durable store on the next fetch.
    Pushed,
    /// Delivered through the fallback path; carries the canonical stored
    /// message for placeholder reconciliation.
    Stored(ChatMessage),
}

/// Push-channel delivery client with automatic reconnection and a durable
/// request/response fallback.
pub struct DeliveryClient {
    config: DeliveryConfig,
    state: Arc<RwLock<ConnectionState>>,
    sender: Arc<Mutex<Option<mpsc::Sender<Message>>>>,
    event_tx: broadcast::Sender<ClientEvent>,
    fallback: FallbackApi,
    shutdown_tx: watch::Sender<bool>,
    reconnect_attempts: Arc<RwLock<u32>>,
    token: Arc<RwLock<Option<String>>>,
    wall_id: Arc<RwLock<Option<Uuid>>>,
}

impl DeliveryClient {
    pub fn new(config: DeliveryConfig) -> ClientResult<Self> {
        let (event_tx, _) = broadcast::channel(256);
        let (shutdown_tx, _) = watch::channel(false);
        let fallback = FallbackApi::new(
            config.api_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            sender: Arc::new(Mutex::new(None)),
            event_tx,
            fallback,
            shutdown_tx,
            reconnect_attempts: Arc::new(RwLock::new(0)),
            token: Arc::new(RwLock::new(None)),
            wall_id: Arc::new(RwLock::new(None)),
        })
    }

    pub fn with_defaults() -> ClientResult<Self> {
        Self::new(DeliveryConfig::default())
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Connected
    }

    /// The wall this client is (or was last) connected to.
    pub async fn current_wall(&self) -> Option<Uuid> {
        *self.wall_id.read().await
    }

    pub fn fallback(&self) -> &FallbackApi {
        &self.fallback
    }

    /// Run the push channel for (token, wall) until torn down. Reconnects
    /// with exponential backoff on every non-user disconnect; returns
    /// `GaveUp` once the attempt cap is exceeded. Callers normally spawn
    /// this and watch `subscribe()` for lifecycle events.
    pub async fn connect(&self, token: &str, wall_id: Uuid) -> ClientResult<()> {
        {
            let current = *self.state.read().await;
            if current != ConnectionState::Disconnected {
                debug!("already connecting or connected");
                return Ok(());
            }
        }

        *self.token.write().await = Some(token.to_string());
        *self.wall_id.write().await = Some(wall_id);
        *self.reconnect_attempts.write().await = 0;

        // Clear any stale teardown signal, then watch for a fresh one.
        let _ = self.shutdown_tx.send(false);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            *self.state.write().await = ConnectionState::Connecting;

            let user_disconnect = self.run_session(token, wall_id, &mut shutdown_rx).await;
            if user_disconnect {
                *self.state.write().await = ConnectionState::Disconnected;
                return Ok(());
            }

            let attempt = {
                let mut attempts = self.reconnect_attempts.write().await;
                *attempts += 1;
                *attempts
            };

            if attempt > self.config.max_reconnect_attempts {
                warn!("max reconnect attempts reached, giving up");
                *self.state.write().await = ConnectionState::GaveUp;
                let _ = self.event_tx.send(ClientEvent::GaveUp);
                return Err(ClientError::GaveUp);
            }

            let delay = reconnect_delay(&self.config, attempt);
            info!(attempt, delay_secs = delay.as_secs(), "scheduling reconnect");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => {
                    *self.state.write().await = ConnectionState::Disconnected;
                    return Ok(());
                }
            }
        }
    }

    /// One channel session. Returns true when the member tore the client
    /// down (no reconnect wanted).
    async fn run_session(
        &self,
        token: &str,
        wall_id: Uuid,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        let url = format!(
            "{}?token={}&wall_id={}",
            self.config.gateway_url, token, wall_id
        );

        let ws_stream = match connect_async(&url).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!("gateway connect failed: {}", e);
                return false;
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(64);
        *self.sender.lock().await = Some(msg_tx);
        *self.state.write().await = ConnectionState::Connected;
        *self.reconnect_attempts.write().await = 0;
        info!(%wall_id, "push channel connected");
        let _ = self.event_tx.send(ClientEvent::Connected);

        let mut user_disconnect = false;
        loop {
            tokio::select! {
                outgoing = msg_rx.recv() => {
                    let Some(msg) = outgoing else { break };
                    if write.send(msg).await.is_err() {
                        break;
                    }
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<GatewayEvent>(&text) {
                                Ok(event) => {
                                    let _ = self.event_tx.send(ClientEvent::Event(event));
                                }
                                Err(e) => warn!("unparseable gateway event: {}", e),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if write.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("push channel closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("push channel error: {}", e);
                            break;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        user_disconnect = true;
                        break;
                    }
                }
            }
        }

        *self.sender.lock().await = None;
        *self.state.write().await = ConnectionState::Disconnected;
        let _ = self.event_tx.send(ClientEvent::Disconnected(None));
        user_disconnect
    }

    /// Tear the client down. Cancels any in-flight reconnect sleep; no
    /// further reconnects happen until `connect` is called again.
    pub async fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
        *self.token.write().await = None;
        *self.wall_id.write().await = None;
        info!("delivery client torn down");
    }

    /// Send a chat message: push channel first, durable fallback second.
    /// The fallback performs the same persistence as the push path and
    /// returns the canonical stored message for placeholder reconciliation.
    pub async fn send_chat_message(
        &self,
        conversation_id: Uuid,
        body: &str,
    ) -> ClientResult<SendOutcome> {
        if self.is_connected().await {
            let cmd = GatewayCommand::SendChatMessage {
                conversation_id,
                body: body.to_string(),
            };
            match self.push_command(cmd).await {
                Ok(()) => return Ok(SendOutcome::Pushed),
                Err(e) => debug!("push send failed, using fallback: {}", e),
            }
        }

        let token = self
            .token
            .read()
            .await
            .clone()
            .ok_or(ClientError::TransportUnavailable)?;
        let message = self
            .fallback
            .send_message(&token, conversation_id, body)
            .await?;
        Ok(SendOutcome::Stored(message))
    }

    /// Typing signals are best-effort: dropped silently when the channel is
    /// down, never routed through the fallback.
    pub async fn typing(&self, conversation_id: Uuid) {
        let _ = self
            .push_command(GatewayCommand::Typing { conversation_id })
            .await;
    }

    /// Serialize a command onto the push channel.
    pub async fn push_command(&self, cmd: GatewayCommand) -> ClientResult<()> {
        let sender = self.sender.lock().await;
        let sender = sender.as_ref().ok_or(ClientError::TransportUnavailable)?;

        let json = serde_json::to_string(&cmd)?;
        sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| ClientError::TransportUnavailable)
    }

    // Fallback mirrors for the remaining operations; these are durable
    // request/response calls whether or not the channel is up.

    pub async fn fetch_messages(
        &self,
        conversation_id: Uuid,
        limit: u32,
        after: Option<i64>,
    ) -> ClientResult<Vec<ChatMessage>> {
        let token = self.require_token().await?;
        self.fallback
            .fetch_messages(&token, conversation_id, limit, after)
            .await
    }

    pub async fn update_status(
        &self,
        conversation_id: Uuid,
        stage: RelationshipStage,
    ) -> ClientResult<RelationshipStatus> {
        let token = self.require_token().await?;
        self.fallback
            .update_status(&token, conversation_id, stage)
            .await
    }

    async fn require_token(&self) -> ClientResult<String> {
        self.token
            .read()
            .await
            .clone()
            .ok_or(ClientError::TransportUnavailable)
    }
}

/// Exponential backoff: base * 2^(attempt-1), capped at the configured
/// maximum delay.
pub fn reconnect_delay(config: &DeliveryConfig, attempt: u32) -> Duration {
    let exp = config
        .reconnect_base_delay_secs
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    Duration::from_secs(exp.min(config.reconnect_max_delay_secs))
}

/// Replace an optimistically displayed placeholder with the canonical
/// stored message. Never duplicates: if the canonical message already
/// arrived over the push channel, the placeholder is simply dropped.
pub fn reconcile(messages: &mut Vec<ChatMessage>, placeholder_id: Uuid, stored: ChatMessage) {
    if messages.iter().any(|m| m.id == stored.id) {
        messages.retain(|m| m.id != placeholder_id);
        return;
    }

    match messages.iter_mut().find(|m| m.id == placeholder_id) {
        Some(slot) => *slot = stored,
        None => messages.push(stored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(id: Uuid, body: &str) -> ChatMessage {
        ChatMessage {
            id,
            conversation_id: Uuid::new_v4(),
            sender_id: Some(Uuid::new_v4()),
            body: body.to_string(),
            is_system: false,
            created_at: Utc::now(),
            seq: 1,
        }
    }

    #[test]
    fn config_defaults() {
        let config = DeliveryConfig::default();
        assert_eq!(config.reconnect_base_delay_secs, 2);
        assert_eq!(config.reconnect_max_delay_secs, 30);
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn backoff_doubles_from_base_and_caps() {
        let config = DeliveryConfig::default();
        let delays: Vec<u64> = (1..=6)
            .map(|attempt| reconnect_delay(&config, attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn backoff_never_overflows() {
        let config = DeliveryConfig::default();
        assert_eq!(reconnect_delay(&config, u32::MAX).as_secs(), 30);
    }

    #[tokio::test]
    async fn initial_state_is_disconnected() {
        let client = DeliveryClient::with_defaults().unwrap();
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn push_command_without_channel_is_transport_unavailable() {
        let client = DeliveryClient::with_defaults().unwrap();
        let err = client
            .push_command(GatewayCommand::Typing {
                conversation_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::TransportUnavailable));
    }

    #[tokio::test]
    async fn disconnect_when_not_connected_does_not_panic() {
        let client = DeliveryClient::with_defaults().unwrap();
        client.disconnect().await;
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn subscribe_returns_a_receiver() {
        let client = DeliveryClient::with_defaults().unwrap();
        let _receiver = client.subscribe();
    }

    #[test]
    fn reconcile_replaces_the_placeholder_in_place() {
        let placeholder_id = Uuid::new_v4();
        let mut messages = vec![message(placeholder_id, "sending...")];

        let stored = message(Uuid::new_v4(), "sent");
        reconcile(&mut messages, placeholder_id, stored.clone());

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, stored.id);
        assert_eq!(messages[0].body, "sent");
    }

    #[test]
    fn reconcile_never_duplicates_an_already_delivered_message() {
        let placeholder_id = Uuid::new_v4();
        let stored = message(Uuid::new_v4(), "sent");
        // The push channel already delivered the canonical message.
        let mut messages = vec![message(placeholder_id, "sending..."), stored.clone()];

        reconcile(&mut messages, placeholder_id, stored.clone());

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, stored.id);
    }

    #[test]
    fn reconcile_appends_when_no_placeholder_exists() {
        let mut messages = Vec::new();
        let stored = message(Uuid::new_v4(), "sent");
        reconcile(&mut messages, Uuid::new_v4(), stored.clone());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, stored.id);
    }
}
