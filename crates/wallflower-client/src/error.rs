use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The push channel is not connected or refused the send. Triggers the
    /// request/response fallback; not surfaced to the member unless the
    /// fallback fails too.
    #[error("push channel unavailable")]
    TransportUnavailable,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("reconnect attempts exhausted")]
    GaveUp,
}
