//! Member-side delivery client: a push channel with automatic
//! reconnection, and a durable request/response fallback for when the
//! channel is down.

mod client;
mod error;
mod fallback;

pub use client::{
    ClientEvent, ConnectionState, DeliveryClient, DeliveryConfig, SendOutcome, reconcile,
    reconnect_delay,
};
pub use error::{ClientError, ClientResult};
pub use fallback::FallbackApi;
