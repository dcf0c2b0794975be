pub mod clock;
pub mod error;
pub mod util;

use std::future::Future;
use std::pin::Pin;

pub use clock::{Clock, MockClock, SystemClock};
pub use error::BrokerError;
pub use util::resolve_path;

/// Boxed future returned by the object-safe broker trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ════════════════════════════════════════════════════════════════
//  Delivery
// ════════════════════════════════════════════════════════════════

/// Opaque token the broker needs to mark a delivery as consumed.
///
/// The pipeline never looks inside; it only hands it back to [`Broker::ack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckHandle {
    /// Ack identifier (STOMP 1.2 `ack` header, falls back to `message-id`).
    pub id: String,
    /// Message identifier as assigned by the broker.
    pub message_id: String,
    /// Subscription the message was delivered on.
    pub subscription: String,
}

impl AckHandle {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            message_id: id.clone(),
            subscription: String::new(),
            id,
        }
    }
}

/// A single message pulled from the broker.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Raw message body.
    pub payload: Vec<u8>,
    /// Header name/value pairs in wire order. Names keep their original case.
    pub headers: Vec<(String, String)>,
    pub ack: AckHandle,
}

impl Delivery {
    /// First header value whose name matches `name` case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// ════════════════════════════════════════════════════════════════
//  Broker
// ════════════════════════════════════════════════════════════════

/// Connection to a topic-based message broker.
///
/// One instance serves one session at a time: `connect` → `subscribe` →
/// `recv`/`ack` loop → `unsubscribe` → `disconnect`. After `disconnect` the
/// same instance may be connected again by the supervising loop.
pub trait Broker: Send {
    /// Open a connection to `address` (e.g. `localhost:61613`).
    fn connect<'a>(&'a mut self, address: &'a str) -> BoxFuture<'a, Result<(), BrokerError>>;

    /// Subscribe to the consumer destination derived from `topic`.
    fn subscribe<'a>(&'a mut self, topic: &'a str) -> BoxFuture<'a, Result<(), BrokerError>>;

    /// Wait for the next delivery.
    ///
    /// - `Ok(Some(_))`: a message
    /// - `Ok(None)`: the broker ended the stream
    /// - `Err(_)`: message-level error reported by the broker
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<Delivery>, BrokerError>>;

    /// Mark a delivery as consumed.
    fn ack<'a>(&'a mut self, handle: &'a AckHandle) -> BoxFuture<'a, Result<(), BrokerError>>;

    fn unsubscribe(&mut self) -> BoxFuture<'_, Result<(), BrokerError>>;

    fn disconnect(&mut self) -> BoxFuture<'_, Result<(), BrokerError>>;
}
