/// Errors surfaced by a [`Broker`](crate::Broker) implementation.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("connect ({address}): {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("not connected")]
    NotConnected,

    #[error("not subscribed")]
    NotSubscribed,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol: {0}")]
    Protocol(String),

    /// ERROR frame (or equivalent) sent by the broker itself.
    #[error("broker error: {message}")]
    Server { message: String, detail: String },
}

impl BrokerError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        BrokerError::Protocol(msg.into())
    }
}
