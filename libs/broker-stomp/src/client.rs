use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use archiver_api::{AckHandle, BoxFuture, Broker, BrokerError, Delivery};

use crate::config::StompConfig;
use crate::frame::Frame;

const READ_CHUNK: usize = 8192;

struct Connection {
    stream: TcpStream,
    buf: Vec<u8>,
    /// Prefix of `buf` already known not to hold a complete frame.
    scanned: usize,
}

impl Connection {
    async fn send(&mut self, frame: &Frame) -> Result<(), BrokerError> {
        let mut out = Vec::with_capacity(256 + frame.body.len());
        frame.encode(&mut out);
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Next frame, or `None` once the peer closed the socket.
    ///
    /// Partial frames stay in `buf`, so dropping this future between reads
    /// loses nothing. Every frame ends in NUL, so decoding is only retried
    /// once a NUL arrives past `scanned`.
    async fn read_frame(&mut self) -> Result<Option<Frame>, BrokerError> {
        let mut tmp = [0u8; READ_CHUNK];
        loop {
            if self.buf[self.scanned..].contains(&0) {
                if let Some((frame, consumed)) = Frame::decode(&self.buf)? {
                    self.buf.drain(..consumed);
                    self.scanned = 0;
                    return Ok(Some(frame));
                }
            }
            self.scanned = self.buf.len();

            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                if self.buf.iter().any(|b| !b.is_ascii_whitespace()) {
                    tracing::warn!(pending = self.buf.len(), "connection closed mid-frame");
                }
                self.buf.clear();
                self.scanned = 0;
                return Ok(None);
            }
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }
}

/// STOMP 1.2 client (1.0/1.1 servers accepted) consuming one virtual-topic
/// queue with `client-individual` acknowledgement.
pub struct StompBroker {
    config: StompConfig,
    conn: Option<Connection>,
    subscription: Option<String>,
    next_id: u64,
}

impl std::fmt::Debug for StompBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StompBroker")
            .field("queue", &self.config.queue)
            .field("connected", &self.conn.is_some())
            .field("subscription", &self.subscription)
            .finish()
    }
}

impl StompBroker {
    pub fn new(config: StompConfig) -> Self {
        Self {
            config,
            conn: None,
            subscription: None,
            next_id: 0,
        }
    }

    fn conn(&mut self) -> Result<&mut Connection, BrokerError> {
        self.conn.as_mut().ok_or(BrokerError::NotConnected)
    }

    async fn do_connect(&mut self, address: &str) -> Result<(), BrokerError> {
        if self.conn.is_some() {
            return Err(BrokerError::protocol("already connected"));
        }
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| BrokerError::Connect {
                address: address.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(address, error = %e, "could not set TCP_NODELAY");
        }
        let mut conn = Connection {
            stream,
            buf: Vec::with_capacity(READ_CHUNK),
            scanned: 0,
        };

        let mut frame = Frame::new("CONNECT")
            .header("accept-version", "1.0,1.1,1.2")
            .header("host", self.config.vhost_for(address))
            .header("heart-beat", "0,0");
        if let (Some(login), Some(passcode)) = (&self.config.login, &self.config.passcode) {
            frame = frame.header("login", login).header("passcode", passcode);
        }
        conn.send(&frame).await?;

        let reply = conn
            .read_frame()
            .await?
            .ok_or_else(|| BrokerError::protocol("connection closed before CONNECTED"))?;
        match reply.command.as_str() {
            "CONNECTED" => {
                tracing::info!(
                    address,
                    version = reply.get("version").unwrap_or("1.0"),
                    server = reply.get("server").unwrap_or("unknown"),
                    "stomp session established"
                );
                self.conn = Some(conn);
                Ok(())
            }
            "ERROR" => Err(server_error(&reply)),
            other => Err(BrokerError::protocol(format!("expected CONNECTED, got {other}"))),
        }
    }

    async fn do_subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        if self.subscription.is_some() {
            return Err(BrokerError::protocol("already subscribed"));
        }
        self.next_id += 1;
        let id = format!("sub-{}", self.next_id);
        let destination = self.config.destination(topic);
        let frame = Frame::new("SUBSCRIBE")
            .header("id", id.as_str())
            .header("destination", destination.as_str())
            .header("ack", "client-individual");
        self.conn()?.send(&frame).await?;
        tracing::info!(%destination, subscription = %id, "subscribed");
        self.subscription = Some(id);
        Ok(())
    }

    async fn do_recv(&mut self) -> Result<Option<Delivery>, BrokerError> {
        if self.subscription.is_none() {
            return Err(BrokerError::NotSubscribed);
        }
        let conn = self.conn()?;
        loop {
            let Some(frame) = conn.read_frame().await? else {
                return Ok(None);
            };
            match frame.command.as_str() {
                "MESSAGE" => return Ok(Some(delivery(frame))),
                "ERROR" => return Err(server_error(&frame)),
                "RECEIPT" => continue,
                other => {
                    tracing::debug!(command = other, "ignoring unexpected frame");
                }
            }
        }
    }

    async fn do_ack(&mut self, handle: &AckHandle) -> Result<(), BrokerError> {
        let mut frame = Frame::new("ACK")
            .header("id", handle.id.as_str())
            .header("message-id", handle.message_id.as_str());
        if !handle.subscription.is_empty() {
            frame = frame.header("subscription", handle.subscription.as_str());
        }
        self.conn()?.send(&frame).await
    }

    async fn do_unsubscribe(&mut self) -> Result<(), BrokerError> {
        let Some(id) = self.subscription.take() else {
            return Ok(());
        };
        let Some(conn) = self.conn.as_mut() else {
            return Ok(());
        };
        conn.send(&Frame::new("UNSUBSCRIBE").header("id", id)).await
    }

    async fn do_disconnect(&mut self) -> Result<(), BrokerError> {
        self.subscription = None;
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let sent = conn.send(&Frame::new("DISCONNECT")).await;
        let closed = conn.stream.shutdown().await;
        sent?;
        closed?;
        Ok(())
    }
}

fn delivery(frame: Frame) -> Delivery {
    let message_id = frame.get("message-id").unwrap_or_default().to_string();
    let id = frame
        .get("ack")
        .map(str::to_string)
        .unwrap_or_else(|| message_id.clone());
    let subscription = frame.get("subscription").unwrap_or_default().to_string();
    Delivery {
        payload: frame.body,
        headers: frame.headers,
        ack: AckHandle {
            id,
            message_id,
            subscription,
        },
    }
}

fn server_error(frame: &Frame) -> BrokerError {
    BrokerError::Server {
        message: frame.get("message").unwrap_or("unspecified").to_string(),
        detail: String::from_utf8_lossy(&frame.body).into_owned(),
    }
}

impl Broker for StompBroker {
    fn connect<'a>(&'a mut self, address: &'a str) -> BoxFuture<'a, Result<(), BrokerError>> {
        Box::pin(self.do_connect(address))
    }

    fn subscribe<'a>(&'a mut self, topic: &'a str) -> BoxFuture<'a, Result<(), BrokerError>> {
        Box::pin(self.do_subscribe(topic))
    }

    fn recv(&mut self) -> BoxFuture<'_, Result<Option<Delivery>, BrokerError>> {
        Box::pin(self.do_recv())
    }

    fn ack<'a>(&'a mut self, handle: &'a AckHandle) -> BoxFuture<'a, Result<(), BrokerError>> {
        Box::pin(self.do_ack(handle))
    }

    fn unsubscribe(&mut self) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(self.do_unsubscribe())
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(self.do_disconnect())
    }
}
