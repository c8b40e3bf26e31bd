//! JSON-RPC client for Substrate-style nodes over WebSocket.
//!
//! One background task owns the socket. Requests are multiplexed by id;
//! `chain_newHead` notifications are queued to a per-subscription forwarder
//! that feeds the bounded header channel, so the socket task never waits on
//! a slow consumer and responses are read as they arrive. When the socket
//! fails, pending requests fail and every subscription receives a final
//! `ConnectionFailure`.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use headerproof_merkle_tree::Hash;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChainClient, HeaderEvent, HeaderStream, HEADER_CHANNEL_CAPACITY};
use crate::{wire::parse_hash, Error};

const SUBSCRIBE_NEW_HEADS: &str = "chain_subscribeNewHeads";
const GET_BLOCK_HASH: &str = "chain_getBlockHash";

type Responder = oneshot::Sender<Result<Value, Error>>;
type HeaderSender = mpsc::Sender<Result<HeaderEvent, Error>>;
type HeaderQueue = mpsc::UnboundedSender<Result<HeaderEvent, Error>>;

struct Command {
    method: &'static str,
    params: Value,
    respond: Responder,
    /// Set for subscription requests.
    headers: Option<HeaderSender>,
}

/// A connected Substrate JSON-RPC client.
///
/// Dropping the client closes the socket.
pub struct SubstrateClient {
    url: String,
    commands: mpsc::Sender<Command>,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

impl SubstrateClient {
    /// Open a WebSocket connection to `url`.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, Error> {
        let (socket, _response) = timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| Error::ConnectionFailure(format!("connecting to {} timed out", url)))?
            .map_err(|e| Error::ConnectionFailure(format!("connecting to {} failed: {}", url, e)))?;
        info!(url, "connected to node");
        Ok(Self::from_socket(socket, url, request_timeout))
    }

    /// Drive an already established WebSocket.
    pub fn from_socket<S>(socket: WebSocketStream<S>, url: &str, request_timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (commands, command_rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();
        tokio::spawn(run_connection(
            socket,
            command_rx,
            shutdown.clone(),
            url.to_string(),
        ));
        Self {
            url: url.to_string(),
            commands,
            request_timeout,
            shutdown,
        }
    }

    async fn request(
        &self,
        method: &'static str,
        params: Value,
        headers: Option<HeaderSender>,
    ) -> Result<Value, Error> {
        let (respond, response) = oneshot::channel();
        self.commands
            .send(Command {
                method,
                params,
                respond,
                headers,
            })
            .await
            .map_err(|_| self.closed())?;
        timeout(self.request_timeout, response)
            .await
            .map_err(|_| {
                Error::ConnectionFailure(format!("{} to {} timed out", method, self.url))
            })?
            .map_err(|_| self.closed())?
    }

    fn closed(&self) -> Error {
        Error::ConnectionFailure(format!("connection to {} is closed", self.url))
    }
}

impl Drop for SubstrateClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl ChainClient for SubstrateClient {
    async fn subscribe_headers(&self) -> Result<HeaderStream, Error> {
        let (headers, stream) = mpsc::channel(HEADER_CHANNEL_CAPACITY);
        let subscription = self
            .request(SUBSCRIBE_NEW_HEADS, json!([]), Some(headers))
            .await?;
        info!(url = %self.url, %subscription, "subscribed to new heads");
        Ok(stream)
    }

    async fn canonical_hash(&self, number: u64) -> Result<Hash, Error> {
        match self.request(GET_BLOCK_HASH, json!([number]), None).await? {
            Value::String(hash) => parse_hash(&hash).map_err(|e| {
                Error::Protocol(format!("{} returned a bad hash: {}", GET_BLOCK_HASH, e))
            }),
            Value::Null => Err(Error::HashResolutionFailure {
                number,
                reason: "node has no block at this height".into(),
            }),
            other => Err(Error::Protocol(format!(
                "unexpected {} result: {}",
                GET_BLOCK_HASH, other
            ))),
        }
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

// ── Wire messages ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Incoming {
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    error: Option<RpcError>,
    params: Option<Notification>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Notification {
    subscription: Value,
    result: Value,
}

fn subscription_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Turn a `chain_newHead` header object into a [`HeaderEvent`].
///
/// `number` may be a hex string (`"0x1b4"`) or a JSON integer. The whole
/// header object is kept as the raw payload.
pub fn parse_header_event(header: &Value) -> Result<HeaderEvent, Error> {
    let number = match header.get("number") {
        Some(Value::String(s)) => {
            let digits = s.strip_prefix("0x").unwrap_or(s);
            u64::from_str_radix(digits, 16)
                .map_err(|e| Error::Protocol(format!("bad header number {:?}: {}", s, e)))?
        }
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| Error::Protocol(format!("bad header number {}", n)))?,
        _ => return Err(Error::Protocol("header has no number".into())),
    };
    let reported_hash = header
        .get("hash")
        .and_then(Value::as_str)
        .and_then(|h| parse_hash(h).ok());
    let raw_header = serde_json::to_vec(header)
        .map_err(|e| Error::Protocol(format!("cannot re-encode header: {}", e)))?;
    Ok(HeaderEvent {
        number,
        reported_hash,
        raw_header,
    })
}

// ── Connection task ─────────────────────────────────────────────────────

#[derive(Default)]
struct ConnectionState {
    next_id: u64,
    pending: HashMap<u64, Responder>,
    pending_subscriptions: HashMap<u64, HeaderSender>,
    subscriptions: HashMap<String, HeaderQueue>,
}

/// Move queued events into the consumer's bounded channel.
fn spawn_forwarder(headers: HeaderSender) -> HeaderQueue {
    let (queue, mut queued) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = queued.recv().await {
            if headers.send(event).await.is_err() {
                debug!("header receiver dropped");
                break;
            }
        }
    });
    queue
}

impl ConnectionState {
    fn handle_text(&mut self, text: &str) {
        let message: Incoming = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "ignoring unparseable message from node");
                return;
            }
        };

        if let Some(id) = message.id {
            let outcome = match message.error {
                Some(err) => Err(Error::Protocol(format!(
                    "rpc error {}: {}",
                    err.code, err.message
                ))),
                None => Ok(message.result.unwrap_or(Value::Null)),
            };
            if let Some(headers) = self.pending_subscriptions.remove(&id) {
                if let Ok(subscription) = &outcome {
                    self.subscriptions
                        .insert(subscription_key(subscription), spawn_forwarder(headers));
                }
            }
            match self.pending.remove(&id) {
                Some(respond) => {
                    let _ = respond.send(outcome);
                }
                None => debug!(id, "response for unknown request"),
            }
            return;
        }

        let Some(notification) = message.params else {
            debug!("ignoring message without id or params");
            return;
        };
        let key = subscription_key(&notification.subscription);
        let Some(headers) = self.subscriptions.get(&key) else {
            debug!(subscription = %key, "notification for unknown subscription");
            return;
        };
        let event = parse_header_event(&notification.result);
        if headers.send(event).is_err() {
            debug!(subscription = %key, "header receiver dropped");
            self.subscriptions.remove(&key);
        }
    }

    fn fail_all(&mut self, reason: &str) {
        for (_, respond) in self.pending.drain() {
            let _ = respond.send(Err(Error::ConnectionFailure(reason.to_string())));
        }
        self.pending_subscriptions.clear();
        for (_, headers) in self.subscriptions.drain() {
            let _ = headers.send(Err(Error::ConnectionFailure(reason.to_string())));
        }
    }
}

async fn run_connection<S>(
    socket: WebSocketStream<S>,
    mut commands: mpsc::Receiver<Command>,
    shutdown: CancellationToken,
    url: String,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = socket.split();
    let mut state = ConnectionState::default();

    let failure = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break None,
            command = commands.recv() => {
                let Some(command) = command else { break None };
                let id = state.next_id;
                state.next_id += 1;
                let text = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "method": command.method,
                    "params": command.params,
                })
                .to_string();
                debug!(id, method = command.method, "sending request");
                if let Err(e) = sink.send(Message::Text(text)).await {
                    let reason = format!("sending to {} failed: {}", url, e);
                    let _ = command
                        .respond
                        .send(Err(Error::ConnectionFailure(reason.clone())));
                    break Some(reason);
                }
                state.pending.insert(id, command.respond);
                if let Some(headers) = command.headers {
                    state.pending_subscriptions.insert(id, headers);
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => state.handle_text(&text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => state.handle_text(&text),
                    Err(_) => warn!("ignoring non-UTF-8 binary message from node"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break Some(format!("{} closed the connection: {:?}", url, frame));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(format!("connection to {} failed: {}", url, e)),
                None => break Some(format!("connection to {} closed", url)),
            },
        }
    };

    match failure {
        Some(reason) => {
            warn!(%reason, "node connection lost");
            state.fail_all(&reason);
        }
        None => {
            debug!(url = %url, "closing node connection");
            let _ = sink.close().await;
        }
    }
}
