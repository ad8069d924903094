use std::{
    collections::{HashMap, HashSet},
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};

use bytes::BytesMut;
use serde_json::Value;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{mpsc, oneshot, Mutex},
};
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;

use crate::codec::DapCodec;
use crate::messages::Message;

#[derive(Debug, Clone)]
pub struct DapClientConfig {
    /// Default deadline applied by [`DapClient::request`].
    pub request_timeout: Duration,
    pub read_buffer_bytes: usize,
}

impl Default for DapClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            read_buffer_bytes: 8 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The adapter answered with `success: false`.
    #[error("request failed: {0}")]
    Failed(String),
    #[error("request timed out")]
    Timeout,
    #[error("disconnected")]
    Disconnected,
}

/// Out-of-band traffic from the adapter, delivered in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Event(crate::messages::Event),
    /// A recoverable protocol anomaly: an unmatched response, a reverse
    /// request, or a dropped malformed frame. Reported, never fatal.
    ProtocolError(String),
    /// The transport closed; all outstanding requests have already been
    /// failed with [`RequestError::Disconnected`].
    Closed,
}

type ReplyResult = Result<Option<Value>, RequestError>;

/// Expired seqs further than this behind the counter are forgotten; a
/// response that late is reported as unknown instead of swallowed.
const EXPIRED_SEQ_WINDOW: i64 = 1024;

#[derive(Debug)]
struct Inner {
    out: mpsc::UnboundedSender<Message>,
    pending: Mutex<HashMap<i64, oneshot::Sender<ReplyResult>>>,
    /// Seqs whose deadline fired before the response arrived. A late response
    /// for one of these is a no-op rather than an unknown-seq protocol error.
    expired: Mutex<HashSet<i64>>,
    next_seq: AtomicI64,
    shutdown: CancellationToken,
    config: DapClientConfig,
}

/// Async DAP client: allocates sequence numbers, correlates responses to
/// outstanding requests and forwards adapter events.
///
/// At most one outstanding entry exists per seq; every request with a live
/// waiter is resolved exactly once, by a matching response, a timeout, or a
/// shutdown that fails everything with [`RequestError::Disconnected`].
#[derive(Clone)]
pub struct DapClient {
    inner: Arc<Inner>,
}

/// An in-flight request. Resolves when the matching response arrives or the
/// client shuts down.
#[derive(Debug)]
pub struct PendingReply {
    seq: i64,
    rx: oneshot::Receiver<ReplyResult>,
}

impl PendingReply {
    pub fn seq(&self) -> i64 {
        self.seq
    }
}

impl Future for PendingReply {
    type Output = ReplyResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_closed)) => Poll::Ready(Err(RequestError::Disconnected)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl DapClient {
    /// Wire the client to a connected byte stream pair. The second return
    /// value carries adapter events and protocol notices in arrival order.
    pub fn connect<R, W>(reader: R, writer: W) -> (Self, mpsc::UnboundedReceiver<ClientEvent>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::connect_with_config(reader, writer, DapClientConfig::default())
    }

    pub fn connect_with_config<R, W>(
        reader: R,
        writer: W,
        config: DapClientConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            out: out_tx,
            pending: Mutex::new(HashMap::new()),
            expired: Mutex::new(HashSet::new()),
            next_seq: AtomicI64::new(0),
            shutdown: CancellationToken::new(),
            config,
        });

        tokio::spawn(write_loop(writer, out_rx, inner.shutdown.clone()));
        tokio::spawn(read_loop(reader, inner.clone(), event_tx));

        (Self { inner }, event_rx)
    }

    /// A token cancelled when the client shuts down, explicitly or because the
    /// transport closed.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Allocate a seq, register the outstanding entry and queue the encoded
    /// request. The returned handle resolves when the response arrives.
    pub async fn begin_request(
        &self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<PendingReply, RequestError> {
        if self.is_closed() {
            return Err(RequestError::Disconnected);
        }
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock().await;
            pending.insert(seq, tx);
        }
        if self.inner.out.send(Message::request(seq, command, arguments)).is_err() {
            self.inner.pending.lock().await.remove(&seq);
            return Err(RequestError::Disconnected);
        }
        Ok(PendingReply { seq, rx })
    }

    /// Round-trip a request with the client's default timeout.
    pub async fn request(&self, command: &str, arguments: Option<Value>) -> ReplyResult {
        self.request_with_timeout(command, arguments, Some(self.inner.config.request_timeout))
            .await
    }

    /// Round-trip a request. `None` waits until a response or disconnect.
    pub async fn request_with_timeout(
        &self,
        command: &str,
        arguments: Option<Value>,
        timeout: Option<Duration>,
    ) -> ReplyResult {
        let reply = self.begin_request(command, arguments).await?;
        let seq = reply.seq();
        match timeout {
            None => reply.await,
            Some(limit) => match tokio::time::timeout(limit, reply).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    self.expire(seq).await;
                    Err(RequestError::Timeout)
                }
            },
        }
    }

    /// Fire-and-forget send. The request still occupies a seq and its table
    /// entry is still cleared when the response arrives.
    pub async fn send_only(
        &self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<i64, RequestError> {
        let reply = self.begin_request(command, arguments).await?;
        Ok(reply.seq())
    }

    /// Fail every outstanding request with `disconnected`, then stop the IO
    /// tasks. Waiters observe their failure before the table is cleared.
    pub async fn shutdown(&self) {
        let pending = {
            let mut pending = self.inner.pending.lock().await;
            std::mem::take(&mut *pending)
        };
        for (_seq, tx) in pending {
            let _ = tx.send(Err(RequestError::Disconnected));
        }
        self.inner.shutdown.cancel();
    }

    async fn expire(&self, seq: i64) {
        let removed = self.inner.pending.lock().await.remove(&seq);
        if removed.is_some() {
            let mut expired = self.inner.expired.lock().await;
            let horizon = self.inner.next_seq.load(Ordering::Relaxed) - EXPIRED_SEQ_WINDOW;
            expired.retain(|&expired_seq| expired_seq >= horizon);
            expired.insert(seq);
        }
    }

    #[cfg(test)]
    async fn outstanding(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    #[cfg(test)]
    async fn expired_len(&self) -> usize {
        self.inner.expired.lock().await.len()
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut out: mpsc::UnboundedReceiver<Message>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    let mut codec = DapCodec::new();
    let mut buf = BytesMut::new();
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = out.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        buf.clear();
        if let Err(err) = codec.encode(&message, &mut buf) {
            tracing::warn!(error = %err, "failed to encode outgoing DAP message");
            continue;
        }
        if writer.write_all(&buf).await.is_err() || writer.flush().await.is_err() {
            break;
        }
    }
    shutdown.cancel();
}

async fn read_loop<R>(
    mut reader: R,
    inner: Arc<Inner>,
    events: mpsc::UnboundedSender<ClientEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut codec = DapCodec::new();
    let mut buf = BytesMut::with_capacity(inner.config.read_buffer_bytes);

    'transport: loop {
        // Drain every complete message before asking for more bytes.
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(message)) => dispatch(&inner, &events, message).await,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "dropped malformed DAP frame");
                    let fatal = err.is_fatal();
                    let _ = events.send(ClientEvent::ProtocolError(err.to_string()));
                    if fatal {
                        break 'transport;
                    }
                }
            }
        }

        let read = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            res = reader.read_buf(&mut buf) => res,
        };
        match read {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(error = %err, "adapter transport read failed");
                break;
            }
        }
    }

    inner.shutdown.cancel();

    // Fail whatever is still outstanding before the table is cleared; handlers
    // must never be silently dropped.
    let pending = {
        let mut pending = inner.pending.lock().await;
        std::mem::take(&mut *pending)
    };
    for (_seq, tx) in pending {
        let _ = tx.send(Err(RequestError::Disconnected));
    }
    let _ = events.send(ClientEvent::Closed);
}

async fn dispatch(inner: &Inner, events: &mpsc::UnboundedSender<ClientEvent>, message: Message) {
    match message {
        Message::Response(response) => {
            let waiter = {
                let mut pending = inner.pending.lock().await;
                pending.remove(&response.request_seq)
            };
            match waiter {
                Some(tx) => {
                    let result = if response.success {
                        Ok(response.body)
                    } else {
                        let reason = response
                            .message
                            .unwrap_or_else(|| format!("{} failed", response.command));
                        Err(RequestError::Failed(reason))
                    };
                    // Fire-and-forget senders have dropped their receiver; the
                    // entry is cleared either way.
                    let _ = tx.send(result);
                }
                None => {
                    if inner.expired.lock().await.remove(&response.request_seq) {
                        tracing::debug!(
                            request_seq = response.request_seq,
                            "response arrived after its timeout"
                        );
                    } else {
                        let text = format!(
                            "response for unknown request_seq {}",
                            response.request_seq
                        );
                        tracing::warn!("{text}");
                        let _ = events.send(ClientEvent::ProtocolError(text));
                    }
                }
            }
        }
        Message::Event(event) => {
            let _ = events.send(ClientEvent::Event(event));
        }
        Message::Request(request) => {
            let text = format!("unsupported reverse request {:?} from adapter", request.command);
            tracing::warn!("{text}");
            let _ = events.send(ClientEvent::ProtocolError(text));
        }
    }
}
