//! In-process adapter doubles for tests.
//!
//! [`WirePeer`] is a hand-driven peer for exercising the client at the frame
//! level. [`MockAdapter`] is an autonomous adapter backed by a [`MockWorld`]
//! snapshot, for driving a whole debug session without a real debuggee.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::BytesMut;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf},
    sync::{mpsc, Mutex},
};
use tokio_util::codec::{Decoder, Encoder};

use crate::client::{ClientEvent, DapClient};
use crate::codec::DapCodec;
use crate::messages::{Message, Request};
use crate::types::{Scope, StackFrame, Thread, Variable};

/// The far end of an in-memory DAP transport, driven explicitly by the test.
pub struct WirePeer {
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
    codec: DapCodec,
    buf: BytesMut,
    next_seq: i64,
}

impl WirePeer {
    /// Build a connected client/peer pair over an in-memory duplex stream.
    pub fn connect() -> (WirePeer, DapClient, mpsc::UnboundedReceiver<ClientEvent>) {
        let (client_side, peer_side) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_side);
        let (peer_read, peer_write) = tokio::io::split(peer_side);
        let (client, events) = DapClient::connect(client_read, client_write);
        let peer = WirePeer {
            reader: peer_read,
            writer: peer_write,
            codec: DapCodec::new(),
            buf: BytesMut::with_capacity(8 * 1024),
            next_seq: 0,
        };
        (peer, client, events)
    }

    pub async fn recv(&mut self) -> Message {
        loop {
            match self.codec.decode(&mut self.buf) {
                Ok(Some(message)) => return message,
                Ok(None) => {}
                Err(err) => panic!("peer received malformed frame: {err}"),
            }
            let read = self
                .reader
                .read_buf(&mut self.buf)
                .await
                .expect("peer read failed");
            if read == 0 {
                panic!("client closed the transport while the peer was waiting");
            }
        }
    }

    pub async fn expect_request(&mut self) -> Request {
        match self.recv().await {
            Message::Request(request) => request,
            other => panic!("expected a request, got {other:?}"),
        }
    }

    pub async fn send(&mut self, message: &Message) {
        let mut buf = BytesMut::new();
        self.codec
            .encode(message, &mut buf)
            .expect("peer failed to encode message");
        self.writer
            .write_all(&buf)
            .await
            .expect("peer write failed");
        self.writer.flush().await.expect("peer flush failed");
    }

    pub async fn respond(&mut self, request: &Request, body: Option<Value>) {
        let seq = self.bump_seq();
        self.send(&Message::response(seq, request, true, body)).await;
    }

    pub async fn fail(&mut self, request: &Request, message: &str) {
        let seq = self.bump_seq();
        self.send(&Message::error_response(seq, request, message)).await;
    }

    /// Send a response for an arbitrary request_seq, matched or not.
    pub async fn respond_raw(
        &mut self,
        request_seq: i64,
        success: bool,
        body: Option<Value>,
        message: Option<String>,
    ) {
        let seq = self.bump_seq();
        self.send(&Message::Response(crate::messages::Response {
            seq,
            request_seq,
            success,
            command: String::new(),
            message,
            body,
        }))
        .await;
    }

    pub async fn emit(&mut self, event: &str, body: Option<Value>) {
        let seq = self.bump_seq();
        self.send(&Message::event(seq, event, body)).await;
    }

    fn bump_seq(&mut self) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// The debuggee state a [`MockAdapter`] answers from. Tests mutate it between
/// stops to simulate execution.
#[derive(Debug, Clone)]
pub struct MockWorld {
    /// Raw `initialize` response body.
    pub capabilities: Value,
    pub threads: Vec<Thread>,
    /// Stack frames keyed by thread id.
    pub frames: HashMap<i64, Vec<StackFrame>>,
    /// Scopes keyed by frame id.
    pub scopes: HashMap<i64, Vec<Scope>>,
    /// Children keyed by variables reference.
    pub variables: HashMap<i64, Vec<Variable>>,
    /// Canned `evaluate` results keyed by expression.
    pub evaluations: HashMap<String, Value>,
    /// `source` request content keyed by source reference.
    pub sources: HashMap<i64, String>,
    /// Commands that fail with a mock error instead of answering.
    pub fail_commands: HashSet<String>,
    /// Breakpoints on these lines come back unverified.
    pub reject_lines: HashSet<u32>,
}

impl Default for MockWorld {
    fn default() -> Self {
        MockWorld {
            capabilities: json!({
                "supportsConfigurationDoneRequest": true,
                "supportsFunctionBreakpoints": true,
            }),
            threads: Vec::new(),
            frames: HashMap::new(),
            scopes: HashMap::new(),
            variables: HashMap::new(),
            evaluations: HashMap::new(),
            sources: HashMap::new(),
            fail_commands: HashSet::new(),
            reject_lines: HashSet::new(),
        }
    }
}

/// An in-process adapter that answers protocol requests from a [`MockWorld`]
/// and records every request it sees.
pub struct MockAdapter {
    world: Arc<Mutex<MockWorld>>,
    requests: Arc<Mutex<Vec<Request>>>,
    emit_tx: mpsc::UnboundedSender<(String, Option<Value>)>,
}

impl MockAdapter {
    /// Spawn the adapter task and hand back a client wired to it.
    pub fn spawn(
        world: MockWorld,
    ) -> (MockAdapter, DapClient, mpsc::UnboundedReceiver<ClientEvent>) {
        let (client_side, adapter_side) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_side);
        let (client, events) = DapClient::connect(client_read, client_write);

        let world = Arc::new(Mutex::new(world));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (emit_tx, emit_rx) = mpsc::unbounded_channel();

        tokio::spawn(adapter_task(
            adapter_side,
            world.clone(),
            requests.clone(),
            emit_rx,
        ));

        (
            MockAdapter {
                world,
                requests,
                emit_tx,
            },
            client,
            events,
        )
    }

    /// Every request observed so far, in arrival order.
    pub async fn requests(&self) -> Vec<Request> {
        self.requests.lock().await.clone()
    }

    pub async fn requests_for(&self, command: &str) -> Vec<Request> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|request| request.command == command)
            .cloned()
            .collect()
    }

    pub async fn count(&self, command: &str) -> usize {
        self.requests_for(command).await.len()
    }

    pub async fn update_world(&self, update: impl FnOnce(&mut MockWorld)) {
        update(&mut *self.world.lock().await);
    }

    /// Queue an event for delivery to the client.
    pub fn emit(&self, event: &str, body: Option<Value>) {
        let _ = self.emit_tx.send((event.to_string(), body));
    }

    /// Announce a stop on the given thread.
    pub fn stop(&self, thread_id: i64, reason: &str) {
        self.emit(
            "stopped",
            Some(json!({
                "reason": reason,
                "threadId": thread_id,
                "allThreadsStopped": true,
            })),
        );
    }
}

async fn adapter_task(
    stream: DuplexStream,
    world: Arc<Mutex<MockWorld>>,
    requests: Arc<Mutex<Vec<Request>>>,
    mut emit_rx: mpsc::UnboundedReceiver<(String, Option<Value>)>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut codec = DapCodec::new();
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut next_seq: i64 = 0;

    loop {
        let mut outgoing: Vec<Message> = Vec::new();

        loop {
            match codec.decode(&mut buf) {
                Ok(Some(Message::Request(request))) => {
                    requests.lock().await.push(request.clone());
                    let world = world.lock().await;
                    answer(&world, &request, &mut next_seq, &mut outgoing);
                }
                Ok(Some(other)) => {
                    panic!("mock adapter received a non-request message: {other:?}")
                }
                Ok(None) => break,
                Err(err) => panic!("mock adapter received a malformed frame: {err}"),
            }
        }

        for message in outgoing.drain(..) {
            let mut out = BytesMut::new();
            if codec.encode(&message, &mut out).is_err() {
                return;
            }
            if writer.write_all(&out).await.is_err() || writer.flush().await.is_err() {
                return;
            }
        }

        tokio::select! {
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            },
            queued = emit_rx.recv() => {
                let Some((event, body)) = queued else { return };
                let seq = next_seq;
                next_seq += 1;
                let mut out = BytesMut::new();
                if codec.encode(&Message::event(seq, event, body), &mut out).is_err() {
                    return;
                }
                if writer.write_all(&out).await.is_err() || writer.flush().await.is_err() {
                    return;
                }
            }
        }
    }
}

fn answer(world: &MockWorld, request: &Request, next_seq: &mut i64, out: &mut Vec<Message>) {
    let mut seq = || {
        let s = *next_seq;
        *next_seq += 1;
        s
    };

    if world.fail_commands.contains(&request.command) {
        out.push(Message::error_response(
            seq(),
            request,
            format!("mock failure for {}", request.command),
        ));
        return;
    }

    let args = request.arguments.clone().unwrap_or(Value::Null);
    match request.command.as_str() {
        "initialize" => {
            out.push(Message::response(
                seq(),
                request,
                true,
                Some(world.capabilities.clone()),
            ));
            out.push(Message::event(seq(), "initialized", None));
        }
        "launch" | "attach" | "configurationDone" | "pause" | "next" | "stepIn"
        | "stepOut" | "disconnect" => {
            out.push(Message::response(seq(), request, true, None));
        }
        "continue" => {
            out.push(Message::response(
                seq(),
                request,
                true,
                Some(json!({"allThreadsContinued": true})),
            ));
            out.push(Message::event(
                seq(),
                "continued",
                Some(json!({
                    "threadId": args["threadId"],
                    "allThreadsContinued": true,
                })),
            ));
        }
        "threads" => {
            out.push(Message::response(
                seq(),
                request,
                true,
                Some(json!({"threads": world.threads})),
            ));
        }
        "stackTrace" => {
            let thread_id = args["threadId"].as_i64().unwrap_or(-1);
            let frames = world.frames.get(&thread_id).cloned().unwrap_or_default();
            let total = frames.len();
            out.push(Message::response(
                seq(),
                request,
                true,
                Some(json!({"stackFrames": frames, "totalFrames": total})),
            ));
        }
        "scopes" => {
            let frame_id = args["frameId"].as_i64().unwrap_or(-1);
            let scopes = world.scopes.get(&frame_id).cloned().unwrap_or_default();
            out.push(Message::response(
                seq(),
                request,
                true,
                Some(json!({"scopes": scopes})),
            ));
        }
        "variables" => {
            let reference = args["variablesReference"].as_i64().unwrap_or(-1);
            let variables = world.variables.get(&reference).cloned().unwrap_or_default();
            out.push(Message::response(
                seq(),
                request,
                true,
                Some(json!({"variables": variables})),
            ));
        }
        "evaluate" => {
            let expression = args["expression"].as_str().unwrap_or_default();
            match world.evaluations.get(expression) {
                Some(body) => {
                    out.push(Message::response(seq(), request, true, Some(body.clone())))
                }
                None => out.push(Message::error_response(
                    seq(),
                    request,
                    format!("cannot evaluate {expression:?}"),
                )),
            }
        }
        "source" => {
            let reference = args["sourceReference"].as_i64().unwrap_or(-1);
            match world.sources.get(&reference) {
                Some(content) => out.push(Message::response(
                    seq(),
                    request,
                    true,
                    Some(json!({"content": content})),
                )),
                None => out.push(Message::error_response(
                    seq(),
                    request,
                    "no source for reference",
                )),
            }
        }
        "setBreakpoints" => {
            let empty = Vec::new();
            let asked = args["breakpoints"].as_array().unwrap_or(&empty);
            // Ids are line-derived so repeated syncs answer identically.
            let breakpoints: Vec<Value> = asked
                .iter()
                .map(|bp| {
                    let line = bp["line"].as_u64().unwrap_or(0) as u32;
                    if world.reject_lines.contains(&line) {
                        json!({
                            "id": line,
                            "verified": false,
                            "line": line,
                            "message": "breakpoint rejected",
                        })
                    } else {
                        json!({"id": line, "verified": true, "line": line})
                    }
                })
                .collect();
            out.push(Message::response(
                seq(),
                request,
                true,
                Some(json!({"breakpoints": breakpoints})),
            ));
        }
        "setFunctionBreakpoints" => {
            let empty = Vec::new();
            let asked = args["breakpoints"].as_array().unwrap_or(&empty);
            let breakpoints: Vec<Value> = asked
                .iter()
                .enumerate()
                .map(|(index, _)| json!({"id": 1000 + index as i64, "verified": true}))
                .collect();
            out.push(Message::response(
                seq(),
                request,
                true,
                Some(json!({"breakpoints": breakpoints})),
            ));
        }
        "setExceptionBreakpoints" => {
            out.push(Message::response(
                seq(),
                request,
                true,
                Some(json!({"breakpoints": []})),
            ));
        }
        other => {
            out.push(Message::error_response(
                seq(),
                request,
                format!("unsupported command {other:?}"),
            ));
        }
    }
}
