//! The adapter session lifecycle state machine.
//!
//! One `Session` per debug run. It owns the wire client, drives the mandated
//! request choreography (initialize, launch/attach, breakpoint replay,
//! configurationDone, thread baseline), reacts to adapter events, and keeps
//! the current thread/frame plus the three tree panes coherent across stops.
//! Hosts drive it by calling [`Session::start`] and then pumping events with
//! [`Session::pump`] or [`Session::run`].

use std::future::Future;
use std::path::Path;

use serde_json::Value;
use tokio::sync::mpsc;

use ember_dap::types::{
    Capabilities, CapabilitiesEventBody, ContinueArguments, ContinuedEventBody,
    DisconnectArguments, ExitedEventBody, InitializeArguments, OutputEventBody, ProcessEventBody,
    Source, SourceArguments, SourceResponseBody, StackFrame, StackTraceArguments,
    StackTraceResponseBody, StepArguments, StoppedEventBody, TerminatedEventBody, Thread,
    ThreadEventBody, ThreadsResponseBody,
};
use ember_dap::{ClientEvent, DapClient, Event, PendingReply, RequestError};

use crate::breakpoints::{BreakpointStore, ToggleOutcome};
use crate::config::AdapterConfig;
use crate::error::{decode_body, encode_args, EngineError, EngineResult};
use crate::presenter::{FrameLocation, Presenter};
use crate::tree::{ChildSource, TreeCache, TreeNode};
use crate::variables::{VariablesPane, WatchPane};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Initializing,
    AwaitingConfiguration,
    Launching,
    Running,
    Stopped,
    Terminating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Over,
    Into,
    Out,
}

impl StepKind {
    fn command(self) -> &'static str {
        match self {
            StepKind::Over => "next",
            StepKind::Into => "stepIn",
            StepKind::Out => "stepOut",
        }
    }
}

/// Child fetches for the thread pane: a thread node's children are its stack
/// frames.
#[derive(Clone)]
struct ThreadFrames {
    client: DapClient,
}

impl ChildSource for ThreadFrames {
    fn children(
        &self,
        reference: i64,
    ) -> impl Future<Output = EngineResult<Vec<TreeNode>>> + Send {
        let client = self.client.clone();
        async move {
            let frames = fetch_frames(&client, reference).await?;
            Ok(frames.iter().map(frame_node).collect())
        }
    }
}

async fn fetch_frames(client: &DapClient, thread_id: i64) -> EngineResult<Vec<StackFrame>> {
    let arguments = StackTraceArguments {
        thread_id,
        start_frame: None,
        levels: None,
    };
    let body = client
        .request("stackTrace", Some(encode_args("stackTrace", &arguments)?))
        .await?;
    let body: StackTraceResponseBody = decode_body("stackTrace", body)?;
    Ok(body.stack_frames)
}

fn frame_node(frame: &StackFrame) -> TreeNode {
    let location = match frame.source.as_ref() {
        Some(source) => match (&source.path, &source.name) {
            (Some(path), _) => format!("{}:{}", path.display(), frame.line),
            (None, Some(name)) => format!("{}:{}", name, frame.line),
            (None, None) => format!("line {}", frame.line),
        },
        None => format!("line {}", frame.line),
    };
    TreeNode::leaf(frame.name.clone(), location)
}

fn thread_node(thread: &Thread) -> TreeNode {
    TreeNode::branch(thread.id, thread.name.clone(), String::new())
}

enum Pumped {
    Event(Option<ClientEvent>),
    Launch(Result<Option<Value>, RequestError>),
    Configuration(Result<Option<Value>, RequestError>),
}

async fn reply_slot(slot: &mut Option<PendingReply>) -> Result<Option<Value>, RequestError> {
    match slot.as_mut() {
        Some(reply) => reply.await,
        // Disabled slot: never resolves, so select! ignores this branch.
        None => std::future::pending().await,
    }
}

pub struct Session<P: Presenter> {
    client: DapClient,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    presenter: P,
    config: AdapterConfig,
    state: SessionState,
    capabilities: Capabilities,
    breakpoints: BreakpointStore,

    known_threads: Vec<Thread>,
    current_thread: Option<i64>,
    current_frames: Vec<StackFrame>,
    current_frame: Option<FrameLocation>,
    current_frame_id: Option<i64>,

    thread_source: ThreadFrames,
    thread_pane: TreeCache,
    variables: VariablesPane,
    watches: WatchPane,

    // Launch/attach and configurationDone complete in adapter-defined order;
    // readiness needs both.
    launch_reply: Option<PendingReply>,
    configuration_reply: Option<PendingReply>,
    launch_done: bool,
    configuration_done: bool,
    ready: bool,

    pending_restart: Option<Value>,
}

impl<P: Presenter> Session<P> {
    /// Wrap an already-connected client. Breakpoints are user data that
    /// outlive sessions; the caller threads the store from run to run and
    /// recovers it with [`Session::into_breakpoints`].
    pub fn new(
        client: DapClient,
        events: mpsc::UnboundedReceiver<ClientEvent>,
        config: AdapterConfig,
        breakpoints: BreakpointStore,
        presenter: P,
    ) -> Self {
        Session {
            thread_source: ThreadFrames {
                client: client.clone(),
            },
            variables: VariablesPane::new(client.clone()),
            watches: WatchPane::new(client.clone()),
            client,
            events,
            presenter,
            config,
            state: SessionState::Connecting,
            capabilities: Capabilities::default(),
            breakpoints,
            known_threads: Vec::new(),
            current_thread: None,
            current_frames: Vec::new(),
            current_frame: None,
            current_frame_id: None,
            thread_pane: TreeCache::new(),
            launch_reply: None,
            configuration_reply: None,
            launch_done: false,
            configuration_done: false,
            ready: false,
            pending_restart: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn current_thread(&self) -> Option<i64> {
        self.current_thread
    }

    pub fn current_frame(&self) -> Option<&FrameLocation> {
        self.current_frame.as_ref()
    }

    pub fn threads(&self) -> &[Thread] {
        &self.known_threads
    }

    pub fn thread_tree(&self) -> &[TreeNode] {
        self.thread_pane.roots()
    }

    pub fn variable_tree(&self) -> &[TreeNode] {
        self.variables.roots()
    }

    pub fn watch_tree(&self) -> &[TreeNode] {
        self.watches.roots()
    }

    pub fn breakpoints(&self) -> &BreakpointStore {
        &self.breakpoints
    }

    pub fn into_breakpoints(self) -> BreakpointStore {
        self.breakpoints
    }

    /// Send `initialize`, store the adapter capabilities, and put the
    /// launch/attach request in flight. Failures here fail the whole session.
    pub async fn start(&mut self) -> EngineResult<()> {
        self.set_state(SessionState::Initializing);
        let arguments = InitializeArguments::for_adapter(self.config.adapter_id.clone());
        let body = match self
            .client
            .request_with_timeout(
                "initialize",
                Some(encode_args("initialize", &arguments)?),
                Some(self.config.request_timeout),
            )
            .await
        {
            Ok(body) => body,
            Err(err) => return self.fail_session("initialize", err).await,
        };
        if let Some(body) = body {
            self.capabilities = serde_json::from_value(body).map_err(|source| {
                EngineError::Body {
                    command: "initialize",
                    source,
                }
            })?;
        }
        self.set_state(SessionState::AwaitingConfiguration);

        let command = self.config.launch.command();
        let arguments = self.config.launch.arguments().clone();
        match self.client.begin_request(command, Some(arguments)).await {
            Ok(reply) => self.launch_reply = Some(reply),
            Err(err) => return self.fail_session(command, err).await,
        }
        Ok(())
    }

    /// Process one completion: an adapter event, the launch/attach response,
    /// or the configurationDone response. Returns `false` once the session
    /// has reached `Disconnected`.
    pub async fn pump(&mut self) -> EngineResult<bool> {
        if self.state == SessionState::Disconnected {
            return Ok(false);
        }
        let pumped = tokio::select! {
            event = self.events.recv() => Pumped::Event(event),
            result = reply_slot(&mut self.launch_reply) => Pumped::Launch(result),
            result = reply_slot(&mut self.configuration_reply) => Pumped::Configuration(result),
        };
        match pumped {
            Pumped::Event(None) => {
                self.on_transport_closed();
                Ok(false)
            }
            Pumped::Event(Some(event)) => {
                self.handle_client_event(event).await?;
                Ok(self.state != SessionState::Disconnected)
            }
            Pumped::Launch(result) => {
                self.launch_reply = None;
                self.on_launch_result(result).await?;
                Ok(true)
            }
            Pumped::Configuration(result) => {
                self.configuration_reply = None;
                self.on_configuration_result(result).await?;
                Ok(self.state != SessionState::Disconnected)
            }
        }
    }

    /// Pump until the session disconnects or a fatal error surfaces.
    pub async fn run(&mut self) -> EngineResult<()> {
        while self.pump().await? {}
        Ok(())
    }

    // --- user operations ---------------------------------------------------

    /// Cycle the breakpoint at a line and, when an adapter is live, push the
    /// new set immediately.
    pub async fn toggle_breakpoint(
        &mut self,
        path: impl AsRef<Path>,
        line: u32,
    ) -> EngineResult<ToggleOutcome> {
        let outcome = self.breakpoints.toggle(path, line);
        if self.ready
            && matches!(self.state, SessionState::Running | SessionState::Stopped)
        {
            if let Err(err) = self
                .breakpoints
                .sync_all(&self.client, &self.capabilities)
                .await
            {
                self.presenter
                    .message(&format!("breakpoint sync failed: {err}"));
            }
        }
        let snapshot = self.breakpoints.snapshot();
        self.presenter.breakpoints(&snapshot);
        Ok(outcome)
    }

    pub async fn continue_execution(&mut self) -> EngineResult<()> {
        let Some(thread_id) = self.current_thread else {
            return self.no_current_thread("continue");
        };
        let arguments = ContinueArguments { thread_id };
        match self
            .client
            .request("continue", Some(encode_args("continue", &arguments)?))
            .await
        {
            Ok(_body) => {
                self.set_running();
                Ok(())
            }
            Err(RequestError::Failed(reason)) => {
                self.presenter.message(&format!("continue failed: {reason}"));
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn step(&mut self, kind: StepKind) -> EngineResult<()> {
        let Some(thread_id) = self.current_thread else {
            return self.no_current_thread(kind.command());
        };
        let command = kind.command();
        let arguments = StepArguments { thread_id };
        match self
            .client
            .request(command, Some(encode_args("step", &arguments)?))
            .await
        {
            Ok(_body) => {
                self.set_running();
                Ok(())
            }
            Err(RequestError::Failed(reason)) => {
                self.presenter.message(&format!("{command} failed: {reason}"));
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn pause(&mut self) -> EngineResult<()> {
        let Some(thread_id) = self.current_thread.or_else(|| {
            self.known_threads.first().map(|thread| thread.id)
        }) else {
            return self.no_current_thread("pause");
        };
        let arguments = StepArguments { thread_id };
        match self
            .client
            .request("pause", Some(encode_args("pause", &arguments)?))
            .await
        {
            // The stop lands via the `stopped` event.
            Ok(_body) => Ok(()),
            Err(RequestError::Failed(reason)) => {
                self.presenter.message(&format!("pause failed: {reason}"));
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn add_watch(&mut self, expression: impl Into<String>) -> EngineResult<()> {
        self.watches.add(expression);
        if self.state == SessionState::Stopped {
            self.watches.refresh(self.current_frame_id).await?;
        }
        self.presenter.watches(self.watches.roots());
        Ok(())
    }

    pub async fn remove_watch(&mut self, index: usize) -> EngineResult<()> {
        if self.watches.remove(index) && self.state == SessionState::Stopped {
            self.watches.refresh(self.current_frame_id).await?;
        }
        self.presenter.watches(self.watches.roots());
        Ok(())
    }

    pub async fn toggle_variable(&mut self, path: &[usize]) -> EngineResult<()> {
        self.variables.toggle_at(path).await?;
        self.presenter.variables(self.variables.roots());
        Ok(())
    }

    pub async fn toggle_watch(&mut self, path: &[usize]) -> EngineResult<()> {
        self.watches.toggle_at(path).await?;
        self.presenter.watches(self.watches.roots());
        Ok(())
    }

    /// Expanding a thread fetches that thread's stack trace on demand.
    pub async fn toggle_thread(&mut self, path: &[usize]) -> EngineResult<()> {
        self.thread_pane.toggle_at(path, &self.thread_source).await?;
        self.presenter
            .threads(&self.known_threads, self.thread_pane.roots());
        Ok(())
    }

    /// Tear the session down: bounded-timeout `disconnect`, then transport
    /// shutdown. Safe to call in any state.
    pub async fn disconnect(&mut self) -> EngineResult<()> {
        if self.state == SessionState::Disconnected {
            return Ok(());
        }
        self.finish_teardown().await
    }

    /// A restart queued by a `terminated` event. Yields the adapter's opaque
    /// restart payload at most once, and only after teardown completed.
    pub fn take_pending_restart(&mut self) -> Option<Value> {
        if self.state == SessionState::Disconnected {
            self.pending_restart.take()
        } else {
            None
        }
    }

    // --- event handling ----------------------------------------------------

    async fn handle_client_event(&mut self, event: ClientEvent) -> EngineResult<()> {
        match event {
            ClientEvent::Event(event) => self.handle_adapter_event(event).await,
            ClientEvent::ProtocolError(text) => {
                self.presenter.message(&format!("protocol error: {text}"));
                Ok(())
            }
            ClientEvent::Closed => {
                self.on_transport_closed();
                Ok(())
            }
        }
    }

    async fn handle_adapter_event(&mut self, event: Event) -> EngineResult<()> {
        match self.dispatch_adapter_event(&event).await {
            Err(EngineError::Body { .. }) => {
                self.report_protocol(&format!("malformed {} event body", event.event));
                Ok(())
            }
            other => other,
        }
    }

    async fn dispatch_adapter_event(&mut self, event: &Event) -> EngineResult<()> {
        let body = event.body.clone();
        match event.event.as_str() {
            "initialized" => self.on_initialized().await,
            "stopped" => {
                let body: StoppedEventBody = decode_body("stopped", body)?;
                self.on_stopped(body).await
            }
            "continued" => {
                let _body: ContinuedEventBody = optional_body("continued", body)?;
                self.set_running();
                Ok(())
            }
            "thread" => {
                let body: ThreadEventBody = decode_body("thread", body)?;
                self.on_thread_event(body).await
            }
            "output" => {
                let body: OutputEventBody = decode_body("output", body)?;
                self.presenter.output(body.category.as_deref(), &body.output);
                Ok(())
            }
            "breakpoint" => {
                let body = decode_body("breakpoint", body)?;
                if let Err(report) = self.breakpoints.on_breakpoint_event(&body) {
                    self.report_protocol(&report);
                }
                let snapshot = self.breakpoints.snapshot();
                self.presenter.breakpoints(&snapshot);
                Ok(())
            }
            "capabilities" => {
                let body: CapabilitiesEventBody = decode_body("capabilities", body)?;
                self.capabilities.merge(body.capabilities);
                Ok(())
            }
            "process" => {
                let body: ProcessEventBody = optional_body("process", body)?;
                self.presenter
                    .message(&format!("debuggee process: {}", body.name));
                Ok(())
            }
            "exited" => {
                let body: ExitedEventBody = decode_body("exited", body)?;
                self.presenter
                    .message(&format!("debuggee exited with code {}", body.exit_code));
                self.set_state(SessionState::Terminating);
                Ok(())
            }
            "terminated" => {
                let body: TerminatedEventBody = optional_body("terminated", body)?;
                self.pending_restart = body.restart;
                self.finish_teardown().await
            }
            other => {
                tracing::debug!(event = other, "unhandled adapter event");
                Ok(())
            }
        }
    }

    /// `initialized` marks the adapter ready for configuration: replay user
    /// breakpoints, send exception filters, then configurationDone when the
    /// adapter supports it.
    async fn on_initialized(&mut self) -> EngineResult<()> {
        let filters = self.capabilities.exception_filters().to_vec();
        if !filters.is_empty() && !self.breakpoints.exception_filters_chosen() {
            let chosen = self.presenter.pick_exception_filters(&filters);
            self.breakpoints.choose_exception_filters(chosen);
        }
        if let Err(err) = self
            .breakpoints
            .sync_all(&self.client, &self.capabilities)
            .await
        {
            self.presenter
                .message(&format!("breakpoint sync failed: {err}"));
        }
        let snapshot = self.breakpoints.snapshot();
        self.presenter.breakpoints(&snapshot);

        self.set_state(SessionState::Launching);
        if self.capabilities.configuration_done() {
            match self.client.begin_request("configurationDone", None).await {
                Ok(reply) => self.configuration_reply = Some(reply),
                Err(err) => {
                    // Transport gone; the Closed notice will follow.
                    self.presenter
                        .message(&format!("configurationDone failed: {err}"));
                }
            }
        } else {
            self.configuration_done = true;
            self.maybe_ready().await?;
        }
        Ok(())
    }

    async fn on_launch_result(
        &mut self,
        result: Result<Option<Value>, RequestError>,
    ) -> EngineResult<()> {
        match result {
            Ok(_body) => {
                self.launch_done = true;
                self.maybe_ready().await
            }
            Err(err) => self.fail_session(self.config.launch.command(), err).await,
        }
    }

    async fn on_configuration_result(
        &mut self,
        result: Result<Option<Value>, RequestError>,
    ) -> EngineResult<()> {
        if let Err(err) = result {
            if err == RequestError::Disconnected {
                return Ok(());
            }
            self.presenter
                .message(&format!("configurationDone failed: {err}"));
        }
        self.configuration_done = true;
        self.maybe_ready().await
    }

    /// Fires the ready logic exactly once, after both the launch/attach and
    /// configurationDone responses have landed.
    async fn maybe_ready(&mut self) -> EngineResult<()> {
        if self.ready || !(self.launch_done && self.configuration_done) {
            return Ok(());
        }
        self.ready = true;
        self.set_state(SessionState::Running);
        if let Err(err) = self.refresh_thread_baseline().await {
            self.presenter
                .message(&format!("thread list request failed: {err}"));
        }
        Ok(())
    }

    /// Fetch the initial thread list. The protocol requires at least one
    /// thread, but a `thread started` event may race the request, so an empty
    /// answer gets one retry before being reported.
    async fn refresh_thread_baseline(&mut self) -> EngineResult<()> {
        let mut threads = self.fetch_threads().await?;
        if threads.is_empty() {
            threads = self.fetch_threads().await?;
        }
        if threads.is_empty() {
            self.report_protocol("adapter reported zero threads");
        }
        self.known_threads = threads;
        self.publish_threads().await
    }

    async fn fetch_threads(&mut self) -> EngineResult<Vec<Thread>> {
        let body = self
            .client
            .request_with_timeout("threads", None, Some(self.config.request_timeout))
            .await?;
        let body: ThreadsResponseBody = decode_body("threads", body)?;
        Ok(body.threads)
    }

    async fn publish_threads(&mut self) -> EngineResult<()> {
        let roots = self.known_threads.iter().map(thread_node).collect();
        self.thread_pane
            .replace_roots(roots, &self.thread_source)
            .await?;
        self.presenter
            .threads(&self.known_threads, self.thread_pane.roots());
        Ok(())
    }

    async fn on_stopped(&mut self, body: StoppedEventBody) -> EngineResult<()> {
        self.set_state(SessionState::Stopped);
        if let Err(err) = self.enter_stopped(body).await {
            match err {
                // The transport-closed path owns this failure mode.
                EngineError::Request(RequestError::Disconnected) => {}
                err => self
                    .presenter
                    .message(&format!("failed to inspect stop: {err}")),
            }
        }
        Ok(())
    }

    async fn enter_stopped(&mut self, body: StoppedEventBody) -> EngineResult<()> {
        let thread_id = match body.thread_id {
            Some(id) => id,
            // All-threads stop without a thread id: pick the first known one.
            None => match self.known_threads.first() {
                Some(thread) => thread.id,
                None => {
                    self.known_threads = self.fetch_threads().await?;
                    match self.known_threads.first() {
                        Some(thread) => thread.id,
                        None => {
                            self.report_protocol("stopped event with no resolvable thread");
                            return Ok(());
                        }
                    }
                }
            },
        };

        if !self.known_threads.iter().any(|t| t.id == thread_id) {
            // One bounded reload; the stop may have raced a thread start.
            self.known_threads = self.fetch_threads().await?;
            if !self.known_threads.iter().any(|t| t.id == thread_id) {
                self.report_protocol(&format!(
                    "stopped event for unknown thread {thread_id}"
                ));
                self.known_threads.push(Thread {
                    id: thread_id,
                    name: format!("Thread {thread_id}"),
                });
            }
        }
        self.current_thread = Some(thread_id);

        let frames = fetch_frames(&self.client, thread_id).await?;
        self.select_frame(&frames).await?;
        self.current_frames = frames;

        // The stopped thread's node arrives pre-expanded with the frames just
        // fetched, so reconciliation never issues a second stackTrace for it.
        let mut roots = Vec::with_capacity(self.known_threads.len());
        for thread in &self.known_threads {
            let mut node = thread_node(thread);
            if thread.id == thread_id {
                node.expanded = true;
                node.children = Some(self.current_frames.iter().map(frame_node).collect());
            }
            roots.push(node);
        }
        self.thread_pane
            .replace_roots(roots, &self.thread_source)
            .await?;
        self.presenter
            .threads(&self.known_threads, self.thread_pane.roots());

        if let Some(frame_id) = self.current_frame_id {
            self.variables.refresh(frame_id).await?;
        } else {
            self.variables.clear();
        }
        self.presenter.variables(self.variables.roots());

        self.watches.refresh(self.current_frame_id).await?;
        self.presenter.watches(self.watches.roots());
        Ok(())
    }

    /// Pick the first frame with a resolvable source. Frames carrying only a
    /// source reference need the `source` round trip before they can be shown;
    /// the jump stays pending until that content lands.
    async fn select_frame(&mut self, frames: &[StackFrame]) -> EngineResult<()> {
        self.current_frame = None;
        self.current_frame_id = None;
        for frame in frames {
            let Some(source) = frame.source.as_ref() else {
                continue;
            };
            if let Some(path) = &source.path {
                self.current_frame = Some(FrameLocation {
                    frame_name: frame.name.clone(),
                    path: Some(path.clone()),
                    source_name: source.name.clone(),
                    source_content: None,
                    line: frame.line,
                    column: frame.column,
                });
                self.current_frame_id = Some(frame.id);
                break;
            }
            if source.source_reference.unwrap_or(0) > 0 {
                let content = self.fetch_source(source).await?;
                self.current_frame = Some(FrameLocation {
                    frame_name: frame.name.clone(),
                    path: None,
                    source_name: source.name.clone(),
                    source_content: content,
                    line: frame.line,
                    column: frame.column,
                });
                self.current_frame_id = Some(frame.id);
                break;
            }
        }
        self.presenter.current_frame(self.current_frame.as_ref());
        Ok(())
    }

    async fn fetch_source(&mut self, source: &Source) -> EngineResult<Option<String>> {
        let reference = source.source_reference.unwrap_or(0);
        let arguments = SourceArguments {
            source: Some(source.clone()),
            source_reference: reference,
        };
        match self
            .client
            .request("source", Some(encode_args("source", &arguments)?))
            .await
        {
            Ok(body) => {
                let body: SourceResponseBody = decode_body("source", body)?;
                Ok(Some(body.content))
            }
            Err(RequestError::Failed(reason)) => {
                self.presenter
                    .message(&format!("source fetch failed: {reason}"));
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn on_thread_event(&mut self, body: ThreadEventBody) -> EngineResult<()> {
        match body.reason.as_str() {
            "started" => {
                if !self.known_threads.iter().any(|t| t.id == body.thread_id) {
                    self.known_threads.push(Thread {
                        id: body.thread_id,
                        name: format!("Thread {}", body.thread_id),
                    });
                }
            }
            "exited" => {
                self.known_threads.retain(|t| t.id != body.thread_id);
                if self.current_thread == Some(body.thread_id) {
                    self.current_thread = None;
                }
            }
            other => {
                tracing::debug!(reason = other, "unhandled thread event reason");
            }
        }
        if let Err(err) = self.publish_threads().await {
            self.presenter
                .message(&format!("thread pane refresh failed: {err}"));
        }
        Ok(())
    }

    // --- transitions -------------------------------------------------------

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "session state change");
            self.state = state;
            self.presenter.state_changed(state);
        }
    }

    /// Execution resumed: clear the frame selection. The current thread is
    /// kept so pause still has a target, and the variable/watch trees are
    /// kept so the next stop can reconcile the user's expansion state against
    /// them.
    fn set_running(&mut self) {
        self.current_frames.clear();
        self.current_frame = None;
        self.current_frame_id = None;
        self.presenter.current_frame(None);
        self.set_state(SessionState::Running);
    }

    /// Fatal path for `initialize`/`launch`/`attach` failures.
    async fn fail_session(&mut self, command: &str, err: RequestError) -> EngineResult<()> {
        self.presenter.message(&format!("{command} failed: {err}"));
        self.client.shutdown().await;
        self.clear_stop_context();
        self.breakpoints.reset_session();
        self.set_state(SessionState::Disconnected);
        Err(EngineError::Request(err))
    }

    /// Ordered teardown: bounded `disconnect`, then client shutdown (which
    /// fails anything still outstanding), then the state reset. A queued
    /// restart stays claimable afterwards.
    async fn finish_teardown(&mut self) -> EngineResult<()> {
        self.set_state(SessionState::Terminating);
        let arguments = DisconnectArguments {
            restart: self.pending_restart.is_some().then_some(true),
            terminate_debuggee: self.config.terminate_debuggee,
        };
        let result = self
            .client
            .request_with_timeout(
                "disconnect",
                Some(encode_args("disconnect", &arguments)?),
                Some(self.config.disconnect_timeout),
            )
            .await;
        if let Err(err) = result {
            tracing::debug!(error = %err, "disconnect did not complete cleanly");
        }
        self.client.shutdown().await;
        self.launch_reply = None;
        self.configuration_reply = None;
        self.clear_stop_context();
        self.breakpoints.reset_session();
        self.set_state(SessionState::Disconnected);
        Ok(())
    }

    fn on_transport_closed(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.presenter.message("adapter disconnected");
        self.launch_reply = None;
        self.configuration_reply = None;
        self.clear_stop_context();
        self.breakpoints.reset_session();
        self.set_state(SessionState::Disconnected);
    }

    fn clear_stop_context(&mut self) {
        self.known_threads.clear();
        self.current_thread = None;
        self.current_frames.clear();
        self.current_frame = None;
        self.current_frame_id = None;
        self.thread_pane.clear();
        self.variables.clear();
        self.watches.clear_results();
        self.presenter.current_frame(None);
    }

    fn no_current_thread(&mut self, action: &str) -> EngineResult<()> {
        // Local no-op, not a protocol error.
        self.presenter
            .message(&format!("cannot {action}: no current thread"));
        Ok(())
    }

    fn report_protocol(&mut self, text: &str) {
        tracing::warn!("{text}");
        self.presenter.message(&format!("protocol error: {text}"));
    }
}

/// Event bodies that adapters may omit entirely.
fn optional_body<T: serde::de::DeserializeOwned + Default>(
    event: &'static str,
    body: Option<Value>,
) -> EngineResult<T> {
    match body {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => decode_body(event, Some(value)),
    }
}
