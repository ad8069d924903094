//! Shared fixtures for the engine suite: a recording presenter and a debug
//! "world" served by the mock adapter.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use ember_dap::testing::{MockAdapter, MockWorld};
use ember_dap::types::{Scope, Source, StackFrame, Thread, Variable};
use ember_debug::presenter::FrameLocation;
use ember_debug::{AdapterConfig, BreakpointStore, LaunchKind, Presenter, Session, SessionState};

mod breakpoints;
mod stopped;
mod watches;

#[derive(Default)]
pub struct Recording {
    pub messages: Vec<String>,
    pub states: Vec<SessionState>,
    pub frames: Vec<Option<FrameLocation>>,
    pub outputs: Vec<(Option<String>, String)>,
    pub filter_prompts: usize,
}

impl Recording {
    pub fn saw_message(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.contains(needle))
    }
}

pub struct RecordingPresenter {
    pub shared: Arc<Mutex<Recording>>,
}

impl RecordingPresenter {
    pub fn new() -> (Self, Arc<Mutex<Recording>>) {
        let shared = Arc::new(Mutex::new(Recording::default()));
        (
            RecordingPresenter {
                shared: shared.clone(),
            },
            shared,
        )
    }
}

impl Presenter for RecordingPresenter {
    fn message(&mut self, text: &str) {
        self.shared.lock().unwrap().messages.push(text.to_string());
    }

    fn output(&mut self, category: Option<&str>, text: &str) {
        self.shared
            .lock()
            .unwrap()
            .outputs
            .push((category.map(str::to_string), text.to_string()));
    }

    fn state_changed(&mut self, state: SessionState) {
        self.shared.lock().unwrap().states.push(state);
    }

    fn current_frame(&mut self, frame: Option<&FrameLocation>) {
        self.shared.lock().unwrap().frames.push(frame.cloned());
    }

    fn pick_exception_filters(
        &mut self,
        filters: &[ember_dap::types::ExceptionBreakpointsFilter],
    ) -> Vec<String> {
        self.shared.lock().unwrap().filter_prompts += 1;
        filters
            .iter()
            .filter(|filter| filter.default.unwrap_or(false))
            .map(|filter| filter.filter.clone())
            .collect()
    }
}

pub type TestSession = Session<RecordingPresenter>;

/// One thread, one frame at /src/main.py:3, a Locals scope with a scalar and
/// an expandable list.
pub fn basic_world() -> MockWorld {
    let mut world = MockWorld::default();
    world.threads = vec![Thread {
        id: 1,
        name: "main".to_string(),
    }];
    world.frames.insert(
        1,
        vec![StackFrame {
            id: 100,
            name: "main".to_string(),
            source: Some(Source::from_path("/src/main.py")),
            line: 3,
            column: 1,
            presentation_hint: None,
        }],
    );
    world.scopes.insert(
        100,
        vec![Scope {
            name: "Locals".to_string(),
            variables_reference: 200,
            expensive: false,
            ..Scope::default()
        }],
    );
    world.variables.insert(
        200,
        vec![
            Variable {
                name: "x".to_string(),
                value: "3".to_string(),
                variables_reference: 0,
                ..Variable::default()
            },
            Variable {
                name: "items".to_string(),
                value: "list".to_string(),
                variables_reference: 201,
                ..Variable::default()
            },
        ],
    );
    world.variables.insert(
        201,
        vec![Variable {
            name: "[0]".to_string(),
            value: "\"a\"".to_string(),
            variables_reference: 0,
            ..Variable::default()
        }],
    );
    world
}

pub fn spawn_session(
    world: MockWorld,
    breakpoints: BreakpointStore,
) -> (MockAdapter, TestSession, Arc<Mutex<Recording>>) {
    let (adapter, client, events) = MockAdapter::spawn(world);
    let config = AdapterConfig::new(
        "mock",
        LaunchKind::Launch(json!({"program": "/src/main.py"})),
    );
    let (presenter, shared) = RecordingPresenter::new();
    let session = Session::new(client, events, config, breakpoints, presenter);
    (adapter, session, shared)
}

/// Drive the session until the predicate holds, with a hard timeout so a
/// wedged state machine fails instead of hanging the suite.
pub async fn pump_until(
    session: &mut TestSession,
    mut pred: impl FnMut(&TestSession) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !pred(session) {
            let alive = session.pump().await.expect("session pump failed");
            if !alive {
                assert!(
                    pred(session),
                    "session disconnected before reaching the expected state"
                );
                return;
            }
        }
    })
    .await
    .expect("timed out driving the session");
}

pub async fn pump_to_running(session: &mut TestSession) {
    session.start().await.expect("session start failed");
    pump_until(session, |s| s.state() == SessionState::Running).await;
}

/// Stop on the given thread and drive the session through the stop handling.
pub async fn stop_and_settle(adapter: &MockAdapter, session: &mut TestSession, thread_id: i64) {
    adapter.stop(thread_id, "breakpoint");
    pump_until(session, |s| {
        s.state() == SessionState::Stopped && s.current_thread() == Some(thread_id)
    })
    .await;
}
