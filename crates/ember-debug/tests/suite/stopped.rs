//! Stop handling: thread resolution, frame selection and pane refreshes.

use serde_json::json;

use ember_dap::types::{Scope, Source, StackFrame, Thread, Variable};
use ember_debug::{BreakpointStore, SessionState};

use super::{basic_world, pump_to_running, pump_until, spawn_session, stop_and_settle};

#[tokio::test]
async fn stopped_event_sets_the_thread_and_issues_exactly_one_stack_trace() {
    let mut world = basic_world();
    world.threads = vec![Thread {
        id: 7,
        name: "worker".to_string(),
    }];
    world.frames.insert(
        7,
        vec![StackFrame {
            id: 700,
            name: "work".to_string(),
            source: Some(Source::from_path("/src/worker.py")),
            line: 21,
            column: 1,
            presentation_hint: None,
        }],
    );
    let (adapter, mut session, _shared) = spawn_session(world, BreakpointStore::new());
    pump_to_running(&mut session).await;
    assert_eq!(session.current_thread(), None);

    stop_and_settle(&adapter, &mut session, 7).await;

    assert_eq!(session.current_thread(), Some(7));
    let traces = adapter.requests_for("stackTrace").await;
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].arguments.as_ref().unwrap()["threadId"], 7);

    let frame = session.current_frame().expect("no frame selected");
    assert_eq!(frame.path.as_ref().unwrap().to_str(), Some("/src/worker.py"));
    assert_eq!(frame.line, 21);

    // The stopped thread's node is pre-expanded with its frames.
    let tree = session.thread_tree();
    assert!(tree[0].expanded);
    assert_eq!(tree[0].children.as_ref().unwrap()[0].label, "work");
}

#[tokio::test]
async fn stop_on_a_thread_missing_from_the_baseline_reloads_the_list_once() {
    let mut world = basic_world();
    world.threads = Vec::new();
    let (adapter, mut session, _shared) = spawn_session(world, BreakpointStore::new());
    pump_to_running(&mut session).await;
    let baseline_fetches = adapter.count("threads").await;

    adapter
        .update_world(|world| {
            world.threads = vec![Thread {
                id: 1,
                name: "main".to_string(),
            }]
        })
        .await;
    stop_and_settle(&adapter, &mut session, 1).await;

    assert_eq!(adapter.count("threads").await, baseline_fetches + 1);
    assert_eq!(adapter.count("stackTrace").await, 1);
    assert_eq!(session.threads().len(), 1);
}

#[tokio::test]
async fn expanding_another_thread_fetches_its_frames_on_demand() {
    let mut world = basic_world();
    world.threads.push(Thread {
        id: 7,
        name: "worker".to_string(),
    });
    world.frames.insert(
        7,
        vec![StackFrame {
            id: 700,
            name: "work".to_string(),
            source: Some(Source::from_path("/src/worker.py")),
            line: 21,
            column: 1,
            presentation_hint: None,
        }],
    );
    let (adapter, mut session, _shared) = spawn_session(world, BreakpointStore::new());
    pump_to_running(&mut session).await;
    stop_and_settle(&adapter, &mut session, 1).await;
    assert_eq!(adapter.count("stackTrace").await, 1);

    // Only the stopped thread came pre-expanded; the other one loads when
    // the user opens it.
    assert!(!session.thread_tree()[1].expanded);
    session.toggle_thread(&[1]).await.unwrap();

    let tree = session.thread_tree();
    assert!(tree[1].expanded);
    assert_eq!(tree[1].children.as_ref().unwrap()[0].label, "work");
    let traces = adapter.requests_for("stackTrace").await;
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[1].arguments.as_ref().unwrap()["threadId"], 7);
}

#[tokio::test]
async fn stop_without_a_thread_id_falls_back_to_the_first_known_thread() {
    let (adapter, mut session, _shared) = spawn_session(basic_world(), BreakpointStore::new());
    pump_to_running(&mut session).await;

    adapter.emit("stopped", Some(json!({"reason": "pause", "allThreadsStopped": true})));
    pump_until(&mut session, |s| s.current_thread().is_some()).await;
    assert_eq!(session.current_thread(), Some(1));
}

#[tokio::test]
async fn variables_pane_expansion_survives_a_continue_stop_cycle() {
    let (adapter, mut session, _shared) = spawn_session(basic_world(), BreakpointStore::new());
    pump_to_running(&mut session).await;
    stop_and_settle(&adapter, &mut session, 1).await;

    // Drill into Locals, then into the list inside it.
    session.toggle_variable(&[0]).await.unwrap();
    session.toggle_variable(&[0, 1]).await.unwrap();
    assert_eq!(adapter.count("variables").await, 2);

    // Step forward: the debuggee mutates x.
    adapter
        .update_world(|world| {
            world.variables.insert(
                200,
                vec![
                    Variable {
                        name: "x".to_string(),
                        value: "4".to_string(),
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
        })
        .await;
    session.continue_execution().await.unwrap();
    pump_until(&mut session, |s| s.state() == SessionState::Running).await;
    stop_and_settle(&adapter, &mut session, 1).await;

    let locals = &session.variable_tree()[0];
    assert!(locals.expanded, "Locals collapsed after the stop");
    let children = locals.children.as_ref().expect("Locals not reloaded");
    assert_eq!(children[0].value, "4");
    assert!(children[1].expanded, "nested node lost its expansion");
    assert_eq!(
        children[1].children.as_ref().unwrap()[0].label,
        "[0]"
    );
    // Two refetches for the reconciliation (Locals and the nested list).
    assert_eq!(adapter.count("variables").await, 4);
}

#[tokio::test]
async fn scope_rename_defaults_back_to_collapsed() {
    let (adapter, mut session, _shared) = spawn_session(basic_world(), BreakpointStore::new());
    pump_to_running(&mut session).await;
    stop_and_settle(&adapter, &mut session, 1).await;
    session.toggle_variable(&[0]).await.unwrap();

    adapter
        .update_world(|world| {
            world.scopes.insert(
                100,
                vec![Scope {
                    name: "Registers".to_string(),
                    variables_reference: 300,
                    expensive: false,
                    ..Scope::default()
                }],
            );
        })
        .await;
    session.continue_execution().await.unwrap();
    stop_and_settle(&adapter, &mut session, 1).await;

    let root = &session.variable_tree()[0];
    assert_eq!(root.label, "Registers");
    assert!(!root.expanded);
    assert!(root.children.is_none());
}

#[tokio::test]
async fn frames_with_only_a_source_reference_fetch_the_source_text() {
    let mut world = basic_world();
    world.frames.insert(
        1,
        vec![StackFrame {
            id: 100,
            name: "eval".to_string(),
            source: Some(Source {
                name: Some("<generated>".to_string()),
                path: None,
                source_reference: Some(55),
                presentation_hint: None,
            }),
            line: 2,
            column: 1,
            presentation_hint: None,
        }],
    );
    world.sources.insert(55, "print('hi')\n".to_string());
    let (adapter, mut session, _shared) = spawn_session(world, BreakpointStore::new());
    pump_to_running(&mut session).await;
    stop_and_settle(&adapter, &mut session, 1).await;

    assert_eq!(adapter.count("source").await, 1);
    let frame = session.current_frame().expect("no frame selected");
    assert_eq!(frame.path, None);
    assert_eq!(frame.source_content.as_deref(), Some("print('hi')\n"));
}

#[tokio::test]
async fn step_without_a_current_thread_is_a_local_no_op() {
    let (adapter, mut session, shared) = spawn_session(basic_world(), BreakpointStore::new());
    pump_to_running(&mut session).await;

    session.step(ember_debug::StepKind::Over).await.unwrap();
    assert!(shared.lock().unwrap().saw_message("no current thread"));
    assert_eq!(adapter.count("next").await, 0);
}

#[tokio::test]
async fn continue_clears_the_frame_selection() {
    let (adapter, mut session, _shared) = spawn_session(basic_world(), BreakpointStore::new());
    pump_to_running(&mut session).await;
    stop_and_settle(&adapter, &mut session, 1).await;
    assert!(session.current_frame().is_some());

    session.continue_execution().await.unwrap();
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.current_frame().is_none());
    assert_eq!(adapter.count("continue").await, 1);
}
