//! Breakpoint declaration, live sync and adapter-initiated updates.

use serde_json::json;

use ember_dap::testing::MockAdapter;
use ember_dap::types::Capabilities;
use ember_debug::{BreakpointStore, ToggleOutcome};

use super::{basic_world, pump_to_running, pump_until, spawn_session};

#[tokio::test]
async fn sync_all_twice_with_unchanged_input_is_idempotent() {
    let (_adapter, client, _events) = MockAdapter::spawn(basic_world());
    let capabilities = Capabilities::default();

    let mut store = BreakpointStore::new();
    store.toggle("/src/main.py", 3);
    store.toggle("/src/main.py", 9);
    store.toggle("/src/other.py", 1);

    store.sync_all(&client, &capabilities).await.expect("first sync failed");
    let first = store.snapshot();
    store.sync_all(&client, &capabilities).await.expect("second sync failed");
    let second = store.snapshot();

    assert_eq!(first, second);
    assert!(first.iter().all(|bp| bp.verified));
}

#[tokio::test]
async fn triple_toggle_at_one_line_ends_with_no_breakpoint() {
    let (adapter, mut session, _shared) = spawn_session(basic_world(), BreakpointStore::new());
    pump_to_running(&mut session).await;

    let outcomes = [
        session.toggle_breakpoint("/src/main.py", 5).await.unwrap(),
        session.toggle_breakpoint("/src/main.py", 5).await.unwrap(),
        session.toggle_breakpoint("/src/main.py", 5).await.unwrap(),
    ];
    assert_eq!(
        outcomes,
        [
            ToggleOutcome::Added,
            ToggleOutcome::Disabled,
            ToggleOutcome::Removed
        ]
    );
    assert!(session.breakpoints().line_breakpoints("/src/main.py").is_empty());
    // Each toggle resynced against the live adapter.
    assert_eq!(adapter.count("setBreakpoints").await, 3);
}

#[tokio::test]
async fn removing_the_last_breakpoint_in_a_file_sends_a_clearing_sync() {
    let mut store = BreakpointStore::new();
    store.toggle("/src/main.py", 3);
    let (adapter, mut session, _shared) = spawn_session(basic_world(), store);
    pump_to_running(&mut session).await;

    session.toggle_breakpoint("/src/main.py", 3).await.unwrap(); // disable
    session.toggle_breakpoint("/src/main.py", 3).await.unwrap(); // remove

    // The launch replay plus one resync per toggle; the last two push an
    // empty set so the adapter disarms the deleted breakpoint.
    let sync = adapter.requests_for("setBreakpoints").await;
    assert_eq!(sync.len(), 3);
    for request in &sync[1..] {
        let sent = request.arguments.as_ref().unwrap()["breakpoints"]
            .as_array()
            .unwrap()
            .len();
        assert_eq!(sent, 0);
    }

    // Once cleared, the file drops out of later syncs entirely.
    session.toggle_breakpoint("/src/other.py", 1).await.unwrap();
    let sync = adapter.requests_for("setBreakpoints").await;
    assert_eq!(sync.len(), 4);
    assert_eq!(
        sync[3].arguments.as_ref().unwrap()["source"]["path"],
        "/src/other.py"
    );
}

#[tokio::test]
async fn removing_the_last_function_breakpoint_sends_a_clearing_sync() {
    let (adapter, client, _events) = MockAdapter::spawn(basic_world());
    let capabilities = Capabilities {
        supports_function_breakpoints: Some(true),
        ..Capabilities::default()
    };

    let mut store = BreakpointStore::new();
    store.add_function_breakpoint("main");
    store.sync_all(&client, &capabilities).await.expect("arming sync failed");

    store.remove_function_breakpoint("main");
    store.sync_all(&client, &capabilities).await.expect("clearing sync failed");

    let sync = adapter.requests_for("setFunctionBreakpoints").await;
    assert_eq!(sync.len(), 2);
    let cleared = sync[1].arguments.as_ref().unwrap()["breakpoints"]
        .as_array()
        .unwrap()
        .len();
    assert_eq!(cleared, 0);

    // Nothing armed and nothing declared: later syncs skip the request.
    store.sync_all(&client, &capabilities).await.expect("idle sync failed");
    assert_eq!(adapter.count("setFunctionBreakpoints").await, 2);
}

#[tokio::test]
async fn disabled_breakpoints_are_withheld_from_the_adapter_but_kept() {
    let mut store = BreakpointStore::new();
    store.toggle("/src/main.py", 3);
    store.toggle("/src/main.py", 9);
    store.toggle("/src/main.py", 9); // disable

    let (adapter, mut session, _shared) = spawn_session(basic_world(), store);
    pump_to_running(&mut session).await;

    let sync = adapter.requests_for("setBreakpoints").await;
    assert_eq!(sync.len(), 1);
    let lines: Vec<u64> = sync[0].arguments.as_ref().unwrap()["breakpoints"]
        .as_array()
        .unwrap()
        .iter()
        .map(|bp| bp["line"].as_u64().unwrap())
        .collect();
    assert_eq!(lines, [3]);

    let bps = session.breakpoints().line_breakpoints("/src/main.py");
    assert!(bps[0].enabled() && bps[0].verified);
    assert!(!bps[1].enabled() && !bps[1].verified);
}

#[tokio::test]
async fn rejected_lines_come_back_unverified_with_the_adapter_message() {
    let mut world = basic_world();
    world.reject_lines.insert(12);
    let mut store = BreakpointStore::new();
    store.toggle("/src/main.py", 3);
    store.toggle("/src/main.py", 12);

    let (_adapter, mut session, _shared) = spawn_session(world, store);
    pump_to_running(&mut session).await;

    let bps = session.breakpoints().line_breakpoints("/src/main.py");
    assert!(bps[0].verified);
    assert!(!bps[1].verified);
    assert_eq!(bps[1].message.as_deref(), Some("breakpoint rejected"));
}

#[tokio::test]
async fn adapter_breakpoint_events_update_by_id_and_report_unknown_reasons() {
    let mut store = BreakpointStore::new();
    store.toggle("/src/main.py", 3);
    let (adapter, mut session, shared) = spawn_session(basic_world(), store);
    pump_to_running(&mut session).await;
    // The mock assigns line-derived ids, so the breakpoint at line 3 has id 3.
    assert_eq!(
        session.breakpoints().line_breakpoints("/src/main.py")[0].id,
        Some(3)
    );

    adapter.emit(
        "breakpoint",
        Some(json!({
            "reason": "changed",
            "breakpoint": {"id": 3, "verified": false, "line": 4},
        })),
    );
    pump_until(&mut session, |s| {
        !s.breakpoints().line_breakpoints("/src/main.py")[0].verified
    })
    .await;
    assert_eq!(
        session.breakpoints().line_breakpoints("/src/main.py")[0].adapter_line,
        Some(4)
    );

    adapter.emit(
        "breakpoint",
        Some(json!({
            "reason": "migrated",
            "breakpoint": {"id": 3, "verified": true},
        })),
    );
    pump_until(&mut session, |_| {
        shared.lock().unwrap().saw_message("migrated")
    })
    .await;
    assert!(shared.lock().unwrap().saw_message("unrecognized breakpoint event reason"));
}

#[tokio::test]
async fn function_breakpoints_sync_when_the_adapter_supports_them() {
    let mut store = BreakpointStore::new();
    store.add_function_breakpoint("main");
    let (adapter, mut session, _shared) = spawn_session(basic_world(), store);
    pump_to_running(&mut session).await;

    let sync = adapter.requests_for("setFunctionBreakpoints").await;
    assert_eq!(sync.len(), 1);
    assert_eq!(
        sync[0].arguments.as_ref().unwrap()["breakpoints"][0]["name"],
        "main"
    );
    let views = session.breakpoints().snapshot();
    let function = views.iter().find(|v| v.function.is_some()).unwrap();
    assert!(function.verified);
}
