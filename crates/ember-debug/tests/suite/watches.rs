//! Watch expressions: per-stop re-evaluation and expandable results.

use serde_json::json;

use ember_debug::{BreakpointStore, SessionState};

use super::{basic_world, pump_to_running, pump_until, spawn_session, stop_and_settle};

#[tokio::test]
async fn watches_reevaluate_on_every_stop() {
    let mut world = basic_world();
    world
        .evaluations
        .insert("x".to_string(), json!({"result": "3", "variablesReference": 0}));
    let (adapter, mut session, _shared) = spawn_session(world, BreakpointStore::new());
    pump_to_running(&mut session).await;

    session.add_watch("x").await.unwrap();
    stop_and_settle(&adapter, &mut session, 1).await;
    assert_eq!(session.watch_tree()[0].label, "x");
    assert_eq!(session.watch_tree()[0].value, "3");

    adapter
        .update_world(|world| {
            world
                .evaluations
                .insert("x".to_string(), json!({"result": "4", "variablesReference": 0}));
        })
        .await;
    session.continue_execution().await.unwrap();
    stop_and_settle(&adapter, &mut session, 1).await;

    assert_eq!(session.watch_tree()[0].value, "4");
    let evaluates = adapter.requests_for("evaluate").await;
    assert_eq!(evaluates.len(), 2);
    // Watch evaluations carry the watch context and the selected frame.
    assert_eq!(evaluates[0].arguments.as_ref().unwrap()["context"], "watch");
    assert_eq!(evaluates[0].arguments.as_ref().unwrap()["frameId"], 100);
}

#[tokio::test]
async fn failed_watch_shows_the_reason_as_its_value() {
    let (adapter, mut session, _shared) = spawn_session(basic_world(), BreakpointStore::new());
    pump_to_running(&mut session).await;
    session.add_watch("boom").await.unwrap();
    stop_and_settle(&adapter, &mut session, 1).await;

    let watch = &session.watch_tree()[0];
    assert_eq!(watch.label, "boom");
    assert!(watch.value.contains("cannot evaluate"), "{}", watch.value);
    assert!(!watch.is_expandable());
}

#[tokio::test]
async fn expanded_watch_results_survive_stops() {
    let mut world = basic_world();
    world.evaluations.insert(
        "items".to_string(),
        json!({"result": "list", "variablesReference": 201}),
    );
    let (adapter, mut session, _shared) = spawn_session(world, BreakpointStore::new());
    pump_to_running(&mut session).await;
    session.add_watch("items").await.unwrap();
    stop_and_settle(&adapter, &mut session, 1).await;

    session.toggle_watch(&[0]).await.unwrap();
    assert!(session.watch_tree()[0].expanded);

    session.continue_execution().await.unwrap();
    pump_until(&mut session, |s| s.state() == SessionState::Running).await;
    stop_and_settle(&adapter, &mut session, 1).await;

    let watch = &session.watch_tree()[0];
    assert!(watch.expanded, "watch collapsed after the stop");
    assert_eq!(watch.children.as_ref().unwrap()[0].label, "[0]");
}

#[tokio::test]
async fn removed_watches_are_not_reevaluated_on_later_stops() {
    let mut world = basic_world();
    world
        .evaluations
        .insert("a".to_string(), json!({"result": "1", "variablesReference": 0}));
    world
        .evaluations
        .insert("b".to_string(), json!({"result": "2", "variablesReference": 0}));
    let (adapter, mut session, _shared) = spawn_session(world, BreakpointStore::new());
    pump_to_running(&mut session).await;
    session.add_watch("a").await.unwrap();
    session.add_watch("b").await.unwrap();
    stop_and_settle(&adapter, &mut session, 1).await;
    assert_eq!(adapter.count("evaluate").await, 2);

    // Removing while stopped re-evaluates the remaining expressions.
    session.remove_watch(0).await.unwrap();
    assert_eq!(session.watch_tree().len(), 1);
    assert_eq!(session.watch_tree()[0].label, "b");
    assert_eq!(adapter.count("evaluate").await, 3);

    session.continue_execution().await.unwrap();
    stop_and_settle(&adapter, &mut session, 1).await;

    assert_eq!(adapter.count("evaluate").await, 4);
    let last = adapter.requests_for("evaluate").await.pop().unwrap();
    assert_eq!(last.arguments.as_ref().unwrap()["expression"], "b");
}

#[tokio::test]
async fn watch_order_is_user_order_not_adapter_order() {
    let mut world = basic_world();
    world
        .evaluations
        .insert("b".to_string(), json!({"result": "2", "variablesReference": 0}));
    world
        .evaluations
        .insert("a".to_string(), json!({"result": "1", "variablesReference": 0}));
    let (adapter, mut session, _shared) = spawn_session(world, BreakpointStore::new());
    pump_to_running(&mut session).await;
    session.add_watch("b").await.unwrap();
    session.add_watch("a").await.unwrap();
    stop_and_settle(&adapter, &mut session, 1).await;

    let labels: Vec<&str> = session
        .watch_tree()
        .iter()
        .map(|node| node.label.as_str())
        .collect();
    assert_eq!(labels, ["b", "a"]);
}
