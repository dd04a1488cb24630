mod common;

use std::time::Duration;
use bisecur2mqtt::controllers::CommandReply;
use bisecur2mqtt::models::{Action, DoorState};
use bisecur2mqtt::monitoring::MonitorExit;
use common::Harness;

#[tokio::test(start_paused = true)]
async fn up_tracks_the_door_until_it_is_open() {
    let harness = Harness::logged_in().await;
    {
        let mut script = harness.script.lock();
        script.set_state_position = Some(40);
        script.positions(0, [60, 80, 100, 100]);
    }

    let reply = harness.dispatch("up", 0).await;
    assert!(matches!(reply, Some(CommandReply::Response(_))), "up should return the gateway response");

    let exits = harness.join_monitors().await;
    assert_eq!(exits, vec![MonitorExit::Settled(DoorState::Open)]);
    assert_eq!(harness.script.lock().transition_calls.len(), 4);
    assert_eq!(harness.script.lock().set_state_calls, vec![0]);

    let positions = harness.sink.payloads("garage_door/0/position");
    assert_eq!(positions.first().map(String::as_str), Some("40"), "seed position is published first");
    assert_eq!(positions.last().map(String::as_str), Some("100"));
    assert!(harness.sink.payloads("garage_door/0/state").contains(&"opening".to_string()));
    assert_eq!(harness.sink.last("garage_door/0/state").as_deref(), Some("open"));
    assert_eq!(harness.context.registry.last_state(0), DoorState::Open);
    assert_eq!(harness.context.registry.get(0).last_position, 100);
}

#[tokio::test(start_paused = true)]
async fn down_tracks_the_door_until_it_is_closed() {
    let harness = Harness::logged_in().await;
    {
        let mut script = harness.script.lock();
        script.set_state_position = Some(60);
        script.positions(1, [30, 0, 0]);
    }

    harness.dispatch("close", 1).await;

    let exits = harness.join_monitors().await;
    assert_eq!(exits, vec![MonitorExit::Settled(DoorState::Closed)]);
    assert_eq!(harness.sink.last("garage_door/1/state").as_deref(), Some("closed"));
    assert_eq!(harness.context.registry.last_state(1), DoorState::Closed);
}

#[tokio::test(start_paused = true)]
async fn constant_position_settles_after_one_confirming_read() {
    let harness = Harness::logged_in().await;
    {
        let mut script = harness.script.lock();
        script.set_state_position = Some(40);
        script.positions(0, [40]);
    }

    harness.dispatch("impulse", 0).await;

    let exits = harness.join_monitors().await;
    assert_eq!(exits, vec![MonitorExit::Settled(DoorState::Unknown)]);
    assert_eq!(harness.script.lock().transition_calls.len(), 1);
    assert_eq!(harness.context.registry.last_state(0), DoorState::Unknown);
}

#[tokio::test(start_paused = true)]
async fn a_new_command_supersedes_the_running_tracker() {
    let harness = Harness::logged_in().await;
    {
        let mut script = harness.script.lock();
        script.set_state_position = Some(40);
        script.positions(0, [50, 30, 0, 0]);
    }

    harness.dispatch("up", 0).await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(harness.context.registry.last_state(0), DoorState::Opening);

    harness.dispatch("down", 0).await;
    let exits = harness.join_monitors().await;
    assert_eq!(exits, vec![MonitorExit::Settled(DoorState::Closed)], "only the newest tracker is attached");
    assert_eq!(harness.script.lock().set_state_calls, vec![0, 0]);
    assert_eq!(harness.context.registry.last_state(0), DoorState::Closed);
    assert_eq!(harness.sink.last("garage_door/0/state").as_deref(), Some("closed"));
}

#[tokio::test(start_paused = true)]
async fn the_superseded_tracker_ends_before_the_new_one_publishes() {
    let harness = Harness::logged_in().await;
    {
        let mut script = harness.script.lock();
        script.set_state_position = Some(40);
        script.positions(0, [50, 30, 0, 0]);
    }

    harness.dispatch("up", 0).await;
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let previous = harness.context.tracker.supersede(0, 30, Action::Down).await;
    assert_eq!(previous, Some(MonitorExit::Cancelled(DoorState::Opening)));
    let handover = harness.sink.messages.lock().len();

    let exits = harness.join_monitors().await;
    assert_eq!(exits, vec![MonitorExit::Settled(DoorState::Closed)]);

    let messages = harness.sink.messages.lock();
    let door_topic = format!("{}/garage_door/0/", common::BASE);
    let before: Vec<_> = messages[..handover].iter().filter(|m| m.topic.starts_with(&door_topic)).collect();
    let after: Vec<_> = messages[handover..].iter().filter(|m| m.topic.starts_with(&door_topic)).collect();
    assert!(before.iter().any(|m| m.payload == "opening"), "the old tracker was following the door");
    assert_eq!(after[0].topic, format!("{}position", door_topic));
    assert_eq!(after[0].payload, "30", "the new tracker starts with its seed position");
    assert!(after.iter().all(|m| m.payload != "opening"), "nothing from the old tracker follows the handover");
}

#[tokio::test(start_paused = true)]
async fn stop_without_known_direction_is_ignored() {
    let harness = Harness::logged_in().await;

    let reply = harness.dispatch("stop", 0).await;

    match reply {
        Some(CommandReply::Message(message)) => {
            assert!(message.contains("Ignoring 'stop' command"), "unexpected message: {}", message)
        }
        other => panic!("expected a warning message, got {:?}", other),
    }
    assert!(harness.script.lock().set_state_calls.is_empty());
    assert!(harness.join_monitors().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_reverses_an_opening_door() {
    let harness = Harness::logged_in().await;
    let registry = &harness.context.registry;
    let generation = registry.next_generation(0);
    registry.record_reading(0, generation, 50, DoorState::Opening);
    {
        let mut script = harness.script.lock();
        script.set_state_position = Some(50);
        script.positions(0, [20, 0, 0]);
    }

    harness.dispatch("stop", 0).await;

    let monitors = registry.take_monitors().await;
    assert_eq!(monitors.len(), 1);
    assert_eq!(monitors[0].action, Action::Down);
    assert_eq!(harness.script.lock().set_state_calls, vec![0]);
    for monitor in monitors {
        assert_eq!(monitor.join().await, Some(MonitorExit::Settled(DoorState::Closed)));
    }
}

#[tokio::test(start_paused = true)]
async fn stop_reverses_a_closing_door() {
    let harness = Harness::logged_in().await;
    let registry = &harness.context.registry;
    let generation = registry.next_generation(1);
    registry.record_reading(1, generation, 50, DoorState::Closing);
    {
        let mut script = harness.script.lock();
        script.set_state_position = Some(50);
        script.positions(1, [80, 100, 100]);
    }

    harness.dispatch("stop", 1).await;

    let monitors = registry.take_monitors().await;
    assert_eq!(monitors.iter().map(|m| m.action).collect::<Vec<_>>(), vec![Action::Up]);
}

#[tokio::test(start_paused = true)]
async fn a_door_that_never_settles_times_out() {
    let mut settings = common::create_mock_settings();
    settings.doors.max_tracking_polls = 3;
    let harness = Harness::new(settings);
    harness.context.session.initialize(false).await.unwrap();
    {
        let mut script = harness.script.lock();
        script.set_state_position = Some(40);
        script.positions(0, [40]);
    }

    harness.dispatch("up", 0).await;

    let exits = harness.join_monitors().await;
    assert_eq!(exits, vec![MonitorExit::TimedOut(DoorState::Unknown)]);
    assert_eq!(harness.script.lock().transition_calls.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_status_read_ends_tracking() {
    let harness = Harness::logged_in().await;
    {
        let mut script = harness.script.lock();
        script.set_state_position = Some(40);
        script.script(0, [common::Step::ErrorFrame(10)]);
    }

    harness.dispatch("up", 0).await;

    let exits = harness.join_monitors().await;
    assert_eq!(exits, vec![MonitorExit::GatewayError(DoorState::Unset)]);
    assert_eq!(harness.script.lock().transition_calls.len(), 5, "retries stop at the ceiling");
}
