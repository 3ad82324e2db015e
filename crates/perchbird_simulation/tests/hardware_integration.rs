//! Integration тесты USB serial сессии через ECS (ConnectionCommand → события)

use bevy::prelude::*;
use perchbird_simulation::hardware::{NullDriver, ScriptedDriver};
use perchbird_simulation::{
    create_headless_app, run_fixed_ticks, ConnectionCommand, ConnectionConfig, ConnectionSession, ConnectionState,
    ConnectionStateChanged,
};

fn drain_states(app: &mut App) -> Vec<ConnectionState> {
    app.world_mut()
        .resource_mut::<Events<ConnectionStateChanged>>()
        .drain()
        .map(|event| event.state)
        .collect()
}

#[test]
fn test_start_command_connects() {
    let mut app = create_headless_app(42);
    app.world_mut().insert_resource(ConnectionSession::new(
        Box::new(ScriptedDriver::healthy()),
        ConnectionConfig::default(),
    ));

    app.world_mut().send_event(ConnectionCommand::Start);
    run_fixed_ticks(app.world_mut(), 180);

    assert_eq!(
        drain_states(&mut app),
        vec![
            ConnectionState::Initializing,
            ConnectionState::WaitingPermission,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );

    app.world_mut().send_event(ConnectionCommand::Close);
    run_fixed_ticks(app.world_mut(), 1);
    assert_eq!(drain_states(&mut app), vec![ConnectionState::Disconnected]);
    assert!(!app.world().resource::<ConnectionSession>().is_connected());
}

#[test]
fn test_null_driver_fails_then_manual_retry_restarts() {
    let mut app = create_headless_app(42);
    let config = ConnectionConfig {
        max_retries: 2,
        ..Default::default()
    };
    app.world_mut()
        .insert_resource(ConnectionSession::new(Box::new(NullDriver), config));

    app.world_mut().send_event(ConnectionCommand::Start);
    run_fixed_ticks(app.world_mut(), 600);
    assert_eq!(drain_states(&mut app), vec![ConnectionState::Initializing, ConnectionState::Failed]);

    app.world_mut().send_event(ConnectionCommand::Retry);
    run_fixed_ticks(app.world_mut(), 120);
    assert_eq!(
        drain_states(&mut app),
        vec![ConnectionState::Disconnected, ConnectionState::Initializing]
    );
    assert_eq!(app.world().resource::<ConnectionSession>().attempts(), 1);
}

#[test]
fn test_commands_without_session_are_ignored() {
    let mut app = create_headless_app(42);
    app.world_mut().send_event(ConnectionCommand::Retry);
    run_fixed_ticks(app.world_mut(), 10);

    assert!(drain_states(&mut app).is_empty());
}
