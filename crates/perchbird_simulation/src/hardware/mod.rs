//! Hardware domain — USB serial соединение и мотор лески
//!
//! ConnectionSession — Resource, вставляется host'ом вместе с драйвером.
//! Без сессии мотор-команды отбрасываются (с логом), птица живёт дальше.

use bevy::prelude::*;

pub mod connection;
pub mod drivers;
pub mod motor;

pub use connection::{ConnectionSession, ConnectionState, DriverError, SerialDriver};
pub use drivers::{DriverCall, DriverJournal, NullDriver, ScriptedDriver};
pub use motor::{send_motor_command, MotorCommand, MotorOutcome, SpinDirection};

/// Команда сессии (UI кнопка "retry", shutdown host'а)
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionCommand {
    Start,
    Retry,
    Close,
}

/// Event: сессия сменила состояние
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStateChanged {
    pub state: ConnectionState,
    pub attempt: u32,
}

/// Система: команды → tick → события переходов
pub fn connection_tick_system(
    session: Option<ResMut<ConnectionSession>>,
    mut commands: EventReader<ConnectionCommand>,
    mut changed_events: EventWriter<ConnectionStateChanged>,
    time: Res<Time<Fixed>>,
) {
    let Some(mut session) = session else {
        for command in commands.read() {
            crate::log_warning(&format!("ConnectionCommand {:?} ignored: no ConnectionSession", command));
        }
        return;
    };

    for command in commands.read() {
        match command {
            ConnectionCommand::Start => session.start(),
            ConnectionCommand::Retry => session.retry(),
            ConnectionCommand::Close => session.close(),
        }
    }

    session.tick(time.delta_secs());

    let attempt = session.attempts();
    for state in session.drain_transitions() {
        crate::log(&format!("🔌 Connection → {:?} (attempt {})", state, attempt));
        changed_events.write(ConnectionStateChanged { state, attempt });
    }
}

/// Hardware Plugin
pub struct HardwarePlugin;

impl Plugin for HardwarePlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<ConnectionCommand>()
            .add_event::<ConnectionStateChanged>()
            .add_systems(FixedUpdate, connection_tick_system.in_set(crate::SimulationSet::Hardware));
    }
}
