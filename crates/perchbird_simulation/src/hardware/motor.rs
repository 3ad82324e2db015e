//! Мотор лески: однобайтовый протокол поверх ConnectionSession
//!
//! 0x01 — намотка (Forward), 0x02 — размотка (Backward), 0x00 — стоп.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::connection::ConnectionSession;

/// Команда мотору (один байт на кадр)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize)]
#[repr(u8)]
pub enum MotorCommand {
    Stop = 0x00,
    Forward = 0x01,
    Backward = 0x02,
}

impl MotorCommand {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn frame(self) -> [u8; 1] {
        [self.as_byte()]
    }
}

/// Направление вращения (ручное управление и entry/exit actions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize)]
pub enum SpinDirection {
    Forward,
    Backward,
}

impl From<SpinDirection> for MotorCommand {
    fn from(direction: SpinDirection) -> Self {
        match direction {
            SpinDirection::Forward => MotorCommand::Forward,
            SpinDirection::Backward => MotorCommand::Backward,
        }
    }
}

/// Чем закончилась отправка
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorOutcome {
    Sent,
    /// Сессии нет (host не вставил ConnectionSession)
    NoSession,
    /// Не подключены — команда отброшена, очереди нет
    NotConnected,
    /// Драйвер вернул ошибку записи
    WriteFailed,
}

/// Отправляет команду мотору, если соединение живо
pub fn send_motor_command(session: Option<&mut ConnectionSession>, command: MotorCommand) -> MotorOutcome {
    let Some(session) = session else {
        crate::log_error(&format!("Motor {:?}: USB session not assigned", command));
        return MotorOutcome::NoSession;
    };

    if !session.is_connected() {
        crate::log_warning(&format!("USB not connected, cannot send motor {:?}", command));
        return MotorOutcome::NotConnected;
    }

    if session.write(&command.frame()) {
        crate::log(&format!("⚙️ Motor {:?} (0x{:02X})", command, command.as_byte()));
        MotorOutcome::Sent
    } else {
        MotorOutcome::WriteFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::hardware::drivers::ScriptedDriver;

    fn connected_session(driver: ScriptedDriver) -> ConnectionSession {
        let mut session = ConnectionSession::new(Box::new(driver), ConnectionConfig::default());
        session.start();
        for _ in 0..200 {
            session.tick(1.0 / 60.0);
        }
        session
    }

    #[test]
    fn test_command_bytes() {
        assert_eq!(MotorCommand::Stop.frame(), [0x00]);
        assert_eq!(MotorCommand::Forward.frame(), [0x01]);
        assert_eq!(MotorCommand::Backward.frame(), [0x02]);
        assert_eq!(MotorCommand::from(SpinDirection::Backward), MotorCommand::Backward);
    }

    #[test]
    fn test_no_session() {
        assert_eq!(send_motor_command(None, MotorCommand::Forward), MotorOutcome::NoSession);
    }

    #[test]
    fn test_disconnected_session_drops_command() {
        let driver = ScriptedDriver::healthy();
        let journal = driver.journal();
        let mut session = ConnectionSession::new(Box::new(driver), ConnectionConfig::default());

        assert_eq!(
            send_motor_command(Some(&mut session), MotorCommand::Forward),
            MotorOutcome::NotConnected
        );
        assert!(journal.written().is_empty());
    }

    #[test]
    fn test_connected_session_writes_frame() {
        let driver = ScriptedDriver::healthy();
        let journal = driver.journal();
        let mut session = connected_session(driver);

        assert_eq!(send_motor_command(Some(&mut session), MotorCommand::Backward), MotorOutcome::Sent);
        assert_eq!(send_motor_command(Some(&mut session), MotorCommand::Stop), MotorOutcome::Sent);
        assert_eq!(journal.written(), vec![0x02, 0x00]);
    }

    #[test]
    fn test_write_failure_reported() {
        let mut session = connected_session(ScriptedDriver::healthy().with_write_error());
        assert_eq!(
            send_motor_command(Some(&mut session), MotorCommand::Forward),
            MotorOutcome::WriteFailed
        );
    }
}
