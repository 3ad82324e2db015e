//! ConnectionSession — USB serial handshake с ограниченным числом попыток
//!
//! Disconnected → Initializing → WaitingPermission → Connecting → Connected
//! Failed — после max_retries неудачных попыток (до ручного retry).
//!
//! Все паузы — поля с остатком времени, которые уменьшает `tick(dt)`.
//! Ничего не блокирует: один шаг handshake за раз, потом снова ждём.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConnectionConfig;

/// Ошибка драйвера (платформенный USB serial)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("serial driver unavailable: {0}")]
    Unavailable(String),
    #[error("serial initialization rejected at {baud_rate} baud")]
    InitRejected { baud_rate: u32 },
    #[error("no USB serial devices attached")]
    NoDevices,
    #[error("USB permission denied")]
    PermissionDenied,
    #[error("failed to open serial port: {0}")]
    OpenFailed(String),
    #[error("serial write failed: {0}")]
    WriteFailed(String),
    #[error("failed to close serial port: {0}")]
    CloseFailed(String),
}

/// Платформенный serial драйвер (Android USB host, desktop tty, тестовый скрипт)
pub trait SerialDriver: Send + Sync + 'static {
    fn initialize(&mut self, baud_rate: u32) -> Result<(), DriverError>;
    fn device_count(&mut self) -> Result<usize, DriverError>;
    fn request_permission(&mut self) -> Result<(), DriverError>;
    fn open(&mut self) -> Result<(), DriverError>;
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), DriverError>;
    fn close(&mut self) -> Result<(), DriverError>;
}

/// Состояние handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Reflect, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Initializing,
    WaitingPermission,
    Connecting,
    Connected,
    Failed,
}

/// Следующий шаг handshake после паузы
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeStep {
    /// initialize → device_count → request_permission
    Attempt,
    /// re-initialize → open
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingStep {
    remaining: f32,
    step: HandshakeStep,
}

/// Сессия соединения с мотором
///
/// Инвариант: `is_connected()` ⇔ state == Connected.
/// Инвариант: попыток не больше `max_retries` с последнего start/retry.
#[derive(Resource)]
pub struct ConnectionSession {
    driver: Box<dyn SerialDriver>,
    config: ConnectionConfig,
    state: ConnectionState,
    connected: bool,
    attempts: u32,
    pending: Option<PendingStep>,
    transitions: Vec<ConnectionState>,
}

impl ConnectionSession {
    pub fn new(driver: Box<dyn SerialDriver>, config: ConnectionConfig) -> Self {
        Self {
            driver,
            config: config.sanitized(),
            state: ConnectionState::Disconnected,
            connected: false,
            attempts: 0,
            pending: None,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Есть ли запланированный шаг handshake
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Запуск handshake (после startup_delay)
    ///
    /// No-op, если handshake уже идёт или порт открыт.
    pub fn start(&mut self) {
        if self.pending.is_some() || self.connected {
            crate::log(&format!("🔌 Connection start ignored ({:?})", self.state));
            return;
        }

        crate::log(&format!(
            "🔌 Waiting {:.1}s for platform initialization...",
            self.config.startup_delay
        ));
        self.attempts = 0;
        self.schedule(self.config.startup_delay, HandshakeStep::Attempt);
    }

    /// Ручной перезапуск handshake (в т.ч. из Failed)
    pub fn retry(&mut self) {
        crate::log_info("🔌 Manual connection retry");
        self.pending = None;
        self.set_state(ConnectionState::Disconnected);
        self.attempts = 0;
        self.schedule(self.config.startup_delay, HandshakeStep::Attempt);
    }

    /// Закрывает порт; ошибки драйвера только логируются
    pub fn close(&mut self) {
        self.pending = None;
        if let Err(e) = self.driver.close() {
            crate::log_error(&format!("closeSerial error: {}", e));
        } else {
            crate::log("🔌 Serial port closed");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Продвигает паузы; выполняет созревший шаг handshake
    pub fn tick(&mut self, dt: f32) {
        let Some(mut pending) = self.pending.take() else {
            return;
        };

        pending.remaining -= dt;
        if pending.remaining > 0.0 {
            self.pending = Some(pending);
            return;
        }

        match pending.step {
            HandshakeStep::Attempt => self.run_attempt(),
            HandshakeStep::Open => self.run_open(),
        }
    }

    /// Пишет байты в порт
    ///
    /// false — не подключены или драйвер вернул ошибку (ничего не ставится в очередь).
    pub fn write(&mut self, data: &[u8]) -> bool {
        if !self.connected {
            crate::log_warning("Write called but not connected");
            return false;
        }

        match self.driver.write_bytes(data) {
            Ok(()) => {
                crate::log(&format!("Wrote {} bytes", data.len()));
                true
            }
            Err(e) => {
                crate::log_error(&format!("Write error: {}", e));
                false
            }
        }
    }

    /// Переходы состояния с прошлого вызова (для ConnectionStateChanged)
    pub fn drain_transitions(&mut self) -> Vec<ConnectionState> {
        std::mem::take(&mut self.transitions)
    }

    fn run_attempt(&mut self) {
        if self.attempts >= self.config.max_retries {
            self.give_up();
            return;
        }

        self.attempts += 1;
        self.set_state(ConnectionState::Initializing);
        crate::log_info(&format!(
            "=== USB Connection Attempt {}/{} ===",
            self.attempts, self.config.max_retries
        ));

        if let Err(e) = self.driver.initialize(self.config.baud_rate) {
            self.fail_step("Init", e);
            return;
        }

        match self.driver.device_count() {
            Ok(0) => {
                self.fail_step("Device scan", DriverError::NoDevices);
                return;
            }
            Ok(count) => crate::log(&format!("USB devices detected: {}", count)),
            Err(e) => {
                self.fail_step("Device scan", e);
                return;
            }
        }

        self.set_state(ConnectionState::WaitingPermission);
        if let Err(e) = self.driver.request_permission() {
            self.fail_step("Permission", e);
            return;
        }

        // Драйверу нужно время, чтобы обновить список устройств после grant
        self.schedule(self.config.post_permission_delay, HandshakeStep::Open);
    }

    fn run_open(&mut self) {
        // Результат re-init не влияет на попытку
        if let Err(e) = self.driver.initialize(self.config.baud_rate) {
            crate::log_error(&format!("Re-init error: {}", e));
        }

        self.set_state(ConnectionState::Connecting);
        match self.driver.open() {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                crate::log_info(&format!(
                    "✅ USB connection established (attempt {}/{})",
                    self.attempts, self.config.max_retries
                ));
            }
            Err(e) => self.fail_step("Port open", e),
        }
    }

    fn fail_step(&mut self, step: &str, error: DriverError) {
        crate::log_warning(&format!("{} failed: {}", step, error));

        if self.attempts >= self.config.max_retries {
            self.give_up();
            return;
        }

        crate::log(&format!("Retrying in {:.1}s...", self.config.retry_interval));
        self.schedule(self.config.retry_interval, HandshakeStep::Attempt);
    }

    fn give_up(&mut self) {
        self.pending = None;
        self.set_state(ConnectionState::Failed);
        crate::log_error(&format!(
            "❌ Failed to connect after {} attempts",
            self.config.max_retries
        ));
    }

    fn schedule(&mut self, delay: f32, step: HandshakeStep) {
        self.pending = Some(PendingStep {
            remaining: delay.max(0.0),
            step,
        });
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.connected = state == ConnectionState::Connected;
        if self.state != state {
            self.state = state;
            self.transitions.push(state);
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        if let Err(e) = self.driver.close() {
            crate::log_error(&format!("closeSerial error on shutdown: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::drivers::{DriverCall, ScriptedDriver};

    const DT: f32 = 1.0 / 60.0;

    fn config(max_retries: u32) -> ConnectionConfig {
        ConnectionConfig {
            max_retries,
            ..Default::default()
        }
    }

    /// Тикает сессию заданное число секунд
    fn run_for(session: &mut ConnectionSession, seconds: f32) {
        let ticks = (seconds / DT).round() as u32;
        for _ in 0..ticks {
            session.tick(DT);
        }
    }

    #[test]
    fn test_happy_path_connects() {
        let driver = ScriptedDriver::healthy();
        let journal = driver.journal();
        let mut session = ConnectionSession::new(Box::new(driver), config(10));

        session.start();
        run_for(&mut session, 1.4);
        assert_eq!(session.state(), ConnectionState::Disconnected);

        run_for(&mut session, 0.2);
        assert_eq!(session.state(), ConnectionState::WaitingPermission);
        assert!(!session.is_connected());

        run_for(&mut session, 1.1);
        assert_eq!(session.state(), ConnectionState::Connected);
        assert!(session.is_connected());
        assert_eq!(session.attempts(), 1);

        assert_eq!(
            session.drain_transitions(),
            vec![
                ConnectionState::Initializing,
                ConnectionState::WaitingPermission,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );

        // initialize дважды: основной + re-init после permission
        let calls = journal.calls();
        assert_eq!(calls.iter().filter(|c| matches!(c, DriverCall::Initialize(115_200))).count(), 2);
    }

    #[test]
    fn test_open_failures_exhaust_retries() {
        let driver = ScriptedDriver::healthy().with_open_failures(u32::MAX);
        let mut session = ConnectionSession::new(Box::new(driver), config(3));

        session.start();
        run_for(&mut session, 30.0);

        let mut expected = Vec::new();
        for _ in 0..3 {
            expected.extend([
                ConnectionState::Initializing,
                ConnectionState::WaitingPermission,
                ConnectionState::Connecting,
            ]);
        }
        expected.push(ConnectionState::Failed);

        assert_eq!(session.drain_transitions(), expected);
        assert_eq!(session.attempts(), 3);
        assert!(!session.is_connected());
        assert!(!session.is_busy(), "Failed — больше никаких попыток");
    }

    #[test]
    fn test_no_devices_retries_after_interval() {
        let driver = ScriptedDriver::healthy().with_devices(0);
        let mut session = ConnectionSession::new(Box::new(driver), config(10));

        session.start();
        run_for(&mut session, 1.6);
        assert_eq!(session.attempts(), 1);
        assert_eq!(session.state(), ConnectionState::Initializing);

        run_for(&mut session, 1.8);
        assert_eq!(session.attempts(), 1);

        run_for(&mut session, 0.3);
        assert_eq!(session.attempts(), 2);
    }

    #[test]
    fn test_permission_denied_stays_in_waiting_permission() {
        let driver = ScriptedDriver::healthy().with_permission_denied();
        let journal = driver.journal();
        let mut session = ConnectionSession::new(Box::new(driver), config(10));

        session.start();
        run_for(&mut session, 1.6);
        assert_eq!(session.state(), ConnectionState::WaitingPermission);
        assert!(session.is_busy(), "Ждём retry_interval");
        assert!(!journal.calls().contains(&DriverCall::Open));
    }

    #[test]
    fn test_driver_errors_never_escape() {
        let driver = ScriptedDriver::healthy().with_init_error();
        let mut session = ConnectionSession::new(Box::new(driver), config(2));

        session.start();
        run_for(&mut session, 10.0);
        assert_eq!(session.state(), ConnectionState::Failed);
        assert_eq!(session.attempts(), 2);
    }

    #[test]
    fn test_retry_after_failed_restarts_handshake() {
        let driver = ScriptedDriver::healthy().with_open_failures(2);
        let mut session = ConnectionSession::new(Box::new(driver), config(2));

        session.start();
        run_for(&mut session, 20.0);
        assert_eq!(session.state(), ConnectionState::Failed);
        session.drain_transitions();

        session.retry();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.attempts(), 0);

        run_for(&mut session, 5.0);
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.attempts(), 1);
        assert_eq!(session.drain_transitions().first(), Some(&ConnectionState::Disconnected));
    }

    #[test]
    fn test_write_gated_by_connection() {
        let driver = ScriptedDriver::healthy();
        let journal = driver.journal();
        let mut session = ConnectionSession::new(Box::new(driver), config(10));

        assert!(!session.write(&[0x01]));
        assert!(journal.written().is_empty());

        session.start();
        run_for(&mut session, 3.0);
        assert!(session.write(&[0x01]));
        assert_eq!(journal.written(), vec![0x01]);
    }

    #[test]
    fn test_write_error_is_swallowed() {
        let driver = ScriptedDriver::healthy().with_write_error();
        let mut session = ConnectionSession::new(Box::new(driver), config(10));

        session.start();
        run_for(&mut session, 3.0);
        assert!(session.is_connected());
        assert!(!session.write(&[0x02]));
        assert!(session.is_connected(), "Ошибка записи не рвёт сессию");
    }

    #[test]
    fn test_close_and_drop_call_driver() {
        let driver = ScriptedDriver::healthy().with_close_error();
        let journal = driver.journal();
        let mut session = ConnectionSession::new(Box::new(driver), config(10));

        session.start();
        run_for(&mut session, 3.0);
        session.close();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!session.is_connected());

        drop(session);
        let closes = journal.calls().iter().filter(|c| **c == DriverCall::Close).count();
        assert_eq!(closes, 2);
    }

    #[test]
    fn test_start_while_running_is_noop() {
        let mut session = ConnectionSession::new(Box::new(ScriptedDriver::healthy()), config(10));
        session.start();
        run_for(&mut session, 1.0);
        session.start();
        run_for(&mut session, 0.6);
        assert_eq!(session.attempts(), 1);
    }

    #[test]
    fn test_zero_retries_fails_without_attempt() {
        let driver = ScriptedDriver::healthy();
        let journal = driver.journal();
        let mut session = ConnectionSession::new(Box::new(driver), config(0));

        session.start();
        run_for(&mut session, 2.0);
        assert_eq!(session.state(), ConnectionState::Failed);
        assert!(journal.calls().is_empty());
    }
}
