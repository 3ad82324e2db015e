//! Встроенные SerialDriver'ы
//!
//! - NullDriver: платформа без USB host (desktop/editor) — всё Unavailable
//! - ScriptedDriver: headless демо и тесты, сценарий отказов + журнал вызовов

use std::sync::{Arc, Mutex};

use super::connection::{DriverError, SerialDriver};

/// Драйвер для платформ без USB serial
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDriver;

impl NullDriver {
    fn unavailable() -> DriverError {
        DriverError::Unavailable("USB serial is only active on device".to_string())
    }
}

impl SerialDriver for NullDriver {
    fn initialize(&mut self, _baud_rate: u32) -> Result<(), DriverError> {
        Err(Self::unavailable())
    }

    fn device_count(&mut self) -> Result<usize, DriverError> {
        Err(Self::unavailable())
    }

    fn request_permission(&mut self) -> Result<(), DriverError> {
        Err(Self::unavailable())
    }

    fn open(&mut self) -> Result<(), DriverError> {
        Err(Self::unavailable())
    }

    fn write_bytes(&mut self, _data: &[u8]) -> Result<(), DriverError> {
        Err(Self::unavailable())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Вызов драйвера (для проверок в тестах)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Initialize(u32),
    DeviceCount,
    RequestPermission,
    Open,
    Write(Vec<u8>),
    Close,
}

/// Общий журнал вызовов: драйвер уходит в ConnectionSession, журнал остаётся у теста
#[derive(Debug, Default, Clone)]
pub struct DriverJournal {
    calls: Arc<Mutex<Vec<DriverCall>>>,
}

impl DriverJournal {
    fn record(&self, call: DriverCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Все успешно записанные байты подряд
    pub fn written(&self) -> Vec<u8> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Write(bytes) => Some(bytes),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// Драйвер со сценарием отказов
#[derive(Debug, Clone)]
pub struct ScriptedDriver {
    init_ok: bool,
    devices: usize,
    permission: bool,
    /// Сколько open() подряд провалится перед успехом
    open_failures: u32,
    write_ok: bool,
    close_ok: bool,
    journal: DriverJournal,
}

impl ScriptedDriver {
    /// Всё проходит с первой попытки
    pub fn healthy() -> Self {
        Self {
            init_ok: true,
            devices: 1,
            permission: true,
            open_failures: 0,
            write_ok: true,
            close_ok: true,
            journal: DriverJournal::default(),
        }
    }

    pub fn with_init_error(mut self) -> Self {
        self.init_ok = false;
        self
    }

    pub fn with_devices(mut self, devices: usize) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_permission_denied(mut self) -> Self {
        self.permission = false;
        self
    }

    pub fn with_open_failures(mut self, failures: u32) -> Self {
        self.open_failures = failures;
        self
    }

    pub fn with_write_error(mut self) -> Self {
        self.write_ok = false;
        self
    }

    pub fn with_close_error(mut self) -> Self {
        self.close_ok = false;
        self
    }

    pub fn journal(&self) -> DriverJournal {
        self.journal.clone()
    }
}

impl SerialDriver for ScriptedDriver {
    fn initialize(&mut self, baud_rate: u32) -> Result<(), DriverError> {
        self.journal.record(DriverCall::Initialize(baud_rate));
        if self.init_ok {
            Ok(())
        } else {
            Err(DriverError::InitRejected { baud_rate })
        }
    }

    fn device_count(&mut self) -> Result<usize, DriverError> {
        self.journal.record(DriverCall::DeviceCount);
        Ok(self.devices)
    }

    fn request_permission(&mut self) -> Result<(), DriverError> {
        self.journal.record(DriverCall::RequestPermission);
        if self.permission {
            Ok(())
        } else {
            Err(DriverError::PermissionDenied)
        }
    }

    fn open(&mut self) -> Result<(), DriverError> {
        self.journal.record(DriverCall::Open);
        if self.open_failures > 0 {
            self.open_failures -= 1;
            return Err(DriverError::OpenFailed("port busy".to_string()));
        }
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), DriverError> {
        if !self.write_ok {
            return Err(DriverError::WriteFailed("device detached".to_string()));
        }
        self.journal.record(DriverCall::Write(data.to_vec()));
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.journal.record(DriverCall::Close);
        if self.close_ok {
            Ok(())
        } else {
            Err(DriverError::CloseFailed("already closed".to_string()))
        }
    }
}
