//! Structured logging (§7, §9): every error and major operation boundary is
//! logged through `tracing` the way the rest of this crate's dependency
//! stack expects, and also mirrored to a process-wide callback modeled on
//! the original implementation's `log_regShowFunc(severity, message)` so a
//! host embedding this crate through `pck_bind` can still observe it without
//! linking a `tracing` subscriber of its own.

use std::sync::{Mutex, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_char(self) -> char {
        match self {
            Severity::Debug => 'd',
            Severity::Info => 'i',
            Severity::Warn => 'w',
            Severity::Error => 'e',
        }
    }
}

pub type LogCallback = Box<dyn Fn(Severity, &str) + Send + Sync>;

static CALLBACK: OnceLock<Mutex<Option<LogCallback>>> = OnceLock::new();

/// Registers the process-wide log callback, replacing any previously
/// registered one. Pass `None` to unregister.
pub fn register_log_callback(callback: Option<LogCallback>) {
    let slot = CALLBACK.get_or_init(|| Mutex::new(None));
    *slot.lock().expect("log callback mutex poisoned") = callback;
}

pub(crate) fn emit(severity: Severity, message: &str) {
    match severity {
        Severity::Debug => tracing::debug!("{message}"),
        Severity::Info => tracing::info!("{message}"),
        Severity::Warn => tracing::warn!("{message}"),
        Severity::Error => tracing::error!("{message}"),
    }
    if let Some(slot) = CALLBACK.get() {
        if let Some(callback) = slot.lock().expect("log callback mutex poisoned").as_ref() {
            callback(severity, message);
        }
    }
}

macro_rules! pck_log {
    ($severity:expr, $($arg:tt)*) => {
        $crate::log::emit($severity, &format!($($arg)*))
    };
}

pub(crate) use pck_log;
