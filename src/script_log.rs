//! Script-side logging.
//!
//! Scripts log through `print`, `debug`, `log_info`, `log_warn` and
//! `log_error`. Messages go to the `log` facade under the `script` target,
//! capped per frame-loop tick so a chatty script cannot flood the output.
//! Each run owns its own [`TickBudget`], so playgrounds sharing a process
//! never eat into each other's allowance.

use std::sync::atomic::{AtomicU32, Ordering};

/// Maximum number of log messages allowed per tick.
const MAX_LOGS_PER_TICK: u32 = 100;

/// Log target used for everything a script prints.
pub const SCRIPT_LOG_TARGET: &str = "script";

/// Per-tick message allowance for one script run.
///
/// The worker thread takes from it, the host resets it once per tick.
pub struct TickBudget {
    count: AtomicU32,
    /// Whether we've already warned about exceeding the limit this tick.
    warned: AtomicU32,
}

impl TickBudget {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            warned: AtomicU32::new(0),
        }
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.warned.store(0, Ordering::Relaxed);
    }

    /// Take one message from the budget. Returns false once the limit is hit.
    pub fn try_take(&self) -> bool {
        let count = self.count.fetch_add(1, Ordering::Relaxed);
        if count < MAX_LOGS_PER_TICK {
            return true;
        }
        if self.warned.swap(1, Ordering::Relaxed) == 0 {
            emit_log(
                LogLevel::Warn,
                &format!(
                    "Script log limit exceeded ({} messages/tick). Further logs dropped.",
                    MAX_LOGS_PER_TICK
                ),
            );
        }
        false
    }
}

impl Default for TickBudget {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_log(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

pub fn emit_log(level: LogLevel, message: &str) {
    log::log!(target: SCRIPT_LOG_TARGET, level.to_log(), "{}", message);
}

/// Log a message from a script, respecting the run's per-tick limit.
pub fn script_log(budget: &TickBudget, level: LogLevel, message: &str) {
    if budget.try_take() {
        emit_log(level, message);
    }
}

/// Convert a Rhai value to a display string. Never panics.
pub fn stringify_dynamic(value: &rhai::Dynamic) -> String {
    if let Ok(s) = value.clone().into_string() {
        return s;
    }

    if let Some(arr) = value.clone().try_cast::<rhai::Array>() {
        let parts: Vec<String> = arr.iter().map(stringify_dynamic).collect();
        return format!("[{}]", parts.join(", "));
    }

    if let Some(map) = value.clone().try_cast::<rhai::Map>() {
        let parts: Vec<String> = map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, stringify_dynamic(v)))
            .collect();
        return format!("{{{}}}", parts.join(", "));
    }

    if let Ok(i) = value.as_int() {
        return i.to_string();
    }
    if let Ok(f) = value.as_float() {
        return format!("{}", f);
    }
    if let Ok(b) = value.as_bool() {
        return b.to_string();
    }
    if value.is_unit() {
        return "()".to_string();
    }

    format!("{:?}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_scalars() {
        assert_eq!(stringify_dynamic(&rhai::Dynamic::from("hello")), "hello");
        assert_eq!(stringify_dynamic(&rhai::Dynamic::from(42_i64)), "42");
        assert_eq!(stringify_dynamic(&rhai::Dynamic::from(2.5_f32)), "2.5");
        assert_eq!(stringify_dynamic(&rhai::Dynamic::from(true)), "true");
        assert_eq!(stringify_dynamic(&rhai::Dynamic::UNIT), "()");
    }

    #[test]
    fn test_stringify_heights_array() {
        let arr: rhai::Array = vec![1.0_f32, 2.5].into_iter().map(rhai::Dynamic::from).collect();
        assert_eq!(stringify_dynamic(&rhai::Dynamic::from(arr)), "[1, 2.5]");
    }

    #[test]
    fn test_tick_log_limit() {
        let budget = TickBudget::new();

        for _ in 0..MAX_LOGS_PER_TICK {
            assert!(budget.try_take());
        }
        assert!(!budget.try_take());

        budget.reset();
        assert!(budget.try_take());
    }

    #[test]
    fn test_budgets_are_independent() {
        let chatty = TickBudget::new();
        let quiet = TickBudget::new();

        for i in 0..MAX_LOGS_PER_TICK + 20 {
            script_log(&chatty, LogLevel::Debug, &i.to_string());
        }
        assert!(!chatty.try_take());
        assert!(quiet.try_take());
    }
}
