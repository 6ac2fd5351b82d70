//! Ambient logging, grounded on the teacher's own hand-rolled `log::Log`
//! implementation (`main.rs::logging::Logger` in lessflake-kavi), extended
//! to read its level from `DVZ_LOG_LEVEL` (spec §6) instead of a hardcoded
//! filter, and to only install itself if the embedding application has not
//! already installed a logger.

use log::{Level, LevelFilter, Metadata, Record};

static LOGGER: Logger = Logger;

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let color = match record.level() {
                Level::Error => "\x1b[31m",
                Level::Warn => "\x1b[33m",
                Level::Info => "\x1b[34m",
                Level::Debug => "\x1b[32m",
                Level::Trace => "\x1b[90m",
            };
            eprintln!("{color}{:5}\x1b[0m {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Maps `DVZ_LOG_LEVEL` (0..5, trace..fatal per spec §6) to a [`LevelFilter`].
/// Values above 4 (fatal has no `log` equivalent) clamp to `Error`; unparsable
/// or absent values default to `Warn`, matching the Vulkan validation
/// messenger's default severity mask in spec §4.1.
pub fn level_from_env() -> LevelFilter {
    match std::env::var("DVZ_LOG_LEVEL").ok().and_then(|v| v.parse::<u32>().ok()) {
        Some(0) => LevelFilter::Trace,
        Some(1) => LevelFilter::Debug,
        Some(2) => LevelFilter::Info,
        Some(3) => LevelFilter::Warn,
        Some(_) => LevelFilter::Error,
        None => LevelFilter::Warn,
    }
}

/// Installs the crate's logger if and only if nothing has installed one yet.
/// Called once from [`crate::host::Host::new`]. Safe to call from multiple
/// hosts/threads; only the first call wins, matching `log::set_logger`'s
/// own idempotence contract.
pub fn init() {
    let filter = level_from_env();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(filter);
    }
}

/// Known-noisy Vulkan validation-layer message prefixes that are downgraded
/// to trace regardless of their reported severity (spec §4.1, §7). Grounded
/// on the teacher's debug callback, which already special-cases one such
/// string (`"Device Extension: "` in `vulkan/instance.rs`).
pub const IGNORED_VALIDATION_PREFIXES: &[&str] = &[
    "Device Extension: ",
    "Instance Extension: ",
    "UNASSIGNED-GeneralParameterError-ReturnValueCodeMismatch",
    "Overriding layer limit",
];

pub fn is_ignored_validation_message(message: &str) -> bool {
    IGNORED_VALIDATION_PREFIXES.iter().any(|prefix| message.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_known_noisy_messages() {
        assert!(is_ignored_validation_message("Device Extension: VK_KHR_portability_subset"));
        assert!(!is_ignored_validation_message("a real validation error"));
    }
}
