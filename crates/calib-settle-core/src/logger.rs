//! Minimal logger.
//!
//! Settling runs are short-lived and interleave messages from several
//! channels, so every line carries an elapsed-time prefix and the emitting
//! module: `[elapsed LEVEL module] message`. Install once at startup with
//! `init_with_level`; the `tracing` feature adds `init_tracing` for
//! structured output.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

struct SettleLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for SettleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed();
        let mut stderr = std::io::stderr();
        let _ = writeln!(
            stderr,
            "[{:4}.{:03}s {:>5} {}] {}",
            elapsed.as_secs(),
            elapsed.subsec_millis(),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<SettleLogger> = OnceLock::new();

/// Install the logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| SettleLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Structured logging for settle sessions: compact uptime-stamped lines on
/// stderr, or JSON when feeding a log collector. Filtered via `RUST_LOG`.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_timer(fmt::time::uptime())
            .with_target(true)
            .compact()
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_a_noop() {
        init_with_level(LevelFilter::Info).unwrap();
        // The second call must not panic or re-register.
        init_with_level(LevelFilter::Debug).unwrap();
        log::info!("logger ready");
    }
}
