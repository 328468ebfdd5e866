//! Routes the `log` facade into the diagnostic channel.
//!
//! Fully unbuffered: each record is committed to the ring before the
//! logging call returns. A fault one instruction after a log line can
//! never lose that line to an unflushed buffer.

use log::{LevelFilter, Log, Metadata, Record};

struct DiagLogger;

static LOGGER: DiagLogger = DiagLogger;

impl Log for DiagLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        crate::diag_println!("[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Redirects the process text streams into the diagnostic channel.
/// Part of the boot sequence; a second call leaves the first
/// registration in place.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }
}
