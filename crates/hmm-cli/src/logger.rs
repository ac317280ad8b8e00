use log::{LevelFilter, Log, Metadata, Record};

/// A minimal formatter-backed logger, the host-process counterpart to the
/// teacher's `QemuLogger`: same `Log` impl shape, writing to stderr instead
/// of a debug port since this binary runs on a host, not bare metal.
pub struct StderrLogger {
    max_level: LevelFilter,
}

impl StderrLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Install this logger as the global `log` sink. Call once at startup.
    pub fn init(self) {
        let max_level = self.max_level;
        log::set_boxed_logger(Box::new(self)).expect("logger already installed");
        log::set_max_level(max_level);
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}
