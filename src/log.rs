use colored::Colorize as _;
use std::sync::Mutex;

/// Writes log records to stderr with a colored level prefix. Warnings from
/// the surgical layer go through this path and never affect exit codes.
struct StderrLogger {
    level: Mutex<log::LevelFilter>,
}

static GLOBAL_LOGGER: std::sync::OnceLock<StderrLogger> = std::sync::OnceLock::new();

pub fn init(level: log::LevelFilter) {
    let logger = GLOBAL_LOGGER.get_or_init(|| StderrLogger {
        level: Mutex::new(level),
    });
    *logger.level.lock().unwrap() = level;
    // Setting the logger twice is fine in tests; only the first call wins.
    let _ = log::set_logger(logger);
    log::set_max_level(log::LevelFilter::Trace);
}

pub fn set_level(level: log::LevelFilter) {
    if let Some(logger) = GLOBAL_LOGGER.get() {
        *logger.level.lock().unwrap() = level;
    }
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= *self.level.lock().unwrap()
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", log_level_colored_str(record.level()), record.args());
        }
    }

    fn flush(&self) {}
}

fn log_level_colored_str(level: log::Level) -> colored::ColoredString {
    let s = level.as_str();
    match level {
        log::Level::Error => s.red().bold(),
        log::Level::Warn => s.yellow().bold(),
        log::Level::Info => s.green(),
        log::Level::Debug => s.blue(),
        log::Level::Trace => s.into(),
    }
}
