use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::{Level, LevelFilter, Log, Metadata, Record};

pub type SharedStatus = Arc<Mutex<StatusLog>>;

/// The green-on-black console under the knobs. Keeps the newest lines only.
pub struct StatusLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl StatusLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn shared(capacity: usize) -> SharedStatus {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    pub fn push(&mut self, message: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(format!(">> {}", message.into()));
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

/// Routes `log` records: info and above land on the console, everything
/// enabled goes to stderr.
pub struct ConsoleLogger {
    status: SharedStatus,
    level: LevelFilter,
}

impl ConsoleLogger {
    pub fn new(status: SharedStatus, level: LevelFilter) -> Self {
        Self { status, level }
    }

    pub fn install(status: SharedStatus, level: LevelFilter) -> anyhow::Result<()> {
        log::set_boxed_logger(Box::new(Self::new(status, level)))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        if record.level() <= Level::Info && record.target().starts_with("console") {
            if let Ok(mut status) = self.status.lock() {
                status.push(record.args().to_string());
            }
        }
    }

    fn flush(&self) {}
}
