//! Timestamped, leveled, rotating log pipeline with an optional async sink
//! thread sitting behind a bounded blocking queue.

mod deque;

pub use deque::BlockingDeque;

use chrono::{Datelike, Local, Timelike};
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;

const MAX_LINES_PER_FILE: u64 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Debug => "[debug]: ",
            Level::Info => "[info]:  ",
            Level::Warn => "[warn]:  ",
            Level::Error => "[error]: ",
        }
    }

    pub fn from_u8(n: u8) -> Level {
        match n {
            0 => Level::Debug,
            2 => Level::Warn,
            3 => Level::Error,
            _ => Level::Info,
        }
    }
}

struct FileState {
    dir: PathBuf,
    suffix: String,
    file: Option<File>,
    today: u32,
    line_count: u64,
}

impl FileState {
    fn path_for(&self, day: u32, line_count: u64) -> PathBuf {
        let now = Local::now();
        let base = format!("{:04}_{:02}_{:02}", now.year(), now.month(), day);
        let k = line_count / MAX_LINES_PER_FILE;
        let name = if k == 0 {
            format!("{base}{}", self.suffix)
        } else {
            format!("{base}-{k}{}", self.suffix)
        };
        self.dir.join(name)
    }

    fn ensure_rotated(&mut self) -> std::io::Result<()> {
        let now = Local::now();
        let day = now.day();
        let rotate = self.file.is_none()
            || self.today != day
            || (self.line_count > 0 && self.line_count % MAX_LINES_PER_FILE == 0);
        if !rotate {
            return Ok(());
        }
        if self.today != day {
            self.line_count = 0;
        }
        self.today = day;
        let path = self.path_for(day, self.line_count);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.file = Some(file);
        Ok(())
    }

    fn write_line(&mut self, line: &str) {
        if self.ensure_rotated().is_err() {
            return;
        }
        if let Some(f) = self.file.as_mut() {
            let _ = f.write_all(line.as_bytes());
            let _ = f.flush();
        }
        self.line_count += 1;
    }
}

struct Logger {
    level: Level,
    state: Mutex<FileState>,
    queue: Option<Arc<BlockingDeque<String>>>,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();
static SINK: Mutex<Option<JoinHandle<()>>> = Mutex::new(None);

/// Initializes the process-wide logger. Idempotent: a second call is ignored.
/// `queue_capacity == 0` disables the async sink and forces synchronous
/// writes on the caller's thread.
pub fn init(level: Level, dir: impl Into<PathBuf>, suffix: impl Into<String>, queue_capacity: usize) {
    let dir = dir.into();
    let _ = fs::create_dir_all(&dir);
    let state = FileState {
        dir,
        suffix: suffix.into(),
        file: None,
        today: 0,
        line_count: 0,
    };
    let queue = if queue_capacity > 0 {
        Some(Arc::new(BlockingDeque::new(queue_capacity)))
    } else {
        None
    };
    let sink_queue = queue.clone();
    let logger = Logger {
        level,
        state: Mutex::new(state),
        queue,
    };
    if LOGGER.set(logger).is_err() {
        return;
    }
    if let Some(queue) = sink_queue {
        let handle = std::thread::spawn(move || {
            while let Some(line) = queue.pop() {
                if let Some(logger) = LOGGER.get() {
                    logger.state.lock().unwrap().write_line(&line);
                }
            }
        });
        *SINK.lock().unwrap() = Some(handle);
    }
}

fn format_record(level: Level, args: std::fmt::Arguments<'_>) -> String {
    let now = Local::now();
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06} {}{}\n",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.timestamp_subsec_micros(),
        level.tag(),
        args
    )
}

pub fn log(level: Level, args: std::fmt::Arguments<'_>) {
    let Some(logger) = LOGGER.get() else { return };
    if level < logger.level {
        return;
    }
    let line = format_record(level, args);
    match &logger.queue {
        Some(queue) => {
            if !queue.try_push_back(line.clone()) {
                // Backpressure: degrade to a synchronous write rather than
                // block the caller or drop the record.
                logger.state.lock().unwrap().write_line(&line);
            }
        }
        None => logger.state.lock().unwrap().write_line(&line),
    }
}

/// Drains the queue, flushes and closes the file, and joins the sink thread.
/// Safe to call even if `init` was never called.
pub fn shutdown() {
    if let Some(logger) = LOGGER.get() {
        if let Some(queue) = &logger.queue {
            queue.close();
        }
    }
    if let Some(handle) = SINK.lock().unwrap().take() {
        let _ = handle.join();
    }
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::log($crate::Level::Debug, format_args!($($arg)*)) };
}
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::log($crate::Level::Info, format_args!($($arg)*)) };
}
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::log($crate::Level::Warn, format_args!($($arg)*)) };
}
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::log($crate::Level::Error, format_args!($($arg)*)) };
}
