//! Logger collaborators for archive actions.
//!
//! Every message carries a title naming the operation that produced it.
//! There are two independent streams: the main action log and warnings.

use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::search::STATE_DIR;

pub const MAIN_LOG: &str = "archive.log";
pub const WARNING_LOG: &str = "archive-warnings.log";

pub trait ArchiveLog {
    fn log_main(&self, title: &str, msg: &str);
    fn log_warning(&self, title: &str, msg: &str);
}

/// Forwards both streams to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl ArchiveLog for TracingLog {
    fn log_main(&self, title: &str, msg: &str) {
        tracing::info!(title, "{msg}");
    }

    fn log_warning(&self, title: &str, msg: &str) {
        tracing::warn!(title, "{msg}");
    }
}

/// Appends timestamped lines under `<case>/.casekeep/` and forwards to
/// `tracing`.
#[derive(Debug, Clone)]
pub struct CaseLog {
    dir: PathBuf,
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

impl CaseLog {
    pub fn new(case_dir: &Path) -> Self {
        Self {
            dir: case_dir.join(STATE_DIR),
        }
    }

    pub fn main_path(&self) -> PathBuf {
        self.dir.join(MAIN_LOG)
    }

    pub fn warning_path(&self) -> PathBuf {
        self.dir.join(WARNING_LOG)
    }

    fn append(&self, file: &str, title: &str, msg: &str) {
        let line = format!("{} [{title}] {msg}\n", now_rfc3339());
        let result = std::fs::create_dir_all(&self.dir).and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(file))?
                .write_all(line.as_bytes())
        });
        if let Err(e) = result {
            tracing::debug!(error = %e, file, "cannot write case log");
        }
    }
}

impl ArchiveLog for CaseLog {
    fn log_main(&self, title: &str, msg: &str) {
        TracingLog.log_main(title, msg);
        self.append(MAIN_LOG, title, msg);
    }

    fn log_warning(&self, title: &str, msg: &str) {
        TracingLog.log_warning(title, msg);
        self.append(WARNING_LOG, title, msg);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Main,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub stream: Stream,
    pub title: String,
    pub message: String,
}

/// In-memory log. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingLog {
    entries: Rc<RefCell<Vec<LogEntry>>>,
}

impl RecordingLog {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.stream == Stream::Warning)
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    fn push(&self, stream: Stream, title: &str, msg: &str) {
        self.entries.borrow_mut().push(LogEntry {
            stream,
            title: title.to_string(),
            message: msg.to_string(),
        });
    }
}

impl ArchiveLog for RecordingLog {
    fn log_main(&self, title: &str, msg: &str) {
        self.push(Stream::Main, title, msg);
    }

    fn log_warning(&self, title: &str, msg: &str) {
        self.push(Stream::Warning, title, msg);
    }
}
