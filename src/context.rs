//! Run-scoped log sequence and progress tracking.
//!
//! A [`RunContext`] is created per command invocation and passed by reference
//! into every workflow step. Entries are mirrored to the `log` facade as they
//! are recorded; the context keeps the most recent [`MAX_ENTRIES`] for the
//! end-of-run summary.

use std::{collections::VecDeque, fmt};

use chrono::{DateTime, Local};
use log::{Level, debug, log};
use uuid::Uuid;

pub const MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Info,
    Success,
    Skip,
    Warning,
    Error,
}

impl EntryKind {
    fn label(&self) -> &'static str {
        match self {
            EntryKind::Info => "INFO",
            EntryKind::Success => "SUCCESS",
            EntryKind::Skip => "SKIPPED",
            EntryKind::Warning => "WARNING",
            EntryKind::Error => "ERROR",
        }
    }

    fn level(&self) -> Level {
        match self {
            EntryKind::Info | EntryKind::Success | EntryKind::Skip => Level::Info,
            EntryKind::Warning => Level::Warn,
            EntryKind::Error => Level::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub kind: EntryKind,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.kind.label(),
            self.message
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub successes: usize,
    pub skips: usize,
}

#[derive(Debug)]
pub struct RunContext {
    run_id: Uuid,
    entries: VecDeque<LogEntry>,
    stats: LogStats,
    progress: f64,
    base: f64,
    scale: f64,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            entries: VecDeque::new(),
            stats: LogStats::default(),
            progress: 0.0,
            base: 0.0,
            scale: 1.0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record(&mut self, kind: EntryKind, message: impl Into<String>) {
        let message = message.into();
        log!(target: "grn_ledger::run", kind.level(), "{}: {message}", kind.label());
        self.stats.total += 1;
        match kind {
            EntryKind::Error => self.stats.errors += 1,
            EntryKind::Warning => self.stats.warnings += 1,
            EntryKind::Success => self.stats.successes += 1,
            EntryKind::Skip => self.stats.skips += 1,
            EntryKind::Info => {}
        }
        if self.entries.len() == MAX_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp: Local::now(),
            kind,
            message,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(EntryKind::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.record(EntryKind::Success, message);
    }

    pub fn skip(&mut self, message: impl Into<String>) {
        self.record(EntryKind::Skip, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(EntryKind::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(EntryKind::Error, message);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn stats(&self) -> LogStats {
        self.stats
    }

    /// Maps subsequent progress updates into `base..base + scale`, so one
    /// workflow can occupy a slice of a combined run.
    pub fn set_progress_window(&mut self, base: f64, scale: f64) {
        self.base = base.clamp(0.0, 1.0);
        self.scale = scale.clamp(0.0, 1.0 - self.base);
    }

    /// Records local progress in `0.0..=1.0` for the current window.
    pub fn set_progress(&mut self, fraction: f64) {
        let overall = self.base + fraction.clamp(0.0, 1.0) * self.scale;
        self.progress = self.progress.max(overall);
        debug!("Progress {:.0}%", self.progress * 100.0);
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }
}
