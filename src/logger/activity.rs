//! Activity events emitted by a reconcile run and their JSONL representation.
//!
//! Runs are short and single-threaded, so the logger writes synchronously on
//! the caller's thread and flushes when the run completes.

#![allow(missing_docs)]

use std::fmt::Write;

use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

// ──────────────────── public event type ────────────────────

/// Events that can be recorded in the activity log.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    ReconcileStarted {
        active: String,
        offload: String,
        budget: String,
        config_hash: Option<String>,
        dry_run: bool,
    },
    FileActivated {
        path: String,
        size_bytes: u64,
        method: String,
        duration_ms: u64,
    },
    FileOffloaded {
        path: String,
        size_bytes: u64,
        method: String,
        duration_ms: u64,
    },
    MoveConflict {
        path: String,
        direction: String,
    },
    MoveFailed {
        path: String,
        direction: String,
        error_code: String,
        error_message: String,
    },
    ReconcileCompleted {
        activated: usize,
        offloaded: usize,
        conflicts: usize,
        failures: usize,
        active_count: usize,
        active_bytes: u64,
        duration_ms: u64,
    },
    Error {
        code: String,
        message: String,
    },
}

// ──────────────────── logger ────────────────────

/// Synchronous activity logger backed by a [`JsonlWriter`].
pub struct ActivityLogger {
    jsonl: JsonlWriter,
}

impl ActivityLogger {
    /// Open the JSONL log; never fails (see the writer's fallback chain).
    pub fn open(config: JsonlConfig) -> Self {
        Self {
            jsonl: JsonlWriter::open(config),
        }
    }

    pub fn log(&mut self, event: &ActivityEvent) {
        self.jsonl.write_entry(&event_to_log_entry(event));
    }

    pub fn flush(&mut self) {
        self.jsonl.flush();
    }

    /// Current writer degradation state (`normal`, `fallback`, `stderr`, `discard`).
    pub fn state(&self) -> &str {
        self.jsonl.state()
    }
}

// ──────────────────── event conversion ────────────────────

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::ReconcileStarted {
            active,
            offload,
            budget,
            config_hash,
            dry_run,
        } => {
            let mut e = LogEntry::new(EventType::ReconcileStart, Severity::Info);
            let mut details = format!("active={active} offload={offload} budget={budget}");
            if let Some(hash) = config_hash {
                let _ = write!(details, " config_hash={hash}");
            }
            if *dry_run {
                details.push_str(" dry_run=true");
            }
            e.details = Some(details);
            e
        }
        ActivityEvent::FileActivated {
            path,
            size_bytes,
            method,
            duration_ms,
        } => moved_entry(
            EventType::FileActivated,
            "activate",
            path,
            *size_bytes,
            method,
            *duration_ms,
        ),
        ActivityEvent::FileOffloaded {
            path,
            size_bytes,
            method,
            duration_ms,
        } => moved_entry(
            EventType::FileOffloaded,
            "offload",
            path,
            *size_bytes,
            method,
            *duration_ms,
        ),
        ActivityEvent::MoveConflict { path, direction } => {
            let mut e = LogEntry::new(EventType::MoveConflict, Severity::Warning);
            e.path = Some(path.clone());
            e.direction = Some(direction.clone());
            e.error_code = Some("MQ-3002".to_string());
            e
        }
        ActivityEvent::MoveFailed {
            path,
            direction,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::MoveFailed, Severity::Warning);
            e.path = Some(path.clone());
            e.direction = Some(direction.clone());
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::ReconcileCompleted {
            activated,
            offloaded,
            conflicts,
            failures,
            active_count,
            active_bytes,
            duration_ms,
        } => {
            let severity = if *failures > 0 {
                Severity::Warning
            } else {
                Severity::Info
            };
            let mut e = LogEntry::new(EventType::ReconcileComplete, severity);
            e.duration_ms = Some(*duration_ms);
            e.size = Some(*active_bytes);
            e.details = Some(format!(
                "activated={activated} offloaded={offloaded} conflicts={conflicts} failures={failures} active_count={active_count}"
            ));
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
    }
}

fn moved_entry(
    event: EventType,
    direction: &str,
    path: &str,
    size_bytes: u64,
    method: &str,
    duration_ms: u64,
) -> LogEntry {
    let mut e = LogEntry::new(event, Severity::Info);
    e.path = Some(path.to_string());
    e.size = Some(size_bytes);
    e.direction = Some(direction.to_string());
    e.method = Some(method.to_string());
    e.duration_ms = Some(duration_ms);
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn activation_maps_to_file_activated_entry() {
        let e = event_to_log_entry(&ActivityEvent::FileActivated {
            path: "ep3.mkv".to_string(),
            size_bytes: 42,
            method: "rename".to_string(),
            duration_ms: 1,
        });
        assert_eq!(e.event, EventType::FileActivated);
        assert_eq!(e.direction.as_deref(), Some("activate"));
        assert_eq!(e.method.as_deref(), Some("rename"));
        assert_eq!(e.size, Some(42));
    }

    #[test]
    fn completion_with_failures_is_a_warning() {
        let e = event_to_log_entry(&ActivityEvent::ReconcileCompleted {
            activated: 1,
            offloaded: 0,
            conflicts: 0,
            failures: 2,
            active_count: 1,
            active_bytes: 10,
            duration_ms: 3,
        });
        assert_eq!(e.severity, Severity::Warning);
        assert!(e.details.unwrap().contains("failures=2"));
    }

    #[test]
    fn logger_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let mut logger = ActivityLogger::open(JsonlConfig {
            path: path.clone(),
            ..JsonlConfig::default()
        });
        logger.log(&ActivityEvent::MoveConflict {
            path: "a.txt".to_string(),
            direction: "activate".to_string(),
        });
        logger.log(&ActivityEvent::Error {
            code: "MQ-2001".to_string(),
            message: "directory not found".to_string(),
        });
        logger.flush();

        let contents = fs::read_to_string(&path).unwrap();
        let events: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "move_conflict");
        assert_eq!(events[0]["error_code"], "MQ-3002");
        assert_eq!(events[1]["severity"], "critical");
    }
}
