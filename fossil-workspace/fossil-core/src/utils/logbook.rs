// src/utils/logbook.rs
//! Append-only JSONL event log (`<root>/logbook.jsonl`).
//!
//! Best effort: a failed append is logged through `tracing` and never fails
//! the store operation that emitted the event.

use serde::Serialize;
use serde_json::Value;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::config::StoreConfig;

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: String,
    event: &'a str,
    data: &'a Value,
}

#[derive(Debug, Clone)]
pub struct Logbook {
    path: Option<PathBuf>,
}

impl Logbook {
    pub fn from_config(cfg: &StoreConfig) -> Self {
        Self {
            path: cfg.logbook.enabled.then(|| cfg.logbook.file.clone()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn emit(&self, event: &str, data: Value, ts_rfc3339: &str) {
        let Some(path) = &self.path else { return };
        if let Err(e) = append_line(path, event, &data, ts_rfc3339) {
            tracing::warn!(event, path = %path.display(), error = %e, "logbook append failed");
        }
    }
}

fn append_line(path: &Path, event: &str, data: &Value, ts: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let line = LogLine {
        timestamp: ts.to_string(),
        event,
        data,
    };
    let json = serde_json::to_string(&line).map_err(std::io::Error::other)?;
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(f, "{}", json)?;
    Ok(())
}

/// Short single-line preview for log payloads.
pub fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push('…');
    out
}
