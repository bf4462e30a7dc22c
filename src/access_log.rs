//! Operator-facing access log
//!
//! Every line is `HH:MM:SS <tag> <fields>` with tag REQ, RES or BLOCKED.
//! Lines are append-only, one write per call, and mirror through `tracing`
//! so the same records reach stdout. Each request produces exactly two lines
//! (REQ and RES); BLOCKED lines are emitted by the inspection gate as the
//! verdict is made.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use hyper::{Method, StatusCode, Uri};
use tracing::info;

use crate::error::{Result, WafError};
use crate::inspect::BlockRecord;

pub struct AccessLog {
    file: Option<Mutex<File>>,
}

impl AccessLog {
    /// Open the log file append-create, or log to stdout only when no path
    /// is configured.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        WafError::Config(format!(
                            "Failed to open access log {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                Some(Mutex::new(file))
            }
            None => None,
        };
        Ok(Self { file })
    }

    pub fn stdout_only() -> Self {
        Self { file: None }
    }

    /// Request-entry line, emitted before any body parsing
    pub fn req(&self, method: &Method, uri: &Uri, content_type: Option<&str>, length: Option<u64>) {
        let length = match length {
            Some(n) => n.to_string(),
            None => "-".to_string(),
        };
        self.write_line(
            "REQ",
            &format!(
                "{} {} | Content-Type: {} | Length: {}",
                method,
                uri,
                content_type.unwrap_or("-"),
                length
            ),
        );
    }

    /// Block-verdict line, emitted by the inspection gate
    pub fn blocked(&self, record: &BlockRecord) {
        self.write_line(
            "BLOCKED",
            &format!(
                "rule {}: {} [{}]",
                record.rule_id, record.message, record.severity
            ),
        );
    }

    /// Response-summary line, one per request lifecycle
    pub fn res(
        &self,
        method: &Method,
        uri: &Uri,
        status: StatusCode,
        elapsed: Duration,
        block: Option<&BlockRecord>,
    ) {
        let suffix = match block {
            Some(record) => format!(
                " | BLOCKED by rule {}: {} [{}]",
                record.rule_id, record.message, record.severity
            ),
            None => String::new(),
        };
        self.write_line(
            "RES",
            &format!(
                "{} {} | {} | {:?}{}",
                method,
                uri,
                status.as_u16(),
                elapsed,
                suffix
            ),
        );
    }

    fn write_line(&self, tag: &str, fields: &str) {
        let line = format!(
            "{} {} {}",
            chrono::Local::now().format("%H:%M:%S"),
            tag,
            fields
        );

        info!("{} {}", tag, fields);

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{}", line);
            }
        }
    }
}
