//! Progress event file: one JSON notification per line

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use inventor_core::{Notification, ProgressSink, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
pub struct EventRecord {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub notification: Notification,
}

/// Appends every notification to a file. Write failures are logged and
/// dropped; progress must never stall invention.
pub struct EventFileSink {
    writer: Mutex<BufWriter<File>>,
}

impl EventFileSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl ProgressSink for EventFileSink {
    fn notify(&self, notification: Notification) {
        let record = EventRecord {
            at: Utc::now(),
            notification,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "progress event not serializable");
                return;
            }
        };
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!(error = %e, "progress event not written");
        }
    }
}

/// Load an event file written by `EventFileSink`. Unparseable lines are
/// skipped.
pub fn read_events(path: &Path) -> Result<Vec<Notification>> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventRecord>(&line) {
            Ok(record) => events.push(record.notification),
            Err(e) => warn!(line = n + 1, error = %e, "skipping progress event"),
        }
    }
    Ok(events)
}
