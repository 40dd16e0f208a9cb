//! Human-readable run reporting.
//!
//! Each run writes two text files into the log directory: the report file
//! (milestones, final statistics, the verdict) and the event file (the
//! report plus every progress event). Lines are stamped with seconds
//! since the run started; everything is mirrored to `tracing` for the
//! console.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use sortbound_core::ConfigError;

struct Sinks {
    report: BufWriter<File>,
    events: BufWriter<File>,
}

pub struct RunLog {
    started: Instant,
    sinks: Mutex<Option<Sinks>>,
}

impl RunLog {
    /// Creates the two log files under `dir`.
    pub fn create(dir: &Path, n: u32) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let open = |path: &Path| -> Result<BufWriter<File>, ConfigError> {
            File::create(path)
                .map(BufWriter::new)
                .map_err(|source| ConfigError::Directory { path: path.to_path_buf(), source })
        };
        let report = open(&dir.join(format!("output{n}__{stamp}.txt")))?;
        let events = open(&dir.join(format!("output{n}__{stamp}_events.txt")))?;
        Ok(Self {
            started: Instant::now(),
            sinks: Mutex::new(Some(Sinks { report, events })),
        })
    }

    /// A log with no file sinks; lines still reach `tracing`.
    pub fn disabled() -> Self {
        Self { started: Instant::now(), sinks: Mutex::new(None) }
    }

    /// Writes one line. Event-only lines go to the event file alone;
    /// everything else goes to both files.
    pub fn write(&self, event_only: bool, message: &str) {
        tracing::info!("{message}");
        let mut guard = self.sinks.lock();
        if let Some(sinks) = guard.as_mut() {
            let t = self.started.elapsed().as_secs();
            let line = format!("[{t:>6}s] {message}");
            let _ = writeln!(sinks.events, "{line}");
            if !event_only {
                let _ = writeln!(sinks.report, "{line}");
            }
        }
    }

    /// Flushes both sinks.
    pub fn flush(&self) {
        let mut guard = self.sinks.lock();
        if let Some(sinks) = guard.as_mut() {
            let _ = sinks.report.flush();
            let _ = sinks.events.flush();
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lines_reach_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::create(dir.path(), 9).unwrap();
        log.write(false, "milestone");
        log.write(true, "event");
        log.flush();

        let mut files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        assert_eq!(files.len(), 2);
        let report = std::fs::read_to_string(&files[0]).unwrap();
        let events = std::fs::read_to_string(&files[1]).unwrap();
        assert!(report.contains("milestone"));
        assert!(!report.contains("event"));
        assert!(events.contains("milestone"));
        assert!(events.contains("event"));
    }
}
