//! Rotating JSONL logger, adapted from the host project's own debug-logging
//! idiom rather than the `tracing` crate: a file-locked, gzip-rotating
//! append-only writer plus a thin structured-field wrapper.

use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use fs2::FileExt;
use regex::Regex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

const LOG_ROTATION_SIZE_BYTES: u64 = 8 * 1024 * 1024;
const ROTATION_CHECK_INTERVAL: u32 = 200;
const MAX_ARCHIVES: u32 = 5;

/// Appends lines to a file, gzip-rotating it once it exceeds a size
/// threshold. Rotation is guarded by an exclusive file lock so two
/// processes sharing the same log directory never rotate concurrently.
pub struct RotatingLogger {
    log_path: PathBuf,
    write_count: AtomicU32,
}

impl RotatingLogger {
    pub fn new(log_path: PathBuf) -> Self {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self {
            log_path,
            write_count: AtomicU32::new(0),
        }
    }

    pub fn write_with_rotation(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(file, "{}", line)?;

        let count = self.write_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count % ROTATION_CHECK_INTERVAL == 0 {
            let _ = self.rotate_if_needed();
        }
        Ok(())
    }

    fn rotate_if_needed(&self) -> std::io::Result<()> {
        let metadata = std::fs::metadata(&self.log_path)?;
        if metadata.len() < LOG_ROTATION_SIZE_BYTES {
            return Ok(());
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.log_path.with_extension("lock"))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Ok(()); // another process is already rotating
        }

        let timestamp = Local::now().format("%Y%m%d%H%M%S");
        let archive_path = self
            .log_path
            .with_file_name(format!(
                "{}.{}.gz",
                self.log_path.file_name().unwrap().to_string_lossy(),
                timestamp
            ));

        let input = std::fs::read(&self.log_path)?;
        let archive = File::create(&archive_path)?;
        let mut encoder = GzEncoder::new(archive, Compression::default());
        encoder.write_all(&input)?;
        encoder.finish()?;
        std::fs::write(&self.log_path, b"")?;

        let _ = self.cleanup_old_archives();
        FileExt::unlock(&lock_file)?;
        Ok(())
    }

    fn cleanup_old_archives(&self) -> std::io::Result<()> {
        let log_dir = self.log_path.parent().unwrap();
        let filename = self.log_path.file_name().unwrap().to_string_lossy().to_string();

        let mut archives = Vec::new();
        for entry in std::fs::read_dir(log_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&format!("{}.", filename)) && name.ends_with(".gz") {
                archives.push((entry.path(), entry.metadata()?.modified()?));
            }
        }
        archives.sort_by_key(|(_, modified)| *modified);
        if archives.len() > MAX_ARCHIVES as usize {
            let to_remove = archives.len() - MAX_ARCHIVES as usize;
            for (path, _) in archives.iter().take(to_remove) {
                let _ = std::fs::remove_file(path);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct LoggerConfig {
    pub jsonl_path: PathBuf,
    pub debug_log_path: PathBuf,
    pub debug_enabled: bool,
}

/// Structured logger used by every component: an always-on NDJSON
/// operational stream plus an optional flat-text debug stream.
pub struct CoreLogger {
    enabled: bool,
    debug_logger: Option<Mutex<RotatingLogger>>,
    jsonl_logger: Mutex<RotatingLogger>,
    session_id: String,
    redaction_patterns: Vec<Regex>,
}

impl CoreLogger {
    pub fn new(config: LoggerConfig) -> Self {
        let session_id = Uuid::new_v4().to_string()[..8].to_string();

        let debug_logger = if config.debug_enabled {
            Some(Mutex::new(RotatingLogger::new(config.debug_log_path)))
        } else {
            None
        };
        let jsonl_logger = Mutex::new(RotatingLogger::new(config.jsonl_path));

        Self {
            enabled: config.debug_enabled,
            debug_logger,
            jsonl_logger,
            session_id,
            redaction_patterns: Self::compile_redaction_patterns(),
        }
    }

    fn compile_redaction_patterns() -> Vec<Regex> {
        let patterns = [
            r"(?i)authorization[:\s]+[^\s\n]+",
            r"(?i)bearer[:\s]+[^\s\n]+",
            r"(?i)token[:\s]+[^\s\n]+",
            r"(?i)password[:\s]+[^\s\n]+",
            r"(?i)api[_-]?key[:\s]+[^\s\n]+",
            r"(?i)secret[:\s]+[^\s\n]+",
        ];
        patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
    }

    fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for regex in &self.redaction_patterns {
            redacted = regex.replace_all(&redacted, "[REDACTED]").to_string();
        }
        redacted
    }

    /// Write one structured event to the always-on NDJSON log, independent
    /// of the debug flag.
    pub fn event(&self, level: &str, component: &str, event: &str, message: &str, correlation_id: Option<&str>) {
        let entry = serde_json::json!({
            "timestamp": Local::now().to_rfc3339(),
            "level": level,
            "component": component,
            "event": event,
            "message": self.redact(message),
            "correlation_id": correlation_id.unwrap_or(&self.session_id),
        });
        if let Ok(logger) = self.jsonl_logger.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = logger.write_with_rotation(&line);
            }
        }

        if self.enabled {
            if let Some(debug_logger) = &self.debug_logger {
                if let Ok(logger) = debug_logger.lock() {
                    let line = format!(
                        "{} [{}] \"{}\",\"{}\"",
                        Local::now().to_rfc3339(),
                        component,
                        event,
                        self.redact(message)
                    );
                    let _ = logger.write_with_rotation(&line);
                }
            }
        }
    }

    pub fn debug(&self, component: &str, event: &str, message: &str) {
        self.event("DEBUG", component, event, message, None);
    }

    pub fn warn(&self, component: &str, event: &str, message: &str) {
        self.event("WARN", component, event, message, None);
    }

    pub fn error(&self, component: &str, event: &str, message: &str) {
        self.event("ERROR", component, event, message, None);
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Default log paths under the platform data directory, mirroring the host
/// idiom's "check env override first, else `~/.<app>/`" resolution.
pub fn default_jsonl_path() -> PathBuf {
    if let Ok(dir) = std::env::var("CORE_LOG_DIR") {
        return PathBuf::from(dir).join("core-operational.jsonl");
    }
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("uptime-core");
    path.push("core-operational.jsonl");
    path
}

pub fn default_debug_path() -> PathBuf {
    if let Ok(dir) = std::env::var("CORE_LOG_DIR") {
        return PathBuf::from(dir).join("core-debug.log");
    }
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("uptime-core");
    path.push("core-debug.log");
    path
}

pub fn debug_enabled_from_env() -> bool {
    matches!(
        std::env::var("CORE_DEBUG").as_deref(),
        Ok("true") | Ok("1") | Ok("yes") | Ok("on")
    )
}

/// Fields attached to a structured event beyond the fixed set `CoreLogger::event`
/// covers; currently unused outside tests but kept for callers that want ad-hoc
/// key/value context without growing `event`'s signature.
#[allow(dead_code)]
pub type Fields = HashMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotating_logger_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.jsonl");
        let logger = RotatingLogger::new(path.clone());
        logger.write_with_rotation("line one").unwrap();
        logger.write_with_rotation("line two").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("line one"));
        assert!(contents.contains("line two"));
    }

    #[test]
    fn core_logger_redacts_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let logger = CoreLogger::new(LoggerConfig {
            jsonl_path: dir.path().join("op.jsonl"),
            debug_log_path: dir.path().join("debug.log"),
            debug_enabled: false,
        });
        logger.debug("Prober", "probe", "Authorization: Bearer abc123");
        let contents = std::fs::read_to_string(dir.path().join("op.jsonl")).unwrap();
        assert!(!contents.contains("abc123"));
    }
}
