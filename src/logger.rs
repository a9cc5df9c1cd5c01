use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::pipeline::BatchSummary;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,    // Verdicts and final summary only
    Summary = 1,   // Per-URL progress (default)
    Detailed = 2,  // Offline domains, skipped URLs, warnings
    Debug = 3,     // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }
}

/// User-facing run log: timestamped lines on stderr, an optional progress
/// bar for dataset builds, and an optional copy of every line on disk.
#[derive(Clone)]
pub struct HuntLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<Mutex<Option<ProgressBar>>>,
    started: Arc<Mutex<Option<Instant>>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<PathBuf>,
}

impl HuntLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(Mutex::new(None)),
            started: Arc::new(Mutex::new(None)),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: PathBuf) -> Self {
        Self {
            log_file_path: Some(log_file_path),
            ..Self::new(verbosity)
        }
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    /// Always shown.
    pub fn error(&self, message: &str) {
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn record(&self, line: &str) {
        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(line.to_string());
            }
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", Local::now().format("%H:%M:%S%.3f"), level, message);
        self.record(&msg);

        // Print above an active progress bar so it keeps its position
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }
        eprintln!("{}", msg);
    }

    /// Result lines go to stdout regardless of verbosity.
    pub fn result(&self, line: &str) {
        self.record(line);
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.suspend(|| println!("{}", line));
                return;
            }
        }
        println!("{}", line);
    }

    pub fn start_progress(&self, total: u64) {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("Starting...");

        if let Ok(mut guard) = self.progress_bar.lock() {
            *guard = Some(pb);
        }
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
    }

    pub fn update_progress(&self, message: &str) {
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_message(message.to_string());
            }
        }
    }

    pub fn advance_progress(&self) {
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.inc(1);
            }
        }
    }

    pub fn finish_progress(&self) {
        if let Ok(mut guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    pub fn log_processing(&self, kind: &str, url: &str) {
        self.info(&format!("Processing {} URL : {}", kind, url));
        self.update_progress(url);
    }

    pub fn log_offline(&self, kind: &str, url: &str, reason: &str) {
        self.warn(&format!("{} URL - Offline Domain : {} ({})", kind, url, reason));
    }

    pub fn log_skipped(&self, url: &str) {
        self.warn(&format!("Skipped {} on user request", url));
    }

    pub fn print_batch_summary(&self, summary: &BatchSummary, output: Option<&Path>) {
        self.finish_progress();

        let elapsed = self
            .started
            .lock()
            .ok()
            .and_then(|s| *s)
            .map(|start| start.elapsed().as_secs_f64());

        let mut lines = vec!["".to_string(), "=== HUNT SUMMARY ===".to_string()];
        if let Some(secs) = elapsed {
            lines.push(format!("Duration: {:.2}s", secs));
        }
        lines.push(format!("URLs Processed: {}", summary.processed));
        lines.push(format!("Offline Domains: {}", summary.offline));
        lines.push(format!("Skipped: {}", summary.skipped));
        lines.push(format!("Rows Written: {}", summary.written));
        if let Some(path) = output {
            lines.push(format!("Dataset: {}", path.display()));
        }
        if summary.aborted {
            lines.push("Run aborted by user".to_string());
        }
        lines.push("====================".to_string());

        for line in lines {
            self.result(&line);
        }
    }

    /// Write every recorded line to the configured log file.
    pub fn export_logs(&self) -> io::Result<()> {
        let Some(path) = &self.log_file_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
        if let Ok(buffer) = self.log_buffer.lock() {
            for entry in buffer.iter() {
                writeln!(file, "{}", entry)?;
            }
        }
        file.flush()
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_count() {
        assert_eq!(VerbosityLevel::from_verbose_count(0), VerbosityLevel::Summary);
        assert_eq!(VerbosityLevel::from_verbose_count(1), VerbosityLevel::Detailed);
        assert_eq!(VerbosityLevel::from_verbose_count(5), VerbosityLevel::Debug);
    }

    #[test]
    fn test_lines_buffered_only_with_log_file() {
        let logger = HuntLogger::new(VerbosityLevel::Debug);
        logger.info("not kept");
        assert_eq!(logger.log_count(), 0);
        assert!(!logger.is_log_export_enabled());
    }

    #[test]
    fn test_export_respects_verbosity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");
        let logger = HuntLogger::with_log_file(VerbosityLevel::Summary, path.clone());

        logger.info("visible");
        logger.debug("hidden");
        logger.error("always");
        logger.result("[*] 1 - http://a.test is PHISH: true");
        logger.export_logs().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("INFO: visible"));
        assert!(!content.contains("hidden"));
        assert!(content.contains("ERROR: always"));
        assert!(content.contains("is PHISH: true"));
        assert_eq!(logger.log_count(), 3);
    }
}
