//! Suspect log checking
//!
//! Every process of a fleet appends its INFO+ log lines to one shared file.
//! After a run the coordinator reads what was appended since the last check,
//! truncates the file and fails the run if any line looks like an unexpected
//! error.

use regex::Regex;
use shared::{process_debug, process_warn, ProcessId};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{FleetError, FleetResult};

/// Decides which log lines are suspicious
#[mockall::automock]
pub trait SuspectScanner: Send + Sync {
    /// Suspicious lines of `content`, in order
    fn scan(&self, content: &str) -> Vec<String>;
}

/// Regex-based scanner
///
/// A line is suspect when it was logged at ERROR level or reports a panic,
/// unless one of the ignore patterns matches it.
pub struct PatternScanner {
    suspect: Vec<Regex>,
    ignored: Vec<Regex>,
}

impl PatternScanner {
    pub fn new() -> Self {
        Self {
            suspect: vec![default_pattern(r"\bERROR\b"), default_pattern(r"panicked at")],
            ignored: Vec::new(),
        }
    }

    /// Add a pattern marking lines as suspect
    pub fn suspect(mut self, pattern: &str) -> FleetResult<Self> {
        self.suspect.push(compile(pattern)?);
        Ok(self)
    }

    /// Add a pattern excusing otherwise suspect lines
    pub fn ignore(mut self, pattern: &str) -> FleetResult<Self> {
        self.ignored.push(compile(pattern)?);
        Ok(self)
    }
}

impl Default for PatternScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SuspectScanner for PatternScanner {
    fn scan(&self, content: &str) -> Vec<String> {
        content
            .lines()
            .filter(|line| self.suspect.iter().any(|re| re.is_match(line)))
            .filter(|line| !self.ignored.iter().any(|re| re.is_match(line)))
            .map(str::to_string)
            .collect()
    }
}

fn default_pattern(pattern: &'static str) -> Regex {
    Regex::new(pattern).expect("built-in suspect pattern compiles")
}

fn compile(pattern: &str) -> FleetResult<Regex> {
    Regex::new(pattern).map_err(|e| FleetError::config(format!("suspect pattern '{pattern}': {e}")))
}

/// Append-only log plus the offset already consumed
#[derive(Debug, Clone)]
pub struct SuspectLog {
    path: PathBuf,
    cursor: u64,
}

impl SuspectLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cursor: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Read everything appended since the cursor and advance it
    pub fn read_new(&mut self) -> std::io::Result<String> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(String::new()),
            Err(e) => return Err(e),
        };

        // Shrunk behind our back; start over
        if file.metadata()?.len() < self.cursor {
            self.cursor = 0;
        }

        file.seek(SeekFrom::Start(self.cursor))?;
        let mut bytes = Vec::new();
        let read = file.read_to_end(&mut bytes)?;
        self.cursor += read as u64;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Empty the file and reset the cursor
    pub fn truncate(&mut self) -> std::io::Result<()> {
        match OpenOptions::new().write(true).open(&self.path) {
            Ok(file) => file.set_len(0)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.cursor = 0;
        Ok(())
    }

    /// Consume the log and fail if anything suspicious was written
    ///
    /// I/O problems are logged and treated as an empty log.
    pub fn close_and_check_for_suspects(&mut self, scanner: &dyn SuspectScanner) -> FleetResult<()> {
        let content = match self.read_new() {
            Ok(content) => content,
            Err(e) => {
                process_warn!(ProcessId::current(), "Could not read suspect log {}: {}", self.path.display(), e);
                String::new()
            }
        };

        if let Err(e) = self.truncate() {
            process_warn!(ProcessId::current(), "Could not truncate suspect log {}: {}", self.path.display(), e);
        }

        let suspects = scanner.scan(&content);
        process_debug!(
            ProcessId::current(),
            "🔍 Checked {} bytes of {}: {} suspect line(s)",
            content.len(),
            self.path.display(),
            suspects.len()
        );

        if suspects.is_empty() {
            Ok(())
        } else {
            Err(FleetError::SuspectStrings {
                report: suspects.join("\n"),
            })
        }
    }
}
