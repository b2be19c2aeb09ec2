//! Timestamped run log mirrored to the console and `logs/runner.log`.

use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use tracing::warn;

use crate::error::LaunchError;

/// Shared console sink. Child output relays write to the same sink as the run log.
pub type Console = Arc<Mutex<dyn Write + Send>>;

/// Second-precision timestamp prefixed to every run log line.
pub const LINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Console sink backed by the process's stdout.
pub fn stdout_console() -> Console {
    Arc::new(Mutex::new(io::stdout()))
}

/// Append-only run log.
///
/// Each line is written to the console first and then appended to the log
/// file, with the same timestamp. Write failures are reported through tracing
/// and never abort the run.
pub struct RunLog {
    file: Option<(PathBuf, Mutex<File>)>,
    console: Console,
}

impl RunLog {
    /// Open (or create) the log file for appending.
    pub fn open(path: &Path, console: Console) -> Result<Self, LaunchError> {
        let file = open_append(path)?;
        Ok(Self {
            file: Some((path.to_path_buf(), Mutex::new(file))),
            console,
        })
    }

    /// Log that only reaches the console, for failures before the log directory exists.
    pub fn console_only(console: Console) -> Self {
        Self {
            file: None,
            console,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(path, _)| path.as_path())
    }

    /// Console sink for relaying child output.
    pub fn console(&self) -> Console {
        Arc::clone(&self.console)
    }

    pub fn info(&self, message: impl Display) {
        self.write_lines("", &message.to_string());
    }

    pub fn error(&self, message: impl Display) {
        self.write_lines("ERROR: ", &message.to_string());
    }

    fn write_lines(&self, prefix: &str, message: &str) {
        let stamp = Local::now().format(LINE_TIMESTAMP_FORMAT).to_string();
        let mut rendered = String::new();
        for line in message.lines() {
            rendered.push_str(&format!("[{stamp}] {prefix}{line}\n"));
        }
        if rendered.is_empty() {
            rendered = format!("[{stamp}] {prefix}\n");
        }

        match self.console.lock() {
            Ok(mut console) => {
                if let Err(e) = console.write_all(rendered.as_bytes()).and_then(|()| console.flush())
                {
                    warn!(err = %e, "failed to write run log line to console");
                }
            }
            Err(_) => warn!("console sink poisoned"),
        }
        let Some((path, file)) = &self.file else {
            return;
        };
        match file.lock() {
            Ok(mut file) => {
                if let Err(e) = file.write_all(rendered.as_bytes()) {
                    warn!(err = %e, path = %path.display(), "failed to append run log line");
                }
            }
            Err(_) => warn!("run log file poisoned"),
        }
    }
}

/// Open a log file for appending, creating it if needed.
pub fn open_append(path: &Path) -> Result<File, LaunchError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LaunchError::OpenLog {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CapturedConsole;
    use regex::Regex;
    use std::fs;

    #[test]
    fn lines_go_to_console_and_file_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("runner.log");
        let console = CapturedConsole::new();
        let log = RunLog::open(&path, console.sink()).expect("open");

        log.info("first");
        log.error("second");
        log.info("third");

        let file = fs::read_to_string(&path).expect("read log");
        assert_eq!(file, console.contents());

        let re = Regex::new(r"^\[\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\] (.*)$").expect("regex");
        let messages: Vec<String> = file
            .lines()
            .map(|line| re.captures(line).expect("timestamped line")[1].to_string())
            .collect();
        assert_eq!(messages, vec!["first", "ERROR: second", "third"]);
    }

    #[test]
    fn multi_line_messages_stamp_every_line() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("runner.log");
        let console = CapturedConsole::new();
        let log = RunLog::open(&path, console.sink()).expect("open");

        log.error("outer\ncaused by: inner");

        let file = fs::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = file.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] ERROR: outer"));
        assert!(lines[1].ends_with("] ERROR: caused by: inner"));
    }

    #[test]
    fn reopening_appends() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("runner.log");

        RunLog::open(&path, CapturedConsole::new().sink())
            .expect("open")
            .info("run one");
        RunLog::open(&path, CapturedConsole::new().sink())
            .expect("open")
            .info("run two");

        let file = fs::read_to_string(&path).expect("read log");
        assert_eq!(file.lines().count(), 2);
        assert!(file.contains("run one"));
        assert!(file.contains("run two"));
    }

    #[test]
    fn console_only_log_writes_no_file() {
        let console = CapturedConsole::new();
        let log = RunLog::console_only(console.sink());
        log.error("cannot create logs/");

        assert_eq!(log.path(), None);
        assert!(console.contents().ends_with("] ERROR: cannot create logs/\n"));
    }

    #[test]
    fn open_fails_when_directory_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = match RunLog::open(
            &temp.path().join("missing/runner.log"),
            CapturedConsole::new().sink(),
        ) {
            Ok(_) => panic!("expected open failure"),
            Err(err) => err,
        };
        assert!(matches!(err, LaunchError::OpenLog { .. }));
    }
}
