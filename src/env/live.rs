//! Std-backed adapters for the capability facets.
//!
//! These are the minimal live implementations a production environment can
//! embed: process stdio for the console, `std::fs` for the file store, the
//! system clock, UTF-8 for the codec, and an in-memory line reader for
//! scripted input. Each returns [`Outcome`] values so failures surface as
//! structured errors rather than unwinds.

use std::collections::VecDeque;
use std::io::BufRead;
use std::path::Path;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::env::{Clock, Console, FileStore, LineReader, TextCodec};
use crate::outcome::{ErrorInfo, Outcome};

/// Console backed by process stdout/stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn print_line(&self, line: &str) -> Outcome<()> {
        println!("{line}");
        Outcome::Success(())
    }

    fn read_line(&self) -> Outcome<String> {
        let mut buffer = String::new();
        match std::io::stdin().lock().read_line(&mut buffer) {
            Ok(_) => {
                if buffer.ends_with('\n') {
                    buffer.pop();
                    if buffer.ends_with('\r') {
                        buffer.pop();
                    }
                }
                Outcome::Success(buffer)
            }
            Err(error) => Outcome::Failure(ErrorInfo::from(error)),
        }
    }
}

/// File store backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFiles;

impl FileStore for StdFiles {
    fn read_to_string(&self, path: &Path) -> Outcome<String> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Outcome::Success(contents),
            Err(error) => Outcome::Failure(ErrorInfo::from(error)),
        }
    }

    fn write_string(&self, path: &Path, contents: &str) -> Outcome<()> {
        match std::fs::write(path, contents) {
            Ok(()) => Outcome::Success(()),
            Err(error) => Outcome::Failure(ErrorInfo::from(error)),
        }
    }
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// UTF-8 text codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Codec;

impl TextCodec for Utf8Codec {
    fn encode(&self, text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    fn decode(&self, bytes: &[u8]) -> Outcome<String> {
        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Outcome::Success(text),
            Err(error) => Outcome::Failure(ErrorInfo::new(error.to_string())),
        }
    }
}

/// In-memory line reader over a fixed script of lines.
///
/// Useful both in tests and for feeding canned input to pipelines.
#[derive(Debug)]
pub struct ScriptedLines {
    lines: Mutex<VecDeque<String>>,
}

impl ScriptedLines {
    /// Creates a reader yielding the given lines in order.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Mutex::new(lines.into_iter().map(Into::into).collect()),
        }
    }
}

impl LineReader for ScriptedLines {
    fn next_line(&self) -> Outcome<Option<String>> {
        Outcome::Success(self.lines.lock().pop_front())
    }
}
