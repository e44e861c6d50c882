// ABOUTME: Operator-facing output sink with verbosity levels.
// ABOUTME: Separate from tracing logs; carries progress lines and the device flow prompt.

use std::fmt::Display;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// How chatty the operator output is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Quiet = 0,
    #[default]
    Normal = 1,
    Verbose = 2,
    VeryVerbose = 3,
}

impl Verbosity {
    /// Map `-v` occurrences (and `--quiet`) to a verbosity.
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Verbosity::Quiet;
        }
        match verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::VeryVerbose,
        }
    }
}

/// Writes lines to a sink when the configured verbosity allows it.
pub struct Printer {
    sink: Mutex<Box<dyn Write + Send>>,
    verbosity: Verbosity,
}

impl Printer {
    pub fn new(sink: impl Write + Send + 'static, verbosity: Verbosity) -> Self {
        Self {
            sink: Mutex::new(Box::new(sink)),
            verbosity,
        }
    }

    pub fn stdout(verbosity: Verbosity) -> Self {
        Self::new(std::io::stdout(), verbosity)
    }

    /// Printer writing into memory, with a handle to read what was written.
    pub fn buffer(verbosity: Verbosity) -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::new(buffer.clone(), verbosity), buffer)
    }

    pub fn enabled(&self, level: Verbosity) -> bool {
        self.verbosity >= level
    }

    /// Print `message` followed by a newline if `level` is enabled.
    pub fn println(&self, level: Verbosity, message: impl Display) {
        if self.enabled(level) {
            self.write(format!("{message}\n").as_bytes());
        }
    }

    /// Print pre-formatted text verbatim if `level` is enabled.
    pub fn print(&self, level: Verbosity, text: &str) {
        if self.enabled(level) {
            self.write(text.as_bytes());
        }
    }

    fn write(&self, bytes: &[u8]) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.write_all(bytes);
            let _ = sink.flush();
        }
    }
}

/// In-memory sink shared between a [`Printer`] and the code inspecting its output.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| std::io::Error::other("buffer lock poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// First ten characters of a token followed by `...`, for verbose output.
pub fn truncate_token(token: &str) -> String {
    match token.char_indices().nth(10) {
        Some((idx, _)) => format!("{}...", &token[..idx]),
        None => token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        assert_eq!(Verbosity::from_flags(0, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(1, false), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(2, false), Verbosity::VeryVerbose);
        assert_eq!(Verbosity::from_flags(7, false), Verbosity::VeryVerbose);
        assert_eq!(Verbosity::from_flags(3, true), Verbosity::Quiet);
    }

    #[test]
    fn test_println_respects_verbosity() {
        let (printer, buffer) = Printer::buffer(Verbosity::Verbose);
        printer.println(Verbosity::Normal, "shown");
        printer.println(Verbosity::Verbose, "also shown");
        printer.println(Verbosity::VeryVerbose, "hidden");

        assert_eq!(buffer.contents(), "shown\nalso shown\n");
    }

    #[test]
    fn test_quiet_prints_nothing_above_quiet() {
        let (printer, buffer) = Printer::buffer(Verbosity::Quiet);
        printer.println(Verbosity::Normal, "certificate stored");
        printer.print(Verbosity::Normal, "qr");
        assert!(buffer.contents().is_empty());
    }

    #[test]
    fn test_truncate_token() {
        assert_eq!(truncate_token("abcdefghijklmnop"), "abcdefghij...");
        assert_eq!(truncate_token("short"), "short");
        assert_eq!(truncate_token("exactly10c"), "exactly10c");
    }
}
