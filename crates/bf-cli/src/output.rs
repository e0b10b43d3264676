//! Styled diagnostic output for `--verbose`, `--dump-code`, and error
//! reporting.
//!
//! `termcolor`-based, `NO_COLOR`-respecting, trimmed to the handful of
//! styles this CLI actually uses.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// `NO_COLOR` always wins; otherwise auto-detect whether stderr/stdout are
/// terminals.
pub fn resolve_color_choice() -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

pub struct StyledOutput {
    stdout: StandardStream,
    stderr: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        StyledOutput {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    /// Cyan informational line on stdout, used by `--verbose`.
    pub fn info(&mut self, text: &str) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(Color::Cyan));
        let _ = self.stdout.set_color(&spec);
        let _ = writeln!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    pub fn plain(&mut self, text: &str) {
        let _ = writeln!(self.stdout, "{}", text);
    }

    /// Bold red `error: <text>` on stderr.
    pub fn error(&mut self, text: &str) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(Color::Red)).set_bold(true);
        let _ = self.stderr.set_color(&spec);
        let _ = write!(self.stderr, "error: ");
        let _ = self.stderr.reset();
        let _ = writeln!(self.stderr, "{}", text);
    }
}
