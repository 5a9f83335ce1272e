//! Operator-facing console output
//!
//! Every line the REPL prints goes through [`Console`], which tags it with a
//! severity and colors it with `crossterm` when color is enabled. Tests use an
//! in-memory buffer with color off and inspect the text.

use crossterm::style::{Color, Stylize};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Question,
    Success,
    Error,
    Info,
    Info2,
    Warning,
}

impl Tone {
    fn color(self) -> Color {
        match self {
            Tone::Question => Color::DarkYellow,
            Tone::Success => Color::Green,
            Tone::Error => Color::Red,
            Tone::Info => Color::Cyan,
            Tone::Info2 => Color::White,
            Tone::Warning => Color::Yellow,
        }
    }
}

pub struct Console<W: Write> {
    out: W,
    colored: bool,
}

impl Console<io::Stdout> {
    pub fn stdout(colored: bool) -> Self {
        Self::new(io::stdout(), colored)
    }
}

impl<W: Write> Console<W> {
    pub fn new(out: W, colored: bool) -> Self {
        Self { out, colored }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Write `text` in the given tone; output failures are logged, not raised.
    pub fn write(&mut self, tone: Tone, text: &str, new_line: bool) {
        let result = if self.colored {
            write!(self.out, "{}", text.with(tone.color()))
        } else {
            write!(self.out, "{text}")
        };
        let result = result
            .and_then(|_| if new_line { writeln!(self.out) } else { Ok(()) })
            .and_then(|_| self.out.flush());
        if let Err(err) = result {
            log::warn!("Failed to write console output: {err}");
        }
    }

    pub fn blank(&mut self) {
        self.plain("");
    }

    pub fn plain(&mut self, text: &str) {
        if let Err(err) = writeln!(self.out, "{text}").and_then(|_| self.out.flush()) {
            log::warn!("Failed to write console output: {err}");
        }
    }

    pub fn question(&mut self, text: &str) {
        self.write(Tone::Question, text, false);
    }

    pub fn success(&mut self, text: &str) {
        self.write(Tone::Success, text, true);
    }

    pub fn error(&mut self, text: &str) {
        self.write(Tone::Error, text, true);
    }

    /// Print a list of errors, one per line
    pub fn errors(&mut self, errors: &[String]) {
        self.error(&errors.join("\n"));
    }

    pub fn info(&mut self, text: &str) {
        self.write(Tone::Info, text, true);
    }

    pub fn info2(&mut self, text: &str) {
        self.write(Tone::Info2, text, true);
    }

    pub fn warning(&mut self, text: &str) {
        self.write(Tone::Warning, text, true);
    }
}
