//! Human-facing build output.
//!
//! A handful of right-aligned status lines (`Compiling readline:8.1`,
//! `Finished cpython:3.9.6 in 4.1m`) and a byte progress bar for source
//! downloads. Everything else is logged through `tracing`.

use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const STATUS_WIDTH: usize = 12;

/// Status word shown at the start of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Compiling,
    Fetching,
    Inspecting,
    Finished,
    Packaged,
    Warning,
}

impl Status {
    /// Label and ANSI color.
    fn style(self) -> (&'static str, &'static str) {
        match self {
            Status::Compiling => ("Compiling", "\x1b[1;36m"),
            Status::Fetching => ("Fetching", "\x1b[1;36m"),
            Status::Inspecting => ("Inspecting", "\x1b[1;36m"),
            Status::Finished => ("Finished", "\x1b[1;32m"),
            Status::Packaged => ("Packaged", "\x1b[1;32m"),
            Status::Warning => ("Warning", "\x1b[1;33m"),
        }
    }
}

/// Writes status lines to stderr.
#[derive(Debug)]
pub struct Shell {
    verbose: bool,
    use_color: bool,
}

impl Shell {
    /// Colors are used only when stderr is a terminal and `no_color` isn't set.
    pub fn from_flags(verbose: bool, no_color: bool) -> Self {
        Shell {
            verbose,
            use_color: !no_color && io::stderr().is_terminal(),
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn status(&self, status: Status, msg: impl Display) {
        eprintln!("{} {}", self.format_status(status), msg);
    }

    pub fn warn(&self, msg: impl Display) {
        self.status(Status::Warning, msg);
    }

    fn format_status(&self, status: Status) -> String {
        let (label, color) = status.style();
        if self.use_color {
            format!("{}{:>w$}\x1b[0m", color, label, w = STATUS_WIDTH)
        } else {
            format!("{:>w$}", label, w = STATUS_WIDTH)
        }
    }

    /// Byte progress bar for a download of `total_bytes`.
    ///
    /// Hidden in verbose mode, where it would interleave with debug logs,
    /// and when the size is unknown.
    pub fn bytes_progress(self: &Arc<Self>, msg: impl Display, total_bytes: u64) -> Progress {
        let pb = (!self.verbose && total_bytes > 1).then(|| {
            let pb = ProgressBar::new(total_bytes);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_message(msg.to_string());
            pb
        });
        Progress { pb, current: 0 }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::from_flags(false, false)
    }
}

/// Download progress, possibly not shown.
pub struct Progress {
    pb: Option<ProgressBar>,
    current: u64,
}

impl Progress {
    pub fn inc(&mut self, delta: u64) {
        self.current += delta;
        if let Some(pb) = &self.pb {
            pb.inc(delta);
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
    }

    /// Bytes received so far.
    pub fn position(&self) -> u64 {
        self.current
    }
}

/// `0.50s` under a minute, `1.5m` above.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// `1 module`, `3 modules`.
pub fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}
