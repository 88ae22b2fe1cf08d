//! Progress reporting while files are hashed.

#![allow(missing_docs)]

use std::io::{self, Write};

use parking_lot::Mutex;

const DEFAULT_COLUMNS: usize = 80;

/// Snapshot handed to progress callbacks after each completed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress<'a> {
    pub current_bytes: u64,
    pub total_bytes: u64,
    pub path: &'a str,
}

impl Progress<'_> {
    /// Completed fraction by bytes. An empty scan counts as done.
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.current_bytes == 0 { 0.0 } else { 1.0 };
        }
        self.current_bytes as f64 / self.total_bytes as f64
    }
}

/// `" 42.0%"`: six columns wide.
pub fn format_percent(progress: &Progress<'_>) -> String {
    format!("{:>5.1}%", progress.fraction() * 100.0)
}

/// One carriage-return-prefixed line that fits in `columns`, with long paths
/// shortened to `head...tail` and short ones padded to erase the previous line.
pub fn format_progress_line(progress: &Progress<'_>, columns: usize) -> String {
    let percent = format_percent(progress);
    // "\r" + percent + " "
    let max_path = columns.saturating_sub(percent.len() + 2);
    let chars: Vec<char> = progress.path.chars().collect();
    let shown = if chars.len() > max_path {
        let half = max_path.saturating_sub(3) / 2;
        let head: String = chars[..half].iter().collect();
        let tail: String = chars[chars.len() - half..].iter().collect();
        format!("{head}...{tail}")
    } else {
        let mut padded = progress.path.to_string();
        padded.extend(std::iter::repeat_n(' ', max_path - chars.len()));
        padded
    };
    format!("\r{percent} {shown}")
}

/// Terminal width from `COLUMNS`, falling back to 80.
pub fn terminal_columns() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|cols| *cols > 0)
        .unwrap_or(DEFAULT_COLUMNS)
}

struct TerminalState<W> {
    out: W,
    last_percent: String,
}

/// Renders progress lines to a terminal stream, skipping updates whose
/// percentage string did not change.
pub struct TerminalProgress<W: Write = io::Stderr> {
    state: Mutex<TerminalState<W>>,
    columns: usize,
}

impl TerminalProgress<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr(), terminal_columns())
    }
}

impl<W: Write> TerminalProgress<W> {
    pub fn new(out: W, columns: usize) -> Self {
        Self {
            state: Mutex::new(TerminalState {
                out,
                last_percent: String::new(),
            }),
            columns,
        }
    }

    pub fn report(&self, progress: &Progress<'_>) {
        let percent = format_percent(progress);
        let mut state = self.state.lock();
        if state.last_percent == percent {
            return;
        }
        let line = format_progress_line(progress, self.columns);
        // Best effort.
        let _ = state.out.write_all(line.as_bytes());
        let _ = state.out.flush();
        state.last_percent = percent;
    }

    /// Erase the progress line.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        if state.last_percent.is_empty() {
            return;
        }
        let blank = " ".repeat(self.columns.saturating_sub(1));
        let _ = write!(state.out, "\r{blank}\r");
        let _ = state.out.flush();
        state.last_percent.clear();
    }

    pub fn into_inner(self) -> W {
        self.state.into_inner().out
    }
}
