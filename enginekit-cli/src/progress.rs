//! Console rendering of control events.

use console::style;
use enginekit::control::ControlChannel;
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}";

/// Progress bar plus styled log lines above it.
pub struct ConsoleChannel {
    bar: ProgressBar,
}

impl ConsoleChannel {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Self { bar }
    }

    /// Log-only channel without a bar, for process supervision.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Remove the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn line(&self, text: String) {
        if self.bar.is_hidden() || self.bar.is_finished() {
            eprintln!("{}", text);
        } else {
            self.bar.println(text);
        }
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlChannel for ConsoleChannel {
    fn emit_progress(&self, percent: f64, status: &str) {
        self.bar.set_position(percent.clamp(0.0, 100.0).round() as u64);
        self.bar.set_message(status.to_string());
    }

    fn emit_log(&self, message: &str) {
        self.line(format!("  {}", style(message).dim()));
    }

    fn emit_error(&self, message: &str) {
        self.line(format!("{} {}", style("error:").red().bold(), message));
    }

    fn emit_cancelled(&self, message: &str) {
        self.line(format!("{} {}", style("cancelled:").yellow().bold(), message));
    }
}
