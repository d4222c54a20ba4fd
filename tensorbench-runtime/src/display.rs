//! Live progress while a benchmark runs.
//!
//! On a terminal this is a bar sized to the configured runs with the current rate as its message.
//! Otherwise (piped stderr, or `--json`) progress goes to the log.
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use tracing::info;

const BAR_TEMPLATE: &str = "{bar:60.cyan/blue} {pos}/{len} ({percent}%) {msg}";

pub struct ProgressDisplay {
    bar: Option<ProgressBar>,
}

impl ProgressDisplay {
    /// Draw a bar when `interactive` is set and stderr is a terminal.
    pub fn new(runs: usize, interactive: bool) -> Self {
        if !interactive || !std::io::stderr().is_terminal() {
            return Self::logging();
        }

        let bar = ProgressBar::new(runs as u64);
        match ProgressStyle::with_template(BAR_TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("=> ")),
            Err(err) => info!("Falling back to the default progress style: {err}"),
        }

        Self { bar: Some(bar) }
    }

    pub fn logging() -> Self {
        Self { bar: None }
    }

    pub fn is_bar(&self) -> bool {
        self.bar.is_some()
    }

    pub fn update(&self, pct: f32, runs: usize, errors: usize, rps: f64) {
        match &self.bar {
            Some(bar) => {
                bar.set_position(runs as u64);
                bar.set_message(status_message(errors, rps));
            }
            None => info!(
                "{pct:>5.1}% ({runs} runs), {}",
                status_message(errors, rps)
            ),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish();
        }
    }
}

fn status_message(errors: usize, rps: f64) -> String {
    format!("errors: {errors}, RPS: {rps:.2}")
}
