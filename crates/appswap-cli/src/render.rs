use std::io::{self, IsTerminal, Write};
use std::thread;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use appswap_core::{UpdateError, UpdatePhase, UpdateProgress, UpdateResult};
use appswap_session::ProgressSink;
use indicatif::{ProgressBar, ProgressStyle};

const BANNER_TITLE: &str = "appswap updater";
const BANNER_RULE_WIDTH: usize = 40;
const DOWNLOAD_BAR_WIDTH: usize = 30;
const LINGER_ON_SUCCESS: Duration = Duration::from_secs(1);
const LINGER_ON_FAILURE: Duration = Duration::from_secs(3);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    let no_color = std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty());
    if io::stdout().is_terminal() && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn stdout_is_interactive() -> bool {
    io::stdout().is_terminal()
}

/// Sequential text output: a banner, one line per phase, and an in-place
/// download bar.
pub(crate) struct HeadlessRenderer<W: Write> {
    out: W,
    banner_written: bool,
    last_phase: Option<UpdatePhase>,
    bar_open: bool,
}

impl<W: Write> HeadlessRenderer<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out,
            banner_written: false,
            last_phase: None,
            bar_open: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }

    fn write_banner(&mut self) {
        if self.banner_written {
            return;
        }
        self.banner_written = true;
        for line in render_banner() {
            let _ = writeln!(self.out, "{line}");
        }
    }

    fn close_bar(&mut self) {
        if self.bar_open {
            self.bar_open = false;
            let _ = writeln!(self.out);
        }
    }
}

impl<W: Write> ProgressSink for HeadlessRenderer<W> {
    fn report(&mut self, progress: &UpdateProgress) {
        self.write_banner();

        if self.last_phase == Some(progress.phase) {
            if progress.phase == UpdatePhase::Downloading {
                let line = render_download_bar(phase_fraction(progress.phase, progress.percent));
                let _ = write!(self.out, "\r{line}");
                let _ = self.out.flush();
                self.bar_open = true;
            }
            return;
        }

        self.close_bar();
        self.last_phase = Some(progress.phase);
        let _ = writeln!(self.out, "{}", progress.label);
        let _ = self.out.flush();
    }

    fn finish(&mut self, result: &UpdateResult) {
        self.close_bar();
        if let UpdateResult::Failure { error, .. } = result {
            if let Some(line) = render_restore_warning(error) {
                let _ = writeln!(self.out, "{line}");
            }
        }
        let _ = self.out.flush();
    }
}

/// Progress-bar surface for a terminal. Keeps the final status on screen
/// for a moment before the process exits.
pub(crate) struct InteractiveRenderer {
    style: OutputStyle,
    progress_bar: ProgressBar,
}

impl InteractiveRenderer {
    pub(crate) fn new(style: OutputStyle) -> Self {
        let progress_bar = ProgressBar::new(100);
        let template = match style {
            OutputStyle::Rich => {
                "{spinner:.cyan.bold} {msg:<28} [{bar:30.cyan/blue}] {pos:>3}% {elapsed_precise}"
            }
            OutputStyle::Plain => "{spinner} {msg:<28} [{bar:30}] {pos:>3}% {elapsed_precise}",
        };
        if let Ok(bar_style) = ProgressStyle::with_template(template) {
            progress_bar.set_style(bar_style.tick_chars(".oO@* ").progress_chars("=>-"));
        }
        progress_bar.enable_steady_tick(Duration::from_millis(80));
        Self::with_progress_bar(style, progress_bar)
    }

    fn with_progress_bar(style: OutputStyle, progress_bar: ProgressBar) -> Self {
        progress_bar.set_message(UpdatePhase::Idle.label());
        Self {
            style,
            progress_bar,
        }
    }

    fn print_status(&self, status: &str, message: &str) {
        let line = render_status_line(self.style, status, message);
        let rendered = match self.style {
            OutputStyle::Plain => line,
            OutputStyle::Rich => colorize(status_style(status), &line),
        };
        println!("{rendered}");
    }
}

impl ProgressSink for InteractiveRenderer {
    fn report(&mut self, progress: &UpdateProgress) {
        // A failure keeps the bar where the update stopped.
        if progress.phase != UpdatePhase::Failed {
            self.progress_bar.set_position(progress.percent.round() as u64);
        }
        let message = match (self.style, progress.phase) {
            (OutputStyle::Rich, UpdatePhase::Failed) => colorize(status_style("err"), &progress.label),
            _ => progress.label.clone(),
        };
        self.progress_bar.set_message(message);
        if progress.phase.is_terminal() {
            self.progress_bar.disable_steady_tick();
        }
    }

    fn finish(&mut self, result: &UpdateResult) {
        self.progress_bar.finish_and_clear();
        let linger = match result {
            UpdateResult::Success { launched } => {
                self.print_status(
                    "ok",
                    &format!("{} ({})", UpdatePhase::Complete.label(), launched.display()),
                );
                LINGER_ON_SUCCESS
            }
            UpdateResult::Failure { phase, error } => {
                match render_restore_warning(error) {
                    Some(line) => self.print_status("fatal", &line),
                    None => self.print_status(
                        "err",
                        &format!("update failed while {}: {error}", phase.as_str()),
                    ),
                }
                LINGER_ON_FAILURE
            }
        };
        thread::sleep(linger);
    }
}

pub(crate) fn render_banner() -> [String; 2] {
    [BANNER_TITLE.to_string(), "=".repeat(BANNER_RULE_WIDTH)]
}

/// Renders `[=====-----] NN%` for a 0-100 download percentage.
pub(crate) fn render_download_bar(percent: f64) -> String {
    let percent = percent.clamp(0.0, 100.0);
    let filled = ((percent / 100.0) * DOWNLOAD_BAR_WIDTH as f64) as usize;
    let filled = filled.min(DOWNLOAD_BAR_WIDTH);
    format!(
        "[{}{}] {:.0}%",
        "=".repeat(filled),
        "-".repeat(DOWNLOAD_BAR_WIDTH - filled),
        percent
    )
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

pub(crate) fn render_restore_warning(error: &UpdateError) -> Option<String> {
    match error {
        UpdateError::RestoreFailure { target, backup, .. } => Some(format!(
            "CRITICAL: {} could not be restored; the previous version is at {}",
            target.display(),
            backup.display()
        )),
        _ => None,
    }
}

/// Inverse of [`UpdatePhase::scale`]: the position within `phase` as 0-100.
fn phase_fraction(phase: UpdatePhase, percent: f64) -> f64 {
    let (start, end) = phase.percent_range();
    if end <= start {
        return 100.0;
    }
    ((percent - start) / (end - start) * 100.0).clamp(0.0, 100.0)
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        "fatal" => "[FATAL]",
        _ => "[..]",
    }
}

fn status_style(status: &str) -> Style {
    match status {
        "ok" => Style::new()
            .fg_color(Some(AnsiColor::BrightGreen.into()))
            .effects(Effects::BOLD),
        "warn" => Style::new().fg_color(Some(AnsiColor::BrightYellow.into())),
        "err" => Style::new().fg_color(Some(AnsiColor::BrightRed.into())),
        "fatal" => Style::new()
            .fg_color(Some(AnsiColor::BrightWhite.into()))
            .bg_color(Some(AnsiColor::Red.into()))
            .effects(Effects::BOLD),
        _ => Style::new().fg_color(Some(AnsiColor::BrightBlue.into())),
    }
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
