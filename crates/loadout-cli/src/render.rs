use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};

fn label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn warn_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::Yellow.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub fn print_status(label: &str, message: &str) {
    println!("{} {message}", colorize(label_style(), label));
}

pub fn print_warning(message: &str) {
    println!("{} {message}", colorize(warn_style(), "warning:"));
}

pub fn start_repair_progress(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total.max(1));
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.cyan.bold} {msg:<12} [{bar:20.cyan/blue}] {pos:>3}/{len:3} {elapsed_precise}",
    ) {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar.set_message("repair");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

pub fn format_manifest_row(id: &str, version: &str, band: &str) -> String {
    format!("{id:<44} {version:<18} {band}")
}
