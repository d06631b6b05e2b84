pub mod check;
pub mod completions;
pub mod doctor;
pub mod install;
pub mod man_pages;
pub mod paths;
pub mod uninstall;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use verv_core::{MutationReport, Outcome};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_PROVISION_ERROR: u8 = 3;

/// Map a rendered `CoreError` to the process exit code.
pub fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("manifest error:") || msg.starts_with("config error:") {
        EXIT_MANIFEST_ERROR
    } else if msg.starts_with("failed to provision environment") {
        EXIT_PROVISION_ERROR
    } else {
        EXIT_FAILURE
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_outcome(outcome: &Outcome) -> String {
    use console::Style;
    match outcome {
        Outcome::Succeeded => Style::new().green().apply_to("ok").to_string(),
        Outcome::Failed(reason) => Style::new()
            .red()
            .bold()
            .apply_to(format!("failed: {reason}"))
            .to_string(),
        Outcome::Skipped(reason) => Style::new()
            .dim()
            .apply_to(format!("skipped: {reason}"))
            .to_string(),
    }
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "provisioned" => Style::new().green().apply_to(state).to_string(),
        "incomplete" => Style::new().yellow().apply_to(state).to_string(),
        "absent" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

pub fn print_steps(report: &MutationReport) {
    for record in &report.steps {
        println!("  {:<28} {}", record.step.to_string(), colorize_outcome(&record.outcome));
    }
}
