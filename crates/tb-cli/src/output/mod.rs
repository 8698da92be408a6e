//! Output formatting utilities for the CLI

use tabled::{settings::Style, Table, Tabled};

use tb_core::HostEntry;
use tb_orchestrator::RunReport;

/// Format the host directory as a table
pub fn format_hosts(entries: &[HostEntry]) -> String {
    if entries.is_empty() {
        return "No hosts configured".to_string();
    }

    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "ROLE")]
        role: String,
        #[tabled(rename = "ADDRESS")]
        address: String,
        #[tabled(rename = "PORT")]
        port: String,
        #[tabled(rename = "USER")]
        user: String,
    }

    let rows: Vec<HostRow> = entries
        .iter()
        .map(|e| HostRow {
            role: e.role.to_string(),
            address: e.address.clone(),
            port: e.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            user: e.username.clone(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format a run report as a one-row table
pub fn format_report(report: &RunReport) -> String {
    #[derive(Tabled)]
    struct ReportRow {
        #[tabled(rename = "ROUNDS")]
        rounds: u32,
        #[tabled(rename = "ATTEMPTS")]
        attempts: u32,
        #[tabled(rename = "GRACE SLEEPS")]
        grace_sleeps: u32,
    }

    Table::new([ReportRow {
        rounds: report.rounds_completed,
        attempts: report.attempts,
        grace_sleeps: report.grace_sleeps,
    }])
    .with(Style::rounded())
    .to_string()
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning in yellow
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
