//! `captures` command.

use super::output::{OutputFormat, write_as};
use crate::Error;
use crate::models::Stage;
use crate::services::{CaptureService, CaptureSummary, ChatService};
use std::io::{self, Write};

/// Writes capture summaries as a table.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_table<W: Write>(writer: &mut W, captures: &[CaptureSummary]) -> io::Result<()> {
    if captures.is_empty() {
        writeln!(writer, "No captures found.")?;
        return Ok(());
    }

    writeln!(writer, "{:<22}  {:>5}  {:<6}  TITLE", "ID", "SCORE", "REVIEW")?;
    writeln!(writer, "{}", "-".repeat(60))?;
    for capture in captures {
        let score = capture
            .quality_score
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        let review = if capture.needs_review { "yes" } else { "no" };
        writeln!(
            writer,
            "{:<22}  {score:>5}  {review:<6}  {}",
            capture.id, capture.title
        )?;
    }
    Ok(())
}

fn capture_service(service: &ChatService) -> Result<&CaptureService, Error> {
    service
        .capture_service()
        .ok_or_else(|| Error::InvalidInput("capture is disabled in the configuration".to_string()))
}

/// Executes `captures list`.
///
/// # Errors
///
/// Returns an error for an unknown scope, disabled capture, or storage failure.
pub fn cmd_list(
    service: &ChatService,
    scope: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let scope = service.scopes().require(scope)?;
    let captures = capture_service(service)?.list_captures(scope, limit)?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_as(&mut handle, format, captures.as_slice(), write_table)
}

/// Executes `captures save`, storing text without the quality gate.
///
/// # Errors
///
/// Returns an error for an unknown scope, empty content, or storage failure.
pub fn cmd_save(
    service: &ChatService,
    scope: &str,
    title: &str,
    category: &str,
    content: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let scope = service.scopes().require(scope)?;
    let id = capture_service(service)?.save_manual(scope, title, category, content)?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(
        handle,
        "Saved {id} to {}/{}",
        scope.id,
        scope.stage_name(Stage::Source)
    )?;
    Ok(())
}
