//! `backends` command.

use super::output::{OutputFormat, write_as};
use crate::llm::BackendSummary;
use crate::services::ChatService;
use std::io::{self, Write};

/// Writes backend summaries as a table.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_table<W: Write>(writer: &mut W, backends: &[BackendSummary]) -> io::Result<()> {
    if backends.is_empty() {
        writeln!(writer, "No backends configured.")?;
        return Ok(());
    }

    let id_width = backends.iter().map(|b| b.id.len()).max().unwrap_or(0).max(2);
    let provider_width = backends
        .iter()
        .map(|b| b.provider.len())
        .max()
        .unwrap_or(0)
        .max(8);

    writeln!(
        writer,
        "{:<id_width$}  {:<provider_width$}  {:<8}  MODEL",
        "ID", "PROVIDER", "STATUS"
    )?;
    writeln!(writer, "{}", "-".repeat(id_width + provider_width + 24))?;
    for backend in backends {
        let status = if backend.enabled { "enabled" } else { "disabled" };
        writeln!(
            writer,
            "{:<id_width$}  {:<provider_width$}  {status:<8}  {}",
            backend.id, backend.provider, backend.model
        )?;
    }
    Ok(())
}

/// Executes the backends command.
///
/// # Errors
///
/// Returns an error if output fails.
pub fn cmd_backends(
    service: &ChatService,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let backends = service.gateway().list();
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_as(&mut handle, format, backends.as_slice(), write_table)
}
