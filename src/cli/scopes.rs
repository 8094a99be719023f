//! `scopes` command.

use super::output::{OutputFormat, write_as};
use crate::scope::TopicScope;
use crate::services::ChatService;
use std::io::{self, Write};

/// Writes scopes as a table.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_table<W: Write>(writer: &mut W, scopes: &[&TopicScope]) -> io::Result<()> {
    if scopes.is_empty() {
        writeln!(writer, "No topic scopes registered.")?;
        return Ok(());
    }

    let id_width = scopes.iter().map(|s| s.id.len()).max().unwrap_or(0).max(2);
    let name_width = scopes
        .iter()
        .map(|s| s.display_name.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);

    writeln!(
        writer,
        "{:<id_width$}  {:<name_width$}  CATEGORIES",
        "ID", "NAME"
    )?;
    writeln!(writer, "{}", "-".repeat(id_width + name_width + 14))?;
    for scope in scopes {
        let categories = if scope.categories.is_empty() {
            "-".to_string()
        } else {
            scope.categories.join(", ")
        };
        writeln!(
            writer,
            "{:<id_width$}  {:<name_width$}  {categories}",
            scope.id, scope.display_name
        )?;
    }
    Ok(())
}

/// Executes `scopes list`.
///
/// # Errors
///
/// Returns an error if output fails.
pub fn cmd_list(service: &ChatService, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let registry = service.scopes();
    let scopes: Vec<&TopicScope> = registry
        .list()
        .keys()
        .filter_map(|id| registry.get(id))
        .collect();
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_as(&mut handle, format, scopes.as_slice(), write_table)
}

/// Executes `scopes create`.
///
/// # Errors
///
/// Returns an error for an invalid id or if output fails.
pub fn cmd_create(
    service: &mut ChatService,
    id: &str,
    display_name: &str,
    description: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let scope = service.create_scope(id, display_name, description)?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "Scope '{}' ({}) is ready.", scope.id, scope.display_name)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lists_categories() {
        let balance = TopicScope::new("balance_training", "Balance Training", "")
            .unwrap()
            .with_categories(["walking", "standing"]);
        let mut buffer = Vec::new();
        write_table(&mut buffer, &[&balance]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("ID"));
        assert!(text.contains("balance_training  Balance Training  walking, standing"));
    }

    #[test]
    fn test_empty_table() {
        let mut buffer = Vec::new();
        write_table(&mut buffer, &[]).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "No topic scopes registered.\n");
    }
}
