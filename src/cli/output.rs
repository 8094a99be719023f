//! Output formats shared by the listing commands.

use serde::Serialize;
use std::io::Write;
use std::str::FromStr;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Table format (default).
    #[default]
    Table,
    /// JSON format.
    Json,
    /// YAML format.
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "yaml" => Self::Yaml,
            _ => Self::Table,
        })
    }
}

/// Writes a value as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write, T: Serialize + ?Sized>(
    writer: &mut W,
    value: &T,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(value)?;
    writeln!(writer, "{json}")?;
    Ok(())
}

/// Writes a value as YAML.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_yaml<W: Write, T: Serialize + ?Sized>(
    writer: &mut W,
    value: &T,
) -> Result<(), Box<dyn std::error::Error>> {
    let yaml = serde_yaml_ng::to_string(value)?;
    write!(writer, "{yaml}")?;
    Ok(())
}

/// Writes `value` as JSON or YAML, or through `table` for the table format.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_as<W, T, F>(
    writer: &mut W,
    format: OutputFormat,
    value: &T,
    table: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    W: Write,
    T: Serialize + ?Sized,
    F: FnOnce(&mut W, &T) -> std::io::Result<()>,
{
    match format {
        OutputFormat::Table => Ok(table(writer, value)?),
        OutputFormat::Json => write_json(writer, value),
        OutputFormat::Yaml => write_yaml(writer, value),
    }
}
