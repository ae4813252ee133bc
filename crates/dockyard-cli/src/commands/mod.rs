//! CLI command implementations.

pub mod builds;
pub mod hooks;

use anyhow::{Context, Result};
use dockyard_config::{SpecWarning, parse_spec, validate_spec};

/// Parse `content` and collect authoring warnings.
fn check_spec(content: &str) -> Result<Vec<SpecWarning>> {
    let spec = parse_spec(content)?;
    Ok(validate_spec(&spec))
}

pub fn validate(path: &str) -> Result<()> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    match check_spec(&content) {
        Ok(warnings) if warnings.is_empty() => {
            println!("Specification is valid");
            Ok(())
        }
        Ok(warnings) => {
            for warning in &warnings {
                println!("warning: {}", warning);
            }
            println!("Specification parsed with {} warning(s)", warnings.len());
            Ok(())
        }
        Err(e) => {
            println!("Specification error: {}", e);
            std::process::exit(1);
        }
    }
}
