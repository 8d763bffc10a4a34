//! Combine command implementation.
//!
//! Merges the given files into one compile unit and prints it.

use hostrun_core::{CombineOptions, CombinedUnit};
use serde_json::json;

use crate::colors;
use crate::fragments;

/// Combine `files` and print the unit.
pub fn execute(files: &[String], options: &CombineOptions, as_json: bool) -> anyhow::Result<()> {
    let fragments = fragments::read_all(files)?;
    let unit = hostrun_core::combine(&fragments, options)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&describe(&unit))?);
        return Ok(());
    }

    eprintln!(
        "{}Combined{} {} file(s), entry: {}{}{}",
        colors::GREEN,
        colors::RESET,
        fragments.len(),
        colors::BOLD,
        unit.entry_file().unwrap_or("(library)"),
        colors::RESET
    );
    println!("{}", unit);
    Ok(())
}

fn describe(unit: &CombinedUnit) -> serde_json::Value {
    let declarations: Vec<_> = unit
        .declarations()
        .iter()
        .map(|d| json!({ "name": d.name, "file": d.file_name, "line": d.line }))
        .collect();

    json!({
        "entryFile": unit.entry_file(),
        "globalImports": unit.global_imports(),
        "imports": unit.imports(),
        "statements": unit.statements(),
        "declarations": declarations,
        "text": unit.text(),
    })
}
