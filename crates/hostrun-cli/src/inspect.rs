//! Inspect command implementation.
//!
//! Prints the metadata block at the top of a script.

use crate::colors;
use crate::fragments;

pub fn execute(file: &str) -> anyhow::Result<()> {
    let source = fragments::read_document(file)?;
    let metadata = hostrun_core::extract_metadata(&source);

    if metadata.name.is_none() {
        eprintln!(
            "{}No metadata name found in {}{}",
            colors::DIM,
            file,
            colors::RESET
        );
    }
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}
