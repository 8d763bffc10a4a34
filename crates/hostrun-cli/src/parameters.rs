//! Parameters command implementation.
//!
//! Lists the parameters a script declares, as JSON.

use crate::colors;
use crate::fragments;

pub fn execute(file: &str) -> anyhow::Result<()> {
    let source = fragments::read_document(file)?;
    let parameters = hostrun_core::extract_parameters(&source);

    eprintln!(
        "{}{} declared parameter(s){}",
        colors::DIM,
        parameters.len(),
        colors::RESET
    );
    println!("{}", serde_json::to_string_pretty(&parameters)?);
    Ok(())
}
