//! Params command implementation.
//!
//! Validates a parameter document the way the runner parses it and prints
//! the normalized name/value map.

use hostrun_core::ParameterSet;

use crate::colors;
use crate::fragments;

pub fn execute(file: &str) -> anyhow::Result<()> {
    let document = fragments::read_document(file)?;
    let params = ParameterSet::parse(&document)?;

    eprintln!(
        "{}Valid{} parameter document with {} value(s)",
        colors::GREEN,
        colors::RESET,
        params.len()
    );
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}
