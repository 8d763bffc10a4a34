//! Entry command implementation.

use crate::colors;
use crate::fragments;

/// Print the name of the fragment holding the top-level statements.
pub fn execute(files: &[String]) -> anyhow::Result<()> {
    let fragments = fragments::read_all(files)?;

    match hostrun_core::identify_entry_fragment(&fragments)? {
        Some(entry) => println!("{}", entry.file_name),
        None => {
            println!("(none)");
            eprintln!(
                "{}No file contains top-level statements.{}",
                colors::YELLOW,
                colors::RESET
            );
        }
    }
    Ok(())
}
