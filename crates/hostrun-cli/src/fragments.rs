//! Reading source fragments from disk.

use std::path::Path;

use anyhow::Context;
use hostrun_core::SourceFragment;

/// Read each file into a fragment named after its file name.
pub fn read_all(paths: &[String]) -> anyhow::Result<Vec<SourceFragment>> {
    paths.iter().map(|path| read(path)).collect()
}

fn read(path: &str) -> anyhow::Result<SourceFragment> {
    let path = Path::new(path);
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Source file not found or unreadable: {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    tracing::debug!("Read {} ({} bytes)", file_name, content.len());
    Ok(SourceFragment::new(file_name, content))
}

/// Read a whole file, or stdin when `path` is `-`.
pub fn read_document(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        return std::io::read_to_string(std::io::stdin()).context("Failed to read stdin");
    }
    std::fs::read_to_string(path).with_context(|| format!("File not found or unreadable: {}", path))
}
