//! Types shared by the combination pipeline.

use serde::{Deserialize, Serialize};

/// A named unit of source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFragment {
    /// File name used for diagnostics and as the script label.
    pub file_name: String,
    /// Source text.
    pub content: String,
}

impl SourceFragment {
    pub fn new(file_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }
}

/// A top-level type declaration lifted out of a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDeclaration {
    /// Declared name, when one could be read.
    pub name: Option<String>,
    /// Rendered declaration text (dedup key).
    pub text: String,
    /// Fragment that first declared it.
    pub file_name: String,
    /// Line of the declaration in that fragment.
    pub line: usize,
}

/// Options controlling how fragments are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CombineOptions {
    /// Fail with `NoEntryPoint` when a multi-fragment set has no statements.
    pub require_entry: bool,
    /// Prefix statements and declarations with `#line` directives.
    pub line_directives: bool,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            require_entry: true,
            line_directives: false,
        }
    }
}

/// The single compile unit built from a set of fragments.
///
/// Immutable once built. The rendered text is what the compiler sees; the
/// individual parts stay available for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedUnit {
    pub(crate) text: String,
    pub(crate) entry_file: Option<String>,
    pub(crate) global_imports: Vec<String>,
    pub(crate) imports: Vec<String>,
    pub(crate) statements: String,
    pub(crate) declarations: Vec<TypeDeclaration>,
}

impl CombinedUnit {
    /// Rendered compile unit.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// File name of the fragment that contributed the statements.
    pub fn entry_file(&self) -> Option<&str> {
        self.entry_file.as_deref()
    }

    /// Deduplicated global-scope imports, in first-sighting order.
    pub fn global_imports(&self) -> &[String] {
        &self.global_imports
    }

    /// Deduplicated ordinary imports, in first-sighting order.
    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    /// Top-level statements of the entry fragment (may be empty).
    pub fn statements(&self) -> &str {
        &self.statements
    }

    /// Deduplicated type declarations.
    pub fn declarations(&self) -> &[TypeDeclaration] {
        &self.declarations
    }

    /// Whether the unit carries executable statements.
    pub fn has_statements(&self) -> bool {
        !self.statements.is_empty()
    }
}

impl std::fmt::Display for CombinedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for CombinedUnit {
    fn as_ref(&self) -> &str {
        &self.text
    }
}
