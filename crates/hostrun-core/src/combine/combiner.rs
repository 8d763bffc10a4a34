//! Merges a set of fragments into one compile unit.

use rustc_hash::FxHashSet;

use crate::error::{Error, Result};

use super::scanner::{Item, ItemKind, ScannedFragment, line_of, scan};
use super::types::{CombineOptions, CombinedUnit, SourceFragment, TypeDeclaration};

/// Name of the parameter holder type, placed first among declarations.
const PARAMS_TYPE: &str = "Params";

/// Find the fragment that carries the top-level statements.
///
/// A single fragment is always the entry fragment. Among several, exactly
/// one may contain statements; `Ok(None)` means none does.
pub fn identify_entry_fragment(fragments: &[SourceFragment]) -> Result<Option<&SourceFragment>> {
    let scanned = scan_all(fragments)?;
    Ok(entry_index(fragments, &scanned)?.map(|i| &fragments[i]))
}

/// Combine `fragments` into a single [`CombinedUnit`].
///
/// # Errors
///
/// - `EmptyInput` when no fragments are given
/// - `FragmentParse` when a fragment cannot be scanned
/// - `MultipleEntryPoints` when several fragments contain statements
/// - `NoEntryPoint` when none does and `options.require_entry` is set
pub fn combine(fragments: &[SourceFragment], options: &CombineOptions) -> Result<CombinedUnit> {
    if fragments.is_empty() {
        return Err(Error::EmptyInput);
    }

    let scanned = scan_all(fragments)?;
    let entry = entry_index(fragments, &scanned)?;
    if entry.is_none() && options.require_entry {
        return Err(Error::NoEntryPoint);
    }

    let mut global_imports = Group::default();
    let mut imports = Group::default();
    let mut declarations: Vec<TypeDeclaration> = Vec::new();
    let mut seen_declarations: FxHashSet<String> = FxHashSet::default();

    for (fragment, scan) in fragments.iter().zip(&scanned) {
        for item in &scan.items {
            let text = fragment.content[item.start..item.end].trim();
            match &item.kind {
                ItemKind::Import { global: true } => global_imports.insert(text),
                ItemKind::Import { global: false } => imports.insert(text),
                ItemKind::TypeDecl { name } => {
                    if seen_declarations.insert(text.to_string()) {
                        declarations.push(TypeDeclaration {
                            name: name.clone(),
                            text: text.to_string(),
                            file_name: fragment.file_name.clone(),
                            line: item.line,
                        });
                    }
                }
                ItemKind::Statement => {}
            }
        }
    }

    // Stable: only moves the parameter holder to the front.
    declarations.sort_by_key(|d| d.name.as_deref() != Some(PARAMS_TYPE));

    let (statements, statements_line) = match entry {
        Some(i) => strip_declarations(&fragments[i].content, &scanned[i].items),
        None => (String::new(), 1),
    };
    let entry_file = entry.map(|i| fragments[i].file_name.clone());

    let mut parts: Vec<String> = Vec::new();
    if !global_imports.lines.is_empty() {
        parts.push(global_imports.lines.join("\n"));
    }
    if !imports.lines.is_empty() {
        parts.push(imports.lines.join("\n"));
    }
    if !statements.is_empty() {
        match (&entry_file, options.line_directives) {
            (Some(file), true) => {
                parts.push(format!("#line {statements_line} \"{file}\"\n{statements}"))
            }
            _ => parts.push(statements.clone()),
        }
    }
    for decl in &declarations {
        if options.line_directives {
            parts.push(format!(
                "#line {} \"{}\"\n{}",
                decl.line, decl.file_name, decl.text
            ));
        } else {
            parts.push(decl.text.clone());
        }
    }

    tracing::debug!(
        "Combined {} fragments (entry: {:?}, {} imports, {} declarations)",
        fragments.len(),
        entry_file,
        global_imports.lines.len() + imports.lines.len(),
        declarations.len()
    );

    Ok(CombinedUnit {
        text: parts.join("\n\n"),
        entry_file,
        global_imports: global_imports.lines,
        imports: imports.lines,
        statements,
        declarations,
    })
}

/// Ordered, deduplicated list of import lines.
#[derive(Default)]
struct Group {
    lines: Vec<String>,
    seen: FxHashSet<String>,
}

impl Group {
    fn insert(&mut self, line: &str) {
        if self.seen.insert(line.to_string()) {
            self.lines.push(line.to_string());
        }
    }
}

fn scan_all(fragments: &[SourceFragment]) -> Result<Vec<ScannedFragment>> {
    fragments
        .iter()
        .map(|f| scan(&f.file_name, &f.content))
        .collect()
}

fn entry_index(fragments: &[SourceFragment], scanned: &[ScannedFragment]) -> Result<Option<usize>> {
    if fragments.len() == 1 {
        return Ok(Some(0));
    }

    let candidates: Vec<usize> = scanned
        .iter()
        .enumerate()
        .filter(|(_, s)| s.has_statements())
        .map(|(i, _)| i)
        .collect();

    match candidates.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(*single)),
        many => Err(Error::MultipleEntryPoints {
            files: many.iter().map(|&i| fragments[i].file_name.clone()).collect(),
        }),
    }
}

/// Remove imports and declarations from `source`, keeping statements and
/// the trivia around them. Returns the trimmed text and its starting line.
fn strip_declarations(source: &str, items: &[Item]) -> (String, usize) {
    let mut out = String::with_capacity(source.len());
    let mut first_kept: Option<usize> = None;
    let mut cursor = 0;

    let mut keep = |from: usize, to: usize, out: &mut String| {
        let segment = &source[from..to];
        if first_kept.is_none()
            && let Some(offset) = segment.find(|c: char| !c.is_whitespace())
        {
            first_kept = Some(from + offset);
        }
        out.push_str(segment);
    };

    for item in items.iter().filter(|i| i.kind != ItemKind::Statement) {
        keep(cursor, item.start, &mut out);
        cursor = end_of_line_after(source, item.end);
    }
    keep(cursor, source.len(), &mut out);

    let line = first_kept.map(|o| line_of(source, o)).unwrap_or(1);
    (out.trim().to_string(), line)
}

/// Position after trailing blanks and one line break following `pos`.
fn end_of_line_after(source: &str, pos: usize) -> usize {
    let bytes = source.as_bytes();
    let mut i = pos;
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'\r' {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'\n' {
        i += 1;
    }
    i
}
