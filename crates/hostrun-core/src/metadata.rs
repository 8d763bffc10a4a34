//! Script metadata read from block comments.
//!
//! Metadata lives in `/* ... */` comments as `Key: value` lines:
//!
//! ```text
//! /*
//! Name: Create Walls
//! Author: Jane Doe
//! Categories: Architectural, Walls
//! Description:
//! Creates walls along the selected curves.
//! */
//! ```
//!
//! `Description` and `History` may continue over following lines until a
//! blank line or the next key.

use serde::Serialize;

use crate::combine::scanner;

/// Document kinds a script may declare; anything else falls back to `Any`.
const DOCUMENT_TYPES: &[&str] = &["Project", "Family", "ConceptualMass"];

/// Metadata declared by a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    pub website: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub document_type: String,
    pub dependencies: Vec<String>,
    pub history: Option<String>,
}

impl Default for ScriptMetadata {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            author: None,
            version: None,
            website: None,
            categories: Vec::new(),
            tags: Vec::new(),
            document_type: "Any".to_string(),
            dependencies: Vec::new(),
            history: None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Key {
    Name,
    Description,
    Author,
    Version,
    Website,
    Categories,
    Tags,
    DocumentType,
    Dependencies,
    History,
}

impl Key {
    fn parse(word: &str) -> Option<Self> {
        let key = match word.to_ascii_lowercase().as_str() {
            "name" => Key::Name,
            "description" => Key::Description,
            "author" => Key::Author,
            "version" => Key::Version,
            "website" => Key::Website,
            "categories" => Key::Categories,
            "tags" => Key::Tags,
            "documenttype" => Key::DocumentType,
            "dependencies" => Key::Dependencies,
            "history" => Key::History,
            _ => return None,
        };
        Some(key)
    }

    fn is_multiline(self) -> bool {
        matches!(self, Key::Description | Key::History)
    }
}

/// Extract metadata from the block comments of `source`.
///
/// Source that cannot be scanned yields default metadata.
pub fn extract_metadata(source: &str) -> ScriptMetadata {
    let mut metadata = ScriptMetadata::default();
    if source.trim().is_empty() {
        return metadata;
    }

    let comments = match scanner::scan("<metadata>", source) {
        Ok(scanned) => scanned.block_comments,
        Err(e) => {
            tracing::warn!("Cannot read metadata: {}", e);
            return metadata;
        }
    };

    for comment in &comments {
        apply_comment(&mut metadata, comment);
    }
    metadata
}

fn apply_comment(metadata: &mut ScriptMetadata, comment: &str) {
    let lines: Vec<&str> = comment
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .collect();

    let mut open: Option<(Key, Vec<&str>)> = None;
    for line in lines {
        if let Some((key, value)) = split_key(line) {
            if let Some((key, body)) = open.take() {
                set(metadata, key, &body.join("\n"));
            }
            if key.is_multiline() {
                let first = if value.is_empty() { vec![] } else { vec![value] };
                open = Some((key, first));
            } else {
                set(metadata, key, value);
            }
            continue;
        }

        match &mut open {
            Some((key, body)) if line.is_empty() => {
                let key = *key;
                let text = body.join("\n");
                open = None;
                set(metadata, key, &text);
            }
            Some((_, body)) => body.push(line),
            None => {}
        }
    }
    if let Some((key, body)) = open {
        set(metadata, key, &body.join("\n"));
    }
}

fn split_key(line: &str) -> Option<(Key, &str)> {
    let (word, value) = line.split_once(':')?;
    let key = Key::parse(word.trim())?;
    Some((key, value.trim()))
}

fn set(metadata: &mut ScriptMetadata, key: Key, value: &str) {
    let value = value.trim();
    let text = || (!value.is_empty()).then(|| value.to_string());
    match key {
        Key::Name => metadata.name = text(),
        Key::Description => metadata.description = text(),
        Key::Author => metadata.author = text(),
        Key::Version => metadata.version = text(),
        Key::Website => metadata.website = text(),
        Key::History => metadata.history = text(),
        Key::Categories => metadata.categories.extend(split_list(value)),
        Key::Tags => metadata.tags.extend(split_list(value)),
        Key::Dependencies => metadata.dependencies.extend(split_list(value)),
        Key::DocumentType => {
            if let Some(kind) = DOCUMENT_TYPES.iter().find(|k| k.eq_ignore_ascii_case(value)) {
                metadata.document_type = kind.to_string();
            }
        }
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
