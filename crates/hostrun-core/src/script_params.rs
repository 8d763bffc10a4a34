//! Parameters a script declares for its callers.
//!
//! A top-level local declaration becomes a parameter when it carries a
//! `[Parameter]` attribute or sits below a `// [Parameter ...]` comment:
//!
//! ```text
//! [Parameter(Options = new[] { "Grid", "Line" }, Description = "Layout")]
//! string mode = "Grid";
//!
//! // [Parameter(Options: "L1, L2", MultiSelect: true, VisibleWhen: "mode == 'Grid'")]
//! var levels = new List<string> { "L1" };
//! ```
//!
//! The initializer decides type and default: string, boolean and numeric
//! literals give `string`, `boolean` and `number`; list initializers give a
//! list of strings. Any other initializer gives a `string` parameter with no
//! default.

use serde::Serialize;
use serde_json::Value;

use crate::combine::scanner::{self, ItemKind, Token, TokenKind};

/// Keys that end an unquoted option list in the comment form.
const COMMENT_KEYS: &[&str] = &["MultiSelect", "VisibleWhen", "Description"];

/// A parameter declared by a script.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParameter {
    pub name: String,
    /// `string`, `number` or `boolean`.
    #[serde(rename = "type")]
    pub kind: String,
    pub default_value: Option<Value>,
    pub description: Option<String>,
    pub options: Vec<String>,
    pub multi_select: bool,
    pub visible_when: Option<String>,
}

/// What the `[Parameter]` marker of a declaration says.
#[derive(Debug, Default)]
struct Marker {
    from_attribute: bool,
    description: Option<String>,
    options: Vec<String>,
    multi_select: bool,
    visible_when: Option<String>,
}

/// Type, default and whether the default came from `new() { ... }`.
struct Initializer {
    kind: &'static str,
    default_value: Option<Value>,
    implicit_list: bool,
}

/// Extract the declared parameters of `source`, in source order.
///
/// Source that cannot be scanned declares no parameters.
pub fn extract_parameters(source: &str) -> Vec<ScriptParameter> {
    if source.trim().is_empty() {
        return Vec::new();
    }

    let scanned = match scanner::scan("<parameters>", source) {
        Ok(scanned) => scanned,
        Err(e) => {
            tracing::warn!("Cannot read parameters: {}", e);
            return Vec::new();
        }
    };

    let mut parameters = Vec::new();
    let mut previous_end = 0;
    for item in &scanned.items {
        let leading = previous_end..item.start;
        let follows_item = previous_end > 0;
        previous_end = item.end;
        if item.kind != ItemKind::Statement {
            continue;
        }

        let lo = scanned.tokens.partition_point(|t| t.start < item.start);
        let hi = scanned.tokens.partition_point(|t| t.end <= item.end);
        let tokens = &scanned.tokens[lo..hi];

        let (attribute, body_at) = read_attributes(source, tokens);
        let marker = match attribute {
            Some(marker) => marker,
            None => {
                // A comment on the previous item's line belongs to that item.
                let comment = scanned.line_comments.iter().find(|c| {
                    leading.contains(&c.start)
                        && c.text.contains("[Parameter")
                        && (!follows_item || source[leading.start..c.start].contains('\n'))
                });
                match comment {
                    Some(comment) => comment_marker(&comment.text),
                    None => continue,
                }
            }
        };

        let Some(declarators) = declarators(&tokens[body_at..]) else {
            tracing::debug!("Marked statement at line {} is not a declaration", item.line);
            continue;
        };
        for (name, init) in declarators {
            let init = classify(source, init);
            parameters.push(ScriptParameter {
                name: name.to_string(),
                kind: init.kind.to_string(),
                default_value: init.default_value,
                description: marker.description.clone(),
                options: marker.options.clone(),
                multi_select: marker.multi_select
                    || (init.implicit_list && !marker.from_attribute),
                visible_when: marker.visible_when.clone(),
            });
        }
    }

    tracing::debug!("Extracted {} parameter(s)", parameters.len());
    parameters
}

/// Read leading `[...]` groups; returns the parameter marker among them and
/// the index of the first token after them.
fn read_attributes(source: &str, tokens: &[Token]) -> (Option<Marker>, usize) {
    let mut marker = None;
    let mut j = 0;
    while j < tokens.len() && tokens[j].kind == TokenKind::Open('[') {
        let close = scanner::skip_group(tokens, j);
        if marker.is_none() {
            marker = attribute_marker(source, &tokens[j + 1..close]);
        }
        j = close + 1;
    }
    (marker, j)
}

fn attribute_marker(source: &str, list: &[Token]) -> Option<Marker> {
    for attribute in split_top_level(list) {
        let args_at = attribute
            .iter()
            .position(|t| t.kind == TokenKind::Open('('))
            .unwrap_or(attribute.len());
        let is_parameter = attribute[..args_at]
            .iter()
            .any(|t| t.ident().is_some_and(|w| w.contains("Parameter")));
        if !is_parameter {
            continue;
        }

        let mut marker = Marker {
            from_attribute: true,
            ..Marker::default()
        };
        if args_at < attribute.len() {
            let close = scanner::skip_group(attribute, args_at);
            for argument in split_top_level(&attribute[args_at + 1..close]) {
                apply_argument(source, &mut marker, argument);
            }
        }
        return Some(marker);
    }
    None
}

/// Apply a named argument, `Name = value` or `Name: value`.
fn apply_argument(source: &str, marker: &mut Marker, argument: &[Token]) {
    let [name, separator, value @ ..] = argument else {
        return;
    };
    if !matches!(separator.kind, TokenKind::Punct('=' | ':')) {
        return;
    }
    match name.ident() {
        Some("Options") => marker.options = literal_list(source, value).unwrap_or_default(),
        Some("MultiSelect") => {
            if let Some(Value::Bool(multi_select)) = literal(source, value) {
                marker.multi_select = multi_select;
            }
        }
        Some("Description") => marker.description = string_literal(source, value),
        Some("VisibleWhen") => marker.visible_when = string_literal(source, value),
        _ => {}
    }
}

fn comment_marker(text: &str) -> Marker {
    let multi_select = text.contains("MultiSelect")
        && !text.contains("MultiSelect: false")
        && !text.contains("MultiSelect:false");
    Marker {
        from_attribute: false,
        description: quoted_after(text, "Description:"),
        options: comment_options(text),
        multi_select,
        visible_when: quoted_after(text, "VisibleWhen:"),
    }
}

/// First quoted string after `key`.
fn quoted_after(text: &str, key: &str) -> Option<String> {
    let rest = &text[text.find(key)? + key.len()..];
    let open = rest.find('"')? + 1;
    let close = open + rest[open..].find('"')?;
    Some(rest[open..close].to_string())
}

/// `Options: "A, B"` or the older unquoted `Options: A, B` form.
fn comment_options(text: &str) -> Vec<String> {
    let Some(at) = text.find("Options:") else {
        return Vec::new();
    };
    let rest = text[at + "Options:".len()..].trim();
    let list = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next().unwrap_or_default(),
        None => {
            let end = COMMENT_KEYS
                .iter()
                .filter_map(|key| rest.find(key))
                .min()
                .unwrap_or(rest.len());
            rest[..end].trim_end_matches([')', ']', ',', ' '])
        }
    };
    list.split(',')
        .map(str::trim)
        .filter(|option| !option.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a local declaration into (name, initializer) pairs, skipping
/// declarators without an initializer. `None` when the statement does not
/// declare anything.
fn declarators(tokens: &[Token]) -> Option<Vec<(&str, &[Token])>> {
    let mut start = 0;
    while tokens.get(start)?.is_ident("const") {
        start += 1;
    }
    let end = match tokens.last()?.kind {
        TokenKind::Punct(';') => tokens.len() - 1,
        _ => tokens.len(),
    };
    let body = tokens.get(start..end)?;

    let eq = top_level_assignment(body)?;
    let name_at = eq.checked_sub(1)?;
    let type_tokens = &body[..name_at];
    if type_tokens.first()?.ident().is_none()
        || type_tokens.last()?.kind == TokenKind::Punct('.')
        || !type_tokens.iter().all(is_type_token)
    {
        return None;
    }

    let mut found = Vec::new();
    for declarator in split_top_level(&body[name_at..]) {
        if let [name, assign, init @ ..] = declarator
            && assign.kind == TokenKind::Punct('=')
            && !init.is_empty()
            && let Some(name) = name.ident()
        {
            found.push((name, init));
        }
    }
    Some(found)
}

/// Index of the first top-level plain `=` (not `==`, `=>`, `+=`...).
fn top_level_assignment(tokens: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => depth = depth.saturating_sub(1),
            TokenKind::Punct('=') if depth == 0 => {
                let joined_after = tokens.get(i + 1).is_some_and(|next| {
                    next.start == token.end && matches!(next.kind, TokenKind::Punct('=' | '>'))
                });
                let joined_before = i > 0
                    && tokens[i - 1].end == token.start
                    && matches!(tokens[i - 1].kind, TokenKind::Punct(_));
                if joined_after || joined_before {
                    return None;
                }
                return Some(i);
            }
            _ => {}
        }
    }
    None
}

fn is_type_token(token: &Token) -> bool {
    matches!(
        token.kind,
        TokenKind::Ident(_)
            | TokenKind::Punct('.' | '<' | '>' | ',' | '?' | ':')
            | TokenKind::Open('[')
            | TokenKind::Close(']')
    )
}

fn classify(source: &str, init: &[Token]) -> Initializer {
    let untyped = Initializer {
        kind: "string",
        default_value: None,
        implicit_list: false,
    };

    if init.first().is_some_and(|t| t.is_ident("new")) {
        let implicit = init.get(1).is_some_and(|t| t.kind == TokenKind::Open('('));
        let is_list = implicit
            || init[1..]
                .iter()
                .take_while(|t| !matches!(t.kind, TokenKind::Open(_)))
                .any(|t| t.ident().is_some_and(|w| w.contains("List")));
        let braces = init.iter().position(|t| t.kind == TokenKind::Open('{'));
        return match braces {
            Some(open) if is_list => Initializer {
                kind: "string",
                default_value: Some(Value::from(group_strings(source, init, open))),
                implicit_list: implicit,
            },
            _ => untyped,
        };
    }

    match literal(source, init) {
        Some(Value::Bool(b)) => Initializer {
            kind: "boolean",
            default_value: Some(Value::Bool(b)),
            implicit_list: false,
        },
        Some(number @ Value::Number(_)) => Initializer {
            kind: "number",
            default_value: Some(number),
            implicit_list: false,
        },
        Some(string @ Value::String(_)) => Initializer {
            kind: "string",
            default_value: Some(string),
            implicit_list: false,
        },
        _ => untyped,
    }
}

/// Literal elements of `{ ... }` or `[ ... ]` in `tokens`, as text.
fn literal_list(source: &str, tokens: &[Token]) -> Option<Vec<String>> {
    let open = tokens
        .iter()
        .position(|t| t.kind == TokenKind::Open('{'))
        .or_else(|| (tokens.first()?.kind == TokenKind::Open('[')).then_some(0))?;
    Some(group_strings(source, tokens, open))
}

fn group_strings(source: &str, tokens: &[Token], open: usize) -> Vec<String> {
    let close = scanner::skip_group(tokens, open);
    split_top_level(&tokens[open + 1..close])
        .into_iter()
        .filter_map(|element| match literal(source, element)? {
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
        .collect()
}

fn string_literal(source: &str, tokens: &[Token]) -> Option<String> {
    match literal(source, tokens)? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// Value of a string, boolean or numeric literal.
fn literal(source: &str, tokens: &[Token]) -> Option<Value> {
    match tokens {
        [t] if t.is_ident("true") => Some(Value::Bool(true)),
        [t] if t.is_ident("false") => Some(Value::Bool(false)),
        [t] if t.kind == TokenKind::Literal && !source[t.start..].starts_with('\'') => {
            let text = &source[t.start..t.end];
            match string_value(text) {
                Some(s) => Some(Value::String(s)),
                None => number(text),
            }
        }
        [first, .., last] => number(&source[first.start..last.end]),
        _ => None,
    }
}

fn string_value(text: &str) -> Option<String> {
    if let Some(body) = text.strip_prefix("@\"") {
        return Some(body.strip_suffix('"')?.replace("\"\"", "\""));
    }
    if text.starts_with("\"\"\"") {
        return Some(raw_body(text.trim_matches('"')));
    }
    let body = text.strip_prefix('"')?.strip_suffix('"')?;
    Some(unescape(body))
}

/// Content of a raw string; multi-line bodies lose the closing line's indent.
fn raw_body(body: &str) -> String {
    let Some(rest) = body.strip_prefix('\n').or_else(|| body.strip_prefix("\r\n")) else {
        return body.to_string();
    };
    let (content, indent) = rest.rsplit_once('\n').unwrap_or((rest, ""));
    content
        .lines()
        .map(|line| line.strip_prefix(indent).unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Integer or double literal, optionally negated. Float, decimal and long
/// suffixes are not numbers here.
fn number(text: &str) -> Option<Value> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text),
    };
    if !digits.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let digits = digits.replace('_', "");

    let hex = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .map(|hex| i64::from_str_radix(hex, 16));
    let integer = match hex {
        Some(parsed) => Some(parsed.ok()?),
        None => digits.parse::<i64>().ok(),
    };
    if let Some(integer) = integer {
        return Some(Value::from(if negative { -integer } else { integer }));
    }

    let double = digits
        .strip_suffix(['d', 'D'])
        .unwrap_or(&digits)
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite())?;
    Some(Value::from(if negative { -double } else { double }))
}

/// Split at commas outside brackets, dropping empty parts.
fn split_top_level(tokens: &[Token]) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => depth = depth.saturating_sub(1),
            TokenKind::Punct(',') if depth == 0 => {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&tokens[start..]);
    parts.retain(|part| !part.is_empty());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn only(source: &str) -> ScriptParameter {
        let mut parameters = extract_parameters(source);
        assert_eq!(parameters.len(), 1, "{parameters:?}");
        parameters.remove(0)
    }

    #[test]
    fn test_attribute_form() {
        let p = only(
            "[Parameter(Options = new[] { \"Grid\", \"Line\" }, Description = \"Layout\", VisibleWhen = \"count > 1\")]\nstring mode = \"Grid\";\nRun(mode);",
        );
        assert_eq!(p.name, "mode");
        assert_eq!(p.kind, "string");
        assert_eq!(p.default_value, Some(json!("Grid")));
        assert_eq!(p.options, vec!["Grid", "Line"]);
        assert_eq!(p.description.as_deref(), Some("Layout"));
        assert_eq!(p.visible_when.as_deref(), Some("count > 1"));
        assert!(!p.multi_select);
    }

    #[test]
    fn test_attribute_multi_select_and_explicit_array() {
        let p = only(
            "[ScriptParameter(MultiSelect = true, Options = new string[] { \"L1\", \"L2\" })]\nvar levels = new List<string> { \"L1\" };",
        );
        assert!(p.multi_select);
        assert_eq!(p.options, vec!["L1", "L2"]);
        assert_eq!(p.default_value, Some(json!(["L1"])));
    }

    #[test]
    fn test_comment_form() {
        let p = only(
            "// [Parameter(Options: \"A, B, C\", MultiSelect: true, VisibleWhen: \"mode == 'Grid'\")]\nstring choice = \"A\";",
        );
        assert_eq!(p.options, vec!["A", "B", "C"]);
        assert!(p.multi_select);
        assert_eq!(p.visible_when.as_deref(), Some("mode == 'Grid'"));
    }

    #[test]
    fn test_old_comment_form() {
        let p = only("// [Parameter] Options: A, B, C MultiSelect\nvar pick = \"B\";");
        assert_eq!(p.options, vec!["A", "B", "C"]);
        assert!(p.multi_select);

        let p = only("// [Parameter] MultiSelect: false\nvar pick = \"B\";");
        assert!(!p.multi_select);
        assert!(p.options.is_empty());
    }

    #[test]
    fn test_literal_types() {
        let source = r#"
// [Parameter]
bool dryRun = true;
// [Parameter]
int count = 3;
// [Parameter]
double height = 2.75;
// [Parameter]
var offset = -1.5;
// [Parameter]
string path = @"C:\temp\""x""";
// [Parameter]
string label = "Line\n\"quoted\"";
"#;
        let parameters = extract_parameters(source);
        let summary: Vec<_> = parameters
            .iter()
            .map(|p| (p.name.as_str(), p.kind.as_str(), p.default_value.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("dryRun", "boolean", Some(json!(true))),
                ("count", "number", Some(json!(3))),
                ("height", "number", Some(json!(2.75))),
                ("offset", "number", Some(json!(-1.5))),
                ("path", "string", Some(json!("C:\\temp\\\"x\""))),
                ("label", "string", Some(json!("Line\n\"quoted\""))),
            ]
        );
    }

    #[test]
    fn test_implicit_list_is_multi_select_only_without_attribute() {
        let p = only("// [Parameter]\nList<string> levels = new() { \"L1\", \"L2\" };");
        assert_eq!(p.kind, "string");
        assert_eq!(p.default_value, Some(json!(["L1", "L2"])));
        assert!(p.multi_select);

        let p = only("[Parameter]\nList<string> levels = new() { \"L1\" };");
        assert!(!p.multi_select);
    }

    #[test]
    fn test_other_initializers_have_no_default() {
        let source = "// [Parameter]\nvar when = DateTime.Now;\n// [Parameter]\nfloat ratio = 0.5f;\n// [Parameter]\nvar name = $\"{x}\";";
        for p in extract_parameters(source) {
            assert_eq!(p.kind, "string", "{p:?}");
            assert_eq!(p.default_value, None, "{p:?}");
        }
        assert_eq!(extract_parameters(source).len(), 3);
    }

    #[test]
    fn test_multiple_declarators_skip_missing_initializers() {
        let parameters =
            extract_parameters("// [Parameter]\nint width = 1, depth, height = 3;");
        let names: Vec<_> = parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["width", "height"]);
    }

    #[test]
    fn test_unmarked_and_non_declarations_are_ignored() {
        let source = "\
int plain = 1;
Run(); // [Parameter] trailing comment
int notMarked = 2;
// [Parameter]
count = 5;
class Settings { [Parameter] public int Field = 1; }
";
        assert!(extract_parameters(source).is_empty());
    }

    #[test]
    fn test_unscannable_source_declares_nothing() {
        assert!(extract_parameters("// [Parameter]\nstring s = \"open;\n").is_empty());
        assert!(extract_parameters("   ").is_empty());
    }

    #[test]
    fn test_serializes_camel_case() {
        let p = only("[Parameter(Description = \"Count\")]\nint count = 2;");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "number");
        assert_eq!(json["defaultValue"], 2);
        assert_eq!(json["multiSelect"], false);
        assert!(json["visibleWhen"].is_null());
    }
}
