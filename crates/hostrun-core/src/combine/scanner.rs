//! Lexical scanner that splits one fragment into top-level items.
//!
//! The scanner understands enough of the script syntax to find item
//! boundaries reliably: comments, preprocessor lines, every string literal
//! form (regular, verbatim, interpolated, raw), char literals and bracket
//! nesting. It does not build a syntax tree.

use crate::error::{Error, Result};

/// Modifiers that may precede a type declaration.
const TYPE_MODIFIERS: &[&str] = &[
    "public", "private", "protected", "internal", "static", "sealed", "abstract", "partial",
    "readonly", "unsafe", "new", "file", "ref",
];

/// Keywords that introduce a type declaration.
const TYPE_KEYWORDS: &[&str] = &["class", "struct", "interface", "enum", "record", "namespace"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident(String),
    Literal,
    Punct(char),
    Open(char),
    Close(char),
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub(crate) fn is_ident(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(w) if w == word)
    }

    pub(crate) fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(w) => Some(w),
            _ => None,
        }
    }
}

/// Kind of a top-level item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ItemKind {
    /// `using ...;` directive, `global` marks the global-scope form.
    Import { global: bool },
    /// Type (or namespace) declaration with its declared name.
    TypeDecl { name: Option<String> },
    /// Anything executable.
    Statement,
}

/// A top-level item and its byte span in the fragment source.
#[derive(Debug, Clone)]
pub(crate) struct Item {
    pub kind: ItemKind,
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

/// A `// ...` comment; `text` excludes the slashes.
#[derive(Debug, Clone)]
pub(crate) struct LineComment {
    pub start: usize,
    pub text: String,
}

/// Result of scanning a fragment.
#[derive(Debug, Default)]
pub(crate) struct ScannedFragment {
    pub items: Vec<Item>,
    pub tokens: Vec<Token>,
    /// Inner text of every `/* ... */` comment, in source order.
    pub block_comments: Vec<String>,
    pub line_comments: Vec<LineComment>,
}

impl ScannedFragment {
    pub fn has_statements(&self) -> bool {
        self.items.iter().any(|i| i.kind == ItemKind::Statement)
    }
}

/// Scan `source` (named `file` in diagnostics) into top-level items.
pub(crate) fn scan(file: &str, source: &str) -> Result<ScannedFragment> {
    let mut lexer = Lexer::new(file, source);
    let tokens = lexer.tokenize()?;
    check_brackets(file, &tokens)?;

    let items = split_items(file, &tokens)?;
    Ok(ScannedFragment {
        items,
        tokens,
        block_comments: lexer.block_comments,
        line_comments: lexer.line_comments,
    })
}

/// Line (1-based) of a byte offset.
pub(crate) fn line_of(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].matches('\n').count() + 1
}

struct Lexer<'a> {
    file: &'a str,
    src: &'a [u8],
    text: &'a str,
    pos: usize,
    line: usize,
    line_start: usize,
    block_comments: Vec<String>,
    line_comments: Vec<LineComment>,
}

impl<'a> Lexer<'a> {
    fn new(file: &'a str, text: &'a str) -> Self {
        Self {
            file,
            src: text.as_bytes(),
            text,
            pos: 0,
            line: 1,
            line_start: 0,
            block_comments: Vec::new(),
            line_comments: Vec::new(),
        }
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn column(&self, pos: usize) -> usize {
        self.text[self.line_start..pos].chars().count() + 1
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek(0)?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(b)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> Error {
        Error::FragmentParse {
            file: self.file.to_string(),
            line,
            column,
            message: message.into(),
        }
    }

    fn at_line_start(&self) -> bool {
        self.text[self.line_start..self.pos]
            .chars()
            .all(|c| c == ' ' || c == '\t')
    }

    fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        while let Some(b) = self.peek(0) {
            let start = self.pos;
            let line = self.line;
            let column = self.column(start);

            match b {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                    continue;
                }
                b'/' if self.peek(1) == Some(b'/') => {
                    self.skip_line();
                    self.line_comments.push(LineComment {
                        start,
                        text: self.text[start + 2..self.pos].trim_end_matches('\r').to_string(),
                    });
                    continue;
                }
                b'/' if self.peek(1) == Some(b'*') => {
                    self.skip_block_comment(line, column)?;
                    continue;
                }
                b'#' if self.at_line_start() => {
                    self.skip_line();
                    continue;
                }
                _ => {}
            }

            if matches!(b, b'@' | b'$')
                && let Some((len, interpolated, verbatim)) = self.string_prefix_len()
            {
                for _ in 0..len {
                    self.bump();
                }
                self.lex_string(interpolated, verbatim, line, column)?;
                tokens.push(Token {
                    kind: TokenKind::Literal,
                    start,
                    end: self.pos,
                    line,
                    column,
                });
                continue;
            }

            let kind = match b {
                b'"' => {
                    self.lex_string(false, false, line, column)?;
                    TokenKind::Literal
                }
                b'\'' => {
                    self.lex_char(line, column)?;
                    TokenKind::Literal
                }
                b'(' | b'[' | b'{' => {
                    self.bump();
                    TokenKind::Open(b as char)
                }
                b')' | b']' | b'}' => {
                    self.bump();
                    TokenKind::Close(b as char)
                }
                b'0'..=b'9' => {
                    self.take_word();
                    TokenKind::Literal
                }
                _ if is_ident_start(b) || (b == b'@' && self.peek(1).is_some_and(is_ident_start)) => {
                    // Verbatim identifiers keep their '@' so `@class` is never a keyword.
                    if b == b'@' {
                        self.bump();
                    }
                    self.take_word();
                    TokenKind::Ident(self.text[start..self.pos].to_string())
                }
                _ => {
                    // Multi-byte characters outside literals are consumed whole.
                    let ch = self.text[self.pos..].chars().next().unwrap_or('?');
                    for _ in 0..ch.len_utf8() {
                        self.bump();
                    }
                    TokenKind::Punct(ch)
                }
            };

            tokens.push(Token {
                kind,
                start,
                end: self.pos,
                line,
                column,
            });
        }

        Ok(tokens)
    }

    /// Length of a string prefix (`@`, `$`, `$@`, `@$`, `$$`...) at the cursor,
    /// with its interpolated/verbatim flags. `None` when no string follows.
    fn string_prefix_len(&self) -> Option<(usize, bool, bool)> {
        let mut len = 0;
        let mut interpolated = false;
        let mut verbatim = false;
        while let Some(b) = self.peek(len) {
            match b {
                b'$' => interpolated = true,
                b'@' if !verbatim => verbatim = true,
                b'"' if len > 0 => return Some((len, interpolated, verbatim)),
                _ => return None,
            }
            len += 1;
        }
        None
    }

    fn take_word(&mut self) {
        while self.peek(0).is_some_and(is_ident_continue) {
            self.bump();
        }
        // Non-ASCII identifier characters.
        while let Some(ch) = self.text[self.pos..].chars().next() {
            if ch.is_ascii() || !ch.is_alphanumeric() {
                break;
            }
            for _ in 0..ch.len_utf8() {
                self.bump();
            }
            while self.peek(0).is_some_and(is_ident_continue) {
                self.bump();
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(b) = self.peek(0) {
            if b == b'\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self, line: usize, column: usize) -> Result<()> {
        self.bump();
        self.bump();
        let body_start = self.pos;
        loop {
            match self.peek(0) {
                None => return Err(self.error(line, column, "unterminated block comment")),
                Some(b'*') if self.peek(1) == Some(b'/') => {
                    self.block_comments
                        .push(self.text[body_start..self.pos].to_string());
                    self.bump();
                    self.bump();
                    return Ok(());
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn lex_char(&mut self, line: usize, column: usize) -> Result<()> {
        self.bump();
        loop {
            match self.peek(0) {
                None | Some(b'\n') => {
                    return Err(self.error(line, column, "unterminated character literal"));
                }
                Some(b'\\') => {
                    self.bump();
                    self.bump();
                }
                Some(b'\'') => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    /// Lex a string literal whose opening quote is at the cursor.
    fn lex_string(
        &mut self,
        interpolated: bool,
        verbatim: bool,
        line: usize,
        column: usize,
    ) -> Result<()> {
        let mut quotes = 0;
        while self.peek(quotes) == Some(b'"') {
            quotes += 1;
        }
        if quotes >= 3 && !verbatim {
            return self.lex_raw_string(quotes, line, column);
        }
        if quotes == 2 && !interpolated && !verbatim {
            // Empty regular string.
            self.bump();
            self.bump();
            return Ok(());
        }

        self.bump();
        loop {
            match self.peek(0) {
                None => return Err(self.error(line, column, "unterminated string literal")),
                Some(b'\n') if !verbatim => {
                    return Err(self.error(line, column, "newline in string literal"));
                }
                Some(b'\\') if !verbatim => {
                    self.bump();
                    self.bump();
                }
                Some(b'"') if verbatim && self.peek(1) == Some(b'"') => {
                    self.bump();
                    self.bump();
                }
                Some(b'"') => {
                    self.bump();
                    return Ok(());
                }
                Some(b'{') if interpolated && self.peek(1) == Some(b'{') => {
                    self.bump();
                    self.bump();
                }
                Some(b'{') if interpolated => {
                    self.skip_interpolation_hole(line, column)?;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn lex_raw_string(&mut self, quotes: usize, line: usize, column: usize) -> Result<()> {
        for _ in 0..quotes {
            self.bump();
        }
        loop {
            match self.peek(0) {
                None => return Err(self.error(line, column, "unterminated raw string literal")),
                Some(b'"') => {
                    let mut run = 0;
                    while self.peek(run) == Some(b'"') {
                        run += 1;
                    }
                    for _ in 0..run {
                        self.bump();
                    }
                    if run >= quotes {
                        return Ok(());
                    }
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    /// Skip an interpolation hole `{ ... }` inside an interpolated string.
    fn skip_interpolation_hole(&mut self, line: usize, column: usize) -> Result<()> {
        self.bump();
        let mut depth = 1usize;
        while depth > 0 {
            let Some(b) = self.peek(0) else {
                return Err(self.error(line, column, "unterminated interpolation"));
            };
            // Quote bytes are ASCII, so the cursor sits on a char boundary here.
            let inner_line = self.line;
            match b {
                b'{' => {
                    depth += 1;
                    self.bump();
                }
                b'}' => {
                    depth -= 1;
                    self.bump();
                }
                b'"' => {
                    let inner_column = self.column(self.pos);
                    self.lex_string(false, false, inner_line, inner_column)?;
                }
                b'\'' => {
                    let inner_column = self.column(self.pos);
                    self.lex_char(inner_line, inner_column)?;
                }
                b'@' | b'$' => match self.string_prefix_len() {
                    Some((len, interpolated, verbatim)) => {
                        let inner_column = self.column(self.pos);
                        for _ in 0..len {
                            self.bump();
                        }
                        self.lex_string(interpolated, verbatim, inner_line, inner_column)?;
                    }
                    None => {
                        self.bump();
                    }
                },
                _ => {
                    self.bump();
                }
            }
        }
        Ok(())
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn check_brackets(file: &str, tokens: &[Token]) -> Result<()> {
    let mut stack: Vec<&Token> = Vec::new();
    for token in tokens {
        match token.kind {
            TokenKind::Open(_) => stack.push(token),
            TokenKind::Close(close) => {
                let Some(open) = stack.pop() else {
                    return Err(Error::FragmentParse {
                        file: file.to_string(),
                        line: token.line,
                        column: token.column,
                        message: format!("unexpected '{close}'"),
                    });
                };
                let TokenKind::Open(open_ch) = open.kind else {
                    continue;
                };
                if matching_close(open_ch) != close {
                    return Err(Error::FragmentParse {
                        file: file.to_string(),
                        line: token.line,
                        column: token.column,
                        message: format!(
                            "'{close}' does not match '{open_ch}' opened at line {}",
                            open.line
                        ),
                    });
                }
            }
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        let TokenKind::Open(open_ch) = open.kind else {
            return Ok(());
        };
        return Err(Error::FragmentParse {
            file: file.to_string(),
            line: open.line,
            column: open.column,
            message: format!("unclosed '{open_ch}'"),
        });
    }
    Ok(())
}

fn matching_close(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Index of the token closing the bracket opened at `open`.
/// Brackets are known to be balanced at this point.
pub(crate) fn skip_group(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
    }
    tokens.len() - 1
}

fn split_items(file: &str, tokens: &[Token]) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if let Some(keyword) = file_scoped_namespace(tokens, i) {
            return Err(Error::FragmentParse {
                file: file.to_string(),
                line: keyword.line,
                column: keyword.column,
                message: "file-scoped namespace declarations are not supported; use a block namespace"
                    .to_string(),
            });
        }

        let (kind, last) = if let Some((global, last)) = match_import(tokens, i) {
            (ItemKind::Import { global }, last)
        } else if let Some((name, last)) = match_type_decl(tokens, i) {
            (ItemKind::TypeDecl { name }, last)
        } else {
            (ItemKind::Statement, statement_end(tokens, i))
        };

        items.push(Item {
            kind,
            start: tokens[i].start,
            end: tokens[last].end,
            line: tokens[i].line,
        });
        i = last + 1;
    }

    Ok(items)
}

/// The `namespace` keyword of a file-scoped `namespace X;` at `i`. Its scope
/// is the rest of the file, which cannot be split into movable items.
fn file_scoped_namespace(tokens: &[Token], i: usize) -> Option<&Token> {
    let mut j = i;
    while matches!(tokens.get(j)?.kind, TokenKind::Open('[')) {
        j = skip_group(tokens, j) + 1;
    }
    while tokens.get(j)?.ident().is_some_and(|w| TYPE_MODIFIERS.contains(&w)) {
        j += 1;
    }
    let keyword = tokens.get(j)?;
    if !keyword.is_ident("namespace") {
        return None;
    }
    let end = (j + 1..tokens.len()).find(|&k| {
        matches!(tokens[k].kind, TokenKind::Punct(';') | TokenKind::Open('{'))
    })?;
    (tokens[end].kind == TokenKind::Punct(';')).then_some(keyword)
}

/// Match a using directive starting at `i`; returns (global, index of `;`).
fn match_import(tokens: &[Token], i: usize) -> Option<(bool, usize)> {
    let (global, using_at) = if tokens[i].is_ident("global") {
        (true, i + 1)
    } else {
        (false, i)
    };
    if !tokens.get(using_at)?.is_ident("using") {
        return None;
    }

    let mut j = using_at + 1;
    if tokens.get(j)?.is_ident("static") {
        j += 1;
    }
    let body_start = j;
    let semicolon = (j..tokens.len()).find(|&k| {
        matches!(
            tokens[k].kind,
            TokenKind::Punct(';') | TokenKind::Open(_) | TokenKind::Close(_)
        )
    })?;
    if tokens[semicolon].kind != TokenKind::Punct(';') {
        return None;
    }

    let body = &tokens[body_start..semicolon];
    if body.is_empty() {
        return None;
    }

    let target = match body.iter().position(|t| t.kind == TokenKind::Punct('=')) {
        Some(eq) => {
            // Alias form: exactly one identifier before '='.
            if eq != 1 || body[0].ident().is_none() {
                return None;
            }
            &body[eq + 1..]
        }
        None => body,
    };

    if !is_qualified_name(target) {
        return None;
    }
    Some((global, semicolon))
}

fn is_qualified_name(tokens: &[Token]) -> bool {
    if tokens.is_empty() {
        return false;
    }
    let mut previous_ident = false;
    for token in tokens {
        match &token.kind {
            TokenKind::Ident(_) => {
                if previous_ident {
                    return false;
                }
                previous_ident = true;
            }
            TokenKind::Punct('.' | '<' | '>' | ',' | ':' | '?') => previous_ident = false,
            _ => return false,
        }
    }
    true
}

/// Match a type declaration at `i`; returns (declared name, last token index).
fn match_type_decl(tokens: &[Token], i: usize) -> Option<(Option<String>, usize)> {
    let mut j = i;
    while matches!(tokens.get(j)?.kind, TokenKind::Open('[')) {
        j = skip_group(tokens, j) + 1;
    }
    while tokens.get(j)?.ident().is_some_and(|w| TYPE_MODIFIERS.contains(&w)) {
        j += 1;
    }

    let keyword = tokens.get(j)?.ident()?;
    if !TYPE_KEYWORDS.contains(&keyword) {
        return None;
    }
    let mut name_at = j + 1;
    if keyword == "record"
        && tokens
            .get(name_at)
            .is_some_and(|t| t.is_ident("class") || t.is_ident("struct"))
    {
        name_at += 1;
    }
    let name = tokens.get(name_at)?.ident()?.to_string();

    let mut k = name_at + 1;
    while k < tokens.len() {
        match tokens[k].kind {
            TokenKind::Open('{') => {
                let close = skip_group(tokens, k);
                let last = if tokens
                    .get(close + 1)
                    .is_some_and(|t| t.kind == TokenKind::Punct(';'))
                {
                    close + 1
                } else {
                    close
                };
                return Some((Some(name), last));
            }
            TokenKind::Open(_) => k = skip_group(tokens, k) + 1,
            TokenKind::Punct(';') => return Some((Some(name), k)),
            _ => k += 1,
        }
    }

    // Declaration header without a body: let the compiler report it.
    Some((Some(name), tokens.len() - 1))
}

/// Last token index of a statement starting at `i`.
fn statement_end(tokens: &[Token], i: usize) -> usize {
    let mut depth = 0usize;
    for (k, token) in tokens.iter().enumerate().skip(i) {
        match token.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(close) => {
                depth = depth.saturating_sub(1);
                // A block closing at top level ends the statement (`if (..) { }`),
                // swallowing a directly following ';' (`x = new T { };`).
                if depth == 0 && close == '}' {
                    return match tokens.get(k + 1) {
                        Some(next) if next.kind == TokenKind::Punct(';') => k + 1,
                        _ => k,
                    };
                }
            }
            TokenKind::Punct(';') if depth == 0 => return k,
            _ => {}
        }
    }
    tokens.len() - 1
}
