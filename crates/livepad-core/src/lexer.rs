//! Significant-token scanner for guard instrumentation.
//!
//! The scanner walks script text once and yields only the tokens that can
//! take part in a loop header: words (identifiers, keywords, numbers) and
//! single-byte punctuation. Everything that may legally contain loop-like
//! text is treated as an exclusion zone and skipped whole:
//!
//! - `'...'` and `"..."` strings (closed by the quote or by a newline)
//! - template literals, including nested `${ ... }` expressions
//! - `// ...` and `/* ... */` comments
//! - markup comments `<!-- ... -->`
//! - regular-expression literals, recognized from the previous token
//!
//! The scanner never fails. Unterminated zones run to the end of the input,
//! which only ever hides tokens from the instrumenter, never invents them.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Punct(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }

    pub fn is_punct(&self, ch: u8) -> bool {
        self.kind == TokenKind::Punct(ch)
    }
}

/// Keywords after which a `/` starts a regular expression, not a division.
const REGEX_PRECEDING_WORDS: &[&str] = &[
    "return",
    "typeof",
    "case",
    "do",
    "else",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "instanceof",
    "yield",
    "await",
];

/// Keywords whose parenthesized header may be followed directly by a statement.
const HEADER_KEYWORDS: &[&str] = &["if", "while", "for", "with"];

/// Script types that a browser executes as JavaScript.
const EXECUTABLE_SCRIPT_TYPES: &[&str] = &[
    "",
    "module",
    "text/javascript",
    "application/javascript",
    "text/ecmascript",
    "application/ecmascript",
    "text/babel",
    "text/jsx",
];

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    prev: Option<Token>,
    /// One entry per open `(`: whether it opened a control-statement header.
    parens: Vec<bool>,
    after_header: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            prev: None,
            parens: Vec::new(),
            after_header: false,
        }
    }

    fn emit(&mut self, kind: TokenKind, start: usize, end: usize) -> Token {
        let token = Token { kind, start, end };
        self.after_header = false;
        match kind {
            TokenKind::Punct(b'(') => {
                let header = self.prev.is_some_and(|prev| {
                    prev.kind == TokenKind::Word && HEADER_KEYWORDS.contains(&prev.text(self.src))
                });
                self.parens.push(header);
            }
            TokenKind::Punct(b')') => self.after_header = self.parens.pop().unwrap_or(false),
            _ => {}
        }
        self.pos = end;
        self.prev = Some(token);
        token
    }

    fn regex_allowed(&self) -> bool {
        match self.prev {
            None => true,
            Some(Token {
                kind: TokenKind::Punct(b')'),
                ..
            }) => self.after_header,
            Some(Token {
                kind: TokenKind::Punct(p),
                ..
            }) => !matches!(p, b']' | b'}'),
            Some(token) => REGEX_PRECEDING_WORDS.contains(&token.text(self.src)),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            let start = self.pos;
            let &b = self.bytes.get(start)?;
            match b {
                b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'\'' | b'"' => self.pos = skip_quoted(self.bytes, start, b),
                b'`' => self.pos = skip_template(self.bytes, start),
                b'/' => match self.bytes.get(start + 1) {
                    Some(b'/') => self.pos = skip_line_comment(self.bytes, start),
                    Some(b'*') => self.pos = skip_block_comment(self.bytes, start),
                    _ => {
                        if self.regex_allowed()
                            && let Some(end) = skip_regex(self.bytes, start)
                        {
                            self.pos = end;
                            continue;
                        }
                        return Some(self.emit(TokenKind::Punct(b), start, start + 1));
                    }
                },
                b'<' if self.bytes[start..].starts_with(b"<!--") => {
                    self.pos = skip_markup_comment(self.bytes, start);
                }
                _ if is_word_byte(b) => {
                    let mut end = start + 1;
                    while end < self.bytes.len() && is_word_byte(self.bytes[end]) {
                        end += 1;
                    }
                    return Some(self.emit(TokenKind::Word, start, end));
                }
                _ => return Some(self.emit(TokenKind::Punct(b), start, start + 1)),
            }
        }
    }
}

/// Tokenizes `src`, returning significant tokens with offsets into `src`.
pub fn tokenize(src: &str) -> Vec<Token> {
    Lexer::new(src).collect()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_template(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return i + 1,
            b'$' if bytes.get(i + 1) == Some(&b'{') => i = skip_template_expr(bytes, i + 2),
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_template_expr(bytes: &[u8], start: usize) -> usize {
    let mut depth = 1usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return i;
                }
            }
            b'\'' | b'"' => i = skip_quoted(bytes, i, bytes[i]),
            b'`' => i = skip_template(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| start + p)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    find(bytes, start + 2, b"*/").map_or(bytes.len(), |p| p + 2)
}

fn skip_markup_comment(bytes: &[u8], start: usize) -> usize {
    find(bytes, start + 4, b"-->").map_or(bytes.len(), |p| p + 3)
}

/// Returns the end of a regex literal starting at `start`, or `None` when the
/// line ends first (then the slash was an operator after all).
fn skip_regex(bytes: &[u8], start: usize) -> Option<usize> {
    let mut in_class = false;
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'\n' | b'\r' => return None,
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => {
                i += 1;
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                return Some(i);
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

fn find_ignore_case(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
        .map(|p| from + p)
}

/// True when `src` holds an HTML start tag or doctype outside strings and
/// comments, as in `<p>`, `<br/>`, `<div class=...>` or `<!DOCTYPE html>`.
pub fn contains_markup(src: &str) -> bool {
    let tokens = tokenize(src);
    let adjacent = |a: &Token, b: &Token| a.end == b.start;

    tokens.iter().enumerate().any(|(idx, lt)| {
        if !lt.is_punct(b'<') {
            return false;
        }
        let rest = &tokens[idx + 1..];
        match rest {
            [bang, name, ..] if bang.is_punct(b'!') && adjacent(lt, bang) => {
                name.kind == TokenKind::Word && adjacent(bang, name)
            }
            [name, next, tail @ ..]
                if name.kind == TokenKind::Word
                    && adjacent(lt, name)
                    && src.as_bytes()[name.start].is_ascii_alphabetic() =>
            {
                if adjacent(name, next) {
                    let self_closing =
                        next.is_punct(b'/') && tail.first().is_some_and(|t| t.is_punct(b'>'));
                    return next.is_punct(b'>') || self_closing;
                }
                next.kind == TokenKind::Word
                    && tail
                        .first()
                        .is_some_and(|t| t.is_punct(b'=') || t.is_punct(b'>'))
            }
            _ => false,
        }
    })
}

/// Locates the executable `<script>` bodies of a markup document.
///
/// Returns `None` when the text contains no `<script` element at all; callers
/// then decide between whole-text script and inert markup. Commented-out elements and
/// non-JavaScript script types (import maps, JSON, shader sources) are skipped.
pub fn script_regions(src: &str) -> Option<Vec<Range<usize>>> {
    let bytes = src.as_bytes();
    let mut regions = Vec::new();
    let mut found = false;
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i..].starts_with(b"<!--") {
            i = skip_markup_comment(bytes, i);
            continue;
        }

        let is_open_tag = bytes.len() >= i + 7
            && bytes[i..i + 7].eq_ignore_ascii_case(b"<script")
            && bytes
                .get(i + 7)
                .is_some_and(|b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/');
        if !is_open_tag {
            i += 1;
            continue;
        }

        found = true;
        let Some(content_start) = tag_end(bytes, i + 7) else {
            break;
        };
        let attrs = &src[i + 7..content_start - 1];
        let close = find_ignore_case(bytes, content_start, b"</script").unwrap_or(bytes.len());
        if is_executable_script(attrs) {
            regions.push(content_start..close);
        }
        i = (close + "</script".len()).min(bytes.len());
    }

    found.then_some(regions)
}

/// Returns the offset just past the `>` closing a start tag.
fn tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, &b) in bytes[from..].iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(from + offset + 1),
            None => {}
        }
    }
    None
}

fn is_executable_script(attrs: &str) -> bool {
    match attribute_value(attrs, "type") {
        None => true,
        Some(ty) => EXECUTABLE_SCRIPT_TYPES.contains(&ty.trim().to_ascii_lowercase().as_str()),
    }
}

/// Reads one attribute value out of the raw attribute text of a start tag.
pub(crate) fn attribute_value<'a>(attrs: &'a str, wanted: &str) -> Option<&'a str> {
    let bytes = attrs.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'/' | b'>')
        {
            i += 1;
        }
        let name = &attrs[name_start..i];
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut value = "";
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i) {
                Some(&q) if q == b'"' || q == b'\'' => {
                    let value_start = i + 1;
                    let value_end = bytes[value_start..]
                        .iter()
                        .position(|&b| b == q)
                        .map_or(bytes.len(), |p| value_start + p);
                    value = &attrs[value_start..value_end];
                    i = (value_end + 1).min(bytes.len());
                }
                _ => {
                    let value_start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    value = &attrs[value_start..i];
                }
            }
        }

        if name.is_empty() {
            i += 1;
            continue;
        }
        if name.eq_ignore_ascii_case(wanted) {
            return Some(value);
        }
    }

    None
}
