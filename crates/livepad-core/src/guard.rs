//! Loop-guard instrumentation.
//!
//! Every `for`/`while` header found by the [lexer](crate::lexer) gets a call to
//! the guard runtime injected into the part of the header that is evaluated
//! once per iteration. The runtime counts calls per source line and aborts the
//! sandbox once a line exceeds the configured threshold inside one window.
//!
//! Instrumentation is best-effort: headers that are not well-formed, `for...in`
//! / `for...of` loops and anything inside strings, comments or regex literals
//! are left untouched.

use crate::dialect::Dialect;
use crate::lexer::{Token, TokenKind, contains_markup, script_regions, tokenize};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Global installed by the guard runtime and called by instrumented code.
pub const GUARD_FN: &str = "__loopGuard";

/// Comments that switch instrumentation off for one compile pass.
pub const DISABLE_MARKERS: [&str; 2] = [
    "<!-- disable-loop-protection -->",
    "// disable-loop-protection",
];

const GUARD_RUNTIME_JS: &str = include_str!("guard-runtime.js");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GuardConfig {
    /// Iterations of one line tolerated inside one window.
    #[serde(default = "default_threshold")]
    pub threshold: u64,
    /// Time after the first hit of a line at which its counter resets.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Floor applied to `setTimeout`/`setInterval` delays inside the sandbox.
    #[serde(default = "default_min_timer_delay_ms")]
    pub min_timer_delay_ms: u64,
}

fn default_threshold() -> u64 {
    1_000_000
}

fn default_window_ms() -> u64 {
    500
}

fn default_min_timer_delay_ms() -> u64 {
    10
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            window_ms: default_window_ms(),
            min_timer_delay_ms: default_min_timer_delay_ms(),
        }
    }
}

/// How the guard call is spliced into a loop header.
///
/// The two styles are deliberately kept apart: markup and component sources
/// short-circuit the increment through the guard, utility-CSS markup prepends
/// the guard with the comma operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardStyle {
    /// `for (i; c; __loopGuard(N) && (inc))`, `while (__loopGuard(N) && (c))`
    Clause,
    /// `for (i; c; __loopGuard(N), inc)`, `while (__loopGuard(N), c)`
    Sequence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopKeyword {
    For,
    While,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardSite {
    /// 1-based line of the loop keyword in the original source.
    pub line: u32,
    pub keyword: LoopKeyword,
    /// Byte offset of the loop keyword in the original source.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrumented {
    pub source: String,
    /// Set when a disable marker was found; `source` is then the input verbatim.
    pub disabled: bool,
    pub sites: Vec<GuardSite>,
}

impl Instrumented {
    fn passthrough(source: &str, disabled: bool) -> Self {
        Self {
            source: source.to_string(),
            disabled,
            sites: Vec::new(),
        }
    }

    pub fn guarded_lines(&self) -> Vec<u32> {
        self.sites.iter().map(|s| s.line).collect()
    }
}

pub fn is_guard_disabled(source: &str) -> bool {
    DISABLE_MARKERS.iter().any(|marker| source.contains(marker))
}

/// Instruments `source` for `dialect`.
pub fn instrument(source: &str, dialect: Dialect) -> Instrumented {
    if is_guard_disabled(source) {
        debug!(%dialect, "loop guard disabled by marker");
        return Instrumented::passthrough(source, true);
    }
    match dialect.guard_style() {
        Some(style) => instrument_with_style(source, style),
        None => Instrumented::passthrough(source, false),
    }
}

/// Instruments `source` with an explicit style, ignoring disable markers.
///
/// Markup that carries `<script>` elements only has their bodies scanned.
/// Markup without any script element has nothing to guard, and text with no
/// markup at all is scanned as script in full.
pub fn instrument_with_style(source: &str, style: GuardStyle) -> Instrumented {
    let regions = match script_regions(source) {
        Some(regions) => regions,
        None if contains_markup(source) => Vec::new(),
        None => vec![0..source.len()],
    };
    let mut lines = LineCounter::new(source);
    let mut inserts: Vec<(usize, String)> = Vec::new();
    let mut sites = Vec::new();

    for region in regions {
        let text = &source[region.clone()];
        let tokens = tokenize(text);
        for idx in 0..tokens.len() {
            let Some(header) = LoopHeader::find(text, &tokens, idx) else {
                continue;
            };
            let offset = region.start + tokens[idx].start;
            let line = lines.line_at(offset);
            header.rewrite(text, &tokens, style, line, region.start, &mut inserts);
            sites.push(GuardSite {
                line,
                keyword: header.keyword,
                offset,
            });
        }
    }

    if inserts.is_empty() {
        return Instrumented::passthrough(source, false);
    }

    inserts.sort_by_key(|(pos, _)| *pos);
    let extra: usize = inserts.iter().map(|(_, s)| s.len()).sum();
    let mut out = String::with_capacity(source.len() + extra);
    let mut cursor = 0usize;
    for (pos, text) in &inserts {
        out.push_str(&source[cursor..*pos]);
        out.push_str(text);
        cursor = *pos;
    }
    out.push_str(&source[cursor..]);

    debug!(sites = sites.len(), ?style, "instrumented loop headers");
    Instrumented {
        source: out,
        disabled: false,
        sites,
    }
}

/// A recognised loop header, as token indices into one region.
struct LoopHeader {
    keyword: LoopKeyword,
    open: usize,
    close: usize,
    /// The second top-level `;` of a three-clause `for` header.
    last_semi: Option<usize>,
}

impl LoopHeader {
    fn find(text: &str, tokens: &[Token], idx: usize) -> Option<Self> {
        let token = tokens[idx];
        if token.kind != TokenKind::Word {
            return None;
        }
        let keyword = match token.text(text) {
            "for" => LoopKeyword::For,
            "while" => LoopKeyword::While,
            _ => return None,
        };
        if idx > 0 && tokens[idx - 1].is_punct(b'.') {
            return None;
        }
        let open = idx + 1;
        if !tokens.get(open)?.is_punct(b'(') {
            return None;
        }

        let mut depth = 0usize;
        let mut semis = Vec::new();
        let mut close = None;
        for (i, t) in tokens.iter().enumerate().skip(open) {
            match t.kind {
                TokenKind::Punct(b'(' | b'[' | b'{') => depth += 1,
                TokenKind::Punct(b')' | b']' | b'}') => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                TokenKind::Punct(b';') if depth == 1 => semis.push(i),
                _ => {}
            }
        }
        let close = close?;

        match keyword {
            LoopKeyword::For if semis.len() == 2 => Some(Self {
                keyword,
                open,
                close,
                last_semi: Some(semis[1]),
            }),
            LoopKeyword::While
                if semis.is_empty() && !clause_is_empty(text, tokens, open, close) =>
            {
                Some(Self {
                    keyword,
                    open,
                    close,
                    last_semi: None,
                })
            }
            _ => None,
        }
    }

    fn rewrite(
        &self,
        text: &str,
        tokens: &[Token],
        style: GuardStyle,
        line: u32,
        base: usize,
        inserts: &mut Vec<(usize, String)>,
    ) {
        let call = format!("{GUARD_FN}({line})");
        // The guarded clause is the increment of a `for`, the condition of a `while`.
        let before = self.last_semi.unwrap_or(self.open);
        let clause_start = tokens[before].end;
        let clause_end = tokens[self.close].start;

        if clause_is_empty(text, tokens, before, self.close) {
            inserts.push((base + clause_start, call));
            return;
        }

        let body_start = clause_start + leading_whitespace(&text[clause_start..clause_end]);
        match style {
            GuardStyle::Clause => {
                inserts.push((base + body_start, format!("{call} && (")));
                inserts.push((base + clause_end, ")".to_string()));
            }
            GuardStyle::Sequence => {
                inserts.push((base + body_start, format!("{call}, ")));
            }
        }
    }
}

/// True when nothing but whitespace and comments sits between two tokens.
fn clause_is_empty(text: &str, tokens: &[Token], before: usize, after: usize) -> bool {
    if after > before + 1 {
        return false;
    }
    only_comments(&text[tokens[before].end..tokens[after].start])
}

/// True when `raw` is nothing but whitespace, `//` and `/* */` comments.
fn only_comments(raw: &str) -> bool {
    let mut rest = raw.trim_start();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("//") {
            rest = after.find('\n').map_or("", |p| &after[p..]);
        } else if let Some(after) = rest.strip_prefix("/*") {
            match after.find("*/") {
                Some(p) => rest = &after[p + 2..],
                None => return false,
            }
        } else {
            return false;
        }
        rest = rest.trim_start();
    }
    true
}

fn leading_whitespace(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

struct LineCounter<'a> {
    bytes: &'a [u8],
    offset: usize,
    line: u32,
}

impl<'a> LineCounter<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            bytes: source.as_bytes(),
            offset: 0,
            line: 1,
        }
    }

    fn line_at(&mut self, offset: usize) -> u32 {
        if offset < self.offset {
            self.offset = 0;
            self.line = 1;
        }
        let newlines = self.bytes[self.offset..offset]
            .iter()
            .filter(|&&b| b == b'\n')
            .count();
        self.line += newlines as u32;
        self.offset = offset;
        self.line
    }
}

/// Inline `<script>` element installing the guard runtime for one sandbox
/// generation. Counters live inside the sandbox and die with it.
pub fn guard_runtime_script(config: &GuardConfig) -> String {
    let bootstrap = serde_json::to_string(config).unwrap_or_else(|_| "{}".to_string());
    format!("<script>\nwindow.__LOOP_GUARD__ = {bootstrap};\n{GUARD_RUNTIME_JS}</script>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn clause(src: &str) -> String {
        instrument_with_style(src, GuardStyle::Clause).source
    }

    fn sequence(src: &str) -> String {
        instrument_with_style(src, GuardStyle::Sequence).source
    }

    #[test]
    fn test_source_without_loops_is_untouched() {
        let src = concat!(
            "<div>\n  <p>Nothing to see</p>\n",
            "  <script>let a = [1, 2].map(x => x * 2);</script>\n</div>",
        );
        let out = instrument(src, Dialect::Plain);
        assert_eq!(out.source, src);
        assert!(out.sites.is_empty());
        assert!(!out.disabled);
    }

    #[test]
    fn test_three_clause_for_guards_increment() {
        let src = "for (let i = 0; i < 10; i++) { sum += i; }";
        assert_eq!(
            clause(src),
            "for (let i = 0; i < 10; __loopGuard(1) && (i++)) { sum += i; }"
        );
    }

    #[test]
    fn test_while_true_guards_condition_with_line() {
        let src = "let x = 0;\n\nwhile (true) {}";
        let out = instrument(src, Dialect::Plain);
        assert_eq!(out.source, "let x = 0;\n\nwhile (__loopGuard(3) && (true)) {}");
        assert_eq!(out.guarded_lines(), vec![3]);
        assert_eq!(out.sites[0].keyword, LoopKeyword::While);
    }

    #[test]
    fn test_sequence_style_appends_with_comma() {
        assert_eq!(
            sequence("for (let i = 0; i < 3; i++, j--) {}"),
            "for (let i = 0; i < 3; __loopGuard(1), i++, j--) {}"
        );
        assert_eq!(sequence("while (busy) {}"), "while (__loopGuard(1), busy) {}");
    }

    #[test]
    fn test_empty_increment_gets_bare_guard() {
        assert_eq!(clause("for (;;) { tick(); }"), "for (;;__loopGuard(1)) { tick(); }");
        assert_eq!(
            sequence("for (;; /* forever */) {}"),
            "for (;;__loopGuard(1) /* forever */) {}"
        );
    }

    #[test]
    fn test_regex_literal_clause_is_guarded() {
        assert_eq!(clause("while (/x/) {}"), "while (__loopGuard(1) && (/x/)) {}");
        assert_eq!(clause("for (;; /x/) {}"), "for (;; __loopGuard(1) && (/x/)) {}");
        assert_eq!(sequence("for (;; /x/g) {}"), "for (;; __loopGuard(1), /x/g) {}");
    }

    #[test]
    fn test_only_comments() {
        assert!(only_comments("  /* a */ // b\n  "));
        assert!(only_comments(""));
        assert!(!only_comments(" /x/ "));
        assert!(!only_comments("/* open"));
    }

    #[test]
    fn test_prose_without_script_is_untouched() {
        for src in [
            "<p>Please wait a while (a few seconds) and reload.</p>",
            "<li>Shop for (almost) everything you need.</li>",
            "<!DOCTYPE html>\n<h1>Hello</h1>\nWhile (briefly) idle, nothing runs.",
        ] {
            let out = instrument(src, Dialect::Plain);
            assert_eq!(out.source, src);
            assert!(out.sites.is_empty());
        }
    }

    #[test]
    fn test_bare_script_text_is_still_guarded() {
        let out = instrument("let n = 0;\nwhile (n < 3) n++;", Dialect::Plain);
        assert_eq!(out.guarded_lines(), vec![2]);
    }

    #[test]
    fn test_nested_parentheses_in_clauses() {
        let src = "for (let i = f(a, (b)); i < g(h(1)); i = next(i, (2))) {}";
        assert_eq!(
            clause(src),
            "for (let i = f(a, (b)); i < g(h(1)); __loopGuard(1) && (i = next(i, (2)))) {}"
        );
    }

    #[test]
    fn test_semicolons_inside_arrow_body_are_not_clause_separators() {
        let src = "for (let f = () => { a(); b(); }; f(); step()) {}";
        assert_eq!(
            clause(src),
            "for (let f = () => { a(); b(); }; f(); __loopGuard(1) && (step())) {}"
        );
    }

    #[test]
    fn test_for_of_and_for_in_are_left_alone() {
        let src = "for (const x of xs) {}\nfor (const k in obj) {}\nfor await (const c of s) {}";
        let out = instrument(src, Dialect::Plain);
        assert_eq!(out.source, src);
    }

    #[test]
    fn test_loop_text_in_strings_and_comments_is_untouched() {
        let src = concat!(
            "const a = \"for (;;) {}\";\n",
            "// while (true) {}\n",
            "/* for (i = 0; i < 1; i++) */\n",
            "const t = `while (x) ${'for (;;)'}`;\n",
            "const r = /while \\(1\\)/;\n",
        );
        assert_eq!(clause(src), src);
    }

    #[test]
    fn test_property_named_for_is_skipped() {
        let src = "obj.for(a; b; c); list.while(x);";
        assert_eq!(clause(src), src);
    }

    #[test]
    fn test_do_while_condition_is_guarded() {
        assert_eq!(
            clause("do { n--; } while (n > 0);"),
            "do { n--; } while (__loopGuard(1) && (n > 0));"
        );
    }

    #[test]
    fn test_trailing_line_comment_keeps_paren_outside_comment() {
        let src = "for (let i = 0; i < n; i++ // step\n) {}";
        assert_eq!(
            clause(src),
            "for (let i = 0; i < n; __loopGuard(1) && (i++ // step\n)) {}"
        );
    }

    #[test]
    fn test_only_script_bodies_are_scanned_in_markup() {
        let src = "<p>Stay a while (please)</p>\n<script>\nwhile (go) step();\n</script>";
        let out = instrument(src, Dialect::Plain);
        assert_eq!(
            out.source,
            concat!(
                "<p>Stay a while (please)</p>\n",
                "<script>\nwhile (__loopGuard(3) && (go)) step();\n</script>",
            )
        );
    }

    #[test]
    fn test_line_numbers_across_regions() {
        let src = "<script>\nfor (;;) {}\n</script>\n<p>x</p>\n<script>\n\nwhile (a) {}\n</script>";
        let out = instrument(src, Dialect::Utility);
        assert_eq!(out.guarded_lines(), vec![2, 7]);
    }

    #[test]
    fn test_nested_loops_are_both_guarded() {
        let src = "for (let i = 0; i < 3; i++) {\n  while (j < i) j++;\n}";
        let out = instrument(src, Dialect::Plain);
        assert_eq!(out.guarded_lines(), vec![1, 2]);
        assert!(out.source.contains("__loopGuard(1) && (i++)"));
        assert!(out.source.contains("while (__loopGuard(2) && (j < i))"));
    }

    #[test]
    fn test_disable_marker_in_either_form() {
        for marker in DISABLE_MARKERS {
            let src = format!("{marker}\nwhile (true) {{}}\nfor (;;) {{}}");
            for dialect in Dialect::ALL {
                let out = instrument(&src, dialect);
                assert!(out.disabled);
                assert_eq!(out.source, src);
                assert!(!out.source.contains(GUARD_FN));
            }
        }
    }

    #[test]
    fn test_shader_dialect_is_never_instrumented() {
        let src = "void main() { for (int i = 0; i < 8; i++) { x += 1.0; } }";
        let out = instrument(src, Dialect::Shader);
        assert_eq!(out.source, src);
        assert!(!out.disabled);
    }

    #[test]
    fn test_malformed_header_is_left_alone() {
        let src = "for (let i = 0; i < 3 {\nwhile (\n";
        assert_eq!(clause(src), src);
    }

    #[test]
    fn test_runtime_script_carries_config() {
        let script = guard_runtime_script(&GuardConfig::default());
        assert!(script.starts_with("<script>"));
        assert!(script.ends_with("</script>"));
        assert!(script.contains("\"threshold\":1000000"));
        assert!(script.contains("\"windowMs\":500"));
        assert!(script.contains("window.__loopGuard = function"));
        assert!(script.contains("Potential infinite loop detected on line "));
        assert!(script.contains("disable-loop-protection"));
    }

    #[test]
    fn test_guard_config_defaults_from_partial_json() {
        let cfg: GuardConfig = serde_json::from_str(r#"{"threshold": 5}"#).unwrap();
        assert_eq!(cfg.threshold, 5);
        assert_eq!(cfg.window_ms, 500);
        assert_eq!(cfg.min_timer_delay_ms, 10);
    }
}
