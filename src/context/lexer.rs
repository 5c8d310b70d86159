//! Single forward pass over JavaScript-like source.
//!
//! The pass splits the text into contiguous regions (code, strings,
//! template literals, comments, regex literals) and records every code
//! brace with a guess at what it opens. Position queries afterwards are
//! binary searches instead of re-scanning a prefix per site.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Code,
    SingleQuote,
    DoubleQuote,
    /// Literal text of a template; `${}` islands are separate `Code` regions
    Template,
    LineComment,
    BlockComment,
    Regex,
}

impl RegionKind {
    pub fn is_code(self) -> bool {
        self == RegionKind::Code
    }

    pub fn is_string(self) -> bool {
        matches!(
            self,
            RegionKind::SingleQuote | RegionKind::DoubleQuote | RegionKind::Template
        )
    }

    pub fn is_comment(self) -> bool {
        matches!(self, RegionKind::LineComment | RegionKind::BlockComment)
    }
}

/// Half-open byte range `[start, end)` of one lexical region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BraceKind {
    ObjectLiteral,
    /// `{` right after `const`/`let`/`var`
    Pattern,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Brace {
    pub kind: BraceKind,
    pub open: usize,
    /// Offset of the matching `}`; `None` when unbalanced
    pub close: Option<usize>,
    /// Nesting depth of this brace, 1 for top level
    pub depth: usize,
}

impl Brace {
    /// Whether `offset` lies strictly inside the braces.
    pub fn encloses(&self, offset: usize) -> bool {
        self.open < offset && self.close.is_none_or(|close| offset <= close)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Lexed {
    pub regions: Vec<Region>,
    /// Ordered by `open`
    pub braces: Vec<Brace>,
    pub max_depth: usize,
    pub regex_literals: usize,
}

const REGEX_PRECEDING_KEYWORDS: &[&str] = &[
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

const PATTERN_KEYWORDS: &[&str] = &["const", "let", "var"];

/// Last significant code token before the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Prev {
    Start,
    Punct(u8),
    Word(String),
    /// Number, string, template or regex literal
    Value,
}

impl Prev {
    fn allows_regex(&self) -> bool {
        match self {
            Prev::Start => true,
            Prev::Punct(b) => b"(,=:[!&|?{};+-*%<>~^".contains(b),
            Prev::Word(word) => REGEX_PRECEDING_KEYWORDS.contains(&word.as_str()),
            Prev::Value => false,
        }
    }

    fn brace_kind(&self) -> BraceKind {
        match self {
            Prev::Word(word) if PATTERN_KEYWORDS.contains(&word.as_str()) => BraceKind::Pattern,
            Prev::Word(word) if word == "return" => BraceKind::ObjectLiteral,
            Prev::Punct(b'=' | b'(' | b',' | b':' | b'[' | b'?') => BraceKind::ObjectLiteral,
            _ => BraceKind::Block,
        }
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    out: Lexed,
    region_start: usize,
    /// Brace depth at which each open `${` island returns to its template
    islands: Vec<usize>,
    open_braces: Vec<usize>,
    prev: Prev,
}

/// Lex `source` into regions and braces.
pub fn lex(source: &str) -> Lexed {
    let mut lexer = Lexer {
        bytes: source.as_bytes(),
        pos: 0,
        out: Lexed::default(),
        region_start: 0,
        islands: Vec::new(),
        open_braces: Vec::new(),
        prev: Prev::Start,
    };
    lexer.run();
    lexer.out
}

impl Lexer<'_> {
    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    /// Close the region running up to `end` and start a new one there.
    fn cut(&mut self, kind: RegionKind, end: usize) {
        if end > self.region_start {
            self.out.regions.push(Region {
                kind,
                start: self.region_start,
                end,
            });
        }
        self.region_start = end;
    }

    fn run(&mut self) {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            match b {
                b'\'' | b'"' => {
                    self.cut(RegionKind::Code, self.pos);
                    self.quoted(b);
                }
                b'`' => {
                    self.cut(RegionKind::Code, self.pos);
                    self.pos += 1;
                    self.template();
                }
                b'/' if self.peek(1) == Some(b'/') => {
                    self.cut(RegionKind::Code, self.pos);
                    self.line_comment();
                }
                b'/' if self.peek(1) == Some(b'*') => {
                    self.cut(RegionKind::Code, self.pos);
                    self.block_comment();
                }
                b'/' if self.prev.allows_regex() => {
                    self.cut(RegionKind::Code, self.pos);
                    self.regex();
                }
                b'{' => {
                    let depth = self.open_braces.len() + 1;
                    self.out.max_depth = self.out.max_depth.max(depth);
                    self.open_braces.push(self.out.braces.len());
                    self.out.braces.push(Brace {
                        kind: self.prev.brace_kind(),
                        open: self.pos,
                        close: None,
                        depth,
                    });
                    self.prev = Prev::Punct(b);
                    self.pos += 1;
                }
                b'}' if self.islands.last() == Some(&self.open_braces.len()) => {
                    // End of a `${}` island: back to the template text
                    self.islands.pop();
                    self.cut(RegionKind::Code, self.pos);
                    self.template();
                }
                b'}' => {
                    if let Some(index) = self.open_braces.pop() {
                        self.out.braces[index].close = Some(self.pos);
                    }
                    self.prev = Prev::Punct(b);
                    self.pos += 1;
                }
                b if b.is_ascii_whitespace() => self.pos += 1,
                b if b.is_ascii_digit() => {
                    while self.peek(0).is_some_and(|b| b.is_ascii_alphanumeric() || b == b'.') {
                        self.pos += 1;
                    }
                    self.prev = Prev::Value;
                }
                b if is_ident_byte(b) => {
                    let start = self.pos;
                    while self.peek(0).is_some_and(is_ident_byte) {
                        self.pos += 1;
                    }
                    let word = String::from_utf8_lossy(&self.bytes[start..self.pos]);
                    self.prev = Prev::Word(word.into_owned());
                }
                b')' | b']' => {
                    // `(a) / b` and `x[0] / 2` are divisions
                    self.prev = Prev::Value;
                    self.pos += 1;
                }
                _ => {
                    self.prev = Prev::Punct(b);
                    self.pos += 1;
                }
            }
        }
        self.cut(RegionKind::Code, self.bytes.len());
    }

    /// `'...'` or `"..."`; an unterminated string ends at the newline.
    fn quoted(&mut self, quote: u8) {
        let kind = if quote == b'\'' {
            RegionKind::SingleQuote
        } else {
            RegionKind::DoubleQuote
        };
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos += 2,
                b'\n' => break,
                b if b == quote => {
                    self.pos += 1;
                    break;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.bytes.len());
        self.cut(kind, self.pos);
        self.prev = Prev::Value;
    }

    /// Template text from the cursor to the closing backtick or the next `${`.
    fn template(&mut self) {
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos += 2,
                b'`' => {
                    self.pos += 1;
                    self.pos = self.pos.min(self.bytes.len());
                    self.cut(RegionKind::Template, self.pos);
                    self.prev = Prev::Value;
                    return;
                }
                b'$' if self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    self.cut(RegionKind::Template, self.pos);
                    self.islands.push(self.open_braces.len());
                    self.prev = Prev::Punct(b'{');
                    return;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.bytes.len());
        self.cut(RegionKind::Template, self.pos);
    }

    fn line_comment(&mut self) {
        while self.peek(0).is_some_and(|b| b != b'\n') {
            self.pos += 1;
        }
        self.cut(RegionKind::LineComment, self.pos);
    }

    fn block_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] == b'*' && self.peek(1) == Some(b'/') {
                self.pos += 2;
                break;
            }
            self.pos += 1;
        }
        self.pos = self.pos.min(self.bytes.len());
        self.cut(RegionKind::BlockComment, self.pos);
    }

    /// `/body/flags`. A newline before the closing slash means this was not
    /// a regex after all; the text is left to the code region.
    fn regex(&mut self) {
        let start = self.pos;
        let mut in_class = false;
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos += 2,
                b'\n' => {
                    self.pos = start + 1;
                    self.prev = Prev::Punct(b'/');
                    return;
                }
                b'[' => {
                    in_class = true;
                    self.pos += 1;
                }
                b']' => {
                    in_class = false;
                    self.pos += 1;
                }
                b'/' if !in_class => {
                    self.pos += 1;
                    while self.peek(0).is_some_and(|b| b.is_ascii_alphabetic()) {
                        self.pos += 1;
                    }
                    self.cut(RegionKind::Regex, self.pos);
                    self.out.regex_literals += 1;
                    self.prev = Prev::Value;
                    return;
                }
                _ => self.pos += 1,
            }
        }
        // Unterminated at end of input
        self.pos = start + 1;
        self.prev = Prev::Punct(b'/');
    }
}

impl Lexed {
    /// Region containing `offset`; offsets past the end map to the last region.
    pub fn region_at(&self, offset: usize) -> Option<&Region> {
        let index = self.regions.partition_point(|r| r.end <= offset);
        self.regions.get(index).or_else(|| self.regions.last())
    }

    pub fn kind_at(&self, offset: usize) -> RegionKind {
        self.region_at(offset)
            .map(|r| r.kind)
            .unwrap_or(RegionKind::Code)
    }

    /// Innermost brace pair around `offset`.
    pub fn enclosing_brace(&self, offset: usize) -> Option<&Brace> {
        let candidates = self.braces.partition_point(|b| b.open < offset);
        self.braces[..candidates]
            .iter()
            .rev()
            .find(|brace| brace.encloses(offset))
    }

    /// Deepest brace nesting reached inside `[start, end)`, counted from the
    /// window start.
    pub fn local_depth(&self, start: usize, end: usize) -> usize {
        let mut events: Vec<(usize, bool)> = Vec::new();
        for brace in &self.braces {
            if (start..end).contains(&brace.open) {
                events.push((brace.open, true));
            }
            if let Some(close) = brace.close.filter(|c| (start..end).contains(c)) {
                events.push((close, false));
            }
        }
        events.sort_unstable();

        let (mut depth, mut max) = (0usize, 0usize);
        for (_, opens) in events {
            if opens {
                depth += 1;
                max = max.max(depth);
            } else {
                depth = depth.saturating_sub(1);
            }
        }
        max
    }

    /// Copy of `source` with everything outside code regions blanked, lines kept.
    pub fn code_view(&self, source: &str) -> String {
        let mut bytes = source.as_bytes().to_vec();
        for region in self.regions.iter().filter(|r| !r.kind.is_code()) {
            for b in &mut bytes[region.start..region.end] {
                if *b != b'\n' {
                    *b = b' ';
                }
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(source: &str, needle: &str) -> RegionKind {
        let offset = source.find(needle).unwrap();
        lex(source).kind_at(offset)
    }

    #[test]
    fn test_strings_and_comments() {
        let source = "a.x = 'a.views';\n// a.views\n/* a.views */ b = \"a.views\";";
        let lexed = lex(source);
        assert_eq!(lexed.kind_at(0), RegionKind::Code);
        assert_eq!(kind_of(source, "'a.views'"), RegionKind::SingleQuote);
        assert_eq!(kind_of(source, "// a"), RegionKind::LineComment);
        assert_eq!(kind_of(source, "/* a"), RegionKind::BlockComment);
        assert_eq!(kind_of(source, "\"a.views\""), RegionKind::DoubleQuote);
        assert_eq!(kind_of(source, "b ="), RegionKind::Code);
    }

    #[test]
    fn test_template_islands_are_code() {
        let source = "const s = `total: ${a.views} of ${ {x: 1}.x }`;";
        assert_eq!(kind_of(source, "total"), RegionKind::Template);
        assert_eq!(kind_of(source, "a.views"), RegionKind::Code);
        assert_eq!(kind_of(source, " of "), RegionKind::Template);
        assert_eq!(kind_of(source, ";"), RegionKind::Code);
    }

    #[test]
    fn test_regex_versus_division() {
        let source = "const r = /a.views/g;\nconst half = total / 2 / 3;";
        let lexed = lex(source);
        assert_eq!(lexed.regex_literals, 1);
        assert_eq!(kind_of(source, "a.views"), RegionKind::Regex);
        assert_eq!(kind_of(source, "2 / 3"), RegionKind::Code);
    }

    #[test]
    fn test_escaped_quotes() {
        let source = r#"const s = 'it\'s a.views'; x.views = 1;"#;
        assert_eq!(kind_of(source, "x.views"), RegionKind::Code);
    }

    #[test]
    fn test_brace_kinds() {
        let source = "const { a } = o;\nconst p = { b: 1 };\nif (x) { c(); }";
        let lexed = lex(source);
        let kinds: Vec<_> = lexed.braces.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![BraceKind::Pattern, BraceKind::ObjectLiteral, BraceKind::Block]
        );
        let inner = source.find("b: 1").unwrap();
        assert_eq!(
            lexed.enclosing_brace(inner).map(|b| b.kind),
            Some(BraceKind::ObjectLiteral)
        );
    }

    #[test]
    fn test_depth_tracking() {
        let source = "{ { { } } }";
        let lexed = lex(source);
        assert_eq!(lexed.max_depth, 3);
        assert_eq!(lexed.local_depth(0, source.len()), 3);
        assert_eq!(lexed.local_depth(2, 9), 2);
    }

    #[test]
    fn test_code_view_blanks_non_code() {
        let source = "a = 'if (x)';\n// while (y)\nb";
        let view = lex(source).code_view(source);
        assert_eq!(view.len(), source.len());
        assert!(!view.contains("if"));
        assert!(!view.contains("while"));
        assert_eq!(view.lines().count(), 3);
    }
}
