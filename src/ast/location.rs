use std::fmt;
use std::sync::Arc;

/// Byte-offset range into source text.
///
/// Expressions carry a `Span` so that diagnostics and the template listing
/// can point back at the exact piece of code they were parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Merge two spans into one covering both ranges
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Wraps an AST node with the span of source it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            node: f(self.node),
            span: self.span,
        }
    }
}

/// The keyword that opens a tag, e.g. `print` in `<?print x?>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Print,
    PrintX,
    Code,
    For,
    If,
    ElIf,
    Else,
    End,
    Break,
    Continue,
    Def,
    Return,
    Note,
}

impl TagKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let kind = match keyword {
            "print" => TagKind::Print,
            "printx" => TagKind::PrintX,
            "code" => TagKind::Code,
            "for" => TagKind::For,
            "if" => TagKind::If,
            "elif" => TagKind::ElIf,
            "else" => TagKind::Else,
            "end" => TagKind::End,
            "break" => TagKind::Break,
            "continue" => TagKind::Continue,
            "def" => TagKind::Def,
            "return" => TagKind::Return,
            "note" => TagKind::Note,
            _ => return None,
        };
        Some(kind)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            TagKind::Print => "print",
            TagKind::PrintX => "printx",
            TagKind::Code => "code",
            TagKind::For => "for",
            TagKind::If => "if",
            TagKind::ElIf => "elif",
            TagKind::Else => "else",
            TagKind::End => "end",
            TagKind::Break => "break",
            TagKind::Continue => "continue",
            TagKind::Def => "def",
            TagKind::Return => "return",
            TagKind::Note => "note",
        }
    }
}

/// An immutable span over template source, used for diagnostics.
///
/// A `Location` covers either a literal text run (`kind` is `None`) or one
/// tag. For tags, `tag` spans everything from the start delimiter to the end
/// delimiter and `code` spans the trimmed body after the keyword. For text
/// both ranges are the same.
///
/// The source is shared, so cloning a `Location` is cheap.
#[derive(Clone)]
pub struct Location {
    source: Arc<str>,
    kind: Option<TagKind>,
    tag: Span,
    code: Span,
}

impl Location {
    pub fn new(source: Arc<str>, kind: Option<TagKind>, tag: Span, code: Span) -> Self {
        Self {
            source,
            kind,
            tag,
            code,
        }
    }

    pub fn kind(&self) -> Option<TagKind> {
        self.kind
    }

    pub fn tag_span(&self) -> Span {
        self.tag
    }

    pub fn code_span(&self) -> Span {
        self.code
    }

    /// The full source this location points into.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn shared_source(&self) -> &Arc<str> {
        &self.source
    }

    /// The complete tag text including delimiters.
    pub fn tag(&self) -> &str {
        self.source.get(self.tag.start..self.tag.end).unwrap_or("")
    }

    /// The code body of the tag, or the text for a literal run.
    pub fn code(&self) -> &str {
        self.source.get(self.code.start..self.code.end).unwrap_or("")
    }

    /// 1-based line and column of the start of the tag.
    pub fn line_col(&self) -> (usize, usize) {
        offset_to_line_col(&self.source, self.tag.start)
    }
}

/// Map a byte offset to a 1-based `(line, column)` pair. Columns count
/// characters, not bytes.
pub fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.tag == other.tag
            && self.code == other.code
            && (Arc::ptr_eq(&self.source, &other.source) || self.source == other.source)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("kind", &self.kind)
            .field("tag", &self.tag())
            .field("start", &self.tag.start)
            .field("end", &self.tag.end)
            .finish()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (line, col) = self.line_col();
        write!(
            f,
            "{:?} at {}:{} (line {line}, col {col})",
            self.tag(),
            self.tag.start,
            self.tag.end
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(source: &str, tag: (usize, usize), code: (usize, usize)) -> Location {
        Location::new(
            Arc::from(source),
            Some(TagKind::Print),
            Span::new(tag.0, tag.1),
            Span::new(code.0, code.1),
        )
    }

    #[test]
    fn test_tag_and_code_slices() {
        let l = loc("ab<?print x?>cd", (2, 13), (10, 11));
        assert_eq!(l.tag(), "<?print x?>");
        assert_eq!(l.code(), "x");
    }

    #[test]
    fn test_line_col_after_newlines() {
        let l = loc("a\nbc\n  <?print x?>", (7, 18), (15, 16));
        assert_eq!(l.line_col(), (3, 3));
    }

    #[test]
    fn test_display_mentions_offsets_and_line() {
        let l = loc("<?print x?>", (0, 11), (8, 9));
        assert_eq!(l.to_string(), "\"<?print x?>\" at 0:11 (line 1, col 1)");
    }

    #[test]
    fn test_equality_compares_source_text() {
        let a = loc("<?print x?>", (0, 11), (8, 9));
        let b = loc("<?print x?>", (0, 11), (8, 9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_keyword_roundtrip() {
        for kw in ["print", "printx", "code", "for", "if", "elif", "else", "end", "break", "continue", "def", "return", "note"] {
            assert_eq!(TagKind::from_keyword(kw).map(TagKind::keyword), Some(kw));
        }
        assert_eq!(TagKind::from_keyword("xml"), None);
    }
}
