//! Error types for compiling, evaluating and serializing templates.
//!
//! [`ParseError`] is produced by the compiler (both block-structure errors
//! and malformed tag code) and carries the [`Location`] of the offending
//! tag. [`EvalError`] is produced while rendering or calling a template and
//! carries a location stack: the innermost tag first, then one entry per
//! template boundary the error crossed. [`CodecError`] covers the
//! serialization format.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::location::{Location, offset_to_line_col};

// ── Parse errors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Malformed tag nesting, unknown tag keyword, mismatched `end`.
    Structural,
    /// The code inside a tag isn't a valid expression or statement.
    Syntax,
}

#[derive(Debug, Clone, Error)]
#[error("{message}{}", describe_location(.location, .template))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// The tag the error was found in.
    pub location: Option<Location>,
    /// Absolute byte offset inside the tag's code, when known.
    pub offset: Option<usize>,
    /// Name of the template being compiled.
    pub template: Option<String>,
    pub hint: Option<String>,
}

fn describe_location(location: &Option<Location>, template: &Option<String>) -> String {
    let mut out = String::new();
    if let Some(location) = location {
        out.push_str(&format!(" in tag {location}"));
    }
    match template.as_deref() {
        Some(name) => out.push_str(&format!(" in template named {name}")),
        None => out.push_str(" in unnamed template"),
    }
    out
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            offset: None,
            template: None,
            hint: None,
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::new(ParseErrorKind::Structural, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ParseErrorKind::Syntax, message)
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_template(mut self, name: Option<&str>) -> Self {
        self.template = name.map(str::to_string);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Format the error with the offending source line and a caret marker.
    pub fn format_with_source(&self) -> String {
        let Some(location) = &self.location else {
            return format!("Error: {}", self.message);
        };
        let source = location.source();
        let span = location.tag_span();
        let start = self.offset.unwrap_or(span.start);
        let (line, col) = offset_to_line_col(source, start);
        let source_line = source.lines().nth(line.saturating_sub(1)).unwrap_or("");

        let name = self.template.as_deref().unwrap_or("<unnamed>");
        let width = if self.offset.is_some() {
            1
        } else {
            source
                .get(span.start..span.end)
                .map_or(1, |t| t.lines().next().unwrap_or("").chars().count().max(1))
        };
        let pointer = " ".repeat(col.saturating_sub(1)) + &"^".repeat(width);

        let mut output = format!(
            "Error: {}\n --> {name}:{line}:{col}\n  |\n{line:>3} | {source_line}\n    | {pointer}",
            self.message
        );

        if let Some(hint) = &self.hint {
            output.push_str(&format!("\n  = hint: {hint}"));
        }

        output
    }
}

// ── Eval errors ─────────────────────────────────────────────────────────

/// One entry of an [`EvalError`]'s location stack.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceFrame {
    /// The tag being executed when the error happened or passed through.
    Tag(Location),
    /// A template boundary: the template that was rendered or called.
    Template(Option<String>),
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceFrame::Tag(location) => write!(f, "in tag {location}"),
            TraceFrame::Template(Some(name)) => write!(f, "in template named {name}"),
            TraceFrame::Template(None) => write!(f, "in unnamed template"),
        }
    }
}

fn format_trace(trace: &[TraceFrame]) -> String {
    trace.iter().map(|frame| format!("\n  {frame}")).collect()
}

/// An error that occurs during template evaluation.
///
/// Carries a structured [`EvalErrorKind`], a human-readable message, the
/// location stack, and an optional underlying error cause.
///
/// ```rust
/// use ul4::{Template, CompileOptions, Vars};
///
/// let t = Template::compile("<?print 1 // 0?>", CompileOptions::new().name("page")).unwrap();
/// let err = t.render_to_string(Vars::new()).unwrap_err();
/// assert_eq!(err.message, "integer division or modulo by zero");
/// assert_eq!(err.trace.len(), 2);
/// ```
#[derive(Debug, Clone, Error)]
#[error("{message}{}", format_trace(.trace))]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: String,
    /// Innermost first.
    pub trace: Vec<TraceFrame>,
    /// The underlying error that caused this evaluation error, if any.
    ///
    /// Wrapped in `Arc` so that `EvalError` remains `Clone`.
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            trace: Vec::new(),
            source: None,
        }
    }

    /// Attach an underlying error cause to this evaluation error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Record that the error passed through the tag at `location`. A tag is
    /// only recorded once even when several nested nodes report it.
    pub fn in_tag(mut self, location: &Location) -> Self {
        let seen = matches!(self.trace.last(), Some(TraceFrame::Tag(l)) if l == location);
        if !seen {
            self.trace.push(TraceFrame::Tag(location.clone()));
        }
        self
    }

    /// Record that the error left the template named `name`.
    pub fn in_template(mut self, name: Option<&str>) -> Self {
        self.trace.push(TraceFrame::Template(name.map(str::to_string)));
        self
    }

    /// The innermost tag location, if any.
    pub fn location(&self) -> Option<&Location> {
        self.trace.iter().find_map(|frame| match frame {
            TraceFrame::Tag(l) => Some(l),
            TraceFrame::Template(_) => None,
        })
    }

    // Convenience constructors for common error types

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::ValueError, message)
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::ArithmeticError, message)
    }

    pub fn argument(callee: &str, message: impl fmt::Display) -> Self {
        Self::new(EvalErrorKind::ArgumentError, format!("{callee}() {message}"))
    }

    pub fn unsupported_operands(op: &str, left: &crate::Value, right: &crate::Value) -> Self {
        let kind = if left.is_undefined() || right.is_undefined() {
            EvalErrorKind::UndefinedOperand
        } else {
            EvalErrorKind::TypeError
        };
        Self::new(
            kind,
            format!(
                "unsupported operand types for {op}: {} and {}",
                describe(left),
                describe(right)
            ),
        )
    }

    pub fn not_iterable(value: &crate::Value) -> Self {
        Self::new(
            undefined_or(value, EvalErrorKind::NotIterable),
            format!("{} is not iterable", describe(value)),
        )
    }

    pub fn not_callable(value: &crate::Value) -> Self {
        Self::new(
            undefined_or(value, EvalErrorKind::NotCallable),
            format!("{} is not callable", describe(value)),
        )
    }

    pub fn unknown_method(value: &crate::Value, method: &str) -> Self {
        Self::new(
            undefined_or(value, EvalErrorKind::UnknownMethod),
            format!("{} has no method {method}()", describe(value)),
        )
    }

    pub fn unpack(expected: usize, got: usize) -> Self {
        let message = if got > expected {
            format!("too many values to unpack (expected {expected})")
        } else {
            format!("need {expected} values to unpack, got {got}")
        };
        Self::new(EvalErrorKind::UnpackError, message)
    }
}

fn undefined_or(value: &crate::Value, kind: EvalErrorKind) -> EvalErrorKind {
    if value.is_undefined() {
        EvalErrorKind::UndefinedOperand
    } else {
        kind
    }
}

/// `'int'`, or the full description for undefined values.
fn describe(value: &crate::Value) -> String {
    match value {
        crate::Value::Undefined(u) => u.to_string(),
        other => format!("'{}'", other.type_name()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// An undefined value was used where a defined one is required.
    UndefinedOperand,
    /// Assigning with `+=` and friends to a variable that doesn't exist.
    UndefinedVariable,
    TypeError,
    ValueError,
    NotIterable,
    NotCallable,
    UnknownMethod,
    /// Wrong number or names of arguments.
    ArgumentError,
    /// Division by zero or integer overflow.
    ArithmeticError,
    /// Tuple unpacking with the wrong number of items.
    UnpackError,
    /// `fromul4on`/`asul4on` failed.
    CodecError,
    /// Raised by a host-registered function.
    HostError,
}

// ── Codec errors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// The stream was written by an incompatible format version.
    #[error("invalid version, expected {expected}, got {found}")]
    Version { expected: i64, found: i64 },

    #[error("unknown type tag {tag:?} at offset {offset}")]
    UnknownTag { tag: String, offset: usize },

    #[error("malformed stream at offset {offset}: {message}")]
    Malformed { offset: usize, message: String },

    #[error("values of type {0} can't be serialized")]
    NotSerializable(&'static str),
}

impl From<CodecError> for EvalError {
    fn from(err: CodecError) -> Self {
        EvalError::new(EvalErrorKind::CodecError, err.to_string()).with_source(err)
    }
}

// ── Combined error ──────────────────────────────────────────────────────

/// Any error the crate can produce, for callers that compile, render and
/// serialize in one place.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::location::{Span, TagKind};

    fn location() -> Location {
        Location::new(
            Arc::from("ab\n<?print x?>"),
            Some(TagKind::Print),
            Span::new(3, 14),
            Span::new(11, 12),
        )
    }

    #[test]
    fn test_parse_error_display_names_tag_and_template() {
        let err = ParseError::structural("not in any block")
            .with_location(location())
            .with_template(Some("page"));
        assert_eq!(
            err.to_string(),
            "not in any block in tag \"<?print x?>\" at 3:14 (line 2, col 1) in template named page"
        );
    }

    #[test]
    fn test_format_with_source_points_at_offset() {
        let err = ParseError::syntax("expected expression")
            .with_location(location())
            .with_offset(11)
            .with_hint("check the tag");
        let text = err.format_with_source();
        assert!(text.contains(" --> <unnamed>:2:9"));
        assert!(text.contains("  2 | <?print x?>"));
        assert!(text.ends_with("= hint: check the tag"));
    }

    #[test]
    fn test_in_tag_records_location_once() {
        let err = EvalError::type_error("boom")
            .in_tag(&location())
            .in_tag(&location())
            .in_template(Some("page"));
        assert_eq!(err.trace.len(), 2);
        assert_eq!(err.location(), Some(&location()));
        assert_eq!(
            err.to_string(),
            "boom\n  in tag \"<?print x?>\" at 3:14 (line 2, col 1)\n  in template named page"
        );
    }

    #[test]
    fn test_undefined_operand_kind() {
        let undefined = crate::Value::Undefined(crate::ast::Undefined::Variable("x".into()));
        let err = EvalError::not_iterable(&undefined);
        assert_eq!(err.kind, EvalErrorKind::UndefinedOperand);
        assert_eq!(err.message, "undefined variable 'x' is not iterable");
    }
}
