//! Splits template source into literal text runs and tags.

use std::sync::Arc;

use crate::ast::location::{Location, Span, TagKind};
use crate::error::ParseError;

/// Split `source` into [`Location`]s, one per literal text run or tag, in
/// source order. `note` tags are dropped.
///
/// A tag is `startdelim keyword [code] enddelim`. The keyword is the run of
/// ASCII letters right after the start delimiter and must be one of the
/// known tag kinds; the code is everything up to the next end delimiter,
/// with surrounding whitespace trimmed.
pub fn tokenize(
    source: &Arc<str>,
    startdelim: &str,
    enddelim: &str,
) -> Result<Vec<Location>, ParseError> {
    if startdelim.is_empty() || enddelim.is_empty() {
        return Err(ParseError::structural("delimiters must not be empty"));
    }

    let text: &str = source;
    let mut locations = Vec::new();
    let mut pos = 0;

    while let Some(found) = text[pos..].find(startdelim) {
        let start = pos + found;
        let after_delim = start + startdelim.len();
        let keyword_len = text[after_delim..]
            .bytes()
            .take_while(u8::is_ascii_alphabetic)
            .count();
        let keyword_end = after_delim + keyword_len;
        let keyword = &text[after_delim..keyword_end];

        let close = text[keyword_end..].find(enddelim).map(|i| keyword_end + i);
        let partial = |end: usize| {
            Location::new(
                Arc::clone(source),
                None,
                Span::new(start, end),
                Span::new(after_delim, end),
            )
        };

        let Some(kind) = TagKind::from_keyword(keyword) else {
            let end = close.map_or(keyword_end, |c| c + enddelim.len());
            let message = if keyword.is_empty() {
                "tag without keyword".to_string()
            } else {
                format!("unknown tag {keyword:?}")
            };
            return Err(ParseError::structural(message)
                .with_location(partial(end))
                .with_hint(
                    "tags are print, printx, code, for, if, elif, else, end, break, continue, def, return and note",
                ));
        };
        let Some(close) = close else {
            return Err(ParseError::structural(format!(
                "tag is never closed, expected {enddelim:?}"
            ))
            .with_location(partial(text.len())));
        };

        if start > pos {
            let span = Span::new(pos, start);
            locations.push(Location::new(Arc::clone(source), None, span, span));
        }

        let code = trim_span(text, keyword_end, close);
        if kind != TagKind::Note {
            locations.push(Location::new(
                Arc::clone(source),
                Some(kind),
                Span::new(start, close + enddelim.len()),
                code,
            ));
        }
        pos = close + enddelim.len();
    }

    if pos < text.len() {
        let span = Span::new(pos, text.len());
        locations.push(Location::new(Arc::clone(source), None, span, span));
    }

    Ok(locations)
}

fn trim_span(text: &str, start: usize, end: usize) -> Span {
    let raw = &text[start..end];
    let leading = raw.len() - raw.trim_start().len();
    let trimmed = raw.trim();
    Span::new(start + leading, start + leading + trimmed.len())
}

/// Remove every line feed (`\n` or `\r\n`) together with all whitespace
/// following it.
pub fn strip_linefeeds(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        let linefeed = match c {
            '\n' => true,
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                true
            }
            _ => false,
        };
        if linefeed {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(Option<TagKind>, String)> {
        tokenize(&Arc::from(source), "<?", "?>")
            .expect("tokenize failed")
            .into_iter()
            .map(|l| (l.kind(), l.code().to_string()))
            .collect()
    }

    #[test]
    fn test_text_and_tags() {
        assert_eq!(
            kinds("a<?print x ?>b"),
            vec![
                (None, "a".to_string()),
                (Some(TagKind::Print), "x".to_string()),
                (None, "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_printx_is_not_print() {
        assert_eq!(kinds("<?printx y?>"), vec![(Some(TagKind::PrintX), "y".to_string())]);
    }

    #[test]
    fn test_code_directly_after_keyword() {
        assert_eq!(kinds("<?print(x)?>"), vec![(Some(TagKind::Print), "(x)".to_string())]);
    }

    #[test]
    fn test_note_is_dropped() {
        assert_eq!(
            kinds("a<?note whatever?>b"),
            vec![(None, "a".to_string()), (None, "b".to_string())]
        );
    }

    #[test]
    fn test_multiline_code() {
        assert_eq!(kinds("<?code\n  x = 1\n?>"), vec![(Some(TagKind::Code), "x = 1".to_string())]);
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let err = tokenize(&Arc::from("x<?xml version?>"), "<?", "?>").unwrap_err();
        assert_eq!(err.message, "unknown tag \"xml\"");
        assert_eq!(err.location.unwrap().tag(), "<?xml version?>");
    }

    #[test]
    fn test_unclosed_tag_is_an_error() {
        let err = tokenize(&Arc::from("<?print x"), "<?", "?>").unwrap_err();
        assert!(err.message.starts_with("tag is never closed"));
    }

    #[test]
    fn test_custom_delimiters() {
        let tokens = tokenize(&Arc::from("{{print x}}<?print y?>"), "{{", "}}").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind(), Some(TagKind::Print));
        assert_eq!(tokens[1].code(), "<?print y?>");
    }

    #[test]
    fn test_strip_linefeeds() {
        assert_eq!(strip_linefeeds("a\n  b\r\n\tc  "), "abc  ");
        assert_eq!(strip_linefeeds("a\n\n   \nb"), "ab");
        assert_eq!(strip_linefeeds("a\rb"), "a\rb");
    }
}
