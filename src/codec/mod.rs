//! Portable text serialization for values and compiled templates.
//!
//! The stream is a sequence of whitespace separated tokens. Each token
//! starts with a type tag:
//!
//! | token                 | value                              |
//! |-----------------------|------------------------------------|
//! | `n` `T` `F`           | none, true, false                  |
//! | `i42` `f1.5`          | int, float                         |
//! | `s"…"`                | string, as a JSON string literal   |
//! | `y00ff`               | bytes, hex encoded                 |
//! | `z2012-10-06T12:00:00`| date                               |
//! | `t1,30,0`             | timedelta: days, seconds, micros   |
//! | `m3`                  | monthdelta                         |
//! | `cff0000ff`           | color                              |
//! | `[ … ]` `{ k v … }`   | list, dict                         |
//! | `(tag field… )`       | template and AST nodes             |
//!
//! A template starts with the format [`VERSION`]; decoding any other
//! version fails with [`CodecError::Version`].
//!
//! ```rust
//! use ul4::Template;
//!
//! let t = Template::compile("<?for i in range(3)?><?print i?><?end for?>", Default::default()).unwrap();
//! let dump = ul4::save(&t).unwrap();
//! assert!(dump.starts_with("(template i24 "));
//! assert_eq!(ul4::load(&dump).unwrap(), t);
//! ```

mod ast;

use std::sync::Arc;

use chrono::NaiveDateTime;
use indexmap::IndexMap;

use crate::ast::color::Color;
use crate::ast::template::Template;
use crate::ast::value::{
    Closure, MonthDelta, Value, isoformat, timedelta_from_micros, timedelta_parts,
};
use crate::error::CodecError;

/// The format version written by [`encode_template`] and required by
/// [`decode_template`].
pub const VERSION: i64 = 24;

type Result<T> = std::result::Result<T, CodecError>;

/// Serialize a value. Templates without captured variables are written as
/// templates; closures and functions can't be serialized.
pub fn dumps(value: &Value) -> Result<String> {
    let mut encoder = Encoder::default();
    encoder.value(value)?;
    Ok(encoder.finish())
}

/// Deserialize a value written by [`dumps`].
pub fn loads(text: &str) -> Result<Value> {
    let mut decoder = Decoder::new(text);
    let value = decoder.value()?;
    decoder.finish()?;
    Ok(value)
}

pub fn encode_template(template: &Template) -> Result<String> {
    let mut encoder = Encoder::default();
    encoder.template(template, None)?;
    Ok(encoder.finish())
}

pub fn decode_template(text: &str) -> Result<Template> {
    let mut decoder = Decoder::new(text);
    let (offset, tag) = decoder.open()?;
    if tag != "template" {
        return Err(CodecError::UnknownTag {
            tag: tag.to_string(),
            offset,
        });
    }
    let template = decoder.template()?;
    decoder.finish()?;
    tracing::debug!(name = ?template.name, version = VERSION, "loaded template");
    Ok(template)
}

// ── Encoder ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct Encoder {
    out: String,
}

impl Encoder {
    fn finish(self) -> String {
        self.out
    }

    fn word(&mut self, word: impl std::fmt::Display) {
        use std::fmt::Write;
        if !self.out.is_empty() {
            self.out.push(' ');
        }
        let _ = write!(self.out, "{word}");
    }

    fn none(&mut self) {
        self.word("n");
    }

    fn bool(&mut self, b: bool) {
        self.word(if b { "T" } else { "F" });
    }

    fn int(&mut self, i: impl Into<i64>) {
        self.word(format_args!("i{}", i.into()));
    }

    fn usize(&mut self, n: usize) {
        self.word(format_args!("i{n}"));
    }

    fn string(&mut self, s: &str) {
        self.word(format_args!("s{}", serde_json::Value::from(s)));
    }

    fn opt_string(&mut self, s: Option<&str>) {
        match s {
            Some(s) => self.string(s),
            None => self.none(),
        }
    }

    pub(crate) fn value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::None => self.none(),
            Value::Bool(b) => self.bool(*b),
            Value::Int(i) => self.int(*i),
            Value::Float(f) => self.word(format_args!("f{f:?}")),
            Value::Str(s) => self.string(s),
            Value::Bytes(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
                self.word(format_args!("y{hex}"));
            }
            Value::Date(d) => self.word(format_args!("z{}", isoformat(d))),
            Value::TimeDelta(td) => {
                let (days, seconds, micros) = timedelta_parts(td);
                self.word(format_args!("t{days},{seconds},{micros}"));
            }
            Value::MonthDelta(m) => self.word(format_args!("m{}", m.0)),
            Value::Color(c) => {
                self.word(format_args!("c{:02x}{:02x}{:02x}{:02x}", c.r, c.g, c.b, c.a))
            }
            Value::List(items) => {
                self.word("[");
                for item in items {
                    self.value(item)?;
                }
                self.word("]");
            }
            Value::Dict(items) => {
                self.word("{");
                for (key, value) in items {
                    self.value(key)?;
                    self.value(value)?;
                }
                self.word("}");
            }
            Value::Template(closure) => {
                if !closure.vars.is_empty() || !closure.defaults.is_empty() {
                    return Err(CodecError::NotSerializable("closure"));
                }
                self.template(&closure.template, None)?;
            }
            Value::Undefined(_) => return Err(CodecError::NotSerializable("undefined")),
            Value::Function(_) => return Err(CodecError::NotSerializable("function")),
        }
        Ok(())
    }
}

// ── Decoder ─────────────────────────────────────────────────────────────

/// The source and whitespace mode of a template being read.
struct Frame {
    source: Arc<str>,
    keepws: bool,
}

pub(crate) struct Decoder<'a> {
    text: &'a str,
    pos: usize,
    frames: Vec<Frame>,
}

impl<'a> Decoder<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            frames: Vec::new(),
        }
    }

    fn malformed(&self, offset: usize, message: impl Into<String>) -> CodecError {
        CodecError::Malformed {
            offset,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.text[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek_word(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        let text: &'a str = self.text;
        let rest = &text[self.pos..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        (end > 0).then(|| &rest[..end])
    }

    /// Read the next whitespace delimited token and its offset.
    fn word(&mut self) -> Result<(usize, &'a str)> {
        let word = self
            .peek_word()
            .ok_or_else(|| self.malformed(self.pos, "unexpected end of input"))?;
        let offset = self.pos;
        self.pos += word.len();
        Ok((offset, word))
    }

    fn finish(&mut self) -> Result<()> {
        match self.peek_word() {
            None => Ok(()),
            Some(_) => Err(self.malformed(self.pos, "trailing data")),
        }
    }

    /// Whether the next token is `word`. Doesn't consume it.
    fn at(&mut self, word: &str) -> bool {
        self.peek_word() == Some(word)
    }

    fn expect(&mut self, expected: &str) -> Result<()> {
        let (offset, word) = self.word()?;
        if word == expected {
            Ok(())
        } else {
            Err(self.malformed(offset, format!("expected {expected:?}, found {word:?}")))
        }
    }

    /// Consume `n` if it comes next.
    fn none(&mut self) -> bool {
        let found = self.at("n");
        if found {
            self.pos += 1;
        }
        found
    }

    /// Read `(tag` and return the tag.
    fn open(&mut self) -> Result<(usize, &'a str)> {
        let (offset, word) = self.word()?;
        match word.strip_prefix('(') {
            Some(tag) if !tag.is_empty() => Ok((offset, tag)),
            _ => Err(self.malformed(offset, format!("expected a node, found {word:?}"))),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.expect(")")
    }

    fn int(&mut self) -> Result<i64> {
        let (offset, word) = self.word()?;
        word.strip_prefix('i')
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| self.malformed(offset, format!("expected an int, found {word:?}")))
    }

    fn usize(&mut self) -> Result<usize> {
        let offset = self.pos;
        let n = self.int()?;
        usize::try_from(n).map_err(|_| self.malformed(offset, format!("{n} is not an offset")))
    }

    fn bool(&mut self) -> Result<bool> {
        match self.word()? {
            (_, "T") => Ok(true),
            (_, "F") => Ok(false),
            (offset, word) => Err(self.malformed(offset, format!("expected a bool, found {word:?}"))),
        }
    }

    fn string(&mut self) -> Result<String> {
        self.skip_whitespace();
        let offset = self.pos;
        let rest = &self.text[self.pos..];
        let Some(json) = rest.strip_prefix('s') else {
            return Err(self.malformed(offset, "expected a string"));
        };
        let mut stream = serde_json::Deserializer::from_str(json).into_iter::<String>();
        let value = match stream.next() {
            Some(Ok(s)) => s,
            Some(Err(e)) => return Err(self.malformed(offset, format!("invalid string: {e}"))),
            None => return Err(self.malformed(offset, "unexpected end of input")),
        };
        self.pos += 1 + stream.byte_offset();
        Ok(value)
    }

    fn opt_string(&mut self) -> Result<Option<String>> {
        if self.none() { Ok(None) } else { self.string().map(Some) }
    }

    pub(crate) fn value(&mut self) -> Result<Value> {
        self.skip_whitespace();
        if self.text[self.pos..].starts_with('s') {
            return self.string().map(Value::Str);
        }
        let (offset, word) = self.word()?;
        let bad = |what: &str| CodecError::Malformed {
            offset,
            message: format!("invalid {what} {word:?}"),
        };
        let (tag, body) = word.split_at(word.chars().next().map_or(0, char::len_utf8));
        let value = match tag {
            "n" if body.is_empty() => Value::None,
            "T" if body.is_empty() => Value::Bool(true),
            "F" if body.is_empty() => Value::Bool(false),
            "i" => Value::Int(body.parse().map_err(|_| bad("int"))?),
            "f" => Value::Float(body.parse().map_err(|_| bad("float"))?),
            "y" => Value::Bytes(parse_hex(body).ok_or_else(|| bad("bytes"))?),
            "z" => Value::Date(
                NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S%.f")
                    .map_err(|_| bad("date"))?,
            ),
            "t" => {
                let parts: Vec<i64> = body
                    .split(',')
                    .map(str::parse)
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|_| bad("timedelta"))?;
                let [days, seconds, micros] = parts[..] else {
                    return Err(bad("timedelta"));
                };
                let total = i128::from(days) * 86_400_000_000
                    + i128::from(seconds) * 1_000_000
                    + i128::from(micros);
                Value::TimeDelta(timedelta_from_micros(total).ok_or_else(|| bad("timedelta"))?)
            }
            "m" => Value::MonthDelta(MonthDelta(body.parse().map_err(|_| bad("monthdelta"))?)),
            "c" => {
                let channels = parse_hex(body).ok_or_else(|| bad("color"))?;
                let [r, g, b, a] = channels[..] else {
                    return Err(bad("color"));
                };
                Value::Color(Color::new(r, g, b, a))
            }
            "[" if body.is_empty() => {
                let mut items = Vec::new();
                while !self.at("]") {
                    items.push(self.value()?);
                }
                self.expect("]")?;
                Value::List(items)
            }
            "{" if body.is_empty() => {
                let mut items = IndexMap::new();
                while !self.at("}") {
                    let key = self.value()?;
                    let value = self.value()?;
                    items.insert(key, value);
                }
                self.expect("}")?;
                Value::Dict(items)
            }
            "(" if body == "template" => {
                let template = self.template()?;
                Value::Template(Arc::new(Closure::new(Arc::new(template))))
            }
            "(" => {
                return Err(CodecError::UnknownTag {
                    tag: body.to_string(),
                    offset,
                });
            }
            _ => {
                return Err(CodecError::UnknownTag {
                    tag: word.to_string(),
                    offset,
                });
            }
        };
        Ok(value)
    }
}

fn parse_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::value::timedelta_micros;
    use chrono::{NaiveDate, TimeDelta};

    fn micros(value: &Value) -> Option<i128> {
        match value {
            Value::TimeDelta(td) => Some(timedelta_micros(td)),
            _ => None,
        }
    }

    fn round_trip(value: Value) {
        let dump = dumps(&value).unwrap();
        assert_eq!(loads(&dump).unwrap(), value, "dump was {dump}");
    }

    #[test]
    fn test_scalar_tokens() {
        assert_eq!(dumps(&Value::None).unwrap(), "n");
        assert_eq!(dumps(&Value::Int(-3)).unwrap(), "i-3");
        assert_eq!(dumps(&Value::Float(1.5)).unwrap(), "f1.5");
        assert_eq!(dumps(&Value::from("a b\"")).unwrap(), "s\"a b\\\"\"");
        assert_eq!(dumps(&Value::Color(Color::new(255, 0, 0, 255))).unwrap(), "cff0000ff");
    }

    #[test]
    fn test_value_round_trips() {
        round_trip(Value::from(vec![Value::None, Value::Bool(true), Value::Float(f64::INFINITY)]));
        round_trip(Value::from("spaces and \"quotes\" and ünïcode\n"));
        round_trip(Value::Bytes(vec![0, 1, 254, 255]));
        round_trip(Value::from(
            NaiveDate::from_ymd_opt(2012, 10, 6).unwrap().and_hms_micro_opt(12, 34, 56, 789).unwrap(),
        ));
        round_trip(Value::MonthDelta(MonthDelta(-5)));
        round_trip(Value::dict([("a", Value::from(vec![1, 2])), ("b", Value::Dict(IndexMap::new()))]));
    }

    #[test]
    fn test_negative_timedelta_round_trip() {
        let td = Value::TimeDelta(TimeDelta::microseconds(-1_500_000));
        let back = loads(&dumps(&td).unwrap()).unwrap();
        assert_eq!(micros(&back), Some(-1_500_000));
    }

    #[test]
    fn test_unserializable_values() {
        assert_eq!(
            dumps(&Value::Function(Arc::from("len"))),
            Err(CodecError::NotSerializable("function"))
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(loads("x1"), Err(CodecError::UnknownTag { .. })));
        assert!(matches!(loads("(bogus )"), Err(CodecError::UnknownTag { .. })));
        assert!(matches!(loads("[ i1"), Err(CodecError::Malformed { .. })));
        assert!(matches!(loads("i1 i2"), Err(CodecError::Malformed { .. })));
        assert!(matches!(loads("cff00"), Err(CodecError::Malformed { .. })));
    }
}
