//! The `format()` function: strftime patterns for dates and a subset of the
//! Python format specification mini-language for numbers and text.
//!
//! ```text
//! [[fill]align][sign][#][0][width][,][.precision][type]
//! ```

use chrono::format::{Item, StrftimeItems};

use crate::ast::value::{Value, format_float};
use crate::error::EvalError;

type Result<T> = std::result::Result<T, EvalError>;

/// Format `value` according to `spec`.
///
/// Dates use `strftime` directives. Only English month and weekday names
/// are available, so `lang` is accepted but doesn't change the output.
pub fn format_value(value: &Value, spec: &str, lang: Option<&str>) -> Result<String> {
    match value {
        Value::Date(d) => {
            let items: Vec<Item<'_>> = StrftimeItems::new(spec).collect();
            if items.iter().any(|item| matches!(item, Item::Error)) {
                return Err(EvalError::value_error(format!(
                    "invalid date format {}",
                    Value::from(spec).repr()
                )));
            }
            tracing::trace!(?lang, "formatting date");
            Ok(d.format_with_items(items.into_iter()).to_string())
        }
        Value::TimeDelta(_) | Value::MonthDelta(_) if spec.is_empty() => Ok(value.to_string()),
        Value::Bool(_) if spec.is_empty() => Ok(value.to_string()),
        Value::Str(s) => {
            let spec = FormatSpec::parse(spec)?;
            spec.text(s)
        }
        Value::Bool(b) => FormatSpec::parse(spec)?.int(i64::from(*b)),
        Value::Int(i) => FormatSpec::parse(spec)?.int(*i),
        Value::Float(f) => FormatSpec::parse(spec)?.float(*f),
        Value::None | Value::Undefined(_) if spec.is_empty() => Ok(String::new()),
        other => Err(EvalError::type_error(format!(
            "unsupported format string passed to '{}'.__format__",
            other.type_name()
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

fn invalid(spec: &str) -> EvalError {
    EvalError::value_error(format!("invalid format specifier {}", Value::from(spec).repr()))
}

fn digits(chars: &[char], pos: &mut usize) -> Option<usize> {
    let start = *pos;
    while chars.get(*pos).is_some_and(char::is_ascii_digit) {
        *pos += 1;
    }
    if *pos == start {
        return None;
    }
    chars[start..*pos].iter().collect::<String>().parse().ok()
}

impl FormatSpec {
    fn parse(spec: &str) -> Result<Self> {
        let chars: Vec<char> = spec.chars().collect();
        let mut out = FormatSpec::default();
        let mut pos = 0;
        let is_align = |c: Option<&char>| matches!(c, Some('<' | '>' | '=' | '^'));

        if is_align(chars.get(1)) {
            out.fill = Some(chars[0]);
            out.align = Some(chars[1]);
            pos = 2;
        } else if is_align(chars.first()) {
            out.align = Some(chars[0]);
            pos = 1;
        }
        if let Some(&c @ ('+' | '-' | ' ')) = chars.get(pos) {
            out.sign = Some(c);
            pos += 1;
        }
        if chars.get(pos) == Some(&'#') {
            out.alternate = true;
            pos += 1;
        }
        if chars.get(pos) == Some(&'0') {
            out.zero = true;
            pos += 1;
        }
        out.width = digits(&chars, &mut pos).unwrap_or(0);
        if chars.get(pos) == Some(&',') {
            out.grouping = true;
            pos += 1;
        }
        if chars.get(pos) == Some(&'.') {
            pos += 1;
            out.precision = Some(digits(&chars, &mut pos).ok_or_else(|| invalid(spec))?);
        }
        match &chars[pos..] {
            [] => {}
            [c] => out.kind = Some(*c),
            _ => return Err(invalid(spec)),
        }
        Ok(out)
    }

    fn text(&self, s: &str) -> Result<String> {
        if !matches!(self.kind, None | Some('s')) || self.sign.is_some() || self.alternate {
            return Err(EvalError::value_error("invalid format specifier for str"));
        }
        let body: String = match self.precision {
            Some(p) => s.chars().take(p).collect(),
            None => s.to_string(),
        };
        Ok(self.pad("", &body, '<'))
    }

    fn int(&self, i: i64) -> Result<String> {
        let magnitude = i.unsigned_abs();
        let (prefix, body) = match self.kind {
            None | Some('d') | Some('n') => ("", magnitude.to_string()),
            Some('b') => ("0b", format!("{magnitude:b}")),
            Some('o') => ("0o", format!("{magnitude:o}")),
            Some('x') => ("0x", format!("{magnitude:x}")),
            Some('X') => ("0X", format!("{magnitude:X}")),
            Some('c') => {
                let c = u32::try_from(i)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| EvalError::value_error("%c arg not in range(0x110000)"))?;
                return Ok(self.pad("", &c.to_string(), '<'));
            }
            Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => return self.float(i as f64),
            Some(other) => {
                return Err(EvalError::value_error(format!(
                    "unknown format code '{other}' for object of type 'int'"
                )));
            }
        };
        let body = if self.grouping { group(&body) } else { body };
        let prefix = if self.alternate { prefix } else { "" };
        let sign = self.sign_for(i < 0);
        Ok(self.pad(&format!("{sign}{prefix}"), &body, '>'))
    }

    fn float(&self, f: f64) -> Result<String> {
        let upper = matches!(self.kind, Some('E' | 'F' | 'G'));
        let magnitude = f.abs();
        let body = if !magnitude.is_finite() {
            let text = if magnitude.is_nan() { "nan" } else { "inf" };
            if upper { text.to_uppercase() } else { text.to_string() }
        } else {
            match self.kind {
                None => match self.precision {
                    Some(p) => general(magnitude, p, self.alternate, false),
                    None => format_float(magnitude),
                },
                Some('f' | 'F') => format!("{magnitude:.*}", self.precision.unwrap_or(6)),
                Some('e' | 'E') => exponent(magnitude, self.precision.unwrap_or(6), upper),
                Some('g' | 'G') => {
                    general(magnitude, self.precision.unwrap_or(6), self.alternate, upper)
                }
                Some('%') => format!("{:.*}%", self.precision.unwrap_or(6), magnitude * 100.0),
                Some(other) => {
                    return Err(EvalError::value_error(format!(
                        "unknown format code '{other}' for object of type 'float'"
                    )));
                }
            }
        };
        let body = if self.grouping && magnitude.is_finite() {
            let split = body.find(|c: char| !c.is_ascii_digit()).unwrap_or(body.len());
            format!("{}{}", group(&body[..split]), &body[split..])
        } else {
            body
        };
        let sign = self.sign_for(f.is_sign_negative() && !f.is_nan());
        Ok(self.pad(sign, &body, '>'))
    }

    fn sign_for(&self, negative: bool) -> &'static str {
        match (negative, self.sign) {
            (true, _) => "-",
            (false, Some('+')) => "+",
            (false, Some(' ')) => " ",
            _ => "",
        }
    }

    /// Pad `prefix + body` to the field width. `=` alignment pads between
    /// the sign/prefix and the digits.
    fn pad(&self, prefix: &str, body: &str, default_align: char) -> String {
        let len = prefix.chars().count() + body.chars().count();
        let (fill, align) = match (self.fill, self.align, self.zero) {
            (fill, Some(align), _) => (fill.unwrap_or(' '), align),
            (_, None, true) => ('0', '='),
            (_, None, false) => (' ', default_align),
        };
        let missing = self.width.saturating_sub(len);
        let padding = |n: usize| fill.to_string().repeat(n);
        match align {
            '<' => format!("{prefix}{body}{}", padding(missing)),
            '^' => format!(
                "{}{prefix}{body}{}",
                padding(missing / 2),
                padding(missing - missing / 2)
            ),
            '=' => format!("{prefix}{}{body}", padding(missing)),
            _ => format!("{}{prefix}{body}", padding(missing)),
        }
    }
}

/// Insert thousands separators into a run of digits.
fn group(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `1.500000e+02` style scientific notation.
fn exponent(f: f64, precision: usize, upper: bool) -> String {
    let text = format!("{f:.precision$e}");
    let (mantissa, exp) = text.split_once('e').unwrap_or((text.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{e}{sign}{:02}", exp.abs())
}

fn strip_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// The `g` presentation: fixed or scientific notation depending on the
/// exponent, with trailing zeros removed unless `alternate` is set.
fn general(f: f64, precision: usize, alternate: bool, upper: bool) -> String {
    let precision = precision.max(1);
    let exp = if f == 0.0 {
        0
    } else {
        let text = format!("{f:.*e}", precision - 1);
        text.split_once('e')
            .and_then(|(_, e)| e.parse::<i32>().ok())
            .unwrap_or(0)
    };
    if (-4..precision as i32).contains(&exp) {
        let decimals = (precision as i32 - 1 - exp) as usize;
        let text = format!("{f:.decimals$}");
        if alternate { text } else { strip_zeros(&text).to_string() }
    } else {
        let text = exponent(f, precision - 1, upper);
        if alternate {
            return text;
        }
        match text.split_once(['e', 'E']) {
            Some((mantissa, rest)) => {
                let e = if upper { 'E' } else { 'e' };
                format!("{}{e}{rest}", strip_zeros(mantissa))
            }
            None => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fmt(value: impl Into<Value>, spec: &str) -> String {
        format_value(&value.into(), spec, None).unwrap()
    }

    #[test]
    fn test_date_format() {
        let d = NaiveDate::from_ymd_opt(2012, 10, 6).unwrap().and_hms_opt(9, 5, 0).unwrap();
        assert_eq!(fmt(d, "%Y-%m-%d %H:%M"), "2012-10-06 09:05");
        assert_eq!(fmt(d, "%A, %d. %B"), "Saturday, 06. October");
        assert!(format_value(&Value::from(d), "%Q", None).is_err());
    }

    #[test]
    fn test_int_format() {
        assert_eq!(fmt(42, "5"), "   42");
        assert_eq!(fmt(42, "<5"), "42   ");
        assert_eq!(fmt(42, "*^6"), "**42**");
        assert_eq!(fmt(-42, "05"), "-0042");
        assert_eq!(fmt(255, "#x"), "0xff");
        assert_eq!(fmt(5, "+"), "+5");
        assert_eq!(fmt(1234567, ","), "1,234,567");
        assert_eq!(fmt(65, "c"), "A");
    }

    #[test]
    fn test_float_format() {
        assert_eq!(fmt(3.14159, ".2f"), "3.14");
        assert_eq!(fmt(-3.14159, "8.3f"), "  -3.142");
        assert_eq!(fmt(1234.5, "e"), "1.234500e+03");
        assert_eq!(fmt(0.00001234, "g"), "1.234e-05");
        assert_eq!(fmt(1234.5, "g"), "1234.5");
        assert_eq!(fmt(0.5, "%"), "50.000000%");
        assert_eq!(fmt(1234567.891, ",.2f"), "1,234,567.89");
        assert_eq!(fmt(1.0, ""), "1.0");
    }

    #[test]
    fn test_str_format() {
        assert_eq!(fmt("ab", ">4"), "  ab");
        assert_eq!(fmt("abcdef", ".3"), "abc");
        assert!(format_value(&Value::from("x"), "d", None).is_err());
    }

    #[test]
    fn test_invalid_spec() {
        assert!(format_value(&Value::Int(1), "5.x2", None).is_err());
        assert!(format_value(&Value::from(vec![1]), "5", None).is_err());
    }
}
