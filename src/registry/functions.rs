//! Built-in functions.
//!
//! Every function here is registered by [`register`] as a [`Builtin`]. The
//! handlers receive arguments already bound against their [`Signature`],
//! so they only check types.

use std::cmp::Ordering;
use std::fmt::Write;

use chrono::{Local, NaiveDate, TimeDelta, Utc};
use rand::Rng;

use crate::ast::color::Color;
use crate::ast::expr::BinOp;
use crate::ast::value::{MonthDelta, Value, format_float, timedelta_from_micros, timedelta_parts};
use crate::codec;
use crate::error::EvalError;
use crate::eval::{Evaluator, ops};

use super::{Args, Builtin, FunctionFn, Registry, Signature, format};

type Result<T> = std::result::Result<T, EvalError>;

fn add(registry: &mut Registry, sig: Signature, func: FunctionFn) {
    registry.register_function(Builtin::new(sig, func));
}

pub(crate) fn register(registry: &mut Registry) {
    let r = registry;

    // Output
    add(r, Signature::new("print").rest(), print);
    add(r, Signature::new("printx").rest(), printx);

    // Conversion
    add(r, Signature::new("str").optional("obj", ""), string);
    add(r, Signature::new("repr").required("obj"), repr);
    add(r, Signature::new("int").optional("obj", 0).optional("base", Value::None), integer);
    add(r, Signature::new("float").optional("obj", 0.0), float);
    add(r, Signature::new("bool").optional("obj", false), boolean);
    add(r, Signature::new("xmlescape").required("obj"), xmlescape_value);
    add(r, Signature::new("csv").required("obj"), csv);
    add(r, Signature::new("asjson").required("obj"), asjson);
    add(r, Signature::new("fromjson").required("string"), fromjson);
    add(r, Signature::new("asul4on").required("obj"), asul4on);
    add(r, Signature::new("fromul4on").required("string"), fromul4on);
    add(
        r,
        Signature::new("format")
            .required("obj")
            .required("fmt")
            .optional("lang", Value::None),
        format_value,
    );
    add(r, Signature::new("urlquote").required("string"), urlquote);
    add(r, Signature::new("urlunquote").required("string"), urlunquote);

    // Dates
    add(r, Signature::new("now"), now);
    add(r, Signature::new("utcnow"), utcnow);
    add(
        r,
        Signature::new("date")
            .required("year")
            .required("month")
            .required("day")
            .optional("hour", 0)
            .optional("minute", 0)
            .optional("second", 0)
            .optional("microsecond", 0),
        date,
    );
    add(
        r,
        Signature::new("timedelta")
            .optional("days", 0)
            .optional("seconds", 0)
            .optional("microseconds", 0),
        timedelta,
    );
    add(r, Signature::new("monthdelta").optional("months", 0), monthdelta);

    // Random numbers
    add(r, Signature::new("random"), random);
    add(r, Signature::new("randrange").rest(), randrange);
    add(r, Signature::new("randchoice").required("sequence"), randchoice);

    // Numbers
    add(r, Signature::new("abs").required("number"), abs);
    add(r, Signature::new("chr").required("i"), chr);
    add(r, Signature::new("ord").required("c"), ord);
    add(r, Signature::new("hex").required("number"), hex);
    add(r, Signature::new("oct").required("number"), oct);
    add(r, Signature::new("bin").required("number"), bin);

    // Sequences
    add(r, Signature::new("len").required("sequence"), len);
    add(r, Signature::new("any").required("iterable"), any);
    add(r, Signature::new("all").required("iterable"), all);
    add(r, Signature::new("enumerate").required("iterable").optional("start", 0), enumerate);
    add(r, Signature::new("enumfl").required("iterable").optional("start", 0), enumfl);
    add(r, Signature::new("isfirstlast").required("iterable"), isfirstlast);
    add(r, Signature::new("isfirst").required("iterable"), isfirst);
    add(r, Signature::new("islast").required("iterable"), islast);
    add(r, Signature::new("min").rest(), min);
    add(r, Signature::new("max").rest(), max);
    add(r, Signature::new("sorted").required("iterable"), sorted);
    r.register_function(Builtin::lazy(Signature::new("range").rest(), range, range_items));
    add(r, Signature::new("reversed").required("sequence"), reversed);
    add(r, Signature::new("zip").rest(), zip);

    // Type checks
    add(r, Signature::new("type").required("obj"), type_name);
    add(r, Signature::new("isundefined").required("obj"), |_, a| {
        Ok(Value::Bool(a.get(0).is_undefined()))
    });
    add(r, Signature::new("isdefined").required("obj"), |_, a| {
        Ok(Value::Bool(!a.get(0).is_undefined()))
    });
    add(r, Signature::new("isnone").required("obj"), |_, a| {
        Ok(Value::Bool(matches!(a.get(0), Value::None)))
    });
    add(r, Signature::new("isstr").required("obj"), |_, a| {
        Ok(Value::Bool(matches!(a.get(0), Value::Str(_))))
    });
    add(r, Signature::new("isint").required("obj"), |_, a| {
        Ok(Value::Bool(matches!(a.get(0), Value::Int(_))))
    });
    add(r, Signature::new("isfloat").required("obj"), |_, a| {
        Ok(Value::Bool(matches!(a.get(0), Value::Float(_))))
    });
    add(r, Signature::new("isbool").required("obj"), |_, a| {
        Ok(Value::Bool(matches!(a.get(0), Value::Bool(_))))
    });
    add(r, Signature::new("isdate").required("obj"), |_, a| {
        Ok(Value::Bool(matches!(a.get(0), Value::Date(_))))
    });
    add(r, Signature::new("istimedelta").required("obj"), |_, a| {
        Ok(Value::Bool(matches!(a.get(0), Value::TimeDelta(_))))
    });
    add(r, Signature::new("ismonthdelta").required("obj"), |_, a| {
        Ok(Value::Bool(matches!(a.get(0), Value::MonthDelta(_))))
    });
    add(r, Signature::new("islist").required("obj"), |_, a| {
        Ok(Value::Bool(matches!(a.get(0), Value::List(_))))
    });
    add(r, Signature::new("isdict").required("obj"), |_, a| {
        Ok(Value::Bool(matches!(a.get(0), Value::Dict(_))))
    });
    add(r, Signature::new("iscolor").required("obj"), |_, a| {
        Ok(Value::Bool(matches!(a.get(0), Value::Color(_))))
    });
    add(r, Signature::new("istemplate").required("obj"), |_, a| {
        Ok(Value::Bool(matches!(a.get(0), Value::Template(_))))
    });
    add(r, Signature::new("isfunction").required("obj"), |_, a| {
        Ok(Value::Bool(a.get(0).is_callable()))
    });

    // Colors
    add(
        r,
        Signature::new("rgb").required("r").required("g").required("b").optional("a", 1.0),
        |_, a| Ok(Color::from_rgb(a.float(0)?, a.float(1)?, a.float(2)?, a.float(3)?).into()),
    );
    add(
        r,
        Signature::new("hls").required("h").required("l").required("s").optional("a", 1.0),
        |_, a| Ok(Color::from_hls(a.float(0)?, a.float(1)?, a.float(2)?, a.float(3)?).into()),
    );
    add(
        r,
        Signature::new("hsv").required("h").required("s").required("v").optional("a", 1.0),
        |_, a| Ok(Color::from_hsv(a.float(0)?, a.float(1)?, a.float(2)?, a.float(3)?).into()),
    );
}

// ── Output ──────────────────────────────────────────────────────────────

fn print(ev: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let text: Vec<String> = args.rest.iter().map(Value::to_string).collect();
    ev.write(text.join(" "));
    Ok(Value::None)
}

fn printx(ev: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let text: Vec<String> = args
        .rest
        .iter()
        .map(|v| xmlescape(&v.to_string()))
        .collect();
    ev.write(text.join(" "));
    Ok(Value::None)
}

/// Escape text for use in XML/HTML content and attribute values.
///
/// ```rust
/// assert_eq!(ul4::xmlescape("<a href='x'>&</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;");
/// ```
pub fn xmlescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if c.is_control() => {
                let _ = write!(out, "&#{};", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

// ── Conversion ──────────────────────────────────────────────────────────

fn string(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    Ok(Value::Str(args.get(0).to_string()))
}

fn repr(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    Ok(Value::Str(args.get(0).repr()))
}

fn xmlescape_value(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    Ok(Value::Str(xmlescape(&args.get(0).to_string())))
}

fn integer(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    if let Some(base) = args.opt_int(1)? {
        let text = args.str(0)?;
        let base = u32::try_from(base)
            .ok()
            .filter(|b| (2..=36).contains(b))
            .ok_or_else(|| args.error(1, "must be >= 2 and <= 36"))?;
        return parse_int(text, base).map(Value::Int);
    }
    match args.get(0) {
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => {
            let t = f.trunc();
            if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
                Ok(Value::Int(t as i64))
            } else {
                Err(EvalError::value_error(format!(
                    "cannot convert float {} to integer",
                    format_float(*f)
                )))
            }
        }
        Value::Str(s) => parse_int(s, 10).map(Value::Int),
        other => Err(EvalError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_int(text: &str, base: u32) -> Result<i64> {
    let trimmed = text.trim();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let prefix = match base {
        2 => Some(["0b", "0B"]),
        8 => Some(["0o", "0O"]),
        16 => Some(["0x", "0X"]),
        _ => None,
    };
    let digits = prefix
        .and_then(|p| p.iter().find_map(|p| digits.strip_prefix(p)))
        .unwrap_or(digits);
    let invalid = || {
        EvalError::value_error(format!(
            "invalid literal for int() with base {base}: {}",
            Value::from(text).repr()
        ))
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(invalid());
    }
    i64::from_str_radix(&format!("{sign}{digits}"), base).map_err(|_| invalid())
}

fn float(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    match args.get(0) {
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            EvalError::value_error(format!(
                "could not convert string to float: {}",
                args.get(0).repr()
            ))
        }),
        other => other.as_f64().map(Value::Float).ok_or_else(|| {
            EvalError::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn boolean(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    Ok(Value::Bool(args.get(0).is_truthy()))
}

fn csv(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let text = match args.get(0) {
        Value::None | Value::Undefined(_) => String::new(),
        Value::Str(s) => s.clone(),
        other => other.repr(),
    };
    if text.contains([',', '"', '\n']) {
        Ok(Value::Str(format!("\"{}\"", text.replace('"', "\"\""))))
    } else {
        Ok(Value::Str(text))
    }
}

fn asjson(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    to_json(args.get(0)).map(Value::Str)
}

/// Render a value as a JavaScript literal. Dates, durations and colors
/// become constructor calls understood by the JavaScript runtime.
fn to_json(value: &Value) -> Result<String> {
    Ok(match value {
        Value::None => "null".to_string(),
        Value::Undefined(_) => "{}.undefined".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_nan() => "NaN".to_string(),
        Value::Float(f) if f.is_infinite() => {
            if *f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
        }
        Value::Float(f) => format_float(*f),
        Value::Str(s) => serde_json::Value::from(s.as_str()).to_string(),
        Value::Date(d) => {
            use chrono::{Datelike, Timelike};
            format!(
                "new Date({}, {}, {}, {}, {}, {}, {})",
                d.year(),
                d.month0(),
                d.day(),
                d.hour(),
                d.minute(),
                d.second(),
                d.nanosecond() / 1_000_000
            )
        }
        Value::TimeDelta(td) => {
            let (days, seconds, micros) = timedelta_parts(td);
            format!("ul4.TimeDelta.create({days}, {seconds}, {micros})")
        }
        Value::MonthDelta(m) => format!("ul4.MonthDelta.create({})", m.0),
        Value::Color(c) => format!("ul4.Color.create({}, {}, {}, {})", c.r, c.g, c.b, c.a),
        Value::List(items) => {
            let items = items.iter().map(to_json).collect::<Result<Vec<_>>>()?;
            format!("[{}]", items.join(", "))
        }
        Value::Dict(items) => {
            let items = items
                .iter()
                .map(|(k, v)| Ok(format!("{}: {}", to_json(k)?, to_json(v)?)))
                .collect::<Result<Vec<_>>>()?;
            format!("{{{}}}", items.join(", "))
        }
        Value::Template(closure) => {
            let dump = codec::encode_template(&closure.template)?;
            format!("ul4.Template.loads({})", serde_json::Value::from(dump))
        }
        other => {
            return Err(EvalError::type_error(format!(
                "can't convert '{}' to JSON",
                other.type_name()
            )));
        }
    })
}

fn fromjson(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let text = args.str(0)?;
    let json: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        EvalError::value_error(format!("fromjson() invalid JSON: {e}")).with_source(e)
    })?;
    Ok(from_json(json))
}

fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(items) => Value::Dict(
            items
                .into_iter()
                .map(|(k, v)| (Value::Str(k), from_json(v)))
                .collect(),
        ),
    }
}

fn asul4on(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    Ok(Value::Str(codec::dumps(args.get(0))?))
}

fn fromul4on(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    Ok(codec::loads(args.str(0)?)?)
}

fn format_value(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let spec = args.str(1)?;
    let lang = args.opt_str(2)?;
    format::format_value(args.get(0), spec, lang).map(Value::Str)
}

fn is_url_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-' | b'~')
}

fn urlquote(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let mut out = String::new();
    for b in args.str(0)?.bytes() {
        match b {
            b' ' => out.push('+'),
            b if is_url_safe(b) => out.push(char::from(b)),
            b => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    Ok(Value::Str(out))
}

fn urlunquote(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let text = args.str(0)?.as_bytes();
    let mut bytes = Vec::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        match text[i] {
            b'+' => bytes.push(b' '),
            b'%' => {
                let hex = text
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(b) => {
                        bytes.push(b);
                        i += 2;
                    }
                    None => bytes.push(b'%'),
                }
            }
            b => bytes.push(b),
        }
        i += 1;
    }
    Ok(Value::Str(String::from_utf8_lossy(&bytes).into_owned()))
}

// ── Dates ───────────────────────────────────────────────────────────────

fn now(_: &mut Evaluator<'_>, _: Args) -> Result<Value> {
    Ok(Value::Date(Local::now().naive_local()))
}

fn utcnow(_: &mut Evaluator<'_>, _: Args) -> Result<Value> {
    Ok(Value::Date(Utc::now().naive_utc()))
}

/// Argument `index` as a date component.
fn component<T: TryFrom<i64>>(args: &Args, index: usize) -> Result<T> {
    T::try_from(args.int(index)?).map_err(|_| args.error(index, "is out of range"))
}

fn date(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let micro: u32 = component(&args, 6)?;
    NaiveDate::from_ymd_opt(component(&args, 0)?, component(&args, 1)?, component(&args, 2)?)
        .filter(|_| micro < 1_000_000)
        .and_then(|d| {
            d.and_hms_micro_opt(
                component(&args, 3).ok()?,
                component(&args, 4).ok()?,
                component(&args, 5).ok()?,
                micro,
            )
        })
        .map(Value::Date)
        .ok_or_else(|| EvalError::value_error("date out of range"))
}

fn timedelta(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    const SCALE: [i128; 3] = [86_400_000_000, 1_000_000, 1];
    let mut micros: i128 = 0;
    let mut fraction = 0.0;
    for (i, scale) in SCALE.into_iter().enumerate() {
        match args.get(i) {
            Value::Float(f) => fraction += f * scale as f64,
            _ => micros += i128::from(args.int(i)?) * scale,
        }
    }
    if !fraction.is_finite() {
        return Err(EvalError::value_error("timedelta out of range"));
    }
    timedelta_from_micros(micros + fraction.round() as i128)
        .map(Value::TimeDelta)
        .ok_or_else(|| EvalError::value_error("timedelta out of range"))
}

fn monthdelta(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    Ok(Value::MonthDelta(MonthDelta(args.int(0)?)))
}

// ── Random numbers ──────────────────────────────────────────────────────

fn random(_: &mut Evaluator<'_>, _: Args) -> Result<Value> {
    Ok(Value::Float(rand::rng().random::<f64>()))
}

/// `(start, stop, step)` from one to three integer arguments.
fn range_args(callee: &str, args: &[Value]) -> Result<(i64, i64, i64)> {
    let ints = args
        .iter()
        .map(|v| {
            v.as_int().ok_or_else(|| {
                EvalError::type_error(format!(
                    "{callee}() arguments must be int, not '{}'",
                    v.type_name()
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(EvalError::argument(
                callee,
                format!("expected 1 to 3 arguments, got {}", ints.len()),
            ));
        }
    };
    if step == 0 {
        return Err(EvalError::value_error(format!("{callee}() step must not be zero")));
    }
    Ok((start, stop, step))
}

/// Number of items in `range(start, stop, step)`.
fn range_len(start: i64, stop: i64, step: i64) -> i128 {
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let span = if step > 0 { stop - start } else { start - stop };
    let step = step.abs();
    if span <= 0 { 0 } else { (span + step - 1) / step }
}

fn randrange(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let (start, stop, step) = range_args("randrange", &args.rest)?;
    let count = range_len(start, stop, step);
    if count == 0 {
        return Err(EvalError::value_error("empty range for randrange()"));
    }
    let k = rand::rng().random_range(0..count);
    let value = i128::from(start) + k * i128::from(step);
    Ok(Value::Int(value as i64))
}

fn randchoice(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let mut items = ops::iterate(args.get(0))?;
    if items.is_empty() {
        return Err(EvalError::value_error("can't choose from an empty sequence"));
    }
    let i = rand::rng().random_range(0..items.len());
    Ok(items.swap_remove(i))
}

// ── Numbers ─────────────────────────────────────────────────────────────

fn abs(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    match args.get(0) {
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| EvalError::arithmetic("integer overflow")),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::TimeDelta(td) if *td < TimeDelta::zero() => Ok(Value::TimeDelta(-*td)),
        Value::TimeDelta(td) => Ok(Value::TimeDelta(*td)),
        Value::MonthDelta(m) => Ok(Value::MonthDelta(MonthDelta(m.0.abs()))),
        other => Err(EvalError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn chr(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    u32::try_from(args.int(0)?)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::Str(c.to_string()))
        .ok_or_else(|| EvalError::value_error("chr() arg not in range(0x110000)"))
}

fn ord(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let text = args.str(0)?;
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
        _ => Err(EvalError::type_error(format!(
            "ord() expected a character, but string of length {} found",
            text.chars().count()
        ))),
    }
}

fn radix(args: &Args, prefix: &str, digits: fn(u64) -> String) -> Result<Value> {
    let n = args.int(0)?;
    let sign = if n < 0 { "-" } else { "" };
    Ok(Value::Str(format!("{sign}{prefix}{}", digits(n.unsigned_abs()))))
}

fn hex(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    radix(&args, "0x", |n| format!("{n:x}"))
}

fn oct(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    radix(&args, "0o", |n| format!("{n:o}"))
}

fn bin(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    radix(&args, "0b", |n| format!("{n:b}"))
}

// ── Sequences ───────────────────────────────────────────────────────────

fn len(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let n = match args.get(0) {
        Value::Str(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(l) => l.len(),
        Value::Dict(d) => d.len(),
        other => {
            return Err(EvalError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(n as i64))
}

fn any(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    Ok(Value::Bool(ops::iterate(args.get(0))?.iter().any(Value::is_truthy)))
}

fn all(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    Ok(Value::Bool(ops::iterate(args.get(0))?.iter().all(Value::is_truthy)))
}

fn enumerate(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let start = args.int(1)?;
    let items = ops::iterate(args.get(0))?;
    Ok(Value::List(
        (start..)
            .zip(items)
            .map(|(i, item)| Value::List(vec![Value::Int(i), item]))
            .collect(),
    ))
}

/// Each item paired with whether it is the first and the last one.
fn first_last(items: Vec<Value>) -> impl Iterator<Item = (bool, bool, Value)> {
    let count = items.len();
    items
        .into_iter()
        .enumerate()
        .map(move |(i, item)| (i == 0, i + 1 == count, item))
}

fn enumfl(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let start = args.int(1)?;
    let items = ops::iterate(args.get(0))?;
    Ok(Value::List(
        (start..)
            .zip(first_last(items))
            .map(|(i, (first, last, item))| {
                Value::List(vec![Value::Int(i), Value::Bool(first), Value::Bool(last), item])
            })
            .collect(),
    ))
}

fn isfirstlast(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let items = ops::iterate(args.get(0))?;
    Ok(Value::List(
        first_last(items)
            .map(|(first, last, item)| Value::List(vec![Value::Bool(first), Value::Bool(last), item]))
            .collect(),
    ))
}

fn isfirst(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let items = ops::iterate(args.get(0))?;
    Ok(Value::List(
        first_last(items)
            .map(|(first, _, item)| Value::List(vec![Value::Bool(first), item]))
            .collect(),
    ))
}

fn islast(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let items = ops::iterate(args.get(0))?;
    Ok(Value::List(
        first_last(items)
            .map(|(_, last, item)| Value::List(vec![Value::Bool(last), item]))
            .collect(),
    ))
}

/// The smallest or largest of the arguments, or of the items of a single
/// argument.
fn extreme(args: &Args, op: BinOp, keep: Ordering) -> Result<Value> {
    let items = match args.rest.as_slice() {
        [] => {
            return Err(EvalError::argument(
                args.callee(),
                "expected at least 1 argument, got 0",
            ));
        }
        [single] => ops::iterate(single)?,
        many => many.to_vec(),
    };
    let mut items = items.into_iter();
    let Some(mut best) = items.next() else {
        return Err(EvalError::value_error(format!(
            "{}() arg is an empty sequence",
            args.callee()
        )));
    };
    for item in items {
        if ops::compare(op, &item, &best)? == keep {
            best = item;
        }
    }
    Ok(best)
}

fn min(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    extreme(&args, BinOp::Lt, Ordering::Less)
}

fn max(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    extreme(&args, BinOp::Gt, Ordering::Greater)
}

/// Stable merge sort with a comparison that can fail.
pub(crate) fn sort_values(mut items: Vec<Value>) -> Result<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = sort_values(items)?;
    let right = sort_values(right)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        if ops::compare(BinOp::Lt, b, a)? == Ordering::Less {
            out.extend(right.next());
        } else {
            out.extend(left.next());
        }
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

fn sorted(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    sort_values(ops::iterate(args.get(0))?).map(Value::List)
}

/// `range()` as a list. Loops over a range never get here, they count
/// through [`range_items`] instead.
fn range(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let (start, stop, step) = range_args("range", &args.rest)?;
    let count = range_len(start, stop, step);
    if count > ops::MAX_SEQUENCE_LEN as i128 {
        return Err(EvalError::value_error("range() too large"));
    }
    Ok(Value::List(ops::Items::range(start, stop, step).collect()))
}

fn range_items(args: &Args) -> Result<ops::Items> {
    let (start, stop, step) = range_args("range", &args.rest)?;
    Ok(ops::Items::range(start, stop, step))
}

fn reversed(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let mut items = ops::iterate(args.get(0))?;
    items.reverse();
    Ok(Value::List(items))
}

fn zip(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    let columns = args
        .rest
        .iter()
        .map(ops::iterate)
        .collect::<Result<Vec<_>>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut columns: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
    let mut out = Vec::with_capacity(rows);
    for _ in 0..rows {
        out.push(Value::List(columns.iter_mut().filter_map(Iterator::next).collect()));
    }
    Ok(Value::List(out))
}

// ── Types ───────────────────────────────────────────────────────────────

fn type_name(_: &mut Evaluator<'_>, args: Args) -> Result<Value> {
    Ok(Value::from(args.get(0).type_name()))
}

#[cfg(test)]
mod tests {
    use crate::{CompileOptions, Template, Vars};

    fn render(source: &str) -> String {
        Template::compile(source, CompileOptions::new())
            .expect("compile")
            .render_to_string(Vars::new())
            .expect("render")
    }

    fn render_err(source: &str) -> crate::EvalError {
        Template::compile(source, CompileOptions::new())
            .expect("compile")
            .render_to_string(Vars::new())
            .unwrap_err()
    }

    #[test]
    fn test_print_joins_with_spaces() {
        assert_eq!(render("<?code print(1, 'a', None)?>"), "1 a ");
        assert_eq!(render("<?code printx('<', '&')?>"), "&lt; &amp;");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(render("<?print repr(str(1.0))?>"), "'1.0'");
        assert_eq!(render("<?print int('42') + int(3.9) + int('ff', 16)?>"), "300");
        assert_eq!(render("<?print float('1.5')?>"), "1.5");
        assert_eq!(render("<?print bool([])?>"), "False");
        assert!(render_err("<?print int('x')?>").message.contains("invalid literal"));
    }

    #[test]
    fn test_xmlescape_and_csv() {
        assert_eq!(super::xmlescape("a\u{1}b"), "a&#1;b");
        assert_eq!(render("<?print xmlescape(None)?>"), "");
        assert_eq!(render("<?print csv('a,b')?>|<?print csv(1)?>|<?print csv('x\"y')?>"), "\"a,b\"|1|\"x\"\"y\"");
    }

    #[test]
    fn test_asjson() {
        assert_eq!(
            render("<?print asjson([1, 2.5, 'x\"', None, True, {'a': @(2012-10-06)}])?>"),
            "[1, 2.5, \"x\\\"\", null, true, {\"a\": new Date(2012, 9, 6, 0, 0, 0, 0)}]"
        );
        assert_eq!(render("<?print asjson(#fff)?>"), "ul4.Color.create(255, 255, 255, 255)");
    }

    #[test]
    fn test_fromjson() {
        assert_eq!(render("<?print repr(fromjson('{\"a\": [1, 2.5, null]}'))?>"), "{'a': [1, 2.5, None]}");
    }

    #[test]
    fn test_dates_and_durations() {
        assert_eq!(render("<?print date(2012, 10, 6, 12)?>"), "2012-10-06 12:00:00");
        assert_eq!(render("<?print timedelta(1, 30)?>"), "1 day, 0:00:30");
        assert_eq!(render("<?print timedelta(0.5)?>"), "12:00:00");
        assert_eq!(render("<?print monthdelta(2)?>"), "2 months");
        assert!(render_err("<?print date(2012, 13, 1)?>").message.contains("out of range"));
        assert_eq!(render("<?print isdate(now()) and isdate(utcnow())?>"), "True");
    }

    #[test]
    fn test_random_stays_in_range() {
        for _ in 0..20 {
            let r: f64 = render("<?print random()?>").parse().unwrap();
            assert!((0.0..1.0).contains(&r));
            let n: i64 = render("<?print randrange(10, 20, 5)?>").parse().unwrap();
            assert!(n == 10 || n == 15);
            assert_eq!(render("<?print randchoice('aaa')?>"), "a");
        }
        assert!(render_err("<?print randrange(0)?>").message.contains("empty range"));
    }

    #[test]
    fn test_number_functions() {
        assert_eq!(render("<?print abs(-3)?> <?print abs(-1.5)?>"), "3 1.5");
        assert_eq!(render("<?print chr(65)?><?print ord('A')?>"), "A65");
        assert_eq!(render("<?print hex(255)?> <?print oct(-8)?> <?print bin(5)?>"), "0xff -0o10 0b101");
    }

    #[test]
    fn test_sequence_functions() {
        assert_eq!(render("<?print len('äb')?><?print len([1, 2, 3])?><?print len({})?>"), "230");
        assert_eq!(render("<?print any([0, 1])?> <?print all([0, 1])?>"), "True False");
        assert_eq!(render("<?print enumerate('ab', 1)?>"), "[[1, 'a'], [2, 'b']]");
        assert_eq!(
            render("<?print enumfl('ab')?>"),
            "[[0, True, False, 'a'], [1, False, True, 'b']]"
        );
        assert_eq!(render("<?print isfirstlast([1])?>"), "[[True, True, 1]]");
        assert_eq!(render("<?print isfirst([1, 2])?>"), "[[True, 1], [False, 2]]");
        assert_eq!(render("<?print islast([1, 2])?>"), "[[False, 1], [True, 2]]");
        assert_eq!(render("<?print min(3, 1, 2)?><?print max([3, 1, 2])?>"), "13");
        assert_eq!(render("<?print sorted([3, 1.5, 2])?>"), "[1.5, 2, 3]");
        assert_eq!(render("<?print range(5, 0, -2)?>"), "[5, 3, 1]");
        assert_eq!(render("<?print reversed('abc')?>"), "['c', 'b', 'a']");
        assert_eq!(render("<?print zip([1, 2, 3], 'ab')?>"), "[[1, 'a'], [2, 'b']]");
        assert!(render_err("<?print min([])?>").message.contains("empty sequence"));
        assert!(render_err("<?print sorted([1, 'a'])?>").message.contains("unsupported operand"));
    }

    #[test]
    fn test_huge_range_is_only_counted_through() {
        assert_eq!(
            render("<?for i in range(1000000000000)?><?print i?><?break?><?end for?>"),
            "0"
        );
        assert_eq!(render("<?print [i * 2 for i in range(3, 0, -1)]?>"), "[6, 4, 2]");
        let err = render_err("<?print len(range(1000000000000))?>");
        assert_eq!(err.message, "range() too large");
    }

    #[test]
    fn test_type_checks() {
        assert_eq!(render("<?print type(1)?> <?print type(x)?> <?print type(len)?>"), "int undefined function");
        assert_eq!(render("<?print isint(True)?> <?print isbool(True)?>"), "False True");
        assert_eq!(render("<?print isdefined(x)?> <?print isnone(None)?>"), "False True");
        assert_eq!(render("<?def t?><?end def?><?print istemplate(t)?> <?print isfunction(t)?>"), "True True");
    }

    #[test]
    fn test_urlquote_round_trip() {
        assert_eq!(render("<?print urlquote('a b/ä')?>"), "a+b%2F%C3%A4");
        assert_eq!(render("<?print urlunquote('a+b%2F%C3%A4')?>"), "a b/ä");
    }

    #[test]
    fn test_color_constructors() {
        assert_eq!(render("<?print repr(rgb(1, 0, 0))?>"), "#f00");
        assert_eq!(render("<?print repr(hls(0, 0.5, 1))?>"), "#f00");
        assert_eq!(render("<?print repr(hsv(0, 1, 1, 0))?>"), "#f000");
    }
}
