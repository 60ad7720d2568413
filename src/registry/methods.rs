//! Built-in methods, keyed by receiver kind.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Timelike};
use indexmap::IndexMap;

use crate::ast::color::Color;
use crate::ast::value::{Value, ValueKind, isoformat, timedelta_parts};
use crate::error::EvalError;
use crate::eval::{Evaluator, ops};

use super::{Args, BuiltinMethod, MethodFn, Registry, Signature};

type Result<T> = std::result::Result<T, EvalError>;

fn method(registry: &mut Registry, kind: ValueKind, sig: Signature, func: MethodFn) {
    registry.register_method(kind, BuiltinMethod::new(sig, func));
}

fn mutating(registry: &mut Registry, kind: ValueKind, sig: Signature, func: MethodFn) {
    registry.register_method(kind, BuiltinMethod::mutating(sig, func));
}

pub(crate) fn register(registry: &mut Registry) {
    use ValueKind as K;
    let r = registry;

    // ── str ──
    let split_sig = |name: &str| Signature::new(name).optional("sep", Value::None).optional("count", Value::None);
    let strip_sig = |name: &str| Signature::new(name).optional("chars", Value::None);
    let find_sig = |name: &str| {
        Signature::new(name)
            .required("sub")
            .optional("start", Value::None)
            .optional("end", Value::None)
    };
    method(r, K::Str, split_sig("split"), str_split);
    method(r, K::Str, split_sig("rsplit"), str_rsplit);
    method(r, K::Str, strip_sig("strip"), |_, s, a| strip(s, &a, Side::Both));
    method(r, K::Str, strip_sig("lstrip"), |_, s, a| strip(s, &a, Side::Start));
    method(r, K::Str, strip_sig("rstrip"), |_, s, a| strip(s, &a, Side::End));
    method(r, K::Str, find_sig("find"), |_, s, a| str_find(s, &a, false));
    method(r, K::Str, find_sig("rfind"), |_, s, a| str_find(s, &a, true));
    method(r, K::Str, Signature::new("startswith").required("prefix"), |_, s, a| {
        affix(s, &a, |s, p| s.starts_with(p))
    });
    method(r, K::Str, Signature::new("endswith").required("suffix"), |_, s, a| {
        affix(s, &a, |s, p| s.ends_with(p))
    });
    method(r, K::Str, Signature::new("upper"), |_, s, _| Ok(text(s).to_uppercase().into()));
    method(r, K::Str, Signature::new("lower"), |_, s, _| Ok(text(s).to_lowercase().into()));
    method(r, K::Str, Signature::new("capitalize"), str_capitalize);
    method(
        r,
        K::Str,
        Signature::new("replace")
            .required("old")
            .required("new")
            .optional("count", Value::None),
        str_replace,
    );
    method(r, K::Str, Signature::new("join").required("iterable"), str_join);

    // ── list ──
    method(r, K::List, find_sig("find"), |_, l, a| list_find(l, &a, false));
    method(r, K::List, find_sig("rfind"), |_, l, a| list_find(l, &a, true));
    mutating(r, K::List, Signature::new("append").rest(), list_append);
    mutating(r, K::List, Signature::new("insert").required("pos").rest(), list_insert);
    mutating(r, K::List, Signature::new("pop").optional("pos", -1), list_pop);

    // ── dict ──
    method(r, K::Dict, Signature::new("items"), |_, d, _| {
        Ok(Value::List(
            dict(d)?
                .iter()
                .map(|(k, v)| Value::List(vec![k.clone(), v.clone()]))
                .collect(),
        ))
    });
    method(r, K::Dict, Signature::new("values"), |_, d, _| {
        Ok(Value::List(dict(d)?.values().cloned().collect()))
    });
    method(
        r,
        K::Dict,
        Signature::new("get").required("key").optional("default", Value::None),
        |_, d, a| Ok(dict(d)?.get(a.get(0)).cloned().unwrap_or_else(|| a.get(1).clone())),
    );
    mutating(r, K::Dict, Signature::new("update").rest().rest_keyword(), dict_update);

    // ── date ──
    method(r, K::Date, Signature::new("weekday"), |_, d, _| {
        Ok(Value::Int(i64::from(date(d)?.weekday().num_days_from_monday())))
    });
    method(r, K::Date, Signature::new("week").optional("firstweekday", Value::None), date_week);
    method(r, K::Date, Signature::new("isoformat"), |_, d, _| {
        let iso = isoformat(&date(d)?);
        Ok(Value::Str(iso.strip_suffix("T00:00:00").unwrap_or(&iso).to_string()))
    });
    method(r, K::Date, Signature::new("mimeformat"), |_, d, _| {
        Ok(Value::Str(date(d)?.format("%a, %d %b %Y %H:%M:%S GMT").to_string()))
    });
    method(r, K::Date, Signature::new("yearday"), |_, d, _| {
        Ok(Value::Int(i64::from(date(d)?.ordinal())))
    });
    method(r, K::Date, Signature::new("year"), |_, d, _| Ok(Value::Int(i64::from(date(d)?.year()))));
    method(r, K::Date, Signature::new("month"), |_, d, _| Ok(Value::Int(i64::from(date(d)?.month()))));
    method(r, K::Date, Signature::new("day"), |_, d, _| Ok(Value::Int(i64::from(date(d)?.day()))));
    method(r, K::Date, Signature::new("hour"), |_, d, _| Ok(Value::Int(i64::from(date(d)?.hour()))));
    method(r, K::Date, Signature::new("minute"), |_, d, _| {
        Ok(Value::Int(i64::from(date(d)?.minute())))
    });
    method(r, K::Date, Signature::new("second"), |_, d, _| {
        Ok(Value::Int(i64::from(date(d)?.second())))
    });
    method(r, K::Date, Signature::new("microsecond"), |_, d, _| {
        Ok(Value::Int(i64::from(date(d)?.nanosecond() / 1000)))
    });

    // ── timedelta / monthdelta ──
    method(r, K::TimeDelta, Signature::new("days"), |_, td, _| Ok(Value::Int(duration(td)?.0)));
    method(r, K::TimeDelta, Signature::new("seconds"), |_, td, _| Ok(Value::Int(duration(td)?.1)));
    method(r, K::TimeDelta, Signature::new("microseconds"), |_, td, _| {
        Ok(Value::Int(duration(td)?.2))
    });
    method(r, K::MonthDelta, Signature::new("months"), |_, m, _| match m {
        Value::MonthDelta(m) => Ok(Value::Int(m.0)),
        other => Err(wrong_receiver(other, "monthdelta")),
    });

    // ── color ──
    method(r, K::Color, Signature::new("r"), |_, c, _| Ok(Value::Int(i64::from(color(c)?.r))));
    method(r, K::Color, Signature::new("g"), |_, c, _| Ok(Value::Int(i64::from(color(c)?.g))));
    method(r, K::Color, Signature::new("b"), |_, c, _| Ok(Value::Int(i64::from(color(c)?.b))));
    method(r, K::Color, Signature::new("a"), |_, c, _| Ok(Value::Int(i64::from(color(c)?.a))));
    method(r, K::Color, Signature::new("hls"), |_, c, _| {
        let (h, l, s) = color(c)?.hls();
        Ok(Value::from(vec![h, l, s]))
    });
    method(r, K::Color, Signature::new("hlsa"), |_, c, _| {
        let c = color(c)?;
        let (h, l, s) = c.hls();
        Ok(Value::from(vec![h, l, s, c.alpha()]))
    });
    method(r, K::Color, Signature::new("hsv"), |_, c, _| {
        let (h, s, v) = color(c)?.hsv();
        Ok(Value::from(vec![h, s, v]))
    });
    method(r, K::Color, Signature::new("hsva"), |_, c, _| {
        let c = color(c)?;
        let (h, s, v) = c.hsv();
        Ok(Value::from(vec![h, s, v, c.alpha()]))
    });
    method(r, K::Color, Signature::new("lum"), |_, c, _| Ok(Value::Float(color(c)?.lum())));
    method(r, K::Color, Signature::new("withlum").required("lum"), |_, c, a| {
        Ok(Value::Color(color(c)?.with_lum(a.float(0)?)))
    });
    method(r, K::Color, Signature::new("witha").required("a"), |_, c, a| {
        let alpha = u8::try_from(a.int(0)?).map_err(|_| a.error(0, "must be in 0..=255"))?;
        Ok(Value::Color(color(c)?.with_a(alpha)))
    });

    // ── template ──
    method(r, K::Template, Signature::new("render").rest_keyword(), template_render);
    method(r, K::Template, Signature::new("renders").rest_keyword(), template_renders);
}

// ── Receiver access ─────────────────────────────────────────────────────

fn wrong_receiver(value: &Value, expected: &str) -> EvalError {
    EvalError::type_error(format!(
        "method requires a '{expected}' receiver, not '{}'",
        value.type_name()
    ))
}

fn text(receiver: &Value) -> &str {
    receiver.as_str().unwrap_or_default()
}

fn list_mut(receiver: &mut Value) -> Result<&mut Vec<Value>> {
    match receiver {
        Value::List(items) => Ok(items),
        other => Err(wrong_receiver(other, "list")),
    }
}

fn dict(receiver: &Value) -> Result<&IndexMap<Value, Value>> {
    receiver.as_dict().ok_or_else(|| wrong_receiver(receiver, "dict"))
}

fn date(receiver: &Value) -> Result<chrono::NaiveDateTime> {
    match receiver {
        Value::Date(d) => Ok(*d),
        other => Err(wrong_receiver(other, "date")),
    }
}

fn duration(receiver: &Value) -> Result<(i64, i64, i64)> {
    match receiver {
        Value::TimeDelta(td) => Ok(timedelta_parts(td)),
        other => Err(wrong_receiver(other, "timedelta")),
    }
}

fn color(receiver: &Value) -> Result<Color> {
    match receiver {
        Value::Color(c) => Ok(*c),
        other => Err(wrong_receiver(other, "color")),
    }
}

/// Resolve Python style `start`/`end` bounds against a length.
fn window(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |i: i64| -> usize {
        let i = if i < 0 { (i + len_i).max(0) } else { i.min(len_i) };
        i as usize
    };
    let start = start.map_or(0, clamp);
    let end = end.map_or(len, clamp);
    (start, end.max(start))
}

// ── str ─────────────────────────────────────────────────────────────────

/// A non-negative `count` argument, `None` meaning unlimited.
fn split_count(args: &Args) -> Result<Option<usize>> {
    Ok(args.opt_int(1)?.and_then(|n| usize::try_from(n).ok()))
}

fn separator<'a>(args: &'a Args) -> Result<Option<&'a str>> {
    match args.opt_str(0)? {
        Some("") => Err(EvalError::value_error("empty separator")),
        sep => Ok(sep),
    }
}

fn str_split(_: &mut Evaluator<'_>, receiver: &mut Value, args: Args) -> Result<Value> {
    let s = text(receiver);
    let count = split_count(&args)?;
    let parts: Vec<String> = match (separator(&args)?, count) {
        (None, count) => {
            let mut out = Vec::new();
            let mut rest = s.trim_start();
            while !rest.is_empty() {
                if count.is_some_and(|n| out.len() >= n) {
                    out.push(rest.to_string());
                    break;
                }
                match rest.find(char::is_whitespace) {
                    Some(i) => {
                        out.push(rest[..i].to_string());
                        rest = rest[i..].trim_start();
                    }
                    None => {
                        out.push(rest.to_string());
                        break;
                    }
                }
            }
            out
        }
        (Some(sep), None) => s.split(sep).map(str::to_string).collect(),
        (Some(sep), Some(n)) => s.splitn(n + 1, sep).map(str::to_string).collect(),
    };
    Ok(Value::from(parts))
}

fn str_rsplit(_: &mut Evaluator<'_>, receiver: &mut Value, args: Args) -> Result<Value> {
    let s = text(receiver);
    let count = split_count(&args)?;
    let mut parts: Vec<String> = match (separator(&args)?, count) {
        (None, count) => {
            let mut out = Vec::new();
            let mut rest = s.trim_end();
            while !rest.is_empty() {
                if count.is_some_and(|n| out.len() >= n) {
                    out.push(rest.to_string());
                    break;
                }
                match rest.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
                    Some((i, c)) => {
                        out.push(rest[i + c.len_utf8()..].to_string());
                        rest = rest[..i].trim_end();
                    }
                    None => {
                        out.push(rest.to_string());
                        break;
                    }
                }
            }
            out
        }
        (Some(sep), None) => s.rsplit(sep).map(str::to_string).collect(),
        (Some(sep), Some(n)) => s.rsplitn(n + 1, sep).map(str::to_string).collect(),
    };
    parts.reverse();
    Ok(Value::from(parts))
}

enum Side {
    Start,
    End,
    Both,
}

fn strip(receiver: &Value, args: &Args, side: Side) -> Result<Value> {
    let s = text(receiver);
    let chars = args.opt_str(0)?;
    let strip_char = |c: char| match chars {
        Some(chars) => chars.contains(c),
        None => c.is_whitespace(),
    };
    let out = match side {
        Side::Start => s.trim_start_matches(strip_char),
        Side::End => s.trim_end_matches(strip_char),
        Side::Both => s.trim_matches(strip_char),
    };
    Ok(Value::from(out))
}

fn str_find(receiver: &Value, args: &Args, reverse: bool) -> Result<Value> {
    let sub = args.str(0)?;
    let chars: Vec<char> = text(receiver).chars().collect();
    let (start, end) = window(chars.len(), args.opt_int(1)?, args.opt_int(2)?);
    let haystack: String = chars[start..end].iter().collect();
    let found = if reverse { haystack.rfind(sub) } else { haystack.find(sub) };
    Ok(Value::Int(found.map_or(-1, |byte| {
        (start + haystack[..byte].chars().count()) as i64
    })))
}

fn affix(receiver: &Value, args: &Args, test: fn(&str, &str) -> bool) -> Result<Value> {
    let s = text(receiver);
    match args.get(0) {
        Value::Str(affix) => Ok(Value::Bool(test(s, affix))),
        Value::List(affixes) => {
            let mut any = false;
            for affix in affixes {
                let affix = affix.as_str().ok_or_else(|| args.error(0, "must contain only str"))?;
                any |= test(s, affix);
            }
            Ok(Value::Bool(any))
        }
        _ => Err(args.error(0, format!("must be str, not '{}'", args.get(0).type_name()))),
    }
}

fn str_capitalize(_: &mut Evaluator<'_>, receiver: &mut Value, _: Args) -> Result<Value> {
    let mut chars = text(receiver).chars();
    let out: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    };
    Ok(Value::Str(out))
}

fn str_replace(_: &mut Evaluator<'_>, receiver: &mut Value, args: Args) -> Result<Value> {
    let (old, new) = (args.str(0)?, args.str(1)?);
    let s = text(receiver);
    let out = match args.opt_int(2)? {
        Some(n) if n >= 0 => s.replacen(old, new, n as usize),
        _ => s.replace(old, new),
    };
    Ok(Value::Str(out))
}

fn str_join(_: &mut Evaluator<'_>, receiver: &mut Value, args: Args) -> Result<Value> {
    let items = ops::iterate(args.get(0))?;
    let mut parts = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item {
            Value::Str(s) => parts.push(s.as_str()),
            other => {
                return Err(EvalError::type_error(format!(
                    "sequence item {i}: expected str, '{}' found",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::Str(parts.join(text(receiver))))
}

// ── list ────────────────────────────────────────────────────────────────

fn list_find(receiver: &Value, args: &Args, reverse: bool) -> Result<Value> {
    let items = receiver.as_list().unwrap_or_default();
    let (start, end) = window(items.len(), args.opt_int(1)?, args.opt_int(2)?);
    let window = &items[start..end];
    let needle = args.get(0);
    let found = if reverse {
        window.iter().rposition(|item| item == needle)
    } else {
        window.iter().position(|item| item == needle)
    };
    Ok(Value::Int(found.map_or(-1, |i| (start + i) as i64)))
}

fn list_append(_: &mut Evaluator<'_>, receiver: &mut Value, args: Args) -> Result<Value> {
    list_mut(receiver)?.extend(args.rest);
    Ok(Value::None)
}

fn list_insert(_: &mut Evaluator<'_>, receiver: &mut Value, args: Args) -> Result<Value> {
    let pos = args.int(0)?;
    let items = list_mut(receiver)?;
    let (at, _) = window(items.len(), Some(pos), None);
    let tail = items.split_off(at);
    items.extend(args.rest);
    items.extend(tail);
    Ok(Value::None)
}

fn list_pop(_: &mut Evaluator<'_>, receiver: &mut Value, args: Args) -> Result<Value> {
    let pos = args.int(0)?;
    let items = list_mut(receiver)?;
    if items.is_empty() {
        return Err(EvalError::value_error("pop from empty list"));
    }
    let len = items.len() as i64;
    let index = if pos < 0 { pos + len } else { pos };
    if !(0..len).contains(&index) {
        return Err(EvalError::value_error("pop index out of range"));
    }
    Ok(items.remove(index as usize))
}

// ── dict ────────────────────────────────────────────────────────────────

fn dict_update(_: &mut Evaluator<'_>, receiver: &mut Value, args: Args) -> Result<Value> {
    let Value::Dict(target) = receiver else {
        return Err(wrong_receiver(receiver, "dict"));
    };
    for other in args.rest {
        match other {
            Value::Dict(items) => target.extend(items),
            Value::List(pairs) => {
                for pair in pairs {
                    match ops::iterate(&pair)?.as_slice() {
                        [key, value] => {
                            target.insert(key.clone(), value.clone());
                        }
                        items => return Err(EvalError::unpack(2, items.len())),
                    }
                }
            }
            other => {
                return Err(EvalError::type_error(format!(
                    "update() argument must be a dict, not '{}'",
                    other.type_name()
                )));
            }
        }
    }
    target.extend(
        args.rest_keyword
            .into_iter()
            .map(|(key, value)| (Value::Str(key), value)),
    );
    Ok(Value::None)
}

// ── date ────────────────────────────────────────────────────────────────

/// Week number of the year. Days before the first `firstweekday` of the
/// year are in week 0.
fn date_week(_: &mut Evaluator<'_>, receiver: &mut Value, args: Args) -> Result<Value> {
    let d = date(receiver)?;
    let first_weekday = args.opt_int(0)?.map_or(0, |w| w.rem_euclid(7));
    let jan1 = NaiveDate::from_ymd_opt(d.year(), 1, 1)
        .ok_or_else(|| EvalError::value_error("date out of range"))?;
    let jan1_weekday = i64::from(jan1.weekday().num_days_from_monday());
    let shift = (first_weekday - jan1_weekday).rem_euclid(7);
    let yearday = i64::from(d.ordinal0()) + 7 - shift;
    Ok(Value::Int(yearday.div_euclid(7)))
}

// ── template ────────────────────────────────────────────────────────────

fn template_render(ev: &mut Evaluator<'_>, receiver: &mut Value, args: Args) -> Result<Value> {
    let Value::Template(closure) = receiver else {
        return Err(wrong_receiver(receiver, "template"));
    };
    let closure = Arc::clone(closure);
    ev.render_closure(&closure, Vec::new(), args.rest_keyword)?;
    Ok(Value::None)
}

fn template_renders(ev: &mut Evaluator<'_>, receiver: &mut Value, args: Args) -> Result<Value> {
    let Value::Template(closure) = receiver else {
        return Err(wrong_receiver(receiver, "template"));
    };
    let fragments = ev.render_fragments(closure, Vec::new(), args.rest_keyword)?;
    Ok(Value::Str(fragments.concat()))
}
