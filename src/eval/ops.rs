//! Operator semantics shared by the evaluator and the constant folder.
//!
//! Every function here is pure: it takes operand values and produces a
//! value or an [`EvalError`] without a location. Callers attach the tag.

use std::cmp::Ordering;

use chrono::{Months, NaiveDateTime, TimeDelta};

use crate::ast::expr::{BinOp, UnaryOp};
use crate::ast::value::{
    MonthDelta, Number, Undefined, Value, timedelta_from_micros, timedelta_micros,
};
use crate::error::EvalError;

/// Apply a binary operator. `and` and `or` return the deciding operand.
pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Add => add(left, right),
        BinOp::Sub => sub(left, right),
        BinOp::Mul => mul(left, right),
        BinOp::TrueDiv => truediv(left, right),
        BinOp::FloorDiv => floordiv(left, right),
        BinOp::Mod => modulo(left, right),
        BinOp::Eq => Ok(Value::Bool(equal(left, right))),
        BinOp::Ne => Ok(Value::Bool(!equal(left, right))),
        BinOp::Lt => Ok(Value::Bool(compare(op, left, right)? == Ordering::Less)),
        BinOp::Le => Ok(Value::Bool(compare(op, left, right)? != Ordering::Greater)),
        BinOp::Gt => Ok(Value::Bool(compare(op, left, right)? == Ordering::Greater)),
        BinOp::Ge => Ok(Value::Bool(compare(op, left, right)? != Ordering::Less)),
        BinOp::Contains => Ok(Value::Bool(contains(left, right)?)),
        BinOp::NotContains => Ok(Value::Bool(!contains(left, right)?)),
        BinOp::And => Ok(if left.is_truthy() { right.clone() } else { left.clone() }),
        BinOp::Or => Ok(if left.is_truthy() { left.clone() } else { right.clone() }),
    }
}

pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Neg => match operand {
            Value::Bool(_) | Value::Int(_) => {
                let i = operand.as_int().unwrap_or_default();
                i.checked_neg().map(Value::Int).ok_or_else(overflow)
            }
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::TimeDelta(td) => Ok(Value::TimeDelta(-*td)),
            Value::MonthDelta(m) => Ok(Value::MonthDelta(MonthDelta(-m.0))),
            other => Err(bad_operand("unary -", other)),
        },
    }
}

fn overflow() -> EvalError {
    EvalError::arithmetic("integer overflow")
}

fn zero_division() -> EvalError {
    EvalError::arithmetic("integer division or modulo by zero")
}

fn bad_operand(op: &str, value: &Value) -> EvalError {
    if value.is_undefined() {
        return EvalError::unsupported_operands(op, value, value);
    }
    EvalError::type_error(format!("bad operand type for {op}: '{}'", value.type_name()))
}

fn int_or_float(
    left: Number,
    right: Number,
    int: impl FnOnce(i64, i64) -> Result<Value, EvalError>,
    float: impl FnOnce(f64, f64) -> Result<Value, EvalError>,
) -> Result<Value, EvalError> {
    match (left, right) {
        (Number::Int(a), Number::Int(b)) => int(a, b),
        (a, b) => float(a.to_f64(), b.to_f64()),
    }
}

// ── Arithmetic ──────────────────────────────────────────────────────────

pub fn add(left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return int_or_float(
            a,
            b,
            |a, b| a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            |a, b| Ok(Value::Float(a + b)),
        );
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
        }
        (Value::Date(d), Value::TimeDelta(td)) | (Value::TimeDelta(td), Value::Date(d)) => {
            shift_date(*d, *td)
        }
        (Value::Date(d), Value::MonthDelta(m)) | (Value::MonthDelta(m), Value::Date(d)) => {
            add_months(*d, m.0).map(Value::Date)
        }
        (Value::TimeDelta(a), Value::TimeDelta(b)) => micros_to_value(
            timedelta_micros(a) + timedelta_micros(b),
        ),
        (Value::MonthDelta(a), Value::MonthDelta(b)) => a
            .0
            .checked_add(b.0)
            .map(|m| Value::MonthDelta(MonthDelta(m)))
            .ok_or_else(overflow),
        _ => Err(EvalError::unsupported_operands("+", left, right)),
    }
}

pub fn sub(left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return int_or_float(
            a,
            b,
            |a, b| a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            |a, b| Ok(Value::Float(a - b)),
        );
    }
    match (left, right) {
        (Value::Date(d), Value::TimeDelta(td)) => shift_date(*d, -*td),
        (Value::Date(d), Value::MonthDelta(m)) => add_months(*d, -m.0).map(Value::Date),
        (Value::Date(a), Value::Date(b)) => Ok(Value::TimeDelta(a.signed_duration_since(*b))),
        (Value::TimeDelta(a), Value::TimeDelta(b)) => micros_to_value(
            timedelta_micros(a) - timedelta_micros(b),
        ),
        (Value::MonthDelta(a), Value::MonthDelta(b)) => a
            .0
            .checked_sub(b.0)
            .map(|m| Value::MonthDelta(MonthDelta(m)))
            .ok_or_else(overflow),
        _ => Err(EvalError::unsupported_operands("-", left, right)),
    }
}

pub fn mul(left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return int_or_float(
            a,
            b,
            |a, b| a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            |a, b| Ok(Value::Float(a * b)),
        );
    }
    match (left, right) {
        (Value::Str(s), n) | (n, Value::Str(s)) if n.as_int().is_some() => {
            let count = repeat_count(n, s.len())?;
            Ok(Value::Str(s.repeat(count)))
        }
        (Value::List(items), n) | (n, Value::List(items)) if n.as_int().is_some() => {
            let count = repeat_count(n, items.len())?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::List(out))
        }
        (Value::TimeDelta(td), n) | (n, Value::TimeDelta(td)) if n.as_number().is_some() => {
            scale_timedelta(td, n.as_number().unwrap_or(Number::Int(1)))
        }
        (Value::MonthDelta(m), n) | (n, Value::MonthDelta(m)) if n.as_int().is_some() => m
            .0
            .checked_mul(n.as_int().unwrap_or(1))
            .map(|m| Value::MonthDelta(MonthDelta(m)))
            .ok_or_else(overflow),
        _ => Err(EvalError::unsupported_operands("*", left, right)),
    }
}

/// Longest string (in bytes) or list a repetition may produce.
pub(crate) const MAX_SEQUENCE_LEN: usize = 1 << 28;

/// How often to repeat a sequence of `len` items. An empty sequence is
/// repeated zero times.
fn repeat_count(n: &Value, len: usize) -> Result<usize, EvalError> {
    let n = n.as_int().unwrap_or(0);
    if n <= 0 || len == 0 {
        return Ok(0);
    }
    usize::try_from(n)
        .ok()
        .filter(|&n| len.checked_mul(n).is_some_and(|total| total <= MAX_SEQUENCE_LEN))
        .ok_or_else(|| EvalError::arithmetic("repeat count too large"))
}

pub fn truediv(left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        if b == 0.0 {
            return Err(EvalError::arithmetic("division by zero"));
        }
        return Ok(Value::Float(a / b));
    }
    match (left, right) {
        (Value::TimeDelta(td), n) if n.as_number().is_some() => {
            let divisor = n.as_f64().unwrap_or(1.0);
            if divisor == 0.0 {
                return Err(EvalError::arithmetic("division by zero"));
            }
            float_micros_to_value(timedelta_micros(td) as f64 / divisor)
        }
        (Value::TimeDelta(a), Value::TimeDelta(b)) => {
            let b = timedelta_micros(b);
            if b == 0 {
                return Err(EvalError::arithmetic("division by zero"));
            }
            Ok(Value::Float(timedelta_micros(a) as f64 / b as f64))
        }
        _ => Err(EvalError::unsupported_operands("/", left, right)),
    }
}

pub fn floordiv(left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return int_or_float(
            a,
            b,
            |a, b| floordiv_int(a, b).map(Value::Int),
            |a, b| {
                if b == 0.0 {
                    Err(EvalError::arithmetic("float divmod()"))
                } else {
                    Ok(Value::Float((a / b).floor()))
                }
            },
        );
    }
    match (left, right) {
        (Value::TimeDelta(td), n) if n.as_int().is_some() => {
            let divisor = i128::from(n.as_int().unwrap_or(1));
            if divisor == 0 {
                return Err(zero_division());
            }
            micros_to_value(floor_div_i128(timedelta_micros(td), divisor))
        }
        (Value::TimeDelta(a), Value::TimeDelta(b)) => {
            let b = timedelta_micros(b);
            if b == 0 {
                return Err(zero_division());
            }
            let q = floor_div_i128(timedelta_micros(a), b);
            i64::try_from(q).map(Value::Int).map_err(|_| overflow())
        }
        (Value::MonthDelta(m), n) if n.as_int().is_some() => {
            floordiv_int(m.0, n.as_int().unwrap_or(1)).map(|m| Value::MonthDelta(MonthDelta(m)))
        }
        (Value::MonthDelta(a), Value::MonthDelta(b)) => floordiv_int(a.0, b.0).map(Value::Int),
        _ => Err(EvalError::unsupported_operands("//", left, right)),
    }
}

pub fn modulo(left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return int_or_float(
            a,
            b,
            |a, b| {
                if b == 0 {
                    return Err(zero_division());
                }
                // i64::MIN % -1 is 0 but overflows checked_rem
                let r = a.wrapping_rem(b);
                Ok(Value::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
            },
            |a, b| {
                if b == 0.0 {
                    return Err(EvalError::arithmetic("float modulo"));
                }
                let r = a % b;
                Ok(Value::Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
            },
        );
    }
    Err(EvalError::unsupported_operands("%", left, right))
}

fn floordiv_int(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(zero_division());
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    if a % b != 0 && (a < 0) != (b < 0) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn floor_div_i128(a: i128, b: i128) -> i128 {
    let q = a / b;
    if a % b != 0 && (a < 0) != (b < 0) { q - 1 } else { q }
}

// ── Dates and durations ─────────────────────────────────────────────────

fn shift_date(date: NaiveDateTime, delta: TimeDelta) -> Result<Value, EvalError> {
    date.checked_add_signed(delta)
        .map(Value::Date)
        .ok_or_else(|| EvalError::value_error("date out of range"))
}

/// Add calendar months, clamping the day to the length of the target
/// month.
pub(crate) fn add_months(date: NaiveDateTime, months: i64) -> Result<NaiveDateTime, EvalError> {
    let out_of_range = || EvalError::value_error("date out of range");
    let count = u32::try_from(months.unsigned_abs()).map_err(|_| out_of_range())?;
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(count))
    } else {
        date.checked_sub_months(Months::new(count))
    };
    shifted.ok_or_else(out_of_range)
}

fn micros_to_value(micros: i128) -> Result<Value, EvalError> {
    timedelta_from_micros(micros)
        .map(Value::TimeDelta)
        .ok_or_else(|| EvalError::arithmetic("timedelta out of range"))
}

fn float_micros_to_value(micros: f64) -> Result<Value, EvalError> {
    if !micros.is_finite() {
        return Err(EvalError::arithmetic("timedelta out of range"));
    }
    micros_to_value(micros.round() as i128)
}

fn scale_timedelta(td: &TimeDelta, factor: Number) -> Result<Value, EvalError> {
    let micros = timedelta_micros(td);
    match factor {
        Number::Int(n) => micros_to_value(
            micros
                .checked_mul(i128::from(n))
                .ok_or_else(|| EvalError::arithmetic("timedelta out of range"))?,
        ),
        Number::Float(f) => float_micros_to_value(micros as f64 * f),
    }
}

// ── Comparison and membership ───────────────────────────────────────────

/// The `==` operator. Unlike [`Value`]'s `PartialEq`, which treats NaN as
/// equal to itself so NaN dict keys stay reachable, a NaN operand is never
/// equal to anything.
pub fn equal(left: &Value, right: &Value) -> bool {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) if a.to_f64().is_nan() || b.to_f64().is_nan() => false,
        _ => left == right,
    }
}

/// Order two values. Numbers compare across kinds, other values only with
/// their own kind.
pub fn compare(op: BinOp, left: &Value, right: &Value) -> Result<Ordering, EvalError> {
    let unorderable = || EvalError::unsupported_operands(op.symbol(), left, right);
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return match (a, b) {
            (Number::Int(a), Number::Int(b)) => Ok(a.cmp(&b)),
            (a, b) => a.to_f64().partial_cmp(&b.to_f64()).ok_or_else(unorderable),
        };
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Ok(a.cmp(b)),
        (Value::TimeDelta(a), Value::TimeDelta(b)) => Ok(a.cmp(b)),
        (Value::MonthDelta(a), Value::MonthDelta(b)) => Ok(a.cmp(b)),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                if x != y {
                    return compare(op, x, y);
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        _ => Err(unorderable()),
    }
}

/// `item in container`
pub fn contains(item: &Value, container: &Value) -> Result<bool, EvalError> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
            _ => Err(EvalError::unsupported_operands("in", item, container)),
        },
        Value::List(items) => Ok(items.contains(item)),
        Value::Dict(items) => Ok(items.contains_key(item)),
        Value::Bytes(bytes) => match item.as_int() {
            Some(b) => Ok(u8::try_from(b).is_ok_and(|b| bytes.contains(&b))),
            None => Err(EvalError::unsupported_operands("in", item, container)),
        },
        _ => Err(EvalError::unsupported_operands("in", item, container)),
    }
}

// ── Item access ─────────────────────────────────────────────────────────

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let i = if index < 0 { index + len } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

/// `obj[index]`. Missing indexes and keys produce undefined values.
pub fn getitem(obj: &Value, index: &Value) -> Result<Value, EvalError> {
    if let Value::Dict(items) = obj {
        return Ok(items
            .get(index)
            .cloned()
            .unwrap_or_else(|| Value::Undefined(Undefined::Key(Box::new(index.clone())))));
    }
    let Some(i) = index.as_int() else {
        return Err(EvalError::unsupported_operands("[]", obj, index));
    };
    let missing = || Value::Undefined(Undefined::Index(i));
    match obj {
        Value::List(items) => Ok(resolve_index(i, items.len())
            .map_or_else(missing, |i| items[i].clone())),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(resolve_index(i, chars.len())
                .map_or_else(missing, |i| Value::Str(chars[i].to_string())))
        }
        Value::Bytes(bytes) => Ok(resolve_index(i, bytes.len())
            .map_or_else(missing, |i| Value::Int(i64::from(bytes[i])))),
        Value::Color(c) => {
            let channels = [c.r, c.g, c.b, c.a];
            Ok(resolve_index(i, 4).map_or_else(missing, |i| Value::Int(i64::from(channels[i]))))
        }
        _ => Err(EvalError::unsupported_operands("[]", obj, index)),
    }
}

fn slice_bounds(
    start: Option<&Value>,
    stop: Option<&Value>,
    len: usize,
) -> Result<(usize, usize), EvalError> {
    let clamp = |bound: Option<&Value>, default: usize| -> Result<usize, EvalError> {
        match bound {
            None | Some(Value::None) => Ok(default),
            Some(v) => {
                let i = v.as_int().ok_or_else(|| {
                    EvalError::type_error(format!(
                        "slice indices must be integers or None, not '{}'",
                        v.type_name()
                    ))
                })?;
                let len = len as i64;
                let i = if i < 0 { (i + len).max(0) } else { i.min(len) };
                Ok(i as usize)
            }
        }
    };
    let start = clamp(start, 0)?;
    let stop = clamp(stop, len)?;
    Ok((start, stop.max(start)))
}

/// `obj[start:stop]` with Python clamping.
pub fn getslice(
    obj: &Value,
    start: Option<&Value>,
    stop: Option<&Value>,
) -> Result<Value, EvalError> {
    match obj {
        Value::List(items) => {
            let (a, b) = slice_bounds(start, stop, items.len())?;
            Ok(Value::List(items[a..b].to_vec()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (a, b) = slice_bounds(start, stop, chars.len())?;
            Ok(Value::Str(chars[a..b].iter().collect()))
        }
        Value::Bytes(bytes) => {
            let (a, b) = slice_bounds(start, stop, bytes.len())?;
            Ok(Value::Bytes(bytes[a..b].to_vec()))
        }
        _ => Err(EvalError::type_error(format!(
            "'{}' object can't be sliced",
            obj.type_name()
        ))),
    }
}

/// Items of a `for` loop or comprehension. Ranges produce their numbers
/// on demand.
#[derive(Debug)]
pub enum Items {
    Values(std::vec::IntoIter<Value>),
    Range { next: i128, stop: i128, step: i128 },
}

impl Items {
    pub fn range(start: i64, stop: i64, step: i64) -> Self {
        Items::Range {
            next: i128::from(start),
            stop: i128::from(stop),
            step: i128::from(step),
        }
    }
}

impl From<Vec<Value>> for Items {
    fn from(items: Vec<Value>) -> Self {
        Items::Values(items.into_iter())
    }
}

impl Iterator for Items {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            Items::Values(items) => items.next(),
            Items::Range { next, stop, step } => {
                let more = if *step > 0 { *next < *stop } else { *next > *stop };
                if !more {
                    return None;
                }
                let value = *next as i64;
                *next += *step;
                Some(Value::Int(value))
            }
        }
    }
}

/// The items produced by a `for` loop over `value`.
pub fn iterate(value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(items) => Ok(items.keys().cloned().collect()),
        Value::Bytes(bytes) => Ok(bytes.iter().map(|b| Value::Int(i64::from(*b))).collect()),
        other => Err(EvalError::not_iterable(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalErrorKind;
    use chrono::{NaiveDate, TimeDelta};

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::from(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(add(&Value::Int(1), &Value::Int(2)).unwrap(), Value::Int(3));
        assert_eq!(add(&Value::Bool(true), &Value::Int(2)).unwrap(), Value::Int(3));
        assert_eq!(floordiv(&Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(modulo(&Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(1));
        assert_eq!(modulo(&Value::Int(7), &Value::Int(-2)).unwrap(), Value::Int(-1));
        assert_eq!(truediv(&Value::Int(1), &Value::Int(2)).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn test_division_by_zero() {
        let err = floordiv(&Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::ArithmeticError);
        assert_eq!(err.message, "integer division or modulo by zero");
        assert!(modulo(&Value::Int(1), &Value::Int(0)).is_err());
        assert!(truediv(&Value::Float(1.0), &Value::Int(0)).is_err());
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert!(add(&Value::Int(i64::MAX), &Value::Int(1)).is_err());
        assert!(unary(UnaryOp::Neg, &Value::Int(i64::MIN)).is_err());
    }

    #[test]
    fn test_min_modulo_minus_one() {
        assert_eq!(modulo(&Value::Int(i64::MIN), &Value::Int(-1)).unwrap(), Value::Int(0));
        assert!(floordiv(&Value::Int(i64::MIN), &Value::Int(-1)).is_err());
    }

    #[test]
    fn test_huge_repetition_is_an_error() {
        let err = mul(&Value::from("ab"), &Value::Int(i64::MAX)).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::ArithmeticError);
        assert_eq!(err.message, "repeat count too large");
        let list = Value::from(vec![1, 2, 3, 4]);
        let err = mul(&list, &Value::Int(1 << 62)).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::ArithmeticError);
        assert_eq!(mul(&Value::from(Vec::<Value>::new()), &Value::Int(i64::MAX)).unwrap(), Value::from(Vec::<Value>::new()));
    }

    #[test]
    fn test_timedelta_floor_division() {
        let td = Value::TimeDelta(TimeDelta::microseconds(7));
        assert_eq!(
            floordiv(&td, &Value::Int(-2)).unwrap(),
            Value::TimeDelta(TimeDelta::microseconds(-4))
        );
        assert_eq!(
            floordiv(&td, &Value::Int(2)).unwrap(),
            Value::TimeDelta(TimeDelta::microseconds(3))
        );
    }

    #[test]
    fn test_nan_is_never_equal() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(binary(BinOp::Eq, &nan, &nan).unwrap(), Value::Bool(false));
        assert_eq!(binary(BinOp::Ne, &nan, &nan).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_range_items() {
        let items: Vec<Value> = Items::range(5, 0, -2).collect();
        assert_eq!(items, vec![Value::Int(5), Value::Int(3), Value::Int(1)]);
        let mut huge = Items::range(0, i64::MAX, 1);
        assert_eq!(huge.next(), Some(Value::Int(0)));
        assert_eq!(Items::range(i64::MAX - 1, i64::MAX, 5).count(), 1);
    }

    #[test]
    fn test_sequences() {
        assert_eq!(mul(&Value::from("ab"), &Value::Int(3)).unwrap(), Value::from("ababab"));
        assert_eq!(mul(&Value::Int(-1), &Value::from("ab")).unwrap(), Value::from(""));
        assert_eq!(
            add(&Value::from(vec![1]), &Value::from(vec![2])).unwrap(),
            Value::from(vec![1, 2])
        );
        let err = add(&Value::from("a"), &Value::Int(1)).unwrap_err();
        assert_eq!(err.message, "unsupported operand types for +: 'str' and 'int'");
    }

    #[test]
    fn test_date_arithmetic() {
        let d = date(2012, 1, 31);
        let month = Value::MonthDelta(MonthDelta(1));
        assert_eq!(add(&d, &month).unwrap(), date(2012, 2, 29));
        let day = Value::TimeDelta(TimeDelta::days(1));
        assert_eq!(add(&d, &day).unwrap(), date(2012, 2, 1));
        assert_eq!(sub(&date(2012, 2, 1), &d).unwrap(), day);
        assert_eq!(
            mul(&day, &Value::Float(0.5)).unwrap(),
            Value::TimeDelta(TimeDelta::hours(12))
        );
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(BinOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap(), Ordering::Less);
        assert_eq!(
            compare(BinOp::Lt, &Value::from(vec![1, 2]), &Value::from(vec![1])).unwrap(),
            Ordering::Greater
        );
        assert!(compare(BinOp::Lt, &Value::from("a"), &Value::Int(1)).is_err());
        assert_eq!(binary(BinOp::Eq, &Value::Int(1), &Value::Float(1.0)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_contains() {
        assert!(contains(&Value::from("b"), &Value::from("abc")).unwrap());
        assert!(contains(&Value::Int(2), &Value::from(vec![1, 2])).unwrap());
        assert!(contains(&Value::from("k"), &Value::dict([("k", 1)])).unwrap());
        assert!(contains(&Value::Int(1), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_getitem_undefined() {
        let list = Value::from(vec![1, 2, 3]);
        assert_eq!(getitem(&list, &Value::Int(-1)).unwrap(), Value::Int(3));
        assert!(getitem(&list, &Value::Int(5)).unwrap().is_undefined());
        let dict = Value::dict([("a", 1)]);
        assert_eq!(
            getitem(&dict, &Value::from("b")).unwrap(),
            Value::Undefined(Undefined::Key(Box::new(Value::from("b"))))
        );
        assert_eq!(getitem(&Value::from("äb"), &Value::Int(0)).unwrap(), Value::from("ä"));
    }

    #[test]
    fn test_getslice() {
        let s = Value::from("hello");
        assert_eq!(getslice(&s, Some(&Value::Int(1)), Some(&Value::Int(-1))).unwrap(), Value::from("ell"));
        assert_eq!(getslice(&s, Some(&Value::Int(10)), None).unwrap(), Value::from(""));
        assert_eq!(getslice(&s, Some(&Value::Int(3)), Some(&Value::Int(1))).unwrap(), Value::from(""));
    }

    #[test]
    fn test_iterate() {
        assert_eq!(iterate(&Value::from("ab")).unwrap(), vec![Value::from("a"), Value::from("b")]);
        assert_eq!(iterate(&Value::dict([("k", 1)])).unwrap(), vec![Value::from("k")]);
        assert_eq!(iterate(&Value::Int(1)).unwrap_err().kind, EvalErrorKind::NotIterable);
    }
}
