use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use indexmap::IndexMap;

use super::color::Color;
use super::template::Template;

/// Variables passed into a render, and the captured state of a closure.
pub type Vars = HashMap<String, Value>;

/// The set of runtime value types in UL4.
///
/// Expressions produce `Value`s during evaluation. When a `Value` is
/// printed it is converted with its [`Display`](fmt::Display) impl, which
/// follows the language's `str()` rules: `None` and undefined values render
/// as empty text, booleans as `True`/`False`, floats always carry a
/// fractional part.
///
/// Conversion from common Rust types is provided via `From` impls:
///
/// ```rust
/// use ul4::Value;
///
/// let s: Value = "hello".into();
/// let n: Value = 42i64.into();
/// let b: Value = true.into();
/// let l: Value = vec!["a", "b"].into();
/// assert_eq!(l.repr(), "['a', 'b']");
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// The absence of a value. Falsy, renders as an empty string.
    None,
    /// The result of a failed lookup. Falsy, renders as an empty string.
    Undefined(Undefined),
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Date(NaiveDateTime),
    TimeDelta(TimeDelta),
    MonthDelta(MonthDelta),
    Color(Color),
    List(Vec<Value>),
    Dict(IndexMap<Value, Value>),
    /// A template bound to the variables visible where it was defined.
    Template(Arc<Closure>),
    /// A function from the registry, referenced by name.
    Function(Arc<str>),
}

/// Marker for a lookup that found nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Undefined {
    Variable(String),
    Key(Box<Value>),
    Index(i64),
}

impl fmt::Display for Undefined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Undefined::Variable(name) => write!(f, "undefined variable {}", repr_str(name)),
            Undefined::Key(key) => write!(f, "undefined object for key {}", key.repr()),
            Undefined::Index(index) => write!(f, "undefined object at index {index}"),
        }
    }
}

/// A duration measured in calendar months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MonthDelta(pub i64);

impl fmt::Display for MonthDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.0.abs() == 1 { "" } else { "s" };
        write!(f, "{} month{plural}", self.0)
    }
}

/// A template together with the variables it captured when its `def`
/// was executed.
pub struct Closure {
    pub template: Arc<Template>,
    pub vars: Vars,
    /// Evaluated default values for the template's declared parameters.
    pub defaults: Vars,
}

impl Closure {
    /// A closure over a top level template, capturing nothing.
    pub fn new(template: Arc<Template>) -> Self {
        Self {
            template,
            vars: Vars::new(),
            defaults: Vars::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.template.name.as_deref()
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.name())
            .field("captured", &self.vars.len())
            .finish()
    }
}

/// The dynamic kind of a [`Value`], used to key method tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    None,
    Undefined,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Date,
    TimeDelta,
    MonthDelta,
    Color,
    List,
    Dict,
    Template,
    Function,
}

impl ValueKind {
    /// The name reported by the `type()` function.
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::None => "none",
            ValueKind::Undefined => "undefined",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Bytes => "bytes",
            ValueKind::Date => "date",
            ValueKind::TimeDelta => "timedelta",
            ValueKind::MonthDelta => "monthdelta",
            ValueKind::Color => "color",
            ValueKind::List => "list",
            ValueKind::Dict => "dict",
            ValueKind::Template => "template",
            ValueKind::Function => "function",
        }
    }
}

/// Numeric view of bools, ints and floats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub(crate) fn to_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::None => ValueKind::None,
            Value::Undefined(_) => ValueKind::Undefined,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Date(_) => ValueKind::Date,
            Value::TimeDelta(_) => ValueKind::TimeDelta,
            Value::MonthDelta(_) => ValueKind::MonthDelta,
            Value::Color(_) => ValueKind::Color,
            Value::List(_) => ValueKind::List,
            Value::Dict(_) => ValueKind::Dict,
            Value::Template(_) => ValueKind::Template,
            Value::Function(_) => ValueKind::Function,
        }
    }

    /// Type name for diagnostic messages and `type()`.
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Truthiness check, used by `if`, `not`, `and` and `or`.
    ///
    /// Falsy values: `None`, undefined, `False`, zero, empty text, bytes,
    /// lists and dicts, and zero-length durations.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None | Value::Undefined(_) => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::TimeDelta(td) => !td.is_zero(),
            Value::MonthDelta(m) => m.0 != 0,
            Value::List(l) => !l.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Date(_) | Value::Color(_) | Value::Template(_) | Value::Function(_) => true,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Template(_) | Value::Function(_))
    }

    pub(crate) fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of ints and bools.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float view of any number.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(Number::to_f64)
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&IndexMap<Value, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Build a dict from key/value pairs.
    pub fn dict<K, V>(items: impl IntoIterator<Item = (K, V)>) -> Value
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::Dict(
            items
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// The language's `repr()`: a literal-like rendering of the value.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Undefined(u) => u.to_string(),
            Value::Bool(b) => python_bool(*b).to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => repr_str(s),
            Value::Bytes(b) => repr_bytes(b),
            Value::Date(d) => {
                let iso = isoformat(d);
                let iso = iso.strip_suffix("T00:00:00").unwrap_or(&iso);
                format!("@({iso})")
            }
            Value::TimeDelta(td) => timedelta_repr(td),
            Value::MonthDelta(m) => format!("monthdelta({})", m.0),
            Value::Color(c) => c.hex_repr(),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Dict(items) => {
                let inner: Vec<String> = items
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Template(closure) => match closure.name() {
                Some(name) => format!("<template {name}>"),
                None => "<template>".to_string(),
            },
            Value::Function(name) => format!("<function {name}>"),
        }
    }
}

/// The language's `str()`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None | Value::Undefined(_) => Ok(()),
            Value::Bool(b) => f.write_str(python_bool(*b)),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::Date(d) => {
                write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S"))?;
                let micro = d.nanosecond() / 1000;
                if micro != 0 {
                    write!(f, ".{micro:06}")?;
                }
                Ok(())
            }
            Value::TimeDelta(td) => f.write_str(&timedelta_str(td)),
            Value::MonthDelta(m) => write!(f, "{m}"),
            Value::Color(c) => write!(f, "{c}"),
            _ => f.write_str(&self.repr()),
        }
    }
}

// ── Formatting helpers ──────────────────────────────────────────────────

fn python_bool(b: bool) -> &'static str {
    if b { "True" } else { "False" }
}

/// Shortest round-tripping float text, always with a fractional part or an
/// exponent (`1.0`, `0.5`, `1e+20`, `1.5e-05`).
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let text = format!("{f:e}");
        if let Some((mantissa, exp)) = text.split_once('e') {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            return format!("{mantissa}e{sign}{:02}", exp.abs());
        }
        return text;
    }
    let text = format!("{f}");
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

/// Quote text the way `repr()` does: single quotes unless the text contains
/// a single quote and no double quote.
pub fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn repr_bytes(bytes: &[u8]) -> String {
    let mut out = String::from("b'");
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(char::from(b)),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('\'');
    out
}

/// `YYYY-MM-DDTHH:MM:SS[.ffffff]`
pub fn isoformat(d: &NaiveDateTime) -> String {
    let micro = d.nanosecond() / 1000;
    if micro != 0 {
        format!("{}.{micro:06}", d.format("%Y-%m-%dT%H:%M:%S"))
    } else {
        d.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

const MICROS_PER_DAY: i128 = 86_400_000_000;

/// Split a duration into `(days, seconds, microseconds)` with
/// `0 <= seconds < 86400` and `0 <= microseconds < 1_000_000`; only `days`
/// can be negative.
pub fn timedelta_parts(td: &TimeDelta) -> (i64, i64, i64) {
    let total = i128::from(td.num_seconds()) * 1_000_000 + i128::from(td.subsec_nanos() / 1000);
    let days = total.div_euclid(MICROS_PER_DAY);
    let rest = total.rem_euclid(MICROS_PER_DAY);
    (
        days as i64,
        (rest / 1_000_000) as i64,
        (rest % 1_000_000) as i64,
    )
}

pub(crate) fn timedelta_micros(td: &TimeDelta) -> i128 {
    i128::from(td.num_seconds()) * 1_000_000 + i128::from(td.subsec_nanos() / 1000)
}

pub(crate) fn timedelta_from_micros(micros: i128) -> Option<TimeDelta> {
    i64::try_from(micros).ok().map(TimeDelta::microseconds)
}

fn timedelta_str(td: &TimeDelta) -> String {
    let (days, seconds, micros) = timedelta_parts(td);
    let mut out = String::new();
    if days != 0 {
        let plural = if days.abs() == 1 { "" } else { "s" };
        out.push_str(&format!("{days} day{plural}, "));
    }
    out.push_str(&format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        seconds % 3600 / 60,
        seconds % 60
    ));
    if micros != 0 {
        out.push_str(&format!(".{micros:06}"));
    }
    out
}

fn timedelta_repr(td: &TimeDelta) -> String {
    match timedelta_parts(td) {
        (days, 0, 0) => format!("timedelta({days})"),
        (days, seconds, 0) => format!("timedelta({days}, {seconds})"),
        (days, seconds, micros) => format!("timedelta({days}, {seconds}, {micros})"),
    }
}

// ── Equality and hashing ────────────────────────────────────────────────

fn numbers_equal(a: Number, b: Number) -> bool {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => a == b,
        (Number::Float(a), Number::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
        (Number::Int(i), Number::Float(f)) | (Number::Float(f), Number::Int(i)) => {
            integral(f) == Some(i)
        }
    }
}

/// The integer an integral float stands for, if it fits.
fn integral(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Values compare by content. Bools, ints and floats compare numerically
/// across kinds, dicts ignore insertion order, and templates compare by
/// identity.
///
/// NaN equals NaN here so that `Eq` stays reflexive and a NaN dict key can
/// be found again. The template `==` operator keeps IEEE semantics, see
/// [`crate::eval::ops::equal`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return numbers_equal(a, b);
        }
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Undefined(a), Value::Undefined(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::TimeDelta(a), Value::TimeDelta(b)) => a == b,
            (Value::MonthDelta(a), Value::MonthDelta(b)) => a == b,
            (Value::Color(a), Value::Color(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::Template(a), Value::Template(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if let Some(n) = self.as_number() {
            match n {
                Number::Int(i) => i.hash(state),
                Number::Float(f) => match integral(f) {
                    Some(i) => i.hash(state),
                    None if f.is_nan() => f64::NAN.to_bits().hash(state),
                    None => f.to_bits().hash(state),
                },
            }
            return;
        }
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Str(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::TimeDelta(td) => td.hash(state),
            Value::MonthDelta(m) => m.hash(state),
            Value::Color(c) => c.hash(state),
            Value::List(items) => items.hash(state),
            Value::Dict(items) => items.len().hash(state),
            Value::Template(closure) => (Arc::as_ptr(closure) as usize).hash(state),
            Value::Function(name) => name.hash(state),
            _ => {}
        }
    }
}

// ── Conversions ─────────────────────────────────────────────────────────

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d.and_time(chrono::NaiveTime::MIN))
    }
}

impl From<TimeDelta> for Value {
    fn from(td: TimeDelta) -> Self {
        Value::TimeDelta(td)
    }
}

impl From<MonthDelta> for Value {
    fn from(m: MonthDelta) -> Self {
        Value::MonthDelta(m)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

impl From<Template> for Value {
    fn from(t: Template) -> Self {
        Value::Template(Arc::new(Closure::new(Arc::new(t))))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::None, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<Value, Value>> for Value {
    fn from(d: IndexMap<Value, Value>) -> Self {
        Value::Dict(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_key_is_found_again() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert_eq!(Value::Float(f64::NAN), Value::Float(-f64::NAN));
        let mut map = IndexMap::new();
        map.insert(nan.clone(), Value::Int(1));
        map.insert(Value::Float(-f64::NAN), Value::Int(2));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&nan), Some(&Value::Int(2)));
        assert_eq!(Value::List(vec![nan.clone()]), Value::List(vec![nan]));
    }

    #[test]
    fn test_str_of_scalars() {
        assert_eq!(Value::None.to_string(), "");
        assert_eq!(Value::Undefined(Undefined::Variable("x".into())).to_string(), "");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(0.5).to_string(), "0.5");
        assert_eq!(Value::Float(1e20).to_string(), "1e+20");
        assert_eq!(Value::Float(1.5e-5).to_string(), "1.5e-05");
    }

    #[test]
    fn test_repr_quoting() {
        assert_eq!(Value::from("foo").repr(), "'foo'");
        assert_eq!(Value::from("it's").repr(), "\"it's\"");
        assert_eq!(Value::from("a\nb").repr(), "'a\\nb'");
    }

    #[test]
    fn test_date_str_and_repr() {
        let d = NaiveDate::from_ymd_opt(2012, 10, 6).unwrap();
        assert_eq!(Value::from(d).repr(), "@(2012-10-06)");
        let dt = d.and_hms_micro_opt(12, 34, 56, 5).unwrap();
        assert_eq!(Value::from(dt).to_string(), "2012-10-06 12:34:56.000005");
        assert_eq!(Value::from(dt).repr(), "@(2012-10-06T12:34:56.000005)");
    }

    #[test]
    fn test_timedelta_normalization() {
        let td = TimeDelta::seconds(-1);
        assert_eq!(timedelta_parts(&td), (-1, 86399, 0));
        assert_eq!(Value::from(td).to_string(), "-1 day, 23:59:59");
        assert_eq!(Value::from(TimeDelta::days(2)).repr(), "timedelta(2)");
    }

    #[test]
    fn test_numeric_equality_across_kinds() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::Int(1), Value::from("1"));
    }

    #[test]
    fn test_dict_keys_unify_numbers() {
        let mut d = IndexMap::new();
        d.insert(Value::Int(1), Value::from("a"));
        assert_eq!(d.get(&Value::Float(1.0)), Some(&Value::from("a")));
    }

    #[test]
    fn test_dict_equality_ignores_order() {
        let a = Value::dict([("x", 1), ("y", 2)]);
        let b = Value::dict([("y", 2), ("x", 1)]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Undefined(Undefined::Index(3)).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::TimeDelta(TimeDelta::zero()).is_truthy());
    }

    #[test]
    fn test_undefined_display() {
        assert_eq!(Undefined::Variable("x".into()).to_string(), "undefined variable 'x'");
        assert_eq!(Undefined::Key(Box::new("k".into())).to_string(), "undefined object for key 'k'");
    }
}
