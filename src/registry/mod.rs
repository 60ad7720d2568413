//! Function and method registration for UL4.
//!
//! The [`Registry`] stores the callables templates can reach: free
//! functions by name (`len(x)`) and methods by receiver kind and name
//! (`x.upper()`). [`Registry::builtin`] contains the language's standard
//! library; [`Registry::shared`] is a process-wide instance of it used by
//! [`Template::render`](crate::Template::render).
//!
//! There are two ways to add host functions:
//!
//! - **Closure-based**: [`ClosureFunction`] wraps a closure over bound
//!   [`Args`].
//! - **Trait-based**: implement [`Ul4Function`] or [`Ul4Method`] directly
//!   when the callable needs access to the [`Evaluator`], for example to
//!   call back into templates.

pub mod format;
pub mod functions;
pub mod methods;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use crate::ast::value::{Value, ValueKind};
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::eval::ops::Items;

pub use functions::xmlescape;

// ── Trait definitions ───────────────────────────────────────────────────

/// A free function, invoked as `name(args)` in templates.
pub trait Ul4Function: Send + Sync {
    /// Declare the function's name and parameters. Arguments are bound
    /// against it before [`call`](Ul4Function::call) runs.
    fn signature(&self) -> &Signature;

    fn call(&self, ev: &mut Evaluator<'_>, args: Args) -> Result<Value, EvalError>;

    /// Produce the items of the call's result on demand, for when the call
    /// is the container of a `for` loop or comprehension. `None` means the
    /// result is built with [`call`](Ul4Function::call) and iterated.
    fn iterate(&self, args: &Args) -> Option<Result<Items, EvalError>> {
        let _ = args;
        None
    }
}

/// A method, invoked as `obj.name(args)` on values of one kind.
pub trait Ul4Method: Send + Sync {
    fn signature(&self) -> &Signature;

    fn call(
        &self,
        ev: &mut Evaluator<'_>,
        receiver: &mut Value,
        args: Args,
    ) -> Result<Value, EvalError>;

    /// Whether the method changes its receiver. The evaluator writes a
    /// mutated receiver back when it came from a variable.
    fn mutates(&self) -> bool {
        false
    }
}

// ── Signatures ──────────────────────────────────────────────────────────

/// A parameter of a [`Signature`]. Parameters without a default are
/// required.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub default: Option<Value>,
}

/// Describes a callable's name and accepted arguments.
///
/// ```rust
/// use ul4::{Signature, Value};
///
/// let sig = Signature::new("greet").required("name").optional("greeting", "Hello");
/// let args = sig.bind(vec![Value::from("Ada")], vec![]).unwrap();
/// assert_eq!(args.get(1), &Value::from("Hello"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<ParamDef>,
    /// Extra positional arguments are collected into [`Args::rest`].
    pub rest: bool,
    /// Unknown keyword arguments are collected into
    /// [`Args::rest_keyword`].
    pub rest_keyword: bool,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            rest: false,
            rest_keyword: false,
        }
    }

    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamDef {
            name: name.into(),
            default: None,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.params.push(ParamDef {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    pub fn rest(mut self) -> Self {
        self.rest = true;
        self
    }

    pub fn rest_keyword(mut self) -> Self {
        self.rest_keyword = true;
        self
    }

    /// Match call arguments to parameters. Every error names the callee.
    pub fn bind(
        &self,
        positional: Vec<Value>,
        keyword: Vec<(String, Value)>,
    ) -> Result<Args, EvalError> {
        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        let mut rest = Vec::new();
        let given = positional.len();

        for (i, value) in positional.into_iter().enumerate() {
            if i < slots.len() {
                slots[i] = Some(value);
            } else if self.rest {
                rest.push(value);
            } else {
                let message = match self.params.len() {
                    0 => format!("takes no positional arguments ({given} given)"),
                    n => format!("takes at most {n} positional arguments ({given} given)"),
                };
                return Err(EvalError::argument(&self.name, message));
            }
        }

        let mut rest_keyword = Vec::new();
        for (name, value) in keyword {
            match self.params.iter().position(|p| p.name == name) {
                Some(i) if slots[i].is_some() => {
                    return Err(EvalError::argument(
                        &self.name,
                        format!("got multiple values for argument '{name}'"),
                    ));
                }
                Some(i) => slots[i] = Some(value),
                None if self.rest_keyword => {
                    if rest_keyword.iter().any(|(n, _)| *n == name) {
                        return Err(EvalError::argument(
                            &self.name,
                            format!("got multiple values for argument '{name}'"),
                        ));
                    }
                    rest_keyword.push((name, value));
                }
                None => {
                    return Err(EvalError::argument(
                        &self.name,
                        format!("got an unexpected keyword argument '{name}'"),
                    ));
                }
            }
        }

        let mut values = Vec::with_capacity(slots.len());
        for (slot, param) in slots.into_iter().zip(&self.params) {
            match slot.or_else(|| param.default.clone()) {
                Some(value) => values.push(value),
                None => {
                    return Err(EvalError::argument(
                        &self.name,
                        format!("missing required argument '{}'", param.name),
                    ));
                }
            }
        }

        Ok(Args {
            callee: self.name.clone(),
            names: self.params.iter().map(|p| p.name.clone()).collect(),
            values,
            rest,
            rest_keyword,
        })
    }
}

/// Arguments bound against a [`Signature`], one value per parameter in
/// declaration order.
#[derive(Debug, Clone)]
pub struct Args {
    callee: String,
    names: Vec<String>,
    values: Vec<Value>,
    pub rest: Vec<Value>,
    pub rest_keyword: Vec<(String, Value)>,
}

static NONE: Value = Value::None;

impl Args {
    pub fn callee(&self) -> &str {
        &self.callee
    }

    pub fn get(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&NONE)
    }

    /// Move an argument out, leaving `None` behind.
    pub fn take(&mut self, index: usize) -> Value {
        self.values
            .get_mut(index)
            .map(|v| std::mem::replace(v, Value::None))
            .unwrap_or(Value::None)
    }

    /// An error about argument `index` that names the callee and parameter.
    pub fn error(&self, index: usize, message: impl std::fmt::Display) -> EvalError {
        let name = self.names.get(index).map_or("?", String::as_str);
        EvalError::argument(&self.callee, format!("argument '{name}' {message}"))
    }

    fn wrong_type(&self, index: usize, expected: &str) -> EvalError {
        let value = self.get(index);
        let err = self.error(index, format!("must be {expected}, not '{}'", value.type_name()));
        if value.is_undefined() {
            EvalError::new(crate::EvalErrorKind::UndefinedOperand, err.message)
        } else {
            err
        }
    }

    pub fn int(&self, index: usize) -> Result<i64, EvalError> {
        self.get(index).as_int().ok_or_else(|| self.wrong_type(index, "int"))
    }

    pub fn float(&self, index: usize) -> Result<f64, EvalError> {
        self.get(index).as_f64().ok_or_else(|| self.wrong_type(index, "a number"))
    }

    pub fn str(&self, index: usize) -> Result<&str, EvalError> {
        self.get(index).as_str().ok_or_else(|| self.wrong_type(index, "str"))
    }

    /// `None` for a `None` argument, otherwise the text.
    pub fn opt_str(&self, index: usize) -> Result<Option<&str>, EvalError> {
        match self.get(index) {
            Value::None => Ok(None),
            _ => self.str(index).map(Some),
        }
    }

    pub fn opt_int(&self, index: usize) -> Result<Option<i64>, EvalError> {
        match self.get(index) {
            Value::None => Ok(None),
            _ => self.int(index).map(Some),
        }
    }
}

// ── Registry ────────────────────────────────────────────────────────────

/// Stores registered functions and methods for use during evaluation.
///
/// ```rust
/// use ul4::{ClosureFunction, Registry, Signature, Template, Value, Vars};
///
/// let mut registry = Registry::builtin();
/// registry.register_function(ClosureFunction::new(
///     Signature::new("double").required("x"),
///     |args| Ok(Value::Int(args.int(0)? * 2)),
/// ));
///
/// let t = Template::compile("<?print double(21)?>", Default::default()).unwrap();
/// let out: Result<String, _> = t.render_with(&registry, Vars::new()).collect();
/// assert_eq!(out.unwrap(), "42");
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    functions: HashMap<String, Arc<dyn Ul4Function>>,
    methods: HashMap<(ValueKind, String), Arc<dyn Ul4Method>>,
}

static SHARED: LazyLock<Registry> = LazyLock::new(Registry::builtin);

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in function and method.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        functions::register(&mut registry);
        methods::register(&mut registry);
        registry
    }

    /// The process-wide built-in registry.
    pub fn shared() -> &'static Registry {
        &SHARED
    }

    /// Register a function. A function with the same name is replaced.
    pub fn register_function(&mut self, function: impl Ul4Function + 'static) {
        let name = function.signature().name.clone();
        self.functions.insert(name, Arc::new(function));
    }

    /// Register a method for values of `kind`. A method with the same kind
    /// and name is replaced.
    pub fn register_method(&mut self, kind: ValueKind, method: impl Ul4Method + 'static) {
        let name = method.signature().name.clone();
        self.methods.insert((kind, name), Arc::new(method));
    }

    pub fn function(&self, name: &str) -> Option<&dyn Ul4Function> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    pub fn method(&self, kind: ValueKind, name: &str) -> Option<&dyn Ul4Method> {
        self.methods
            .get(&(kind, name.to_string()))
            .map(|m| m.as_ref())
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.functions.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

// ── Built-in wrappers ───────────────────────────────────────────────────

pub(crate) type FunctionFn = fn(&mut Evaluator<'_>, Args) -> Result<Value, EvalError>;
pub(crate) type IterFn = fn(&Args) -> Result<Items, EvalError>;
pub(crate) type MethodFn = fn(&mut Evaluator<'_>, &mut Value, Args) -> Result<Value, EvalError>;

/// A [`Ul4Function`] backed by a plain function pointer.
pub(crate) struct Builtin {
    sig: Signature,
    func: FunctionFn,
    lazy: Option<IterFn>,
}

impl Builtin {
    pub(crate) fn new(sig: Signature, func: FunctionFn) -> Self {
        Self {
            sig,
            func,
            lazy: None,
        }
    }

    /// A builtin whose items a loop can take one at a time.
    pub(crate) fn lazy(sig: Signature, func: FunctionFn, iterate: IterFn) -> Self {
        Self {
            sig,
            func,
            lazy: Some(iterate),
        }
    }
}

impl Ul4Function for Builtin {
    fn signature(&self) -> &Signature {
        &self.sig
    }

    fn call(&self, ev: &mut Evaluator<'_>, args: Args) -> Result<Value, EvalError> {
        (self.func)(ev, args)
    }

    fn iterate(&self, args: &Args) -> Option<Result<Items, EvalError>> {
        self.lazy.map(|iterate| iterate(args))
    }
}

pub(crate) struct BuiltinMethod {
    sig: Signature,
    func: MethodFn,
    mutates: bool,
}

impl BuiltinMethod {
    pub(crate) fn new(sig: Signature, func: MethodFn) -> Self {
        Self {
            sig,
            func,
            mutates: false,
        }
    }

    pub(crate) fn mutating(sig: Signature, func: MethodFn) -> Self {
        Self {
            sig,
            func,
            mutates: true,
        }
    }
}

impl Ul4Method for BuiltinMethod {
    fn signature(&self) -> &Signature {
        &self.sig
    }

    fn call(
        &self,
        ev: &mut Evaluator<'_>,
        receiver: &mut Value,
        args: Args,
    ) -> Result<Value, EvalError> {
        (self.func)(ev, receiver, args)
    }

    fn mutates(&self) -> bool {
        self.mutates
    }
}

// ── Closure-based convenience wrapper ───────────────────────────────────

/// A [`Ul4Function`] implementation backed by a closure.
///
/// Closure functions see only their bound arguments. For functions that
/// need the evaluator, implement [`Ul4Function`] directly.
///
/// ```rust
/// use ul4::{ClosureFunction, Signature, Value};
///
/// let greet = ClosureFunction::new(
///     Signature::new("greet").optional("name", "world"),
///     |args| Ok(Value::Str(format!("Hello, {}!", args.str(0)?))),
/// );
/// ```
pub struct ClosureFunction<F>
where
    F: Fn(Args) -> Result<Value, EvalError> + Send + Sync,
{
    sig: Signature,
    func: F,
}

impl<F> ClosureFunction<F>
where
    F: Fn(Args) -> Result<Value, EvalError> + Send + Sync,
{
    pub fn new(sig: Signature, func: F) -> Self {
        Self { sig, func }
    }
}

impl<F> Ul4Function for ClosureFunction<F>
where
    F: Fn(Args) -> Result<Value, EvalError> + Send + Sync,
{
    fn signature(&self) -> &Signature {
        &self.sig
    }

    fn call(&self, _ev: &mut Evaluator<'_>, args: Args) -> Result<Value, EvalError> {
        (self.func)(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> Signature {
        Signature::new("f").required("a").optional("b", 2)
    }

    #[test]
    fn test_bind_positional_and_default() {
        let args = sig().bind(vec![Value::Int(1)], vec![]).unwrap();
        assert_eq!(args.get(0), &Value::Int(1));
        assert_eq!(args.get(1), &Value::Int(2));
    }

    #[test]
    fn test_bind_keyword() {
        let args = sig()
            .bind(vec![], vec![("b".into(), Value::Int(5)), ("a".into(), Value::Int(4))])
            .unwrap();
        assert_eq!(args.int(0).unwrap(), 4);
        assert_eq!(args.int(1).unwrap(), 5);
    }

    #[test]
    fn test_bind_errors_name_the_callee() {
        let err = sig().bind(vec![], vec![]).unwrap_err();
        assert_eq!(err.message, "f() missing required argument 'a'");
        let err = sig()
            .bind(vec![Value::Int(1)], vec![("a".into(), Value::Int(1))])
            .unwrap_err();
        assert_eq!(err.message, "f() got multiple values for argument 'a'");
        let err = sig()
            .bind(vec![Value::Int(1)], vec![("c".into(), Value::Int(1))])
            .unwrap_err();
        assert_eq!(err.message, "f() got an unexpected keyword argument 'c'");
        let err = sig()
            .bind(vec![Value::Int(1), Value::Int(2), Value::Int(3)], vec![])
            .unwrap_err();
        assert_eq!(err.message, "f() takes at most 2 positional arguments (3 given)");
    }

    #[test]
    fn test_rest_collects_extras() {
        let sig = Signature::new("g").rest().rest_keyword();
        let args = sig
            .bind(vec![Value::Int(1), Value::Int(2)], vec![("x".into(), Value::Int(3))])
            .unwrap();
        assert_eq!(args.rest.len(), 2);
        assert_eq!(args.rest_keyword[0].0, "x");
    }

    #[test]
    fn test_argument_type_error() {
        let args = sig().bind(vec![Value::from("x")], vec![]).unwrap();
        let err = args.int(0).unwrap_err();
        assert_eq!(err.message, "f() argument 'a' must be int, not 'str'");
    }

    #[test]
    fn test_builtin_registry_lookup() {
        let registry = Registry::shared();
        assert!(registry.function("len").is_some());
        assert!(registry.function("nope").is_none());
        assert!(registry.method(ValueKind::Str, "upper").is_some());
        assert!(registry.method(ValueKind::List, "append").unwrap().mutates());
    }
}
