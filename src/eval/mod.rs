//! Template evaluator.
//!
//! Rendering is driven by [`Render`], an iterator that executes one node
//! per step and yields output fragments as they are produced. Control flow
//! (`break`, `continue`, `return`) travels as an explicit [`Signal`] from
//! statement execution to the frame stack; nothing unwinds.
//!
//! Expressions are evaluated by [`Evaluator`], which owns the variable
//! scopes of one template invocation and a reference to the [`Registry`]
//! of callable functions and methods.

mod call;
mod env;
pub mod ops;

use std::collections::VecDeque;
use std::sync::Arc;

use crate::ast::expr::*;
use crate::ast::location::Location;
use crate::ast::template::{Node, NodeKind, Template};
use crate::ast::value::{Closure, Undefined, Value, Vars};
use crate::error::EvalError;
use crate::registry::{Registry, xmlescape};

use env::Env;

/// Deepest allowed nesting of template calls.
const MAX_CALL_DEPTH: usize = 100;

/// Control flow produced by executing a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Break,
    Continue,
    Return(Value),
}

// ── Render iterator ─────────────────────────────────────────────────────

enum Frame<'t> {
    Block {
        nodes: &'t [Node],
        pos: usize,
    },
    Loop {
        target: &'t Target,
        items: ops::Items,
        nodes: &'t [Node],
        pos: usize,
        location: &'t Location,
        /// Scope depth to restore when the loop ends.
        scope: usize,
    },
}

/// A running template: an iterator over output fragments.
///
/// Each call to `next` executes nodes until at least one fragment is
/// available. After an error the iterator is exhausted. Dropping it
/// cancels the render.
///
/// ```rust
/// use ul4::{Template, Value, Vars};
///
/// let t = Template::compile("<?for i in range(3)?><?print i?><?end for?>", Default::default()).unwrap();
/// let pieces: Vec<String> = t.render(Vars::new()).collect::<Result<_, _>>().unwrap();
/// assert_eq!(pieces, ["0", "1", "2"]);
/// ```
pub struct Render<'t> {
    template: &'t Template,
    ev: Evaluator<'t>,
    stack: Vec<Frame<'t>>,
    pending: VecDeque<String>,
    returned: Option<Value>,
    finished: bool,
}

impl<'t> Render<'t> {
    pub(crate) fn new(template: &'t Template, ev: Evaluator<'t>) -> Self {
        tracing::trace!(name = ?template.name, "rendering template");
        Self {
            template,
            ev,
            stack: vec![Frame::Block {
                nodes: &template.body.nodes,
                pos: 0,
            }],
            pending: VecDeque::new(),
            returned: None,
            finished: false,
        }
    }

    /// Run the template to the end in function mode: output is discarded
    /// and the value of `<?return?>` (or `None`) is the result.
    pub fn call(mut self) -> Result<Value, EvalError> {
        for fragment in &mut self {
            fragment?;
        }
        Ok(self.returned.take().unwrap_or(Value::None))
    }

    /// Execute one node or advance one loop iteration. Returns `false` once
    /// the template is done.
    fn step(&mut self) -> Result<bool, EvalError> {
        let node: &'t Node = match self.stack.last_mut() {
            None => return Ok(false),
            Some(Frame::Block { nodes, pos }) => {
                let nodes: &'t [Node] = *nodes;
                if *pos >= nodes.len() {
                    self.stack.pop();
                    return Ok(true);
                }
                *pos += 1;
                &nodes[*pos - 1]
            }
            Some(Frame::Loop {
                target,
                items,
                nodes,
                pos,
                location,
                scope,
            }) => {
                let nodes: &'t [Node] = *nodes;
                if *pos < nodes.len() {
                    *pos += 1;
                    &nodes[*pos - 1]
                } else {
                    match items.next() {
                        Some(item) => {
                            *pos = 0;
                            let target: &'t Target = *target;
                            let location: &'t Location = *location;
                            self.ev
                                .assign(target, item)
                                .map_err(|e| e.in_tag(location))?;
                        }
                        None => {
                            let scope = *scope;
                            self.stack.pop();
                            self.ev.env.truncate(scope);
                        }
                    }
                    return Ok(true);
                }
            }
        };

        let signal = self.exec(node).map_err(|e| e.in_tag(&node.location))?;
        self.flush();
        if let Some(signal) = signal {
            self.handle(signal);
        }
        Ok(true)
    }

    /// Move fragments produced inside expressions to the output queue.
    fn flush(&mut self) {
        self.pending
            .extend(self.ev.output.drain(..).filter(|s| !s.is_empty()));
    }

    fn emit(&mut self, fragment: String) {
        self.flush();
        if !fragment.is_empty() {
            self.pending.push_back(fragment);
        }
    }

    fn handle(&mut self, signal: Signal) {
        match signal {
            Signal::Break => {
                while let Some(frame) = self.stack.pop() {
                    if let Frame::Loop { scope, .. } = frame {
                        self.ev.env.truncate(scope);
                        break;
                    }
                }
            }
            Signal::Continue => {
                while let Some(frame) = self.stack.last_mut() {
                    if let Frame::Loop { nodes, pos, .. } = frame {
                        *pos = nodes.len();
                        break;
                    }
                    self.stack.pop();
                }
            }
            Signal::Return(value) => {
                self.returned = Some(value);
                self.stack.clear();
            }
        }
    }

    fn exec(&mut self, node: &'t Node) -> Result<Option<Signal>, EvalError> {
        match &node.kind {
            NodeKind::Text(text) => self.emit(text.clone()),
            NodeKind::Print(expr) => {
                let value = self.ev.eval(expr)?;
                self.emit(value.to_string());
            }
            NodeKind::PrintX(expr) => {
                let value = self.ev.eval(expr)?;
                self.emit(xmlescape(&value.to_string()));
            }
            NodeKind::Return(expr) => {
                let value = self.ev.eval(expr)?;
                return Ok(Some(Signal::Return(value)));
            }
            NodeKind::Expr(expr) => {
                self.ev.eval(expr)?;
            }
            NodeKind::Store { target, value } => {
                let value = self.ev.eval(value)?;
                self.ev.assign(target, value)?;
            }
            NodeKind::Modify { op, name, value } => {
                let value = self.ev.eval(value)?;
                self.ev.modify(*op, name, value)?;
            }
            NodeKind::If(chain) => {
                for branch in &chain.branches {
                    let taken = match &branch.condition {
                        None => true,
                        Some(condition) => self
                            .ev
                            .eval(condition)
                            .map_err(|e| e.in_tag(&branch.location))?
                            .is_truthy(),
                    };
                    if taken {
                        self.stack.push(Frame::Block {
                            nodes: &branch.body.nodes,
                            pos: 0,
                        });
                        break;
                    }
                }
            }
            NodeKind::For(block) => {
                let items = self.ev.items(&block.container)?;
                let scope = self.ev.env.depth();
                self.ev.env.push_scope();
                self.stack.push(Frame::Loop {
                    target: &block.target,
                    items,
                    nodes: &block.body.nodes,
                    pos: block.body.nodes.len(),
                    location: &node.location,
                    scope,
                });
            }
            NodeKind::Break => return Ok(Some(Signal::Break)),
            NodeKind::Continue => return Ok(Some(Signal::Continue)),
            NodeKind::Def(template) => {
                let closure = self.ev.closure(template)?;
                let name = template.name.as_deref().unwrap_or_default();
                self.ev.env.bind(name, Value::Template(Arc::new(closure)));
            }
        }
        Ok(None)
    }
}

impl Iterator for Render<'_> {
    type Item = Result<String, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                return Some(Ok(fragment));
            }
            if self.finished {
                return None;
            }
            match self.step() {
                Ok(true) => {}
                Ok(false) => {
                    self.flush();
                    self.finished = true;
                }
                Err(e) => {
                    self.finished = true;
                    self.stack.clear();
                    self.pending.clear();
                    self.ev.output.clear();
                    return Some(Err(e.in_template(self.template.name.as_deref())));
                }
            }
        }
    }
}

// ── Expression evaluator ────────────────────────────────────────────────

/// Evaluates expressions for one template invocation.
///
/// Host functions implementing [`Ul4Function`](crate::Ul4Function)
/// receive the evaluator so they can call back into template values with
/// [`Evaluator::call_value`] or write output with [`Evaluator::write`].
pub struct Evaluator<'r> {
    registry: &'r Registry,
    pub(crate) env: Env,
    output: Vec<String>,
    depth: usize,
}

impl<'r> Evaluator<'r> {
    pub(crate) fn new(registry: &'r Registry, vars: Vars) -> Self {
        Self {
            registry,
            env: Env::new(vars),
            output: Vec::new(),
            depth: 0,
        }
    }

    fn child(&self, vars: Vars) -> Result<Evaluator<'r>, EvalError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::value_error("maximum template call depth exceeded"));
        }
        Ok(Evaluator {
            registry: self.registry,
            env: Env::new(vars),
            output: Vec::new(),
            depth: self.depth + 1,
        })
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Append text to the output of the running render. In function mode
    /// it is discarded.
    pub fn write(&mut self, text: impl Into<String>) {
        self.output.push(text.into());
    }

    /// Look up a variable, falling back to registry functions.
    pub fn lookup(&self, name: &str) -> Value {
        if let Some(value) = self.env.get(name) {
            return value.clone();
        }
        if self.registry.function(name).is_some() {
            return Value::Function(Arc::from(name));
        }
        Value::Undefined(Undefined::Variable(name.to_string()))
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match &expr.node {
            ExprKind::Const(value) => Ok(value.clone()),
            ExprKind::Var(name) => Ok(self.lookup(name)),
            ExprKind::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            ExprKind::Dict(items) => {
                let mut dict = indexmap::IndexMap::with_capacity(items.len());
                for (key, value) in items {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    dict.insert(key, value);
                }
                Ok(Value::Dict(dict))
            }
            ExprKind::ListComp(comp) | ExprKind::GenExpr(comp) => {
                self.comprehension(comp).map(Value::List)
            }
            ExprKind::DictComp(comp) => self.dict_comprehension(comp),
            ExprKind::GetAttr { obj, attr } => {
                let obj = self.eval(obj)?;
                getattr(&obj, attr)
            }
            ExprKind::GetItem { obj, index } => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                ops::getitem(&obj, &index)
            }
            ExprKind::GetSlice { obj, start, stop } => {
                let obj = self.eval(obj)?;
                let start = start.as_deref().map(|e| self.eval(e)).transpose()?;
                let stop = stop.as_deref().map(|e| self.eval(e)).transpose()?;
                ops::getslice(&obj, start.as_ref(), stop.as_ref())
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                ops::unary(*op, &operand)
            }
            ExprKind::Binary { left, op, right } => {
                let left = self.eval(left)?;
                match op {
                    BinOp::And if !left.is_truthy() => Ok(left),
                    BinOp::Or if left.is_truthy() => Ok(left),
                    BinOp::And | BinOp::Or => self.eval(right),
                    _ => {
                        let right = self.eval(right)?;
                        ops::binary(*op, &left, &right)
                    }
                }
            }
            ExprKind::Call { callee, args } => {
                let callee = self.eval(callee)?;
                let (positional, keyword) = self.eval_args(args)?;
                self.call_value(&callee, positional, keyword)
            }
            ExprKind::CallMeth { obj, method, args } => {
                let receiver = self.eval(obj)?;
                let (positional, keyword) = self.eval_args(args)?;
                let target = match &obj.node {
                    ExprKind::Var(name) => Some(name.as_str()),
                    _ => None,
                };
                self.call_method(receiver, target, method, positional, keyword)
            }
        }
    }

    /// The items a loop or comprehension runs over. A call to a function
    /// that can count through its result, like `range()`, is not turned
    /// into a list first.
    fn items(&mut self, container: &Expr) -> Result<ops::Items, EvalError> {
        if let ExprKind::Call { callee, args } = &container.node {
            let registry = self.registry;
            let callee = self.eval(callee)?;
            let (positional, keyword) = self.eval_args(args)?;
            if let Value::Function(name) = &callee
                && let Some(function) = registry.function(name)
            {
                let args = function.signature().bind(positional, keyword)?;
                if let Some(items) = function.iterate(&args) {
                    return items;
                }
                return ops::iterate(&function.call(self, args)?).map(ops::Items::from);
            }
            let value = self.call_value(&callee, positional, keyword)?;
            return ops::iterate(&value).map(ops::Items::from);
        }
        let value = self.eval(container)?;
        ops::iterate(&value).map(ops::Items::from)
    }

    /// Run `body` in a fresh scope that is removed afterwards, even on
    /// error.
    fn scoped<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        let depth = self.env.depth();
        self.env.push_scope();
        let result = body(self);
        self.env.truncate(depth);
        result
    }

    fn comprehension(&mut self, comp: &Comprehension) -> Result<Vec<Value>, EvalError> {
        let items = self.items(&comp.container)?;
        self.scoped(|ev| {
            let mut out = Vec::new();
            for item in items {
                ev.assign(&comp.target, item)?;
                if let Some(condition) = &comp.condition
                    && !ev.eval(condition)?.is_truthy()
                {
                    continue;
                }
                out.push(ev.eval(&comp.item)?);
            }
            Ok(out)
        })
    }

    fn dict_comprehension(&mut self, comp: &DictComprehension) -> Result<Value, EvalError> {
        let items = self.items(&comp.container)?;
        self.scoped(|ev| {
            let mut out = indexmap::IndexMap::new();
            for item in items {
                ev.assign(&comp.target, item)?;
                if let Some(condition) = &comp.condition
                    && !ev.eval(condition)?.is_truthy()
                {
                    continue;
                }
                let key = ev.eval(&comp.key)?;
                let value = ev.eval(&comp.value)?;
                out.insert(key, value);
            }
            Ok(Value::Dict(out))
        })
    }

    /// Bind `value` to `target` in the innermost scope, unpacking nested
    /// tuples. Inside a loop this shadows an outer variable until the loop
    /// ends.
    pub(crate) fn assign(&mut self, target: &Target, value: Value) -> Result<(), EvalError> {
        match target {
            Target::Name(name) => {
                self.env.bind(name, value);
                Ok(())
            }
            Target::Unpack(targets) => {
                let items = ops::iterate(&value)?;
                if items.len() != targets.len() {
                    return Err(EvalError::unpack(targets.len(), items.len()));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
        }
    }

    /// `name op= value`
    fn modify(&mut self, op: AssignOp, name: &str, value: Value) -> Result<(), EvalError> {
        let Some(current) = self.env.get(name) else {
            return Err(EvalError::new(
                crate::EvalErrorKind::UndefinedVariable,
                format!("undefined variable {}", crate::ast::value::repr_str(name)),
            ));
        };
        let updated = ops::binary(op.binop(), current, &value)?;
        self.env.bind(name, updated);
        Ok(())
    }

    /// Build the closure for a `<?def?>`: capture the current variables and
    /// evaluate parameter defaults.
    fn closure(&mut self, template: &Arc<Template>) -> Result<Closure, EvalError> {
        let mut defaults = Vars::new();
        for param in template.params.iter().flatten() {
            if let Some(default) = &param.default {
                defaults.insert(param.name.clone(), self.eval(default)?);
            }
        }
        Ok(Closure {
            template: Arc::clone(template),
            vars: self.env.snapshot(),
            defaults,
        })
    }
}

/// `obj.attr`
fn getattr(obj: &Value, attr: &str) -> Result<Value, EvalError> {
    match obj {
        Value::Dict(items) => {
            let key = Value::Str(attr.to_string());
            Ok(items
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Value::Undefined(Undefined::Key(Box::new(key)))))
        }
        Value::Template(closure) => {
            let t = &closure.template;
            match attr {
                "name" => Ok(t.name.clone().into()),
                "source" => Ok(Value::Str(t.source.to_string())),
                "keepws" => Ok(Value::Bool(t.keepws)),
                "startdelim" => Ok(Value::Str(t.startdelim.clone())),
                "enddelim" => Ok(Value::Str(t.enddelim.clone())),
                _ => Err(no_attribute(obj, attr)),
            }
        }
        _ => Err(no_attribute(obj, attr)),
    }
}

fn no_attribute(obj: &Value, attr: &str) -> EvalError {
    match obj {
        Value::Undefined(u) => EvalError::new(
            crate::EvalErrorKind::UndefinedOperand,
            format!("{u} has no attribute '{attr}'"),
        ),
        _ => EvalError::type_error(format!(
            "'{}' object has no attribute '{attr}'",
            obj.type_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompileOptions;
    use crate::error::EvalErrorKind;

    fn render(source: &str, vars: Vars) -> Result<String, EvalError> {
        let template = crate::parser::compile(source, &CompileOptions::new()).expect("compile");
        let ev = Evaluator::new(Registry::shared(), vars);
        Render::new(&template, ev).collect()
    }

    fn render_simple(source: &str) -> String {
        render(source, Vars::new()).expect("render failed")
    }

    fn vars(items: &[(&str, Value)]) -> Vars {
        items.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_text_and_print() {
        let out = render("Hello <?print name?>!", vars(&[("name", Value::from("World"))]));
        assert_eq!(out.unwrap(), "Hello World!");
    }

    #[test]
    fn test_printx_escapes() {
        assert_eq!(render_simple("<?printx '<a & b>'?>"), "&lt;a &amp; b&gt;");
    }

    #[test]
    fn test_undefined_prints_empty() {
        assert_eq!(render_simple("[<?print missing?>]"), "[]");
        assert_eq!(render_simple("[<?print None?>]"), "[]");
    }

    #[test]
    fn test_if_elif_else() {
        let source = "<?if x == 1?>A<?elif x == 2?>B<?else?>C<?end if?>";
        for (x, expected) in [(1, "A"), (2, "B"), (3, "C")] {
            assert_eq!(render(source, vars(&[("x", Value::Int(x))])).unwrap(), expected);
        }
    }

    #[test]
    fn test_for_break_continue() {
        let source = "<?for i in range(10)?><?if i == 2?><?continue?><?end if?>\
                      <?if i == 5?><?break?><?end if?><?print i?><?end for?>";
        assert_eq!(render_simple(source), "0134");
    }

    #[test]
    fn test_nested_loops_break_inner_only() {
        let source = "<?for a in [1, 2]?><?for b in [1, 2, 3]?><?if b == 2?><?break?><?end if?>\
                      <?print a?><?print b?><?end for?><?end for?>";
        assert_eq!(render_simple(source), "1121");
    }

    #[test]
    fn test_loop_variable_does_not_leak() {
        assert_eq!(render_simple("<?for x in [1]?><?end for?><?print isundefined(x)?>"), "True");
        assert_eq!(render_simple("<?code y = [x for x in [1]]?><?print isundefined(x)?>"), "True");
    }

    #[test]
    fn test_assignment_inside_loop_is_local_to_the_loop() {
        let source = "<?code total = 0?><?for x in [1, 2, 3]?><?code total += x?><?end for?><?print total?>";
        assert_eq!(render_simple(source), "0");
        let source = "<?code total = 0?><?for x in [1, 2, 3]?><?code total += x?><?print total?>,<?end for?>";
        assert_eq!(render_simple(source), "1,3,6,");
        let source = "<?code l = []?><?for x in [1, 2]?><?code l.append(x)?><?end for?><?print l?>";
        assert_eq!(render_simple(source), "[1, 2]");
    }

    #[test]
    fn test_unpacking() {
        let source = "<?for (k, v) in {'a': 1}.items()?><?print k?>=<?print v?><?end for?>";
        assert_eq!(render_simple(source), "a=1");
        let err = render("<?code (a, b) = [1, 2, 3]?>", Vars::new()).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UnpackError);
    }

    #[test]
    fn test_return_stops_render() {
        assert_eq!(render_simple("a<?return 1?>b"), "a");
    }

    #[test]
    fn test_and_or_short_circuit() {
        assert_eq!(render_simple("<?print 0 or 'x'?>"), "x");
        assert_eq!(render_simple("<?print 0 and 1 // 0?>"), "0");
        assert_eq!(render_simple("<?print 1 or 1 // 0?>"), "1");
    }

    #[test]
    fn test_error_trace_points_at_tag() {
        let err = render("a\n<?print 1 // x?>", vars(&[("x", Value::Int(0))])).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::ArithmeticError);
        assert_eq!(err.location().unwrap().tag(), "<?print 1 // x?>");
        assert!(matches!(err.trace.last(), Some(crate::error::TraceFrame::Template(None))));
    }

    #[test]
    fn test_render_is_lazy() {
        let template =
            crate::parser::compile("a<?print 1 // 0?>", &CompileOptions::new()).expect("compile");
        let mut render = Render::new(&template, Evaluator::new(Registry::shared(), Vars::new()));
        assert_eq!(render.next().unwrap().unwrap(), "a");
        assert!(render.next().unwrap().is_err());
        assert!(render.next().is_none());
    }

    #[test]
    fn test_undefined_operand_error() {
        let err = render("<?print x + 1?>", Vars::new()).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UndefinedOperand);
        assert!(err.message.contains("undefined variable 'x'"));
    }

    #[test]
    fn test_modify_undefined_variable() {
        let err = render("<?code x += 1?>", Vars::new()).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_dict_attribute_access() {
        let d = Value::dict([("name", "Ada")]);
        assert_eq!(render("<?print d.name?>", vars(&[("d", d.clone())])).unwrap(), "Ada");
        assert_eq!(render("<?print isundefined(d.age)?>", vars(&[("d", d)])).unwrap(), "True");
    }
}
