use std::sync::Arc;

use crate::ast::expr::CallArgs;
use crate::ast::value::{Closure, Value, Vars};
use crate::error::EvalError;
use crate::registry::{ParamDef, Signature};

use super::{Evaluator, Render, ops};

type Keywords = Vec<(String, Value)>;

impl<'r> Evaluator<'r> {
    /// Evaluate call arguments, expanding `*list` and `**dict`.
    pub(crate) fn eval_args(
        &mut self,
        args: &CallArgs,
    ) -> Result<(Vec<Value>, Keywords), EvalError> {
        let mut positional = args
            .positional
            .iter()
            .map(|e| self.eval(e))
            .collect::<Result<Vec<_>, _>>()?;
        let mut keyword = Vec::with_capacity(args.keyword.len());
        for (name, e) in &args.keyword {
            keyword.push((name.clone(), self.eval(e)?));
        }
        if let Some(rest) = &args.rest {
            let rest = self.eval(rest)?;
            positional.extend(ops::iterate(&rest)?);
        }
        if let Some(rest) = &args.rest_keyword {
            match self.eval(rest)? {
                Value::Dict(items) => {
                    for (key, value) in items {
                        match key {
                            Value::Str(key) => keyword.push((key, value)),
                            other => {
                                return Err(EvalError::type_error(format!(
                                    "keywords must be strings, not '{}'",
                                    other.type_name()
                                )));
                            }
                        }
                    }
                }
                other => {
                    return Err(EvalError::type_error(format!(
                        "argument after ** must be a dict, not '{}'",
                        other.type_name()
                    )));
                }
            }
        }
        Ok((positional, keyword))
    }

    /// Call a function or template value.
    pub fn call_value(
        &mut self,
        callee: &Value,
        positional: Vec<Value>,
        keyword: Keywords,
    ) -> Result<Value, EvalError> {
        match callee {
            Value::Function(name) => {
                let registry = self.registry;
                let function = registry
                    .function(name)
                    .ok_or_else(|| EvalError::not_callable(callee))?;
                let args = function.signature().bind(positional, keyword)?;
                function.call(self, args)
            }
            Value::Template(closure) => self.call_closure(closure, positional, keyword),
            other => Err(EvalError::not_callable(other)),
        }
    }

    /// Call `receiver.name(...)`. A mutating method's receiver is written
    /// back to the variable `target` when there is one.
    pub(crate) fn call_method(
        &mut self,
        mut receiver: Value,
        target: Option<&str>,
        name: &str,
        positional: Vec<Value>,
        keyword: Keywords,
    ) -> Result<Value, EvalError> {
        let registry = self.registry;
        let method = registry
            .method(receiver.kind(), name)
            .ok_or_else(|| EvalError::unknown_method(&receiver, name))?;
        let args = method.signature().bind(positional, keyword)?;
        let result = method.call(self, &mut receiver, args)?;
        if method.mutates()
            && let Some(target) = target
            && let Some(slot) = self.env.get_mut(target)
        {
            *slot = receiver;
        }
        Ok(result)
    }

    /// Variables for a template call: the captured environment, the
    /// template itself under its own name, then the arguments.
    fn bind_closure(
        &self,
        closure: &Arc<Closure>,
        positional: Vec<Value>,
        keyword: Keywords,
    ) -> Result<Vars, EvalError> {
        let template = &closure.template;
        let callee = template.name.as_deref().unwrap_or("template");
        let mut vars = closure.vars.clone();
        if let Some(name) = &template.name {
            vars.insert(name.clone(), Value::Template(Arc::clone(closure)));
        }
        match &template.params {
            None => {
                let args = Signature::new(callee).rest_keyword().bind(positional, keyword)?;
                vars.extend(args.rest_keyword);
            }
            Some(params) => {
                let signature = Signature {
                    name: callee.to_string(),
                    params: params
                        .iter()
                        .map(|p| ParamDef {
                            name: p.name.clone(),
                            default: closure.defaults.get(&p.name).cloned(),
                        })
                        .collect(),
                    rest: false,
                    rest_keyword: false,
                };
                let mut args = signature.bind(positional, keyword)?;
                for (i, param) in params.iter().enumerate() {
                    vars.insert(param.name.clone(), args.take(i));
                }
            }
        }
        Ok(vars)
    }

    /// Call a template in function mode and return its `<?return?>` value.
    pub fn call_closure(
        &mut self,
        closure: &Arc<Closure>,
        positional: Vec<Value>,
        keyword: Keywords,
    ) -> Result<Value, EvalError> {
        let vars = self.bind_closure(closure, positional, keyword)?;
        tracing::trace!(name = ?closure.name(), "calling template");
        let child = self.child(vars)?;
        Render::new(&closure.template, child).call()
    }

    /// Render a template into this evaluator's output.
    pub fn render_closure(
        &mut self,
        closure: &Arc<Closure>,
        positional: Vec<Value>,
        keyword: Keywords,
    ) -> Result<(), EvalError> {
        for fragment in self.render_fragments(closure, positional, keyword)? {
            self.output.push(fragment);
        }
        Ok(())
    }

    /// Render a template and collect its output.
    pub fn render_fragments(
        &self,
        closure: &Arc<Closure>,
        positional: Vec<Value>,
        keyword: Keywords,
    ) -> Result<Vec<String>, EvalError> {
        let vars = self.bind_closure(closure, positional, keyword)?;
        tracing::trace!(name = ?closure.name(), "rendering template value");
        let child = self.child(vars)?;
        Render::new(&closure.template, child).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::EvalErrorKind;
    use crate::{CompileOptions, Template, Value, Vars};

    fn call(source: &str) -> Result<Value, crate::EvalError> {
        Template::compile(source, CompileOptions::new())
            .expect("compile")
            .call(Vars::new())
    }

    fn render(source: &str) -> Result<String, crate::EvalError> {
        Template::compile(source, CompileOptions::new().name("page"))
            .expect("compile")
            .render_to_string(Vars::new())
    }

    #[test]
    fn test_def_with_params_and_defaults() {
        let source = "<?def add(a, b=10)?><?return a + b?><?end def?><?return [add(1), add(1, 2), add(b=3, a=4)]?>";
        assert_eq!(call(source).unwrap(), Value::from(vec![11, 3, 7]));
    }

    #[test]
    fn test_def_output_is_discarded_when_called() {
        let source = "<?def f(n)?>noise<?return n * 2?><?end def?><?print f(21)?>";
        assert_eq!(render(source).unwrap(), "42");
    }

    #[test]
    fn test_recursion() {
        let source = "<?def fac(n)?><?if n <= 1?><?return 1?><?end if?><?return n * fac(n - 1)?><?end def?>\
                      <?return fac(5)?>";
        assert_eq!(call(source).unwrap(), Value::Int(120));
    }

    #[test]
    fn test_closure_captures_definition_environment() {
        let source = "<?code x = 1?><?def f?><?return x?><?end def?><?code x = 2?><?return f()?>";
        assert_eq!(call(source).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_keyword_only_template_rejects_positional() {
        let err = call("<?def f?><?return x?><?end def?><?return f(1)?>").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::ArgumentError);
        assert!(err.message.starts_with("f() takes no positional arguments"));
        assert_eq!(call("<?def f?><?return x?><?end def?><?return f(x=5)?>").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_argument_errors_name_template() {
        let err = call("<?def f(a)?><?end def?><?return f(b=1)?>").unwrap_err();
        assert_eq!(err.message, "f() got an unexpected keyword argument 'b'");
    }

    #[test]
    fn test_star_arguments() {
        let source = "<?def f(a, b)?><?return a - b?><?end def?><?return f(*[5, 3]) + f(**{'b': 1, 'a': 2})?>";
        assert_eq!(call(source).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_error_in_nested_template_has_two_template_frames() {
        let err = render("<?def f?><?print 1 // 0?><?end def?><?code f()?>").unwrap_err();
        let templates: Vec<_> = err
            .trace
            .iter()
            .filter_map(|f| match f {
                crate::error::TraceFrame::Template(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(templates, vec![Some("f".to_string()), Some("page".to_string())]);
    }

    #[test]
    fn test_render_method_writes_into_output() {
        let source = "<?def row(x)?>[<?print x?>]<?end def?>a<?code row.render(x=1)?>b";
        assert_eq!(render(source).unwrap(), "a[1]b");
        let source = "<?def row(x)?>[<?print x?>]<?end def?><?print row.renders(2).upper()?>";
        assert_eq!(render(source).unwrap(), "[2]");
    }

    #[test]
    fn test_mutating_method_writes_back() {
        let source = "<?code l = []?><?code l.append(1)?><?code l.append(2)?><?print l?>";
        assert_eq!(render(source).unwrap(), "[1, 2]");
    }

    #[test]
    fn test_runaway_recursion_is_an_error() {
        let err = call("<?def f?><?return f()?><?end def?><?return f()?>").unwrap_err();
        assert!(err.message.contains("maximum template call depth"));
    }
}
