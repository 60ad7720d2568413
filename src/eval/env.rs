use crate::ast::value::{Value, Vars};

/// Variable bindings visible to a running template, as a stack of scope
/// frames.
///
/// The bottom frame holds the render's variables. `for` loops and
/// comprehensions push a frame, and every assignment binds in the
/// innermost frame, so nothing set inside a loop outlives it.
#[derive(Debug, Default)]
pub(crate) struct Env {
    frames: Vec<Vars>,
}

impl Env {
    pub(crate) fn new(vars: Vars) -> Self {
        Self { frames: vec![vars] }
    }

    pub(crate) fn push_scope(&mut self) {
        self.frames.push(Vars::new());
    }

    pub(crate) fn pop_scope(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Bind in the innermost frame, shadowing outer bindings.
    pub(crate) fn bind(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.frames.iter_mut().rev().find_map(|frame| frame.get_mut(name))
    }

    /// Flatten all frames into one map, inner bindings winning. Used to
    /// capture the environment for a closure.
    pub(crate) fn snapshot(&self) -> Vars {
        let mut vars = Vars::new();
        for frame in &self.frames {
            vars.extend(frame.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        vars
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Pop frames until only `depth` remain.
    pub(crate) fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth.max(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_scope_shadows_and_disappears() {
        let mut env = Env::new(Vars::from([("x".to_string(), Value::Int(1))]));
        env.push_scope();
        env.bind("x", Value::Int(2));
        assert_eq!(env.get("x"), Some(&Value::Int(2)));
        env.pop_scope();
        assert_eq!(env.get("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_bind_leaves_outer_binding_alone() {
        let mut env = Env::new(Vars::from([("total".to_string(), Value::Int(0))]));
        env.push_scope();
        env.bind("total", Value::Int(5));
        env.bind("fresh", Value::Int(1));
        assert_eq!(env.get("total"), Some(&Value::Int(5)));
        env.pop_scope();
        assert_eq!(env.get("total"), Some(&Value::Int(0)));
        assert_eq!(env.get("fresh"), None);
    }

    #[test]
    fn test_get_mut_reaches_outer_binding() {
        let mut env = Env::new(Vars::from([("l".to_string(), Value::from(vec![1]))]));
        env.push_scope();
        if let Some(Value::List(items)) = env.get_mut("l") {
            items.push(Value::Int(2));
        }
        env.pop_scope();
        assert_eq!(env.get("l"), Some(&Value::from(vec![1, 2])));
    }

    #[test]
    fn test_snapshot_flattens() {
        let mut env = Env::new(Vars::from([("a".to_string(), Value::Int(1))]));
        env.push_scope();
        env.bind("a", Value::Int(2));
        env.bind("b", Value::Int(3));
        let vars = env.snapshot();
        assert_eq!(vars["a"], Value::Int(2));
        assert_eq!(vars["b"], Value::Int(3));
    }

    #[test]
    fn test_bottom_frame_is_never_popped() {
        let mut env = Env::new(Vars::new());
        env.pop_scope();
        env.bind("x", Value::None);
        assert_eq!(env.depth(), 1);
        assert!(env.get("x").is_some());
    }
}
