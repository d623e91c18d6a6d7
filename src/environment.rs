use crate::value::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// Shared handle to a scope. Closures keep their defining scope alive.
pub type EnvRef = Rc<RefCell<Environment>>;

/// Lexical scope: local bindings plus an optional enclosing scope.
#[derive(Default)]
pub struct Environment {
    values: HashMap<String, Value>,

    /// Names bound with `<const>` or `<close>` in this scope.
    constants: HashSet<String>,

    /// `<close>` values, in declaration order.
    to_close: Vec<Value>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    pub fn with_enclosing(enclosing: EnvRef) -> Self {
        Environment {
            enclosing: Some(enclosing),
            ..Environment::default()
        }
    }

    /// Fresh root scope.
    pub fn root() -> EnvRef {
        Rc::new(RefCell::new(Environment::new()))
    }

    /// Fresh child scope of `parent`.
    pub fn child(parent: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment::with_enclosing(parent.clone())))
    }

    /// Bind `name` in this scope only (parameters, `local`).
    pub fn define(&mut self, name: &str, value: Value) {
        self.constants.remove(name);
        self.values.insert(name.to_string(), value);
    }

    /// Bind a read-only `name` in this scope.
    pub fn define_const(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
        self.constants.insert(name.to_string());
    }

    /// Whether the binding `name` resolves to is read-only. Unbound names are
    /// writable globals.
    pub fn is_const(&self, name: &str) -> bool {
        if self.values.contains_key(name) {
            self.constants.contains(name)
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().is_const(name)
        } else {
            false
        }
    }

    pub fn mark_to_close(&mut self, value: Value) {
        self.to_close.push(value);
    }

    pub fn has_to_close(&self) -> bool {
        !self.to_close.is_empty()
    }

    /// Remove and return the scope's `<close>` values, in declaration order.
    pub fn take_to_close(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.to_close)
    }

    /// Look `name` up through the scope chain; `None` when unbound.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.values.get(name) {
            Some(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            None
        }
    }

    /// Assign to the nearest scope declaring `name`; unbound names become
    /// globals in the root scope.
    pub fn assign(&mut self, name: &str, value: Value) {
        if self.values.contains_key(name) {
            self.values.insert(name.to_string(), value);
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value);
        } else {
            self.values.insert(name.to_string(), value);
        }
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.keys().cloned().collect();
        names.sort();
        names
    }
}

// Closures capture their scope; printing values here would recurse forever.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("names", &self.local_names())
            .field("has_enclosing", &self.enclosing.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_updates_declaring_scope() {
        let root = Environment::root();
        root.borrow_mut().define("x", Value::Number(1.0));

        let child = Environment::child(&root);
        child.borrow_mut().assign("x", Value::Number(2.0));

        assert_eq!(root.borrow().get("x"), Some(Value::Number(2.0)));
        assert!(!child.borrow().has_local("x"));
    }

    #[test]
    fn constants_resolve_to_nearest_binding() {
        let root = Environment::root();
        root.borrow_mut().define_const("a", Value::Number(1.0));

        let child = Environment::child(&root);
        assert!(child.borrow().is_const("a"));

        child.borrow_mut().define("a", Value::Number(2.0));
        assert!(!child.borrow().is_const("a"));
        assert!(root.borrow().is_const("a"));

        root.borrow_mut().define("a", Value::Nil);
        assert!(!root.borrow().is_const("a"));
        assert!(!root.borrow().is_const("missing"));
    }

    #[test]
    fn unbound_assignment_lands_in_root() {
        let root = Environment::root();
        let child = Environment::child(&Environment::child(&root));

        child.borrow_mut().assign("g", Value::Bool(true));

        assert_eq!(root.borrow().get("g"), Some(Value::Bool(true)));
        assert_eq!(child.borrow().get("missing"), None);
    }
}
