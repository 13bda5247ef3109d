//! Lexical scope chain. Function calls get a fresh scope parented to the
//! module-level globals; there are no closures over enclosing function
//! scopes because the curriculum's functions are never nested.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::scope::ExecutionScope;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Env {
    vars: Rc<RefCell<HashMap<String, Value>>>,
    parent: Option<Rc<Env>>,
}

impl Env {
    pub fn root() -> Rc<Env> {
        Rc::new(Env {
            vars: Rc::new(RefCell::new(HashMap::new())),
            parent: None,
        })
    }

    /// Seeds a fresh root scope from the restricted environment's
    /// whitelist, sharing the same backing map as `scope` so a program's
    /// global assignments stay visible through the caller's own handle.
    pub fn from_scope(scope: &ExecutionScope) -> Rc<Env> {
        Rc::new(Env {
            vars: scope.share(),
            parent: None,
        })
    }

    pub fn child(parent: &Rc<Env>) -> Rc<Env> {
        Rc::new(Env {
            vars: Rc::new(RefCell::new(HashMap::new())),
            parent: Some(parent.clone()),
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.vars.borrow().get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    pub fn set_local(&self, name: impl Into<String>, value: Value) {
        self.vars.borrow_mut().insert(name.into(), value);
    }

    /// Assigns to the nearest scope that already binds `name`, falling back
    /// to a local binding — matches Python's implicit-local assignment
    /// semantics for the flat (non-`nonlocal`) functions this language runs.
    pub fn assign(&self, name: &str, value: Value) {
        if self.vars.borrow().contains_key(name) {
            self.vars.borrow_mut().insert(name.to_string(), value);
            return;
        }
        if let Some(p) = &self.parent {
            if p.contains(name) {
                p.assign(name, value);
                return;
            }
        }
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    fn contains(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name) || self.parent.as_ref().map(|p| p.contains(name)).unwrap_or(false)
    }

    /// Hands back this scope's own bindings (not its parent's) as the
    /// boundary representation a Validator inspects. Only meaningful on
    /// the root env, which shares storage with the `ExecutionScope` the
    /// caller already holds.
    pub fn as_scope(&self) -> ExecutionScope {
        ExecutionScope::from_shared(self.vars.clone())
    }
}
