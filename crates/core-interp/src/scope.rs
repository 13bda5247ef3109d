//! The boundary representation of a completed (or in-progress) execution's
//! namespace — what a Validator receives to inspect via a stable
//! `scope.get(name)` contract (§3), independent of the lexical scope chain
//! the evaluator uses internally while running.
//!
//! Backed by the same `Rc<RefCell<..>>` the evaluator's global `Env`
//! shares, so mutations a program makes to its own globals are visible
//! through the same handle the caller passed into `Interpreter::exec`
//! without any copy-back step.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct ExecutionScope(Rc<RefCell<HashMap<String, Value>>>);

impl ExecutionScope {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(HashMap::new())))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.borrow().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub(crate) fn share(&self) -> Rc<RefCell<HashMap<String, Value>>> {
        self.0.clone()
    }

    pub(crate) fn from_shared(shared: Rc<RefCell<HashMap<String, Value>>>) -> Self {
        Self(shared)
    }
}
