//! Runtime values for the restricted interpreter.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use core_lang::ast::FunctionDef;
use core_vfs::VfsHandle;

#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bool(bool),
    None,
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    Function(Rc<FunctionDef>),
    BoundMethod(Box<Value>, Rc<FunctionDef>),
    Class(Rc<ClassValue>),
    Instance(Rc<RefCell<InstanceValue>>),
    /// A whitelisted module reference (`math`, `random`, ...), produced by
    /// `RestrictedEnvironment::bindings` and consumed only by attribute
    /// lookup (`math.sqrt`) — never iterated or compared.
    Module(&'static str),
    /// `module.function` resolved to a callable, distinct from `Module` so
    /// `math.sqrt` without a call still evaluates to something meaningful.
    ModuleFn(&'static str, &'static str),
    /// A whitelisted free function (`print`, `len`, ...).
    Builtin(&'static str),
    /// A name the restricted environment recognizes but refuses to run —
    /// bound so that calling it raises `SecurityViolation::BlockedOperation`
    /// rather than a plain `NameError`.
    Blocked(&'static str),
    /// The result of a whitelisted `open()` call, dispatched through
    /// `.read()`/`.write()`/`.close()` rather than general attribute
    /// lookup since it wraps no `ClassValue`.
    File(Rc<RefCell<VfsHandle>>),
}

#[derive(Debug)]
pub struct ClassValue {
    pub name: String,
    pub base: Option<Rc<ClassValue>>,
    pub methods: HashMap<String, Rc<FunctionDef>>,
}

impl ClassValue {
    pub fn find_method(&self, name: &str) -> Option<Rc<FunctionDef>> {
        if let Some(m) = self.methods.get(name) {
            return Some(m.clone());
        }
        self.base.as_ref().and_then(|b| b.find_method(name))
    }

    pub fn is_subclass_of(&self, other: &str) -> bool {
        if self.name == other {
            return true;
        }
        self.base.as_ref().map(|b| b.is_subclass_of(other)).unwrap_or(false)
    }
}

#[derive(Debug)]
pub struct InstanceValue {
    pub class: Rc<ClassValue>,
    pub attrs: HashMap<String, Value>,
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(items: Vec<(Value, Value)>) -> Self {
        Value::Dict(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
            Value::None => "NoneType",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Function(_) | Value::BoundMethod(_, _) | Value::Builtin(_) | Value::ModuleFn(_, _) | Value::Blocked(_) => "function",
            Value::Class(_) => "type",
            Value::Instance(_) => "instance",
            Value::Module(_) => "module",
            Value::File(_) => "file",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bool(v) => *v,
            Value::None => false,
            Value::List(l) => !l.borrow().is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Function(_)
            | Value::BoundMethod(_, _)
            | Value::Class(_)
            | Value::Instance(_)
            | Value::Module(_)
            | Value::ModuleFn(_, _)
            | Value::Builtin(_)
            | Value::Blocked(_)
            | Value::File(_) => true,
        }
    }

    /// Structural equality, following Python's `==` for the value shapes the
    /// curriculum actually compares (numbers compare across int/float).
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Bool(a), Value::Int(b)) | (Value::Int(b), Value::Bool(a)) => (*a as i64) == *b,
            (Value::None, Value::None) => true,
            (Value::List(a), Value::List(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(k2, v2)| k.py_eq(k2) && v.py_eq(v2))
                    })
            }
            _ => false,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => format_float(*v),
            Value::Str(s) => s.to_string(),
            Value::Bool(v) => if *v { "True".into() } else { "False".into() },
            Value::None => "None".into(),
            Value::List(l) => {
                let items: Vec<String> = l.borrow().iter().map(|v| v.repr()).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Dict(d) => {
                let items: Vec<String> = d
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", items.join(", "))
            }
            Value::Function(f) => format!("<function {}>", f.name),
            Value::BoundMethod(_, f) => format!("<bound method {}>", f.name),
            Value::Class(c) => format!("<class '{}'>", c.name),
            Value::Instance(i) => format!("<{} object>", i.borrow().class.name),
            Value::Module(m) => format!("<module '{m}'>"),
            Value::ModuleFn(m, f) => format!("<built-in function {m}.{f}>"),
            Value::Builtin(n) | Value::Blocked(n) => format!("<built-in function {n}>"),
            Value::File(h) => format!("<file '{}'>", h.borrow().path()),
        }
    }

    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s),
            other => other.display(),
        }
    }
}

fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}
