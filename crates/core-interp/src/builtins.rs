//! The restricted capability surface: every global name, module and
//! module-function a submission is allowed to reach, plus the set that
//! is deliberately bound to a stub that raises instead of being left
//! absent. Grounded in what `validators.py`'s 37 validators actually
//! call (constructors, `len`/`range`, `math.sqrt`-shaped and
//! `random.randint`-shaped calls) plus §4.2's blocked-name table.

use crate::error::{ExecutionError, SecurityViolation};
use crate::scope::ExecutionScope;
use crate::value::Value;
use core_vfs::Vfs;

const BUILTIN_FUNCTIONS: &[&str] = &[
    "print", "len", "range", "str", "int", "float", "bool", "list", "dict", "abs", "min", "max",
    "sum", "sorted", "enumerate", "zip", "isinstance", "round",
];

const WHITELISTED_MODULES: &[&str] = &["math", "random", "datetime", "json"];
const MATH_FUNCTIONS: &[&str] = &["sqrt", "floor", "ceil", "pow"];
const RANDOM_FUNCTIONS: &[&str] = &["randint"];
const DATETIME_FUNCTIONS: &[&str] = &["now"];
const JSON_FUNCTIONS: &[&str] = &["dumps", "loads"];

pub const BUILTIN_TYPE_NAMES: &[&str] = &["int", "float", "str", "bool", "list", "dict", "type"];

/// Names bound to a stub that always raises `BlockedOperation` — reported,
/// never a silent `NameError`, per §4.2(f).
const BLOCKED_NAMES: &[(&str, &str)] = &[
    ("eval", "dynamic evaluation of arbitrary source is disabled"),
    ("exec", "dynamic execution of arbitrary source is disabled"),
    ("compile", "dynamic compilation of arbitrary source is disabled"),
    ("__import__", "dynamic module loading is disabled, use 'import' with a whitelisted name"),
    ("globals", "introspection of the global namespace is disabled"),
    ("locals", "introspection of the local namespace is disabled"),
    ("vars", "object introspection is disabled"),
    ("getattr", "dynamic attribute access by name is disabled"),
    ("setattr", "dynamic attribute assignment by name is disabled"),
    ("delattr", "dynamic attribute deletion by name is disabled"),
    ("breakpoint", "interactive debugging is disabled"),
    ("exit", "process exit from submitted code is disabled"),
    ("quit", "process exit from submitted code is disabled"),
    ("help", "the interactive help system is unavailable in this sandbox"),
];

const BLOCKED_MODULES: &[(&str, &str)] = &[
    ("os", "host operating-system access is disabled"),
    ("sys", "interpreter/process introspection is disabled"),
    ("subprocess", "spawning processes from submitted code is disabled"),
    ("socket", "network access from submitted code is disabled"),
];

/// Builds the fixed whitelist every submission runs against. `vfs` is
/// `Some` only when the lesson grants file access (`open` is bound);
/// otherwise referencing `open` raises a plain `NameError`, exactly like
/// any other name nobody defined.
pub struct RestrictedEnvironment;

impl RestrictedEnvironment {
    pub fn bindings(vfs: Option<&Vfs>) -> ExecutionScope {
        let mut scope = ExecutionScope::new();
        for name in BUILTIN_FUNCTIONS {
            scope.insert(*name, Value::Builtin(name));
        }
        // Modules are reachable only via an explicit `import`, never
        // pre-bound — §4.2 requires the statement to appear in source.
        for (name, _) in BLOCKED_NAMES {
            scope.insert(*name, Value::Blocked(name));
        }
        if vfs.is_some() {
            scope.insert("open", Value::Builtin("open"));
        }
        scope
    }
}

pub fn resolve_import(module: &str) -> Result<Value, SecurityViolation> {
    if WHITELISTED_MODULES.contains(&module) {
        let leaked: &'static str = WHITELISTED_MODULES.iter().find(|m| **m == module).unwrap();
        return Ok(Value::Module(leaked));
    }
    if let Some((name, explanation)) = BLOCKED_MODULES.iter().find(|(n, _)| *n == module) {
        return Err(SecurityViolation::BlockedOperation {
            name: name.to_string(),
            explanation: explanation.to_string(),
        });
    }
    Err(SecurityViolation::BlockedImport(module.to_string()))
}

pub fn resolve_module_attribute(module: &'static str, attr: &str) -> Result<Value, SecurityViolation> {
    let allowed = match module {
        "math" => MATH_FUNCTIONS,
        "random" => RANDOM_FUNCTIONS,
        "datetime" => DATETIME_FUNCTIONS,
        "json" => JSON_FUNCTIONS,
        _ => &[],
    };
    if allowed.contains(&attr) {
        let leaked: &'static str = allowed.iter().find(|a| **a == attr).unwrap();
        Ok(Value::ModuleFn(module, leaked))
    } else {
        Err(SecurityViolation::DisallowedAttribute(format!("{module}.{attr}")))
    }
}

pub fn blocked_explanation(name: &str) -> &'static str {
    BLOCKED_NAMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, e)| *e)
        .unwrap_or("this operation is disabled in this sandbox")
}

pub fn sentinel_for_type_name(name: &str) -> Option<Value> {
    if BUILTIN_TYPE_NAMES.contains(&name) {
        Some(Value::str(format!("__type_{name}__")))
    } else {
        None
    }
}

/// A minimal splitmix64 generator. The whitelisted `random` module only
/// needs `randint`'s bounded-integer behavior, not cryptographic or
/// statistical quality, so there is no case for an external crate here.
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn seeded(seed: u64) -> Self {
        Self { state: seed.wrapping_add(0x9E3779B97F4A7C15) }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    pub fn randint(&mut self, lo: i64, hi: i64) -> Result<i64, ExecutionError> {
        if lo > hi {
            return Err(ExecutionError::runtime(
                "ValueError",
                format!("randint range start {lo} is greater than stop {hi}"),
            ));
        }
        let span = (hi - lo + 1) as u64;
        Ok(lo + (self.next_u64() % span) as i64)
    }
}

pub fn call_module_function(
    module: &str,
    func: &str,
    args: &[Value],
    rng: &mut Rng,
) -> Result<Value, ExecutionError> {
    match (module, func) {
        ("math", "sqrt") => {
            let x = as_f64(arg(args, 0, "sqrt")?)?;
            if x < 0.0 {
                return Err(ExecutionError::runtime("ValueError", "math domain error"));
            }
            Ok(Value::Float(x.sqrt()))
        }
        ("math", "floor") => Ok(Value::Int(as_f64(arg(args, 0, "floor")?)?.floor() as i64)),
        ("math", "ceil") => Ok(Value::Int(as_f64(arg(args, 0, "ceil")?)?.ceil() as i64)),
        ("math", "pow") => {
            let x = as_f64(arg(args, 0, "pow")?)?;
            let y = as_f64(arg(args, 1, "pow")?)?;
            Ok(Value::Float(x.powf(y)))
        }
        ("random", "randint") => {
            let lo = as_i64(arg(args, 0, "randint")?)?;
            let hi = as_i64(arg(args, 1, "randint")?)?;
            Ok(Value::Int(rng.randint(lo, hi)?))
        }
        ("datetime", "now") => {
            let secs = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            Ok(Value::Int(secs))
        }
        ("json", "dumps") => Ok(Value::str(json::to_json_string(arg(args, 0, "dumps")?))),
        ("json", "loads") => {
            let s = match arg(args, 0, "loads")? {
                Value::Str(s) => s.clone(),
                other => {
                    return Err(ExecutionError::runtime(
                        "TypeError",
                        format!("loads() expected str, got {}", other.type_name()),
                    ))
                }
            };
            json::from_json_str(&s)
        }
        _ => Err(ExecutionError::Security(SecurityViolation::DisallowedAttribute(format!(
            "{module}.{func}"
        )))),
    }
}

fn arg<'a>(args: &'a [Value], idx: usize, fname: &str) -> Result<&'a Value, ExecutionError> {
    args.get(idx)
        .ok_or_else(|| ExecutionError::runtime("TypeError", format!("{fname}() missing required argument")))
}

pub fn call_builtin(name: &str, args: &[Value], output: &mut String) -> Result<Value, ExecutionError> {
    match name {
        "print" => {
            let line = args.iter().map(|v| v.display()).collect::<Vec<_>>().join(" ");
            output.push_str(&line);
            output.push('\n');
            Ok(Value::None)
        }
        "len" => match args.first() {
            Some(Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
            Some(Value::List(l)) => Ok(Value::Int(l.borrow().len() as i64)),
            Some(Value::Dict(d)) => Ok(Value::Int(d.borrow().len() as i64)),
            _ => Err(ExecutionError::runtime("TypeError", "object has no len()")),
        },
        "range" => {
            let (start, stop, step) = match args.len() {
                1 => (0, as_i64(&args[0])?, 1),
                2 => (as_i64(&args[0])?, as_i64(&args[1])?, 1),
                3 => (as_i64(&args[0])?, as_i64(&args[1])?, as_i64(&args[2])?),
                _ => return Err(ExecutionError::runtime("TypeError", "range() takes 1 to 3 arguments")),
            };
            if step == 0 {
                return Err(ExecutionError::runtime("ValueError", "range() arg 3 must not be zero"));
            }
            let mut items = Vec::new();
            let mut i = start;
            if step > 0 {
                while i < stop {
                    items.push(Value::Int(i));
                    i += step;
                }
            } else {
                while i > stop {
                    items.push(Value::Int(i));
                    i += step;
                }
            }
            Ok(Value::list(items))
        }
        "str" => Ok(Value::str(args.first().map(|v| v.display()).unwrap_or_default())),
        "int" => match args.first() {
            Some(Value::Int(v)) => Ok(Value::Int(*v)),
            Some(Value::Float(v)) => Ok(Value::Int(*v as i64)),
            Some(Value::Bool(v)) => Ok(Value::Int(*v as i64)),
            Some(Value::Str(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| ExecutionError::runtime("ValueError", format!("invalid literal for int(): '{s}'"))),
            _ => Err(ExecutionError::runtime("TypeError", "int() requires a number or string")),
        },
        "float" => Ok(Value::Float(as_f64(arg(args, 0, "float")?)?)),
        "bool" => Ok(Value::Bool(args.first().map(|v| v.is_truthy()).unwrap_or(false))),
        "list" => match args.first() {
            None => Ok(Value::list(Vec::new())),
            Some(Value::List(l)) => Ok(Value::list(l.borrow().clone())),
            Some(Value::Str(s)) => Ok(Value::list(s.chars().map(|c| Value::str(c.to_string())).collect())),
            _ => Err(ExecutionError::runtime("TypeError", "list() argument is not iterable")),
        },
        "dict" => Ok(Value::dict(Vec::new())),
        "abs" => match args.first() {
            Some(Value::Int(v)) => Ok(Value::Int(v.abs())),
            Some(Value::Float(v)) => Ok(Value::Float(v.abs())),
            _ => Err(ExecutionError::runtime("TypeError", "bad operand type for abs()")),
        },
        "round" => {
            let v = as_f64(arg(args, 0, "round")?)?;
            match args.get(1) {
                Some(d) => {
                    let digits = as_i64(d)?;
                    let factor = 10f64.powi(digits as i32);
                    Ok(Value::Float((v * factor).round() / factor))
                }
                None => Ok(Value::Int(v.round() as i64)),
            }
        }
        "min" | "max" => {
            let items = numeric_args(args)?;
            if items.is_empty() {
                return Err(ExecutionError::runtime("ValueError", format!("{name}() arg is an empty sequence")));
            }
            let pick = if name == "min" {
                items.iter().cloned().fold(f64::INFINITY, f64::min)
            } else {
                items.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            };
            Ok(if items.iter().all(|v| v.fract() == 0.0) {
                Value::Int(pick as i64)
            } else {
                Value::Float(pick)
            })
        }
        "sum" => {
            let items = numeric_args(args)?;
            let total: f64 = items.iter().sum();
            Ok(if items.iter().all(|v| v.fract() == 0.0) {
                Value::Int(total as i64)
            } else {
                Value::Float(total)
            })
        }
        "sorted" => match args.first() {
            Some(Value::List(l)) => {
                let mut items = l.borrow().clone();
                items.sort_by(|a, b| {
                    as_f64(a)
                        .unwrap_or(0.0)
                        .partial_cmp(&as_f64(b).unwrap_or(0.0))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                Ok(Value::list(items))
            }
            _ => Err(ExecutionError::runtime("TypeError", "sorted() argument must be a list")),
        },
        "enumerate" => match args.first() {
            Some(Value::List(l)) => {
                let items = l
                    .borrow()
                    .iter()
                    .enumerate()
                    .map(|(i, v)| Value::list(vec![Value::Int(i as i64), v.clone()]))
                    .collect();
                Ok(Value::list(items))
            }
            _ => Err(ExecutionError::runtime("TypeError", "enumerate() argument must be a list")),
        },
        "zip" => match (args.first(), args.get(1)) {
            (Some(Value::List(a)), Some(Value::List(b))) => {
                let a = a.borrow();
                let b = b.borrow();
                let items = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| Value::list(vec![x.clone(), y.clone()]))
                    .collect();
                Ok(Value::list(items))
            }
            _ => Err(ExecutionError::runtime("TypeError", "zip() arguments must be lists")),
        },
        "isinstance" => {
            let obj = arg(args, 0, "isinstance")?;
            let ty = arg(args, 1, "isinstance")?;
            Ok(Value::Bool(isinstance(obj, ty)))
        }
        "open" => Err(ExecutionError::runtime(
            "TypeError",
            "open() must be dispatched through the VFS-aware interpreter path",
        )),
        _ => Err(SecurityViolation::DisallowedName(name.to_string()).into()),
    }
}

fn isinstance(obj: &Value, ty: &Value) -> bool {
    if let Value::Str(marker) = ty {
        let m = marker.as_ref();
        return match m {
            "__type_int__" => matches!(obj, Value::Int(_) | Value::Bool(_)),
            "__type_float__" => matches!(obj, Value::Float(_)),
            "__type_str__" => matches!(obj, Value::Str(_)),
            "__type_bool__" => matches!(obj, Value::Bool(_)),
            "__type_list__" => matches!(obj, Value::List(_)),
            "__type_dict__" => matches!(obj, Value::Dict(_)),
            "__type_type__" => matches!(obj, Value::Class(_)),
            _ => false,
        };
    }
    if let Value::Class(class) = ty {
        if let Value::Instance(inst) = obj {
            return inst.borrow().class.is_subclass_of(&class.name);
        }
    }
    false
}

fn numeric_args(args: &[Value]) -> Result<Vec<f64>, ExecutionError> {
    let source: Vec<Value> = if args.len() == 1 {
        match &args[0] {
            Value::List(l) => l.borrow().clone(),
            other => vec![other.clone()],
        }
    } else {
        args.to_vec()
    };
    source.iter().map(as_f64).collect()
}

pub fn as_f64(v: &Value) -> Result<f64, ExecutionError> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ExecutionError::runtime("ValueError", format!("could not convert string to float: '{s}'"))),
        other => Err(ExecutionError::runtime(
            "TypeError",
            format!("expected a number, found {}", other.type_name()),
        )),
    }
}

pub fn as_i64(v: &Value) -> Result<i64, ExecutionError> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(*b as i64),
        Value::Float(f) => Ok(*f as i64),
        other => Err(ExecutionError::runtime(
            "TypeError",
            format!("expected an integer, found {}", other.type_name()),
        )),
    }
}

fn expect_str<'a>(v: &'a Value, fname: &str) -> Result<&'a str, ExecutionError> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(ExecutionError::runtime(
            "TypeError",
            format!("{fname}() expected a string argument, found {}", other.type_name()),
        )),
    }
}

/// String methods the curriculum's validators call on `str` values. Covers
/// the subset `original_source/validators.py` actually exercises, not the
/// whole Python `str` surface.
pub fn call_str_method(s: &std::rc::Rc<str>, name: &str, args: &[Value]) -> Result<Value, ExecutionError> {
    match name {
        "upper" => Ok(Value::str(s.to_uppercase())),
        "lower" => Ok(Value::str(s.to_lowercase())),
        "strip" => Ok(Value::str(s.trim().to_string())),
        "lstrip" => Ok(Value::str(s.trim_start().to_string())),
        "rstrip" => Ok(Value::str(s.trim_end().to_string())),
        "title" => Ok(Value::str(title_case(s))),
        "capitalize" => Ok(Value::str(capitalize(s))),
        "split" => {
            let parts: Vec<Value> = match args.first() {
                Some(sep) => s.split(expect_str(sep, "split")?).map(Value::str).collect(),
                None => s.split_whitespace().map(Value::str).collect(),
            };
            Ok(Value::list(parts))
        }
        "join" => match args.first() {
            Some(Value::List(items)) => {
                let parts: Vec<String> = items.borrow().iter().map(|v| v.display()).collect();
                Ok(Value::str(parts.join(s)))
            }
            _ => Err(ExecutionError::runtime("TypeError", "join() requires a list of strings")),
        },
        "replace" => {
            let from = expect_str(arg(args, 0, "replace")?, "replace")?;
            let to = expect_str(arg(args, 1, "replace")?, "replace")?;
            Ok(Value::str(s.replace(from, to)))
        }
        "startswith" => Ok(Value::Bool(s.starts_with(expect_str(arg(args, 0, "startswith")?, "startswith")?))),
        "endswith" => Ok(Value::Bool(s.ends_with(expect_str(arg(args, 0, "endswith")?, "endswith")?))),
        "find" => {
            let needle = expect_str(arg(args, 0, "find")?, "find")?;
            Ok(Value::Int(s.find(needle).map(|i| i as i64).unwrap_or(-1)))
        }
        "index" => {
            let needle = expect_str(arg(args, 0, "index")?, "index")?;
            s.find(needle)
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| ExecutionError::runtime("ValueError", "substring not found"))
        }
        "count" => {
            let needle = expect_str(arg(args, 0, "count")?, "count")?;
            if needle.is_empty() {
                Ok(Value::Int(0))
            } else {
                Ok(Value::Int(s.matches(needle).count() as i64))
            }
        }
        "format" => {
            let mut out = String::new();
            let mut slot = 0usize;
            let mut chars = s.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '{' && chars.peek() == Some(&'}') {
                    chars.next();
                    if let Some(v) = args.get(slot) {
                        out.push_str(&v.display());
                    }
                    slot += 1;
                } else {
                    out.push(c);
                }
            }
            Ok(Value::str(out))
        }
        "isdigit" => Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))),
        "isalpha" => Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_alphabetic()))),
        other => Err(ExecutionError::runtime(
            "AttributeError",
            format!("'str' object has no attribute '{other}'"),
        )),
    }
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// List methods the curriculum exercises: in-place mutation goes straight
/// through the shared `RefCell`, matching how `Value::List` is already
/// threaded through assignment targets and for-loops.
pub fn call_list_method(
    l: &std::rc::Rc<std::cell::RefCell<Vec<Value>>>,
    name: &str,
    args: &[Value],
) -> Result<Value, ExecutionError> {
    match name {
        "append" => {
            l.borrow_mut().push(arg(args, 0, "append")?.clone());
            Ok(Value::None)
        }
        "extend" => {
            let extra = match arg(args, 0, "extend")? {
                Value::List(other) => other.borrow().clone(),
                _ => return Err(ExecutionError::runtime("TypeError", "extend() requires an iterable")),
            };
            l.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            let idx = as_i64(arg(args, 0, "insert")?)? as usize;
            let value = arg(args, 1, "insert")?.clone();
            let mut items = l.borrow_mut();
            let idx = idx.min(items.len());
            items.insert(idx, value);
            Ok(Value::None)
        }
        "pop" => {
            let mut items = l.borrow_mut();
            if items.is_empty() {
                return Err(ExecutionError::runtime("IndexError", "pop from empty list"));
            }
            let idx = match args.first() {
                Some(v) => {
                    let raw = as_i64(v)?;
                    let raw = if raw < 0 { raw + items.len() as i64 } else { raw };
                    if raw < 0 || raw as usize >= items.len() {
                        return Err(ExecutionError::runtime("IndexError", "pop index out of range"));
                    }
                    raw as usize
                }
                None => items.len() - 1,
            };
            Ok(items.remove(idx))
        }
        "remove" => {
            let target = arg(args, 0, "remove")?;
            let mut items = l.borrow_mut();
            match items.iter().position(|v| v.py_eq(target)) {
                Some(idx) => {
                    items.remove(idx);
                    Ok(Value::None)
                }
                None => Err(ExecutionError::runtime("ValueError", "list.remove(x): x not in list")),
            }
        }
        "index" => {
            let target = arg(args, 0, "index")?;
            l.borrow()
                .iter()
                .position(|v| v.py_eq(target))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| ExecutionError::runtime("ValueError", "value not in list"))
        }
        "count" => {
            let target = arg(args, 0, "count")?;
            Ok(Value::Int(l.borrow().iter().filter(|v| v.py_eq(target)).count() as i64))
        }
        "sort" => {
            l.borrow_mut().sort_by(|a, b| {
                as_f64(a)
                    .unwrap_or(0.0)
                    .partial_cmp(&as_f64(b).unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(Value::None)
        }
        "reverse" => {
            l.borrow_mut().reverse();
            Ok(Value::None)
        }
        "copy" => Ok(Value::list(l.borrow().clone())),
        "clear" => {
            l.borrow_mut().clear();
            Ok(Value::None)
        }
        other => Err(ExecutionError::runtime(
            "AttributeError",
            format!("'list' object has no attribute '{other}'"),
        )),
    }
}

/// Dict methods. Backing storage is an insertion-ordered `Vec<(Value,
/// Value)>` rather than a hash map (§4.2's value model), so lookups are
/// linear — acceptable at curriculum-submission scale.
pub fn call_dict_method(
    d: &std::rc::Rc<std::cell::RefCell<Vec<(Value, Value)>>>,
    name: &str,
    args: &[Value],
) -> Result<Value, ExecutionError> {
    match name {
        "get" => {
            let key = arg(args, 0, "get")?;
            let found = d.borrow().iter().find(|(k, _)| k.py_eq(key)).map(|(_, v)| v.clone());
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => Ok(Value::list(d.borrow().iter().map(|(k, _)| k.clone()).collect())),
        "values" => Ok(Value::list(d.borrow().iter().map(|(_, v)| v.clone()).collect())),
        "items" => Ok(Value::list(
            d.borrow()
                .iter()
                .map(|(k, v)| Value::list(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        "pop" => {
            let key = arg(args, 0, "pop")?;
            let mut items = d.borrow_mut();
            match items.iter().position(|(k, _)| k.py_eq(key)) {
                Some(idx) => Ok(items.remove(idx).1),
                None => match args.get(1) {
                    Some(default) => Ok(default.clone()),
                    None => Err(ExecutionError::runtime("KeyError", key.repr())),
                },
            }
        }
        "update" => {
            let other = match arg(args, 0, "update")? {
                Value::Dict(other) => other.borrow().clone(),
                _ => return Err(ExecutionError::runtime("TypeError", "update() requires a dict")),
            };
            let mut items = d.borrow_mut();
            for (k, v) in other {
                if let Some(slot) = items.iter_mut().find(|(existing, _)| existing.py_eq(&k)) {
                    slot.1 = v;
                } else {
                    items.push((k, v));
                }
            }
            Ok(Value::None)
        }
        "setdefault" => {
            let key = arg(args, 0, "setdefault")?;
            let default = args.get(1).cloned().unwrap_or(Value::None);
            let mut items = d.borrow_mut();
            if let Some((_, v)) = items.iter().find(|(k, _)| k.py_eq(key)) {
                Ok(v.clone())
            } else {
                items.push((key.clone(), default.clone()));
                Ok(default)
            }
        }
        other => Err(ExecutionError::runtime(
            "AttributeError",
            format!("'dict' object has no attribute '{other}'"),
        )),
    }
}

/// Conversion to/from a tiny JSON text form for the whitelisted `json`
/// module. Deliberately hand-rolled rather than pulled in via `serde_json`
/// here: the values crossing this boundary are already our own `Value`
/// tree, not a type with a `Deserialize` impl, so a generic serde pass
/// would buy nothing over a direct recursive writer/reader.
mod json {
    use crate::error::ExecutionError;
    use crate::value::Value;

    pub fn to_json_string(v: &Value) -> String {
        let mut out = String::new();
        write_value(v, &mut out);
        out
    }

    fn write_value(v: &Value, out: &mut String) {
        match v {
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&f.to_string()),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::None => out.push_str("null"),
            Value::Str(s) => {
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            Value::List(l) => {
                out.push('[');
                for (i, item) in l.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_value(item, out);
                }
                out.push(']');
            }
            Value::Dict(d) => {
                out.push('{');
                for (i, (k, val)) in d.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_value(&Value::str(k.display()), out);
                    out.push(':');
                    write_value(val, out);
                }
                out.push('}');
            }
            other => write_value(&Value::str(other.display()), out),
        }
    }

    pub fn from_json_str(s: &str) -> Result<Value, ExecutionError> {
        let mut chars = s.trim().chars().peekable();
        let v = parse_value(&mut chars)?;
        Ok(v)
    }

    fn skip_ws(chars: &mut std::iter::Peekable<std::str::Chars>) {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
    }

    fn parse_value(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<Value, ExecutionError> {
        skip_ws(chars);
        match chars.peek() {
            Some('"') => parse_string(chars),
            Some('[') => parse_array(chars),
            Some('{') => parse_object(chars),
            Some('t') => {
                consume_literal(chars, "true")?;
                Ok(Value::Bool(true))
            }
            Some('f') => {
                consume_literal(chars, "false")?;
                Ok(Value::Bool(false))
            }
            Some('n') => {
                consume_literal(chars, "null")?;
                Ok(Value::None)
            }
            Some(_) => parse_number(chars),
            None => Err(ExecutionError::runtime("ValueError", "unexpected end of JSON input")),
        }
    }

    fn consume_literal(chars: &mut std::iter::Peekable<std::str::Chars>, lit: &str) -> Result<(), ExecutionError> {
        for expected in lit.chars() {
            match chars.next() {
                Some(c) if c == expected => {}
                _ => return Err(ExecutionError::runtime("ValueError", format!("expected '{lit}'"))),
            }
        }
        Ok(())
    }

    fn parse_string(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<Value, ExecutionError> {
        chars.next(); // opening quote
        let mut s = String::new();
        loop {
            match chars.next() {
                Some('"') => break,
                Some('\\') => match chars.next() {
                    Some('n') => s.push('\n'),
                    Some('"') => s.push('"'),
                    Some('\\') => s.push('\\'),
                    Some(other) => s.push(other),
                    None => return Err(ExecutionError::runtime("ValueError", "unterminated escape in JSON string")),
                },
                Some(c) => s.push(c),
                None => return Err(ExecutionError::runtime("ValueError", "unterminated JSON string")),
            }
        }
        Ok(Value::str(s))
    }

    fn parse_number(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<Value, ExecutionError> {
        let mut s = String::new();
        let mut is_float = false;
        while matches!(chars.peek(), Some(c) if c.is_ascii_digit() || *c == '-' || *c == '+' || { if *c == '.' || *c == 'e' || *c == 'E' { is_float = true; true } else { false } }) {
            s.push(chars.next().unwrap());
        }
        if is_float {
            s.parse::<f64>().map(Value::Float).map_err(|_| ExecutionError::runtime("ValueError", "invalid JSON number"))
        } else {
            s.parse::<i64>().map(Value::Int).map_err(|_| ExecutionError::runtime("ValueError", "invalid JSON number"))
        }
    }

    fn parse_array(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<Value, ExecutionError> {
        chars.next(); // '['
        let mut items = Vec::new();
        skip_ws(chars);
        if chars.peek() == Some(&']') {
            chars.next();
            return Ok(Value::list(items));
        }
        loop {
            items.push(parse_value(chars)?);
            skip_ws(chars);
            match chars.next() {
                Some(',') => continue,
                Some(']') => break,
                _ => return Err(ExecutionError::runtime("ValueError", "malformed JSON array")),
            }
        }
        Ok(Value::list(items))
    }

    fn parse_object(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<Value, ExecutionError> {
        chars.next(); // '{'
        let mut items = Vec::new();
        skip_ws(chars);
        if chars.peek() == Some(&'}') {
            chars.next();
            return Ok(Value::dict(items));
        }
        loop {
            skip_ws(chars);
            let key = parse_string(chars)?;
            skip_ws(chars);
            if chars.next() != Some(':') {
                return Err(ExecutionError::runtime("ValueError", "expected ':' in JSON object"));
            }
            let value = parse_value(chars)?;
            items.push((key, value));
            skip_ws(chars);
            match chars.next() {
                Some(',') => continue,
                Some('}') => break,
                _ => return Err(ExecutionError::runtime("ValueError", "malformed JSON object")),
            }
        }
        Ok(Value::dict(items))
    }
}
