//! Restricted tree-walking interpreter for the teaching language parsed by
//! `core-lang`. Evaluates a [`core_lang::ast::Program`] against a whitelisted
//! capability surface ([`builtins::RestrictedEnvironment`]), ticking a
//! [`core_guardian::ExecutionHooks`] session on every statement and call so
//! resource limits are enforced without this crate knowing how they're
//! implemented.

mod builtins;
mod env;
mod error;
mod interpreter;
mod scope;
mod value;

pub use builtins::{RestrictedEnvironment, Rng};
pub use error::{ExecutionError, SecurityViolation};
pub use interpreter::{CapturedStdout, Interpreter};
pub use scope::ExecutionScope;
pub use value::{ClassValue, InstanceValue, Value};

#[cfg(test)]
mod tests {
    use super::*;
    use core_guardian::{ExecutionHooks, GuardianError};
    use core_lang::compile;
    use core_vfs::Vfs;

    /// A no-op hook set for tests that don't care about resource policy.
    struct NullHooks;
    impl ExecutionHooks for NullHooks {
        fn on_operation(&mut self) -> Result<(), GuardianError> {
            Ok(())
        }
        fn on_call_depth(&mut self, _depth: u32) -> Result<(), GuardianError> {
            Ok(())
        }
    }

    fn run(src: &str) -> Result<(String, ExecutionScope), ExecutionError> {
        let program = compile(src).expect("source should parse");
        let scope = RestrictedEnvironment::bindings(None);
        let mut hooks = NullHooks;
        let out = Interpreter::exec(&program, &scope, &mut hooks, None)?;
        Ok((out, scope))
    }

    #[test]
    fn prints_and_captures_stdout() {
        let (out, _) = run("print('hello', 1 + 2)").unwrap();
        assert_eq!(out, "hello 3\n");
    }

    #[test]
    fn assigns_are_visible_through_the_caller_scope() {
        let (_, scope) = run("x = 5\ny = x * 2").unwrap();
        assert!(matches!(scope.get("x"), Some(Value::Int(5))));
        assert!(matches!(scope.get("y"), Some(Value::Int(10))));
    }

    #[test]
    fn function_recursion_and_return_work() {
        let (_, scope) = run(
            "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\nresult = fact(5)\n",
        )
        .unwrap();
        assert!(matches!(scope.get("result"), Some(Value::Int(120))));
    }

    #[test]
    fn percent_equals_applies_modulo_not_division() {
        let (_, scope) = run("x = 10\nx %= 3\n").unwrap();
        assert!(matches!(scope.get("x"), Some(Value::Int(1))));
    }

    #[test]
    fn for_loop_accumulates_over_a_list() {
        let (_, scope) = run("total = 0\nfor n in [1, 2, 3, 4]:\n    total += n\n").unwrap();
        assert!(matches!(scope.get("total"), Some(Value::Int(10))));
    }

    #[test]
    fn name_error_reports_the_bare_name() {
        let err = run("print(unbound)").unwrap_err();
        assert_eq!(err.exc_type(), "NameError");
    }

    #[test]
    fn blocked_call_is_a_security_violation_not_a_name_error() {
        let err = run("eval('1+1')").unwrap_err();
        assert!(matches!(err, ExecutionError::Security(SecurityViolation::BlockedOperation { .. })));
    }

    #[test]
    fn unwhitelisted_import_is_rejected() {
        let err = run("import os").unwrap_err();
        assert!(matches!(err, ExecutionError::Security(SecurityViolation::BlockedOperation { .. })));
    }

    #[test]
    fn try_except_catches_a_runtime_error_by_name() {
        let (_, scope) = run(
            "result = 'unset'\ntry:\n    x = 1 / 0\nexcept ZeroDivisionError as e:\n    result = 'caught'\n",
        )
        .unwrap();
        assert!(matches!(scope.get("result"), Some(Value::Str(s)) if &*s == "caught"));
    }

    #[test]
    fn classes_support_init_and_methods() {
        let (_, scope) = run(
            "class Counter:\n    def __init__(self):\n        self.n = 0\n    def bump(self):\n        self.n += 1\n        return self.n\nc = Counter()\nc.bump()\nresult = c.bump()\n",
        )
        .unwrap();
        assert!(matches!(scope.get("result"), Some(Value::Int(2))));
    }

    #[test]
    fn file_handle_round_trips_through_the_vfs() {
        let vfs = Vfs::new();
        let program = compile("f = open('out.txt', 'w')\nf.write('hi')\nf.close()\n").unwrap();
        let scope = RestrictedEnvironment::bindings(Some(&vfs));
        let mut hooks = NullHooks;
        Interpreter::exec(&program, &scope, &mut hooks, Some(vfs.clone())).unwrap();
        assert!(vfs.exists("out.txt"));
    }

    #[test]
    fn list_comprehension_filters_and_maps() {
        let (_, scope) =
            run("squares = [n * n for n in range(5) if n % 2 == 0]").unwrap();
        match scope.get("squares") {
            Some(Value::List(items)) => {
                let items = items.borrow();
                assert_eq!(items.len(), 3);
                assert!(matches!(items[0], Value::Int(0)));
                assert!(matches!(items[1], Value::Int(4)));
                assert!(matches!(items[2], Value::Int(16)));
            }
            other => panic!("expected a list, got {other:?}"),
        }
    }

    #[test]
    fn suppressing_a_user_defined_exception_subclass() {
        let (_, scope) = run(
            "class TooSmall(ValueError):\n    pass\ndef check(n):\n    if n < 0:\n        raise TooSmall('negative')\n    return n\nresult = 'unset'\ntry:\n    check(-1)\nexcept ValueError:\n    result = 'handled'\n",
        )
        .unwrap();
        assert!(matches!(scope.get("result"), Some(Value::Str(s)) if &*s == "handled"));
    }
}
