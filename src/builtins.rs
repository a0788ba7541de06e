//! Standard bindings: the native procedures and port singletons every
//! freshly-constructed [`Context`] installs into its top environment. All
//! of them share a single [`expect_args`] matcher, since the pattern
//! ("these positional type codes, else `bad-argument-count`/
//! `bad-argument-type`") is identical across every one of them.

use crate::context::Context;
use crate::error::{param, CanonicalError, NativeOutcome};
use crate::heap::{HeapData, PortData, Value};
use crate::vm;

/// One positional type code (`p n b s q w o c l .`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCode {
    Pair,
    Number,
    Boolean,
    Symbol,
    Callable,
    Code,
    Port,
    Char,
    List,
    Any,
}

fn type_param(code: TypeCode) -> &'static str {
    match code {
        TypeCode::Pair => param::EXPECTING_PAIR,
        TypeCode::Number => param::EXPECTING_NUMBER,
        TypeCode::Boolean => param::EXPECTING_BOOLEAN,
        TypeCode::Symbol => param::EXPECTING_SYMBOL,
        TypeCode::Callable => param::EXPECTING_PROCEDURE,
        TypeCode::Code => param::EXPECTING_CODE,
        TypeCode::Port => param::EXPECTING_PORT,
        TypeCode::Char => param::EXPECTING_CHAR,
        TypeCode::List => param::EXPECTING_LIST,
        TypeCode::Any => unreachable!("Any never needs a type-error param"),
    }
}

fn is_proper_list(ctx: &Context, mut v: Value) -> bool {
    loop {
        match ctx.heap_ref().get(v) {
            HeapData::Nil => return true,
            HeapData::Pair(_, cdr) => v = *cdr,
            _ => return false,
        }
    }
}

fn matches_code(ctx: &Context, code: TypeCode, v: Value) -> bool {
    match code {
        TypeCode::Any => true,
        TypeCode::Pair => matches!(ctx.heap_ref().get(v), HeapData::Pair(..)),
        TypeCode::Number => matches!(ctx.heap_ref().get(v), HeapData::Number(_)),
        TypeCode::Boolean => matches!(ctx.heap_ref().get(v), HeapData::Boolean(_)),
        TypeCode::Symbol => matches!(ctx.heap_ref().get(v), HeapData::Symbol(_)),
        TypeCode::Callable => matches!(
            ctx.heap_ref().get(v),
            HeapData::Closure(..) | HeapData::Procedure(_) | HeapData::Continuation(_)
        ),
        TypeCode::Code => matches!(ctx.heap_ref().get(v), HeapData::Code(_)),
        TypeCode::Port => matches!(ctx.heap_ref().get(v), HeapData::Port(_)),
        TypeCode::Char => matches!(ctx.heap_ref().get(v), HeapData::Char(_)),
        TypeCode::List => is_proper_list(ctx, v),
    }
}

fn raise_arity(ctx: &mut Context, which: &'static str) -> NativeOutcome {
    let symbol = ctx.sym(CanonicalError::BadArgumentCount.into());
    let param = ctx.sym(which);
    NativeOutcome::Raise { symbol, param }
}

fn raise_type(ctx: &mut Context, code: TypeCode) -> NativeOutcome {
    let symbol = ctx.sym(CanonicalError::BadArgumentType.into());
    let param = ctx.sym(type_param(code));
    NativeOutcome::Raise { symbol, param }
}

/// Walks `args` against `pattern` positionally, collecting the argument
/// values. Too few arguments, too many, or a positional type mismatch all
/// short-circuit with the matching error.
fn expect_args(ctx: &mut Context, args: Value, pattern: &[TypeCode]) -> Result<Vec<Value>, NativeOutcome> {
    let mut out = Vec::with_capacity(pattern.len());
    let mut cursor = args;
    for &code in pattern {
        let (car, cdr) = match ctx.heap_ref().get(cursor) {
            HeapData::Pair(car, cdr) => (*car, *cdr),
            _ => return Err(raise_arity(ctx, param::TOO_FEW)),
        };
        if !matches_code(ctx, code, car) {
            return Err(raise_type(ctx, code));
        }
        out.push(car);
        cursor = cdr;
    }
    if !matches!(ctx.heap_ref().get(cursor), HeapData::Nil) {
        return Err(raise_arity(ctx, param::TOO_MANY));
    }
    Ok(out)
}

fn number_of(ctx: &Context, v: Value) -> f64 {
    match ctx.heap_ref().get(v) {
        HeapData::Number(n) => *n,
        _ => unreachable!("expect_args already checked this argument is a number"),
    }
}

/// Registers every standard binding plus the three standard ports. Called
/// once, from [`Context::new`].
pub(crate) fn install(ctx: &mut Context) {
    install_pairs(ctx);
    install_arithmetic(ctx);
    install_relational(ctx);
    install_predicates(ctx);
    install_control(ctx);
    install_ports(ctx);
}

fn install_pairs(ctx: &mut Context) {
    ctx.register_procedure("cons", |ctx, args| match expect_args(ctx, args, &[TypeCode::Any, TypeCode::Any]) {
        Ok(v) => NativeOutcome::Value(ctx.make_pair(v[0], v[1])),
        Err(e) => e,
    });

    ctx.register_procedure("car", |ctx, args| match expect_args(ctx, args, &[TypeCode::Pair]) {
        Ok(v) => match ctx.heap_ref().get(v[0]) {
            HeapData::Pair(car, _) => NativeOutcome::Value(*car),
            _ => unreachable!(),
        },
        Err(e) => e,
    });

    ctx.register_procedure("cdr", |ctx, args| match expect_args(ctx, args, &[TypeCode::Pair]) {
        Ok(v) => match ctx.heap_ref().get(v[0]) {
            HeapData::Pair(_, cdr) => NativeOutcome::Value(*cdr),
            _ => unreachable!(),
        },
        Err(e) => e,
    });

    ctx.register_procedure("set-car!", |ctx, args| {
        match expect_args(ctx, args, &[TypeCode::Pair, TypeCode::Any]) {
            Ok(v) => {
                let HeapData::Pair(car, _) = ctx.heap_mut().get_mut(v[0]) else { unreachable!() };
                *car = v[1];
                NativeOutcome::Value(ctx.nil())
            }
            Err(e) => e,
        }
    });

    ctx.register_procedure("set-cdr!", |ctx, args| {
        match expect_args(ctx, args, &[TypeCode::Pair, TypeCode::Any]) {
            Ok(v) => {
                let HeapData::Pair(_, cdr) = ctx.heap_mut().get_mut(v[0]) else { unreachable!() };
                *cdr = v[1];
                NativeOutcome::Value(ctx.nil())
            }
            Err(e) => e,
        }
    });
}

/// Each binary arithmetic primitive is two-arity; variadic `+`/`-`/`*`/`/`
/// are left to be defined in terms of these from Scheme source, not
/// reimplemented here.
fn install_arithmetic(ctx: &mut Context) {
    macro_rules! binop {
        ($name:expr, $op:expr) => {
            ctx.register_procedure($name, |ctx, args| {
                match expect_args(ctx, args, &[TypeCode::Number, TypeCode::Number]) {
                    Ok(v) => {
                        let (a, b) = (number_of(ctx, v[0]), number_of(ctx, v[1]));
                        NativeOutcome::Value(ctx.make_number($op(a, b)))
                    }
                    Err(e) => e,
                }
            });
        };
    }
    binop!("add2", |a, b| a + b);
    binop!("sub2", |a: f64, b: f64| a - b);
    binop!("mul2", |a, b| a * b);
    binop!("div2", |a: f64, b: f64| a / b);
}

fn install_relational(ctx: &mut Context) {
    macro_rules! relop {
        ($name:expr, $op:expr) => {
            ctx.register_procedure($name, |ctx, args| {
                match expect_args(ctx, args, &[TypeCode::Number, TypeCode::Number]) {
                    Ok(v) => {
                        let (a, b) = (number_of(ctx, v[0]), number_of(ctx, v[1]));
                        NativeOutcome::Value(ctx.make_boolean($op(a, b)))
                    }
                    Err(e) => e,
                }
            });
        };
    }
    relop!("<", |a: f64, b: f64| a < b);
    relop!(">", |a: f64, b: f64| a > b);
    relop!("<=", |a: f64, b: f64| a <= b);
    relop!(">=", |a: f64, b: f64| a >= b);
    relop!("=", |a: f64, b: f64| a == b);
}

fn install_predicates(ctx: &mut Context) {
    ctx.register_procedure("eq?", |ctx, args| match expect_args(ctx, args, &[TypeCode::Any, TypeCode::Any]) {
        Ok(v) => NativeOutcome::Value(ctx.make_boolean(v[0] == v[1])),
        Err(e) => e,
    });

    macro_rules! type_predicate {
        ($name:expr, $code:expr) => {
            ctx.register_procedure($name, |ctx, args| match expect_args(ctx, args, &[TypeCode::Any]) {
                Ok(v) => NativeOutcome::Value(ctx.make_boolean(matches_code(ctx, $code, v[0]))),
                Err(e) => e,
            });
        };
    }
    type_predicate!("pair?", TypeCode::Pair);
    type_predicate!("boolean?", TypeCode::Boolean);
    type_predicate!("number?", TypeCode::Number);
    type_predicate!("symbol?", TypeCode::Symbol);
    type_predicate!("port?", TypeCode::Port);

    ctx.register_procedure("null?", |ctx, args| match expect_args(ctx, args, &[TypeCode::Any]) {
        Ok(v) => NativeOutcome::Value(ctx.make_boolean(matches!(ctx.heap_ref().get(v[0]), HeapData::Nil))),
        Err(e) => e,
    });
}

fn install_control(ctx: &mut Context) {
    ctx.register_procedure("assert", |ctx, args| match expect_args(ctx, args, &[TypeCode::Any]) {
        Ok(v) if v[0] == ctx.false_value() => {
            let symbol = ctx.sym("assertion-failed");
            let nil = ctx.nil();
            NativeOutcome::Raise { symbol, param: nil }
        }
        Ok(v) => NativeOutcome::Value(v[0]),
        Err(e) => e,
    });

    // `(error symbol-naming-the-failure param)`: the symbol is whatever the
    // caller passes, not one of the closed `CanonicalError` kinds — any
    // symbol a user program names is a valid error symbol here.
    ctx.register_procedure("error", |ctx, args| {
        match expect_args(ctx, args, &[TypeCode::Symbol, TypeCode::Any]) {
            Ok(v) => NativeOutcome::Raise { symbol: v[0], param: v[1] },
            Err(e) => e,
        }
    });

    // `(apply proc args-list)`. Re-entrant: the result is pushed by the
    // closure frame this sets up, not by this procedure itself, so it
    // reports `NoValue` ("therefore return OMITTED").
    ctx.register_procedure("apply", |ctx, args| {
        match expect_args(ctx, args, &[TypeCode::Callable, TypeCode::List]) {
            Ok(v) => {
                ctx.apply(v[0], v[1]);
                NativeOutcome::NoValue
            }
            Err(e) => e,
        }
    });

    // `(call-with-current-continuation proc)`: captures the continuation
    // currently stepping and invokes `proc` with it as the sole argument.
    // Also `NoValue` for the same re-entrant reason as `apply`.
    ctx.register_procedure("call-with-current-continuation", |ctx, args| {
        match expect_args(ctx, args, &[TypeCode::Callable]) {
            Ok(v) => {
                let cont = ctx.current_continuation();
                let captured = vm::capture_continuation(ctx, cont);
                let nil = ctx.nil();
                let call_args = ctx.make_pair(captured, nil);
                ctx.apply(v[0], call_args);
                NativeOutcome::NoValue
            }
            Err(e) => e,
        }
    });
}

fn install_ports(ctx: &mut Context) {
    ctx.register_procedure("write-char", |ctx, args| {
        match expect_args(ctx, args, &[TypeCode::Port, TypeCode::Char]) {
            Ok(v) => {
                let code = match ctx.heap_ref().get(v[1]) {
                    HeapData::Char(c) => *c,
                    _ => unreachable!(),
                };
                let HeapData::Port(port) = ctx.heap_ref().get(v[0]) else { unreachable!() };
                if port.mode() & PortData::WRITE == 0 {
                    return raise_type(ctx, TypeCode::Port);
                }
                let HeapData::Port(port) = ctx.heap_mut().get_mut(v[0]) else { unreachable!() };
                port.write_byte(code as u8);
                NativeOutcome::Value(ctx.nil())
            }
            Err(e) => e,
        }
    });

    let stdin = ctx.make_port(PortData::Stdin);
    let stdout = ctx.make_port(PortData::Stdout);
    let stderr = ctx.make_port(PortData::Stderr);
    ctx.define_global("stdin-port", stdin);
    ctx.define_global("stdout-port", stdout);
    ctx.define_global("stderr-port", stderr);
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::heap::{HeapData, Value};

    fn run(ctx: &mut Context, src: &str) -> Value {
        ctx.execute(src, "<test>").expect("program should not fault")
    }

    #[test]
    fn add2_adds_two_numbers() {
        let mut ctx = Context::new();
        let result = run(&mut ctx, "(add2 1 2)");
        assert!(matches!(ctx.heap_ref().get(result), HeapData::Number(n) if *n == 3.0));
    }

    #[test]
    fn car_of_empty_list_is_bad_argument_type() {
        let mut ctx = Context::new();
        assert!(ctx.execute("(car '())", "<test>").is_none());
        let err = ctx.pending_error().unwrap();
        assert_eq!(ctx.heap_ref().get(err.symbol).variant_name(), "symbol");
    }

    #[test]
    fn cons_car_cdr_round_trip() {
        let mut ctx = Context::new();
        let result = run(&mut ctx, "(car (cons 1 2))");
        assert!(matches!(ctx.heap_ref().get(result), HeapData::Number(n) if *n == 1.0));
    }

    #[test]
    fn set_car_mutates_in_place() {
        let mut ctx = Context::new();
        let result = run(&mut ctx, "(define p (cons 1 2)) (set-car! p 9) (car p)");
        assert!(matches!(ctx.heap_ref().get(result), HeapData::Number(n) if *n == 9.0));
    }

    #[test]
    fn write_char_appends_to_a_buffer_port() {
        let mut ctx = Context::new();
        let port = ctx.make_buffer_port();
        ctx.define_global("out", port);
        run(&mut ctx, "(write-char out #\\a)");
        assert_eq!(ctx.port_buffer_contents(port), Some("a"));
    }

    #[test]
    fn write_char_to_stdin_port_is_bad_argument_type() {
        let mut ctx = Context::new();
        assert!(ctx.execute("(write-char stdin-port #\\a)", "<test>").is_none());
        let err = ctx.pending_error().unwrap();
        assert_eq!(ctx.symbol_name(err.symbol), Some("bad-argument-type"));
    }
}
