//! A handful of worked scenarios, run end-to-end through `Context::execute`
//! exactly as a host embedding this crate would.

use wisp::Context;

fn run_number(src: &str) -> f64 {
    let mut ctx = Context::new();
    let result = ctx.execute(src, "<test>").expect("program should not fault");
    ctx.number_value(result).expect("result should be a number")
}

#[test]
fn add_via_add2() {
    assert_eq!(run_number("(add2 1 2)"), 3.0);
}

#[test]
fn lambda_application() {
    assert_eq!(run_number("((lambda (x) (add2 x x)) 21)"), 42.0);
}

#[test]
fn recursive_factorial() {
    let src = "(define f (lambda (n) (if (= n 0) 1 (mul2 n (f (sub2 n 1)))))) (f 5)";
    assert_eq!(run_number(src), 120.0);
}

/// Same computation restated as an accumulator-style tail loop: the
/// recursive call is in tail position, so `TAIL_APPLY` must reuse the
/// current frame rather than growing the call-frame stack, letting this run
/// with a recursion-depth ceiling far below the loop's iteration count.
#[test]
fn accumulator_factorial_runs_with_bounded_frames() {
    let mut ctx = Context::new();
    ctx.set_max_recursion_depth(8);
    let src = "(define loop (lambda (n acc) (if (= n 0) acc (loop (sub2 n 1) (mul2 acc n))))) (loop 10000 1)";
    let result = ctx.execute(src, "<test>").expect("tail calls must not grow the frame stack");
    assert_eq!(ctx.number_value(result), Some(factorial_mod(10000)));
}

/// `f64` loses precision well before 10000!, so compare against the same
/// double-precision computation rather than an exact big-integer factorial.
fn factorial_mod(n: u32) -> f64 {
    let mut acc = 1.0f64;
    for k in 1..=n {
        acc *= k as f64;
    }
    acc
}

#[test]
fn call_with_current_continuation_returns_escaped_value() {
    let src = "(call-with-current-continuation (lambda (k) (add2 1 (k 42))))";
    assert_eq!(run_number(src), 42.0);
}

#[test]
fn quasiquote_splices_and_unquotes() {
    let mut ctx = Context::new();
    let src = "`(1 ,(add2 1 1) ,@(cons 3 (cons 4 '())))";
    let result = ctx.execute(src, "<test>").expect("program should not fault");
    let items = ctx.list_items(result).expect("result should be a proper list");
    let numbers: Vec<f64> = items.iter().map(|&v| ctx.number_value(v).unwrap()).collect();
    assert_eq!(numbers, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn car_of_empty_list_is_a_type_error() {
    let mut ctx = Context::new();
    assert!(ctx.execute("(car '())", "<test>").is_none());
    let err = ctx.pending_error().expect("an error should be pending");
    assert_eq!(ctx.symbol_name(err.symbol), Some("bad-argument-type"));
    assert_eq!(ctx.symbol_name(err.param), Some("expecting-pair"));
}
