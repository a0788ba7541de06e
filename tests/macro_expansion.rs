//! The `macro-expander` hook: an expander that raises mid-expansion must
//! leave `Context` in a normal post-error state (no panic, no double-raise),
//! a non-closure binding is rejected with `bad-macro-expander`, and the
//! expander is handed one annotated top-level form at a time rather than
//! the whole program at once.

use wisp::Context;

#[test]
fn expander_that_raises_surfaces_the_raised_error() {
    let mut ctx = Context::new();
    ctx.execute("(define macro-expander (lambda (form) (error 'expansion-went-wrong form)))", "<install-expander>")
        .expect("installing the expander should not fault");

    assert!(ctx.execute("(add2 1 2)", "<test>").is_none());
    let err = ctx.pending_error().expect("an error should be pending");
    assert_eq!(ctx.symbol_name(err.symbol), Some("expansion-went-wrong"));
}

#[test]
fn expander_called_with_wrong_arity_reports_bad_argument_count_not_a_panic() {
    let mut ctx = Context::new();
    ctx.execute("(define macro-expander (lambda (form extra) form))", "<install-expander>")
        .expect("installing the expander should not fault");

    assert!(ctx.execute("(add2 1 2)", "<test>").is_none());
    let err = ctx.pending_error().expect("an error should be pending");
    assert_eq!(ctx.symbol_name(err.symbol), Some("bad-argument-count"));
}

#[test]
fn expander_bound_to_a_non_callable_is_bad_macro_expander() {
    let mut ctx = Context::new();
    ctx.execute("(define macro-expander 42)", "<install-expander>").expect("installing the expander should not fault");

    assert!(ctx.execute("(add2 1 2)", "<test>").is_none());
    let err = ctx.pending_error().expect("an error should be pending");
    assert_eq!(ctx.symbol_name(err.symbol), Some("bad-macro-expander"));
}

/// Only a closure may be bound to `macro-expander` — a native procedure
/// bound under the same name is rejected exactly like any other
/// non-closure value, matching the reference implementation's strict
/// `getType() != CLOSURE` check.
#[test]
fn expander_bound_to_a_native_procedure_is_also_bad_macro_expander() {
    let mut ctx = Context::new();
    ctx.register_procedure("macro-expander", |ctx, args| match ctx.pair_parts(args) {
        Some((form, _)) => wisp::NativeOutcome::Value(form),
        None => wisp::NativeOutcome::NoValue,
    });

    assert!(ctx.execute("(add2 1 2)", "<test>").is_none());
    let err = ctx.pending_error().expect("an error should be pending");
    assert_eq!(ctx.symbol_name(err.symbol), Some("bad-macro-expander"));
}

#[test]
fn context_remains_usable_after_a_faulted_expansion() {
    let mut ctx = Context::new();
    // The expander's own behavior is gated by a separate global rather than
    // swapped out afterward: `macro-expander` must stay bound to the same
    // closure throughout, since redefining it via `execute` would itself
    // run the replacement form through the still-installed failing
    // expander first.
    ctx.execute("(define should-fail #t)", "<setup>").expect("installing the flag should not fault");
    ctx.execute("(define macro-expander (lambda (form) (if should-fail (error 'nope form) form)))", "<install-expander>")
        .expect("installing the expander should not fault");

    assert!(ctx.execute("(add2 1 2)", "<test>").is_none());
    ctx.clear_error();

    let f = ctx.false_value();
    ctx.define_global("should-fail", f);
    let result = ctx.execute("(add2 20 22)", "<test>").expect("should not fault");
    assert_eq!(ctx.number_value(result), Some(42.0));
}
