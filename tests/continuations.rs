//! First-class continuations: calling a captured continuation resumes as if
//! the original `call/cc` had returned the given value, any number of
//! times, at any distance from the capture.

use wisp::Context;

#[test]
fn continuation_invoked_immediately_behaves_like_an_early_return() {
    let mut ctx = Context::new();
    let src = "(call-with-current-continuation (lambda (k) (add2 1 (k 7))))";
    let result = ctx.execute(src, "<test>").expect("program should not fault");
    assert_eq!(ctx.number_value(result), Some(7.0));
}

#[test]
fn continuation_not_invoked_just_returns_the_lambdas_value() {
    let mut ctx = Context::new();
    let src = "(call-with-current-continuation (lambda (k) 99))";
    let result = ctx.execute(src, "<test>").expect("program should not fault");
    assert_eq!(ctx.number_value(result), Some(99.0));
}

/// Stashes the captured continuation in a global so later, independent
/// top-level `execute()` calls can invoke it — multi-shot re-entry across
/// separate drives of the VM, not just within the call that captured it.
#[test]
fn continuation_can_be_invoked_again_after_escaping() {
    let mut ctx = Context::new();
    let first = ctx
        .execute(
            "(define saved #f) \
             (define capture (lambda () (add2 1 (call-with-current-continuation (lambda (k) (set! saved k) 0))))) \
             (capture)",
            "<setup>",
        )
        .expect("setup should not fault");
    assert_eq!(ctx.number_value(first), Some(1.0));

    let second = ctx.execute("(saved 41)", "<resume-1>").expect("first resume should not fault");
    assert_eq!(ctx.number_value(second), Some(42.0));

    let third = ctx.execute("(saved 99)", "<resume-2>").expect("second resume should not fault");
    assert_eq!(ctx.number_value(third), Some(100.0));
}
