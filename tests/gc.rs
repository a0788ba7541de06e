//! Garbage collection invariants: an empty heap after a rootless collection,
//! pinning as a root mechanism independent of reachability, and opportunistic
//! collection.

use wisp::{Context, NativeOutcome};

#[test]
fn heap_is_empty_after_gc_with_no_extra_roots() {
    let mut ctx = Context::new();
    ctx.execute("(define x (cons 1 2)) (define y (cons 3 4))", "<test>")
        .expect("setup should not fault");
    ctx.gc();
    // `x`/`y` are still bound in the top environment, which is always a
    // root, so their pairs (and the environment itself) remain live.
    let after_first_gc = ctx.stats();
    assert!(after_first_gc.live > 0);

    // Rebinding over both names drops the only remaining references to the
    // original pairs; a second collection should reclaim them.
    ctx.execute("(define x 0) (define y 0)", "<test>").expect("rebinding should not fault");
    let before = ctx.stats();
    ctx.gc();
    let after = ctx.stats();
    assert!(after.live < before.live, "collecting unreferenced pairs should shrink the live set");
}

/// Pinning a value keeps it alive across a collection even when nothing in
/// the reachable graph points to it — a pinned value is always treated as a
/// root.
#[test]
fn pinned_value_survives_collection_even_when_unreachable() {
    let mut ctx = Context::new();
    let orphan = ctx.make_pair(ctx.nil(), ctx.nil());
    ctx.pin(orphan);
    ctx.gc();
    assert_eq!(ctx.type_name(orphan), "pair");
    ctx.unpin(orphan);
    ctx.gc();
}

/// `GcConfig::allocations_between_gc` makes `execute()` collect on its own
/// once enough allocations have piled up, without the host ever calling
/// `gc()` directly.
#[test]
fn opportunistic_gc_runs_automatically_once_threshold_is_crossed() {
    let mut ctx = Context::new();
    ctx.gc_config.allocations_between_gc = Some(4);

    // One iteration first, to establish the steady-state live count once
    // every standard binding has been installed.
    ctx.execute("(cons 1 (cons 2 3))", "<test>").expect("should not fault");
    let baseline = ctx.stats().live;

    for _ in 0..20 {
        ctx.execute("(cons 1 (cons 2 3))", "<test>").expect("should not fault");
    }

    // No explicit `gc()` call above; opportunistic collection after each
    // `execute()` should keep the live set near the steady state instead of
    // accumulating twenty generations of discarded pairs, code blocks and
    // closures.
    let after = ctx.stats().live;
    assert!(
        after <= baseline + 16,
        "opportunistic GC should have kept the heap near steady state: baseline={baseline}, after={after}"
    );
}

/// A host-installed `macro-expander` runs to completion on the VM, once per
/// top-level form, before compilation, and may itself call back into
/// allocating operations; the resulting program must compile and run
/// normally. The expander here is handed one annotated form at a time (not
/// the whole program) and returns it unchanged.
#[test]
fn identity_macro_expander_does_not_change_program_behavior() {
    let mut ctx = Context::new();
    ctx.execute("(define macro-expander (lambda (form) form))", "<install-expander>")
        .expect("installing the expander should not fault");
    let result = ctx.execute("(add2 20 22)", "<test>").expect("should not fault");
    assert_eq!(ctx.number_value(result), Some(42.0));
}

/// The not-yet-expanded tail of the top-level form list must survive a
/// collection forced from *inside* the expander closure while an earlier
/// form is still being expanded — it is otherwise unrooted (its only
/// reference was consumed into the pushed call frame), so this is exactly
/// the pin `expander::expand_all` takes across every VM step.
#[test]
fn gc_forced_inside_macro_expander_does_not_corrupt_the_remaining_forms_tail() {
    let mut ctx = Context::new();
    ctx.register_procedure("force-gc!", |ctx, _args| {
        ctx.gc();
        NativeOutcome::NoValue
    });
    ctx.execute("(define macro-expander (lambda (form) (force-gc!) form))", "<install-expander>")
        .expect("installing the expander should not fault");

    let result = ctx
        .execute("(define a 1) (define b 2) (add2 a b)", "<test>")
        .expect("should not fault even with a collection forced mid-expansion");
    assert_eq!(ctx.number_value(result), Some(3.0));
}
