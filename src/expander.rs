//! Macro expansion: runs a user-installed `macro-expander` closure over the
//! freshly-read forms before compilation.
//!
//! A wisp program has no built-in macro system; instead, the top-level
//! environment may bind the symbol `macro-expander` to a closure of one
//! argument. When it is bound, each top-level form is walked in source
//! order and, one at a time: **annotated** into a parallel graph pairing
//! every pair with its source position (`((car' . cdr') . pos)`) and every
//! leaf with its own (`(leaf . pos)`); passed as the sole argument to a
//! fresh call of the expander closure, run to completion on the VM exactly
//! like any other call; then **unannotated** back into a plain value graph,
//! repopulating a fresh position table as it goes. When no `macro-expander`
//! is bound — the common case — expansion is the identity function and the
//! original position table is reused unchanged.

use crate::context::{Context, Pinned};
use crate::error::CanonicalError;
use crate::heap::{HeapData, Value};
use crate::pos::{FilePos, PosTable};
use crate::vm;

/// Looks up `macro-expander` in the top environment without raising
/// `undefined-identifier` if it is unbound — expansion is opt-in.
fn find_macro_expander(ctx: &mut Context) -> Option<Value> {
    let sym = ctx.sym("macro-expander");
    let top_env = ctx.top_env();
    crate::env::find_symbol(ctx.heap_ref(), top_env, sym)
}

/// Wraps `v` in the annotated form spec §4.C describes: a pair becomes
/// `((car' . cdr') . pos)`, a leaf becomes `(leaf . pos)`, where `pos` is
/// `(source . offset)` if `v` has a recorded position, or `NIL` if not.
fn annotate(ctx: &mut Context, v: Value, pos: &PosTable) -> Value {
    let pv = match pos.get(v) {
        Some(fp) => {
            let offset = ctx.make_number(fp.offset as f64);
            ctx.make_pair(fp.source, offset)
        }
        None => ctx.nil(),
    };
    match ctx.pair_parts(v) {
        Some((car, cdr)) => {
            let acar = annotate(ctx, car, pos);
            let acdr = annotate(ctx, cdr, pos);
            let inner = ctx.make_pair(acar, acdr);
            ctx.make_pair(inner, pv)
        }
        None => ctx.make_pair(v, pv),
    }
}

fn decode_pos(ctx: &Context, pv: Value) -> Option<FilePos> {
    let (source, offset) = ctx.pair_parts(pv)?;
    ctx.symbol_name(source)?;
    let offset = ctx.number_value(offset)?;
    Some(FilePos { source, offset: offset as usize })
}

/// The inverse of [`annotate`]: strips the position side-car back off of
/// `v`, recording whatever position it carried into `pos2`. Raises
/// `unannotate-failed` (with `v` itself as the error's parameter, as the
/// original does) if `v` is not itself a pair — the shape every annotated
/// node has, so a malformed return from the expander closure is the only
/// way to hit this.
fn unannotate(ctx: &mut Context, v: Value, pos2: &mut PosTable) -> Option<Value> {
    let Some((car, pv)) = ctx.pair_parts(v) else {
        ctx.raise(CanonicalError::UnannotateFailed, Some(v), None);
        return None;
    };

    let fp = decode_pos(ctx, pv);
    let ret = match ctx.pair_parts(car) {
        Some((inner_car, inner_cdr)) => {
            let car2 = unannotate(ctx, inner_car, pos2)?;
            let cdr2 = unannotate(ctx, inner_cdr, pos2)?;
            ctx.make_pair(car2, cdr2)
        }
        None => car,
    };

    if let Some(fp) = fp {
        pos2.record(ret, fp);
    }
    Some(ret)
}

/// Runs `expander` to completion against a single annotated form, pinning
/// `remaining` — the not-yet-expanded tail of the top-level form list —
/// across every VM step. `remaining` is otherwise unrooted: its argument
/// already went into the pushed frame, so nothing but this pin keeps a
/// collection triggered mid-expansion from reclaiming it.
fn run_expander_on_form(ctx: &mut Context, expander: Value, annotated_form: Value, remaining: Value) -> Option<Value> {
    let nil = ctx.nil();
    let args = ctx.make_pair(annotated_form, nil);
    let cont = vm::make_continuation(ctx);

    vm::apply_value(ctx, cont, expander, args, false);
    if ctx.has_error() {
        // apply_value raised (e.g. bad-argument-count) without pushing a
        // frame; there is nothing left to step.
        return None;
    }

    loop {
        let mut pinned = Pinned::new(ctx, remaining);
        let outcome = vm::step(pinned.ctx(), cont);
        drop(pinned);
        match outcome {
            vm::StepOutcome::Active => continue,
            vm::StepOutcome::Done(v) => return Some(v),
            // The step already installed its own pending error; nothing
            // further to raise.
            vm::StepOutcome::Faulted => return None,
        }
    }
}

/// Expands `forms` (a proper list of top-level forms from the reader) via
/// any installed `macro-expander`, or returns them (and `pos` unchanged) if
/// none is bound. On success, returns the expanded forms alongside a fresh
/// position table covering them. `None` means expansion failed and `ctx`'s
/// pending error is already set; the caller must not raise again.
pub(crate) fn expand_all(ctx: &mut Context, forms: Value, pos: &PosTable) -> Option<(Value, PosTable)> {
    let Some(expander) = find_macro_expander(ctx) else {
        return Some((forms, pos.clone()));
    };
    // The original recognizes only CLOSURE bindings here; a native
    // procedure (or any other callable) bound to `macro-expander` is
    // rejected the same as a non-callable one.
    if !matches!(ctx.heap_ref().get(expander), HeapData::Closure(..)) {
        ctx.raise(CanonicalError::BadMacroExpander, Some(expander), None);
        return None;
    }

    let mut pos2 = PosTable::new();
    let mut results = Vec::new();
    let mut cursor = forms;

    while let Some((car, cdr)) = ctx.pair_parts(cursor) {
        let annotated = annotate(ctx, car, pos);
        let expanded = run_expander_on_form(ctx, expander, annotated, cdr)?;
        let unannotated = unannotate(ctx, expanded, &mut pos2)?;
        results.push(unannotated);
        cursor = cdr;
    }

    let mut list = ctx.nil();
    for v in results.into_iter().rev() {
        list = ctx.make_pair(v, list);
    }
    Some((list, pos2))
}
