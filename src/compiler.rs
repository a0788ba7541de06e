//! The compiler: lowers a (post-macro-expansion) value graph into a
//! [`CodeBlock`]. Special-form recognition compares the head of a form
//! against symbols interned once per `compile()` call — interned symbols
//! compare by identity, so there is no need to re-intern the literal on
//! every node.

use std::rc::Rc;

use crate::bytecode::{CodeBlock, CodeBuilder, Opcode};
use crate::context::Context;
use crate::error::{CanonicalError, RResult, RuntimeError};
use crate::heap::{HeapData, Value};
use crate::pos::PosTable;

fn bad_syntax() -> RuntimeError {
    RuntimeError::new(CanonicalError::BadSyntax)
}

fn as_pair(ctx: &Context, v: Value) -> Option<(Value, Value)> {
    match ctx.heap_ref().get(v) {
        HeapData::Pair(car, cdr) => Some((*car, *cdr)),
        _ => None,
    }
}

/// The symbols special-form recognition compares against, interned once per
/// top-level `compile()` call.
struct Specials {
    begin: Value,
    quote: Value,
    quasiquote: Value,
    unquote: Value,
    unquote_splicing: Value,
    set: Value,
    define: Value,
    lambda: Value,
    if_: Value,
}

impl Specials {
    fn new(ctx: &mut Context) -> Self {
        Self {
            begin: ctx.sym("begin"),
            quote: ctx.sym("quote"),
            quasiquote: ctx.sym("quasiquote"),
            unquote: ctx.sym("unquote"),
            unquote_splicing: ctx.sym("unquote-splicing"),
            set: ctx.sym("set!"),
            define: ctx.sym("define"),
            lambda: ctx.sym("lambda"),
            if_: ctx.sym("if"),
        }
    }
}

/// Lowers `forms` (a proper list of top-level forms, already macro-expanded)
/// into a single top-level `CodeBlock` with no formal parameters, ready to
/// be wrapped in a closure over the top environment.
pub(crate) fn compile(ctx: &mut Context, forms: Value, pos: &PosTable) -> RResult<CodeBlock> {
    let specials = Specials::new(ctx);
    let mut builder = CodeBuilder::new(Vec::new(), None);
    compile_begin(ctx, &specials, &mut builder, forms, pos)?;
    tail_analyze(&mut builder);
    Ok(builder.finish())
}

/// A sequence of forms (a `begin` body, a lambda body, or the top-level
/// form list): each but the last is compiled then popped; an empty sequence
/// pushes `NIL`.
fn compile_begin(ctx: &mut Context, sp: &Specials, b: &mut CodeBuilder, mut v: Value, pos: &PosTable) -> RResult<()> {
    let mut emitted = false;
    loop {
        let Some((car, cdr)) = as_pair(ctx, v) else { break };
        if emitted {
            b.emit(Opcode::Pop, pos.get(v));
        }
        compile_expr(ctx, sp, b, car, pos)?;
        emitted = true;
        v = cdr;
    }
    if !emitted {
        let nil = ctx.nil();
        b.emit(Opcode::Push(nil), pos.get(v));
    }
    Ok(())
}

fn compile_expr(ctx: &mut Context, sp: &Specials, b: &mut CodeBuilder, v: Value, pos: &PosTable) -> RResult<()> {
    match ctx.heap_ref().get(v) {
        HeapData::Symbol(_) => {
            b.emit(Opcode::Lookup(v), pos.get(v));
            Ok(())
        }
        HeapData::Pair(car, cdr) => {
            let (car, cdr) = (*car, *cdr);
            compile_form(ctx, sp, b, v, car, cdr, pos)
        }
        _ => {
            b.emit(Opcode::Push(v), pos.get(v));
            Ok(())
        }
    }
}

fn compile_form(
    ctx: &mut Context,
    sp: &Specials,
    b: &mut CodeBuilder,
    v: Value,
    car: Value,
    cdr: Value,
    pos: &PosTable,
) -> RResult<()> {
    let cadr = as_pair(ctx, cdr).map(|(a, _)| a);
    let cddr = as_pair(ctx, cdr).map(|(_, d)| d);
    let caddr = cddr.and_then(|c| as_pair(ctx, c)).map(|(a, _)| a);
    let cdddr = cddr.and_then(|c| as_pair(ctx, c)).map(|(_, d)| d);
    let cadddr = cdddr.and_then(|c| as_pair(ctx, c)).map(|(a, _)| a);

    if car == sp.begin {
        return compile_begin(ctx, sp, b, cdr, pos);
    }

    if car == sp.quote {
        let datum = cadr.ok_or_else(bad_syntax)?;
        b.emit(Opcode::Push(datum), pos.get(v));
        return Ok(());
    }

    if car == sp.quasiquote {
        let datum = cadr.ok_or_else(bad_syntax)?;
        compile_quasiquote(ctx, sp, b, datum, pos)?;
        return Ok(());
    }

    if car == sp.set {
        let expr = caddr.ok_or_else(bad_syntax)?;
        let sym = cadr.ok_or_else(bad_syntax)?;
        compile_expr(ctx, sp, b, expr, pos)?;
        b.emit(Opcode::Set(sym), pos.get(v));
        return Ok(());
    }

    if car == sp.define {
        let expr = caddr.ok_or_else(bad_syntax)?;
        let sym = cadr.ok_or_else(bad_syntax)?;
        compile_expr(ctx, sp, b, expr, pos)?;
        b.emit(Opcode::Define(sym), pos.get(v));
        return Ok(());
    }

    if car == sp.lambda {
        let formals_spec = cadr.ok_or_else(bad_syntax)?;
        let (formals, rest) = parse_formals(ctx, formals_spec);
        let body = cddr.unwrap_or_else(|| ctx.nil());
        let mut sub = CodeBuilder::new(formals, rest);
        compile_begin(ctx, sp, &mut sub, body, pos)?;
        tail_analyze(&mut sub);
        let code_value = ctx.heap_mut().alloc(HeapData::Code(Rc::new(sub.finish())));
        b.emit(Opcode::Lambda(code_value), pos.get(v));
        return Ok(());
    }

    if car == sp.if_ {
        let test = cadr.ok_or_else(bad_syntax)?;
        compile_expr(ctx, sp, b, test, pos)?;
        let skip_false = b.emit_placeholder(true, pos.get(v));

        let then_branch = caddr.ok_or_else(bad_syntax)?;
        compile_expr(ctx, sp, b, then_branch, pos)?;
        let skip_end = b.emit_placeholder(false, pos.get(v));

        b.patch_to_here(skip_false);
        match cadddr {
            Some(else_branch) => compile_expr(ctx, sp, b, else_branch, pos)?,
            None => {
                let nil = ctx.nil();
                b.emit(Opcode::Push(nil), pos.get(v));
            }
        }
        b.patch_to_here(skip_end);
        return Ok(());
    }

    // Ordinary application: callee, then each argument left-to-right.
    compile_expr(ctx, sp, b, car, pos)?;
    let mut n: u16 = 0;
    let mut cursor = cdr;
    while let Some((arg, rest)) = as_pair(ctx, cursor) {
        compile_expr(ctx, sp, b, arg, pos)?;
        n += 1;
        cursor = rest;
    }
    b.emit(Opcode::Apply(n), pos.get(v));
    Ok(())
}

/// `(unquote e)` lowers `e` directly; `(unquote-splicing e)` lowers `e` and
/// reports itself as spliced so the enclosing pair emits `SPLICING` instead
/// of `CONS`; any other pair recurses into car then cdr and conses (or
/// splices) the results; a leaf pushes itself as a constant. Splicing is
/// recognized only one level above the splicing form: a `cdr`-position
/// splice is a logic error in the source program, not something this
/// lowering can express, so it is asserted against rather than silently
/// miscompiled.
fn compile_quasiquote(ctx: &mut Context, sp: &Specials, b: &mut CodeBuilder, v: Value, pos: &PosTable) -> RResult<bool> {
    let Some((car, cdr)) = as_pair(ctx, v) else {
        b.emit(Opcode::Push(v), pos.get(v));
        return Ok(false);
    };

    if car == sp.unquote {
        let expr = as_pair(ctx, cdr).map(|(a, _)| a).ok_or_else(bad_syntax)?;
        compile_expr(ctx, sp, b, expr, pos)?;
        return Ok(false);
    }
    if car == sp.unquote_splicing {
        let expr = as_pair(ctx, cdr).map(|(a, _)| a).ok_or_else(bad_syntax)?;
        compile_expr(ctx, sp, b, expr, pos)?;
        return Ok(true);
    }

    let car_spliced = compile_quasiquote(ctx, sp, b, car, pos)?;
    let cdr_spliced = compile_quasiquote(ctx, sp, b, cdr, pos)?;
    debug_assert!(!cdr_spliced, "unquote-splicing in cdr position is not one level above a splicing form");
    if car_spliced {
        b.emit(Opcode::Splicing, pos.get(v));
    } else {
        b.emit(Opcode::Cons, pos.get(v));
    }
    Ok(false)
}

/// Walks a `lambda` formals spec, collecting required-parameter symbols and
/// an optional rest symbol (a bare symbol instead of `NIL` at the tail of
/// the formals list, or the formals spec itself being a bare symbol).
fn parse_formals(ctx: &Context, mut spec: Value) -> (Vec<Value>, Option<Value>) {
    let mut formals = Vec::new();
    loop {
        match ctx.heap_ref().get(spec) {
            HeapData::Pair(car, cdr) => {
                formals.push(*car);
                spec = *cdr;
            }
            HeapData::Nil => return (formals, None),
            _ => return (formals, Some(spec)),
        }
    }
}

/// After emission, upgrades every `APPLY` whose remainder is nothing but an
/// unconditional `SKIP`/`SKIP_IF_FALSE` chain walking off the end of the
/// block to `TAIL_APPLY`.
fn tail_analyze(b: &mut CodeBuilder) {
    let len = b.ops().len();
    let mut upgrades = Vec::new();
    for i in 0..len {
        if matches!(b.ops()[i], Opcode::Apply(_)) && test_tailing(b.ops(), i + 1) {
            upgrades.push(i);
        }
    }
    for i in upgrades {
        b.upgrade_to_tail(i);
    }
}

/// Whether every opcode reachable from index `i` is an unconditional
/// `SKIP`/`SKIP_IF_FALSE` chain that ultimately walks off the end of the
/// block. Both branches compute their jump target the same way the VM does
/// at runtime — `i + 1 + delta`, since the instruction pointer has already
/// advanced past the jump opcode itself by the time its delta is applied
/// (see `vm::advance_ip`). Both `Skip` and `SkipIfFalse` use this same
/// uniform, runtime-accurate formula; getting it wrong for either would make
/// `TAIL_APPLY`'s frame reuse observably incorrect rather than merely a
/// missed optimization.
fn test_tailing(ops: &[Opcode], i: usize) -> bool {
    if i >= ops.len() {
        return true;
    }
    match ops[i] {
        Opcode::Skip(delta) => test_tailing(ops, jump_target(i, delta)),
        Opcode::SkipIfFalse(delta) => test_tailing(ops, i + 1) && test_tailing(ops, jump_target(i, delta)),
        _ => false,
    }
}

fn jump_target(i: usize, delta: i32) -> usize {
    (i as i64 + 1 + delta as i64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader;

    fn compile_source(ctx: &mut Context, src: &str) -> CodeBlock {
        let source = ctx.sym("<test>");
        let mut pos = PosTable::new();
        let forms = reader::read_all(ctx, src, source, &mut pos).unwrap();
        compile(ctx, forms, &pos).unwrap()
    }

    #[test]
    fn if_compiles_to_two_patched_skips() {
        let mut ctx = Context::new();
        let code = compile_source(&mut ctx, "(if #t 1 2)");
        let skip_if_false = code.ops.iter().filter(|op| matches!(op, Opcode::SkipIfFalse(_))).count();
        let skip = code.ops.iter().filter(|op| matches!(op, Opcode::Skip(_))).count();
        assert_eq!(skip_if_false, 1);
        assert_eq!(skip, 1);
    }

    #[test]
    fn tail_call_in_lambda_body_upgrades_to_tail_apply() {
        let mut ctx = Context::new();
        let code = compile_source(&mut ctx, "(lambda (n) (f n))");
        let Opcode::Lambda(inner) = code.ops[0] else { panic!("expected a Lambda opcode") };
        let HeapData::Code(inner_code) = ctx.heap_ref().get(inner) else { panic!("expected a Code value") };
        assert!(inner_code.ops.iter().any(|op| matches!(op, Opcode::TailApply(_))));
    }

    #[test]
    fn non_tail_call_stays_apply() {
        let mut ctx = Context::new();
        let code = compile_source(&mut ctx, "(lambda (n) (add2 1 (f n)))");
        let Opcode::Lambda(inner) = code.ops[0] else { panic!("expected a Lambda opcode") };
        let HeapData::Code(inner_code) = ctx.heap_ref().get(inner) else { panic!("expected a Code value") };
        assert!(!inner_code.ops.iter().any(|op| matches!(op, Opcode::TailApply(_))));
        assert!(inner_code.ops.iter().any(|op| matches!(op, Opcode::Apply(_))));
    }

    #[test]
    fn quasiquote_emits_splicing_only_for_unquote_splicing() {
        let mut ctx = Context::new();
        let code = compile_source(&mut ctx, "`(1 ,(add2 1 1) ,@(cons 3 (cons 4 '())))");
        assert!(code.ops.iter().any(|op| matches!(op, Opcode::Splicing)));
        assert!(code.ops.iter().any(|op| matches!(op, Opcode::Cons)));
    }
}
