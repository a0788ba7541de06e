//! The VM: stepwise opcode dispatch, closure application and first-class
//! continuations. `TAIL_APPLY` actually reuses the current frame instead of
//! merely being an `APPLY` that happens to sit in tail position, giving
//! true O(1) stack growth for tail calls.

use std::rc::Rc;

use crate::bytecode::{CodeBlock, Opcode};
use crate::context::Context;
use crate::env;
use crate::error::{self, CanonicalError, NativeOutcome};
use crate::heap::{ContinuationData, EnvData, Frame, Heap, HeapData, Value};
use crate::pos::FilePos;

/// Result of running one opcode of `cont`'s top frame.
#[derive(Debug)]
pub(crate) enum StepOutcome {
    /// The continuation has more opcodes to run.
    Active,
    /// The last frame was popped; the continuation's final value is the
    /// single value left on its operand stack.
    Done(Value),
    /// A runtime error became `Context`'s pending error during this step.
    Faulted,
}

pub(crate) fn make_continuation(ctx: &mut Context) -> Value {
    ctx.heap_mut().alloc(HeapData::Continuation(ContinuationData::default()))
}

pub(crate) fn push_frame(ctx: &mut Context, cont: Value, frame: Frame) {
    cont_data_mut(ctx.heap_mut(), cont).frames.push(frame);
}

/// Snapshots `cont`'s current frames/stack into a freshly-allocated
/// continuation value, for `call-with-current-continuation`.
pub(crate) fn capture_continuation(ctx: &mut Context, cont: Value) -> Value {
    let snapshot = cont_data(ctx.heap_ref(), cont).clone();
    ctx.heap_mut().alloc(HeapData::Continuation(snapshot))
}

fn cont_data(heap: &Heap, cont: Value) -> &ContinuationData {
    match heap.get(cont) {
        HeapData::Continuation(data) => data,
        other => unreachable!("expected a continuation value, found {}", other.variant_name()),
    }
}

fn cont_data_mut(heap: &mut Heap, cont: Value) -> &mut ContinuationData {
    match heap.get_mut(cont) {
        HeapData::Continuation(data) => data,
        other => unreachable!("expected a continuation value, found {}", other.variant_name()),
    }
}

fn code_block_of(heap: &Heap, closure: Value) -> Rc<CodeBlock> {
    match heap.get(closure) {
        HeapData::Closure(_, code) => match heap.get(*code) {
            HeapData::Code(block) => block.clone(),
            other => unreachable!("closure's code slot held {}", other.variant_name()),
        },
        other => unreachable!("expected a closure value, found {}", other.variant_name()),
    }
}

fn closure_env(heap: &Heap, closure: Value) -> Value {
    match heap.get(closure) {
        HeapData::Closure(env, _) => *env,
        other => unreachable!("expected a closure value, found {}", other.variant_name()),
    }
}

fn push(ctx: &mut Context, cont: Value, v: Value) {
    cont_data_mut(ctx.heap_mut(), cont).stack.push(v);
}

fn pop(ctx: &mut Context, cont: Value) -> Value {
    cont_data_mut(ctx.heap_mut(), cont).stack.pop().expect("operand stack underflow")
}

fn advance_ip(ctx: &mut Context, cont: Value, delta: i32) {
    let data = cont_data_mut(ctx.heap_mut(), cont);
    let frame = data.frames.last_mut().expect("SKIP with no active frame");
    frame.ip = (frame.ip as i64 + delta as i64) as usize;
}

fn final_value(ctx: &Context, cont: Value) -> Value {
    *cont_data(ctx.heap_ref(), cont)
        .stack
        .last()
        .expect("a done continuation must leave exactly one value on its operand stack")
}

/// The source position blamed for the instruction about to execute in
/// `cont`'s current frame. Used solely for diagnostics.
pub(crate) fn current_position(ctx: &Context, cont: Value) -> Option<FilePos> {
    let data = cont_data(ctx.heap_ref(), cont);
    let frame = data.frames.last()?;
    let block = code_block_of(ctx.heap_ref(), frame.closure);
    block.positions.get(frame.ip).copied().flatten()
}

/// Runs exactly one opcode of `cont`'s top frame: read the current opcode,
/// advance the instruction pointer, dispatch; pop the frame (without
/// dispatching) once its instruction pointer walks off the end of its code
/// block.
pub(crate) fn step(ctx: &mut Context, cont: Value) -> StepOutcome {
    ctx.enter_step(cont);
    let outcome = step_inner(ctx, cont);
    ctx.exit_step();
    outcome
}

fn step_inner(ctx: &mut Context, cont: Value) -> StepOutcome {
    let Some(frame) = cont_data(ctx.heap_ref(), cont).frames.last().copied() else {
        return StepOutcome::Done(final_value(ctx, cont));
    };

    let block = code_block_of(ctx.heap_ref(), frame.closure);
    if frame.ip >= block.ops.len() {
        cont_data_mut(ctx.heap_mut(), cont).frames.pop();
        return if cont_data(ctx.heap_ref(), cont).frames.is_empty() {
            StepOutcome::Done(final_value(ctx, cont))
        } else {
            StepOutcome::Active
        };
    }

    let op = block.ops[frame.ip];
    {
        let data = cont_data_mut(ctx.heap_mut(), cont);
        data.frames.last_mut().unwrap().ip = frame.ip + 1;
    }

    let depth = cont_data(ctx.heap_ref(), cont).frames.len();
    ctx.trace_step(frame.ip, depth);

    execute_op(ctx, cont, frame.env, op);

    if ctx.has_error() { StepOutcome::Faulted } else { StepOutcome::Active }
}

fn execute_op(ctx: &mut Context, cont: Value, env: Value, op: Opcode) {
    match op {
        Opcode::Push(v) => push(ctx, cont, v),
        Opcode::Pop => {
            pop(ctx, cont);
        }
        Opcode::Lookup(sym) => match env::find_symbol(ctx.heap_ref(), env, sym) {
            Some(v) => push(ctx, cont, v),
            None => ctx.raise(CanonicalError::UndefinedIdentifier, Some(sym), Some(cont)),
        },
        Opcode::Lambda(code_value) => {
            let closure = ctx.heap_mut().alloc(HeapData::Closure(env, code_value));
            push(ctx, cont, closure);
        }
        Opcode::Define(sym) => {
            let v = pop(ctx, cont);
            env::set_symbol_local(ctx.heap_mut(), env, sym, v);
            let nil = ctx.nil();
            push(ctx, cont, nil);
        }
        Opcode::Set(sym) => {
            let v = pop(ctx, cont);
            env::set_symbol(ctx.heap_mut(), env, sym, v);
            let nil = ctx.nil();
            push(ctx, cont, nil);
        }
        Opcode::SkipIfFalse(delta) => {
            let v = pop(ctx, cont);
            if v == ctx.false_value() {
                advance_ip(ctx, cont, delta);
            }
        }
        Opcode::Skip(delta) => advance_ip(ctx, cont, delta),
        Opcode::Cons => {
            let cdr = pop(ctx, cont);
            let car = pop(ctx, cont);
            let pair = ctx.make_pair(car, cdr);
            push(ctx, cont, pair);
        }
        Opcode::Splicing => {
            let tail = pop(ctx, cont);
            let list = pop(ctx, cont);
            let result = append(ctx, list, tail);
            push(ctx, cont, result);
        }
        Opcode::Apply(n) => apply_n(ctx, cont, n as usize, false),
        Opcode::TailApply(n) => apply_n(ctx, cont, n as usize, true),
    }
}

/// Pops `n` arguments (top-of-stack first) plus a callee and applies: each
/// pop is consed onto the front of the growing list, so the last-popped
/// (leftmost) argument ends up at the head without any explicit reversal.
fn apply_n(ctx: &mut Context, cont: Value, n: usize, tail: bool) {
    let mut args = ctx.nil();
    for _ in 0..n {
        let v = pop(ctx, cont);
        args = ctx.make_pair(v, args);
    }
    let callee = pop(ctx, cont);
    apply_value(ctx, cont, callee, args, tail);
}

/// Shared APPLY dispatch, used both by the bytecode `APPLY`/`TAIL_APPLY`
/// opcodes and by `Context::apply`, the re-entrant
/// entry point native procedures (`apply`, `call-with-current-continuation`)
/// use to invoke a callee against the continuation currently stepping.
pub(crate) fn apply_value(ctx: &mut Context, cont: Value, callee: Value, args: Value, tail: bool) {
    match ctx.heap_ref().get(callee) {
        HeapData::Procedure(proc) => {
            let proc = proc.clone();
            match proc(ctx, args) {
                NativeOutcome::Value(v) => push(ctx, cont, v),
                NativeOutcome::NoValue => {}
                NativeOutcome::Raise { symbol, param } => {
                    ctx.raise_value(symbol, param, Some(cont));
                }
            }
        }
        HeapData::Closure(..) => apply_closure(ctx, cont, callee, args, tail),
        HeapData::Continuation(_) => invoke_continuation(ctx, cont, callee, args),
        _ => {
            let param = ctx.sym(error::param::EXPECTING_PROCEDURE);
            ctx.raise(CanonicalError::BadArgumentType, Some(param), Some(cont));
        }
    }
}

fn apply_closure(ctx: &mut Context, cont: Value, closure: Value, args: Value, tail: bool) {
    let code = code_block_of(ctx.heap_ref(), closure);
    let parent_env = closure_env(ctx.heap_ref(), closure);
    let new_env = ctx
        .heap_mut()
        .alloc(HeapData::Env(EnvData { parent: Some(parent_env), bindings: Default::default() }));

    let mut cursor = args;
    for &formal in &code.formals {
        let next = match ctx.heap_ref().get(cursor) {
            HeapData::Pair(car, cdr) => Some((*car, *cdr)),
            _ => None,
        };
        let Some((car, cdr)) = next else {
            let param = ctx.sym(error::param::TOO_FEW);
            ctx.raise(CanonicalError::BadArgumentCount, Some(param), Some(cont));
            return;
        };
        env::set_symbol_local(ctx.heap_mut(), new_env, formal, car);
        cursor = cdr;
    }

    if let Some(rest) = code.rest {
        env::set_symbol_local(ctx.heap_mut(), new_env, rest, cursor);
    } else if !matches!(ctx.heap_ref().get(cursor), HeapData::Nil) {
        let param = ctx.sym(error::param::TOO_MANY);
        ctx.raise(CanonicalError::BadArgumentCount, Some(param), Some(cont));
        return;
    }

    let new_frame = Frame { env: new_env, closure, ip: 0 };
    if tail {
        let data = cont_data_mut(ctx.heap_mut(), cont);
        *data.frames.last_mut().expect("TAIL_APPLY with no active frame") = new_frame;
    } else {
        if cont_data(ctx.heap_ref(), cont).frames.len() >= ctx.max_recursion_depth() {
            ctx.raise(CanonicalError::RecursionDepthExceeded, None, Some(cont));
            return;
        }
        cont_data_mut(ctx.heap_mut(), cont).frames.push(new_frame);
    }
}

/// Overwrites `cont`'s frames/stack with a copy of `callee`'s captured
/// snapshot, then pushes the application's first argument — realizing a
/// (possibly repeated) jump back to the point `call-with-current-continuation`
/// captured, with that argument standing in for its return value.
fn invoke_continuation(ctx: &mut Context, cont: Value, callee: Value, args: Value) {
    let snapshot = match ctx.heap_ref().get(callee) {
        HeapData::Continuation(data) => data.clone(),
        other => unreachable!("expected a continuation value, found {}", other.variant_name()),
    };
    let first_arg = match ctx.heap_ref().get(args) {
        HeapData::Pair(car, _) => *car,
        _ => ctx.nil(),
    };
    *cont_data_mut(ctx.heap_mut(), cont) = snapshot;
    cont_data_mut(ctx.heap_mut(), cont).stack.push(first_arg);
}

/// Appends `tail` in place of `list`'s terminal `NIL`, for `SPLICING`. Walks
/// `list` iteratively (not recursively) so a long spliced list can't blow
/// the host stack.
fn append(ctx: &mut Context, list: Value, tail: Value) -> Value {
    let mut items = Vec::new();
    let mut cursor = list;
    while let HeapData::Pair(car, cdr) = ctx.heap_ref().get(cursor) {
        items.push(*car);
        cursor = *cdr;
    }
    let mut result = tail;
    for v in items.into_iter().rev() {
        result = ctx.make_pair(v, result);
    }
    result
}
