//! Environment operations: `findSymbol` / `setSymbolLocal` / `setSymbol`,
//! implemented as free functions over the heap rather than methods on
//! `EnvData` directly, since walking the parent chain needs
//! repeated, non-overlapping borrows of `Heap` that a method taking `&self`
//! can't express once a loop is involved.

use crate::heap::{Heap, HeapData, Value};

/// Walks the environment chain starting at `env`, returning the first
/// binding found for `sym`. `None` means unbound anywhere in the chain.
pub(crate) fn find_symbol(heap: &Heap, mut env: Value, sym: Value) -> Option<Value> {
    loop {
        let HeapData::Env(data) = heap.get(env) else {
            unreachable!("find_symbol called on a non-Env value")
        };
        if let Some(&v) = data.bindings.get(&sym) {
            return Some(v);
        }
        env = data.parent?;
    }
}

/// Binds `sym` to `value` in `env` itself, shadowing any ancestor binding.
pub(crate) fn set_symbol_local(heap: &mut Heap, env: Value, sym: Value, value: Value) {
    let HeapData::Env(data) = heap.get_mut(env) else {
        unreachable!("set_symbol_local called on a non-Env value")
    };
    data.bindings.insert(sym, value);
}

/// Assigns `sym` in the nearest ancestor frame (including `env` itself) that
/// already binds it; if no ancestor binds it, falls back to binding it
/// locally in `env`.
pub(crate) fn set_symbol(heap: &mut Heap, env: Value, sym: Value, value: Value) {
    let mut cursor = env;
    loop {
        let parent = {
            let HeapData::Env(data) = heap.get_mut(cursor) else {
                unreachable!("set_symbol called on a non-Env value")
            };
            if data.bindings.contains_key(&sym) {
                data.bindings.insert(sym, value);
                return;
            }
            data.parent
        };
        match parent {
            Some(p) => cursor = p,
            None => {
                set_symbol_local(heap, env, sym, value);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn set_symbol_writes_through_to_defining_ancestor() {
        let mut ctx = Context::new();
        let top = ctx.top_env();
        let child = ctx.make_child_env(top);
        let x = ctx.sym("x");
        let one = ctx.make_number(1.0);
        let two = ctx.make_number(2.0);
        set_symbol_local(ctx.heap_mut(), top, x, one);
        set_symbol(ctx.heap_mut(), child, x, two);
        assert_eq!(find_symbol(ctx.heap_ref(), top, x), Some(two));
    }

    #[test]
    fn set_symbol_falls_back_to_local_when_unbound() {
        let mut ctx = Context::new();
        let top = ctx.top_env();
        let child = ctx.make_child_env(top);
        let y = ctx.sym("y");
        let five = ctx.make_number(5.0);
        set_symbol(ctx.heap_mut(), child, y, five);
        assert_eq!(find_symbol(ctx.heap_ref(), child, y), Some(five));
        assert_eq!(find_symbol(ctx.heap_ref(), top, y), None);
    }
}
