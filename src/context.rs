//! `Context`: the embedding API's single entry point, bundling the heap, the
//! two symbol-interning pools, the top-level environment, the four
//! `Context`-lifetime singleton values (`NIL`/`TRUE`/`FALSE`/`OMITTED`), the
//! sticky pending-error slot, and the ambient knobs (`GcConfig`, the
//! recursion-depth ceiling, an optional `VmTracer`). Every operation in the
//! crate threads through this one struct.

use std::path::Path;
use std::rc::Rc;

use crate::env;
use crate::error::{CanonicalError, ErrorInfo, NativeOutcome, RuntimeError};
use crate::heap::{Frame, Heap, HeapData, HeapStats, PortData, Value};
use crate::intern::Interner;
use crate::pos::PosTable;
use crate::resource::{GcConfig, DEFAULT_MAX_RECURSION_DEPTH};
use crate::tracer::VmTracer;
use crate::{builtins, compiler, expander, reader, vm};

struct ErrorSlot {
    symbol: Value,
    param: Value,
    continuation: Option<Value>,
}

/// An embeddable wisp interpreter: one heap, one top-level environment, one
/// sticky error slot. Not `Send`/`Sync` (the heap uses `Rc` internally) — a
/// host that needs concurrent evaluation runs one `Context` per thread.
pub struct Context {
    heap: Heap,
    interner: Interner,
    top_env: Value,
    nil: Value,
    t: Value,
    f: Value,
    omitted: Value,
    dot: Value,
    error: Option<ErrorSlot>,
    current_continuation: Option<Value>,
    /// Opportunistic-collection policy, consulted at the boundary between
    /// top-level [`Context::execute`] calls.
    pub gc_config: GcConfig,
    max_recursion_depth: usize,
    tracer: Option<Box<dyn VmTracer>>,
}

impl Context {
    /// Builds a fresh interpreter with the standard bindings installed.
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let nil = heap.alloc_permanent(HeapData::Nil);
        let t = heap.alloc_permanent(HeapData::Boolean(true));
        let f = heap.alloc_permanent(HeapData::Boolean(false));
        let omitted = heap.alloc_permanent(HeapData::Omitted);
        let top_env = heap.alloc_permanent(HeapData::Env(Default::default()));
        let dot = interner.intern_ci(&mut heap, ".");

        let mut ctx = Self {
            heap,
            interner,
            top_env,
            nil,
            t,
            f,
            omitted,
            dot,
            error: None,
            current_continuation: None,
            gc_config: GcConfig::default(),
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            tracer: None,
        };
        builtins::install(&mut ctx);
        ctx
    }

    // -- singletons and constructors -------------------------------------

    pub fn nil(&self) -> Value {
        self.nil
    }

    pub fn true_value(&self) -> Value {
        self.t
    }

    pub fn false_value(&self) -> Value {
        self.f
    }

    pub fn omitted(&self) -> Value {
        self.omitted
    }

    pub fn make_pair(&mut self, car: Value, cdr: Value) -> Value {
        self.heap.alloc(HeapData::Pair(car, cdr))
    }

    pub fn make_number(&mut self, n: f64) -> Value {
        self.heap.alloc(HeapData::Number(n))
    }

    pub fn make_char(&mut self, code: u32) -> Value {
        self.heap.alloc(HeapData::Char(code))
    }

    pub fn make_string(&mut self, s: String) -> Value {
        self.heap.alloc(HeapData::Str(s))
    }

    pub fn make_boolean(&self, b: bool) -> Value {
        if b { self.t } else { self.f }
    }

    pub fn make_vector(&mut self, items: Vec<Value>) -> Value {
        self.heap.alloc(HeapData::Vector(items))
    }

    pub(crate) fn make_port(&mut self, port: PortData) -> Value {
        self.heap.alloc(HeapData::Port(port))
    }

    /// An in-memory output port, for hosts (and tests) that want to capture
    /// `write-char` output without touching stdout/stderr.
    pub fn make_buffer_port(&mut self) -> Value {
        self.make_port(PortData::Buffer(String::new()))
    }

    /// The bytes written so far to a port created with
    /// [`Context::make_buffer_port`]. `None` for any other port kind.
    pub fn port_buffer_contents(&self, v: Value) -> Option<&str> {
        match self.heap.get(v) {
            HeapData::Port(PortData::Buffer(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Interns `name` in the case-insensitive pool the reader uses for
    /// ordinary identifiers.
    pub fn sym(&mut self, name: &str) -> Value {
        self.interner.intern_ci(&mut self.heap, name)
    }

    /// Interns `name` in the case-sensitive pool, for synthetic names the
    /// compiler or a host must guarantee never collide with a user
    /// identifier under case folding.
    pub fn sym_case(&mut self, name: &str) -> Value {
        self.interner.intern_cs(&mut self.heap, name)
    }

    /// Whether `v` is the `.` symbol the reader's dotted-pair syntax looks
    /// for. Cached at construction time rather than re-interned on every
    /// check.
    pub(crate) fn is_dot_symbol(&self, v: Value) -> bool {
        v == self.dot
    }

    /// Registers a native procedure under `name` in the top-level
    /// environment. Part of the public embedding surface: hosts extend the
    /// standard library this way.
    pub fn register_procedure<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Context, Value) -> NativeOutcome + 'static,
    {
        let proc_value = self.heap.alloc(HeapData::Procedure(Rc::new(f)));
        let sym = self.sym(name);
        let top_env = self.top_env;
        env::set_symbol_local(&mut self.heap, top_env, sym, proc_value);
    }

    /// Binds `name` to `value` at the top level, for hosts that want to
    /// inject plain data (not just native procedures) before running a
    /// program.
    pub fn define_global(&mut self, name: &str, value: Value) {
        let sym = self.sym(name);
        let top_env = self.top_env;
        env::set_symbol_local(&mut self.heap, top_env, sym, value);
    }

    pub(crate) fn top_env(&self) -> Value {
        self.top_env
    }

    pub(crate) fn make_child_env(&mut self, parent: Value) -> Value {
        self.heap.alloc(HeapData::Env(crate::heap::EnvData { parent: Some(parent), bindings: Default::default() }))
    }

    // -- result inspection --------------------------------------------------
    //
    // The core deliberately ships no pretty-printer; these are just the
    // typed accessors a host needs to pull a native Rust value back out of
    // a `Value` handle, the "inspect results" half of the embedding
    // contract.

    /// The variant name of `v` (`"pair"`, `"number"`, ...), for diagnostics.
    pub fn type_name(&self, v: Value) -> &'static str {
        self.heap.get(v).variant_name()
    }

    pub fn is_nil(&self, v: Value) -> bool {
        v == self.nil
    }

    pub fn is_pair(&self, v: Value) -> bool {
        matches!(self.heap.get(v), HeapData::Pair(..))
    }

    pub fn pair_parts(&self, v: Value) -> Option<(Value, Value)> {
        match self.heap.get(v) {
            HeapData::Pair(car, cdr) => Some((*car, *cdr)),
            _ => None,
        }
    }

    pub fn number_value(&self, v: Value) -> Option<f64> {
        match self.heap.get(v) {
            HeapData::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn boolean_value(&self, v: Value) -> Option<bool> {
        match self.heap.get(v) {
            HeapData::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn char_value(&self, v: Value) -> Option<u32> {
        match self.heap.get(v) {
            HeapData::Char(c) => Some(*c),
            _ => None,
        }
    }

    pub fn string_value(&self, v: Value) -> Option<&str> {
        match self.heap.get(v) {
            HeapData::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn symbol_name(&self, v: Value) -> Option<&str> {
        match self.heap.get(v) {
            HeapData::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn vector_items(&self, v: Value) -> Option<&[Value]> {
        match self.heap.get(v) {
            HeapData::Vector(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Collects a proper list into a `Vec`, in order. Returns `None` if `v`
    /// is not `NIL` and not a chain of pairs terminated by `NIL`.
    pub fn list_items(&self, mut v: Value) -> Option<Vec<Value>> {
        let mut out = Vec::new();
        loop {
            match self.heap.get(v) {
                HeapData::Nil => return Some(out),
                HeapData::Pair(car, cdr) => {
                    out.push(*car);
                    v = *cdr;
                }
                _ => return None,
            }
        }
    }

    // -- heap access -------------------------------------------------------

    pub(crate) fn heap_ref(&self) -> &Heap {
        &self.heap
    }

    pub(crate) fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Pins `v` so a collection cannot reclaim it, independent of whether
    /// anything else references it. Part of the embedding API: a host
    /// holding a `Value` across calls into this `Context` must pin it
    /// first.
    pub fn pin(&mut self, v: Value) {
        self.heap.pin(v);
    }

    pub fn unpin(&mut self, v: Value) {
        self.heap.unpin(v);
    }

    /// Releases a port's host resource immediately, without waiting for it
    /// to be swept. A no-op if `v` is not a port, so a host need not check
    /// the type first.
    pub fn close_port(&mut self, v: Value) {
        if let HeapData::Port(port) = self.heap.get_mut(v) {
            port.finalize();
        }
    }

    pub fn stats(&self) -> HeapStats {
        self.heap.stats()
    }

    // -- error slot --------------------------------------------------------

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn pending_error(&self) -> Option<ErrorInfo> {
        self.error.as_ref().map(|e| ErrorInfo { symbol: e.symbol, param: e.param, continuation: e.continuation })
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Installs `(symbol, param, continuation)` as the pending error. A
    /// programming error to call while one is already pending — the sticky
    /// slot holds exactly one error at a time.
    pub(crate) fn raise_value(&mut self, symbol: Value, param: Value, continuation: Option<Value>) {
        assert!(self.error.is_none(), "raise called while an error is already pending");
        if let Some(t) = &mut self.tracer {
            t.on_error(symbol, param);
        }
        self.error = Some(ErrorSlot { symbol, param, continuation });
    }

    /// As [`Context::raise_value`], but for one of the closed canonical
    /// kinds (`undefined-identifier`, `bad-argument-type`, ...), rendered to
    /// its kebab-case symbol name via `strum`.
    pub(crate) fn raise(&mut self, kind: CanonicalError, param: Option<Value>, continuation: Option<Value>) {
        let name: &'static str = kind.into();
        let symbol = self.sym(name);
        let param = param.unwrap_or(self.nil);
        self.raise_value(symbol, param, continuation);
    }

    fn raise_runtime(&mut self, err: RuntimeError, continuation: Option<Value>) {
        self.raise(err.kind, err.param, continuation);
    }

    // -- stepping ------------------------------------------------------------

    /// Asserts and records that `cont` is the continuation currently
    /// executing a step: the current continuation is set only while a
    /// single `step()` is in flight, which is what lets a native procedure
    /// re-enter the VM (via [`Context::apply`]) against the right
    /// continuation.
    pub(crate) fn enter_step(&mut self, cont: Value) {
        assert!(self.current_continuation.is_none(), "step() called while already stepping");
        self.current_continuation = Some(cont);
    }

    pub(crate) fn exit_step(&mut self) {
        self.current_continuation = None;
    }

    pub(crate) fn current_continuation(&self) -> Value {
        self.current_continuation.expect("current_continuation() called outside of a step")
    }

    pub(crate) fn trace_step(&mut self, ip: usize, depth: usize) {
        if let Some(t) = &mut self.tracer {
            t.on_step(ip, depth);
        }
    }

    pub(crate) fn max_recursion_depth(&self) -> usize {
        self.max_recursion_depth
    }

    pub fn set_max_recursion_depth(&mut self, depth: usize) {
        self.max_recursion_depth = depth;
    }

    pub fn set_tracer(&mut self, tracer: impl VmTracer + 'static) {
        self.tracer = Some(Box::new(tracer));
    }

    pub fn clear_tracer(&mut self) {
        self.tracer = None;
    }

    /// Re-entrant application entry point for native procedures that need
    /// to call back into Scheme (`apply`, `call-with-current-continuation`):
    /// applies `callee` to `args` against the continuation currently
    /// stepping. Must only be called from within a native procedure's own
    /// body, i.e. while a step is in flight.
    pub(crate) fn apply(&mut self, callee: Value, args: Value) {
        let cont = self.current_continuation();
        vm::apply_value(self, cont, callee, args, false);
    }

    // -- GC --------------------------------------------------------------

    /// Runs a full mark-and-sweep collection rooted at the top environment
    /// plus the pending error's `param`/`continuation` (deliberately *not*
    /// its `symbol` — see `DESIGN.md`), in addition to every pinned value.
    pub fn gc(&mut self) -> usize {
        let mut roots = vec![self.top_env];
        if let Some(e) = &self.error {
            roots.push(e.param);
            if let Some(c) = e.continuation {
                roots.push(c);
            }
        }
        let reclaimed = self.heap.collect(roots);
        self.interner.retain_live(&self.heap);
        if let Some(t) = &mut self.tracer {
            t.on_gc(reclaimed);
        }
        reclaimed
    }

    fn maybe_gc(&mut self) {
        if let Some(threshold) = self.gc_config.allocations_between_gc {
            if self.heap.allocations_since_gc >= threshold {
                self.gc();
            }
        }
    }

    // -- top-level execution -----------------------------------------------

    /// Reads, macro-expands, compiles and runs every form in `source` to
    /// completion, returning the last form's value. `file_name` names the
    /// source for diagnostics and becomes half of a reader error's
    /// `(source . offset)` parameter. Returns `None` exactly when
    /// [`Context::has_error`] is true afterward.
    pub fn execute(&mut self, source: &str, file_name: &str) -> Option<Value> {
        assert!(!self.has_error(), "execute called while an error is already pending; call clear_error first");

        let file_sym = self.sym(file_name);
        let mut pos_table = PosTable::new();
        let forms = match reader::read_all(self, source, file_sym, &mut pos_table) {
            Ok(v) => v,
            Err(err) => {
                self.raise_runtime(err, None);
                return None;
            }
        };

        let Some((expanded, pos_table)) = expander::expand_all(self, forms, &pos_table) else {
            // `expand_all` already installed the pending error itself.
            return None;
        };

        let code = match compiler::compile(self, expanded, &pos_table) {
            Ok(c) => c,
            Err(err) => {
                self.raise_runtime(err, None);
                return None;
            }
        };

        let code_value = self.heap.alloc(HeapData::Code(Rc::new(code)));
        let top_env = self.top_env;
        let closure = self.heap.alloc(HeapData::Closure(top_env, code_value));
        let cont = vm::make_continuation(self);
        vm::push_frame(self, cont, Frame { env: top_env, closure, ip: 0 });

        let result = loop {
            match vm::step(self, cont) {
                vm::StepOutcome::Active => continue,
                vm::StepOutcome::Done(v) => break Some(v),
                vm::StepOutcome::Faulted => break None,
            }
        };
        self.maybe_gc();
        result
    }

    /// As [`Context::execute`], reading the program from a file on disk.
    /// The file's path (lossily converted to UTF-8) is used as the source
    /// name.
    pub fn execute_file(&mut self, path: &Path) -> std::io::Result<Option<Value>> {
        let source = std::fs::read_to_string(path)?;
        let file_name = path.to_string_lossy().into_owned();
        Ok(self.execute(&source, &file_name))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard around a [`Context::pin`]/[`Context::unpin`] pair. Holds
/// `&mut Context` itself (rather than just `&mut Heap`) so a value can stay
/// pinned across calls, like [`vm::step`], that need the whole `Context`,
/// not just its heap. [`Pinned::ctx`] reborrows the inner `Context` for
/// those calls without giving up the pin.
pub(crate) struct Pinned<'a> {
    ctx: &'a mut Context,
    value: Value,
}

impl<'a> Pinned<'a> {
    pub(crate) fn new(ctx: &'a mut Context, value: Value) -> Self {
        ctx.pin(value);
        Self { ctx, value }
    }

    pub(crate) fn value(&self) -> Value {
        self.value
    }

    pub(crate) fn ctx(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for Pinned<'_> {
    fn drop(&mut self) {
        self.ctx.unpin(self.value);
    }
}
