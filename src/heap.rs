//! The tagged heap: every Scheme-visible value — including numbers, characters
//! and booleans, not just compound structures — is an object tracked by a
//! single arena with a mark bit and a pin count. Rather than raw,
//! possibly-dangling pointers, values are `HeapId` indices into a
//! free-list-backed slot vector: slots never move, so a `Value` stays valid
//! for as long as it is reachable, and freed slots are recycled by later
//! allocations, keeping a non-moving collector's handles stable across a
//! collection.

use std::rc::Rc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::bytecode::CodeBlock;

/// Index into [`Heap`]'s slot vector. Stable across garbage collections
/// because the collector never moves live slots.
pub(crate) type HeapId = u32;

/// A handle to a heap-resident Scheme value.
///
/// `Value` is `Copy` and carries no payload itself — every observation
/// (`eq?`, type dispatch, field access) goes through [`Heap::get`]. Two
/// `Value`s compare equal exactly when they name the same heap slot, which
/// is precisely Scheme's `eq?` identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(pub(crate) HeapId);

impl Value {
    /// Raw slot index, exposed for diagnostics and position-table keys.
    #[must_use]
    pub fn raw_id(self) -> u32 {
        self.0
    }
}

/// One call frame: the environment it runs in, the closure it is a body
/// of, and its instruction pointer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub env: Value,
    pub closure: Value,
    pub ip: usize,
}

/// A reified execution snapshot: a stack of call frames plus an operand
/// stack, callable as a first-class value.
#[derive(Debug, Clone, Default)]
pub(crate) struct ContinuationData {
    pub frames: Vec<Frame>,
    pub stack: Vec<Value>,
}

/// An environment frame: a symbol-to-value mapping plus an optional parent.
#[derive(Debug, Clone, Default)]
pub(crate) struct EnvData {
    pub parent: Option<Value>,
    pub bindings: AHashMap<Value, Value>,
}

/// A host-owned I/O handle. Only the three standard ports (stdin/stdout/
/// stderr) are constructed by the core; a host may register others via
/// `Context::make_port`.
pub(crate) enum PortData {
    Stdin,
    Stdout,
    Stderr,
    /// An in-memory sink, mostly useful for tests and embedding scenarios
    /// that want to capture `write-char` output without touching the OS.
    Buffer(String),
    /// Marks a port whose host resource has already been released.
    Closed,
}

impl PortData {
    pub(crate) const READ: u8 = 1;
    pub(crate) const WRITE: u8 = 2;

    /// Which of [`PortData::READ`]/[`PortData::WRITE`] this port supports,
    /// consulted by `write-char` so writing to `stdin-port` (or a port a
    /// collection already closed) fails instead of silently doing nothing.
    pub(crate) fn mode(&self) -> u8 {
        match self {
            PortData::Stdin => Self::READ,
            PortData::Stdout | PortData::Stderr | PortData::Buffer(_) => Self::WRITE,
            PortData::Closed => 0,
        }
    }

    pub(crate) fn write_byte(&mut self, byte: u8) {
        match self {
            PortData::Stdout => {
                use std::io::Write;
                let _ = std::io::stdout().write_all(&[byte]);
            }
            PortData::Stderr => {
                use std::io::Write;
                let _ = std::io::stderr().write_all(&[byte]);
            }
            PortData::Buffer(s) => s.push(byte as char),
            PortData::Stdin | PortData::Closed => {}
        }
    }

    /// Releases any host resource. Ports here are all stdlib-backed and
    /// need no explicit release, but the hook exists for hosts that extend
    /// `PortData` indirectly by wrapping file handles in a `Buffer`-like
    /// variant of their own encoding.
    pub(crate) fn finalize(&mut self) {
        *self = PortData::Closed;
    }
}

pub(crate) type NativeProc = dyn Fn(&mut crate::context::Context, Value) -> crate::error::NativeOutcome;

/// The tagged payload behind a live [`Value`].
pub(crate) enum HeapData {
    Nil,
    Boolean(bool),
    Omitted,
    Pair(Value, Value),
    /// Interned identifier text. Identity (which table it was produced
    /// from, case-insensitive or case-sensitive) lives in `Interner`, not
    /// here — two `Symbol`s with the same text are always the same `Value`
    /// within one interning pool.
    Symbol(Box<str>),
    Number(f64),
    Char(u32),
    Str(String),
    Vector(Vec<Value>),
    Code(Rc<CodeBlock>),
    Closure(Value, Value),
    Procedure(Rc<NativeProc>),
    Continuation(ContinuationData),
    Env(EnvData),
    Port(PortData),
}

impl HeapData {
    pub(crate) fn variant_name(&self) -> &'static str {
        match self {
            HeapData::Nil => "nil",
            HeapData::Boolean(_) => "boolean",
            HeapData::Omitted => "omitted",
            HeapData::Pair(..) => "pair",
            HeapData::Symbol(_) => "symbol",
            HeapData::Number(_) => "number",
            HeapData::Char(_) => "char",
            HeapData::Str(_) => "string",
            HeapData::Vector(_) => "vector",
            HeapData::Code(_) => "code",
            HeapData::Closure(..) => "closure",
            HeapData::Procedure(_) => "procedure",
            HeapData::Continuation(_) => "continuation",
            HeapData::Env(_) => "env",
            HeapData::Port(_) => "port",
        }
    }

    /// Direct child `Value`s, used by the mark phase. Cloning here is cheap:
    /// every child is itself just a `Copy` `HeapId`.
    fn children(&self) -> SmallVec<[Value; 4]> {
        match self {
            HeapData::Pair(car, cdr) => SmallVec::from_slice(&[*car, *cdr]),
            HeapData::Closure(env, code) => SmallVec::from_slice(&[*env, *code]),
            HeapData::Env(env) => {
                let mut kids = SmallVec::new();
                if let Some(p) = env.parent {
                    kids.push(p);
                }
                for (k, v) in &env.bindings {
                    kids.push(*k);
                    kids.push(*v);
                }
                kids
            }
            HeapData::Continuation(cont) => {
                let mut kids: SmallVec<[Value; 4]> = cont.stack.iter().copied().collect();
                for frame in &cont.frames {
                    kids.push(frame.env);
                    kids.push(frame.closure);
                }
                kids
            }
            HeapData::Code(code) => code.embedded_constants(),
            HeapData::Vector(items) => items.iter().copied().collect(),
            HeapData::Nil
            | HeapData::Boolean(_)
            | HeapData::Omitted
            | HeapData::Symbol(_)
            | HeapData::Number(_)
            | HeapData::Char(_)
            | HeapData::Str(_)
            | HeapData::Procedure(_)
            | HeapData::Port(_) => SmallVec::new(),
        }
    }
}

struct Slot {
    data: Option<HeapData>,
    mark: bool,
    pin: u32,
}

/// Summary of live/free slot counts, mirroring what a host would want to
/// log or expose in a debugging dashboard.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapStats {
    pub live: usize,
    pub free: usize,
    pub total: usize,
}

/// The Context's single value arena.
pub(crate) struct Heap {
    slots: Vec<Slot>,
    free: Vec<HeapId>,
    /// Allocation count since the last collection; consulted by
    /// `GcConfig` to decide whether an opportunistic GC is due.
    pub(crate) allocations_since_gc: usize,
}

impl Heap {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            allocations_since_gc: 0,
        }
    }

    pub(crate) fn alloc(&mut self, data: HeapData) -> Value {
        self.allocations_since_gc += 1;
        if let Some(id) = self.free.pop() {
            self.slots[id as usize] = Slot {
                data: Some(data),
                mark: false,
                pin: 0,
            };
            return Value(id);
        }
        let id = self.slots.len() as HeapId;
        self.slots.push(Slot {
            data: Some(data),
            mark: false,
            pin: 0,
        });
        Value(id)
    }

    /// Allocates a value that is never swept: used only for the four
    /// Context-lifetime singletons (NIL, TRUE, FALSE, OMITTED).
    pub(crate) fn alloc_permanent(&mut self, data: HeapData) -> Value {
        let v = self.alloc(data);
        self.slots[v.0 as usize].pin = 1;
        v
    }

    pub(crate) fn get(&self, v: Value) -> &HeapData {
        self.slots[v.0 as usize]
            .data
            .as_ref()
            .expect("dereferenced a value whose slot has been collected")
    }

    pub(crate) fn get_mut(&mut self, v: Value) -> &mut HeapData {
        self.slots[v.0 as usize]
            .data
            .as_mut()
            .expect("dereferenced a value whose slot has been collected")
    }

    pub(crate) fn is_live(&self, v: Value) -> bool {
        matches!(self.slots.get(v.0 as usize), Some(Slot { data: Some(_), .. }))
    }

    pub(crate) fn pin(&mut self, v: Value) {
        self.slots[v.0 as usize].pin += 1;
    }

    pub(crate) fn unpin(&mut self, v: Value) {
        let slot = &mut self.slots[v.0 as usize];
        assert!(slot.pin > 0, "unpin without matching pin");
        slot.pin -= 1;
    }

    /// Runs a full mark-and-sweep collection. `roots` are additional roots
    /// beyond pinned values: the top environment and the pending error's
    /// parameter/continuation.
    pub(crate) fn collect(&mut self, roots: impl IntoIterator<Item = Value>) -> usize {
        for slot in &mut self.slots {
            slot.mark = false;
        }

        let mut stack: Vec<Value> = roots.into_iter().collect();
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot.pin > 0 && slot.data.is_some() {
                stack.push(Value(idx as HeapId));
            }
        }

        // Iterative mark to avoid blowing the native stack on long lists
        // or deep environments.
        while let Some(v) = stack.pop() {
            let idx = v.0 as usize;
            if self.slots[idx].mark {
                continue;
            }
            self.slots[idx].mark = true;
            if let Some(data) = &self.slots[idx].data {
                stack.extend(data.children());
            }
        }

        let mut collected = 0;
        for idx in 0..self.slots.len() {
            if !self.slots[idx].mark && self.slots[idx].data.is_some() {
                if let Some(HeapData::Port(port)) = &mut self.slots[idx].data {
                    port.finalize();
                }
                self.slots[idx].data = None;
                self.free.push(idx as HeapId);
                collected += 1;
            }
        }
        self.allocations_since_gc = 0;
        collected
    }

    pub(crate) fn stats(&self) -> HeapStats {
        let live = self.slots.iter().filter(|s| s.data.is_some()).count();
        HeapStats {
            live,
            free: self.slots.len() - live,
            total: self.slots.len(),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.data.is_none())
    }
}
