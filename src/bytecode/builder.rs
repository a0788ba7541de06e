//! Incremental code assembly, kept as its own small type so the compiler can
//! record a jump's target index before the jump distance is known and patch
//! it in once the jumped-over instructions have been emitted.

use crate::bytecode::code::CodeBlock;
use crate::bytecode::op::Opcode;
use crate::heap::Value;
use crate::pos::FilePos;

pub(crate) struct CodeBuilder {
    ops: Vec<Opcode>,
    positions: Vec<Option<FilePos>>,
    formals: Vec<Value>,
    rest: Option<Value>,
}

/// A placeholder index returned by [`CodeBuilder::emit_placeholder`], later
/// resolved with [`CodeBuilder::patch_skip`] once the forward distance is
/// known.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PatchSite(usize);

impl CodeBuilder {
    pub(crate) fn new(formals: Vec<Value>, rest: Option<Value>) -> Self {
        Self {
            ops: Vec::new(),
            positions: Vec::new(),
            formals,
            rest,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }

    pub(crate) fn emit(&mut self, op: Opcode, pos: Option<FilePos>) -> usize {
        self.ops.push(op);
        self.positions.push(pos);
        self.ops.len() - 1
    }

    /// Emits a `Skip`/`SkipIfFalse` with a temporary zero distance and
    /// returns a handle to patch in the real distance later.
    pub(crate) fn emit_placeholder(&mut self, skip_if_false: bool, pos: Option<FilePos>) -> PatchSite {
        let op = if skip_if_false {
            Opcode::SkipIfFalse(0)
        } else {
            Opcode::Skip(0)
        };
        PatchSite(self.emit(op, pos))
    }

    /// Patches a previously-emitted placeholder so it jumps to the builder's
    /// current end-of-stream position.
    pub(crate) fn patch_to_here(&mut self, site: PatchSite) {
        let target = self.ops.len();
        let distance = (target - site.0 - 1) as i32;
        match &mut self.ops[site.0] {
            Opcode::Skip(d) | Opcode::SkipIfFalse(d) => *d = distance,
            other => panic!("patch_to_here on non-skip opcode {other:?}"),
        }
    }

    pub(crate) fn ops(&self) -> &[Opcode] {
        &self.ops
    }

    /// Rewrites the final `Apply` in the stream (if any) to `TailApply`,
    /// used by the tail-call analysis pass once it has established that
    /// nothing but unconditional skips follows a call.
    pub(crate) fn upgrade_to_tail(&mut self, index: usize) {
        if let Opcode::Apply(n) = self.ops[index] {
            self.ops[index] = Opcode::TailApply(n);
        }
    }

    pub(crate) fn finish(self) -> CodeBlock {
        CodeBlock {
            ops: self.ops,
            positions: self.positions,
            formals: self.formals,
            rest: self.rest,
        }
    }
}
