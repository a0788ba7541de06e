//! Compiled code blocks: a flat instruction stream plus the formal parameter
//! list a closure binds when invoked with it.

use smallvec::SmallVec;

use crate::bytecode::op::Opcode;
use crate::heap::Value;
use crate::pos::FilePos;

/// One compiled lambda body (or the implicit top-level body compiled from a
/// file's forms). Stored behind `Rc` inside a heap `Code` value so cloning a
/// closure over it is cheap.
pub(crate) struct CodeBlock {
    pub ops: Vec<Opcode>,
    /// Parallel to `ops`; the source position blamed for a runtime error
    /// raised while executing that instruction, if known.
    pub positions: Vec<Option<FilePos>>,
    /// Required positional parameters, in binding order.
    pub formals: Vec<Value>,
    /// Optional rest parameter collecting any arguments past `formals`.
    pub rest: Option<Value>,
}

impl CodeBlock {
    /// Every `Value` directly embedded in this block's instructions or
    /// formal list, for the GC mark phase. A `Code` value never reaches
    /// inside *nested* lambda constants beyond one level — those are
    /// themselves `Value`s returned here, and marking recurses into them
    /// the same way it recurses into a closure's environment.
    pub(crate) fn embedded_constants(&self) -> SmallVec<[Value; 4]> {
        let mut out: SmallVec<[Value; 4]> = self.ops.iter().filter_map(Opcode::embedded_value).collect();
        out.extend(self.formals.iter().copied());
        if let Some(rest) = self.rest {
            out.push(rest);
        }
        out
    }
}
