//! wisp: an embeddable interpreter core for a small Scheme-like S-expression
//! language — reader, macro expander, bytecode compiler and a
//! continuation-based virtual machine over a mark-and-sweep heap.
//!
//! The crate is a library with one public entry point, [`Context`]: one heap,
//! one top-level environment, one sticky pending-error slot. A host embeds
//! wisp by constructing a `Context`, optionally registering additional native
//! procedures or global bindings, then calling [`Context::execute`] or
//! [`Context::execute_file`].
//!
//! ```
//! use wisp::Context;
//!
//! let mut ctx = Context::new();
//! let result = ctx.execute("(add2 1 2)", "<example>").expect("no error");
//! assert_eq!(ctx.number_value(result), Some(3.0));
//! ```

mod builtins;
mod bytecode;
mod compiler;
mod context;
mod env;
mod error;
mod expander;
mod heap;
mod intern;
mod pos;
mod reader;
pub mod resource;
pub mod tracer;
mod vm;

pub use crate::context::Context;
pub use crate::error::{param, CanonicalError, ErrorInfo, NativeOutcome};
pub use crate::heap::{HeapStats, Value};
pub use crate::pos::FilePos;
pub use crate::resource::{GcConfig, DEFAULT_MAX_RECURSION_DEPTH};
pub use crate::tracer::{NoopTracer, StderrTracer, VmTracer};
