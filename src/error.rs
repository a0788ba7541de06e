//! Error representation.
//!
//! The error model is a single sticky `(symbol, param, continuation)` triple
//! per `Context`, where the symbol naming the error is itself an ordinary
//! Scheme symbol — the `error` primitive can raise *any* symbol a host or
//! user program names, not just the handful the core itself raises. That
//! means the public, sticky error slot (see [`crate::context::Context`])
//! cannot be a closed Rust enum.
//!
//! What *is* closed is the set of kinds the reader, compiler and VM
//! themselves raise (`bad-character`, `undefined-identifier`, and so on).
//! [`RuntimeError`] models exactly that closed set: it exists purely for
//! `?`-based propagation inside the reader/compiler/VM, and is converted
//! into the sticky error slot (an interned symbol plus parameter) at the
//! `Context` boundary. It never escapes the crate.

use strum::{Display, EnumString, IntoStaticStr};

use crate::heap::Value;

/// Canonical error kinds the core itself can raise. `strum`'s
/// `serialize_all = "kebab-case"` rendering gives each variant the matching
/// Scheme symbol name (`BadCharacter` -> `bad-character`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum CanonicalError {
    BadCharacter,
    BadString,
    ParseErrorParenthesis,
    ParseErrorUnexpected,
    BadSyntax,
    BadMacroExpander,
    UnannotateFailed,
    UndefinedIdentifier,
    BadArgumentCount,
    BadArgumentType,
    RecursionDepthExceeded,
}

/// Well-known sub-symbols used as the `param` of a `bad-argument-count` or
/// `bad-argument-type` error. `EXPECTING_PROCEDURE` is this crate's own
/// choice of param for the VM-level "APPLY against a non-callable" case
/// (see `vm::apply_value`); the rest name the positional type-pattern codes
/// (`p n b s q w o c l`).
pub mod param {
    pub const TOO_FEW: &str = "too-few";
    pub const TOO_MANY: &str = "too-many";
    pub const EXPECTING_PAIR: &str = "expecting-pair";
    pub const EXPECTING_NUMBER: &str = "expecting-number";
    pub const EXPECTING_BOOLEAN: &str = "expecting-boolean";
    pub const EXPECTING_SYMBOL: &str = "expecting-symbol";
    pub const EXPECTING_PORT: &str = "expecting-port";
    pub const EXPECTING_CLOSURE: &str = "expecting-closure";
    pub const EXPECTING_CODE: &str = "expecting-code";
    pub const EXPECTING_CHAR: &str = "expecting-char";
    pub const EXPECTING_LIST: &str = "expecting-list";
    pub const EXPECTING_PROCEDURE: &str = "expecting-procedure";
}

/// Internal propagation error for the reader, compiler and VM dispatch
/// loop. `param` is `None` when the canonical kind carries no parameter
/// (most reader errors); `Some` when it does (argument-type/count errors).
#[derive(Debug, Clone, Copy)]
pub(crate) struct RuntimeError {
    pub kind: CanonicalError,
    pub param: Option<Value>,
}

impl RuntimeError {
    pub(crate) fn new(kind: CanonicalError) -> Self {
        Self { kind, param: None }
    }

    pub(crate) fn with_param(kind: CanonicalError, param: Value) -> Self {
        Self { kind, param: Some(param) }
    }
}

pub(crate) type RResult<T> = std::result::Result<T, RuntimeError>;

/// The public, host-visible pending-error snapshot: a copy of the sticky
/// `(symbol, param, continuation)` triple, returned by
/// `Context::pending_error`.
#[derive(Debug, Clone, Copy)]
pub struct ErrorInfo {
    pub symbol: Value,
    pub param: Value,
    pub continuation: Option<Value>,
}

/// What a native procedure hands back to the VM: either an ordinary return
/// value, "no value" (the `OMITTED` sentinel, meaning "push nothing"), or an
/// already-constructed error to install into the sticky slot.
/// `NativeOutcome` lets a native procedure raise an *arbitrary* symbol, not
/// just one of the canonical kinds, matching the `error` primitive's own
/// open-ended symbol domain.
pub enum NativeOutcome {
    Value(Value),
    /// Suppress pushing anything onto the operand stack (the `OMITTED`
    /// convention used by procedures called only for side effect).
    NoValue,
    /// Raise `(symbol, param)` against the currently executing
    /// continuation.
    Raise { symbol: Value, param: Value },
}
