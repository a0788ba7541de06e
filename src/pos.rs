//! Source-position side table. The reader annotates every compound form it
//! builds with a `(source-name . byte-offset)` pair stored *outside* the
//! value graph itself, so position tracking never perturbs `eq?` identity or
//! list structure that user/macro code might inspect.

use ahash::AHashMap;

use crate::heap::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePos {
    /// The interned symbol naming the source (a file path or `"<input>"`
    /// for programmatic strings).
    pub source: Value,
    pub offset: usize,
}

/// Maps a reader-produced `Value` to the position it was read from. Keyed by
/// `Value` identity (`eq?`), since two structurally-equal-looking forms read
/// from different source locations are still distinct heap objects.
#[derive(Debug, Clone, Default)]
pub struct PosTable(AHashMap<Value, FilePos>);

impl PosTable {
    pub(crate) fn new() -> Self {
        Self(AHashMap::new())
    }

    pub(crate) fn record(&mut self, value: Value, pos: FilePos) {
        self.0.insert(value, pos);
    }

    pub fn get(&self, value: Value) -> Option<FilePos> {
        self.0.get(&value).copied()
    }
}
