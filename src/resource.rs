//! Ambient resource knobs that bound heap growth and call-frame depth,
//! without a time/memory-metered sandbox — this crate's single-threaded,
//! host-driven `step` loop has no use for one.

/// Controls whether and when `Context` runs an opportunistic collection.
///
/// Checked only at the boundary between top-level `execute()` calls, never
/// mid-step — collecting while a step is in flight would be wrong, since
/// transient on-stack values are not roots.
#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    /// Run a collection after `execute()` once at least this many
    /// allocations have happened since the last one. `None` (the default)
    /// means fully host-driven: the embedder must call `Context::gc()`
    /// itself.
    pub allocations_between_gc: Option<usize>,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self { allocations_between_gc: None }
    }
}

/// Default ceiling on non-tail call frame depth. Tail calls (`TAIL_APPLY`)
/// reuse their frame and are exempt, so this bounds only the recursion a
/// program can't express in tail position — past it, `Context` raises
/// `recursion-depth-exceeded` instead of exhausting host memory.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 10_000;
