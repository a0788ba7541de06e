//! Optional step-by-step execution tracing.
//!
//! No external `tracing` crate dependency: a small in-crate `VmTracer` trait
//! with no-op/recording/stderr implementations covers diagnostics without
//! pulling in a logging framework, scaled to what this VM actually needs to
//! report.

use crate::heap::Value;

/// Hooks a host can implement to observe VM execution. Both methods have
/// no-op default bodies, so a tracer only needs to override what it cares
/// about.
pub trait VmTracer {
    /// Called before each bytecode instruction executes.
    fn on_step(&mut self, ip: usize, frame_depth: usize) {
        let _ = (ip, frame_depth);
    }

    /// Called when a runtime error becomes the Context's pending error.
    fn on_error(&mut self, symbol: Value, param: Value) {
        let _ = (symbol, param);
    }

    /// Called after a collection, with the number of slots reclaimed.
    fn on_gc(&mut self, reclaimed: usize) {
        let _ = reclaimed;
    }
}

/// The default tracer: observes nothing, costs nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// A tracer that writes a line to stderr for every hook, useful when
/// debugging a hung or misbehaving program embedded in a host.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn on_step(&mut self, ip: usize, frame_depth: usize) {
        eprintln!("step ip={ip} depth={frame_depth}");
    }

    fn on_error(&mut self, symbol: Value, param: Value) {
        eprintln!("error symbol={symbol:?} param={param:?}");
    }

    fn on_gc(&mut self, reclaimed: usize) {
        eprintln!("gc reclaimed={reclaimed}");
    }
}
