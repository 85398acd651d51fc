//! Tracer trait for observing graph activity.
//!
//! The default [`NoopTracer`] makes observation zero-cost: every callback
//! has an empty `#[inline]` default, so a graph without a real tracer pays
//! nothing. Install an implementation with
//! [`Graph::with_tracer`](crate::Graph::with_tracer) to feed dashboards,
//! tests, or ad-hoc debugging.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use tickflow::{Graph, Tracer, WorkId};
//!
//! #[derive(Default)]
//! struct EvalCounter(AtomicUsize);
//!
//! impl Tracer for EvalCounter {
//!     fn on_evaluated(&self, _id: WorkId) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//!
//! let counter = Arc::new(EvalCounter::default());
//! let graph = Graph::with_tracer(counter.clone());
//! ```

use crate::graph::Stats;
use crate::work::WorkId;

/// Observer of graph activity.
///
/// Implementations must be `Send + Sync`: callbacks fire from whichever
/// thread schedules work or runs a tick, concurrently.
pub trait Tracer: Send + Sync + 'static {
    /// A work item was appended to the graph queue. Not called when a
    /// schedule finds the work already queued.
    #[inline]
    fn on_scheduled(&self, _id: WorkId) {}

    /// A non-empty tick began.
    #[inline]
    fn on_tick_start(&self) {}

    /// A work item was evaluated.
    #[inline]
    fn on_evaluated(&self, _id: WorkId) {}

    /// A tick finished with the given counters.
    #[inline]
    fn on_tick_end(&self, _stats: &Stats) {}
}

/// Tracer that discards every event; the default for
/// [`Graph::new`](crate::Graph::new).
pub struct NoopTracer;

impl Tracer for NoopTracer {}
