//! Tickflow: a concurrent dataflow graph evaluator.
//!
//! A graph holds computation nodes, each wrapping a pure function over typed
//! inputs. External producers append values into input slots from any
//! thread; evaluator threads drain the graph's lock-free work queue one tick
//! at a time, re-running affected nodes and the transitive closure of their
//! dependents in topological-id order.
//!
//! # Key properties
//!
//! - **Lock-free scheduling**: appending and enqueueing never block; a work
//!   item sits on the queue at most once no matter how many producers
//!   schedule it.
//! - **Coalesced fan-in**: within one tick a node runs at most once, even
//!   when several upstreams feed it (a diamond runs its sink exactly once).
//! - **Cycle-safe**: a back edge defers exactly one hop to the next tick, so
//!   feedback loops advance without unbounded work in a single pass.
//! - **Propagation policies**: push every output ([`Always`]), only changed
//!   outputs ([`OnChange`]), or carry state through a feedback edge without
//!   waking yourself ([`Weak`]).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tickflow::{unconnected, Cell, Connectable, Graph, Input};
//!
//! let graph = Graph::new();
//! let sink = Arc::new(Cell::<i32>::default());
//!
//! let adder = graph
//!     .node()
//!     .connect(|a: i32, b: i32| a + b, (unconnected(), unconnected()));
//! adder.connect(Input::external(&sink));
//!
//! let (a, b) = adder.inputs();
//! a.append(&graph, 1);
//! b.append(&graph, 2);
//!
//! graph.tick(None);
//! assert_eq!(sink.load(), 3);
//! ```
//!
//! # Threads
//!
//! Any number of threads may append values, connect or disconnect inputs,
//! and run ticks concurrently. A typical deployment dedicates one thread to
//! [`evaluate_repeatedly`], a busy loop that yields when the queue is empty
//! and exits when an external stop flag is set.

mod cell;
mod graph;
mod input;
mod node;
mod policy;
pub mod tracer;
mod work;

pub use cell::{Cell, Value};
pub use graph::{evaluate_repeatedly, Graph, Stats};
pub use input::{connect, unconnected, Connectable, Constant, Input};
pub use node::{Inputs, Node, NodeBuilder, NodeFn, NodeHandle};
pub use policy::{
    Always, AlwaysState, OnChange, OnChangeState, Policy, PolicyState, Weak, WeakState,
};
pub use tracer::{NoopTracer, Tracer};
pub use work::WorkId;
