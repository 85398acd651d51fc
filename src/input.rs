//! Inputs, connection points, and constants: the wiring surface between
//! nodes, external producers, and external sinks.

use std::ptr::NonNull;
use std::sync::Arc;

use crate::cell::{Cell, Value};
use crate::graph::Graph;
use crate::work::WorkRef;

/// A typed handle to one input slot: a value cell inside a node, or an
/// external cell read outside the graph.
///
/// Two inputs are equal when they reference the same cell, regardless of the
/// current value. The handle keeps its target alive: node-owned slots hold a
/// strong reference to the node, external slots hold the shared cell.
pub struct Input<T: Value> {
    cell: NonNull<Cell<T>>,
    anchor: Anchor<T>,
}

enum Anchor<T: Value> {
    /// The cell lives inside this work item; appending reschedules it.
    Node(WorkRef),
    /// The cell is externally owned; appending only stores.
    External(Arc<Cell<T>>),
}

impl<T: Value> Input<T> {
    /// An input backed by an external cell, e.g. a result slot read outside
    /// the graph. Appending stores the value; nothing is scheduled.
    pub fn external(cell: &Arc<Cell<T>>) -> Self {
        Self {
            cell: NonNull::from(&**cell),
            anchor: Anchor::External(cell.clone()),
        }
    }

    pub(crate) fn owned(cell: &Cell<T>, owner: WorkRef) -> Self {
        Self {
            cell: NonNull::from(cell),
            anchor: Anchor::Node(owner),
        }
    }

    /// Set the input to an externally provided value and schedule the owning
    /// node (if any) on `graph`'s work queue for re-evaluation.
    pub fn append(&self, graph: &Graph, value: T) {
        self.set(value);
        if let Anchor::Node(owner) = &self.anchor {
            graph.schedule(owner.work());
        }
    }

    /// Store without scheduling.
    pub(crate) fn set(&self, value: T) {
        unsafe { self.cell.as_ref() }.store(value);
    }

    pub(crate) fn owner(&self) -> Option<&WorkRef> {
        match &self.anchor {
            Anchor::Node(owner) => Some(owner),
            Anchor::External(_) => None,
        }
    }
}

impl<T: Value> Clone for Input<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell,
            anchor: match &self.anchor {
                Anchor::Node(owner) => Anchor::Node(owner.clone()),
                Anchor::External(cell) => Anchor::External(cell.clone()),
            },
        }
    }
}

impl<T: Value> PartialEq for Input<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cell == other.cell
    }
}

impl<T: Value> Eq for Input<T> {}

impl<T: Value> std::fmt::Debug for Input<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input").field("cell", &self.cell).finish()
    }
}

// The referenced cell stays alive for the handle's lifetime through the
// anchor, and all cell access is atomic.
unsafe impl<T: Value> Send for Input<T> {}
unsafe impl<T: Value> Sync for Input<T> {}

/// Something an [`Input`] can be attached to: a node's output or a
/// [`Constant`].
pub trait Connectable<T: Value> {
    /// Connect `input` so it receives values from this source. Thread-safe;
    /// may spin until the connection is applied.
    fn connect(&self, input: Input<T>);

    /// Disconnect `input`. No effect if it was not connected.
    fn disconnect(&self, input: Input<T>);

    /// This connectable as a builder wiring source.
    fn source(&self) -> Option<&dyn Connectable<T>>
    where
        Self: Sized,
    {
        Some(self)
    }
}

/// The "leave this input unconnected" source for builder wiring.
pub fn unconnected<T: Value>() -> Option<&'static dyn Connectable<T>> {
    None
}

/// Connect `from` to `to` when a source is present.
pub fn connect<T: Value>(to: Option<&dyn Connectable<T>>, from: Input<T>) {
    if let Some(to) = to {
        to.connect(from);
    }
}

/// A connectable that hands its fixed value to any input connected to it.
///
/// The value is written straight into the input's cell at connection time,
/// outside any tick; constants register no dependents and never participate
/// in scheduling.
pub struct Constant<T: Value> {
    value: T,
}

impl<T: Value> Constant<T> {
    /// A constant source producing `value`.
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Value> Connectable<T> for Constant<T> {
    fn connect(&self, input: Input<T>) {
        input.set(self.value.clone());
    }

    fn disconnect(&self, _input: Input<T>) {}
}
