//! Calculation nodes and the builder that wires them into a graph.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use crossbeam_utils::Backoff;

use crate::cell::{Cell, Value};
use crate::graph::{Graph, WorkState};
use crate::input::{connect, Connectable, Input};
use crate::policy::{Policy, PolicyState};
use crate::work::{publish, Header, LockGuard, Work, WorkId, WorkRef};

mod sealed {
    pub trait Sealed {}
}

/// The input tuple of a node: per-slot cells, snapshot values, handle and
/// source types. Implemented for tuples of [`Value`] types up to arity 6.
pub trait Inputs: sealed::Sealed + Send + Sync + 'static {
    /// One cell per function parameter.
    type Cells: Default + Send + Sync + 'static;
    /// A snapshot of every cell, as passed to the node function.
    type Values;
    /// One [`Input`] handle per parameter.
    type Handles;
    /// One optional upstream source per parameter.
    type Sources<'a>;

    /// Atomically read every cell.
    fn snapshot(cells: &Self::Cells) -> Self::Values;

    /// Build the input handles, each holding a strong reference to `owner`.
    fn handles(cells: &Self::Cells, owner: &WorkRef) -> Self::Handles;

    /// Wire each present source to the matching handle.
    fn connect_sources(sources: Self::Sources<'_>, handles: Self::Handles);
}

/// A node function over the input tuple `I`. Implemented for `Fn` closures
/// and function pointers whose arguments are [`Value`] types and whose
/// return type is a [`Value`].
pub trait NodeFn<I: Inputs>: Send + Sync + 'static {
    /// The computed output type.
    type Output: Value;

    /// Invoke the function on a snapshot of the inputs.
    fn call(&self, values: I::Values) -> Self::Output;
}

macro_rules! tuple_inputs {
    ($(($($ty:ident $val:ident $idx:tt),+))+) => {$(
        impl<$($ty: Value),+> sealed::Sealed for ($($ty,)+) {}

        impl<$($ty: Value),+> Inputs for ($($ty,)+) {
            type Cells = ($(Cell<$ty>,)+);
            type Values = ($($ty,)+);
            type Handles = ($(Input<$ty>,)+);
            type Sources<'a> = ($(Option<&'a dyn Connectable<$ty>>,)+);

            fn snapshot(cells: &Self::Cells) -> Self::Values {
                ($(cells.$idx.load(),)+)
            }

            fn handles(cells: &Self::Cells, owner: &WorkRef) -> Self::Handles {
                ($(Input::owned(&cells.$idx, owner.clone()),)+)
            }

            fn connect_sources(sources: Self::Sources<'_>, handles: Self::Handles) {
                $(connect(sources.$idx, handles.$idx);)+
            }
        }

        impl<Func, Ret, $($ty),+> NodeFn<($($ty,)+)> for Func
        where
            Func: Fn($($ty),+) -> Ret + Send + Sync + 'static,
            Ret: Value,
            $($ty: Value),+
        {
            type Output = Ret;

            fn call(&self, ($($val,)+): ($($ty,)+)) -> Ret {
                (self)($($val),+)
            }
        }
    )+};
}

tuple_inputs! {
    (A a 0)
    (A a 0, B b 1)
    (A a 0, B b 1, C c 2)
    (A a 0, B b 1, C c 2, D d 3)
    (A a 0, B b 1, C c 2, D d 3, E e 4)
    (A a 0, B b 1, C c 2, D d 3, E e 4, G g 5)
}

/// A work item that evaluates a function over its input cells and propagates
/// the result to connected inputs, subject to its propagation policy.
///
/// Built through [`Graph::node`]; the node's output is a [`Connectable`], so
/// downstream inputs attach with [`Connectable::connect`].
pub struct Node<P: Policy, F: NodeFn<I>, I: Inputs> {
    header: Header,
    function: F,
    cells: I::Cells,
    policy: P::State<F::Output>,
    /// Downstream inputs; read by eval and mutated by connect/disconnect,
    /// all under this work's lock flag.
    dependents: UnsafeCell<Vec<Input<F::Output>>>,
}

// The dependents list is only touched under the lock flag; every other
// field is atomic or immutable after construction.
unsafe impl<P: Policy, F: NodeFn<I>, I: Inputs> Send for Node<P, F, I> {}
unsafe impl<P: Policy, F: NodeFn<I>, I: Inputs> Sync for Node<P, F, I> {}

impl<P: Policy, F: NodeFn<I>, I: Inputs> Node<P, F, I> {
    /// This node's graph-unique id.
    pub fn id(&self) -> WorkId {
        self.header.id()
    }

    /// The tuple of input handles, one per function parameter. Each handle
    /// keeps this node alive and schedules it on append.
    pub fn inputs(&self) -> I::Handles {
        I::handles(&self.cells, &self.self_ref())
    }

    fn self_ref(&self) -> WorkRef {
        unsafe { WorkRef::retain(self.header.this_ptr()) }
    }

    fn with_dependents_locked<R>(&self, mutate: impl FnOnce(&mut Vec<Input<F::Output>>) -> R) -> R {
        let backoff = Backoff::new();
        while !self.header.try_lock() {
            // contends with this node's own evaluation by design
            backoff.snooze();
        }
        let guard = LockGuard::new(&self.header);
        let result = mutate(unsafe { &mut *self.dependents.get() });
        drop(guard);
        result
    }
}

impl<P: Policy, F: NodeFn<I>, I: Inputs> Work for Node<P, F, I> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn eval(&self, ws: &mut WorkState) {
        if !self.header.try_lock_dequeue() {
            // another thread is evaluating this node; queue a retry instead
            ws.add_to_queue(self);
            return;
        }
        let guard = LockGuard::new(&self.header);

        // A writer may advance an input cell between the dequeue above and
        // this snapshot and re-queue the node; the next tick then re-runs on
        // values already seen here. Tolerated: functions are pure and the
        // change-detecting policy absorbs the redundant pass.
        let value = self.function.call(I::snapshot(&self.cells));

        if self.policy.accept(&value) {
            let dependents = unsafe { &*self.dependents.get() };
            for dependent in dependents {
                dependent.set(value.clone());
                if let Some(owner) = dependent.owner() {
                    let feeds_self = std::ptr::eq(owner.header(), &self.header);
                    if !feeds_self || self.policy.wake_self() {
                        ws.add_to_queue(owner.work());
                    }
                }
            }
        }

        drop(guard);
    }
}

impl<P: Policy, F: NodeFn<I>, I: Inputs> Connectable<F::Output> for Node<P, F, I> {
    fn connect(&self, input: Input<F::Output>) {
        self.with_dependents_locked(|dependents| dependents.push(input));
    }

    fn disconnect(&self, input: Input<F::Output>) {
        self.with_dependents_locked(|dependents| {
            dependents.retain(|existing| *existing != input)
        });
    }
}

/// A strong, cloneable handle to a built node.
///
/// Dereferences to the node for wiring (`inputs`, `connect`, `disconnect`);
/// the node stays alive at least as long as any handle.
pub struct NodeHandle<W> {
    node: NonNull<W>,
    keep: WorkRef,
}

unsafe impl<W: Send + Sync> Send for NodeHandle<W> {}
unsafe impl<W: Send + Sync> Sync for NodeHandle<W> {}

impl<W> Clone for NodeHandle<W> {
    fn clone(&self) -> Self {
        Self {
            node: self.node,
            keep: self.keep.clone(),
        }
    }
}

impl<W> Deref for NodeHandle<W> {
    type Target = W;

    fn deref(&self) -> &W {
        unsafe { self.node.as_ref() }
    }
}

/// Builder for nodes, obtained from [`Graph::node`]. Each
/// [`connect`](NodeBuilder::connect) call produces one node.
pub struct NodeBuilder<'g, P: Policy> {
    graph: &'g Graph,
    policy: PhantomData<P>,
}

impl<'g, P: Policy> NodeBuilder<'g, P> {
    pub(crate) fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            policy: PhantomData,
        }
    }

    /// Switch the propagation policy for the node being built.
    pub fn propagate<Q: Policy>(self) -> NodeBuilder<'g, Q> {
        NodeBuilder {
            graph: self.graph,
            policy: PhantomData,
        }
    }

    /// Build a node around `function`, wiring one upstream source per
    /// parameter (pass [`unconnected`](crate::unconnected) to leave a slot
    /// open), and schedule it for an initial evaluation.
    ///
    /// The initial run happens on the next tick over default-initialized
    /// inputs, so the function must accept default values for any slot no
    /// upstream has written yet.
    pub fn connect<F, I>(self, function: F, sources: I::Sources<'_>) -> NodeHandle<Node<P, F, I>>
    where
        I: Inputs,
        F: NodeFn<I>,
    {
        let node = Box::new(Node::<P, F, I> {
            header: Header::new(self.graph.next_id()),
            function,
            cells: I::Cells::default(),
            policy: P::State::<F::Output>::default(),
            dependents: UnsafeCell::new(Vec::new()),
        });
        let raw = Box::into_raw(node);
        let keep = unsafe { publish(raw) };
        let handle = NodeHandle {
            node: unsafe { NonNull::new_unchecked(raw) },
            keep,
        };

        I::connect_sources(sources, handle.inputs());
        self.graph.schedule(&*handle);

        handle
    }
}
