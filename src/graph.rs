//! Graph-wide state: the intrusive work queue, tick evaluation, per-tick
//! scheduling decisions, and statistics.

use std::collections::BinaryHeap;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crate::node::NodeBuilder;
use crate::policy::Always;
use crate::tracer::{NoopTracer, Tracer};
use crate::work::{publish, Header, Work, WorkId, WorkRef, LOCK};

/// Counters for a single tick. Reset at the start of every tick; wrap on
/// overflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stats {
    /// Items drained from the work queue.
    pub queued: u16,
    /// Work items evaluated.
    pub worked: u16,
    /// Heap entries coalesced because the same work was scheduled more than
    /// once this tick.
    pub duplicates: u16,
    /// Work pushed back onto the graph queue for the next tick.
    pub pushed_graph: u16,
    /// Work pushed onto this tick's heap to run in topological-id order.
    pub pushed_heap: u16,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "queued: {}, worked: {}, duplicates: {}, pushed_graph: {}, pushed_heap: {}",
            self.queued, self.worked, self.duplicates, self.pushed_graph, self.pushed_heap
        )
    }
}

#[inline]
fn bump(counter: &mut u16) {
    *counter = counter.wrapping_add(1);
}

/// A pending heap entry owning one strong reference to its work.
struct Queued {
    id: WorkId,
    work: WorkRef,
}

impl Queued {
    fn new(work: WorkRef) -> Self {
        Self {
            id: work.header().id(),
            work,
        }
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // reversed so the binary heap pops the smallest id first
        other.id.cmp(&self.id)
    }
}

/// Per-tick scratch state: the pending min-id heap and accounting counters.
pub(crate) struct WorkState<'g> {
    graph: &'g Graph,
    heap: BinaryHeap<Queued>,
    current_id: WorkId,
    stats: Stats,
}

impl<'g> WorkState<'g> {
    fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            heap: BinaryHeap::new(),
            current_id: 0,
            stats: Stats::default(),
        }
    }

    /// Schedule `work` from inside an evaluation.
    ///
    /// Work whose id is at or below the id currently being processed goes
    /// back on the graph queue and runs next tick; this covers back-edges in
    /// cycles and a contended node rescheduling itself, and is the only
    /// thing keeping cyclic graphs from spinning forever within one tick.
    /// Work with a higher id joins this tick's heap, preserving
    /// topological-id order for forward dataflow.
    pub(crate) fn add_to_queue(&mut self, work: &dyn Work) {
        if work.header().id() <= self.current_id {
            self.graph.schedule(work);
            bump(&mut self.stats.pushed_graph);
        } else {
            let work = unsafe { WorkRef::retain(NonNull::from(work)) };
            self.heap.push(Queued::new(work));
            bump(&mut self.stats.pushed_heap);
        }
    }
}

/// The terminal work item ending the intrusive queue. Must never be reached
/// by a legitimate tick.
struct Sentinel {
    header: Header,
}

impl Work for Sentinel {
    fn header(&self) -> &Header {
        &self.header
    }

    fn eval(&self, _ws: &mut WorkState) {
        // evaluating the queue terminator means the queue is corrupted
        std::process::abort();
    }
}

/// The calculation-graph-wide state: id source, work queue head, and the
/// sentinel tail.
///
/// All methods take `&self`; share a graph across threads behind `Arc` (or
/// borrow it into scoped threads). Producers append to inputs and the queue
/// from any thread while other threads run ticks.
pub struct Graph {
    ids: AtomicU32,
    /// Head of the intrusive work queue, as a packed header address.
    head: AtomicUsize,
    sentinel: WorkRef,
    tracer: Arc<dyn Tracer>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// A new graph with no observer installed.
    pub fn new() -> Self {
        Self::with_tracer(Arc::new(NoopTracer))
    }

    /// A new graph reporting activity to `tracer`.
    pub fn with_tracer(tracer: Arc<dyn Tracer>) -> Self {
        let raw = Box::into_raw(Box::new(Sentinel {
            header: Header::new(0),
        }));
        let sentinel = unsafe { publish(raw) };
        Self {
            ids: AtomicU32::new(1),
            head: AtomicUsize::new(sentinel.header().addr()),
            sentinel,
            tracer,
        }
    }

    /// Start building a node. The default propagation policy is
    /// [`Always`](crate::Always).
    pub fn node(&self) -> NodeBuilder<'_, Always> {
        NodeBuilder::new(self)
    }

    pub(crate) fn next_id(&self) -> WorkId {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    fn sentinel_addr(&self) -> usize {
        self.sentinel.header().addr()
    }

    /// Append `work` to the work queue, returning immediately if it is
    /// already queued. Lock-free; callable from any thread, including from
    /// inside an evaluation.
    pub(crate) fn schedule(&self, work: &dyn Work) {
        let header = work.header();

        // keep the work alive while it sits on the queue
        header.retain();

        let mut first_time = true;
        loop {
            let current = header.next.load(Ordering::Acquire);
            let locked = current & LOCK;

            // A non-zero link means the work is already queued, but only
            // before our first write: once we have pointed the link at the
            // head ourselves, non-zero no longer proves someone else did.
            if first_time && (current & !LOCK) != 0 {
                drop(unsafe { WorkRef::adopt(NonNull::from(work)) });
                return;
            }

            let head = self.head.load(Ordering::Acquire);
            if header
                .next
                .compare_exchange_weak(current, head | locked, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // the link moved under us; retry from a fresh read
                continue;
            }

            if self
                .head
                .compare_exchange_weak(head, header.addr(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // the reference taken above now belongs to the queue
                self.tracer.on_scheduled(header.id());
                return;
            }

            first_time = false;
        }
    }

    /// Run one evaluation pass: everything currently on the queue, plus all
    /// downstream work transitively scheduled with an id greater than the
    /// work being processed. Returns whether any work ran.
    pub fn tick(&self, mut stats: Option<&mut Stats>) -> bool {
        if let Some(stats) = stats.as_deref_mut() {
            *stats = Stats::default();
        }

        let sentinel = self.sentinel_addr();
        let head = self.head.swap(sentinel, Ordering::AcqRel);
        if head == sentinel {
            return false;
        }

        self.tracer.on_tick_start();
        let mut ws = WorkState::new(self);

        // Move the drained list into the heap; each entry adopts the strong
        // reference its schedule() took. Links are left as they are so a
        // concurrent schedule still sees the work as pending until it is
        // dequeued by its own evaluation. A zero link mid-walk means a
        // drained work was re-queued and then dequeued concurrently; the
        // chain ends there.
        let mut cursor = head;
        while cursor != sentinel && cursor != 0 {
            let header = unsafe { &*(cursor as *const Header) };
            let next = header.next_ptr();
            ws.heap
                .push(Queued::new(unsafe { WorkRef::adopt(header.this_ptr()) }));
            bump(&mut ws.stats.queued);
            cursor = next;
        }

        while let Some(entry) = ws.heap.pop() {
            // fan-in schedules the same work several times; run each id once
            while ws.heap.peek().map_or(false, |dup| dup.id == entry.id) {
                ws.heap.pop();
                bump(&mut ws.stats.duplicates);
            }

            ws.current_id = entry.id;
            entry.work.work().eval(&mut ws);
            bump(&mut ws.stats.worked);
            self.tracer.on_evaluated(entry.id);
            // entry drops here, releasing the reference it carried
        }

        self.tracer.on_tick_end(&ws.stats);
        if let Some(stats) = stats {
            *stats = ws.stats;
        }
        true
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        // Anything still queued holds a reference from schedule(); unlink
        // and release so no work leaks with the graph. Nodes kept alive by
        // handles or dependents elsewhere survive with a cleared link.
        let sentinel = self.sentinel_addr();
        let mut cursor = self.head.swap(sentinel, Ordering::AcqRel);
        while cursor != sentinel && cursor != 0 {
            let header = unsafe { &*(cursor as *const Header) };
            let next = header.next_ptr();
            header.next.fetch_and(LOCK, Ordering::Release);
            drop(unsafe { WorkRef::adopt(header.this_ptr()) });
            cursor = next;
        }
    }
}

/// Repeatedly evaluate `graph`'s work queue until `stop` is observed.
///
/// A busy loop: ticks while there is work, yields the thread when the queue
/// is empty. Producers never notify evaluators; the loop itself is the
/// notification mechanism, trading idle cycles for append latency without
/// any mutex traffic.
pub fn evaluate_repeatedly(graph: &Graph, stop: &AtomicBool) {
    while !stop.load(Ordering::Acquire) {
        while graph.tick(None) {}
        thread::yield_now();
    }
}
