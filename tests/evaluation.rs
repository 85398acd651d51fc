//! End-to-end evaluation scenarios over small graphs, with exact per-tick
//! counter expectations.

use std::sync::{Arc, Mutex};

use tickflow::{unconnected, Cell, Connectable, Constant, Graph, Input, OnChange, Stats};

#[test]
fn single_node_with_external_sink() {
    let mut stats = Stats::default();
    let graph = Graph::new();
    let sink = Arc::new(Cell::<i32>::default());

    let node = graph
        .node()
        .connect(|a: i32, b: i32| a + b, (unconnected(), unconnected()));
    let (a, b) = node.inputs();
    a.append(&graph, 1);
    b.append(&graph, 2);
    node.connect(Input::external(&sink));

    assert!(graph.tick(Some(&mut stats)));
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.worked, 1);
    assert_eq!(sink.load(), 3);

    assert!(!graph.tick(Some(&mut stats)));
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.worked, 0);

    a.append(&graph, 3);
    assert!(graph.tick(Some(&mut stats)));
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.worked, 1);
    assert_eq!(sink.load(), 5);
}

#[test]
fn constants_feed_the_initial_evaluation() {
    let mut stats = Stats::default();
    let graph = Graph::new();
    let sink = Arc::new(Cell::<i32>::default());

    let one = Constant::new(1);
    let two = Constant::new(2);
    let node = graph
        .node()
        .connect(|a: i32, b: i32| a + b, (one.source(), two.source()));
    node.connect(Input::external(&sink));

    assert!(graph.tick(Some(&mut stats)));
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.worked, 1);
    assert_eq!(sink.load(), 3);

    assert!(!graph.tick(Some(&mut stats)));
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.worked, 0);
}

#[test]
fn diamond_runs_its_sink_once_per_tick() {
    let mut stats = Stats::default();
    let graph = Graph::new();
    let sink = Arc::new(Cell::<bool>::default());

    let in1 = graph.node().connect(|a: i32| a, (unconnected(),));
    let in2 = graph.node().connect(|a: i32| a, (unconnected(),));
    let out = graph
        .node()
        .connect(|a: i32, b: i32| a < b, (in1.source(), in2.source()));
    out.connect(Input::external(&sink));

    let (i1,) = in1.inputs();
    let (i2,) = in2.inputs();
    i1.append(&graph, 1);
    i2.append(&graph, 2);

    assert!(graph.tick(Some(&mut stats)));
    assert_eq!(stats.queued, 3);
    assert_eq!(stats.worked, 3);
    assert!(sink.load());

    assert!(!graph.tick(Some(&mut stats)));
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.worked, 0);

    // only the changed branch and the sink re-run
    i1.append(&graph, 3);
    assert!(graph.tick(Some(&mut stats)));
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.worked, 2);
    assert!(!sink.load());

    assert!(!graph.tick(Some(&mut stats)));

    // both branches fan into the sink; the duplicate is coalesced
    i1.append(&graph, 5);
    i2.append(&graph, 6);
    assert!(graph.tick(Some(&mut stats)));
    assert_eq!(stats.queued, 2);
    assert_eq!(stats.worked, 3);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.pushed_heap, 2);
    assert!(sink.load());
}

#[test]
fn on_change_suppresses_an_unchanged_output() {
    let mut stats = Stats::default();
    let graph = Graph::new();

    let src = graph.node().connect(|x: i32| x, (unconnected(),));
    let via_always = graph.node().connect(|x: i32| x, (src.source(),));
    let via_on_change = graph
        .node()
        .propagate::<OnChange>()
        .connect(|x: i32| x, (src.source(),));
    let _sink_a = graph.node().connect(|x: i32| x, (via_always.source(),));
    let _sink_c = graph.node().connect(|x: i32| x, (via_on_change.source(),));

    let (input,) = src.inputs();
    input.append(&graph, 1);
    assert!(graph.tick(Some(&mut stats)));
    assert_eq!(stats.worked, 5);

    // same value again: the unchanged output stops at the change-detecting
    // node, so only the always branch reaches its sink
    input.append(&graph, 1);
    assert!(graph.tick(Some(&mut stats)));
    assert_eq!(stats.worked, 4);

    assert!(!graph.tick(Some(&mut stats)));
}

#[test]
fn evaluation_follows_ascending_ids() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let graph = Graph::new();

    let recorder = |tag: usize| {
        let order = order.clone();
        move |x: i32| {
            order.lock().unwrap().push(tag);
            x
        }
    };
    let n0 = graph.node().connect(recorder(0), (unconnected(),));
    let n1 = graph.node().connect(recorder(1), (unconnected(),));
    let n2 = graph.node().connect(recorder(2), (unconnected(),));

    // initial evaluations also run in id order
    assert!(graph.tick(None));
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    order.lock().unwrap().clear();

    // scheduling order does not matter, id order does
    let (i2,) = n2.inputs();
    let (i0,) = n0.inputs();
    let (i1,) = n1.inputs();
    i2.append(&graph, 1);
    i0.append(&graph, 1);
    i1.append(&graph, 1);

    assert!(graph.tick(None));
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

#[test]
fn appending_twice_before_a_tick_coalesces() {
    let mut stats = Stats::default();
    let graph = Graph::new();
    let sink = Arc::new(Cell::<i32>::default());

    let node = graph.node().connect(|x: i32| x, (unconnected(),));
    node.connect(Input::external(&sink));
    let (input,) = node.inputs();

    input.append(&graph, 1);
    input.append(&graph, 2);
    input.append(&graph, 3);

    // one queue entry, one evaluation, latest value wins
    assert!(graph.tick(Some(&mut stats)));
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.worked, 1);
    assert_eq!(sink.load(), 3);
}

#[test]
fn chain_propagates_through_intermediate_nodes() {
    let graph = Graph::new();
    let sink = Arc::new(Cell::<i64>::default());

    let head = graph.node().connect(|x: i64| x + 1, (unconnected(),));
    let mid = graph.node().connect(|x: i64| x * 10, (head.source(),));
    let tail = graph.node().connect(|x: i64| x - 2, (mid.source(),));
    tail.connect(Input::external(&sink));

    let (input,) = head.inputs();
    let mut stats = Stats::default();

    // drain the initial evaluations of all three nodes
    assert!(graph.tick(Some(&mut stats)));
    assert_eq!(stats.queued, 3);

    input.append(&graph, 4);
    assert!(graph.tick(Some(&mut stats)));
    // only the head was queued; the other two joined this tick's heap
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.worked, 3);
    assert_eq!(stats.pushed_heap, 2);
    assert_eq!(sink.load(), (4 + 1) * 10 - 2);
}
