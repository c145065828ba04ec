//! Scenario tests for the snowstorm graph: four colored transactions with
//! overlapping inputs, dependency chains, and error propagation.

use std::sync::Arc;

use snowdag_consensus::metrics::Registry;
use snowdag_consensus::testing::{TestTransition, TestTx};
use snowdag_consensus::{Conflicts, Decidable, DirectedGraph, Parameters, Status, Tx};
use snowdag_ids::Id;
use snowdag_utils::Bag;

fn input(seed: u64) -> Id {
    Id::EMPTY.prefix(&[seed])
}

fn color(seed: u64, inputs: Vec<Id>) -> Arc<TestTx> {
    let transition = TestTransition::new(Id::EMPTY.prefix(&[seed]), inputs);
    Arc::new(TestTx::new(Arc::new(transition), 0))
}

/// Red spends {X}, Green {X, Y}, Blue {Y, Z}, Alpha {Z}.
fn setup() -> (Arc<TestTx>, Arc<TestTx>, Arc<TestTx>, Arc<TestTx>) {
    let (x, y, z) = (input(4), input(5), input(6));
    (
        color(0, vec![x]),
        color(1, vec![x, y]),
        color(2, vec![y, z]),
        color(3, vec![z]),
    )
}

fn new_graph(k: usize, alpha: usize, beta_virtuous: usize, beta_rogue: usize) -> DirectedGraph {
    DirectedGraph::new(
        Conflicts::new(),
        Parameters::new(k, alpha, beta_virtuous, beta_rogue),
        &Registry::new("snowstorm"),
    )
    .unwrap()
}

fn votes(counts: &[(Id, usize)]) -> Bag<Id> {
    let mut bag = Bag::new();
    for (id, count) in counts {
        bag.add_count(*id, *count);
    }
    bag
}

fn single(id: Id) -> Bag<Id> {
    votes(&[(id, 1)])
}

#[test]
fn parameters_are_reflected() {
    let graph = new_graph(2, 2, 1, 2);
    let params = graph.parameters();
    assert_eq!(params.k, 2);
    assert_eq!(params.alpha, 2);
    assert_eq!(params.beta_virtuous, 1);
    assert_eq!(params.beta_rogue, 2);
}

#[test]
fn issued_tracks_processing_and_decided() {
    let (red, _, blue, _) = setup();
    let mut graph = new_graph(2, 2, 1, 1);

    assert!(!graph.issued(red.as_ref()));
    graph.add(red.clone()).unwrap();
    assert!(graph.issued(red.as_ref()));

    // Decided elsewhere still counts as issued.
    blue.accept().unwrap();
    assert!(graph.issued(blue.as_ref()));
}

#[test]
fn leftover_input() {
    let (red, green, _, _) = setup();
    let mut graph = new_graph(2, 2, 1, 1);

    graph.add(red.clone()).unwrap();
    graph.add(green.clone()).unwrap();

    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 1);
    assert!(prefs.contains(&red.id()));
    assert!(!graph.finalized());

    let changed = graph.record_poll(votes(&[(red.id(), 2)])).unwrap();
    assert!(changed);

    assert!(graph.preferences().is_empty());
    assert!(graph.finalized());
    assert_eq!(red.status(), Status::Accepted);
    assert_eq!(green.status(), Status::Rejected);
}

#[test]
fn lower_confidence() {
    let (red, green, blue, _) = setup();
    let mut graph = new_graph(2, 2, 1, 1);

    graph.add(red.clone()).unwrap();
    graph.add(green.clone()).unwrap();
    graph.add(blue.clone()).unwrap();

    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 1);
    assert!(prefs.contains(&red.id()));

    let changed = graph.record_poll(votes(&[(red.id(), 2)])).unwrap();
    assert!(changed);

    // Green's rejection frees Blue's inputs.
    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 1);
    assert!(prefs.contains(&blue.id()));
    assert!(!graph.finalized());
}

#[test]
fn middle_confidence() {
    let (red, green, blue, alpha) = setup();
    let mut graph = new_graph(2, 2, 1, 1);

    graph.add(red.clone()).unwrap();
    graph.add(green.clone()).unwrap();
    graph.add(alpha.clone()).unwrap();
    graph.add(blue.clone()).unwrap();

    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 2);
    assert!(prefs.contains(&red.id()));
    assert!(prefs.contains(&alpha.id()));

    let changed = graph.record_poll(votes(&[(red.id(), 2)])).unwrap();
    assert!(changed);

    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 1);
    assert!(prefs.contains(&alpha.id()));
    assert!(!graph.finalized());
}

#[test]
fn independent() {
    let (red, _, _, alpha) = setup();
    let mut graph = new_graph(2, 2, 2, 2);

    graph.add(red.clone()).unwrap();
    graph.add(alpha.clone()).unwrap();

    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 2);
    assert!(prefs.contains(&red.id()));
    assert!(prefs.contains(&alpha.id()));

    let both = votes(&[(red.id(), 2), (alpha.id(), 2)]);
    let changed = graph.record_poll(both.clone()).unwrap();
    assert!(!changed);
    assert_eq!(graph.preferences().len(), 2);
    assert!(!graph.finalized());

    let changed = graph.record_poll(both).unwrap();
    assert!(changed);
    assert!(graph.preferences().is_empty());
    assert!(graph.finalized());
    assert_eq!(red.status(), Status::Accepted);
    assert_eq!(alpha.status(), Status::Accepted);
}

#[test]
fn virtuous_shrinks_with_conflicts() {
    let (red, green, blue, alpha) = setup();
    let mut graph = new_graph(2, 2, 1, 1);

    graph.add(red.clone()).unwrap();
    assert_eq!(graph.virtuous().len(), 1);
    assert!(graph.virtuous().contains(&red.id()));

    graph.add(alpha.clone()).unwrap();
    assert_eq!(graph.virtuous().len(), 2);

    graph.add(green.clone()).unwrap();
    assert_eq!(graph.virtuous().len(), 1);
    assert!(graph.virtuous().contains(&alpha.id()));

    graph.add(blue.clone()).unwrap();
    assert!(graph.virtuous().is_empty());
}

#[test]
fn is_virtuous_considers_processing_spenders() {
    let (red, green, blue, alpha) = setup();
    let mut graph = new_graph(2, 2, 1, 1);

    assert!(graph.is_virtuous(red.as_ref()));
    assert!(graph.is_virtuous(green.as_ref()));

    graph.add(red.clone()).unwrap();
    assert!(graph.is_virtuous(red.as_ref()));
    assert!(!graph.is_virtuous(green.as_ref()));
    assert!(graph.is_virtuous(blue.as_ref()));
    assert!(graph.is_virtuous(alpha.as_ref()));

    graph.add(green.clone()).unwrap();
    assert!(!graph.is_virtuous(red.as_ref()));
    assert!(!graph.is_virtuous(green.as_ref()));
    assert!(!graph.is_virtuous(blue.as_ref()));
}

#[test]
fn quiesce_iff_no_virtuous_voting() {
    let (red, green, _, _) = setup();
    let mut graph = new_graph(2, 2, 1, 1);

    assert!(graph.quiesce());
    graph.add(red.clone()).unwrap();
    assert!(!graph.quiesce());
    // A conflict makes both rogue; nothing virtuous remains to poll for.
    graph.add(green.clone()).unwrap();
    assert!(graph.quiesce());
}

/// Purple depends on Red's transition and spends a fresh input.
fn purple_depending_on(red: &Arc<TestTx>, input_seed: u64) -> Arc<TestTx> {
    let transition = TestTransition::with_dependencies(
        Id::EMPTY.prefix(&[7]),
        vec![input(input_seed)],
        vec![red.transition()],
    );
    Arc::new(TestTx::new(Arc::new(transition), 0))
}

#[test]
fn accepting_dependency() {
    let (red, green, _, _) = setup();
    let purple = purple_depending_on(&red, 8);
    let mut graph = new_graph(1, 1, 1, 2);

    graph.add(red.clone()).unwrap();
    graph.add(green.clone()).unwrap();
    graph.add(purple.clone()).unwrap();

    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 2);
    assert!(prefs.contains(&red.id()));
    assert!(prefs.contains(&purple.id()));

    // Green overtakes Red.
    assert!(graph.record_poll(single(green.id())).unwrap());
    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 2);
    assert!(prefs.contains(&green.id()));
    assert!(prefs.contains(&purple.id()));
    assert_eq!(red.status(), Status::Processing);

    // Purple finalizes but stays blocked on Red; a tie does not flip edges.
    assert!(!graph
        .record_poll(votes(&[(red.id(), 1), (purple.id(), 1)]))
        .unwrap());
    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 2);
    assert!(prefs.contains(&green.id()));
    assert!(prefs.contains(&purple.id()));
    assert_eq!(purple.status(), Status::Processing);

    // Red wins its conflict set; purple unblocks in the same sweep.
    assert!(graph.record_poll(single(red.id())).unwrap());
    assert!(graph.preferences().is_empty());
    assert_eq!(red.status(), Status::Accepted);
    assert_eq!(green.status(), Status::Rejected);
    assert_eq!(purple.status(), Status::Accepted);
}

#[test]
fn accepting_slow_dependency() {
    let (red, green, _, _) = setup();
    let purple = purple_depending_on(&red, 8);
    let mut graph = new_graph(1, 1, 1, 2);

    graph.add(red.clone()).unwrap();
    graph.add(green.clone()).unwrap();
    graph.add(purple.clone()).unwrap();

    assert!(graph.record_poll(single(green.id())).unwrap());

    // Purple conditionally accepts on its own; nothing observable changes.
    assert!(!graph.record_poll(single(purple.id())).unwrap());
    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 2);
    assert!(prefs.contains(&green.id()));
    assert!(prefs.contains(&purple.id()));
    assert_eq!(purple.status(), Status::Processing);

    assert!(!graph
        .record_poll(votes(&[(red.id(), 1), (purple.id(), 1)]))
        .unwrap());
    assert_eq!(purple.status(), Status::Processing);

    assert!(graph.record_poll(single(red.id())).unwrap());
    assert!(graph.preferences().is_empty());
    assert_eq!(red.status(), Status::Accepted);
    assert_eq!(green.status(), Status::Rejected);
    assert_eq!(purple.status(), Status::Accepted);
}

#[test]
fn rejecting_dependency() {
    let (red, green, blue, _) = setup();
    let transition = TestTransition::with_dependencies(
        Id::EMPTY.prefix(&[7]),
        vec![input(8)],
        vec![red.transition(), blue.transition()],
    );
    let purple: Arc<TestTx> = Arc::new(TestTx::new(Arc::new(transition), 0));
    let mut graph = new_graph(1, 1, 1, 2);

    graph.add(red.clone()).unwrap();
    graph.add(green.clone()).unwrap();
    graph.add(blue.clone()).unwrap();
    graph.add(purple.clone()).unwrap();

    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 2);
    assert!(prefs.contains(&red.id()));
    assert!(prefs.contains(&purple.id()));

    let green_purple = votes(&[(green.id(), 1), (purple.id(), 1)]);
    assert!(graph.record_poll(green_purple.clone()).unwrap());
    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 2);
    assert!(prefs.contains(&green.id()));
    assert!(prefs.contains(&purple.id()));

    // Green's acceptance rejects Red and Blue, which drags purple down.
    assert!(graph.record_poll(green_purple).unwrap());
    assert!(graph.preferences().is_empty());
    assert_eq!(green.status(), Status::Accepted);
    assert_eq!(red.status(), Status::Rejected);
    assert_eq!(blue.status(), Status::Rejected);
    assert_eq!(purple.status(), Status::Rejected);
}

#[test]
fn rejecting_slow_dependency() {
    let (red, green, _, _) = setup();
    let conflict_input = input(101);
    let purple_transition = TestTransition::with_dependencies(
        Id::EMPTY.prefix(&[100]),
        vec![conflict_input],
        vec![red.transition()],
    );
    let purple: Arc<TestTx> = Arc::new(TestTx::new(Arc::new(purple_transition), 0));
    let cyan = color(102, vec![conflict_input]);

    let mut graph = new_graph(1, 1, 1, 1);
    graph.add(red.clone()).unwrap();
    graph.add(green.clone()).unwrap();
    graph.add(purple.clone()).unwrap();
    graph.add(cyan.clone()).unwrap();

    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 2);
    assert!(prefs.contains(&red.id()));
    assert!(prefs.contains(&purple.id()));

    // Cyan wins the shared input; purple dies even though its dependency is
    // still undecided.
    assert!(graph.record_poll(single(cyan.id())).unwrap());
    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 1);
    assert!(prefs.contains(&red.id()));
    assert_eq!(cyan.status(), Status::Accepted);
    assert_eq!(purple.status(), Status::Rejected);
    assert_eq!(red.status(), Status::Processing);
    assert_eq!(green.status(), Status::Processing);

    assert!(graph.record_poll(single(green.id())).unwrap());
    assert!(graph.preferences().is_empty());
    assert_eq!(green.status(), Status::Accepted);
    assert_eq!(red.status(), Status::Rejected);
}

#[test]
fn conflicts_reported_for_unissued_tx() {
    let mut graph = new_graph(1, 1, 1, 2);
    let shared = input(0);
    let purple = color(6, vec![shared]);
    let orange = color(7, vec![shared]);

    graph.add(purple.clone()).unwrap();
    let conflicts = graph.conflicts(orange.as_ref());
    assert_eq!(conflicts.len(), 1);
    assert!(conflicts.contains(&purple.id()));

    graph.add(orange.clone()).unwrap();
    let conflicts = graph.conflicts(orange.as_ref());
    assert_eq!(conflicts.len(), 1);
    assert!(conflicts.contains(&purple.id()));
}

#[test]
fn virtuous_depending_on_rogue_quiesces() {
    let mut graph = new_graph(1, 1, 1, 2);

    let shared = input(3);
    let rogue1 = color(0, vec![shared]);
    let rogue2 = color(1, vec![shared]);
    let virtuous_transition = TestTransition::with_dependencies(
        Id::EMPTY.prefix(&[2]),
        vec![input(4)],
        vec![rogue1.transition()],
    );
    let virtuous: Arc<TestTx> = Arc::new(TestTx::new(Arc::new(virtuous_transition), 0));

    graph.add(rogue1.clone()).unwrap();
    graph.add(rogue2.clone()).unwrap();
    graph.add(virtuous.clone()).unwrap();

    let changed = graph
        .record_poll(votes(&[(rogue1.id(), 1), (virtuous.id(), 1)]))
        .unwrap();
    assert!(!changed);
    assert_eq!(rogue1.status(), Status::Processing);
    assert_eq!(rogue2.status(), Status::Processing);
    assert_eq!(virtuous.status(), Status::Processing);
    // The virtuous tx is conditionally accepted, so no poll is owed to it.
    assert!(graph.quiesce());
}

#[test]
fn error_on_accept_propagates() {
    let mut graph = new_graph(1, 1, 1, 2);
    let transition = TestTransition::new(Id::EMPTY.prefix(&[1]), vec![input(4)]);
    let purple: Arc<TestTx> =
        Arc::new(TestTx::new(Arc::new(transition), 0).with_accept_err("broken accept"));

    graph.add(purple.clone()).unwrap();
    assert!(graph.record_poll(single(purple.id())).is_err());
}

#[test]
fn error_on_rejecting_lower_confidence_conflict() {
    let mut graph = new_graph(1, 1, 1, 1);
    let shared = input(4);
    let purple = color(7, vec![shared]);
    let pink_transition = TestTransition::new(Id::EMPTY.prefix(&[8]), vec![shared]);
    let pink: Arc<TestTx> =
        Arc::new(TestTx::new(Arc::new(pink_transition), 0).with_reject_err("broken reject"));

    graph.add(purple.clone()).unwrap();
    graph.add(pink.clone()).unwrap();

    assert!(graph.record_poll(single(purple.id())).is_err());
}

#[test]
fn error_on_rejecting_higher_confidence_conflict() {
    let mut graph = new_graph(1, 1, 1, 1);
    let shared = input(4);
    let pink_transition = TestTransition::new(Id::EMPTY.prefix(&[8]), vec![shared]);
    let pink: Arc<TestTx> =
        Arc::new(TestTx::new(Arc::new(pink_transition), 0).with_reject_err("broken reject"));
    let purple = color(7, vec![shared]);

    graph.add(pink.clone()).unwrap();
    graph.add(purple.clone()).unwrap();

    assert!(graph.record_poll(single(purple.id())).is_err());
}

#[test]
fn utxo_cleanup_allows_respending() {
    let (red, green, blue, _) = setup();
    let mut graph = new_graph(1, 1, 1, 2);

    graph.add(red.clone()).unwrap();
    graph.add(green.clone()).unwrap();

    assert!(!graph.record_poll(single(red.id())).unwrap());
    assert!(graph.record_poll(single(red.id())).unwrap());
    assert_eq!(red.status(), Status::Accepted);
    assert_eq!(green.status(), Status::Rejected);

    // Green's inputs were cleaned out, so Blue enters virtuous and alone.
    graph.add(blue.clone()).unwrap();
    assert!(graph.record_poll(single(blue.id())).unwrap());
    assert_eq!(blue.status(), Status::Accepted);
}

#[test]
fn reissuing_a_processing_tx_is_a_noop() {
    let (red, green, blue, alpha) = setup();
    let mut graph = new_graph(2, 2, 1, 2);

    graph.add(red.clone()).unwrap();
    graph.add(green.clone()).unwrap();
    graph.add(blue.clone()).unwrap();
    graph.add(alpha.clone()).unwrap();

    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 1);
    assert!(prefs.contains(&red.id()));

    assert!(graph
        .record_poll(votes(&[(red.id(), 2), (blue.id(), 2)]))
        .unwrap());
    graph.add(blue.clone()).unwrap();

    let prefs = graph.preferences();
    assert_eq!(prefs.len(), 2);
    assert!(prefs.contains(&red.id()));
    assert!(prefs.contains(&blue.id()));
    assert!(!graph.finalized());
}
