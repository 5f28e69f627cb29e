//! Machine-surface invariants not already covered by the core dispatch
//! scenarios: ancestry queries, construction preconditions, and the
//! `fire`/`try_fire` not-found contract.

use hsm_core::{Event, Machine, StateMachineError};

#[test]
fn is_child_of_and_topmost_machine() {
    let root = Machine::new_tree("root");
    root.create_initial_state("P1").unwrap();
    let parent_state = root.create_state("Parent");
    let child = parent_state.create_child_machine("child");
    let grandchild_state = child.create_initial_state("GC").unwrap();
    let grandchild = grandchild_state.create_child_machine("grandchild");

    assert!(child.is_child_of(&root));
    assert!(grandchild.is_child_of(&root));
    assert!(grandchild.is_child_of(&child));
    assert!(!root.is_child_of(&child));
    assert!(!child.is_child_of(&grandchild));

    assert_eq!(grandchild.topmost_machine(), root);
    assert_eq!(child.topmost_machine(), root);
    assert_eq!(root.topmost_machine(), root);
}

#[test]
fn is_child_of_across_independent_trees_is_false() {
    let tree_a = Machine::new_tree("a");
    let tree_b = Machine::new_tree("b");
    assert!(!tree_a.is_child_of(&tree_b));
    assert!(!tree_b.is_child_of(&tree_a));
}

#[test]
fn create_initial_state_twice_is_already_initialized() {
    let root = Machine::new_tree("root");
    root.create_initial_state("A").unwrap();
    let err = root.create_initial_state("A2").unwrap_err();
    assert!(matches!(err, StateMachineError::AlreadyInitialized(name) if name == "root"));
}

#[test]
fn firing_before_initial_state_is_invalid_state() {
    let root = Machine::new_tree("root");
    let e = Event::<()>::new(&root, "e");
    let err = e.fire(()).unwrap_err();
    assert!(matches!(err, StateMachineError::InvalidState(name) if name == "root"));
    assert!(!root.is_active());
}

#[test]
fn fire_raises_transition_not_found_iff_try_fire_returns_false() {
    let root = Machine::new_tree("root");
    let a = root.create_initial_state("A").unwrap();
    let b = root.create_state("B");
    let e = Event::<()>::new(&root, "e");
    let unrelated = Event::<()>::new(&root, "unrelated");
    a.transition_on(&e.as_ref()).to(&b);

    assert!(!unrelated.try_fire(()).unwrap());
    let err = unrelated.fire(()).unwrap_err();
    assert!(matches!(
        err,
        StateMachineError::TransitionNotFound { ref from, ref event, ref machine }
            if from == "A" && event == "unrelated" && machine == "root"
    ));

    assert!(e.try_fire(()).unwrap());
}

#[test]
fn child_machine_inactive_until_parent_state_entered() {
    let root = Machine::new_tree("root");
    let p1 = root.create_initial_state("P1").unwrap();
    let p2 = root.create_state("P2");
    let child = p2.create_child_machine("child");
    // The child's initial state is set while P2 is not yet the active
    // state, so per §4.7 the child machine starts Inactive, not Active.
    child.create_initial_state("C1").unwrap();

    assert!(!child.is_active());

    let e = Event::<()>::new(&root, "e");
    p1.transition_on(&e.as_ref()).to(&p2);
    e.fire(()).unwrap();

    assert!(child.is_active());
    assert_eq!(child.current_state().unwrap().name(), "C1");
}
