//! Forced transitions (spec §4.2/§4.3): bypass the event map and guard
//! entirely, and in particular the §9 Open Question about a target with no
//! shared ancestor short of the root.

use std::cell::RefCell;
use std::rc::Rc;

use hsm_core::{Event, Machine};

#[test]
fn force_transition_bypasses_guard_and_event_map() {
    let root = Machine::new_tree("root");
    let a = root.create_initial_state("A").unwrap();
    let b = root.create_state("B");
    // A "never" event whose guard always rejects, to prove the forced
    // transition doesn't go anywhere near it.
    let never = Event::<()>::new(&root, "never");
    a.transition_on(&never.as_ref()).to(&b).with_guard(|_| false);

    assert!(!never.try_fire(()).unwrap());
    assert_eq!(root.current_state().unwrap().name(), "A");

    root.force_transition(&b, &never.as_ref()).unwrap();
    assert_eq!(root.current_state().unwrap().name(), "B");
}

#[test]
fn forced_transition_to_unrelated_branch_exits_full_chain_to_root() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let root = Machine::new_tree("root");

    let left = root.create_initial_state("Left").unwrap();
    let left_child = left.create_child_machine("left_child");
    let leaf = {
        let log = log.clone();
        left_child.create_initial_state("Leaf").unwrap().with_exit(move |_| {
            log.borrow_mut().push("Leaf.exit".to_string());
        })
    };
    let left = {
        let log = log.clone();
        left.with_exit(move |_| log.borrow_mut().push("Left.exit".to_string()))
    };

    let right = {
        let log = log.clone();
        root.create_state("Right").with_entry(move |_| log.borrow_mut().push("Right.entry".to_string()))
    };

    assert_eq!(root.current_state_recursive().unwrap().name(), "Leaf");

    let marker = Event::<()>::new(&root, "marker");
    root.force_transition(&right, &marker.as_ref()).unwrap();

    // No ancestor is shared short of the implicit root machine: the whole
    // active chain (deepest first) exits, then the new branch enters.
    assert_eq!(*log.borrow(), vec!["Leaf.exit", "Left.exit", "Right.entry"]);
    assert_eq!(root.current_state().unwrap().name(), "Right");
    assert!(!left_child.is_active());
    let _ = leaf;
}
