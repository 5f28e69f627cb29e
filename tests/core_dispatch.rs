//! Scenarios S1-S6 from the dispatcher's testable-properties list: handler
//! ordering, inner-self suppression, child-machine activation, descendant
//! exit on ancestor transition, reentrancy ordering, and fault containment.

use std::cell::RefCell;
use std::rc::Rc;

use hsm_core::{Event, FaultComponent, Machine, StateMachineError};

fn push(log: &Rc<RefCell<Vec<String>>>, tag: &str) {
    log.borrow_mut().push(tag.to_string());
}

#[test]
fn s1_simple_transition_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let root = Machine::new_tree("root");

    let a = root.create_initial_state("A").unwrap();
    let b = root.create_state("B");

    let a = {
        let log = log.clone();
        a.with_exit(move |_| push(&log, "A.exit"))
    };
    let b = {
        let log = log.clone();
        b.with_entry(move |_| push(&log, "B.entry"))
    };

    let e = Event::<()>::new(&root, "e");
    {
        let log = log.clone();
        a.transition_on(&e.as_ref())
            .to(&b)
            .with_handler(move |_| push(&log, "trans"));
    }

    e.fire(()).unwrap();

    assert_eq!(*log.borrow(), vec!["A.exit", "trans", "B.entry"]);
    assert_eq!(root.current_state().unwrap().name(), "B");
}

#[test]
fn s2_inner_self_suppresses_entry_exit() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let root = Machine::new_tree("root");

    let a = {
        let entry_log = log.clone();
        let exit_log = log.clone();
        root.create_initial_state("A")
            .unwrap()
            .with_entry(move |_| push(&entry_log, "A.entry"))
            .with_exit(move |_| push(&exit_log, "A.exit"))
    };
    log.borrow_mut().clear();

    let e = Event::<()>::new(&root, "e");
    {
        let log = log.clone();
        a.transition_on(&e.as_ref())
            .inner_self()
            .with_handler(move |info| {
                assert!(info.is_inner);
                push(&log, "trans");
            });
    }

    e.fire(()).unwrap();

    assert_eq!(*log.borrow(), vec!["trans"]);
    assert_eq!(root.current_state().unwrap().name(), "A");
}

#[test]
fn s3_child_machine_entry_on_parent_entry() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let root = Machine::new_tree("root");

    let p1 = root.create_initial_state("P1").unwrap();
    let p2 = root.create_state("P2");
    let child = p2.create_child_machine("child");
    let _c1 = {
        let log = log.clone();
        child.create_initial_state("C1").unwrap().with_entry(move |info| {
            assert_eq!(info.from.name(), "P1");
            assert_eq!(info.to.name(), "C1");
            push(&log, "C1.entry");
        })
    };
    let p2 = {
        let log = log.clone();
        p2.with_entry(move |_| push(&log, "P2.entry"))
    };

    let e = Event::<()>::new(&root, "e");
    p1.transition_on(&e.as_ref()).to(&p2);

    e.fire(()).unwrap();

    assert_eq!(*log.borrow(), vec!["P2.entry", "C1.entry"]);
    assert_eq!(root.current_state().unwrap().name(), "P2");
    assert_eq!(child.current_state().unwrap().name(), "C1");
    assert_eq!(root.current_state_recursive().unwrap().name(), "C1");
}

#[test]
fn s4_exit_from_descendant_when_ancestor_transitions() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let c2_exit_to = Rc::new(RefCell::new(String::new()));
    let root = Machine::new_tree("root");

    let p1 = {
        let log = log.clone();
        root.create_initial_state("P1").unwrap().with_entry(move |_| push(&log, "P1.entry"))
    };
    let p2 = root.create_state("P2");
    let child = p2.create_child_machine("child");
    let c1 = child.create_initial_state("C1").unwrap();
    let c2 = {
        let log = log.clone();
        let c2_exit_to = c2_exit_to.clone();
        child.create_state("C2").with_exit(move |info| {
            *c2_exit_to.borrow_mut() = info.to.name();
            push(&log, "C2.exit");
        })
    };
    let p2 = {
        let log = log.clone();
        p2.with_entry(move |_| push(&log, "P2.entry"))
            .with_exit(move |_| push(&log, "P2.exit"))
    };

    let e = Event::<()>::new(&root, "e");
    let e_prime = Event::<()>::new(&root, "e_prime");
    let e_double_prime = Event::<()>::new(&root, "e_double_prime");

    p1.transition_on(&e.as_ref()).to(&p2);
    c1.transition_on(&e_prime.as_ref()).to(&c2);
    p2.transition_on(&e_double_prime.as_ref()).to(&p1);

    e.fire(()).unwrap();
    e_prime.fire(()).unwrap();
    log.borrow_mut().clear();

    e_double_prime.fire(()).unwrap();

    assert_eq!(*log.borrow(), vec!["C2.exit", "P2.exit", "P1.entry"]);
    assert_eq!(*c2_exit_to.borrow(), "P1");
    assert_eq!(root.current_state().unwrap().name(), "P1");
}

#[test]
fn s5_reentrancy_ordering() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let root = Machine::new_tree("root");

    let a = {
        let log = log.clone();
        root.create_initial_state("A").unwrap().with_entry(move |_| push(&log, "A.entry"))
    };

    let e2 = Event::<()>::new(&root, "e2");
    let b = {
        let log = log.clone();
        let e2 = e2.clone();
        root.create_state("B").with_entry(move |_| {
            push(&log, "B.entry");
            // Fired from inside B's own entry handler: must queue, not
            // interleave with the outer A -> B transition still unwinding.
            e2.fire(()).unwrap();
            push(&log, "B.entry.after-fire");
        })
    };
    let b = {
        let log = log.clone();
        b.with_exit(move |_| push(&log, "B.exit"))
    };

    let e1 = Event::<()>::new(&root, "e1");
    {
        let log = log.clone();
        a.transition_on(&e1.as_ref()).to(&b).with_handler(move |_| push(&log, "trans(A->B)"));
    }
    {
        let log = log.clone();
        b.transition_on(&e2.as_ref()).to(&a).with_handler(move |_| push(&log, "trans(B->A)"));
    }

    e1.fire(()).unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "trans(A->B)",
            "B.entry",
            "B.entry.after-fire",
            // queued e2 runs only after the outermost dispatch (A -> B,
            // including B's entry handler) has fully unwound.
            "B.exit",
            "trans(B->A)",
            "A.entry",
        ]
    );
    assert_eq!(root.current_state().unwrap().name(), "A");
}

#[test]
fn s6_fault_containment_and_reset() {
    let root = Machine::new_tree("root");
    let a = root.create_initial_state("A").unwrap();
    let entered = Rc::new(RefCell::new(0u32));
    let b = {
        let entered = entered.clone();
        root.create_state("B").with_entry(move |_| {
            *entered.borrow_mut() += 1;
            if *entered.borrow() == 1 {
                panic!("boom");
            }
        })
    };

    let e = Event::<()>::new(&root, "e");
    a.transition_on(&e.as_ref()).to(&b);

    let err = e.fire(()).unwrap_err();
    match err {
        StateMachineError::TransitionFailed { fault } => {
            assert_eq!(fault.component, FaultComponent::Entry);
            assert!(fault.inner_message.contains("boom"));
        }
        other => panic!("expected TransitionFailed, got {other:?}"),
    }

    let err = e.try_fire(()).unwrap_err();
    assert!(matches!(err, StateMachineError::MachineFaulted { .. }));

    root.reset();
    assert_eq!(root.current_state().unwrap().name(), "A");

    // Same event, same transition, but the second entry no longer panics —
    // `reset` must have actually cleared the fault rather than merely
    // masking it, or this would short-circuit to `MachineFaulted` again.
    assert!(e.try_fire(()).unwrap());
    assert_eq!(root.current_state().unwrap().name(), "B");
}
