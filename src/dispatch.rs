//! The transition dispatch core (spec §4): hierarchical search, LCA-aware
//! handler sequencing, reentrancy queueing, and fault capture.
//!
//! Every path here that calls into a user-supplied closure first takes the
//! closure out of its arena slot and drops all borrows before invoking it
//! (see the `take_*`/`restore_*` helpers), then restores it afterward. This
//! is the load-bearing reason a handler can safely re-enter the kernel — a
//! reentrant `fire()` called from inside a handler observes `executing ==
//! true` and gets queued, rather than tripping a `RefCell` double-borrow
//! panic that `catch_unwind` would otherwise misreport as a fault.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{FaultComponent, StateMachineError, StateMachineFault};
use crate::event::EventRef;
use crate::handler::{DynamicContext, StateHandlerInfo, TransitionInfo};
use crate::ids::{EventId, MachineId, StateId};
use crate::kernel::{GuardFn, Kernel, QueuedItem, TransitionKindData};
use crate::machine::Machine;
use crate::state::State;
use crate::synchronizer::FireMethod;

enum Request {
    Fire {
        event: EventId,
        data: Option<Box<dyn Any>>,
    },
    Forced {
        target: StateId,
        event: EventId,
    },
}

enum DispatchOutcome {
    Matched,
    NotFound { from: String, machine: String },
}

pub(crate) fn try_fire(
    kernel: &Kernel,
    event: EventId,
    data: Option<Box<dyn Any>>,
) -> Result<bool, StateMachineError> {
    match request(kernel, Request::Fire { event, data }, FireMethod::TryFire)? {
        DispatchOutcome::Matched => Ok(true),
        DispatchOutcome::NotFound { .. } => Ok(false),
    }
}

pub(crate) fn fire(
    kernel: &Kernel,
    event: EventId,
    data: Option<Box<dyn Any>>,
) -> Result<(), StateMachineError> {
    match request(kernel, Request::Fire { event, data }, FireMethod::Fire)? {
        DispatchOutcome::Matched => Ok(()),
        DispatchOutcome::NotFound { from, machine } => Err(StateMachineError::TransitionNotFound {
            from,
            event: kernel.event_name(event),
            machine,
        }),
    }
}

pub(crate) fn force_transition(
    kernel: &Kernel,
    target: StateId,
    event: EventId,
) -> Result<(), StateMachineError> {
    match request(kernel, Request::Forced { target, event }, FireMethod::Fire)? {
        DispatchOutcome::Matched => Ok(()),
        DispatchOutcome::NotFound { .. } => {
            unreachable!("forced transitions bypass the event map and always match")
        }
    }
}

/// Clears the fault and queue, then resets every machine to its initial
/// state iff its parent state is its parent machine's current state.
/// Machines are visited in increasing arena-index order, which is always a
/// valid topological order here: a child machine can only be created after
/// the state that owns it, whose own owning machine must have been created
/// earlier still.
pub(crate) fn reset(kernel: &Kernel) {
    let mut action = || reset_inner(kernel);
    let synchronizer = kernel.0.borrow_mut().synchronizer.take();
    match synchronizer {
        Some(mut sync) => {
            sync.reset(&mut action);
            kernel.0.borrow_mut().synchronizer = Some(sync);
        }
        None => action(),
    }
}

fn reset_inner(kernel: &Kernel) {
    let mut inner = kernel.0.borrow_mut();
    inner.fault = None;
    inner.queue.clear();
    for index in 0..inner.machines.len() {
        let parent_state = inner.machines[index].parent_state;
        let active = match parent_state {
            None => true,
            Some(state) => {
                let parent_machine = inner.states[state.0].machine;
                inner.machines[parent_machine.0].current == Some(state)
            }
        };
        inner.machines[index].current = if active {
            inner.machines[index].initial
        } else {
            None
        };
    }
    log::debug!("kernel reset: fault cleared, queue cleared, {} machine(s) re-homed", inner.machines.len());
}

// --- top-level request handling: fault precondition, reentrancy queueing,
// synchronizer bracketing, queue draining ---------------------------------

fn request(
    kernel: &Kernel,
    req: Request,
    method: FireMethod,
) -> Result<DispatchOutcome, StateMachineError> {
    if let Some(fault) = kernel.0.borrow().fault.clone() {
        return Err(StateMachineError::MachineFaulted { fault });
    }

    if kernel.0.borrow().executing {
        match req {
            Request::Fire { event, data } => {
                log::trace!("reentrant fire of '{}' enqueued", kernel.event_name(event));
                kernel.0.borrow_mut().queue.push_back(QueuedItem::Fire { event, data });
            }
            Request::Forced { target, event } => {
                log::trace!("reentrant forced transition enqueued");
                kernel.0.borrow_mut().queue.push_back(QueuedItem::Forced { target, event });
            }
        }
        return Ok(DispatchOutcome::Matched);
    }

    {
        let root = kernel.root_machine();
        let inner = kernel.0.borrow();
        if inner.machines[root.0].current.is_none() {
            return Err(StateMachineError::InvalidState(inner.machines[root.0].name.clone()));
        }
    }

    kernel.0.borrow_mut().executing = true;

    let mut captured: Option<Result<DispatchOutcome, StateMachineFault>> = None;
    {
        let mut run = || -> Result<bool, StateMachineError> {
            let outcome = run_dispatch_once(kernel, &req);
            let matched = matches!(outcome, Ok(DispatchOutcome::Matched));
            let as_error = match &outcome {
                Err(fault) => Some(StateMachineError::TransitionFailed { fault: fault.clone() }),
                Ok(_) => None,
            };
            captured = Some(outcome);
            match as_error {
                Some(err) => Err(err),
                None => Ok(matched),
            }
        };

        let synchronizer = kernel.0.borrow_mut().synchronizer.take();
        match synchronizer {
            Some(mut sync) => {
                let _ = sync.fire_event(method, &mut run);
                kernel.0.borrow_mut().synchronizer = Some(sync);
            }
            None => {
                let _ = run();
            }
        }
    }

    let result = match captured {
        Some(Ok(outcome)) => Ok(outcome),
        Some(Err(fault)) => {
            kernel.0.borrow_mut().fault = Some(fault.clone());
            Err(StateMachineError::TransitionFailed { fault })
        }
        // A synchronizer that never invoked the dispatch closure at all —
        // documented by §4.6 as only valid for `TryFire`, optimistically.
        None => Ok(DispatchOutcome::Matched),
    };

    drain_queue(kernel);
    kernel.0.borrow_mut().executing = false;
    result
}

fn drain_queue(kernel: &Kernel) {
    loop {
        if kernel.0.borrow().fault.is_some() {
            break;
        }
        let item = kernel.0.borrow_mut().queue.pop_front();
        let item = match item {
            Some(item) => item,
            None => break,
        };
        let req = match item {
            QueuedItem::Fire { event, data } => Request::Fire { event, data },
            QueuedItem::Forced { target, event } => Request::Forced { target, event },
        };
        if let Err(fault) = run_dispatch_once(kernel, &req) {
            log::error!("{}", fault);
            kernel.0.borrow_mut().fault = Some(fault);
            break;
        }
    }
}

// --- one dispatch attempt (no queueing/synchronizer concerns) ------------

fn run_dispatch_once(kernel: &Kernel, req: &Request) -> Result<DispatchOutcome, StateMachineFault> {
    let root = kernel.root_machine();
    let chain = active_state_chain(kernel, root);
    let from_leaf = *chain
        .last()
        .expect("InvalidState precondition already checked by the caller");

    match req {
        Request::Fire { event, data } => {
            let data_ref = data.as_deref();
            match find_matching_transition(kernel, &chain, from_leaf, *event, data_ref)? {
                Some(matched) => {
                    execute_transition(
                        kernel,
                        from_leaf,
                        matched.to,
                        matched.is_inner,
                        Some((matched.state, *event, matched.index)),
                        *event,
                        data_ref,
                    )?;
                    log::debug!(
                        "'{}': '{}' -> '{}'",
                        kernel.event_name(*event),
                        kernel.state_name(from_leaf),
                        kernel.state_name(matched.to)
                    );
                    Ok(DispatchOutcome::Matched)
                }
                None => {
                    log::warn!(
                        "no transition for '{}' from '{}'",
                        kernel.event_name(*event),
                        kernel.state_name(from_leaf)
                    );
                    Ok(DispatchOutcome::NotFound {
                        from: kernel.state_name(from_leaf),
                        machine: kernel.machine_name(kernel.machine_of(from_leaf)),
                    })
                }
            }
        }
        Request::Forced { target, event } => {
            execute_transition(kernel, from_leaf, *target, false, None, *event, None)?;
            log::debug!(
                "forced '{}': '{}' -> '{}'",
                kernel.event_name(*event),
                kernel.state_name(from_leaf),
                kernel.state_name(*target)
            );
            Ok(DispatchOutcome::Matched)
        }
    }
}

/// States from `machine`'s current state down through nested child
/// machines, root-to-leaf. Empty if `machine` is inactive.
fn active_state_chain(kernel: &Kernel, machine: MachineId) -> Vec<StateId> {
    let mut chain = Vec::new();
    let mut cursor = machine;
    loop {
        let current = kernel.0.borrow().machines[cursor.0].current;
        let state = match current {
            Some(state) => state,
            None => break,
        };
        chain.push(state);
        let child = kernel.0.borrow().states[state.0].child_machine;
        match child {
            Some(next) => cursor = next,
            None => break,
        }
    }
    chain
}

struct Matched {
    state: StateId,
    index: usize,
    is_inner: bool,
    to: StateId,
}

/// Deepest-active-state-first search for the first transition whose guard
/// passes (or whose dynamic selector returns a state) — spec §4.2.
fn find_matching_transition(
    kernel: &Kernel,
    chain: &[StateId],
    from_leaf: StateId,
    event: EventId,
    event_data: Option<&dyn Any>,
) -> Result<Option<Matched>, StateMachineFault> {
    for &state in chain.iter().rev() {
        let count = kernel
            .0
            .borrow()
            .states[state.0]
            .transitions
            .get(&event)
            .map(Vec::len)
            .unwrap_or(0);

        for index in 0..count {
            let is_dynamic = matches!(
                kernel.0.borrow().states[state.0].transitions[&event][index].kind,
                TransitionKindData::Dynamic { .. }
            );

            if is_dynamic {
                let selector = take_selector(kernel, state, event, index);
                let mut selector = match selector {
                    Some(s) => s,
                    None => continue,
                };
                let ctx = DynamicContext::new(
                    State::new(kernel.clone(), from_leaf),
                    EventRef { kernel: kernel.clone(), id: event },
                    event_data,
                );
                let result = catch_unwind(AssertUnwindSafe(|| selector(&ctx)));
                restore_selector(kernel, state, event, index, selector);
                match result {
                    Ok(Some(to)) => {
                        return Ok(Some(Matched { state, index, is_inner: false, to }));
                    }
                    Ok(None) => continue,
                    Err(payload) => {
                        return Err(build_fault(
                            kernel,
                            kernel.machine_of(state),
                            FaultComponent::Dynamic,
                            payload,
                            Some(from_leaf),
                            None,
                            event,
                        ));
                    }
                }
            }

            let (to, is_inner) = {
                let inner = kernel.0.borrow();
                match &inner.states[state.0].transitions[&event][index].kind {
                    TransitionKindData::Normal { to } => (*to, false),
                    TransitionKindData::InnerSelf => (from_leaf, true),
                    TransitionKindData::Dynamic { .. } => unreachable!("handled above"),
                }
            };

            let guard = take_guard(kernel, state, event, index);
            let passes = match guard {
                None => true,
                Some(guard) => {
                    let info = TransitionInfo::new(
                        State::new(kernel.clone(), from_leaf),
                        State::new(kernel.clone(), to),
                        EventRef { kernel: kernel.clone(), id: event },
                        is_inner,
                        event_data,
                    );
                    let result = catch_unwind(AssertUnwindSafe(|| guard(&info)));
                    restore_guard(kernel, state, event, index, guard);
                    match result {
                        Ok(passes) => passes,
                        Err(payload) => {
                            return Err(build_fault(
                                kernel,
                                kernel.machine_of(state),
                                FaultComponent::Guard,
                                payload,
                                Some(from_leaf),
                                Some(to),
                                event,
                            ));
                        }
                    }
                }
            };

            if passes {
                return Ok(Some(Matched { state, index, is_inner, to }));
            }
        }
    }
    Ok(None)
}

/// Runs one transition's full handler sequence: exit, transition handler,
/// `current` updates, child-machine activation, entry (spec §4.3).
///
/// `matched` is `Some((state, event, index))` for an event-triggered
/// transition (so its stored handler can be invoked), or `None` for a
/// forced transition, which carries no stored transition handler.
fn execute_transition(
    kernel: &Kernel,
    from_leaf: StateId,
    to: StateId,
    is_inner: bool,
    matched: Option<(StateId, EventId, usize)>,
    event: EventId,
    event_data: Option<&dyn Any>,
) -> Result<(), StateMachineFault> {
    let event_ref = EventRef { kernel: kernel.clone(), id: event };

    if is_inner {
        run_transition_handler(kernel, matched, from_leaf, from_leaf, event_ref, true, event_data)?;
        log::trace!("inner-self on '{}'", kernel.state_name(from_leaf));
        return Ok(());
    }

    let (exit_states, entry_states) = if to == from_leaf {
        (vec![from_leaf], vec![from_leaf])
    } else {
        compute_exit_entry(kernel, from_leaf, to)
    };

    for &state in &exit_states {
        run_exit_or_entry(kernel, state, from_leaf, to, event_ref.clone(), event_data, false)?;
        // A state leaving the active chain takes any child machine (and its
        // own active descendants) with it, keeping §3 invariant (iii) —
        // "child machine's current is non-null iff its parent state is
        // active" — true outside of a `reset`, not just after one.
        deactivate_child_chain(kernel, state);
    }

    run_transition_handler(kernel, matched, from_leaf, to, event_ref.clone(), false, event_data)?;

    update_current_along_path(kernel, &entry_states);
    let newly_activated = activate_child_chains(kernel, to);

    for &state in entry_states.iter().chain(newly_activated.iter()) {
        run_exit_or_entry(kernel, state, from_leaf, to, event_ref.clone(), event_data, true)?;
    }

    Ok(())
}

fn run_transition_handler(
    kernel: &Kernel,
    matched: Option<(StateId, EventId, usize)>,
    from_leaf: StateId,
    to: StateId,
    event_ref: EventRef,
    is_inner: bool,
    event_data: Option<&dyn Any>,
) -> Result<(), StateMachineFault> {
    let (state, event, index) = match matched {
        Some(m) => m,
        None => return Ok(()),
    };
    let handler = take_handler(kernel, state, event, index);
    let mut handler = match handler {
        Some(h) => h,
        None => return Ok(()),
    };
    let info = TransitionInfo::new(
        State::new(kernel.clone(), from_leaf),
        State::new(kernel.clone(), to),
        event_ref,
        is_inner,
        event_data,
    );
    let result = catch_unwind(AssertUnwindSafe(|| handler(&info)));
    restore_handler(kernel, state, event, index, handler);
    result.map_err(|payload| {
        build_fault(
            kernel,
            kernel.machine_of(state),
            FaultComponent::Transition,
            payload,
            Some(from_leaf),
            Some(to),
            event,
        )
    })
}

fn run_exit_or_entry(
    kernel: &Kernel,
    state: StateId,
    from_leaf: StateId,
    to: StateId,
    event_ref: EventRef,
    event_data: Option<&dyn Any>,
    is_entry: bool,
) -> Result<(), StateMachineFault> {
    let handler = if is_entry {
        kernel.0.borrow_mut().states[state.0].entry.take()
    } else {
        kernel.0.borrow_mut().states[state.0].exit.take()
    };
    let mut handler = match handler {
        Some(h) => h,
        None => return Ok(()),
    };

    if is_entry {
        log::trace!("enter '{}'", kernel.state_name(state));
    } else {
        log::trace!("exit '{}'", kernel.state_name(state));
    }

    let event = event_ref.id;
    // Exit handlers see the varying exited state as `from` and the fixed
    // destination as `to` (spec §4.3 step 1); entry handlers see the fixed
    // original source as `from` and the varying entered state as `to` (step
    // 4) — the two loops share this function, but not this pair.
    let (info_from, info_to) = if is_entry { (from_leaf, state) } else { (state, to) };
    let info = StateHandlerInfo::new(
        State::new(kernel.clone(), info_from),
        State::new(kernel.clone(), info_to),
        event_ref,
        event_data,
    );
    let result = catch_unwind(AssertUnwindSafe(|| handler(&info)));

    if is_entry {
        kernel.0.borrow_mut().states[state.0].entry = Some(handler);
    } else {
        kernel.0.borrow_mut().states[state.0].exit = Some(handler);
    }

    result.map_err(|payload| {
        build_fault(
            kernel,
            kernel.machine_of(state),
            if is_entry { FaultComponent::Entry } else { FaultComponent::Exit },
            payload,
            Some(from_leaf),
            Some(to),
            event,
        )
    })
}

fn build_fault(
    kernel: &Kernel,
    machine: MachineId,
    component: FaultComponent,
    payload: Box<dyn Any + Send>,
    from: Option<StateId>,
    to: Option<StateId>,
    event: EventId,
) -> StateMachineFault {
    StateMachineFault {
        machine: Machine::new(kernel.clone(), machine),
        component,
        inner_message: panic_message(payload),
        from: from.map(|id| State::new(kernel.clone(), id)),
        to: to.map(|id| State::new(kernel.clone(), id)),
        event: EventRef { kernel: kernel.clone(), id: event },
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}

/// Least-common-ancestor exit/entry sets (spec §4.3), computed as the
/// common prefix of the two root-to-leaf state paths. A common length of
/// zero means the LCA is the implicit root machine — this falls out of the
/// same formula rather than a special case, which is what makes a forced
/// transition to a wholly unrelated branch (§9 Open Question) "just work":
/// the entire active chain exits down to the root, then the new chain
/// enters.
fn compute_exit_entry(kernel: &Kernel, from: StateId, to: StateId) -> (Vec<StateId>, Vec<StateId>) {
    let mut from_path = state_path_to_root(kernel, from);
    let mut to_path = state_path_to_root(kernel, to);
    from_path.reverse();
    to_path.reverse();

    let common = from_path
        .iter()
        .zip(to_path.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let exit_states: Vec<StateId> = from_path[common..].iter().rev().copied().collect();
    let entry_states: Vec<StateId> = to_path[common..].to_vec();
    (exit_states, entry_states)
}

/// `from`'s path to the root machine, leaf-first: the state itself, then
/// each ancestor state reached by following `machine.parent_state`.
fn state_path_to_root(kernel: &Kernel, from: StateId) -> Vec<StateId> {
    let mut path = vec![from];
    let mut cursor = from;
    loop {
        let machine = kernel.machine_of(cursor);
        let parent = kernel.0.borrow().machines[machine.0].parent_state;
        match parent {
            Some(state) => {
                path.push(state);
                cursor = state;
            }
            None => break,
        }
    }
    path
}

fn update_current_along_path(kernel: &Kernel, entry_states: &[StateId]) {
    let mut inner = kernel.0.borrow_mut();
    for &state in entry_states {
        let machine = inner.states[state.0].machine;
        inner.machines[machine.0].current = Some(state);
    }
}

/// After `to` is entered, recursively activates any child machine it owns
/// (and that child's child, and so on) to its own initial state. Returns
/// the newly-activated states, top-down, for the entry chain's tail.
fn activate_child_chains(kernel: &Kernel, to: StateId) -> Vec<StateId> {
    let mut activated = Vec::new();
    let mut cursor = to;
    loop {
        let child_machine = kernel.0.borrow().states[cursor.0].child_machine;
        let machine = match child_machine {
            Some(m) => m,
            None => break,
        };
        let initial = kernel.0.borrow().machines[machine.0].initial;
        let initial = match initial {
            Some(s) => s,
            None => break,
        };
        kernel.0.borrow_mut().machines[machine.0].current = Some(initial);
        activated.push(initial);
        cursor = initial;
    }
    activated
}

/// Clears `current` on `state`'s child machine and every machine further
/// down its active chain, the inverse of `activate_child_chains`.
fn deactivate_child_chain(kernel: &Kernel, state: StateId) {
    let child = kernel.0.borrow().states[state.0].child_machine;
    let machine = match child {
        Some(m) => m,
        None => return,
    };
    let nested = kernel.0.borrow_mut().machines[machine.0].current.take();
    if let Some(nested_state) = nested {
        deactivate_child_chain(kernel, nested_state);
    }
}

// --- take-out-of-arena / restore-into-arena helpers -----------------------
//
// Every guard, selector and handler call goes through one of these pairs so
// that no borrow of `Inner` is held while user code runs.

fn take_guard(kernel: &Kernel, state: StateId, event: EventId, index: usize) -> Option<GuardFn> {
    kernel.0.borrow_mut().states[state.0]
        .transitions
        .get_mut(&event)
        .and_then(|v| v.get_mut(index))
        .and_then(|t| t.guard.take())
}

fn restore_guard(kernel: &Kernel, state: StateId, event: EventId, index: usize, guard: GuardFn) {
    if let Some(t) = kernel.0.borrow_mut().states[state.0]
        .transitions
        .get_mut(&event)
        .and_then(|v| v.get_mut(index))
    {
        t.guard = Some(guard);
    }
}

fn take_selector(
    kernel: &Kernel,
    state: StateId,
    event: EventId,
    index: usize,
) -> Option<crate::handler::DynamicSelector> {
    let mut inner = kernel.0.borrow_mut();
    let t = inner.states[state.0].transitions.get_mut(&event)?.get_mut(index)?;
    match &mut t.kind {
        TransitionKindData::Dynamic { selector } => selector.take(),
        _ => None,
    }
}

fn restore_selector(
    kernel: &Kernel,
    state: StateId,
    event: EventId,
    index: usize,
    value: crate::handler::DynamicSelector,
) {
    let mut inner = kernel.0.borrow_mut();
    if let Some(t) = inner.states[state.0].transitions.get_mut(&event).and_then(|v| v.get_mut(index)) {
        if let TransitionKindData::Dynamic { selector } = &mut t.kind {
            *selector = Some(value);
        }
    }
}

fn take_handler(
    kernel: &Kernel,
    state: StateId,
    event: EventId,
    index: usize,
) -> Option<crate::handler::TransitionHandler> {
    kernel.0.borrow_mut().states[state.0]
        .transitions
        .get_mut(&event)
        .and_then(|v| v.get_mut(index))
        .and_then(|t| t.handler.take())
}

fn restore_handler(
    kernel: &Kernel,
    state: StateId,
    event: EventId,
    index: usize,
    handler: crate::handler::TransitionHandler,
) {
    if let Some(t) = kernel.0.borrow_mut().states[state.0]
        .transitions
        .get_mut(&event)
        .and_then(|v| v.get_mut(index))
    {
        t.handler = Some(handler);
    }
}
