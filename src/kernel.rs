//! The per-tree arena and kernel state (spec §3 "Kernel", §9 "arena per
//! tree").
//!
//! One [`Inner`] holds every state, machine, event and transition in a tree,
//! plus the kernel bookkeeping (fault, reentrancy flag, pending queue,
//! synchronizer). It is shared via `Rc<RefCell<Inner>>` — "exactly one
//! kernel per tree... share via a reference-counted handle" — so `State`,
//! `Machine` and `Event` handles are just a [`Kernel`] clone plus an index.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::error::StateMachineFault;
use crate::handler::{DynamicSelector, EntryExitHandler, GuardFn, TransitionHandler};
use crate::ids::{EventId, MachineId, StateId};
use crate::synchronizer::Synchronizer;

pub(crate) enum TransitionKindData {
    Normal { to: StateId },
    InnerSelf,
    /// `None` only momentarily, while the selector is taken out of the arena
    /// to be invoked without holding a borrow (see `dispatch::take_selector`).
    Dynamic { selector: Option<DynamicSelector> },
}

pub(crate) struct TransitionData {
    pub kind: TransitionKindData,
    pub guard: Option<GuardFn>,
    pub handler: Option<TransitionHandler>,
    #[allow(dead_code)]
    pub event: EventId,
}

pub(crate) struct StateData {
    pub name: String,
    pub machine: MachineId,
    pub child_machine: Option<MachineId>,
    pub entry: Option<EntryExitHandler>,
    pub exit: Option<EntryExitHandler>,
    /// Outbound transitions for this state, keyed by event. Order within a
    /// `Vec` is priority: first match (guard true, or dynamic selector
    /// non-null) wins.
    pub transitions: HashMap<EventId, Vec<TransitionData>>,
}

pub(crate) struct MachineData {
    pub name: String,
    pub parent_state: Option<StateId>,
    pub initial: Option<StateId>,
    pub current: Option<StateId>,
    #[allow(dead_code)]
    pub states: Vec<StateId>,
}

pub(crate) struct EventData {
    pub name: String,
}

/// A fire or forced-transition request, either running immediately or
/// queued while another dispatch is in progress (spec §4.4).
pub(crate) enum QueuedItem {
    Fire {
        event: EventId,
        data: Option<Box<dyn Any>>,
    },
    Forced {
        target: StateId,
        event: EventId,
    },
}

pub(crate) struct Inner {
    pub states: Vec<StateData>,
    pub machines: Vec<MachineData>,
    pub events: Vec<EventData>,
    pub fault: Option<StateMachineFault>,
    pub executing: bool,
    pub queue: VecDeque<QueuedItem>,
    pub synchronizer: Option<Box<dyn Synchronizer>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            states: Vec::new(),
            machines: Vec::new(),
            events: Vec::new(),
            fault: None,
            executing: false,
            queue: VecDeque::new(),
            synchronizer: None,
        }
    }
}

/// Shared handle to a tree's arena and kernel bookkeeping. Cloning is a
/// cheap `Rc` clone; every `State`/`Machine`/`Event` in one tree shares the
/// same `Kernel`.
#[derive(Clone)]
pub struct Kernel(pub(crate) Rc<RefCell<Inner>>);

impl Kernel {
    pub(crate) fn new() -> Self {
        Self(Rc::new(RefCell::new(Inner::new())))
    }

    /// The tree always has exactly one root machine, created first.
    pub(crate) fn root_machine(&self) -> MachineId {
        MachineId(0)
    }

    pub(crate) fn machine_name(&self, id: MachineId) -> String {
        self.0.borrow().machines[id.0].name.clone()
    }

    pub(crate) fn state_name(&self, id: StateId) -> String {
        self.0.borrow().states[id.0].name.clone()
    }

    pub(crate) fn event_name(&self, id: EventId) -> String {
        self.0.borrow().events[id.0].name.clone()
    }

    pub(crate) fn machine_of(&self, state: StateId) -> MachineId {
        self.0.borrow().states[state.0].machine
    }
}

impl PartialEq for Kernel {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Kernel {}
