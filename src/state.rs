//! Public handle to a node in the hierarchy (spec §3 "State").

use std::fmt;

use crate::event::EventRef;
use crate::handler::StateHandlerInfo;
use crate::ids::{MachineId, StateId};
use crate::kernel::{Kernel, MachineData};
use crate::machine::Machine;
use crate::transition::TransitionBuilder;

/// A named node in a machine's hierarchy. Cheap to clone: it is a [`Kernel`]
/// handle plus an arena index, not an owner of the underlying data.
#[derive(Clone)]
pub struct State {
    pub(crate) kernel: Kernel,
    pub(crate) id: StateId,
}

impl State {
    pub(crate) fn new(kernel: Kernel, id: StateId) -> Self {
        Self { kernel, id }
    }

    pub fn name(&self) -> String {
        self.kernel.state_name(self.id)
    }

    /// The machine this state belongs to.
    pub fn machine(&self) -> Machine {
        let machine_id = self.kernel.machine_of(self.id);
        Machine::new(self.kernel.clone(), machine_id)
    }

    /// The child machine exclusively owned by this state, if any.
    pub fn child_machine(&self) -> Option<Machine> {
        let child = self.kernel.0.borrow().states[self.id.0].child_machine;
        child.map(|id| Machine::new(self.kernel.clone(), id))
    }

    /// Creates a child machine exclusively owned by this state. A state's
    /// child machine, once created, never changes (§3 invariant).
    pub fn create_child_machine(&self, name: impl Into<String>) -> Machine {
        let mut inner = self.kernel.0.borrow_mut();
        let machine_id = MachineId(inner.machines.len());
        inner.machines.push(MachineData {
            name: name.into(),
            parent_state: Some(self.id),
            initial: None,
            current: None,
            states: Vec::new(),
        });
        inner.states[self.id.0].child_machine = Some(machine_id);
        drop(inner);
        Machine::new(self.kernel.clone(), machine_id)
    }

    /// Installs this state's entry handler. Consumes and returns `self` so
    /// construction reads as a chain: `state.with_entry(...).with_exit(...)`.
    pub fn with_entry(self, handler: impl FnMut(&StateHandlerInfo) + 'static) -> Self {
        self.kernel.0.borrow_mut().states[self.id.0].entry = Some(Box::new(handler));
        self
    }

    pub fn with_exit(self, handler: impl FnMut(&StateHandlerInfo) + 'static) -> Self {
        self.kernel.0.borrow_mut().states[self.id.0].exit = Some(Box::new(handler));
        self
    }

    /// Starts building an outbound transition for `event` from this state.
    pub fn transition_on(&self, event: &EventRef) -> TransitionBuilder {
        TransitionBuilder::new(self.kernel.clone(), self.id, event.id)
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.kernel == other.kernel && self.id == other.id
    }
}
impl Eq for State {}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State").field("name", &self.name()).finish()
    }
}
