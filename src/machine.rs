//! Public handle to a machine — root or nested child (spec §3 "Machine").

use std::collections::HashMap;
use std::fmt;

use crate::error::StateMachineError;
use crate::event::EventRef;
use crate::ids::{MachineId, StateId};
use crate::kernel::{Kernel, MachineData, StateData};
use crate::state::State;
use crate::synchronizer::Synchronizer;

/// A machine: an ordered collection of states with a designated initial
/// state and a current-state pointer. May be nested as the child machine of
/// a state in a larger tree; all machines in one tree share one [`Kernel`].
#[derive(Clone)]
pub struct Machine {
    pub(crate) kernel: Kernel,
    pub(crate) id: MachineId,
}

impl Machine {
    pub(crate) fn new(kernel: Kernel, id: MachineId) -> Self {
        Self { kernel, id }
    }

    /// Starts a new, independent machine tree with this machine as its root.
    pub fn new_tree(name: impl Into<String>) -> Self {
        let kernel = Kernel::new();
        let id = {
            let mut inner = kernel.0.borrow_mut();
            let id = MachineId(inner.machines.len());
            inner.machines.push(MachineData {
                name: name.into(),
                parent_state: None,
                initial: None,
                current: None,
                states: Vec::new(),
            });
            id
        };
        Self { kernel, id }
    }

    pub fn name(&self) -> String {
        self.kernel.machine_name(self.id)
    }

    /// Creates a new, non-initial state owned by this machine.
    pub fn create_state(&self, name: impl Into<String>) -> State {
        let mut inner = self.kernel.0.borrow_mut();
        let id = StateId(inner.states.len());
        inner.states.push(StateData {
            name: name.into(),
            machine: self.id,
            child_machine: None,
            entry: None,
            exit: None,
            transitions: HashMap::new(),
        });
        inner.machines[self.id.0].states.push(id);
        drop(inner);
        State::new(self.kernel.clone(), id)
    }

    /// Creates this machine's initial state. May be called exactly once per
    /// machine (§4.7); a second call raises [`StateMachineError::AlreadyInitialized`].
    ///
    /// If the parent state is already the parent machine's current state (or
    /// this is the root machine), the new state activates immediately — the
    /// Uninitialized → Active edge of §4.7. Otherwise the machine becomes
    /// Inactive until its parent state is entered.
    pub fn create_initial_state(&self, name: impl Into<String>) -> Result<State, StateMachineError> {
        if self.kernel.0.borrow().machines[self.id.0].initial.is_some() {
            return Err(StateMachineError::AlreadyInitialized(self.name()));
        }
        let state = self.create_state(name);
        let mut inner = self.kernel.0.borrow_mut();
        inner.machines[self.id.0].initial = Some(state.id);
        let should_activate = match inner.machines[self.id.0].parent_state {
            None => true,
            Some(parent_state) => {
                let parent_machine = inner.states[parent_state.0].machine;
                inner.machines[parent_machine.0].current == Some(parent_state)
            }
        };
        if should_activate {
            inner.machines[self.id.0].current = Some(state.id);
        }
        Ok(state)
    }

    /// The state this machine currently occupies, or `None` if inactive.
    pub fn current_state(&self) -> Option<State> {
        let current = self.kernel.0.borrow().machines[self.id.0].current;
        current.map(|id| State::new(self.kernel.clone(), id))
    }

    /// The deepest active state reached by following child machines down
    /// from this machine's current state (§8 invariant 3). Walks the live
    /// arena on every call rather than caching, so it is always consistent
    /// with the states it derives from.
    pub fn current_state_recursive(&self) -> Option<State> {
        let mut current = self.current_state()?;
        loop {
            match current.child_machine() {
                Some(child) => match child.current_state() {
                    Some(next) => current = next,
                    None => return Some(current),
                },
                None => return Some(current),
            }
        }
    }

    /// Whether this machine currently has a current state.
    pub fn is_active(&self) -> bool {
        self.kernel.0.borrow().machines[self.id.0].current.is_some()
    }

    /// Forces the active chain anywhere in the tree directly to `target`,
    /// bypassing the event map and any guard (spec §4.2 "Forced
    /// transitions"). `event` only populates the handler `Info` records.
    pub fn force_transition(&self, target: &State, event: &EventRef) -> Result<(), StateMachineError> {
        crate::dispatch::force_transition(&self.kernel, target.id, event.id)
    }

    /// Clears any fault, clears the pending queue, and recursively resets
    /// every machine in the tree to its initial state (or `None`, if its
    /// parent state is not its parent machine's current state). Runs no
    /// entry/exit handlers.
    pub fn reset(&self) {
        crate::dispatch::reset(&self.kernel)
    }

    /// Whether `other` is an ancestor of this machine, walking up through
    /// parent states across machine boundaries.
    pub fn is_child_of(&self, other: &Machine) -> bool {
        if self.kernel != other.kernel {
            return false;
        }
        let inner = self.kernel.0.borrow();
        let mut cursor = inner.machines[self.id.0].parent_state;
        while let Some(state) = cursor {
            let machine = inner.states[state.0].machine;
            if machine == other.id {
                return true;
            }
            cursor = inner.machines[machine.0].parent_state;
        }
        false
    }

    /// Installs a synchronizer that brackets every top-level dispatch and
    /// `reset` on this tree (spec §4.6). Only meaningful called on the root
    /// machine — the synchronizer lives on the shared kernel, so installing
    /// one from any machine in the tree has the same effect.
    pub fn set_synchronizer(&self, synchronizer: impl Synchronizer + 'static) {
        self.kernel.0.borrow_mut().synchronizer = Some(Box::new(synchronizer));
    }

    /// The root machine of this machine's tree.
    pub fn topmost_machine(&self) -> Machine {
        let inner = self.kernel.0.borrow();
        let mut id = self.id;
        loop {
            match inner.machines[id.0].parent_state {
                None => break,
                Some(state) => id = inner.states[state.0].machine,
            }
        }
        drop(inner);
        Machine::new(self.kernel.clone(), id)
    }
}

impl PartialEq for Machine {
    fn eq(&self, other: &Self) -> bool {
        self.kernel == other.kernel && self.id == other.id
    }
}
impl Eq for Machine {}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine").field("name", &self.name()).finish()
    }
}
