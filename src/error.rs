//! The error taxonomy from spec §6/§7, as a `thiserror` enum in the style of
//! `state-machines-core::TransitionError`: plain data variants, `Display`
//! generated from `#[error(...)]`, no hand-rolled `Display` impl.

use thiserror::Error;

use crate::event::EventRef;
use crate::machine::Machine;
use crate::state::State;

/// Which kind of handler raised the fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultComponent {
    Entry,
    Exit,
    Transition,
    Guard,
    Dynamic,
}

impl std::fmt::Display for FaultComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FaultComponent::Entry => "entry",
            FaultComponent::Exit => "exit",
            FaultComponent::Transition => "transition",
            FaultComponent::Guard => "guard",
            FaultComponent::Dynamic => "dynamic",
        };
        f.write_str(name)
    }
}

/// A captured handler panic, latched onto the kernel until `reset`.
///
/// Rust has no generic exception type to carry, so "non-control exception"
/// (spec §4.5) is modeled as a caught panic; `inner_message` is the panic
/// payload downcast to a string where possible (see `dispatch::panic_message`).
#[derive(Debug, Clone)]
pub struct StateMachineFault {
    pub machine: Machine,
    pub component: FaultComponent,
    pub inner_message: String,
    pub from: Option<State>,
    pub to: Option<State>,
    pub event: EventRef,
}

impl std::fmt::Display for StateMachineFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} handler failed in machine '{}' on event '{}': {}",
            self.component,
            self.machine.name(),
            self.event.name(),
            self.inner_message
        )
    }
}

#[derive(Debug, Error, Clone)]
pub enum StateMachineError {
    #[error("no transition found for event '{event}' from state '{from}' in machine '{machine}'")]
    TransitionNotFound {
        from: String,
        event: String,
        machine: String,
    },

    #[error("transition failed: {fault}")]
    TransitionFailed { fault: StateMachineFault },

    #[error("machine is faulted: {fault}")]
    MachineFaulted { fault: StateMachineFault },

    #[error("machine '{0}' has no current state (uninitialized or inactive)")]
    InvalidState(String),

    #[error("initial state already set for machine '{0}'")]
    AlreadyInitialized(String),
}
