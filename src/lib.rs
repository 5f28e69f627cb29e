//! A hierarchical state machine dispatch core.
//!
//! A machine tree is built from nested [`Machine`]s and [`State`]s: a state
//! may own a child machine, so the hierarchy is a tree of machines linked
//! through the states that contain them. Firing an [`Event`] searches the
//! currently-active chain from the deepest machine upward, runs the
//! matching transition's exit/transition/entry handler sequence across the
//! least common ancestor of the source and destination states, and updates
//! `current` at every machine the transition crosses.
//!
//! ```
//! use hsm_core::{Event, Machine};
//!
//! let root = Machine::new_tree("root");
//! let a = root.create_initial_state("A").unwrap();
//! let b = root.create_state("B");
//! let e = Event::<()>::new(&root, "e");
//!
//! a.transition_on(&e.as_ref()).to(&b);
//! e.fire(()).unwrap();
//! assert_eq!(root.current_state().unwrap().name(), "B");
//! ```
//!
//! Reentrant fires — an event fired from inside a handler — are queued
//! rather than dispatched immediately, preserving run-to-completion: the
//! outermost fire's handler chain always finishes before a queued fire
//! begins. A handler panic is caught at the dispatcher boundary and latches
//! the whole tree into a faulted state until [`Machine::reset`] is called.

mod dispatch;
mod error;
mod event;
mod handler;
mod ids;
mod kernel;
mod machine;
mod state;
mod synchronizer;
mod transition;

pub use error::{FaultComponent, StateMachineError, StateMachineFault};
pub use event::{Event, EventRef};
pub use handler::{DynamicContext, StateHandlerInfo, TransitionInfo};
pub use machine::Machine;
pub use state::State;
pub use synchronizer::{FireMethod, InlineSynchronizer, Synchronizer};
pub use transition::{DynamicTransitionHandle, TransitionBuilder, TransitionHandle};
