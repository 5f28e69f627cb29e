//! The optional external serialization hook described in spec §4.6.
//!
//! Absent a synchronizer, every dispatch and reset runs synchronously on the
//! caller's thread. Installing one lets a host adapt a tree to a particular
//! thread or executor (for example, posting dispatch onto a UI thread)
//! without the kernel itself taking any locks.

use crate::error::StateMachineError;

/// Which public entry point a wrapped dispatch closure is servicing.
///
/// `Fire` must either run synchronously and return the real result, or the
/// synchronizer must document that deferred execution is incompatible with
/// `fire` (which needs to know whether to raise `TransitionNotFound`).
/// `TryFire` may return an optimistic `true` for deferred work, mirroring the
/// same contract the kernel itself uses for reentrant fires (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireMethod {
    Fire,
    TryFire,
}

/// Brackets a single top-level dispatch or a `reset` with user-supplied
/// scheduling.
pub trait Synchronizer {
    /// Wraps one top-level dispatch. `dispatch` runs the kernel's actual
    /// transition search and handler sequencing; call it exactly once to
    /// honor run-to-completion.
    fn fire_event(
        &mut self,
        method: FireMethod,
        dispatch: &mut dyn FnMut() -> Result<bool, StateMachineError>,
    ) -> Result<bool, StateMachineError>;

    /// Wraps `reset`.
    fn reset(&mut self, action: &mut dyn FnMut());
}

/// Runs dispatch/reset inline. Installed implicitly when no synchronizer is
/// configured; kept as a type so tests can install it explicitly too.
#[derive(Default)]
pub struct InlineSynchronizer;

impl Synchronizer for InlineSynchronizer {
    fn fire_event(
        &mut self,
        _method: FireMethod,
        dispatch: &mut dyn FnMut() -> Result<bool, StateMachineError>,
    ) -> Result<bool, StateMachineError> {
        dispatch()
    }

    fn reset(&mut self, action: &mut dyn FnMut()) {
        action()
    }
}
