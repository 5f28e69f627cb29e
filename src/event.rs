//! Public handle to an event, typed and untyped (spec §3 "Event").

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use crate::error::StateMachineError;
use crate::ids::EventId;
use crate::kernel::{EventData, Kernel};
use crate::machine::Machine;

/// A non-generic handle to an event's identity — what handler `Info`
/// descriptors and faults carry, since they serve both typed and untyped
/// events and can't name a payload type. Obtained from an [`Event<T>`] via
/// [`Event::as_ref`].
#[derive(Clone)]
pub struct EventRef {
    pub(crate) kernel: Kernel,
    pub(crate) id: EventId,
}

impl EventRef {
    pub fn name(&self) -> String {
        self.kernel.event_name(self.id)
    }
}

impl PartialEq for EventRef {
    fn eq(&self, other: &Self) -> bool {
        self.kernel == other.kernel && self.id == other.id
    }
}
impl Eq for EventRef {}

impl fmt::Debug for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRef").field("name", &self.name()).finish()
    }
}

/// An event bound to one machine tree at construction, optionally carrying
/// a typed payload `T`. An untyped event is simply `Event<()>`, fired as
/// `event.fire(())` — Rust has no method-overload story for an optional
/// argument, so this is the idiomatic rendering of spec §6's "untyped:
/// `try-fire() -> bool`, typed: `try-fire(data) -> bool`" surface.
pub struct Event<T = ()> {
    inner: EventRef,
    _marker: PhantomData<fn(T)>,
}

impl<T: 'static> Event<T> {
    /// Registers a new event on `machine`'s tree.
    pub fn new(machine: &Machine, name: impl Into<String>) -> Self {
        let kernel = machine.kernel.clone();
        let id = {
            let mut inner = kernel.0.borrow_mut();
            let id = EventId(inner.events.len());
            inner.events.push(EventData { name: name.into() });
            id
        };
        Self {
            inner: EventRef { kernel, id },
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> String {
        self.inner.name()
    }

    /// The type-erased handle used by handler `Info` descriptors and faults.
    pub fn as_ref(&self) -> EventRef {
        self.inner.clone()
    }

    /// Attempts to deliver this event to the currently-active hierarchy.
    /// Returns `Ok(true)` if some state accepted it, `Ok(false)` if no
    /// transition matched anywhere in the active chain.
    pub fn try_fire(&self, data: T) -> Result<bool, StateMachineError> {
        crate::dispatch::try_fire(&self.inner.kernel, self.inner.id, Some(Box::new(data) as Box<dyn Any>))
    }

    /// Semantically `try_fire`, but raises [`StateMachineError::TransitionNotFound`]
    /// instead of returning `false`.
    pub fn fire(&self, data: T) -> Result<(), StateMachineError> {
        crate::dispatch::fire(&self.inner.kernel, self.inner.id, Some(Box::new(data) as Box<dyn Any>))
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Event<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}
impl<T> Eq for Event<T> {}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("name", &self.inner.name()).finish()
    }
}
