//! Descriptors passed to entry/exit/transition handlers and guards, plus the
//! closure type aliases the arena stores.
//!
//! Handlers are plain synchronous closures rather than a typed-payload
//! generic per handler: the event's payload is erased to `&dyn Any` at
//! fire time and recovered with [`TransitionInfo::event_data`] /
//! [`StateHandlerInfo::event_data`]. This is the "registry stores invoker
//! closures, not handler pointers" approach called out for typed vs. untyped
//! events — one erased dispatch routine serves both.

use std::any::Any;

use crate::event::EventRef;
use crate::ids::StateId;
use crate::state::State;

/// Descriptor passed to a transition's guard and handler.
pub struct TransitionInfo<'a> {
    pub from: State,
    pub to: State,
    pub event: EventRef,
    pub is_inner: bool,
    event_data: Option<&'a dyn Any>,
}

impl<'a> TransitionInfo<'a> {
    pub(crate) fn new(
        from: State,
        to: State,
        event: EventRef,
        is_inner: bool,
        event_data: Option<&'a dyn Any>,
    ) -> Self {
        Self {
            from,
            to,
            event,
            is_inner,
            event_data,
        }
    }

    /// Recovers the event's payload if it was fired with one of type `T`.
    pub fn event_data<T: 'static>(&self) -> Option<&T> {
        self.event_data.and_then(|d| d.downcast_ref::<T>())
    }
}

/// Descriptor passed to an entry or exit handler.
pub struct StateHandlerInfo<'a> {
    pub from: State,
    pub to: State,
    pub event: EventRef,
    event_data: Option<&'a dyn Any>,
}

impl<'a> StateHandlerInfo<'a> {
    pub(crate) fn new(from: State, to: State, event: EventRef, event_data: Option<&'a dyn Any>) -> Self {
        Self {
            from,
            to,
            event,
            event_data,
        }
    }

    pub fn event_data<T: 'static>(&self) -> Option<&T> {
        self.event_data.and_then(|d| d.downcast_ref::<T>())
    }
}

/// Context passed to a dynamic transition's destination selector.
pub struct DynamicContext<'a> {
    pub from: State,
    pub event: EventRef,
    event_data: Option<&'a dyn Any>,
}

impl<'a> DynamicContext<'a> {
    pub(crate) fn new(from: State, event: EventRef, event_data: Option<&'a dyn Any>) -> Self {
        Self {
            from,
            event,
            event_data,
        }
    }

    pub fn event_data<T: 'static>(&self) -> Option<&T> {
        self.event_data.and_then(|d| d.downcast_ref::<T>())
    }
}

pub(crate) type EntryExitHandler = Box<dyn FnMut(&StateHandlerInfo)>;
pub(crate) type TransitionHandler = Box<dyn FnMut(&TransitionInfo)>;
pub(crate) type GuardFn = Box<dyn Fn(&TransitionInfo) -> bool>;
pub(crate) type DynamicSelector = Box<dyn FnMut(&DynamicContext) -> Option<StateId>>;
