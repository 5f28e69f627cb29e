//! Builder surface for declaring transitions (spec §6 "Machine tree
//! construction"): `state.transition_on(event).to(state).with_guard(...)`.

use crate::handler::{DynamicContext, GuardFn, TransitionHandler, TransitionInfo};
use crate::ids::{EventId, StateId};
use crate::kernel::{Kernel, TransitionData, TransitionKindData};
use crate::state::State;

/// Returned by [`State::transition_on`]; picks the transition's variant.
pub struct TransitionBuilder {
    kernel: Kernel,
    from: StateId,
    event: EventId,
}

impl TransitionBuilder {
    pub(crate) fn new(kernel: Kernel, from: StateId, event: EventId) -> Self {
        Self { kernel, from, event }
    }

    /// A normal transition to a named destination state. If `state` is the
    /// same state this transition is declared on, it behaves as the "normal
    /// self-transition" case of §4.3: exit, handler, entry all run.
    pub fn to(self, state: &State) -> TransitionHandle {
        let to = state.id;
        let index = self.push(TransitionKindData::Normal { to });
        TransitionHandle::new(self.kernel, self.from, self.event, index)
    }

    /// Equivalent to `to` with the same state this transition is declared on.
    pub fn to_self(self) -> TransitionHandle {
        let to = self.from;
        let index = self.push(TransitionKindData::Normal { to });
        TransitionHandle::new(self.kernel, self.from, self.event, index)
    }

    /// A destination computed at fire time. The selector runs in place of a
    /// guard; returning `None` means "no match at this level" — spec §4.2
    /// describes dynamic transitions as "typically hav[ing] no separate
    /// guard," so unlike [`TransitionHandle`] the handle returned here has
    /// no `with_guard`: there is nothing in the dispatcher that would ever
    /// consult one.
    pub fn to_dynamic(
        self,
        mut selector: impl FnMut(&DynamicContext) -> Option<State> + 'static,
    ) -> DynamicTransitionHandle {
        let erased = Box::new(move |ctx: &DynamicContext| selector(ctx).map(|s| s.id));
        let index = self.push(TransitionKindData::Dynamic { selector: Some(erased) });
        DynamicTransitionHandle::new(self.kernel, self.from, self.event, index)
    }

    /// `from -> from` but suppresses exit/entry; only the transition handler
    /// runs, with `is_inner = true` (spec §4.3).
    pub fn inner_self(self) -> TransitionHandle {
        let index = self.push(TransitionKindData::InnerSelf);
        TransitionHandle::new(self.kernel, self.from, self.event, index)
    }

    fn push(&self, kind: TransitionKindData) -> usize {
        let mut inner = self.kernel.0.borrow_mut();
        let bucket = inner.states[self.from.0]
            .transitions
            .entry(self.event)
            .or_insert_with(Vec::new);
        let index = bucket.len();
        bucket.push(TransitionData {
            kind,
            guard: None,
            handler: None,
            event: self.event,
        });
        index
    }
}

fn transition_mut(
    kernel: &Kernel,
    from: StateId,
    event: EventId,
    index: usize,
) -> std::cell::RefMut<'_, TransitionData> {
    std::cell::RefMut::map(kernel.0.borrow_mut(), |inner| {
        &mut inner.states[from.0].transitions.get_mut(&event).unwrap()[index]
    })
}

/// A declared normal/inner-self transition, returned so its guard/handler can
/// be attached. Transitions at one `(state, event)` pair are tried in
/// declaration order; the first whose guard passes wins (spec §4.2).
pub struct TransitionHandle {
    kernel: Kernel,
    from: StateId,
    event: EventId,
    index: usize,
}

impl TransitionHandle {
    fn new(kernel: Kernel, from: StateId, event: EventId, index: usize) -> Self {
        Self { kernel, from, event, index }
    }

    pub fn with_guard(self, guard: impl Fn(&TransitionInfo) -> bool + 'static) -> Self {
        transition_mut(&self.kernel, self.from, self.event, self.index).guard = Some(Box::new(guard) as GuardFn);
        self
    }

    pub fn with_handler(self, handler: impl FnMut(&TransitionInfo) + 'static) -> Self {
        transition_mut(&self.kernel, self.from, self.event, self.index).handler =
            Some(Box::new(handler) as TransitionHandler);
        self
    }
}

/// A declared dynamic transition, returned so its handler can be attached.
/// Has no `with_guard`: the selector itself is the sole match/no-match
/// signal for this variant (spec §4.2).
pub struct DynamicTransitionHandle {
    kernel: Kernel,
    from: StateId,
    event: EventId,
    index: usize,
}

impl DynamicTransitionHandle {
    fn new(kernel: Kernel, from: StateId, event: EventId, index: usize) -> Self {
        Self { kernel, from, event, index }
    }

    pub fn with_handler(self, handler: impl FnMut(&TransitionInfo) + 'static) -> Self {
        transition_mut(&self.kernel, self.from, self.event, self.index).handler =
            Some(Box::new(handler) as TransitionHandler);
        self
    }
}
