//! Arena handles for the tree's states, machines and events.
//!
//! The hierarchy is cyclic by nature (a machine owns states, a state may own
//! a child machine, and both states and machines need to look back at the
//! kernel that owns the whole tree). Rather than model that with reference
//! cycles, every node lives in a flat `Vec` inside [`crate::kernel::Inner`]
//! and is addressed by a stable index. Back-references are then just index
//! copies, which keeps `reset` and traversal allocation-free.

use std::fmt;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub(crate) struct $name(pub(crate) usize);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

arena_id!(StateId);
arena_id!(MachineId);
arena_id!(EventId);
