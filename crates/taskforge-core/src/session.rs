//! Explicit session context.
//!
//! The signed-in identity is a value owned by the sync layer rather than
//! ambient global state. It starts signed out, is replaced on every
//! identity-provider callback and cleared on sign-out. The epoch increases
//! on every actual change and is published in
//! [`MirrorView::session_epoch`](crate::view::MirrorView).

use crate::identity::Identity;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    identity: Option<Identity>,
    epoch: u64,
}

impl Session {
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Install `next`. Returns `false` (and keeps the epoch) when `next`
    /// equals the identity already held.
    pub fn replace(&mut self, next: Option<Identity>) -> bool {
        if self.identity == next {
            return false;
        }
        self.identity = next;
        self.epoch += 1;
        true
    }
}
