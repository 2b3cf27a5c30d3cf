//! Scoped markers (§4.5): an immutable snapshot of an arena's position,
//! released in LIFO order to roll the arena back.

use crate::arena::Arena;

/// A saved arena position (§3's "temp marker"). Temps nest: any number of
/// outstanding temps on one arena are valid as long as they are released
/// in LIFO order — releasing out of order is not detected but rolls back
/// more than intended.
#[derive(Clone, Copy)]
pub struct Temp<'a> {
    arena: Option<&'a Arena>,
    saved_pos: u64,
}

impl<'a> Temp<'a> {
    /// The zero-initialized temp `scratch_get` returns when every scratch
    /// slot conflicts (§4.6): its arena is absent, so ending it is a no-op.
    pub(crate) const fn empty() -> Self {
        Temp {
            arena: None,
            saved_pos: 0,
        }
    }

    /// `true` for the value returned when every scratch slot conflicted.
    pub fn is_empty(&self) -> bool {
        self.arena.is_none()
    }

    /// The arena this temp was captured on, if any. Lets a caller holding
    /// a scratch temp pass its underlying arena into a nested
    /// `scratch_get`'s conflict set (§4.6 scenario: "caller holds
    /// scratch[0] as a temp").
    pub fn arena(&self) -> Option<&'a Arena> {
        self.arena
    }
}

/// §4.5 `temp_begin`.
pub fn temp_begin(arena: &Arena) -> Temp<'_> {
    Temp {
        arena: Some(arena),
        saved_pos: arena.pos(),
    }
}

/// §4.5 `temp_end`.
pub fn temp_end(temp: Temp<'_>) {
    if let Some(arena) = temp.arena {
        arena.pop_to(temp.saved_pos);
    }
}

/// A scope-guard convenience wrapping a [`Temp`] (§9 Design Notes: "a
/// systems-language implementation should also offer a scope-guard
/// convenience"). Calls `temp_end` on drop, covering early returns and
/// panics alike; the underlying contract — LIFO release — is unchanged,
/// so nested guards must still be dropped innermost-first.
pub struct TempGuard<'a> {
    temp: Option<Temp<'a>>,
}

impl<'a> TempGuard<'a> {
    pub fn new(arena: &'a Arena) -> Self {
        TempGuard {
            temp: Some(temp_begin(arena)),
        }
    }
}

impl Drop for TempGuard<'_> {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            temp_end(temp);
        }
    }
}
