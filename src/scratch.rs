//! Per-thread scratch pool (§4.6): `N` pre-sized scratch arenas, lazily
//! materialized on first use, selected to avoid conflicts with arenas the
//! caller already holds.
//!
//! The C original keeps this as `SIA_THREAD_VAR` globals (`__thread` /
//! `thread_local`); this port makes the per-thread ownership explicit via
//! `thread_local!` instead of a raw storage-class attribute (§5, §9).

use crate::arena::Arena;
use crate::desc::{ArenaDesc, Backend};
use crate::error::default_diagnostic_sink;
use crate::temp::{temp_begin, temp_end, Temp};
use std::cell::RefCell;

/// Default number of scratch arenas per thread (§6).
pub const SCRATCH_POOL_SIZE: usize = 2;

const SCRATCH_MAX_SIZE: u64 = 64 * 1024 * 1024;
const SCRATCH_BLOCK_SIZE: u32 = 256 * 1024;

/// Unlike a user-created arena with no explicit callback, the reference's
/// scratch pool is not silent on error — it wires a diagnostic callback by
/// default (§4.6), so a caller who overruns scratch space still hears
/// about it.
fn default_scratch_desc() -> ArenaDesc {
    ArenaDesc {
        desired_max_size: SCRATCH_MAX_SIZE,
        desired_block_size: SCRATCH_BLOCK_SIZE,
        align: 0,
        error_callback: Some(default_diagnostic_sink),
        backend: Backend::ReserveCommit,
    }
}

thread_local! {
    static SCRATCH_DESC: RefCell<ArenaDesc> = RefCell::new(default_scratch_desc());
    // Leaked once on first use: the pool lives for the thread's duration
    // and is never moved, so handing out `&'static Arena` borrows from it
    // is sound. There is no teardown hook; the leak is reclaimed by the OS
    // at thread exit, which is the same outcome §9's "tear down at thread
    // exit when the host provides a hook" allows when no hook exists.
    static SCRATCH_POOL: RefCell<Option<&'static [Arena]>> = RefCell::new(None);
}

/// §4.6: settable only before the pool is materialized; subsequent calls
/// after the first `scratch_get` are silently ignored.
pub fn scratch_set_desc(desc: ArenaDesc) {
    let materialized = SCRATCH_POOL.with(|pool| pool.borrow().is_some());
    if !materialized {
        SCRATCH_DESC.with(|d| *d.borrow_mut() = desc);
    }
}

fn materialize() -> &'static [Arena] {
    SCRATCH_POOL.with(|pool| {
        let mut pool_ref = pool.borrow_mut();
        if pool_ref.is_none() {
            let desc = SCRATCH_DESC.with(|d| *d.borrow());
            let mut arenas = Vec::with_capacity(SCRATCH_POOL_SIZE);
            for _ in 0..SCRATCH_POOL_SIZE {
                arenas.push(Arena::create(&desc).expect("failed to materialize scratch arena"));
            }
            *pool_ref = Some(Box::leak(arenas.into_boxed_slice()));
        }
        pool_ref.expect("just initialized above")
    })
}

/// §4.6 `scratch_get`. Walks the pool in order and keeps the last
/// non-conflicting slot seen — when more than one slot is free, that
/// iteration order (not "first free") is what determines the winner,
/// matching the reference implementation's unconditional-overwrite loop.
pub fn scratch_get(conflicts: &[&Arena]) -> Temp<'static> {
    let pool = materialize();
    let mut chosen: Option<&'static Arena> = None;
    for arena in pool {
        let conflicts_here = conflicts.iter().any(|c| std::ptr::eq(*c, arena));
        if !conflicts_here {
            chosen = Some(arena);
        }
    }
    match chosen {
        Some(arena) => temp_begin(arena),
        None => Temp::empty(),
    }
}

/// §4.6 `scratch_release`.
pub fn scratch_release(temp: Temp<'static>) {
    temp_end(temp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_get_avoids_conflicting_slot() {
        let first = scratch_get(&[]);
        let held = first.arena().expect("first slot should not be empty");

        let second = scratch_get(&[held]);
        assert!(!second.is_empty());
        assert!(!std::ptr::eq(second.arena().unwrap(), held));

        scratch_release(second);
        scratch_release(first);
    }

    #[test]
    fn scratch_slots_are_independent() {
        let held = scratch_get(&[]);
        let held_arena = held.arena().unwrap();
        let pos_before = held_arena.pos();

        let other = scratch_get(&[held_arena]);
        if let Some(other_arena) = other.arena() {
            other_arena.push(64);
        }
        assert_eq!(held_arena.pos(), pos_before);

        scratch_release(other);
        scratch_release(held);
    }
}
