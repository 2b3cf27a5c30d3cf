//! `Arena`, the unified public surface (§4.4) that dispatches every
//! operation to whichever backend a given instance was created with.

use crate::backend::reserve::{self, MIN_POS};
use crate::backend::{chunked, BackendState};
use crate::desc::{align_up_u64, resolve, ArenaDesc, Backend, ResolvedLayout};
use crate::error::{self, ArenaError, ErrorCallback, ErrorKind};
use crate::platform::sys;
use std::cell::Cell;
use std::ptr;

pub use crate::backend::reserve::MIN_POS as MIN_ARENA_POS;

/// A region allocator: a monotonic position cursor over memory obtained
/// from one of two backing strategies (§3).
///
/// `Arena` is intentionally not `Send`/`Sync` — every field that changes
/// after construction (`pos`, the backend's commit/node-chain state) is a
/// bare `Cell`, not an atomic, because §5 requires exclusive per-thread
/// access rather than lock-free sharing. The auto-trait inference on
/// `Cell` already forbids sending a `&Arena` across threads; no explicit
/// opt-out is needed.
pub struct Arena {
    pos: Cell<u64>,
    size: u64,
    block_size: u32,
    align: u32,
    pub(crate) backend: BackendState,
    last_error: Cell<ArenaError>,
    error_callback: ErrorCallback,
}

impl Arena {
    /// §4.2/§4.3 `create`.
    pub fn create(desc: &ArenaDesc) -> Option<Arena> {
        let layout = resolve(desc);
        match desc.backend {
            Backend::ReserveCommit => Self::create_reserve(&layout),
            Backend::Chunked => Self::create_chunked(&layout),
        }
    }

    fn create_reserve(layout: &ResolvedLayout) -> Option<Arena> {
        match reserve::create(layout.max_size, layout.block_size) {
            reserve::CreateOutcome::Ok(state) => Some(Arena {
                pos: Cell::new(MIN_POS),
                size: layout.max_size,
                block_size: layout.block_size,
                align: layout.align,
                backend: BackendState::Reserve(state),
                last_error: Cell::new(ArenaError::NONE),
                error_callback: layout.error_callback,
            }),
            reserve::CreateOutcome::ReserveFailed => {
                error::raise_with(layout.error_callback, ErrorKind::InitFailed, "failed to reserve memory for arena");
                None
            }
            reserve::CreateOutcome::CommitFailed => {
                error::raise_with(
                    layout.error_callback,
                    ErrorKind::InitFailed,
                    "failed to commit initial memory for arena",
                );
                None
            }
        }
    }

    fn create_chunked(layout: &ResolvedLayout) -> Option<Arena> {
        match chunked::create(layout.block_size) {
            chunked::CreateOutcome::Ok(state) => Some(Arena {
                pos: Cell::new(0),
                size: layout.max_size,
                block_size: layout.block_size,
                align: layout.align,
                backend: BackendState::Chunked(state),
                last_error: Cell::new(ArenaError::NONE),
                error_callback: layout.error_callback,
            }),
            chunked::CreateOutcome::MallocFailed => {
                error::raise_with(
                    layout.error_callback,
                    ErrorKind::InitFailed,
                    "failed to allocate the initial chunk for arena",
                );
                None
            }
        }
    }

    /// §4.2/§4.3 `destroy`. Equivalent to dropping the arena; spelled out
    /// as a method so callers reading call sites see an explicit lifetime
    /// boundary, matching the rest of the public surface.
    pub fn destroy(self) {}

    fn raise(&self, kind: ErrorKind, message: &'static str) -> ArenaError {
        let err = ArenaError::new(kind, message);
        self.last_error.set(err);
        error::mirror_global(err);
        (self.error_callback)(err);
        err
    }

    /// §4.2/§4.3 `push`.
    pub fn push(&self, size: u64) -> *mut u8 {
        let pos = self.pos.get();
        match &self.backend {
            BackendState::Reserve(r) => match reserve::push(r, pos, size, self.align, self.block_size, self.size) {
                reserve::PushOutcome::Ok { ptr, new_pos } => {
                    self.pos.set(new_pos);
                    ptr
                }
                reserve::PushOutcome::OutOfMemory => {
                    self.raise(ErrorKind::OutOfMemory, "arena ran out of memory");
                    ptr::null_mut()
                }
                reserve::PushOutcome::CommitFailed => {
                    self.raise(ErrorKind::CommitFailed, "failed to commit memory for push");
                    ptr::null_mut()
                }
            },
            BackendState::Chunked(c) => match chunked::push(c, pos, size, self.align, self.block_size, self.size) {
                chunked::PushOutcome::Ok { ptr, new_pos } => {
                    self.pos.set(new_pos);
                    ptr
                }
                chunked::PushOutcome::OutOfMemory => {
                    self.raise(ErrorKind::OutOfMemory, "arena ran out of memory");
                    ptr::null_mut()
                }
                chunked::PushOutcome::MallocFailed => {
                    self.raise(ErrorKind::MallocFailed, "failed to allocate a new chunk");
                    ptr::null_mut()
                }
            },
        }
    }

    /// §4.4 `push_zero`.
    pub fn push_zero(&self, size: u64) -> *mut u8 {
        let p = self.push(size);
        if !p.is_null() {
            unsafe { ptr::write_bytes(p, 0, size as usize) };
        }
        p
    }

    /// Convenience variant pushing space for a single `T` (§6's "push a
    /// single struct").
    pub fn push_struct<T>(&self) -> *mut T {
        self.push(std::mem::size_of::<T>() as u64) as *mut T
    }

    /// Zero-initializing variant of [`push_struct`](Self::push_struct).
    pub fn push_zero_struct<T>(&self) -> *mut T {
        self.push_zero(std::mem::size_of::<T>() as u64) as *mut T
    }

    /// Convenience variant pushing space for `len` contiguous `T`s.
    pub fn push_array<T>(&self, len: usize) -> *mut T {
        self.push((std::mem::size_of::<T>() * len) as u64) as *mut T
    }

    /// Zero-initializing variant of [`push_array`](Self::push_array).
    pub fn push_zero_array<T>(&self, len: usize) -> *mut T {
        self.push_zero((std::mem::size_of::<T>() * len) as u64) as *mut T
    }

    /// §4.2/§4.3 `pop`.
    pub fn pop(&self, n: u64) {
        let pos = self.pos.get();
        match &self.backend {
            BackendState::Reserve(r) => match reserve::pop(r, pos, n, self.block_size, self.size) {
                reserve::PopOutcome::Ok { new_pos } => self.pos.set(new_pos),
                reserve::PopOutcome::CannotPopMore => {
                    self.raise(ErrorKind::CannotPopMore, "cannot pop more bytes than are live");
                }
            },
            BackendState::Chunked(c) => match chunked::pop(c, pos, n) {
                chunked::PopOutcome::Ok { new_pos } => self.pos.set(new_pos),
                chunked::PopOutcome::CannotPopMore => {
                    self.raise(ErrorKind::CannotPopMore, "cannot pop more bytes than are live");
                }
            },
        }
    }

    /// §4.4 `pop_to`. A `target` at or beyond the current position is a
    /// no-op rather than an underflow — callers releasing temps in the
    /// wrong order get a silently-reduced rollback, not a panic.
    pub fn pop_to(&self, target: u64) {
        let pos = self.pos.get();
        if target < pos {
            self.pop(pos - target);
        }
    }

    /// §4.4 `reset`.
    pub fn reset(&self) {
        let floor = match &self.backend {
            BackendState::Reserve(_) => MIN_POS,
            BackendState::Chunked(_) => 0,
        };
        self.pop_to(floor);
    }

    /// §4.4 `realloc`.
    pub fn realloc(&self, ptr: *mut u8, old_size: u64, new_size: u64) -> *mut u8 {
        if ptr.is_null() {
            return self.push(new_size);
        }
        if new_size == 0 {
            self.raise(ErrorKind::InvalidPtr, "realloc requested a new_size of zero");
            return ptr::null_mut();
        }
        if !self.is_valid_ptr(ptr, old_size) {
            self.raise(ErrorKind::InvalidPtr, "realloc pointer failed validation");
            return ptr::null_mut();
        }
        if new_size <= old_size {
            return ptr;
        }

        if self.is_last_allocation(ptr, old_size) {
            match self.try_grow_in_place(old_size, new_size) {
                Some(true) => return ptr,
                Some(false) => return ptr::null_mut(),
                None => {}
            }
        }

        let fresh = self.push(new_size);
        if fresh.is_null() {
            self.raise(ErrorKind::ReallocFailed, "failed to allocate fresh memory for realloc");
            return ptr::null_mut();
        }
        unsafe { ptr::copy_nonoverlapping(ptr, fresh, old_size as usize) };
        fresh
    }

    /// Attempts to extend the last live allocation in place by
    /// `new_size - old_size` bytes. `None` means there wasn't room (the
    /// caller should fall back to a fresh allocation); `Some(false)` means
    /// there was room but the backend failed to commit it (an error has
    /// already been raised); `Some(true)` is success.
    fn try_grow_in_place(&self, old_size: u64, new_size: u64) -> Option<bool> {
        let additional = new_size - old_size;
        match &self.backend {
            BackendState::Reserve(r) => {
                let pos = self.pos.get();
                let new_pos = pos + additional;
                if new_pos > self.size {
                    return None;
                }
                let commit_pos = r.commit_pos.get();
                if new_pos > commit_pos {
                    let wanted = align_up_u64(new_pos, self.block_size as u64).min(self.size);
                    let commit_ptr = unsafe { r.base.as_ptr().add(commit_pos as usize) };
                    if sys::commit(commit_ptr, (wanted - commit_pos) as usize).is_err() {
                        self.raise(ErrorKind::CommitFailed, "failed to commit memory for realloc");
                        return Some(false);
                    }
                    r.commit_pos.set(wanted);
                }
                self.pos.set(new_pos);
                Some(true)
            }
            BackendState::Chunked(c) => {
                let node = unsafe { c.current.get().as_ref() };
                let space_available = node.size - node.pos;
                if additional > space_available {
                    return None;
                }
                self.pos.set(self.pos.get() + additional);
                unsafe { (*c.current.get().as_ptr()).pos += additional };
                Some(true)
            }
        }
    }

    fn is_valid_ptr(&self, ptr: *mut u8, size: u64) -> bool {
        match &self.backend {
            BackendState::Reserve(r) => reserve::is_valid_ptr(r, self.pos.get(), ptr, size),
            BackendState::Chunked(c) => chunked::is_valid_ptr(c, ptr, size),
        }
    }

    fn is_last_allocation(&self, ptr: *mut u8, old_size: u64) -> bool {
        match &self.backend {
            BackendState::Reserve(r) => reserve::is_last_allocation(r, self.pos.get(), ptr, old_size),
            BackendState::Chunked(c) => chunked::is_last_allocation(c, ptr, old_size),
        }
    }

    /// §4.4 getter.
    pub fn pos(&self) -> u64 {
        self.pos.get()
    }

    /// §4.4 getter.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// §4.4 getter.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// §4.4 getter.
    pub fn align(&self) -> u32 {
        self.align
    }

    /// §4.4 `get_error` for an arena the caller already has a reference
    /// to. See the free function [`get_error`] for the null-arena case.
    pub fn get_error(&self) -> ArenaError {
        self.last_error.replace(ArenaError::NONE)
    }

    pub(crate) fn error_callback(&self) -> ErrorCallback {
        self.error_callback
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        match &self.backend {
            BackendState::Reserve(r) => unsafe { reserve::destroy(r, self.size) },
            BackendState::Chunked(c) => unsafe { chunked::destroy(c) },
        }
    }
}

/// §4.4 `get_error`, free-function form: returns the thread-global last
/// error when `arena` is `None`.
pub fn get_error(arena: Option<&Arena>) -> ArenaError {
    match arena {
        Some(a) => a.get_error(),
        None => error::take_global(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::ArenaDesc;

    fn reserve_desc() -> ArenaDesc {
        ArenaDesc {
            desired_max_size: 1024 * 1024,
            desired_block_size: 64 * 1024,
            align: 8,
            error_callback: None,
            backend: Backend::ReserveCommit,
        }
    }

    fn chunked_desc() -> ArenaDesc {
        ArenaDesc {
            backend: Backend::Chunked,
            ..reserve_desc()
        }
    }

    #[test]
    fn reserve_push_pop_round_trips() {
        let arena = Arena::create(&reserve_desc()).expect("create failed");
        let start = arena.pos();
        let p = arena.push(100);
        assert!(!p.is_null());
        assert_eq!(p as usize % 8, 0);
        assert_eq!(arena.pos(), start + 100);
        arena.pop(100);
        assert_eq!(arena.pos(), start);
    }

    #[test]
    fn chunked_push_pop_round_trips() {
        let arena = Arena::create(&chunked_desc()).expect("create failed");
        let start = arena.pos();
        let p = arena.push(100);
        assert!(!p.is_null());
        arena.pop(100);
        assert_eq!(arena.pos(), start);
    }

    #[test]
    fn push_zero_zeroes_memory() {
        let arena = Arena::create(&reserve_desc()).expect("create failed");
        let p = arena.push(64);
        unsafe { ptr::write_bytes(p, 0xAB, 64) };
        arena.pop(64);
        let z = arena.push_zero(64);
        let bytes = unsafe { std::slice::from_raw_parts(z, 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn pop_past_floor_raises_and_does_not_mutate() {
        let arena = Arena::create(&reserve_desc()).expect("create failed");
        let pos = arena.pos();
        arena.pop(pos - MIN_POS + 1);
        assert_eq!(arena.pos(), pos);
        let err = arena.get_error();
        assert_eq!(err.kind, ErrorKind::CannotPopMore);
        assert!(arena.get_error().is_none());
    }

    #[test]
    fn reset_returns_to_floor() {
        let arena = Arena::create(&reserve_desc()).expect("create failed");
        let floor = arena.pos();
        arena.push(1000);
        arena.reset();
        assert_eq!(arena.pos(), floor);
    }

    #[test]
    fn realloc_grow_in_place_returns_same_pointer() {
        let arena = Arena::create(&reserve_desc()).expect("create failed");
        let p = arena.push(100);
        unsafe { ptr::write_bytes(p, 7, 100) };
        let grown = arena.realloc(p, 100, 200);
        assert_eq!(grown, p);
        let bytes = unsafe { std::slice::from_raw_parts(grown, 100) };
        assert!(bytes.iter().all(|&b| b == 7));
    }

    #[test]
    fn realloc_grow_with_copy_preserves_other_allocation() {
        let arena = Arena::create(&reserve_desc()).expect("create failed");
        let a = arena.push(100);
        unsafe { ptr::write_bytes(a, 1, 100) };
        let b = arena.push(100);
        unsafe { ptr::write_bytes(b, 2, 100) };

        let grown = arena.realloc(a, 100, 200);
        assert_ne!(grown, a);
        let a_bytes = unsafe { std::slice::from_raw_parts(grown, 100) };
        assert!(a_bytes.iter().all(|&x| x == 1));
        let b_bytes = unsafe { std::slice::from_raw_parts(b, 100) };
        assert!(b_bytes.iter().all(|&x| x == 2));
    }

    #[test]
    fn realloc_same_size_returns_same_pointer() {
        let arena = Arena::create(&reserve_desc()).expect("create failed");
        let p = arena.push(100);
        assert_eq!(arena.realloc(p, 100, 100), p);
    }

    #[test]
    fn push_beyond_capacity_fails_with_out_of_memory() {
        let desc = ArenaDesc {
            desired_max_size: 64 * 1024,
            desired_block_size: 64 * 1024,
            align: 8,
            error_callback: None,
            backend: Backend::ReserveCommit,
        };
        let arena = Arena::create(&desc).expect("create failed");
        let capacity = arena.size() - arena.pos();
        assert!(!arena.push(capacity).is_null());
        arena.pop(capacity);
        assert!(arena.push(arena.size() + 1).is_null());
        assert_eq!(arena.get_error().kind, ErrorKind::OutOfMemory);
    }
}
