//! The two backing strategies (§4.2/§4.3) and the tagged union that lets
//! `Arena` dispatch to whichever one a given instance was created with.

pub mod chunked;
pub mod reserve;

use std::cell::Cell;
use std::ptr::NonNull;

pub(crate) use chunked::Node;

/// State private to the Reserve/Commit backend.
pub(crate) struct ReserveState {
    /// Base of the single contiguous virtual-memory reservation.
    pub(crate) base: NonNull<u8>,
    /// How much of the reservation is currently committed, from `base`.
    pub(crate) commit_pos: Cell<u64>,
}

/// State private to the Chunked Heap backend.
pub(crate) struct ChunkedState {
    /// The node currently being bumped into; the tail of the chain.
    pub(crate) current: Cell<NonNull<Node>>,
}

/// The tagged union described in §3's data model (`backend_state`).
pub(crate) enum BackendState {
    Reserve(ReserveState),
    Chunked(ChunkedState),
}
