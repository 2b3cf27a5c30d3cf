//! Error channel: per-arena and thread-global last-error slots, callbacks,
//! and the default diagnostic sink.
//!
//! Every operation that can fail is non-throwing: it records an [`ArenaError`]
//! here and returns `null`/early instead of panicking or returning a `Result`.
//! This mirrors the C original, where errors are diagnostic rather than
//! recoverable.

use std::cell::Cell;
use std::fmt;

/// The kind of failure that produced an [`ArenaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorKind {
    /// No error has occurred (the default, cleared state).
    #[default]
    None,
    /// Arena creation failed (reservation or initial commit).
    InitFailed,
    /// A heap allocation for the chunked backend failed.
    MallocFailed,
    /// A virtual-memory commit failed.
    CommitFailed,
    /// A push exceeded the arena's `size`.
    OutOfMemory,
    /// A pop attempted to remove more bytes than are live.
    CannotPopMore,
    /// Realloc could neither grow in place nor allocate fresh memory.
    ReallocFailed,
    /// A pointer failed validation, or an argument was structurally invalid.
    InvalidPtr,
    /// `merge` failed partway through and the destination was torn down.
    MergeFailed,
}

/// A diagnostic error value: a [`ErrorKind`] plus a static description.
///
/// `ArenaError` is a plain, `Copy` value — it carries no allocation and is
/// cheap to store in a thread-local slot. There is no "ok" variant; the
/// absence of an error is `ErrorKind::None` with an empty message, matching
/// [`ArenaError::NONE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ArenaError {
    pub kind: ErrorKind,
    pub message: &'static str,
}

impl ArenaError {
    /// The cleared / no-error sentinel value.
    pub const NONE: ArenaError = ArenaError {
        kind: ErrorKind::None,
        message: "",
    };

    #[inline]
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.kind == ErrorKind::None
    }
}

impl Default for ArenaError {
    fn default() -> Self {
        Self::NONE
    }
}

/// The error callback signature. Callbacks must not panic; a panicking
/// callback would unwind through arena internals left in a valid-but-partial
/// state.
pub type ErrorCallback = fn(ArenaError);

/// The no-op callback used when a description supplies none.
pub fn empty_callback(_error: ArenaError) {}

/// The default diagnostic sink, used for arena-less errors when no global
/// callback override has been installed. Routed through the `log` facade
/// rather than printed directly, so a host binary's logger (or none at all)
/// decides where it ends up.
pub fn default_diagnostic_sink(error: ArenaError) {
    log::error!("arena error: {error}");
}

thread_local! {
    static LAST_ERROR: Cell<ArenaError> = const { Cell::new(ArenaError::NONE) };
    static GLOBAL_CALLBACK: Cell<Option<ErrorCallback>> = const { Cell::new(None) };
}

/// Set a per-thread override invoked for every arena-less error (in addition
/// to whatever merge derives as the destination arena's own callback).
pub fn set_global_callback(callback: Option<ErrorCallback>) {
    GLOBAL_CALLBACK.with(|cell| cell.set(callback));
}

/// The currently installed per-thread global callback override, if any.
pub fn global_callback() -> Option<ErrorCallback> {
    GLOBAL_CALLBACK.with(|cell| cell.get())
}

/// Record an error that is not attached to any specific arena (used by
/// `merge`'s argument validation and other arena-less entry points).
///
/// Invokes the global callback override if set, otherwise the default
/// diagnostic sink.
pub fn raise_global(kind: ErrorKind, message: &'static str) -> ArenaError {
    let error = ArenaError::new(kind, message);
    LAST_ERROR.with(|cell| cell.set(error));

    match global_callback() {
        Some(callback) => callback(error),
        None => default_diagnostic_sink(error),
    }

    error
}

/// Read and clear the thread-global last-error slot.
pub fn take_global() -> ArenaError {
    LAST_ERROR.with(|cell| cell.replace(ArenaError::NONE))
}

/// Record an error on behalf of a not-yet-constructed arena (used by
/// `Arena::create`'s failure paths, where no arena exists to own a
/// per-arena slot yet). Mirrors the thread-global slot and invokes the
/// supplied callback — the description's own callback, not the global
/// override, since this error belongs to the arena that would have been.
pub fn raise_with(callback: ErrorCallback, kind: ErrorKind, message: &'static str) -> ArenaError {
    let error = ArenaError::new(kind, message);
    LAST_ERROR.with(|cell| cell.set(error));
    callback(error);
    error
}

/// Set the thread-global slot without invoking any callback. Used when an
/// arena-owning operation raises an error: the per-arena slot and the
/// arena's own callback are the primary channel, but the thread-global slot
/// must still reflect the most recent error everywhere in the program.
pub fn mirror_global(error: ArenaError) {
    LAST_ERROR.with(|cell| cell.set(error));
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
