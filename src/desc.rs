//! The arena description struct (§6) and the default-resolution rules
//! used by `Arena::create` (§4.2 step 1 / §4.3).

use crate::error::{empty_callback, ErrorCallback};
use crate::platform::sys;

/// Which backing strategy an arena uses.
///
/// The original C implementation picks one of these for the whole program
/// at compile time (`SIA_FORCE_MALLOC`). This port makes it a per-arena,
/// runtime choice instead — see `DESIGN.md` for the reasoning — which
/// matches the data model's tagged union (§3) literally and lets a single
/// test binary exercise both backends side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// A single contiguous virtual-memory reservation, committed lazily in
    /// `block_size` steps.
    ReserveCommit,
    /// A chain of heap-allocated nodes, each a bump region.
    Chunked,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::ReserveCommit
    }
}

/// Description used to create an arena. `0` values request the defaults
/// documented on each field (§6).
#[derive(Debug, Clone, Copy)]
pub struct ArenaDesc {
    /// Upper bound on total addressable bytes. `0` is accepted but will
    /// fail every subsequent allocation (§6).
    pub desired_max_size: u64,
    /// Growth/commit granularity. `0` requests `ceil_to_page(max_size / 8)`.
    pub desired_block_size: u32,
    /// Default alignment applied to every push. `0` requests pointer width.
    pub align: u32,
    /// Invoked on every error raised by this arena. `None` requests a
    /// no-op sink.
    pub error_callback: Option<ErrorCallback>,
    /// Which backing strategy to use.
    pub backend: Backend,
}

impl ArenaDesc {
    /// A description requesting `max_size` bytes with all other fields
    /// defaulted.
    pub fn with_max_size(max_size: u64) -> Self {
        Self {
            desired_max_size: max_size,
            ..Self::default()
        }
    }
}

impl Default for ArenaDesc {
    fn default() -> Self {
        Self {
            desired_max_size: 0,
            desired_block_size: 0,
            align: 0,
            error_callback: None,
            backend: Backend::default(),
        }
    }
}

/// The resolved, defaulted layout parameters for a to-be-created arena.
pub(crate) struct ResolvedLayout {
    pub max_size: u64,
    pub block_size: u32,
    pub align: u32,
    pub error_callback: ErrorCallback,
}

pub(crate) fn resolve(desc: &ArenaDesc) -> ResolvedLayout {
    let page_size = sys::page_size() as u64;

    let max_size = align_up_u64(desc.desired_max_size, page_size);

    let desired_block_size = if desc.desired_block_size == 0 {
        align_up_u64(max_size / 8, page_size) as u32
    } else {
        align_up_u64(desc.desired_block_size as u64, page_size) as u32
    };
    let block_size = desired_block_size.next_power_of_two().max(page_size as u32);

    let align = if desc.align == 0 {
        std::mem::size_of::<usize>() as u32
    } else {
        desc.align
    };

    ResolvedLayout {
        max_size,
        block_size,
        align,
        error_callback: desc.error_callback.unwrap_or(empty_callback),
    }
}

pub(crate) fn align_up_u64(x: u64, b: u64) -> u64 {
    debug_assert!(b.is_power_of_two());
    (x + b - 1) & !(b - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up_u64(0, 4096), 0);
        assert_eq!(align_up_u64(1, 4096), 4096);
        assert_eq!(align_up_u64(4096, 4096), 4096);
        assert_eq!(align_up_u64(4097, 4096), 8192);
    }

    #[test]
    fn resolve_fills_in_defaults() {
        let desc = ArenaDesc::with_max_size(1024 * 1024);
        let resolved = resolve(&desc);
        assert!(resolved.max_size >= 1024 * 1024);
        assert!(resolved.block_size.is_power_of_two());
        assert_eq!(resolved.align as usize, std::mem::size_of::<usize>());
    }

    #[test]
    fn resolve_honors_explicit_block_and_align() {
        let desc = ArenaDesc {
            desired_max_size: 1024 * 1024,
            desired_block_size: 64 * 1024,
            align: 8,
            error_callback: None,
            backend: Backend::ReserveCommit,
        };
        let resolved = resolve(&desc);
        assert_eq!(resolved.block_size, 64 * 1024);
        assert_eq!(resolved.align, 8);
    }
}
