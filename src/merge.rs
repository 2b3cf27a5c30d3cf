//! Arena concatenation (§4.7): build a fresh arena holding the
//! concatenated live bytes of a set of source arenas.

use crate::arena::Arena;
use crate::backend::reserve::MIN_POS;
use crate::backend::BackendState;
use crate::desc::{ArenaDesc, Backend};
use crate::error::{self, ErrorKind};
use std::ptr;

/// §4.7 `merge`. The destination is always a Reserve/Commit-backed arena
/// regardless of the sources' backends, since the result is a single flat
/// copy with no further node-chain structure to preserve.
pub fn merge(arenas: &[&Arena]) -> Option<Arena> {
    if arenas.is_empty() {
        error::raise_global(ErrorKind::InvalidPtr, "merge requires at least one source arena");
        return None;
    }

    let total_used: u64 = arenas.iter().map(|a| used_bytes(a)).sum();
    let block_size = arenas.iter().map(|a| a.block_size()).max().unwrap();
    let align = arenas.iter().map(|a| a.align()).max().unwrap();

    let callback = match error::global_callback() {
        Some(cb) => cb,
        None => {
            let first = arenas[0].error_callback();
            if first == error::empty_callback {
                error::default_diagnostic_sink
            } else {
                first
            }
        }
    };

    let desc = ArenaDesc {
        desired_max_size: total_used,
        desired_block_size: block_size,
        align,
        error_callback: Some(callback),
        backend: Backend::ReserveCommit,
    };

    let dest = Arena::create(&desc)?;

    let mut copied = 0u64;
    for arena in arenas {
        if !copy_into(&dest, arena, &mut copied) {
            error::raise_global(ErrorKind::MergeFailed, "merge failed while copying a source arena");
            dest.destroy();
            return None;
        }
    }

    if copied != total_used {
        error::raise_global(
            ErrorKind::MergeFailed,
            "merge copied a different number of bytes than expected",
        );
        dest.destroy();
        return None;
    }

    Some(dest)
}

fn used_bytes(arena: &Arena) -> u64 {
    match &arena.backend {
        BackendState::Reserve(_) => arena.pos() - MIN_POS,
        BackendState::Chunked(_) => arena.pos(),
    }
}

/// Copies one source arena's live bytes into `dest` via push-and-copy,
/// accumulating the running total in `copied`. Returns `false` on the
/// first allocation failure, leaving `copied` at whatever was copied so
/// far (the caller treats any failure here as fatal to the whole merge).
fn copy_into(dest: &Arena, source: &Arena, copied: &mut u64) -> bool {
    match &source.backend {
        BackendState::Reserve(r) => {
            let used = source.pos() - MIN_POS;
            if used == 0 {
                return true;
            }
            let src_ptr = unsafe { r.base.as_ptr().add(MIN_POS as usize) };
            let dst_ptr = dest.push(used);
            if dst_ptr.is_null() {
                return false;
            }
            unsafe { ptr::copy_nonoverlapping(src_ptr, dst_ptr, used as usize) };
            *copied += used;
            true
        }
        // Walks current -> first, i.e. in reverse of allocation order
        // within this source (§9 open question: documented, not "fixed").
        BackendState::Chunked(c) => {
            let mut node = Some(c.current.get());
            while let Some(n) = node {
                let n_ref = unsafe { n.as_ref() };
                let len = n_ref.pos;
                if len > 0 {
                    let dst_ptr = dest.push(len);
                    if dst_ptr.is_null() {
                        return false;
                    }
                    unsafe { ptr::copy_nonoverlapping(n_ref.data.as_ptr(), dst_ptr, len as usize) };
                    *copied += len;
                }
                node = n_ref.prev;
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::ArenaDesc;

    fn reserve_arena() -> Arena {
        Arena::create(&ArenaDesc::with_max_size(1024 * 1024)).unwrap()
    }

    #[test]
    fn merge_of_single_arena_preserves_its_bytes() {
        let a = reserve_arena();
        let p = a.push(5);
        unsafe { ptr::copy_nonoverlapping(b"HELLO".as_ptr(), p, 5) };

        let merged = merge(&[&a]).expect("merge failed");
        assert_eq!(merged.pos() - MIN_POS, 5);
        let base = match &merged.backend {
            BackendState::Reserve(r) => r.base.as_ptr(),
            _ => unreachable!(),
        };
        let live = unsafe { std::slice::from_raw_parts(base.add(MIN_POS as usize), 5) };
        assert_eq!(live, b"HELLO");
    }

    #[test]
    fn merge_concatenates_in_source_order() {
        let x = reserve_arena();
        let px = x.push(5);
        unsafe { ptr::copy_nonoverlapping(b"HELLO".as_ptr(), px, 5) };

        let y = reserve_arena();
        let py = y.push(5);
        unsafe { ptr::copy_nonoverlapping(b"WORLD".as_ptr(), py, 5) };

        let merged = merge(&[&x, &y]).expect("merge failed");
        let base = match &merged.backend {
            BackendState::Reserve(r) => r.base.as_ptr(),
            _ => unreachable!(),
        };
        let live = unsafe { std::slice::from_raw_parts(base.add(MIN_POS as usize), 10) };
        assert_eq!(live, b"HELLOWORLD");
    }

    #[test]
    fn merge_rejects_empty_input() {
        assert!(merge(&[]).is_none());
    }
}
