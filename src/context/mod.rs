//! The raw execution-context switch: one saved point of execution on one stack, and a
//! single operation that transfers control to another one.
//!
//! This layer is trusted and unchecked by design, mirroring hardware context-switch
//! semantics. Transferring into a context that is not actually suspended is undefined;
//! every correctness guard lives in [`HandoffState`](crate::handoff::HandoffState) above.
pub(crate) mod sys;

use std::cell::Cell;
use std::ptr;

use crate::macros::protocol_violation;

/// Why a suspended side was resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ResumptionKind {
    /// A normal resumption: the other side yielded or resumed.
    Continue = 1,
    /// First entry into a fresh coroutine stack.
    Start,
    /// Forced termination: the receiver must unwind, not return to its caller.
    End,
}

impl ResumptionKind {
    /// Decodes the tag carried through the raw switch.
    ///
    /// # Panics
    ///
    /// If the tag is not one written by [`ExecutionContext::transfer`].
    #[inline(always)]
    pub(crate) fn from_raw(raw: usize) -> Self {
        match raw {
            1 => ResumptionKind::Continue,
            2 => ResumptionKind::Start,
            3 => ResumptionKind::End,
            _ => protocol_violation!("unknown resumption tag: {}", raw),
        }
    }
}

/// One saved point of execution on one stack.
///
/// Only the stack pointer is held here; the callee-saved registers and the return address
/// are spilled onto the owning stack by the switch routine itself. Exactly one owner may
/// be suspended in a context at a time, and a live context (one some other side still owes
/// a transfer back to) must never be moved.
pub struct ExecutionContext {
    sp: Cell<*mut usize>,
}

impl ExecutionContext {
    /// A context with no saved state yet. It becomes valid once a [`transfer`] away from
    /// it records the caller's state.
    ///
    /// [`transfer`]: ExecutionContext::transfer
    #[inline(always)]
    pub(crate) const fn empty() -> Self {
        Self {
            sp: Cell::new(ptr::null_mut()),
        }
    }

    /// A context whose first resumption enters `entry` on the fresh stack ending at `top`,
    /// with `data` as its argument.
    pub(crate) unsafe fn for_entry(top: *mut u8, entry: sys::EntryFn, data: *mut ()) -> Self {
        Self {
            sp: Cell::new(unsafe { sys::prepare_stack(top, entry, data) }),
        }
    }

    /// Saves the calling side's machine state into `self`, restores `other`'s previously
    /// saved state and resumes execution there, carrying `kind`.
    ///
    /// Does not return until some later transfer targets `self` again; the returned value
    /// is the kind that transfer carried.
    #[inline(always)]
    pub(crate) unsafe fn transfer(
        &self,
        other: &ExecutionContext,
        kind: ResumptionKind,
    ) -> ResumptionKind {
        let target = other.sp.get();
        let raw = unsafe { sys::stackgen_switch_stacks(self.sp.as_ptr(), target, kind as usize) };
        ResumptionKind::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        assert_eq!(
            ResumptionKind::from_raw(ResumptionKind::Continue as usize),
            ResumptionKind::Continue
        );
        assert_eq!(
            ResumptionKind::from_raw(ResumptionKind::Start as usize),
            ResumptionKind::Start
        );
        assert_eq!(
            ResumptionKind::from_raw(ResumptionKind::End as usize),
            ResumptionKind::End
        );
    }

    #[test]
    #[should_panic(expected = "coroutine protocol violated: unknown resumption tag")]
    fn test_unknown_tag_panics() {
        ResumptionKind::from_raw(9);
    }
}
