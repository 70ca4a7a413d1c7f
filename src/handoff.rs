//! The baton: who is suspended where, and who owes whom a resume.
//!
//! Exactly two [`HandoffState`]s exist per active producer/consumer pair, one per side,
//! and they reference each other through their baton values. At every instant exactly
//! one baton is [`Baton::Suspended`] (that side may be resumed) and the other is
//! [`Baton::Waiting`] (that side awaits a resume).
use crossbeam_utils::atomic::AtomicCell;

use crate::context::{ExecutionContext, ResumptionKind};
use crate::macros::protocol_violation;
use crate::utils::Ptr;

/// What one side's baton currently denotes.
///
/// The exchanges are atomic with respect to the stack transfer itself: a resumed party
/// immediately dereferences what the other side stored. They guard against protocol
/// misuse such as a double-resume, not true parallelism. Control never runs on both
/// stacks at once.
#[derive(Clone, Copy)]
pub(crate) enum Baton {
    /// Not linked yet.
    Empty,
    /// The execution context this side most recently suspended into, together with the
    /// result cell it published.
    Suspended(Ptr<SuspendPoint>),
    /// The party waiting to be resumed, to whom a freshly suspended context must be
    /// handed.
    Waiting(Ptr<HandoffState>),
}

/// One suspension: the saved context, and the erased [`ResultCell`] the suspender left
/// for its peer (null when nothing was published, e.g. the start handshake and the
/// forced-termination transfer).
///
/// [`ResultCell`]: crate::result::ResultCell
pub(crate) struct SuspendPoint {
    pub(crate) context: ExecutionContext,
    pub(crate) cell: *mut (),
}

impl SuspendPoint {
    #[inline(always)]
    pub(crate) fn new(cell: *mut ()) -> Self {
        Self {
            context: ExecutionContext::empty(),
            cell,
        }
    }
}

/// One side of the handoff.
pub struct HandoffState {
    baton: AtomicCell<Baton>,
}

impl HandoffState {
    pub(crate) fn new() -> Self {
        Self {
            baton: AtomicCell::new(Baton::Empty),
        }
    }

    pub(crate) fn set_baton(&self, baton: Baton) {
        self.baton.store(baton);
    }

    /// The double exchange at the heart of the handoff. Rotates "who is suspended where"
    /// and "who owes whom a resume" in one logical step, then performs the transfer.
    ///
    /// 1. Swap own baton to `Suspended(point)`; the previous value is the other party.
    /// 2. Swap the party's baton to `Waiting(self)`; the previous value is the context to
    ///    resume.
    /// 3. Transfer from `point` into that context, carrying `kind`.
    ///
    /// Returns the kind this side is eventually resumed with. After the call the two
    /// batons have cleanly swapped roles.
    ///
    /// # Panics
    ///
    /// If either baton is not in the role the protocol requires. Resuming a party that
    /// is not actually waiting must fail loudly, not corrupt state.
    pub(crate) fn suspend_and_resume_other(
        &self,
        point: &SuspendPoint,
        kind: ResumptionKind,
    ) -> ResumptionKind {
        let point_ptr = Ptr::from(point as *const SuspendPoint as *mut SuspendPoint);
        let party = match self.baton.swap(Baton::Suspended(point_ptr)) {
            Baton::Waiting(party) => party,
            _ => protocol_violation!("no party is waiting to be resumed"),
        };

        let self_ptr = Ptr::from(self as *const HandoffState as *mut HandoffState);
        let target = match unsafe { party.as_ref() }.baton.swap(Baton::Waiting(self_ptr)) {
            Baton::Suspended(target) => target,
            _ => protocol_violation!("the other side is not suspended"),
        };

        unsafe {
            point
                .context
                .transfer(&(*target.as_ptr()).context, kind)
        }
    }

    /// The cell the peer published with its most recent suspension. How a freshly resumed
    /// side finds the value (or failure) that was left for it. Reads the batons without
    /// disturbing them.
    ///
    /// # Panics
    ///
    /// If called while this side is not the running one.
    pub(crate) fn peer_cell(&self) -> *mut () {
        let party = match self.baton.load() {
            Baton::Waiting(party) => party,
            _ => protocol_violation!("looked for a result while not running"),
        };

        match unsafe { party.as_ref() }.baton.load() {
            Baton::Suspended(point) => unsafe { (*point.as_ptr()).cell },
            _ => protocol_violation!("the other side left no suspension behind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "coroutine protocol violated: no party is waiting")]
    fn test_suspend_without_waiting_party_panics() {
        let handoff = HandoffState::new();
        let point = SuspendPoint::new(std::ptr::null_mut());
        handoff.suspend_and_resume_other(&point, ResumptionKind::Continue);
    }

    #[test]
    #[should_panic(expected = "coroutine protocol violated: looked for a result")]
    fn test_peer_cell_without_link_panics() {
        let handoff = HandoffState::new();
        handoff.peer_cell();
    }

    #[test]
    #[should_panic(expected = "coroutine protocol violated: the other side left no suspension")]
    fn test_peer_cell_with_unsuspended_peer_panics() {
        let left = HandoffState::new();
        let right = HandoffState::new();
        left.set_baton(Baton::Waiting(Ptr::from(
            &right as *const HandoffState as *mut HandoffState,
        )));
        left.peer_cell();
    }
}
