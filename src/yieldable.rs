//! The producer-facing surface, visible only inside a generator body.
use std::any::Any;
use std::marker::PhantomData;
use std::panic::panic_any;

use crate::context::ResumptionKind;
use crate::error::Error;
use crate::handoff::{HandoffState, SuspendPoint};
use crate::macros::protocol_violation;
use crate::result::{Outcome, RaisedFailure, ResultBuilder, ResultCell};

/// Carried by the panic that unwinds a producer on forced termination. Never escapes the
/// coroutine stack: the entry shim catches it and hands control back with
/// [`ResumptionKind::End`].
pub(crate) struct ForcedUnwind;

/// The producer's handle for suspending: yield a value (or raise a failure) to the
/// consumer, and receive the consumer's next resume value back.
///
/// A reference to it is passed to the generator body; it has no owner-facing operations
/// and cannot be constructed outside the engine.
pub struct Yieldable<Push, Pull> {
    handoff: HandoffState,
    _marker: PhantomData<(fn(Push), fn() -> Pull)>,
}

impl<Push, Pull> Yieldable<Push, Pull> {
    pub(crate) fn new() -> Self {
        Self {
            handoff: HandoffState::new(),
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub(crate) fn handoff(&self) -> &HandoffState {
        &self.handoff
    }

    /// Yields `value` to the consumer and suspends until the next resume, whose value is
    /// returned.
    ///
    /// `Err(Error::NoResult)` means the consumer resumed without leaving a value behind.
    /// If the generator is being destroyed, this call does not return at all: the
    /// producer's stack unwinds and runs every pending drop.
    pub fn yield_value(&self, value: Push) -> Result<Pull, Error> {
        self.yield_with(move || value)
    }

    /// The emplace form of [`yield_value`](Yieldable::yield_value): the pushed value is
    /// built lazily, on the consumer's side of the transfer, only if the consumer asks
    /// for it.
    pub fn yield_with<F: FnOnce() -> Push>(&self, make: F) -> Result<Pull, Error> {
        let builder = ResultBuilder::new(move || Ok(make()));
        self.suspend_with(&builder)
    }

    /// Raises `failure` instead of yielding a value. The failure crosses the suspension
    /// boundary intact and surfaces at the consumer's resume call as
    /// [`Error::Raised`](crate::error::Error::Raised), exactly once. Like a yield, this
    /// suspends; the returned value is the consumer's next resume value.
    pub fn raise<E: Any + Send>(&self, failure: E) -> Result<Pull, Error> {
        self.raise_with(move || failure)
    }

    /// The emplace form of [`raise`](Yieldable::raise).
    pub fn raise_with<E: Any + Send, F: FnOnce() -> E>(&self, make: F) -> Result<Pull, Error> {
        let builder: ResultBuilder<Push, _> =
            ResultBuilder::new(move || Err(Box::new(make()) as RaisedFailure));
        self.suspend_with(&builder)
    }

    fn suspend_with<F: FnOnce() -> Outcome<Push>>(
        &self,
        builder: &ResultBuilder<Push, F>,
    ) -> Result<Pull, Error> {
        let point = SuspendPoint::new(builder.erased());
        match self
            .handoff
            .suspend_and_resume_other(&point, ResumptionKind::Continue)
        {
            ResumptionKind::Continue => self.take_pull(),
            ResumptionKind::End => panic_any(ForcedUnwind),
            ResumptionKind::Start => {
                protocol_violation!("a suspended producer received a start transfer")
            }
        }
    }

    /// Extracts the value the consumer left behind for this resumption.
    fn take_pull(&self) -> Result<Pull, Error> {
        let raw = self.handoff.peer_cell();
        if raw.is_null() {
            return Err(Error::NoResult);
        }

        let cell = raw as *mut ResultCell<Pull>;
        let handle = unsafe { (*cell).take() }.ok_or(Error::NoResult)?;
        unsafe { handle.invoke() }.map_err(Error::Raised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::Baton;
    use crate::utils::Ptr;
    use std::ptr::null_mut;

    // Links the two sides the way a real suspension leaves them: this side waiting on
    // the peer, the peer suspended at `point`.
    fn link(yieldable: &Yieldable<i32, i32>, peer: &HandoffState, point: &SuspendPoint) {
        yieldable.handoff().set_baton(Baton::Waiting(Ptr::from(
            peer as *const HandoffState as *mut HandoffState,
        )));
        peer.set_baton(Baton::Suspended(Ptr::from(
            point as *const SuspendPoint as *mut SuspendPoint,
        )));
    }

    #[test]
    fn test_resume_without_cell_reports_no_result() {
        let yieldable: Yieldable<i32, i32> = Yieldable::new();
        let peer = HandoffState::new();
        let point = SuspendPoint::new(null_mut());
        link(&yieldable, &peer, &point);

        assert!(matches!(yieldable.take_pull(), Err(Error::NoResult)));
    }

    #[test]
    fn test_resume_with_consumed_cell_reports_no_result() {
        let yieldable: Yieldable<i32, i32> = Yieldable::new();
        let peer = HandoffState::new();
        let builder = ResultBuilder::new(|| Ok(7i32));
        let point = SuspendPoint::new(builder.erased());
        link(&yieldable, &peer, &point);

        let handle = builder.cell().take().unwrap();
        assert_eq!(unsafe { handle.invoke() }.unwrap(), 7);
        assert!(matches!(yieldable.take_pull(), Err(Error::NoResult)));
    }
}
