//! Engine-level error conditions, as seen by both sides of the handoff.
use std::any::Any;
use std::fmt;

/// An error surfaced by a resume or a yield.
///
/// [`Error::Raised`] carries a failure the producer body intentionally produced with
/// [`raise`](crate::yieldable::Yieldable::raise); it crosses the suspension boundary intact
/// and surfaces exactly once at the corresponding resume. The other variants are engine
/// conditions. Contract violations of the handoff protocol do not use this type at all:
/// they panic (see the crate-internal `protocol_violation!` macro), so calling code can
/// always tell "the coroutine reported a failure" apart from "the machinery was misused".
pub enum Error {
    /// The generator has already run to completion (or was destroyed).
    Finished,
    /// A side was resumed, but the peer left no result behind. Signals a broken
    /// resume-path implementation.
    NoResult,
    /// A failure raised by the coroutine body. Downcast it to recover the concrete type.
    Raised(Box<dyn Any + Send + 'static>),
}

impl Error {
    /// Recovers the concrete failure raised by the body, if this is [`Error::Raised`]
    /// of type `E`. Returns `self` unchanged otherwise.
    pub fn downcast_raised<E: Any>(self) -> Result<E, Self> {
        match self {
            Error::Raised(payload) => match payload.downcast::<E>() {
                Ok(failure) => Ok(*failure),
                Err(payload) => Err(Error::Raised(payload)),
            },
            other => Err(other),
        }
    }

    #[inline(always)]
    pub fn is_finished(&self) -> bool {
        matches!(self, Error::Finished)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Finished => f.write_str("Finished"),
            Error::NoResult => f.write_str("NoResult"),
            Error::Raised(_) => f.write_str("Raised(..)"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Finished => f.write_str("the generator has already finished"),
            Error::NoResult => f.write_str("no result available"),
            Error::Raised(_) => f.write_str("failure raised by the coroutine body"),
        }
    }
}

impl std::error::Error for Error {}
