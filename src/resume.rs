//! The `OnResume` collaborator: how an externally supplied resume argument becomes the
//! value the producer receives.
use std::marker::PhantomData;

/// Converts the argument of a [`resume_with`](crate::generator::Generator::resume_with)
/// call into the `Pull` value delivered into the producer's pending yield.
///
/// Pluggable so callers decide what resuming looks like: [`NoArg`] for generators resumed
/// without an argument, [`Identity`] for passing the argument through unchanged, or a
/// custom policy for anything richer.
pub trait OnResume {
    type Arg;
    type Pull;

    fn convert(&mut self, arg: Self::Arg) -> Self::Pull;
}

/// Resuming takes no argument; the producer pulls `()`.
pub struct NoArg;

impl OnResume for NoArg {
    type Arg = ();
    type Pull = ();

    #[inline(always)]
    fn convert(&mut self, _arg: ()) {}
}

/// The resume argument is delivered to the producer unmodified.
pub struct Identity<P>(PhantomData<fn(P) -> P>);

impl<P> Identity<P> {
    #[inline(always)]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<P> Default for Identity<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> OnResume for Identity<P> {
    type Arg = P;
    type Pull = P;

    #[inline(always)]
    fn convert(&mut self, arg: P) -> P {
        arg
    }
}
