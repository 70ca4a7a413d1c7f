//! A stackful, cooperative generator engine.
//!
//! A [`Generator`](generator::Generator) runs a producer body on its own private stack.
//! The body suspends mid-execution through a [`Yieldable`](yieldable::Yieldable),
//! handing a value (or a raised failure) and control back to the consumer, and is later
//! resumed exactly where it left off, receiving a value back.
//!
//! Control alternates between exactly two stacks. Nothing here is preemptive and nothing
//! runs in parallel: "blocking" is simply "control has not transferred back yet".
//!
//! # Example
//!
//! ```ignore
//! use stackgen::{Generator, Identity, Yieldable};
//!
//! let mut gen = Generator::with_on_resume(Identity::<i32>::new(), |y: &Yieldable<i32, i32>| {
//!     let x = y.yield_value(1).unwrap();
//!     y.yield_value(x + 1).unwrap();
//! }).unwrap();
//!
//! assert_eq!(gen.resume_with(0).unwrap(), 1);
//! assert_eq!(gen.resume_with(41).unwrap(), 42);
//! ```

pub mod context;
pub mod error;
pub mod generator;
pub mod handoff;
mod macros;
pub mod result;
pub mod resume;
pub mod stack;
pub mod utils;
pub mod yieldable;

pub use context::ResumptionKind;
pub use error::Error;
pub use generator::{Generator, RunState};
pub use resume::{Identity, NoArg, OnResume};
pub use stack::{Stack, DEFAULT_STACK_SIZE};
pub use yieldable::Yieldable;
