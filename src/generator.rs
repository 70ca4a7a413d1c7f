//! The consumer-facing surface: [`Generator`] owns the private stack, the producer's
//! entry point and the [`OnResume`] policy, and drives the body with
//! [`start`](Generator::start) / [`resume`](Generator::resume) /
//! [`destroy`](Generator::destroy).
use std::any::Any;
use std::cell::{Cell, UnsafeCell};
use std::io;
use std::marker::PhantomData;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::ptr::null_mut;

use crate::context::{sys, ExecutionContext, ResumptionKind};
use crate::error::Error;
use crate::handoff::{Baton, HandoffState, SuspendPoint};
use crate::macros::protocol_violation;
use crate::result::{ResultBuilder, ResultCell};
use crate::resume::{NoArg, OnResume};
use crate::stack::{Stack, DEFAULT_STACK_SIZE};
use crate::utils::Ptr;
use crate::yieldable::{ForcedUnwind, Yieldable};

/// Where a generator is in its life.
///
/// `Suspended → Finished` is reached either by the body returning or by forced
/// termination. `Finished` is terminal: any resume in it fails cleanly with
/// [`Error::Finished`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Suspended,
    Finished,
}

/// Shared state with a stable address: both handoff sides, the producer's entry
/// suspension, the boxed body and any panic the body died with. Heap-allocated so the
/// [`Generator`] handle itself stays movable while either stack points into the frame.
struct EntryFrame<T, P> {
    consumer: HandoffState,
    yieldable: Yieldable<T, P>,
    initial: UnsafeCell<SuspendPoint>,
    body: UnsafeCell<Option<Box<dyn FnOnce(&Yieldable<T, P>)>>>,
    panic: Cell<Option<Box<dyn Any + Send>>>,
}

/// First Rust code on the private stack.
///
/// On `Start` it acknowledges by suspending straight back, so the body begins on the
/// first real resume. A panic escaping the body is caught here, because unwinding
/// through the raw switch is undefined, and is carried to the consumer through the
/// frame. On `End` at entry the body never ran and is dropped with the frame.
extern "C" fn entry_shim<T, P>(data: *mut (), raw_kind: usize) -> ! {
    let frame = unsafe { &*(data as *const EntryFrame<T, P>) };

    match ResumptionKind::from_raw(raw_kind) {
        ResumptionKind::Start => {
            let ack = SuspendPoint::new(null_mut());
            let resumed = frame
                .yieldable
                .handoff()
                .suspend_and_resume_other(&ack, ResumptionKind::Continue);

            match resumed {
                ResumptionKind::Continue => {
                    let body = unsafe { (*frame.body.get()).take() };
                    if let Some(body) = body {
                        match catch_unwind(AssertUnwindSafe(|| body(&frame.yieldable))) {
                            Ok(()) => {}
                            Err(payload) if payload.is::<ForcedUnwind>() => {}
                            Err(payload) => frame.panic.set(Some(payload)),
                        }
                    }
                }
                // The generator was destroyed before the first real resume.
                ResumptionKind::End => {}
                ResumptionKind::Start => {
                    protocol_violation!("an acknowledged coroutine received a start transfer")
                }
            }
        }
        ResumptionKind::End => {}
        ResumptionKind::Continue => {
            protocol_violation!("a fresh coroutine stack received a continue transfer")
        }
    }

    // Hand control back for good; the consumer observes End and marks the generator
    // finished.
    let last = SuspendPoint::new(null_mut());
    frame
        .yieldable
        .handoff()
        .suspend_and_resume_other(&last, ResumptionKind::End);
    protocol_violation!("a finished coroutine was resumed");
}

/// A stackful generator: a producer body running on its own private stack, driven by this
/// consumer-side handle.
///
/// `T` is the type the body pushes with each yield; `R` decides what the body receives
/// back from each resume. `'a` bounds whatever the body borrows.
pub struct Generator<'a, T, R: OnResume = NoArg> {
    stack: Stack,
    frame: Ptr<EntryFrame<T, R::Pull>>,
    on_resume: R,
    state: Cell<RunState>,
    _marker: PhantomData<&'a ()>,
}

impl<'a, T> Generator<'a, T, NoArg> {
    /// Creates a generator resumed without an argument; the body pulls `()` from each
    /// yield.
    pub fn new<F>(body: F) -> io::Result<Self>
    where
        F: FnOnce(&Yieldable<T, ()>) + 'a,
    {
        Self::with_on_resume(NoArg, body)
    }
}

impl<'a, T, R: OnResume> Generator<'a, T, R> {
    /// Creates a generator with an explicit [`OnResume`] policy and the default stack
    /// size.
    pub fn with_on_resume<F>(on_resume: R, body: F) -> io::Result<Self>
    where
        F: FnOnce(&Yieldable<T, R::Pull>) + 'a,
    {
        Self::with_stack_size(DEFAULT_STACK_SIZE, on_resume, body)
    }

    /// Creates a generator with a private stack of at least `size` usable bytes.
    pub fn with_stack_size<F>(size: usize, on_resume: R, body: F) -> io::Result<Self>
    where
        F: FnOnce(&Yieldable<T, R::Pull>) + 'a,
    {
        let stack = Stack::new(size)?;

        let body: Box<dyn FnOnce(&Yieldable<T, R::Pull>) + 'a> = Box::new(body);
        // The frame outlives 'a borrows only inside Drop, which unwinds the producer
        // before anything the body borrowed is released.
        let body: Box<dyn FnOnce(&Yieldable<T, R::Pull>) + 'static> =
            unsafe { std::mem::transmute(body) };

        let frame = Ptr::new(EntryFrame {
            consumer: HandoffState::new(),
            yieldable: Yieldable::new(),
            initial: UnsafeCell::new(SuspendPoint::new(null_mut())),
            body: UnsafeCell::new(Some(body)),
            panic: Cell::new(None),
        });

        let frame_ref = unsafe { frame.as_ref() };
        unsafe {
            (*frame_ref.initial.get()).context = ExecutionContext::for_entry(
                stack.top(),
                entry_shim::<T, R::Pull> as sys::EntryFn,
                frame.as_ptr() as *mut (),
            );
        }

        // The producer starts out suspended at its entry; the consumer starts out
        // running, so its baton already points at the party it will resume.
        frame_ref
            .yieldable
            .handoff()
            .set_baton(Baton::Suspended(Ptr::from(frame_ref.initial.get())));
        frame_ref.consumer.set_baton(Baton::Waiting(Ptr::from(
            frame_ref.yieldable.handoff() as *const HandoffState as *mut HandoffState,
        )));

        Ok(Self {
            stack,
            frame,
            on_resume,
            state: Cell::new(RunState::NotStarted),
            _marker: PhantomData,
        })
    }

    /// First transfer into the producer's entry point. No-op when already started,
    /// `Err(Error::Finished)` when finished. Invoked implicitly by the first resume when
    /// omitted.
    ///
    /// # Panics
    ///
    /// On a reentrant call while the generator is mid-resume.
    pub fn start(&mut self) -> Result<(), Error> {
        match self.state.get() {
            RunState::Finished => return Err(Error::Finished),
            RunState::Running => protocol_violation!("the generator is already running"),
            RunState::Suspended => return Ok(()),
            RunState::NotStarted => {}
        }

        self.state.set(RunState::Running);
        let frame = unsafe { self.frame.as_ref() };
        let point = SuspendPoint::new(null_mut());
        match frame
            .consumer
            .suspend_and_resume_other(&point, ResumptionKind::Start)
        {
            ResumptionKind::Continue => {
                self.state.set(RunState::Suspended);
                Ok(())
            }
            kind => protocol_violation!("unexpected resumption during start: {:?}", kind),
        }
    }

    /// Feeds `arg` through the [`OnResume`] policy, transfers into the producer, and
    /// returns what it yields.
    ///
    /// `Err(Error::Raised(..))` carries a failure the body raised in place of a value;
    /// `Err(Error::Finished)` means the body has returned (now or earlier). A panic that
    /// killed the body resurfaces here, on the consumer's stack.
    ///
    /// The argument of the very first resume is converted but not observable by the body:
    /// its first pull point is its first yield.
    ///
    /// # Panics
    ///
    /// On a reentrant call while the generator is mid-resume, including from inside the
    /// [`OnResume`] policy itself.
    pub fn resume_with(&mut self, arg: R::Arg) -> Result<T, Error> {
        match self.state.get() {
            RunState::Finished => return Err(Error::Finished),
            RunState::Running => protocol_violation!("the generator is already running"),
            RunState::NotStarted => self.start()?,
            RunState::Suspended => {}
        }

        self.state.set(RunState::Running);
        let frame = unsafe { self.frame.as_ref() };

        let pull = self.on_resume.convert(arg);
        let builder = ResultBuilder::new(move || Ok(pull));
        let point = SuspendPoint::new(builder.erased());
        match frame
            .consumer
            .suspend_and_resume_other(&point, ResumptionKind::Continue)
        {
            ResumptionKind::Continue => {
                self.state.set(RunState::Suspended);
                self.take_yielded(frame)
            }
            ResumptionKind::End => {
                self.state.set(RunState::Finished);
                if let Some(payload) = frame.panic.take() {
                    resume_unwind(payload);
                }
                Err(Error::Finished)
            }
            ResumptionKind::Start => {
                protocol_violation!("a waiting consumer received a start transfer")
            }
        }
    }

    /// Extracts the value (or raised failure) the producer left behind. Must run before
    /// control transfers away again: the cell lives in the producer's suspended frame.
    fn take_yielded(&self, frame: &EntryFrame<T, R::Pull>) -> Result<T, Error> {
        let raw = frame.consumer.peer_cell();
        if raw.is_null() {
            return Err(Error::NoResult);
        }

        let cell = raw as *mut ResultCell<T>;
        let handle = unsafe { (*cell).take() }.ok_or(Error::NoResult)?;
        unsafe { handle.invoke() }.map_err(Error::Raised)
    }

    /// Forces a suspended (or never-started) producer to unwind, running every drop on
    /// its stack, and marks the generator finished. Idempotent once finished; the private
    /// stack is released only afterwards, on drop.
    ///
    /// # Panics
    ///
    /// If called while the generator is mid-resume, or if the body swallows the forced
    /// unwind and suspends again.
    pub fn destroy(&mut self) {
        match self.state.get() {
            RunState::Finished => return,
            RunState::Running => protocol_violation!("cannot destroy a running generator"),
            RunState::NotStarted | RunState::Suspended => {}
        }

        self.state.set(RunState::Running);
        let frame = unsafe { self.frame.as_ref() };
        let point = SuspendPoint::new(null_mut());
        match frame
            .consumer
            .suspend_and_resume_other(&point, ResumptionKind::End)
        {
            ResumptionKind::End => self.state.set(RunState::Finished),
            kind => protocol_violation!("the producer survived a forced termination: {:?}", kind),
        }
    }

    #[inline(always)]
    pub fn state(&self) -> RunState {
        self.state.get()
    }

    #[inline(always)]
    pub fn is_finished(&self) -> bool {
        self.state.get() == RunState::Finished
    }
}

impl<'a, T, R: OnResume<Arg = ()>> Generator<'a, T, R> {
    /// [`resume_with`](Generator::resume_with) for policies resumed without an argument.
    #[inline(always)]
    pub fn resume(&mut self) -> Result<T, Error> {
        self.resume_with(())
    }
}

impl<'a, T, R: OnResume> Drop for Generator<'a, T, R> {
    fn drop(&mut self) {
        // A generator dropped while Running means a resume panicked mid-flight; the
        // producer cannot be unwound safely at that point, so only the frame is released.
        match self.state.get() {
            RunState::NotStarted | RunState::Suspended => self.destroy(),
            RunState::Running | RunState::Finished => {}
        }
        unsafe { self.frame.drop_in_place() };
        // self.stack unmaps after this body: the producer is fully unwound by now.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resume::Identity;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct DropCounter(Arc<AtomicUsize>);
    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_single_value_round_trip() {
        let mut gen = Generator::new(|y: &Yieldable<i32, ()>| {
            y.yield_value(7).unwrap();
        })
        .unwrap();

        assert_eq!(gen.resume().unwrap(), 7);
    }

    #[test]
    fn test_bidirectional_round_trip() {
        let mut gen = Generator::with_on_resume(
            Identity::<i32>::new(),
            |y: &Yieldable<i32, i32>| {
                let x = y.yield_value(1).unwrap();
                y.yield_value(x + 1).unwrap();
            },
        )
        .unwrap();

        gen.start().unwrap();
        assert_eq!(gen.resume_with(0).unwrap(), 1);
        assert_eq!(gen.resume_with(41).unwrap(), 42);
    }

    #[test]
    fn test_finite_run_then_finished() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = DropCounter(hits.clone());

        let mut gen = Generator::new(move |y: &Yieldable<u8, ()>| {
            let _guard = counter;
            y.yield_value(1).unwrap();
            y.yield_value(2).unwrap();
        })
        .unwrap();

        gen.start().unwrap();
        assert_eq!(gen.resume().unwrap(), 1);
        assert_eq!(gen.resume().unwrap(), 2);
        // Still suspended inside the second yield: nothing dropped yet.
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert!(matches!(gen.resume(), Err(Error::Finished)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(gen.is_finished());
        assert!(matches!(gen.resume(), Err(Error::Finished)));
    }

    #[test]
    fn test_resume_auto_starts() {
        let mut gen = Generator::new(|y: &Yieldable<i32, ()>| {
            y.yield_value(10).unwrap();
            y.yield_value(20).unwrap();
        })
        .unwrap();

        assert_eq!(gen.resume().unwrap(), 10);
        assert_eq!(gen.resume().unwrap(), 20);
    }

    #[test]
    fn test_forced_termination_runs_unwind() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = DropCounter(hits.clone());

        let mut gen = Generator::new(move |y: &Yieldable<u8, ()>| {
            let _guard = counter;
            y.yield_value(1).unwrap();
            y.yield_value(2).unwrap();
        })
        .unwrap();

        assert_eq!(gen.resume().unwrap(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        drop(gen);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_before_start_never_runs_body() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_in_body = ran.clone();

        let gen = Generator::new(move |y: &Yieldable<u8, ()>| {
            ran_in_body.fetch_add(1, Ordering::SeqCst);
            y.yield_value(1).unwrap();
        })
        .unwrap();

        drop(gen);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_explicit_destroy_is_idempotent() {
        let mut gen = Generator::new(|y: &Yieldable<u8, ()>| {
            y.yield_value(1).unwrap();
        })
        .unwrap();

        assert_eq!(gen.resume().unwrap(), 1);
        gen.destroy();
        assert!(gen.is_finished());
        gen.destroy();
        assert!(matches!(gen.resume(), Err(Error::Finished)));
    }

    #[test]
    fn test_raise_propagates_failure() {
        #[derive(Debug, PartialEq)]
        struct MyFailure(&'static str);

        let mut gen = Generator::new(|y: &Yieldable<i32, ()>| {
            y.raise(MyFailure("x")).unwrap();
        })
        .unwrap();

        let err = gen.resume().unwrap_err();
        assert_eq!(err.downcast_raised::<MyFailure>().unwrap(), MyFailure("x"));
    }

    #[test]
    fn test_raised_generator_can_continue() {
        let mut gen = Generator::new(|y: &Yieldable<i32, ()>| {
            y.raise("first the bad news").unwrap();
            y.yield_value(3).unwrap();
        })
        .unwrap();

        assert!(matches!(gen.resume(), Err(Error::Raised(_))));
        assert_eq!(gen.resume().unwrap(), 3);
    }

    #[test]
    fn test_state_transitions() {
        let mut gen = Generator::new(|y: &Yieldable<u8, ()>| {
            y.yield_value(1).unwrap();
        })
        .unwrap();

        assert_eq!(gen.state(), RunState::NotStarted);
        gen.start().unwrap();
        assert_eq!(gen.state(), RunState::Suspended);
        gen.start().unwrap(); // no-op
        assert_eq!(gen.resume().unwrap(), 1);
        assert_eq!(gen.state(), RunState::Suspended);
        assert!(matches!(gen.resume(), Err(Error::Finished)));
        assert_eq!(gen.state(), RunState::Finished);
        assert!(matches!(gen.start(), Err(Error::Finished)));
    }

    #[test]
    #[should_panic(expected = "boom inside the body")]
    fn test_body_panic_propagates_at_resume() {
        let mut gen = Generator::new(|_: &Yieldable<i32, ()>| {
            panic!("boom inside the body");
        })
        .unwrap();

        let _ = gen.resume();
    }

    struct Reentrant {
        target: Cell<Ptr<Generator<'static, i32, Reentrant>>>,
    }

    impl OnResume for Reentrant {
        type Arg = ();
        type Pull = ();

        fn convert(&mut self, _arg: ()) {
            let target = self.target.get();
            if !target.is_null() {
                unsafe { target.as_mut() }.resume().ok();
            }
        }
    }

    #[test]
    #[should_panic(expected = "coroutine protocol violated: the generator is already running")]
    fn test_reentrant_resume_is_detected() {
        let on_resume = Reentrant {
            target: Cell::new(Ptr::null()),
        };
        let mut gen = Generator::with_on_resume(on_resume, |y: &Yieldable<i32, ()>| {
            y.yield_value(1).unwrap();
        })
        .unwrap();

        gen.start().unwrap();
        let gen_ptr: *mut Generator<'static, i32, Reentrant> = &mut gen;
        gen.on_resume.target.set(Ptr::from(gen_ptr));
        gen.resume().ok();
    }

    #[test]
    fn test_resume_without_yielded_cell_reports_no_result() {
        let gen = Generator::new(|y: &Yieldable<i32, ()>| {
            y.yield_value(1).unwrap();
        })
        .unwrap();

        // The entry suspension publishes no cell.
        let frame = unsafe { gen.frame.as_ref() };
        assert!(matches!(gen.take_yielded(frame), Err(Error::NoResult)));
    }

    #[test]
    fn test_resume_with_consumed_yield_cell_reports_no_result() {
        let gen = Generator::new(|y: &Yieldable<i32, ()>| {
            y.yield_value(1).unwrap();
        })
        .unwrap();

        let frame = unsafe { gen.frame.as_ref() };
        let builder = ResultBuilder::new(|| Ok(9i32));
        let point = SuspendPoint::new(builder.erased());
        frame
            .yieldable
            .handoff()
            .set_baton(Baton::Suspended(Ptr::from(
                &point as *const SuspendPoint as *mut SuspendPoint,
            )));
        builder.cell().take().unwrap();
        assert!(matches!(gen.take_yielded(frame), Err(Error::NoResult)));

        // Put the entry suspension back so teardown unwinds the producer normally.
        frame
            .yieldable
            .handoff()
            .set_baton(Baton::Suspended(Ptr::from(frame.initial.get())));
    }

    #[test]
    fn test_custom_stack_size() {
        let mut gen = Generator::with_stack_size(
            DEFAULT_STACK_SIZE * 4,
            NoArg,
            |y: &Yieldable<usize, ()>| {
                // Deep-ish recursion to actually use the larger stack.
                fn depth(n: usize) -> usize {
                    if n == 0 {
                        0
                    } else {
                        depth(n - 1) + 1
                    }
                }
                y.yield_value(depth(1000)).unwrap();
            },
        )
        .unwrap();

        assert_eq!(gen.resume().unwrap(), 1000);
    }
}
