//! One-shot, type-erased result cells.
//!
//! The value (or raised failure) produced by a yield is not materialized eagerly. The
//! suspending side leaves a [`ResultBuilder`] on its own stack: a closure that knows how
//! to produce the value, published behind a [`ResultCell`] header. The peer takes the
//! builder atomically (at most once) and only then invokes it, on its own stack.
//!
//! The take/invoke split matters: taking transfers ownership and is safe even under
//! teardown, while invoking runs user code with side effects and must happen on the stack
//! that will consume the value.
use std::any::Any;
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::ptr::null_mut;
use std::sync::atomic::{AtomicPtr, Ordering};

/// A failure intentionally raised by the producer body, type-erased for transport across
/// the suspension boundary.
pub type RaisedFailure = Box<dyn Any + Send + 'static>;

/// What a builder produces: the value, or the failure the producer raised in its place.
pub type Outcome<T> = Result<T, RaisedFailure>;

type RawInvoke<T> = unsafe fn(*mut ResultCell<T>) -> Outcome<T>;

/// The type-erased header of a [`ResultBuilder`], as seen by the taking side.
///
/// Holds the invoke thunk in an atomic slot; null means the builder was already taken (or
/// never set). The closure itself lives in the builder right behind this header, so the
/// cell's address is all the taker needs.
#[repr(C)]
pub struct ResultCell<T> {
    thunk: AtomicPtr<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResultCell<T> {
    /// Atomically takes ownership of the builder.
    ///
    /// Returns `None` if it was already taken: a repeated take must observe "empty" and
    /// never a stale value.
    #[inline(always)]
    pub fn take(&self) -> Option<ResultHandle<T>> {
        let raw = self.thunk.swap(null_mut(), Ordering::AcqRel);
        if raw.is_null() {
            return None;
        }

        Some(ResultHandle {
            invoke: unsafe { mem::transmute::<*mut (), RawInvoke<T>>(raw) },
            cell: self as *const _ as *mut ResultCell<T>,
        })
    }
}

/// Ownership of a taken builder. Consume it with [`invoke`](ResultHandle::invoke).
pub struct ResultHandle<T> {
    invoke: RawInvoke<T>,
    cell: *mut ResultCell<T>,
}

impl<T> ResultHandle<T> {
    /// Calls the builder exactly once.
    ///
    /// If the producer raised a failure instead of yielding a value, that failure is the
    /// `Err` outcome; it is propagated, never swallowed.
    ///
    /// # Safety
    ///
    /// The [`ResultBuilder`] this handle was taken from must still be alive and must not
    /// have moved since the take. In the handoff protocol both hold: the builder sits in a
    /// frame of the suspended peer stack, and the taker invokes before control transfers
    /// away again.
    #[inline(always)]
    pub unsafe fn invoke(self) -> Outcome<T> {
        unsafe { (self.invoke)(self.cell) }
    }
}

/// A builder constructed on the suspending side's stack just before the transfer.
///
/// Its storage is invalid once the frame that created it is abandoned; correctness depends
/// on the peer extracting the result before control transfers away again. If the builder
/// is never taken, its closure is released when the frame resumes or unwinds.
#[repr(C)]
pub struct ResultBuilder<T, F: FnOnce() -> Outcome<T>> {
    cell: ResultCell<T>,
    make: ManuallyDrop<F>,
}

impl<T, F: FnOnce() -> Outcome<T>> ResultBuilder<T, F> {
    pub fn new(make: F) -> Self {
        Self {
            cell: ResultCell {
                thunk: AtomicPtr::new(invoke_erased::<T, F> as RawInvoke<T> as usize as *mut ()),
                _marker: PhantomData,
            },
            make: ManuallyDrop::new(make),
        }
    }

    #[inline(always)]
    pub fn cell(&self) -> &ResultCell<T> {
        &self.cell
    }

    /// The cell's address, erased for transport through the handoff baton.
    #[inline(always)]
    pub(crate) fn erased(&self) -> *mut () {
        &self.cell as *const _ as *mut ()
    }
}

impl<T, F: FnOnce() -> Outcome<T>> Drop for ResultBuilder<T, F> {
    fn drop(&mut self) {
        // Swap, not load: keeps "at most one extraction" even against a take racing with
        // teardown.
        if !self.cell.thunk.swap(null_mut(), Ordering::AcqRel).is_null() {
            unsafe { ManuallyDrop::drop(&mut self.make) };
        }
    }
}

unsafe fn invoke_erased<T, F: FnOnce() -> Outcome<T>>(cell: *mut ResultCell<T>) -> Outcome<T> {
    // The cell is the first field of its repr(C) builder, so the addresses coincide.
    let builder = cell as *mut ResultBuilder<T, F>;
    let make = unsafe { ManuallyDrop::take(&mut (*builder).make) };
    make()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct DropCounter(Arc<AtomicUsize>);
    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_take_then_invoke() {
        let builder = ResultBuilder::new(|| Ok(5u32));
        let handle = builder.cell().take().unwrap();
        assert_eq!(unsafe { handle.invoke() }.unwrap(), 5);
    }

    #[test]
    fn test_second_take_observes_empty() {
        let builder = ResultBuilder::new(|| Ok(5u32));
        let handle = builder.cell().take().unwrap();
        assert!(builder.cell().take().is_none());
        assert_eq!(unsafe { handle.invoke() }.unwrap(), 5);
    }

    #[test]
    fn test_untaken_builder_releases_closure() {
        let hits = Arc::new(AtomicUsize::new(0));
        let guard = DropCounter(hits.clone());
        let builder = ResultBuilder::new(move || {
            let _guard = guard;
            Ok(1u8)
        });
        drop(builder);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_taken_builder_does_not_double_drop() {
        let hits = Arc::new(AtomicUsize::new(0));
        let guard = DropCounter(hits.clone());
        let builder = ResultBuilder::new(move || {
            let _guard = guard;
            Ok(1u8)
        });
        let handle = builder.cell().take().unwrap();
        assert_eq!(unsafe { handle.invoke() }.unwrap(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        drop(builder);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_raised_failure_surfaces_as_err() {
        let builder: ResultBuilder<u32, _> =
            ResultBuilder::new(|| Err(Box::new("boom") as RaisedFailure));
        let handle = builder.cell().take().unwrap();
        let failure = unsafe { handle.invoke() }.unwrap_err();
        assert_eq!(*failure.downcast::<&str>().unwrap(), "boom");
    }
}
