use std::alloc::{alloc, dealloc, Layout};
use std::fmt::Debug;
use std::ptr;

/// A pointer wrapper.
///
/// The handoff machinery threads references between the two stacks of a generator as raw
/// pointers: each side dereferences what the other side stored while it was suspended, so
/// no borrow can span the exchange. `Ptr` keeps those accesses in one place.
pub struct Ptr<T> {
    ptr: *mut T,
}

impl<T> Ptr<T> {
    /// Create a new `Ptr` with the given value, allocated on the heap.
    #[inline(always)]
    pub fn new(value: T) -> Self {
        let ptr = unsafe { alloc(Layout::new::<T>()) } as *mut T;
        unsafe { ptr.write(value) };
        Self { ptr }
    }

    /// Create a null `Ptr`.
    #[inline(always)]
    pub fn null() -> Self {
        Self {
            ptr: ptr::null_mut(),
        }
    }

    /// Check if the pointer is null.
    #[inline(always)]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Get the raw pointer.
    #[inline(always)]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr
    }

    /// Get a reference to the value.
    ///
    /// # Panics
    ///
    /// If the pointer is null.
    #[inline(always)]
    pub unsafe fn as_ref<'a>(self) -> &'a T {
        if self.ptr.is_null() {
            panic!("ptr is null");
        }
        unsafe { &*self.ptr }
    }

    /// Get a mutable reference to the value.
    ///
    /// # Panics
    ///
    /// If the pointer is null.
    #[inline(always)]
    pub unsafe fn as_mut<'a>(self) -> &'a mut T {
        if self.ptr.is_null() {
            panic!("ptr is null");
        }
        unsafe { &mut *self.ptr }
    }

    /// Drop the value and release its allocation. No-op on a null pointer.
    #[inline(always)]
    pub unsafe fn drop_in_place(self) {
        if self.ptr.is_null() {
            return;
        }

        unsafe {
            ptr::drop_in_place(self.ptr);
            dealloc(self.ptr as *mut u8, Layout::new::<T>());
        }
    }
}

impl<T> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        Self { ptr: self.ptr }
    }
}

impl<T> Copy for Ptr<T> {}

impl<T> From<&mut T> for Ptr<T> {
    fn from(ptr: &mut T) -> Self {
        Self { ptr }
    }
}

impl<T> From<*mut T> for Ptr<T> {
    fn from(ptr: *mut T) -> Self {
        Self { ptr }
    }
}

impl<T: Debug> Debug for Ptr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        unsafe { write!(f, "{:?}", self.as_ref()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_as_ref() {
        let ptr = Ptr::new(5);
        assert!(!ptr.is_null());
        assert_eq!(unsafe { *ptr.as_ref() }, 5);
        unsafe { ptr.drop_in_place() };
    }

    #[test]
    fn test_null() {
        let ptr: Ptr<i32> = Ptr::null();
        assert!(ptr.is_null());
    }

    #[test]
    #[should_panic(expected = "ptr is null")]
    fn test_as_ref_panic_on_null() {
        let ptr: Ptr<i32> = Ptr::null();
        unsafe { ptr.as_ref() };
    }

    #[test]
    fn test_drop_in_place_runs_drop() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct Guard(Arc<AtomicUsize>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let ptr = Ptr::new(Guard(hits.clone()));
        unsafe { ptr.drop_in_place() };
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
