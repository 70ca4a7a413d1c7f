//! The coroutine's private stack: an anonymous mapping with a guard page at the low end.
use std::io;
use std::ptr::null_mut;

/// Default usable size of a private stack, not counting the guard page.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// An owning handle to a private stack.
///
/// The stack is exclusively owned by its [`Generator`](crate::generator::Generator) and is
/// touched by exactly one side at a time, enforced by the handoff protocol rather than a
/// lock. It is unmapped on drop; the generator guarantees the producer has fully unwound
/// before that happens.
#[derive(Debug)]
pub struct Stack {
    base: *mut u8,
    len: usize,
}

impl Stack {
    /// Maps a new stack with at least `size` usable bytes plus one `PROT_NONE` guard page
    /// below them, so an overflow faults instead of corrupting neighbouring memory.
    pub fn new(size: usize) -> io::Result<Self> {
        let page = page_size();
        let usable = match size.max(page).checked_add(page - 1) {
            Some(n) => n & !(page - 1),
            None => return Err(oversized()),
        };
        let len = match usable.checked_add(page) {
            Some(n) => n,
            None => return Err(oversized()),
        };

        #[allow(unused_mut)]
        let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
        #[cfg(target_os = "linux")]
        {
            flags |= libc::MAP_STACK;
        }

        unsafe {
            let base = libc::mmap(
                null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            );
            if base == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }

            if libc::mprotect(base, page, libc::PROT_NONE) != 0 {
                let err = io::Error::last_os_error();
                libc::munmap(base, len);
                return Err(err);
            }

            Ok(Self {
                base: base as *mut u8,
                len,
            })
        }
    }

    /// The high end of the mapping. Stacks grow downwards, so this is where execution
    /// begins.
    #[inline(always)]
    pub(crate) fn top(&self) -> *mut u8 {
        unsafe { self.base.add(self.len) }
    }

    /// Usable bytes, not counting the guard page.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.len - page_size()
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.len);
        }
    }
}

#[inline(always)]
fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

fn oversized() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "requested stack size is too large")
}
