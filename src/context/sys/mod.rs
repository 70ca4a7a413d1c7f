//! Per-architecture switch routines, hand-written in `global_asm!`.
//!
//! `stackgen_switch_stacks` spills the callee-saved registers onto the current stack,
//! stores the stack pointer through `save`, adopts `target`, restores and returns `tag`.
//! A fresh stack is laid out by `prepare_stack` so that the first switch into it pops
//! planted register values and lands in `stackgen_coroutine_trampoline`, which forwards
//! the data pointer and the tag into the Rust entry shim.

// TODO: Windows support via fibers.
cfg_if::cfg_if! {
    if #[cfg(all(unix, target_arch = "x86_64"))] {
        mod x86_64;
        pub(crate) use x86_64::prepare_stack;
    } else if #[cfg(all(unix, target_arch = "aarch64"))] {
        mod aarch64;
        pub(crate) use aarch64::prepare_stack;
    } else {
        compile_error!("stackgen supports only x86_64 and aarch64 on unix targets");
    }
}

/// First Rust code executed on a coroutine stack. Must never return: the switch routine
/// leaves it nothing to return to.
pub(crate) type EntryFn = extern "C" fn(*mut (), usize) -> !;

extern "C" {
    pub(crate) fn stackgen_switch_stacks(
        save: *mut *mut usize,
        target: *mut usize,
        tag: usize,
    ) -> usize;

    pub(crate) fn stackgen_coroutine_trampoline();
}
