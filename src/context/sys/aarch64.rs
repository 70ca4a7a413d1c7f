//! AAPCS64 switch routine.
use std::arch::global_asm;
use std::ptr;

use super::EntryFn;

#[cfg(target_vendor = "apple")]
macro_rules! sym {
    ($name:literal) => {
        concat!("_", $name)
    };
}
#[cfg(not(target_vendor = "apple"))]
macro_rules! sym {
    ($name:literal) => {
        $name
    };
}

// x0: save slot, x1: target stack pointer, x2: tag. x19-x28, the frame pointer, the link
// register and d8-d15 are spilled in a 160-byte frame; the tag travels in x0.
global_asm!(concat!(
    ".text\n",
    ".p2align 2\n",
    ".globl ",
    sym!("stackgen_switch_stacks"),
    "\n",
    sym!("stackgen_switch_stacks"),
    ":\n",
    "    sub sp, sp, #160\n",
    "    stp x19, x20, [sp, #0]\n",
    "    stp x21, x22, [sp, #16]\n",
    "    stp x23, x24, [sp, #32]\n",
    "    stp x25, x26, [sp, #48]\n",
    "    stp x27, x28, [sp, #64]\n",
    "    stp x29, x30, [sp, #80]\n",
    "    stp d8, d9, [sp, #96]\n",
    "    stp d10, d11, [sp, #112]\n",
    "    stp d12, d13, [sp, #128]\n",
    "    stp d14, d15, [sp, #144]\n",
    "    mov x9, sp\n",
    "    str x9, [x0]\n",
    "    mov sp, x1\n",
    "    mov x0, x2\n",
    "    ldp x19, x20, [sp, #0]\n",
    "    ldp x21, x22, [sp, #16]\n",
    "    ldp x23, x24, [sp, #32]\n",
    "    ldp x25, x26, [sp, #48]\n",
    "    ldp x27, x28, [sp, #64]\n",
    "    ldp x29, x30, [sp, #80]\n",
    "    ldp d8, d9, [sp, #96]\n",
    "    ldp d10, d11, [sp, #112]\n",
    "    ldp d12, d13, [sp, #128]\n",
    "    ldp d14, d15, [sp, #144]\n",
    "    add sp, sp, #160\n",
    "    ret\n",
    ".p2align 2\n",
    ".globl ",
    sym!("stackgen_coroutine_trampoline"),
    "\n",
    sym!("stackgen_coroutine_trampoline"),
    ":\n",
    "    mov x1, x0\n",
    "    mov x0, x19\n",
    "    br x20\n",
));

/// Lays out a fresh stack so the restore half of `stackgen_switch_stacks` enters
/// `entry(data, tag)` through the trampoline.
pub(crate) unsafe fn prepare_stack(top: *mut u8, entry: EntryFn, data: *mut ()) -> *mut usize {
    let top = (top as usize & !15) as *mut u8;
    unsafe {
        let sp = top.sub(160) as *mut usize;
        ptr::write_bytes(sp as *mut u8, 0, 160);
        sp.add(0).write(data as usize); // x19
        sp.add(1).write(entry as usize); // x20
        sp.add(11).write(super::stackgen_coroutine_trampoline as usize); // x30
        sp
    }
}
