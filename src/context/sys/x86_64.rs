//! System V x86_64 switch routine.
use std::arch::global_asm;

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

// rdi: save slot, rsi: target stack pointer, rdx: tag. The tag travels in rax so the
// resumed side receives it whether it wakes up after the pops (trampoline path) or as the
// return value of its own pending call (normal path).
global_asm!(concat!(
    ".text\n",
    ".p2align 4\n",
    ".globl ",
    sym!("stackgen_switch_stacks"),
    "\n",
    sym!("stackgen_switch_stacks"),
    ":\n",
    "    push rbp\n",
    "    push rbx\n",
    "    push r12\n",
    "    push r13\n",
    "    push r14\n",
    "    push r15\n",
    "    mov [rdi], rsp\n",
    "    mov rsp, rsi\n",
    "    mov rax, rdx\n",
    "    pop r15\n",
    "    pop r14\n",
    "    pop r13\n",
    "    pop r12\n",
    "    pop rbx\n",
    "    pop rbp\n",
    "    ret\n",
    ".p2align 4\n",
    ".globl ",
    sym!("stackgen_coroutine_trampoline"),
    "\n",
    sym!("stackgen_coroutine_trampoline"),
    ":\n",
    "    mov rdi, r12\n",
    "    mov rsi, rax\n",
    "    jmp r13\n",
));

/// Lays out a fresh stack so the restore half of `stackgen_switch_stacks` enters
/// `entry(data, tag)` through the trampoline.
pub(crate) unsafe fn prepare_stack(top: *mut u8, entry: EntryFn, data: *mut ()) -> *mut usize {
    let top = (top as usize & !15) as *mut usize;
    unsafe {
        let sp = top.sub(8);
        sp.add(7).write(0); // fake return address, keeps rsp % 16 == 8 at the trampoline
        sp.add(6).write(super::stackgen_coroutine_trampoline as usize);
        sp.add(5).write(0); // rbp
        sp.add(4).write(0); // rbx
        sp.add(3).write(data as usize); // r12
        sp.add(2).write(entry as usize); // r13
        sp.add(1).write(0); // r14
        sp.add(0).write(0); // r15
        sp
    }
}
