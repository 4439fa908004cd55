//! 故障向量
//!
//! 四个可配置/硬故障向量共用同一段入口：在故障发生时所用的栈上补齐
//! `r4-r11`、`flag, reserved` 与 `EXC_RETURN`，让现场成为
//! `exc_return` + 一份 [`SavedContext`](crate::context::SavedContext)，
//! 再以现场地址和 IPSR 调用 [`port_fault_entry`]。

use crate::context::{RawMemory, PORT};
use crate::fault::{handle_fault, read_fault_context, FaultKind};
use core::arch::global_asm;

use super::Scb;

global_asm!(
    "
    .syntax unified
    .section .text.port_fault,\"ax\",%progbits
    .global HardFault
    .global MemoryManagement
    .global BusFault
    .global UsageFault
    .thumb_func
HardFault:
    b       port_fault
    .thumb_func
MemoryManagement:
    b       port_fault
    .thumb_func
BusFault:
    b       port_fault
    .thumb_func
UsageFault:
    b       port_fault

    .thumb_func
port_fault:
    cpsid   i
    tst     lr, #0x04               @ 故障时使用的是哪个栈
    ite     eq
    mrseq   r0, msp
    mrsne   r0, psp
    stmdb   r0!, {{r4 - r11}}
    movs    r1, #0                  @ flag：现场按不带浮点的布局解读
    movs    r2, #0
    stmdb   r0!, {{r1, r2}}
    str     lr, [r0, #-4]!
    tst     lr, #0x04
    ite     eq
    msreq   msp, r0
    msrne   psp, r0
    mrs     r1, ipsr
    bl      port_fault_entry
9:
    b       9b
    "
);

/// 故障汇编入口的 Rust 落点
///
/// ## Safety
/// - 只能由 `port_fault` 调用，`ctx` 指向刚保存的故障现场
#[no_mangle]
unsafe extern "C" fn port_fault_entry(ctx: u32, ipsr: u32) -> ! {
    let mem = RawMemory::new();
    let snapshot = read_fault_context(&mem, &Scb, ctx);
    handle_fault(&PORT, FaultKind::from_ipsr(ipsr), snapshot)
}
