//! # 线程初始栈
//!
//! ## Overview
//! 为新线程在其栈块顶端构造一份“看起来刚被切换出去”的上下文，
//! 使 PendSV 第一次恢复它时直接跳到入口函数。
//!
//! ## Behavior
//! - 栈顶 = 块地址 + 块大小，向下 8 字节对齐
//! - 向下预留一份完整上下文（开启 `fpu` 时按浮点变体大小预留）
//! - 整块预留区先填 [`STACK_POISON`]
//! - 再按不带浮点的布局写入：r0 = 参数，lr = 退出地址，pc = 入口，
//!   xpsr = Thumb，flag = 未使用浮点
//!
//! ## Assumptions
//! - 栈块至少能容纳一份上下文，过小的块属于调用者违约，这里不检查

use super::frame::{Frame, FpSavedContext, SavedContext};
use super::memory::{bus_addr, Memory, RawMemory};
use crate::hal::{CONTEXT_FLAG_PLAIN, INITIAL_XPSR, STACK_ALIGN, STACK_POISON, WORD_SIZE};

/// 新线程预留的上下文大小，由构建时是否启用 `fpu` 决定
pub const INITIAL_CONTEXT_SIZE: u32 = if cfg!(feature = "fpu") {
    FpSavedContext::SIZE
} else {
    SavedContext::SIZE
};

/// 向下对齐到 `align`（2 的幂）
pub const fn align_down(addr: u32, align: u32) -> u32 {
    addr & !(align - 1)
}

/// 计算栈块的初始 sp，不写内存
pub const fn initial_sp(stack_addr: u32, stack_size: u32) -> u32 {
    align_down(stack_addr + stack_size, STACK_ALIGN) - INITIAL_CONTEXT_SIZE
}

/// 在 `mem` 中为新线程构造初始上下文，返回其 sp
///
/// ## Parameters
/// - `entry`：入口函数地址（Thumb 地址，最低位由调用者决定）
/// - `arg`：入口函数的第一个参数，放入 r0
/// - `stack_addr` / `stack_size`：线程独占的栈块
/// - `exit`：入口函数返回时跳转的地址，放入 lr
pub fn init_stack<M: Memory + ?Sized>(
    mem: &mut M,
    entry: u32,
    arg: u32,
    stack_addr: u32,
    stack_size: u32,
    exit: u32,
) -> u32 {
    let sp = initial_sp(stack_addr, stack_size);

    mem.fill_words(sp, (INITIAL_CONTEXT_SIZE / WORD_SIZE) as usize, STACK_POISON);

    let mut cx = SavedContext::load(mem, sp);
    cx.frame.r0 = arg;
    cx.frame.lr = exit;
    cx.frame.pc = entry;
    cx.frame.xpsr = INITIAL_XPSR;
    // 新线程还没有执行过浮点指令
    cx.flag = CONTEXT_FLAG_PLAIN;
    cx.store(mem, sp);

    log::trace!(
        "[stack] init entry={:#010x} arg={:#010x} sp={:#010x}",
        entry,
        arg,
        sp
    );
    sp
}

/// 直接在物理内存上构造初始上下文
///
/// 任何参数超出 32 位时 panic，不会写内存。
///
/// ## Safety
/// - `stack_addr .. stack_addr + stack_size` 必须是调用者独占的可写内存，
///   且足以容纳 [`INITIAL_CONTEXT_SIZE`] 字节
pub unsafe fn stack_init(
    entry: usize,
    arg: usize,
    stack_addr: *mut u8,
    stack_size: usize,
    exit: usize,
) -> *mut u8 {
    let entry = bus_addr(entry);
    let arg = bus_addr(arg);
    let stack_addr = bus_addr(stack_addr as usize);
    let stack_size = bus_addr(stack_size);
    let exit = bus_addr(exit);
    let mut mem = RawMemory::new();
    let sp = init_stack(&mut mem, entry, arg, stack_addr, stack_size, exit);
    sp as usize as *mut u8
}
