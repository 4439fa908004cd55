//! # 线程上下文模块
//!
//! ## Overview
//! 负责线程执行上下文的创建与切换请求：
//! - `frame`：挂起线程在栈上的寄存器布局
//! - `memory`：帧读写所经过的按字内存视图
//! - `stack`：新线程初始栈的构造
//! - `switch`：调度器与 PendSV 跳板之间的单槽信箱
//!
//! 真正的寄存器保存/恢复由 `hal` 中的跳板完成。
//!
//! ## Behavior
//! - [`context_switch`]：屏蔽中断登记请求，再挂起 PendSV
//! - [`context_switch_to`]：启动第一个线程，不返回

pub mod frame;
pub mod memory;
pub mod stack;
pub mod switch;

pub use frame::{CalleeSaved, Context, ExceptionFrame, FpExceptionFrame, FpSavedContext, Frame, SavedContext};
pub use memory::{bus_addr, Memory, RawMemory, StackArena};
pub use stack::{init_stack, initial_sp, stack_init, INITIAL_CONTEXT_SIZE};
pub use switch::{Port, RunState, SwitchOutcome, SwitchPair, PORT};

use crate::hal::{pend_switch, start_first};
use crate::sync::without_interrupts;

/// 请求从 `from` 切换到 `to`
///
/// ## Parameters
/// - `from` / `to`：两个线程控制块中保存 sp 的字段地址，必须落在 32 位地址空间内
///
/// ## Behavior
/// - 实际切换推迟到 PendSV 中完成
/// - 故障态下什么也不做
pub fn context_switch(from: *mut u32, to: *mut u32) -> SwitchOutcome {
    let (from, to) = (bus_addr(from as usize), bus_addr(to as usize));
    let outcome = without_interrupts(|| PORT.request_switch(from, to));
    if outcome != SwitchOutcome::Rejected {
        pend_switch();
    }
    outcome
}

/// 中断上下文中的切换请求，在本架构上与 [`context_switch`] 相同
pub fn context_switch_interrupt(from: *mut u32, to: *mut u32) -> SwitchOutcome {
    context_switch(from, to)
}

/// 启动第一个线程
///
/// ## Behavior
/// - `from` 记为 0，跳板不保存任何东西
/// - 把 PendSV 设为最低优先级、复位 MSP、打开中断，之后由 PendSV 接管
///
/// ## Safety
/// - `to` 必须指向一个由 [`stack_init`] 初始化过的 sp
pub unsafe fn context_switch_to(to: *mut u32) -> ! {
    PORT.request_first(bus_addr(to as usize));
    log::info!("[context] starting first thread, sp slot {:#010x}", to as usize);
    start_first()
}
