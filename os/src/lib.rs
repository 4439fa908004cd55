//! # Cortex-M 端口层
//!
//! ## Overview
//! 实时内核与 ARMv7-M 之间的最底层：
//! - `context`：新线程初始栈、切换请求信箱
//! - `fault`：不可恢复故障的诊断与停机
//! - `bitmap`：就绪位图使用的位扫描
//! - `hal`：PendSV 跳板、故障向量、PRIMASK 等硬件相关部分，主机上为模型
//!
//! 调度策略、定时器、线程控制块均不在本层。

#![cfg_attr(not(test), no_std)]

#[macro_use]
pub mod console;
pub mod bitmap;
pub mod context;
pub mod fault;
pub mod hal;
pub mod sync;

#[cfg(all(target_os = "none", feature = "panic-handler"))]
mod lang_items;

pub use bitmap::ffs;
pub use context::{
    context_switch, context_switch_interrupt, context_switch_to, init_stack, stack_init,
    SwitchOutcome,
};
pub use fault::{clear_fault_hook, set_fault_hook, FaultHook, FaultKind, FaultReport, FaultSnapshot};
pub use hal::{interrupt_disable, interrupt_enable};

/// 安装日志
pub fn init() -> Result<(), log::SetLoggerError> {
    console::init()?;
    log::info!("[port] initialized, fpu context: {}", cfg!(feature = "fpu"));
    Ok(())
}
