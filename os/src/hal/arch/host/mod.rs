//! # 主机后端
//!
//! ## Overview
//! 在非裸机目标上编译时使用：
//! - PRIMASK 用一个原子标志代替
//! - 挂起 PendSV 只记下一个标志，由 [`take_pended_switch`] 取走
//! - `start_first` / `halt` 无法在主机上完成，直接 panic
//! - [`machine`]：PendSV 跳板与异常进出的寄存器级模型，供测试使用

pub mod machine;

use crate::fault::FaultRegisters;
use core::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTS_ENABLED: AtomicBool = AtomicBool::new(true);
static SWITCH_PENDING: AtomicBool = AtomicBool::new(false);

pub fn interrupts_enabled() -> bool {
    INTERRUPTS_ENABLED.load(Ordering::SeqCst)
}

pub fn disable_interrupts() {
    INTERRUPTS_ENABLED.store(false, Ordering::SeqCst);
}

pub fn enable_interrupts() {
    INTERRUPTS_ENABLED.store(true, Ordering::SeqCst);
}

/// 返回值与 PRIMASK 含义相同：1 表示调用前已经关中断
pub fn interrupt_disable() -> u32 {
    u32::from(!INTERRUPTS_ENABLED.swap(false, Ordering::SeqCst))
}

pub fn interrupt_enable(level: u32) {
    if level == 0 {
        enable_interrupts();
    }
}

pub fn pend_switch() {
    SWITCH_PENDING.store(true, Ordering::SeqCst);
}

/// 取走挂起的 PendSV
pub fn take_pended_switch() -> bool {
    SWITCH_PENDING.swap(false, Ordering::SeqCst)
}

pub fn start_first() -> ! {
    panic!("cannot start a thread on the host, use machine::Machine")
}

pub fn halt() -> ! {
    disable_interrupts();
    panic!("port halted");
}

/// 由测试直接填写的故障状态寄存器
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFaultRegisters {
    pub cfsr: u32,
    pub hfsr: u32,
    pub mmfar: u32,
    pub bfar: u32,
}

impl FaultRegisters for HostFaultRegisters {
    fn cfsr(&self) -> u32 {
        self.cfsr
    }

    fn hfsr(&self) -> u32 {
        self.hfsr
    }

    fn mmfar(&self) -> u32 {
        self.mmfar
    }

    fn bfar(&self) -> u32 {
        self.bfar
    }
}
