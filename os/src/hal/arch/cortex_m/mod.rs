//! # ARMv7-M 硬件后端
//!
//! ## Overview
//! - `switch`：PendSV 跳板与首次启动的汇编
//! - `fault`：四个故障向量的汇编入口及其 Rust 落点
//! - 这里：PRIMASK 操作、挂起 PendSV、停机、故障状态寄存器读取

mod fault;
mod switch;

#[cfg(all(feature = "fpu", not(has_fpu)))]
compile_error!("the `fpu` feature needs a hard-float (thumbv7em-none-eabihf) target");

use crate::fault::FaultRegisters;
use cortex_m::peripheral::SCB;
use cortex_m::register::primask;

pub fn interrupts_enabled() -> bool {
    primask::read().is_inactive()
}

pub fn disable_interrupts() {
    cortex_m::interrupt::disable();
}

pub fn enable_interrupts() {
    unsafe { cortex_m::interrupt::enable() }
}

/// 关中断并返回之前的 PRIMASK（1 表示本来就是关的）
pub fn interrupt_disable() -> u32 {
    let level = u32::from(primask::read().is_active());
    cortex_m::interrupt::disable();
    level
}

/// 恢复 [`interrupt_disable`] 返回的 PRIMASK
pub fn interrupt_enable(level: u32) {
    if level == 0 {
        unsafe { cortex_m::interrupt::enable() }
    }
}

/// 挂起 PendSV，当前 ISR 链返回后执行切换
pub fn pend_switch() {
    SCB::set_pendsv();
}

pub fn start_first() -> ! {
    extern "C" {
        fn port_start_first() -> !;
    }
    unsafe { port_start_first() }
}

/// 关中断后空转，不再响应任何异常
pub fn halt() -> ! {
    cortex_m::interrupt::disable();
    loop {
        cortex_m::asm::wfi();
    }
}

/// 通过 System Control Block 读取故障状态寄存器
pub struct Scb;

impl FaultRegisters for Scb {
    fn cfsr(&self) -> u32 {
        unsafe { (*SCB::PTR).cfsr.read() }
    }

    fn hfsr(&self) -> u32 {
        unsafe { (*SCB::PTR).hfsr.read() }
    }

    fn mmfar(&self) -> u32 {
        unsafe { (*SCB::PTR).mmfar.read() }
    }

    fn bfar(&self) -> u32 {
        unsafe { (*SCB::PTR).bfar.read() }
    }
}
