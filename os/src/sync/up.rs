//! # 单处理器内部可变性与中断屏蔽
//!
//! ## Overview
//! - `UPSafeCellRaw`：基于 `UnsafeCell` 的最底层封装，完全由使用者保证安全
//! - `without_interrupts`：在嵌套中断屏蔽下执行一段闭包
//!
//! ## Assumptions
//! - 系统运行在单核处理器上，并发只可能来自中断
//! - `INTR_MASKING_INFO` 正确维护嵌套屏蔽层数
//!
//! ## Safety
//! - `unsafe impl Sync` 的正确性完全依赖“单处理器 + 中断屏蔽”这一前提

use crate::hal::INTR_MASKING_INFO;
use core::cell::UnsafeCell;

/// 基于 `UnsafeCell` 的最底层 UP 内部可变性封装
///
/// ## Safety
/// - 使用者必须保证不会出现并发或中断竞争
pub struct UPSafeCellRaw<T> {
    inner: UnsafeCell<T>,
}

unsafe impl<T> Sync for UPSafeCellRaw<T> {}

impl<T> UPSafeCellRaw<T> {
    /// ## Safety
    /// - 调用者必须保证后续访问满足 UP 假设
    pub const unsafe fn new(value: T) -> Self {
        Self {
            inner: UnsafeCell::new(value),
        }
    }

    /// 获取内部数据的可变引用，不做任何检查
    #[allow(clippy::mut_from_ref)]
    pub fn get_mut(&self) -> &mut T {
        unsafe { &mut (*self.inner.get()) }
    }
}

/// 屏蔽中断执行 `f`，返回时恢复进入前的中断状态
///
/// 可以嵌套，只有最外层退出时才可能重新打开中断。
pub fn without_interrupts<F, V>(f: F) -> V
where
    F: FnOnce() -> V,
{
    INTR_MASKING_INFO.get_mut().enter();
    let ret = f();
    INTR_MASKING_INFO.get_mut().exit();
    ret
}
