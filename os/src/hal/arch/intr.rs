//! # 嵌套中断屏蔽
//!
//! ## Overview
//! 记录中断屏蔽的嵌套层数以及最外层进入前中断是否打开，
//! 供 `sync::without_interrupts` 使用。
//!
//! ## Invariants
//! - `nested_level > 0` 时中断一定处于关闭状态
//! - 只有最外层 `exit` 才可能重新打开中断，且仅当进入前是打开的

use super::{disable_interrupts, enable_interrupts, interrupts_enabled};
use crate::sync::UPSafeCellRaw;

pub struct IntrMaskingInfo {
    nested_level: usize,
    enabled_before_masking: bool,
}

/// 全局嵌套屏蔽记录
pub static INTR_MASKING_INFO: UPSafeCellRaw<IntrMaskingInfo> =
    unsafe { UPSafeCellRaw::new(IntrMaskingInfo::new()) };

impl IntrMaskingInfo {
    pub const fn new() -> Self {
        Self {
            nested_level: 0,
            enabled_before_masking: false,
        }
    }

    pub fn nested_level(&self) -> usize {
        self.nested_level
    }

    pub fn enter(&mut self) {
        let enabled = interrupts_enabled();
        disable_interrupts();
        if self.nested_level == 0 {
            self.enabled_before_masking = enabled;
        }
        self.nested_level += 1;
    }

    pub fn exit(&mut self) {
        assert!(self.nested_level > 0, "interrupt masking exit without enter");
        self.nested_level -= 1;
        if self.nested_level == 0 && self.enabled_before_masking {
            enable_interrupts();
        }
    }
}
