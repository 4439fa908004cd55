//! # 同步原语
//!
//! ## Overview
//! 端口层只需要单处理器下的两样东西：
//! - `UPSafeCellRaw`：放置全局可变状态
//! - `without_interrupts`：生产者写切换信箱时的临界区
//!
//! ## Assumptions
//! - 单核，不存在真正的并行执行，仅可能被中断打断

mod up;

pub use up::{without_interrupts, UPSafeCellRaw};
