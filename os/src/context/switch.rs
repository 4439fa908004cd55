//! # 切换请求信箱
//!
//! ## Overview
//! 调度器（生产者）与 PendSV 跳板（消费者）之间的单槽信箱：
//! - `from`：被换出线程保存 sp 的槽位地址，0 表示无需保存（首次启动）
//! - `to`：被换入线程保存 sp 的槽位地址
//! - `pending`：是否有未消费的请求
//!
//! ## Assumptions
//! - 单核；生产者在屏蔽中断（或不高于 PendSV 的优先级）下写入
//! - 只有跳板读取并清除 `pending`
//!
//! ## Invariants
//! - 任意时刻至多一个未决请求
//! - 已有未决请求时，新请求只覆盖 `to`，`from` 保持为真正在 CPU 上的线程
//! - 进入 `Faulted` 后不再接受请求，跳板也不再动作
//!
//! ## Safety
//! - [`PORT`] 的内存布局被汇编跳板按固定偏移访问（0 / 4 / 8 / 12），
//!   字段顺序不可调整

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 端口层运行状态
///
/// 唯一的迁移是 `Running -> Faulted`，`Faulted` 是吸收态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RunState {
    Running = 0,
    Faulted = 1,
}

/// 生产者提交请求的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// 信箱原本为空，写入了完整的一对
    Posted,
    /// 已有未决请求，只替换了 `to`
    Superseded,
    /// 已进入故障态，请求被丢弃
    Rejected,
}

/// 跳板消费到的一对槽位地址
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPair {
    pub from: u32,
    pub to: u32,
}

#[repr(C)]
pub struct SwitchRequest {
    from: AtomicU32,
    to: AtomicU32,
    pending: AtomicU32,
}

impl SwitchRequest {
    pub const fn new() -> Self {
        Self {
            from: AtomicU32::new(0),
            to: AtomicU32::new(0),
            pending: AtomicU32::new(0),
        }
    }
}

/// 汇编跳板使用的字段偏移
pub const PORT_FROM: u32 = 0;
pub const PORT_TO: u32 = 4;
pub const PORT_PENDING: u32 = 8;
pub const PORT_STATE: u32 = 12;

/// 端口层的全部共享状态：切换信箱 + 运行状态
#[repr(C)]
pub struct Port {
    request: SwitchRequest,
    state: AtomicU8,
}

/// 全局端口状态，汇编跳板通过该符号访问
#[no_mangle]
pub static PORT: Port = Port::new();

impl Port {
    pub const fn new() -> Self {
        Self {
            request: SwitchRequest::new(),
            state: AtomicU8::new(RunState::Running as u8),
        }
    }

    pub fn run_state(&self) -> RunState {
        RunState::try_from(self.state.load(Ordering::Acquire)).unwrap_or(RunState::Faulted)
    }

    pub fn is_faulted(&self) -> bool {
        self.run_state() == RunState::Faulted
    }

    /// `Running -> Faulted`
    ///
    /// ## Returns
    /// - `true`：本次调用完成了迁移
    /// - `false`：早已处于故障态
    pub fn enter_faulted(&self) -> bool {
        self.state.swap(RunState::Faulted.into(), Ordering::AcqRel) != u8::from(RunState::Faulted)
    }

    /// 生产者：登记一次 `from -> to` 的切换
    ///
    /// ## Behavior
    /// - 信箱为空：写 `from`、`to`，再置位 `pending`
    /// - 已有未决请求：只覆盖 `to`（后写者胜）
    /// - 故障态：丢弃
    ///
    /// 触发 PendSV 由调用者负责。
    pub fn request_switch(&self, from: u32, to: u32) -> SwitchOutcome {
        if self.is_faulted() {
            return SwitchOutcome::Rejected;
        }
        let req = &self.request;
        if req.pending.load(Ordering::Acquire) != 0 {
            req.to.store(to, Ordering::Release);
            log::trace!("[switch] superseded, to={:#010x}", to);
            return SwitchOutcome::Superseded;
        }
        req.from.store(from, Ordering::Relaxed);
        req.to.store(to, Ordering::Relaxed);
        req.pending.store(1, Ordering::Release);
        log::trace!("[switch] posted {:#010x} -> {:#010x}", from, to);
        SwitchOutcome::Posted
    }

    /// 生产者：首次启动，不保存任何线程
    pub fn request_first(&self, to: u32) -> SwitchOutcome {
        if self.is_faulted() {
            return SwitchOutcome::Rejected;
        }
        let req = &self.request;
        req.from.store(0, Ordering::Relaxed);
        req.to.store(to, Ordering::Relaxed);
        req.pending.store(1, Ordering::Release);
        SwitchOutcome::Posted
    }

    pub fn is_pending(&self) -> bool {
        self.request.pending.load(Ordering::Acquire) != 0
    }

    /// 消费者：查看未决请求，不清除
    ///
    /// 故障态下总是返回 `None`。
    pub fn pending_request(&self) -> Option<SwitchPair> {
        if self.is_faulted() || !self.is_pending() {
            return None;
        }
        Some(SwitchPair {
            from: self.request.from.load(Ordering::Relaxed),
            to: self.request.to.load(Ordering::Relaxed),
        })
    }

    /// 消费者：被换出线程已完整保存，清除 `pending`
    pub fn complete(&self) {
        self.request.pending.store(0, Ordering::Release);
    }
}
