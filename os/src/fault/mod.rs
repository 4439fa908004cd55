//! # 不可恢复故障诊断
//!
//! ## Overview
//! HardFault / MemManage / BusFault / UsageFault 全部汇入这里：
//! - 读出 CFSR、HFSR、MMFAR、BFAR，与异常入口时保存的上下文组成 [`FaultSnapshot`]
//! - 解码故障原因并以 `error` 级别输出
//! - 可选地把快照交给外部钩子（遥测/日志）
//! - 关中断后停机，不返回
//!
//! ## Invariants
//! - 端口层状态只有 `Running -> Faulted` 一条迁移，`Faulted` 不可离开
//! - 停机前必须已关中断，保证不会再从损坏的状态响应任何异常
//!
//! ## Assumptions
//! - 状态寄存器只在故障处理的这一刻有效，之后可能被清除或覆盖

pub mod status;

pub use status::{Cfsr, Hfsr, CFSR_CAUSES, HFSR_CAUSES};

use crate::context::{Frame, Port, SavedContext};
use crate::hal::{
    disable_interrupts, halt, EXC_RETURN_FTYPE, EXC_RETURN_MODE, EXC_RETURN_SPSEL,
};
use bit_field::BitField;
use core::fmt;
use num_enum::TryFromPrimitive;
use spin::Mutex;

/// 四个故障状态寄存器的只读访问
pub trait FaultRegisters {
    fn cfsr(&self) -> u32;
    fn hfsr(&self) -> u32;
    fn mmfar(&self) -> u32;
    fn bfar(&self) -> u32;
}

/// 故障异常号（IPSR 低位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum FaultKind {
    HardFault = 3,
    MemManage = 4,
    BusFault = 5,
    UsageFault = 6,
}

impl FaultKind {
    /// 由 IPSR 得到故障类型，无法识别的异常号按 HardFault 处理
    pub fn from_ipsr(ipsr: u32) -> Self {
        u8::try_from(ipsr.get_bits(0..9))
            .ok()
            .and_then(|number| Self::try_from(number).ok())
            .unwrap_or(Self::HardFault)
    }
}

/// 故障发生时 CPU 所处的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOrigin {
    /// 线程模式，使用 PSP
    Thread,
    /// Handler 模式或使用 MSP
    Handler,
}

/// 异常入口时 LR 中的 EXC_RETURN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExcReturn(pub u32);

impl ExcReturn {
    pub fn uses_psp(self) -> bool {
        self.0.get_bit(EXC_RETURN_SPSEL)
    }

    pub fn to_thread(self) -> bool {
        self.0.get_bit(EXC_RETURN_MODE)
    }

    /// 硬件压入的是扩展（浮点）异常帧
    pub fn fp_frame(self) -> bool {
        !self.0.get_bit(EXC_RETURN_FTYPE)
    }

    pub fn origin(self) -> FaultOrigin {
        if self.uses_psp() {
            FaultOrigin::Thread
        } else {
            FaultOrigin::Handler
        }
    }
}

/// 故障瞬间的状态寄存器 + 上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultSnapshot {
    pub cfsr: Cfsr,
    pub hfsr: Hfsr,
    pub mmfar: u32,
    pub bfar: u32,
    pub exc_return: ExcReturn,
    pub context: SavedContext,
}

impl FaultSnapshot {
    pub fn capture<R: FaultRegisters + ?Sized>(
        regs: &R,
        exc_return: u32,
        context: SavedContext,
    ) -> Self {
        Self {
            cfsr: Cfsr::from_bits_retain(regs.cfsr()),
            hfsr: Hfsr::from_bits_retain(regs.hfsr()),
            mmfar: regs.mmfar(),
            bfar: regs.bfar(),
            exc_return: ExcReturn(exc_return),
            context,
        }
    }

    /// MMFAR，仅当 MMARVALID 置位时有意义
    pub fn mem_fault_address(&self) -> Option<u32> {
        self.cfsr.contains(Cfsr::MMARVALID).then_some(self.mmfar)
    }

    /// BFAR，仅当 BFARVALID 置位时有意义
    pub fn bus_fault_address(&self) -> Option<u32> {
        self.cfsr.contains(Cfsr::BFARVALID).then_some(self.bfar)
    }

    pub fn origin(&self) -> FaultOrigin {
        self.exc_return.origin()
    }
}

/// 一次故障的诊断结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultReport {
    pub kind: FaultKind,
    pub snapshot: FaultSnapshot,
}

impl FaultReport {
    /// 所有已置位的故障原因描述
    pub fn causes(&self) -> impl Iterator<Item = &'static str> + '_ {
        let hfsr = self.snapshot.hfsr;
        let cfsr = self.snapshot.cfsr;
        HFSR_CAUSES
            .iter()
            .filter(move |(flag, _)| hfsr.contains(*flag))
            .map(|(_, text)| *text)
            .chain(
                CFSR_CAUSES
                    .iter()
                    .filter(move |(flag, _)| cfsr.contains(*flag))
                    .map(|(_, text)| *text),
            )
    }
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snap = &self.snapshot;
        let frame = &snap.context.frame;
        let callee = snap.context.callee.to_array();
        let origin = match snap.origin() {
            FaultOrigin::Thread => "thread",
            FaultOrigin::Handler => "handler",
        };

        writeln!(f, "{:?} on {} (EXC_RETURN={:#010x})", self.kind, origin, snap.exc_return.0)?;
        writeln!(f, "psr: {:#010x}", frame.xpsr)?;
        writeln!(f, "r00: {:#010x} r01: {:#010x} r02: {:#010x} r03: {:#010x}", frame.r0, frame.r1, frame.r2, frame.r3)?;
        for (i, pair) in callee.chunks(4).enumerate() {
            write!(f, "r{:02}:", 4 + i * 4)?;
            for r in pair {
                write!(f, " {:#010x}", r)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "r12: {:#010x} lr: {:#010x} pc: {:#010x}", frame.r12, frame.lr, frame.pc)?;
        writeln!(f, "hfsr: {:#010x} cfsr: {:#010x}", snap.hfsr.bits(), snap.cfsr.bits())?;
        for cause in self.causes() {
            writeln!(f, "  - {}", cause)?;
        }
        if let Some(addr) = snap.mem_fault_address() {
            writeln!(f, "mmfar: {:#010x}", addr)?;
        }
        if let Some(addr) = snap.bus_fault_address() {
            writeln!(f, "bfar: {:#010x}", addr)?;
        }
        Ok(())
    }
}

/// 外部故障汇报钩子，不能让系统恢复运行
pub type FaultHook = fn(&FaultSnapshot);

static FAULT_HOOK: Mutex<Option<FaultHook>> = Mutex::new(None);

pub fn set_fault_hook(hook: FaultHook) {
    *FAULT_HOOK.lock() = Some(hook);
}

pub fn clear_fault_hook() {
    *FAULT_HOOK.lock() = None;
}

/// 故障路径上读取钩子：锁被打断的代码持有时直接放弃
pub fn fault_hook() -> Option<FaultHook> {
    FAULT_HOOK.try_lock().and_then(|hook| *hook)
}

/// 进入故障态并生成诊断报告，不停机
pub fn diagnose(
    port: &Port,
    kind: FaultKind,
    snapshot: FaultSnapshot,
    hook: Option<FaultHook>,
) -> FaultReport {
    if !port.enter_faulted() {
        log::error!("[fault] nested fault while already halted");
    }
    let report = FaultReport { kind, snapshot };
    // 不受日志级别影响，故障现场总要输出
    println!("\n[fault] {}", report);
    log::error!("[fault] {:?} at pc {:#010x}", kind, snapshot.context.frame.pc);
    if let Some(hook) = hook {
        hook(&report.snapshot);
    }
    report
}

/// 故障终点：关中断、诊断、停机
pub fn handle_fault(port: &Port, kind: FaultKind, snapshot: FaultSnapshot) -> ! {
    disable_interrupts();
    diagnose(port, kind, snapshot, fault_hook());
    halt()
}

/// 从汇编保存的故障现场读出快照
///
/// 现场布局：`exc_return`，随后是一份不带浮点的 [`SavedContext`]。
pub fn read_fault_context<M: crate::context::Memory + ?Sized, R: FaultRegisters + ?Sized>(
    mem: &M,
    regs: &R,
    addr: u32,
) -> FaultSnapshot {
    let exc_return = mem.read_word(addr);
    let context = SavedContext::load(mem, addr + 4);
    FaultSnapshot::capture(regs, exc_return, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CalleeSaved, ExceptionFrame, Memory, StackArena};
    use crate::hal::{CONTEXT_FLAG_PLAIN, EXC_RETURN_HANDLER, EXC_RETURN_THREAD_PSP, EXC_RETURN_THREAD_PSP_FP};
    use core::sync::atomic::{AtomicU32, Ordering};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Regs {
        cfsr: u32,
        hfsr: u32,
        mmfar: u32,
        bfar: u32,
    }

    impl FaultRegisters for Regs {
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

    fn context(pc: u32) -> SavedContext {
        SavedContext {
            flag: CONTEXT_FLAG_PLAIN,
            reserved: 0,
            callee: CalleeSaved::from_array([4, 5, 6, 7, 8, 9, 10, 11]),
            frame: ExceptionFrame { pc, xpsr: 1 << 24, ..Default::default() },
        }
    }

    #[test]
    fn exc_return_decoding() {
        assert_eq!(ExcReturn(EXC_RETURN_THREAD_PSP).origin(), FaultOrigin::Thread);
        assert!(!ExcReturn(EXC_RETURN_THREAD_PSP).fp_frame());
        assert!(ExcReturn(EXC_RETURN_THREAD_PSP_FP).fp_frame());
        assert_eq!(ExcReturn(EXC_RETURN_HANDLER).origin(), FaultOrigin::Handler);
        assert!(!ExcReturn(EXC_RETURN_HANDLER).to_thread());
    }

    #[test]
    fn fault_kind_from_ipsr() {
        assert_eq!(FaultKind::from_ipsr(3), FaultKind::HardFault);
        assert_eq!(FaultKind::from_ipsr(6), FaultKind::UsageFault);
        assert_eq!(FaultKind::from_ipsr(0x0100_0005), FaultKind::BusFault);
        assert_eq!(FaultKind::from_ipsr(42), FaultKind::HardFault);
        // 9 位异常号不能截断成 8 位后误判
        assert_eq!(FaultKind::from_ipsr(256 + 3), FaultKind::HardFault);
        assert_eq!(FaultKind::from_ipsr(256 + 6), FaultKind::HardFault);
        assert_eq!(FaultKind::from_ipsr(0x0100_0104), FaultKind::HardFault);
    }

    #[test]
    fn addresses_only_when_valid() {
        let regs = Regs { cfsr: Cfsr::DACCVIOL.bits(), mmfar: 0xE000_0000, bfar: 0x4000_0000, ..Default::default() };
        let snap = FaultSnapshot::capture(&regs, EXC_RETURN_THREAD_PSP, context(0));
        assert_eq!(snap.mem_fault_address(), None);
        assert_eq!(snap.bus_fault_address(), None);

        let regs = Regs {
            cfsr: (Cfsr::DACCVIOL | Cfsr::MMARVALID | Cfsr::PRECISERR | Cfsr::BFARVALID).bits(),
            mmfar: 0xE000_0000,
            bfar: 0x4000_0000,
            ..Default::default()
        };
        let snap = FaultSnapshot::capture(&regs, EXC_RETURN_THREAD_PSP, context(0));
        assert_eq!(snap.mem_fault_address(), Some(0xE000_0000));
        assert_eq!(snap.bus_fault_address(), Some(0x4000_0000));
    }

    #[test]
    fn diagnose_enters_faulted_and_names_causes() {
        let port = Port::new();
        let regs = Regs {
            cfsr: Cfsr::UNDEFINSTR.bits(),
            hfsr: Hfsr::FORCED.bits(),
            ..Default::default()
        };
        let snap = FaultSnapshot::capture(&regs, EXC_RETURN_THREAD_PSP, context(0x0800_0123));
        let report = diagnose(&port, FaultKind::HardFault, snap, None);

        assert!(port.is_faulted());
        let causes: Vec<_> = report.causes().collect();
        assert_eq!(
            causes,
            vec!["hard: escalated from a configurable fault", "usage: undefined instruction"]
        );

        let text = format!("{}", report);
        assert!(text.starts_with("HardFault on thread"));
        assert!(text.contains("pc: 0x08000123"));
        assert!(text.contains("r04: 0x00000004 0x00000005 0x00000006 0x00000007"));
        assert!(text.contains("r08: 0x00000008 0x00000009 0x0000000a 0x0000000b"));
    }

    static HOOK_CALLS: AtomicU32 = AtomicU32::new(0);
    static HOOK_PC: AtomicU32 = AtomicU32::new(0);

    fn record(snapshot: &FaultSnapshot) {
        HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
        HOOK_PC.store(snapshot.context.frame.pc, Ordering::SeqCst);
    }

    #[test]
    fn hook_receives_snapshot() {
        set_fault_hook(record);
        let hook = fault_hook();
        assert!(hook.is_some());
        clear_fault_hook();
        assert!(fault_hook().is_none());

        let port = Port::new();
        let snap = FaultSnapshot::capture(&Regs::default(), EXC_RETURN_THREAD_PSP, context(0x0800_0400));
        diagnose(&port, FaultKind::BusFault, snap, hook);
        assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(HOOK_PC.load(Ordering::SeqCst), 0x0800_0400);
    }

    #[test]
    fn fault_context_layout() {
        let mut buf = [0u8; 128];
        let mut arena = StackArena::new(0x2000_0000, &mut buf);
        arena.write_word(0x2000_0000, EXC_RETURN_THREAD_PSP);
        context(0x0800_0999).store(&mut arena, 0x2000_0004);

        let snap = read_fault_context(&arena, &Regs::default(), 0x2000_0000);
        assert_eq!(snap.exc_return, ExcReturn(EXC_RETURN_THREAD_PSP));
        assert_eq!(snap.context, context(0x0800_0999));
    }
}
