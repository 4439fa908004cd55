//! # 寄存器级执行模型
//!
//! ## Overview
//! 在主机上逐步复现目标板上的三段动作：
//! - 异常入口：硬件压入基本或扩展异常帧，必要时额外下移 4 字节对齐
//! - PendSV 跳板：与 `cortex_m::switch` 中的汇编一步一步对应
//! - 异常返回：按 EXC_RETURN 弹出对应的帧
//!
//! 线程模式总是使用 PSP，模型中的 `sp` 即 PSP。

use crate::context::{
    CalleeSaved, ExceptionFrame, FpExceptionFrame, Frame, Memory, Port, StackArena,
};
use crate::fault::{self, FaultKind, FaultRegisters, FaultReport};
use crate::hal::{
    CONTEXT_FLAG_FP, CONTEXT_FLAG_PLAIN, EXC_RETURN_FTYPE, EXC_RETURN_SPSEL,
    EXC_RETURN_THREAD_MSP, EXC_RETURN_THREAD_PSP, EXC_RETURN_THREAD_PSP_FP, STACK_ALIGN,
    WORD_SIZE, XPSR_STACK_ALIGNED,
};
use bit_field::BitField;

/// 跳板借用的临时寄存器在返回前留下的值
const SCRATCH: u32 = 0x5C5C_5C5C;

/// 线程可见的寄存器
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Registers {
    /// r0 ~ r12
    pub r: [u32; 13],
    pub sp: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
    /// s0 ~ s31
    pub s: [u32; 32],
    pub fpscr: u32,
    /// CONTROL.FPCA：当前线程有活跃的浮点上下文
    pub fpca: bool,
}

pub struct Machine<'a> {
    pub regs: Registers,
    pub mem: StackArena<'a>,
    pub port: Port,
    /// PRIMASK，置位时 PendSV 不会被响应
    pub primask: bool,
    fpu: bool,
    exc_return: Option<u32>,
}

impl<'a> Machine<'a> {
    /// `fpu` 对应带浮点扩展的跳板
    pub fn new(mem: StackArena<'a>, fpu: bool) -> Self {
        Self {
            regs: Registers::default(),
            mem,
            port: Port::new(),
            primask: false,
            fpu,
            exc_return: None,
        }
    }

    /// 模拟线程执行一条浮点指令
    pub fn touch_fpu(&mut self) {
        if self.fpu {
            self.regs.fpca = true;
        }
    }

    /// 从线程模式进入异常，返回 EXC_RETURN
    pub fn exception_entry(&mut self) -> u32 {
        let extended = self.fpu && self.regs.fpca;
        let realign = self.regs.sp % STACK_ALIGN != 0;
        let top = self.regs.sp & !(STACK_ALIGN - 1);

        let mut xpsr = self.regs.xpsr;
        xpsr.set_bit(XPSR_STACK_ALIGNED, realign);
        let base = ExceptionFrame {
            r0: self.regs.r[0],
            r1: self.regs.r[1],
            r2: self.regs.r[2],
            r3: self.regs.r[3],
            r12: self.regs.r[12],
            lr: self.regs.lr,
            pc: self.regs.pc,
            xpsr,
        };

        let exc_return = if extended {
            let mut frame = FpExceptionFrame { base, fpscr: self.regs.fpscr, ..Default::default() };
            frame.s.copy_from_slice(&self.regs.s[..16]);
            self.regs.sp = top - FpExceptionFrame::SIZE;
            frame.store(&mut self.mem, self.regs.sp);
            EXC_RETURN_THREAD_PSP_FP
        } else {
            self.regs.sp = top - ExceptionFrame::SIZE;
            base.store(&mut self.mem, self.regs.sp);
            EXC_RETURN_THREAD_PSP
        };
        self.regs.fpca = false;
        self.exc_return = Some(exc_return);
        exc_return
    }

    /// PendSV 处理函数体
    pub fn pendsv(&mut self) {
        let Some(mut lr) = self.exc_return else {
            return;
        };
        let primask = self.primask;
        self.primask = true;

        if let Some(pair) = self.port.pending_request() {
            if pair.from != 0 {
                let fp_active = self.fpu && !lr.get_bit(EXC_RETURN_FTYPE);
                let mut sp = self.regs.sp;
                if fp_active {
                    sp -= 16 * WORD_SIZE;
                    for (i, s) in self.regs.s[16..].iter().enumerate() {
                        self.mem.write_word(sp + i as u32 * WORD_SIZE, *s);
                    }
                }
                let callee = CalleeSaved::from_array(self.callee_regs());
                sp -= CalleeSaved::SIZE;
                callee.store(&mut self.mem, sp);
                sp -= 2 * WORD_SIZE;
                let flag = if fp_active { CONTEXT_FLAG_FP } else { CONTEXT_FLAG_PLAIN };
                self.mem.write_word(sp, flag);
                self.mem.write_word(sp + WORD_SIZE, callee.r5);
                self.mem.write_word(pair.from, sp);
            }
            self.port.complete();

            let mut sp = self.mem.read_word(pair.to);
            let flag = self.mem.read_word(sp);
            sp += 2 * WORD_SIZE;
            let callee = CalleeSaved::load(&self.mem, sp).to_array();
            self.regs.r[4..12].copy_from_slice(&callee);
            sp += CalleeSaved::SIZE;
            if self.fpu && flag != CONTEXT_FLAG_PLAIN {
                for i in 0..16 {
                    self.regs.s[16 + i] = self.mem.read_word(sp + i as u32 * WORD_SIZE);
                }
                sp += 16 * WORD_SIZE;
            }
            self.regs.sp = sp;
            if self.fpu {
                lr.set_bit(EXC_RETURN_FTYPE, flag == CONTEXT_FLAG_PLAIN);
            }
            self.regs.r[..4].fill(SCRATCH);
            self.regs.r[12] = SCRATCH;
        }

        self.primask = primask;
        lr.set_bit(EXC_RETURN_SPSEL, true);
        self.exc_return = Some(lr);
    }

    /// 按 EXC_RETURN 返回线程模式
    pub fn exception_return(&mut self) {
        let Some(lr) = self.exc_return.take() else {
            return;
        };
        let extended = !lr.get_bit(EXC_RETURN_FTYPE);
        let base = if extended {
            let frame = FpExceptionFrame::load(&self.mem, self.regs.sp);
            self.regs.s[..16].copy_from_slice(&frame.s);
            self.regs.fpscr = frame.fpscr;
            self.regs.sp += FpExceptionFrame::SIZE;
            frame.base
        } else {
            let frame = ExceptionFrame::load(&self.mem, self.regs.sp);
            self.regs.sp += ExceptionFrame::SIZE;
            frame
        };

        self.regs.r[0] = base.r0;
        self.regs.r[1] = base.r1;
        self.regs.r[2] = base.r2;
        self.regs.r[3] = base.r3;
        self.regs.r[12] = base.r12;
        self.regs.lr = base.lr;
        self.regs.pc = base.pc;
        let mut xpsr = base.xpsr;
        if xpsr.get_bit(XPSR_STACK_ALIGNED) {
            self.regs.sp += WORD_SIZE;
            xpsr.set_bit(XPSR_STACK_ALIGNED, false);
        }
        self.regs.xpsr = xpsr;
        self.regs.fpca = extended;
    }

    /// 响应挂起的 PendSV，PRIMASK 置位时不响应
    pub fn take_pendsv(&mut self) -> bool {
        if self.primask {
            return false;
        }
        self.exception_entry();
        self.pendsv();
        self.exception_return();
        true
    }

    /// 从 MSP 上启动 `slot` 中保存的线程
    pub fn start_first(&mut self, slot: u32) {
        self.port.request_first(slot);
        self.exc_return = Some(EXC_RETURN_THREAD_MSP);
        self.pendsv();
        self.exception_return();
    }

    /// 当前线程触发故障，走与 `port_fault` 相同的保存路径后诊断并停机
    pub fn fault<R: FaultRegisters + ?Sized>(&mut self, kind: FaultKind, regs: &R) -> FaultReport {
        let exc_return = self.exception_entry();
        self.primask = true;

        let mut sp = self.regs.sp;
        sp -= CalleeSaved::SIZE;
        CalleeSaved::from_array(self.callee_regs()).store(&mut self.mem, sp);
        sp -= 2 * WORD_SIZE;
        self.mem.write_word(sp, CONTEXT_FLAG_PLAIN);
        self.mem.write_word(sp + WORD_SIZE, 0);
        sp -= WORD_SIZE;
        self.mem.write_word(sp, exc_return);
        self.regs.sp = sp;

        let snapshot = fault::read_fault_context(&self.mem, regs, sp);
        fault::diagnose(&self.port, kind, snapshot, None)
    }

    fn callee_regs(&self) -> [u32; 8] {
        let mut r = [0; 8];
        r.copy_from_slice(&self.regs.r[4..12]);
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{init_stack, SavedContext, SwitchOutcome};
    use crate::fault::{Cfsr, FaultOrigin, Hfsr};
    use crate::hal::arch::host::HostFaultRegisters;
    use crate::hal::INITIAL_XPSR;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const BASE: u32 = 0x2000_0000;
    const SLOT_A: u32 = BASE;
    const SLOT_B: u32 = BASE + 4;
    const SLOT_C: u32 = BASE + 8;
    const STACK_SIZE: u32 = 0x300;

    fn stack_of(slot: u32) -> u32 {
        BASE + 0x100 + (slot - BASE) / 4 * STACK_SIZE
    }

    /// 在 `slot` 对应的栈块上创建线程，返回入口地址
    fn spawn(m: &mut Machine, slot: u32, rng: &mut StdRng) -> u32 {
        let entry = rng.gen::<u32>() | 1;
        let sp = init_stack(&mut m.mem, entry, rng.gen(), stack_of(slot), STACK_SIZE, rng.gen());
        m.mem.write_word(slot, sp);
        entry
    }

    fn scramble(m: &mut Machine, rng: &mut StdRng) {
        for r in m.regs.r.iter_mut() {
            *r = rng.gen();
        }
        m.regs.lr = rng.gen();
        m.regs.pc = rng.gen::<u32>() | 1;
        m.regs.xpsr = INITIAL_XPSR | (rng.gen::<u32>() & 0xF800_0000);
        for s in m.regs.s.iter_mut() {
            *s = rng.gen();
        }
        m.regs.fpscr = rng.gen::<u32>() & 0xF7C0_009F;
        m.touch_fpu();
    }

    fn switch(m: &mut Machine, from: u32, to: u32) -> SwitchOutcome {
        let outcome = m.port.request_switch(from, to);
        assert!(m.take_pendsv());
        outcome
    }

    #[test]
    fn first_thread_starts_with_its_contract() {
        let mut rng = StdRng::seed_from_u64(0x5EED_0101);
        for fpu in [false, true] {
            for _ in 0..100 {
                let mut buf = vec![0u8; 0x1000];
                let mut m = Machine::new(StackArena::new(BASE, &mut buf), fpu);
                let (entry, arg, exit) = (rng.gen(), rng.gen(), rng.gen());
                let sp = init_stack(&mut m.mem, entry, arg, stack_of(SLOT_A), STACK_SIZE, exit);
                m.mem.write_word(SLOT_A, sp);

                m.start_first(SLOT_A);

                assert_eq!(m.regs.r[0], arg);
                assert_eq!(m.regs.lr, exit);
                assert_eq!(m.regs.pc, entry);
                assert_eq!(m.regs.xpsr, INITIAL_XPSR);
                assert_eq!(m.regs.sp, sp + SavedContext::SIZE);
                assert!(!m.regs.fpca);
                assert!(!m.port.is_pending());
            }
        }
    }

    fn round_trip(fpu: bool, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..50 {
            let mut buf = vec![0u8; 0x1000];
            let mut m = Machine::new(StackArena::new(BASE, &mut buf), fpu);
            spawn(&mut m, SLOT_A, &mut rng);
            spawn(&mut m, SLOT_B, &mut rng);
            m.start_first(SLOT_A);

            scramble(&mut m, &mut rng);
            // 奇数个字深的栈，迫使硬件额外对齐
            if rng.gen() {
                m.regs.sp -= WORD_SIZE;
            }
            let before = m.regs.clone();

            assert_eq!(switch(&mut m, SLOT_A, SLOT_B), SwitchOutcome::Posted);
            scramble(&mut m, &mut rng);
            assert_eq!(switch(&mut m, SLOT_B, SLOT_A), SwitchOutcome::Posted);

            if fpu {
                assert_eq!(m.regs, before);
            } else {
                assert_eq!(m.regs.r, before.r);
                assert_eq!(
                    (m.regs.sp, m.regs.lr, m.regs.pc, m.regs.xpsr),
                    (before.sp, before.lr, before.pc, before.xpsr)
                );
            }
        }
    }

    #[test]
    fn switch_round_trip_restores_every_register() {
        round_trip(true, 0x5EED_0201);
    }

    #[test]
    fn switch_round_trip_without_fpu() {
        round_trip(false, 0x5EED_0202);
    }

    #[test]
    fn fp_flag_follows_fp_usage() {
        let mut rng = StdRng::seed_from_u64(0x5EED_0203);
        let mut buf = vec![0u8; 0x1000];
        let mut m = Machine::new(StackArena::new(BASE, &mut buf), true);
        spawn(&mut m, SLOT_A, &mut rng);
        spawn(&mut m, SLOT_B, &mut rng);
        spawn(&mut m, SLOT_C, &mut rng);
        m.start_first(SLOT_A);

        m.touch_fpu();
        switch(&mut m, SLOT_A, SLOT_B);
        let a_sp = m.mem.read_word(SLOT_A);
        assert_eq!(m.mem.read_word(a_sp), CONTEXT_FLAG_FP);

        switch(&mut m, SLOT_B, SLOT_C);
        let b_sp = m.mem.read_word(SLOT_B);
        assert_eq!(m.mem.read_word(b_sp), CONTEXT_FLAG_PLAIN);
    }

    #[test]
    fn superseded_request_lands_on_last_target() {
        let mut rng = StdRng::seed_from_u64(0x5EED_0301);
        let mut buf = vec![0u8; 0x1000];
        let mut m = Machine::new(StackArena::new(BASE, &mut buf), false);
        spawn(&mut m, SLOT_A, &mut rng);
        spawn(&mut m, SLOT_B, &mut rng);
        let c_entry = spawn(&mut m, SLOT_C, &mut rng);
        m.start_first(SLOT_A);
        scramble(&mut m, &mut rng);
        let a_pc = m.regs.pc;

        let b_slot = m.mem.read_word(SLOT_B);
        assert_eq!(m.port.request_switch(SLOT_A, SLOT_B), SwitchOutcome::Posted);
        assert_eq!(m.port.request_switch(SLOT_B, SLOT_C), SwitchOutcome::Superseded);
        assert!(m.take_pendsv());

        assert_eq!(m.regs.pc, c_entry);
        assert!(!m.port.is_pending());
        let a_saved = SavedContext::load(&m.mem, m.mem.read_word(SLOT_A));
        assert_eq!(a_saved.frame.pc, a_pc);
        assert_eq!(m.mem.read_word(SLOT_B), b_slot);
    }

    #[test]
    fn pendsv_without_request_changes_nothing() {
        let mut rng = StdRng::seed_from_u64(0x5EED_0302);
        let mut buf = vec![0u8; 0x1000];
        let mut m = Machine::new(StackArena::new(BASE, &mut buf), false);
        spawn(&mut m, SLOT_A, &mut rng);
        m.start_first(SLOT_A);
        scramble(&mut m, &mut rng);
        let before = m.regs.clone();

        assert!(m.take_pendsv());
        assert_eq!(m.regs, before);
    }

    #[test]
    fn fault_halts_every_switch() {
        let mut rng = StdRng::seed_from_u64(0x5EED_0401);
        let mut buf = vec![0u8; 0x1000];
        let mut m = Machine::new(StackArena::new(BASE, &mut buf), false);
        spawn(&mut m, SLOT_A, &mut rng);
        spawn(&mut m, SLOT_B, &mut rng);
        m.start_first(SLOT_A);
        scramble(&mut m, &mut rng);
        let (pc, r4) = (m.regs.pc, m.regs.r[4]);

        let status = HostFaultRegisters {
            cfsr: (Cfsr::DACCVIOL | Cfsr::MMARVALID).bits(),
            hfsr: Hfsr::FORCED.bits(),
            mmfar: 0xDEAD_0000,
            bfar: 0,
        };
        let report = m.fault(FaultKind::HardFault, &status);

        assert!(m.port.is_faulted());
        assert_eq!(report.snapshot.origin(), FaultOrigin::Thread);
        assert_eq!(report.snapshot.context.frame.pc, pc);
        assert_eq!(report.snapshot.context.callee.r4, r4);
        assert_eq!(report.snapshot.mem_fault_address(), Some(0xDEAD_0000));
        assert!(report.causes().any(|c| c.contains("data access violation")));

        let memory = m.mem.as_bytes().to_vec();
        let regs = m.regs.clone();
        assert_eq!(m.port.request_switch(SLOT_A, SLOT_B), SwitchOutcome::Rejected);
        assert!(!m.take_pendsv());
        assert_eq!(m.mem.as_bytes(), &memory[..]);
        assert_eq!(m.regs, regs);

        // 即便 PendSV 仍被执行，跳板也不再保存或恢复任何线程
        m.pendsv();
        assert_eq!(m.mem.as_bytes(), &memory[..]);
        assert_eq!(m.regs, regs);
        assert!(m.port.is_faulted());
    }
}
