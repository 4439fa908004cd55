//! 故障状态寄存器的位定义

use bit_field::BitField;
use bitflags::bitflags;

bitflags! {
    /// Configurable Fault Status Register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct Cfsr: u32 {
        // MMFSR
        const IACCVIOL = 1 << 0;
        const DACCVIOL = 1 << 1;
        const MUNSTKERR = 1 << 3;
        const MSTKERR = 1 << 4;
        const MLSPERR = 1 << 5;
        const MMARVALID = 1 << 7;

        // BFSR
        const IBUSERR = 1 << (8 + 0);
        const PRECISERR = 1 << (8 + 1);
        const IMPRECISERR = 1 << (8 + 2);
        const UNSTKERR = 1 << (8 + 3);
        const STKERR = 1 << (8 + 4);
        const LSPERR = 1 << (8 + 5);
        const BFARVALID = 1 << (8 + 7);

        // UFSR
        const UNDEFINSTR = 1 << (16 + 0);
        const INVSTATE = 1 << (16 + 1);
        const INVPC = 1 << (16 + 2);
        const NOCP = 1 << (16 + 3);
        const UNALIGNED = 1 << (16 + 8);
        const DIVBYZERO = 1 << (16 + 9);
    }
}

bitflags! {
    /// HardFault Status Register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct Hfsr: u32 {
        const VECTTBL = 1 << 1;
        const FORCED = 1 << 30;
        const DEBUGEVT = 1 << 31;
    }
}

impl Cfsr {
    /// MemManage Fault Status（低 8 位）
    pub fn mmfsr(self) -> u8 {
        self.bits().get_bits(0..8) as u8
    }

    /// BusFault Status
    pub fn bfsr(self) -> u8 {
        self.bits().get_bits(8..16) as u8
    }

    /// UsageFault Status
    pub fn ufsr(self) -> u16 {
        self.bits().get_bits(16..32) as u16
    }
}

/// CFSR 各位对应的故障原因
pub const CFSR_CAUSES: &[(Cfsr, &str)] = &[
    (Cfsr::IACCVIOL, "memory management: instruction access violation"),
    (Cfsr::DACCVIOL, "memory management: data access violation"),
    (Cfsr::MUNSTKERR, "memory management: unstacking error"),
    (Cfsr::MSTKERR, "memory management: stacking error"),
    (Cfsr::MLSPERR, "memory management: lazy FP state preservation error"),
    (Cfsr::IBUSERR, "bus: instruction bus error"),
    (Cfsr::PRECISERR, "bus: precise data bus error"),
    (Cfsr::IMPRECISERR, "bus: imprecise data bus error"),
    (Cfsr::UNSTKERR, "bus: unstacking error"),
    (Cfsr::STKERR, "bus: stacking error"),
    (Cfsr::LSPERR, "bus: lazy FP state preservation error"),
    (Cfsr::UNDEFINSTR, "usage: undefined instruction"),
    (Cfsr::INVSTATE, "usage: invalid EPSR state (Thumb bit clear)"),
    (Cfsr::INVPC, "usage: invalid EXC_RETURN / PC load"),
    (Cfsr::NOCP, "usage: coprocessor access (FPU disabled?)"),
    (Cfsr::UNALIGNED, "usage: unaligned access"),
    (Cfsr::DIVBYZERO, "usage: divide by zero"),
];

/// HFSR 各位对应的故障原因
pub const HFSR_CAUSES: &[(Hfsr, &str)] = &[
    (Hfsr::VECTTBL, "hard: vector table read fault"),
    (Hfsr::FORCED, "hard: escalated from a configurable fault"),
    (Hfsr::DEBUGEVT, "hard: debug event"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_registers() {
        let cfsr = Cfsr::DACCVIOL | Cfsr::MMARVALID | Cfsr::PRECISERR | Cfsr::DIVBYZERO;
        assert_eq!(cfsr.mmfsr(), 0x82);
        assert_eq!(cfsr.bfsr(), 0x02);
        assert_eq!(cfsr.ufsr(), 0x0200);
    }

    #[test]
    fn every_cause_is_a_single_bit() {
        for (flag, _) in CFSR_CAUSES {
            assert_eq!(flag.bits().count_ones(), 1);
        }
        for (flag, _) in HFSR_CAUSES {
            assert_eq!(flag.bits().count_ones(), 1);
        }
    }
}
