//! # 栈帧布局
//!
//! ## Overview
//! 定义挂起线程在栈上的寄存器布局（低地址在前）：
//!
//! ```text
//!  sp ->  flag            浮点使用标记
//!         reserved        填充，使软件部分为 10 字
//!         r4 ~ r11        被调用者保存寄存器
//!        [s16 ~ s31]      仅浮点变体
//!         异常帧           硬件自动压栈：r0-r3 r12 lr pc xpsr [s0-s15 fpscr reserved]
//! ```
//!
//! ## Invariants
//! - 异常帧字段顺序与大小由硬件规定，不可调整
//! - 两种完整上下文的大小都是 8 的倍数，保证 sp 对齐
//! - 线程保存的 sp 永远指向 `flag`

use super::memory::Memory;
use crate::hal::{CONTEXT_FLAG_FP, CONTEXT_FLAG_PLAIN, WORD_SIZE};
use core::mem::size_of;

/// 能以固定字数序列读写的帧
pub trait Frame: Sized {
    /// 帧占用的字数
    const WORDS: usize;
    /// 帧占用的字节数
    const SIZE: u32 = Self::WORDS as u32 * WORD_SIZE;

    fn load<M: Memory + ?Sized>(mem: &M, addr: u32) -> Self;
    fn store<M: Memory + ?Sized>(&self, mem: &mut M, addr: u32);
}

fn word_at(addr: u32, index: usize) -> u32 {
    addr + index as u32 * WORD_SIZE
}

fn load_words<M: Memory + ?Sized, const N: usize>(mem: &M, addr: u32) -> [u32; N] {
    core::array::from_fn(|i| mem.read_word(word_at(addr, i)))
}

fn store_words<M: Memory + ?Sized>(mem: &mut M, addr: u32, words: &[u32]) {
    for (i, w) in words.iter().enumerate() {
        mem.write_word(word_at(addr, i), *w);
    }
}

/// 硬件在异常入口自动压入的寄存器
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

impl Frame for ExceptionFrame {
    const WORDS: usize = 8;

    fn load<M: Memory + ?Sized>(mem: &M, addr: u32) -> Self {
        let [r0, r1, r2, r3, r12, lr, pc, xpsr] = load_words::<M, 8>(mem, addr);
        Self { r0, r1, r2, r3, r12, lr, pc, xpsr }
    }

    fn store<M: Memory + ?Sized>(&self, mem: &mut M, addr: u32) {
        store_words(
            mem,
            addr,
            &[self.r0, self.r1, self.r2, self.r3, self.r12, self.lr, self.pc, self.xpsr],
        );
    }
}

/// 浮点上下文活跃时的扩展异常帧
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FpExceptionFrame {
    pub base: ExceptionFrame,
    /// s0 ~ s15
    pub s: [u32; 16],
    pub fpscr: u32,
    pub reserved: u32,
}

impl Frame for FpExceptionFrame {
    const WORDS: usize = ExceptionFrame::WORDS + 18;

    fn load<M: Memory + ?Sized>(mem: &M, addr: u32) -> Self {
        let base = ExceptionFrame::load(mem, addr);
        let tail = word_at(addr, ExceptionFrame::WORDS);
        Self {
            base,
            s: load_words(mem, tail),
            fpscr: mem.read_word(word_at(tail, 16)),
            reserved: mem.read_word(word_at(tail, 17)),
        }
    }

    fn store<M: Memory + ?Sized>(&self, mem: &mut M, addr: u32) {
        self.base.store(mem, addr);
        let tail = word_at(addr, ExceptionFrame::WORDS);
        store_words(mem, tail, &self.s);
        mem.write_word(word_at(tail, 16), self.fpscr);
        mem.write_word(word_at(tail, 17), self.reserved);
    }
}

/// 硬件不自动保存的 r4 ~ r11
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CalleeSaved {
    pub r4: u32,
    pub r5: u32,
    pub r6: u32,
    pub r7: u32,
    pub r8: u32,
    pub r9: u32,
    pub r10: u32,
    pub r11: u32,
}

impl CalleeSaved {
    pub fn from_array(r: [u32; 8]) -> Self {
        let [r4, r5, r6, r7, r8, r9, r10, r11] = r;
        Self { r4, r5, r6, r7, r8, r9, r10, r11 }
    }

    pub fn to_array(&self) -> [u32; 8] {
        [self.r4, self.r5, self.r6, self.r7, self.r8, self.r9, self.r10, self.r11]
    }
}

impl Frame for CalleeSaved {
    const WORDS: usize = 8;

    fn load<M: Memory + ?Sized>(mem: &M, addr: u32) -> Self {
        Self::from_array(load_words(mem, addr))
    }

    fn store<M: Memory + ?Sized>(&self, mem: &mut M, addr: u32) {
        store_words(mem, addr, &self.to_array());
    }
}

/// 软件部分（flag + reserved + r4~r11）的字数
pub const SOFT_WORDS: usize = 2 + CalleeSaved::WORDS;

/// 不带浮点扩展的完整上下文
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SavedContext {
    pub flag: u32,
    pub reserved: u32,
    pub callee: CalleeSaved,
    pub frame: ExceptionFrame,
}

impl SavedContext {
    /// 异常帧相对 sp 的字偏移
    pub const FRAME_OFFSET: usize = SOFT_WORDS;
}

impl Frame for SavedContext {
    const WORDS: usize = SOFT_WORDS + ExceptionFrame::WORDS;

    fn load<M: Memory + ?Sized>(mem: &M, addr: u32) -> Self {
        Self {
            flag: mem.read_word(addr),
            reserved: mem.read_word(word_at(addr, 1)),
            callee: CalleeSaved::load(mem, word_at(addr, 2)),
            frame: ExceptionFrame::load(mem, word_at(addr, Self::FRAME_OFFSET)),
        }
    }

    fn store<M: Memory + ?Sized>(&self, mem: &mut M, addr: u32) {
        mem.write_word(addr, self.flag);
        mem.write_word(word_at(addr, 1), self.reserved);
        self.callee.store(mem, word_at(addr, 2));
        self.frame.store(mem, word_at(addr, Self::FRAME_OFFSET));
    }
}

/// 带浮点扩展的完整上下文
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FpSavedContext {
    pub flag: u32,
    pub reserved: u32,
    pub callee: CalleeSaved,
    /// s16 ~ s31
    pub s_high: [u32; 16],
    pub frame: FpExceptionFrame,
}

impl FpSavedContext {
    pub const FRAME_OFFSET: usize = SOFT_WORDS + 16;
}

impl Frame for FpSavedContext {
    const WORDS: usize = Self::FRAME_OFFSET + FpExceptionFrame::WORDS;

    fn load<M: Memory + ?Sized>(mem: &M, addr: u32) -> Self {
        Self {
            flag: mem.read_word(addr),
            reserved: mem.read_word(word_at(addr, 1)),
            callee: CalleeSaved::load(mem, word_at(addr, 2)),
            s_high: load_words(mem, word_at(addr, SOFT_WORDS)),
            frame: FpExceptionFrame::load(mem, word_at(addr, Self::FRAME_OFFSET)),
        }
    }

    fn store<M: Memory + ?Sized>(&self, mem: &mut M, addr: u32) {
        mem.write_word(addr, self.flag);
        mem.write_word(word_at(addr, 1), self.reserved);
        self.callee.store(mem, word_at(addr, 2));
        store_words(mem, word_at(addr, SOFT_WORDS), &self.s_high);
        self.frame.store(mem, word_at(addr, Self::FRAME_OFFSET));
    }
}

const _: () = assert!(size_of::<ExceptionFrame>() == ExceptionFrame::SIZE as usize);
const _: () = assert!(size_of::<FpExceptionFrame>() == FpExceptionFrame::SIZE as usize);
const _: () = assert!(size_of::<SavedContext>() == SavedContext::SIZE as usize);
const _: () = assert!(size_of::<FpSavedContext>() == FpSavedContext::SIZE as usize);
const _: () = assert!(SavedContext::SIZE % 8 == 0);
const _: () = assert!(FpSavedContext::SIZE % 8 == 0);

/// 按 `flag` 区分的挂起上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Plain(SavedContext),
    Fp(FpSavedContext),
}

impl Context {
    /// 读取 `sp` 处的上下文，变体由栈上的 `flag` 决定
    pub fn load<M: Memory + ?Sized>(mem: &M, sp: u32) -> Self {
        match mem.read_word(sp) {
            CONTEXT_FLAG_PLAIN => Self::Plain(SavedContext::load(mem, sp)),
            _ => Self::Fp(FpSavedContext::load(mem, sp)),
        }
    }

    pub fn uses_fp(&self) -> bool {
        matches!(self, Self::Fp(_))
    }

    pub fn flag(&self) -> u32 {
        match self {
            Self::Plain(cx) => cx.flag,
            Self::Fp(cx) => cx.flag,
        }
    }

    pub fn callee(&self) -> &CalleeSaved {
        match self {
            Self::Plain(cx) => &cx.callee,
            Self::Fp(cx) => &cx.callee,
        }
    }

    pub fn exception_frame(&self) -> &ExceptionFrame {
        match self {
            Self::Plain(cx) => &cx.frame,
            Self::Fp(cx) => &cx.frame.base,
        }
    }

    /// 上下文占用的字节数，恢复后 PSP = sp + size
    pub fn size(&self) -> u32 {
        match self {
            Self::Plain(_) => SavedContext::SIZE,
            Self::Fp(_) => FpSavedContext::SIZE,
        }
    }
}

impl From<SavedContext> for Context {
    fn from(cx: SavedContext) -> Self {
        Self::Plain(cx)
    }
}

impl From<FpSavedContext> for Context {
    fn from(cx: FpSavedContext) -> Self {
        debug_assert_eq!(cx.flag, CONTEXT_FLAG_FP);
        Self::Fp(cx)
    }
}
