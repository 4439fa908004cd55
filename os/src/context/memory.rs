//! # 按字寻址的内存视图
//!
//! ## Overview
//! 栈帧的读写全部经过 [`Memory`]：
//! - [`RawMemory`]：目标板上直接对物理地址做 volatile 访问
//! - [`StackArena`]：一段字节数组加上它所“代表”的总线地址，
//!   在主机上承载线程栈、TCB 中的 sp 槽位等
//!
//! ## Invariants
//! - 所有地址都是 32 位总线地址，字访问要求 4 字节对齐
//! - 同一时刻只通过一种帧布局解释某段栈内存，不同时持有两个类型化视图
//!
//! ## Safety
//! - `RawMemory` 的正确性完全依赖调用者给出的地址合法

use crate::hal::WORD_SIZE;

/// 32 位字粒度的内存访问
pub trait Memory {
    fn read_word(&self, addr: u32) -> u32;
    fn write_word(&mut self, addr: u32, value: u32);

    /// 从 `addr` 开始连续填充 `words` 个字
    fn fill_words(&mut self, addr: u32, words: usize, value: u32) {
        for i in 0..words as u32 {
            self.write_word(addr + i * WORD_SIZE, value);
        }
    }
}

/// 直接访问物理地址
///
/// ## Safety
/// - 只能在目标板上使用，地址必须落在可读写的 RAM 内
#[derive(Debug, Clone, Copy)]
pub struct RawMemory(());

impl RawMemory {
    /// ## Safety
    /// - 调用者保证之后传入的每个地址都合法且 4 字节对齐
    pub const unsafe fn new() -> Self {
        Self(())
    }
}

impl Memory for RawMemory {
    fn read_word(&self, addr: u32) -> u32 {
        unsafe { core::ptr::read_volatile(addr as usize as *const u32) }
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        unsafe { core::ptr::write_volatile(addr as usize as *mut u32, value) }
    }
}

/// 指针或地址值转成 32 位总线地址
///
/// 超出 32 位（主机上的 64 位指针）时 panic。
pub fn bus_addr(value: usize) -> u32 {
    match u32::try_from(value) {
        Ok(addr) => addr,
        Err(_) => panic!("address {:#x} does not fit the 32-bit bus", value),
    }
}

/// 以字节数组承载的一段总线地址空间
///
/// `base` 是 `bytes[0]` 对应的总线地址，字节序为小端（与 Cortex-M 一致）。
pub struct StackArena<'a> {
    base: u32,
    bytes: &'a mut [u8],
}

impl<'a> StackArena<'a> {
    pub fn new(base: u32, bytes: &'a mut [u8]) -> Self {
        assert!(base % WORD_SIZE == 0, "arena base {:#x} is not word aligned", base);
        Self { base, bytes }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// 末端（不含）地址
    pub fn end(&self) -> u32 {
        self.base + self.bytes.len() as u32
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.end()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    fn offset(&self, addr: u32) -> usize {
        assert!(
            addr % WORD_SIZE == 0 && addr >= self.base && addr + WORD_SIZE <= self.end(),
            "word access at {:#010x} outside arena [{:#010x}, {:#010x})",
            addr,
            self.base,
            self.end()
        );
        (addr - self.base) as usize
    }
}

impl Memory for StackArena<'_> {
    fn read_word(&self, addr: u32) -> u32 {
        let off = self.offset(addr);
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[off..off + 4]);
        u32::from_le_bytes(word)
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        let off = self.offset(addr);
        self.bytes[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }
}
